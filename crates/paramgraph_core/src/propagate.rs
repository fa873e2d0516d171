use crate::graph::{AttrId, AttributeGraph, OwnerId};
use crate::traits::{AlgebraEngine, EvalContext, PrepareMode, PrototypeRole, PrototypeTree};
use anyhow::{Context, Result};

/// Tells `owner` that one of its values changed.
///
/// Pulse owners additionally make their parent sequence recollect its time
/// points of interest.
pub fn notify_owner_of_update<H: PrototypeTree + ?Sized>(host: &mut H, owner: OwnerId) -> Result<()> {
    host.prepare(owner, PrepareMode::Update)
        .with_context(|| format!("Failed to prepare owner {} for update.", owner.index()))?;
    if host.role(owner) == PrototypeRole::Pulse {
        if let Some(parent) = host.parent(owner) {
            host.collect_time_points(parent);
        }
    }
    Ok(())
}

impl<E: AlgebraEngine> AttributeGraph<E> {
    /// `notify_owner_of_update` for the owner of `id`.
    pub fn notify_update<H: PrototypeTree + ?Sized>(&self, id: AttrId, host: &mut H) -> Result<()> {
        let attribute = self.get(id)?;
        let owner_name = self.owner_name(attribute.owner())?;
        notify_owner_of_update(host, attribute.owner()).with_context(|| {
            format!("Update of attribute {} in {}.", attribute.name(), owner_name)
        })
    }

    /// Evaluation context carrying the owner's vector, if the host has one.
    pub fn context_for<'h, H: PrototypeTree + ?Sized>(
        &self,
        id: AttrId,
        host: &'h H,
    ) -> Result<EvalContext<'h>> {
        let owner = self.get(id)?.owner();
        Ok(EvalContext {
            vector: host.vector(owner),
        })
    }
}
