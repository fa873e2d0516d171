use crate::config::GraphSettings;
use crate::equation_engine::SymbolicEngine;
use crate::error::AttributeError;
use crate::traits::AlgebraEngine;
use crate::value::{AttributeType, DataType, Value, ValueStore};
use serde::{Deserialize, Serialize};

/// Handle to an attribute stored in an `AttributeGraph`.
///
/// Handles are never reused; once the attribute is removed every operation on
/// the handle reports `StaleAttribute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttrId(pub(crate) usize);

/// Handle to a component that declares attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(pub(crate) usize);

impl AttrId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl OwnerId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
pub(crate) struct Owner {
    pub(crate) name: String,
    pub(crate) attributes: Vec<AttrId>,
}

/// A named, typed parameter of a component.
#[derive(Debug)]
pub struct Attribute {
    pub(crate) name: String,
    pub(crate) owner: OwnerId,
    pub(crate) store: ValueStore,
    pub(crate) expression: Option<String>,
    pub(crate) symbol: Option<String>,
    pub(crate) subjects: Vec<AttrId>,
    pub(crate) observers: Vec<AttrId>,
    pub(crate) diff_order: u32,
    pub(crate) diff_variable: Option<String>,
    pub(crate) complex: bool,
    pub(crate) imaginary: f64,
}

impl Attribute {
    fn new(name: &str, owner: OwnerId, datatype: DataType) -> Self {
        Self {
            name: name.to_string(),
            owner,
            store: ValueStore::new(datatype),
            expression: None,
            symbol: None,
            subjects: Vec::new(),
            observers: Vec::new(),
            diff_order: 0,
            diff_variable: None,
            complex: false,
            imaginary: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn datatype(&self) -> DataType {
        self.store.datatype()
    }

    pub fn is_observable(&self) -> bool {
        self.datatype().is_observable()
    }

    pub fn value(&self) -> &Value {
        self.store.value()
    }

    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }

    pub fn symbol(&self) -> Option<&str> {
        self.symbol.as_deref()
    }

    pub fn subjects(&self) -> &[AttrId] {
        &self.subjects
    }

    pub fn observers(&self) -> &[AttrId] {
        &self.observers
    }

    pub fn is_complex(&self) -> bool {
        self.complex
    }

    pub fn imaginary_part(&self) -> f64 {
        self.imaginary
    }

    pub fn differentiation(&self) -> (u32, Option<&str>) {
        (self.diff_order, self.diff_variable.as_deref())
    }
}

/// Arena of owners and their attributes, plus the subject/observer edges
/// between attributes.
///
/// Edges are plain handles; the arena owns every attribute, so removing one
/// only requires unlinking it from its peers.
#[derive(Debug)]
pub struct AttributeGraph<E: AlgebraEngine = SymbolicEngine> {
    owners: Vec<Option<Owner>>,
    attributes: Vec<Option<Attribute>>,
    pub(crate) engine: E,
    pub(crate) settings: GraphSettings,
}

impl AttributeGraph<SymbolicEngine> {
    pub fn new() -> Self {
        Self::with_engine(SymbolicEngine, GraphSettings::default())
    }

    pub fn with_settings(settings: GraphSettings) -> Self {
        Self::with_engine(SymbolicEngine, settings)
    }
}

impl Default for AttributeGraph<SymbolicEngine> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: AlgebraEngine> AttributeGraph<E> {
    pub fn with_engine(engine: E, settings: GraphSettings) -> Self {
        Self {
            owners: Vec::new(),
            attributes: Vec::new(),
            engine,
            settings,
        }
    }

    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    // --- Owners ---

    /// Registers a component. Names must be unique because symbols are
    /// derived from them.
    pub fn declare_owner(&mut self, name: &str) -> Result<OwnerId, AttributeError> {
        if self.owners.iter().flatten().any(|o| o.name == name) {
            return Err(AttributeError::DuplicateOwner(name.to_string()));
        }
        self.owners.push(Some(Owner {
            name: name.to_string(),
            attributes: Vec::new(),
        }));
        Ok(OwnerId(self.owners.len() - 1))
    }

    pub(crate) fn owner_entry(&self, owner: OwnerId) -> Result<&Owner, AttributeError> {
        self.owners
            .get(owner.0)
            .and_then(Option::as_ref)
            .ok_or(AttributeError::UnknownOwner(owner.0))
    }

    pub fn owner_name(&self, owner: OwnerId) -> Result<&str, AttributeError> {
        Ok(&self.owner_entry(owner)?.name)
    }

    pub fn owner_attributes(&self, owner: OwnerId) -> Result<&[AttrId], AttributeError> {
        Ok(&self.owner_entry(owner)?.attributes)
    }

    /// Removes an owner together with all of its attributes.
    pub fn remove_owner(&mut self, owner: OwnerId) -> Result<(), AttributeError> {
        let attributes = self.owner_entry(owner)?.attributes.clone();
        for id in attributes {
            self.remove_attribute(id)?;
        }
        self.owners[owner.0] = None;
        Ok(())
    }

    // --- Attributes ---

    /// Declares a new attribute with a fixed datatype and default value.
    pub fn declare(
        &mut self,
        owner: OwnerId,
        name: &str,
        datatype: DataType,
    ) -> Result<AttrId, AttributeError> {
        let owner_entry = self.owner_entry(owner)?;
        if owner_entry
            .attributes
            .iter()
            .filter_map(|id| self.get(*id).ok())
            .any(|a| a.name == name)
        {
            return Err(AttributeError::DuplicateAttribute {
                owner: owner_entry.name.clone(),
                name: name.to_string(),
            });
        }
        let id = AttrId(self.attributes.len());
        self.attributes
            .push(Some(Attribute::new(name, owner, datatype)));
        if let Some(Some(entry)) = self.owners.get_mut(owner.0) {
            entry.attributes.push(id);
        }
        Ok(id)
    }

    pub fn get(&self, id: AttrId) -> Result<&Attribute, AttributeError> {
        self.attributes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(AttributeError::StaleAttribute(id.0))
    }

    pub(crate) fn get_mut(&mut self, id: AttrId) -> Result<&mut Attribute, AttributeError> {
        self.attributes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(AttributeError::StaleAttribute(id.0))
    }

    pub fn contains(&self, id: AttrId) -> bool {
        self.get(id).is_ok()
    }

    pub fn lookup(&self, owner: OwnerId, name: &str) -> Option<AttrId> {
        self.owner_entry(owner)
            .ok()?
            .attributes
            .iter()
            .copied()
            .find(|id| self.get(*id).map(|a| a.name == name).unwrap_or(false))
    }

    pub fn len(&self) -> usize {
        self.attributes.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn read<T: AttributeType>(&self, id: AttrId) -> Result<T, AttributeError> {
        self.get(id)?.store.read()
    }

    /// Writes a literal value. Observers are not re-evaluated.
    pub fn write<T: AttributeType>(&mut self, id: AttrId, value: T) -> Result<(), AttributeError> {
        self.get_mut(id)?.store.write(value)
    }

    pub fn backup(&mut self, id: AttrId) -> Result<(), AttributeError> {
        self.get_mut(id)?.store.backup();
        Ok(())
    }

    pub fn restore(&mut self, id: AttrId) -> Result<bool, AttributeError> {
        Ok(self.get_mut(id)?.store.restore())
    }

    pub fn discard_backup(&mut self, id: AttrId) -> Result<(), AttributeError> {
        self.get_mut(id)?.store.discard_backup();
        Ok(())
    }

    /// Symbol name an attribute is known by inside expressions.
    pub fn symbol_name(&self, id: AttrId) -> Result<String, AttributeError> {
        let attribute = self.get(id)?;
        let owner = self.owner_name(attribute.owner)?;
        Ok(format!("{}_{}", owner, attribute.name))
    }

    pub(crate) fn assign_symbol(&mut self, id: AttrId) -> Result<(), AttributeError> {
        let symbol = self.symbol_name(id)?;
        self.get_mut(id)?.symbol = Some(symbol);
        Ok(())
    }

    fn observable(&self, id: AttrId) -> Result<bool, AttributeError> {
        Ok(self.get(id)?.is_observable())
    }

    // --- Edges ---

    /// Registers `other` as an observer of `this`.
    ///
    /// Idempotent. Edges only form between numeric attributes.
    pub fn attach_observer(&mut self, this: AttrId, other: AttrId) -> Result<(), AttributeError> {
        if !self.observable(this)? || !self.observable(other)? {
            return Ok(());
        }
        if self.get(this)?.symbol.is_none() {
            self.assign_symbol(this)?;
        }
        let attribute = self.get_mut(this)?;
        if attribute.observers.contains(&other) {
            return Ok(());
        }
        attribute.observers.push(other);
        self.attach_subject(other, this)
    }

    /// Registers `other` as a subject `this` reads from.
    pub fn attach_subject(&mut self, this: AttrId, other: AttrId) -> Result<(), AttributeError> {
        if !self.observable(other)? || !self.observable(this)? {
            return Ok(());
        }
        let attribute = self.get_mut(this)?;
        if attribute.subjects.contains(&other) {
            return Ok(());
        }
        attribute.subjects.push(other);
        log::debug!("attribute {} now reads from {}", this.0, other.0);
        self.attach_observer(other, this)
    }

    /// Removes the edge `other -> this` in both directions.
    pub fn detach_subject(&mut self, this: AttrId, other: AttrId) -> Result<(), AttributeError> {
        self.get_mut(this)?.subjects.retain(|s| *s != other);
        if let Ok(subject) = self.get_mut(other) {
            subject.observers.retain(|o| *o != this);
        }
        Ok(())
    }

    /// Drops every subject of `this`, pruning `this` from their observers.
    pub fn clear_subjects(&mut self, this: AttrId) -> Result<(), AttributeError> {
        let former = std::mem::take(&mut self.get_mut(this)?.subjects);
        for subject in former {
            if let Ok(attribute) = self.get_mut(subject) {
                attribute.observers.retain(|o| *o != this);
            }
        }
        Ok(())
    }

    /// Unlinks an attribute from all peers and drops its storage.
    ///
    /// Observers keep their expression text; evaluating them afterwards fails
    /// with an unresolved symbol until they are rebound.
    pub fn remove_attribute(&mut self, id: AttrId) -> Result<(), AttributeError> {
        let attribute = self
            .attributes
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(AttributeError::StaleAttribute(id.0))?;
        for subject in &attribute.subjects {
            if let Ok(peer) = self.get_mut(*subject) {
                peer.observers.retain(|o| *o != id);
            }
        }
        for observer in &attribute.observers {
            if let Ok(peer) = self.get_mut(*observer) {
                peer.subjects.retain(|s| *s != id);
            }
        }
        if let Some(Some(owner)) = self.owners.get_mut(attribute.owner.0) {
            owner.attributes.retain(|a| *a != id);
        }
        log::debug!("removed attribute {} ({})", id.0, attribute.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with(types: &[(&str, DataType)]) -> (AttributeGraph, Vec<AttrId>) {
        let mut graph = AttributeGraph::new();
        let owner = graph.declare_owner("Pulse").expect("owner");
        let ids = types
            .iter()
            .map(|(name, ty)| graph.declare(owner, name, *ty).expect("declare"))
            .collect();
        (graph, ids)
    }

    #[test]
    fn attach_observer_is_symmetric_and_idempotent() {
        let (mut graph, ids) = graph_with(&[("Area", DataType::Real), ("Flip", DataType::Integer)]);
        let (a, b) = (ids[0], ids[1]);
        graph.attach_observer(a, b).expect("attach");
        graph.attach_observer(a, b).expect("attach again");
        graph.attach_subject(b, a).expect("reverse attach");

        let a_attr = graph.get(a).expect("a");
        let b_attr = graph.get(b).expect("b");
        assert_eq!(a_attr.observers(), &[b]);
        assert_eq!(b_attr.subjects(), &[a]);
        assert!(a_attr.subjects().is_empty());
        assert!(b_attr.observers().is_empty());
        assert_eq!(a_attr.symbol(), Some("Pulse_Area"));
    }

    #[test]
    fn non_observable_ends_never_form_edges() {
        let (mut graph, ids) = graph_with(&[
            ("Area", DataType::Real),
            ("Label", DataType::Text),
            ("Axis", DataType::Axis),
        ]);
        let (real, text, axis) = (ids[0], ids[1], ids[2]);
        graph.attach_observer(real, text).expect("attach");
        graph.attach_subject(real, axis).expect("attach");
        graph.attach_observer(axis, real).expect("attach");
        graph.attach_subject(text, real).expect("attach");

        for id in ids {
            let attribute = graph.get(id).expect("attribute");
            assert!(attribute.subjects().is_empty());
            assert!(attribute.observers().is_empty());
        }
        assert!(graph.get(text).expect("text").symbol().is_none());
        assert!(graph.get(axis).expect("axis").symbol().is_none());
    }

    #[test]
    fn removal_unlinks_all_peers() {
        let (mut graph, ids) = graph_with(&[
            ("A", DataType::Real),
            ("B", DataType::Real),
            ("C", DataType::Real),
        ]);
        graph.attach_subject(ids[1], ids[0]).expect("attach");
        graph.attach_subject(ids[2], ids[1]).expect("attach");
        graph.remove_attribute(ids[1]).expect("remove");

        assert!(!graph.contains(ids[1]));
        assert!(graph.get(ids[0]).expect("a").observers().is_empty());
        assert!(graph.get(ids[2]).expect("c").subjects().is_empty());
        assert_eq!(
            graph.read::<f64>(ids[1]),
            Err(AttributeError::StaleAttribute(ids[1].index()))
        );
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut graph = AttributeGraph::new();
        let owner = graph.declare_owner("Seq").expect("owner");
        assert!(matches!(
            graph.declare_owner("Seq"),
            Err(AttributeError::DuplicateOwner(_))
        ));
        graph.declare(owner, "TR", DataType::Real).expect("declare");
        assert!(matches!(
            graph.declare(owner, "TR", DataType::Integer),
            Err(AttributeError::DuplicateAttribute { .. })
        ));
        assert!(graph.lookup(owner, "TR").is_some());
        assert!(graph.lookup(owner, "TE").is_none());
    }

    #[test]
    fn remove_owner_drops_its_attributes() {
        let mut graph = AttributeGraph::new();
        let seq = graph.declare_owner("Seq").expect("owner");
        let pulse = graph.declare_owner("Pulse").expect("owner");
        let tr = graph.declare(seq, "TR", DataType::Real).expect("declare");
        let dur = graph.declare(pulse, "Duration", DataType::Real).expect("declare");
        graph.attach_subject(dur, tr).expect("attach");

        graph.remove_owner(seq).expect("remove owner");
        assert!(!graph.contains(tr));
        assert!(graph.get(dur).expect("dur").subjects().is_empty());
        assert!(matches!(
            graph.owner_name(seq),
            Err(AttributeError::UnknownOwner(_))
        ));
        // The name is free again.
        graph.declare_owner("Seq").expect("redeclare");
    }
}
