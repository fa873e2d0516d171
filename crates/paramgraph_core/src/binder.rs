use crate::error::AttributeError;
use crate::graph::{AttrId, AttributeGraph};
use crate::traits::{AlgebraEngine, EvalContext};
use crate::value::{DataType, PulseAxis};

/// Replaces every identifier token equal to `from` with `to`.
///
/// Identifiers embedded in longer identifiers (`a1` inside `a10`) and
/// exponent markers of numbers (`1e5`) are left alone. Returns the new text
/// and whether anything was replaced.
pub(crate) fn replace_identifier(text: &str, from: &str, to: &str) -> (String, bool) {
    let mut out = String::with_capacity(text.len());
    let mut replaced = false;
    let mut chars = text.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        let is_word = |ch: char| ch.is_alphanumeric() || ch == '_' || ch == '.';
        if !(c.is_alphanumeric() || c == '_') {
            out.push(c);
            continue;
        }
        let mut end = start + c.len_utf8();
        while let Some(&(i, next)) = chars.peek() {
            if !is_word(next) || (next == '.' && !c.is_ascii_digit()) {
                break;
            }
            end = i + next.len_utf8();
            chars.next();
        }
        let word = &text[start..end];
        if !c.is_ascii_digit() && word == from {
            out.push_str(to);
            replaced = true;
        } else {
            out.push_str(word);
        }
    }
    (out, replaced)
}

impl<E: AlgebraEngine> AttributeGraph<E> {
    /// Defines an attribute from configuration text.
    ///
    /// Text attributes store the text verbatim and axis attributes map it to a
    /// `PulseAxis`. Numeric attributes treat it as an expression in which
    /// `a1`, `a2`, ... refer to `candidates` by position; referenced
    /// candidates become subjects. The expression is evaluated once to
    /// validate it. Returns `false` if that fails, logging the reason when
    /// `verbose` is set.
    pub fn bind(
        &mut self,
        id: AttrId,
        expression: &str,
        candidates: &[AttrId],
        verbose: bool,
        ctx: &EvalContext<'_>,
    ) -> bool {
        match self.try_bind(id, expression, candidates, ctx) {
            Ok(()) => true,
            Err(err) => {
                if verbose {
                    log::warn!("Warning in {err}");
                }
                false
            }
        }
    }

    /// `bind` with the configured verbosity and an empty evaluation context.
    pub fn bind_default(&mut self, id: AttrId, expression: &str, candidates: &[AttrId]) -> bool {
        let verbose = self.settings.verbose_binding;
        self.bind(id, expression, candidates, verbose, &EvalContext::new())
    }

    /// Fallible form of `bind`.
    pub fn try_bind(
        &mut self,
        id: AttrId,
        expression: &str,
        candidates: &[AttrId],
        ctx: &EvalContext<'_>,
    ) -> Result<(), AttributeError> {
        match self.get(id)?.datatype() {
            DataType::Text => {
                return self.get_mut(id)?.store.write(expression.to_string());
            }
            DataType::Axis => {
                return self
                    .get_mut(id)?
                    .store
                    .write(PulseAxis::from_token(expression));
            }
            _ => {}
        }

        self.assign_symbol(id)?;

        let (mut text, _) = replace_identifier(expression, "step", "csgn");
        let complex = text.contains('I');

        self.clear_subjects(id)?;
        for (i, candidate) in candidates.iter().enumerate() {
            // Stale and non-numeric candidates leave their placeholder unresolved.
            if !self.get(*candidate).is_ok_and(|c| c.is_observable()) {
                continue;
            }
            let Ok(symbol) = self.symbol_name(*candidate) else {
                continue;
            };
            let (rewritten, replaced) = replace_identifier(&text, &format!("a{}", i + 1), &symbol);
            if !replaced {
                continue;
            }
            text = rewritten;
            self.attach_subject(id, *candidate)?;
        }

        let attribute = self.get_mut(id)?;
        attribute.complex = complex;
        attribute.expression = if text.trim().is_empty() {
            None
        } else {
            Some(text.clone())
        };
        log::trace!("attribute {} bound to '{}'", attribute.name, text);

        self.evaluate_expression(id, ctx).map_err(|err| {
            let reason = match err {
                AttributeError::Engine(engine) => engine.to_string(),
                other => other.to_string(),
            };
            let (owner, attribute) = self
                .get(id)
                .map(|a| {
                    (
                        self.owner_name(a.owner).unwrap_or_default().to_string(),
                        a.name.clone(),
                    )
                })
                .unwrap_or_default();
            AttributeError::Binding {
                owner,
                attribute,
                expression: text,
                reason,
            }
        })
    }

    /// Differentiate the expression `order` times with respect to the symbol
    /// `variable` before substitution. An order of zero disables it.
    pub fn set_differentiation(
        &mut self,
        id: AttrId,
        order: u32,
        variable: &str,
    ) -> Result<(), AttributeError> {
        let max = self.settings.max_differentiation_order;
        if order > max {
            return Err(AttributeError::DifferentiationOrder { order, max });
        }
        let attribute = self.get_mut(id)?;
        attribute.diff_order = order;
        attribute.diff_variable = (!variable.is_empty()).then(|| variable.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_whole_identifiers_only() {
        let (text, replaced) = replace_identifier("a1 + a10*a1", "a1", "P_x");
        assert!(replaced);
        assert_eq!(text, "P_x + a10*P_x");

        let (text, replaced) = replace_identifier("ba1 + a1_b", "a1", "P_x");
        assert!(!replaced);
        assert_eq!(text, "ba1 + a1_b");
    }

    #[test]
    fn leaves_numbers_alone() {
        let (text, replaced) = replace_identifier("1e5*e5 + 2.5e-3", "e5", "Q");
        assert!(replaced);
        assert_eq!(text, "1e5*Q + 2.5e-3");
    }

    #[test]
    fn step_becomes_csgn() {
        let (text, replaced) = replace_identifier("step(a1-2)*stepper", "step", "csgn");
        assert!(replaced);
        assert_eq!(text, "csgn(a1-2)*stepper");
    }

    #[test]
    fn text_and_axis_bind_without_edges() {
        let mut graph = AttributeGraph::new();
        let owner = graph.declare_owner("RF").expect("owner");
        let area = graph.declare(owner, "Area", DataType::Real).expect("declare");
        let label = graph.declare(owner, "Label", DataType::Text).expect("declare");
        let axis = graph.declare(owner, "Axis", DataType::Axis).expect("declare");
        let ctx = EvalContext::new();

        assert!(graph.bind(label, "a1 * 2", &[area], true, &ctx));
        assert_eq!(graph.read::<String>(label), Ok("a1 * 2".to_string()));
        assert!(graph.get(label).expect("label").subjects().is_empty());
        assert!(graph.get(label).expect("label").symbol().is_none());

        assert!(graph.bind(axis, "GY", &[], true, &ctx));
        assert_eq!(graph.read::<PulseAxis>(axis), Ok(PulseAxis::Gy));
        assert!(graph.bind(axis, "bogus", &[], true, &ctx));
        assert_eq!(graph.read::<PulseAxis>(axis), Ok(PulseAxis::Void));
        assert!(graph.get(area).expect("area").observers().is_empty());
    }

    #[test]
    fn differentiation_order_is_bounded() {
        let mut graph = AttributeGraph::new();
        let owner = graph.declare_owner("G").expect("owner");
        let id = graph.declare(owner, "Slope", DataType::Real).expect("declare");
        assert_eq!(
            graph.set_differentiation(id, 9, "G_x"),
            Err(AttributeError::DifferentiationOrder { order: 9, max: 8 })
        );
        graph.set_differentiation(id, 2, "G_x").expect("within bound");
        assert_eq!(
            graph.get(id).expect("slope").differentiation(),
            (2, Some("G_x"))
        );
    }
}
