use crate::error::{AttributeError, EngineError};
use crate::graph::{AttrId, AttributeGraph};
use crate::traits::{AlgebraEngine, EvalContext};
use num_complex::Complex64;
use std::collections::HashMap;

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

impl<E: AlgebraEngine> AttributeGraph<E> {
    /// Re-evaluates the attribute's expression from the current values of its
    /// subjects and stores the result. Literal attributes are left untouched.
    ///
    /// On failure the stored value is unchanged.
    pub fn evaluate(&mut self, id: AttrId, ctx: &EvalContext<'_>) -> Result<(), AttributeError> {
        self.evaluate_expression(id, ctx).inspect_err(|err| {
            let name = self.get(id).map(|a| a.name.clone()).unwrap_or_default();
            log::warn!("evaluation of attribute {name} failed: {err}");
        })
    }

    pub(crate) fn evaluate_expression(
        &mut self,
        id: AttrId,
        ctx: &EvalContext<'_>,
    ) -> Result<(), AttributeError> {
        let attribute = self.get(id)?;
        let Some(expression) = attribute.expression.as_deref() else {
            return Ok(());
        };

        let mut symbols = Vec::with_capacity(attribute.subjects.len());
        let mut values = Vec::with_capacity(attribute.subjects.len());
        for subject in &attribute.subjects {
            let Ok(subject) = self.get(*subject) else {
                continue;
            };
            if let (Some(symbol), Some(value)) = (subject.symbol.as_ref(), subject.store.numeric()) {
                symbols.push(symbol.clone());
                values.push(value);
            }
        }

        let mut expr = self.engine.parse(expression, &symbols)?;
        if attribute.diff_order > 0 {
            let variable = attribute
                .diff_variable
                .as_deref()
                .ok_or(EngineError::MissingDifferentiationVariable)?;
            expr = self
                .engine
                .differentiate(&expr, variable, attribute.diff_order)?;
        }
        let expr = self.engine.substitute(&expr, &symbols, &values);
        let z = self.engine.evaluate_numeric(&expr, ctx)?;

        if self.settings.reject_non_finite && !(z.re.is_finite() && z.im.is_finite()) {
            return Err(EngineError::NonFinite(z.to_string()).into());
        }

        let complex = attribute.complex;
        let attribute = self.get_mut(id)?;
        attribute.store.write_narrowed(z.re)?;
        if complex {
            let imaginary = Complex64::new(-0.5, 0.0) * Complex64::i() * (z - z.conj());
            attribute.imaginary = imaginary.re;
        }
        log::debug!("attribute {} evaluated to {}", attribute.name, z);
        Ok(())
    }

    /// Transitive observers of `root`, ordered so that every attribute comes
    /// after all of its subjects within the set. `root` itself is excluded.
    pub fn evaluation_order(&self, root: AttrId) -> Result<Vec<AttrId>, AttributeError> {
        let mut marks = HashMap::new();
        let mut post_order = Vec::new();
        self.visit(root, &mut marks, &mut post_order)?;
        post_order.pop();
        post_order.reverse();
        Ok(post_order)
    }

    fn visit(
        &self,
        id: AttrId,
        marks: &mut HashMap<AttrId, Mark>,
        post_order: &mut Vec<AttrId>,
    ) -> Result<(), AttributeError> {
        match marks.get(&id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(AttributeError::DependencyCycle(self.get(id)?.name.clone()))
            }
            None => {}
        }
        marks.insert(id, Mark::Visiting);
        for observer in &self.get(id)?.observers {
            self.visit(*observer, marks, post_order)?;
        }
        marks.insert(id, Mark::Done);
        post_order.push(id);
        Ok(())
    }

    /// Re-evaluates everything that depends on `root`, subjects first.
    /// Stops at the first failure.
    pub fn evaluate_dependents(
        &mut self,
        root: AttrId,
        ctx: &EvalContext<'_>,
    ) -> Result<(), AttributeError> {
        for id in self.evaluation_order(root)? {
            self.evaluate(id, ctx)?;
        }
        Ok(())
    }
}
