use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Behaviour knobs for an `AttributeGraph`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    /// Treat infinite or NaN results as evaluation failures.
    pub reject_non_finite: bool,
    /// Upper bound accepted by `set_differentiation`.
    pub max_differentiation_order: u32,
    /// Verbosity used by `bind_default`.
    pub verbose_binding: bool,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            reject_non_finite: true,
            max_differentiation_order: 8,
            verbose_binding: true,
        }
    }
}

impl GraphSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_differentiation_order == 0 {
            bail!("max_differentiation_order must be greater than zero.");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::GraphSettings;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let settings: GraphSettings =
            serde_json::from_str(r#"{ "reject_non_finite": false }"#).expect("settings parse");
        assert!(!settings.reject_non_finite);
        assert_eq!(settings.max_differentiation_order, 8);
        assert!(settings.verbose_binding);
        settings.validate().expect("defaults are valid");
    }

    #[test]
    fn zero_differentiation_bound_is_invalid() {
        let settings = GraphSettings {
            max_differentiation_order: 0,
            ..GraphSettings::default()
        };
        let err = settings.validate().expect_err("zero bound");
        assert!(format!("{err}").contains("max_differentiation_order"));
    }
}
