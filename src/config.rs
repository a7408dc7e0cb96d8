use crate::error::Result;
use serde::Deserialize;

/// Options controlling how a `CostGraph` is built.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CostGraphConfig {
    /// Whether to contract following nodes into the nodes they follow.
    pub simplify: bool,
    /// Maximum allowed difference between the communication costs
    /// of matching strategies in an associative pair.
    pub associative_cost_tolerance: f64,
}

impl Default for CostGraphConfig {
    fn default() -> Self {
        Self {
            simplify: true,
            associative_cost_tolerance: 1e-6,
        }
    }
}

impl CostGraphConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config = CostGraphConfig::from_json(r#"{ "simplify": false }"#).unwrap();
        assert_eq!(
            config,
            CostGraphConfig {
                simplify: false,
                ..Default::default()
            }
        );
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(CostGraphConfig::from_json(r#"{ "simplfy": false }"#).is_err());
    }
}
