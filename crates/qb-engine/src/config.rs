use crate::error::{QbError, QbResult};
use serde::{Deserialize, Serialize};

/// Limits and defaults applied while running queries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Largest cube, in cells, a query may allocate.
    pub max_cube_cells: usize,
    /// `allowNulls` for edges that do not say.
    pub default_allow_nulls: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_cube_cells: 10_000_000,
            default_allow_nulls: false,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> QbResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> QbResult<()> {
        if self.max_cube_cells == 0 {
            return Err(QbError::InvalidConfiguration(
                "maxCubeCells must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_fields_take_defaults() {
        let config = EngineConfig::from_json_str(r#"{"maxCubeCells": 64}"#).unwrap();
        assert_eq!(
            config,
            EngineConfig {
                max_cube_cells: 64,
                ..EngineConfig::default()
            }
        );
    }

    #[test]
    fn zero_cells_is_rejected() {
        let err = EngineConfig::from_json_str(r#"{"maxCubeCells": 0}"#).unwrap_err();
        assert!(err.is_configuration_error());
        assert!(matches!(
            EngineConfig::from_json_str(r#"{"maxCubeCells": "x"}"#),
            Err(QbError::Json(_))
        ));
    }
}
