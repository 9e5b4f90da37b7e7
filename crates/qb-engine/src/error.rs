pub type QbResult<T> = Result<T, QbError>;

#[derive(Debug, thiserror::Error)]
pub enum QbError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported expression: unknown key {key:?} in {expression}")]
    UnsupportedExpression { key: String, expression: String },

    #[error("unsupported shape: {0}")]
    UnsupportedShape(String),

    #[error("can not compile {expression:?}: {message}")]
    Compile { expression: String, message: String },

    #[error("column {column:?} failed to evaluate {expression:?} on row {row}: {message}")]
    Evaluation {
        column: String,
        expression: String,
        row: String,
        message: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("can not remap {kind} {name:?}: no match in the source cube")]
    Remap { kind: &'static str, name: String },

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

impl QbError {
    pub(crate) fn compile(expression: impl Into<String>, message: impl Into<String>) -> Self {
        QbError::Compile {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// Errors caused by a malformed query descriptor rather than by the data.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            QbError::InvalidConfiguration(_) | QbError::Remap { .. }
        )
    }
}
