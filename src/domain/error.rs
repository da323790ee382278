//! Domain error types.

/// Top-level error type for lookback.
#[derive(Debug, thiserror::Error)]
pub enum LookbackError {
    #[error("invalid argument in {context}: {reason}")]
    InvalidArgument { context: String, reason: String },

    #[error("invalid session: {reason}")]
    InvalidSession { reason: String },

    #[error("unknown interval: {name} must be one of {expected}")]
    UnknownInterval { name: String, expected: String },

    #[error("unknown operator: {name}")]
    UnknownOperator { name: String },

    #[error("unknown field: {name}")]
    UnknownField { name: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("bar data error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl LookbackError {
    pub(crate) fn invalid_argument(context: &str, reason: impl Into<String>) -> Self {
        LookbackError::InvalidArgument {
            context: context.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_session(reason: impl Into<String>) -> Self {
        LookbackError::InvalidSession {
            reason: reason.into(),
        }
    }

    /// Process exit status for this error category.
    pub fn exit_status(&self) -> u8 {
        match self {
            LookbackError::Io(_) => 1,
            LookbackError::ConfigParse { .. }
            | LookbackError::ConfigMissing { .. }
            | LookbackError::ConfigInvalid { .. } => 2,
            LookbackError::InvalidSession { .. } | LookbackError::UnknownInterval { .. } => 3,
            LookbackError::InvalidArgument { .. }
            | LookbackError::UnknownOperator { .. }
            | LookbackError::UnknownField { .. } => 4,
            LookbackError::Data { .. } => 5,
        }
    }
}

impl From<&LookbackError> for std::process::ExitCode {
    fn from(err: &LookbackError) -> Self {
        std::process::ExitCode::from(err.exit_status())
    }
}
