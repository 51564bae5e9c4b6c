use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CloneError {
    #[error("Cannot instantiate {type_name}: {cause}")]
    Instantiation { type_name: String, cause: String },
    #[error("Cannot access field {field} of {type_name}: {cause}")]
    FieldAccess {
        type_name: String,
        field: String,
        cause: String,
    },
    #[error("Clone depth limit of {limit} exceeded")]
    DepthExceeded { limit: usize },
    #[error("Config error: {0}")]
    Config(String),
}

impl CloneError {
    pub fn instantiation(type_name: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::Instantiation {
            type_name: type_name.into(),
            cause: cause.into(),
        }
    }
    pub fn field_access(
        type_name: impl Into<String>,
        field: impl Into<String>,
        cause: impl Into<String>,
    ) -> Self {
        Self::FieldAccess {
            type_name: type_name.into(),
            field: field.into(),
            cause: cause.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CloneError>;

// Helper conversions
impl From<config::ConfigError> for CloneError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
