use thiserror::Error;

/// Failures raised while encoding a value graph or decoding message text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodingError {
    #[error("Parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("Unresolved reference {id} at offset {offset}")]
    UnresolvedReference { id: i64, offset: usize },

    #[error("No conversion adaptor registered for type: {0}")]
    UnsupportedType(String),

    #[error("Conversion failed for type {type_name}: {message}")]
    Conversion { type_name: String, message: String },

    #[error("Non-finite number cannot be encoded: {0}")]
    NonFiniteNumber(f64),

    #[error("Object keys collide with a reserved envelope: {0}")]
    ReservedKeys(String),

    #[error("Value nests deeper than {0} levels")]
    NestingTooDeep(usize),
}

impl CodingError {
    pub(crate) fn parse(offset: usize, message: impl Into<String>) -> Self {
        CodingError::Parse {
            offset,
            message: message.into(),
        }
    }

    pub fn conversion(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        CodingError::Conversion {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// True for malformed input text, including dangling references.
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            CodingError::Parse { .. } | CodingError::UnresolvedReference { .. }
        )
    }
}
