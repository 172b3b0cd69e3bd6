use thiserror::Error;

/// Errors raised while decoding a single `DUMP` line.
///
/// Offsets are byte offsets into the property blob of the offending line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Line has no indentation-stripped content")]
    EmptyLine,
    #[error("Missing '@' between class name and hash code")]
    MissingClassDelimiter,
    #[error("Missing hash code after '@'")]
    MissingHashCode,
    #[error("Malformed property at offset {offset}")]
    MalformedProperty { offset: usize },
    #[error("Invalid property length at offset {offset}")]
    InvalidLength { offset: usize },
    #[error("Value of property '{name}' is shorter than its declared length {length}")]
    ValueOutOfBounds { name: String, length: usize },
    #[error("Line would start a second root node")]
    MultipleRoots,
}
