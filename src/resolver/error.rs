use thiserror::Error;

/// Malformed or unusable path expressions.
///
/// Resolution never surfaces these to callers: a bad expression resolves to
/// an absent value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("Empty path expression")]
    Empty,

    #[error("Empty segment in path '{path}'")]
    EmptySegment { path: String },

    #[error("Malformed segment '{segment}'")]
    MalformedSegment { segment: String },

    #[error("Invalid array index in segment '{segment}'")]
    BadIndex { segment: String },

    #[error("Index in segment '{segment}' is too far past the end of the array")]
    IndexTooLarge { segment: String },

    #[error("Malformed function call '{expr}'")]
    MalformedCall { expr: String },

    #[error("Malformed condition '{condition}'")]
    MalformedCondition { condition: String },

    #[error("Cannot descend into {found} at segment '{segment}'")]
    TypeMismatch { segment: String, found: &'static str },
}
