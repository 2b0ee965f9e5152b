//! Parser error types

use serde::Serialize;
use thiserror::Error;

use crate::position::Position;

/// Parser result type
pub type SaxResult<T> = Result<T, ParseError>;

/// Classification of a [`ParseError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// A character that is not valid in the current state
    UnexpectedCharacter,
    /// End of input inside a tag, comment, CDATA section or declaration
    UnterminatedToken,
    /// A close tag that does not match the innermost open element
    MismatchedCloseTag,
    /// A numeric reference to a code point the markup does not allow
    InvalidCharacterReference,
    /// A named reference missing from the entity table
    UndefinedEntity,
    /// An accumulating token outgrew `max_buffer_length`
    BufferLimitExceeded,
    /// `write`/`close`/`reset` called from inside an event callback
    ReentrancyViolation,
    /// End of input with elements still open
    UnclosedElement,
    /// The same attribute given twice on one element
    DuplicateAttribute,
    /// A namespace prefix with no binding in scope
    UnboundPrefix,
    /// An attempt to rebind `xml` or `xmlns`
    ReservedPrefix,
    /// A qualified name with an empty prefix or local part
    MalformedName,
    /// Content that is legal markup but not at this place in a document
    MisplacedMarkup,
    /// Byte input that is not valid UTF-8
    InvalidEncoding,
    /// Input after `close()`
    ParserClosed,
}

impl ErrorKind {
    /// Whether this kind halts the parser even in permissive mode
    pub fn is_always_fatal(self) -> bool {
        matches!(
            self,
            Self::BufferLimitExceeded | Self::ReentrancyViolation | Self::InvalidEncoding
        )
    }
}

/// An error raised while tokenizing
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{message} at {line}:{column}")]
#[serde(rename_all = "camelCase")]
pub struct ParseError {
    pub kind: ErrorKind,
    pub message: String,
    pub line: u32,
    pub column: u32,
    pub byte_offset: u64,
}

impl ParseError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, position: Position) -> Self {
        Self {
            kind,
            message: message.into(),
            line: position.line,
            column: position.column,
            byte_offset: position.byte_offset,
        }
    }

    /// Get the source position of this error
    pub fn position(&self) -> Position {
        Position::new(self.line, self.column, self.byte_offset)
    }
}

/// Entity resolution errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    #[error("undefined entity: &{0};")]
    Undefined(String),

    #[error("invalid character reference: &#{0};")]
    InvalidCharacterReference(String),
}

impl EntityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Undefined(_) => ErrorKind::UndefinedEntity,
            Self::InvalidCharacterReference(_) => ErrorKind::InvalidCharacterReference,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ParseError::new(
            ErrorKind::MismatchedCloseTag,
            "unexpected close tag </a>",
            Position::new(3, 7, 42),
        );
        assert_eq!(err.to_string(), "unexpected close tag </a> at 3:7");
        assert_eq!(err.position(), Position::new(3, 7, 42));
    }

    #[test]
    fn test_always_fatal() {
        assert!(ErrorKind::BufferLimitExceeded.is_always_fatal());
        assert!(ErrorKind::ReentrancyViolation.is_always_fatal());
        assert!(!ErrorKind::UndefinedEntity.is_always_fatal());
        assert!(!ErrorKind::MismatchedCloseTag.is_always_fatal());
    }

    #[test]
    fn test_entity_error_kind() {
        let err = EntityError::Undefined("foo".into());
        assert_eq!(err.kind(), ErrorKind::UndefinedEntity);
        assert_eq!(err.to_string(), "undefined entity: &foo;");
    }
}
