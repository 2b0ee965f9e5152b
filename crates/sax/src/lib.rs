//! Brackish SAX Parser
//!
//! Incremental, streaming markup tokenizer. Input arrives in chunks of any
//! size through `write`; events are delivered to a [`Sink`] as soon as each
//! token is complete, and `close` flushes and validates the end of input.
//!
//! ```
//! use brackish_sax::{parse_str, EventRecorder, ParserOptions};
//!
//! let recorder = parse_str("<a>hi</a>", ParserOptions::strict(), EventRecorder::new()).unwrap();
//! assert_eq!(recorder.text(), "hi");
//! ```

mod chars;
mod entities;
mod error;
mod events;
mod namespace;
mod options;
mod parser;
mod position;
mod tokenizer;

pub use chars::{is_name_char, is_name_start_char, is_whitespace, is_xml10_char, is_xml11_char};
pub use entities::{encode, resolve_numeric, EntityTable};
pub use error::{EntityError, ErrorKind, ParseError, SaxResult};
pub use events::{
    Attribute, Attributes, CloseTag, Event, EventRecorder, NullSink, OpenTag,
    ProcessingInstruction, Sink, XmlDeclaration,
};
pub use namespace::{
    split_qname, Frame, NamespaceBinding, NamespaceError, NamespaceScopes, ResolvedName,
    XMLNS_NAMESPACE, XML_NAMESPACE,
};
pub use options::{NameCase, ParserOptions, Syntax, DEFAULT_MAX_BUFFER_LENGTH};
pub use parser::{parse_str, Parser};
pub use position::Position;
pub use tokenizer::{ElementStackEntry, EntityContext, ParserState, Tokenizer};
