//! Event emission
//!
//! The tokenizer reports what it recognizes through a [`Sink`]. Implement the
//! callbacks you care about; every method defaults to a no-op. For a typed
//! event stream use [`EventRecorder`], which stores each callback as an
//! [`Event`].

use serde::Serialize;
use smallvec::SmallVec;

use crate::error::ParseError;
use crate::namespace::{NamespaceBinding, ResolvedName};

/// One attribute of an element
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribute {
    /// Qualified name as written (after case folding)
    pub name: String,
    /// Value with references resolved
    pub value: String,
    /// Namespace mode only
    pub ns: Option<ResolvedName>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ns: None,
        }
    }
}

pub type Attributes = SmallVec<[Attribute; 4]>;

/// A completed open tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenTag {
    pub name: String,
    pub ns: Option<ResolvedName>,
    pub attributes: Attributes,
    pub self_closing: bool,
}

impl OpenTag {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }
}

/// A closed element; synthesized for self-closing tags and auto-closing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CloseTag {
    pub name: String,
    pub ns: Option<ResolvedName>,
}

/// `<?target body?>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingInstruction {
    pub target: String,
    pub body: String,
}

/// `<?xml version="1.0" encoding="UTF-8" standalone="yes"?>`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct XmlDeclaration {
    pub version: Option<String>,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

/// Receiver of tokenizer events
#[allow(unused_variables)]
pub trait Sink {
    fn on_xml_declaration(&mut self, decl: &XmlDeclaration) {}

    /// Character data, coalesced per run
    fn on_text(&mut self, text: &str) {}

    fn on_comment(&mut self, text: &str) {}

    fn on_cdata_open(&mut self) {}

    fn on_cdata_text(&mut self, text: &str) {}

    fn on_cdata_close(&mut self) {}

    fn on_processing_instruction(&mut self, pi: &ProcessingInstruction) {}

    /// Everything between `<!DOCTYPE` and the closing `>`, leading blanks removed
    fn on_doctype(&mut self, text: &str) {}

    /// An unrecognized `<!...>` declaration
    fn on_sgml_declaration(&mut self, text: &str) {}

    /// Tag name is known, attributes are not parsed yet.
    ///
    /// If input ends inside the tag, this and the attributes seen so far are
    /// followed by an `UnterminatedToken` error and no `on_open_tag_end`.
    fn on_open_tag_start(&mut self, name: &str) {}

    fn on_attribute(&mut self, attr: &Attribute) {}

    fn on_open_tag_end(&mut self, tag: &OpenTag) {}

    fn on_close_tag(&mut self, tag: &CloseTag) {}

    fn on_open_namespace(&mut self, binding: &NamespaceBinding) {}

    fn on_close_namespace(&mut self, binding: &NamespaceBinding) {}

    fn on_error(&mut self, error: &ParseError) {}

    fn on_end(&mut self) {}
}

/// A sink that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl Sink for NullSink {}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn on_xml_declaration(&mut self, decl: &XmlDeclaration) {
        (**self).on_xml_declaration(decl)
    }
    fn on_text(&mut self, text: &str) {
        (**self).on_text(text)
    }
    fn on_comment(&mut self, text: &str) {
        (**self).on_comment(text)
    }
    fn on_cdata_open(&mut self) {
        (**self).on_cdata_open()
    }
    fn on_cdata_text(&mut self, text: &str) {
        (**self).on_cdata_text(text)
    }
    fn on_cdata_close(&mut self) {
        (**self).on_cdata_close()
    }
    fn on_processing_instruction(&mut self, pi: &ProcessingInstruction) {
        (**self).on_processing_instruction(pi)
    }
    fn on_doctype(&mut self, text: &str) {
        (**self).on_doctype(text)
    }
    fn on_sgml_declaration(&mut self, text: &str) {
        (**self).on_sgml_declaration(text)
    }
    fn on_open_tag_start(&mut self, name: &str) {
        (**self).on_open_tag_start(name)
    }
    fn on_attribute(&mut self, attr: &Attribute) {
        (**self).on_attribute(attr)
    }
    fn on_open_tag_end(&mut self, tag: &OpenTag) {
        (**self).on_open_tag_end(tag)
    }
    fn on_close_tag(&mut self, tag: &CloseTag) {
        (**self).on_close_tag(tag)
    }
    fn on_open_namespace(&mut self, binding: &NamespaceBinding) {
        (**self).on_open_namespace(binding)
    }
    fn on_close_namespace(&mut self, binding: &NamespaceBinding) {
        (**self).on_close_namespace(binding)
    }
    fn on_error(&mut self, error: &ParseError) {
        (**self).on_error(error)
    }
    fn on_end(&mut self) {
        (**self).on_end()
    }
}

/// Owned form of every sink callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Event {
    XmlDeclaration(XmlDeclaration),
    Text(String),
    Comment(String),
    CDataOpen,
    CDataText(String),
    CDataClose,
    ProcessingInstruction(ProcessingInstruction),
    Doctype(String),
    SgmlDeclaration(String),
    OpenTagStart(String),
    Attribute(Attribute),
    OpenTagEnd(OpenTag),
    CloseTag(CloseTag),
    OpenNamespace(NamespaceBinding),
    CloseNamespace(NamespaceBinding),
    Error(ParseError),
    End,
}

/// Collects events in order
#[derive(Debug, Default, Clone)]
pub struct EventRecorder {
    pub events: Vec<Event>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    /// Errors reported so far
    pub fn errors(&self) -> impl Iterator<Item = &ParseError> {
        self.events.iter().filter_map(|e| match e {
            Event::Error(err) => Some(err),
            _ => None,
        })
    }

    /// Concatenated text content
    pub fn text(&self) -> String {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Text(t) | Event::CDataText(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Sink for EventRecorder {
    fn on_xml_declaration(&mut self, decl: &XmlDeclaration) {
        self.events.push(Event::XmlDeclaration(decl.clone()));
    }
    fn on_text(&mut self, text: &str) {
        self.events.push(Event::Text(text.to_string()));
    }
    fn on_comment(&mut self, text: &str) {
        self.events.push(Event::Comment(text.to_string()));
    }
    fn on_cdata_open(&mut self) {
        self.events.push(Event::CDataOpen);
    }
    fn on_cdata_text(&mut self, text: &str) {
        self.events.push(Event::CDataText(text.to_string()));
    }
    fn on_cdata_close(&mut self) {
        self.events.push(Event::CDataClose);
    }
    fn on_processing_instruction(&mut self, pi: &ProcessingInstruction) {
        self.events.push(Event::ProcessingInstruction(pi.clone()));
    }
    fn on_doctype(&mut self, text: &str) {
        self.events.push(Event::Doctype(text.to_string()));
    }
    fn on_sgml_declaration(&mut self, text: &str) {
        self.events.push(Event::SgmlDeclaration(text.to_string()));
    }
    fn on_open_tag_start(&mut self, name: &str) {
        self.events.push(Event::OpenTagStart(name.to_string()));
    }
    fn on_attribute(&mut self, attr: &Attribute) {
        self.events.push(Event::Attribute(attr.clone()));
    }
    fn on_open_tag_end(&mut self, tag: &OpenTag) {
        self.events.push(Event::OpenTagEnd(tag.clone()));
    }
    fn on_close_tag(&mut self, tag: &CloseTag) {
        self.events.push(Event::CloseTag(tag.clone()));
    }
    fn on_open_namespace(&mut self, binding: &NamespaceBinding) {
        self.events.push(Event::OpenNamespace(binding.clone()));
    }
    fn on_close_namespace(&mut self, binding: &NamespaceBinding) {
        self.events.push(Event::CloseNamespace(binding.clone()));
    }
    fn on_error(&mut self, error: &ParseError) {
        self.events.push(Event::Error(error.clone()));
    }
    fn on_end(&mut self) {
        self.events.push(Event::End);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::position::Position;

    #[test]
    fn test_recorder_through_mut_ref() {
        let mut recorder = EventRecorder::new();
        {
            let mut sink = &mut recorder;
            sink.on_open_tag_start("a");
            sink.on_text("hi");
            sink.on_end();
        }
        assert_eq!(
            recorder.events,
            vec![Event::OpenTagStart("a".into()), Event::Text("hi".into()), Event::End]
        );
    }

    #[test]
    fn test_recorder_helpers() {
        let mut recorder = EventRecorder::new();
        recorder.on_text("a");
        recorder.on_cdata_text("b");
        recorder.on_error(&ParseError::new(
            ErrorKind::UndefinedEntity,
            "undefined entity",
            Position::default(),
        ));
        assert_eq!(recorder.text(), "ab");
        assert_eq!(recorder.errors().count(), 1);
    }

    #[test]
    fn test_open_tag_attribute_lookup() {
        let tag = OpenTag {
            name: "a".into(),
            ns: None,
            attributes: [Attribute::new("href", "x")].into_iter().collect(),
            self_closing: false,
        };
        assert_eq!(tag.attribute("href"), Some("x"));
        assert_eq!(tag.attribute("id"), None);
    }

    #[test]
    fn test_null_sink_accepts_everything() {
        let mut sink = NullSink;
        sink.on_text("ignored");
        sink.on_end();
    }
}
