//! Namespace resolution
//!
//! A stack of prefix bindings mirroring element nesting. Every element opened
//! in namespace mode pushes one scope holding the `xmlns` declarations it
//! carries; lookups walk from the innermost scope outwards and end at a root
//! scope that always binds `xml` and `xmlns`.

use serde::Serialize;
use smallvec::SmallVec;
use thiserror::Error;

use crate::error::ErrorKind;

pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// A prefix bound to a namespace URI. The default namespace has prefix `""`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceBinding {
    pub prefix: String,
    pub uri: String,
}

impl NamespaceBinding {
    pub fn new(prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            uri: uri.into(),
        }
    }
}

/// A qualified name split and resolved against the scope it appeared in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedName {
    pub prefix: String,
    pub local: String,
    /// `None` for unprefixed attributes, and for unbound prefixes
    pub uri: Option<String>,
}

/// Namespace errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamespaceError {
    #[error("malformed qualified name: {0}")]
    MalformedName(String),

    #[error("unbound namespace prefix: {0}")]
    Unbound(String),

    #[error("prefix {prefix:?} cannot be bound to {uri:?}")]
    Reserved { prefix: String, uri: String },
}

impl NamespaceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedName(_) => ErrorKind::MalformedName,
            Self::Unbound(_) => ErrorKind::UnboundPrefix,
            Self::Reserved { .. } => ErrorKind::ReservedPrefix,
        }
    }
}

/// Split `name` at its colon into `(prefix, local)`.
///
/// Unprefixed names yield an empty prefix. Empty halves and a second colon
/// are rejected.
pub fn split_qname(name: &str) -> Result<(&str, &str), NamespaceError> {
    match name.split_once(':') {
        None => Ok(("", name)),
        Some((prefix, local)) => {
            if prefix.is_empty() || local.is_empty() || local.contains(':') {
                Err(NamespaceError::MalformedName(name.to_string()))
            } else {
                Ok((prefix, local))
            }
        }
    }
}

/// Bindings declared by one element
pub type Frame = SmallVec<[NamespaceBinding; 2]>;

/// Prefix bindings per open element
#[derive(Debug, Clone)]
pub struct NamespaceScopes {
    root: Frame,
    frames: Vec<Frame>,
}

impl NamespaceScopes {
    pub fn new() -> Self {
        let mut root = Frame::new();
        root.push(NamespaceBinding::new("xml", XML_NAMESPACE));
        root.push(NamespaceBinding::new("xmlns", XMLNS_NAMESPACE));
        Self {
            root,
            frames: Vec::new(),
        }
    }

    /// Root scope with `extra` bindings next to the predefined ones
    pub fn with_bindings<'a, I>(extra: I) -> Result<Self, NamespaceError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut scopes = Self::new();
        for (prefix, uri) in extra {
            check_reserved(prefix, uri)?;
            if prefix != "xml" {
                scopes.root.push(NamespaceBinding::new(prefix, uri));
            }
        }
        Ok(scopes)
    }

    /// Open the scope of a new element
    pub fn push_scope(&mut self) {
        self.frames.push(Frame::new());
    }

    /// Discard the innermost element scope, returning what it declared
    pub fn pop_scope(&mut self) -> Frame {
        self.frames.pop().unwrap_or_default()
    }

    /// Number of open element scopes
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Bind `prefix` in the innermost element scope, or in the root scope
    /// while no element is open.
    ///
    /// An empty `uri` undeclares the prefix for the rest of the scope.
    /// Rebinding `xml` to its own URI is accepted and changes nothing.
    pub fn bind_prefix(&mut self, prefix: &str, uri: &str) -> Result<(), NamespaceError> {
        check_reserved(prefix, uri)?;
        if prefix == "xml" {
            return Ok(());
        }
        let frame = self.frames.last_mut().unwrap_or(&mut self.root);
        log::trace!("bind namespace prefix {:?} -> {:?}", prefix, uri);
        match frame.iter_mut().find(|b| b.prefix == prefix) {
            Some(existing) => existing.uri = uri.to_string(),
            None => frame.push(NamespaceBinding::new(prefix, uri)),
        }
        Ok(())
    }

    /// Bindings declared by the innermost element
    pub fn current_bindings(&self) -> &[NamespaceBinding] {
        self.frames.last().map(|f| f.as_slice()).unwrap_or(&[])
    }

    /// Look `prefix` up from the innermost scope outwards
    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        self.frames
            .iter()
            .rev()
            .chain(std::iter::once(&self.root))
            .flat_map(|frame| frame.iter().rev())
            .find(|binding| binding.prefix == prefix)
            .and_then(|binding| {
                if binding.uri.is_empty() {
                    None
                } else {
                    Some(binding.uri.as_str())
                }
            })
    }

    /// Resolve an element name: unprefixed names take the default namespace
    pub fn resolve_element(&self, name: &str) -> Result<ResolvedName, NamespaceError> {
        let (prefix, local) = split_qname(name)?;
        let uri = self.resolve(prefix).map(str::to_string);
        if !prefix.is_empty() && uri.is_none() {
            return Err(NamespaceError::Unbound(prefix.to_string()));
        }
        Ok(ResolvedName {
            prefix: prefix.to_string(),
            local: local.to_string(),
            uri,
        })
    }

    /// Resolve an attribute name: unprefixed attributes have no namespace
    /// except `xmlns` itself
    pub fn resolve_attribute(&self, name: &str) -> Result<ResolvedName, NamespaceError> {
        let (prefix, local) = split_qname(name)?;
        let uri = if prefix.is_empty() {
            (name == "xmlns").then(|| XMLNS_NAMESPACE.to_string())
        } else {
            let uri = self.resolve(prefix).map(str::to_string);
            if uri.is_none() {
                return Err(NamespaceError::Unbound(prefix.to_string()));
            }
            uri
        };
        Ok(ResolvedName {
            prefix: prefix.to_string(),
            local: local.to_string(),
            uri,
        })
    }
}

impl Default for NamespaceScopes {
    fn default() -> Self {
        Self::new()
    }
}

fn check_reserved(prefix: &str, uri: &str) -> Result<(), NamespaceError> {
    let reserved = match prefix {
        "xml" => uri != XML_NAMESPACE,
        "xmlns" => true,
        _ => uri == XML_NAMESPACE || uri == XMLNS_NAMESPACE,
    };
    if reserved {
        Err(NamespaceError::Reserved {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_qname() {
        assert_eq!(split_qname("a"), Ok(("", "a")));
        assert_eq!(split_qname("p:a"), Ok(("p", "a")));
        assert!(split_qname(":a").is_err());
        assert!(split_qname("p:").is_err());
        assert!(split_qname("p:a:b").is_err());
    }

    #[test]
    fn test_predefined_bindings() {
        let scopes = NamespaceScopes::new();
        assert_eq!(scopes.resolve("xml"), Some(XML_NAMESPACE));
        assert_eq!(scopes.resolve("xmlns"), Some(XMLNS_NAMESPACE));
        assert_eq!(scopes.resolve("p"), None);
        assert_eq!(scopes.resolve(""), None);
    }

    #[test]
    fn test_scoping_and_shadowing() {
        let mut scopes = NamespaceScopes::new();
        scopes.push_scope();
        scopes.bind_prefix("p", "u").unwrap();
        scopes.push_scope();
        assert_eq!(scopes.resolve("p"), Some("u"));
        scopes.bind_prefix("p", "v").unwrap();
        assert_eq!(scopes.resolve("p"), Some("v"));

        let popped = scopes.pop_scope();
        assert_eq!(popped.as_slice(), &[NamespaceBinding::new("p", "v")]);
        assert_eq!(scopes.resolve("p"), Some("u"));

        scopes.pop_scope();
        assert_eq!(scopes.resolve("p"), None);
        assert_eq!(scopes.depth(), 0);
    }

    #[test]
    fn test_binding_without_open_element_goes_to_root() {
        let mut scopes = NamespaceScopes::new();
        scopes.bind_prefix("p", "u").unwrap();
        assert!(scopes.pop_scope().is_empty());
        assert_eq!(scopes.resolve("p"), Some("u"));
        assert_eq!(scopes.resolve("xml"), Some(XML_NAMESPACE));
        assert_eq!(
            scopes.bind_prefix("xmlns", "u").unwrap_err().kind(),
            ErrorKind::ReservedPrefix
        );
    }

    #[test]
    fn test_reserved_prefixes() {
        let mut scopes = NamespaceScopes::new();
        scopes.push_scope();
        assert!(scopes.bind_prefix("xml", "http://example.com").is_err());
        assert!(scopes.bind_prefix("xml", XML_NAMESPACE).is_ok());
        assert!(scopes.bind_prefix("xmlns", XMLNS_NAMESPACE).is_err());
        assert!(scopes.bind_prefix("p", XMLNS_NAMESPACE).is_err());
        assert!(scopes.current_bindings().is_empty());
    }

    #[test]
    fn test_default_namespace_undeclared() {
        let mut scopes = NamespaceScopes::new();
        scopes.push_scope();
        scopes.bind_prefix("", "urn:outer").unwrap();
        scopes.push_scope();
        scopes.bind_prefix("", "").unwrap();
        assert_eq!(scopes.resolve(""), None);
        let name = scopes.resolve_element("a").unwrap();
        assert_eq!(name.uri, None);
    }

    #[test]
    fn test_resolve_names() {
        let mut scopes = NamespaceScopes::with_bindings([("svg", "urn:svg")]).unwrap();
        scopes.push_scope();
        scopes.bind_prefix("", "urn:default").unwrap();

        let el = scopes.resolve_element("a").unwrap();
        assert_eq!(el.uri.as_deref(), Some("urn:default"));
        let el = scopes.resolve_element("svg:rect").unwrap();
        assert_eq!((el.prefix.as_str(), el.local.as_str()), ("svg", "rect"));
        assert_eq!(el.uri.as_deref(), Some("urn:svg"));

        // Default namespace does not apply to attributes
        assert_eq!(scopes.resolve_attribute("id").unwrap().uri, None);
        assert_eq!(
            scopes.resolve_attribute("xmlns").unwrap().uri.as_deref(),
            Some(XMLNS_NAMESPACE)
        );
        assert_eq!(
            scopes.resolve_attribute("q:id"),
            Err(NamespaceError::Unbound("q".into()))
        );
    }
}
