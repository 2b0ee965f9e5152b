//! Parser configuration

use serde::{Deserialize, Serialize};

/// Default cap for any single accumulating buffer, in bytes
pub const DEFAULT_MAX_BUFFER_LENGTH: usize = 64 * 1024;

/// Character rules the tokenizer follows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Syntax {
    /// XML 1.0 (Fifth Edition)
    #[default]
    Xml10,
    /// XML 1.1
    Xml11,
    /// Permissive HTML-style names and numeric references
    Html,
}

/// Case folding for tag and attribute names (permissive mode only)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameCase {
    #[default]
    Preserve,
    Lower,
    Upper,
}

impl NameCase {
    pub(crate) fn apply(self, name: &mut String) {
        match self {
            Self::Preserve => {}
            Self::Lower => name.make_ascii_lowercase(),
            Self::Upper => name.make_ascii_uppercase(),
        }
    }
}

/// Immutable parser configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParserOptions {
    /// Every grammar violation is fatal
    pub strict: bool,
    /// Resolve `prefix:local` names against `xmlns` declarations
    pub namespaces: bool,
    /// Input is a fragment: no single root element required
    pub fragment: bool,
    /// Largest size any pending token may reach
    pub max_buffer_length: usize,
    /// Maintain line/column/byte offset
    pub track_position: bool,
    /// Consult the HTML entity table and accept legacy references without `;`
    pub permissive_entities: bool,
    pub syntax: Syntax,
    /// Ignore the version given by an XML declaration
    pub force_syntax: bool,
    pub name_case: NameCase,
    pub case_insensitive_close: bool,
    /// Trim text and comment payloads
    pub trim: bool,
    /// Collapse whitespace runs in text and comments to one space
    pub normalize: bool,
    /// Count U+0085, U+2028 and U+2029 as line breaks
    pub unicode_line_separators: bool,
    /// Still report `xmlns` declarations as attributes in namespace mode
    pub expose_xmlns_attributes: bool,
    /// Surface tolerated violations through `on_error` in permissive mode
    pub report_leniencies: bool,
    /// Prefix bindings visible at the root scope
    pub additional_namespaces: Vec<(String, String)>,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            strict: true,
            namespaces: false,
            fragment: false,
            max_buffer_length: DEFAULT_MAX_BUFFER_LENGTH,
            track_position: true,
            permissive_entities: false,
            syntax: Syntax::Xml10,
            force_syntax: false,
            name_case: NameCase::Preserve,
            case_insensitive_close: false,
            trim: false,
            normalize: false,
            unicode_line_separators: false,
            expose_xmlns_attributes: true,
            report_leniencies: false,
            additional_namespaces: Vec::new(),
        }
    }
}

impl ParserOptions {
    /// Strict XML 1.0
    pub fn strict() -> Self {
        Self::default()
    }

    /// Recovering XML
    pub fn permissive() -> Self {
        Self { strict: false, ..Self::default() }
    }

    /// Recovering HTML: HTML entities, lowercase names, raw `script`/`style`
    pub fn html() -> Self {
        Self {
            strict: false,
            fragment: true,
            permissive_entities: true,
            syntax: Syntax::Html,
            name_case: NameCase::Lower,
            case_insensitive_close: true,
            ..Self::default()
        }
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_namespaces(mut self, namespaces: bool) -> Self {
        self.namespaces = namespaces;
        self
    }

    pub fn with_fragment(mut self, fragment: bool) -> Self {
        self.fragment = fragment;
        self
    }

    pub fn with_max_buffer_length(mut self, max: usize) -> Self {
        self.max_buffer_length = max;
        self
    }

    pub fn with_track_position(mut self, track: bool) -> Self {
        self.track_position = track;
        self
    }

    pub fn with_permissive_entities(mut self, permissive: bool) -> Self {
        self.permissive_entities = permissive;
        self
    }

    pub fn with_syntax(mut self, syntax: Syntax) -> Self {
        self.syntax = syntax;
        self
    }

    pub fn with_name_case(mut self, name_case: NameCase) -> Self {
        self.name_case = name_case;
        self
    }

    pub fn with_trim(mut self, trim: bool) -> Self {
        self.trim = trim;
        self
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn with_report_leniencies(mut self, report: bool) -> Self {
        self.report_leniencies = report;
        self
    }

    /// Pre-bind `prefix` to `uri` at the root scope
    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.additional_namespaces.push((prefix.into(), uri.into()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_strict_xml() {
        let opts = ParserOptions::default();
        assert!(opts.strict);
        assert!(!opts.namespaces);
        assert!(opts.track_position);
        assert_eq!(opts.syntax, Syntax::Xml10);
        assert_eq!(opts.max_buffer_length, DEFAULT_MAX_BUFFER_LENGTH);
    }

    #[test]
    fn test_builder() {
        let opts = ParserOptions::permissive()
            .with_namespaces(true)
            .with_max_buffer_length(16)
            .with_namespace("svg", "http://www.w3.org/2000/svg");
        assert!(!opts.strict);
        assert!(opts.namespaces);
        assert_eq!(opts.max_buffer_length, 16);
        assert_eq!(opts.additional_namespaces.len(), 1);
    }

    #[test]
    fn test_deserialize_partial_config() {
        let opts: ParserOptions =
            serde_json::from_str(r#"{"strict": false, "maxBufferLength": 128, "syntax": "Html"}"#)
                .unwrap();
        assert!(!opts.strict);
        assert_eq!(opts.max_buffer_length, 128);
        assert_eq!(opts.syntax, Syntax::Html);
        // Unlisted fields keep their defaults
        assert!(opts.track_position);
        assert!(opts.expose_xmlns_attributes);
    }

    #[test]
    fn test_name_case() {
        let mut name = String::from("DiV");
        NameCase::Lower.apply(&mut name);
        assert_eq!(name, "div");
        NameCase::Upper.apply(&mut name);
        assert_eq!(name, "DIV");
    }
}
