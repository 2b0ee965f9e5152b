//! Character classification
//!
//! Pure predicates over code points for the markup dialects in [`Syntax`].

use crate::options::Syntax;

/// XML `S`: space, tab, carriage return, line feed
pub fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// HTML whitespace additionally includes form feed
pub fn is_html_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0C')
}

pub fn is_quote(c: char) -> bool {
    c == '"' || c == '\''
}

/// XML 1.0 `Char`: `#x9 | #xA | #xD | [#x20-#xD7FF] | [#xE000-#xFFFD] | [#x10000-#x10FFFF]`
pub fn is_xml10_char(cp: u32) -> bool {
    matches!(cp, 0x09 | 0x0A | 0x0D | 0x20..=0xD7FF | 0xE000..=0xFFFD | 0x1_0000..=0x10_FFFF)
}

/// XML 1.1 `Char`: `[#x1-#xD7FF] | [#xE000-#xFFFD] | [#x10000-#x10FFFF]`
pub fn is_xml11_char(cp: u32) -> bool {
    matches!(cp, 0x01..=0xD7FF | 0xE000..=0xFFFD | 0x1_0000..=0x10_FFFF)
}

/// XML `NameStartChar` (shared by 1.0 Fifth Edition and 1.1)
pub fn is_name_start_char(c: char) -> bool {
    matches!(c,
        ':' | 'A'..='Z' | '_' | 'a'..='z' |
        '\u{C0}'..='\u{D6}' | '\u{D8}'..='\u{F6}' | '\u{F8}'..='\u{2FF}' |
        '\u{370}'..='\u{37D}' | '\u{37F}'..='\u{1FFF}' |
        '\u{200C}'..='\u{200D}' | '\u{2070}'..='\u{218F}' |
        '\u{2C00}'..='\u{2FEF}' | '\u{3001}'..='\u{D7FF}' |
        '\u{F900}'..='\u{FDCF}' | '\u{FDF0}'..='\u{FFFD}' |
        '\u{10000}'..='\u{EFFFF}'
    )
}

/// XML `NameChar`
pub fn is_name_char(c: char) -> bool {
    is_name_start_char(c)
        || matches!(c,
            '-' | '.' | '0'..='9' | '\u{B7}' |
            '\u{300}'..='\u{36F}' | '\u{203F}'..='\u{2040}'
        )
}

/// HTML tag and attribute names are anything up to a delimiter
fn is_html_name_char(c: char) -> bool {
    !is_html_whitespace(c) && !matches!(c, '/' | '>' | '=' | '<' | '"' | '\'' | '\0')
}

impl Syntax {
    /// First character of a tag, attribute or PI target name
    pub fn is_name_start(self, c: char) -> bool {
        match self {
            Self::Xml10 | Self::Xml11 => is_name_start_char(c),
            Self::Html => c.is_alphabetic() || c == '_' || c == ':',
        }
    }

    /// Subsequent characters of a name
    pub fn is_name_char(self, c: char) -> bool {
        match self {
            Self::Xml10 | Self::Xml11 => is_name_char(c),
            Self::Html => is_html_name_char(c),
        }
    }

    pub fn is_whitespace(self, c: char) -> bool {
        match self {
            Self::Xml10 | Self::Xml11 => is_whitespace(c),
            Self::Html => is_html_whitespace(c),
        }
    }

    /// Whether `c` may appear literally in character data
    pub fn is_char(self, c: char) -> bool {
        match self {
            Self::Xml10 => is_xml10_char(c as u32),
            Self::Xml11 => is_xml11_char(c as u32),
            Self::Html => true,
        }
    }

    /// Whether a character reference may denote `cp`
    pub fn allows_reference_to(self, cp: u32) -> bool {
        match self {
            Self::Xml10 => is_xml10_char(cp),
            // 1.1 admits the restricted C0/C1 controls through references
            Self::Xml11 => is_xml11_char(cp),
            Self::Html => true,
        }
    }
}
