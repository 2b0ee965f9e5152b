//! Entity and character reference resolution
//!
//! Named entities come from an [`EntityTable`]: the five XML built-ins, or
//! the HTML 4 set when permissive entities are enabled. Tables are built once
//! and shared, cloning one only bumps a reference count.

use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::{Arc, LazyLock};

use crate::error::EntityError;
use crate::options::{ParserOptions, Syntax};

/// The predefined XML entities
const XML_ENTITIES: [(&str, &str); 5] = [
    ("amp", "&"),
    ("lt", "<"),
    ("gt", ">"),
    ("quot", "\""),
    ("apos", "'"),
];

/// ISO 8859-1 names, in code point order from U+00A0
const LATIN1_NAMES: [&str; 96] = [
    "nbsp", "iexcl", "cent", "pound", "curren", "yen", "brvbar", "sect",
    "uml", "copy", "ordf", "laquo", "not", "shy", "reg", "macr",
    "deg", "plusmn", "sup2", "sup3", "acute", "micro", "para", "middot",
    "cedil", "sup1", "ordm", "raquo", "frac14", "frac12", "frac34", "iquest",
    "Agrave", "Aacute", "Acirc", "Atilde", "Auml", "Aring", "AElig", "Ccedil",
    "Egrave", "Eacute", "Ecirc", "Euml", "Igrave", "Iacute", "Icirc", "Iuml",
    "ETH", "Ntilde", "Ograve", "Oacute", "Ocirc", "Otilde", "Ouml", "times",
    "Oslash", "Ugrave", "Uacute", "Ucirc", "Uuml", "Yacute", "THORN", "szlig",
    "agrave", "aacute", "acirc", "atilde", "auml", "aring", "aelig", "ccedil",
    "egrave", "eacute", "ecirc", "euml", "igrave", "iacute", "icirc", "iuml",
    "eth", "ntilde", "ograve", "oacute", "ocirc", "otilde", "ouml", "divide",
    "oslash", "ugrave", "uacute", "ucirc", "uuml", "yacute", "thorn", "yuml",
];

/// The remaining HTML 4 entities (symbols, Greek, markup-significant)
const HTML_ENTITIES: &[(&str, u32)] = &[
    // Uppercase aliases browsers accept
    ("AMP", 38), ("LT", 60), ("GT", 62), ("QUOT", 34), ("COPY", 169), ("REG", 174),
    // Latin Extended and spacing modifiers
    ("OElig", 338), ("oelig", 339), ("Scaron", 352), ("scaron", 353), ("Yuml", 376),
    ("fnof", 402), ("circ", 710), ("tilde", 732),
    // Greek
    ("Alpha", 913), ("Beta", 914), ("Gamma", 915), ("Delta", 916), ("Epsilon", 917),
    ("Zeta", 918), ("Eta", 919), ("Theta", 920), ("Iota", 921), ("Kappa", 922),
    ("Lambda", 923), ("Mu", 924), ("Nu", 925), ("Xi", 926), ("Omicron", 927),
    ("Pi", 928), ("Rho", 929), ("Sigma", 931), ("Tau", 932), ("Upsilon", 933),
    ("Phi", 934), ("Chi", 935), ("Psi", 936), ("Omega", 937),
    ("alpha", 945), ("beta", 946), ("gamma", 947), ("delta", 948), ("epsilon", 949),
    ("zeta", 950), ("eta", 951), ("theta", 952), ("iota", 953), ("kappa", 954),
    ("lambda", 955), ("mu", 956), ("nu", 957), ("xi", 958), ("omicron", 959),
    ("pi", 960), ("rho", 961), ("sigmaf", 962), ("sigma", 963), ("tau", 964),
    ("upsilon", 965), ("phi", 966), ("chi", 967), ("psi", 968), ("omega", 969),
    ("thetasym", 977), ("upsih", 978), ("piv", 982),
    // General punctuation
    ("ensp", 8194), ("emsp", 8195), ("thinsp", 8201), ("zwnj", 8204), ("zwj", 8205),
    ("lrm", 8206), ("rlm", 8207), ("ndash", 8211), ("mdash", 8212), ("lsquo", 8216),
    ("rsquo", 8217), ("sbquo", 8218), ("ldquo", 8220), ("rdquo", 8221), ("bdquo", 8222),
    ("dagger", 8224), ("Dagger", 8225), ("bull", 8226), ("hellip", 8230), ("permil", 8240),
    ("prime", 8242), ("Prime", 8243), ("lsaquo", 8249), ("rsaquo", 8250), ("oline", 8254),
    ("frasl", 8260), ("euro", 8364),
    // Letterlike symbols and arrows
    ("image", 8465), ("weierp", 8472), ("real", 8476), ("trade", 8482), ("alefsym", 8501),
    ("larr", 8592), ("uarr", 8593), ("rarr", 8594), ("darr", 8595), ("harr", 8596),
    ("crarr", 8629), ("lArr", 8656), ("uArr", 8657), ("rArr", 8658), ("dArr", 8659),
    ("hArr", 8660),
    // Mathematical operators
    ("forall", 8704), ("part", 8706), ("exist", 8707), ("empty", 8709), ("nabla", 8711),
    ("isin", 8712), ("notin", 8713), ("ni", 8715), ("prod", 8719), ("sum", 8721),
    ("minus", 8722), ("lowast", 8727), ("radic", 8730), ("prop", 8733), ("infin", 8734),
    ("ang", 8736), ("and", 8743), ("or", 8744), ("cap", 8745), ("cup", 8746),
    ("int", 8747), ("there4", 8756), ("sim", 8764), ("cong", 8773), ("asymp", 8776),
    ("ne", 8800), ("equiv", 8801), ("le", 8804), ("ge", 8805), ("sub", 8834),
    ("sup", 8835), ("nsub", 8836), ("sube", 8838), ("supe", 8839), ("oplus", 8853),
    ("otimes", 8855), ("perp", 8869), ("sdot", 8901),
    // Miscellaneous technical and shapes
    ("lceil", 8968), ("rceil", 8969), ("lfloor", 8970), ("rfloor", 8971),
    ("lang", 9001), ("rang", 9002), ("loz", 9674),
    ("spades", 9824), ("clubs", 9827), ("hearts", 9829), ("diams", 9830),
];

/// Names that legacy HTML accepts without a terminating `;`
static LEGACY_NAMES: LazyLock<FxHashSet<&'static str>> = LazyLock::new(|| {
    let mut set: FxHashSet<&'static str> = LATIN1_NAMES.iter().copied().collect();
    set.extend(["amp", "lt", "gt", "quot", "AMP", "LT", "GT", "QUOT", "COPY", "REG"]);
    set
});

static XML_TABLE: LazyLock<EntityTable> =
    LazyLock::new(|| EntityTable::from_entries(xml_entries(), false));

static HTML_TABLE: LazyLock<EntityTable> = LazyLock::new(|| {
    let mut entries = xml_entries();
    for (i, name) in LATIN1_NAMES.iter().enumerate() {
        if let Some(c) = char::from_u32(0xA0 + i as u32) {
            entries.insert((*name).into(), c.to_string().into());
        }
    }
    for &(name, cp) in HTML_ENTITIES {
        if let Some(c) = char::from_u32(cp) {
            entries.insert(name.into(), c.to_string().into());
        }
    }
    EntityTable::from_entries(entries, true)
});

fn xml_entries() -> FxHashMap<Box<str>, Box<str>> {
    XML_ENTITIES
        .iter()
        .map(|&(name, value)| (name.into(), value.into()))
        .collect()
}

/// Immutable map from entity name to replacement text
#[derive(Debug, Clone)]
pub struct EntityTable {
    entries: Arc<FxHashMap<Box<str>, Box<str>>>,
    legacy: bool,
}

impl EntityTable {
    fn from_entries(entries: FxHashMap<Box<str>, Box<str>>, legacy: bool) -> Self {
        Self {
            entries: Arc::new(entries),
            legacy,
        }
    }

    /// The five XML built-ins
    pub fn xml() -> Self {
        XML_TABLE.clone()
    }

    /// XML built-ins plus the HTML 4 named entities
    pub fn html() -> Self {
        HTML_TABLE.clone()
    }

    /// The table a parser configured with `options` starts from
    pub fn for_options(options: &ParserOptions) -> Self {
        if options.permissive_entities {
            Self::html()
        } else {
            Self::xml()
        }
    }

    /// A new table with `extra` added on top of this one
    pub fn extended<I, K, V>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Box<str>>,
        V: Into<Box<str>>,
    {
        let mut entries = (*self.entries).clone();
        entries.extend(extra.into_iter().map(|(k, v)| (k.into(), v.into())));
        Self::from_entries(entries, self.legacy)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|v| &**v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a named entity (case-sensitive)
    pub fn resolve(&self, name: &str) -> Result<&str, EntityError> {
        self.get(name)
            .ok_or_else(|| EntityError::Undefined(name.to_string()))
    }

    /// Longest legacy entity name that prefixes `name`.
    ///
    /// Returns the matched length in bytes and the replacement. Only tables
    /// carrying the HTML set take part in semicolon-less matching.
    pub fn longest_legacy_prefix(&self, name: &str) -> Option<(usize, &str)> {
        if !self.legacy {
            return None;
        }
        (1..=name.len())
            .rev()
            .filter(|&end| name.is_char_boundary(end))
            .find_map(|end| {
                let candidate = &name[..end];
                if LEGACY_NAMES.contains(candidate) {
                    self.get(candidate).map(|value| (end, value))
                } else {
                    None
                }
            })
    }
}

impl Default for EntityTable {
    fn default() -> Self {
        Self::xml()
    }
}

/// Resolve the digits of a numeric character reference.
///
/// `text` excludes the `&#`, the `x` marker and the `;`.
pub fn resolve_numeric(text: &str, is_hex: bool, syntax: Syntax) -> Result<char, EntityError> {
    let radix = if is_hex { 16 } else { 10 };
    let literal = || {
        if is_hex {
            format!("x{}", text)
        } else {
            text.to_string()
        }
    };

    if text.is_empty() || !text.chars().all(|c| c.is_digit(radix)) {
        return Err(EntityError::InvalidCharacterReference(literal()));
    }

    let value = match u32::from_str_radix(text, radix) {
        Ok(value) => value,
        // Too many digits for u32, far beyond U+10FFFF
        Err(_) if syntax == Syntax::Html => return Ok('\u{FFFD}'),
        Err(_) => return Err(EntityError::InvalidCharacterReference(literal())),
    };

    if syntax == Syntax::Html {
        return Ok(decode_html_numeric(value));
    }

    if syntax.allows_reference_to(value) {
        char::from_u32(value).ok_or_else(|| EntityError::InvalidCharacterReference(literal()))
    } else {
        Err(EntityError::InvalidCharacterReference(literal()))
    }
}

/// HTML numeric reference rules: substitutions instead of failures
fn decode_html_numeric(value: u32) -> char {
    let value = match value {
        0x00 => 0xFFFD,
        // Windows-1252 code points living in the C1 range
        0x80 => 0x20AC,
        0x82 => 0x201A,
        0x83 => 0x0192,
        0x84 => 0x201E,
        0x85 => 0x2026,
        0x86 => 0x2020,
        0x87 => 0x2021,
        0x88 => 0x02C6,
        0x89 => 0x2030,
        0x8A => 0x0160,
        0x8B => 0x2039,
        0x8C => 0x0152,
        0x8E => 0x017D,
        0x91 => 0x2018,
        0x92 => 0x2019,
        0x93 => 0x201C,
        0x94 => 0x201D,
        0x95 => 0x2022,
        0x96 => 0x2013,
        0x97 => 0x2014,
        0x98 => 0x02DC,
        0x99 => 0x2122,
        0x9A => 0x0161,
        0x9B => 0x203A,
        0x9C => 0x0153,
        0x9E => 0x017E,
        0x9F => 0x0178,
        0xD800..=0xDFFF => 0xFFFD,
        v if v > 0x10FFFF => 0xFFFD,
        v => v,
    };
    char::from_u32(value).unwrap_or('\u{FFFD}')
}

/// Escape the five markup-significant characters
pub fn encode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Decode every reference in `text` against the XML table
    fn decode_all(text: &str) -> String {
        let table = EntityTable::xml();
        let mut out = String::new();
        let mut rest = text;
        while let Some(start) = rest.find('&') {
            out.push_str(&rest[..start]);
            let end = rest[start..].find(';').map(|i| start + i).unwrap();
            out.push_str(table.resolve(&rest[start + 1..end]).unwrap());
            rest = &rest[end + 1..];
        }
        out.push_str(rest);
        out
    }

    #[test]
    fn test_xml_builtins() {
        let table = EntityTable::xml();
        assert_eq!(table.len(), 5);
        assert_eq!(table.resolve("amp"), Ok("&"));
        assert_eq!(table.resolve("lt"), Ok("<"));
        assert_eq!(table.resolve("gt"), Ok(">"));
        assert_eq!(table.resolve("quot"), Ok("\""));
        assert_eq!(table.resolve("apos"), Ok("'"));
    }

    #[test]
    fn test_xml_lookup_is_case_sensitive() {
        let table = EntityTable::xml();
        assert_eq!(table.resolve("AMP"), Err(EntityError::Undefined("AMP".into())));
        assert!(table.resolve("nbsp").is_err());
    }

    #[test]
    fn test_html_table() {
        let table = EntityTable::html();
        assert_eq!(table.get("nbsp"), Some("\u{00A0}"));
        assert_eq!(table.get("copy"), Some("\u{00A9}"));
        assert_eq!(table.get("yuml"), Some("\u{00FF}"));
        assert_eq!(table.get("Agrave"), Some("\u{00C0}"));
        assert_eq!(table.get("euro"), Some("\u{20AC}"));
        assert_eq!(table.get("mdash"), Some("\u{2014}"));
        assert_eq!(table.get("Omega"), Some("\u{03A9}"));
        assert_eq!(table.get("rarr"), Some("\u{2192}"));
        assert_eq!(table.get("AMP"), Some("&"));
        assert_eq!(table.get("notanentity"), None);
    }

    #[test]
    fn test_tables_are_shared() {
        let a = EntityTable::html();
        let b = EntityTable::html();
        assert!(Arc::ptr_eq(&a.entries, &b.entries));
    }

    #[test]
    fn test_extended_table() {
        let table = EntityTable::xml().extended([("brand", "Brackish")]);
        assert_eq!(table.get("brand"), Some("Brackish"));
        assert_eq!(table.get("amp"), Some("&"));
        assert_eq!(EntityTable::xml().get("brand"), None);
    }

    #[test]
    fn test_legacy_prefix_longest_match() {
        let table = EntityTable::html();
        assert_eq!(table.longest_legacy_prefix("amp"), Some((3, "&")));
        assert_eq!(table.longest_legacy_prefix("ampfoo"), Some((3, "&")));
        // "not" is legacy, "notin" is not
        assert_eq!(table.longest_legacy_prefix("notin"), Some((3, "\u{00AC}")));
        assert_eq!(table.longest_legacy_prefix("copyright"), Some((4, "\u{00A9}")));
        assert_eq!(table.longest_legacy_prefix("hellip"), None);
        assert_eq!(EntityTable::xml().longest_legacy_prefix("amp"), None);
    }

    #[test]
    fn test_numeric_decimal_and_hex() {
        assert_eq!(resolve_numeric("65", false, Syntax::Xml10), Ok('A'));
        assert_eq!(resolve_numeric("8364", false, Syntax::Xml10), Ok('€'));
        assert_eq!(resolve_numeric("41", true, Syntax::Xml10), Ok('A'));
        assert_eq!(resolve_numeric("20AC", true, Syntax::Xml10), Ok('€'));
        assert_eq!(resolve_numeric("3c", true, Syntax::Xml10), Ok('<'));
    }

    #[test]
    fn test_numeric_xml_range() {
        assert_eq!(resolve_numeric("9", false, Syntax::Xml10), Ok('\t'));
        assert!(resolve_numeric("0", false, Syntax::Xml10).is_err());
        assert!(resolve_numeric("1", false, Syntax::Xml10).is_err());
        assert!(resolve_numeric("D800", true, Syntax::Xml10).is_err());
        assert!(resolve_numeric("110000", true, Syntax::Xml10).is_err());
        assert_eq!(resolve_numeric("1", false, Syntax::Xml11), Ok('\u{1}'));
        assert!(resolve_numeric("0", false, Syntax::Xml11).is_err());
    }

    #[test]
    fn test_numeric_malformed() {
        assert_eq!(
            resolve_numeric("", true, Syntax::Xml10),
            Err(EntityError::InvalidCharacterReference("x".into()))
        );
        assert!(resolve_numeric("12a", false, Syntax::Xml10).is_err());
        assert!(resolve_numeric("99999999999", false, Syntax::Xml10).is_err());
    }

    #[test]
    fn test_numeric_html_substitutions() {
        assert_eq!(resolve_numeric("0", false, Syntax::Html), Ok('\u{FFFD}'));
        assert_eq!(resolve_numeric("128", false, Syntax::Html), Ok('€'));
        assert_eq!(resolve_numeric("146", false, Syntax::Html), Ok('\u{2019}'));
        assert_eq!(resolve_numeric("D800", true, Syntax::Html), Ok('\u{FFFD}'));
        assert_eq!(resolve_numeric("99999999999", false, Syntax::Html), Ok('\u{FFFD}'));
    }

    #[test]
    fn test_encode_round_trip() {
        for text in ["&", "<", ">", "\"", "'", "a & b < c", "plain"] {
            assert_eq!(decode_all(&encode(text)), text);
        }
        assert_eq!(encode("<a href=\"x\">"), "&lt;a href=&quot;x&quot;&gt;");
    }
}
