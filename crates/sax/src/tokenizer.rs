//! Incremental markup tokenizer
//!
//! A character-level state machine. Every character goes through exactly one
//! state handler, which may ask for the character to be handed to the next
//! state as well (`Step::Reconsume`). All partial tokens live in
//! [`PendingToken`], so a chunk may end anywhere and the event stream does not
//! depend on how the input was split.
//!
//! Grammar violations fall in two classes. Recoverable errors are reported
//! through [`Sink::on_error`] and the tokenizer continues; leniencies are
//! tolerated silently unless `report_leniencies` is set. In strict mode both
//! are fatal: the error is reported once and returned from every later call
//! until [`Tokenizer::reset`].

use std::borrow::Cow;
use std::mem;

use crate::chars::is_quote;
use crate::entities::{resolve_numeric, EntityTable};
use crate::error::{ErrorKind, ParseError, SaxResult};
use crate::events::{
    Attribute, Attributes, CloseTag, OpenTag, ProcessingInstruction, Sink, XmlDeclaration,
};
use crate::namespace::{Frame, NamespaceScopes, ResolvedName};
use crate::options::{ParserOptions, Syntax};
use crate::position::{Position, PositionTracker};

/// Where a reference (`&...`) appeared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityContext {
    Text,
    AttributeQuoted(char),
    AttributeUnquoted,
}

impl EntityContext {
    fn return_state(self) -> ParserState {
        match self {
            Self::Text => ParserState::Text,
            Self::AttributeQuoted(q) => ParserState::AttributeValueQuoted(q),
            Self::AttributeUnquoted => ParserState::AttributeValueUnquoted,
        }
    }

    fn in_attribute(self) -> bool {
        !matches!(self, Self::Text)
    }
}

/// Tokenizer state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Nothing consumed yet, a byte order mark is skipped here
    Begin,
    Text,
    /// After `<`
    TagOpenStart,
    /// After `<!`, deciding between comment, CDATA and doctype
    MarkupDeclarationOpen,
    BogusDeclaration,
    BogusDeclarationQuoted(char),
    Doctype,
    DoctypeQuoted(char),
    DoctypeInternalSubset,
    DoctypeInternalSubsetQuoted(char),
    /// After `<!--`
    CommentStart,
    CommentBody,
    CommentEndDash,
    CommentEnd,
    CData,
    CDataEndBracket,
    CDataEnd,
    /// PI target
    ProcessingInstruction,
    ProcessingInstructionBody,
    ProcessingInstructionEnd,
    TagName,
    BeforeAttributeName,
    AttributeName,
    AfterAttributeName,
    BeforeAttributeValue,
    AttributeValueQuoted(char),
    AttributeValueClosed,
    AttributeValueUnquoted,
    /// After `/` inside an open tag
    TagSelfClosing,
    EndTagName,
    AfterEndTagName,
    EntityRef(EntityContext),
    CharRef(EntityContext),
    /// Contents of HTML `script` and `style`
    RawText,
    RawTextLessThan,
    RawTextEndTagName,
}

enum Step {
    Done,
    Reconsume,
}

/// Partial tokens carried across `write` calls
#[derive(Debug, Default)]
struct PendingToken {
    text: String,
    tag_name: String,
    attr_name: String,
    attr_value: String,
    attributes: Attributes,
    comment: String,
    cdata: String,
    doctype: String,
    pi_target: String,
    pi_body: String,
    entity: String,
    lookahead: String,
    bogus: String,
    raw_end: String,
}

impl PendingToken {
    /// First buffer (other than text and CDATA) longer than `max`
    fn oversized(&self, max: usize) -> Option<&'static str> {
        [
            ("tag name", self.tag_name.len()),
            ("attribute name", self.attr_name.len()),
            ("attribute value", self.attr_value.len()),
            ("comment", self.comment.len()),
            ("doctype", self.doctype.len()),
            ("processing instruction target", self.pi_target.len()),
            ("processing instruction body", self.pi_body.len()),
            ("entity reference", self.entity.len()),
            ("declaration", self.lookahead.len()),
            ("declaration", self.bogus.len()),
            ("close tag", self.raw_end.len()),
        ]
        .into_iter()
        .find(|&(_, len)| len > max)
        .map(|(name, _)| name)
    }
}

/// An element that is currently open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementStackEntry {
    pub name: String,
    /// Namespace mode only
    pub resolved: Option<ResolvedName>,
    pub self_closing: bool,
}

/// Streaming tokenizer feeding a [`Sink`]
pub struct Tokenizer<S: Sink> {
    sink: S,
    options: ParserOptions,
    entities: EntityTable,
    syntax: Syntax,
    state: ParserState,
    pending: PendingToken,
    stack: Vec<ElementStackEntry>,
    scopes: NamespaceScopes,
    tracker: PositionTracker,
    /// `]` characters directly preceding the current text character
    text_brackets: u8,
    /// Previous input character was `\r`
    after_cr: bool,
    /// Part of the current text run has been emitted already
    text_run_open: bool,
    xml_decl_allowed: bool,
    saw_root: bool,
    closed_root: bool,
    reported_text_before_root: bool,
    reported_text_after_root: bool,
    doctype_seen: bool,
    closed: bool,
    fatal: Option<ParseError>,
}

fn root_scopes(options: &ParserOptions) -> NamespaceScopes {
    let extra = options
        .additional_namespaces
        .iter()
        .map(|(prefix, uri)| (prefix.as_str(), uri.as_str()));
    NamespaceScopes::with_bindings(extra).unwrap_or_else(|err| {
        log::warn!("ignoring configured namespaces: {}", err);
        NamespaceScopes::new()
    })
}

impl<S: Sink> Tokenizer<S> {
    pub fn new(options: ParserOptions, sink: S) -> Self {
        let entities = EntityTable::for_options(&options);
        Self::with_entities(options, entities, sink)
    }

    /// Tokenizer resolving named references against `entities`
    pub fn with_entities(options: ParserOptions, entities: EntityTable, sink: S) -> Self {
        Self {
            sink,
            syntax: options.syntax,
            scopes: root_scopes(&options),
            tracker: PositionTracker::new(options.track_position, options.unicode_line_separators),
            entities,
            state: ParserState::Begin,
            pending: PendingToken::default(),
            stack: Vec::new(),
            text_brackets: 0,
            after_cr: false,
            text_run_open: false,
            xml_decl_allowed: false,
            saw_root: false,
            closed_root: false,
            reported_text_before_root: false,
            reported_text_after_root: false,
            doctype_seen: false,
            closed: false,
            fatal: None,
            options,
        }
    }

    /// Feed a chunk of input
    pub fn write(&mut self, chunk: &str) -> SaxResult<()> {
        self.ensure_writable()?;
        chunk.chars().try_for_each(|c| self.push_char(c))
    }

    /// Signal end of input: flush pending tokens, auto-close open elements in
    /// permissive mode and emit `on_end`.
    pub fn close(&mut self) -> SaxResult<()> {
        self.ensure_writable()?;
        self.closed = true;
        self.finish_pending()?;
        self.flush_text();

        while let Some(entry) = self.stack.last() {
            let message = format!("unclosed element <{}>", entry.name);
            self.lenient(ErrorKind::UnclosedElement, message)?;
            self.close_element();
        }
        if !self.options.fragment && !self.saw_root {
            self.recoverable(ErrorKind::MisplacedMarkup, "document has no root element")?;
        }
        self.sink.on_end();
        Ok(())
    }

    /// Drop all progress and start over with the same configuration
    pub fn reset(&mut self) {
        self.syntax = self.options.syntax;
        self.scopes = root_scopes(&self.options);
        self.tracker = PositionTracker::new(
            self.options.track_position,
            self.options.unicode_line_separators,
        );
        self.state = ParserState::Begin;
        self.pending = PendingToken::default();
        self.stack.clear();
        self.text_brackets = 0;
        self.after_cr = false;
        self.text_run_open = false;
        self.xml_decl_allowed = false;
        self.saw_root = false;
        self.closed_root = false;
        self.reported_text_before_root = false;
        self.reported_text_after_root = false;
        self.doctype_seen = false;
        self.closed = false;
        self.fatal = None;
    }

    pub fn position(&self) -> Position {
        self.tracker.position()
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Character rules in effect; an XML declaration may switch 1.0 to 1.1
    pub fn syntax(&self) -> Syntax {
        self.syntax
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Open elements, outermost first
    pub fn open_elements(&self) -> &[ElementStackEntry] {
        &self.stack
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The error that halted this tokenizer, if any
    pub fn fatal_error(&self) -> Option<&ParseError> {
        self.fatal.as_ref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub(crate) fn ensure_writable(&self) -> SaxResult<()> {
        if let Some(err) = &self.fatal {
            return Err(err.clone());
        }
        if self.closed {
            return Err(ParseError::new(
                ErrorKind::ParserClosed,
                "parser is closed",
                self.position(),
            ));
        }
        Ok(())
    }

    /// Process one character
    pub(crate) fn push_char(&mut self, c: char) -> SaxResult<()> {
        self.tracker.advance(c);
        let Some(c) = self.fold_line_ending(c) else {
            return Ok(());
        };
        if !self.syntax.is_char(c) {
            let message = format!("character U+{:04X} is not allowed", c as u32);
            self.lenient(ErrorKind::UnexpectedCharacter, message)?;
        }
        while let Step::Reconsume = self.step(c)? {}
        self.check_buffers()
    }

    /// XML end-of-line handling: `\r\n` and a lone `\r` become `\n`, and
    /// XML 1.1 also folds NEL and LINE SEPARATOR. `None` drops the character.
    fn fold_line_ending(&mut self, c: char) -> Option<char> {
        let after_cr = mem::replace(&mut self.after_cr, c == '\r');
        match (self.syntax, c) {
            (Syntax::Html, c) => Some(c),
            (_, '\n') if after_cr => None,
            (Syntax::Xml11, '\u{85}') if after_cr => None,
            (_, '\r') => Some('\n'),
            (Syntax::Xml11, '\u{85}' | '\u{2028}') => Some('\n'),
            (_, c) => Some(c),
        }
    }

    /// Halt with a fatal error raised outside the state machine
    pub(crate) fn halt(&mut self, kind: ErrorKind, message: impl Into<String>) -> ParseError {
        self.fail(kind, message)
    }

    // Error reporting

    fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) -> ParseError {
        let err = ParseError::new(kind, message, self.position());
        log::warn!("fatal parse error: {}", err);
        self.flush_text();
        self.sink.on_error(&err);
        self.fatal = Some(err.clone());
        err
    }

    fn recoverable(&mut self, kind: ErrorKind, message: impl Into<String>) -> SaxResult<()> {
        if self.options.strict || kind.is_always_fatal() {
            return Err(self.fail(kind, message));
        }
        let err = ParseError::new(kind, message, self.position());
        log::debug!("recovering from {}", err);
        self.flush_text_piece();
        self.sink.on_error(&err);
        Ok(())
    }

    fn lenient(&mut self, kind: ErrorKind, message: impl Into<String>) -> SaxResult<()> {
        if self.options.strict || self.options.report_leniencies {
            return self.recoverable(kind, message);
        }
        let message: String = message.into();
        log::debug!("tolerated: {} at {}", message, self.position());
        Ok(())
    }

    fn unterminated(&mut self, what: &str) -> SaxResult<()> {
        self.recoverable(
            ErrorKind::UnterminatedToken,
            format!("unexpected end of input in {}", what),
        )
    }

    fn check_buffers(&mut self) -> SaxResult<()> {
        let max = self.options.max_buffer_length;
        if max == 0 {
            return Ok(());
        }
        if self.pending.text.len() > max {
            self.flush_text_piece();
        }
        if self.pending.cdata.len() > max {
            let cdata = mem::take(&mut self.pending.cdata);
            self.sink.on_cdata_text(&cdata);
        }
        match self.pending.oversized(max) {
            Some(buffer) => Err(self.fail(
                ErrorKind::BufferLimitExceeded,
                format!("{} exceeds {} bytes", buffer, max),
            )),
            None => Ok(()),
        }
    }

    // Emission helpers

    /// Apply `trim` and `normalize`. A piece in the middle of a text run
    /// keeps the edges that face the rest of the run.
    fn shape<'a>(&self, raw: &'a str, run_start: bool, run_end: bool) -> Cow<'a, str> {
        let syntax = self.syntax;
        let mut text = raw;
        if self.options.trim {
            if run_start {
                text = text.trim_start_matches(|c: char| syntax.is_whitespace(c));
            }
            if run_end {
                text = text.trim_end_matches(|c: char| syntax.is_whitespace(c));
            }
        }
        if !self.options.normalize {
            return Cow::Borrowed(text);
        }
        let mut out = String::with_capacity(text.len());
        let mut in_space = false;
        for c in text.chars() {
            if syntax.is_whitespace(c) {
                if !in_space {
                    out.push(' ');
                }
                in_space = true;
            } else {
                out.push(c);
                in_space = false;
            }
        }
        Cow::Owned(out)
    }

    /// End the current text run
    fn flush_text(&mut self) {
        let text = mem::take(&mut self.pending.text);
        self.emit_text(&text, true);
    }

    /// Emit buffered text without ending the run. Trailing whitespace stays
    /// buffered while shaping may still drop or collapse it, unless it alone
    /// is over the buffer limit.
    fn flush_text_piece(&mut self) {
        let mut text = mem::take(&mut self.pending.text);
        if self.options.trim || self.options.normalize {
            let syntax = self.syntax;
            let end = text.trim_end_matches(|c: char| syntax.is_whitespace(c)).len();
            let max = self.options.max_buffer_length;
            if max == 0 || text.len() - end <= max {
                self.pending.text = text.split_off(end);
            }
        }
        self.emit_text(&text, false);
    }

    fn emit_text(&mut self, text: &str, run_end: bool) {
        let run_start = !self.text_run_open;
        if run_end {
            self.text_run_open = false;
        }
        if text.is_empty() {
            return;
        }
        let syntax = self.syntax;
        if self.stack.is_empty()
            && !self.options.fragment
            && text.chars().all(|c| syntax.is_whitespace(c))
        {
            return;
        }
        let shaped = self.shape(text, run_start, run_end);
        if !shaped.is_empty() {
            self.sink.on_text(&shaped);
            self.text_run_open = !run_end;
        }
    }

    fn text_outside_root(&mut self) -> SaxResult<()> {
        if self.saw_root {
            if !self.reported_text_after_root {
                self.reported_text_after_root = true;
                self.recoverable(ErrorKind::MisplacedMarkup, "text after the root element")?;
            }
        } else if !self.reported_text_before_root {
            self.reported_text_before_root = true;
            self.recoverable(ErrorKind::MisplacedMarkup, "text before the root element")?;
        }
        Ok(())
    }

    fn names_match(&self, open: &str, close: &str) -> bool {
        if self.options.case_insensitive_close {
            open.eq_ignore_ascii_case(close)
        } else {
            open == close
        }
    }

    fn fold_case(&self, name: &mut String) {
        if !self.options.strict {
            self.options.name_case.apply(name);
        }
    }

    fn opens_raw_text(&self, name: &str) -> bool {
        self.syntax == Syntax::Html
            && !self.options.strict
            && (name.eq_ignore_ascii_case("script") || name.eq_ignore_ascii_case("style"))
    }

    fn starts_attribute_name(&self, c: char) -> bool {
        match self.syntax {
            Syntax::Html => self.syntax.is_name_char(c),
            _ => self.syntax.is_name_start(c),
        }
    }

    fn is_entity_name_char(&self, c: char, first: bool) -> bool {
        match (self.syntax, first) {
            (Syntax::Html, true) => c.is_ascii_alphabetic(),
            (Syntax::Html, false) => c.is_ascii_alphanumeric(),
            (syntax, true) => syntax.is_name_start(c),
            (syntax, false) => syntax.is_name_char(c),
        }
    }
}

// State handlers
impl<S: Sink> Tokenizer<S> {
    fn step(&mut self, c: char) -> SaxResult<Step> {
        use ParserState::*;
        match self.state {
            Begin => self.begin_state(c),
            Text => self.text_state(c),
            TagOpenStart => self.tag_open_start_state(c),
            MarkupDeclarationOpen => self.markup_declaration_open_state(c),
            BogusDeclaration => self.bogus_declaration_state(c),
            BogusDeclarationQuoted(q) => {
                self.pending.bogus.push(c);
                if c == q {
                    self.state = BogusDeclaration;
                }
                Ok(Step::Done)
            }
            Doctype => self.doctype_state(c),
            DoctypeQuoted(q) => {
                self.pending.doctype.push(c);
                if c == q {
                    self.state = Doctype;
                }
                Ok(Step::Done)
            }
            DoctypeInternalSubset => {
                self.pending.doctype.push(c);
                match c {
                    ']' => self.state = Doctype,
                    q if is_quote(q) => self.state = DoctypeInternalSubsetQuoted(q),
                    _ => {}
                }
                Ok(Step::Done)
            }
            DoctypeInternalSubsetQuoted(q) => {
                self.pending.doctype.push(c);
                if c == q {
                    self.state = DoctypeInternalSubset;
                }
                Ok(Step::Done)
            }
            CommentStart => self.comment_start_state(c),
            CommentBody => {
                match c {
                    '-' => self.state = CommentEndDash,
                    c => self.pending.comment.push(c),
                }
                Ok(Step::Done)
            }
            CommentEndDash => {
                if c == '-' {
                    self.state = CommentEnd;
                    return Ok(Step::Done);
                }
                self.pending.comment.push('-');
                self.state = CommentBody;
                Ok(Step::Reconsume)
            }
            CommentEnd => self.comment_end_state(c),
            CData => {
                match c {
                    ']' => self.state = CDataEndBracket,
                    c => self.pending.cdata.push(c),
                }
                Ok(Step::Done)
            }
            CDataEndBracket => {
                if c == ']' {
                    self.state = CDataEnd;
                    return Ok(Step::Done);
                }
                self.pending.cdata.push(']');
                self.state = CData;
                Ok(Step::Reconsume)
            }
            CDataEnd => self.cdata_end_state(c),
            ParserState::ProcessingInstruction => self.pi_target_state(c),
            ProcessingInstructionBody => {
                match c {
                    '?' => self.state = ProcessingInstructionEnd,
                    c if self.pending.pi_body.is_empty() && self.syntax.is_whitespace(c) => {}
                    c => self.pending.pi_body.push(c),
                }
                Ok(Step::Done)
            }
            ProcessingInstructionEnd => match c {
                '>' => {
                    self.finish_processing_instruction()?;
                    Ok(Step::Done)
                }
                '?' => {
                    self.pending.pi_body.push('?');
                    Ok(Step::Done)
                }
                _ => {
                    self.pending.pi_body.push('?');
                    self.state = ProcessingInstructionBody;
                    Ok(Step::Reconsume)
                }
            },
            TagName => self.tag_name_state(c),
            BeforeAttributeName => self.before_attribute_name_state(c),
            AttributeName => self.attribute_name_state(c),
            AfterAttributeName => self.after_attribute_name_state(c),
            BeforeAttributeValue => self.before_attribute_value_state(c),
            AttributeValueQuoted(q) => self.attribute_value_quoted_state(q, c),
            AttributeValueClosed => self.attribute_value_closed_state(c),
            AttributeValueUnquoted => self.attribute_value_unquoted_state(c),
            TagSelfClosing => self.tag_self_closing_state(c),
            EndTagName => self.end_tag_name_state(c),
            AfterEndTagName => self.after_end_tag_name_state(c),
            EntityRef(ctx) => self.entity_ref_state(ctx, c),
            CharRef(ctx) => self.char_ref_state(ctx, c),
            RawText => {
                match c {
                    '<' => self.state = RawTextLessThan,
                    c => self.pending.text.push(c),
                }
                Ok(Step::Done)
            }
            RawTextLessThan => {
                if c == '/' {
                    self.pending.raw_end.clear();
                    self.state = RawTextEndTagName;
                    return Ok(Step::Done);
                }
                self.pending.text.push('<');
                self.state = RawText;
                Ok(Step::Reconsume)
            }
            RawTextEndTagName => self.raw_text_end_tag_name_state(c),
        }
    }

    fn begin_state(&mut self, c: char) -> SaxResult<Step> {
        match c {
            '\u{FEFF}' => Ok(Step::Done),
            '<' => {
                self.xml_decl_allowed = true;
                self.state = ParserState::TagOpenStart;
                Ok(Step::Done)
            }
            _ => {
                self.state = ParserState::Text;
                Ok(Step::Reconsume)
            }
        }
    }

    fn text_state(&mut self, c: char) -> SaxResult<Step> {
        match c {
            '<' => {
                self.xml_decl_allowed = false;
                self.text_brackets = 0;
                self.state = ParserState::TagOpenStart;
            }
            '&' => {
                self.text_brackets = 0;
                self.pending.entity.clear();
                self.state = ParserState::EntityRef(EntityContext::Text);
            }
            c => {
                if c == '>' && self.text_brackets >= 2 {
                    self.lenient(ErrorKind::UnexpectedCharacter, "]]> is not allowed in text")?;
                }
                self.text_brackets = if c == ']' {
                    self.text_brackets.saturating_add(1)
                } else {
                    0
                };
                if self.stack.is_empty() && !self.options.fragment && !self.syntax.is_whitespace(c)
                {
                    self.text_outside_root()?;
                }
                self.pending.text.push(c);
            }
        }
        Ok(Step::Done)
    }

    fn tag_open_start_state(&mut self, c: char) -> SaxResult<Step> {
        match c {
            '!' => {
                self.pending.lookahead.clear();
                self.state = ParserState::MarkupDeclarationOpen;
            }
            '?' => self.state = ParserState::ProcessingInstruction,
            '/' => self.state = ParserState::EndTagName,
            c if self.syntax.is_name_start(c) => {
                self.pending.tag_name.push(c);
                self.state = ParserState::TagName;
            }
            _ => {
                self.lenient(ErrorKind::UnexpectedCharacter, "unescaped < in text")?;
                self.pending.text.push('<');
                self.state = ParserState::Text;
                return Ok(Step::Reconsume);
            }
        }
        Ok(Step::Done)
    }

    fn markup_declaration_open_state(&mut self, c: char) -> SaxResult<Step> {
        let mut seen = mem::take(&mut self.pending.lookahead);
        seen.push(c);
        match seen.as_str() {
            "--" => {
                self.pending.comment.clear();
                self.state = ParserState::CommentStart;
                return Ok(Step::Done);
            }
            "[CDATA[" => {
                self.open_cdata()?;
                return Ok(Step::Done);
            }
            s if s.eq_ignore_ascii_case("DOCTYPE") => {
                if s != "DOCTYPE" {
                    self.lenient(
                        ErrorKind::UnexpectedCharacter,
                        "doctype keyword must be uppercase",
                    )?;
                }
                self.pending.doctype.clear();
                self.state = ParserState::Doctype;
                return Ok(Step::Done);
            }
            _ => {}
        }
        if is_declaration_prefix(&seen) {
            self.pending.lookahead = seen;
            return Ok(Step::Done);
        }
        self.lenient(
            ErrorKind::UnexpectedCharacter,
            format!("unknown declaration <!{}", seen),
        )?;
        seen.pop();
        self.pending.bogus = seen;
        self.state = ParserState::BogusDeclaration;
        Ok(Step::Reconsume)
    }

    fn bogus_declaration_state(&mut self, c: char) -> SaxResult<Step> {
        match c {
            '>' => {
                self.state = ParserState::Text;
                let body = mem::take(&mut self.pending.bogus);
                self.flush_text();
                self.sink.on_sgml_declaration(&body);
            }
            q if is_quote(q) => {
                self.pending.bogus.push(q);
                self.state = ParserState::BogusDeclarationQuoted(q);
            }
            c => self.pending.bogus.push(c),
        }
        Ok(Step::Done)
    }

    fn doctype_state(&mut self, c: char) -> SaxResult<Step> {
        match c {
            '>' => self.finish_doctype()?,
            '[' => {
                self.pending.doctype.push(c);
                self.state = ParserState::DoctypeInternalSubset;
            }
            q if is_quote(q) => {
                self.pending.doctype.push(q);
                self.state = ParserState::DoctypeQuoted(q);
            }
            c => self.pending.doctype.push(c),
        }
        Ok(Step::Done)
    }

    fn comment_start_state(&mut self, c: char) -> SaxResult<Step> {
        if c == '>' {
            self.lenient(ErrorKind::UnexpectedCharacter, "malformed comment <!-->")?;
            self.finish_comment();
            return Ok(Step::Done);
        }
        self.state = ParserState::CommentBody;
        Ok(Step::Reconsume)
    }

    fn comment_end_state(&mut self, c: char) -> SaxResult<Step> {
        match c {
            '>' => {
                self.finish_comment();
                Ok(Step::Done)
            }
            '-' => {
                self.lenient(ErrorKind::UnexpectedCharacter, "-- is not allowed in comments")?;
                self.pending.comment.push('-');
                Ok(Step::Done)
            }
            _ => {
                self.lenient(ErrorKind::UnexpectedCharacter, "-- is not allowed in comments")?;
                self.pending.comment.push_str("--");
                self.state = ParserState::CommentBody;
                Ok(Step::Reconsume)
            }
        }
    }

    fn cdata_end_state(&mut self, c: char) -> SaxResult<Step> {
        match c {
            '>' => {
                self.state = ParserState::Text;
                let cdata = mem::take(&mut self.pending.cdata);
                if !cdata.is_empty() {
                    self.sink.on_cdata_text(&cdata);
                }
                self.sink.on_cdata_close();
                Ok(Step::Done)
            }
            ']' => {
                self.pending.cdata.push(']');
                Ok(Step::Done)
            }
            _ => {
                self.pending.cdata.push_str("]]");
                self.state = ParserState::CData;
                Ok(Step::Reconsume)
            }
        }
    }

    fn pi_target_state(&mut self, c: char) -> SaxResult<Step> {
        match c {
            '?' => self.state = ParserState::ProcessingInstructionEnd,
            c if self.syntax.is_whitespace(c) => {
                self.state = ParserState::ProcessingInstructionBody;
            }
            c => {
                let valid = if self.pending.pi_target.is_empty() {
                    self.syntax.is_name_start(c)
                } else {
                    self.syntax.is_name_char(c)
                };
                if !valid {
                    self.lenient(
                        ErrorKind::UnexpectedCharacter,
                        format!("invalid character {:?} in processing instruction target", c),
                    )?;
                }
                self.pending.pi_target.push(c);
            }
        }
        Ok(Step::Done)
    }
}

// Tags and attributes
impl<S: Sink> Tokenizer<S> {
    fn tag_name_state(&mut self, c: char) -> SaxResult<Step> {
        match c {
            '>' => {
                self.start_tag()?;
                self.finish_open_tag(false)?;
            }
            '/' => {
                self.start_tag()?;
                self.state = ParserState::TagSelfClosing;
            }
            c if self.syntax.is_whitespace(c) => {
                self.start_tag()?;
                self.state = ParserState::BeforeAttributeName;
            }
            c if self.syntax.is_name_char(c) => self.pending.tag_name.push(c),
            c => {
                self.lenient(
                    ErrorKind::UnexpectedCharacter,
                    format!("invalid character {:?} in tag name", c),
                )?;
                self.pending.tag_name.push(c);
            }
        }
        Ok(Step::Done)
    }

    fn before_attribute_name_state(&mut self, c: char) -> SaxResult<Step> {
        match c {
            c if self.syntax.is_whitespace(c) => {}
            '>' => self.finish_open_tag(false)?,
            '/' => self.state = ParserState::TagSelfClosing,
            c if self.starts_attribute_name(c) => {
                self.pending.attr_name.push(c);
                self.state = ParserState::AttributeName;
            }
            c => self.lenient(
                ErrorKind::UnexpectedCharacter,
                format!("unexpected character {:?} in tag", c),
            )?,
        }
        Ok(Step::Done)
    }

    fn attribute_name_state(&mut self, c: char) -> SaxResult<Step> {
        match c {
            '=' => self.state = ParserState::BeforeAttributeValue,
            c if self.syntax.is_whitespace(c) => self.state = ParserState::AfterAttributeName,
            '>' | '/' => {
                self.attribute_without_value()?;
                self.state = ParserState::BeforeAttributeName;
                return Ok(Step::Reconsume);
            }
            c if self.syntax.is_name_char(c) => self.pending.attr_name.push(c),
            c => {
                self.lenient(
                    ErrorKind::UnexpectedCharacter,
                    format!("invalid character {:?} in attribute name", c),
                )?;
                self.pending.attr_name.push(c);
            }
        }
        Ok(Step::Done)
    }

    fn after_attribute_name_state(&mut self, c: char) -> SaxResult<Step> {
        match c {
            c if self.syntax.is_whitespace(c) => Ok(Step::Done),
            '=' => {
                self.state = ParserState::BeforeAttributeValue;
                Ok(Step::Done)
            }
            _ => {
                self.attribute_without_value()?;
                self.state = ParserState::BeforeAttributeName;
                Ok(Step::Reconsume)
            }
        }
    }

    fn before_attribute_value_state(&mut self, c: char) -> SaxResult<Step> {
        match c {
            c if self.syntax.is_whitespace(c) => Ok(Step::Done),
            q if is_quote(q) => {
                self.pending.attr_value.clear();
                self.state = ParserState::AttributeValueQuoted(q);
                Ok(Step::Done)
            }
            '>' => {
                self.attribute_without_value()?;
                self.state = ParserState::BeforeAttributeName;
                Ok(Step::Reconsume)
            }
            _ => {
                self.lenient(ErrorKind::UnexpectedCharacter, "unquoted attribute value")?;
                self.state = ParserState::AttributeValueUnquoted;
                Ok(Step::Reconsume)
            }
        }
    }

    fn attribute_value_quoted_state(&mut self, quote: char, c: char) -> SaxResult<Step> {
        match c {
            c if c == quote => {
                self.commit_attribute()?;
                self.state = ParserState::AttributeValueClosed;
            }
            '&' => {
                self.pending.entity.clear();
                self.state = ParserState::EntityRef(EntityContext::AttributeQuoted(quote));
            }
            '<' => {
                self.lenient(
                    ErrorKind::UnexpectedCharacter,
                    "< is not allowed in attribute values",
                )?;
                self.push_attr_char(c);
            }
            c => self.push_attr_char(c),
        }
        Ok(Step::Done)
    }

    fn attribute_value_closed_state(&mut self, c: char) -> SaxResult<Step> {
        match c {
            c if self.syntax.is_whitespace(c) => self.state = ParserState::BeforeAttributeName,
            '>' => self.finish_open_tag(false)?,
            '/' => self.state = ParserState::TagSelfClosing,
            _ => {
                self.lenient(
                    ErrorKind::UnexpectedCharacter,
                    "missing whitespace between attributes",
                )?;
                self.state = ParserState::BeforeAttributeName;
                return Ok(Step::Reconsume);
            }
        }
        Ok(Step::Done)
    }

    fn attribute_value_unquoted_state(&mut self, c: char) -> SaxResult<Step> {
        match c {
            c if self.syntax.is_whitespace(c) => {
                self.commit_attribute()?;
                self.state = ParserState::BeforeAttributeName;
            }
            '>' => {
                self.commit_attribute()?;
                self.finish_open_tag(false)?;
            }
            '&' => {
                self.pending.entity.clear();
                self.state = ParserState::EntityRef(EntityContext::AttributeUnquoted);
            }
            '"' | '\'' | '<' | '=' | '`' => {
                self.lenient(
                    ErrorKind::UnexpectedCharacter,
                    format!("invalid character {:?} in unquoted attribute value", c),
                )?;
                self.push_attr_char(c);
            }
            c => self.push_attr_char(c),
        }
        Ok(Step::Done)
    }

    fn tag_self_closing_state(&mut self, c: char) -> SaxResult<Step> {
        if c == '>' {
            self.finish_open_tag(true)?;
            return Ok(Step::Done);
        }
        self.lenient(ErrorKind::UnexpectedCharacter, "unexpected / in tag")?;
        self.state = ParserState::BeforeAttributeName;
        Ok(Step::Reconsume)
    }

    fn end_tag_name_state(&mut self, c: char) -> SaxResult<Step> {
        match c {
            '>' => self.handle_close_tag()?,
            c if self.syntax.is_whitespace(c) => self.state = ParserState::AfterEndTagName,
            c if self.syntax.is_name_char(c)
                && (!self.pending.tag_name.is_empty() || self.syntax.is_name_start(c)) =>
            {
                self.pending.tag_name.push(c);
            }
            c => {
                self.lenient(
                    ErrorKind::UnexpectedCharacter,
                    format!("invalid character {:?} in close tag", c),
                )?;
                self.state = ParserState::AfterEndTagName;
            }
        }
        Ok(Step::Done)
    }

    fn after_end_tag_name_state(&mut self, c: char) -> SaxResult<Step> {
        match c {
            '>' => self.handle_close_tag()?,
            c if self.syntax.is_whitespace(c) => {}
            c => self.lenient(
                ErrorKind::UnexpectedCharacter,
                format!("unexpected character {:?} in close tag", c),
            )?,
        }
        Ok(Step::Done)
    }

    fn raw_text_end_tag_name_state(&mut self, c: char) -> SaxResult<Step> {
        if c.is_ascii_alphanumeric() {
            self.pending.raw_end.push(c);
            return Ok(Step::Done);
        }
        let terminated = c == '>' || c == '/' || self.syntax.is_whitespace(c);
        let open = self
            .stack
            .last()
            .filter(|open| terminated && open.name.eq_ignore_ascii_case(&self.pending.raw_end))
            .map(|open| open.name.clone());
        if let Some(name) = open {
            // Raw text ends at its own close tag whatever the case settings
            self.pending.raw_end.clear();
            self.pending.tag_name = name;
            self.state = ParserState::EndTagName;
        } else {
            let end = mem::take(&mut self.pending.raw_end);
            self.pending.text.push_str("</");
            self.pending.text.push_str(&end);
            self.state = ParserState::RawText;
        }
        Ok(Step::Reconsume)
    }

    /// Attribute value character with XML whitespace normalization. Line
    /// endings are already folded to `\n` at this point.
    fn push_attr_char(&mut self, c: char) {
        match c {
            '\t' | '\n' if self.syntax != Syntax::Html => self.pending.attr_value.push(' '),
            c => self.pending.attr_value.push(c),
        }
    }

    fn attribute_without_value(&mut self) -> SaxResult<()> {
        let message = format!("attribute {} has no value", self.pending.attr_name);
        self.lenient(ErrorKind::UnexpectedCharacter, message)?;
        self.pending.attr_value.clear();
        self.commit_attribute()
    }

    fn commit_attribute(&mut self) -> SaxResult<()> {
        let mut name = mem::take(&mut self.pending.attr_name);
        let value = mem::take(&mut self.pending.attr_value);
        self.fold_case(&mut name);
        let attribute = Attribute::new(name, value);

        // Namespace mode checks duplicates on expanded names once the tag ends
        if self.options.namespaces {
            self.pending.attributes.push(attribute);
            return Ok(());
        }
        if self.pending.attributes.iter().any(|a| a.name == attribute.name) {
            return self.recoverable(
                ErrorKind::DuplicateAttribute,
                format!("duplicate attribute {}", attribute.name),
            );
        }
        self.sink.on_attribute(&attribute);
        self.pending.attributes.push(attribute);
        Ok(())
    }

    /// Tag name complete: emit `on_open_tag_start`
    fn start_tag(&mut self) -> SaxResult<()> {
        let mut name = mem::take(&mut self.pending.tag_name);
        self.fold_case(&mut name);
        self.pending.tag_name = name;
        self.flush_text();
        if self.stack.is_empty() {
            if self.closed_root && !self.options.fragment {
                self.recoverable(ErrorKind::MisplacedMarkup, "multiple root elements")?;
            }
            if !self.saw_root {
                log::trace!("root element <{}>", self.pending.tag_name);
            }
            self.saw_root = true;
        }
        self.sink.on_open_tag_start(&self.pending.tag_name);
        Ok(())
    }

    fn finish_open_tag(&mut self, self_closing: bool) -> SaxResult<()> {
        let name = mem::take(&mut self.pending.tag_name);
        let mut attributes = mem::take(&mut self.pending.attributes);
        let ns = if self.options.namespaces {
            let (element, resolved) = self.resolve_open_tag(&name, attributes)?;
            attributes = resolved;
            Some(element)
        } else {
            None
        };

        let tag = OpenTag {
            name,
            ns,
            attributes,
            self_closing,
        };
        self.sink.on_open_tag_end(&tag);

        let OpenTag { name, ns, .. } = tag;
        let raw_text = !self_closing && self.opens_raw_text(&name);
        self.stack.push(ElementStackEntry {
            name,
            resolved: ns,
            self_closing,
        });
        self.state = if raw_text {
            ParserState::RawText
        } else {
            ParserState::Text
        };
        if self_closing {
            self.close_element();
        }
        Ok(())
    }

    /// Bind the tag's `xmlns` declarations in a new scope, then resolve the
    /// element and attribute names against it.
    fn resolve_open_tag(
        &mut self,
        name: &str,
        attributes: Attributes,
    ) -> SaxResult<(ResolvedName, Attributes)> {
        self.scopes.push_scope();
        for attr in &attributes {
            let prefix = if attr.name == "xmlns" {
                ""
            } else if let Some(prefix) = attr.name.strip_prefix("xmlns:") {
                prefix
            } else {
                continue;
            };
            if !prefix.is_empty() && attr.value.is_empty() && self.syntax != Syntax::Xml11 {
                self.recoverable(
                    ErrorKind::UnboundPrefix,
                    format!("prefix {} cannot be undeclared", prefix),
                )?;
                continue;
            }
            if let Err(err) = self.scopes.bind_prefix(prefix, &attr.value) {
                self.recoverable(err.kind(), err.to_string())?;
            }
        }

        let declared: Frame = self.scopes.current_bindings().iter().cloned().collect();
        for binding in &declared {
            self.sink.on_open_namespace(binding);
        }

        let element = match self.scopes.resolve_element(name) {
            Ok(element) => element,
            Err(err) => {
                self.recoverable(err.kind(), err.to_string())?;
                fallback_name(name)
            }
        };

        let mut resolved = Attributes::new();
        for mut attr in attributes {
            let is_xmlns = attr.name == "xmlns" || attr.name.starts_with("xmlns:");
            if is_xmlns && !self.options.expose_xmlns_attributes {
                continue;
            }
            let ns = match self.scopes.resolve_attribute(&attr.name) {
                Ok(ns) => ns,
                Err(err) => {
                    self.recoverable(err.kind(), err.to_string())?;
                    fallback_name(&attr.name)
                }
            };
            let duplicate = resolved
                .iter()
                .any(|other| other.ns.as_ref().is_some_and(|o| same_expanded_name(o, &ns)));
            if duplicate {
                self.recoverable(
                    ErrorKind::DuplicateAttribute,
                    format!("duplicate attribute {}", attr.name),
                )?;
                continue;
            }
            attr.ns = Some(ns);
            self.sink.on_attribute(&attr);
            resolved.push(attr);
        }
        Ok((element, resolved))
    }

    /// Pop the innermost element, emitting its close tag and then the
    /// namespace bindings leaving scope
    fn close_element(&mut self) {
        let Some(entry) = self.stack.pop() else {
            return;
        };
        self.sink.on_close_tag(&CloseTag {
            name: entry.name,
            ns: entry.resolved,
        });
        if self.options.namespaces {
            for binding in self.scopes.pop_scope() {
                self.sink.on_close_namespace(&binding);
            }
        }
        if self.stack.is_empty() {
            self.closed_root = true;
            log::trace!("root element closed");
        }
    }

    fn handle_close_tag(&mut self) -> SaxResult<()> {
        self.state = ParserState::Text;
        let mut name = mem::take(&mut self.pending.tag_name);
        if name.is_empty() {
            return self.lenient(ErrorKind::UnexpectedCharacter, "empty close tag");
        }
        self.fold_case(&mut name);
        self.flush_text();

        let found = self
            .stack
            .iter()
            .rposition(|open| self.names_match(&open.name, &name));
        match found {
            Some(index) if index + 1 == self.stack.len() => {
                self.close_element();
                Ok(())
            }
            Some(index) => {
                let open = self
                    .stack
                    .last()
                    .map(|entry| entry.name.clone())
                    .unwrap_or_default();
                self.recoverable(
                    ErrorKind::MismatchedCloseTag,
                    format!("close tag </{}> does not match open element <{}>", name, open),
                )?;
                while self.stack.len() > index {
                    self.close_element();
                }
                Ok(())
            }
            None => self.recoverable(
                ErrorKind::MismatchedCloseTag,
                format!("unmatched close tag </{}>", name),
            ),
        }
    }
}

fn fallback_name(name: &str) -> ResolvedName {
    let (prefix, local) = match name.split_once(':') {
        Some((prefix, local)) if !prefix.is_empty() && !local.is_empty() => (prefix, local),
        _ => ("", name),
    };
    ResolvedName {
        prefix: prefix.to_string(),
        local: local.to_string(),
        uri: None,
    }
}

fn same_expanded_name(a: &ResolvedName, b: &ResolvedName) -> bool {
    a.local == b.local
        && match (&a.uri, &b.uri) {
            (Some(x), Some(y)) => x == y,
            (None, None) => a.prefix == b.prefix,
            _ => false,
        }
}

// Completed tokens and references
impl<S: Sink> Tokenizer<S> {
    fn open_cdata(&mut self) -> SaxResult<()> {
        self.state = ParserState::CData;
        self.flush_text();
        if self.stack.is_empty() && !self.options.fragment {
            self.recoverable(
                ErrorKind::MisplacedMarkup,
                "CDATA section outside the root element",
            )?;
        }
        self.sink.on_cdata_open();
        Ok(())
    }

    fn finish_comment(&mut self) {
        self.state = ParserState::Text;
        let comment = mem::take(&mut self.pending.comment);
        self.flush_text();
        let shaped = self.shape(&comment, true, true);
        self.sink.on_comment(&shaped);
    }

    fn finish_doctype(&mut self) -> SaxResult<()> {
        self.state = ParserState::Text;
        let body = mem::take(&mut self.pending.doctype);
        self.flush_text();
        if !self.options.fragment && (self.doctype_seen || self.saw_root) {
            self.recoverable(
                ErrorKind::MisplacedMarkup,
                "doctype must appear once, before the root element",
            )?;
        }
        self.doctype_seen = true;
        let syntax = self.syntax;
        self.sink
            .on_doctype(body.trim_start_matches(|c: char| syntax.is_whitespace(c)));
        Ok(())
    }

    fn finish_processing_instruction(&mut self) -> SaxResult<()> {
        self.state = ParserState::Text;
        let target = mem::take(&mut self.pending.pi_target);
        let body = mem::take(&mut self.pending.pi_body);
        let at_start = mem::replace(&mut self.xml_decl_allowed, false);
        self.flush_text();

        if target == "xml" {
            if at_start {
                return self.xml_declaration(&body);
            }
            self.recoverable(
                ErrorKind::MisplacedMarkup,
                "XML declaration is only allowed at the start of the document",
            )?;
        }
        if target.is_empty() {
            self.lenient(
                ErrorKind::UnexpectedCharacter,
                "processing instruction without a target",
            )?;
        }
        self.sink
            .on_processing_instruction(&ProcessingInstruction { target, body });
        Ok(())
    }

    fn xml_declaration(&mut self, body: &str) -> SaxResult<()> {
        let mut decl = XmlDeclaration::default();
        match parse_pseudo_attributes(body) {
            Ok(pairs) => {
                for (name, value) in pairs {
                    let slot = match name {
                        "version" => &mut decl.version,
                        "encoding" => &mut decl.encoding,
                        "standalone" => &mut decl.standalone,
                        _ => {
                            self.recoverable(
                                ErrorKind::UnexpectedCharacter,
                                format!("unknown XML declaration attribute {}", name),
                            )?;
                            continue;
                        }
                    };
                    *slot = Some(value.to_string());
                }
            }
            Err(message) => self.recoverable(
                ErrorKind::UnexpectedCharacter,
                format!("malformed XML declaration: {}", message),
            )?,
        }

        match decl.version.as_deref() {
            None => {
                self.recoverable(ErrorKind::UnexpectedCharacter, "XML declaration without version")?
            }
            Some(version) if !is_xml_version(version) => self.recoverable(
                ErrorKind::UnexpectedCharacter,
                format!("unsupported XML version {}", version),
            )?,
            Some("1.1") if self.syntax == Syntax::Xml10 && !self.options.force_syntax => {
                log::debug!("switching to XML 1.1 character rules");
                self.syntax = Syntax::Xml11;
            }
            _ => {}
        }
        if let Some(standalone) = decl.standalone.as_deref() {
            if standalone != "yes" && standalone != "no" {
                self.recoverable(
                    ErrorKind::UnexpectedCharacter,
                    format!("standalone must be yes or no, not {}", standalone),
                )?;
            }
        }
        self.sink.on_xml_declaration(&decl);
        Ok(())
    }

    fn entity_ref_state(&mut self, ctx: EntityContext, c: char) -> SaxResult<Step> {
        if c == '#' && self.pending.entity.is_empty() {
            self.state = ParserState::CharRef(ctx);
            return Ok(Step::Done);
        }
        if c == ';' {
            self.resolve_named_reference(ctx)?;
            self.state = ctx.return_state();
            return Ok(Step::Done);
        }
        if self.is_entity_name_char(c, self.pending.entity.is_empty()) {
            self.pending.entity.push(c);
            return Ok(Step::Done);
        }
        self.unterminated_named_reference(ctx, Some(c))?;
        self.state = ctx.return_state();
        Ok(Step::Reconsume)
    }

    fn char_ref_state(&mut self, ctx: EntityContext, c: char) -> SaxResult<Step> {
        if c == ';' {
            self.resolve_char_reference(ctx)?;
            self.state = ctx.return_state();
            return Ok(Step::Done);
        }
        if c.is_ascii_alphanumeric() {
            self.pending.entity.push(c);
            return Ok(Step::Done);
        }
        self.unterminated_char_reference(ctx)?;
        self.state = ctx.return_state();
        Ok(Step::Reconsume)
    }

    fn resolve_named_reference(&mut self, ctx: EntityContext) -> SaxResult<()> {
        let name = mem::take(&mut self.pending.entity);
        match self.entities.resolve(&name) {
            Ok(value) => {
                reference_target(&mut self.pending, ctx).push_str(value);
                Ok(())
            }
            Err(err) => {
                self.recoverable(err.kind(), err.to_string())?;
                let target = reference_target(&mut self.pending, ctx);
                target.push('&');
                target.push_str(&name);
                target.push(';');
                Ok(())
            }
        }
    }

    /// A named reference ended by something other than `;`, or by end of
    /// input when `next` is `None`
    fn unterminated_named_reference(
        &mut self,
        ctx: EntityContext,
        next: Option<char>,
    ) -> SaxResult<()> {
        let name = mem::take(&mut self.pending.entity);
        if name.is_empty() {
            self.lenient(ErrorKind::UnexpectedCharacter, "unescaped &")?;
            reference_target(&mut self.pending, ctx).push('&');
            return Ok(());
        }

        if self.options.permissive_entities && !self.options.strict {
            let legacy = self
                .entities
                .longest_legacy_prefix(&name)
                .map(|(len, value)| (len, value.to_string()));
            if let Some((len, value)) = legacy {
                let following = name[len..].chars().next().or(next);
                let rejected = ctx.in_attribute()
                    && following.is_some_and(|c| c == '=' || c.is_ascii_alphanumeric());
                if !rejected {
                    self.lenient(
                        ErrorKind::UnexpectedCharacter,
                        format!("entity reference &{} without ;", &name[..len]),
                    )?;
                    let target = reference_target(&mut self.pending, ctx);
                    target.push_str(&value);
                    target.push_str(&name[len..]);
                    return Ok(());
                }
            }
        }

        self.lenient(
            ErrorKind::UnexpectedCharacter,
            format!("unterminated entity reference &{}", name),
        )?;
        let target = reference_target(&mut self.pending, ctx);
        target.push('&');
        target.push_str(&name);
        Ok(())
    }

    fn resolve_char_reference(&mut self, ctx: EntityContext) -> SaxResult<()> {
        let raw = mem::take(&mut self.pending.entity);
        let (digits, is_hex) = split_char_reference(self.syntax, &raw);
        match resolve_numeric(digits, is_hex, self.syntax) {
            Ok(c) => {
                reference_target(&mut self.pending, ctx).push(c);
                Ok(())
            }
            Err(err) => {
                self.recoverable(err.kind(), err.to_string())?;
                let target = reference_target(&mut self.pending, ctx);
                target.push_str("&#");
                target.push_str(&raw);
                target.push(';');
                Ok(())
            }
        }
    }

    fn unterminated_char_reference(&mut self, ctx: EntityContext) -> SaxResult<()> {
        let raw = mem::take(&mut self.pending.entity);
        self.lenient(
            ErrorKind::UnexpectedCharacter,
            format!("character reference &#{} without ;", raw),
        )?;
        if self.options.permissive_entities && !raw.is_empty() {
            let (digits, is_hex) = split_char_reference(self.syntax, &raw);
            if let Ok(c) = resolve_numeric(digits, is_hex, self.syntax) {
                reference_target(&mut self.pending, ctx).push(c);
                return Ok(());
            }
        }
        let target = reference_target(&mut self.pending, ctx);
        target.push_str("&#");
        target.push_str(&raw);
        Ok(())
    }

    /// Complete or report whatever token is open at end of input
    fn finish_pending(&mut self) -> SaxResult<()> {
        use ParserState::*;
        let state = mem::replace(&mut self.state, Text);
        match state {
            Begin | Text | RawText => Ok(()),
            RawTextLessThan => {
                self.pending.text.push('<');
                Ok(())
            }
            RawTextEndTagName => {
                let end = mem::take(&mut self.pending.raw_end);
                self.pending.text.push_str("</");
                self.pending.text.push_str(&end);
                Ok(())
            }
            TagOpenStart => {
                self.lenient(ErrorKind::UnexpectedCharacter, "unescaped < in text")?;
                self.pending.text.push('<');
                Ok(())
            }
            EntityRef(ctx) => {
                self.unterminated_named_reference(ctx, None)?;
                if ctx.in_attribute() {
                    self.unterminated("tag")?;
                }
                Ok(())
            }
            CharRef(ctx) => {
                self.unterminated_char_reference(ctx)?;
                if ctx.in_attribute() {
                    self.unterminated("tag")?;
                }
                Ok(())
            }
            CommentStart | CommentBody | CommentEndDash | CommentEnd => {
                self.unterminated("comment")
            }
            CData | CDataEndBracket | CDataEnd => self.unterminated("CDATA section"),
            ParserState::ProcessingInstruction | ProcessingInstructionBody | ProcessingInstructionEnd => {
                self.unterminated("processing instruction")
            }
            Doctype | DoctypeQuoted(_) | DoctypeInternalSubset | DoctypeInternalSubsetQuoted(_) => {
                self.unterminated("doctype")
            }
            MarkupDeclarationOpen | BogusDeclaration | BogusDeclarationQuoted(_) => {
                self.unterminated("declaration")
            }
            TagName | BeforeAttributeName | AttributeName | AfterAttributeName
            | BeforeAttributeValue | AttributeValueQuoted(_) | AttributeValueClosed
            | AttributeValueUnquoted | TagSelfClosing | EndTagName | AfterEndTagName => {
                self.unterminated("tag")
            }
        }
    }
}

fn reference_target(pending: &mut PendingToken, ctx: EntityContext) -> &mut String {
    match ctx {
        EntityContext::Text => &mut pending.text,
        EntityContext::AttributeQuoted(_) | EntityContext::AttributeUnquoted => {
            &mut pending.attr_value
        }
    }
}

/// Split `x1F` into its digits and radix marker
fn split_char_reference(syntax: Syntax, raw: &str) -> (&str, bool) {
    if let Some(digits) = raw.strip_prefix('x') {
        return (digits, true);
    }
    if syntax == Syntax::Html {
        if let Some(digits) = raw.strip_prefix('X') {
            return (digits, true);
        }
    }
    (raw, false)
}

/// Whether `seen` may still grow into `--`, `[CDATA[` or `DOCTYPE`
fn is_declaration_prefix(seen: &str) -> bool {
    "--".starts_with(seen)
        || "[CDATA[".starts_with(seen)
        || "DOCTYPE"
            .get(..seen.len())
            .is_some_and(|p| p.eq_ignore_ascii_case(seen))
}

fn is_xml_version(version: &str) -> bool {
    version
        .strip_prefix("1.")
        .is_some_and(|minor| !minor.is_empty() && minor.bytes().all(|b| b.is_ascii_digit()))
}

/// Parse `name="value"` pairs out of an XML declaration body
fn parse_pseudo_attributes(body: &str) -> Result<Vec<(&str, &str)>, String> {
    let is_space = |c: char| crate::chars::is_whitespace(c);
    let mut pairs = Vec::new();
    let mut rest = body.trim_start_matches(is_space);
    while !rest.is_empty() {
        let eq = rest
            .find('=')
            .ok_or_else(|| format!("expected = after {:?}", rest))?;
        let name = rest[..eq].trim_end_matches(is_space);
        let after = rest[eq + 1..].trim_start_matches(is_space);
        let quote = after
            .chars()
            .next()
            .filter(|&c| is_quote(c))
            .ok_or_else(|| format!("value of {} must be quoted", name))?;
        let value_len = after[1..]
            .find(quote)
            .ok_or_else(|| format!("unterminated value of {}", name))?;
        pairs.push((name, &after[1..1 + value_len]));

        rest = &after[2 + value_len..];
        if !rest.is_empty() && !rest.starts_with(is_space) {
            return Err(format!("missing whitespace after {}", name));
        }
        rest = rest.trim_start_matches(is_space);
    }
    Ok(pairs)
}
