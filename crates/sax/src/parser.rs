//! Shared parser handle
//!
//! [`Parser`] wraps a [`Tokenizer`] behind `&self` methods so that it can be
//! shared (for example through `Rc`) with the sink it feeds. Calls made from
//! inside an event callback are rejected with `ReentrancyViolation`, and the
//! outer call then halts with the same error.

use std::cell::{Cell, Ref, RefCell};
use std::str;

use crate::entities::EntityTable;
use crate::error::{ErrorKind, ParseError, SaxResult};
use crate::events::Sink;
use crate::options::ParserOptions;
use crate::position::Position;
use crate::tokenizer::Tokenizer;

/// Clears the busy flag when the guarded call returns
struct BusyGuard<'a>(&'a Cell<bool>);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

pub struct Parser<S: Sink> {
    inner: RefCell<Tokenizer<S>>,
    /// Incomplete UTF-8 sequence left over from the last `write_bytes`
    carry: RefCell<Vec<u8>>,
    busy: Cell<bool>,
    reentered: Cell<bool>,
}

impl<S: Sink> Parser<S> {
    pub fn new(options: ParserOptions, sink: S) -> Self {
        Self::from_tokenizer(Tokenizer::new(options, sink))
    }

    pub fn with_entities(options: ParserOptions, entities: EntityTable, sink: S) -> Self {
        Self::from_tokenizer(Tokenizer::with_entities(options, entities, sink))
    }

    fn from_tokenizer(tokenizer: Tokenizer<S>) -> Self {
        Self {
            inner: RefCell::new(tokenizer),
            carry: RefCell::new(Vec::new()),
            busy: Cell::new(false),
            reentered: Cell::new(false),
        }
    }

    fn enter(&self) -> SaxResult<BusyGuard<'_>> {
        if self.busy.replace(true) {
            self.reentered.set(true);
            log::warn!("parser called from inside an event callback");
            return Err(ParseError::new(
                ErrorKind::ReentrancyViolation,
                "parser called from inside an event callback",
                Position::default(),
            ));
        }
        Ok(BusyGuard(&self.busy))
    }

    fn check_reentry(&self, tokenizer: &mut Tokenizer<S>) -> SaxResult<()> {
        if self.reentered.replace(false) {
            return Err(tokenizer.halt(
                ErrorKind::ReentrancyViolation,
                "parser called from inside an event callback",
            ));
        }
        Ok(())
    }

    /// Feed a chunk of text
    pub fn write(&self, chunk: &str) -> SaxResult<()> {
        let _guard = self.enter()?;
        let mut tokenizer = self.inner.borrow_mut();
        tokenizer.ensure_writable()?;
        if !self.carry.borrow().is_empty() {
            return Err(tokenizer.halt(
                ErrorKind::InvalidEncoding,
                "incomplete UTF-8 sequence before text input",
            ));
        }
        self.feed(&mut tokenizer, chunk)
    }

    /// Feed raw UTF-8. A sequence split across calls is completed by the next
    /// call.
    pub fn write_bytes(&self, bytes: &[u8]) -> SaxResult<()> {
        let _guard = self.enter()?;
        let mut tokenizer = self.inner.borrow_mut();
        tokenizer.ensure_writable()?;

        let mut buffer = std::mem::take(&mut *self.carry.borrow_mut());
        buffer.extend_from_slice(bytes);

        let (valid, rest) = match str::from_utf8(&buffer) {
            Ok(text) => (text, &[][..]),
            Err(err) if err.error_len().is_none() => {
                let (head, tail) = buffer.split_at(err.valid_up_to());
                // `head` was just validated
                let text = str::from_utf8(head).unwrap_or_default();
                (text, tail)
            }
            Err(err) => {
                let valid = err.valid_up_to();
                let text = str::from_utf8(&buffer[..valid]).unwrap_or_default();
                self.feed(&mut tokenizer, text)?;
                return Err(tokenizer.halt(
                    ErrorKind::InvalidEncoding,
                    format!("invalid UTF-8 byte 0x{:02X}", buffer[valid]),
                ));
            }
        };
        self.feed(&mut tokenizer, valid)?;
        *self.carry.borrow_mut() = rest.to_vec();
        Ok(())
    }

    fn feed(&self, tokenizer: &mut Tokenizer<S>, chunk: &str) -> SaxResult<()> {
        for c in chunk.chars() {
            tokenizer.push_char(c)?;
            self.check_reentry(tokenizer)?;
        }
        Ok(())
    }

    /// End of input
    pub fn close(&self) -> SaxResult<()> {
        let _guard = self.enter()?;
        let mut tokenizer = self.inner.borrow_mut();
        tokenizer.ensure_writable()?;
        if !self.carry.borrow().is_empty() {
            self.carry.borrow_mut().clear();
            return Err(tokenizer.halt(
                ErrorKind::InvalidEncoding,
                "input ends inside a UTF-8 sequence",
            ));
        }
        let result = tokenizer.close();
        self.check_reentry(&mut tokenizer)?;
        result
    }

    /// Start over with the same configuration
    pub fn reset(&self) -> SaxResult<()> {
        let _guard = self.enter()?;
        self.inner.borrow_mut().reset();
        self.carry.borrow_mut().clear();
        self.reentered.set(false);
        Ok(())
    }

    /// Current position; the default position while a call is in progress
    pub fn position(&self) -> Position {
        self.inner
            .try_borrow()
            .map(|tokenizer| tokenizer.position())
            .unwrap_or_default()
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .try_borrow()
            .map(|tokenizer| tokenizer.is_closed())
            .unwrap_or(false)
    }

    /// Borrow the sink; `None` from inside a callback
    pub fn sink(&self) -> Option<Ref<'_, S>> {
        self.inner
            .try_borrow()
            .ok()
            .map(|tokenizer| Ref::map(tokenizer, |t| t.sink()))
    }

    pub fn into_sink(self) -> S {
        self.inner.into_inner().into_sink()
    }
}

/// Parse a complete document and hand back the sink
pub fn parse_str<S: Sink>(input: &str, options: ParserOptions, sink: S) -> Result<S, ParseError> {
    let mut tokenizer = Tokenizer::new(options, sink);
    tokenizer.write(input)?;
    tokenizer.close()?;
    Ok(tokenizer.into_sink())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Event, EventRecorder};
    use std::rc::{Rc, Weak};

    #[test]
    fn test_write_bytes_split_sequence() {
        let parser = Parser::new(ParserOptions::strict(), EventRecorder::new());
        let bytes = "<a>é€</a>".as_bytes();
        for byte in bytes {
            parser.write_bytes(std::slice::from_ref(byte)).unwrap();
        }
        parser.close().unwrap();
        assert_eq!(parser.sink().unwrap().text(), "é€");
    }

    #[test]
    fn test_invalid_utf8_is_fatal() {
        let parser = Parser::new(ParserOptions::permissive(), EventRecorder::new());
        let err = parser.write_bytes(b"<a>\xFFx</a>").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidEncoding);
        assert_eq!(parser.write("<b/>").unwrap_err(), err);
    }

    #[test]
    fn test_truncated_utf8_at_close() {
        let parser = Parser::new(ParserOptions::permissive(), EventRecorder::new());
        parser.write_bytes(b"<a>\xC3").unwrap();
        assert_eq!(parser.close().unwrap_err().kind, ErrorKind::InvalidEncoding);
    }

    struct Reentrant {
        parser: Weak<Parser<Reentrant>>,
        inner_result: Option<SaxResult<()>>,
    }

    impl Sink for Reentrant {
        fn on_open_tag_start(&mut self, _name: &str) {
            if let Some(parser) = self.parser.upgrade() {
                self.inner_result = Some(parser.write("<nested/>"));
            }
        }
    }

    #[test]
    fn test_reentrant_write_is_rejected() {
        let parser = Rc::new_cyclic(|weak| {
            Parser::new(
                ParserOptions::permissive(),
                Reentrant {
                    parser: weak.clone(),
                    inner_result: None,
                },
            )
        });
        let err = parser.write("<a>").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ReentrancyViolation);
        let sink = parser.sink().unwrap();
        let inner = sink.inner_result.clone().unwrap().unwrap_err();
        assert_eq!(inner.kind, ErrorKind::ReentrancyViolation);
        drop(sink);

        // Halted until reset
        assert_eq!(parser.write("x").unwrap_err().kind, ErrorKind::ReentrancyViolation);
        parser.reset().unwrap();
        assert!(parser.write("text").is_ok());
    }

    #[test]
    fn test_close_then_reset() {
        let parser = Parser::new(ParserOptions::strict(), EventRecorder::new());
        parser.write("<a/>").unwrap();
        parser.close().unwrap();
        assert!(parser.is_closed());
        assert_eq!(parser.write("<a/>").unwrap_err().kind, ErrorKind::ParserClosed);
        parser.reset().unwrap();
        parser.write("<b/>").unwrap();
        parser.close().unwrap();
        let events = parser.into_sink().into_events();
        assert_eq!(events.iter().filter(|e| **e == Event::End).count(), 2);
    }

    #[test]
    fn test_parse_str() {
        let recorder =
            parse_str("<a>hi</a>", ParserOptions::strict(), EventRecorder::new()).unwrap();
        assert_eq!(recorder.text(), "hi");
    }
}
