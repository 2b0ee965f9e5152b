//! End-to-end behaviour through the public API

use brackish_sax::{
    encode, parse_str, ErrorKind, Event, EventRecorder, NamespaceBinding, ParserOptions, Parser,
    Position, Tokenizer, XMLNS_NAMESPACE,
};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

const DOCUMENTS: &[&str] = &[
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\r\n<!DOCTYPE doc [<!ENTITY x 'y'>]>\n<doc a=\"1\" b='&amp;&#x41;'>\r\n  text &lt; more<!-- c - c --><![CDATA[ ]] > ]]><?pi body?>\n  <e/><f g=\"h\"></f>\n</doc>\n",
    "<root xmlns=\"urn:d\" xmlns:p=\"urn:p\"><p:a p:x=\"1\"><b xmlns=\"\"/></p:a></root>",
    "<a>caf\u{e9} \u{1F980} &#128512; \u{2028}</a>",
];

const HTML_DOCUMENTS: &[&str] = &[
    "<!doctype html><P class=x id=\"y\" hidden>a &copy b &amp c &notit</p><script>if (a<b && c>d) {}</script><br/>",
    "text <b>bold<i>both</b> & more<!-->",
];

fn events_whole(options: &ParserOptions, input: &str) -> Vec<Event> {
    let mut tokenizer = Tokenizer::new(options.clone(), EventRecorder::new());
    let _ = tokenizer.write(input).and_then(|_| tokenizer.close());
    tokenizer.into_sink().into_events()
}

fn events_chunked(options: &ParserOptions, chunks: &[&str]) -> Vec<Event> {
    let mut tokenizer = Tokenizer::new(options.clone(), EventRecorder::new());
    let result = chunks
        .iter()
        .try_for_each(|chunk| tokenizer.write(chunk))
        .and_then(|_| tokenizer.close());
    let _ = result;
    tokenizer.into_sink().into_events()
}

fn split_points(input: &str) -> impl Iterator<Item = usize> + '_ {
    (0..=input.len()).filter(|&i| input.is_char_boundary(i))
}

fn assert_chunking_invariant(options: &ParserOptions, input: &str) {
    let expected = events_whole(options, input);

    for at in split_points(input) {
        let (head, tail) = input.split_at(at);
        assert_eq!(
            events_chunked(options, &[head, tail]),
            expected,
            "split at byte {} of {:?}",
            at,
            input
        );
    }

    let chars: Vec<String> = input.chars().map(String::from).collect();
    let chars: Vec<&str> = chars.iter().map(String::as_str).collect();
    assert_eq!(events_chunked(options, &chars), expected, "one char at a time");
}

#[test]
fn test_chunking_invariance_xml() {
    init();
    let strict = ParserOptions::strict();
    let namespaced = ParserOptions::strict().with_namespaces(true);
    for doc in DOCUMENTS {
        assert_chunking_invariant(&strict, doc);
        assert_chunking_invariant(&namespaced, doc);
    }
}

#[test]
fn test_chunking_invariance_permissive() {
    init();
    let html = ParserOptions::html();
    let permissive = ParserOptions::permissive().with_report_leniencies(true);
    for doc in HTML_DOCUMENTS {
        assert_chunking_invariant(&html, doc);
        assert_chunking_invariant(&permissive, doc);
    }
}

#[test]
fn test_chunking_invariance_with_small_buffers() {
    init();
    let options = ParserOptions::permissive().with_max_buffer_length(8);
    let input = "<a>a fairly long run of text</a><![CDATA[and a long cdata section]]>";
    assert_chunking_invariant(&options, input);

    let shaped = ParserOptions::permissive()
        .with_max_buffer_length(8)
        .with_trim(true)
        .with_normalize(true);
    assert_chunking_invariant(&shaped, "<a>  a fairly \r\n long   run of\rtext  </a>");
}

#[test]
fn test_byte_input_matches_text_input() {
    init();
    let options = ParserOptions::strict();
    for doc in DOCUMENTS {
        let expected = events_whole(&options, doc);
        let bytes = doc.as_bytes();
        for at in 0..=bytes.len() {
            let parser = Parser::new(options.clone(), EventRecorder::new());
            let (head, tail) = bytes.split_at(at);
            let _ = parser
                .write_bytes(head)
                .and_then(|_| parser.write_bytes(tail))
                .and_then(|_| parser.close());
            assert_eq!(parser.into_sink().into_events(), expected, "split at {}", at);
        }
    }
}

#[test]
fn test_entity_round_trip() {
    init();
    let samples = ["plain", "a < b & c > d", "\"quoted\" and 'single'", "&amp; already"];
    for sample in samples {
        let doc = format!("<a v=\"{}\">{}</a>", encode(sample), encode(sample));
        let recorder = parse_str(&doc, ParserOptions::strict(), EventRecorder::new()).unwrap();
        assert_eq!(recorder.text(), sample);
        let value = recorder.events.iter().find_map(|e| match e {
            Event::Attribute(attr) => Some(attr.value.clone()),
            _ => None,
        });
        assert_eq!(value.as_deref(), Some(sample));
    }
}

#[test]
fn test_namespace_events() {
    init();
    let options = ParserOptions::strict().with_namespaces(true);
    let recorder = parse_str(
        "<a xmlns:p='u'><p:b p:c='1' d='2'/></a>",
        options,
        EventRecorder::new(),
    )
    .unwrap();

    let binding = NamespaceBinding::new("p", "u");
    let events = &recorder.events;
    assert_eq!(events[0], Event::OpenTagStart("a".into()));
    assert_eq!(events[1], Event::OpenNamespace(binding.clone()));

    let attrs: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::Attribute(attr) => Some(attr),
            _ => None,
        })
        .collect();
    assert_eq!(attrs.len(), 3);
    assert_eq!(attrs[0].ns.as_ref().unwrap().uri.as_deref(), Some(XMLNS_NAMESPACE));
    assert_eq!(attrs[1].ns.as_ref().unwrap().uri.as_deref(), Some("u"));
    assert_eq!(attrs[2].ns.as_ref().unwrap().uri, None);

    let n = events.len();
    assert_eq!(events[n - 1], Event::End);
    assert_eq!(events[n - 2], Event::CloseNamespace(binding));
}

#[test]
fn test_hidden_xmlns_attributes() {
    init();
    let mut options = ParserOptions::strict().with_namespaces(true);
    options.expose_xmlns_attributes = false;
    let recorder = parse_str("<a xmlns='urn:x' id='1'/>", options, EventRecorder::new()).unwrap();
    let names: Vec<_> = recorder
        .events
        .iter()
        .filter_map(|e| match e {
            Event::Attribute(attr) => Some(attr.name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(names, vec!["id"]);
}

#[test]
fn test_additional_namespaces() {
    init();
    let options = ParserOptions::strict()
        .with_namespaces(true)
        .with_namespace("svg", "http://www.w3.org/2000/svg");
    let recorder = parse_str("<svg:rect/>", options, EventRecorder::new()).unwrap();
    let uri = recorder.events.iter().find_map(|e| match e {
        Event::OpenTagEnd(tag) => tag.ns.as_ref().and_then(|ns| ns.uri.clone()),
        _ => None,
    });
    assert_eq!(uri.as_deref(), Some("http://www.w3.org/2000/svg"));
}

#[test]
fn test_reserved_prefix_is_rejected() {
    init();
    let options = ParserOptions::strict().with_namespaces(true);
    let err = parse_str("<a xmlns:xml='urn:nope'/>", options, EventRecorder::new()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::ReservedPrefix);
}

#[test]
fn test_positions_track_lines() {
    init();
    let mut tokenizer = Tokenizer::new(ParserOptions::strict(), EventRecorder::new());
    tokenizer.write("<a>\r").unwrap();
    tokenizer.write("\nx\ny").unwrap();
    assert_eq!(tokenizer.position(), Position::new(3, 1, 8));
}

#[test]
fn test_fragment_mode_allows_many_roots() {
    init();
    let options = ParserOptions::strict().with_fragment(true);
    let recorder = parse_str("one <a/> two <b/>", options, EventRecorder::new()).unwrap();
    assert_eq!(recorder.errors().count(), 0);
    assert_eq!(recorder.text(), "one  two ");
}

#[test]
fn test_options_from_json() {
    init();
    let options: ParserOptions =
        serde_json::from_str(r#"{"strict": false, "namespaces": true, "syntax": "Html"}"#).unwrap();
    assert!(!options.strict);
    let recorder = parse_str("<a b=c>", options, EventRecorder::new()).unwrap();
    assert_eq!(recorder.events.last(), Some(&Event::End));
}
