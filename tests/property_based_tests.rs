// Property-based tests using proptest
// Framing must survive any payload; query helpers must survive any text and position

use lsp_types::Position;
use proptest::prelude::*;
use quill::index::extract_symbols;
use quill::lsp::codec::{FrameReader, FrameWriter};
use quill::query::context::{completion_query, identifier_at, line_prefix, symbol_at};
use quill::query::signature::{call_site, parameter_offsets};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// Property: whatever goes into a frame comes back out byte for byte, in order,
// including payloads that themselves contain CRLF and non-ASCII text
proptest! {
    #[test]
    fn frames_round_trip(payloads in prop::collection::vec("(\\PC|\r\n){0,40}", 1..6)) {
        let received = runtime().block_on(async {
            let (a, b) = tokio::io::duplex(1 << 16);
            let mut writer = FrameWriter::new(a);
            for payload in &payloads {
                writer.write_frame(payload.as_bytes()).await.unwrap();
            }
            drop(writer);

            let mut reader = FrameReader::new(b);
            let mut received = Vec::new();
            while let Some(frame) = reader.read_frame().await.unwrap() {
                received.push(String::from_utf8(frame).unwrap());
            }
            received
        });
        prop_assert_eq!(received, payloads);
    }
}

// Property: the extractor never panics and only reports lines that exist
proptest! {
    #[test]
    fn extract_symbols_stays_in_bounds(
        text in "((local |function |return |--- |@param )?[a-zA-Z_.:=(){}, ]{0,20}\n){0,12}"
    ) {
        let lines = text.lines().count();
        for symbol in extract_symbols(&text, "m") {
            prop_assert!(symbol.line < lines.max(1));
        }
    }
}

// Property: the backward call scan never panics and never reports a callee
// that is not in the scanned text
proptest! {
    #[test]
    fn call_site_never_panics(before in "[a-z_.:(){}\\[\\],\"' -]{0,40}") {
        if let Some(site) = call_site(&before) {
            prop_assert!(before.contains(&site.callee));
        }
    }
}

// Property: arbitrary positions, even far past the end of the text, are clamped
proptest! {
    #[test]
    fn positions_are_clamped(
        text in "[a-zé😀.:\n ]{0,40}",
        line in 0u32..8,
        character in 0u32..64
    ) {
        let position = Position::new(line, character);
        let prefix = line_prefix(&text, position);
        prop_assert!(text.contains(prefix));
        let _ = completion_query(prefix);
        let _ = symbol_at(&text, position);
        for l in text.lines() {
            for col in (0..=l.len()).filter(|&col| l.is_char_boundary(col)) {
                let _ = identifier_at(l, col);
            }
        }
    }
}

// Property: parameter offsets always lie inside the label and never overlap
proptest! {
    #[test]
    fn parameter_offsets_are_ordered(name in "[a-z]{1,6}", params in prop::collection::vec("[a-zé]{1,5}", 0..5)) {
        let label = format!("{}({})", name, params.join(", "));
        let offsets = parameter_offsets(&label);
        prop_assert_eq!(offsets.len(), params.len());
        let width = label.encode_utf16().count() as u32;
        for pair in offsets.windows(2) {
            prop_assert!(pair[0][1] <= pair[1][0]);
        }
        for [from, to] in offsets {
            prop_assert!(from < to && to <= width);
        }
    }
}
