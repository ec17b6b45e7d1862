//! Property tests for stream splitting.
//!
//! Verifies:
//! 1. Parsing a string in pieces yields the same runs as parsing it whole
//! 2. Escape introducers and stray controls never appear in run text
//! 3. Telnet commands are removed from data and refused once each
//! 4. IAC decoding does not depend on where the byte stream is split
//! 5. Byte decoding, and the runs parsed from it, do not depend on where
//!    the raw bytes are split

use bbsterm::core::telnet::protocol::{DO, DONT, IAC, WILL, WONT};
use bbsterm::core::telnet::{IacDecoder, NegotiationPolicy};
use bbsterm::core::term::merge_runs;
use bbsterm::{decode_lossy, EscapeSequenceParser, StyledRun, TextDecoder};
use proptest::prelude::*;

// ── Strategy helpers ──────────────────────────────────────────────────

/// Fragments of typical BBS output, including broken and foreign sequences
fn arb_fragment() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z0-9 .:]{1,8}",
        Just("\x1b[".to_string()),
        Just("\x1b[1;31m".to_string()),
        Just("\x1b[0m".to_string()),
        Just("\x1b[m".to_string()),
        Just("\x1b[38;5;208m".to_string()),
        Just("\x1b[48;2;10;20;30m".to_string()),
        Just("\x1b[2J".to_string()),
        Just("\x1b[?25l".to_string()),
        Just("\x1b]0;Title\x07".to_string()),
        Just("\x1b]2;Other\x1b\\".to_string()),
        Just("\x1bP1$r\x1b\\".to_string()),
        Just("\u{9b}4m".to_string()),
        Just("\x1b".to_string()),
        Just(";".to_string()),
        Just("\r\n".to_string()),
        Just("\t".to_string()),
        Just("\x07\x08".to_string()),
        Just("═╬█".to_string()),
        Just("é".to_string()),
    ]
}

fn arb_ansi_text() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_fragment(), 0..24).prop_map(|parts| parts.concat())
}

/// Character offsets to split at, turned into byte offsets later
fn arb_cuts() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0usize..256, 0..6)
}

fn split_at_chars(input: &str, cuts: &[usize]) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut points: Vec<usize> = cuts.iter().map(|c| c % (chars.len() + 1)).collect();
    points.sort_unstable();
    points.dedup();

    let mut pieces = Vec::new();
    let mut start = 0;
    for point in points.into_iter().chain(std::iter::once(chars.len())) {
        pieces.push(chars[start..point].iter().collect());
        start = point;
    }
    pieces
}

/// Raw bytes from a BBS: valid UTF-8, CP437 art, escapes, and truncations
fn arb_raw_bytes() -> impl Strategy<Value = Vec<u8>> {
    let fragment = prop_oneof![
        3 => prop::collection::vec(any::<u8>(), 1..8),
        1 => arb_fragment().prop_map(String::into_bytes),
        1 => Just(vec![0xE2, 0x95]),
        1 => Just(vec![0xF0, 0x9F, 0x98]),
    ];
    prop::collection::vec(fragment, 0..16).prop_map(|parts| parts.concat())
}

fn split_bytes<'a>(bytes: &'a [u8], cuts: &[usize]) -> Vec<&'a [u8]> {
    let mut points: Vec<usize> = cuts.iter().map(|c| c % (bytes.len() + 1)).collect();
    points.sort_unstable();
    points.dedup();

    let mut pieces = Vec::new();
    let mut start = 0;
    for point in points.into_iter().chain(std::iter::once(bytes.len())) {
        pieces.push(&bytes[start..point]);
        start = point;
    }
    pieces
}

fn parse_whole(input: &str) -> (Vec<StyledRun>, EscapeSequenceParser) {
    let mut parser = EscapeSequenceParser::new();
    let runs = merge_runs(parser.parse(input));
    (runs, parser)
}

fn parse_pieces(pieces: &[String]) -> (Vec<StyledRun>, EscapeSequenceParser) {
    let mut parser = EscapeSequenceParser::new();
    let runs = merge_runs(pieces.iter().flat_map(|p| parser.parse(p)).collect::<Vec<_>>());
    (runs, parser)
}

/// Data bytes interleaved with negotiation commands
#[derive(Clone, Debug)]
enum Chunk {
    Data(Vec<u8>),
    Command(u8, u8),
}

fn arb_chunk() -> impl Strategy<Value = Chunk> {
    prop_oneof![
        3 => prop::collection::vec(0u8..0xFF, 1..16).prop_map(Chunk::Data),
        1 => (prop_oneof![Just(DO), Just(WILL)], any::<u8>()).prop_map(|(v, o)| Chunk::Command(v, o)),
    ]
}

// ── Properties ────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn parse_is_independent_of_chunking(input in arb_ansi_text(), cuts in arb_cuts()) {
        let pieces = split_at_chars(&input, &cuts);
        let (whole, whole_parser) = parse_whole(&input);
        let (split, split_parser) = parse_pieces(&pieces);

        prop_assert_eq!(whole, split);
        prop_assert_eq!(whole_parser.attributes(), split_parser.attributes());
        prop_assert_eq!(whole_parser.title(), split_parser.title());
        prop_assert_eq!(whole_parser.partial_sequence(), split_parser.partial_sequence());
    }

    #[test]
    fn escape_syntax_never_leaks(input in arb_ansi_text(), cuts in arb_cuts()) {
        let (runs, _) = parse_pieces(&split_at_chars(&input, &cuts));

        for run in &runs {
            prop_assert!(!run.text.is_empty());
            for ch in run.text.chars() {
                prop_assert!(ch != '\x1b' && ch != '\u{9b}', "escape in {:?}", run.text);
                prop_assert!(
                    ch >= ' ' || ch == '\n' || ch == '\t',
                    "control {:?} in {:?}",
                    ch,
                    run.text
                );
            }
        }
        for pair in runs.windows(2) {
            prop_assert_ne!(pair[0].attrs, pair[1].attrs);
        }
    }

    #[test]
    fn commands_are_stripped_and_refused(chunks in prop::collection::vec(arb_chunk(), 0..24)) {
        let mut wire = Vec::new();
        let mut expected_data = Vec::new();
        let mut expected_replies = Vec::new();

        for chunk in &chunks {
            match chunk {
                Chunk::Data(bytes) => {
                    wire.extend_from_slice(bytes);
                    expected_data.extend_from_slice(bytes);
                }
                Chunk::Command(verb, opt) => {
                    wire.extend_from_slice(&[IAC, *verb, *opt]);
                    let refusal = if *verb == DO { WONT } else { DONT };
                    expected_replies.push(vec![IAC, refusal, *opt]);
                }
            }
        }

        let out = IacDecoder::new(NegotiationPolicy::refuse_all()).decode(&wire);
        prop_assert_eq!(out.data, expected_data);
        prop_assert_eq!(out.replies, expected_replies);
    }

    #[test]
    fn byte_decoding_is_independent_of_chunking(bytes in arb_raw_bytes(), cuts in arb_cuts()) {
        let whole_text = decode_lossy(&bytes);

        let mut decoder = TextDecoder::new();
        let mut chunk_texts: Vec<String> = split_bytes(&bytes, &cuts)
            .into_iter()
            .map(|piece| decoder.decode(piece))
            .collect();
        chunk_texts.push(decoder.finish());

        prop_assert_eq!(chunk_texts.concat(), whole_text.clone());

        let (whole_runs, _) = parse_whole(&whole_text);
        let (split_runs, _) = parse_pieces(&chunk_texts);
        prop_assert_eq!(whole_runs, split_runs);
    }

    #[test]
    fn iac_decoding_is_independent_of_chunking(
        bytes in prop::collection::vec(any::<u8>(), 0..128),
        cuts in arb_cuts(),
    ) {
        let whole = IacDecoder::new(NegotiationPolicy::refuse_all()).decode(&bytes);

        let mut decoder = IacDecoder::new(NegotiationPolicy::refuse_all());
        let mut data = Vec::new();
        let mut replies = Vec::new();
        for piece in split_bytes(&bytes, &cuts) {
            let out = decoder.decode(piece);
            data.extend(out.data);
            replies.extend(out.replies);
        }

        prop_assert_eq!(whole.data, data);
        prop_assert_eq!(whole.replies, replies);
    }
}
