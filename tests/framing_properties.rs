//! Property-based tests for the protocol readers and codecs.
//!
//! Framing must not depend on how the byte stream is chunked, and the
//! encoders must round-trip through their decoders.

use mail_table_gateway::protocol::tcp_lookup::{format_response, ReplyCode};
use mail_table_gateway::protocol::{
    decode_lookup_data, encode_lookup_data, netstring, read_frames, Frame, FrameReader,
    LineReader, NetstringReader, PolicyReader,
};
use proptest::prelude::*;

/// Feed `input` split at `cuts` and collect every frame.
fn chunked<R: FrameReader>(mut reader: R, input: &[u8], cuts: &[usize]) -> Vec<Frame<R::Request>> {
    let mut points: Vec<usize> = cuts.iter().map(|c| c % (input.len() + 1)).collect();
    points.sort_unstable();
    points.dedup();

    let mut frames = Vec::new();
    let mut start = 0;
    for end in points.into_iter().chain(std::iter::once(input.len())) {
        frames.extend(read_frames(&mut reader, &input[start..end]));
        start = end;
        if matches!(frames.last(), Some(Frame::Broken(_))) {
            break;
        }
    }
    frames
}

fn whole<R: FrameReader>(mut reader: R, input: &[u8]) -> Vec<Frame<R::Request>> {
    read_frames(&mut reader, input)
}

fn lookup_lines() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec("get [a-z%0-9 ]{0,20}", 0..6).prop_map(|lines| {
        lines
            .into_iter()
            .flat_map(|l| format!("{}\n", l).into_bytes())
            .collect()
    })
}

fn policy_paragraphs() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(prop::collection::vec(("[a-z_]{1,10}", "[ -~]{0,20}"), 0..5), 0..4)
        .prop_map(|paragraphs| {
            let mut out = String::new();
            for attributes in paragraphs {
                for (name, value) in attributes {
                    out.push_str(&format!("{}={}\n", name, value.replace('\n', "")));
                }
                out.push('\n');
            }
            out.into_bytes()
        })
}

proptest! {
    #[test]
    fn prop_line_framing_ignores_chunking(
        input in lookup_lines(),
        cuts in prop::collection::vec(any::<usize>(), 0..8)
    ) {
        prop_assert_eq!(
            chunked(LineReader::new(), &input, &cuts),
            whole(LineReader::new(), &input)
        );
    }

    #[test]
    fn prop_netstring_framing_ignores_chunking(
        payloads in prop::collection::vec("[ -~]{0,40}", 0..6),
        cuts in prop::collection::vec(any::<usize>(), 0..8)
    ) {
        let input = netstring::encode_all(&payloads).into_bytes();
        let expected: Vec<_> = payloads.into_iter().map(Frame::Complete).collect();
        prop_assert_eq!(chunked(NetstringReader::new(), &input, &cuts), expected.clone());
        prop_assert_eq!(whole(NetstringReader::new(), &input), expected);
    }

    #[test]
    fn prop_garbage_framing_ignores_chunking(
        input in prop::collection::vec(any::<u8>(), 0..64),
        cuts in prop::collection::vec(any::<usize>(), 0..8)
    ) {
        prop_assert_eq!(
            chunked(NetstringReader::new(), &input, &cuts),
            whole(NetstringReader::new(), &input)
        );
        prop_assert_eq!(
            chunked(PolicyReader::new(), &input, &cuts),
            whole(PolicyReader::new(), &input)
        );
    }

    #[test]
    fn prop_policy_framing_ignores_chunking(
        input in policy_paragraphs(),
        cuts in prop::collection::vec(any::<usize>(), 0..8)
    ) {
        let frames = whole(PolicyReader::new(), &input);
        prop_assert!(frames.iter().all(|f| matches!(f, Frame::Complete(_))));
        prop_assert_eq!(chunked(PolicyReader::new(), &input, &cuts), frames);
    }

    #[test]
    fn prop_netstring_round_trip(s in "[^\\p{Cc}]{0,64}") {
        prop_assert_eq!(netstring::parse_one(&netstring::encode(&s)).unwrap(), s);
    }

    #[test]
    fn prop_lookup_data_round_trip(s in "\\PC{0,64}") {
        prop_assert_eq!(decode_lookup_data(&encode_lookup_data(&s)), s);
    }

    #[test]
    fn prop_lookup_reply_never_contains_raw_low_bytes(s in "[\\x00-\\x7f]{0,64}") {
        let reply = format_response(ReplyCode::Success, &s).unwrap();
        let data = &reply[4..reply.len() - 1];
        prop_assert!(data.iter().all(|&b| b > 0x20 && b != 0x7f));
        prop_assert_eq!(decode_lookup_data(std::str::from_utf8(data).unwrap()), s);
    }
}

#[test]
fn netstring_examples() {
    assert_eq!(netstring::encode(""), "0:,");
    assert_eq!(netstring::parse("1:a,2:bc,").unwrap(), vec!["a", "bc"]);
    assert!(netstring::parse_one("1:a,2:bc,").is_err());
}
