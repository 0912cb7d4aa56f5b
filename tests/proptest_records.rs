//! Property-based tests with proptest.
//!
//! Records read through the chunked reader must match a plain split of
//! the content, whatever the chunk size, and field lookup must agree
//! with iteration.

mod common;

use std::io::Cursor;

use common::{data_file, quoted, run_chunked};
use grain::Delimiter;
use grain::reader::load_record;
use grain::scanner::{field_end, first_field, next_field, skip_fields};
use proptest::prelude::*;

/// Reference split: a trailing delimiter does not start another record.
fn split_records(content: &[u8], delim: &[u8]) -> Vec<Vec<u8>> {
    let mut records = Vec::new();
    let mut start = 0;
    while start < content.len() {
        match content[start..].windows(delim.len()).position(|w| w == delim) {
            Some(pos) => {
                records.push(content[start..start + pos].to_vec());
                start += pos + delim.len();
            }
            None => {
                records.push(content[start..].to_vec());
                break;
            }
        }
    }
    records
}

fn read_all(content: &[u8], delim: &Delimiter, chunk_size: usize) -> Vec<Vec<u8>> {
    let mut source = Cursor::new(content.to_vec());
    let mut buf = Vec::new();
    let mut records = Vec::new();
    while load_record(&mut buf, &mut source, delim, 0, chunk_size).expect("read") {
        records.push(buf.clone());
    }
    records
}

fn iterate(buf: &[u8], delim: &Delimiter) -> Vec<Vec<u8>> {
    let mut fields = Vec::new();
    let mut start = first_field(buf, delim, 0, buf.len());
    while let Some(s) = start {
        let stop = field_end(buf, delim, s, buf.len());
        fields.push(buf[s..stop].to_vec());
        start = next_field(buf, delim, stop, buf.len());
    }
    fields
}

/// Bytes drawn mostly from the delimiter alphabet so matches, partial
/// matches and overlaps are common.
fn content_bytes() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(prop::sample::select(b"a\n,:<=>".to_vec()), 0..80)
}

fn delimiter() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        Just(b"\n".to_vec()),
        Just(b",".to_vec()),
        Just(b"::".to_vec()),
        Just(b"<=>".to_vec()),
    ]
}

proptest! {
    #[test]
    fn records_match_reference_split(
        content in content_bytes(),
        delim in delimiter(),
        chunk_size in 1usize..16,
    ) {
        let records = read_all(&content, &Delimiter::Literal(delim.clone()), chunk_size);
        prop_assert_eq!(records, split_records(&content, &delim));
    }

    #[test]
    fn records_reconstruct_content(
        content in "[a-z\n]{0,60}",
        chunk_size in 1usize..12,
    ) {
        let records = read_all(content.as_bytes(), &Delimiter::newline(), chunk_size);
        let mut joined = records.join(&b'\n');
        if content.ends_with('\n') {
            joined.push(b'\n');
        }
        prop_assert_eq!(joined, content.into_bytes());
    }

    #[test]
    fn whitespace_records_are_words(
        content in "[a-z \t\n]{0,60}",
        chunk_size in 1usize..12,
    ) {
        let records = read_all(content.as_bytes(), &Delimiter::Whitespace, chunk_size);
        let words: Vec<Vec<u8>> = content
            .split_ascii_whitespace()
            .map(|w| w.as_bytes().to_vec())
            .collect();
        prop_assert_eq!(records, words);
    }

    #[test]
    fn skip_fields_agrees_with_iteration(
        fields in prop::collection::vec("[a-z]{0,5}", 1..8),
    ) {
        let buf = fields.join(",").into_bytes();
        let delim = Delimiter::from_bytes(b",");
        let iterated = iterate(&buf, &delim);
        prop_assert_eq!(iterated.len(), fields.len());
        for (index, expected) in iterated.iter().enumerate() {
            let start = skip_fields(&buf, &delim, index, 0, buf.len());
            prop_assert!(start.is_some());
            let start = start.unwrap_or_default();
            let stop = field_end(&buf, &delim, start, buf.len());
            prop_assert_eq!(&buf[start..stop], expected.as_slice());
        }
        prop_assert_eq!(skip_fields(&buf, &delim, fields.len(), 0, buf.len()), None);
    }

    #[test]
    fn script_prints_every_record(
        lines in prop::collection::vec("[a-z]{1,6}", 1..10),
        chunk_size in 1usize..10,
    ) {
        let mut content = lines.join("\n");
        content.push('\n');
        let data = data_file(content.as_bytes());
        let script = format!("file rows {}\nin rows\nprint $, '|'\nout\n", quoted(&data));
        let (result, out) = run_chunked(&script, chunk_size);
        prop_assert!(result.is_ok());
        let expected: String = lines.iter().map(|l| format!("{l}|")).collect();
        prop_assert_eq!(out, expected);
    }
}
