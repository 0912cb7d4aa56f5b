#![allow(dead_code)]

use std::io::Write;

use grain::{Config, Error, run};
use tempfile::NamedTempFile;

/// Write `content` to a fresh temp file. Keep the handle alive for as
/// long as the script needs the file.
pub fn data_file(content: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(content).expect("write temp file");
    file.flush().expect("flush temp file");
    file
}

/// Path of `file` as it would appear inside a grain quote.
pub fn quoted(file: &NamedTempFile) -> String {
    format!("'{}'", file.path().display())
}

/// Run `script` with the given chunk size, returning the output written
/// before it finished or failed.
pub fn run_chunked(script: &str, chunk_size: usize) -> (Result<(), Error>, String) {
    let mut out = Vec::new();
    let config = Config::new().with_chunk_size(chunk_size);
    let result = run(script.as_bytes(), config, &mut out);
    (result, String::from_utf8_lossy(&out).into_owned())
}

pub fn try_run(script: &str) -> (Result<(), Error>, String) {
    run_chunked(script, Config::default().chunk_size)
}

/// Run `script` and return its output, failing the test on error.
pub fn output(script: &str) -> String {
    let (result, out) = try_run(script);
    if let Err(e) = result {
        panic!("script failed: {e}\n--- script ---\n{script}\n--- output ---\n{out}");
    }
    out
}

/// Run `script`, which must fail, and return the error.
pub fn error(script: &str) -> Error {
    match try_run(script) {
        (Err(e), _) => e,
        (Ok(()), out) => panic!("script succeeded\n--- script ---\n{script}\n--- output ---\n{out}"),
    }
}
