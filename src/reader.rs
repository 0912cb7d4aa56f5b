//! Chunked record reader.
//!
//! Records are pulled from a seekable source a chunk at a time. Bytes
//! read past the end of a record are pushed back by seeking, so the
//! source cursor always sits at the start of the next record.

use std::io::{self, Read, Seek, SeekFrom};

use tracing::trace;

use crate::scanner::{self, Delimiter};

/// Default number of bytes requested from the source per read.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Load record number `index`, counted from the source's current
/// cursor, into `buf`.
///
/// The `index` records before it are read and discarded. `buf` is
/// cleared first and its allocation reused. Returns `Ok(false)` when the
/// source runs out before the requested record, leaving `buf` empty.
pub fn load_record<R: Read + Seek>(
    buf: &mut Vec<u8>,
    source: &mut R,
    delim: &Delimiter,
    index: usize,
    chunk_size: usize,
) -> io::Result<bool> {
    let chunk_size = chunk_size.max(1);
    for skipped in 0..=index {
        let found = match delim {
            Delimiter::Literal(pattern) => read_literal(buf, source, delim, pattern.len(), chunk_size)?,
            Delimiter::Whitespace => read_word(buf, source, chunk_size)?,
            Delimiter::EachByte => read_byte(buf, source)?,
        };
        if !found {
            trace!(skipped, "end of data");
            buf.clear();
            return Ok(false);
        }
    }
    trace!(len = buf.len(), "record loaded");
    Ok(true)
}

/// Append up to `chunk_size` bytes, returning how many were read. Fewer
/// than requested means the source is exhausted.
fn fill_chunk<R: Read>(buf: &mut Vec<u8>, source: &mut R, chunk_size: usize) -> io::Result<usize> {
    let limit = u64::try_from(chunk_size).map_err(io::Error::other)?;
    source.by_ref().take(limit).read_to_end(buf)
}

/// Seek back over bytes that were read past the end of the record.
fn push_back<R: Seek>(source: &mut R, over_read: usize) -> io::Result<()> {
    if over_read > 0 {
        let offset = i64::try_from(over_read).map_err(io::Error::other)?;
        source.seek(SeekFrom::Current(-offset))?;
    }
    Ok(())
}

fn read_literal<R: Read + Seek>(
    buf: &mut Vec<u8>,
    source: &mut R,
    delim: &Delimiter,
    delim_len: usize,
    chunk_size: usize,
) -> io::Result<bool> {
    buf.clear();
    loop {
        // Back up far enough to catch a delimiter split across chunks.
        let scan_from = buf.len().saturating_sub(delim_len.saturating_sub(1));
        let read = fill_chunk(buf, source, chunk_size)?;

        if let Some(pos) = scanner::find_delimiter(buf, delim, scan_from, buf.len()) {
            push_back(source, buf.len() - pos - delim_len)?;
            buf.truncate(pos);
            return Ok(true);
        }

        if read < chunk_size {
            return Ok(!buf.is_empty());
        }
    }
}

fn read_word<R: Read + Seek>(buf: &mut Vec<u8>, source: &mut R, chunk_size: usize) -> io::Result<bool> {
    buf.clear();
    let mut begun = false;
    loop {
        let mut scan_from = buf.len();
        let read = fill_chunk(buf, source, chunk_size)?;

        if !begun {
            let Some(lead) = buf.iter().position(|&b| !scanner::is_whitespace(b)) else {
                buf.clear();
                if read < chunk_size {
                    return Ok(false);
                }
                continue;
            };
            buf.drain(..lead);
            begun = true;
            scan_from = 0;
        }

        if let Some(pos) = scanner::find_delimiter(buf, &Delimiter::Whitespace, scan_from, buf.len()) {
            // Only the first whitespace byte is consumed; the next call
            // skips the rest of the run.
            push_back(source, buf.len() - pos - 1)?;
            buf.truncate(pos);
            return Ok(true);
        }

        if read < chunk_size {
            return Ok(true);
        }
    }
}

fn read_byte<R: Read>(buf: &mut Vec<u8>, source: &mut R) -> io::Result<bool> {
    buf.clear();
    Ok(fill_chunk(buf, source, 1)? == 1)
}
