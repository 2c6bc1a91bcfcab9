//! PDF Cross-Reference Table Parser
//!
//! Locates the head of the xref chain from the end of the file, ingests
//! xref sections (one or more subsections of fixed 20-byte entries) and
//! merges them into the object table. Traversal runs from the newest
//! incremental update to the oldest, so "first seen wins" implements the
//! rule that later updates supersede earlier definitions.

use super::document::PdfObject;
use super::lexer::{positive_integer, Lexer};
use super::source::{rfind_bytes, ByteSource};
use super::{ParseError, ParseOptions, ParseResult};
use log::{info, warn};
use std::collections::HashMap;
use std::io::{Read, Seek};

/// Fixed size of one cross-reference entry, by the PDF specification.
pub(crate) const XREF_ENTRY_SIZE: usize = 20;

/// How far back from end-of-file `startxref` is expected.
pub(crate) const STARTXREF_WINDOW: usize = 512;

/// Locate the file offset of the newest xref section.
///
/// Scans the last [`STARTXREF_WINDOW`] bytes for the final `startxref`
/// marker and parses the offset on the following line. If that offset
/// points beyond the end of the file and fix mode is on, searches
/// backward in window-sized chunks for the literal `xref` instead.
pub(crate) fn hunt_for_xref<R: Read + Seek>(
    src: &mut ByteSource<R>,
    options: &ParseOptions,
) -> ParseResult<u64> {
    let size = src.size();
    if size == 0 {
        return Err(ParseError::XrefNotFound("empty file".to_string()));
    }
    let window = (STARTXREF_WINDOW as u64).min(size);
    let win_start = size - window;
    let tail = src.peek_at(win_start, window as usize)?;

    let sx = rfind_bytes(&tail, b"startxref")
        .ok_or_else(|| ParseError::XrefNotFound("no 'startxref' marker".to_string()))?;

    let mut p = sx + b"startxref".len();
    if p < tail.len() && tail[p] == 0x0d {
        p += 1;
    }
    if p < tail.len() && tail[p] == 0x0a {
        p += 1;
    }
    let line_end = tail[p..]
        .iter()
        .position(|&b| b == 0x0d || b == 0x0a)
        .map(|e| p + e)
        .ok_or_else(|| ParseError::XrefNotFound("missing startxref value".to_string()))?;
    let value = std::str::from_utf8(&tail[p..line_end])
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .ok_or_else(|| ParseError::XrefNotFound("invalid startxref value".to_string()))?;

    if value <= size {
        return Ok(value);
    }

    if !options.fix {
        return Err(ParseError::XrefNotFound(format!(
            "startxref value {value:#x} is beyond end of file"
        )));
    }
    warn!("startxref value {value:#x} is beyond end of file, hunting for 'xref'");

    let mut chunk_start = win_start;
    let mut chunk = tail;
    let mut search_end = sx; // exclude the startxref marker itself
    loop {
        if let Some(at) = rfind_bytes(&chunk[..search_end], b"xref") {
            let found = chunk_start + at as u64;
            if options.verbose {
                info!("xref section found at offset {found:#x}");
            }
            return Ok(found);
        }
        if chunk_start == 0 {
            return Err(ParseError::XrefNotFound(
                "no 'xref' section found while recovering".to_string(),
            ));
        }
        let back = (STARTXREF_WINDOW as u64).min(chunk_start);
        chunk_start -= back;
        // overlap a few bytes so a split 'xref' is still seen
        let len = ((back as usize) + 4).min((size - chunk_start) as usize);
        chunk = src.peek_at(chunk_start, len)?;
        search_end = chunk.len();
    }
}

/// Parse the xref section at `xref_start` and merge its entries.
///
/// On return the token following the section (normally `trailer`) is
/// current on the lexer.
pub(crate) fn parse_xref_table<R: Read + Seek>(
    by_id: &mut HashMap<u64, PdfObject>,
    lexer: &mut Lexer<R>,
    xref_start: u64,
    block_end: u64,
    options: &ParseOptions,
) -> ParseResult<()> {
    lexer.source_mut().fill(block_end - xref_start, xref_start)?;
    if options.verbose {
        info!("xref section at offset {xref_start:#x}");
    }

    lexer.next_token()?;
    if lexer.token() != b"xref" {
        return Err(ParseError::XrefMalformed {
            offset: xref_start,
            message: format!(
                "expected 'xref', found '{}'",
                String::from_utf8_lossy(lexer.token())
            ),
        });
    }
    lexer.next_token()?;
    loop {
        // one or more subsections: `firstId count` then fixed-size entries
        let first_id = match positive_integer(lexer.token()) {
            Some(v) => v,
            None => return Ok(()),
        };
        lexer.next_token()?;
        let count = match positive_integer(lexer.token()) {
            Some(v) => v,
            None => {
                return Err(ParseError::XrefMalformed {
                    offset: lexer.tok_file_pos(),
                    message: format!(
                        "invalid subsection entry count '{}'",
                        String::from_utf8_lossy(lexer.token())
                    ),
                })
            }
        };
        lexer.source_mut().skip_spaces(false)?;
        parse_xref_subsection(
            by_id,
            lexer.source_mut(),
            xref_start,
            first_id,
            count,
            options,
        )?;
        lexer.next_token()?;
    }
}

/// Ingest `count` 20-byte entries for ids `first_id..first_id+count`.
///
/// In-use entries become object placeholders; free entries are ignored.
/// Within the subsection, each object's stop offset is the next higher
/// start offset (the last one stays unknown until the body walk). An
/// offset beyond `max_obj_pos` (the xref section itself) invalidates the
/// whole subsection in fix mode, since none of its offsets can be trusted.
fn parse_xref_subsection<R: Read + Seek>(
    by_id: &mut HashMap<u64, PdfObject>,
    src: &mut ByteSource<R>,
    max_obj_pos: u64,
    first_id: i64,
    count: i64,
    options: &ParseOptions,
) -> ParseResult<()> {
    if options.verbose {
        info!("xref subsection [{}:{}]", first_id, first_id + count - 1);
    }

    let mut boundaries: Vec<PdfObject> = Vec::with_capacity(count.max(0) as usize);
    let mut bad_offset = false;
    for i in 0..count {
        if src.offset + XREF_ENTRY_SIZE > src.buffer.len() {
            src.refill()?;
            if src.offset + XREF_ENTRY_SIZE > src.buffer.len() {
                return Err(ParseError::XrefMalformed {
                    offset: src.file_pos(),
                    message: "truncated xref subsection".to_string(),
                });
            }
        }
        let entry = &src.buffer[src.offset..src.offset + XREF_ENTRY_SIZE];
        let offset_val = positive_integer(&entry[0..10]).ok_or_else(|| {
            ParseError::XrefMalformed {
                offset: src.file_pos(),
                message: format!(
                    "invalid entry offset '{}'",
                    String::from_utf8_lossy(&entry[0..10])
                ),
            }
        })?;
        let gen = positive_integer(&entry[11..16]).ok_or_else(|| ParseError::XrefMalformed {
            offset: src.file_pos(),
            message: format!(
                "invalid entry generation '{}'",
                String::from_utf8_lossy(&entry[11..16])
            ),
        })?;
        let in_use = match entry[17] {
            b'n' => true,
            b'f' => false,
            other => {
                return Err(ParseError::XrefMalformed {
                    offset: src.file_pos(),
                    message: format!("invalid entry status byte {other:#x}"),
                })
            }
        };

        if in_use {
            let mut start = offset_val;
            if bad_offset || offset_val as u64 > max_obj_pos {
                if !options.fix {
                    return Err(ParseError::XrefMalformed {
                        offset: src.file_pos(),
                        message: format!(
                            "object offset {offset_val:#x} beyond the xref section at {max_obj_pos:#x}"
                        ),
                    });
                }
                if !bad_offset {
                    warn!(
                        "xref object offset {offset_val:#x} beyond the section start {max_obj_pos:#x}, distrusting the subsection"
                    );
                    bad_offset = true;
                }
                start = -1;
            }
            boundaries.push(PdfObject::placeholder(
                (first_id + i) as u64,
                gen as u64,
                start,
            ));
        }
        src.offset += XREF_ENTRY_SIZE;
    }

    if bad_offset {
        for b in &mut boundaries {
            b.start = -1;
        }
    } else {
        boundaries.sort_by_key(|b| b.start);
        for i in 0..boundaries.len().saturating_sub(1) {
            boundaries[i].stop = boundaries[i + 1].start;
        }
    }

    for b in boundaries {
        // newest update first: keep the entry already present
        by_id.entry(b.id).or_insert(b);
    }
    Ok(())
}
