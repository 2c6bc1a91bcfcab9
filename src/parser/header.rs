//! PDF Header parsing
//!
//! A file begins with `%PDF-1.N`, an EOL, and a recommended binary comment
//! line (four bytes >= 0x80 behind a `%`) that marks the file as binary
//! for transfer tools. The body's first object starts right after.

use super::source::ByteSource;
use super::{ParseError, ParseOptions, ParseResult};
use log::warn;
use std::io::{Read, Seek};

const HEADER_WINDOW: u64 = 512;

#[derive(Debug, Clone)]
pub struct PdfHeader {
    /// The raw first line, e.g. `%PDF-1.4`.
    pub header: String,
    /// Extracted version, e.g. `1.4`.
    pub version: String,
    /// File offset of the first byte after header and binary comment.
    pub body_start: u64,
}

pub(crate) fn parse_header<R: Read + Seek>(
    src: &mut ByteSource<R>,
    options: &ParseOptions,
) -> ParseResult<PdfHeader> {
    src.fill(HEADER_WINDOW, 0)?;

    if src.buffer.len() < 9 || !src.buffer.starts_with(b"%PDF-1.") {
        return Err(ParseError::NotAPdf("missing %PDF-1.x signature".to_string()));
    }
    let minor = src.buffer[7];
    if !minor.is_ascii_digit() {
        return Err(ParseError::NotAPdf(format!(
            "invalid version digit '{}'",
            minor as char
        )));
    }
    let version = format!("1.{}", minor - b'0');

    let mut offset = 8;
    match src.buffer[8] {
        0x0d => {
            if src.buffer.len() > 9 && src.buffer[9] == 0x0a {
                offset = 9;
            }
        }
        0x0a => {}
        _ => return Err(ParseError::NotAPdf("invalid file header line".to_string())),
    }
    offset += 1;

    // the required trailing %%EOF alone needs five more bytes
    if offset + 5 >= src.buffer.len() {
        return Err(ParseError::NotAPdf("PDF file without content".to_string()));
    }
    if src.buffer[offset] == b'%'
        && offset + 4 < src.buffer.len()
        && src.buffer[offset + 1..offset + 5].iter().all(|&b| b >= 0x80)
    {
        offset = skip_to_eol(&src.buffer, offset + 5);
    } else if options.verbose {
        warn!("recommended binary comment is missing");
    }

    let header = String::from_utf8_lossy(&src.buffer[..8]).into_owned();
    src.offset = offset;
    Ok(PdfHeader {
        header,
        version,
        body_start: offset as u64,
    })
}

fn skip_to_eol(buffer: &[u8], mut offset: usize) -> usize {
    while offset < buffer.len() {
        match buffer[offset] {
            0x0d => {
                if offset + 1 < buffer.len() && buffer[offset + 1] == 0x0a {
                    return offset + 2;
                }
                return offset + 1;
            }
            0x0a => return offset + 1,
            _ => offset += 1,
        }
    }
    offset
}
