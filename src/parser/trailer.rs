//! PDF Trailer parsing
//!
//! Each xref section is terminated by `trailer`, a dictionary, `startxref`
//! with the section's own offset, and `%%EOF`. `/Prev` links the chain of
//! incremental updates toward the original file.

use super::lexer::{positive_integer, Lexer};
use super::objects::{ObjRef, PdfArray, PdfDictionary, PdfValue};
use super::{ParseError, ParseOptions, ParseResult};
use log::info;
use std::io::{Read, Seek};

pub(crate) struct TrailerBlock {
    pub dict: PdfDictionary,
    /// Offset of the previous update's xref section, if any.
    pub prev: Option<u64>,
    /// File offset just past this block's `%%EOF`.
    pub end_pos: u64,
}

/// Values extracted from the newest trailer dictionary.
pub(crate) struct TrailerFields {
    pub size: i64,
    pub catalog: ObjRef,
    pub encrypt: Option<ObjRef>,
    pub info: Option<ObjRef>,
    pub id: Option<PdfArray>,
}

/// Parse the trailer block whose `trailer` keyword is the current token.
pub(crate) fn parse_trailer<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    options: &ParseOptions,
) -> ParseResult<TrailerBlock> {
    if options.verbose {
        info!("trailer at offset {:#x}", lexer.tok_file_pos());
    }
    if lexer.token() != b"trailer" {
        return Err(ParseError::TrailerMissing(format!(
            "expected 'trailer', found '{}'",
            String::from_utf8_lossy(lexer.token())
        )));
    }
    lexer.next_token()?;
    if lexer.token() != b"<<" {
        return Err(ParseError::TrailerMalformed(
            "trailer has no dictionary".to_string(),
        ));
    }
    let stop = lexer.source_mut().stop_at() as i64;
    let dict = match PdfValue::parse(lexer, stop, options)? {
        PdfValue::Dictionary(d) => d,
        _ => {
            return Err(ParseError::TrailerMalformed(
                "trailer dictionary is not a plain dictionary".to_string(),
            ))
        }
    };

    if lexer.token() != b"startxref" {
        return Err(ParseError::TrailerMalformed(format!(
            "expected 'startxref', found '{}'",
            String::from_utf8_lossy(lexer.token())
        )));
    }
    lexer.next_token()?;
    if positive_integer(lexer.token()).is_none() {
        return Err(ParseError::TrailerMalformed(format!(
            "invalid startxref offset '{}'",
            String::from_utf8_lossy(lexer.token())
        )));
    }
    lexer.source_mut().skip_spaces(true)?;
    if !lexer.source_mut().eof_comment()? {
        return Err(ParseError::TrailerMalformed(
            "missing %%EOF comment".to_string(),
        ));
    }
    let end_pos = lexer.file_pos() + b"%%EOF".len() as u64;

    let prev = dict
        .get("Prev")
        .and_then(PdfValue::as_number)
        .filter(|&n| n > 0.0)
        .map(|n| n as u64);

    Ok(TrailerBlock {
        dict,
        prev,
        end_pos,
    })
}

/// Validate and pull the required and optional trailer entries.
pub(crate) fn extract_trailer_fields(dict: &PdfDictionary) -> ParseResult<TrailerFields> {
    let size = dict
        .get("Size")
        .and_then(PdfValue::as_number)
        .ok_or_else(|| {
            ParseError::TrailerMalformed("trailer does not provide the xref size".to_string())
        })? as i64;

    let catalog = dict
        .get("Root")
        .and_then(PdfValue::as_reference)
        .ok_or_else(|| {
            ParseError::TrailerMalformed("trailer does not provide the root catalog".to_string())
        })?;
    if catalog.id == 0 {
        return Err(ParseError::TrailerMalformed(
            "root catalog reference has object id 0".to_string(),
        ));
    }

    Ok(TrailerFields {
        size,
        catalog,
        encrypt: dict.get("Encrypt").and_then(PdfValue::as_reference),
        info: dict.get("Info").and_then(PdfValue::as_reference),
        id: extract_file_id(dict)?,
    })
}

/// The file identifier array. `/ID` is matched case-insensitively since
/// some writers emit `/Id`; when present it must be two hex strings.
fn extract_file_id(dict: &PdfDictionary) -> ParseResult<Option<PdfArray>> {
    let mut value = None;
    for key in dict.keys() {
        if key.as_bytes().eq_ignore_ascii_case(b"id") {
            value = dict.get(key.as_bytes());
            break;
        }
    }
    let array = match value {
        Some(PdfValue::Array(a)) => a,
        Some(_) | None => return Ok(None),
    };
    if array.len() != 2
        || !matches!(array.get(0), Some(PdfValue::HexString(_)))
        || !matches!(array.get(1), Some(PdfValue::HexString(_)))
    {
        return Err(ParseError::TrailerMalformed(
            "ID is not a pair of hex strings".to_string(),
        ));
    }
    Ok(Some(array.clone()))
}
