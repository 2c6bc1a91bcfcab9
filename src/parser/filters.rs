//! PDF Stream Filters
//!
//! Decodes or structurally checks the filter chains attached to stream
//! objects. `/Filter` may be a single name or an array of names applied in
//! order; `/DecodeParms` is normalized the same way. The output of one
//! decoder is the input of the next. Unsupported filters pass the data
//! through with a warning rather than failing the whole check.

use super::filter_impls::dct::{DctControl, JpegAnalyzer};
use super::objects::{hex_nibble, PdfDictionary, PdfName, PdfStream, PdfValue};
use super::{ParseError, ParseOptions, ParseResult};
use log::{debug, info, warn};

/// Recognised stream filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    ASCIIHexDecode,
    ASCII85Decode,
    RunLengthDecode,
    FlateDecode,
    DCTDecode,
    CCITTFaxDecode,
    LZWDecode,
    JBIG2Decode,
    JPXDecode,
    Crypt,
}

impl Filter {
    pub fn from_name(name: &PdfName) -> Option<Self> {
        match name.as_bytes() {
            b"ASCIIHexDecode" => Some(Filter::ASCIIHexDecode),
            b"ASCII85Decode" => Some(Filter::ASCII85Decode),
            b"RunLengthDecode" => Some(Filter::RunLengthDecode),
            b"FlateDecode" => Some(Filter::FlateDecode),
            b"DCTDecode" => Some(Filter::DCTDecode),
            b"CCITTFaxDecode" => Some(Filter::CCITTFaxDecode),
            b"LZWDecode" => Some(Filter::LZWDecode),
            b"JBIG2Decode" => Some(Filter::JBIG2Decode),
            b"JPXDecode" => Some(Filter::JPXDecode),
            b"Crypt" => Some(Filter::Crypt),
            _ => None,
        }
    }
}

fn decode_err(filter: &str, message: String) -> ParseError {
    ParseError::FilterDecode {
        filter: filter.to_string(),
        message,
    }
}

/// Validate (and decode through) the filter chain of one stream.
///
/// Only a DCT repair rewrites the stored stream bytes; the other decoders
/// feed the next filter in the chain without touching the object.
pub(crate) fn check_stream(
    stream: &mut PdfStream,
    options: &ParseOptions,
    analyzer: &dyn JpegAnalyzer,
) -> ParseResult<()> {
    let (names, parms) = normalized_filters(&stream.extent)?;
    if names.is_empty() {
        if options.verbose {
            info!("no filter specified");
        }
        return Ok(());
    }

    let mut data = stream.data.clone();
    for (i, name) in names.iter().enumerate() {
        if options.verbose {
            info!("stream filter {name}");
            if let Some(p) = parms.get(i).and_then(Option::as_ref) {
                for (k, v) in p.iter() {
                    debug!("  parameter /{k}: {v:?}");
                }
            }
        }
        data = match Filter::from_name(name) {
            Some(Filter::ASCIIHexDecode) => ascii_hex_decode(&data)?,
            Some(Filter::ASCII85Decode) => ascii85_decode(&data)?,
            Some(Filter::RunLengthDecode) => run_length_decode(&data)?,
            #[cfg(feature = "compression")]
            Some(Filter::FlateDecode) => flate_decode(&data)?,
            Some(Filter::DCTDecode) if analyzer.available() => {
                check_dct(stream, data, options, analyzer)?
            }
            _ => {
                warn!("unsupported stream filter {name}, passing data through");
                data
            }
        };
    }
    Ok(())
}

/// Normalize `/Filter` and `/DecodeParms` into parallel arrays.
fn normalized_filters(
    dict: &PdfDictionary,
) -> ParseResult<(Vec<PdfName>, Vec<Option<PdfDictionary>>)> {
    let mut names = Vec::new();
    let mut parms = Vec::new();
    match dict.get("Filter") {
        None => {}
        Some(PdfValue::Name(n)) => {
            names.push(n.clone());
            parms.push(match dict.get("DecodeParms") {
                Some(PdfValue::Dictionary(d)) => Some(d.clone()),
                _ => None,
            });
        }
        Some(PdfValue::Array(a)) => {
            for v in a.iter() {
                match v {
                    PdfValue::Name(n) => names.push(n.clone()),
                    _ => {
                        return Err(decode_err(
                            "Filter",
                            "filter array entry is not a name".to_string(),
                        ))
                    }
                }
            }
            let pa = dict.get("DecodeParms");
            for i in 0..names.len() {
                parms.push(match pa {
                    Some(PdfValue::Array(p)) => match p.get(i) {
                        Some(PdfValue::Dictionary(d)) => Some(d.clone()),
                        _ => None,
                    },
                    Some(PdfValue::Dictionary(d)) if i == 0 => Some(d.clone()),
                    _ => None,
                });
            }
        }
        Some(_) => {
            return Err(decode_err(
                "Filter",
                "Filter is neither a name nor an array".to_string(),
            ))
        }
    }
    Ok((names, parms))
}

// TODO: repairing a DCT stream that sits behind another decoder in the
// chain would require re-encoding the outer filters.
fn check_dct(
    stream: &mut PdfStream,
    data: Vec<u8>,
    options: &ParseOptions,
    analyzer: &dyn JpegAnalyzer,
) -> ParseResult<Vec<u8>> {
    let control = DctControl {
        content: options.verbose,
        fix: options.fix,
    };
    let analysis = analyzer.analyze(&data, &control)?;
    if !analysis.complete {
        return Err(decode_err(
            "DCTDecode",
            "JPEG data cannot be parsed".to_string(),
        ));
    }
    if options.verbose {
        info!(
            "actual JPEG length: {} (data length: {})",
            analysis.actual_length, analysis.data_length
        );
    }
    if options.fix {
        if let Some(fixed) = analysis.fixed {
            info!("fixing JPEG stream (len={})", fixed.len());
            let m = analysis.metadata;
            stream.data = fixed.clone();
            stream.extent.insert(
                PdfName::from("BitsPerComponent"),
                PdfValue::Number(m.sample_size as f64),
            );
            stream
                .extent
                .insert(PdfName::from("Width"), PdfValue::Number(m.width as f64));
            stream
                .extent
                .insert(PdfName::from("Height"), PdfValue::Number(m.height as f64));
            stream.extent.insert(
                PdfName::from("Length"),
                PdfValue::Number(stream.data.len() as f64),
            );
            return Ok(fixed);
        }
    }
    Ok(data)
}

/// ASCIIHexDecode: whitespace skipped, `>` terminates, an odd final
/// nibble is padded with 0. Any other non-hex character is an error.
pub fn ascii_hex_decode(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() / 2 + 1);
    let mut nibble = 0u8;
    let mut n = 0usize;
    for (i, &c) in data.iter().enumerate() {
        match c {
            b'>' => break,
            0 | b'\t' | b'\n' | b'\x0c' | b'\r' | b' ' => {}
            _ => {
                let v = hex_nibble(c).ok_or_else(|| {
                    decode_err(
                        "ASCIIHexDecode",
                        format!("invalid hex character {c:#x} at offset {i}"),
                    )
                })?;
                if n & 1 == 0 {
                    nibble = v;
                } else {
                    out.push((nibble << 4) | v);
                }
                n += 1;
            }
        }
    }
    if n & 1 == 1 {
        out.push(nibble << 4);
    }
    Ok(out)
}

/// ASCII85Decode: groups of five characters in `!..u` encode four bytes.
/// `z` stands for four zero bytes but only between groups; the
/// accumulator must fit 32 bits; a partial final group of k characters
/// yields k-1 bytes after `u` padding; end of data is `~>`.
pub fn ascii85_decode(data: &[u8]) -> ParseResult<Vec<u8>> {
    const F: &str = "ASCII85Decode";
    let mut out = Vec::with_capacity(data.len() / 5 * 4 + 4);
    let mut group = 0u64;
    let mut gi = 0usize;
    let mut eod = None;
    for (i, &c) in data.iter().enumerate() {
        match c {
            b'~' => {
                eod = Some(i);
                break;
            }
            0 | b'\t' | b'\n' | b'\x0c' | b'\r' | b' ' => {}
            b'z' => {
                if gi != 0 {
                    return Err(decode_err(F, format!("'z' inside a group at offset {i}")));
                }
                out.extend_from_slice(&[0, 0, 0, 0]);
            }
            b'!'..=b'u' => {
                group = group * 85 + (c - b'!') as u64;
                gi += 1;
                if gi == 5 {
                    if group > u32::MAX as u64 {
                        return Err(decode_err(
                            F,
                            format!("group value beyond 32 bits at offset {i}"),
                        ));
                    }
                    out.extend_from_slice(&(group as u32).to_be_bytes());
                    group = 0;
                    gi = 0;
                }
            }
            _ => {
                return Err(decode_err(
                    F,
                    format!("invalid character {c:#x} at offset {i}"),
                ))
            }
        }
    }
    let at = eod.ok_or_else(|| decode_err(F, "missing '~>' end of data".to_string()))?;
    if data.get(at + 1) != Some(&b'>') {
        return Err(decode_err(F, "'~' not followed by '>'".to_string()));
    }
    if gi == 1 {
        return Err(decode_err(F, "final group has a single character".to_string()));
    }
    if gi > 1 {
        for _ in gi..5 {
            group = group * 85 + 84; // pad with 'u'
        }
        if group > u32::MAX as u64 {
            return Err(decode_err(F, "final group value beyond 32 bits".to_string()));
        }
        let bytes = (group as u32).to_be_bytes();
        out.extend_from_slice(&bytes[..gi - 1]);
    }
    Ok(out)
}

/// RunLengthDecode: a length byte 0..=127 copies the next length+1 bytes,
/// 129..=255 repeats the next byte 257-length times, 128 is end of data.
pub fn run_length_decode(data: &[u8]) -> ParseResult<Vec<u8>> {
    const F: &str = "RunLengthDecode";
    let mut out = Vec::new();
    let mut offset = 0usize;
    loop {
        let len = *data.get(offset).ok_or_else(|| {
            decode_err(F, "no end-of-data marker before the stream ended".to_string())
        })?;
        match len {
            128 => return Ok(out),
            0..=127 => {
                let n = len as usize + 1;
                let lit = data.get(offset + 1..offset + 1 + n).ok_or_else(|| {
                    decode_err(
                        F,
                        format!("literal run of {n} bytes overruns the stream at offset {offset}"),
                    )
                })?;
                out.extend_from_slice(lit);
                offset += 1 + n;
            }
            129..=255 => {
                let b = *data.get(offset + 1).ok_or_else(|| {
                    decode_err(F, format!("repeat run without a byte at offset {offset}"))
                })?;
                out.extend(std::iter::repeat(b).take(257 - len as usize));
                offset += 2;
            }
        }
    }
}

/// FlateDecode: zlib-wrapped deflate.
#[cfg(feature = "compression")]
pub fn flate_decode(data: &[u8]) -> ParseResult<Vec<u8>> {
    use std::io::Read;
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| decode_err("FlateDecode", e.to_string()))?;
    Ok(out)
}
