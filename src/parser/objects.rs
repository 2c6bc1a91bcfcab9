//! PDF Object Model and Value Parser
//!
//! The typed PDF value tree, and the recursive-descent parser that builds
//! it from lexer tokens. Dictionaries keep their key insertion order so a
//! parsed file can be re-emitted without reshuffling entries.

use super::lexer::{positive_integer, Lexer};
use super::source::{find_bytes, ByteSource};
use super::{ParseError, ParseOptions, ParseResult};
use log::{info, warn};
use std::collections::HashMap;
use std::io::{Read, Seek};

/// PDF Name. `#HH` escapes are validated on parse but kept undecoded, so
/// names round-trip byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PdfName(pub Vec<u8>);

impl PdfName {
    pub fn new(name: impl Into<Vec<u8>>) -> Self {
        Self(name.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::borrow::Borrow<[u8]> for PdfName {
    fn borrow(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for PdfName {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl std::fmt::Display for PdfName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Reference to an indirect object (`id gen R`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef {
    pub id: u64,
    pub gen: u64,
}

/// PDF Array object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfArray(pub Vec<PdfValue>);

impl PdfArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PdfValue> {
        self.0.get(index)
    }

    pub fn push(&mut self, value: PdfValue) {
        self.0.push(value);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PdfValue> {
        self.0.iter()
    }
}

/// PDF Dictionary with ordered keys.
///
/// Keys iterate in first-insertion order; lookup stays O(1) through the
/// backing map. Replacing a value does not move its key.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfDictionary {
    keys: Vec<PdfName>,
    data: HashMap<PdfName, PdfValue>,
}

impl PdfDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<&PdfValue> {
        self.data.get(key.as_ref())
    }

    pub fn contains_key(&self, key: impl AsRef<[u8]>) -> bool {
        self.data.contains_key(key.as_ref())
    }

    /// Insert a key/value pair, returning the previous value if the key
    /// was already present (its position in the key order is kept).
    pub fn insert(&mut self, key: PdfName, value: PdfValue) -> Option<PdfValue> {
        match self.data.insert(key.clone(), value) {
            Some(old) => Some(old),
            None => {
                self.keys.push(key);
                None
            }
        }
    }

    /// Keys in first-insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &PdfName> {
        self.keys.iter()
    }

    /// Entries in key-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&PdfName, &PdfValue)> {
        self.keys.iter().map(move |k| (k, &self.data[k]))
    }
}

/// PDF Stream object: descriptor dictionary plus raw payload bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfStream {
    pub extent: PdfDictionary,
    pub data: Vec<u8>,
}

/// PDF value types
#[derive(Debug, Clone, PartialEq)]
pub enum PdfValue {
    Bool(bool),
    Number(f64),
    /// Raw bytes between balanced parentheses, escapes preserved literally.
    LiteralString(Vec<u8>),
    /// Decoded byte content of a `<...>` string.
    HexString(Vec<u8>),
    Name(PdfName),
    Array(PdfArray),
    Dictionary(PdfDictionary),
    Stream(PdfStream),
    Null,
    Reference(ObjRef),
}

impl PdfValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PdfValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PdfValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            PdfValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&PdfName> {
        match self {
            PdfValue::Name(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&PdfArray> {
        match self {
            PdfValue::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Dictionary view: plain dictionaries and stream extents both match.
    pub fn as_dict(&self) -> Option<&PdfDictionary> {
        match self {
            PdfValue::Dictionary(d) => Some(d),
            PdfValue::Stream(s) => Some(&s.extent),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&PdfStream> {
        match self {
            PdfValue::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_stream_mut(&mut self) -> Option<&mut PdfStream> {
        match self {
            PdfValue::Stream(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<ObjRef> {
        match self {
            PdfValue::Reference(r) => Some(*r),
            _ => None,
        }
    }
}

pub(crate) fn hex_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl PdfValue {
    /// Parse one value starting at the current token.
    ///
    /// `stop` is the object's declared end offset from the xref table (`-1`
    /// when unknown); running past it is an error in strict mode. On
    /// return the token *following* the value is current.
    pub(crate) fn parse<R: Read + Seek>(
        lexer: &mut Lexer<R>,
        stop: i64,
        options: &ParseOptions,
    ) -> ParseResult<PdfValue> {
        if stop != -1 && stop as u64 <= lexer.file_pos() {
            if !options.fix {
                return Err(lexer.syntax_error(format!(
                    "value extends past the object boundary {stop:#x}"
                )));
            }
            warn!(
                "value around offset {:#x} extends past the object boundary {:#x}",
                lexer.file_pos(),
                stop
            );
        }
        let first = match lexer.token().first() {
            Some(&b) => b,
            None => return Err(lexer.syntax_error("unexpected end of input")),
        };
        match first {
            b't' => {
                check_keyword(lexer, b"true")?;
                Ok(PdfValue::Bool(true))
            }
            b'f' => {
                check_keyword(lexer, b"false")?;
                Ok(PdfValue::Bool(false))
            }
            b'n' => {
                check_keyword(lexer, b"null")?;
                Ok(PdfValue::Null)
            }
            b'(' => Ok(PdfValue::LiteralString(parse_literal_string(lexer)?)),
            b'<' => {
                if lexer.token() == b"<<" {
                    parse_dictionary_or_stream(lexer, stop, options)
                } else {
                    Ok(PdfValue::HexString(parse_hex_string(lexer)?))
                }
            }
            b'/' => Ok(PdfValue::Name(parse_name(lexer)?)),
            b'[' => Ok(PdfValue::Array(parse_array(lexer, stop, options)?)),
            b's' if lexer.token() == b"stream" => {
                Err(lexer.syntax_error("stream without a preceding dictionary"))
            }
            b'-' | b'.' => Ok(PdfValue::Number(parse_number(lexer)?)),
            b'+' | b'0'..=b'9' => parse_number_or_reference(lexer),
            _ => Err(lexer.syntax_error(format!(
                "invalid token '{}'",
                String::from_utf8_lossy(lexer.token())
            ))),
        }
    }
}

fn check_keyword<R: Read + Seek>(lexer: &mut Lexer<R>, expected: &[u8]) -> ParseResult<()> {
    if lexer.token() != expected {
        return Err(lexer.syntax_error(format!(
            "not an object: '{}'",
            String::from_utf8_lossy(lexer.token())
        )));
    }
    lexer.next_token()
}

/// `(` has been consumed; read raw bytes up to the balancing `)`.
/// Escape sequences pass through untouched, except that a backslash
/// starting an unknown escape is dropped.
fn parse_literal_string<R: Read + Seek>(lexer: &mut Lexer<R>) -> ParseResult<Vec<u8>> {
    let src = lexer.source_mut();
    let mut out = Vec::new();
    let mut open = 1u32;
    loop {
        match src.get_byte()? {
            None => {
                return Err(ParseError::ObjectSyntax {
                    offset: src.file_pos(),
                    message: "end of input inside a literal string".to_string(),
                })
            }
            Some(b'(') => {
                out.push(b'(');
                open += 1;
            }
            Some(b')') => {
                open -= 1;
                if open == 0 {
                    break;
                }
                out.push(b')');
            }
            Some(b'\\') => write_escape_seq(src, &mut out)?,
            Some(c) => out.push(c),
        }
    }
    lexer.next_token()?;
    Ok(out)
}

/// Copies a valid escape sequence (`\n \r \t \b \f \( \) \\ \CR \LF` or up
/// to three octal digits) into `out` verbatim.
fn write_escape_seq<R: Read + Seek>(
    src: &mut ByteSource<R>,
    out: &mut Vec<u8>,
) -> ParseResult<()> {
    match src.get_byte()? {
        None => {}
        Some(c @ (b'n' | b'r' | b't' | b'b' | b'f' | b'(' | b')' | b'\\' | b'\n' | b'\r')) => {
            out.push(b'\\');
            out.push(c);
        }
        Some(c @ b'0'..=b'7') => {
            out.push(b'\\');
            out.push(c);
            for _ in 0..2 {
                match src.get_byte()? {
                    Some(d @ b'0'..=b'7') => out.push(d),
                    Some(_) => {
                        src.unget_byte();
                        break;
                    }
                    None => break,
                }
            }
        }
        Some(_) => src.unget_byte(),
    }
    Ok(())
}

/// `<` has been consumed; decode hex digits up to `>`. Whitespace is
/// skipped, an odd trailing nibble is padded with 0.
fn parse_hex_string<R: Read + Seek>(lexer: &mut Lexer<R>) -> ParseResult<Vec<u8>> {
    let src = lexer.source_mut();
    let mut out = Vec::new();
    let mut nibble = 0u8;
    let mut n = 0usize;
    loop {
        let c = match src.get_byte()? {
            Some(c) => c,
            None => {
                return Err(ParseError::ObjectSyntax {
                    offset: src.file_pos(),
                    message: "end of input inside a hex string".to_string(),
                })
            }
        };
        match c {
            0x00 | 0x09 | 0x0a | 0x0c | 0x0d | 0x20 => {}
            b'>' => {
                if n & 1 == 1 {
                    out.push(nibble << 4);
                }
                break;
            }
            _ => {
                let v = hex_nibble(c).ok_or_else(|| ParseError::ObjectSyntax {
                    offset: src.file_pos(),
                    message: format!("not a hexadecimal digit: {c:#x}"),
                })?;
                if n & 1 == 0 {
                    nibble = v;
                } else {
                    out.push((nibble << 4) + v);
                }
                n += 1;
            }
        }
    }
    lexer.next_token()?;
    Ok(out)
}

/// The current token is a whole `/name`; validate `#HH` escapes without
/// decoding them.
fn parse_name<R: Read + Seek>(lexer: &mut Lexer<R>) -> ParseResult<PdfName> {
    let token = lexer.token();
    debug_assert_eq!(token.first(), Some(&b'/'));
    let body = token[1..].to_vec();
    let mut i = 0;
    while i < body.len() {
        if body[i] == b'#' {
            if i + 2 >= body.len() {
                return Err(lexer.syntax_error("incomplete # escape in name"));
            }
            if hex_nibble(body[i + 1]).is_none() || hex_nibble(body[i + 2]).is_none() {
                return Err(lexer.syntax_error(format!(
                    "invalid # escape in name '{}'",
                    String::from_utf8_lossy(&body)
                )));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    lexer.next_token()?;
    Ok(PdfName(body))
}

fn parse_array<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    stop: i64,
    options: &ParseOptions,
) -> ParseResult<PdfArray> {
    let mut items = Vec::new();
    lexer.next_token()?;
    loop {
        if lexer.token() == b"]" {
            lexer.next_token()?;
            return Ok(PdfArray(items));
        }
        if lexer.token().is_empty() {
            return Err(lexer.syntax_error("unterminated array"));
        }
        items.push(PdfValue::parse(lexer, stop, options)?);
        if stop != -1 && stop as u64 <= lexer.file_pos() {
            if !options.fix {
                return Err(lexer.syntax_error(format!(
                    "array reached the end of the object boundary {stop:#x}"
                )));
            }
            // truncate: keep what was read, stop consuming input
            warn!(
                "array runs past the object boundary {stop:#x}, truncating after {} items",
                items.len()
            );
            return Ok(PdfArray(items));
        }
    }
}

fn parse_number<R: Read + Seek>(lexer: &mut Lexer<R>) -> ParseResult<f64> {
    let value = std::str::from_utf8(lexer.token())
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| {
            lexer.syntax_error(format!(
                "invalid number '{}'",
                String::from_utf8_lossy(lexer.token())
            ))
        })?;
    lexer.next_token()?;
    Ok(value)
}

/// Either a single number, or `id gen R`. The one-token look-ahead decides:
/// two positive integers followed by `R` form a reference; anything else
/// restores the saved token and yields the first number alone.
fn parse_number_or_reference<R: Read + Seek>(lexer: &mut Lexer<R>) -> ParseResult<PdfValue> {
    let id = match positive_integer(lexer.token()) {
        Some(id) => id,
        None => return Ok(PdfValue::Number(parse_number(lexer)?)),
    };
    lexer.next_token()?;
    if let Some(gen) = positive_integer(lexer.token()) {
        lexer.save_token();
        lexer.next_token()?;
        if lexer.token() == b"R" {
            lexer.next_token()?;
            return Ok(PdfValue::Reference(ObjRef {
                id: id as u64,
                gen: gen as u64,
            }));
        }
        lexer.restore_token()?;
    }
    Ok(PdfValue::Number(id as f64))
}

fn parse_dictionary_or_stream<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    stop: i64,
    options: &ParseOptions,
) -> ParseResult<PdfValue> {
    let mut dict = PdfDictionary::new();
    lexer.next_token()?;
    loop {
        if lexer.token() == b">>" {
            lexer.next_token()?;
            if lexer.token() == b"stream" {
                return parse_stream_body(lexer, dict, stop, options);
            }
            return Ok(PdfValue::Dictionary(dict));
        }
        if lexer.token().is_empty() {
            return Err(lexer.syntax_error("unterminated dictionary"));
        }
        if lexer.token().first() != Some(&b'/') {
            return Err(lexer.syntax_error(format!(
                "dictionary key is not a name: '{}'",
                String::from_utf8_lossy(lexer.token())
            )));
        }
        let key = parse_name(lexer)?;
        let value = PdfValue::parse(lexer, stop, options)?;
        if dict.contains_key(key.as_bytes()) {
            if !options.fix {
                return Err(lexer.syntax_error(format!("duplicate dictionary key /{key}")));
            }
            warn!("duplicate dictionary key /{key}, keeping the later value");
        }
        dict.insert(key, value);
        if stop != -1 && stop as u64 <= lexer.file_pos() {
            if !options.fix {
                return Err(lexer.syntax_error(format!(
                    "dictionary reached the end of the object boundary {stop:#x}"
                )));
            }
            // truncate: keep the entries read so far, stop consuming input
            warn!(
                "dictionary runs past the object boundary {stop:#x}, truncating after {} entries",
                dict.len()
            );
            return Ok(PdfValue::Dictionary(dict));
        }
    }
}

/// The current token is `stream`. Reads the payload, reconciling the
/// declared `/Length` against the location of `endstream`.
fn parse_stream_body<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    mut dict: PdfDictionary,
    stop: i64,
    options: &ParseOptions,
) -> ParseResult<PdfValue> {
    let declared = match dict.get("Length").and_then(PdfValue::as_number) {
        Some(n) if n >= 0.0 => n as i64,
        _ => {
            if !options.fix {
                return Err(lexer.syntax_error("stream object without a numeric Length"));
            }
            warn!(
                "stream object around offset {:#x} without a numeric Length, scanning for 'endstream'",
                lexer.tok_file_pos()
            );
            -1
        }
    };
    let data = read_stream_bytes(lexer, declared, stop, options)?;
    if declared != data.len() as i64 {
        warn!(
            "setting stream extent to length {} (previously {declared})",
            data.len()
        );
        dict.insert(PdfName::from("Length"), PdfValue::Number(data.len() as f64));
    }
    Ok(PdfValue::Stream(PdfStream { extent: dict, data }))
}

fn read_stream_bytes<R: Read + Seek>(
    lexer: &mut Lexer<R>,
    declared: i64,
    stop: i64,
    options: &ParseOptions,
) -> ParseResult<Vec<u8>> {
    if !lexer.source_mut().skip_current_eol(true)? {
        return Err(lexer.syntax_error("'stream' keyword not followed by EOL"));
    }

    let actual = if declared >= 0 {
        check_expected_endstream(lexer.source_mut(), declared, stop)?
    } else {
        -1
    };

    if actual == -1 {
        // no 'endstream' at the declared end of the stream
        if !options.fix {
            return Err(ParseError::StreamLengthMismatch {
                declared,
                actual: -1,
            });
        }
        if options.verbose {
            info!("no 'endstream' at the declared stream end (length {declared}), searching the stream data");
        }
        let data = match lexer.source_mut().read_until(b"endstream")? {
            Some(data) => data,
            None => return Err(ParseError::StreamEndNotFound),
        };
        if options.verbose {
            info!("found 'endstream' after {} bytes", data.len());
        }
        lexer.next_token()?;
        return Ok(data);
    }

    if actual != declared {
        if !options.fix {
            return Err(ParseError::StreamLengthMismatch { declared, actual });
        }
        warn!("stream length {declared} does not match actual length {actual}");
    }
    let data = lexer.source_mut().read_n(actual as usize)?;
    if (data.len() as i64) < actual {
        return Err(lexer.syntax_error(format!(
            "stream truncated at {} of {actual} bytes",
            data.len()
        )));
    }
    lexer.next_token()?;
    if lexer.token() != b"endstream" {
        return Err(lexer.syntax_error(format!(
            "stream of length {actual} not terminated by 'endstream'"
        )));
    }
    lexer.next_token()?;
    Ok(data)
}

/// Probe the bytes around `current + declared` for `endstream`. Returns
/// the effective payload length, or -1 when the keyword is not in sight.
/// An EOL immediately before the keyword is not part of the payload.
fn check_expected_endstream<R: Read + Seek>(
    src: &mut ByteSource<R>,
    declared: i64,
    stop: i64,
) -> ParseResult<i64> {
    let expected_end = src.file_pos() + declared as u64;
    if expected_end > src.stop_at() || expected_end > src.size() {
        return Ok(-1);
    }
    if stop != -1 && expected_end > stop as u64 {
        return Ok(-1);
    }

    let rel = src.offset + declared as usize;
    let probe_vec;
    let probe: &[u8] = if rel + 15 <= src.buffer.len() {
        &src.buffer[rel..rel + 15]
    } else {
        probe_vec = src.peek_at(expected_end, 256)?;
        &probe_vec
    };
    let mut at = match find_bytes(probe, b"endstream") {
        Some(at) => at,
        None => return Ok(-1),
    };
    match at {
        2 if probe[0] == 0x0d && probe[1] == 0x0a => at = 0,
        1 if probe[0] == 0x0a || probe[0] == 0x0d => at = 0,
        _ => {}
    }
    Ok(declared + at as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn lexer_for(data: &[u8]) -> Lexer<Cursor<Vec<u8>>> {
        let mut src = ByteSource::new(Cursor::new(data.to_vec())).unwrap();
        src.fill(data.len() as u64, 0).unwrap();
        let mut lexer = Lexer::new(src);
        lexer.next_token().unwrap();
        lexer
    }

    fn value_of(data: &[u8]) -> PdfValue {
        let mut lexer = lexer_for(data);
        PdfValue::parse(&mut lexer, -1, &ParseOptions::default()).unwrap()
    }

    fn value_err(data: &[u8]) -> ParseError {
        let mut lexer = lexer_for(data);
        PdfValue::parse(&mut lexer, -1, &ParseOptions::default()).unwrap_err()
    }

    #[test]
    fn test_parse_simple_values() {
        assert_eq!(value_of(b"true "), PdfValue::Bool(true));
        assert_eq!(value_of(b"false "), PdfValue::Bool(false));
        assert_eq!(value_of(b"null "), PdfValue::Null);
        assert_eq!(value_of(b"42 "), PdfValue::Number(42.0));
        assert_eq!(value_of(b"-17.5 "), PdfValue::Number(-17.5));
        assert_eq!(value_of(b".5 "), PdfValue::Number(0.5));
        assert_eq!(
            value_of(b"/MediaBox "),
            PdfValue::Name(PdfName::from("MediaBox"))
        );
    }

    #[test]
    fn test_literal_string_preserves_escapes() {
        // escapes pass through literally
        let v = value_of(b"(a\\(b\\)c\\n) ");
        assert_eq!(v, PdfValue::LiteralString(b"a\\(b\\)c\\n".to_vec()));
    }

    #[test]
    fn test_literal_string_nested_parens() {
        let v = value_of(b"(nested (parens) work) ");
        assert_eq!(v, PdfValue::LiteralString(b"nested (parens) work".to_vec()));
    }

    #[test]
    fn test_literal_string_octal_and_unknown_escapes() {
        // octal escapes are kept, an unknown escape loses its backslash
        let v = value_of(b"(a\\101b\\zq) ");
        assert_eq!(v, PdfValue::LiteralString(b"a\\101bzq".to_vec()));
    }

    #[test]
    fn test_hex_string() {
        assert_eq!(
            value_of(b"<48656C6C6F> "),
            PdfValue::HexString(b"Hello".to_vec())
        );
        // whitespace skipped, odd trailing nibble padded with 0
        assert_eq!(
            value_of(b"<48 65 6C7> "),
            PdfValue::HexString(b"He\x6c\x70".to_vec())
        );
        assert_eq!(value_of(b"<> "), PdfValue::HexString(Vec::new()));
        assert!(matches!(
            value_err(b"<48GG> "),
            ParseError::ObjectSyntax { .. }
        ));
    }

    #[test]
    fn test_name_hash_escapes() {
        assert_eq!(
            value_of(b"/Name#20With#20Spaces "),
            PdfValue::Name(PdfName::new(b"Name#20With#20Spaces".to_vec()))
        );
        assert!(matches!(
            value_err(b"/Bad#2 "),
            ParseError::ObjectSyntax { .. }
        ));
        assert!(matches!(
            value_err(b"/Bad#zz "),
            ParseError::ObjectSyntax { .. }
        ));
    }

    #[test]
    fn test_array_with_reference_ambiguity() {
        // "3 0 R" is a reference, the trailing "2" a plain number
        let v = value_of(b"[ 3 0 R 2 ] ");
        let array = v.as_array().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(
            array.get(0).unwrap().as_reference(),
            Some(ObjRef { id: 3, gen: 0 })
        );
        assert_eq!(array.get(1).unwrap().as_number(), Some(2.0));
    }

    #[test]
    fn test_two_numbers_without_r() {
        let v = value_of(b"[ 3 0 ] ");
        let array = v.as_array().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array.get(0).unwrap().as_number(), Some(3.0));
        assert_eq!(array.get(1).unwrap().as_number(), Some(0.0));
    }

    #[test]
    fn test_dictionary_preserves_key_order() {
        let v = value_of(b"<< /Zebra 1 /Alpha 2 /Mid 3 >> ");
        let dict = v.as_dict().unwrap();
        let keys: Vec<String> = dict.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["Zebra", "Alpha", "Mid"]);
        assert_eq!(dict.get("Alpha").unwrap().as_number(), Some(2.0));
    }

    #[test]
    fn test_dictionary_duplicate_key() {
        assert!(matches!(
            value_err(b"<< /A 1 /A 2 >> "),
            ParseError::ObjectSyntax { .. }
        ));

        // fix mode keeps the later value, key order unchanged
        let mut lexer = lexer_for(b"<< /A 1 /B 2 /A 3 >> ");
        let v = PdfValue::parse(&mut lexer, -1, &ParseOptions::repair()).unwrap();
        let dict = v.as_dict().unwrap();
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.get("A").unwrap().as_number(), Some(3.0));
        let keys: Vec<String> = dict.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["A", "B"]);
    }

    #[test]
    fn test_nested_structures() {
        let v = value_of(b"<< /Kids [ 1 0 R 2 0 R ] /Other << /N null >> >> ");
        let dict = v.as_dict().unwrap();
        assert_eq!(dict.get("Kids").unwrap().as_array().unwrap().len(), 2);
        assert!(dict
            .get("Other")
            .unwrap()
            .as_dict()
            .unwrap()
            .get("N")
            .unwrap()
            .is_null());
    }

    #[test]
    fn test_stream_with_exact_length() {
        let v = value_of(b"<< /Length 5 >>\nstream\nHello\nendstream ");
        let stream = v.as_stream().unwrap();
        assert_eq!(stream.data, b"Hello");
        assert_eq!(stream.extent.get("Length").unwrap().as_number(), Some(5.0));
    }

    #[test]
    fn test_stream_crlf_after_keyword() {
        let v = value_of(b"<< /Length 5 >>\nstream\r\nHello\nendstream ");
        assert_eq!(v.as_stream().unwrap().data, b"Hello");
    }

    #[test]
    fn test_stream_length_mismatch_strict() {
        let err = value_err(b"<< /Length 10 >>\nstream\nHello\nendstream ");
        assert!(matches!(
            err,
            ParseError::StreamLengthMismatch { declared: 10, .. }
        ));
    }

    #[test]
    fn test_stream_length_mismatch_fix() {
        let mut lexer = lexer_for(b"<< /Length 10 >>\nstream\nHello\nendstream ");
        let v = PdfValue::parse(&mut lexer, -1, &ParseOptions::repair()).unwrap();
        let stream = v.as_stream().unwrap();
        // the recovered payload runs up to 'endstream' itself
        assert_eq!(stream.data, b"Hello\n");
        assert_eq!(stream.extent.get("Length").unwrap().as_number(), Some(6.0));
    }

    #[test]
    fn test_stream_slight_undershoot_fix() {
        // declared one byte short: 'endstream' is inside the probe window,
        // so the effective length grows to its actual position
        let mut lexer = lexer_for(b"<< /Length 4 >>\nstream\nHello\nendstream ");
        let v = PdfValue::parse(&mut lexer, -1, &ParseOptions::repair()).unwrap();
        let stream = v.as_stream().unwrap();
        assert_eq!(stream.data, b"Hello\n");
        assert_eq!(stream.extent.get("Length").unwrap().as_number(), Some(6.0));
    }

    #[test]
    fn test_stream_slight_undershoot_strict() {
        let err = value_err(b"<< /Length 4 >>\nstream\nHello\nendstream ");
        assert!(matches!(
            err,
            ParseError::StreamLengthMismatch {
                declared: 4,
                actual: 6
            }
        ));
    }

    #[test]
    fn test_stream_end_not_found_is_fatal_even_in_fix() {
        let mut lexer = lexer_for(b"<< /Length 3 >>\nstream\nHello world, no terminator");
        let err = PdfValue::parse(&mut lexer, -1, &ParseOptions::repair()).unwrap_err();
        assert!(matches!(err, ParseError::StreamEndNotFound));
    }

    #[test]
    fn test_stream_without_length_strict_vs_fix() {
        let err = value_err(b"<< /Type /XObject >>\nstream\nHello\nendstream ");
        assert!(matches!(err, ParseError::ObjectSyntax { .. }));

        let mut lexer = lexer_for(b"<< /Type /XObject >>\nstream\nHello\nendstream ");
        let v = PdfValue::parse(&mut lexer, -1, &ParseOptions::repair()).unwrap();
        let stream = v.as_stream().unwrap();
        assert_eq!(stream.data, b"Hello\n");
        assert_eq!(stream.extent.get("Length").unwrap().as_number(), Some(6.0));
    }

    #[test]
    fn test_value_past_stop_offset() {
        let mut lexer = lexer_for(b"[ 1 2 3 4 5 6 7 8 ] ");
        let err = PdfValue::parse(&mut lexer, 6, &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, ParseError::ObjectSyntax { .. }));
    }

    #[test]
    fn test_array_truncated_at_stop_in_fix() {
        // fix mode keeps the items read up to the boundary and stops
        // consuming input there
        let mut lexer = lexer_for(b"[ 1 2 3 4 5 6 7 8 ] ");
        let v = PdfValue::parse(&mut lexer, 6, &ParseOptions::repair()).unwrap();
        let array = v.as_array().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array.get(0).unwrap().as_number(), Some(1.0));
        assert_eq!(array.get(1).unwrap().as_number(), Some(2.0));
        // the bytes past the boundary were not consumed
        assert_eq!(lexer.token(), b"3");
    }

    #[test]
    fn test_dictionary_past_stop_offset() {
        let mut lexer = lexer_for(b"<< /A 1 /B 2 /C 3 >> ");
        let err = PdfValue::parse(&mut lexer, 9, &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, ParseError::ObjectSyntax { .. }));
    }

    #[test]
    fn test_dictionary_truncated_at_stop_in_fix() {
        let mut lexer = lexer_for(b"<< /A 1 /B 2 /C 3 >> ");
        let v = PdfValue::parse(&mut lexer, 9, &ParseOptions::repair()).unwrap();
        let dict = v.as_dict().unwrap();
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.get("A").unwrap().as_number(), Some(1.0));
        assert!(!dict.contains_key("B"));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(PdfValue::Number(7.0).as_number(), Some(7.0));
        assert_eq!(PdfValue::Bool(true).as_bool(), Some(true));
        assert!(PdfValue::Null.is_null());
        assert_eq!(PdfValue::Number(7.0).as_name(), None);
        let r = PdfValue::Reference(ObjRef { id: 9, gen: 1 });
        assert_eq!(r.as_reference(), Some(ObjRef { id: 9, gen: 1 }));
    }

    #[test]
    fn test_dictionary_insert_replaces_in_place() {
        let mut dict = PdfDictionary::new();
        dict.insert(PdfName::from("A"), PdfValue::Number(1.0));
        dict.insert(PdfName::from("B"), PdfValue::Number(2.0));
        let old = dict.insert(PdfName::from("A"), PdfValue::Number(3.0));
        assert_eq!(old, Some(PdfValue::Number(1.0)));
        let keys: Vec<String> = dict.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["A", "B"]);
        assert_eq!(dict.get("A").unwrap().as_number(), Some(3.0));
    }
}
