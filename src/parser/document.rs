//! PDF document assembly
//!
//! Ties the pieces together: header, xref chain traversal (newest update
//! first), trailer extraction, and the body walks that attach a value to
//! each in-use object. The resulting [`PdfFile`] owns every object through
//! its id map; the file-offset ordering is kept as a separate id list.

use super::filter_impls::dct::{JpegAnalyzer, NoJpegAnalyzer};
use super::filters;
use super::header;
use super::lexer::{positive_integer, Lexer};
use super::objects::{ObjRef, PdfArray, PdfDictionary, PdfName, PdfValue};
use super::source::ByteSource;
use super::trailer::{self, TrailerBlock};
use super::xref;
use super::{ParseError, ParseOptions, ParseResult};
use log::{info, warn};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

/// One indirect object.
///
/// Created as a placeholder when its xref entry is first seen; the value is
/// attached exactly once by the body walk. Offsets of `-1` mean "unknown".
#[derive(Debug, Clone, PartialEq)]
pub struct PdfObject {
    pub id: u64,
    pub gen: u64,
    /// File offset of the `id gen obj` header.
    pub start: i64,
    /// File offset just past the object's value.
    pub stop: i64,
    pub(crate) value: Option<PdfValue>,
}

impl PdfObject {
    pub(crate) fn placeholder(id: u64, gen: u64, start: i64) -> Self {
        Self {
            id,
            gen,
            start,
            stop: -1,
            value: None,
        }
    }

    /// The parsed value, if the body walk found one.
    pub fn value(&self) -> Option<&PdfValue> {
        self.value.as_ref()
    }
}

/// A fully parsed PDF file.
#[derive(Debug)]
pub struct PdfFile {
    /// Version from the header line, e.g. `1.4`.
    pub version: String,
    /// The raw header line, e.g. `%PDF-1.4`.
    pub header: String,
    /// Ids of objects with values, in file-offset order.
    order: Vec<u64>,
    /// Owning store: every xref-declared object, keyed by id.
    by_id: HashMap<u64, PdfObject>,
    /// The newest update's trailer dictionary, key order preserved.
    pub trailer: PdfDictionary,
    pub size: i64,
    pub catalog: ObjRef,
    pub encrypt: Option<ObjRef>,
    pub info: Option<ObjRef>,
    pub id: Option<PdfArray>,
}

/// Parse a PDF file from a path. The file handle is released on return,
/// whether parsing succeeded or not.
pub fn parse_file<P: AsRef<Path>>(path: P, options: &ParseOptions) -> ParseResult<PdfFile> {
    let file = File::open(path)?;
    parse_reader(file, options)
}

/// Parse a PDF from any seekable byte source.
pub fn parse_reader<R: Read + Seek>(reader: R, options: &ParseOptions) -> ParseResult<PdfFile> {
    let src = ByteSource::new(reader)?;
    parse(src, options)
}

fn parse<R: Read + Seek>(mut src: ByteSource<R>, options: &ParseOptions) -> ParseResult<PdfFile> {
    let header = header::parse_header(&mut src, options)?;
    let xref_head = xref::hunt_for_xref(&mut src, options)?;
    let file_size = src.size();
    let mut lexer = Lexer::new(src);

    // Walk the xref chain from the newest update back to the original
    // file. Each block spans [xref_start, end of previous block).
    let mut by_id: HashMap<u64, PdfObject> = HashMap::new();
    let mut blocks: Vec<(u64, TrailerBlock)> = Vec::new();
    let mut seen = HashSet::new();
    let mut block_end = file_size;
    let mut next = Some(xref_head);
    while let Some(xref_start) = next {
        if !seen.insert(xref_start) {
            return Err(ParseError::XrefMalformed {
                offset: xref_start,
                message: "cyclic Prev chain".to_string(),
            });
        }
        xref::parse_xref_table(&mut by_id, &mut lexer, xref_start, block_end, options)?;
        let block = trailer::parse_trailer(&mut lexer, options)?;
        next = block.prev;
        block_end = xref_start;
        blocks.push((xref_start, block));
    }

    // The newest trailer provides the document-level fields.
    let fields = {
        let newest = blocks
            .first()
            .ok_or_else(|| ParseError::XrefNotFound("no xref block".to_string()))?;
        trailer::extract_trailer_fields(&newest.1.dict)?
    };

    // Each update's body sits between the previous block's %%EOF and the
    // update's own xref section; the original body starts after the header.
    let mut file_order: Vec<(u64, u64)> = blocks.iter().map(|(x, b)| (*x, b.end_pos)).collect();
    file_order.sort_by_key(|&(x, _)| x);
    let mut windows: HashMap<u64, (u64, u64)> = HashMap::new();
    for (i, &(xref_start, _)) in file_order.iter().enumerate() {
        let body_start = if i == 0 {
            header.body_start
        } else {
            file_order[i - 1].1
        };
        windows.insert(xref_start, (body_start.min(xref_start), xref_start));
    }

    // Walk bodies newest-first so a redefinition with an unchanged
    // generation still resolves to the latest instance ("first seen wins").
    let chain: Vec<u64> = blocks.iter().map(|(x, _)| *x).collect();
    for xref_start in &chain {
        let (start, end) = windows[xref_start];
        if start >= end {
            continue;
        }
        parse_objects(&mut by_id, &mut lexer, start, end, options)?;
    }

    let mut order: Vec<u64> = by_id
        .values()
        .filter(|o| o.value.is_some())
        .map(|o| o.id)
        .collect();
    order.sort_by_key(|id| by_id[id].start);

    let trailer_dict = blocks
        .into_iter()
        .next()
        .map(|(_, b)| b.dict)
        .ok_or_else(|| ParseError::XrefNotFound("no xref block".to_string()))?;

    let mut pf = PdfFile {
        version: header.version,
        header: header.header,
        order,
        by_id,
        trailer: trailer_dict,
        size: fields.size,
        catalog: fields.catalog,
        encrypt: fields.encrypt,
        info: fields.info,
        id: fields.id,
    };
    pf.finish(options)?;
    Ok(pf)
}

/// Walk one body window, reading `id gen obj <value> endobj` sequences and
/// attaching values to the objects the merged xref table declared.
fn parse_objects<R: Read + Seek>(
    by_id: &mut HashMap<u64, PdfObject>,
    lexer: &mut Lexer<R>,
    body_start: u64,
    body_end: u64,
    options: &ParseOptions,
) -> ParseResult<()> {
    lexer.source_mut().fill(body_end - body_start, body_start)?;
    if options.verbose {
        info!("body at offset {body_start:#x}");
    }
    loop {
        lexer.next_token()?;
        if lexer.token().is_empty() || lexer.token() == b"xref" {
            return Ok(());
        }
        let offset = lexer.tok_file_pos();
        let (id, gen) = parse_indirect_header(lexer)?;

        let attach = match by_id.get(&id) {
            Some(obj) => obj.gen == gen && obj.value.is_none(),
            None => false,
        };
        let stop = if attach { by_id[&id].stop } else { -1 };

        let value = PdfValue::parse(lexer, stop, options).map_err(|e| match e {
            ParseError::ObjectSyntax { offset, message } => ParseError::ObjectSyntax {
                offset,
                message: format!("object {id} {gen}: {message}"),
            },
            other => other,
        })?;
        if lexer.token() != b"endobj" {
            // a truncated value stopped at the object's declared end;
            // resume the walk there so the next object parses cleanly
            let truncated = options.fix && stop >= 0 && stop as u64 <= lexer.file_pos();
            if !truncated {
                return Err(lexer.syntax_error(format!(
                    "object {id} {gen} does not end with 'endobj', found '{}'",
                    String::from_utf8_lossy(lexer.token())
                )));
            }
            warn!("object {id} {gen} overruns its declared end {stop:#x}, resuming there");
            lexer.source_mut().seek_to(stop as u64)?;
        }

        if attach {
            let endobj_pos = lexer.tok_file_pos();
            if let Some(obj) = by_id.get_mut(&id) {
                if obj.start < 0 {
                    obj.start = offset as i64;
                }
                if obj.stop < 0 {
                    obj.stop = endobj_pos as i64;
                }
                obj.value = Some(value);
            }
        }
        // otherwise the definition was superseded by a later update and
        // the parsed value is simply dropped
    }
}

fn parse_indirect_header<R: Read + Seek>(lexer: &mut Lexer<R>) -> ParseResult<(u64, u64)> {
    let id = positive_integer(lexer.token()).ok_or_else(|| {
        lexer.syntax_error(format!(
            "invalid indirect object id '{}'",
            String::from_utf8_lossy(lexer.token())
        ))
    })?;
    lexer.next_token()?;
    let gen = positive_integer(lexer.token()).ok_or_else(|| {
        lexer.syntax_error(format!(
            "invalid generation for object {id}: '{}'",
            String::from_utf8_lossy(lexer.token())
        ))
    })?;
    lexer.next_token()?;
    if lexer.token() != b"obj" {
        return Err(lexer.syntax_error(format!(
            "object {id} {gen} not followed by 'obj'"
        )));
    }
    lexer.next_token()?;
    Ok((id as u64, gen as u64))
}

impl PdfFile {
    /// Create a fresh, minimal document: an empty page tree and a catalog,
    /// ready to be serialized.
    pub fn new_document(minor_version: u8) -> PdfFile {
        let mut pf = PdfFile {
            version: format!("1.{minor_version}"),
            header: format!("%PDF-1.{minor_version}"),
            order: Vec::new(),
            by_id: HashMap::new(),
            trailer: PdfDictionary::new(),
            size: 3, // free-list head plus two objects
            catalog: ObjRef { id: 2, gen: 0 },
            encrypt: None,
            info: None,
            id: None,
        };

        let mut pages = PdfDictionary::new();
        pages.insert(PdfName::from("Type"), PdfValue::Name(PdfName::from("Pages")));
        pages.insert(PdfName::from("Count"), PdfValue::Number(0.0));
        pages.insert(PdfName::from("Kids"), PdfValue::Array(PdfArray::new()));
        pf.insert_object(1, 0, PdfValue::Dictionary(pages));

        let mut catalog = PdfDictionary::new();
        catalog.insert(
            PdfName::from("Type"),
            PdfValue::Name(PdfName::from("Catalog")),
        );
        catalog.insert(
            PdfName::from("Pages"),
            PdfValue::Reference(ObjRef { id: 1, gen: 0 }),
        );
        pf.insert_object(2, 0, PdfValue::Dictionary(catalog));

        pf.trailer
            .insert(PdfName::from("Size"), PdfValue::Number(3.0));
        pf.trailer.insert(
            PdfName::from("Root"),
            PdfValue::Reference(ObjRef { id: 2, gen: 0 }),
        );
        pf
    }

    /// Add an indirect object; it serializes after all existing objects.
    pub fn insert_object(&mut self, id: u64, gen: u64, value: PdfValue) {
        let obj = PdfObject {
            id,
            gen,
            start: -1,
            stop: -1,
            value: Some(value),
        };
        self.order.push(id);
        self.by_id.insert(id, obj);
    }

    /// Objects with values, in file-offset order.
    pub fn objects(&self) -> impl Iterator<Item = &PdfObject> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    pub fn object(&self, id: u64) -> Option<&PdfObject> {
        self.by_id.get(&id)
    }

    pub fn object_count(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn order_ids(&self) -> Vec<u64> {
        self.order.clone()
    }

    pub(crate) fn object_mut(&mut self, id: u64) -> Option<&mut PdfObject> {
        self.by_id.get_mut(&id)
    }

    /// Resolve a reference to its value, checking the generation.
    pub fn resolve(&self, r: ObjRef) -> Option<&PdfValue> {
        let obj = self.by_id.get(&r.id)?;
        if obj.gen != r.gen {
            return None;
        }
        obj.value.as_ref()
    }

    /// References (from object values and the trailer) that do not resolve
    /// to an existing object with a matching generation.
    pub fn missing_references(&self) -> Vec<ObjRef> {
        let mut refs = Vec::new();
        for obj in self.objects() {
            if let Some(value) = obj.value() {
                collect_refs(value, &mut refs);
            }
        }
        for (_, value) in self.trailer.iter() {
            collect_refs(value, &mut refs);
        }
        refs.sort_by_key(|r| (r.id, r.gen));
        refs.dedup();
        refs.into_iter()
            .filter(|r| self.resolve(*r).is_none())
            .collect()
    }

    /// Iterate stream objects and validate their filter chains. DCT
    /// streams are treated as unsupported without an analyzer; see
    /// [`PdfFile::check_streams_with`].
    pub fn check_streams(&mut self, options: &ParseOptions) -> ParseResult<()> {
        self.check_streams_with(options, &NoJpegAnalyzer)
    }

    /// Stream validation with an external JPEG analyzer for DCTDecode
    /// streams. In fix mode a repaired JPEG replaces the stream payload
    /// and updates the extent dictionary.
    pub fn check_streams_with(
        &mut self,
        options: &ParseOptions,
        analyzer: &dyn JpegAnalyzer,
    ) -> ParseResult<()> {
        for id in self.order_ids() {
            let obj = match self.by_id.get_mut(&id) {
                Some(obj) => obj,
                None => continue,
            };
            let (oid, ogen) = (obj.id, obj.gen);
            if let Some(PdfValue::Stream(stream)) = obj.value.as_mut() {
                if options.verbose {
                    info!("checking stream object {oid} {ogen}");
                }
                filters::check_stream(stream, options, analyzer)?;
            }
        }
        Ok(())
    }

    /// Compute a fresh trailer `/ID` pair from the header, the object
    /// count and the current time.
    pub fn refresh_id(&mut self) {
        let mut ctx = md5::Context::new();
        ctx.consume(self.header.as_bytes());
        ctx.consume((self.order.len() as u64).to_le_bytes());
        ctx.consume(chrono::Utc::now().to_rfc3339().as_bytes());
        let first = ctx.compute().0.to_vec();

        let mut ctx = md5::Context::new();
        ctx.consume(&first);
        ctx.consume(b"update");
        let second = ctx.compute().0.to_vec();

        let array = PdfArray(vec![
            PdfValue::HexString(first),
            PdfValue::HexString(second),
        ]);
        // reuse an existing /ID (or /Id) key slot if there is one
        let key = self
            .trailer
            .keys()
            .find(|k| k.as_bytes().eq_ignore_ascii_case(b"id"))
            .cloned()
            .unwrap_or_else(|| PdfName::from("ID"));
        self.trailer
            .insert(key, PdfValue::Array(array.clone()));
        self.id = Some(array);
    }

    /// Post-parse invariant checks.
    fn finish(&mut self, options: &ParseOptions) -> ParseResult<()> {
        let in_use = self.by_id.len() as i64;
        if self.size < 1 + in_use {
            if !options.fix {
                return Err(ParseError::TrailerMalformed(format!(
                    "trailer Size {} is smaller than 1 + {} objects in use",
                    self.size, in_use
                )));
            }
            warn!(
                "trailer Size {} is smaller than 1 + {} objects in use, correcting",
                self.size, in_use
            );
            self.size = 1 + in_use;
            self.trailer
                .insert(PdfName::from("Size"), PdfValue::Number(self.size as f64));
        }
        Ok(())
    }
}

fn collect_refs(value: &PdfValue, out: &mut Vec<ObjRef>) {
    match value {
        PdfValue::Reference(r) => out.push(*r),
        PdfValue::Array(a) => {
            for v in a.iter() {
                collect_refs(v, out);
            }
        }
        PdfValue::Dictionary(d) => {
            for (_, v) in d.iter() {
                collect_refs(v, out);
            }
        }
        PdfValue::Stream(s) => {
            for (_, v) in s.extent.iter() {
                collect_refs(v, out);
            }
        }
        _ => {}
    }
}
