//! PDF Serializer
//!
//! Writes a parsed or constructed document back out: header line and
//! binary marker, every object in file order (recording its new offset),
//! one consolidated xref table, and the trailer with `/Size`, `/Root`,
//! `/Info`, `/Encrypt` and `/ID` refreshed from the extracted fields while
//! every other key keeps its original position and value.

use crate::error::{PdfError, Result};
use crate::parser::objects::{PdfArray, PdfDictionary, PdfStream, PdfValue};
use crate::parser::PdfFile;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub struct PdfWriter<W: Write> {
    writer: W,
    position: u64,
}

impl<W: Write> PdfWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            position: 0,
        }
    }

    /// Serialize the whole document. Object `start` offsets are updated
    /// to their positions in the new file.
    pub fn write_file(&mut self, pdf: &mut PdfFile) -> Result<()> {
        self.write_header(pdf)?;
        self.write_objects(pdf)?;
        let (last_id, xref_pos) = self.write_xref(pdf)?;
        self.write_trailer(pdf, last_id, xref_pos)?;
        self.writer.flush()?;
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    fn write_header(&mut self, pdf: &PdfFile) -> Result<()> {
        self.write_bytes(pdf.header.as_bytes())?;
        self.write_bytes(&[0x0a, b'%', 0xf6, 0xe4, 0xfc, 0xdf, 0x0a])
    }

    fn write_objects(&mut self, pdf: &mut PdfFile) -> Result<()> {
        for id in pdf.order_ids() {
            let position = self.position;
            let obj = match pdf.object_mut(id) {
                Some(obj) => obj,
                None => continue,
            };
            obj.start = position as i64;
            let (oid, ogen) = (obj.id, obj.gen);
            let value = obj.value().ok_or_else(|| {
                PdfError::InvalidStructure(format!("object {oid} {ogen} has no value"))
            })?;
            self.write_bytes(format!("{oid} {ogen} obj\n").as_bytes())?;
            self.serialize_value(value, 0)?;
            self.write_bytes(b"\nendobj\n")?;
        }
        Ok(())
    }

    /// One consolidated section covering ids `0..=max_id`; ids without a
    /// serialized object become free entries. Returns `/Size` and the
    /// section's file offset.
    fn write_xref(&mut self, pdf: &PdfFile) -> Result<(i64, u64)> {
        let pos = self.position;
        self.write_bytes(b"xref\n")?;
        let max_id = pdf.order_ids().into_iter().max().unwrap_or(0);
        self.write_bytes(format!("0 {}\n", max_id + 1).as_bytes())?;
        self.write_bytes(b"0000000000 65535 f\r\n")?;
        for id in 1..=max_id {
            match pdf.object(id) {
                Some(obj) if obj.value().is_some() && obj.start >= 0 => {
                    self.write_bytes(
                        format!("{:010} {:05} n\r\n", obj.start, obj.gen).as_bytes(),
                    )?;
                }
                _ => self.write_bytes(b"0000000000 65535 f\r\n")?,
            }
        }
        Ok((max_id as i64 + 1, pos))
    }

    fn write_trailer(&mut self, pdf: &PdfFile, last_id: i64, xref_pos: u64) -> Result<()> {
        self.write_bytes(b"trailer\n<<\n")?;
        for (key, value) in pdf.trailer.iter() {
            match key.as_bytes() {
                // a consolidated file has a single xref section
                b"Prev" => {}
                b"Size" => self.write_bytes(format!("/Size {last_id}\n").as_bytes())?,
                b"Root" => self.write_bytes(
                    format!("/Root {} {} R\n", pdf.catalog.id, pdf.catalog.gen).as_bytes(),
                )?,
                b"Info" if pdf.info.is_some() => {
                    if let Some(r) = pdf.info {
                        self.write_bytes(format!("/Info {} {} R\n", r.id, r.gen).as_bytes())?;
                    }
                }
                b"Encrypt" if pdf.encrypt.is_some() => {
                    if let Some(r) = pdf.encrypt {
                        self.write_bytes(
                            format!("/Encrypt {} {} R\n", r.id, r.gen).as_bytes(),
                        )?;
                    }
                }
                k if k.eq_ignore_ascii_case(b"id") && id_hex_pair(pdf).is_some() => {
                    if let Some((first, second)) = id_hex_pair(pdf) {
                        self.write_bytes(
                            format!("/ID [<{}> <{}>]\n", hex_upper(first), hex_upper(second))
                                .as_bytes(),
                        )?;
                    }
                }
                _ => {
                    self.write_bytes(b"/")?;
                    self.write_bytes(key.as_bytes())?;
                    self.write_bytes(b" ")?;
                    self.serialize_value(value, 0)?;
                    self.write_bytes(b"\n")?;
                }
            }
        }
        self.write_bytes(format!(">>\nstartxref\n{xref_pos}\n%%EOF\n").as_bytes())
    }

    fn serialize_value(&mut self, value: &PdfValue, depth: usize) -> Result<()> {
        match value {
            PdfValue::Bool(b) => self.write_bytes(if *b { b"true" } else { b"false" }),
            PdfValue::Number(n) => self.write_bytes(format_number(*n).as_bytes()),
            PdfValue::LiteralString(s) => {
                self.write_bytes(b"(")?;
                self.write_bytes(s)?;
                self.write_bytes(b")")
            }
            PdfValue::HexString(h) => {
                self.write_bytes(b"<")?;
                self.write_bytes(hex_upper(h).as_bytes())?;
                self.write_bytes(b">")
            }
            PdfValue::Name(n) => {
                self.write_bytes(b"/")?;
                self.write_bytes(n.as_bytes())
            }
            PdfValue::Dictionary(d) => self.serialize_dictionary(d, depth),
            PdfValue::Stream(s) => self.serialize_stream(s, depth),
            PdfValue::Array(a) => self.serialize_array(a, depth),
            PdfValue::Null => self.write_bytes(b"null"),
            PdfValue::Reference(r) => {
                self.write_bytes(format!("{} {} R", r.id, r.gen).as_bytes())
            }
        }
    }

    fn serialize_dictionary(&mut self, dict: &PdfDictionary, depth: usize) -> Result<()> {
        self.write_bytes(b"<<\n")?;
        for (key, value) in dict.iter() {
            self.write_bytes(b"/")?;
            self.write_bytes(key.as_bytes())?;
            self.write_bytes(b" ")?;
            self.serialize_value(value, depth)?;
            self.write_bytes(b"\n")?;
        }
        self.write_bytes(b">>")
    }

    fn serialize_stream(&mut self, stream: &PdfStream, depth: usize) -> Result<()> {
        self.serialize_dictionary(&stream.extent, depth)?;
        self.write_bytes(b"\nstream\r\n")?;
        self.write_bytes(&stream.data)?;
        self.write_bytes(b"\r\nendstream")
    }

    /// Items separated by one space, at most ten per line; a nested array
    /// already ends its own line, so the newline separator is skipped
    /// after one. Only the outermost array closes without a newline.
    fn serialize_array(&mut self, array: &PdfArray, depth: usize) -> Result<()> {
        self.write_bytes(b"[")?;
        let mut previous_was_array = false;
        for (i, item) in array.iter().enumerate() {
            if i > 0 {
                let sep: &[u8] = if i % 10 == 0 {
                    if previous_was_array {
                        b""
                    } else {
                        b"\n"
                    }
                } else {
                    b" "
                };
                self.write_bytes(sep)?;
            }
            self.serialize_value(item, depth + 1)?;
            previous_was_array = matches!(item, PdfValue::Array(_));
        }
        if depth == 0 {
            self.write_bytes(b"]")
        } else {
            self.write_bytes(b"]\n")
        }
    }
}

impl PdfFile {
    /// Write a consolidated single-xref rendition of the document.
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = PdfWriter::new(BufWriter::new(file));
        writer.write_file(self)
    }

    /// Serialize into any writer, recording the new object offsets.
    pub fn write_to<W: Write>(&mut self, writer: W) -> Result<()> {
        let mut writer = PdfWriter::new(writer);
        writer.write_file(self)
    }
}

fn id_hex_pair(pdf: &PdfFile) -> Option<(&[u8], &[u8])> {
    let id = pdf.id.as_ref()?;
    match (id.get(0), id.get(1)) {
        (Some(PdfValue::HexString(a)), Some(PdfValue::HexString(b))) => {
            Some((a.as_slice(), b.as_slice()))
        }
        _ => None,
    }
}

fn hex_upper(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02X}"));
    }
    out
}

/// Render a number the way PDF expects it: plain decimal, no exponent,
/// no trailing zeros after the decimal point. Rust's shortest-decimal
/// float formatting provides exactly this, including the denormalised
/// expansion of very small and very large magnitudes.
pub(crate) fn format_number(n: f64) -> String {
    if !n.is_finite() {
        return "0".to_string();
    }
    format!("{n}")
}
