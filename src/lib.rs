//! # pdf-mend
//!
//! A library for ingesting, validating, repairing and re-emitting PDF files.
//!
//! The crate implements the hard structural core of the format: a tolerant
//! lexer over the mixed binary/text PDF grammar, a cross-reference engine
//! that resolves the chain of incremental updates from file tail to file
//! head, a body walker that reconciles object values against their declared
//! byte ranges, a stream validator for the common filter chains, and a
//! serializer that writes the object graph back out with a single
//! consolidated cross-reference table while preserving the ordering
//! semantics readers expect.
//!
//! ## Quick start
//!
//! ```no_run
//! use pdf_mend::{parse_file, ParseOptions};
//!
//! # fn main() -> Result<(), pdf_mend::PdfError> {
//! // Strict parse: any structural damage is an error.
//! let mut pdf = parse_file("input.pdf", &ParseOptions::default())?;
//!
//! // Validate embedded stream filter chains.
//! pdf.check_streams(&ParseOptions::default())?;
//!
//! // Rewrite with a single consolidated xref table.
//! pdf.save("output.pdf")?;
//! # Ok(())
//! # }
//! ```
//!
//! Repair mode (`ParseOptions::repair()`) recovers from bad xref offsets,
//! stream length mismatches and `startxref` values beyond the end of the
//! file, logging each decision through the [`log`] facade.

pub mod error;
pub mod parser;
pub mod writer;

pub use error::{PdfError, Result};
pub use parser::filter_impls::dct::{DctControl, JpegAnalysis, JpegAnalyzer, JpegMetadata};
pub use parser::filters::Filter;
pub use parser::objects::{
    ObjRef, PdfArray, PdfDictionary, PdfName, PdfStream, PdfValue,
};
pub use parser::{
    parse_file, parse_reader, ParseError, ParseOptions, ParseResult, PdfFile, PdfObject,
};
pub use writer::PdfWriter;
