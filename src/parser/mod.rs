//! PDF Parser Module
//!
//! Implements a tolerant reader for the PDF 1.x file structure: header,
//! indirect object bodies, cross-reference tables and trailers, including
//! the chain of incremental updates described by `/Prev` links.

pub mod document;
pub mod filter_impls;
pub mod filters;
pub mod header;
pub mod lexer;
pub mod objects;
pub mod source;
pub mod trailer;
pub mod xref;

#[cfg(test)]
mod roundtrip_tests;

pub use self::document::{parse_file, parse_reader, PdfFile, PdfObject};

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// PDF Parser errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a PDF file: {0}")]
    NotAPdf(String),

    #[error("cannot locate cross-reference table: {0}")]
    XrefNotFound(String),

    #[error("malformed cross-reference table around offset {offset:#x}: {message}")]
    XrefMalformed { offset: u64, message: String },

    #[error("missing trailer: {0}")]
    TrailerMissing(String),

    #[error("malformed trailer: {0}")]
    TrailerMalformed(String),

    #[error("object syntax error around offset {offset:#x}: {message}")]
    ObjectSyntax { offset: u64, message: String },

    #[error("stream length {declared} does not match actual length {actual}")]
    StreamLengthMismatch { declared: i64, actual: i64 },

    #[error("no 'endstream' within stream object bounds")]
    StreamEndNotFound,

    #[error("filter {filter} failed to decode: {message}")]
    FilterDecode { filter: String, message: String },
}

/// Options controlling parsing and stream checking.
///
/// The default is strict and quiet: every recoverable error aborts the
/// parse. `fix` turns on all recovery paths (bad xref offsets, stream
/// length mismatches, `startxref` beyond end of file, JPEG stream repair);
/// `verbose` adds parse narration through the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Emit diagnostic narration while parsing.
    pub verbose: bool,
    /// Recover from damaged structure instead of failing.
    pub fix: bool,
}

impl ParseOptions {
    /// Strict parsing, no narration. Same as `default()`.
    pub fn strict() -> Self {
        Self::default()
    }

    /// Enable all recovery modes.
    pub fn repair() -> Self {
        Self {
            verbose: false,
            fix: true,
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}
