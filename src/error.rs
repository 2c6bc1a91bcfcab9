use thiserror::Error;

/// Crate-level error type.
///
/// Parsing has its own, finer-grained [`crate::parser::ParseError`]; it is
/// wrapped here so that callers driving the full ingest/check/rewrite cycle
/// can use a single error type.
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Parse(#[from] crate::parser::ParseError),

    #[error("Invalid PDF structure: {0}")]
    InvalidStructure(String),

    #[error("Serialization error: {0}")]
    Serialize(String),
}

pub type Result<T> = std::result::Result<T, PdfError>;
