//! DCTDecode (JPEG) delegation
//!
//! JPEG codec internals are out of scope for this crate. The stream
//! validator hands DCT data to an external analyzer through the narrow
//! interface below; in fix mode a repaired image replaces the stream
//! payload and its extent entries.

use crate::parser::{ParseError, ParseResult};

/// What the analyzer is asked to do.
#[derive(Debug, Clone, Copy, Default)]
pub struct DctControl {
    /// Describe the JPEG content while analyzing.
    pub content: bool,
    /// Produce repaired bytes when the data is damaged.
    pub fix: bool,
}

/// Image properties reported by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegMetadata {
    /// Bits per component.
    pub sample_size: u32,
    pub width: u32,
    pub height: u32,
}

/// Result of analyzing one DCT stream.
#[derive(Debug, Clone)]
pub struct JpegAnalysis {
    /// The data parsed as a complete JPEG image.
    pub complete: bool,
    /// Length of the JPEG as located in the stream.
    pub actual_length: usize,
    /// Length of the entropy-coded data.
    pub data_length: usize,
    pub metadata: JpegMetadata,
    /// Regenerated bytes, when fixing was requested and possible.
    pub fixed: Option<Vec<u8>>,
}

/// Narrow interface to an external JPEG analyzer.
pub trait JpegAnalyzer {
    /// Whether this analyzer can handle DCT data at all. When `false`,
    /// DCT streams fall under the unsupported-filter pass-through policy.
    fn available(&self) -> bool {
        true
    }

    fn analyze(&self, data: &[u8], control: &DctControl) -> ParseResult<JpegAnalysis>;
}

/// Default analyzer: declines, so DCT streams pass through unchecked.
pub struct NoJpegAnalyzer;

impl JpegAnalyzer for NoJpegAnalyzer {
    fn available(&self) -> bool {
        false
    }

    fn analyze(&self, _data: &[u8], _control: &DctControl) -> ParseResult<JpegAnalysis> {
        Err(ParseError::FilterDecode {
            filter: "DCTDecode".to_string(),
            message: "no JPEG analyzer available".to_string(),
        })
    }
}
