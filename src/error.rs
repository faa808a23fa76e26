//! Error types for merge-to-pdf.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for merge-to-pdf operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while assembling or extracting.
#[derive(Error, Debug)]
pub enum Error {
    /// `-A` value does not name a standard page size.
    #[error("Unknown page size {0}")]
    UnknownPageSize(String),

    /// `--scale` value is neither `WxH` nor a page size name.
    #[error("Invalid scale box {0}: expected WxH or a page size name")]
    InvalidScaleBox(String),

    /// Gravity name not found in the gravity table.
    #[error("Unknown gravity value {0}")]
    UnknownGravity(String),

    #[error("Gravity is only applicable when page is defined")]
    GravityWithoutPage,

    #[error("Border option should be a non-negative integer but was {0}")]
    InvalidBorder(String),

    #[error("Remove font option value should be a valid regular expression: {0}")]
    InvalidFontPattern(#[from] regex::Error),

    /// Border eats the whole box or page.
    #[error("Border {border} leaves no room inside a {width}x{height} box")]
    BorderTooLarge { border: f32, width: f32, height: f32 },

    #[error("At least two input files are required, got {0}")]
    NotEnoughInputs(usize),

    #[error("Input PDF file is required")]
    InputRequired,

    /// Raster input could not be decoded.
    #[error("Failed to decode image {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    /// Embedded image stream could not be turned into a file.
    #[error("Failed to decode image stream: {0}")]
    ImageStream(String),

    #[error("Failed to load PDF {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: lopdf::Error,
    },

    #[error("Failed to save PDF {}: {reason}", path.display())]
    Save { path: PathBuf, reason: String },

    /// The PDF object graph lacks something the operation needs.
    #[error("PDF structure error: {0}")]
    Structure(String),

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Coarse classification used to pick a process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Option values that failed validation before any I/O.
    Validation,
    /// Not enough input files were named.
    MissingInput,
    /// A raster or image stream could not be decoded.
    Decode,
    /// Reading, parsing or writing a file failed.
    Io,
}

impl Error {
    pub fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownPageSize(_)
            | Error::InvalidScaleBox(_)
            | Error::UnknownGravity(_)
            | Error::GravityWithoutPage
            | Error::InvalidBorder(_)
            | Error::InvalidFontPattern(_)
            | Error::BorderTooLarge { .. } => ErrorKind::Validation,
            Error::NotEnoughInputs(_) | Error::InputRequired => ErrorKind::MissingInput,
            Error::Decode { .. } | Error::ImageStream(_) => ErrorKind::Decode,
            Error::Load { .. }
            | Error::Save { .. }
            | Error::Structure(_)
            | Error::Pdf(_)
            | Error::Io(_) => ErrorKind::Io,
        }
    }
}
