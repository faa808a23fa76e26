//! Merge PDFs and images into one PDF
//!
//! Inputs are taken in order: PDF pages are copied as they are, raster files
//! (multi-page TIFF included) become one page per frame, optionally scaled by
//! their resolution, fitted into a box or placed on a standard page. Embedded
//! TrueType fonts can be unembedded on the way. Images embedded in a PDF can be
//! written back out in their native format.
//!
//! ```no_run
//! use merge_to_pdf::{merge_args, MergeOptions};
//!
//! let report = merge_args(&["cover.pdf", "scan.tiff", "out.pdf"], &MergeOptions::default())?;
//! println!("{} pages", report.pages);
//! # Ok::<(), merge_to_pdf::Error>(())
//! ```

pub mod assemble;
pub mod batch;
pub mod cli;
pub mod error;
pub mod extract;
pub mod fonts;
pub mod frames;
pub mod geometry;
pub mod graph;
pub mod source;

pub use assemble::{merge_args, merge_files, DocumentAssembler, MergeOptions, MergeReport};
pub use error::{Error, ErrorKind, Result};
pub use extract::{extract_images, ExtractReport};
pub use fonts::{sanitize, FontPattern, SanitizeReport};
pub use frames::{load_frames, DecodedFrame, EncodedImage, Frame};
pub use geometry::{Gravity, LayoutBox, LayoutOptions, ScalePlan};
pub use source::{PageSource, PlacedFrame};
