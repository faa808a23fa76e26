//! Inputs of a merge, each turned into a standalone document.

use crate::error::{Error, Result};
use crate::fonts::{self, FontPattern};
use crate::frames::{self, EncodedImage, Frame};
use crate::geometry::{self, LayoutBox, LayoutOptions, ScalePlan};
use crate::graph;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use log::{debug, info};
use std::path::{Path, PathBuf};

/// A decoded raster frame with its page layout.
#[derive(Debug, Clone)]
pub struct PlacedFrame {
    pub frame: Frame,
    pub image: EncodedImage,
    pub plan: ScalePlan,
}

/// One merge input.
#[derive(Debug, Clone)]
pub enum PageSource {
    /// An existing PDF whose pages are copied as they are
    PdfPages {
        path: PathBuf,
        font_filter: Option<FontPattern>,
    },
    /// A raster file; one page per frame
    ImagePages {
        path: PathBuf,
        frames: Vec<PlacedFrame>,
    },
}

/// True when `path` has a `.pdf` extension, in any case.
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

impl PageSource {
    /// Classify `path` and, for rasters, decode and lay out every frame.
    pub fn resolve(
        path: &Path,
        layout: &LayoutOptions,
        font_filter: Option<&FontPattern>,
    ) -> Result<Self> {
        if is_pdf(path) {
            return Ok(PageSource::PdfPages {
                path: path.to_path_buf(),
                font_filter: font_filter.cloned(),
            });
        }

        let decoded = frames::load_frames(path)?;
        let mut placed = Vec::with_capacity(decoded.len());
        for (index, decoded) in decoded.into_iter().enumerate() {
            let frame = decoded.frame;
            let natural = LayoutBox::new(frame.width as f32, frame.height as f32);
            let plan = geometry::plan(natural, (frame.dpi_x, frame.dpi_y), layout)?;
            debug!(
                "{} frame {}: {}x{} px at {:?} dpi -> {} on {} at ({}, {})",
                path.display(),
                index + 1,
                frame.width,
                frame.height,
                (frame.dpi_x, frame.dpi_y),
                plan.size,
                plan.page,
                plan.origin.0,
                plan.origin.1
            );
            placed.push(PlacedFrame {
                frame,
                image: decoded.image,
                plan,
            });
        }

        Ok(PageSource::ImagePages {
            path: path.to_path_buf(),
            frames: placed,
        })
    }

    /// Build the document holding this source's pages.
    pub fn into_document(self) -> Result<Document> {
        match self {
            PageSource::PdfPages { path, font_filter } => {
                let mut doc = Document::load(&path).map_err(|source| Error::Load {
                    path: path.clone(),
                    source,
                })?;
                if let Some(pattern) = font_filter {
                    let report = fonts::sanitize(&mut doc, &pattern);
                    info!(
                        "{}: unembedded {} font(s), removed {} object(s)",
                        path.display(),
                        report.unembedded.len(),
                        report.objects_removed
                    );
                }
                info!("Adding {}", path.display());
                Ok(doc)
            }
            PageSource::ImagePages { path, frames } => {
                let doc = image_document(&frames)?;
                info!("Adding {} ({} page(s))", path.display(), frames.len());
                Ok(doc)
            }
        }
    }
}

fn real(v: f32) -> Object {
    Object::Real(v)
}

fn add_image(doc: &mut Document, image: &EncodedImage) -> ObjectId {
    let mut stream = image.to_stream();
    if let Some(mask) = &image.soft_mask {
        let mask_id = doc.add_object(mask.to_stream());
        stream.dict.set("SMask", Object::Reference(mask_id));
    }
    doc.add_object(stream)
}

/// Drawing operators placing `Im1` at the planned origin and size.
fn placement_content(plan: &ScalePlan) -> Result<Vec<u8>> {
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    real(plan.size.width),
                    real(0.0),
                    real(0.0),
                    real(plan.size.height),
                    real(plan.origin.0),
                    real(plan.origin.1),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im1".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    content.encode().map_err(Error::from)
}

/// A document with one page per placed frame.
pub fn image_document(frames: &[PlacedFrame]) -> Result<Document> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::with_capacity(frames.len());

    for placed in frames {
        let image_id = add_image(&mut doc, &placed.image);
        let content_id = doc.add_object(Stream::new(Dictionary::new(), placement_content(&placed.plan)?));

        let mut xobjects = Dictionary::new();
        xobjects.set("Im1", Object::Reference(image_id));
        let mut resources = Dictionary::new();
        resources.set("XObject", Object::Dictionary(xobjects));

        let mut page = Dictionary::new();
        page.set("Type", Object::Name(b"Page".to_vec()));
        page.set("Parent", Object::Reference(pages_id));
        page.set(
            "MediaBox",
            Object::Array(vec![
                real(0.0),
                real(0.0),
                real(placed.plan.page.width),
                real(placed.plan.page.height),
            ]),
        );
        page.set("Resources", Object::Dictionary(resources));
        page.set("Contents", Object::Reference(content_id));
        kids.push(Object::Reference(doc.add_object(page)));
    }

    let mut pages = Dictionary::new();
    pages.set("Type", Object::Name(b"Pages".to_vec()));
    pages.set("Count", Object::Integer(kids.len() as i64));
    pages.set("Kids", Object::Array(kids));
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));

    graph::sweep_unreferenced(&mut doc);
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Gravity;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

    #[test]
    fn test_is_pdf_ignores_case() {
        assert!(is_pdf(Path::new("a/b/Report.PDF")));
        assert!(is_pdf(Path::new("x.pdf")));
        assert!(!is_pdf(Path::new("x.pdf.png")));
        assert!(!is_pdf(Path::new("pdf")));
    }

    #[test]
    fn test_pdf_source_is_not_decoded() {
        let source = PageSource::resolve(
            Path::new("missing.pdf"),
            &LayoutOptions::default(),
            Some(&FontPattern::all()),
        )
        .unwrap();
        assert!(matches!(source, PageSource::PdfPages { font_filter: Some(_), .. }));
        assert!(matches!(source.into_document(), Err(Error::Load { .. })));
    }

    #[test]
    fn test_image_page_places_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dot.png");
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(50, 50, Rgba([0, 0, 255, 128])))
            .save_with_format(&path, ImageFormat::Png)
            .unwrap();

        let layout = LayoutOptions {
            page: Some(LayoutBox::new(200.0, 300.0)),
            border: 10.0,
            gravity: Gravity::Center,
            ..Default::default()
        };
        let source = PageSource::resolve(&path, &layout, None).unwrap();
        assert!(matches!(&source, PageSource::ImagePages { frames, .. } if frames.len() == 1));

        let doc = source.into_document().unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);
        let page_id = *pages.values().next().unwrap();

        let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
        let cm = &content.operations[1];
        assert_eq!(cm.operator, "cm");
        let values: Vec<f32> = cm.operands.iter().map(|o| o.as_float().unwrap()).collect();
        assert_eq!(values, vec![50.0, 0.0, 0.0, 50.0, 85.0, 135.0]);

        // Image and its soft mask survive the sweep
        let images = doc
            .objects
            .values()
            .filter(|o| matches!(o, Object::Stream(s) if graph::name_of(&s.dict, b"Subtype") == Some(b"Image")))
            .count();
        assert_eq!(images, 2);
    }
}
