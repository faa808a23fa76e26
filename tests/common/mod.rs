//! Fixtures generated on the fly into temporary directories.

#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use lopdf::{Dictionary, Document, Object, Stream};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tiff::encoder::{colortype, TiffEncoder};

pub fn name(n: &str) -> Object {
    Object::Name(n.as_bytes().to_vec())
}

/// Save a PDF with `pages` letter pages, each showing `{label}-{n}`.
pub fn write_pdf(path: &Path, pages: usize, label: &str) -> PathBuf {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();

    for n in 0..pages {
        let content = format!("BT /F1 12 Tf 50 700 Td ({}-{}) Tj ET", label, n + 1);
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
        let mut page = Dictionary::new();
        page.set("Type", name("Page"));
        page.set("Parent", Object::Reference(pages_id));
        page.set("Contents", Object::Reference(content_id));
        page.set(
            "MediaBox",
            Object::Array(vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ]),
        );
        kids.push(Object::Reference(doc.add_object(page)));
    }

    let mut tree = Dictionary::new();
    tree.set("Type", name("Pages"));
    tree.set("Count", Object::Integer(pages as i64));
    tree.set("Kids", Object::Array(kids));
    doc.objects.insert(pages_id, Object::Dictionary(tree));

    let mut catalog = Dictionary::new();
    catalog.set("Type", name("Catalog"));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));

    doc.save(path).unwrap();
    path.to_path_buf()
}

/// Save a one-page PDF whose text uses an embedded TrueType font.
pub fn write_pdf_with_font(path: &Path, base_font: &str) -> PathBuf {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let program = doc.add_object(Stream::new(Dictionary::new(), vec![0u8; 128]));
    let mut descriptor = Dictionary::new();
    descriptor.set("Type", name("FontDescriptor"));
    descriptor.set("FontName", name(base_font));
    descriptor.set("FontFile2", Object::Reference(program));
    let descriptor_id = doc.add_object(descriptor);

    let mut font = Dictionary::new();
    font.set("Type", name("Font"));
    font.set("Subtype", name("TrueType"));
    font.set("BaseFont", name(base_font));
    font.set("FontDescriptor", Object::Reference(descriptor_id));
    let font_id = doc.add_object(font);

    let mut fonts = Dictionary::new();
    fonts.set("F1", Object::Reference(font_id));
    let mut resources = Dictionary::new();
    resources.set("Font", Object::Dictionary(fonts));

    let content = b"BT /F1 12 Tf 50 700 Td (Hello) Tj ET".to_vec();
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content));
    let mut page = Dictionary::new();
    page.set("Type", name("Page"));
    page.set("Parent", Object::Reference(pages_id));
    page.set("Contents", Object::Reference(content_id));
    page.set("Resources", Object::Dictionary(resources));
    page.set(
        "MediaBox",
        Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(612),
            Object::Integer(792),
        ]),
    );
    let page_id = doc.add_object(page);

    let mut tree = Dictionary::new();
    tree.set("Type", name("Pages"));
    tree.set("Count", Object::Integer(1));
    tree.set("Kids", Object::Array(vec![Object::Reference(page_id)]));
    doc.objects.insert(pages_id, Object::Dictionary(tree));

    let mut catalog = Dictionary::new();
    catalog.set("Type", name("Catalog"));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));

    doc.save(path).unwrap();
    path.to_path_buf()
}

/// `BaseFont` names of every font in `doc`.
pub fn base_fonts(doc: &Document) -> Vec<Vec<u8>> {
    doc.objects
        .values()
        .filter_map(|o| o.as_dict().ok())
        .filter(|d| d.get(b"Type").and_then(Object::as_name).ok() == Some(&b"Font"[..]))
        .filter_map(|d| d.get(b"BaseFont").and_then(Object::as_name).ok())
        .map(<[u8]>::to_vec)
        .collect()
}

/// Whether any dictionary in `doc` still points at a TrueType program.
pub fn has_font_program(doc: &Document) -> bool {
    doc.objects
        .values()
        .filter_map(|o| o.as_dict().ok())
        .any(|d| d.has(b"FontFile2"))
}

/// Save a solid RGB image in `format`.
pub fn write_image(path: &Path, width: u32, height: u32, format: ImageFormat) -> PathBuf {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 160, 30])))
        .save_with_format(path, format)
        .unwrap();
    path.to_path_buf()
}

/// Save a TIFF with one RGB page per size, in order.
pub fn write_tiff(path: &Path, pages: &[(u32, u32)]) -> PathBuf {
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut encoder = TiffEncoder::new(&mut buffer).unwrap();
        for &(w, h) in pages {
            let data = vec![128u8; (w * h * 3) as usize];
            encoder.write_image::<colortype::RGB8>(w, h, &data).unwrap();
        }
    }
    std::fs::write(path, buffer.into_inner()).unwrap();
    path.to_path_buf()
}

/// Save a JPEG-2000 file holding only its box headers. It is never decoded,
/// only embedded and extracted.
pub fn write_jp2(path: &Path, width: u32, height: u32) -> PathBuf {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"\x00\x00\x00\x0cjP  \r\n\x87\n");
    bytes.extend_from_slice(&20u32.to_be_bytes());
    bytes.extend_from_slice(b"ftypjp2 \x00\x00\x00\x00jp2 ");
    bytes.extend_from_slice(&30u32.to_be_bytes());
    bytes.extend_from_slice(b"jp2h");
    bytes.extend_from_slice(&22u32.to_be_bytes());
    bytes.extend_from_slice(b"ihdr");
    bytes.extend_from_slice(&height.to_be_bytes());
    bytes.extend_from_slice(&width.to_be_bytes());
    bytes.extend_from_slice(&[0, 3, 7, 7, 0, 0]);
    std::fs::write(path, bytes).unwrap();
    path.to_path_buf()
}

/// `MediaBox` width and height of every page, in order.
pub fn page_sizes(path: &Path) -> Vec<(f32, f32)> {
    let doc = Document::load(path).unwrap();
    doc.get_pages()
        .values()
        .map(|id| {
            let page = doc.get_object(*id).unwrap().as_dict().unwrap();
            let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
            (
                media_box[2].as_float().unwrap(),
                media_box[3].as_float().unwrap(),
            )
        })
        .collect()
}

pub fn args(items: &[&Path]) -> Vec<String> {
    items.iter().map(|p| p.display().to_string()).collect()
}
