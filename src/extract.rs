//! Writing embedded images out as files in their native format.

use crate::error::{Error, Result};
use crate::graph::{self, integer_of, name_of};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use tiff::tags::{CompressionMethod, PhotometricInterpretation, Tag};

/// Encoded image bytes and the file extension that fits them.
#[derive(Debug, Clone)]
pub struct ExtractedImage {
    pub data: Vec<u8>,
    /// `jpg`, `jp2`, `jbig2`, `tif` or `png`
    pub extension: &'static str,
}

/// Files written by one extraction run.
#[derive(Debug, Default, Clone)]
pub struct ExtractReport {
    pub files: Vec<PathBuf>,
    /// Image streams that could not be decoded
    pub skipped: Vec<ObjectId>,
}

/// Output path prefix for images extracted from `input`.
///
/// Without a prefix, files go next to the input and are named after it. A
/// prefix ending in a path separator names a directory; the input's base name
/// is appended to it.
pub fn output_prefix(input: &Path, prefix: Option<&str>) -> PathBuf {
    let base_name = input.file_stem().unwrap_or_default();
    match prefix {
        Some(p) if p.ends_with('/') || p.ends_with(MAIN_SEPARATOR) => Path::new(p).join(base_name),
        Some(p) => PathBuf::from(p),
        None => input.with_file_name(base_name),
    }
}

/// Extract every image XObject of `input` to `{prefix}_{n}.{ext}`.
pub fn extract_images(input: &Path, prefix: Option<&str>) -> Result<ExtractReport> {
    let doc = Document::load(input).map_err(|source| Error::Load {
        path: input.to_path_buf(),
        source,
    })?;
    let prefix = output_prefix(input, prefix);
    if let Some(dir) = prefix.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }

    let mut report = ExtractReport::default();
    for (id, object) in &doc.objects {
        let stream = match object {
            Object::Stream(s) if name_of(&s.dict, b"Subtype") == Some(b"Image") => s,
            _ => continue,
        };

        let image = match extract_image_native(&doc, stream) {
            Ok(image) => image,
            Err(e) => {
                warn!("Skipping image {} {}: {}", id.0, id.1, e);
                report.skipped.push(*id);
                continue;
            }
        };

        let mut file_name = prefix.clone().into_os_string();
        file_name.push(format!("_{}.{}", report.files.len() + 1, image.extension));
        let path = PathBuf::from(file_name);
        info!("Extracting {}...", path.display());
        fs::write(&path, &image.data)?;
        report.files.push(path);
    }

    Ok(report)
}

/// Extract from the first of `args`, the command line convention.
pub fn extract_args<P: AsRef<Path>>(args: &[P], prefix: Option<&str>) -> Result<ExtractReport> {
    let input = args.first().ok_or(Error::InputRequired)?;
    extract_images(input.as_ref(), prefix)
}

/// Native encoding of one image stream.
pub fn extract_image_native(doc: &Document, stream: &Stream) -> Result<ExtractedImage> {
    let mut filters = graph::stream_filters(stream);
    let mut data = stream.content.clone();

    // Flate wrapped around an image codec
    while filters.len() > 1 && filters[0] == "FlateDecode" {
        data = graph::inflate(&data).map_err(|e| Error::ImageStream(e.to_string()))?;
        filters.remove(0);
    }

    let extension = match filters.first().map(String::as_str) {
        Some("DCTDecode") => "jpg",
        Some("JPXDecode") => "jp2",
        Some("JBIG2Decode") => "jbig2",
        Some("CCITTFaxDecode") => {
            return Ok(ExtractedImage {
                data: ccitt_to_tiff(&stream.dict, &data)?,
                extension: "tif",
            })
        }
        _ => {
            return Ok(ExtractedImage {
                data: raw_to_png(doc, stream)?,
                extension: "png",
            })
        }
    };
    debug!("Copying {} bytes as {}", data.len(), extension);

    Ok(ExtractedImage { data, extension })
}

/// Layout of decoded samples, as far as PNG output cares.
#[derive(Debug, Clone, PartialEq)]
enum PixelLayout {
    Gray,
    Rgb,
    /// RGB palette, three bytes per entry
    Indexed(Vec<u8>),
}

fn color_space_layout(doc: &Document, color_space: &Object) -> Result<PixelLayout> {
    let color_space = graph::resolve(doc, color_space)
        .ok_or_else(|| Error::ImageStream("dangling color space".to_string()))?;
    match color_space {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"CalGray" | b"G" => Ok(PixelLayout::Gray),
            b"DeviceRGB" | b"CalRGB" | b"RGB" => Ok(PixelLayout::Rgb),
            other => Err(Error::ImageStream(format!(
                "unsupported color space {}",
                String::from_utf8_lossy(other)
            ))),
        },
        Object::Array(items) => match items.first() {
            Some(Object::Name(n)) if n == b"ICCBased" => {
                let components = items
                    .get(1)
                    .and_then(|o| graph::resolve(doc, o))
                    .and_then(|o| o.as_stream().ok())
                    .and_then(|s| integer_of(&s.dict, b"N"));
                match components {
                    Some(1) => Ok(PixelLayout::Gray),
                    Some(3) => Ok(PixelLayout::Rgb),
                    n => Err(Error::ImageStream(format!(
                        "unsupported ICC component count {:?}",
                        n
                    ))),
                }
            }
            Some(Object::Name(n)) if n == b"Indexed" || n == b"I" => indexed_palette(doc, items),
            Some(Object::Name(n)) if n == b"CalGray" => Ok(PixelLayout::Gray),
            Some(Object::Name(n)) if n == b"CalRGB" => Ok(PixelLayout::Rgb),
            _ => Err(Error::ImageStream("unsupported color space array".to_string())),
        },
        _ => Err(Error::ImageStream("invalid color space".to_string())),
    }
}

/// `[/Indexed base hival lookup]` as an RGB palette.
fn indexed_palette(doc: &Document, items: &[Object]) -> Result<PixelLayout> {
    let base = items
        .get(1)
        .ok_or_else(|| Error::ImageStream("indexed color space without base".to_string()))?;
    let hival = items
        .get(2)
        .and_then(|o| graph::resolve(doc, o))
        .and_then(|o| o.as_i64().ok())
        .unwrap_or(255)
        .clamp(0, 255) as usize;
    let lookup = match items.get(3).and_then(|o| graph::resolve(doc, o)) {
        Some(Object::String(bytes, _)) => bytes.clone(),
        Some(Object::Stream(s)) => {
            if graph::stream_filters(s).is_empty() {
                s.content.clone()
            } else {
                s.decompressed_content()?
            }
        }
        _ => return Err(Error::ImageStream("indexed color space without lookup".to_string())),
    };

    let entries = hival + 1;
    let palette = match color_space_layout(doc, base)? {
        PixelLayout::Rgb => lookup.get(..entries * 3).map(<[u8]>::to_vec),
        PixelLayout::Gray => lookup
            .get(..entries)
            .map(|g| g.iter().flat_map(|v| [*v, *v, *v]).collect()),
        PixelLayout::Indexed(_) => None,
    };
    palette
        .map(PixelLayout::Indexed)
        .ok_or_else(|| Error::ImageStream("short indexed lookup table".to_string()))
}

/// Re-encode unfiltered, Flate or LZW image samples as PNG.
fn raw_to_png(doc: &Document, stream: &Stream) -> Result<Vec<u8>> {
    let dict = &stream.dict;
    let dimension = |key: &[u8]| {
        integer_of(dict, key)
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0)
            .ok_or_else(|| Error::ImageStream("invalid image dimensions".to_string()))
    };
    let (width, height) = (dimension(b"Width")?, dimension(b"Height")?);

    let image_mask = matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true)));
    let layout = match dict.get(b"ColorSpace") {
        Ok(cs) => color_space_layout(doc, cs)?,
        Err(_) if image_mask => PixelLayout::Gray,
        Err(_) => return Err(Error::ImageStream("image without color space".to_string())),
    };
    let bits = if image_mask {
        1
    } else {
        integer_of(dict, b"BitsPerComponent").unwrap_or(8)
    };
    let depth = match (bits, &layout) {
        (1 | 2 | 4, PixelLayout::Rgb) => {
            return Err(Error::ImageStream(format!("unsupported RGB bit depth {}", bits)))
        }
        (1, _) => png::BitDepth::One,
        (2, _) => png::BitDepth::Two,
        (4, _) => png::BitDepth::Four,
        (8, _) => png::BitDepth::Eight,
        (16, PixelLayout::Gray | PixelLayout::Rgb) => png::BitDepth::Sixteen,
        (n, _) => return Err(Error::ImageStream(format!("unsupported bit depth {}", n))),
    };

    let channels = match layout {
        PixelLayout::Rgb => 3,
        _ => 1,
    };
    let invert = decode_is_inverted(dict, channels)?;
    if invert && matches!(layout, PixelLayout::Indexed(_)) {
        return Err(Error::ImageStream("inverted indexed images are not supported".to_string()));
    }

    let too_large = || Error::ImageStream("image dimensions too large".to_string());
    let row_bits = (width as usize)
        .checked_mul(channels * bits as usize)
        .ok_or_else(too_large)?;
    let needed = row_bits
        .div_ceil(8)
        .checked_mul(height as usize)
        .ok_or_else(too_large)?;

    let mut samples = if graph::stream_filters(stream).is_empty() {
        stream.content.clone()
    } else {
        stream.decompressed_content()?
    };
    if samples.len() < needed {
        return Err(Error::ImageStream(format!(
            "image data too short: {} bytes, expected {}",
            samples.len(),
            needed
        )));
    }
    samples.truncate(needed);
    if invert {
        // Flipping every bit maps each sample v to max - v at any depth
        samples.iter_mut().for_each(|b| *b = !*b);
    }

    encode_png(width, height, &layout, depth, &samples)
}

/// Whether `/Decode` swaps every component range, as in `[1 0]`.
///
/// Arrays that swap only some components are rejected.
fn decode_is_inverted(dict: &Dictionary, channels: usize) -> Result<bool> {
    let items = match dict.get(b"Decode") {
        Ok(Object::Array(items)) => items,
        _ => return Ok(false),
    };
    let values: Vec<f32> = items.iter().filter_map(|o| o.as_float().ok()).collect();
    if values.len() != items.len() || values.len() < 2 * channels {
        return Err(Error::ImageStream("malformed Decode array".to_string()));
    }
    let swapped: Vec<bool> = values
        .chunks(2)
        .take(channels)
        .map(|pair| pair[0] > pair[1])
        .collect();
    if swapped.iter().all(|s| *s) {
        Ok(true)
    } else if swapped.iter().any(|s| *s) {
        Err(Error::ImageStream("partially inverted Decode array".to_string()))
    } else {
        Ok(false)
    }
}

fn encode_png(
    width: u32,
    height: u32,
    layout: &PixelLayout,
    depth: png::BitDepth,
    samples: &[u8],
) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        match layout {
            PixelLayout::Gray => encoder.set_color(png::ColorType::Grayscale),
            PixelLayout::Rgb => encoder.set_color(png::ColorType::Rgb),
            PixelLayout::Indexed(palette) => {
                encoder.set_color(png::ColorType::Indexed);
                encoder.set_palette(palette.clone());
            }
        }
        encoder.set_depth(depth);
        let mut writer = encoder
            .write_header()
            .map_err(|e| Error::ImageStream(format!("PNG header: {}", e)))?;
        writer
            .write_image_data(samples)
            .map_err(|e| Error::ImageStream(format!("PNG data: {}", e)))?;
    }
    Ok(out)
}

fn decode_parms(dict: &Dictionary) -> Option<&Dictionary> {
    match dict.get(b"DecodeParms").ok()? {
        Object::Dictionary(d) => Some(d),
        Object::Array(items) => items.iter().find_map(|o| o.as_dict().ok()),
        _ => None,
    }
}

/// Wrap CCITT fax data in a single-strip TIFF so viewers can open it.
fn ccitt_to_tiff(dict: &Dictionary, data: &[u8]) -> Result<Vec<u8>> {
    let parms = decode_parms(dict);
    let param = |key: &[u8]| parms.and_then(|p| integer_of(p, key));
    let flag = |key: &[u8]| parms.map_or(false, |p| matches!(p.get(key), Ok(Object::Boolean(true))));

    let width = param(b"Columns").unwrap_or(1728);
    let height = param(b"Rows")
        .filter(|r| *r > 0)
        .or_else(|| integer_of(dict, b"Height"))
        .unwrap_or(0);
    if width <= 0 || height <= 0 {
        return Err(Error::ImageStream("CCITT image without size".to_string()));
    }
    let k = param(b"K").unwrap_or(0);

    let compression = if k < 0 {
        CompressionMethod::Fax4
    } else {
        CompressionMethod::Fax3
    };
    // Fax polarity unless the data was stored inverted
    let photometric = if flag(b"BlackIs1") {
        PhotometricInterpretation::BlackIsZero
    } else {
        PhotometricInterpretation::WhiteIsZero
    };

    let mut entries: Vec<(Tag, u16, u32)> = vec![
        (Tag::ImageWidth, 4, width as u32),
        (Tag::ImageLength, 4, height as u32),
        (Tag::BitsPerSample, 3, 1),
        (Tag::Compression, 3, compression.to_u16() as u32),
        (Tag::PhotometricInterpretation, 3, photometric.to_u16() as u32),
        (Tag::StripOffsets, 4, 0),
        (Tag::SamplesPerPixel, 3, 1),
        (Tag::RowsPerStrip, 4, height as u32),
        (Tag::StripByteCounts, 4, data.len() as u32),
    ];
    if k > 0 {
        // T4Options: two-dimensional coding
        entries.push((Tag::Unknown(292), 4, 1));
    }
    entries.sort_by_key(|(tag, _, _)| tag.to_u16());

    let ifd_len = 2 + entries.len() * 12 + 4;
    let data_offset = (8 + ifd_len) as u32;

    let mut out = Vec::with_capacity(data_offset as usize + data.len());
    out.extend_from_slice(b"II*\x00");
    out.extend_from_slice(&8u32.to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (tag, kind, value) in &entries {
        let value = if *tag == Tag::StripOffsets { data_offset } else { *value };
        out.extend_from_slice(&tag.to_u16().to_le_bytes());
        out.extend_from_slice(&kind.to_le_bytes());
        out.extend_from_slice(&1u32.to_le_bytes());
        if *kind == 3 {
            out.extend_from_slice(&(value as u16).to_le_bytes());
            out.extend_from_slice(&[0, 0]);
        } else {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(data);
    Ok(out)
}
