//! Raster decoding: files become frames ready to be embedded as image XObjects.
//!
//! JPEG and JPEG-2000 data is embedded as it is. TIFF files yield one frame
//! per stored page. Everything else goes through the `image` crate and is
//! stored deflated.

use crate::error::{Error, Result};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::DynamicImage;
use lopdf::{Dictionary, Object, Stream};
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use tiff::decoder::ifd::Value;
use tiff::decoder::{Decoder as TiffDecoder, DecodingResult};
use tiff::tags::{CompressionMethod, Tag};
use tiff::ColorType as TiffColorType;

/// Pixel size and resolution of one decoded raster page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Horizontal resolution, not above zero when unknown
    pub dpi_x: f32,
    /// Vertical resolution, not above zero when unknown
    pub dpi_y: f32,
}

impl Frame {
    pub fn new(width: u32, height: u32, dpi: (f32, f32)) -> Self {
        Self {
            width,
            height,
            dpi_x: dpi.0,
            dpi_y: dpi.1,
        }
    }
}

/// Image data in a form a PDF image XObject can carry directly.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub width: u32,
    pub height: u32,
    /// PDF filter name, `None` for raw samples
    pub filter: Option<&'static str>,
    /// Color space name; JPEG-2000 streams carry their own
    pub color_space: Option<&'static str>,
    pub bits_per_component: Option<u8>,
    /// Optional `/Decode` array
    pub decode: Option<Vec<f32>>,
    /// Optional `/DecodeParms` for the filter
    pub decode_parms: Option<Dictionary>,
    pub data: Vec<u8>,
    /// Alpha channel, embedded as `/SMask`
    pub soft_mask: Option<Box<EncodedImage>>,
}

impl EncodedImage {
    /// Image XObject stream. The soft mask, if any, must be added separately.
    pub fn to_stream(&self) -> Stream {
        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"XObject".to_vec()));
        dict.set("Subtype", Object::Name(b"Image".to_vec()));
        dict.set("Width", Object::Integer(self.width as i64));
        dict.set("Height", Object::Integer(self.height as i64));
        if let Some(color_space) = self.color_space {
            dict.set("ColorSpace", Object::Name(color_space.as_bytes().to_vec()));
        }
        if let Some(bits) = self.bits_per_component {
            dict.set("BitsPerComponent", Object::Integer(bits as i64));
        }
        if let Some(filter) = self.filter {
            dict.set("Filter", Object::Name(filter.as_bytes().to_vec()));
        }
        if let Some(decode) = &self.decode {
            dict.set(
                "Decode",
                Object::Array(decode.iter().map(|v| Object::Real(*v)).collect()),
            );
        }
        if let Some(parms) = &self.decode_parms {
            dict.set("DecodeParms", Object::Dictionary(parms.clone()));
        }
        dict.set("Length", Object::Integer(self.data.len() as i64));

        // Encoded bytes must reach the file untouched
        Stream::new(dict, self.data.clone()).with_compression(false)
    }
}

/// A frame and the data to draw it.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub frame: Frame,
    pub image: EncodedImage,
}

/// Container formats recognised before falling back to the `image` crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RasterKind {
    Jpeg,
    Jpeg2000,
    Tiff,
    Other,
}

fn sniff(path: &Path, bytes: &[u8]) -> RasterKind {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return RasterKind::Jpeg;
    }
    if bytes.starts_with(b"\x00\x00\x00\x0cjP  \r\n\x87\n") || bytes.starts_with(&[0xFF, 0x4F, 0xFF, 0x51]) {
        return RasterKind::Jpeg2000;
    }
    if bytes.starts_with(b"II*\x00") || bytes.starts_with(b"MM\x00*") {
        return RasterKind::Tiff;
    }

    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => RasterKind::Jpeg,
        "jp2" | "j2k" | "jpx" | "jpf" => RasterKind::Jpeg2000,
        "tif" | "tiff" => RasterKind::Tiff,
        _ => RasterKind::Other,
    }
}

/// Decode a raster file into its frames, in storage order.
pub fn load_frames(path: &Path) -> Result<Vec<DecodedFrame>> {
    let bytes = fs::read(path)?;
    let frames = decode_frames(path, &bytes)?;
    if frames.is_empty() {
        return Err(Error::decode(path, "no image data"));
    }
    Ok(frames)
}

/// Decode in-memory raster data; `path` only names the source in errors and
/// helps recognise the format.
pub fn decode_frames(path: &Path, bytes: &[u8]) -> Result<Vec<DecodedFrame>> {
    match sniff(path, bytes) {
        RasterKind::Jpeg => decode_jpeg(bytes)
            .map(|f| vec![f])
            .map_err(|reason| Error::decode(path, reason)),
        RasterKind::Jpeg2000 => decode_jpeg2000(bytes)
            .map(|f| vec![f])
            .map_err(|reason| Error::decode(path, reason)),
        RasterKind::Tiff => decode_tiff(bytes).map_err(|reason| Error::decode(path, reason)),
        RasterKind::Other => decode_generic(bytes)
            .map(|f| vec![f])
            .map_err(|reason| Error::decode(path, reason)),
    }
}

/// JPEG header fields needed to embed the file as it is.
#[derive(Debug, Default, PartialEq)]
struct JpegInfo {
    width: u32,
    height: u32,
    components: u8,
    bits: u8,
    dpi: (f32, f32),
    adobe: bool,
}

fn read_u16(data: &[u8], pos: usize) -> Option<u16> {
    Some(u16::from_be_bytes([*data.get(pos)?, *data.get(pos + 1)?]))
}

fn read_u32(data: &[u8], pos: usize) -> Option<u32> {
    Some(u32::from_be_bytes([
        *data.get(pos)?,
        *data.get(pos + 1)?,
        *data.get(pos + 2)?,
        *data.get(pos + 3)?,
    ]))
}

/// Walk JPEG marker segments up to the frame header.
fn parse_jpeg_header(data: &[u8]) -> std::result::Result<JpegInfo, String> {
    let mut info = JpegInfo::default();
    let mut pos = 2;

    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return Err(format!("corrupt JPEG marker at offset {}", pos));
        }
        let marker = data[pos + 1];
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        let length = read_u16(data, pos + 2).ok_or("truncated JPEG segment")? as usize;
        let segment = data
            .get(pos + 4..pos + 2 + length)
            .ok_or("truncated JPEG segment")?;

        match marker {
            // JFIF density
            0xE0 if segment.starts_with(b"JFIF\0") && segment.len() >= 12 => {
                let unit = segment[7];
                let x = read_u16(segment, 8).unwrap_or(0) as f32;
                let y = read_u16(segment, 10).unwrap_or(0) as f32;
                info.dpi = match unit {
                    1 => (x, y),
                    2 => (x * 2.54, y * 2.54),
                    _ => (0.0, 0.0),
                };
            }
            0xEE if segment.starts_with(b"Adobe") => info.adobe = true,
            0xC0..=0xCF if marker != 0xC4 && marker != 0xC8 && marker != 0xCC => {
                if segment.len() < 6 {
                    return Err("truncated JPEG frame header".to_string());
                }
                info.bits = segment[0];
                info.height = read_u16(segment, 1).unwrap_or(0) as u32;
                info.width = read_u16(segment, 3).unwrap_or(0) as u32;
                info.components = segment[5];
                if info.width == 0 || info.height == 0 {
                    return Err("JPEG frame has no size".to_string());
                }
                return Ok(info);
            }
            0xDA | 0xD9 => break,
            _ => {}
        }

        pos += 2 + length;
    }

    Err("JPEG frame header not found".to_string())
}

fn decode_jpeg(bytes: &[u8]) -> std::result::Result<DecodedFrame, String> {
    let info = parse_jpeg_header(bytes)?;
    let color_space = match info.components {
        1 => "DeviceGray",
        3 => "DeviceRGB",
        4 => "DeviceCMYK",
        n => return Err(format!("unsupported JPEG component count {}", n)),
    };
    // Adobe writes CMYK JPEGs inverted
    let decode = (info.components == 4 && info.adobe).then(|| vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0]);

    Ok(DecodedFrame {
        frame: Frame::new(info.width, info.height, info.dpi),
        image: EncodedImage {
            width: info.width,
            height: info.height,
            filter: Some("DCTDecode"),
            color_space: Some(color_space),
            bits_per_component: Some(info.bits.max(8)),
            decode,
            decode_parms: None,
            data: bytes.to_vec(),
            soft_mask: None,
        },
    })
}

/// Image size from a JP2 `ihdr` box or a raw codestream `SIZ` marker.
fn parse_jpeg2000_size(data: &[u8]) -> std::result::Result<(u32, u32), String> {
    if data.starts_with(&[0xFF, 0x4F, 0xFF, 0x51]) {
        // SIZ: Lsiz Rsiz Xsiz Ysiz XOsiz YOsiz
        let x = read_u32(data, 8).ok_or("truncated SIZ marker")?;
        let y = read_u32(data, 12).ok_or("truncated SIZ marker")?;
        let x_off = read_u32(data, 16).ok_or("truncated SIZ marker")?;
        let y_off = read_u32(data, 20).ok_or("truncated SIZ marker")?;
        return Ok((x.saturating_sub(x_off), y.saturating_sub(y_off)));
    }

    find_ihdr(data, 0, data.len()).ok_or_else(|| "JPEG-2000 image header not found".to_string())
}

fn find_ihdr(data: &[u8], start: usize, end: usize) -> Option<(u32, u32)> {
    let mut pos = start;
    while pos + 8 <= end {
        let length = read_u32(data, pos)? as usize;
        let kind = &data[pos + 4..pos + 8];
        let (header, length) = match length {
            0 => (8, end - pos),
            1 => (16, read_u32(data, pos + 12)? as usize),
            n => (8, n),
        };
        if length < header || pos + length > end {
            return None;
        }
        match kind {
            b"jp2h" => return find_ihdr(data, pos + header, pos + length),
            b"ihdr" => {
                let height = read_u32(data, pos + header)?;
                let width = read_u32(data, pos + header + 4)?;
                return Some((width, height));
            }
            _ => {}
        }
        pos += length;
    }
    None
}

fn decode_jpeg2000(bytes: &[u8]) -> std::result::Result<DecodedFrame, String> {
    let (width, height) = parse_jpeg2000_size(bytes)?;
    if width == 0 || height == 0 {
        return Err("JPEG-2000 image has no size".to_string());
    }

    Ok(DecodedFrame {
        frame: Frame::new(width, height, (0.0, 0.0)),
        image: EncodedImage {
            width,
            height,
            filter: Some("JPXDecode"),
            color_space: None,
            bits_per_component: None,
            decode: None,
            decode_parms: None,
            data: bytes.to_vec(),
            soft_mask: None,
        },
    })
}

fn deflate(data: &[u8]) -> std::result::Result<Vec<u8>, String> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder
        .write_all(data)
        .map_err(|e| format!("Failed to compress image data: {}", e))?;
    encoder
        .finish()
        .map_err(|e| format!("Failed to finish compression: {}", e))
}

fn flate_image(
    width: u32,
    height: u32,
    color_space: &'static str,
    bits: u8,
    samples: &[u8],
) -> std::result::Result<EncodedImage, String> {
    Ok(EncodedImage {
        width,
        height,
        filter: Some("FlateDecode"),
        color_space: Some(color_space),
        bits_per_component: Some(bits),
        decode: None,
        decode_parms: None,
        data: deflate(samples)?,
        soft_mask: None,
    })
}

/// Split interleaved samples with a trailing alpha sample into color and alpha.
fn split_alpha(raw: &[u8], channels: usize) -> (Vec<u8>, Vec<u8>) {
    let pixels = raw.len() / (channels + 1);
    let mut color = Vec::with_capacity(pixels * channels);
    let mut alpha = Vec::with_capacity(pixels);

    for chunk in raw.chunks(channels + 1) {
        color.extend_from_slice(&chunk[..channels]);
        alpha.push(chunk[channels]);
    }

    (color, alpha)
}

fn with_alpha(
    width: u32,
    height: u32,
    color_space: &'static str,
    channels: usize,
    raw: &[u8],
) -> std::result::Result<EncodedImage, String> {
    let (color, alpha) = split_alpha(raw, channels);
    let mut image = flate_image(width, height, color_space, 8, &color)?;
    if alpha.iter().any(|a| *a < 255) {
        image.soft_mask = Some(Box::new(flate_image(width, height, "DeviceGray", 8, &alpha)?));
    }
    Ok(image)
}

fn has_alpha(img: &DynamicImage) -> bool {
    img.color().has_alpha()
}

/// PNG physical pixel density, in dots per inch.
fn png_dpi(bytes: &[u8]) -> (f32, f32) {
    let decoder = png::Decoder::new(Cursor::new(bytes));
    let reader = match decoder.read_info() {
        Ok(reader) => reader,
        Err(_) => return (0.0, 0.0),
    };
    match reader.info().pixel_dims {
        Some(dims) if dims.unit == png::Unit::Meter => (
            (dims.xppu as f32 * 0.0254).round(),
            (dims.yppu as f32 * 0.0254).round(),
        ),
        _ => (0.0, 0.0),
    }
}

fn decode_generic(bytes: &[u8]) -> std::result::Result<DecodedFrame, String> {
    let img = image::load_from_memory(bytes).map_err(|e| e.to_string())?;
    let (width, height) = (img.width(), img.height());
    let dpi = match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => png_dpi(bytes),
        _ => (0.0, 0.0),
    };

    let grayscale = !img.color().has_color();
    let image = match (grayscale, has_alpha(&img)) {
        (true, false) => flate_image(width, height, "DeviceGray", 8, img.to_luma8().as_raw())?,
        (true, true) => with_alpha(width, height, "DeviceGray", 1, img.to_luma_alpha8().as_raw())?,
        (false, false) => flate_image(width, height, "DeviceRGB", 8, img.to_rgb8().as_raw())?,
        (false, true) => with_alpha(width, height, "DeviceRGB", 3, img.to_rgba8().as_raw())?,
    };

    Ok(DecodedFrame {
        frame: Frame::new(width, height, dpi),
        image,
    })
}

/// TIFF resolution of the current directory as DPI per axis.
fn tiff_dpi<R: std::io::Read + std::io::Seek>(decoder: &mut TiffDecoder<R>) -> (f32, f32) {
    let read = |decoder: &mut TiffDecoder<R>, tag: Tag| -> f32 {
        match decoder.find_tag(tag) {
            Ok(Some(Value::Rational(n, d))) if d != 0 => n as f32 / d as f32,
            Ok(Some(Value::Short(n))) => n as f32,
            Ok(Some(Value::Unsigned(n))) => n as f32,
            _ => 0.0,
        }
    };
    let x = read(decoder, Tag::XResolution);
    let y = read(decoder, Tag::YResolution);
    let unit = decoder
        .find_tag(Tag::ResolutionUnit)
        .ok()
        .flatten()
        .and_then(|v| v.into_u16().ok())
        .unwrap_or(2);

    match unit {
        2 => (x, y),
        3 => (x * 2.54, y * 2.54),
        _ => (0.0, 0.0),
    }
}

fn u16_to_be(samples: &[u16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_be_bytes()).collect()
}

/// Drop the alpha sample of 16-bit pixels, keeping color and an 8-bit alpha.
fn split_alpha16(raw: &[u16], channels: usize) -> (Vec<u16>, Vec<u8>) {
    let mut color = Vec::with_capacity(raw.len());
    let mut alpha = Vec::with_capacity(raw.len() / (channels + 1));
    for chunk in raw.chunks(channels + 1) {
        color.extend_from_slice(&chunk[..channels]);
        alpha.push((chunk[channels] >> 8) as u8);
    }
    (color, alpha)
}

fn tiff_page(
    width: u32,
    height: u32,
    color: TiffColorType,
    data: DecodingResult,
) -> std::result::Result<EncodedImage, String> {
    match (color, data) {
        (TiffColorType::Gray(bits @ (1 | 2 | 4 | 8)), DecodingResult::U8(raw)) => {
            flate_image(width, height, "DeviceGray", bits, &raw)
        }
        (TiffColorType::Gray(16), DecodingResult::U16(raw)) => {
            flate_image(width, height, "DeviceGray", 16, &u16_to_be(&raw))
        }
        (TiffColorType::GrayA(8), DecodingResult::U8(raw)) => {
            with_alpha(width, height, "DeviceGray", 1, &raw)
        }
        (TiffColorType::RGB(8), DecodingResult::U8(raw)) => {
            flate_image(width, height, "DeviceRGB", 8, &raw)
        }
        (TiffColorType::RGB(16), DecodingResult::U16(raw)) => {
            flate_image(width, height, "DeviceRGB", 16, &u16_to_be(&raw))
        }
        (TiffColorType::RGBA(8), DecodingResult::U8(raw)) => {
            with_alpha(width, height, "DeviceRGB", 3, &raw)
        }
        (TiffColorType::RGBA(16), DecodingResult::U16(raw)) => {
            let (rgb, alpha) = split_alpha16(&raw, 3);
            let mut image = flate_image(width, height, "DeviceRGB", 16, &u16_to_be(&rgb))?;
            if alpha.iter().any(|a| *a < 255) {
                image.soft_mask =
                    Some(Box::new(flate_image(width, height, "DeviceGray", 8, &alpha)?));
            }
            Ok(image)
        }
        (TiffColorType::CMYK(8), DecodingResult::U8(raw)) => {
            flate_image(width, height, "DeviceCMYK", 8, &raw)
        }
        (color, _) => Err(format!("unsupported TIFF color type {:?}", color)),
    }
}

/// T4Options, absent from the tag table.
const TAG_T4_OPTIONS: u16 = 292;

fn tiff_unsigned<R: std::io::Read + std::io::Seek>(
    decoder: &mut TiffDecoder<R>,
    tag: Tag,
) -> Option<u32> {
    decoder.find_tag(tag).ok().flatten().and_then(|v| v.into_u32().ok())
}

/// Fax-coded bilevel page embedded as it is stored, with `/CCITTFaxDecode`.
///
/// `None` when the page is not fax coded.
fn tiff_fax_page<R: std::io::Read + std::io::Seek>(
    decoder: &mut TiffDecoder<R>,
    bytes: &[u8],
    width: u32,
    height: u32,
) -> std::result::Result<Option<EncodedImage>, String> {
    let compression = tiff_unsigned(decoder, Tag::Compression).unwrap_or(1);
    let k = match CompressionMethod::from_u16_exhaustive(compression as u16) {
        CompressionMethod::Fax4 => -1,
        CompressionMethod::Fax3 => {
            let options = tiff_unsigned(decoder, Tag::Unknown(TAG_T4_OPTIONS)).unwrap_or(0);
            if options & 0b100 != 0 {
                return Err("uncompressed CCITT mode is not supported".to_string());
            }
            i64::from(options & 1)
        }
        CompressionMethod::Huffman => 0,
        _ => return Ok(None),
    };
    if tiff_unsigned(decoder, Tag::FillOrder).unwrap_or(1) != 1 {
        return Err("reversed CCITT bit order is not supported".to_string());
    }

    let offsets = decoder
        .get_tag_u64_vec(Tag::StripOffsets)
        .map_err(|e| e.to_string())?;
    let counts = decoder
        .get_tag_u64_vec(Tag::StripByteCounts)
        .map_err(|e| e.to_string())?;
    if offsets.len() != 1 || counts.len() != 1 {
        // Each strip is a separate fax stream
        return Err("multi-strip CCITT pages are not supported".to_string());
    }
    let start = usize::try_from(offsets[0]).map_err(|e| e.to_string())?;
    let length = usize::try_from(counts[0]).map_err(|e| e.to_string())?;
    let data = start
        .checked_add(length)
        .and_then(|end| bytes.get(start..end))
        .ok_or("CCITT strip lies outside the file")?;

    let black_is_1 = tiff_unsigned(decoder, Tag::PhotometricInterpretation).unwrap_or(0) == 1;
    let mut parms = Dictionary::new();
    parms.set("K", Object::Integer(k));
    parms.set("Columns", Object::Integer(width as i64));
    parms.set("Rows", Object::Integer(height as i64));
    parms.set("BlackIs1", Object::Boolean(black_is_1));
    if compression == 2 {
        parms.set("EncodedByteAlign", Object::Boolean(true));
    }

    Ok(Some(EncodedImage {
        width,
        height,
        filter: Some("CCITTFaxDecode"),
        color_space: Some("DeviceGray"),
        bits_per_component: Some(1),
        decode: None,
        decode_parms: Some(parms),
        data: data.to_vec(),
        soft_mask: None,
    }))
}

fn decode_tiff(bytes: &[u8]) -> std::result::Result<Vec<DecodedFrame>, String> {
    let mut decoder = TiffDecoder::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let mut frames = Vec::new();

    loop {
        let page = frames.len() + 1;
        let (width, height) = decoder.dimensions().map_err(|e| e.to_string())?;
        let dpi = tiff_dpi(&mut decoder);

        let image = match tiff_fax_page(&mut decoder, bytes, width, height)
            .map_err(|e| format!("page {}: {}", page, e))?
        {
            Some(image) => image,
            None => {
                let color = decoder.colortype().map_err(|e| e.to_string())?;
                let data = decoder
                    .read_image()
                    .map_err(|e| format!("page {}: {}", page, e))?;
                tiff_page(width, height, color, data).map_err(|e| format!("page {}: {}", page, e))?
            }
        };

        frames.push(DecodedFrame {
            frame: Frame::new(width, height, dpi),
            image,
        });

        if !decoder.more_images() {
            break;
        }
        decoder.next_image().map_err(|e| e.to_string())?;
    }

    Ok(frames)
}
