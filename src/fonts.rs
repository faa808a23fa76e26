//! Unembedding of TrueType font programs.
//!
//! Matching fonts keep their dictionary but lose the `/FontFile2` stream, so
//! viewers substitute a system font of the same name.

use crate::error::Result;
use crate::graph::{self, name_of};
use lopdf::{Dictionary, Document, Object, ObjectId};
use log::{debug, info, warn};
use regex::bytes::Regex;

/// Font name filter; an empty pattern selects every font.
///
/// Names are matched as raw bytes, since `BaseFont` names need not be UTF-8.
#[derive(Debug, Clone)]
pub struct FontPattern {
    regex: Option<Regex>,
}

impl FontPattern {
    /// Compile `pattern` for full-name matching.
    pub fn new(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Ok(Self::all());
        }
        let regex = Regex::new(&format!("^(?:{})$", pattern))?;
        Ok(Self { regex: Some(regex) })
    }

    pub fn all() -> Self {
        Self { regex: None }
    }

    pub fn matches(&self, name: &[u8]) -> bool {
        self.regex.as_ref().map_or(true, |r| r.is_match(name))
    }
}

/// Fonts touched by one sanitizer run.
#[derive(Debug, Default, Clone)]
pub struct SanitizeReport {
    /// Base names of fonts whose program was removed, for display
    pub unembedded: Vec<String>,
    /// Base names of fonts skipped for carrying a non-TrueType program
    pub skipped: Vec<String>,
    /// Objects dropped by the sweep afterwards
    pub objects_removed: usize,
}

/// Strip a `ABCDEF+` subset tag from a font name.
pub fn strip_subset_tag(name: &[u8]) -> &[u8] {
    if name.len() > 7 && name[6] == b'+' && name[..6].iter().all(|b| b.is_ascii_uppercase()) {
        &name[7..]
    } else {
        name
    }
}

/// Where a font keeps its descriptor.
enum Descriptor {
    None,
    Inline,
    Indirect(ObjectId),
}

fn descriptor_location(font: &Dictionary) -> Descriptor {
    match font.get(b"FontDescriptor") {
        Ok(Object::Reference(id)) => Descriptor::Indirect(*id),
        Ok(Object::Dictionary(_)) => Descriptor::Inline,
        _ => Descriptor::None,
    }
}

fn has_foreign_program(descriptor: &Dictionary) -> bool {
    descriptor.has(b"FontFile") || descriptor.has(b"FontFile3")
}

fn unembed_descriptor(descriptor: &mut Dictionary, name: &[u8]) {
    descriptor.set("FontName", Object::Name(name.to_vec()));
    descriptor.remove(b"FontFile2");
}

/// Remove embedded TrueType programs from fonts whose name matches `pattern`,
/// then sweep the objects that became unreachable.
pub fn sanitize(doc: &mut Document, pattern: &FontPattern) -> SanitizeReport {
    let mut report = SanitizeReport::default();
    let font_ids: Vec<ObjectId> = doc
        .objects
        .iter()
        .filter_map(|(id, obj)| match obj {
            Object::Dictionary(d) if graph::has_type(d, b"Font") => Some(*id),
            _ => None,
        })
        .collect();

    for font_id in font_ids {
        let (raw_name, location) = match doc.objects.get(&font_id) {
            Some(Object::Dictionary(font)) => match name_of(font, b"BaseFont") {
                Some(n) => (n.to_vec(), descriptor_location(font)),
                None => continue,
            },
            _ => continue,
        };
        let name = strip_subset_tag(&raw_name).to_vec();
        let base_font = String::from_utf8_lossy(&raw_name).to_string();

        let foreign = match &location {
            Descriptor::Indirect(id) => match doc.objects.get(id) {
                Some(Object::Dictionary(d)) => has_foreign_program(d),
                _ => false,
            },
            Descriptor::Inline => match doc.objects.get(&font_id) {
                Some(Object::Dictionary(font)) => match font.get(b"FontDescriptor") {
                    Ok(Object::Dictionary(d)) => has_foreign_program(d),
                    _ => false,
                },
                _ => false,
            },
            Descriptor::None => false,
        };
        if foreign {
            warn!("Skipping font {}: not a TrueType font", base_font);
            report.skipped.push(base_font);
            continue;
        }

        if !pattern.matches(&name) {
            debug!("Keeping font {}", base_font);
            continue;
        }

        if let Some(Object::Dictionary(font)) = doc.objects.get_mut(&font_id) {
            font.set("BaseFont", Object::Name(name.clone()));
            if let Descriptor::Inline = location {
                if let Ok(Object::Dictionary(descriptor)) = font.get_mut(b"FontDescriptor") {
                    unembed_descriptor(descriptor, &name);
                }
            }
        }
        if let Descriptor::Indirect(id) = location {
            if let Some(Object::Dictionary(descriptor)) = doc.objects.get_mut(&id) {
                unembed_descriptor(descriptor, &name);
            }
        }

        info!("Unembedded font {}", base_font);
        report.unembedded.push(base_font);
    }

    report.objects_removed = graph::sweep_unreferenced(doc).len();
    report
}
