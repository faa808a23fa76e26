//! Merging sources into one output document.

use crate::error::{Error, Result};
use crate::fonts::FontPattern;
use crate::geometry::{Gravity, LayoutBox, LayoutOptions};
use crate::graph;
use crate::source::PageSource;
use log::{debug, info};
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::fs;
use std::path::{Path, PathBuf};

/// Options for a merge run.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Scale rasters by their resolution before fitting
    pub scale_to_dpi: bool,
    /// Fit rasters into this box
    pub scale_box: Option<LayoutBox>,
    /// Place rasters on pages of this size
    pub page: Option<LayoutBox>,
    /// Inset kept free around rasters, in points
    pub border: u32,
    /// Anchor of a raster on its page; requires `page`
    pub gravity: Option<Gravity>,
    /// Unembed matching TrueType fonts from PDF inputs
    pub font_filter: Option<FontPattern>,
    /// Drop the last page of the first input
    pub drop_last_page_of_first: bool,
}

impl MergeOptions {
    pub fn validate(&self) -> Result<()> {
        if self.gravity.is_some() && self.page.is_none() {
            return Err(Error::GravityWithoutPage);
        }
        Ok(())
    }

    pub fn layout(&self) -> LayoutOptions {
        LayoutOptions {
            scale_to_dpi: self.scale_to_dpi,
            scale_box: self.scale_box,
            page: self.page,
            border: self.border as f32,
            gravity: self.gravity.unwrap_or_default(),
        }
    }
}

/// Outcome of a merge.
#[derive(Debug, Clone)]
pub struct MergeReport {
    pub output: PathBuf,
    pub inputs: usize,
    pub pages: usize,
    /// Objects dropped as unreachable before writing
    pub objects_removed: usize,
}

/// Accumulates pages from several documents into one page tree.
pub struct DocumentAssembler {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<ObjectId>,
    inputs: usize,
}

impl Default for DocumentAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentAssembler {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
            inputs: 0,
        }
    }

    /// Move the pages of `source` to the end of the output. Returns the
    /// number of pages added.
    pub fn append(&mut self, mut source: Document, skip_last_page: bool) -> Result<usize> {
        // Inherited attributes are lost once the source page tree is dropped
        let page_ids: Vec<ObjectId> = source.get_pages().values().copied().collect();
        for page_id in &page_ids {
            if let Some(mut page) = graph::flattened_page(&source, *page_id) {
                page.remove(b"Parent");
                source.objects.insert(*page_id, Object::Dictionary(page));
            }
        }

        source.renumber_objects_with(self.doc.max_id + 1);
        let mut page_ids: Vec<ObjectId> = source.get_pages().values().copied().collect();
        if page_ids.is_empty() {
            return Err(Error::Structure("document has no pages".to_string()));
        }
        if skip_last_page {
            if let Some(dropped) = page_ids.pop() {
                debug!("Dropping last page {:?}", dropped);
            }
        }

        let source_max = source.objects.keys().map(|id| id.0).max().unwrap_or(0);
        for (id, object) in std::mem::take(&mut source.objects) {
            match object.type_name().unwrap_or(b"") {
                b"Catalog" | b"Pages" => {}
                _ => {
                    self.doc.objects.insert(id, object);
                }
            }
        }
        for page_id in &page_ids {
            if let Some(Object::Dictionary(page)) = self.doc.objects.get_mut(page_id) {
                page.set("Parent", Object::Reference(self.pages_id));
            }
        }

        self.doc.max_id = self.doc.max_id.max(source_max);
        self.kids.extend_from_slice(&page_ids);
        self.inputs += 1;
        Ok(page_ids.len())
    }

    /// Build the page tree and catalog, drop unreachable objects and write
    /// the result to `output`.
    pub fn finish(mut self, output: &Path) -> Result<MergeReport> {
        let mut pages = Dictionary::new();
        pages.set("Type", Object::Name(b"Pages".to_vec()));
        pages.set("Count", Object::Integer(self.kids.len() as i64));
        pages.set(
            "Kids",
            Object::Array(self.kids.iter().map(|id| Object::Reference(*id)).collect()),
        );
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(self.pages_id));
        let catalog_id = self.doc.add_object(catalog);
        self.doc.trailer.set("Root", Object::Reference(catalog_id));

        let removed = graph::sweep_unreferenced(&mut self.doc);
        debug!("Swept {} unreachable object(s)", removed.len());

        let mut buffer = Vec::new();
        self.doc.save_to(&mut buffer).map_err(|e| Error::Save {
            path: output.to_path_buf(),
            reason: e.to_string(),
        })?;
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(output, &buffer).map_err(|e| Error::Save {
            path: output.to_path_buf(),
            reason: e.to_string(),
        })?;

        info!("Wrote {} page(s) to {}", self.kids.len(), output.display());
        Ok(MergeReport {
            output: output.to_path_buf(),
            inputs: self.inputs,
            pages: self.kids.len(),
            objects_removed: removed.len(),
        })
    }
}

/// Merge `inputs`, in order, into `output`.
pub fn merge_files<P: AsRef<Path>>(inputs: &[P], output: &Path, options: &MergeOptions) -> Result<MergeReport> {
    options.validate()?;
    if inputs.len() < 2 {
        return Err(Error::NotEnoughInputs(inputs.len()));
    }

    let layout = options.layout();
    let mut assembler = DocumentAssembler::new();
    for (index, input) in inputs.iter().enumerate() {
        let source = PageSource::resolve(input.as_ref(), &layout, options.font_filter.as_ref())?;
        let skip_last = options.drop_last_page_of_first && index == 0;
        assembler.append(source.into_document()?, skip_last)?;
    }

    assembler.finish(output)
}

/// Merge with the command line convention: the last argument is the output,
/// all others are sources.
pub fn merge_args<P: AsRef<Path>>(args: &[P], options: &MergeOptions) -> Result<MergeReport> {
    match args.split_last() {
        Some((output, inputs)) => merge_files(inputs, output.as_ref(), options),
        None => Err(Error::NotEnoughInputs(0)),
    }
}
