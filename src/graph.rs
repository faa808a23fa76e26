//! Helpers over the indirect-object table of a parsed PDF.
//!
//! `lopdf::Document::objects` is used as an arena keyed by object id. Edits
//! never free objects directly; [`sweep_unreferenced`] removes whatever is no
//! longer reachable from the trailer.

use flate2::read::ZlibDecoder;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::BTreeSet;
use std::io::Read;

/// Page attributes a page may inherit from its ancestors in the page tree.
pub const INHERITABLE_PAGE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Name value of `key`, if it is a name.
pub fn name_of<'a>(dict: &'a Dictionary, key: &[u8]) -> Option<&'a [u8]> {
    match dict.get(key).ok()? {
        Object::Name(n) => Some(n.as_slice()),
        _ => None,
    }
}

/// Integer value of `key`; reals are truncated.
pub fn integer_of(dict: &Dictionary, key: &[u8]) -> Option<i64> {
    match dict.get(key).ok()? {
        Object::Integer(n) => Some(*n),
        Object::Real(n) => Some(*n as i64),
        _ => None,
    }
}

/// Follow a reference to the object it points at.
pub fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        _ => Some(obj),
    }
}

/// True for a dictionary or stream whose `/Type` is `type_name`.
pub fn has_type(dict: &Dictionary, type_name: &[u8]) -> bool {
    name_of(dict, b"Type") == Some(type_name)
}

/// Filter names of a stream, in application order.
pub fn stream_filters(stream: &Stream) -> Vec<String> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(n)) => vec![String::from_utf8_lossy(n).to_string()],
        Ok(Object::Array(arr)) => arr
            .iter()
            .filter_map(|f| match f {
                Object::Name(n) => Some(String::from_utf8_lossy(n).to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Inflate zlib data.
pub fn inflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut decoded = Vec::new();
    decoder.read_to_end(&mut decoded)?;
    Ok(decoded)
}

/// Collect every reference held by `obj`, including stream dictionaries.
pub fn collect_references(obj: &Object, out: &mut Vec<ObjectId>) {
    match obj {
        Object::Reference(id) => out.push(*id),
        Object::Array(arr) => {
            for item in arr {
                collect_references(item, out);
            }
        }
        Object::Dictionary(dict) => collect_dict_references(dict, out),
        Object::Stream(stream) => collect_dict_references(&stream.dict, out),
        _ => {}
    }
}

fn collect_dict_references(dict: &Dictionary, out: &mut Vec<ObjectId>) {
    for (_, value) in dict.iter() {
        collect_references(value, out);
    }
}

/// Ids reachable from the trailer.
///
/// Iterative so that deep or cyclic graphs neither overflow the stack nor loop.
pub fn reachable_ids(doc: &Document) -> BTreeSet<ObjectId> {
    let mut seen = BTreeSet::new();
    let mut pending = Vec::new();
    collect_dict_references(&doc.trailer, &mut pending);

    while let Some(id) = pending.pop() {
        if !seen.insert(id) {
            continue;
        }
        if let Some(obj) = doc.objects.get(&id) {
            collect_references(obj, &mut pending);
        }
    }

    seen
}

/// Remove every object the trailer cannot reach. Returns the removed ids.
pub fn sweep_unreferenced(doc: &mut Document) -> Vec<ObjectId> {
    let reachable = reachable_ids(doc);
    let unused: Vec<ObjectId> = doc
        .objects
        .keys()
        .filter(|id| !reachable.contains(id))
        .copied()
        .collect();

    for id in &unused {
        doc.objects.remove(id);
    }

    unused
}

/// Page dictionary with inheritable attributes copied down from its ancestors.
pub fn flattened_page(doc: &Document, page_id: ObjectId) -> Option<Dictionary> {
    let mut page = match doc.get_object(page_id).ok()? {
        Object::Dictionary(d) => d.clone(),
        _ => return None,
    };

    let mut visited = BTreeSet::from([page_id]);
    let mut parent = page.get(b"Parent").ok().and_then(|p| p.as_reference().ok());

    while let Some(parent_id) = parent {
        if !visited.insert(parent_id) {
            break;
        }
        let parent_dict = match doc.get_object(parent_id) {
            Ok(Object::Dictionary(d)) => d,
            _ => break,
        };

        for key in INHERITABLE_PAGE_KEYS {
            if !page.has(key) {
                if let Ok(value) = parent_dict.get(key) {
                    page.set(key.to_vec(), value.clone());
                }
            }
        }

        parent = parent_dict
            .get(b"Parent")
            .ok()
            .and_then(|p| p.as_reference().ok());
    }

    Some(page)
}
