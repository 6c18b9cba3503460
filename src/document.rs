//! In-memory PDF document.
//!
//! [`Document`] owns every indirect object plus the trailer dictionary,
//! loaded from a byte buffer and written back out by the writer. Loading
//! goes through the xref table when it is usable and falls back to a
//! whole-file scan when it is not.
//!
//! Objects packed into compressed object streams (`/ObjStm`) and encrypted
//! documents are rejected: the pipeline rewrites files flat and in the
//! clear, and silently producing a decrypted or re-packed file would not be
//! the document the caller handed in.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object, ObjectRef};
use crate::parser::parse_indirect_object;
use crate::xref::{self, CrossRefTable};
use std::collections::BTreeMap;

/// Maximum depth when chasing reference chains, so `1 0 R -> 2 0 R -> 1 0 R`
/// terminates.
const MAX_RESOLVE_DEPTH: u32 = 32;

/// A parsed PDF document: all indirect objects plus the trailer.
#[derive(Debug, Clone)]
pub struct Document {
    /// Indirect objects, keyed by object number. BTreeMap keeps body
    /// emission ordered by object number.
    objects: BTreeMap<u32, (u16, Object)>,
    /// Trailer dictionary of the newest revision
    trailer: Dictionary,
    /// Header version string, e.g. "1.7"
    version: String,
}

impl Document {
    /// Load a document from a byte buffer.
    ///
    /// Checks the `%PDF-` header, locates and parses the xref table, and
    /// materializes every in-use object. A broken or stream-typed xref
    /// falls back to scan reconstruction before giving up.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let version = parse_header(data)?;

        let xref = match xref::find_xref_offset(data).and_then(|off| xref::parse_xref(data, off)) {
            Ok(xref) => xref,
            Err(e) => {
                log::warn!("xref parse failed ({}), falling back to scan", e);
                xref::reconstruct_xref(data)?
            },
        };

        let mut doc = Self::from_xref(data, &xref, version.clone());
        // A table that loads but yields no catalog is as good as broken
        if doc.as_ref().map(|d| d.catalog().is_err()).unwrap_or(true) {
            log::warn!("document from xref has no usable catalog, rescanning");
            let xref = xref::reconstruct_xref(data)?;
            doc = Self::from_xref(data, &xref, version);
        }
        let doc = doc?;

        if doc.trailer.contains_key("Encrypt") {
            return Err(Error::Unsupported(
                "encrypted documents cannot be signed".to_string(),
            ));
        }
        doc.catalog()?;
        Ok(doc)
    }

    fn from_xref(data: &[u8], xref: &CrossRefTable, version: String) -> Result<Self> {
        let trailer = xref
            .trailer()
            .cloned()
            .ok_or(Error::InvalidXref)?;

        let mut objects = BTreeMap::new();
        for obj_num in xref.all_object_numbers() {
            let entry = match xref.get(obj_num) {
                Some(e) if e.in_use => e,
                _ => continue,
            };
            let start = entry.offset as usize;
            if start >= data.len() {
                log::warn!("object {} offset {} past EOF, skipping", obj_num, start);
                continue;
            }
            match parse_indirect_object(&data[start..]) {
                Ok((_, (obj_ref, obj))) => {
                    if obj_ref.id != obj_num {
                        log::warn!(
                            "xref says object {} at offset {}, header says {}",
                            obj_num,
                            start,
                            obj_ref.id
                        );
                    }
                    if let Some(dict) = obj.as_dict() {
                        if dict.get("Type").and_then(Object::as_name) == Some("ObjStm") {
                            return Err(Error::Unsupported(
                                "compressed object streams are not supported".to_string(),
                            ));
                        }
                    }
                    objects.insert(obj_ref.id, (obj_ref.gen, obj));
                },
                Err(e) => {
                    log::warn!("failed to parse object {} at offset {}: {}", obj_num, start, e);
                },
            }
        }

        if objects.is_empty() {
            return Err(Error::InvalidPdf("document contains no objects".to_string()));
        }

        Ok(Self {
            objects,
            trailer,
            version,
        })
    }

    /// Header version string, e.g. "1.7".
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Trailer dictionary.
    pub fn trailer(&self) -> &Dictionary {
        &self.trailer
    }

    /// Mutable trailer dictionary.
    pub fn trailer_mut(&mut self) -> &mut Dictionary {
        &mut self.trailer
    }

    /// Get an object by reference, without resolving nested references.
    pub fn get(&self, obj_ref: ObjectRef) -> Result<&Object> {
        match self.objects.get(&obj_ref.id) {
            Some((gen, obj)) if *gen == obj_ref.gen => Ok(obj),
            _ => Err(Error::ObjectNotFound(obj_ref.id, obj_ref.gen)),
        }
    }

    /// Get a mutable object by reference.
    pub fn get_mut(&mut self, obj_ref: ObjectRef) -> Result<&mut Object> {
        match self.objects.get_mut(&obj_ref.id) {
            Some((gen, obj)) if *gen == obj_ref.gen => Ok(obj),
            _ => Err(Error::ObjectNotFound(obj_ref.id, obj_ref.gen)),
        }
    }

    /// Resolve an object: follow reference chains until a direct object.
    pub fn resolve<'a>(&'a self, obj: &'a Object) -> Result<&'a Object> {
        let mut current = obj;
        for _ in 0..MAX_RESOLVE_DEPTH {
            match current {
                Object::Reference(r) => current = self.get(*r)?,
                direct => return Ok(direct),
            }
        }
        Err(Error::InvalidPdf("reference chain too deep".to_string()))
    }

    /// Iterate all objects in object-number order.
    pub fn iter_objects(&self) -> impl Iterator<Item = (ObjectRef, &Object)> {
        self.objects
            .iter()
            .map(|(id, (gen, obj))| (ObjectRef::new(*id, *gen), obj))
    }

    /// Allocate a fresh object number and insert the object.
    pub fn add_object(&mut self, obj: Object) -> ObjectRef {
        let id = self.objects.keys().next_back().map_or(1, |max| max + 1);
        self.objects.insert(id, (0, obj));
        ObjectRef::new(id, 0)
    }

    /// Replace or insert the object behind a reference.
    pub fn set_object(&mut self, obj_ref: ObjectRef, obj: Object) {
        self.objects.insert(obj_ref.id, (obj_ref.gen, obj));
    }

    /// Number of objects.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Reference to the document catalog (trailer `/Root`).
    pub fn catalog_ref(&self) -> Result<ObjectRef> {
        self.trailer
            .get("Root")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::InvalidPdf("trailer has no /Root reference".to_string()))
    }

    /// The document catalog dictionary.
    pub fn catalog(&self) -> Result<&Dictionary> {
        let obj = self.get(self.catalog_ref()?)?;
        obj.as_dict().ok_or_else(|| Error::InvalidObjectType {
            expected: "Dictionary".to_string(),
            found: obj.type_name().to_string(),
        })
    }

    /// Reference to the first page, walking the page tree depth-first.
    pub fn first_page_ref(&self) -> Result<ObjectRef> {
        let catalog = self.catalog()?;
        let pages_ref = catalog
            .get("Pages")
            .and_then(Object::as_reference)
            .ok_or_else(|| Error::InvalidPdf("catalog has no /Pages reference".to_string()))?;
        self.find_first_leaf(pages_ref, 0)
    }

    fn find_first_leaf(&self, node_ref: ObjectRef, depth: u32) -> Result<ObjectRef> {
        if depth > MAX_RESOLVE_DEPTH {
            return Err(Error::InvalidPdf("page tree too deep".to_string()));
        }
        let node = self.get(node_ref)?;
        let dict = node.as_dict().ok_or_else(|| Error::InvalidObjectType {
            expected: "Dictionary".to_string(),
            found: node.type_name().to_string(),
        })?;
        match dict.get("Type").and_then(Object::as_name) {
            Some("Page") => Ok(node_ref),
            _ => {
                let kids = dict
                    .get("Kids")
                    .and_then(Object::as_array)
                    .ok_or_else(|| Error::InvalidPdf("page tree node has no /Kids".to_string()))?;
                let first = kids
                    .first()
                    .and_then(Object::as_reference)
                    .ok_or_else(|| Error::InvalidPdf("empty /Kids in page tree".to_string()))?;
                self.find_first_leaf(first, depth + 1)
            },
        }
    }
}

/// Parse the `%PDF-M.m` header, tolerating up to 1 KiB of junk before it.
fn parse_header(data: &[u8]) -> Result<String> {
    let search_len = data.len().min(1024);
    let window = &data[..search_len];
    let pos = window
        .windows(5)
        .position(|w| w == b"%PDF-")
        .ok_or_else(|| {
            let head: String = data
                .iter()
                .take(8)
                .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
                .collect();
            Error::InvalidHeader(head)
        })?;

    let after = &window[pos + 5..];
    let version: String = after
        .iter()
        .take_while(|c| c.is_ascii_digit() || **c == b'.')
        .map(|&c| c as char)
        .collect();
    if version.is_empty() {
        return Err(Error::InvalidHeader("%PDF-".to_string()));
    }
    Ok(version)
}
