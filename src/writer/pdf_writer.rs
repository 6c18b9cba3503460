//! Whole-document writer.
//!
//! Serializes a [`Document`] flat: header, every object in numeric order,
//! a classic xref table, trailer, `startxref`, `%%EOF`. No compression and
//! no incremental updates; the point is output whose byte offsets are
//! known and stable, so values inside it can be patched in place.

use super::serializer::ObjectSerializer;
use crate::document::Document;
use crate::error::Result;
use crate::object::Object;
use std::collections::HashMap;
use std::io::Write;

/// Result of writing a document: the bytes plus where each object landed.
#[derive(Debug, Clone)]
pub struct WrittenDocument {
    /// Complete file bytes
    pub bytes: Vec<u8>,
    /// Byte offset of each object's `N G obj` header, keyed by object number
    pub offsets: HashMap<u32, usize>,
}

impl WrittenDocument {
    /// Byte offset of one object's header.
    pub fn offset_of(&self, id: u32) -> Option<usize> {
        self.offsets.get(&id).copied()
    }
}

/// Writes documents to flat byte buffers.
#[derive(Debug, Clone, Default)]
pub struct PdfWriter {
    serializer: ObjectSerializer,
}

impl PdfWriter {
    /// Create a new writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize the whole document.
    ///
    /// Trailer entries are carried over except the ones that describe the
    /// previous file's layout (`/Prev`, `/XRefStm`) or state this writer
    /// does not produce (`/Encrypt`); `/Size` is recomputed.
    pub fn write_document(&self, doc: &Document) -> Result<WrittenDocument> {
        let mut output = Vec::new();
        let mut offsets = HashMap::new();

        writeln!(output, "%PDF-{}", doc.version())?;
        // Binary marker so transports treat the file as binary
        output.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

        let mut max_id = 0u32;
        for (obj_ref, obj) in doc.iter_objects() {
            offsets.insert(obj_ref.id, output.len());
            output.extend_from_slice(&self.serializer.serialize_indirect(
                obj_ref.id,
                obj_ref.gen,
                obj,
            ));
            max_id = max_id.max(obj_ref.id);
        }

        let xref_offset = output.len();
        self.write_xref_table(&mut output, doc, &offsets)?;

        writeln!(output, "trailer")?;
        let trailer = self.build_trailer(doc, max_id);
        output.extend_from_slice(&self.serializer.serialize(&Object::Dictionary(trailer)));
        write!(output, "\nstartxref\n{}\n%%EOF\n", xref_offset)?;

        log::debug!(
            "wrote {} objects, {} bytes, xref at {}",
            offsets.len(),
            output.len(),
            xref_offset
        );

        Ok(WrittenDocument {
            bytes: output,
            offsets,
        })
    }

    /// Emit the classic xref table, splitting into subsections wherever the
    /// object numbering has gaps. Object 0 heads the first subsection as the
    /// free-list sentinel.
    fn write_xref_table(
        &self,
        output: &mut Vec<u8>,
        doc: &Document,
        offsets: &HashMap<u32, usize>,
    ) -> Result<()> {
        let mut ids: Vec<u32> = Vec::new();
        let mut gens: HashMap<u32, u16> = HashMap::new();
        for (r, _) in doc.iter_objects() {
            ids.push(r.id);
            gens.insert(r.id, r.gen);
        }
        ids.sort_unstable();

        // Group consecutive object numbers into subsections
        let mut sections: Vec<(u32, Vec<u32>)> = Vec::new();
        for id in ids {
            match sections.last_mut() {
                Some((start, members)) if *start + members.len() as u32 == id => {
                    members.push(id);
                },
                _ => sections.push((id, vec![id])),
            }
        }

        writeln!(output, "xref")?;
        let mut first = true;
        for (start, members) in sections {
            if first && start == 1 {
                // Fold the object-0 sentinel into the leading section
                writeln!(output, "0 {}", members.len() + 1)?;
                writeln!(output, "0000000000 65535 f ")?;
            } else {
                if first {
                    writeln!(output, "0 1")?;
                    writeln!(output, "0000000000 65535 f ")?;
                }
                writeln!(output, "{} {}", start, members.len())?;
            }
            first = false;
            for id in members {
                // Every member came from iter_objects, so the offset exists
                let offset = offsets[&id];
                writeln!(output, "{:010} {:05} n ", offset, gens[&id])?;
            }
        }
        Ok(())
    }

    fn build_trailer(&self, doc: &Document, max_id: u32) -> crate::object::Dictionary {
        let mut trailer = crate::object::Dictionary::new();
        trailer.insert("Size".to_string(), Object::Integer(max_id as i64 + 1));
        for (key, value) in doc.trailer() {
            match key.as_str() {
                "Size" | "Prev" | "XRefStm" | "Encrypt" => continue,
                _ => {
                    trailer.insert(key.clone(), value.clone());
                },
            }
        }
        trailer
    }
}
