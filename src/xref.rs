//! Cross-reference table parsing and recovery.
//!
//! The xref table maps object numbers to byte offsets. Classic tables
//! (PDF 1.0-1.4) are parsed directly, following `/Prev` pointers through
//! incremental updates. Files whose table is damaged or uses a
//! cross-reference stream are recovered by scanning the whole buffer for
//! `N G obj` headers; the signing pipeline re-serializes flat regardless,
//! so a recovered table loses nothing.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};
use crate::parser::parse_object;
use std::collections::HashMap;

/// A cross-reference table entry: where one object lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XRefEntry {
    /// Byte offset of the object header
    pub offset: u64,
    /// Generation number
    pub generation: u16,
    /// Whether the object is in use (`n`) as opposed to free (`f`)
    pub in_use: bool,
}

impl XRefEntry {
    /// Create an in-use entry.
    pub fn in_use(offset: u64, generation: u16) -> Self {
        Self {
            offset,
            generation,
            in_use: true,
        }
    }

    /// Create a free entry.
    pub fn free(next_free: u64, generation: u16) -> Self {
        Self {
            offset: next_free,
            generation,
            in_use: false,
        }
    }
}

/// Cross-reference table mapping object numbers to locations.
#[derive(Debug, Clone, Default)]
pub struct CrossRefTable {
    entries: HashMap<u32, XRefEntry>,
    trailer: Option<Dictionary>,
}

impl CrossRefTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the trailer dictionary.
    pub fn set_trailer(&mut self, trailer: Dictionary) {
        self.trailer = Some(trailer);
    }

    /// Get the trailer dictionary if present.
    pub fn trailer(&self) -> Option<&Dictionary> {
        self.trailer.as_ref()
    }

    /// Add an entry for an object number.
    pub fn add_entry(&mut self, object_number: u32, entry: XRefEntry) {
        self.entries.insert(object_number, entry);
    }

    /// Look up an entry by object number.
    pub fn get(&self, object_number: u32) -> Option<&XRefEntry> {
        self.entries.get(&object_number)
    }

    /// Iterate all known object numbers.
    pub fn all_object_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.keys().copied()
    }

    /// Merge entries from an earlier table in a `/Prev` chain.
    ///
    /// Entries already in `self` win: later sections of an incremental
    /// update shadow earlier ones.
    pub fn merge_from(&mut self, other: CrossRefTable) {
        for (obj_num, entry) in other.entries {
            self.entries.entry(obj_num).or_insert(entry);
        }
        if self.trailer.is_none() {
            self.trailer = other.trailer;
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Find the offset announced by the final `startxref` keyword.
pub fn find_xref_offset(data: &[u8]) -> Result<u64> {
    // startxref sits near the end; search the last 2 KiB
    let tail_start = data.len().saturating_sub(2048);
    let tail = &data[tail_start..];

    let keyword = b"startxref";
    let pos = tail
        .windows(keyword.len())
        .rposition(|w| w == keyword)
        .ok_or(Error::InvalidXref)?;

    let after = &tail[pos + keyword.len()..];
    let digits: Vec<u8> = after
        .iter()
        .copied()
        .skip_while(|c| c.is_ascii_whitespace())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return Err(Error::InvalidXref);
    }
    std::str::from_utf8(&digits)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(Error::InvalidXref)
}

/// Parse the cross-reference table at `offset`, following `/Prev` pointers.
pub fn parse_xref(data: &[u8], offset: u64) -> Result<CrossRefTable> {
    parse_xref_chain(data, offset, 0)
}

fn parse_xref_chain(data: &[u8], offset: u64, depth: u32) -> Result<CrossRefTable> {
    // Circular /Prev chains must terminate
    if depth > 100 {
        return Err(Error::InvalidPdf(
            "xref /Prev chain depth exceeded 100".to_string(),
        ));
    }
    let offset = offset as usize;
    if offset >= data.len() {
        return Err(Error::InvalidXref);
    }

    let mut xref = parse_classic_xref(&data[offset..])?;

    if let Some(prev) = xref
        .trailer()
        .and_then(|t| t.get("Prev"))
        .and_then(Object::as_integer)
    {
        log::debug!("following /Prev to offset {}", prev);
        let prev_xref = parse_xref_chain(data, prev as u64, depth + 1)?;
        xref.merge_from(prev_xref);
    }

    Ok(xref)
}

/// Parse a classic `xref` table followed by its `trailer` dictionary.
///
/// ```text
/// xref
/// 0 6
/// 0000000000 65535 f
/// 0000000018 00000 n
/// ...
/// trailer
/// << /Size 6 /Root 1 0 R >>
/// ```
fn parse_classic_xref(input: &[u8]) -> Result<CrossRefTable> {
    let mut lines = LineReader::new(input);
    let mut xref = CrossRefTable::new();

    // "xref" keyword, possibly after blank lines
    loop {
        let line = lines.next_line().ok_or(Error::InvalidXref)?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "xref" {
            break;
        }
        return Err(Error::InvalidXref);
    }

    loop {
        let line = match lines.next_line() {
            Some(l) => l,
            None => break,
        };
        let trimmed = line.trim();

        if trimmed.starts_with("trailer") {
            let trailer_input = &input[lines.pos()..];
            let (_, obj) = parse_object(trailer_input).map_err(|_| Error::InvalidXref)?;
            match obj {
                Object::Dictionary(d) => xref.set_trailer(d),
                _ => return Err(Error::InvalidXref),
            }
            break;
        }
        if trimmed.is_empty() || trimmed.starts_with('%') {
            continue;
        }

        // Subsection header: "first count"
        let mut parts = trimmed.split_whitespace();
        let (first, count) = match (parts.next(), parts.next(), parts.next()) {
            (Some(f), Some(c), None) => (
                f.parse::<u32>().map_err(|_| Error::InvalidXref)?,
                c.parse::<u32>().map_err(|_| Error::InvalidXref)?,
            ),
            _ => return Err(Error::InvalidXref),
        };
        if count > 1_000_000 {
            return Err(Error::InvalidPdf(
                "xref subsection count exceeds limit".to_string(),
            ));
        }

        let mut parsed = 0;
        while parsed < count {
            let line = lines.next_line().ok_or(Error::InvalidXref)?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let mut fields = trimmed.split_whitespace();
            let (offset, gen, kind) = match (fields.next(), fields.next(), fields.next()) {
                (Some(o), Some(g), Some(k)) => (
                    o.parse::<u64>().map_err(|_| Error::InvalidXref)?,
                    g.parse::<u16>().map_err(|_| Error::InvalidXref)?,
                    k,
                ),
                _ => return Err(Error::InvalidXref),
            };
            let entry = match kind {
                "n" => XRefEntry::in_use(offset, gen),
                "f" => XRefEntry::free(offset, gen),
                _ => return Err(Error::InvalidXref),
            };
            xref.add_entry(first + parsed, entry);
            parsed += 1;
        }
    }

    if xref.trailer().is_none() {
        return Err(Error::InvalidXref);
    }
    Ok(xref)
}

/// Rebuild the table by scanning the whole buffer for `N G obj` headers.
///
/// Used when `startxref` or the table itself is unusable, and for files
/// whose table is a cross-reference stream. The last header found for each
/// object number wins, matching incremental-update shadowing. The trailer
/// comes from the last `trailer` keyword in the file; if there is none
/// (xref-stream files), a minimal one is synthesized around the catalog.
pub fn reconstruct_xref(data: &[u8]) -> Result<CrossRefTable> {
    log::info!("reconstructing xref table by scanning {} bytes", data.len());

    let mut xref = CrossRefTable::new();
    let mut found = 0usize;
    let mut pos = 0usize;

    while let Some(rel) = find_keyword(&data[pos..], b"obj") {
        let kw = pos + rel;
        pos = kw + 3;

        // Walk back over "N G " preceding the keyword
        let Some((header_start, obj_num, gen_num)) = parse_obj_header_backwards(data, kw) else {
            continue;
        };
        // The keyword must start a real object, not sit inside a stream payload
        if !valid_object_follows(&data[kw + 3..]) {
            continue;
        }

        xref.add_entry(obj_num, XRefEntry::in_use(header_start as u64, gen_num));
        found += 1;
    }

    if found == 0 {
        return Err(Error::InvalidPdf(
            "no objects found during xref reconstruction".to_string(),
        ));
    }
    log::info!("reconstructed xref with {} entries", xref.len());

    // Prefer the file's own trailer; the last one wins
    let mut search = 0usize;
    let mut last_trailer = None;
    while let Some(rel) = find_keyword(&data[search..], b"trailer") {
        last_trailer = Some(search + rel);
        search += rel + 7;
    }
    if let Some(tpos) = last_trailer {
        if let Ok((_, Object::Dictionary(d))) = parse_object(&data[tpos + 7..]) {
            xref.set_trailer(d);
            return Ok(xref);
        }
    }

    // No classic trailer (xref-stream file): synthesize one around the catalog
    let catalog = find_catalog(data, &xref).ok_or_else(|| {
        Error::InvalidPdf("no catalog found during xref reconstruction".to_string())
    })?;
    let mut trailer = Dictionary::new();
    trailer.insert(
        "Size".to_string(),
        Object::Integer(xref.all_object_numbers().max().unwrap_or(0) as i64 + 1),
    );
    trailer.insert("Root".to_string(), Object::reference(catalog, 0));
    xref.set_trailer(trailer);
    Ok(xref)
}

fn find_keyword(haystack: &[u8], keyword: &[u8]) -> Option<usize> {
    haystack.windows(keyword.len()).position(|w| w == keyword)
}

/// Given the offset of an `obj` keyword, walk backwards over `N G `
/// and return (header start, object number, generation).
fn parse_obj_header_backwards(data: &[u8], kw: usize) -> Option<(usize, u32, u16)> {
    let mut i = kw;
    // whitespace before "obj"
    let ws_end = i;
    while i > 0 && data[i - 1].is_ascii_whitespace() {
        i -= 1;
    }
    if i == ws_end {
        return None;
    }
    // generation digits
    let gen_end = i;
    while i > 0 && data[i - 1].is_ascii_digit() {
        i -= 1;
    }
    if i == gen_end {
        return None;
    }
    let gen_num: u16 = std::str::from_utf8(&data[i..gen_end]).ok()?.parse().ok()?;
    // whitespace between N and G
    let ws2_end = i;
    while i > 0 && data[i - 1].is_ascii_whitespace() {
        i -= 1;
    }
    if i == ws2_end {
        return None;
    }
    // object number digits
    let num_end = i;
    while i > 0 && data[i - 1].is_ascii_digit() {
        i -= 1;
    }
    if i == num_end {
        return None;
    }
    let obj_num: u32 = std::str::from_utf8(&data[i..num_end]).ok()?.parse().ok()?;
    Some((i, obj_num, gen_num))
}

/// Cheap validation that object content follows an `obj` keyword.
///
/// Fake headers turn up inside strings and binary stream data; requiring a
/// plausible first byte filters most of them out.
fn valid_object_follows(after: &[u8]) -> bool {
    let mut i = 0;
    while i < after.len() && after[i].is_ascii_whitespace() {
        i += 1;
    }
    match after.get(i) {
        Some(&b) => {
            matches!(b, b'<' | b'[' | b'(' | b'/' | b't' | b'f' | b'n' | b'-' | b'+')
                || b.is_ascii_digit()
        },
        None => false,
    }
}

/// Find the object number of the document catalog (`/Type /Catalog`).
fn find_catalog(data: &[u8], xref: &CrossRefTable) -> Option<u32> {
    for obj_num in xref.all_object_numbers() {
        let entry = xref.get(obj_num)?;
        if !entry.in_use {
            continue;
        }
        let start = entry.offset as usize;
        if start >= data.len() {
            continue;
        }
        if let Ok((_, (_, obj))) = crate::parser::parse_indirect_object(&data[start..]) {
            if let Some(dict) = obj.as_dict() {
                if dict.get("Type").and_then(Object::as_name) == Some("Catalog") {
                    return Some(obj_num);
                }
            }
        }
    }
    None
}

/// Line iterator over bytes that handles CR, LF, and CRLF endings and
/// tracks the byte position past the last consumed line.
struct LineReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> LineReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn pos(&self) -> usize {
        self.pos
    }

    fn next_line(&mut self) -> Option<&'a str> {
        if self.pos >= self.data.len() {
            return None;
        }
        let start = self.pos;
        let mut end = start;
        while end < self.data.len() && self.data[end] != b'\r' && self.data[end] != b'\n' {
            end += 1;
        }
        self.pos = end;
        if self.pos < self.data.len() {
            if self.data[self.pos] == b'\r' {
                self.pos += 1;
                if self.pos < self.data.len() && self.data[self.pos] == b'\n' {
                    self.pos += 1;
                }
            } else {
                self.pos += 1;
            }
        }
        std::str::from_utf8(&self.data[start..end]).ok()
    }
}
