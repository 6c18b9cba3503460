//! ByteRange handling for detached signatures.
//!
//! `/ByteRange [offset1 length1 offset2 length2]` names the two spans of
//! the file covered by the signature; the gap between them is the hex
//! `/Contents` placeholder, delimiters included. This module computes,
//! patches, parses, and validates those ranges, and splices signatures
//! into the placeholder.
//!
//! During preparation the array is written with fixed-width dummy values
//! so the real numbers can be patched in afterwards without moving a
//! single byte of the file.

use crate::error::{Error, Result};

/// Width of each dummy number in the provisional `/ByteRange`. Ten digits
/// covers files up to ~10 GB while keeping the array patchable in place.
pub const BYTE_RANGE_DIGITS: usize = 10;

/// Dummy value written into the provisional array.
pub const BYTE_RANGE_DUMMY: i64 = 9_999_999_999;

/// Calculator for signature byte ranges and the `/Contents` placeholder.
#[derive(Debug, Clone, Copy)]
pub struct ByteRangeCalculator {
    /// Total size of the `/Contents` value: hex digits plus the two angle
    /// brackets
    placeholder_size: usize,
}

impl ByteRangeCalculator {
    /// Create a calculator sized for a DER signature of `capacity` bytes.
    ///
    /// The placeholder becomes `capacity * 2 + 2` bytes: two hex digits per
    /// byte, plus the `<` `>` delimiters.
    pub fn new(capacity: usize) -> Self {
        Self {
            placeholder_size: capacity * 2 + 2,
        }
    }

    /// Create a calculator from an exact placeholder size (delimiters
    /// included).
    pub fn with_placeholder_size(placeholder_size: usize) -> Self {
        Self { placeholder_size }
    }

    /// Total `/Contents` value size, delimiters included.
    pub fn placeholder_size(&self) -> usize {
        self.placeholder_size
    }

    /// The all-zeros placeholder string: `<000...0>`.
    pub fn generate_placeholder(&self) -> String {
        format!("<{}>", "0".repeat(self.placeholder_size - 2))
    }

    /// The provisional `/ByteRange` array, fixed-width dummies.
    pub fn provisional_byte_range() -> [i64; 4] {
        [0, BYTE_RANGE_DUMMY, BYTE_RANGE_DUMMY, BYTE_RANGE_DUMMY]
    }

    /// Compute the real ranges once the placeholder's position is known.
    ///
    /// `contents_offset` is where the `<` of the placeholder sits.
    pub fn calculate_byte_range(&self, file_size: usize, contents_offset: usize) -> [i64; 4] {
        let before = contents_offset as i64;
        let after_start = (contents_offset + self.placeholder_size) as i64;
        let after_len = file_size as i64 - after_start;
        [0, before, after_start, after_len]
    }

    /// Format an array the way it appears in the file: `[0 123 456 789]`.
    pub fn format_byte_range(byte_range: &[i64; 4]) -> String {
        format!(
            "[{} {} {} {}]",
            byte_range[0], byte_range[1], byte_range[2], byte_range[3]
        )
    }

    /// Concatenate the two covered spans.
    pub fn extract_signed_bytes(pdf_data: &[u8], byte_range: &[i64; 4]) -> Result<Vec<u8>> {
        let (o1, l1) = (byte_range[0] as usize, byte_range[1] as usize);
        let (o2, l2) = (byte_range[2] as usize, byte_range[3] as usize);

        if o1 + l1 > pdf_data.len() {
            return Err(Error::InvalidPdf(format!(
                "ByteRange first span exceeds file size: {} + {} > {}",
                o1,
                l1,
                pdf_data.len()
            )));
        }
        if o2 + l2 > pdf_data.len() {
            return Err(Error::InvalidPdf(format!(
                "ByteRange second span exceeds file size: {} + {} > {}",
                o2,
                l2,
                pdf_data.len()
            )));
        }

        let mut signed = Vec::with_capacity(l1 + l2);
        signed.extend_from_slice(&pdf_data[o1..o1 + l1]);
        signed.extend_from_slice(&pdf_data[o2..o2 + l2]);
        Ok(signed)
    }

    /// Check that a range covers the whole file except one contiguous gap.
    pub fn validate_byte_range(byte_range: &[i64; 4], file_size: usize) -> Result<()> {
        let [o1, l1, o2, l2] = *byte_range;

        if o1 != 0 {
            return Err(Error::InvalidPdf(format!(
                "ByteRange must start at 0, got {}",
                o1
            )));
        }
        if l1 < 0 || l2 < 0 || o2 < 0 {
            return Err(Error::InvalidPdf("ByteRange has negative values".to_string()));
        }
        if o2 + l2 != file_size as i64 {
            return Err(Error::InvalidPdf(format!(
                "ByteRange must end at file size {}, ends at {}",
                file_size,
                o2 + l2
            )));
        }
        if l1 > o2 {
            return Err(Error::InvalidPdf(format!(
                "ByteRange spans overlap: first ends at {}, second starts at {}",
                l1, o2
            )));
        }
        Ok(())
    }

    /// Find the `<` of the `/Contents` placeholder inside the signature
    /// dictionary starting at `sig_dict_offset`.
    ///
    /// The scan is confined to that object (up to its `endobj`) and only
    /// accepts a `/Contents` key whose value is the all-zeros placeholder of
    /// exactly `placeholder_size` bytes, so `/Contents <` text inside a
    /// `Reason` or `Location` string cannot be mistaken for the real entry.
    /// `/Contents` is the last dictionary entry, so the last match wins.
    pub fn find_contents_offset(
        pdf_data: &[u8],
        sig_dict_offset: usize,
        placeholder_size: usize,
    ) -> Option<usize> {
        let window_end =
            find_keyword(pdf_data, b"endobj", sig_dict_offset).unwrap_or(pdf_data.len());
        let window = &pdf_data[sig_dict_offset..window_end];

        let pattern = b"/Contents";
        let mut found = None;
        let mut pos = 0;
        while pos + pattern.len() < window.len() {
            if window[pos..].starts_with(pattern) {
                let mut i = pos + pattern.len();
                while i < window.len() && is_range_whitespace(window[i]) {
                    i += 1;
                }
                if is_zero_placeholder(&window[i..], placeholder_size) {
                    found = Some(sig_dict_offset + i);
                }
            }
            pos += 1;
        }
        found
    }

    /// Find the `[` of the `/ByteRange` array of the signature object
    /// starting at `search_from`, looking no further than its `endobj`.
    pub fn find_byte_range_offset(pdf_data: &[u8], search_from: usize) -> Option<usize> {
        let window_end = find_keyword(pdf_data, b"endobj", search_from).unwrap_or(pdf_data.len());
        let window = &pdf_data[search_from..window_end];

        let pattern = b"/ByteRange";
        let pos = window.windows(pattern.len()).position(|w| w == pattern)?;
        for i in pos + pattern.len()..window.len() {
            match window[i] {
                b'[' => return Some(search_from + i),
                b if is_range_whitespace(b) => continue,
                _ => return None,
            }
        }
        None
    }

    /// Parse the signature `/ByteRange` array straight out of file bytes.
    ///
    /// The file may contain other `/ByteRange` text, for example inside a
    /// content stream carried verbatim from the input. Every occurrence is
    /// tried, and the one whose values describe this file is taken: spans
    /// covering the whole file except one contiguous gap, with the gap
    /// holding a `<hex>` value.
    pub fn parse_byte_range(pdf_data: &[u8]) -> Result<[i64; 4]> {
        let pattern = b"/ByteRange";
        let mut search = 0;
        let mut seen = false;
        while let Some(at) = find_keyword(pdf_data, pattern, search) {
            search = at + pattern.len();
            seen = true;
            let values = match parse_array_after(pdf_data, search) {
                Some(v) => v,
                None => continue,
            };
            if Self::validate_byte_range(&values, pdf_data.len()).is_err() {
                continue;
            }
            if !gap_is_hex_string(pdf_data, &values) {
                continue;
            }
            return Ok(values);
        }
        if seen {
            Err(Error::InvalidPdf(
                "no /ByteRange array matches the file layout".to_string(),
            ))
        } else {
            Err(Error::InvalidPdf("no /ByteRange array found".to_string()))
        }
    }

    /// Rewrite the `/ByteRange` array in place with the real values.
    ///
    /// Only the signature object starting at `sig_dict_offset` is touched;
    /// the new text is space-padded to exactly the width of the old one so
    /// nothing after it moves. Fails when the real numbers are wider than
    /// the provisional dummies allowed for.
    pub fn patch_byte_range(
        pdf_data: &mut [u8],
        byte_range: &[i64; 4],
        sig_dict_offset: usize,
    ) -> Result<()> {
        let open = Self::find_byte_range_offset(pdf_data, sig_dict_offset)
            .ok_or_else(|| Error::InvalidPdf("no /ByteRange array found".to_string()))?;
        let close_rel = pdf_data[open..]
            .iter()
            .position(|&b| b == b']')
            .ok_or_else(|| Error::InvalidPdf("unterminated /ByteRange array".to_string()))?;
        let slot = open..open + close_rel + 1;
        let width = slot.len();

        let text = Self::format_byte_range(byte_range);
        if text.len() > width {
            return Err(Error::PlaceholderOverflow {
                needed: text.len(),
                capacity: width,
            });
        }

        let mut padded = text.into_bytes();
        padded.resize(width, b' ');
        pdf_data[slot].copy_from_slice(&padded);
        Ok(())
    }

    /// Splice a hex-encoded signature into the placeholder, zero-padding
    /// the remainder.
    pub fn insert_signature(
        &self,
        pdf_data: &mut [u8],
        contents_offset: usize,
        signature_hex: &str,
    ) -> Result<()> {
        let needed = signature_hex.len() + 2;
        if needed > self.placeholder_size {
            return Err(Error::PlaceholderOverflow {
                needed,
                capacity: self.placeholder_size,
            });
        }
        if contents_offset + self.placeholder_size > pdf_data.len() {
            return Err(Error::InvalidPdf(
                "signature insertion would exceed file bounds".to_string(),
            ));
        }

        let mut value = String::with_capacity(self.placeholder_size);
        value.push('<');
        value.push_str(signature_hex);
        for _ in 0..(self.placeholder_size - 2 - signature_hex.len()) {
            value.push('0');
        }
        value.push('>');

        pdf_data[contents_offset..contents_offset + self.placeholder_size]
            .copy_from_slice(value.as_bytes());
        Ok(())
    }
}

impl Default for ByteRangeCalculator {
    fn default() -> Self {
        // 8 KiB of DER holds a signature with a typical chain attached
        Self::new(8192)
    }
}

fn is_range_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

/// First occurrence of `keyword` at or after `from`, as an absolute offset.
fn find_keyword(data: &[u8], keyword: &[u8], from: usize) -> Option<usize> {
    if from >= data.len() {
        return None;
    }
    data[from..]
        .windows(keyword.len())
        .position(|w| w == keyword)
        .map(|p| from + p)
}

/// `<000...0>` of exactly `placeholder_size` bytes at the start of `data`.
fn is_zero_placeholder(data: &[u8], placeholder_size: usize) -> bool {
    placeholder_size >= 2
        && data.len() >= placeholder_size
        && data[0] == b'<'
        && data[placeholder_size - 1] == b'>'
        && data[1..placeholder_size - 1].iter().all(|&b| b == b'0')
}

/// Whether the gap between the two spans holds a `<hex>` value.
fn gap_is_hex_string(data: &[u8], byte_range: &[i64; 4]) -> bool {
    let (start, end) = (byte_range[1] as usize, byte_range[2] as usize);
    end - start >= 4
        && data[start] == b'<'
        && data[end - 1] == b'>'
        && data[start + 1..end - 1].iter().all(|b| b.is_ascii_hexdigit())
}

/// Parse `[n n n n]` following `after`, whitespace-separated, exactly four
/// integers. `None` on any shape mismatch.
fn parse_array_after(data: &[u8], after: usize) -> Option<[i64; 4]> {
    let mut open = after;
    while open < data.len() && is_range_whitespace(data[open]) {
        open += 1;
    }
    if open >= data.len() || data[open] != b'[' {
        return None;
    }
    let close = find_keyword(data, b"]", open)?;
    let text = std::str::from_utf8(&data[open + 1..close]).ok()?;

    let mut values = [0i64; 4];
    let mut count = 0;
    for part in text.split_whitespace() {
        if count == 4 {
            return None;
        }
        values[count] = part.parse().ok()?;
        count += 1;
    }
    if count != 4 {
        return None;
    }
    Some(values)
}
