//! PDF object serialization.
//!
//! Converts object values to their byte representation. Dictionary entries
//! are written in insertion order, so serializing a document twice gives
//! identical bytes.

use crate::object::{Dictionary, Object};
use std::io::Write;

/// Serializer for PDF objects.
#[derive(Debug, Clone, Default)]
pub struct ObjectSerializer;

impl ObjectSerializer {
    /// Create a new serializer.
    pub fn new() -> Self {
        Self
    }

    /// Serialize an object to bytes.
    pub fn serialize(&self, obj: &Object) -> Vec<u8> {
        let mut buf = Vec::new();
        // Writes to Vec<u8> cannot fail
        self.write_object(&mut buf, obj).unwrap();
        buf
    }

    /// Serialize an indirect object definition.
    ///
    /// Format: `{id} {gen} obj\n{object}\nendobj\n`
    pub fn serialize_indirect(&self, id: u32, gen: u16, obj: &Object) -> Vec<u8> {
        let mut buf = Vec::new();
        writeln!(buf, "{} {} obj", id, gen).unwrap();
        self.write_object(&mut buf, obj).unwrap();
        write!(buf, "\nendobj\n").unwrap();
        buf
    }

    fn write_object<W: Write>(&self, w: &mut W, obj: &Object) -> std::io::Result<()> {
        match obj {
            Object::Null => write!(w, "null"),
            Object::Boolean(b) => write!(w, "{}", if *b { "true" } else { "false" }),
            Object::Integer(i) => write!(w, "{}", i),
            Object::Real(r) => self.write_real(w, *r),
            Object::String(s) => self.write_string(w, s),
            Object::Name(n) => self.write_name(w, n),
            Object::Array(arr) => self.write_array(w, arr),
            Object::Dictionary(dict) => self.write_dictionary(w, dict),
            Object::Stream { dict, data } => self.write_stream(w, dict, data),
            Object::Reference(r) => write!(w, "{} {} R", r.id, r.gen),
        }
    }

    /// Write a real number, trimming trailing zeros.
    fn write_real<W: Write>(&self, w: &mut W, value: f64) -> std::io::Result<()> {
        if value.fract() == 0.0 {
            write!(w, "{}", value as i64)
        } else {
            let formatted = format!("{:.5}", value);
            let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
            write!(w, "{}", trimmed)
        }
    }

    /// Write a PDF string: literal `(...)` with escaping when printable,
    /// hex `<...>` for binary data.
    fn write_string<W: Write>(&self, w: &mut W, data: &[u8]) -> std::io::Result<()> {
        let is_printable = data
            .iter()
            .all(|&b| b == b'\n' || b == b'\r' || b == b'\t' || (0x20..=0x7E).contains(&b));

        if is_printable {
            write!(w, "(")?;
            for &byte in data {
                match byte {
                    b'(' => write!(w, "\\(")?,
                    b')' => write!(w, "\\)")?,
                    b'\\' => write!(w, "\\\\")?,
                    b'\n' => write!(w, "\\n")?,
                    b'\r' => write!(w, "\\r")?,
                    b'\t' => write!(w, "\\t")?,
                    _ => w.write_all(&[byte])?,
                }
            }
            write!(w, ")")
        } else {
            write!(w, "<")?;
            for byte in data {
                write!(w, "{:02X}", byte)?;
            }
            write!(w, ">")
        }
    }

    /// Write a PDF name, escaping delimiters and non-graphic bytes as `#xx`.
    fn write_name<W: Write>(&self, w: &mut W, name: &str) -> std::io::Result<()> {
        write!(w, "/")?;
        for byte in name.bytes() {
            match byte {
                b'#' | b'/' | b'%' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' => {
                    write!(w, "#{:02X}", byte)?
                },
                0x21..=0x7E => w.write_all(&[byte])?,
                _ => write!(w, "#{:02X}", byte)?,
            }
        }
        Ok(())
    }

    fn write_array<W: Write>(&self, w: &mut W, arr: &[Object]) -> std::io::Result<()> {
        write!(w, "[")?;
        for (i, obj) in arr.iter().enumerate() {
            if i > 0 {
                write!(w, " ")?;
            }
            self.write_object(w, obj)?;
        }
        write!(w, "]")
    }

    fn write_dictionary<W: Write>(&self, w: &mut W, dict: &Dictionary) -> std::io::Result<()> {
        write!(w, "<<")?;
        for (key, value) in dict.iter() {
            write!(w, " ")?;
            self.write_name(w, key)?;
            write!(w, " ")?;
            self.write_object(w, value)?;
        }
        write!(w, " >>")
    }

    /// Write a stream, forcing `/Length` to match the payload actually
    /// emitted.
    fn write_stream<W: Write>(
        &self,
        w: &mut W,
        dict: &Dictionary,
        data: &[u8],
    ) -> std::io::Result<()> {
        let mut dict_with_length = dict.clone();
        dict_with_length.insert("Length".to_string(), Object::Integer(data.len() as i64));

        self.write_dictionary(w, &dict_with_length)?;
        write!(w, "\nstream\n")?;
        w.write_all(data)?;
        write!(w, "\nendstream")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectRef;

    fn serialize_str(obj: &Object) -> String {
        String::from_utf8(ObjectSerializer::new().serialize(obj)).unwrap()
    }

    #[test]
    fn test_serialize_primitives() {
        assert_eq!(serialize_str(&Object::Null), "null");
        assert_eq!(serialize_str(&Object::Boolean(true)), "true");
        assert_eq!(serialize_str(&Object::Integer(-42)), "-42");
        assert_eq!(serialize_str(&Object::Real(2.5)), "2.5");
        assert_eq!(serialize_str(&Object::Real(3.0)), "3");
        assert_eq!(serialize_str(&Object::name("Type")), "/Type");
        assert_eq!(
            serialize_str(&Object::Reference(ObjectRef::new(10, 0))),
            "10 0 R"
        );
    }

    #[test]
    fn test_serialize_string_literal_vs_hex() {
        assert_eq!(serialize_str(&Object::string("Hello (x)")), "(Hello \\(x\\))");
        assert_eq!(
            serialize_str(&Object::String(vec![0x00, 0xFF])),
            "<00FF>"
        );
    }

    #[test]
    fn test_serialize_name_escapes() {
        assert_eq!(serialize_str(&Object::name("A B")), "/A#20B");
        assert_eq!(serialize_str(&Object::name("X#Y")), "/X#23Y");
    }

    #[test]
    fn test_serialize_dictionary_in_insertion_order() {
        let obj = Object::dict(vec![
            ("Zeta", Object::Integer(1)),
            ("Alpha", Object::Integer(2)),
        ]);
        assert_eq!(serialize_str(&obj), "<< /Zeta 1 /Alpha 2 >>");
    }

    #[test]
    fn test_serialize_array() {
        let obj = Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(612),
            Object::Integer(792),
        ]);
        assert_eq!(serialize_str(&obj), "[0 0 612 792]");
    }

    #[test]
    fn test_serialize_stream_fixes_length() {
        let mut dict = Dictionary::new();
        dict.insert("Length".to_string(), Object::Integer(999));
        let obj = Object::Stream {
            dict,
            data: bytes::Bytes::from_static(b"hello"),
        };
        let out = serialize_str(&obj);
        assert!(out.starts_with("<< /Length 5 >>\nstream\nhello\nendstream"));
    }

    #[test]
    fn test_serialize_indirect() {
        let out = ObjectSerializer::new().serialize_indirect(7, 0, &Object::Integer(1));
        assert_eq!(out, b"7 0 obj\n1\nendobj\n");
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let obj = Object::dict(vec![
            ("B", Object::Integer(2)),
            ("A", Object::Array(vec![Object::Real(1.25), Object::Null])),
        ]);
        let s = ObjectSerializer::new();
        assert_eq!(s.serialize(&obj), s.serialize(&obj));
    }
}
