//! PDF object parser.
//!
//! Combines lexer tokens into complete objects via recursive descent:
//! read a token, dispatch on its type, recurse for arrays and dictionaries.
//! Also parses full indirect objects (`N G obj ... endobj`), which is how
//! the document loader pulls objects out of the file body.
//!
//! Stream payloads are captured raw. Nothing here applies filters; the
//! pipeline only needs to carry stream bytes through unchanged.

use crate::error::{Error, Result};
use crate::lexer::{token, Token};
use crate::object::{Dictionary, Object, ObjectRef};
use nom::IResult;

/// Decode escape sequences in PDF literal strings.
///
/// Handles the single-character escapes (`\n \r \t \b \f \( \) \\`), octal
/// `\ddd` (1-3 digits), and line continuations (`\<eol>` vanishes). Unknown
/// escapes keep their backslash, which is what most readers do.
pub fn decode_literal_string_escapes(raw: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        if raw[i] == b'\\' && i + 1 < raw.len() {
            match raw[i + 1] {
                b'n' => {
                    result.push(b'\n');
                    i += 2;
                },
                b'r' => {
                    result.push(b'\r');
                    i += 2;
                },
                b't' => {
                    result.push(b'\t');
                    i += 2;
                },
                b'b' => {
                    result.push(8);
                    i += 2;
                },
                b'f' => {
                    result.push(12);
                    i += 2;
                },
                b'(' => {
                    result.push(b'(');
                    i += 2;
                },
                b')' => {
                    result.push(b')');
                    i += 2;
                },
                b'\\' => {
                    result.push(b'\\');
                    i += 2;
                },
                b'\n' => {
                    i += 2;
                },
                b'\r' => {
                    i += 2;
                    if i < raw.len() && raw[i] == b'\n' {
                        i += 1;
                    }
                },
                c if (b'0'..b'8').contains(&c) => {
                    let start = i + 1;
                    let mut value = 0u32;
                    let mut len = 0;
                    while len < 3 && start + len < raw.len() {
                        let digit = raw[start + len];
                        if !(b'0'..b'8').contains(&digit) {
                            break;
                        }
                        value = value * 8 + (digit - b'0') as u32;
                        len += 1;
                    }
                    result.push((value & 0xFF) as u8);
                    i += 1 + len;
                },
                _ => {
                    result.push(b'\\');
                    i += 1;
                },
            }
        } else {
            result.push(raw[i]);
            i += 1;
        }
    }

    result
}

/// Decode a hex string to bytes.
///
/// Whitespace between digits is ignored; an odd trailing digit is padded
/// with 0, per the PDF convention.
pub fn decode_hex(hex_bytes: &[u8]) -> Result<Vec<u8>> {
    let digits: Vec<u8> = hex_bytes
        .iter()
        .filter(|&&c| !c.is_ascii_whitespace())
        .copied()
        .collect();

    let mut result = Vec::with_capacity(digits.len() / 2 + 1);
    for chunk in digits.chunks(2) {
        let hi = hex_value(chunk[0]).ok_or_else(|| Error::ParseError {
            offset: 0,
            reason: format!("invalid hex digit: {:?}", chunk[0] as char),
        })?;
        let lo = if chunk.len() == 2 {
            hex_value(chunk[1]).ok_or_else(|| Error::ParseError {
                offset: 0,
                reason: format!("invalid hex digit: {:?}", chunk[1] as char),
            })?
        } else {
            0
        };
        result.push((hi << 4) | lo);
    }
    Ok(result)
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Parse a single PDF object from input bytes.
///
/// Entry point for all object types: primitives, arrays, dictionaries,
/// streams (dictionary followed by the `stream` keyword), and indirect
/// references (`10 0 R`, recognized by two-token lookahead).
pub fn parse_object(input: &[u8]) -> IResult<&[u8], Object> {
    let (input, tok) = token(input)?;

    match tok {
        Token::Null => Ok((input, Object::Null)),
        Token::True => Ok((input, Object::Boolean(true))),
        Token::False => Ok((input, Object::Boolean(false))),
        Token::Real(r) => Ok((input, Object::Real(r))),
        Token::Name(name) => Ok((input, Object::Name(name))),

        Token::Integer(i) => {
            // Lookahead: "N G R" is a reference, a bare integer is not
            if let Ok((input2, Token::Integer(gen))) = token(input) {
                if let Ok((input3, Token::R)) = token(input2) {
                    return Ok((
                        input3,
                        Object::Reference(ObjectRef::new(i as u32, gen as u16)),
                    ));
                }
            }
            Ok((input, Object::Integer(i)))
        },

        Token::LiteralString(bytes) => {
            let decoded = decode_literal_string_escapes(bytes);
            Ok((input, Object::String(decoded)))
        },

        Token::HexString(hex_bytes) => match decode_hex(hex_bytes) {
            Ok(decoded) => Ok((input, Object::String(decoded))),
            Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Fail,
            ))),
        },

        Token::ArrayStart => parse_array(input),

        Token::DictStart => {
            let (remaining, dict_obj) = parse_dictionary(input)?;

            // A dictionary followed by `stream` is a stream object
            if let Ok((stream_input, Token::StreamStart)) = token(remaining) {
                let dict = match dict_obj {
                    Object::Dictionary(d) => d,
                    _ => unreachable!("parse_dictionary returns Dictionary"),
                };
                let (final_input, data) = parse_stream_data(stream_input, &dict)?;
                return Ok((
                    final_input,
                    Object::Stream {
                        dict,
                        data: bytes::Bytes::from(data),
                    },
                ));
            }

            Ok((remaining, dict_obj))
        },

        _ => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        ))),
    }
}

/// Parse a full indirect object: `N G obj <object> endobj`.
///
/// Returns the object's reference alongside the object. A missing `endobj`
/// is tolerated (some writers drop it); anything else malformed is an error.
pub fn parse_indirect_object(input: &[u8]) -> IResult<&[u8], (ObjectRef, Object)> {
    let (input, id_tok) = token(input)?;
    let id = match id_tok {
        Token::Integer(i) if i >= 0 => i as u32,
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Digit,
            )))
        },
    };
    let (input, gen_tok) = token(input)?;
    let gen = match gen_tok {
        Token::Integer(g) if g >= 0 => g as u16,
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Digit,
            )))
        },
    };
    let (input, obj_tok) = token(input)?;
    if obj_tok != Token::ObjStart {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        )));
    }

    let (input, object) = parse_object(input)?;

    // endobj may be absent in sloppy files
    let input = match token(input) {
        Ok((rest, Token::ObjEnd)) => rest,
        _ => input,
    };

    Ok((input, (ObjectRef::new(id, gen), object)))
}

/// Parse stream data after the `stream` keyword.
///
/// The keyword must be followed by CRLF or LF (CR alone is accepted with a
/// warning). `/Length` gives the byte count; when it is missing or wrong,
/// fall back to scanning for `endstream`.
fn parse_stream_data<'a>(input: &'a [u8], dict: &Dictionary) -> IResult<&'a [u8], Vec<u8>> {
    let input = if input.starts_with(b"\r\n") {
        &input[2..]
    } else if input.starts_with(b"\n") {
        &input[1..]
    } else if input.starts_with(b"\r") {
        log::warn!("stream keyword followed by CR alone; accepting leniently");
        &input[1..]
    } else {
        log::warn!("no newline after stream keyword; accepting leniently");
        input
    };

    if let Some(length) = dict.get("Length").and_then(Object::as_integer) {
        let length = length as usize;
        if length <= input.len() {
            let data = input[..length].to_vec();
            let remaining = &input[length..];
            // Expect endstream after the payload
            if let Ok((remaining, Token::StreamEnd)) = token(remaining) {
                return Ok((remaining, data));
            }
            log::warn!("/Length {} not followed by endstream; rescanning", length);
        }
    }

    // /Length missing, indirect, or wrong: scan for the keyword
    if let Some(pos) = find_endstream(input) {
        let mut end = pos;
        // Strip the EOL that precedes endstream, it is framing not payload
        if end > 0 && input[end - 1] == b'\n' {
            end -= 1;
        }
        if end > 0 && input[end - 1] == b'\r' {
            end -= 1;
        }
        let data = input[..end].to_vec();
        let (remaining, _) = token(&input[pos..])?;
        return Ok((remaining, data));
    }

    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Eof,
    )))
}

fn find_endstream(input: &[u8]) -> Option<usize> {
    let keyword = b"endstream";
    input
        .windows(keyword.len())
        .position(|window| window == keyword)
}

/// Parse a PDF array: `[ obj1 obj2 ... ]`. Unclosed arrays at EOF return
/// what was collected (lenient mode).
fn parse_array(input: &[u8]) -> IResult<&[u8], Object> {
    let mut objects = Vec::new();
    let mut remaining = input;

    loop {
        match token(remaining) {
            Ok((inp, Token::ArrayEnd)) => return Ok((inp, Object::Array(objects))),
            Ok(_) => match parse_object(remaining) {
                Ok((inp, obj)) => {
                    objects.push(obj);
                    remaining = inp;
                },
                Err(e) => {
                    if remaining.is_empty() {
                        return Ok((remaining, Object::Array(objects)));
                    }
                    return Err(e);
                },
            },
            Err(_) if remaining.is_empty() => return Ok((remaining, Object::Array(objects))),
            Err(e) => return Err(e),
        }
    }
}

/// Parse a PDF dictionary: `<< /Key value ... >>`. Keys must be names.
fn parse_dictionary(input: &[u8]) -> IResult<&[u8], Object> {
    let mut dict = Dictionary::new();
    let mut remaining = input;

    loop {
        match token(remaining) {
            Ok((inp, Token::DictEnd)) => return Ok((inp, Object::Dictionary(dict))),
            Ok((inp, Token::Name(key))) => match parse_object(inp) {
                Ok((inp, value)) => {
                    dict.insert(key, value);
                    remaining = inp;
                },
                Err(e) => {
                    if inp.is_empty() {
                        return Ok((inp, Object::Dictionary(dict)));
                    }
                    return Err(e);
                },
            },
            Ok(_) => {
                if remaining.is_empty() {
                    return Ok((remaining, Object::Dictionary(dict)));
                }
                return Err(nom::Err::Error(nom::error::Error::new(
                    remaining,
                    nom::error::ErrorKind::Tag,
                )));
            },
            Err(_) if remaining.is_empty() => return Ok((remaining, Object::Dictionary(dict))),
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_primitives() {
        assert_eq!(parse_object(b"null").unwrap().1, Object::Null);
        assert_eq!(parse_object(b"true").unwrap().1, Object::Boolean(true));
        assert_eq!(parse_object(b"false").unwrap().1, Object::Boolean(false));
        assert_eq!(parse_object(b"42").unwrap().1, Object::Integer(42));
        assert_eq!(parse_object(b"-2.5").unwrap().1, Object::Real(-2.5));
        assert_eq!(
            parse_object(b"/Type").unwrap().1,
            Object::Name("Type".to_string())
        );
    }

    #[test]
    fn test_parse_literal_string_with_escapes() {
        let (_, obj) = parse_object(b"(Line1\\nLine2)").unwrap();
        assert_eq!(obj, Object::String(b"Line1\nLine2".to_vec()));

        let (_, obj) = parse_object(b"(Open \\( Close \\))").unwrap();
        assert_eq!(obj, Object::String(b"Open ( Close )".to_vec()));

        // \247 is octal for 0xA7
        let (_, obj) = parse_object(b"(Section \\247)").unwrap();
        assert_eq!(obj, Object::String(b"Section \xa7".to_vec()));
    }

    #[test]
    fn test_escape_octal_stops_at_non_octal() {
        // \12 followed by literal '8'
        let (_, obj) = parse_object(b"(Value \\128)").unwrap();
        assert_eq!(obj, Object::String(b"Value \n8".to_vec()));
    }

    #[test]
    fn test_escape_line_continuation() {
        let (_, obj) = parse_object(b"(a long \\\nstring)").unwrap();
        assert_eq!(obj, Object::String(b"a long string".to_vec()));
    }

    #[test]
    fn test_parse_hex_string() {
        let (_, obj) = parse_object(b"<48656C6C6F>").unwrap();
        assert_eq!(obj, Object::String(b"Hello".to_vec()));

        let (_, obj) = parse_object(b"<48 65 6C 6C 6F>").unwrap();
        assert_eq!(obj, Object::String(b"Hello".to_vec()));

        // Odd digit count pads with 0
        let (_, obj) = parse_object(b"<ABC>").unwrap();
        assert_eq!(obj, Object::String(vec![0xAB, 0xC0]));
    }

    #[test]
    fn test_parse_indirect_reference() {
        let (_, obj) = parse_object(b"10 0 R").unwrap();
        assert_eq!(obj, Object::Reference(ObjectRef::new(10, 0)));

        // Bare integer must not eat a lookahead that is not a reference
        let (rest, obj) = parse_object(b"10 /Name").unwrap();
        assert_eq!(obj, Object::Integer(10));
        assert!(rest.starts_with(b" /Name"));
    }

    #[test]
    fn test_parse_array() {
        let (_, obj) = parse_object(b"[ 1 [ 2 3 ] /N (s) 4 0 R ]").unwrap();
        let arr = obj.as_array().unwrap();
        assert_eq!(arr.len(), 5);
        assert_eq!(arr[1].as_array().unwrap().len(), 2);
        assert_eq!(arr[4].as_reference(), Some(ObjectRef::new(4, 0)));
    }

    #[test]
    fn test_parse_dictionary() {
        let (_, obj) = parse_object(b"<< /Type /Page /MediaBox [ 0 0 612 792 ] /Parent 2 0 R >>")
            .unwrap();
        let dict = obj.as_dict().unwrap();
        assert_eq!(dict.get("Type").unwrap().as_name(), Some("Page"));
        assert_eq!(dict.get("MediaBox").unwrap().as_array().unwrap().len(), 4);
        assert_eq!(
            dict.get("Parent").unwrap().as_reference(),
            Some(ObjectRef::new(2, 0))
        );
    }

    #[test]
    fn test_dictionary_preserves_entry_order() {
        let (_, obj) = parse_object(b"<< /Zeta 1 /Alpha 2 /Mid 3 >>").unwrap();
        let keys: Vec<&String> = obj.as_dict().unwrap().keys().collect();
        assert_eq!(keys, ["Zeta", "Alpha", "Mid"]);
    }

    #[test]
    fn test_parse_stream_with_length() {
        let input = b"<< /Length 11 >>\nstream\nHello World\nendstream";
        let (_, obj) = parse_object(input).unwrap();
        match obj {
            Object::Stream { dict, data } => {
                assert_eq!(dict.get("Length").unwrap().as_integer(), Some(11));
                assert_eq!(&data[..], b"Hello World");
            },
            other => panic!("expected stream, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_parse_stream_without_length_scans_endstream() {
        let input = b"<< /Filter /FlateDecode >>\nstream\npayload bytes\nendstream";
        let (_, obj) = parse_object(input).unwrap();
        match obj {
            Object::Stream { data, .. } => assert_eq!(&data[..], b"payload bytes"),
            other => panic!("expected stream, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_parse_indirect_object() {
        let input = b"7 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj";
        let (_, (obj_ref, obj)) = parse_indirect_object(input).unwrap();
        assert_eq!(obj_ref, ObjectRef::new(7, 0));
        assert_eq!(
            obj.as_dict().unwrap().get("Type").unwrap().as_name(),
            Some("Catalog")
        );
    }

    #[test]
    fn test_parse_indirect_object_missing_endobj() {
        let input = b"3 0 obj\n42\n5 0 obj";
        let (rest, (obj_ref, obj)) = parse_indirect_object(input).unwrap();
        assert_eq!(obj_ref, ObjectRef::new(3, 0));
        assert_eq!(obj, Object::Integer(42));
        assert!(!rest.is_empty());
    }

    #[test]
    fn test_parse_dictionary_non_name_key_fails() {
        assert!(parse_object(b"<< 123 /Value >>").is_err());
    }

    #[test]
    fn test_unclosed_structures_are_lenient_at_eof() {
        let (_, obj) = parse_object(b"[ 1 2 3").unwrap();
        assert_eq!(obj.as_array().unwrap().len(), 3);

        let (_, obj) = parse_object(b"<< /Type /Page").unwrap();
        assert_eq!(
            obj.as_dict().unwrap().get("Type").unwrap().as_name(),
            Some("Page")
        );
    }

    #[test]
    fn test_decode_hex_rejects_bad_digit() {
        assert!(decode_hex(b"4Z").is_err());
    }
}
