//! PDF lexer (tokenizer).
//!
//! Low-level tokenization of PDF byte streams: numbers, strings, names,
//! keywords, and delimiters. Whitespace (space, \t, \r, \n, \0, \f) and
//! comments (% to EOL) are skipped between tokens.
//!
//! Escape sequences in literal strings are NOT decoded here; that happens at
//! parser level. `#XX` escapes in names ARE decoded here, per spec.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while},
    character::complete::{char, digit1, one_of},
    combinator::{map, opt, value},
    sequence::{delimited, preceded},
    IResult,
};

/// Token types recognized by the PDF lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Integer number (e.g., 42, -123)
    Integer(i64),
    /// Real (floating-point) number (e.g., 3.14, -.5)
    Real(f64),
    /// Literal string bytes (content of "(Hello)"), escapes undecoded
    LiteralString(&'a [u8]),
    /// Hexadecimal string bytes (content of "<48656C6C6F>"), undecoded
    HexString(&'a [u8]),
    /// Name (e.g., "Type" from "/Type"), #XX escapes decoded
    Name(String),
    /// Boolean true keyword
    True,
    /// Boolean false keyword
    False,
    /// Null keyword
    Null,
    /// Array start delimiter [
    ArrayStart,
    /// Array end delimiter ]
    ArrayEnd,
    /// Dictionary start delimiter <<
    DictStart,
    /// Dictionary end delimiter >>
    DictEnd,
    /// Indirect object start keyword "obj"
    ObjStart,
    /// Indirect object end keyword "endobj"
    ObjEnd,
    /// Stream start keyword "stream"
    StreamStart,
    /// Stream end keyword "endstream"
    StreamEnd,
    /// Reference keyword "R" (used in "10 0 R")
    R,
}

/// Check whether a byte is PDF whitespace (spec Table 3.1).
pub fn is_pdf_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C)
}

fn whitespace(input: &[u8]) -> IResult<&[u8], ()> {
    let (remaining, ws) = take_while(is_pdf_whitespace)(input)?;
    if ws.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Space,
        )));
    }
    Ok((remaining, ()))
}

fn comment(input: &[u8]) -> IResult<&[u8], ()> {
    value((), preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n')))(input)
}

/// Skip all whitespace and comments before a token.
fn skip_ws(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let mut remaining = input;
    loop {
        if let Ok((rest, _)) = whitespace(remaining) {
            remaining = rest;
            continue;
        }
        if let Ok((rest, _)) = comment(remaining) {
            remaining = rest;
            continue;
        }
        break;
    }
    Ok((remaining, input))
}

/// Parse an integer or real number.
///
/// PDF allows leading +/- and numbers starting or ending with a decimal
/// point: 42, -123, +17, 3.14, .5, 0., -.002.
fn parse_number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (input, sign) = opt(one_of("+-"))(input)?;
    let (input, int_part) = opt(digit1)(input)?;
    let (input, frac_part) = opt(preceded(char('.'), opt(digit1)))(input)?;

    if int_part.is_none() && frac_part.is_none() {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Digit,
        )));
    }

    let digit_err = || nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit));

    if frac_part.is_some() {
        let mut num_str = String::new();
        if sign == Some('-') {
            num_str.push('-');
        }
        match int_part {
            Some(int) => num_str.push_str(std::str::from_utf8(int).map_err(|_| digit_err())?),
            None => num_str.push('0'),
        }
        num_str.push('.');
        if let Some(Some(frac)) = frac_part {
            num_str.push_str(std::str::from_utf8(frac).map_err(|_| digit_err())?);
        } else {
            num_str.push('0');
        }
        let num: f64 = num_str.parse().map_err(|_| digit_err())?;
        Ok((input, Token::Real(num)))
    } else {
        let int_bytes = int_part.ok_or_else(digit_err)?;
        let int_str = std::str::from_utf8(int_bytes).map_err(|_| digit_err())?;
        let mut num: i64 = int_str.parse().map_err(|_| digit_err())?;
        if sign == Some('-') {
            num = -num;
        }
        Ok((input, Token::Integer(num)))
    }
}

/// Parse a literal string enclosed in parentheses.
///
/// Handles balanced nested parentheses and skips over escape sequences
/// (including octal \ddd) so an escaped paren never closes the string.
fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (remaining, _) = char('(')(input)?;
    let mut depth = 1;
    let mut pos = 0;

    while depth > 0 && pos < remaining.len() {
        match remaining[pos] {
            b'\\' => {
                pos += 1;
                if pos < remaining.len() {
                    if remaining[pos].is_ascii_digit() {
                        // Octal escape, 1-3 digits
                        let mut digits = 0;
                        while digits < 3 && pos < remaining.len() && remaining[pos].is_ascii_digit()
                        {
                            pos += 1;
                            digits += 1;
                        }
                    } else {
                        pos += 1;
                    }
                }
            },
            b'(' => {
                depth += 1;
                pos += 1;
            },
            b')' => {
                depth -= 1;
                pos += 1;
            },
            _ => pos += 1,
        }
    }

    if depth != 0 {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        )));
    }

    let content = &remaining[..pos - 1];
    Ok((&remaining[pos..], Token::LiteralString(content)))
}

/// Parse a hexadecimal string enclosed in angle brackets.
///
/// Must not be confused with a dictionary start (`<<`). Whitespace between
/// digits is preserved; decoding happens at parser level.
fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    if input.len() >= 2 && input[0] == b'<' && input[1] == b'<' {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        )));
    }
    delimited(
        char('<'),
        map(
            take_while(|c: u8| c.is_ascii_hexdigit() || c.is_ascii_whitespace()),
            Token::HexString,
        ),
        char('>'),
    )(input)
}

/// Decode #XX escape sequences in PDF names.
///
/// `/A#20B` becomes `A B`. Invalid sequences are preserved literally.
pub fn decode_name_escapes(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '#' {
            let hex1 = chars.next();
            let hex2 = chars.next();
            if let (Some(h1), Some(h2)) = (hex1, hex2) {
                let hex_str = format!("{}{}", h1, h2);
                if let Ok(byte) = u8::from_str_radix(&hex_str, 16) {
                    result.push(byte as char);
                    continue;
                }
                result.push('#');
                result.push(h1);
                result.push(h2);
            } else if let Some(h1) = hex1 {
                result.push('#');
                result.push(h1);
            } else {
                result.push('#');
            }
        } else {
            result.push(ch);
        }
    }
    result
}

/// Parse a name starting with /.
fn parse_name(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    preceded(
        char('/'),
        map(
            take_while(|c: u8| {
                !is_pdf_whitespace(c)
                    && !matches!(
                        c,
                        b'/' | b'%' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}'
                    )
            }),
            |bytes| {
                let name_str = std::str::from_utf8(bytes).unwrap_or("");
                Token::Name(decode_name_escapes(name_str))
            },
        ),
    )(input)
}

/// Parse PDF keywords and delimiters.
///
/// Order matters: multi-character keywords before single characters,
/// `endstream` before `stream`, `<<` before `<`.
fn parse_keyword(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    alt((
        value(Token::False, tag(b"false")),
        value(Token::True, tag(b"true")),
        value(Token::Null, tag(b"null")),
        value(Token::ObjEnd, tag(b"endobj")),
        value(Token::ObjStart, tag(b"obj")),
        value(Token::StreamEnd, tag(b"endstream")),
        value(Token::StreamStart, tag(b"stream")),
        value(Token::DictStart, tag(b"<<")),
        value(Token::DictEnd, tag(b">>")),
        value(Token::ArrayStart, tag(b"[")),
        value(Token::ArrayEnd, tag(b"]")),
        value(Token::R, tag(b"R")),
    ))(input)
}

/// Parse a single PDF token, skipping leading whitespace and comments.
///
/// Keywords are tried first (so `true` is not lexed as a name fragment),
/// then names, numbers, and strings.
pub fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (input, _) = skip_ws(input)?;
    alt((
        parse_keyword,
        parse_name,
        parse_number,
        parse_literal_string,
        parse_hex_string,
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_integers() {
        assert_eq!(token(b"42"), Ok((&b""[..], Token::Integer(42))));
        assert_eq!(token(b"-123"), Ok((&b""[..], Token::Integer(-123))));
        assert_eq!(token(b"0"), Ok((&b""[..], Token::Integer(0))));
    }

    #[test]
    fn test_parse_reals() {
        assert_eq!(token(b"-2.5"), Ok((&b""[..], Token::Real(-2.5))));
        assert_eq!(token(b".5"), Ok((&b""[..], Token::Real(0.5))));
        assert_eq!(token(b"5."), Ok((&b""[..], Token::Real(5.0))));
    }

    #[test]
    fn test_parse_literal_string() {
        assert_eq!(
            token(b"(Hello World)"),
            Ok((&b""[..], Token::LiteralString(b"Hello World")))
        );
        assert_eq!(
            token(b"(a (nested) b)"),
            Ok((&b""[..], Token::LiteralString(b"a (nested) b")))
        );
        assert_eq!(token(b"()"), Ok((&b""[..], Token::LiteralString(b""))));
    }

    #[test]
    fn test_parse_literal_string_escaped_paren() {
        assert_eq!(
            token(b"(Open \\( Close \\))"),
            Ok((&b""[..], Token::LiteralString(b"Open \\( Close \\)")))
        );
    }

    #[test]
    fn test_parse_hex_string() {
        assert_eq!(
            token(b"<48656C6C6F>"),
            Ok((&b""[..], Token::HexString(b"48656C6C6F")))
        );
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(
            token(b"/Type"),
            Ok((&b""[..], Token::Name("Type".to_string())))
        );
        assert_eq!(
            token(b"/A#20B"),
            Ok((&b""[..], Token::Name("A B".to_string())))
        );
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(token(b"true"), Ok((&b""[..], Token::True)));
        assert_eq!(token(b"false"), Ok((&b""[..], Token::False)));
        assert_eq!(token(b"null"), Ok((&b""[..], Token::Null)));
        assert_eq!(token(b"obj"), Ok((&b""[..], Token::ObjStart)));
        assert_eq!(token(b"endobj"), Ok((&b""[..], Token::ObjEnd)));
        assert_eq!(token(b"stream"), Ok((&b""[..], Token::StreamStart)));
        assert_eq!(token(b"endstream"), Ok((&b""[..], Token::StreamEnd)));
    }

    #[test]
    fn test_parse_delimiters() {
        assert_eq!(token(b"<<"), Ok((&b""[..], Token::DictStart)));
        assert_eq!(token(b">>"), Ok((&b""[..], Token::DictEnd)));
        assert_eq!(token(b"["), Ok((&b""[..], Token::ArrayStart)));
        assert_eq!(token(b"]"), Ok((&b""[..], Token::ArrayEnd)));
        assert_eq!(token(b"R"), Ok((&b""[..], Token::R)));
    }

    #[test]
    fn test_skips_whitespace_and_comments() {
        assert_eq!(
            token(b"  % a comment\n  42"),
            Ok((&b""[..], Token::Integer(42)))
        );
    }

    #[test]
    fn test_dict_start_not_hex_string() {
        // << must lex as DictStart even though < opens hex strings
        let (rest, tok) = token(b"<< /Type /Sig >>").unwrap();
        assert_eq!(tok, Token::DictStart);
        assert!(rest.starts_with(b" /Type"));
    }

    #[test]
    fn test_decode_name_escapes() {
        assert_eq!(decode_name_escapes("A#20B#23C"), "A B#C");
        assert_eq!(decode_name_escapes("Type"), "Type");
        assert_eq!(decode_name_escapes("A#"), "A#");
    }
}
