//! Canonical PDF syntax for object graph nodes.

use super::objects::{Dictionary, Node};
use crate::error::{PdfError, Result};
use std::io::Write;

/// Serialize a direct value. Streams must be indirect and are rejected.
pub fn to_bytes(node: &Node) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    write_node(&mut out, node)?;
    Ok(out)
}

/// Append the PDF syntax of `node` to `out`.
pub fn write_node(out: &mut Vec<u8>, node: &Node) -> Result<()> {
    match node {
        Node::Null => out.extend_from_slice(b"null"),
        Node::Boolean(true) => out.extend_from_slice(b"true"),
        Node::Boolean(false) => out.extend_from_slice(b"false"),
        Node::Number(n) => write_number(out, *n),
        Node::TextString(s) => write_string(out, s),
        Node::Name(name) => write_name(out, name.as_bytes()),
        Node::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b' ');
                }
                write_node(out, item)?;
            }
            out.push(b']');
        }
        Node::Dictionary(dict) => write_dict(out, dict)?,
        Node::Stream(_) => return Err(PdfError::RequiresIndirectObject),
        Node::Reference(id) => {
            // Vec<u8> writes are infallible.
            let _ = write!(out, "{} {} R", id.number, id.generation);
        }
    }
    Ok(())
}

pub fn write_dict(out: &mut Vec<u8>, dict: &Dictionary) -> Result<()> {
    out.extend_from_slice(b"<<");
    for (key, value) in dict {
        write_name(out, key.as_bytes());
        out.push(b' ');
        write_node(out, value)?;
    }
    out.extend_from_slice(b">>");
    Ok(())
}

/// Integers print without a fraction; reals keep at most six decimals.
pub fn write_number(out: &mut Vec<u8>, n: f64) {
    if !n.is_finite() {
        out.push(b'0');
        return;
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        let _ = write!(out, "{}", n as i64);
        return;
    }
    let text = format!("{:.6}", n);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    match text {
        "" | "-" | "-0" => out.push(b'0'),
        _ => out.extend_from_slice(text.as_bytes()),
    }
}

pub fn write_name(out: &mut Vec<u8>, name: &[u8]) {
    out.push(b'/');
    for &b in name {
        let regular = (0x21..=0x7e).contains(&b)
            && !matches!(
                b,
                b'#' | b'/' | b'%' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}'
            );
        if regular {
            out.push(b);
        } else {
            let _ = write!(out, "#{:02X}", b);
        }
    }
}

/// Literal string syntax, or hex syntax for mostly-binary content.
pub fn write_string(out: &mut Vec<u8>, s: &[u8]) {
    let binary = s
        .iter()
        .filter(|&&b| b >= 0x80 || (b < 0x20 && !matches!(b, b'\n' | b'\r' | b'\t')))
        .count();
    if binary * 4 > s.len() {
        out.push(b'<');
        for &b in s {
            let _ = write!(out, "{:02X}", b);
        }
        out.push(b'>');
        return;
    }

    out.push(b'(');
    for &b in s {
        match b {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(b);
            }
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            0x08 => out.extend_from_slice(b"\\b"),
            0x0c => out.extend_from_slice(b"\\f"),
            0x20..=0x7e => out.push(b),
            _ => {
                let _ = write!(out, "\\{:03o}", b);
            }
        }
    }
    out.push(b')');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectId;

    fn render(node: &Node) -> String {
        String::from_utf8(to_bytes(node).unwrap()).unwrap()
    }

    #[test]
    fn numbers() {
        assert_eq!(render(&Node::Number(12.0)), "12");
        assert_eq!(render(&Node::Number(-3.0)), "-3");
        assert_eq!(render(&Node::Number(0.5)), "0.5");
        assert_eq!(render(&Node::Number(1.0 / 3.0)), "0.333333");
        assert_eq!(render(&Node::Number(-0.0000001)), "0");
    }

    #[test]
    fn names_escape_delimiters() {
        assert_eq!(render(&Node::name("A B")), "/A#20B");
        assert_eq!(render(&Node::name("a#b")), "/a#23b");
        assert_eq!(render(&Node::name("FlateDecode")), "/FlateDecode");
    }

    #[test]
    fn strings_escape_parens() {
        assert_eq!(render(&Node::string(b"a(b)\\c".to_vec())), "(a\\(b\\)\\\\c)");
        assert_eq!(render(&Node::string(vec![0xff, 0x00, 0x10])), "<FF0010>");
    }

    #[test]
    fn dictionary_snapshot() {
        let mut parms = Dictionary::new();
        parms.insert("Predictor", 12);
        parms.insert("Columns", 5);
        let mut dict = Dictionary::new();
        dict.insert("Type", Node::name("XObject"));
        dict.insert("Filter", ObjectId::new(6, 0));
        dict.insert("DecodeParms", parms);
        dict.insert("Decode", vec![Node::Number(1.0), Node::Number(0.0)]);
        insta::assert_snapshot!(
            render(&Node::Dictionary(dict)),
            @"<</Type /XObject/Filter 6 0 R/DecodeParms <</Predictor 12/Columns 5>>/Decode [1 0]>>"
        );
    }

    #[test]
    fn inline_stream_requires_indirect() {
        let stream = crate::model::Stream::new(Dictionary::new(), Vec::new());
        assert!(matches!(
            to_bytes(&Node::from(stream)),
            Err(PdfError::RequiresIndirectObject)
        ));
    }
}
