//! External Term Format subset: the terms audit records are built from.
//!
//! Only the shapes the record schemas need are supported: atoms, binaries,
//! character lists, non-negative integers, and tuples. Encoding always
//! produces the canonical form (binaries for strings, small-atom-utf8 for
//! atoms); decoding additionally accepts the legacy representations other
//! writers may emit (STRING_EXT / integer lists for strings, ATOM_EXT and
//! ATOM_UTF8_EXT for atoms, LARGE_TUPLE_EXT for tuples).

use super::CodecError;

/// Leading version byte of every encoded term.
pub const VERSION: u8 = 131;

pub const SMALL_INTEGER_EXT: u8 = 97;
pub const INTEGER_EXT: u8 = 98;
pub const ATOM_EXT: u8 = 100;
pub const SMALL_TUPLE_EXT: u8 = 104;
pub const LARGE_TUPLE_EXT: u8 = 105;
pub const NIL_EXT: u8 = 106;
pub const STRING_EXT: u8 = 107;
pub const LIST_EXT: u8 = 108;
pub const BINARY_EXT: u8 = 109;
pub const SMALL_BIG_EXT: u8 = 110;
pub const ATOM_UTF8_EXT: u8 = 118;
pub const SMALL_ATOM_UTF8_EXT: u8 = 119;

/// A decoded term.
///
/// `Charlist` is the alternate string representation; the record layer
/// normalizes it away before any value reaches a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    Atom(String),
    Binary(Vec<u8>),
    Charlist(Vec<u8>),
    Int(u64),
    Tuple(Vec<Term>),
}

impl Term {
    pub fn atom(name: &str) -> Term {
        Term::Atom(name.to_string())
    }

    pub fn binary(s: &str) -> Term {
        Term::Binary(s.as_bytes().to_vec())
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a complete message: version byte followed by one term.
pub fn encode_message(term: &Term) -> Vec<u8> {
    let mut out = vec![VERSION];
    encode_term(term, &mut out);
    out
}

fn encode_term(term: &Term, out: &mut Vec<u8>) {
    match term {
        Term::Atom(name) => {
            // Atom names in the schemas are short ASCII identifiers
            out.push(SMALL_ATOM_UTF8_EXT);
            out.push(name.len() as u8);
            out.extend_from_slice(name.as_bytes());
        }
        Term::Binary(bytes) | Term::Charlist(bytes) => {
            // Charlists never survive a decode, but encoding one anyway
            // produces the canonical binary form
            out.push(BINARY_EXT);
            out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
            out.extend_from_slice(bytes);
        }
        Term::Int(n) => encode_int(*n, out),
        Term::Tuple(elements) => {
            out.push(SMALL_TUPLE_EXT);
            out.push(elements.len() as u8);
            for element in elements {
                encode_term(element, out);
            }
        }
    }
}

fn encode_int(n: u64, out: &mut Vec<u8>) {
    if n <= u8::MAX as u64 {
        out.push(SMALL_INTEGER_EXT);
        out.push(n as u8);
    } else if n <= i32::MAX as u64 {
        out.push(INTEGER_EXT);
        out.extend_from_slice(&(n as i32).to_be_bytes());
    } else {
        // Little-endian digits, positive sign
        let digits = n.to_le_bytes();
        let len = 8 - n.leading_zeros() as usize / 8;
        out.push(SMALL_BIG_EXT);
        out.push(len as u8);
        out.push(0);
        out.extend_from_slice(&digits[..len]);
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a complete message, rejecting trailing bytes.
pub fn decode_message(data: &[u8]) -> Result<Term, CodecError> {
    if data.first() != Some(&VERSION) {
        return Err(CodecError::malformed("missing version byte", 0));
    }
    let (term, consumed) = decode_term(data, 1)?;
    if 1 + consumed != data.len() {
        return Err(CodecError::malformed("trailing bytes", 1 + consumed));
    }
    Ok(term)
}

/// Decode a single term from bytes at the given offset.
///
/// Returns the decoded term and the number of bytes consumed.
fn decode_term(data: &[u8], offset: usize) -> Result<(Term, usize), CodecError> {
    let code = *data
        .get(offset)
        .ok_or_else(|| CodecError::malformed("unexpected end of input", offset))?;

    match code {
        SMALL_INTEGER_EXT => {
            let b = read_bytes(data, offset + 1, 1)?;
            Ok((Term::Int(b[0] as u64), 2))
        }

        INTEGER_EXT => {
            let b = read_bytes(data, offset + 1, 4)?;
            let n = i32::from_be_bytes([b[0], b[1], b[2], b[3]]);
            if n < 0 {
                return Err(CodecError::malformed("negative integer", offset));
            }
            Ok((Term::Int(n as u64), 5))
        }

        SMALL_BIG_EXT => {
            let header = read_bytes(data, offset + 1, 2)?;
            let len = header[0] as usize;
            let sign = header[1];
            if sign != 0 {
                return Err(CodecError::malformed("negative integer", offset));
            }
            if len > 8 {
                return Err(CodecError::malformed("integer too large", offset));
            }
            let digits = read_bytes(data, offset + 3, len)?;
            let mut n: u64 = 0;
            for (i, digit) in digits.iter().enumerate() {
                n |= (*digit as u64) << (8 * i);
            }
            Ok((Term::Int(n), 3 + len))
        }

        SMALL_ATOM_UTF8_EXT => {
            let len = read_bytes(data, offset + 1, 1)?[0] as usize;
            let name = read_utf8(data, offset + 2, len)?;
            Ok((Term::Atom(name), 2 + len))
        }

        ATOM_UTF8_EXT | ATOM_EXT => {
            let b = read_bytes(data, offset + 1, 2)?;
            let len = u16::from_be_bytes([b[0], b[1]]) as usize;
            let name = read_utf8(data, offset + 3, len)?;
            Ok((Term::Atom(name), 3 + len))
        }

        BINARY_EXT => {
            let b = read_bytes(data, offset + 1, 4)?;
            let len = u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize;
            let bytes = read_bytes(data, offset + 5, len)?.to_vec();
            Ok((Term::Binary(bytes), 5 + len))
        }

        STRING_EXT => {
            let b = read_bytes(data, offset + 1, 2)?;
            let len = u16::from_be_bytes([b[0], b[1]]) as usize;
            let bytes = read_bytes(data, offset + 3, len)?.to_vec();
            Ok((Term::Charlist(bytes), 3 + len))
        }

        NIL_EXT => Ok((Term::Charlist(Vec::new()), 1)),

        LIST_EXT => {
            // A proper list of byte-sized integers is a charlist
            let b = read_bytes(data, offset + 1, 4)?;
            let len = u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize;
            let mut bytes = Vec::with_capacity(len);
            let mut pos = offset + 5;
            for _ in 0..len {
                let (element, consumed) = decode_term(data, pos)?;
                match element {
                    Term::Int(n) if n <= u8::MAX as u64 => bytes.push(n as u8),
                    _ => {
                        return Err(CodecError::malformed(
                            "list element is not a character",
                            pos,
                        ))
                    }
                }
                pos += consumed;
            }
            let tail = *data
                .get(pos)
                .ok_or_else(|| CodecError::malformed("unexpected end of input", pos))?;
            if tail != NIL_EXT {
                return Err(CodecError::malformed("improper list", pos));
            }
            Ok((Term::Charlist(bytes), pos + 1 - offset))
        }

        SMALL_TUPLE_EXT | LARGE_TUPLE_EXT => {
            let (arity, mut pos) = if code == SMALL_TUPLE_EXT {
                (read_bytes(data, offset + 1, 1)?[0] as usize, offset + 2)
            } else {
                let b = read_bytes(data, offset + 1, 4)?;
                (
                    u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize,
                    offset + 5,
                )
            };
            let mut elements = Vec::with_capacity(arity);
            for _ in 0..arity {
                let (element, consumed) = decode_term(data, pos)?;
                elements.push(element);
                pos += consumed;
            }
            Ok((Term::Tuple(elements), pos - offset))
        }

        _ => Err(CodecError::malformed(
            format!("unknown type code {}", code),
            offset,
        )),
    }
}

fn read_bytes(data: &[u8], offset: usize, len: usize) -> Result<&[u8], CodecError> {
    data.get(offset..offset + len)
        .ok_or_else(|| CodecError::malformed("unexpected end of input", offset))
}

fn read_utf8(data: &[u8], offset: usize, len: usize) -> Result<String, CodecError> {
    let bytes = read_bytes(data, offset, len)?;
    std::str::from_utf8(bytes)
        .map(|s| s.to_string())
        .map_err(|_| CodecError::malformed("invalid utf-8", offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(term: Term) -> Term {
        decode_message(&encode_message(&term)).unwrap()
    }

    #[test]
    fn test_int_encodings() {
        assert_eq!(round_trip(Term::Int(0)), Term::Int(0));
        assert_eq!(round_trip(Term::Int(255)), Term::Int(255));
        assert_eq!(round_trip(Term::Int(70_000)), Term::Int(70_000));
        assert_eq!(
            round_trip(Term::Int(1_700_000_000)),
            Term::Int(1_700_000_000)
        );
        assert_eq!(
            round_trip(Term::Int(u64::MAX / 2)),
            Term::Int(u64::MAX / 2)
        );
    }

    #[test]
    fn test_small_int_wire_shape() {
        assert_eq!(encode_message(&Term::Int(7)), vec![131, SMALL_INTEGER_EXT, 7]);
    }

    #[test]
    fn test_atom_and_binary_round_trip() {
        assert_eq!(round_trip(Term::atom("default")), Term::atom("default"));
        assert_eq!(round_trip(Term::binary("plug")), Term::binary("plug"));
    }

    #[test]
    fn test_charlist_decodes_from_string_ext() {
        let data = vec![131, STRING_EXT, 0, 3, b'a', b'b', b'c'];
        assert_eq!(
            decode_message(&data).unwrap(),
            Term::Charlist(b"abc".to_vec())
        );
    }

    #[test]
    fn test_charlist_decodes_from_list_ext() {
        let data = vec![
            131, LIST_EXT, 0, 0, 0, 2, SMALL_INTEGER_EXT, b'h', SMALL_INTEGER_EXT, b'i', NIL_EXT,
        ];
        assert_eq!(
            decode_message(&data).unwrap(),
            Term::Charlist(b"hi".to_vec())
        );
    }

    #[test]
    fn test_nil_is_empty_charlist() {
        let data = vec![131, NIL_EXT];
        assert_eq!(decode_message(&data).unwrap(), Term::Charlist(Vec::new()));
    }

    #[test]
    fn test_charlist_encodes_as_binary() {
        let encoded = encode_message(&Term::Charlist(b"abc".to_vec()));
        assert_eq!(decode_message(&encoded).unwrap(), Term::binary("abc"));
    }

    #[test]
    fn test_tuple_round_trip() {
        let term = Term::Tuple(vec![Term::atom("package"), Term::binary("plug"), Term::Int(1)]);
        assert_eq!(round_trip(term.clone()), term);
    }

    #[test]
    fn test_rejects_missing_version_byte() {
        assert!(decode_message(&[104, 0]).is_err());
    }

    #[test]
    fn test_rejects_truncated_input() {
        let mut data = encode_message(&Term::binary("hello"));
        data.truncate(data.len() - 2);
        assert!(decode_message(&data).is_err());
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut data = encode_message(&Term::Int(1));
        data.push(0);
        assert!(decode_message(&data).is_err());
    }

    #[test]
    fn test_rejects_unknown_type_code() {
        assert!(decode_message(&[131, 77]).is_err());
    }

    #[test]
    fn test_rejects_negative_integer() {
        let data = vec![131, INTEGER_EXT, 0xFF, 0xFF, 0xFF, 0xFF];
        assert!(decode_message(&data).is_err());
    }
}
