// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The in-memory `Value` model (C2): a tagged union covering every shape an
//! RPC argument or result can take, plus the `tokenize`/`detokenize`
//! conversions to and from the wire token stream.

use bytes::Bytes;

use crate::{
    data::token::{decode_token, encode_token, AtomTag, Command, Token},
    error::{Error, Result},
};

/// A decoded RPC value. Integers carry their declared width and signedness
/// so that a round-trip through `tokenize`/`detokenize` reproduces the exact
/// wire encoding (modulo atom-size minimization). `Bytes` is reference
/// counted so cloning a `Value` never copies its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer { signed: bool, width: u8, value: i128 },
    Bytes(Bytes),
    Command(Command),
    List(Vec<Value>),
    Named(Box<Value>, Box<Value>),
    Empty,
}

impl Value {
    pub fn from_u64(value: u64) -> Self {
        Value::Integer { signed: false, width: width_for_unsigned(value), value: value as i128 }
    }

    pub fn from_i64(value: i64) -> Self {
        Value::Integer { signed: true, width: width_for_signed(value), value: value as i128 }
    }

    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Value::Bytes(data.into())
    }

    pub fn named(name: Value, value: Value) -> Self {
        Value::Named(Box::new(name), Box::new(value))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Value::Integer { .. })
    }

    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self {
            Value::Bytes(b) => Ok(b.as_ref()),
            other => Err(Error::Type { expected: "bytes", found: other.type_name() }),
        }
    }

    pub fn as_list(&self) -> Result<&[Value]> {
        match self {
            Value::List(l) => Ok(l),
            other => Err(Error::Type { expected: "list", found: other.type_name() }),
        }
    }

    pub fn as_command(&self) -> Result<Command> {
        match self {
            Value::Command(c) => Ok(*c),
            other => Err(Error::Type { expected: "command", found: other.type_name() }),
        }
    }

    pub fn as_named(&self) -> Result<(&Value, &Value)> {
        match self {
            Value::Named(n, v) => Ok((n, v)),
            other => Err(Error::Type { expected: "named", found: other.type_name() }),
        }
    }

    /// Converts an integer Value to `u64`, failing on negative values or
    /// non-integer variants.
    pub fn as_u64(&self) -> Result<u64> {
        match self {
            Value::Integer { value, .. } if *value >= 0 => Ok(*value as u64),
            Value::Integer { .. } => Err(Error::format("integer value is negative, expected unsigned")),
            other => Err(Error::Type { expected: "integer", found: other.type_name() }),
        }
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Value::Integer { value, .. } => Ok(*value as i64),
            other => Err(Error::Type { expected: "integer", found: other.type_name() }),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Integer { .. } => "integer",
            Value::Bytes(_) => "bytes",
            Value::Command(_) => "command",
            Value::List(_) => "list",
            Value::Named(..) => "named",
            Value::Empty => "empty",
        }
    }
}

fn width_for_unsigned(value: u64) -> u8 {
    match minimal_unsigned_bytes(value).len() {
        0 | 1 => 1,
        2 => 2,
        3 | 4 => 4,
        _ => 8,
    }
}

fn width_for_signed(value: i64) -> u8 {
    match minimal_signed_bytes(value).len() {
        0 | 1 => 1,
        2 => 2,
        3 | 4 => 4,
        _ => 8,
    }
}

fn minimal_unsigned_bytes(value: u64) -> Vec<u8> {
    let full = value.to_be_bytes();
    let mut start = 0;
    while start < 7 && full[start] == 0 {
        start += 1;
    }
    full[start..].to_vec()
}

fn minimal_signed_bytes(value: i64) -> Vec<u8> {
    let full = value.to_be_bytes();
    let mut start = 0;
    while start < 7 {
        let extension = if full[start + 1] & 0x80 != 0 { 0xFFu8 } else { 0x00 };
        if full[start] == extension && (full[start] & 0x80) == (full[start + 1] & 0x80) {
            start += 1;
        } else {
            break;
        }
    }
    full[start..].to_vec()
}

fn atom_tag_for_len(len: usize) -> AtomTag {
    if len <= 15 {
        AtomTag::Short
    } else if len <= 2047 {
        AtomTag::Medium
    } else {
        AtomTag::Long
    }
}

fn encode_integer(signed: bool, value: i128) -> Token {
    let data = if signed { minimal_signed_bytes(value as i64) } else { minimal_unsigned_bytes(value as u64) };

    if data.len() == 1 {
        let v = data[0];
        let fits_tiny = if signed { (-32..=31).contains(&(v as i8)) } else { v <= 63 };
        if fits_tiny {
            let is_negative = signed && (v as i8) < 0;
            return Token::Atom { tag: AtomTag::Tiny, is_byte: false, is_signed: is_negative, data: vec![v & 0x3F] };
        }
    }

    Token::Atom { tag: atom_tag_for_len(data.len()), is_byte: false, is_signed: signed, data }
}

fn decode_integer_atom(is_signed: bool, data: &[u8], tag: AtomTag) -> Value {
    if matches!(tag, AtomTag::Tiny) {
        let v = data.first().copied().unwrap_or(0) & 0x3F;
        return if is_signed {
            let sign_extended = (v | 0xC0) as i8;
            Value::Integer { signed: true, width: 1, value: sign_extended as i128 }
        } else {
            Value::Integer { signed: false, width: 1, value: v as i128 }
        };
    }

    let width = match data.len() {
        0 | 1 => 1,
        2 => 2,
        3 | 4 => 4,
        _ => 8,
    };

    let value: i128 = if is_signed {
        let mut buf = [if data.first().is_some_and(|b| b & 0x80 != 0) { 0xFFu8 } else { 0 }; 8];
        let start = 8 - data.len();
        buf[start..].copy_from_slice(data);
        i64::from_be_bytes(buf) as i128
    } else {
        let mut buf = [0u8; 8];
        let start = 8 - data.len();
        buf[start..].copy_from_slice(data);
        u64::from_be_bytes(buf) as i128
    };

    Value::Integer { signed: is_signed, width, value }
}

/// Encodes a single `Value` to its flat token sequence.
pub fn tokenize(value: &Value) -> Vec<Token> {
    match value {
        Value::Integer { signed, value, .. } => vec![encode_integer(*signed, *value)],
        Value::Bytes(b) => vec![Token::bytes(b.to_vec())],
        Value::Command(c) => vec![Token::Command(*c)],
        Value::Empty => vec![],
        Value::List(items) => {
            let mut out = vec![Token::StartList];
            for item in items {
                out.extend(tokenize(item));
            }
            out.push(Token::EndList);
            out
        },
        Value::Named(name, inner) => {
            let mut out = vec![Token::StartName];
            out.extend(tokenize(name));
            out.extend(tokenize(inner));
            out.push(Token::EndName);
            out
        },
    }
}

/// Decodes a single `Value` from the front of a token slice, returning the
/// value and the unconsumed remainder.
pub fn detokenize(tokens: &[Token]) -> Result<(Value, &[Token])> {
    let (first, rest) = tokens
        .split_first()
        .ok_or_else(|| Error::protocol("expected a token, found end of stream"))?;

    match first {
        Token::Atom { tag, is_byte: true, data, .. } => {
            let _ = tag;
            Ok((Value::Bytes(Bytes::copy_from_slice(data)), rest))
        },
        Token::Atom { tag, is_byte: false, is_signed, data } => Ok((decode_integer_atom(*is_signed, data, *tag), rest)),
        Token::Command(c) => Ok((Value::Command(*c), rest)),
        Token::StartList => {
            let mut items = Vec::new();
            let mut cursor = rest;
            loop {
                match cursor.first() {
                    Some(Token::EndList) => break,
                    None => return Err(Error::protocol("unterminated list: missing END_LIST")),
                    _ => {
                        let (item, next) = detokenize(cursor)?;
                        items.push(item);
                        cursor = next;
                    },
                }
            }
            Ok((Value::List(items), &cursor[1..]))
        },
        Token::EndList => Err(Error::protocol("unexpected END_LIST without matching START_LIST")),
        Token::StartName => {
            let (name, after_name) = detokenize(rest)?;
            let (inner, after_value) = detokenize(after_name)?;
            match after_value.first() {
                Some(Token::EndName) => Ok((Value::named(name, inner), &after_value[1..])),
                _ => Err(Error::protocol("unterminated named value: missing END_NAME")),
            }
        },
        Token::EndName => Err(Error::protocol("unexpected END_NAME without matching START_NAME")),
    }
}

/// Wraps a raw token stream in START_LIST/END_LIST, used when a framed
/// method call is a bare sequence of tokens rather than an outer list.
pub fn surround_with_list(mut stream: Vec<Token>) -> Vec<Token> {
    let mut out = Vec::with_capacity(stream.len() + 2);
    out.push(Token::StartList);
    out.append(&mut stream);
    out.push(Token::EndList);
    out
}

/// Strips the outermost START_LIST/END_LIST pair, if present.
pub fn unsurround_with_list(stream: Vec<Token>) -> Vec<Token> {
    if let [Token::StartList, middle @ .., Token::EndList] = stream.as_slice() {
        middle.to_vec()
    } else {
        stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(v: &Value) -> Value {
        let tokens = tokenize(v);
        let (decoded, rest) = detokenize(&tokens).unwrap();
        assert!(rest.is_empty());
        decoded
    }

    #[test]
    fn zero_encodes_as_tiny_atom() {
        let v = Value::from_u64(0);
        let tokens = tokenize(&v);
        assert_eq!(tokens, vec![Token::Atom { tag: AtomTag::Tiny, is_byte: false, is_signed: false, data: vec![0] }]);
    }

    #[test]
    fn sixty_four_bumps_to_short_atom() {
        let v = Value::from_u64(64);
        let tokens = tokenize(&v);
        match &tokens[0] {
            Token::Atom { tag: AtomTag::Short, data, .. } => assert_eq!(data, &vec![64]),
            other => panic!("expected short atom, got {other:?}"),
        }
    }

    #[test]
    fn thirty_two_k_is_two_byte_short_atom() {
        let v = Value::from_u64(1 << 15);
        let tokens = tokenize(&v);
        match &tokens[0] {
            Token::Atom { tag: AtomTag::Short, data, .. } => assert_eq!(data.len(), 2),
            other => panic!("expected short atom, got {other:?}"),
        }
    }

    #[test]
    fn byte_string_len_16_bumps_to_medium() {
        let v = Value::bytes(vec![0u8; 16]);
        let tokens = tokenize(&v);
        match &tokens[0] {
            Token::Atom { tag: AtomTag::Medium, .. } => {},
            other => panic!("expected medium atom, got {other:?}"),
        }
    }

    #[test]
    fn byte_string_len_2048_bumps_to_long() {
        let v = Value::bytes(vec![0u8; 2048]);
        let tokens = tokenize(&v);
        match &tokens[0] {
            Token::Atom { tag: AtomTag::Long, .. } => {},
            other => panic!("expected long atom, got {other:?}"),
        }
    }

    #[test]
    fn integers_round_trip_value_equality() {
        for v in [0i64, -1, -32, 31, 63, 64, -33, i64::MAX, i64::MIN] {
            assert_eq!(round_trip(&Value::from_i64(v)), Value::from_i64(v).normalize_for_compare());
        }
    }

    #[test]
    fn list_and_named_round_trip() {
        let v = Value::List(vec![
            Value::from_u64(1),
            Value::named(Value::from_u64(3), Value::bytes(vec![0xAA, 0xBB])),
        ]);
        assert_eq!(round_trip(&v), v);
    }

    impl Value {
        /// Test helper: strips type metadata that the tiny-atom ambiguity
        /// legitimately changes on a non-negative round trip (sign-typed but
        /// non-negative integers decode as unsigned).
        fn normalize_for_compare(&self) -> Value {
            match self {
                Value::Integer { value, .. } if *value >= 0 => {
                    Value::Integer { signed: false, width: width_for_unsigned(*value as u64), value: *value }
                },
                other => other.clone(),
            }
        }
    }
}
