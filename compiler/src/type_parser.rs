use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ParseError;
use crate::pattern::find_one_or_no_match;
use crate::tokenizer::Token;
use crate::types::{ComparableScalar, ComparableType, CustomType, DataType, Scalar};
use crate::utils::quote;

lazy_static! {
    static ref SCALAR: Regex = Regex::new(
        r"^(byte|bool|uint8|uint16|uint32|uint64|int8|int16|int32|int64|float32|float64|string|timestamp|uuid)$"
    ).unwrap();
    static ref CUSTOM: Regex = Regex::new(
        r"^((?:[A-Za-z][A-Za-z0-9_]*)(?:\.[A-Za-z][A-Za-z0-9_]*)*)$"
    ).unwrap();
    static ref MAP_ANGLE: Regex = Regex::new(r"(?s)^map\s*<\s*([^,<>\s]+)\s*,\s*(.+?)\s*>$").unwrap();
    static ref MAP_BRACKET: Regex = Regex::new(r"(?s)^map\s*\[\s*([^\[\]\s]+)\s*\]\s*(.+)$").unwrap();
    static ref LIST_ANGLE: Regex = Regex::new(r"(?s)^list\s*<\s*(.+?)\s*>$").unwrap();
    static ref LIST_BRACKET: Regex = Regex::new(r"(?s)^\[\s*\]\s*(.+)$").unwrap();
}

/// Parses a field, argument or return type.
///
/// Accepts scalars, dotted custom names, `list<T>` / `[]T` and
/// `map<K, T>` / `map[K]T`, nested to any depth. Map keys go through
/// [`parse_comparable_type`].
pub fn parse_data_type(input: &Token) -> Result<DataType, ParseError> {
    if let Some(m) = find_one_or_no_match(&SCALAR, input)? {
        return match Scalar::from_keyword(m.text(1)) {
            Some(scalar) => Ok(DataType::Scalar(scalar)),
            None => Err(ParseError::grammar(format!("unknown scalar type {}", quote(m.text(1))), input)),
        };
    }

    if let Some(m) = find_one_or_no_match(&CUSTOM, input)? {
        if let Some(name) = m.group(1) {
            return Ok(DataType::Custom(custom_type(name)));
        }
    }

    for re in [&*MAP_ANGLE, &*MAP_BRACKET] {
        if let Some(m) = find_one_or_no_match(re, input)? {
            if let (Some(key), Some(value)) = (m.group(1), m.group(2)) {
                let key = parse_comparable_type(key)?;
                let value = parse_data_type(value)?;
                return Ok(DataType::Map(key, Box::new(value)));
            }
        }
    }

    for re in [&*LIST_ANGLE, &*LIST_BRACKET] {
        if let Some(m) = find_one_or_no_match(re, input)? {
            if let Some(element) = m.group(1) {
                return Ok(DataType::List(Box::new(parse_data_type(element)?)));
            }
        }
    }

    Err(ParseError::grammar(format!("invalid data type {}", quote(&input.content)), input))
}

/// Parses a type that may serve as a map key, typedef target or const type.
pub fn parse_comparable_type(input: &Token) -> Result<ComparableType, ParseError> {
    if let Some(m) = find_one_or_no_match(&SCALAR, input)? {
        return match ComparableScalar::from_keyword(m.text(1)) {
            Some(scalar) => Ok(ComparableType::Scalar(scalar)),
            None => Err(ParseError::semantic(
                format!("type {} is not comparable", quote(m.text(1))),
                input,
            )),
        };
    }

    if let Some(m) = find_one_or_no_match(&CUSTOM, input)? {
        if let Some(name) = m.group(1) {
            return Ok(ComparableType::Custom(custom_type(name)));
        }
    }

    Err(ParseError::grammar(format!("invalid comparable type {}", quote(&input.content)), input))
}

/// Splits `a.b.Name` into package `a.b` and name `Name`.
fn custom_type(token: &Token) -> CustomType {
    let (package, name) = match token.content.rsplit_once('.') {
        Some((package, name)) => (package.to_string(), name.to_string()),
        None => (String::new(), token.content.clone()),
    };
    CustomType {
        name,
        package,
        imported: false,
        token: token.clone(),
    }
}
