use lazy_static::lazy_static;
use regex::Regex;
use uuid::Uuid;

use crate::types::ComparableScalar;
use crate::utils::quote;

lazy_static! {
    static ref QUOTED_STRING: Regex = Regex::new(r#"^"[^"\\]*(?:\\.[^"\\]*)*"$"#).unwrap();
}

/// Checks that `value` is a valid literal of type `ty`.
///
/// Integers are decimal or `0x`-prefixed hexadecimal and must fit the declared
/// width. `float32` literals must stay finite once narrowed. Strings must be
/// double-quoted with backslash escapes. UUIDs may be bare or quoted.
pub fn validate_literal(ty: ComparableScalar, value: &str) -> Result<(), String> {
    match ty {
        ComparableScalar::UInt8   => check_unsigned(ty, value, u64::from(u8::MAX)),
        ComparableScalar::UInt16  => check_unsigned(ty, value, u64::from(u16::MAX)),
        ComparableScalar::UInt32  => check_unsigned(ty, value, u64::from(u32::MAX)),
        ComparableScalar::UInt64  => check_unsigned(ty, value, u64::MAX),
        ComparableScalar::Int8    => check_signed(ty, value, i64::from(i8::MIN), i64::from(i8::MAX)),
        ComparableScalar::Int16   => check_signed(ty, value, i64::from(i16::MIN), i64::from(i16::MAX)),
        ComparableScalar::Int32   => check_signed(ty, value, i64::from(i32::MIN), i64::from(i32::MAX)),
        ComparableScalar::Int64   => check_signed(ty, value, i64::MIN, i64::MAX),
        ComparableScalar::Float32 => check_float(ty, value, true),
        ComparableScalar::Float64 => check_float(ty, value, false),
        ComparableScalar::String  => {
            if QUOTED_STRING.is_match(value) {
                Ok(())
            } else {
                Err(format!("invalid string literal {}", value))
            }
        }
        ComparableScalar::Uuid => {
            let unquoted = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);
            Uuid::parse_str(unquoted)
                .map(|_| ())
                .map_err(|e| format!("invalid uuid literal {}: {}", quote(value), e))
        }
    }
}

fn check_unsigned(ty: ComparableScalar, value: &str, max: u64) -> Result<(), String> {
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    }
    .map_err(|e| format!("invalid {} literal {}: {}", ty.keyword(), quote(value), e))?;

    if parsed > max {
        return Err(format!("value {} out of range for {}", value, ty.keyword()));
    }
    Ok(())
}

fn check_signed(ty: ComparableScalar, value: &str, min: i64, max: i64) -> Result<(), String> {
    let parsed = match value.strip_prefix("0x") {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => value.parse::<i64>(),
    }
    .map_err(|e| format!("invalid {} literal {}: {}", ty.keyword(), quote(value), e))?;

    if parsed < min || parsed > max {
        return Err(format!("value {} out of range for {}", value, ty.keyword()));
    }
    Ok(())
}

fn check_float(ty: ComparableScalar, value: &str, narrow: bool) -> Result<(), String> {
    let parsed = value
        .parse::<f64>()
        .map_err(|e| format!("invalid {} literal {}: {}", ty.keyword(), quote(value), e))?;

    let finite = if narrow { (parsed as f32).is_finite() } else { parsed.is_finite() };
    if !finite && !is_non_finite_spelling(value) {
        return Err(format!("value {} out of range for {}", value, ty.keyword()));
    }
    Ok(())
}

/// `inf`, `infinity` and `nan` spellings, which name a non-finite value on purpose.
fn is_non_finite_spelling(value: &str) -> bool {
    let unsigned = value.strip_prefix(&['+', '-'][..]).unwrap_or(value);
    ["inf", "infinity", "nan"]
        .iter()
        .any(|spelling| unsigned.eq_ignore_ascii_case(spelling))
}
