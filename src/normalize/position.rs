//! Position report decoding (uncompressed and base-91 compressed)

use crate::types::Position;
use crate::{FeedError, Result};

/// Length of an uncompressed position: `DDMM.hhN` + table + `DDDMM.hhW` + code
const UNCOMPRESSED_LEN: usize = 19;

/// Length of a compressed position: table + 4 lat + 4 lon + code + `cs` + type
const COMPRESSED_LEN: usize = 13;

/// Decode a position body, returning the position and the trailing comment.
pub(crate) fn decode(body: &str) -> Result<(Position, &str)> {
    match body.chars().next() {
        Some(c) if c.is_ascii_digit() || c == ' ' => decode_uncompressed(body),
        Some(_) => decode_compressed(body),
        None => Err(FeedError::parse_error("position", "empty position body")),
    }
}

fn decode_uncompressed(body: &str) -> Result<(Position, &str)> {
    let head = body
        .get(..UNCOMPRESSED_LEN)
        .filter(|h| h.is_ascii())
        .ok_or_else(|| FeedError::parse_error("position", "uncompressed position too short"))?;
    let bytes = head.as_bytes();

    let latitude = parse_coordinate(&head[0..7], bytes[7], 2, ('N', 'S'), 90.0)?;
    let symbol_table = bytes[8] as char;
    let longitude = parse_coordinate(&head[9..17], bytes[17], 3, ('E', 'W'), 180.0)?;
    let symbol_code = bytes[18] as char;

    let position = Position { latitude, longitude, symbol_table, symbol_code };
    Ok((position, &body[UNCOMPRESSED_LEN..]))
}

/// Parse `DDMM.hh` / `DDDMM.hh` plus hemisphere. Spaces (position ambiguity)
/// read as zeros.
fn parse_coordinate(
    digits: &str,
    hemisphere: u8,
    degree_digits: usize,
    (positive, negative): (char, char),
    limit: f64,
) -> Result<f64> {
    let cleaned: String = digits.chars().map(|c| if c == ' ' { '0' } else { c }).collect();
    let invalid = || FeedError::parse_error("position", format!("invalid coordinate '{digits}'"));

    let degrees: f64 = cleaned.get(..degree_digits).and_then(|d| d.parse().ok()).ok_or_else(invalid)?;
    let minutes: f64 = cleaned.get(degree_digits..).and_then(|m| m.parse().ok()).ok_or_else(invalid)?;
    if !(0.0..60.0).contains(&minutes) {
        return Err(invalid());
    }

    let value = degrees + minutes / 60.0;
    if value > limit {
        return Err(invalid());
    }

    match hemisphere.to_ascii_uppercase() as char {
        c if c == positive => Ok(value),
        c if c == negative => Ok(-value),
        other => Err(FeedError::parse_error("position", format!("invalid hemisphere '{other}'"))),
    }
}

fn decode_compressed(body: &str) -> Result<(Position, &str)> {
    let head = body
        .get(..COMPRESSED_LEN)
        .filter(|h| h.is_ascii())
        .ok_or_else(|| FeedError::parse_error("position", "compressed position too short"))?;
    let bytes = head.as_bytes();

    let symbol_table = bytes[0] as char;
    if !(symbol_table == '/' || symbol_table == '\\' || symbol_table.is_ascii_alphanumeric()) {
        return Err(FeedError::parse_error(
            "position",
            format!("invalid symbol table '{symbol_table}'"),
        ));
    }

    let lat_value = base91(&bytes[1..5])?;
    let lon_value = base91(&bytes[5..9])?;
    let latitude = 90.0 - lat_value / 380_926.0;
    let longitude = -180.0 + lon_value / 190_463.0;
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(FeedError::parse_error("position", "compressed position out of range"));
    }

    let position = Position { latitude, longitude, symbol_table, symbol_code: bytes[9] as char };
    Ok((position, &body[COMPRESSED_LEN..]))
}

fn base91(digits: &[u8]) -> Result<f64> {
    digits.iter().try_fold(0.0, |acc, &b| {
        if !(33..=123).contains(&b) {
            return Err(FeedError::parse_error("position", "invalid base-91 digit"));
        }
        Ok(acc * 91.0 + f64::from(b - 33))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_uncompressed_position() {
        let (pos, comment) = decode("4903.50N/07201.75W-Test comment").unwrap();
        assert!((pos.latitude - 49.058_333).abs() < 1e-5);
        assert!((pos.longitude + 72.029_166).abs() < 1e-5);
        assert_eq!(pos.symbol_table, '/');
        assert_eq!(pos.symbol_code, '-');
        assert_eq!(comment, "Test comment");
    }

    #[test]
    fn ambiguity_spaces_read_as_zero() {
        let (pos, _) = decode("4903.  N/07201.  W-").unwrap();
        assert!((pos.latitude - 49.05).abs() < 1e-9);
    }

    #[test]
    fn decodes_compressed_position() {
        // APRS101 worked example: 49 30N, 72 45W
        let (pos, comment) = decode("/5L!!<*e7>7P[ rest").unwrap();
        assert!((pos.latitude - 49.5).abs() < 1e-3, "lat {}", pos.latitude);
        assert!((pos.longitude + 72.75).abs() < 1e-3, "lon {}", pos.longitude);
        assert_eq!(pos.symbol_code, '>');
        assert_eq!(comment, " rest");
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode("").is_err());
        assert!(decode("4903.50X/07201.75W-").is_err());
        assert!(decode("9903.50N/07201.75W-").is_err());
        assert!(decode("4903.50N/072").is_err());
        assert!(decode("/5L!").is_err());
    }
}
