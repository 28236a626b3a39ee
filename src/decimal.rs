//! Fixed-point decimal helpers.
//!
//! Prices and amounts travel through the system as `u64` unit counts at a
//! fixed precision of [`PRECISION`] fractional digits. These helpers convert
//! between the ASCII decimal strings seen on the wire and those unit counts.
//!
//! Conversion always truncates toward zero: fractional digits beyond the
//! requested precision are dropped, never rounded up.
//!
//! # Precision cap
//!
//! With 15 or more fractional digits legitimate amounts no longer fit in a
//! `u64`. Every function here caps the precision at [`MAX_PRECISION`]; larger
//! requests are served as if [`MAX_PRECISION`] had been asked for. Integer
//! overflow wraps instead of panicking, so malformed input yields an
//! unspecified value but never aborts the process.

use thiserror::Error;

/// Fractional digits used for every price and amount inside the core.
pub const PRECISION: u32 = 8;

/// Largest supported precision.
pub const MAX_PRECISION: u32 = 14;

/// `10^PRECISION`, the unit count of `1.0`.
pub const ONE: u64 = 100_000_000;

/// Strict parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DecimalError {
    /// A character other than an ASCII digit or a single `.` was found.
    #[error("invalid character {found:?} at offset {offset}")]
    InvalidCharacter {
        /// Offending character.
        found: char,
        /// Byte offset in the input.
        offset: usize,
    },
    /// The value does not fit in a `u64` at the requested precision.
    #[error("decimal {input:?} overflows u64 at precision {precision}")]
    Overflow {
        /// The rejected input.
        input: String,
        /// Precision the caller asked for.
        precision: u32,
    },
}

#[inline]
fn cap(precision: u32) -> u32 {
    precision.min(MAX_PRECISION)
}

/// Converts a decimal string into a unit count at `precision`.
///
/// Non-digit characters other than the first `.` are skipped. An empty string
/// converts to `0`. Overflow wraps silently; use [`parse_units`] when the
/// input is untrusted and overflow must be reported.
///
/// ```
/// use exchange_core::decimal::to_units;
///
/// assert_eq!(to_units("1.5", 8), 150_000_000);
/// assert_eq!(to_units("0.123456789", 8), 12_345_678);
/// assert_eq!(to_units("", 8), 0);
/// ```
pub fn to_units(value: &str, precision: u32) -> u64 {
    let precision = cap(precision);
    let mut dec: u64 = 0;
    let mut seen_point = false;
    let mut fraction_digits = 0u32;

    for c in value.bytes() {
        match c {
            b'.' if !seen_point => seen_point = true,
            b'0'..=b'9' => {
                if seen_point {
                    if fraction_digits == precision {
                        break;
                    }
                    fraction_digits += 1;
                }
                dec = dec.wrapping_mul(10).wrapping_add(u64::from(c - b'0'));
            }
            _ => {}
        }
    }

    while fraction_digits < precision {
        dec = dec.wrapping_mul(10);
        fraction_digits += 1;
    }
    dec
}

/// Strict variant of [`to_units`]: rejects foreign characters and overflow.
pub fn parse_units(value: &str, precision: u32) -> Result<u64, DecimalError> {
    let precision = cap(precision);
    let overflow = || DecimalError::Overflow {
        input: value.to_string(),
        precision,
    };
    let mut dec: u64 = 0;
    let mut seen_point = false;
    let mut fraction_digits = 0u32;

    for (offset, c) in value.char_indices() {
        match c {
            '.' if !seen_point => seen_point = true,
            '0'..='9' => {
                if seen_point {
                    if fraction_digits == precision {
                        continue;
                    }
                    fraction_digits += 1;
                }
                let digit = u64::from(c as u8 - b'0');
                dec = dec
                    .checked_mul(10)
                    .and_then(|d| d.checked_add(digit))
                    .ok_or_else(overflow)?;
            }
            found => return Err(DecimalError::InvalidCharacter { found, offset }),
        }
    }

    while fraction_digits < precision {
        dec = dec.checked_mul(10).ok_or_else(overflow)?;
        fraction_digits += 1;
    }
    Ok(dec)
}

/// Renders a unit count as a decimal string with exactly `precision`
/// fractional digits.
///
/// ```
/// use exchange_core::decimal::from_units;
///
/// assert_eq!(from_units(u64::MAX, 8), "184467440737.09551615");
/// assert_eq!(from_units(5, 8), "0.00000005");
/// assert_eq!(from_units(42, 0), "42");
/// ```
pub fn from_units(units: u64, precision: u32) -> String {
    let precision = cap(precision) as usize;
    // 20 digits for u64::MAX, a leading zero and the point.
    let mut buf = [0u8; 40];
    let mut pos = buf.len();
    let mut rest = units;
    let mut written = 0usize;

    while rest > 0 || written <= precision {
        if written == precision && precision > 0 {
            pos -= 1;
            buf[pos] = b'.';
        }
        pos -= 1;
        buf[pos] = b'0' + (rest % 10) as u8;
        rest /= 10;
        written += 1;
    }

    buf[pos..].iter().map(|&b| b as char).collect()
}

/// Truncates `units` (at [`PRECISION`]) to `precision` fractional digits.
pub fn truncate_units(units: u64, precision: u32) -> u64 {
    let precision = precision.min(PRECISION);
    let step = 10u64.pow(PRECISION - precision);
    units - units % step
}

/// Renders `units` (at [`PRECISION`]) with `precision` fractional digits,
/// truncating the rest.
///
/// ```
/// use exchange_core::decimal::format_units;
///
/// assert_eq!(format_units(123_456_789, 2), "1.23");
/// assert_eq!(format_units(123_456_789, 0), "1");
/// ```
pub fn format_units(units: u64, precision: u32) -> String {
    let precision = precision.min(PRECISION);
    let scaled = units / 10u64.pow(PRECISION - precision);
    from_units(scaled, precision)
}

/// Multiplies two unit counts at [`PRECISION`], truncating the product.
///
/// Saturates at `u64::MAX`.
#[inline]
pub fn mul_units(a: u64, b: u64) -> u64 {
    let product = u128::from(a) * u128::from(b) / u128::from(ONE);
    u64::try_from(product).unwrap_or(u64::MAX)
}
