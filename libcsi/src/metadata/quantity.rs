//! Resource quantity parsing (`2Mi`, `1.5Gi`, `500M`, `1e3`, ...).
//!
//! Only the byte value is needed, so the result is an integer rounded up
//! when the quantity has a fractional byte part.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid quantity {0:?}")]
pub struct QuantityError(pub String);

/// Parse a quantity string into bytes, rounding fractional bytes up.
pub fn parse_quantity(input: &str) -> Result<u64, QuantityError> {
    let err = || QuantityError(input.to_owned());
    let s = input.trim();
    let s = s.strip_prefix('+').unwrap_or(s);

    let number_len = s
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(number_len);
    if number.is_empty() || number == "." {
        return Err(err());
    }

    let (int_part, frac_part) = number.split_once('.').unwrap_or((number, ""));
    if frac_part.contains('.') {
        return Err(err());
    }

    // mantissa / 10^frac_len is the numeric value.
    let digits = format!("{int_part}{frac_part}");
    let mantissa: u128 = digits.parse().map_err(|_| err())?;
    let frac_scale = pow10(frac_part.len() as u32).ok_or_else(err)?;

    let (num, den) = multiplier(suffix).ok_or_else(err)?;

    let numerator = mantissa.checked_mul(num).ok_or_else(err)?;
    let denominator = frac_scale.checked_mul(den).ok_or_else(err)?;
    let bytes = numerator.div_ceil(denominator);
    u64::try_from(bytes).map_err(|_| err())
}

/// Scale factor of a suffix as a `(numerator, denominator)` pair.
fn multiplier(suffix: &str) -> Option<(u128, u128)> {
    let binary = |shift: u32| Some((1u128 << shift, 1));
    let decimal = |exp: u32| pow10(exp).map(|n| (n, 1));
    let fraction = |exp: u32| pow10(exp).map(|d| (1, d));

    match suffix {
        "" => Some((1, 1)),
        "Ki" => binary(10),
        "Mi" => binary(20),
        "Gi" => binary(30),
        "Ti" => binary(40),
        "Pi" => binary(50),
        "Ei" => binary(60),
        "n" => fraction(9),
        "u" => fraction(6),
        "m" => fraction(3),
        "k" => decimal(3),
        "M" => decimal(6),
        "G" => decimal(9),
        "T" => decimal(12),
        "P" => decimal(15),
        "E" => decimal(18),
        _ => {
            let exp = suffix.strip_prefix(['e', 'E'])?;
            let exp: i32 = exp.parse().ok()?;
            if exp >= 0 {
                decimal(exp as u32)
            } else {
                fraction(exp.unsigned_abs())
            }
        }
    }
}

fn pow10(exp: u32) -> Option<u128> {
    10u128.checked_pow(exp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_suffixes() {
        assert_eq!(parse_quantity("2Mi"), Ok(2 * 1024 * 1024));
        assert_eq!(parse_quantity("1Gi"), Ok(1 << 30));
        assert_eq!(parse_quantity("1.5Gi"), Ok(1_610_612_736));
    }

    #[test]
    fn decimal_suffixes_and_plain_numbers() {
        assert_eq!(parse_quantity("500M"), Ok(500_000_000));
        assert_eq!(parse_quantity("2097152"), Ok(2_097_152));
        assert_eq!(parse_quantity("1e3"), Ok(1000));
        assert_eq!(parse_quantity("+10k"), Ok(10_000));
    }

    #[test]
    fn fractional_bytes_round_up() {
        assert_eq!(parse_quantity("1500m"), Ok(2));
        assert_eq!(parse_quantity("0.1"), Ok(1));
        assert_eq!(parse_quantity("1e-3"), Ok(1));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_quantity("").is_err());
        assert!(parse_quantity("Gi").is_err());
        assert!(parse_quantity("1Zi").is_err());
        assert!(parse_quantity("-1Gi").is_err());
        assert!(parse_quantity("1.2.3").is_err());
        assert!(parse_quantity("100000000000Ei").is_err());
    }
}
