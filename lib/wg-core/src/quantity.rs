//! Kubernetes resource quantities
//!
//! The API server stores quantities in canonical form, so `0.5` comes back
//! as `500m` and `1024Ki` as `1Mi`. Comparing them needs their value.

enum Scale {
    Decimal(i32),
    Binary(u32),
}

const BINARY_SUFFIXES: [(&str, u32); 6] = [
    ("Ki", 10),
    ("Mi", 20),
    ("Gi", 30),
    ("Ti", 40),
    ("Pi", 50),
    ("Ei", 60),
];

const DECIMAL_SUFFIXES: [(&str, i32); 9] = [
    ("n", -9),
    ("u", -6),
    ("m", -3),
    ("k", 3),
    ("M", 6),
    ("G", 9),
    ("T", 12),
    ("P", 15),
    ("E", 18),
];

/// Value of a quantity such as `500m`, `0.5`, `1Gi` or `1e3` in billionths
/// of its unit. `None` when the string is not a quantity
pub fn parse_quantity(quantity: &str) -> Option<i128> {
    let (number, scale) = split_suffix(quantity.trim());
    let (negative, number) = match number.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, number.strip_prefix('+').unwrap_or(number)),
    };

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }

    let digits: i128 = format!("{}{}", whole, fraction).parse().ok()?;
    let exponent = 9 - i32::try_from(fraction.len()).ok()?;
    let value = match scale {
        Scale::Decimal(power) => shift(digits, exponent.checked_add(power)?)?,
        Scale::Binary(power) => shift(digits.checked_mul(1i128.checked_shl(power)?)?, exponent)?,
    };

    Some(if negative { -value } else { value })
}

/// Whether two quantity strings denote the same amount
pub fn same_quantity(a: &str, b: &str) -> bool {
    a == b || matches!((parse_quantity(a), parse_quantity(b)), (Some(a), Some(b)) if a == b)
}

fn split_suffix(quantity: &str) -> (&str, Scale) {
    for (suffix, power) in BINARY_SUFFIXES {
        if let Some(number) = quantity.strip_suffix(suffix) {
            return (number, Scale::Binary(power));
        }
    }

    // `1e3` is an exponent, a bare `1E` is exa
    if let Some(at) = quantity.rfind(|c| c == 'e' || c == 'E') {
        if let Ok(power) = quantity[at + 1..].parse::<i32>() {
            return (&quantity[..at], Scale::Decimal(power));
        }
    }

    for (suffix, power) in DECIMAL_SUFFIXES {
        if let Some(number) = quantity.strip_suffix(suffix) {
            return (number, Scale::Decimal(power));
        }
    }

    (quantity, Scale::Decimal(0))
}

fn shift(value: i128, exponent: i32) -> Option<i128> {
    let factor = 10i128.checked_pow(exponent.unsigned_abs())?;
    if exponent >= 0 {
        value.checked_mul(factor)
    } else {
        Some(value / factor)
    }
}
