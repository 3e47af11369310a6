//! `ToString(Number)` per spec.md §4.3's abstract-operation list.

/// Render an `f64` the way ECMAScript's `Number::toString` does for
/// ordinary (non-radix) calls: integers print without a decimal point,
/// `NaN`/`Infinity` print their literal names, and very large/small
/// magnitudes switch to exponential notation.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity".to_string() } else { "-Infinity".to_string() };
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if abs >= 1e21 || (abs < 1e-6 && abs > 0.0) {
        return exponential(n);
    }
    if n.fract() == 0.0 && abs < 1e15 {
        return format!("{}", n as i64);
    }
    let mut s = format!("{n}");
    if let Some(pos) = s.find('e') {
        let mantissa = &s[..pos];
        let exp: i32 = s[pos + 1..].parse().unwrap_or(0);
        s = format!("{mantissa}e{}{}", if exp >= 0 { "+" } else { "" }, exp);
    }
    s
}

fn exponential(n: f64) -> String {
    let s = format!("{n:e}");
    let Some(pos) = s.find('e') else { return s };
    let mantissa = &s[..pos];
    let exp: i32 = s[pos + 1..].parse().unwrap_or(0);
    let sign = if exp >= 0 { "+" } else { "" };
    format!("{mantissa}e{sign}{exp}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_print_without_point() {
        assert_eq!(number_to_string(42.0), "42");
        assert_eq!(number_to_string(-7.0), "-7");
        assert_eq!(number_to_string(0.0), "0");
    }

    #[test]
    fn special_values() {
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::INFINITY), "Infinity");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn fractional_prints_decimal() {
        assert_eq!(number_to_string(3.5), "3.5");
    }
}
