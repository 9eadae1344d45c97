//! Numeric and string operator semantics
//!
//! Values are strings; arithmetic parses them into `f64`, computes and
//! formats the result back to NUMERIC DIGITS significant digits.
//! Integral results within range print without a decimal point.

use std::cmp::Ordering;

use crate::eval::machine::activation::{NumericForm, NumericSettings};

/// Parse a string as a number, ignoring surrounding blanks
pub fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim_matches(' ');
    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text).trim_start();
    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(i) => (&unsigned[..i], Some(&unsigned[i + 1..])),
        None => (unsigned, None),
    };

    let mut digits = 0;
    let mut points = 0;
    for c in mantissa.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => points += 1,
            _ => return None,
        }
    }
    if digits == 0 || points > 1 {
        return None;
    }
    if let Some(exponent) = exponent {
        let body = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
        if body.is_empty() || !body.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
    }

    let negative = text.starts_with('-');
    let normalised = format!(
        "{}{}{}",
        if negative { "-" } else { "" },
        mantissa,
        exponent.map(|e| format!("e{}", e)).unwrap_or_default()
    );
    normalised.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Parse a whole number
pub fn parse_whole(text: &str) -> Option<i64> {
    let n = parse_number(text)?;
    if n.fract() == 0.0 && n.abs() < 1e15 {
        Some(n as i64)
    } else {
        None
    }
}

fn round_significant(value: f64, digits: usize) -> f64 {
    if value == 0.0 {
        return 0.0;
    }
    let magnitude = value.abs().log10().floor() as i32;
    let shift = digits as i32 - 1 - magnitude;
    if shift >= 0 {
        let scale = 10f64.powi(shift);
        (value * scale).round() / scale
    } else {
        let scale = 10f64.powi(-shift);
        (value / scale).round() * scale
    }
}

/// Format a number under the given settings
pub fn format_number(value: f64, settings: &NumericSettings) -> String {
    // f64 carries roughly 15 significant decimal digits
    let digits = settings.digits.clamp(1, 15);
    let rounded = round_significant(value, digits);
    if rounded == 0.0 {
        return "0".to_string();
    }

    let magnitude = rounded.abs().log10().floor() as i32;
    if magnitude >= digits as i32 || magnitude < -(2 * digits as i32) {
        return exponential(rounded, magnitude, digits, settings.form);
    }

    if rounded.fract() == 0.0 {
        return format!("{:.0}", rounded);
    }

    let decimals = (digits as i32 - 1 - magnitude).max(0) as usize;
    let fixed = format!("{:.*}", decimals, rounded);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

fn exponential(value: f64, magnitude: i32, digits: usize, form: NumericForm) -> String {
    let exponent = match form {
        NumericForm::Scientific => magnitude,
        NumericForm::Engineering => magnitude.div_euclid(3) * 3,
    };
    let mantissa = value / 10f64.powi(exponent);
    let decimals = digits.saturating_sub(1 + (magnitude - exponent) as usize);
    let mantissa = format!("{:.*}", decimals, mantissa);
    let mantissa = if mantissa.contains('.') {
        mantissa.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        mantissa
    };
    format!(
        "{}E{}{}",
        mantissa,
        if exponent < 0 { "-" } else { "+" },
        exponent.abs()
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticError {
    /// The operand at this position is not a number
    NotANumber(usize),
    DivisionByZero,
}

pub fn numeric_operands(left: &str, right: &str) -> Result<(f64, f64), ArithmeticError> {
    let l = parse_number(left).ok_or(ArithmeticError::NotANumber(0))?;
    let r = parse_number(right).ok_or(ArithmeticError::NotANumber(1))?;
    Ok((l, r))
}

pub fn add(l: f64, r: f64) -> Result<f64, ArithmeticError> {
    Ok(l + r)
}

pub fn subtract(l: f64, r: f64) -> Result<f64, ArithmeticError> {
    Ok(l - r)
}

pub fn multiply(l: f64, r: f64) -> Result<f64, ArithmeticError> {
    Ok(l * r)
}

pub fn divide(l: f64, r: f64) -> Result<f64, ArithmeticError> {
    if r == 0.0 {
        Err(ArithmeticError::DivisionByZero)
    } else {
        Ok(l / r)
    }
}

/// `%`: integer part of the quotient
pub fn integer_divide(l: f64, r: f64) -> Result<f64, ArithmeticError> {
    divide(l, r).map(f64::trunc)
}

/// `//`: remainder with the sign of the dividend
pub fn remainder(l: f64, r: f64) -> Result<f64, ArithmeticError> {
    integer_divide(l, r).map(|q| l - r * q)
}

/// `**`: the exponent must be whole
pub fn power(l: f64, r: f64) -> Result<f64, ArithmeticError> {
    if r.fract() != 0.0 {
        return Err(ArithmeticError::NotANumber(1));
    }
    if l == 0.0 && r < 0.0 {
        return Err(ArithmeticError::DivisionByZero);
    }
    Ok(l.powi(r as i32))
}

/// Non-strict comparison: numeric when both sides are numbers (to
/// DIGITS - FUZZ significant digits), otherwise blank-insensitive
/// string comparison
pub fn compare(left: &str, right: &str, settings: &NumericSettings) -> Ordering {
    if let (Some(l), Some(r)) = (parse_number(left), parse_number(right)) {
        let digits = settings.digits.saturating_sub(settings.fuzz).max(1);
        let difference = round_significant(l - r, 15);
        let scale = l.abs().max(r.abs());
        if difference == 0.0 || (scale > 0.0 && difference.abs() < scale * 10f64.powi(-(digits as i32))) {
            return Ordering::Equal;
        }
        return l.partial_cmp(&r).unwrap_or(Ordering::Equal);
    }

    let l = left.trim_matches(' ');
    let r = right.trim_matches(' ');
    // the shorter is padded with blanks
    let width = l.len().max(r.len());
    let l = format!("{:<width$}", l, width = width);
    let r = format!("{:<width$}", r, width = width);
    l.cmp(&r)
}

/// Strict comparison: exact characters
pub fn strict_compare(left: &str, right: &str) -> Ordering {
    left.cmp(right)
}
