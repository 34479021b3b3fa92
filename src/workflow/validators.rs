//! Built-in field validators
//!
//! Every validator is a pure `raw -> Result<FieldValue, reason>` function.
//! Catalogs refer to them by `kind`; see [`ValidatorSpec`].

use super::step::{FieldValue, Money, Validator};
use crate::text::fold;
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));

const IDENTIFIER_MAX_LEN: usize = 64;
const PHONE_DIGITS: std::ops::RangeInclusive<usize> = 10..=13;
const CURRENCY_PREFIXES: [&str; 3] = ["R$", "$", "€"];

/// One accepted answer of a `choice` validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub value: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credit_cost: Option<u32>,
}

/// Validator reference as written in a workflow catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidatorSpec {
    NonEmpty {
        #[serde(default)]
        max_len: Option<usize>,
    },
    Identifier,
    Email,
    Phone,
    Money,
    Date,
    Choice {
        options: Vec<ChoiceOption>,
    },
    TaxId,
}

impl ValidatorSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            ValidatorSpec::NonEmpty { .. } => "non_empty",
            ValidatorSpec::Identifier => "identifier",
            ValidatorSpec::Email => "email",
            ValidatorSpec::Phone => "phone",
            ValidatorSpec::Money => "money",
            ValidatorSpec::Date => "date",
            ValidatorSpec::Choice { .. } => "choice",
            ValidatorSpec::TaxId => "tax_id",
        }
    }

    /// Build the validator this entry describes
    pub fn build(self) -> Validator {
        let kind = self.kind();
        match self {
            ValidatorSpec::NonEmpty { max_len } => Validator::new(kind, move |raw| non_empty(raw, max_len)),
            ValidatorSpec::Identifier => Validator::new(kind, identifier),
            ValidatorSpec::Email => Validator::new(kind, email),
            ValidatorSpec::Phone => Validator::new(kind, phone),
            ValidatorSpec::Money => Validator::new(kind, |raw| parse_money(raw).map(FieldValue::Money)),
            ValidatorSpec::Date => Validator::new(kind, |raw| parse_date(raw).map(FieldValue::Date)),
            ValidatorSpec::Choice { options } => Validator::new(kind, move |raw| choice(raw, &options)),
            ValidatorSpec::TaxId => Validator::new(kind, tax_id),
        }
    }
}

pub fn non_empty(raw: &str, max_len: Option<usize>) -> Result<FieldValue, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err("This can't be empty.".to_string());
    }
    if let Some(max) = max_len {
        if value.chars().count() > max {
            return Err(format!("Please keep it under {max} characters."));
        }
    }
    Ok(FieldValue::text(value))
}

pub fn identifier(raw: &str) -> Result<FieldValue, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err("Please enter an id.".to_string());
    }
    if value.chars().count() > IDENTIFIER_MAX_LEN {
        return Err(format!("Ids are at most {IDENTIFIER_MAX_LEN} characters."));
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err("Ids may only contain letters, digits, '-' and '_'.".to_string());
    }
    Ok(FieldValue::text(value))
}

pub fn email(raw: &str) -> Result<FieldValue, String> {
    let value = raw.trim().to_lowercase();
    if EMAIL_RE.is_match(&value) {
        Ok(FieldValue::Text(value))
    } else {
        Err("That doesn't look like an email address (name@example.com).".to_string())
    }
}

pub fn phone(raw: &str) -> Result<FieldValue, String> {
    let compact: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();
    let (plus, digits) = match compact.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", compact.as_str()),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err("Phone numbers may only contain digits, spaces, '-', '(' and ')'.".to_string());
    }
    if !PHONE_DIGITS.contains(&digits.len()) {
        return Err("Enter the number with area code, e.g. (11) 98765-4321.".to_string());
    }
    Ok(FieldValue::Text(format!("{plus}{digits}")))
}

/// Parse a positive currency amount.
///
/// The last `.` or `,` is the decimal separator when one or two digits
/// follow it; with exactly three digits after it it is a thousands
/// separator. Any other grouping is rejected.
pub fn parse_money(raw: &str) -> Result<Money, String> {
    let mut text = raw.trim();
    for prefix in CURRENCY_PREFIXES {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest.trim_start();
            break;
        }
    }
    let text: String = text.chars().filter(|c| !c.is_whitespace()).collect();

    if text.starts_with('-') {
        return Err("The amount must be greater than zero.".to_string());
    }
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') {
        return Err("Enter an amount like 150.00.".to_string());
    }

    let decimal_separator = text.chars().rev().find(|c| matches!(c, '.' | ','));
    let (integer, fraction, decimal_separator) = match text.rsplit_once(['.', ',']) {
        Some((int, frac)) if frac.len() == 1 || frac.len() == 2 => (int, frac, decimal_separator),
        Some((_, frac)) if frac.len() == 3 => (text.as_str(), "", None),
        Some(_) => return Err("Use at most two decimal places.".to_string()),
        None => (text.as_str(), "", None),
    };

    let integer_digits = grouped_digits(integer, decimal_separator)?;
    if integer_digits.is_empty() && fraction.is_empty() {
        return Err("Enter an amount like 150.00.".to_string());
    }

    let too_large = || "That amount is too large.".to_string();
    let mut units: i64 = 0;
    for digit in integer_digits.chars().filter_map(|c| c.to_digit(10)) {
        units = units
            .checked_mul(10)
            .and_then(|u| u.checked_add(i64::from(digit)))
            .ok_or_else(too_large)?;
    }
    let mut cents: i64 = 0;
    for (position, digit) in fraction.chars().filter_map(|c| c.to_digit(10)).enumerate() {
        let scale = if position == 0 { 10 } else { 1 };
        cents += i64::from(digit) * scale;
    }
    let total = units
        .checked_mul(100)
        .and_then(|u| u.checked_add(cents))
        .ok_or_else(too_large)?;

    if total <= 0 {
        return Err("The amount must be greater than zero.".to_string());
    }
    Ok(Money::from_cents(total))
}

/// Digits of the integer part. Thousands groups must use one separator,
/// different from the decimal one, with a leading group of 1 to 3 digits
/// (not starting with 0) followed by groups of exactly 3.
fn grouped_digits(integer: &str, decimal_separator: Option<char>) -> Result<String, String> {
    let bad_grouping = || "Check the thousands separators, e.g. 1.234,56 or 1,234.56.".to_string();
    let mut separators = integer.chars().filter(|c| matches!(c, '.' | ','));
    let Some(separator) = separators.next() else {
        return Ok(integer.to_string());
    };
    if separators.any(|c| c != separator) || Some(separator) == decimal_separator {
        return Err(bad_grouping());
    }

    let mut groups = integer.split(separator);
    let leading = groups.next().unwrap_or_default();
    if leading.is_empty() || leading.len() > 3 || leading.starts_with('0') {
        return Err(bad_grouping());
    }
    let mut digits = leading.to_string();
    for group in groups {
        if group.len() != 3 {
            return Err(bad_grouping());
        }
        digits.push_str(group);
    }
    Ok(digits)
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    let value = raw.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%d/%m/%Y"))
        .map_err(|_| "Use a date like 2025-01-31 or 31/01/2025.".to_string())
}

pub fn choice(raw: &str, options: &[ChoiceOption]) -> Result<FieldValue, String> {
    let answer = fold(raw);
    let matched = options.iter().find(|option| {
        fold(&option.value) == answer || option.aliases.iter().any(|alias| fold(alias) == answer)
    });
    match matched {
        Some(option) => Ok(FieldValue::Choice {
            value: option.value.clone(),
            credit_cost: option.credit_cost,
        }),
        None => {
            let names: Vec<&str> = options.iter().map(|o| o.value.as_str()).collect();
            Err(format!("Choose one of: {}.", names.join(", ")))
        }
    }
}

/// Brazilian CPF (11 digits) or CNPJ (14 digits), check digits verified.
/// The stored value is the bare digit string.
pub fn tax_id(raw: &str) -> Result<FieldValue, String> {
    let value = raw.trim();
    if !value
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '/' | ' '))
    {
        return Err("Document numbers may only contain digits, '.', '-' and '/'.".to_string());
    }
    let digits: Vec<u32> = value.chars().filter_map(|c| c.to_digit(10)).collect();
    let valid = match digits.len() {
        11 => cpf_is_valid(&digits),
        14 => cnpj_is_valid(&digits),
        _ => return Err("Enter a CPF (11 digits) or CNPJ (14 digits).".to_string()),
    };
    if !valid {
        return Err("That document number is not valid.".to_string());
    }
    Ok(FieldValue::Text(
        digits.iter().filter_map(|d| char::from_digit(*d, 10)).collect(),
    ))
}

fn all_same(digits: &[u32]) -> bool {
    digits.windows(2).all(|pair| pair[0] == pair[1])
}

fn cpf_is_valid(digits: &[u32]) -> bool {
    if all_same(digits) {
        return false;
    }
    // Check digit n is weighted over the first n digits with weights n+1..=2
    [9u32, 10].iter().all(|&n| {
        let total: u32 = digits.iter().zip((2..=n + 1).rev()).map(|(d, w)| d * w).sum();
        digits.get(n as usize) == Some(&((total * 10) % 11 % 10))
    })
}

fn cnpj_is_valid(digits: &[u32]) -> bool {
    const FIRST: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
    const SECOND: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
    if all_same(digits) {
        return false;
    }
    let check = |weights: &[u32], position: usize| {
        let total: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();
        let rest = total % 11;
        let expected = if rest < 2 { 0 } else { 11 - rest };
        expected == digits[position]
    };
    check(&FIRST, 12) && check(&SECOND, 13)
}
