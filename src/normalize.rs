//! Per-kind value normalization for lead fields.
//!
//! Every parser here is total: malformed input yields `None` and the caller
//! decides what absence means. Nothing in this module returns an error.
//!
//! Numbers follow the pt-BR / en-US ambiguity rules used by spreadsheet
//! exports: when both `.` and `,` appear, the last one is the decimal point;
//! a lone `,` is a decimal comma; a lone `.` is kept as written.

use std::{str::FromStr, sync::OnceLock};

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy, prelude::FromPrimitive, prelude::ToPrimitive};
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

use crate::{
    aliases::{ContractType, LeadSource, LeadStatus, Priority},
    data::{CellValue, parse_naive_date, parse_naive_datetime},
    fields::FieldKind,
};

/// Largest serial a spreadsheet can hold (9999-12-31).
const MAX_SPREADSHEET_SERIAL: f64 = 2_958_465.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

/// A successfully normalized field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Decimal(Decimal),
    DateTime(NaiveDateTime),
    Status(LeadStatus),
    Source(LeadSource),
    Priority(Priority),
    ContractType(ContractType),
}

fn token_separator() -> &'static Regex {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    SEPARATOR.get_or_init(|| Regex::new(r"[\s\-]+").expect("valid separator pattern"))
}

fn phone_noise() -> &'static Regex {
    static NOISE: OnceLock<Regex> = OnceLock::new();
    NOISE.get_or_init(|| Regex::new(r"[^\d+()\-]").expect("valid phone pattern"))
}

/// Strips diacritics, lower-cases and trims. Used for column labels and
/// guess patterns.
pub fn canonical_label(value: &str) -> String {
    value
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .trim()
        .to_string()
}

/// [`canonical_label`] plus whitespace/hyphen runs collapsed to `_`. Used as
/// the key into alias tables.
pub fn canonical_token(value: &str) -> String {
    let label = canonical_label(value);
    token_separator().replace_all(&label, "_").into_owned()
}

pub fn normalize_text(cell: &CellValue) -> Option<String> {
    let text = cell.as_display();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Lower-cased address when the text looks like one.
pub fn normalize_email(cell: &CellValue) -> Option<String> {
    let text = normalize_text(cell)?;
    if text.contains('@') && text.contains('.') {
        Some(text.to_lowercase())
    } else {
        None
    }
}

pub fn normalize_phone(cell: &CellValue) -> Option<String> {
    let text = normalize_text(cell)?;
    let cleaned = phone_noise().replace_all(&text, "");
    if cleaned.chars().any(|c| c.is_ascii_digit()) {
        Some(cleaned.into_owned())
    } else {
        None
    }
}

/// Parses a locale-ambiguous numeric literal such as `R$ 1.234,56`.
pub fn parse_decimal_literal(value: &str) -> Option<Decimal> {
    let kept = value
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect::<String>();
    if !kept.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let normalized = match (kept.rfind('.'), kept.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => kept.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => kept.replace(',', ""),
        (None, Some(_)) => kept.replace(',', "."),
        _ => kept,
    };
    Decimal::from_str(&normalized).ok()
}

pub fn normalize_decimal(cell: &CellValue) -> Option<Decimal> {
    match cell {
        CellValue::Number(n) if n.is_finite() => Decimal::from_f64(*n).map(|d| d.normalize()),
        CellValue::Number(_) => None,
        CellValue::Text(text) => parse_decimal_literal(text),
        _ => None,
    }
}

/// Decimal rounded half away from zero.
pub fn normalize_integer(cell: &CellValue) -> Option<i64> {
    normalize_decimal(cell)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

pub fn clamp_percentage(value: Decimal) -> Decimal {
    value.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED)
}

pub fn normalize_percentage(cell: &CellValue) -> Option<Decimal> {
    normalize_decimal(cell).map(clamp_percentage)
}

pub fn normalize_score(cell: &CellValue) -> Option<i64> {
    normalize_integer(cell).map(|score| score.clamp(0, 100))
}

/// Converts a 1900-epoch spreadsheet serial (days, fractional part = time of
/// day) into a date-time. Serials below 60 are shifted one day to undo the
/// fictitious 1900-02-29.
pub fn spreadsheet_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || !(1.0..MAX_SPREADSHEET_SERIAL + 1.0).contains(&serial) {
        return None;
    }
    let mut days = serial.trunc() as i64;
    if days < 60 {
        days += 1;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let date = epoch.checked_add_signed(Duration::days(days))?;
    let seconds = (serial.fract() * SECONDS_PER_DAY).round() as i64;
    date.and_time(NaiveTime::MIN)
        .checked_add_signed(Duration::seconds(seconds))
}

/// Free-text date parsing across the formats spreadsheet users type.
pub fn parse_date_text(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.naive_utc());
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(parsed.naive_utc());
    }
    if let Ok(parsed) = parse_naive_datetime(trimmed) {
        return Some(parsed);
    }
    parse_naive_date(trimmed)
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN))
}

pub fn normalize_date(cell: &CellValue) -> Option<NaiveDateTime> {
    match cell {
        CellValue::Date(date) => Some(date.and_time(NaiveTime::MIN)),
        CellValue::DateTime(dt) => Some(*dt),
        CellValue::Number(serial) => spreadsheet_serial_to_datetime(*serial),
        CellValue::Text(text) => parse_date_text(text),
        CellValue::Bool(_) | CellValue::Empty => None,
    }
}

fn cell_token(cell: &CellValue) -> Option<String> {
    let text = normalize_text(cell)?;
    let token = canonical_token(&text);
    (!token.is_empty()).then_some(token)
}

/// Alias match on the canonical token; unknown stages keep the cell's text.
pub fn normalize_status(cell: &CellValue) -> Option<LeadStatus> {
    normalize_text(cell).and_then(|text| LeadStatus::from_label(&text))
}

pub fn normalize_source(cell: &CellValue) -> Option<LeadSource> {
    cell_token(cell).and_then(|token| LeadSource::resolve_alias(&token))
}

pub fn normalize_priority(cell: &CellValue) -> Option<Priority> {
    cell_token(cell).and_then(|token| Priority::resolve_alias(&token))
}

pub fn normalize_contract_type(cell: &CellValue) -> Option<ContractType> {
    cell_token(cell).and_then(|token| ContractType::resolve_alias(&token))
}

/// Dispatches to the parser registered for `kind`.
pub fn normalize_field(kind: FieldKind, cell: &CellValue) -> Option<FieldValue> {
    match kind {
        FieldKind::Text => normalize_text(cell).map(FieldValue::Text),
        FieldKind::Email => normalize_email(cell).map(FieldValue::Text),
        FieldKind::Phone => normalize_phone(cell).map(FieldValue::Text),
        FieldKind::Integer => normalize_integer(cell).map(FieldValue::Integer),
        FieldKind::Decimal => normalize_decimal(cell).map(FieldValue::Decimal),
        FieldKind::Percentage => normalize_percentage(cell).map(FieldValue::Decimal),
        FieldKind::Score => normalize_score(cell).map(FieldValue::Integer),
        FieldKind::Date => normalize_date(cell).map(FieldValue::DateTime),
        FieldKind::Status => normalize_status(cell).map(FieldValue::Status),
        FieldKind::Source => normalize_source(cell).map(FieldValue::Source),
        FieldKind::Priority => normalize_priority(cell).map(FieldValue::Priority),
        FieldKind::ContractType => normalize_contract_type(cell).map(FieldValue::ContractType),
    }
}
