//! Cell parsers used by the import normalizer.
//!
//! None of these fail: each returns `None` (or the documented default) and the
//! caller decides what to substitute and which [`RowIssue`](crate::models::RowIssue)
//! to record.

use crate::models::{RawValue, Status};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use regex::Regex;

// ASCII digits only; `\d` is Unicode-aware in `regex`.
static BR_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]{1,2})[/-]([0-9]{1,2})[/-]([0-9]{4})$").unwrap());
static ISO_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}").unwrap());
static PLAIN_DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?[0-9]+(\.[0-9]+)?$").unwrap());
static LEADING_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][+-]?[0-9]+)?").unwrap());

const FREE_TEXT_DATE_FORMATS: &[&str] = &[
    "%B %d %Y",
    "%B %d, %Y",
    "%d %B %Y",
    "%A %B %d %Y",
    "%A, %B %d, %Y",
    "%Y/%m/%d",
];

const FREE_TEXT_DATETIME_FORMATS: &[&str] = &[
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%B %d %Y %H:%M:%S",
    "%A %B %d %Y %H:%M:%S",
];

/// Checked before the positive tokens: "REPROVADO" contains "APROVADO".
const REJECTED_TOKENS: &[&str] = &["REPROVADO", "REJEITADO", "CANCELADO", "RECUSADO", "DEVOLVIDO"];
const APPROVED_TOKENS: &[&str] = &["APROVADO", "PAGO", "RECEBIDO", "OK"];
const PENDING_TOKENS: &[&str] = &["PENDENTE", "AGUARDANDO"];

const CHANNEL_TOKENS: &[&str] = &["WHATSAPP", "EMAIL", "E-MAIL", "TELEFONE", "LIGAÇÃO", "LIGACAO"];

/// Reads a contact date.
///
/// - `D/M/YYYY` or `D-M-YYYY` is day-first (Brazilian sheets).
/// - Strings starting with `YYYY-MM-DD` keep that date, ignoring any time part.
/// - Other strings go through a handful of free-text formats (`Dec 23 2024`,
///   RFC 3339/2822 timestamps, ...), converted to the UTC calendar date.
/// - Numbers are epoch milliseconds.
///
/// Impossible calendar dates such as `31/02/2024` return `None`.
pub fn parse_date(value: &RawValue) -> Option<NaiveDate> {
    match value {
        RawValue::Text(text) => parse_date_text(text.trim()),
        RawValue::Number(ms) if ms.is_finite() => {
            DateTime::<Utc>::from_timestamp_millis(*ms as i64).map(|dt| dt.date_naive())
        }
        _ => None,
    }
}

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    if text.is_empty() {
        return None;
    }

    if let Some(caps) = BR_DATE.captures(text) {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let year: i32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if ISO_PREFIX.is_match(text) {
        return NaiveDate::parse_from_str(text.get(..10)?, "%Y-%m-%d").ok();
    }

    parse_free_text_date(text)
}

fn parse_free_text_date(text: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&Utc).date_naive());
    }

    FREE_TEXT_DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            FREE_TEXT_DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        })
}

/// Reads an amount, `None` when nothing numeric can be recovered.
///
/// Plain decimals (`26389.29`) are read as-is. Anything else is treated as
/// Brazilian currency: `R`, `$` and whitespace are stripped, `.` thousands
/// separators removed and the first `,` becomes the decimal point. Like a
/// lenient float reader, trailing text after the number is ignored.
pub fn parse_amount(value: &RawValue) -> Option<f64> {
    match value {
        RawValue::Number(n) if n.is_finite() => Some(*n),
        RawValue::Text(text) => parse_amount_text(text.trim()),
        _ => None,
    }
}

fn parse_amount_text(text: &str) -> Option<f64> {
    if PLAIN_DECIMAL.is_match(text) {
        return text.parse::<f64>().ok().filter(|n| n.is_finite());
    }

    let cleaned = text
        .chars()
        .filter(|c| !matches!(c, 'R' | '$') && !c.is_whitespace())
        .collect::<String>()
        .replace('.', "")
        .replacen(',', ".", 1);

    LEADING_NUMBER
        .find(&cleaned)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|n| n.is_finite())
}

/// [`parse_amount`] with the import default of 0.
pub fn parse_value(value: &RawValue) -> f64 {
    parse_amount(value).unwrap_or(0.0)
}

/// Maps free status text to a [`Status`], `None` when no token matches.
pub fn recognize_status(value: &RawValue) -> Option<Status> {
    let RawValue::Text(text) = value else {
        return None;
    };
    let upper = text.to_uppercase();

    if REJECTED_TOKENS.iter().any(|t| upper.contains(t)) {
        Some(Status::Reprovado)
    } else if APPROVED_TOKENS.iter().any(|t| upper.contains(t)) {
        Some(Status::Aprovado)
    } else if PENDING_TOKENS.iter().any(|t| upper.contains(t)) {
        Some(Status::Pendente)
    } else {
        None
    }
}

/// Many-to-one status mapping. Unknown or missing text is `Pendente`.
pub fn parse_status(value: &RawValue) -> Status {
    recognize_status(value).unwrap_or_default()
}

/// True when the text names a confirmation channel (WhatsApp, e-mail, phone).
pub fn mentions_channel(text: &str) -> bool {
    let upper = text.to_uppercase();
    CHANNEL_TOKENS.iter().any(|t| upper.contains(t))
}

/// Validate and normalize Brazilian phone number
///
/// Uses phonenumber library (port of Google's libphonenumber) to parse the
/// number with region BR and returns it in E.164 format (+5511987654321).
/// `None` when the number is not a valid Brazilian phone.
pub fn validate_br_phone(raw: &str) -> Option<String> {
    let digits = raw.chars().filter(|c| c.is_ascii_digit()).count();
    if digits < 8 {
        return None;
    }

    match phonenumber::parse(Some(CountryId::BR), raw) {
        Ok(number) if phonenumber::is_valid(&number) => {
            let formatted = number.format().mode(Mode::E164).to_string();
            tracing::debug!("✓ Valid BR phone: {} → {}", raw, formatted);
            Some(formatted)
        }
        Ok(_) => {
            tracing::debug!("Invalid BR phone number: {}", raw);
            None
        }
        Err(e) => {
            tracing::debug!("Failed to parse BR phone '{}': {:?}", raw, e);
            None
        }
    }
}
