//! pt-BR formatting for the human-readable reports.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};

/// Formats an amount as Brazilian reais, e.g. `R$ 1.234,50`.
pub fn brl(amount: &BigDecimal) -> String {
    let fixed = amount.round(2).with_scale(2).to_string();
    let (sign, digits) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed.as_str()),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, "00"));
    format!("{}R$ {},{}", sign, group_thousands(int_part), frac_part)
}

fn group_thousands(int_part: &str) -> String {
    let len = int_part.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    out
}

pub fn date(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn datetime(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|d| d.format("%d/%m/%Y %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn yes_no(flag: bool) -> &'static str {
    if flag {
        "✅ sim"
    } else {
        "❌ não"
    }
}

/// Heavy separator line used between report sections.
pub fn rule() -> String {
    "━".repeat(40)
}
