//! Type-aware stringification of raw cell values.
//!
//! Every function here is total: malformed values fall back to a generic
//! rendering instead of failing.

use std::fmt::Write;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::config::{DisplayOptions, NumberLocale};
use crate::row::Row;
use crate::schema::{parse_links, Column, ColumnKind};

/// Display value of `field` on `row`.
pub fn get_display_value(row: &Row, field: &Column, options: &DisplayOptions) -> String {
    display_value(row.get(&field.id), &field.kind, options)
}

/// Display value of a raw value interpreted as `kind`.
pub fn display_value(value: &serde_json::Value, kind: &ColumnKind, options: &DisplayOptions) -> String {
    if kind.is_derived() || matches!(kind, ColumnKind::Invalid { .. }) {
        return options.derived_placeholder.clone();
    }

    match (kind, value) {
        (_, serde_json::Value::Null) => String::new(),
        (ColumnKind::Relation(cfg), raw) => parse_links(raw, cfg.cardinality)
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        (_, serde_json::Value::Bool(b)) => {
            if *b {
                options.yes_label.clone()
            } else {
                options.no_label.clone()
            }
        }
        (ColumnKind::Date(cfg), raw) => {
            let format = cfg
                .format
                .as_deref()
                .unwrap_or(&options.default_date_format);
            format_date(raw, format).unwrap_or_else(|| generic(raw))
        }
        (ColumnKind::Percent, serde_json::Value::Number(n)) => match n.as_f64() {
            Some(f) => format!("{}%", format_number(f, None, &options.locale)),
            None => n.to_string(),
        },
        (ColumnKind::Number(cfg), serde_json::Value::Number(n)) => {
            number_display(n, cfg.precision, &options.locale)
        }
        (_, serde_json::Value::Number(n)) => number_display(n, None, &options.locale),
        (_, serde_json::Value::String(s)) => s.clone(),
        (_, serde_json::Value::Array(items)) => items
            .iter()
            .map(|item| display_value(item, kind, options))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        (_, other) => generic(other),
    }
}

fn generic(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn number_display(n: &serde_json::Number, precision: Option<u8>, locale: &NumberLocale) -> String {
    if precision.is_none() {
        if let Some(i) = n.as_i64() {
            return group_digits(&i.to_string(), None, locale);
        }
    }
    match n.as_f64() {
        Some(f) => format_number(f, precision, locale),
        None => n.to_string(),
    }
}

/// Formats a number with the locale's separators.
///
/// Without a precision, integral values print without decimals and other
/// values use the shortest round-trip representation.
pub fn format_number(value: f64, precision: Option<u8>, locale: &NumberLocale) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let plain = match precision {
        Some(p) => format!("{:.*}", p as usize, value),
        None if value.fract() == 0.0 && value.abs() < 1e15 => format!("{}", value as i64),
        None => format!("{}", value),
    };
    match plain.split_once('.') {
        Some((int_part, frac)) => group_digits(int_part, Some(frac), locale),
        None => group_digits(&plain, None, locale),
    }
}

fn group_digits(int_part: &str, frac: Option<&str>, locale: &NumberLocale) -> String {
    let (sign, digits) = match int_part.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", int_part),
    };

    let mut out = String::with_capacity(int_part.len() + 8);
    out.push_str(sign);
    match locale.grouping_separator {
        Some(sep) => {
            let len = digits.len();
            for (i, ch) in digits.chars().enumerate() {
                if i > 0 && (len - i) % 3 == 0 {
                    out.push(sep);
                }
                out.push(ch);
            }
        }
        None => out.push_str(digits),
    }
    if let Some(frac) = frac {
        out.push(locale.decimal_separator);
        out.push_str(frac);
    }
    out
}

fn format_date(raw: &serde_json::Value, format: &str) -> Option<String> {
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return None;
    }

    let mut out = String::new();
    let written = match raw {
        serde_json::Value::Number(n) => {
            let millis = n.as_i64()?;
            let date = DateTime::from_timestamp_millis(millis)?;
            write!(out, "{}", date.format_with_items(items.iter()))
        }
        serde_json::Value::String(s) => {
            let s = s.trim();
            if let Ok(date) = DateTime::parse_from_rfc3339(s) {
                write!(out, "{}", date.format_with_items(items.iter()))
            } else if let Ok(date) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
            {
                write!(out, "{}", date.format_with_items(items.iter()))
            } else {
                let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
                write!(out, "{}", date.format_with_items(items.iter()))
            }
        }
        _ => return None,
    };
    written.ok().map(|_| out)
}
