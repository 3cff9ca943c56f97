//! Field normalization: raw cell values to canonical strings.
//!
//! Pure functions; callers attach sheet/cell context to diagnostics.

use beaconkit_io_xlsx::{EnumCellValue, format_number_text};

use crate::conf::N_YEAR_PIVOT;
use crate::spec::SpecNormalizedValue;

/// Canonical scalar text: trimmed strings, locale-free numbers.
pub fn normalize_scalar(raw: &EnumCellValue) -> String {
    match raw {
        EnumCellValue::None => String::new(),
        EnumCellValue::String(s) => s.trim().to_string(),
        EnumCellValue::Number(x) => format_number_text(*x),
        EnumCellValue::Bool(b) => String::from(if *b { "True" } else { "False" }),
        EnumCellValue::Error(code) => code.trim().to_string(),
        EnumCellValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        EnumCellValue::Formula { formula, .. } => format!("={}", formula.trim()),
    }
}

/// Absent cells and whitespace-only text count as empty.
pub fn is_blank(raw: &EnumCellValue) -> bool {
    match raw {
        EnumCellValue::None => true,
        EnumCellValue::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Normalize a date cell to `DD/MM/YYYY`.
///
/// Native date cells are formatted directly; text goes through
/// [`normalize_date_text`]. Any other value keeps its scalar text and
/// carries a diagnostic.
pub fn normalize_date(raw: &EnumCellValue) -> SpecNormalizedValue {
    match raw {
        _ if is_blank(raw) => SpecNormalizedValue::ok(String::new()),
        EnumCellValue::DateTime(dt) => SpecNormalizedValue::ok(dt.format("%d/%m/%Y").to_string()),
        EnumCellValue::String(s) => normalize_date_text(s.trim()),
        _ => {
            let c_text = normalize_scalar(raw);
            let c_message = format!("Expected a date or `D/M/Y` text, got `{c_text}`.");
            SpecNormalizedValue::degraded(c_text, c_message)
        }
    }
}

/// Normalize `D/M/Y` text to zero-padded `DD/MM/YYYY`.
///
/// A doubled separator is collapsed first; years below 2000 are shifted by
/// 2000. Unparseable text is returned unchanged with a diagnostic.
pub fn normalize_date_text(text: &str) -> SpecNormalizedValue {
    if text.trim().is_empty() {
        return SpecNormalizedValue::ok(String::new());
    }

    let c_collapsed = text.replace("//", "/");
    let l_parts: Vec<&str> = c_collapsed.split('/').collect();
    let [c_day, c_month, c_year] = l_parts.as_slice() else {
        return SpecNormalizedValue::degraded(
            text.to_string(),
            format!(
                "Expected 3 `/`-separated parts in `{text}`, got {}.",
                l_parts.len()
            ),
        );
    };

    let parsed = (|| {
        let n_day = parse_date_part(c_day)?;
        let n_month = parse_date_part(c_month)?;
        let mut n_year = parse_date_part(c_year)?;
        if n_year < N_YEAR_PIVOT {
            n_year += N_YEAR_PIVOT;
        }
        Ok::<_, String>(format!("{n_day:02}/{n_month:02}/{n_year}"))
    })();

    match parsed {
        Ok(c_date) => SpecNormalizedValue::ok(c_date),
        Err(c_message) => SpecNormalizedValue::degraded(text.to_string(), c_message),
    }
}

/// Plain-string form of [`normalize_date_text`].
pub fn normalize_date_str(text: &str) -> String {
    normalize_date_text(text).value
}

fn parse_date_part(part: &str) -> Result<i64, String> {
    part.trim()
        .parse::<i64>()
        .map_err(|_| format!("Invalid date component `{part}`."))
}
