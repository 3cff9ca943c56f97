//! Stateless helper utilities used by the XLSX reader and patcher.

use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use regex::Regex;

use crate::conf::{N_NCOLS_EXCEL_MAX, N_NROWS_EXCEL_MAX};
use crate::spec::{SpecCellRef, XlsxError};

////////////////////////////////////////////////////////////////////////////////
// #region CellReference

/// Convert column letters (`A`, `AB`, ...) to a 1-based column index.
pub fn convert_column_letters_to_index(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    let mut n_col: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        let n_digit = (c.to_ascii_uppercase() as u32) - ('A' as u32) + 1;
        n_col = n_col.checked_mul(26)?.checked_add(n_digit)?;
    }
    Some(n_col)
}

/// Convert a 1-based column index to column letters.
pub fn convert_column_index_to_letters(col: u32) -> String {
    let mut l_chars = Vec::new();
    let mut n_rest = col;
    while n_rest > 0 {
        let n_rem = (n_rest - 1) % 26;
        l_chars.push((b'A' + n_rem as u8) as char);
        n_rest = (n_rest - 1) / 26;
    }
    l_chars.iter().rev().collect()
}

/// Parse an `A1`-style reference into a 1-based coordinate.
pub fn parse_cell_ref(a1: &str) -> Result<SpecCellRef, XlsxError> {
    static RE_CELL_REF: OnceLock<Regex> = OnceLock::new();
    let re = RE_CELL_REF
        .get_or_init(|| Regex::new(r"^\$?([A-Za-z]{1,3})\$?([0-9]+)$").expect("valid regex"));

    let err = || XlsxError::InvalidCellRef(a1.to_string());
    let caps = re.captures(a1.trim()).ok_or_else(err)?;
    let n_col = convert_column_letters_to_index(&caps[1]).ok_or_else(err)?;
    let n_row: u32 = caps[2].parse().map_err(|_| err())?;
    if n_row == 0 || n_row > N_NROWS_EXCEL_MAX || n_col > N_NCOLS_EXCEL_MAX {
        return Err(err());
    }
    Ok(SpecCellRef::new(n_row, n_col))
}

/// Format a 1-based coordinate as an `A1`-style reference.
pub fn format_cell_ref(cell: SpecCellRef) -> String {
    format!("{}{}", convert_column_index_to_letters(cell.col), cell.row)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region DateAndNumber

/// Convert an Excel serial date to a naive datetime.
///
/// The 1900 system keeps Excel's phantom 1900-02-29: serials below 60 are
/// shifted by one day so that serial 1 is 1900-01-01.
pub fn convert_excel_serial_to_datetime(serial: f64, if_date1904: bool) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 || serial > 2_958_466.0 {
        return None;
    }
    let dt_epoch = if if_date1904 {
        NaiveDate::from_ymd_opt(1904, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    }
    .and_hms_opt(0, 0, 0)?;

    let mut x_serial = serial;
    if !if_date1904 && x_serial > 0.0 && x_serial < 60.0 {
        x_serial += 1.0;
    }
    let n_days = x_serial.floor();
    let n_secs = ((x_serial - n_days) * 86_400.0).round() as i64;

    dt_epoch
        .checked_add_signed(TimeDelta::try_days(n_days as i64)?)?
        .checked_add_signed(TimeDelta::try_seconds(n_secs)?)
}

/// Whether a custom number format code renders as a date or time.
///
/// Quoted literals, escaped characters, fill/padding directives and bracketed
/// sections (colors, conditions, locales) are ignored; elapsed-time brackets
/// such as `[h]` count as time tokens.
pub fn is_date_format_code(code: &str) -> bool {
    let l_chars: Vec<char> = code.chars().collect();
    let mut i = 0;
    while i < l_chars.len() {
        match l_chars[i] {
            '"' => {
                i += 1;
                while i < l_chars.len() && l_chars[i] != '"' {
                    i += 1;
                }
            }
            '\\' | '_' | '*' => i += 1,
            '[' => {
                let mut c_inner = String::new();
                i += 1;
                while i < l_chars.len() && l_chars[i] != ']' {
                    c_inner.push(l_chars[i]);
                    i += 1;
                }
                let c_inner = c_inner.to_ascii_lowercase();
                if !c_inner.is_empty() && c_inner.chars().all(|c| matches!(c, 'h' | 'm' | 's')) {
                    return true;
                }
            }
            c if matches!(c.to_ascii_lowercase(), 'd' | 'm' | 'y' | 'h' | 's') => return true,
            _ => {}
        }
        i += 1;
    }
    false
}

/// Render a number without locale formatting; integral values drop `.0`.
pub fn format_number_text(x: f64) -> String {
    if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e15 {
        return format!("{}", x as i64);
    }
    format!("{x}")
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region XmlHelpers

/// Strip any namespace prefix from a qualified XML name.
pub fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|b| *b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

/// Escape XML text content.
pub fn escape_xml_text(text: &str) -> String {
    let mut c_out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => c_out.push_str("&amp;"),
            '<' => c_out.push_str("&lt;"),
            '>' => c_out.push_str("&gt;"),
            _ => c_out.push(c),
        }
    }
    c_out
}

/// Whether `<t>` text needs `xml:space="preserve"` to keep its whitespace.
pub fn needs_space_preserve(text: &str) -> bool {
    text.starts_with(char::is_whitespace)
        || text.ends_with(char::is_whitespace)
        || text.contains('\n')
        || text.contains('\t')
}

// #endregion

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letters_round_trip_at_boundaries() {
        for (c_letters, n_col) in [("A", 1), ("Z", 26), ("AA", 27), ("AZ", 52), ("XFD", 16_384)] {
            assert_eq!(convert_column_letters_to_index(c_letters), Some(n_col));
            assert_eq!(convert_column_index_to_letters(n_col), c_letters);
        }
        assert_eq!(convert_column_letters_to_index(""), None);
        assert_eq!(convert_column_letters_to_index("A1"), None);
    }

    #[test]
    fn test_parse_cell_ref_accepts_absolute_and_lowercase() {
        assert_eq!(parse_cell_ref("D23").expect("D23"), SpecCellRef::new(23, 4));
        assert_eq!(parse_cell_ref("$K$60").expect("$K$60"), SpecCellRef::new(60, 11));
        assert_eq!(parse_cell_ref("f41").expect("f41"), SpecCellRef::new(41, 6));
        assert_eq!(format_cell_ref(SpecCellRef::new(19, 5)), "E19");
    }

    #[test]
    fn test_parse_cell_ref_rejects_garbage_and_out_of_range() {
        for c_bad in ["", "D", "23", "D0", "1D", "XFE1", "A1048577", "D 23"] {
            assert!(
                matches!(parse_cell_ref(c_bad), Err(XlsxError::InvalidCellRef(_))),
                "{c_bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_excel_serial_conversion_handles_both_date_systems() {
        let dt_1900 = convert_excel_serial_to_datetime(45_292.0, false).expect("1900 serial");
        assert_eq!(dt_1900.format("%Y-%m-%d").to_string(), "2024-01-01");

        let dt_1904 = convert_excel_serial_to_datetime(43_830.0, true).expect("1904 serial");
        assert_eq!(dt_1904.format("%Y-%m-%d").to_string(), "2024-01-01");

        let dt_early = convert_excel_serial_to_datetime(1.0, false).expect("serial 1");
        assert_eq!(dt_early.format("%Y-%m-%d").to_string(), "1900-01-01");

        let dt_time = convert_excel_serial_to_datetime(45_292.5, false).expect("noon");
        assert_eq!(dt_time.format("%H:%M:%S").to_string(), "12:00:00");

        assert!(convert_excel_serial_to_datetime(f64::NAN, false).is_none());
        assert!(convert_excel_serial_to_datetime(-1.0, false).is_none());
    }

    #[test]
    fn test_is_date_format_code_ignores_literals_and_colors() {
        assert!(is_date_format_code("dd/mm/yyyy"));
        assert!(is_date_format_code("[$-409]d-mmm-yy;@"));
        assert!(is_date_format_code("[h]:mm"));
        assert!(is_date_format_code("[Red]yyyy-mm-dd"));
        assert!(!is_date_format_code("General"));
        assert!(!is_date_format_code("0.00"));
        assert!(!is_date_format_code("#,##0 \"days\""));
        assert!(!is_date_format_code("[Red]0.00"));
        assert!(!is_date_format_code("0\\d"));
    }

    #[test]
    fn test_format_number_text_drops_integral_fraction() {
        assert_eq!(format_number_text(123.0), "123");
        assert_eq!(format_number_text(-4.0), "-4");
        assert_eq!(format_number_text(1234567890123.0), "1234567890123");
        assert_eq!(format_number_text(0.5), "0.5");
        assert_eq!(format_number_text(12.25), "12.25");
    }

    #[test]
    fn test_xml_helpers() {
        assert_eq!(local_name(b"x:row"), b"row");
        assert_eq!(local_name(b"row"), b"row");
        assert_eq!(escape_xml_text("a<b & c>"), "a&lt;b &amp; c&gt;");
        assert!(needs_space_preserve(" lead"));
        assert!(needs_space_preserve("line\nbreak"));
        assert!(!needs_space_preserve("plain text"));
    }
}
