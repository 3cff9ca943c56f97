//! In-memory workbook fixtures shared by unit tests.

use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

/// One `Devices` row: `(hwid, title_th, type, url, location)`.
pub(crate) type DeviceRow<'a> = (&'a str, &'a str, &'a str, &'a str, &'a str);

/// Source workbook with all three sheets.
///
/// A `type` starting with `=` is written as a formula.
pub(crate) fn build_source_workbook(
    l_profile: &[(&str, &str)],
    l_devices: &[DeviceRow<'_>],
    l_info: &[&str],
) -> Vec<u8> {
    let mut workbook = Workbook::new();

    let sheet = workbook.add_worksheet();
    sheet.set_name("CustomerProfile").expect("sheet name");
    for (n_idx, (label, value)) in l_profile.iter().enumerate() {
        let n_row = n_idx as u32;
        sheet.write_string(n_row, 0, *label).expect("write");
        sheet.write_string(n_row, 1, *value).expect("write");
    }

    let sheet = workbook.add_worksheet();
    sheet.set_name("Devices").expect("sheet name");
    sheet.write_string(0, 1, "HWID").expect("write");
    for (n_idx, (hwid, title_th, banner_type, url, location)) in l_devices.iter().enumerate() {
        let n_row = n_idx as u32 + 1;
        for (n_col, value) in [(1, hwid), (2, title_th), (11, url), (12, location)] {
            if !value.is_empty() {
                sheet.write_string(n_row, n_col, *value).expect("write");
            }
        }
        if banner_type.starts_with('=') {
            sheet.write_formula(n_row, 9, *banner_type).expect("write");
        } else if !banner_type.is_empty() {
            sheet.write_string(n_row, 9, *banner_type).expect("write");
        }
    }

    let sheet = workbook.add_worksheet();
    sheet.set_name("Info").expect("sheet name");
    sheet.write_string(0, 0, "type").expect("write");
    for (n_idx, info_type) in l_info.iter().enumerate() {
        sheet
            .write_string(n_idx as u32 + 1, 0, *info_type)
            .expect("write");
    }

    workbook.save_to_buffer().expect("save workbook")
}

/// Source workbook whose ID and date cells hold native numbers and dates.
///
/// `Devices` lists hwids `12345`, `0` and `HW3` as number, number and text.
pub(crate) fn build_typed_source_workbook() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let date_format = Format::new().set_num_format("dd/mm/yyyy");

    let sheet = workbook.add_worksheet();
    sheet.set_name("CustomerProfile").expect("sheet name");
    sheet.write_string(0, 0, "LINE Provider ID").expect("write");
    sheet.write_number(0, 1, 1656789012.0).expect("write");
    sheet.write_string(1, 0, "LINE Chanel ID").expect("write");
    sheet.write_number(1, 1, 2001234567.0).expect("write");
    sheet.write_string(2, 0, "Campaign Start").expect("write");
    sheet
        .write_datetime_with_format(
            2,
            1,
            &ExcelDateTime::from_ymd(2024, 3, 5).expect("date"),
            &date_format,
        )
        .expect("write");
    sheet.write_string(3, 0, "Submit Date").expect("write");
    sheet
        .write_datetime_with_format(
            3,
            1,
            &ExcelDateTime::from_ymd(2024, 12, 31).expect("date"),
            &date_format,
        )
        .expect("write");

    let sheet = workbook.add_worksheet();
    sheet.set_name("Devices").expect("sheet name");
    sheet.write_string(0, 1, "HWID").expect("write");
    sheet.write_number(1, 1, 12345.0).expect("write");
    sheet.write_number(2, 1, 0.0).expect("write");
    sheet.write_string(3, 1, "HW3").expect("write");

    workbook.save_to_buffer().expect("save workbook")
}

/// Workbook with a single sheet named `name` and nothing else.
pub(crate) fn build_single_sheet_workbook(name: &str) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(name).expect("sheet name");
    sheet.write_string(0, 0, "x").expect("write");
    workbook.save_to_buffer().expect("save workbook")
}

/// Two-sheet template whose active sheet is `Form`.
///
/// `Form` carries labels, a bold pre-filled `D23`, a date-formatted `K60`
/// and the location-owner placeholder at `D24`.
pub(crate) fn build_template_workbook() -> Vec<u8> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let date_format = Format::new().set_num_format("dd/mm/yyyy");

    let sheet = workbook.add_worksheet();
    sheet.set_name("Cover").expect("sheet name");
    sheet.write_string(0, 0, "Cover page").expect("write");

    let sheet = workbook.add_worksheet();
    sheet.set_name("Form").expect("sheet name");
    sheet.write_string(6, 1, "Location").expect("write");
    sheet.write_string(8, 1, "Company").expect("write");
    sheet.write_string(18, 3, "OA name").expect("write");
    sheet
        .write_string_with_format(22, 3, "[Device ID]", &bold)
        .expect("write");
    sheet
        .write_string(23, 3, "[Official name of the Location owner]")
        .expect("write");
    sheet.write_string(35, 3, "[URL]").expect("write");
    sheet.write_string(47, 3, "[Special Request]").expect("write");
    sheet
        .write_datetime_with_format(
            59,
            10,
            &ExcelDateTime::from_ymd(2000, 1, 1).expect("date"),
            &date_format,
        )
        .expect("write");
    sheet.set_active(true);

    workbook.save_to_buffer().expect("save workbook")
}
