//! Source workbook extraction into canonical records.
//!
//! Three independent scans over one decoded workbook:
//! - `CustomerProfile`: label/value rows, matched against the label mapping;
//! - `Devices`: rows from the data start until the hardware-ID column is empty;
//! - `Info`: rows from the data start until the type column is empty.
//!
//! A missing sheet leaves its collection empty and is listed in the report.

use beaconkit_io_xlsx::{SheetGrid, SpecCellRef, XlsxWorkbook};
use log::{info, warn};

use crate::conf::C_BANNER_TYPE_LINK_URL;
use crate::normalize::{is_blank, normalize_date, normalize_scalar};
use crate::report::{ReportExtract, ReportExtractBuilder};
use crate::spec::{
    EnumDeviceField, EnumDiagnosticKind, FormEngineError, SpecDeviceRecord, SpecFieldDiagnostic,
    SpecInfoRecord, SpecSourceLayout,
};

/// Extract canonical records with the default source layout.
pub fn extract_records(bytes: &[u8]) -> Result<ReportExtract, FormEngineError> {
    extract_records_with_layout(bytes, &SpecSourceLayout::default())
}

/// Extract canonical records from raw workbook bytes.
///
/// Fails with [`FormEngineError::WorkbookUnreadable`] when the bytes are not a
/// readable workbook; no partial extraction is returned in that case.
pub fn extract_records_with_layout(
    bytes: &[u8],
    layout: &SpecSourceLayout,
) -> Result<ReportExtract, FormEngineError> {
    let workbook = XlsxWorkbook::open(bytes).map_err(FormEngineError::WorkbookUnreadable)?;
    extract_from_workbook(&workbook, layout)
}

/// Extract canonical records from an opened workbook.
pub fn extract_from_workbook(
    workbook: &XlsxWorkbook,
    layout: &SpecSourceLayout,
) -> Result<ReportExtract, FormEngineError> {
    let mut builder = ReportExtractBuilder::default();

    if let Some(grid) = load_sheet(workbook, &layout.sheet_profile, &mut builder)? {
        scan_profile(&grid, layout, &mut builder);
    }
    if let Some(grid) = load_sheet(workbook, &layout.sheet_devices, &mut builder)? {
        scan_devices(&grid, layout, &mut builder);
    }
    if let Some(grid) = load_sheet(workbook, &layout.sheet_info, &mut builder)? {
        scan_info(&grid, layout, &mut builder);
    }

    let report = builder.build();
    info!(
        "Extracted workbook: devices={} info={} profile_fields={} sheets_missing={:?} diagnostics={}",
        report.device_count(),
        report.info_count(),
        report.cnt_profile_fields,
        report.sheets_missing,
        report.diagnostic_count()
    );
    Ok(report)
}

fn load_sheet(
    workbook: &XlsxWorkbook,
    sheet_name: &str,
    builder: &mut ReportExtractBuilder,
) -> Result<Option<SheetGrid>, FormEngineError> {
    let grid = workbook
        .sheet(sheet_name)
        .map_err(FormEngineError::WorkbookUnreadable)?;
    builder.add_sheet(sheet_name, grid.is_some());
    if grid.is_none() {
        builder.add_warning(format!("Missing sheet `{sheet_name}`; collection left empty."));
    }
    Ok(grid)
}

////////////////////////////////////////////////////////////////////////////////
// #region ProfileScan

fn scan_profile(grid: &SheetGrid, layout: &SpecSourceLayout, builder: &mut ReportExtractBuilder) {
    let n_max_row = grid.max_row();
    for n_row in 1..=n_max_row {
        let c_label = normalize_scalar(grid.cell(n_row, layout.col_profile_label));
        if c_label.is_empty() || c_label == layout.profile_section_header {
            continue;
        }
        let Some(field) = layout
            .profile_labels
            .iter()
            .find(|(label, _)| *label == c_label)
            .map(|(_, field)| *field)
        else {
            continue;
        };

        let raw = grid.cell(n_row, layout.col_profile_value);
        let c_value = if field.is_date() {
            let normalized = normalize_date(raw);
            if let Some(message) = normalized.diagnostic {
                let c_cell = SpecCellRef::new(n_row, layout.col_profile_value).to_a1();
                warn!(
                    "Unparseable date in `{}`!{c_cell} ({}): {message}",
                    grid.name(),
                    field.key()
                );
                builder.add_diagnostic(SpecFieldDiagnostic {
                    kind: EnumDiagnosticKind::DateFormatUnparseable,
                    sheet: grid.name().to_string(),
                    cell: Some(c_cell),
                    field: field.key().to_string(),
                    raw: normalized.value.clone(),
                    message,
                });
            }
            normalized.value
        } else {
            normalize_scalar(raw)
        };

        builder.records.customer_profile.set(field, c_value);
        builder.add_profile_field();
    }
    builder.add_rows_scanned(u64::from(n_max_row));
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region RowScans

fn scan_devices(grid: &SheetGrid, layout: &SpecSourceLayout, builder: &mut ReportExtractBuilder) {
    let Some(n_col_hwid) = layout.device_column(EnumDeviceField::Hwid) else {
        builder.add_warning(format!(
            "Sheet `{}` has no hardware-ID column configured; no devices extracted.",
            grid.name()
        ));
        return;
    };

    let mut n_row = layout.row_data_start;
    while !is_blank(grid.cell(n_row, n_col_hwid)) {
        let mut device = SpecDeviceRecord {
            no: n_row - 1,
            ..SpecDeviceRecord::default()
        };
        for (field, n_col) in &layout.device_columns {
            device.set(*field, normalize_scalar(grid.cell(n_row, *n_col)));
        }
        if device.banner_type.starts_with('=') {
            device.banner_type = C_BANNER_TYPE_LINK_URL.to_string();
        }
        builder.records.devices.push(device);
        n_row += 1;
    }
    builder.add_rows_scanned(u64::from(n_row - layout.row_data_start));
}

fn scan_info(grid: &SheetGrid, layout: &SpecSourceLayout, builder: &mut ReportExtractBuilder) {
    let mut n_row = layout.row_data_start;
    while !is_blank(grid.cell(n_row, layout.col_info_type)) {
        builder.records.info.push(SpecInfoRecord {
            info_type: normalize_scalar(grid.cell(n_row, layout.col_info_type)),
        });
        n_row += 1;
    }
    builder.add_rows_scanned(u64::from(n_row - layout.row_data_start));
}

// #endregion
