//! Per-device document generation from an immutable template.

use beaconkit_io_xlsx::{
    CellPatch, SpecCellRef, SpecWorkbookMeta, WorkbookCellPatches, XlsxPackage,
    apply_cell_patches,
};
use log::{debug, warn};

use crate::normalize::normalize_date_text;
use crate::spec::{
    EnumDiagnosticKind, FormEngineError, SpecCustomerProfile, SpecDeviceRecord,
    SpecFieldDiagnostic, SpecOutputDocument, SpecTemplateLayout,
};

/// Resolve the sheet a layout writes into.
///
/// An explicit `layout.sheet_name` must exist; otherwise the template's
/// active sheet is used, falling back to the first sheet.
pub fn resolve_target_sheet(
    meta: &SpecWorkbookMeta,
    layout: &SpecTemplateLayout,
) -> Result<String, FormEngineError> {
    let sheet = match &layout.sheet_name {
        Some(name) => meta.sheets.iter().find(|s| &s.name == name),
        None => meta
            .sheets
            .get(meta.n_active_tab)
            .or_else(|| meta.sheets.first()),
    };
    sheet.map(|s| s.name.clone()).ok_or_else(|| {
        FormEngineError::TemplateSheetMissing(
            layout
                .sheet_name
                .clone()
                .unwrap_or_else(|| "<active sheet>".to_string()),
        )
    })
}

/// Fill one copy of the template for `device`.
///
/// The template is inflated fresh from `template` on every call; only the
/// target worksheet (and the shared string table) changes in the output.
pub fn generate_document(
    template: &[u8],
    profile: &SpecCustomerProfile,
    device: &SpecDeviceRecord,
    layout: &SpecTemplateLayout,
) -> Result<SpecOutputDocument, FormEngineError> {
    let mut package = XlsxPackage::from_bytes(template).map_err(FormEngineError::TemplateUnreadable)?;
    let meta = package
        .workbook_meta()
        .map_err(FormEngineError::TemplateUnreadable)?;
    let c_sheet = resolve_target_sheet(&meta, layout)?;

    let mut writer = DocumentCellWriter {
        c_sheet: &c_sheet,
        patches: WorkbookCellPatches::new(),
        diagnostics: Vec::new(),
    };

    for (field, c_cell) in &layout.profile_cells {
        writer.put_text(c_cell, field.key(), profile.get(*field));
    }

    let normalized = normalize_date_text(&profile.submit_date);
    match normalized.diagnostic {
        Some(message) => {
            warn!(
                "Submit date `{}` left unset at `{c_sheet}`!{}: {message}",
                profile.submit_date, layout.submit_date_cell
            );
            writer.diagnostics.push(SpecFieldDiagnostic {
                kind: EnumDiagnosticKind::DateFormatUnparseable,
                sheet: c_sheet.clone(),
                cell: Some(layout.submit_date_cell.clone()),
                field: "submit_date".to_string(),
                raw: profile.submit_date.clone(),
                message,
            });
        }
        None => writer.put_text(&layout.submit_date_cell, "submit_date", &normalized.value),
    }

    for (field, c_cell) in &layout.device_cells {
        writer.put_text(c_cell, field.key(), device.get(*field));
    }

    let c_location_owner = match device.location.trim() {
        "" => layout.location_owner_placeholder.as_str(),
        location => location,
    };
    writer.put_text(&layout.location_owner_cell, "location", c_location_owner);

    let DocumentCellWriter {
        patches,
        diagnostics,
        ..
    } = writer;
    apply_cell_patches(&mut package, &patches).map_err(FormEngineError::DocumentWriteFailed)?;
    let bytes = package
        .write_to_bytes()
        .map_err(FormEngineError::DocumentWriteFailed)?;

    debug!(
        "Generated document for device no={} hwid=`{}` (bytes={}, diagnostics={})",
        device.no,
        device.hwid,
        bytes.len(),
        diagnostics.len()
    );
    Ok(SpecOutputDocument { bytes, diagnostics })
}

struct DocumentCellWriter<'a> {
    c_sheet: &'a str,
    patches: WorkbookCellPatches,
    diagnostics: Vec<SpecFieldDiagnostic>,
}

impl DocumentCellWriter<'_> {
    /// Queue `value` at `c_cell`. Empty values clear the template cell.
    fn put_text(&mut self, c_cell: &str, field: &str, value: &str) {
        let c_value = value.trim();
        match SpecCellRef::parse(c_cell) {
            Ok(cell) => {
                let patch = match c_value {
                    "" => CellPatch::Clear,
                    _ => CellPatch::Text(c_value.to_string()),
                };
                self.patches.set(self.c_sheet, cell, patch);
            }
            Err(e) => {
                warn!(
                    "Skipped `{field}` at invalid coordinate `{}`!{c_cell}: {e}",
                    self.c_sheet
                );
                self.diagnostics.push(SpecFieldDiagnostic {
                    kind: EnumDiagnosticKind::TemplateInjectionFailure,
                    sheet: self.c_sheet.to_string(),
                    cell: Some(c_cell.to_string()),
                    field: field.to_string(),
                    raw: c_value.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }
}
