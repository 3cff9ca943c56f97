//! Extraction/packaging report models and mutable report builders.

use std::collections::BTreeMap;
use std::fmt;

use crate::spec::{SpecFieldDiagnostic, SpecRecordSet, SpecSkippedDevice};

////////////////////////////////////////////////////////////////////////////////
// #region ReportExtract

/// Canonical records plus counters and diagnostics for one extraction pass.
#[derive(Debug, Default, Clone)]
pub struct ReportExtract {
    /// Extracted canonical records.
    pub records: SpecRecordSet,
    /// Profile rows whose label matched the label mapping.
    pub cnt_profile_fields: u64,
    /// Rows visited across all scanned sheets.
    pub cnt_rows_scanned: u64,
    /// Expected sheets present in the workbook.
    pub sheets_found: Vec<String>,
    /// Expected sheets absent from the workbook; their collections stay empty.
    pub sheets_missing: Vec<String>,
    /// Degraded fields.
    pub diagnostics: Vec<SpecFieldDiagnostic>,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
}

impl ReportExtract {
    pub fn device_count(&self) -> usize {
        self.records.devices.len()
    }

    pub fn info_count(&self) -> usize {
        self.records.info.len()
    }

    pub fn diagnostic_count(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Machine-readable counters.
    pub fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_devices".to_string(), self.device_count() as u64);
        dict_counts.insert("cnt_info".to_string(), self.info_count() as u64);
        dict_counts.insert("cnt_profile_fields".to_string(), self.cnt_profile_fields);
        dict_counts.insert("cnt_rows_scanned".to_string(), self.cnt_rows_scanned);
        dict_counts.insert(
            "cnt_sheets_missing".to_string(),
            self.sheets_missing.len() as u64,
        );
        dict_counts.insert(
            "cnt_diagnostics".to_string(),
            self.diagnostic_count() as u64,
        );
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        let dict_counts = self.to_dict();
        format!(
            "{prefix} devices={} info={} profile_fields={} rows_scanned={} sheets_missing={} diagnostics={} warnings={}",
            dict_counts["cnt_devices"],
            dict_counts["cnt_info"],
            dict_counts["cnt_profile_fields"],
            dict_counts["cnt_rows_scanned"],
            dict_counts["cnt_sheets_missing"],
            dict_counts["cnt_diagnostics"],
            dict_counts["cnt_warnings"]
        )
    }
}

impl fmt::Display for ReportExtract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[EXTRACT]"))
    }
}

/// Mutable accumulator for one extraction pass.
#[derive(Debug, Default, Clone)]
pub struct ReportExtractBuilder {
    pub records: SpecRecordSet,
    pub cnt_profile_fields: u64,
    pub cnt_rows_scanned: u64,
    pub sheets_found: Vec<String>,
    pub sheets_missing: Vec<String>,
    pub diagnostics: Vec<SpecFieldDiagnostic>,
    pub warnings: Vec<String>,
}

impl ReportExtractBuilder {
    pub fn add_rows_scanned(&mut self, n_rows: u64) {
        self.cnt_rows_scanned += n_rows;
    }

    pub fn add_profile_field(&mut self) {
        self.cnt_profile_fields += 1;
    }

    pub fn add_sheet(&mut self, sheet_name: &str, if_found: bool) {
        if if_found {
            self.sheets_found.push(sheet_name.to_string());
        } else {
            self.sheets_missing.push(sheet_name.to_string());
        }
    }

    pub fn add_diagnostic(&mut self, diagnostic: SpecFieldDiagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Finalize builder into immutable report.
    pub fn build(self) -> ReportExtract {
        ReportExtract {
            records: self.records,
            cnt_profile_fields: self.cnt_profile_fields,
            cnt_rows_scanned: self.cnt_rows_scanned,
            sheets_found: self.sheets_found,
            sheets_missing: self.sheets_missing,
            diagnostics: self.diagnostics,
            warnings: self.warnings,
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ReportPackage

/// Counters and diagnostics for one packaging run.
#[derive(Debug, Default, Clone)]
pub struct ReportPackage {
    /// Device records handed to the packager.
    pub cnt_devices: u64,
    /// Documents written into the archive.
    pub cnt_generated: u64,
    /// Archive entry names in extraction order.
    pub entry_names: Vec<String>,
    /// Devices omitted under the skip policy.
    pub skipped: Vec<SpecSkippedDevice>,
    /// Degraded fields across all generated documents.
    pub diagnostics: Vec<SpecFieldDiagnostic>,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
}

impl ReportPackage {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn diagnostic_count(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Machine-readable counters.
    pub fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_devices".to_string(), self.cnt_devices);
        dict_counts.insert("cnt_generated".to_string(), self.cnt_generated);
        dict_counts.insert("cnt_skipped".to_string(), self.skipped_count() as u64);
        dict_counts.insert(
            "cnt_diagnostics".to_string(),
            self.diagnostic_count() as u64,
        );
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        let dict_counts = self.to_dict();
        format!(
            "{prefix} devices={} generated={} skipped={} diagnostics={} warnings={}",
            dict_counts["cnt_devices"],
            dict_counts["cnt_generated"],
            dict_counts["cnt_skipped"],
            dict_counts["cnt_diagnostics"],
            dict_counts["cnt_warnings"]
        )
    }
}

impl fmt::Display for ReportPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[PACKAGE]"))
    }
}

/// Mutable accumulator for one packaging run.
#[derive(Debug, Default, Clone)]
pub struct ReportPackageBuilder {
    pub cnt_devices: u64,
    pub entry_names: Vec<String>,
    pub skipped: Vec<SpecSkippedDevice>,
    pub diagnostics: Vec<SpecFieldDiagnostic>,
    pub warnings: Vec<String>,
}

impl ReportPackageBuilder {
    pub fn add_generated(&mut self, entry_name: String, diagnostics: Vec<SpecFieldDiagnostic>) {
        self.entry_names.push(entry_name);
        self.diagnostics.extend(diagnostics);
    }

    pub fn add_skipped(&mut self, no: u32, hwid: String, exception: String) {
        self.skipped.push(SpecSkippedDevice { no, hwid, exception });
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    /// Finalize builder into immutable report.
    pub fn build(self) -> ReportPackage {
        ReportPackage {
            cnt_devices: self.cnt_devices,
            cnt_generated: self.entry_names.len() as u64,
            entry_names: self.entry_names,
            skipped: self.skipped,
            diagnostics: self.diagnostics,
            warnings: self.warnings,
        }
    }
}

// #endregion

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::SpecDeviceRecord;

    #[test]
    fn test_report_extract_to_dict_and_format() {
        let mut builder = ReportExtractBuilder::default();
        builder.records.devices.push(SpecDeviceRecord::default());
        builder.add_profile_field();
        builder.add_rows_scanned(4);
        builder.add_sheet("CustomerProfile", true);
        builder.add_sheet("Info", false);
        builder.add_warning("Missing sheet `Info`.".to_string());
        let report = builder.build();

        let dict_counts = report.to_dict();
        assert_eq!(dict_counts["cnt_devices"], 1);
        assert_eq!(dict_counts["cnt_info"], 0);
        assert_eq!(dict_counts["cnt_sheets_missing"], 1);
        assert_eq!(
            report.format("[EXTRACT]"),
            "[EXTRACT] devices=1 info=0 profile_fields=1 rows_scanned=4 sheets_missing=1 diagnostics=0 warnings=1"
        );
        assert_eq!(report.to_string(), report.format("[EXTRACT]"));
    }

    #[test]
    fn test_report_package_counts_generated_from_entries() {
        let mut builder = ReportPackageBuilder {
            cnt_devices: 3,
            ..ReportPackageBuilder::default()
        };
        builder.add_generated("a.xlsx".to_string(), Vec::new());
        builder.add_generated("b.xlsx".to_string(), Vec::new());
        builder.add_skipped(3, "HW3".to_string(), "boom".to_string());
        let report = builder.build();

        assert_eq!(report.cnt_generated, 2);
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(
            report.to_string(),
            "[PACKAGE] devices=3 generated=2 skipped=1 diagnostics=0 warnings=0"
        );
    }
}
