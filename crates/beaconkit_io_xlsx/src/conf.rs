//! XLSX package constants and default limit presets.

use crate::spec::SpecXlsxPackageLimits;

/// Excel worksheet maximum row count.
pub const N_NROWS_EXCEL_MAX: u32 = 1_048_576;
/// Excel worksheet maximum column count.
pub const N_NCOLS_EXCEL_MAX: u32 = 16_384;

/// Workbook part holding sheet names and relationship ids.
pub const C_PART_WORKBOOK: &str = "xl/workbook.xml";
/// Shared string table part.
pub const C_PART_SHARED_STRINGS: &str = "xl/sharedStrings.xml";
/// Stylesheet part (number formats and cell XFs).
pub const C_PART_STYLES: &str = "xl/styles.xml";
/// Calculation chain part, dropped whenever a formula cell is overwritten.
pub const C_PART_CALC_CHAIN: &str = "xl/calcChain.xml";
/// Package content-type manifest.
pub const C_PART_CONTENT_TYPES: &str = "[Content_Types].xml";

/// Default maximum uncompressed size of one zip part.
pub const N_BYTES_PART_MAX: u64 = 64 * 1024 * 1024;
/// Default maximum total uncompressed size of one package.
pub const N_BYTES_PACKAGE_MAX: u64 = 256 * 1024 * 1024;

/// Built-in `numFmtId`s that Excel renders as dates or times.
pub const TUP_BUILTIN_DATE_NUMFMT_IDS: [u32; 12] =
    [14, 15, 16, 17, 18, 19, 20, 21, 22, 45, 46, 47];

/// Build default package inflation limits.
pub fn derive_default_package_limits() -> SpecXlsxPackageLimits {
    SpecXlsxPackageLimits {
        max_part_bytes: N_BYTES_PART_MAX,
        max_total_bytes: N_BYTES_PACKAGE_MAX,
    }
}
