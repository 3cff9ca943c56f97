//! `beaconkit_io_xlsx` v1:
//! Rust-side XLSX package kernel.
//!
//! Modules:
//! - `conf`           : constants and default presets
//! - `spec`           : cell/workbook models and the kernel error
//! - `util`           : pure helper functions (A1 refs, serial dates, XML text)
//! - `package`        : in-memory OPC package and workbook metadata
//! - `shared_strings` : shared string table decoding and appends
//! - `reader`         : workbook reader and sparse sheet grids
//! - `patch`          : part-preserving cell patches
//! - `archive`        : output zip archives
pub mod archive;
pub mod conf;
pub mod package;
pub mod patch;
pub mod reader;
pub mod shared_strings;
pub mod spec;
pub mod util;

pub use archive::{read_zip_entry_names, write_zip_archive};
pub use conf::{
    C_PART_CALC_CHAIN, C_PART_SHARED_STRINGS, C_PART_STYLES, C_PART_WORKBOOK, N_NCOLS_EXCEL_MAX,
    N_NROWS_EXCEL_MAX, derive_default_package_limits,
};
pub use package::XlsxPackage;
pub use patch::{CellPatch, WorkbookCellPatches, WorksheetCellPatches, apply_cell_patches};
pub use reader::{SheetGrid, XlsxWorkbook};
pub use spec::{
    EnumCellValue, SpecArchiveEntry, SpecCellRef, SpecSheetInfo, SpecWorkbookMeta,
    SpecXlsxPackageLimits, XlsxError,
};
pub use util::{
    convert_column_index_to_letters, convert_column_letters_to_index,
    convert_excel_serial_to_datetime, format_cell_ref, format_number_text, parse_cell_ref,
};
