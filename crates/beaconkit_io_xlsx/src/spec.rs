//! Shared XLSX kernel models and errors.

use std::fmt;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::util::{format_cell_ref, parse_cell_ref};

////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Kernel error for package inflation, XML decoding and archive writing.
#[derive(Debug, Error)]
pub enum XlsxError {
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("utf-8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("missing xlsx part: {0}")]
    MissingPart(String),
    #[error("invalid cell reference: `{0}`")]
    InvalidCellRef(String),
    #[error("invalid xlsx package: {0}")]
    Invalid(String),
    #[error("xlsx part is too large: {part} is {size} bytes (max {max} bytes)")]
    PartTooLarge { part: String, size: u64, max: u64 },
    #[error("xlsx package is too large: {total} bytes uncompressed (max {max} bytes)")]
    PackageTooLarge { total: u64, max: u64 },
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CellModels

/// Decoded worksheet cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum EnumCellValue {
    /// Missing/blank value.
    None,
    /// Text value (shared, inline or formula-string result).
    String(String),
    /// Numeric value without a date style.
    Number(f64),
    /// Boolean value.
    Bool(bool),
    /// Error code such as `#N/A`.
    Error(String),
    /// Numeric value carrying a date/time number format.
    DateTime(NaiveDateTime),
    /// Formula cell. `formula` is stored without the leading `=`.
    Formula {
        formula: String,
        cached: Option<Box<EnumCellValue>>,
    },
}

impl EnumCellValue {
    /// Whether the cell holds no value at all.
    pub fn is_none(&self) -> bool {
        matches!(self, EnumCellValue::None)
    }

    /// Formula text with its leading `=`, if this is a formula cell.
    pub fn formula_text(&self) -> Option<String> {
        match self {
            EnumCellValue::Formula { formula, .. } => Some(format!("={formula}")),
            _ => None,
        }
    }
}

/// 1-based cell coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpecCellRef {
    /// 1-based row index.
    pub row: u32,
    /// 1-based column index (`A` = 1).
    pub col: u32,
}

impl SpecCellRef {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Parse an `A1`-style reference (absolute markers allowed).
    pub fn parse(a1: &str) -> Result<Self, XlsxError> {
        parse_cell_ref(a1)
    }

    pub fn to_a1(&self) -> String {
        format_cell_ref(*self)
    }
}

impl fmt::Display for SpecCellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region WorkbookModels

/// One `<sheet>` entry of `xl/workbook.xml`, resolved to its worksheet part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecSheetInfo {
    /// Sheet tab name.
    pub name: String,
    /// Relationship id (`r:id`).
    pub rel_id: String,
    /// Resolved worksheet part name, e.g. `xl/worksheets/sheet1.xml`.
    pub part_name: String,
}

/// Workbook-level metadata read from `xl/workbook.xml`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpecWorkbookMeta {
    /// Sheets in tab order.
    pub sheets: Vec<SpecSheetInfo>,
    /// `workbookView/@activeTab`, defaults to 0.
    pub n_active_tab: usize,
    /// `workbookPr/@date1904`.
    pub if_date1904: bool,
}

/// Uncompressed size budget applied while inflating a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecXlsxPackageLimits {
    /// Maximum uncompressed bytes for any single part.
    pub max_part_bytes: u64,
    /// Maximum uncompressed bytes for the whole package.
    pub max_total_bytes: u64,
}

impl Default for SpecXlsxPackageLimits {
    fn default() -> Self {
        crate::conf::derive_default_package_limits()
    }
}

/// One named entry of an output zip archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecArchiveEntry {
    /// Entry file name inside the archive.
    pub name: String,
    /// Entry payload.
    pub bytes: Vec<u8>,
}

// #endregion
