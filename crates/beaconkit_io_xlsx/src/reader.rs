//! Workbook reader: sheet lookup and sparse cell grids.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveDateTime};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::conf::{C_PART_SHARED_STRINGS, C_PART_STYLES, TUP_BUILTIN_DATE_NUMFMT_IDS};
use crate::package::{XlsxPackage, read_attr};
use crate::shared_strings::parse_shared_strings;
use crate::spec::{EnumCellValue, SpecCellRef, SpecSheetInfo, SpecWorkbookMeta, XlsxError};
use crate::util::{convert_excel_serial_to_datetime, is_date_format_code, local_name, parse_cell_ref};

static CELL_NONE: EnumCellValue = EnumCellValue::None;

////////////////////////////////////////////////////////////////////////////////
// #region SheetGrid

/// Sparse, 1-based view over one decoded worksheet.
#[derive(Debug, Clone, Default)]
pub struct SheetGrid {
    name: String,
    dict_cells: BTreeMap<(u32, u32), EnumCellValue>,
    n_max_row: u32,
    n_max_col: u32,
}

impl SheetGrid {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value at 1-based `(row, col)`; absent cells are `EnumCellValue::None`.
    pub fn cell(&self, row: u32, col: u32) -> &EnumCellValue {
        self.dict_cells.get(&(row, col)).unwrap_or(&CELL_NONE)
    }

    pub fn cell_at(&self, cell: SpecCellRef) -> &EnumCellValue {
        self.cell(cell.row, cell.col)
    }

    /// Last row holding a decoded value, 0 for an empty sheet.
    pub fn max_row(&self) -> u32 {
        self.n_max_row
    }

    pub fn max_col(&self) -> u32 {
        self.n_max_col
    }

    /// Number of non-empty cells.
    pub fn len(&self) -> usize {
        self.dict_cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dict_cells.is_empty()
    }

    fn insert(&mut self, cell: SpecCellRef, value: EnumCellValue) {
        if value.is_none() {
            return;
        }
        self.n_max_row = self.n_max_row.max(cell.row);
        self.n_max_col = self.n_max_col.max(cell.col);
        self.dict_cells.insert((cell.row, cell.col), value);
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Workbook

/// Read-only workbook: package, sheet list, shared strings and date styles.
#[derive(Debug, Clone)]
pub struct XlsxWorkbook {
    package: XlsxPackage,
    meta: SpecWorkbookMeta,
    l_shared_strings: Vec<String>,
    set_date_styles: BTreeSet<u32>,
}

impl XlsxWorkbook {
    pub fn open(bytes: &[u8]) -> Result<Self, XlsxError> {
        Self::from_package(XlsxPackage::from_bytes(bytes)?)
    }

    pub fn from_package(package: XlsxPackage) -> Result<Self, XlsxError> {
        let meta = package.workbook_meta()?;
        let l_shared_strings = match package.part(C_PART_SHARED_STRINGS) {
            Some(xml) => parse_shared_strings(xml)?,
            None => Vec::new(),
        };
        let set_date_styles = match package.part(C_PART_STYLES) {
            Some(xml) => parse_date_style_indices(xml)?,
            None => BTreeSet::new(),
        };
        Ok(Self {
            package,
            meta,
            l_shared_strings,
            set_date_styles,
        })
    }

    pub fn package(&self) -> &XlsxPackage {
        &self.package
    }

    pub fn into_package(self) -> XlsxPackage {
        self.package
    }

    pub fn meta(&self) -> &SpecWorkbookMeta {
        &self.meta
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.meta.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn has_sheet(&self, name: &str) -> bool {
        self.sheet_info(name).is_some()
    }

    pub fn sheet_info(&self, name: &str) -> Option<&SpecSheetInfo> {
        self.meta.sheets.iter().find(|s| s.name == name)
    }

    /// Sheet selected by `workbookView/@activeTab`, falling back to the first.
    pub fn active_sheet_name(&self) -> Option<&str> {
        self.meta
            .sheets
            .get(self.meta.n_active_tab)
            .or_else(|| self.meta.sheets.first())
            .map(|s| s.name.as_str())
    }

    /// Decode the named sheet; `Ok(None)` when the workbook has no such sheet.
    pub fn sheet(&self, name: &str) -> Result<Option<SheetGrid>, XlsxError> {
        let Some(info) = self.sheet_info(name) else {
            return Ok(None);
        };
        let xml = self
            .package
            .part(&info.part_name)
            .ok_or_else(|| XlsxError::MissingPart(info.part_name.clone()))?;
        let ctx = SpecDecodeContext {
            l_shared_strings: &self.l_shared_strings,
            set_date_styles: &self.set_date_styles,
            if_date1904: self.meta.if_date1904,
        };
        let mut grid = parse_worksheet_xml(xml, &ctx)?;
        grid.name = info.name.clone();
        Ok(Some(grid))
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Styles

/// Indices into `cellXfs` whose number format renders as a date or time.
pub fn parse_date_style_indices(xml: &[u8]) -> Result<BTreeSet<u32>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut dict_custom_formats: BTreeMap<u32, String> = BTreeMap::new();
    let mut l_xf_numfmt_ids: Vec<u32> = Vec::new();
    let mut if_in_cell_xfs = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) if local_name(e.name().as_ref()) == b"cellXfs" => {
                if_in_cell_xfs = true;
            }
            Event::Start(ref e) | Event::Empty(ref e) => match local_name(e.name().as_ref()) {
                b"numFmt" => {
                    let n_id = read_attr(e, b"numFmtId")?.and_then(|v| v.trim().parse().ok());
                    let c_code = read_attr(e, b"formatCode")?;
                    if let (Some(n_id), Some(c_code)) = (n_id, c_code) {
                        dict_custom_formats.insert(n_id, c_code);
                    }
                }
                b"xf" if if_in_cell_xfs => {
                    let n_id = read_attr(e, b"numFmtId")?
                        .and_then(|v| v.trim().parse().ok())
                        .unwrap_or(0);
                    l_xf_numfmt_ids.push(n_id);
                }
                _ => {}
            },
            Event::End(ref e) if local_name(e.name().as_ref()) == b"cellXfs" => {
                if_in_cell_xfs = false;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let set_date_styles = l_xf_numfmt_ids
        .iter()
        .enumerate()
        .filter(|(_, n_id)| match dict_custom_formats.get(*n_id) {
            Some(c_code) => is_date_format_code(c_code),
            None => TUP_BUILTIN_DATE_NUMFMT_IDS.contains(*n_id),
        })
        .map(|(idx, _)| idx as u32)
        .collect();
    Ok(set_date_styles)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Worksheet

/// Lookup tables needed to turn raw `<c>` payloads into values.
pub struct SpecDecodeContext<'a> {
    pub l_shared_strings: &'a [String],
    pub set_date_styles: &'a BTreeSet<u32>,
    pub if_date1904: bool,
}

#[derive(Debug, Default)]
struct SpecRawCell {
    c_type: Option<String>,
    n_style: Option<u32>,
    c_value: Option<String>,
    c_formula: Option<String>,
    c_inline: Option<String>,
}

/// Decode a worksheet part into a sparse grid.
pub fn parse_worksheet_xml(xml: &[u8], ctx: &SpecDecodeContext<'_>) -> Result<SheetGrid, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut grid = SheetGrid::default();
    let mut n_row_current: u32 = 0;
    let mut n_col_last: u32 = 0;
    loop {
        let event = reader.read_event_into(&mut buf)?;
        match &event {
            Event::Start(e) | Event::Empty(e) => match local_name(e.name().as_ref()) {
                b"row" => {
                    n_row_current = match read_attr(e, b"r")? {
                        Some(c_row) => c_row.trim().parse().map_err(|_| {
                            XlsxError::Invalid(format!("invalid row number `{c_row}`"))
                        })?,
                        None => n_row_current + 1,
                    };
                    n_col_last = 0;
                }
                b"c" => {
                    let (cell, mut raw) = read_cell_start(e, n_row_current, n_col_last)?;
                    n_col_last = cell.col;
                    if matches!(event, Event::Start(_)) {
                        read_cell_body(&mut reader, &mut raw)?;
                    }
                    grid.insert(cell, decode_cell(raw, ctx));
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(grid)
}

fn read_cell_start(
    e: &BytesStart<'_>,
    n_row_current: u32,
    n_col_last: u32,
) -> Result<(SpecCellRef, SpecRawCell), XlsxError> {
    let mut raw = SpecRawCell::default();
    let mut cell = SpecCellRef::new(n_row_current.max(1), n_col_last + 1);
    for attr in e.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"r" => cell = parse_cell_ref(&attr.unescape_value()?)?,
            b"t" => raw.c_type = Some(attr.unescape_value()?.into_owned()),
            b"s" => raw.n_style = attr.unescape_value()?.trim().parse().ok(),
            _ => {}
        }
    }
    Ok((cell, raw))
}

/// Collect `<v>`, `<f>` and `<is>` payloads up to the closing `</c>`.
fn read_cell_body(reader: &mut Reader<&[u8]>, raw: &mut SpecRawCell) -> Result<(), XlsxError> {
    let mut buf = Vec::new();
    let mut l_path: Vec<Vec<u8>> = Vec::new();
    let mut n_depth_phonetic = 0usize;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => {
                let c_local = local_name(e.name().as_ref()).to_vec();
                match c_local.as_slice() {
                    b"f" => {
                        raw.c_formula.get_or_insert_with(String::new);
                    }
                    b"is" => {
                        raw.c_inline.get_or_insert_with(String::new);
                    }
                    b"rPh" => n_depth_phonetic += 1,
                    _ => {}
                }
                l_path.push(c_local);
            }
            Event::Empty(ref e) if local_name(e.name().as_ref()) == b"f" => {
                raw.c_formula.get_or_insert_with(String::new);
            }
            Event::End(ref e) => {
                let c_name = e.name();
                let c_local = local_name(c_name.as_ref());
                if l_path.is_empty() && c_local == b"c" {
                    return Ok(());
                }
                if c_local == b"rPh" {
                    n_depth_phonetic = n_depth_phonetic.saturating_sub(1);
                }
                l_path.pop();
            }
            Event::Text(ref e) => {
                let c_text = e.unescape()?;
                match l_path.last().map(Vec::as_slice) {
                    Some(b"v") => raw.c_value.get_or_insert_with(String::new).push_str(&c_text),
                    Some(b"f") => raw.c_formula.get_or_insert_with(String::new).push_str(&c_text),
                    Some(b"t") if n_depth_phonetic == 0 => {
                        if let Some(c_inline) = raw.c_inline.as_mut() {
                            c_inline.push_str(&c_text);
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => return Err(XlsxError::Invalid("unterminated <c> element".to_string())),
            _ => {}
        }
        buf.clear();
    }
}

fn decode_cell(raw: SpecRawCell, ctx: &SpecDecodeContext<'_>) -> EnumCellValue {
    let SpecRawCell {
        c_type,
        n_style,
        c_value,
        c_formula,
        c_inline,
    } = raw;

    let value = match c_type.as_deref() {
        Some("s") => c_value
            .as_deref()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .and_then(|idx| ctx.l_shared_strings.get(idx))
            .map(|s| EnumCellValue::String(s.clone()))
            .unwrap_or(EnumCellValue::None),
        Some("inlineStr") => match c_inline.or(c_value) {
            Some(s) => EnumCellValue::String(s),
            None => EnumCellValue::None,
        },
        Some("str") => EnumCellValue::String(c_value.unwrap_or_default()),
        Some("b") => match c_value.as_deref().map(str::trim) {
            Some(v) => EnumCellValue::Bool(v == "1" || v.eq_ignore_ascii_case("true")),
            None => EnumCellValue::None,
        },
        Some("e") => match c_value {
            Some(v) => EnumCellValue::Error(v),
            None => EnumCellValue::None,
        },
        Some("d") => match c_value {
            Some(v) => parse_iso_datetime(&v)
                .map(EnumCellValue::DateTime)
                .unwrap_or(EnumCellValue::String(v)),
            None => EnumCellValue::None,
        },
        _ => match c_value.as_deref().map(str::trim) {
            Some(v) => match v.parse::<f64>() {
                Ok(x) => {
                    let if_date = n_style.is_some_and(|s| ctx.set_date_styles.contains(&s));
                    match if_date
                        .then(|| convert_excel_serial_to_datetime(x, ctx.if_date1904))
                        .flatten()
                    {
                        Some(dt) => EnumCellValue::DateTime(dt),
                        None => EnumCellValue::Number(x),
                    }
                }
                Err(_) => EnumCellValue::String(v.to_string()),
            },
            None => EnumCellValue::None,
        },
    };

    match c_formula {
        Some(formula) => EnumCellValue::Formula {
            formula,
            cached: (!value.is_none()).then(|| Box::new(value)),
        },
        None => value,
    }
}

fn parse_iso_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S").ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

// #endregion

#[cfg(test)]
mod tests {
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

    use super::*;

    fn build_fixture_workbook() -> Vec<u8> {
        let mut workbook = Workbook::new();
        let date_format = Format::new().set_num_format("dd/mm/yyyy");
        let dt_submit = ExcelDateTime::from_ymd(2024, 1, 31).expect("date");

        let sheet = workbook.add_worksheet();
        sheet.set_name("Devices").expect("sheet name");
        sheet.write_string(0, 1, "hwid").expect("write");
        sheet.write_string(1, 1, "HW1").expect("write");
        sheet.write_number(1, 2, 12345.0).expect("write");
        sheet.write_boolean(1, 3, true).expect("write");
        sheet
            .write_formula(1, 9, "=HYPERLINK(\"http://u\",\"open\")")
            .expect("write");
        sheet
            .write_datetime_with_format(3, 4, &dt_submit, &date_format)
            .expect("write");

        let sheet = workbook.add_worksheet();
        sheet.set_name("Info").expect("sheet name");
        sheet.write_string(1, 0, "  spaced ").expect("write");
        sheet.set_active(true);

        workbook.save_to_buffer().expect("save workbook")
    }

    #[test]
    fn test_open_lists_sheets_and_active_sheet() {
        let workbook = XlsxWorkbook::open(&build_fixture_workbook()).expect("open");
        assert_eq!(workbook.sheet_names(), vec!["Devices", "Info"]);
        assert_eq!(workbook.active_sheet_name(), Some("Info"));
        assert!(workbook.has_sheet("Devices"));
        assert!(!workbook.has_sheet("CustomerProfile"));
        assert!(workbook.sheet("CustomerProfile").expect("lookup").is_none());
    }

    #[test]
    fn test_sheet_decodes_strings_numbers_bools_formulas_and_dates() {
        let workbook = XlsxWorkbook::open(&build_fixture_workbook()).expect("open");
        let grid = workbook.sheet("Devices").expect("decode").expect("sheet");

        assert_eq!(grid.name(), "Devices");
        assert_eq!(grid.cell(1, 2), &EnumCellValue::String("hwid".to_string()));
        assert_eq!(grid.cell(2, 2), &EnumCellValue::String("HW1".to_string()));
        assert_eq!(grid.cell(2, 3), &EnumCellValue::Number(12345.0));
        assert_eq!(grid.cell(2, 4), &EnumCellValue::Bool(true));
        assert_eq!(
            grid.cell(2, 10).formula_text().as_deref(),
            Some("=HYPERLINK(\"http://u\",\"open\")")
        );
        match grid.cell(4, 5) {
            EnumCellValue::DateTime(dt) => {
                assert_eq!(dt.format("%d/%m/%Y").to_string(), "31/01/2024")
            }
            other => panic!("expected date cell, got {other:?}"),
        }
        assert_eq!(grid.cell(3, 2), &EnumCellValue::None);
        assert_eq!(grid.max_row(), 4);
        assert_eq!(grid.max_col(), 10);

        let grid_info = workbook.sheet("Info").expect("decode").expect("sheet");
        assert_eq!(grid_info.cell(2, 1), &EnumCellValue::String("  spaced ".to_string()));
    }

    #[test]
    fn test_parse_worksheet_xml_handles_inline_errors_and_implicit_refs() {
        let c_sheet = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>
<row r="2"><c r="A2" t="inlineStr"><is><r><t>Ac</t></r><r><t xml:space="preserve">me </t></r></is></c><c t="e"><v>#N/A</v></c><c s="1"><v>43830</v></c></row>
<row><c t="str"><f t="shared" si="0"/><v>cached</v></c><c r="C3" t="s"><v>0</v></c></row>
</sheetData></worksheet>"#;
        let l_shared_strings = vec!["shared".to_string()];
        let set_date_styles = BTreeSet::from([1]);
        let ctx = SpecDecodeContext {
            l_shared_strings: &l_shared_strings,
            set_date_styles: &set_date_styles,
            if_date1904: true,
        };

        let grid = parse_worksheet_xml(c_sheet.as_bytes(), &ctx).expect("parse");
        assert_eq!(grid.cell(2, 1), &EnumCellValue::String("Acme ".to_string()));
        assert_eq!(grid.cell(2, 2), &EnumCellValue::Error("#N/A".to_string()));
        match grid.cell(2, 3) {
            EnumCellValue::DateTime(dt) => {
                assert_eq!(dt.format("%Y-%m-%d").to_string(), "2024-01-01")
            }
            other => panic!("expected 1904 date, got {other:?}"),
        }
        assert_eq!(
            grid.cell(3, 1),
            &EnumCellValue::Formula {
                formula: String::new(),
                cached: Some(Box::new(EnumCellValue::String("cached".to_string()))),
            }
        );
        assert_eq!(grid.cell(3, 3), &EnumCellValue::String("shared".to_string()));
        assert_eq!(grid.len(), 5);
    }

    #[test]
    fn test_parse_date_style_indices_mixes_builtin_and_custom_formats() {
        let c_styles = r#"<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<numFmts count="2"><numFmt numFmtId="164" formatCode="dd/mm/yyyy"/><numFmt numFmtId="165" formatCode="0.000"/></numFmts>
<cellStyleXfs count="1"><xf numFmtId="14"/></cellStyleXfs>
<cellXfs count="5"><xf numFmtId="0"/><xf numFmtId="14"/><xf numFmtId="164"/><xf numFmtId="165"/><xf numFmtId="4"/></cellXfs>
</styleSheet>"#;
        let set_dates = parse_date_style_indices(c_styles.as_bytes()).expect("styles");
        assert_eq!(set_dates, BTreeSet::from([1, 2]));
    }
}
