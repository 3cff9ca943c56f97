//! Part-preserving cell patches.
//!
//! Only the targeted worksheet parts (plus `xl/sharedStrings.xml` when new
//! strings are appended) are rewritten. Every other part is left untouched.

use std::collections::BTreeMap;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::conf::{C_PART_CALC_CHAIN, C_PART_CONTENT_TYPES, C_PART_SHARED_STRINGS, C_PART_WORKBOOK};
use crate::package::{XlsxPackage, read_attr, rels_part_name};
use crate::shared_strings::SharedStringsTable;
use crate::spec::{SpecCellRef, XlsxError};
use crate::util::{escape_xml_text, format_number_text, local_name, needs_space_preserve, parse_cell_ref};

////////////////////////////////////////////////////////////////////////////////
// #region PatchModels

/// New content for one cell. The existing style index is kept.
#[derive(Debug, Clone, PartialEq)]
pub enum CellPatch {
    /// Remove the value (and any formula) but keep the cell's style.
    Clear,
    /// Plain text value.
    Text(String),
    /// Numeric value.
    Number(f64),
}

/// Patches for one worksheet keyed by 1-based `(row, col)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorksheetCellPatches {
    cells: BTreeMap<(u32, u32), CellPatch>,
}

impl WorksheetCellPatches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, cell: SpecCellRef, patch: CellPatch) {
        self.cells.insert((cell.row, cell.col), patch);
    }

    pub fn get(&self, cell: SpecCellRef) -> Option<&CellPatch> {
        self.cells.get(&(cell.row, cell.col))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Group patches by row, each row's cells ordered by column.
    fn by_row(&self) -> BTreeMap<u32, Vec<(u32, &CellPatch)>> {
        let mut dict_rows: BTreeMap<u32, Vec<(u32, &CellPatch)>> = BTreeMap::new();
        for ((n_row, n_col), patch) in &self.cells {
            dict_rows.entry(*n_row).or_default().push((*n_col, patch));
        }
        dict_rows
    }
}

/// Patches for a workbook keyed by sheet name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkbookCellPatches {
    sheets: BTreeMap<String, WorksheetCellPatches>,
}

impl WorkbookCellPatches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sheet_mut(&mut self, sheet_name: &str) -> &mut WorksheetCellPatches {
        self.sheets.entry(sheet_name.to_string()).or_default()
    }

    pub fn set(&mut self, sheet_name: &str, cell: SpecCellRef, patch: CellPatch) {
        self.sheet_mut(sheet_name).set(cell, patch);
    }

    pub fn sheet(&self, sheet_name: &str) -> Option<&WorksheetCellPatches> {
        self.sheets.get(sheet_name)
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.values().all(WorksheetCellPatches::is_empty)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Apply

/// Apply `patches` to `pkg` in place.
pub fn apply_cell_patches(
    pkg: &mut XlsxPackage,
    patches: &WorkbookCellPatches,
) -> Result<(), XlsxError> {
    if patches.is_empty() {
        return Ok(());
    }
    let meta = pkg.workbook_meta()?;
    let mut sst = match pkg.part(C_PART_SHARED_STRINGS) {
        Some(xml) => Some(SharedStringsTable::from_xml(xml)?),
        None => None,
    };

    let mut if_formula_replaced = false;
    for (sheet_name, sheet_patches) in &patches.sheets {
        if sheet_patches.is_empty() {
            continue;
        }
        let info = meta
            .sheets
            .iter()
            .find(|s| &s.name == sheet_name)
            .ok_or_else(|| XlsxError::Invalid(format!("unknown sheet `{sheet_name}`")))?;
        let xml = pkg
            .part(&info.part_name)
            .ok_or_else(|| XlsxError::MissingPart(info.part_name.clone()))?;

        let mut patcher = WorksheetPatcher {
            dict_rows: sheet_patches.by_row(),
            sst: sst.as_mut(),
            c_prefix: String::new(),
            if_formula_replaced: false,
        };
        let patched = patcher.patch(xml)?;
        if_formula_replaced |= patcher.if_formula_replaced;
        pkg.set_part(info.part_name.clone(), patched);
    }

    if let Some(table) = sst.as_ref().filter(|t| t.is_dirty()) {
        let original = pkg
            .part(C_PART_SHARED_STRINGS)
            .ok_or_else(|| XlsxError::MissingPart(C_PART_SHARED_STRINGS.to_string()))?;
        let updated = table.write_xml(original)?;
        pkg.set_part(C_PART_SHARED_STRINGS, updated);
    }
    if if_formula_replaced {
        drop_calc_chain(pkg)?;
    }
    Ok(())
}

struct WorksheetPatcher<'p, 's> {
    dict_rows: BTreeMap<u32, Vec<(u32, &'p CellPatch)>>,
    sst: Option<&'s mut SharedStringsTable>,
    c_prefix: String,
    if_formula_replaced: bool,
}

impl WorksheetPatcher<'_, '_> {
    fn patch(&mut self, xml: &[u8]) -> Result<Vec<u8>, XlsxError> {
        let mut reader = Reader::from_reader(xml);
        let mut writer = Writer::new(Vec::with_capacity(xml.len() + 512));
        let mut buf = Vec::new();
        let mut if_seen_sheet_data = false;
        loop {
            let event = reader.read_event_into(&mut buf)?;
            match &event {
                Event::Start(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                    if_seen_sheet_data = true;
                    self.c_prefix = derive_prefix(e.name().as_ref());
                    writer.write_event(event.clone())?;
                    self.patch_sheet_data(&mut reader, &mut writer)?;
                }
                Event::Empty(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                    if_seen_sheet_data = true;
                    self.c_prefix = derive_prefix(e.name().as_ref());
                    writer.write_event(Event::Start(e.clone()))?;
                    self.write_pending_rows(&mut writer, u32::MAX)?;
                    writer.write_event(Event::End(BytesEnd::new(self.qualify("sheetData"))))?;
                }
                Event::End(e)
                    if local_name(e.name().as_ref()) == b"worksheet" && !if_seen_sheet_data =>
                {
                    self.c_prefix = derive_prefix(e.name().as_ref());
                    writer.write_event(Event::Start(BytesStart::new(self.qualify("sheetData"))))?;
                    self.write_pending_rows(&mut writer, u32::MAX)?;
                    writer.write_event(Event::End(BytesEnd::new(self.qualify("sheetData"))))?;
                    writer.write_event(event.clone())?;
                }
                Event::Eof => break,
                _ => writer.write_event(event.clone())?,
            }
            buf.clear();
        }
        Ok(writer.into_inner())
    }

    /// Copy `<sheetData>` children, splicing patched cells and new rows.
    fn patch_sheet_data(
        &mut self,
        reader: &mut Reader<&[u8]>,
        writer: &mut Writer<Vec<u8>>,
    ) -> Result<(), XlsxError> {
        let mut buf = Vec::new();
        let mut n_row_last: u32 = 0;
        loop {
            let event = reader.read_event_into(&mut buf)?;
            match &event {
                Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"row" => {
                    let n_row = match read_attr(e, b"r")? {
                        Some(c_row) => c_row.trim().parse().map_err(|_| {
                            XlsxError::Invalid(format!("invalid row number `{c_row}`"))
                        })?,
                        None => n_row_last + 1,
                    };
                    n_row_last = n_row;
                    self.write_pending_rows(writer, n_row)?;

                    let if_has_body = matches!(event, Event::Start(_));
                    match self.dict_rows.remove(&n_row) {
                        Some(l_cells) => {
                            writer.write_event(Event::Start(e.clone()))?;
                            if if_has_body {
                                self.patch_row(reader, writer, n_row, &l_cells)?;
                            } else {
                                for (n_col, patch) in &l_cells {
                                    self.write_cell(writer, SpecCellRef::new(n_row, *n_col), None, patch)?;
                                }
                                let c_row_name = String::from_utf8(e.name().as_ref().to_vec())?;
                                writer.write_event(Event::End(BytesEnd::new(c_row_name)))?;
                            }
                        }
                        None => writer.write_event(event.clone())?,
                    }
                }
                Event::End(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                    self.write_pending_rows(writer, u32::MAX)?;
                    writer.write_event(event.clone())?;
                    return Ok(());
                }
                Event::Eof => {
                    return Err(XlsxError::Invalid("unterminated <sheetData>".to_string()));
                }
                _ => writer.write_event(event.clone())?,
            }
            buf.clear();
        }
    }

    /// Copy one `<row>` body, replacing or inserting patched cells in column order.
    fn patch_row(
        &mut self,
        reader: &mut Reader<&[u8]>,
        writer: &mut Writer<Vec<u8>>,
        n_row: u32,
        l_cells: &[(u32, &CellPatch)],
    ) -> Result<(), XlsxError> {
        let mut buf = Vec::new();
        let mut idx = 0;
        let mut n_col_last: u32 = 0;
        loop {
            let event = reader.read_event_into(&mut buf)?;
            match &event {
                Event::Start(e) | Event::Empty(e) if local_name(e.name().as_ref()) == b"c" => {
                    let (n_col, c_style) = read_cell_col_and_style(e, n_col_last)?;
                    n_col_last = n_col;
                    while idx < l_cells.len() && l_cells[idx].0 < n_col {
                        let (n_col_new, patch) = l_cells[idx];
                        self.write_cell(writer, SpecCellRef::new(n_row, n_col_new), None, patch)?;
                        idx += 1;
                    }

                    if idx < l_cells.len() && l_cells[idx].0 == n_col {
                        if matches!(event, Event::Start(_)) && skip_cell_body(reader)? {
                            self.if_formula_replaced = true;
                        }
                        let patch = l_cells[idx].1;
                        self.write_cell(writer, SpecCellRef::new(n_row, n_col), c_style.as_deref(), patch)?;
                        idx += 1;
                    } else {
                        writer.write_event(event.clone())?;
                    }
                }
                Event::End(e) if local_name(e.name().as_ref()) == b"row" => {
                    for (n_col, patch) in &l_cells[idx..] {
                        self.write_cell(writer, SpecCellRef::new(n_row, *n_col), None, patch)?;
                    }
                    writer.write_event(event.clone())?;
                    return Ok(());
                }
                Event::Eof => return Err(XlsxError::Invalid("unterminated <row>".to_string())),
                _ => writer.write_event(event.clone())?,
            }
            buf.clear();
        }
    }

    /// Emit every pending patch row numbered below `n_row_bound`.
    fn write_pending_rows(
        &mut self,
        writer: &mut Writer<Vec<u8>>,
        n_row_bound: u32,
    ) -> Result<(), XlsxError> {
        loop {
            let Some(n_row) = self.dict_rows.keys().next().copied() else {
                break;
            };
            if n_row >= n_row_bound {
                break;
            }
            let Some(l_cells) = self.dict_rows.remove(&n_row) else {
                break;
            };
            let c_row_name = self.qualify("row");
            let c_row_num = n_row.to_string();
            let mut row = BytesStart::new(c_row_name.as_str());
            row.push_attribute(("r", c_row_num.as_str()));
            writer.write_event(Event::Start(row))?;
            for (n_col, patch) in &l_cells {
                self.write_cell(writer, SpecCellRef::new(n_row, *n_col), None, patch)?;
            }
            writer.write_event(Event::End(BytesEnd::new(c_row_name)))?;
        }
        Ok(())
    }

    fn write_cell(
        &mut self,
        writer: &mut Writer<Vec<u8>>,
        cell: SpecCellRef,
        c_style: Option<&str>,
        patch: &CellPatch,
    ) -> Result<(), XlsxError> {
        let c_cell_name = self.qualify("c");
        let c_a1 = cell.to_a1();
        let mut c = BytesStart::new(c_cell_name.as_str());
        c.push_attribute(("r", c_a1.as_str()));
        if let Some(c_style) = c_style {
            c.push_attribute(("s", c_style));
        }

        match patch {
            CellPatch::Clear => writer.write_event(Event::Empty(c))?,
            CellPatch::Number(x) => {
                writer.write_event(Event::Start(c))?;
                self.write_text_element(writer, "v", &format_number_text(*x))?;
                writer.write_event(Event::End(BytesEnd::new(c_cell_name)))?;
            }
            CellPatch::Text(c_text) => match self.sst.as_deref_mut() {
                Some(table) => {
                    let idx = table.get_or_insert(c_text);
                    c.push_attribute(("t", "s"));
                    writer.write_event(Event::Start(c))?;
                    self.write_text_element(writer, "v", &idx.to_string())?;
                    writer.write_event(Event::End(BytesEnd::new(c_cell_name)))?;
                }
                None => {
                    c.push_attribute(("t", "inlineStr"));
                    writer.write_event(Event::Start(c))?;
                    writer.write_event(Event::Start(BytesStart::new(self.qualify("is"))))?;
                    self.write_text_element(writer, "t", c_text)?;
                    writer.write_event(Event::End(BytesEnd::new(self.qualify("is"))))?;
                    writer.write_event(Event::End(BytesEnd::new(c_cell_name)))?;
                }
            },
        }
        Ok(())
    }

    fn write_text_element(
        &self,
        writer: &mut Writer<Vec<u8>>,
        local: &str,
        text: &str,
    ) -> Result<(), XlsxError> {
        let c_name = self.qualify(local);
        let mut element = BytesStart::new(c_name.as_str());
        if local == "t" && needs_space_preserve(text) {
            element.push_attribute(("xml:space", "preserve"));
        }
        writer.write_event(Event::Start(element))?;
        writer.write_event(Event::Text(BytesText::from_escaped(escape_xml_text(text))))?;
        writer.write_event(Event::End(BytesEnd::new(c_name)))?;
        Ok(())
    }

    fn qualify(&self, local: &str) -> String {
        if self.c_prefix.is_empty() {
            local.to_string()
        } else {
            format!("{}:{local}", self.c_prefix)
        }
    }
}

fn derive_prefix(name: &[u8]) -> String {
    match name.iter().rposition(|b| *b == b':') {
        Some(idx) => String::from_utf8_lossy(&name[..idx]).into_owned(),
        None => String::new(),
    }
}

fn read_cell_col_and_style(
    e: &BytesStart<'_>,
    n_col_last: u32,
) -> Result<(u32, Option<String>), XlsxError> {
    let mut n_col = n_col_last + 1;
    let mut c_style = None;
    for attr in e.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"r" => n_col = parse_cell_ref(&attr.unescape_value()?)?.col,
            b"s" => c_style = Some(attr.unescape_value()?.into_owned()),
            _ => {}
        }
    }
    Ok((n_col, c_style))
}

/// Consume a `<c>` body; returns whether it carried a formula.
fn skip_cell_body(reader: &mut Reader<&[u8]>) -> Result<bool, XlsxError> {
    let mut buf = Vec::new();
    let mut n_depth = 0usize;
    let mut if_formula = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => {
                if n_depth == 0 && local_name(e.name().as_ref()) == b"f" {
                    if_formula = true;
                }
                n_depth += 1;
            }
            Event::Empty(ref e) => {
                if n_depth == 0 && local_name(e.name().as_ref()) == b"f" {
                    if_formula = true;
                }
            }
            Event::End(_) if n_depth == 0 => return Ok(if_formula),
            Event::End(_) => n_depth -= 1,
            Event::Eof => return Err(XlsxError::Invalid("unterminated <c>".to_string())),
            _ => {}
        }
        buf.clear();
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region CalcChain

/// Remove `xl/calcChain.xml` with its relationship and content-type override.
fn drop_calc_chain(pkg: &mut XlsxPackage) -> Result<(), XlsxError> {
    if pkg.remove_part(C_PART_CALC_CHAIN).is_none() {
        return Ok(());
    }

    let c_rels_part = rels_part_name(C_PART_WORKBOOK);
    if let Some(xml) = pkg.part(&c_rels_part) {
        let filtered = filter_empty_elements(xml, b"Relationship", |e| {
            Ok(read_attr(e, b"Target")?.is_some_and(|t| t.ends_with("calcChain.xml")))
        })?;
        pkg.set_part(c_rels_part, filtered);
    }
    if let Some(xml) = pkg.part(C_PART_CONTENT_TYPES) {
        let c_part_name = format!("/{C_PART_CALC_CHAIN}");
        let filtered = filter_empty_elements(xml, b"Override", |e| {
            Ok(read_attr(e, b"PartName")?.is_some_and(|p| p == c_part_name))
        })?;
        pkg.set_part(C_PART_CONTENT_TYPES, filtered);
    }
    Ok(())
}

/// Copy `xml`, dropping empty `<local .../>` elements matching `if_drop`.
fn filter_empty_elements(
    xml: &[u8],
    local: &[u8],
    if_drop: impl Fn(&BytesStart<'_>) -> Result<bool, XlsxError>,
) -> Result<Vec<u8>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    let mut buf = Vec::new();
    loop {
        let event = reader.read_event_into(&mut buf)?;
        match &event {
            Event::Empty(e) if local_name(e.name().as_ref()) == local && if_drop(e)? => {}
            Event::Eof => break,
            _ => writer.write_event(event.clone())?,
        }
        buf.clear();
    }
    Ok(writer.into_inner())
}

// #endregion

#[cfg(test)]
mod tests {
    use rust_xlsxwriter::{Format, Workbook};

    use super::*;
    use crate::reader::XlsxWorkbook;
    use crate::spec::EnumCellValue;

    fn build_template() -> Vec<u8> {
        let mut workbook = Workbook::new();
        let bold = Format::new().set_bold();
        let sheet = workbook.add_worksheet();
        sheet.set_name("Form").expect("sheet name");
        sheet.write_string(6, 1, "Location").expect("write");
        sheet.write_string_with_format(6, 3, "[placeholder]", &bold).expect("write");
        sheet.write_formula(22, 3, "=1+1").expect("write");
        sheet.write_string(59, 10, "date").expect("write");
        workbook.save_to_buffer().expect("save template")
    }

    fn cell_ref(a1: &str) -> SpecCellRef {
        SpecCellRef::parse(a1).expect("cell ref")
    }

    fn find_cell_xml<'a>(sheet_xml: &'a str, a1: &str) -> &'a str {
        let c_needle = format!(r#"<c r="{a1}""#);
        let idx_start = sheet_xml.find(&c_needle).expect("cell present");
        let c_rest = &sheet_xml[idx_start..];
        let idx_end = c_rest
            .find("</c>")
            .map(|i| i + 4)
            .into_iter()
            .chain(c_rest.find("/>").map(|i| i + 2))
            .min()
            .expect("cell end");
        &c_rest[..idx_end]
    }

    #[test]
    fn test_apply_cell_patches_replaces_inserts_and_keeps_styles() {
        let mut pkg = XlsxPackage::from_bytes(&build_template()).expect("package");
        let c_app_before = pkg.part("docProps/app.xml").expect("app part").to_vec();
        let c_styles_before = pkg.part("xl/styles.xml").expect("styles part").to_vec();

        let mut patches = WorkbookCellPatches::new();
        patches.set("Form", cell_ref("D7"), CellPatch::Text("Bangkok".to_string()));
        patches.set("Form", cell_ref("A7"), CellPatch::Text("first".to_string()));
        patches.set("Form", cell_ref("D17"), CellPatch::Text("12345".to_string()));
        patches.set("Form", cell_ref("K60"), CellPatch::Text("31/01/2024".to_string()));
        patches.set("Form", cell_ref("F70"), CellPatch::Number(42.0));
        apply_cell_patches(&mut pkg, &patches).expect("apply");

        assert_eq!(pkg.part("docProps/app.xml"), Some(c_app_before.as_slice()));
        assert_eq!(pkg.part("xl/styles.xml"), Some(c_styles_before.as_slice()));

        let sheet_xml = std::str::from_utf8(pkg.part("xl/worksheets/sheet1.xml").expect("sheet"))
            .expect("utf8")
            .to_string();
        assert!(find_cell_xml(&sheet_xml, "D7").contains(r#"s="1""#), "{sheet_xml}");
        let idx_a7 = sheet_xml.find(r#"<c r="A7""#).expect("A7");
        let idx_b7 = sheet_xml.find(r#"<c r="B7""#).expect("B7");
        let idx_d7 = sheet_xml.find(r#"<c r="D7""#).expect("D7");
        assert!(idx_a7 < idx_b7 && idx_b7 < idx_d7);
        let idx_row17 = sheet_xml.find(r#"<row r="17""#).expect("row 17");
        let idx_row23 = sheet_xml.find(r#"<row r="23""#).expect("row 23");
        assert!(idx_row17 < idx_row23);

        let workbook = XlsxWorkbook::from_package(pkg).expect("reopen");
        let grid = workbook.sheet("Form").expect("decode").expect("sheet");
        assert_eq!(grid.cell(7, 4), &EnumCellValue::String("Bangkok".to_string()));
        assert_eq!(grid.cell(7, 1), &EnumCellValue::String("first".to_string()));
        assert_eq!(grid.cell(7, 2), &EnumCellValue::String("Location".to_string()));
        assert_eq!(grid.cell(17, 4), &EnumCellValue::String("12345".to_string()));
        assert_eq!(grid.cell(60, 11), &EnumCellValue::String("31/01/2024".to_string()));
        assert_eq!(grid.cell(70, 6), &EnumCellValue::Number(42.0));
        assert!(matches!(grid.cell(23, 4), EnumCellValue::Formula { .. }));
    }

    #[test]
    fn test_apply_cell_patches_over_formula_drops_calc_chain() {
        let mut pkg = XlsxPackage::from_bytes(&build_template()).expect("package");
        pkg.set_part(C_PART_CALC_CHAIN, br#"<calcChain><c r="D23" i="1"/></calcChain>"#.to_vec());

        let mut patches = WorkbookCellPatches::new();
        patches.set("Form", cell_ref("D23"), CellPatch::Text("HW1".to_string()));
        apply_cell_patches(&mut pkg, &patches).expect("apply");

        assert!(pkg.part(C_PART_CALC_CHAIN).is_none());
        let workbook = XlsxWorkbook::from_package(pkg).expect("reopen");
        let grid = workbook.sheet("Form").expect("decode").expect("sheet");
        assert_eq!(grid.cell(23, 4), &EnumCellValue::String("HW1".to_string()));
    }

    #[test]
    fn test_apply_cell_patches_without_shared_strings_writes_inline_text() {
        let c_sheet = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData/></worksheet>"#;
        let patch = CellPatch::Text(" a&b ".to_string());
        let mut patcher = WorksheetPatcher {
            dict_rows: BTreeMap::from([(2, vec![(3, &patch)])]),
            sst: None,
            c_prefix: String::new(),
            if_formula_replaced: false,
        };

        let c_out = String::from_utf8(patcher.patch(c_sheet.as_bytes()).expect("patch"))
            .expect("utf8");
        assert!(c_out.contains(
            r#"<sheetData><row r="2"><c r="C2" t="inlineStr"><is><t xml:space="preserve"> a&amp;b </t></is></c></row></sheetData>"#
        ), "{c_out}");
    }

    #[test]
    fn test_apply_cell_patches_rejects_unknown_sheet() {
        let mut pkg = XlsxPackage::from_bytes(&build_template()).expect("package");
        let mut patches = WorkbookCellPatches::new();
        patches.set("Missing", cell_ref("A1"), CellPatch::Clear);
        assert!(matches!(
            apply_cell_patches(&mut pkg, &patches),
            Err(XlsxError::Invalid(_))
        ));
    }
}
