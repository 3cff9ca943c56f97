//! In-memory OPC package: zip entries inflated into a part map.

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::conf::C_PART_WORKBOOK;
use crate::spec::{SpecSheetInfo, SpecWorkbookMeta, SpecXlsxPackageLimits, XlsxError};
use crate::util::local_name;

/// XLSX package held as `part name -> bytes`.
///
/// Parts are kept verbatim; only parts explicitly replaced through
/// [`XlsxPackage::set_part`] differ when the package is written back.
#[derive(Debug, Clone, Default)]
pub struct XlsxPackage {
    parts: BTreeMap<String, Vec<u8>>,
}

impl XlsxPackage {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, XlsxError> {
        Self::from_bytes_limited(bytes, SpecXlsxPackageLimits::default())
    }

    /// Inflate every zip entry, enforcing per-part and total byte budgets.
    pub fn from_bytes_limited(
        bytes: &[u8],
        limits: SpecXlsxPackageLimits,
    ) -> Result<Self, XlsxError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;

        let mut parts = BTreeMap::new();
        let mut n_bytes_total: u64 = 0;
        for idx in 0..archive.len() {
            let file = archive.by_index(idx)?;
            if file.is_dir() {
                continue;
            }
            let c_name = file.name().to_string();
            if file.size() > limits.max_part_bytes {
                return Err(XlsxError::PartTooLarge {
                    part: c_name,
                    size: file.size(),
                    max: limits.max_part_bytes,
                });
            }

            // Declared sizes can lie; cap the actual read as well.
            let mut buf = Vec::new();
            file.take(limits.max_part_bytes + 1).read_to_end(&mut buf)?;
            let n_size = buf.len() as u64;
            if n_size > limits.max_part_bytes {
                return Err(XlsxError::PartTooLarge {
                    part: c_name,
                    size: n_size,
                    max: limits.max_part_bytes,
                });
            }

            n_bytes_total += n_size;
            if n_bytes_total > limits.max_total_bytes {
                return Err(XlsxError::PackageTooLarge {
                    total: n_bytes_total,
                    max: limits.max_total_bytes,
                });
            }
            parts.insert(c_name, buf);
        }

        Ok(Self { parts })
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        let name = name.strip_prefix('/').unwrap_or(name);
        self.parts.get(name).map(Vec::as_slice)
    }

    pub fn set_part(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.parts.insert(name.into(), bytes);
    }

    pub fn remove_part(&mut self, name: &str) -> Option<Vec<u8>> {
        self.parts.remove(name)
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }

    /// Re-pack all parts with deflate compression.
    pub fn write_to_bytes(&self) -> Result<Vec<u8>, XlsxError> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::FileOptions::<()>::default()
            .compression_method(zip::CompressionMethod::Deflated);

        for (name, bytes) in &self.parts {
            writer.start_file(name.as_str(), options)?;
            writer.write_all(bytes)?;
        }
        Ok(writer.finish()?.into_inner())
    }

    /// Read sheet list, active tab and date system from `xl/workbook.xml`.
    pub fn workbook_meta(&self) -> Result<SpecWorkbookMeta, XlsxError> {
        let workbook_xml = self
            .part(C_PART_WORKBOOK)
            .ok_or_else(|| XlsxError::MissingPart(C_PART_WORKBOOK.to_string()))?;
        let mut meta = parse_workbook_xml(workbook_xml)?;

        let c_rels_part = rels_part_name(C_PART_WORKBOOK);
        let dict_rels = match self.part(&c_rels_part) {
            Some(bytes) => parse_relationships(bytes)?,
            None => BTreeMap::new(),
        };
        for sheet in &mut meta.sheets {
            let rel = dict_rels.get(&sheet.rel_id).ok_or_else(|| {
                XlsxError::Invalid(format!(
                    "sheet `{}` references unknown relationship `{}`",
                    sheet.name, sheet.rel_id
                ))
            })?;
            sheet.part_name = resolve_target(C_PART_WORKBOOK, &rel.target);
        }
        Ok(meta)
    }
}

////////////////////////////////////////////////////////////////////////////////
// #region Relationships

/// One `<Relationship>` of a `.rels` part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecRelationship {
    pub id: String,
    pub type_uri: String,
    pub target: String,
}

/// `.rels` part name for a source part, e.g. `xl/_rels/workbook.xml.rels`.
pub fn rels_part_name(part_name: &str) -> String {
    match part_name.rsplit_once('/') {
        Some((c_dir, c_file)) => format!("{c_dir}/_rels/{c_file}.rels"),
        None => format!("_rels/{part_name}.rels"),
    }
}

/// Resolve a relationship target relative to its source part.
pub fn resolve_target(source_part: &str, target: &str) -> String {
    if let Some(c_absolute) = target.strip_prefix('/') {
        return c_absolute.to_string();
    }
    let mut l_segments: Vec<&str> = match source_part.rsplit_once('/') {
        Some((c_dir, _)) => c_dir.split('/').collect(),
        None => Vec::new(),
    };
    for c_segment in target.split('/') {
        match c_segment {
            "" | "." => {}
            ".." => {
                l_segments.pop();
            }
            _ => l_segments.push(c_segment),
        }
    }
    l_segments.join("/")
}

/// Parse a `.rels` part into `id -> relationship`.
pub fn parse_relationships(xml: &[u8]) -> Result<BTreeMap<String, SpecRelationship>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut dict_rels = BTreeMap::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e)
                if local_name(e.name().as_ref()) == b"Relationship" =>
            {
                let rel = SpecRelationship {
                    id: read_attr(e, b"Id")?.unwrap_or_default(),
                    type_uri: read_attr(e, b"Type")?.unwrap_or_default(),
                    target: read_attr(e, b"Target")?.unwrap_or_default(),
                };
                dict_rels.insert(rel.id.clone(), rel);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(dict_rels)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region WorkbookXml

/// Parse `xl/workbook.xml`; `part_name` of each sheet is left empty.
pub fn parse_workbook_xml(xml: &[u8]) -> Result<SpecWorkbookMeta, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut meta = SpecWorkbookMeta::default();
    let mut if_seen_view = false;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) | Event::Empty(ref e) => match local_name(e.name().as_ref()) {
                b"sheet" => {
                    let mut sheet = SpecSheetInfo {
                        name: String::new(),
                        rel_id: String::new(),
                        part_name: String::new(),
                    };
                    for attr in e.attributes() {
                        let attr = attr?;
                        let key = attr.key.as_ref();
                        if key == b"name" {
                            sheet.name = attr.unescape_value()?.into_owned();
                        } else if key != b"sheetId" && local_name(key) == b"id" {
                            sheet.rel_id = attr.unescape_value()?.into_owned();
                        }
                    }
                    meta.sheets.push(sheet);
                }
                b"workbookPr" => {
                    if let Some(c_flag) = read_attr(e, b"date1904")? {
                        meta.if_date1904 = matches!(c_flag.as_str(), "1" | "true");
                    }
                }
                b"workbookView" if !if_seen_view => {
                    if_seen_view = true;
                    if let Some(c_tab) = read_attr(e, b"activeTab")? {
                        meta.n_active_tab = c_tab.trim().parse().unwrap_or(0);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(meta)
}

/// Read one attribute by exact key.
pub(crate) fn read_attr(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, XlsxError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

// #endregion
