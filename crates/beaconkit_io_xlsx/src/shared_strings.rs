//! `xl/sharedStrings.xml` decoding and append-only updates.

use std::collections::HashMap;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::spec::XlsxError;
use crate::util::{escape_xml_text, local_name, needs_space_preserve};

/// Decode every `<si>` item to its plain text (phonetic runs skipped).
pub fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>, XlsxError> {
    Ok(parse_items(xml)?.into_iter().map(|(text, _)| text).collect())
}

/// Returns `(text, if_rich)` per `<si>`.
fn parse_items(xml: &[u8]) -> Result<Vec<(String, bool)>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut l_items = Vec::new();

    let mut c_text = String::new();
    let mut if_in_si = false;
    let mut if_in_t = false;
    let mut if_rich = false;
    let mut n_depth_phonetic = 0usize;
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => match local_name(e.name().as_ref()) {
                b"si" => {
                    if_in_si = true;
                    if_rich = false;
                    c_text.clear();
                }
                b"rPh" => n_depth_phonetic += 1,
                b"r" if if_in_si => if_rich = true,
                b"t" if if_in_si && n_depth_phonetic == 0 => if_in_t = true,
                _ => {}
            },
            Event::Empty(ref e) if local_name(e.name().as_ref()) == b"si" => {
                l_items.push((String::new(), false));
            }
            Event::End(ref e) => match local_name(e.name().as_ref()) {
                b"si" => {
                    if_in_si = false;
                    l_items.push((std::mem::take(&mut c_text), if_rich));
                }
                b"rPh" => n_depth_phonetic = n_depth_phonetic.saturating_sub(1),
                b"t" => if_in_t = false,
                _ => {}
            },
            Event::Text(ref e) if if_in_t => c_text.push_str(&e.unescape()?),
            Event::CData(ref e) if if_in_t => {
                c_text.push_str(&String::from_utf8(e.clone().into_inner().into_owned())?);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(l_items)
}

/// Shared string table that can append new plain items.
#[derive(Debug, Clone, Default)]
pub struct SharedStringsTable {
    l_items: Vec<String>,
    dict_plain_index: HashMap<String, u32>,
    l_appended: Vec<String>,
    n_refs_added: u64,
}

impl SharedStringsTable {
    pub fn from_xml(xml: &[u8]) -> Result<Self, XlsxError> {
        let mut table = Self::default();
        for (idx, (c_text, if_rich)) in parse_items(xml)?.into_iter().enumerate() {
            if !if_rich {
                table.dict_plain_index.entry(c_text.clone()).or_insert(idx as u32);
            }
            table.l_items.push(c_text);
        }
        Ok(table)
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.l_items.get(idx).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.l_items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.l_items.is_empty()
    }

    /// Whether any reference was added since loading.
    pub fn is_dirty(&self) -> bool {
        self.n_refs_added > 0
    }

    /// Index of a plain item with exactly `text`, appending one if needed.
    pub fn get_or_insert(&mut self, text: &str) -> u32 {
        self.n_refs_added += 1;
        if let Some(idx) = self.dict_plain_index.get(text) {
            return *idx;
        }
        let idx = self.l_items.len() as u32;
        self.l_items.push(text.to_string());
        self.l_appended.push(text.to_string());
        self.dict_plain_index.insert(text.to_string(), idx);
        idx
    }

    /// Rewrite `original` with appended items and updated counters.
    ///
    /// Existing items are copied through event-for-event.
    pub fn write_xml(&self, original: &[u8]) -> Result<Vec<u8>, XlsxError> {
        let mut reader = Reader::from_reader(original);
        let mut writer = Writer::new(Vec::with_capacity(original.len() + 64 * self.l_appended.len()));
        let mut buf = Vec::new();
        loop {
            let event = reader.read_event_into(&mut buf)?;
            match &event {
                Event::Start(e) if local_name(e.name().as_ref()) == b"sst" => {
                    writer.write_event(Event::Start(self.rewrite_counts(e)?))?;
                }
                Event::Empty(e) if local_name(e.name().as_ref()) == b"sst" => {
                    let c_name = String::from_utf8(e.name().as_ref().to_vec())?;
                    writer.write_event(Event::Start(self.rewrite_counts(e)?))?;
                    self.write_appended(&mut writer)?;
                    writer.write_event(Event::End(BytesEnd::new(c_name)))?;
                }
                Event::End(e) if local_name(e.name().as_ref()) == b"sst" => {
                    self.write_appended(&mut writer)?;
                    writer.write_event(event.clone())?;
                }
                Event::Eof => break,
                _ => writer.write_event(event.clone())?,
            }
            buf.clear();
        }
        Ok(writer.into_inner())
    }

    fn rewrite_counts(&self, e: &BytesStart<'_>) -> Result<BytesStart<'static>, XlsxError> {
        let mut sst = BytesStart::new(String::from_utf8(e.name().as_ref().to_vec())?);
        for attr in e.attributes() {
            let attr = attr?;
            match attr.key.as_ref() {
                b"count" => {
                    let n_count: u64 = attr.unescape_value()?.trim().parse().unwrap_or(0);
                    let c_count = (n_count + self.n_refs_added).to_string();
                    sst.push_attribute(("count", c_count.as_str()));
                }
                b"uniqueCount" => {
                    let c_unique = self.l_items.len().to_string();
                    sst.push_attribute(("uniqueCount", c_unique.as_str()));
                }
                _ => sst.push_attribute(attr),
            }
        }
        Ok(sst)
    }

    fn write_appended(&self, writer: &mut Writer<Vec<u8>>) -> Result<(), XlsxError> {
        for c_text in &self.l_appended {
            writer.write_event(Event::Start(BytesStart::new("si")))?;
            let mut t = BytesStart::new("t");
            if needs_space_preserve(c_text) {
                t.push_attribute(("xml:space", "preserve"));
            }
            writer.write_event(Event::Start(t))?;
            writer.write_event(Event::Text(BytesText::from_escaped(escape_xml_text(c_text))))?;
            writer.write_event(Event::End(BytesEnd::new("t")))?;
            writer.write_event(Event::End(BytesEnd::new("si")))?;
        }
        Ok(())
    }
}
