#![deny(warnings)]

//! Plugin document assembly.
//!
//! A plugin document is the YAML sequence fed to the plugin compiler: a
//! `TES3` header entry followed by records. The header's `HEDR.records`
//! field must equal the number of entries after the header; it is always
//! recomputed here, never carried over.

use apparatus::Record;
use serde_yaml::{Mapping, Number, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid plugin header: {0}")]
    HeaderFormat(String),
    #[error("header says {recorded} records but document holds {actual}")]
    RecordCount { recorded: u64, actual: u64 },
}

fn hedr(entries: &[Value]) -> Option<&Mapping> {
    entries
        .first()?
        .get("TES3")?
        .as_sequence()?
        .first()?
        .get("HEDR")?
        .as_mapping()
}

fn hedr_mut(entries: &mut [Value]) -> Result<&mut Mapping, PluginError> {
    entries
        .first_mut()
        .and_then(|e| e.get_mut("TES3"))
        .and_then(Value::as_sequence_mut)
        .and_then(|fields| fields.first_mut())
        .and_then(|f| f.get_mut("HEDR"))
        .and_then(Value::as_mapping_mut)
        .ok_or_else(|| {
            PluginError::HeaderFormat("first entry must be TES3 starting with HEDR".to_string())
        })
}

/// Collects header, pass-through entries and generated records.
#[derive(Debug)]
pub struct PluginBuilder {
    entries: Vec<Value>,
}

impl PluginBuilder {
    /// Start from a header document (one or more entries, `TES3` first).
    pub fn new(header: Vec<Value>) -> Result<Self, PluginError> {
        let mut entries = header;
        hedr_mut(&mut entries)?;
        Ok(Self { entries })
    }

    /// Append an empty separator line and `line` to `HEDR.description`.
    pub fn append_description(mut self, line: &str) -> Result<Self, PluginError> {
        let hedr = hedr_mut(&mut self.entries)?;
        let key = Value::from("description");
        match hedr.get_mut(&key) {
            None | Some(Value::Null) => {
                hedr.insert(
                    key,
                    Value::Sequence(vec![Value::from(""), Value::from(line)]),
                );
            }
            Some(Value::Sequence(lines)) => {
                lines.push(Value::from(""));
                lines.push(Value::from(line));
            }
            Some(Value::String(text)) => {
                text.push_str("\n\n");
                text.push_str(line);
            }
            Some(_) => {
                return Err(PluginError::HeaderFormat(
                    "HEDR.description is neither a list nor a string".to_string(),
                ))
            }
        }
        Ok(self)
    }

    /// Append raw entries unchanged.
    pub fn extend<I: IntoIterator<Item = Value>>(mut self, entries: I) -> Self {
        self.entries.extend(entries);
        self
    }

    /// Append generated records in the given order.
    pub fn extend_records<'a, I: IntoIterator<Item = &'a Record>>(mut self, records: I) -> Self {
        self.entries.extend(records.into_iter().map(Record::to_value));
        self
    }

    /// Fix the record count and return the document.
    pub fn finish(self) -> Result<PluginDocument, PluginError> {
        let mut doc = PluginDocument {
            entries: self.entries,
        };
        doc.recount()?;
        Ok(doc)
    }
}

/// An assembled plugin document.
#[derive(Clone, Debug, PartialEq)]
pub struct PluginDocument {
    entries: Vec<Value>,
}

impl PluginDocument {
    /// Read a document as-is; the count is not checked.
    pub fn read(path: &Path) -> Result<Self, PluginError> {
        let text = fs::read_to_string(path).map_err(|source| PluginError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: Vec<Value> = serde_yaml::from_str(&text)?;
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[Value] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Count expected in the header: every entry but the header itself.
    pub fn expected_count(&self) -> u64 {
        self.entries.len().saturating_sub(1) as u64
    }

    /// Value currently stored in `HEDR.records`.
    pub fn recorded_count(&self) -> Option<u64> {
        hedr(&self.entries)?.get("records")?.as_u64()
    }

    /// Overwrite `HEDR.records` with the actual count.
    pub fn recount(&mut self) -> Result<u64, PluginError> {
        let count = self.expected_count();
        let hedr = hedr_mut(&mut self.entries)?;
        hedr.insert(Value::from("records"), Value::Number(Number::from(count)));
        Ok(count)
    }

    pub fn check_count(&self) -> Result<(), PluginError> {
        let actual = self.expected_count();
        match self.recorded_count() {
            Some(recorded) if recorded == actual => Ok(()),
            Some(recorded) => Err(PluginError::RecordCount { recorded, actual }),
            None => Err(PluginError::HeaderFormat(
                "HEDR.records is missing".to_string(),
            )),
        }
    }

    /// Serialize to YAML. Null values are kept as explicit `null`.
    pub fn to_yaml(&self) -> Result<String, PluginError> {
        self.check_count()?;
        Ok(serde_yaml::to_string(&self.entries)?)
    }

    pub fn write(&self, path: &Path) -> Result<(), PluginError> {
        let text = self.to_yaml()?;
        fs::write(path, text).map_err(|source| PluginError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), records = self.expected_count(), "wrote plugin document");
        Ok(())
    }
}

/// Re-read a document, recompute its record count and write it back.
pub fn recount_file(path: &Path) -> Result<u64, PluginError> {
    let mut doc = PluginDocument::read(path)?;
    let count = doc.recount()?;
    doc.write(path)?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use apparatus::records::ScriptRecord;
    use proptest::prelude::*;

    const HEADER: &str = r#"
- TES3:
    - HEDR:
        version: 1.3
        file_type: ESP
        author: A1
        description:
          - Alchemy apparatus
        records: 999
    - MAST: Morrowind.esm
    - DATA: 79837557
"#;

    fn header() -> Vec<Value> {
        serde_yaml::from_str(HEADER).unwrap()
    }

    fn script(name: &str) -> Record {
        Record::DelScript(ScriptRecord {
            name: name.to_string(),
            shorts: 0,
            lines: vec![format!("begin {name}"), "end".to_string()],
        })
    }

    fn extra(name: &str) -> Value {
        serde_yaml::from_str(&format!(
            "INGR:\n  - NAME: {name}\n  - SCRI: ~\n  - FNAM: \"\"\n"
        ))
        .unwrap()
    }

    #[test]
    fn count_covers_every_entry_but_the_header() {
        let records = vec![script("a_sc"), script("b_sc"), script("c_sc")];
        let doc = PluginBuilder::new(header())
            .unwrap()
            .extend(vec![extra("x"), extra("y")])
            .extend_records(&records)
            .finish()
            .unwrap();
        assert_eq!(doc.len(), 6);
        assert_eq!(doc.recorded_count(), Some(5));
        doc.check_count().unwrap();
    }

    #[test]
    fn description_gets_version_line() {
        let doc = PluginBuilder::new(header())
            .unwrap()
            .append_description("v7.1")
            .unwrap()
            .finish()
            .unwrap();
        let description = hedr(doc.entries())
            .unwrap()
            .get("description")
            .unwrap()
            .as_sequence()
            .unwrap();
        let lines: Vec<&str> = description.iter().filter_map(Value::as_str).collect();
        assert_eq!(lines, vec!["Alchemy apparatus", "", "v7.1"]);
    }

    #[test]
    fn string_description_is_extended() {
        let text = HEADER.replace("description:\n          - Alchemy apparatus", "description: Alchemy");
        let h: Vec<Value> = serde_yaml::from_str(&text).unwrap();
        let doc = PluginBuilder::new(h)
            .unwrap()
            .append_description("1.0")
            .unwrap()
            .finish()
            .unwrap();
        let d = hedr(doc.entries()).unwrap().get("description").unwrap();
        assert_eq!(d.as_str(), Some("Alchemy\n\n1.0"));
    }

    #[test]
    fn nulls_are_kept_explicit() {
        let doc = PluginBuilder::new(header())
            .unwrap()
            .extend(vec![extra("ingred_x")])
            .finish()
            .unwrap();
        let text = doc.to_yaml().unwrap();
        assert!(text.contains("SCRI: null"), "{text}");
        assert!(text.contains("FNAM: ''"), "{text}");
        let back: Vec<Value> = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back, doc.entries().to_vec());
    }

    #[test]
    fn header_must_start_with_hedr() {
        let bad: Vec<Value> = serde_yaml::from_str("- GLOB:\n    - NAME: x\n").unwrap();
        assert!(matches!(
            PluginBuilder::new(bad),
            Err(PluginError::HeaderFormat(_))
        ));
        assert!(matches!(
            PluginBuilder::new(Vec::new()),
            Err(PluginError::HeaderFormat(_))
        ));
    }

    #[test]
    fn stale_count_is_detected_and_fixed_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugin.esp.yaml");
        let mut text = HEADER.to_string();
        text.push_str("- INGR:\n    - NAME: one\n- INGR:\n    - NAME: two\n");
        fs::write(&path, text).unwrap();

        let doc = PluginDocument::read(&path).unwrap();
        assert!(matches!(
            doc.check_count(),
            Err(PluginError::RecordCount {
                recorded: 999,
                actual: 2
            })
        ));
        assert!(doc.to_yaml().is_err());

        assert_eq!(recount_file(&path).unwrap(), 2);
        let fixed = PluginDocument::read(&path).unwrap();
        assert_eq!(fixed.recorded_count(), Some(2));
        fixed.check_count().unwrap();
    }

    proptest! {
        #[test]
        fn count_always_matches(extra_headers in 0usize..3, extras in 0usize..10, generated in 0usize..20) {
            let mut h = header();
            for i in 0..extra_headers {
                h.push(extra(&format!("hdr_{i}")));
            }
            let records: Vec<Record> = (0..generated).map(|i| script(&format!("s{i}"))).collect();
            let doc = PluginBuilder::new(h)
                .unwrap()
                .extend((0..extras).map(|i| extra(&format!("e{i}"))))
                .extend_records(&records)
                .finish()
                .unwrap();
            let total = 1 + extra_headers + extras + generated;
            prop_assert_eq!(doc.len(), total);
            prop_assert_eq!(doc.recorded_count(), Some((total - 1) as u64));
        }
    }
}
