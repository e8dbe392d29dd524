#![deny(warnings)]

//! Ingredient loading from disassembled plugin YAML, plus ordered merging of
//! several sources with last-writer-wins semantics.

use alchemy_core::{ingredient_order, Effect, EffectSlot, Ingredient, EFFECT_SLOTS};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Sentinel used by the source data for "no effect", "no attribute", "no skill".
const NONE_SENTINEL: i64 = -1;

/// Errors raised while reading ingredient data.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{}: top level is not a list of records", .path.display())]
    NotASequence { path: PathBuf },
    #[error("{}: record {record}: missing required field {field}", .path.display())]
    MissingField {
        path: PathBuf,
        record: usize,
        field: String,
    },
    #[error("{}: record {record}: field {field}: {reason}", .path.display())]
    InvalidField {
        path: PathBuf,
        record: usize,
        field: String,
        reason: String,
    },
}

/// Read the raw top-level records of a plugin YAML document.
///
/// An empty document yields no records.
pub fn load_records(path: &Path) -> Result<Vec<Value>, LoadError> {
    let text = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let doc: Value = serde_yaml::from_str(&text).map_err(|source| LoadError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    match doc {
        Value::Null => Ok(Vec::new()),
        Value::Sequence(records) => Ok(records),
        _ => Err(LoadError::NotASequence {
            path: path.to_path_buf(),
        }),
    }
}

/// Parse `path` and return an iterator over its ingredients.
///
/// The file is read once per call; records are converted as the iterator is
/// driven, so a malformed record surfaces when it is reached.
pub fn load_ingredients(path: &Path) -> Result<IngredientIter, LoadError> {
    let records = load_records(path)?;
    Ok(IngredientIter {
        path: path.to_path_buf(),
        records: records.into_iter().enumerate(),
    })
}

/// Ingredients of one source file, in file order.
#[derive(Debug)]
pub struct IngredientIter {
    path: PathBuf,
    records: std::iter::Enumerate<std::vec::IntoIter<Value>>,
}

impl Iterator for IngredientIter {
    type Item = Result<Ingredient, LoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        for (index, record) in self.records.by_ref() {
            let ctx = RecordCtx {
                path: &self.path,
                record: index,
            };
            match ctx.parse(&record) {
                Ok(Some(ingredient)) => return Some(Ok(ingredient)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

struct RecordCtx<'a> {
    path: &'a Path,
    record: usize,
}

impl RecordCtx<'_> {
    fn missing(&self, field: &str) -> LoadError {
        LoadError::MissingField {
            path: self.path.to_path_buf(),
            record: self.record,
            field: field.to_string(),
        }
    }

    fn invalid(&self, field: &str, reason: &str) -> LoadError {
        LoadError::InvalidField {
            path: self.path.to_path_buf(),
            record: self.record,
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }

    fn parse(&self, record: &Value) -> Result<Option<Ingredient>, LoadError> {
        let Some(fields) = record.get("INGR") else {
            debug!(record = self.record, "skipping non-ingredient record");
            return Ok(None);
        };
        let fields = self.flatten(fields)?;
        if fields.get("SCRI").is_some_and(|v| !v.is_null()) {
            debug!(record = self.record, "skipping scripted ingredient");
            return Ok(None);
        }

        let name = self.string(&fields, "NAME")?;
        let model = self.string(&fields, "MODL")?;
        let icon = self.string(&fields, "ITEX")?;
        let data = match fields.get("IRDT") {
            None | Some(Value::Null) => return Err(self.missing("IRDT")),
            Some(v) => v
                .as_mapping()
                .ok_or_else(|| self.invalid("IRDT", "expected a mapping"))?,
        };

        let mut effects: [EffectSlot; EFFECT_SLOTS] = Default::default();
        for (i, slot) in effects.iter_mut().enumerate() {
            *slot = self.effect(data, i + 1)?;
        }
        Ok(Some(Ingredient {
            name,
            model,
            icon,
            effects,
        }))
    }

    /// Merge the list of single-entry field maps into one mapping.
    fn flatten(&self, fields: &Value) -> Result<Mapping, LoadError> {
        let list = fields
            .as_sequence()
            .ok_or_else(|| self.invalid("INGR", "expected a list of fields"))?;
        let mut merged = Mapping::new();
        for field in list {
            let map = field
                .as_mapping()
                .ok_or_else(|| self.invalid("INGR", "field entry is not a mapping"))?;
            for (k, v) in map {
                merged.insert(k.clone(), v.clone());
            }
        }
        Ok(merged)
    }

    fn string(&self, fields: &Mapping, field: &str) -> Result<String, LoadError> {
        match fields.get(field) {
            None | Some(Value::Null) => Err(self.missing(field)),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(self.invalid(field, "expected a string")),
        }
    }

    fn int(&self, data: &Mapping, field: &str) -> Result<i32, LoadError> {
        let value = data.get(field).ok_or_else(|| self.missing(field))?;
        let n = value
            .as_i64()
            .ok_or_else(|| self.invalid(field, "expected an integer"))?;
        i32::try_from(n).map_err(|_| self.invalid(field, "integer out of range"))
    }

    /// Attribute or skill modifier: `-1` and null both mean none.
    fn modifier(&self, data: &Mapping, field: &str) -> Result<Option<i32>, LoadError> {
        if let Some(Value::Null) = data.get(field) {
            return Ok(None);
        }
        let v = self.int(data, field)?;
        Ok((i64::from(v) != NONE_SENTINEL).then_some(v))
    }

    fn effect(&self, data: &Mapping, slot: usize) -> Result<EffectSlot, LoadError> {
        let index = self.int(data, &format!("effect_{slot}_index"))?;
        let attribute = self.modifier(data, &format!("effect_{slot}_attribute"))?;
        let skill = self.modifier(data, &format!("effect_{slot}_skill"))?;
        if i64::from(index) == NONE_SENTINEL {
            return Ok(None);
        }
        Ok(Some(Effect {
            index,
            attribute,
            skill,
        }))
    }
}

/// Ingredients merged from several sources, keyed by name.
///
/// Sources are merged in call order; a later ingredient replaces an earlier
/// one with the same name as a whole record.
#[derive(Clone, Debug, Default)]
pub struct IngredientSet {
    by_name: BTreeMap<String, Ingredient>,
}

impl IngredientSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `items`, returning how many existing entries were replaced.
    pub fn merge<I: IntoIterator<Item = Ingredient>>(&mut self, items: I) -> usize {
        let mut replaced = 0;
        for ingredient in items {
            if self
                .by_name
                .insert(ingredient.name.clone(), ingredient)
                .is_some()
            {
                replaced += 1;
            }
        }
        replaced
    }

    /// Load one file and merge it. Nothing is merged if any record fails.
    pub fn merge_file(&mut self, path: &Path) -> Result<usize, LoadError> {
        let items = load_ingredients(path)?.collect::<Result<Vec<_>, _>>()?;
        let loaded = items.len();
        let replaced = self.merge(items);
        info!(path = %path.display(), loaded, replaced, "merged ingredients");
        Ok(loaded)
    }

    /// Merge every file of `paths` in order.
    pub fn load_all<P: AsRef<Path>>(paths: &[P]) -> Result<Self, LoadError> {
        let mut set = Self::new();
        for p in paths {
            set.merge_file(p.as_ref())?;
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Ingredient> {
        self.by_name.get(name)
    }

    /// All ingredients ordered by name length, then name.
    pub fn into_sorted(self) -> Vec<Ingredient> {
        let mut all: Vec<Ingredient> = self.by_name.into_values().collect();
        all.sort_by(ingredient_order);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;

    fn record(name: &str, model: &str, effects: [i32; 4], script: Option<&str>) -> String {
        let mut s = format!("- INGR:\n    - NAME: {name}\n    - MODL: {model}\n    - FNAM: {name}\n");
        if let Some(script) = script {
            s.push_str(&format!("    - SCRI: {script}\n"));
        }
        s.push_str("    - IRDT:\n        weight: 0.1\n        value: 1\n");
        for (i, e) in effects.iter().enumerate() {
            let n = i + 1;
            s.push_str(&format!(
                "        effect_{n}_index: {e}\n        effect_{n}_attribute: {}\n        effect_{n}_skill: -1\n",
                if *e == 79 { 3 } else { -1 }
            ));
        }
        s.push_str(&format!("    - ITEX: icons/{name}.dds\n"));
        s
    }

    fn write(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_fields_and_effects() {
        let f = write(&record("ingred_ash_yam_01", "n/ash_yam.nif", [79, 75, -1, 12], None));
        let all: Vec<Ingredient> = load_ingredients(f.path())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(all.len(), 1);
        let ing = &all[0];
        assert_eq!(ing.name, "ingred_ash_yam_01");
        assert_eq!(ing.model, "n/ash_yam.nif");
        assert_eq!(ing.icon, "icons/ingred_ash_yam_01.dds");
        assert_eq!(
            ing.effects[0],
            Some(Effect {
                index: 79,
                attribute: Some(3),
                skill: None
            })
        );
        assert_eq!(ing.effects[2], None);
        assert_eq!(ing.effects().count(), 3);
    }

    #[test]
    fn scripted_and_foreign_records_are_skipped() {
        let mut text = record("plain", "a.nif", [1, -1, -1, -1], None);
        text.push_str(&record("scripted", "b.nif", [1, -1, -1, -1], Some("some_sc")));
        text.push_str(&record("null_script", "c.nif", [1, -1, -1, -1], Some("~")));
        text.push_str("- GLOB:\n    - NAME: not_an_ingredient\n");
        let f = write(&text);
        let names: Vec<String> = load_ingredients(f.path())
            .unwrap()
            .map(|r| r.unwrap().name)
            .collect();
        assert_eq!(names, vec!["plain", "null_script"]);
    }

    #[test]
    fn missing_required_field_fails() {
        let text = record("broken", "a.nif", [1, -1, -1, -1], None).replace("    - MODL: a.nif\n", "");
        let f = write(&text);
        let err = load_ingredients(f.path())
            .unwrap()
            .next()
            .unwrap()
            .unwrap_err();
        match err {
            LoadError::MissingField { field, record, .. } => {
                assert_eq!(field, "MODL");
                assert_eq!(record, 0);
            }
            other => panic!("unexpected error: {other}"),
        }

        let text = record("broken", "a.nif", [1, -1, -1, -1], None)
            .replace("        effect_3_skill: -1\n", "");
        let f = write(&text);
        let err = IngredientSet::load_all(&[f.path()]).unwrap_err();
        assert!(matches!(err, LoadError::MissingField { ref field, .. } if field == "effect_3_skill"));
    }

    fn first_error(text: &str) -> LoadError {
        let f = write(text);
        load_ingredients(f.path())
            .unwrap()
            .next()
            .unwrap()
            .unwrap_err()
    }

    #[test]
    fn every_required_field_is_checked() {
        let base = record("broken", "a.nif", [1, -1, -1, -1], None);
        let cases = [
            ("NAME", "    - NAME: broken\n"),
            ("ITEX", "    - ITEX: icons/broken.dds\n"),
        ];
        for (field, line) in cases {
            let err = first_error(&base.replace(line, ""));
            assert!(
                matches!(err, LoadError::MissingField { field: ref f, .. } if f == field),
                "{field}: {err}"
            );
        }

        let start = base.find("    - IRDT:").unwrap();
        let end = base.find("    - ITEX:").unwrap();
        let without_irdt = format!("{}{}", &base[..start], &base[end..]);
        let err = first_error(&without_irdt);
        assert!(matches!(err, LoadError::MissingField { ref field, .. } if field == "IRDT"));
    }

    #[test]
    fn wrongly_typed_fields_are_invalid() {
        let base = record("broken", "a.nif", [1, -1, -1, -1], None);

        let start = base.find("    - IRDT:").unwrap();
        let end = base.find("    - ITEX:").unwrap();
        let scalar_irdt = format!("{}    - IRDT: 12\n{}", &base[..start], &base[end..]);
        let err = first_error(&scalar_irdt);
        assert!(matches!(err, LoadError::InvalidField { ref field, .. } if field == "IRDT"));

        let err = first_error(&base.replace("    - NAME: broken\n", "    - NAME: [1, 2]\n"));
        assert!(matches!(err, LoadError::InvalidField { ref field, .. } if field == "NAME"));

        let err = first_error(&base.replace("effect_1_index: 1", "effect_1_index: ~"));
        assert!(
            matches!(err, LoadError::InvalidField { ref field, .. } if field == "effect_1_index")
        );
    }

    #[test]
    fn null_modifiers_mean_none() {
        let text = record("dusty", "a.nif", [79, 12, -1, -1], None)
            .replace("effect_1_attribute: 3", "effect_1_attribute: ~")
            .replace("effect_2_skill: -1", "effect_2_skill: null");
        let f = write(&text);
        let ing = load_ingredients(f.path()).unwrap().next().unwrap().unwrap();
        assert_eq!(
            ing.effects[0],
            Some(Effect {
                index: 79,
                attribute: None,
                skill: None
            })
        );
        assert_eq!(ing.effects[1].as_ref().map(|e| e.skill), Some(None));
    }

    #[test]
    fn fields_split_across_maps_are_merged() {
        let text = "- INGR:\n    - NAME: split\n      MODL: m.nif\n    - ITEX: i.dds\n    - IRDT: {effect_1_index: 5, effect_1_attribute: -1, effect_1_skill: -1, effect_2_index: -1, effect_2_attribute: -1, effect_2_skill: -1, effect_3_index: -1, effect_3_attribute: -1, effect_3_skill: -1, effect_4_index: -1, effect_4_attribute: -1, effect_4_skill: -1}\n";
        let f = write(text);
        let ing = load_ingredients(f.path()).unwrap().next().unwrap().unwrap();
        assert_eq!(ing.model, "m.nif");
        assert_eq!(ing.effects().count(), 1);
    }

    #[test]
    fn empty_document_has_no_records() {
        let f = write("");
        assert_eq!(load_ingredients(f.path()).unwrap().count(), 0);
        let f = write("INGR: nope\n");
        assert!(matches!(
            load_records(f.path()),
            Err(LoadError::NotASequence { .. })
        ));
    }

    #[test]
    fn later_sources_replace_whole_records() {
        let a = write(&format!(
            "{}{}",
            record("shared", "old.nif", [1, 2, -1, -1], None),
            record("only_a", "a.nif", [3, -1, -1, -1], None)
        ));
        let b = write(&record("shared", "new.nif", [4, -1, -1, -1], None));
        let set = IngredientSet::load_all(&[a.path(), b.path()]).unwrap();
        assert_eq!(set.len(), 2);
        let shared = set.get("shared").unwrap();
        assert_eq!(shared.model, "new.nif");
        assert_eq!(shared.effects().count(), 1);
        assert_eq!(shared.effects[0].as_ref().unwrap().index, 4);
    }

    #[test]
    fn loading_twice_is_identical() {
        let mut text = String::new();
        for name in ["zeta", "alpha", "mid", "beta_longer"] {
            text.push_str(&record(name, "m.nif", [1, 2, 3, 4], None));
        }
        let f = write(&text);
        let first: Vec<Ingredient> = load_ingredients(f.path()).unwrap().map(Result::unwrap).collect();
        let second: Vec<Ingredient> = load_ingredients(f.path()).unwrap().map(Result::unwrap).collect();
        assert_eq!(first, second);
        let names: Vec<&str> = first.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid", "beta_longer"]);
    }

    proptest! {
        #[test]
        fn sorted_output_ignores_input_order(names in proptest::collection::btree_set("[a-z]{1,6}", 1..12)) {
            let make = |n: &String| Ingredient {
                name: n.clone(),
                model: String::new(),
                icon: String::new(),
                effects: Default::default(),
            };
            let mut forward = IngredientSet::new();
            forward.merge(names.iter().map(make));
            let mut backward = IngredientSet::new();
            backward.merge(names.iter().rev().map(make));
            let a = forward.into_sorted();
            let b = backward.into_sorted();
            prop_assert_eq!(&a, &b);
            for w in a.windows(2) {
                prop_assert!(w[0].name.len() <= w[1].name.len());
            }
        }
    }
}
