#![deny(warnings)]

//! Core domain models and static configuration for the alchemy apparatus build.
//!
//! This crate defines the ingredient types shared by the loader, the record
//! generators and the plugin assembler, together with the generator
//! configuration (kinds, levels, potency table, record templates) and its
//! validation.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

/// Number of effect slots carried by every ingredient.
pub const EFFECT_SLOTS: usize = 4;

/// One magical effect occupying an ingredient slot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Effect {
    /// Effect identifier as stored in the ingredient data.
    pub index: i32,
    /// Attribute modifier, only meaningful for attribute effects.
    pub attribute: Option<i32>,
    /// Skill modifier, only meaningful for skill effects.
    pub skill: Option<i32>,
}

/// A slot is either empty or holds one complete effect.
pub type EffectSlot = Option<Effect>;

/// An alchemical ingredient.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    /// Record identifier, unique within a merged ingredient set.
    pub name: String,
    /// Mesh path, passed through untouched.
    pub model: String,
    /// Inventory icon path, passed through untouched.
    pub icon: String,
    /// Effects in slot order.
    pub effects: [EffectSlot; EFFECT_SLOTS],
}

impl Ingredient {
    /// Filled slots as `(slot, effect)` with 1-based slot numbers.
    pub fn effects(&self) -> impl Iterator<Item = (usize, &Effect)> {
        self.effects
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|e| (i + 1, e)))
    }

    /// Whether any slot carries the effect of `kind`, regardless of potency.
    pub fn has_effect(&self, kind: &Kind) -> bool {
        self.effects().any(|(_, e)| kind.matches(e))
    }
}

/// Listing order for ingredients: shorter names first, then lexicographic.
///
/// Length counts characters, not bytes, so non-ASCII names sort the same way
/// as their visible length suggests.
pub fn ingredient_order(a: &Ingredient, b: &Ingredient) -> Ordering {
    name_order(&a.name, &b.name)
}

/// Same ordering as [`ingredient_order`] on bare names.
pub fn name_order(a: &str, b: &str) -> Ordering {
    a.chars()
        .count()
        .cmp(&b.chars().count())
        .then_with(|| a.cmp(b))
}

/// An alchemical effect category an apparatus is generated for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kind {
    /// Stable identifier used by potency overrides.
    pub id: String,
    /// Display name used in generated item names.
    pub name: String,
    /// Effect index an ingredient slot must carry.
    pub effect: i32,
    /// Required attribute, for attribute-specific effects.
    #[serde(default)]
    pub attribute: Option<i32>,
    /// Required skill, for skill-specific effects.
    #[serde(default)]
    pub skill: Option<i32>,
}

impl Kind {
    /// Whether `effect` belongs to this kind.
    pub fn matches(&self, effect: &Effect) -> bool {
        effect.index == self.effect
            && self.attribute.map_or(true, |a| effect.attribute == Some(a))
            && self.skill.map_or(true, |s| effect.skill == Some(s))
    }
}

/// A quality tier threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Level(pub u32);

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical apparatus tiers.
pub const DEFAULT_LEVELS: [Level; 4] = [Level(15), Level(30), Level(45), Level(60)];

/// Number of level books generated by default.
pub const DEFAULT_BOOK_LEVELS: u32 = 100;

/// Lookup table mapping effect slots to potency, optionally per kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotencyPolicy {
    /// Potency of slots 1..=4 for kinds without an override.
    #[serde(default = "default_slot_potency")]
    pub default: [u32; EFFECT_SLOTS],
    /// Per-kind tables keyed by kind id.
    #[serde(default)]
    pub overrides: BTreeMap<String, [u32; EFFECT_SLOTS]>,
}

fn default_slot_potency() -> [u32; EFFECT_SLOTS] {
    [60, 45, 30, 15]
}

impl Default for PotencyPolicy {
    fn default() -> Self {
        Self {
            default: default_slot_potency(),
            overrides: BTreeMap::new(),
        }
    }
}

impl PotencyPolicy {
    /// Potency of the 1-based `slot` for `kind`; `None` outside `1..=4`.
    pub fn slot_potency(&self, kind: &Kind, slot: usize) -> Option<u32> {
        let table = self.overrides.get(&kind.id).unwrap_or(&self.default);
        table.get(slot.checked_sub(1)?).copied()
    }

    /// Best matching slot of `ingredient` for `kind` as `(slot, potency)`.
    ///
    /// Ties keep the earliest slot. `None` when no slot carries the effect.
    pub fn potency(&self, ingredient: &Ingredient, kind: &Kind) -> Option<(usize, u32)> {
        let mut best: Option<(usize, u32)> = None;
        for (slot, effect) in ingredient.effects() {
            if !kind.matches(effect) {
                continue;
            }
            let Some(p) = self.slot_potency(kind, slot) else {
                continue;
            };
            if best.map_or(true, |(_, b)| p > b) {
                best = Some((slot, p));
            }
        }
        best
    }
}

/// Template for generated apparatus items.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemTemplate {
    /// Mesh path.
    pub model: String,
    /// Inventory icon path.
    pub icon: String,
    /// Apparatus type written to `AADT.kind`.
    #[serde(default = "default_apparatus_type")]
    pub apparatus_type: String,
    #[serde(default)]
    pub weight: f64,
    /// Gold value.
    #[serde(default)]
    pub value: u32,
}

fn default_apparatus_type() -> String {
    "MortarPestle".to_string()
}

/// Template for level books. `{level}` in `title` and `text` is substituted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BookTemplate {
    /// Mesh path.
    pub model: String,
    /// Inventory icon path.
    pub icon: String,
    /// Display name.
    pub title: String,
    /// Book body.
    pub text: String,
    #[serde(default)]
    pub weight: f64,
    /// Gold value.
    #[serde(default)]
    pub value: u32,
}

/// Everything the record generators need besides ingredient data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Prefix of every generated record name, e.g. `A1V7`.
    pub prefix: String,
    /// Kinds in declaration order.
    pub kinds: Vec<Kind>,
    /// Apparatus tiers.
    #[serde(default = "default_levels")]
    pub levels: Vec<Level>,
    /// Level books cover `0..book_levels`.
    #[serde(default = "default_book_levels")]
    pub book_levels: u32,
    #[serde(default)]
    pub potency: PotencyPolicy,
    pub item: ItemTemplate,
    pub book: BookTemplate,
}

fn default_levels() -> Vec<Level> {
    DEFAULT_LEVELS.to_vec()
}

fn default_book_levels() -> u32 {
    DEFAULT_BOOK_LEVELS
}

/// Validation errors for the generator configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("record name prefix is empty")]
    EmptyPrefix,
    #[error("record name prefix {0:?} contains whitespace")]
    InvalidPrefix(String),
    #[error("no kinds configured")]
    NoKinds,
    #[error("duplicate kind id: {0}")]
    DuplicateKind(String),
    #[error("no apparatus levels configured")]
    NoLevels,
    #[error("duplicate level: {0}")]
    DuplicateLevel(u32),
    #[error("potency override for unknown kind: {0}")]
    UnknownPotencyKind(String),
}

impl GeneratorConfig {
    /// Check invariants the generators rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix.is_empty() {
            return Err(ConfigError::EmptyPrefix);
        }
        if self.prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidPrefix(self.prefix.clone()));
        }
        if self.kinds.is_empty() {
            return Err(ConfigError::NoKinds);
        }
        let mut ids: BTreeSet<&str> = BTreeSet::new();
        for k in &self.kinds {
            if !ids.insert(&k.id) {
                return Err(ConfigError::DuplicateKind(k.id.clone()));
            }
        }
        if self.levels.is_empty() {
            return Err(ConfigError::NoLevels);
        }
        let mut seen: BTreeSet<Level> = BTreeSet::new();
        for l in &self.levels {
            if !seen.insert(*l) {
                return Err(ConfigError::DuplicateLevel(l.0));
            }
        }
        for id in self.potency.overrides.keys() {
            if !ids.contains(id.as_str()) {
                return Err(ConfigError::UnknownPotencyKind(id.clone()));
            }
        }
        Ok(())
    }

    /// Validate and sort levels ascending.
    pub fn normalized(mut self) -> Result<Self, ConfigError> {
        self.validate()?;
        self.levels.sort();
        Ok(self)
    }

    /// Kinds paired with their 1-based declaration index.
    pub fn indexed_kinds(&self) -> impl Iterator<Item = (usize, &Kind)> {
        self.kinds.iter().enumerate().map(|(i, k)| (i + 1, k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn effect(index: i32) -> EffectSlot {
        Some(Effect {
            index,
            attribute: None,
            skill: None,
        })
    }

    fn ingredient(name: &str, effects: [EffectSlot; EFFECT_SLOTS]) -> Ingredient {
        Ingredient {
            name: name.to_string(),
            model: "m.nif".to_string(),
            icon: "i.dds".to_string(),
            effects,
        }
    }

    fn kind(id: &str, effect: i32) -> Kind {
        Kind {
            id: id.to_string(),
            name: id.to_string(),
            effect,
            attribute: None,
            skill: None,
        }
    }

    const CONFIG: &str = r#"
prefix: A1V7
kinds:
  - id: restore_health
    name: Restore Health
    effect: 75
  - id: fortify_strength
    name: Fortify Strength
    effect: 79
    attribute: 0
levels: [60, 15, 45, 30]
potency:
  overrides:
    restore_health: [50, 40, 30, 20]
item:
  model: m/apparatus.nif
  icon: m/apparatus.dds
book:
  model: m/book.nif
  icon: m/book.dds
  title: "Alchemy {level}"
  text: "Level {level}"
"#;

    fn config() -> GeneratorConfig {
        serde_yaml::from_str(CONFIG).unwrap()
    }

    #[test]
    fn config_parses_with_defaults() {
        let cfg = config().normalized().unwrap();
        assert_eq!(cfg.levels, DEFAULT_LEVELS.to_vec());
        assert_eq!(cfg.book_levels, 100);
        assert_eq!(cfg.potency.default, [60, 45, 30, 15]);
        assert_eq!(cfg.item.apparatus_type, "MortarPestle");
        assert_eq!(cfg.kinds[1].attribute, Some(0));
        let idx: Vec<usize> = cfg.indexed_kinds().map(|(i, _)| i).collect();
        assert_eq!(idx, vec![1, 2]);
    }

    #[test]
    fn config_rejects_duplicates_and_unknown_overrides() {
        let mut cfg = config();
        cfg.kinds.push(kind("restore_health", 1));
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::DuplicateKind("restore_health".into()))
        );

        let mut cfg = config();
        cfg.levels.push(Level(15));
        assert_eq!(cfg.validate(), Err(ConfigError::DuplicateLevel(15)));

        let mut cfg = config();
        cfg.potency.overrides.insert("nope".into(), [1, 1, 1, 1]);
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::UnknownPotencyKind("nope".into()))
        );

        let mut cfg = config();
        cfg.prefix = "A1 V7".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidPrefix(_))));

        let mut cfg = config();
        cfg.kinds.clear();
        assert_eq!(cfg.validate(), Err(ConfigError::NoKinds));
    }

    #[test]
    fn kind_matching_respects_attribute() {
        let k = Kind {
            attribute: Some(2),
            ..kind("fortify_agility", 79)
        };
        let hit = Effect {
            index: 79,
            attribute: Some(2),
            skill: None,
        };
        let miss = Effect {
            index: 79,
            attribute: Some(3),
            skill: None,
        };
        assert!(k.matches(&hit));
        assert!(!k.matches(&miss));
        assert!(kind("any_fortify", 79).matches(&miss));
    }

    #[test]
    fn potency_prefers_strongest_slot() {
        let policy = PotencyPolicy::default();
        let k = kind("restore_health", 75);
        let ing = ingredient("wickwheat", [effect(1), None, effect(75), effect(75)]);
        assert_eq!(policy.potency(&ing, &k), Some((3, 30)));
        let none = ingredient("ash", [effect(1), None, None, None]);
        assert_eq!(policy.potency(&none, &k), None);

        let cfg = config();
        let rh = &cfg.kinds[0];
        assert_eq!(cfg.potency.slot_potency(rh, 1), Some(50));
        assert_eq!(cfg.potency.slot_potency(&cfg.kinds[1], 1), Some(60));
        assert_eq!(cfg.potency.slot_potency(rh, 0), None);
        assert_eq!(cfg.potency.slot_potency(rh, EFFECT_SLOTS + 1), None);
    }

    #[test]
    fn short_names_sort_first() {
        let mut names = vec!["bbbb", "zzz", "aaaa", "abc"];
        names.sort_by(|a, b| name_order(a, b));
        assert_eq!(names, vec!["abc", "zzz", "aaaa", "bbbb"]);
    }

    proptest! {
        #[test]
        fn ordering_is_length_then_lexicographic(mut names in proptest::collection::vec("[a-zА-я]{1,8}", 0..20)) {
            names.sort_by(|a, b| name_order(a, b));
            for w in names.windows(2) {
                let (la, lb) = (w[0].chars().count(), w[1].chars().count());
                prop_assert!(la < lb || (la == lb && w[0] <= w[1]));
            }
        }

        #[test]
        fn potency_is_from_the_table(slot in 1usize..=4, effect_index in -1i32..100) {
            let k = kind("k", effect_index);
            let mut effects: [EffectSlot; EFFECT_SLOTS] = [None, None, None, None];
            effects[slot - 1] = effect(effect_index);
            let ing = ingredient("x", effects);
            let policy = PotencyPolicy::default();
            prop_assert_eq!(policy.potency(&ing, &k), Some((slot, policy.default[slot - 1])));
        }
    }
}
