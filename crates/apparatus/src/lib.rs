#![deny(warnings)]

//! Ingredient-to-record expansion for the alchemy apparatus plugin.
//!
//! For every configured kind and level the qualifying ingredients are
//! selected and ordered, and the item/script records plus level books are
//! generated from them. Everything here is pure and deterministic.

pub mod records;

use alchemy_core::{ingredient_order, GeneratorConfig, Ingredient, Kind, Level, PotencyPolicy};
use tracing::{debug, info};

pub use records::Record;

/// An ingredient selected for a kind/level together with the slot that
/// qualified it.
#[derive(Clone, Debug, PartialEq)]
pub struct Member<'a> {
    pub ingredient: &'a Ingredient,
    /// 1-based slot carrying the kind's effect.
    pub slot: usize,
    pub potency: u32,
}

/// Qualifying ingredients ordered by name length, then name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GroupedIngredients<'a> {
    members: Vec<Member<'a>>,
}

impl<'a> GroupedIngredients<'a> {
    pub fn new(mut members: Vec<Member<'a>>) -> Self {
        members.sort_by(|a, b| ingredient_order(a.ingredient, b.ingredient));
        Self { members }
    }

    pub fn members(&self) -> &[Member<'a>] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.ingredient.name.as_str())
    }
}

/// Result of filtering. `Empty` marks a tier that is not useful, distinct
/// from a (possibly memberless) grouping.
#[derive(Clone, Debug, PartialEq)]
pub enum Grouping<'a> {
    Empty,
    Grouped(GroupedIngredients<'a>),
}

impl<'a> Grouping<'a> {
    pub fn is_empty(&self) -> bool {
        matches!(self, Grouping::Empty)
    }

    pub fn into_grouped(self) -> Option<GroupedIngredients<'a>> {
        match self {
            Grouping::Empty => None,
            Grouping::Grouped(g) => Some(g),
        }
    }
}

/// Select every ingredient whose potency for `kind` reaches `level`.
pub fn filter_and_group<'a>(
    ingredients: &'a [Ingredient],
    kind: &Kind,
    level: Level,
    policy: &PotencyPolicy,
) -> Grouping<'a> {
    let members: Vec<Member<'a>> = ingredients
        .iter()
        .filter_map(|ingredient| {
            let (slot, potency) = policy.potency(ingredient, kind)?;
            (potency >= level.0).then_some(Member {
                ingredient,
                slot,
                potency,
            })
        })
        .collect();
    if members.is_empty() {
        Grouping::Empty
    } else {
        Grouping::Grouped(GroupedIngredients::new(members))
    }
}

/// A kind with at least one useful tier.
#[derive(Clone, Debug)]
pub struct UsefulKind<'a> {
    /// 1-based declaration index.
    pub index: usize,
    pub kind: &'a Kind,
    /// Useful tiers, levels ascending.
    pub tiers: Vec<(Level, GroupedIngredients<'a>)>,
}

impl UsefulKind<'_> {
    pub fn levels(&self) -> Vec<Level> {
        self.tiers.iter().map(|(l, _)| *l).collect()
    }
}

/// Useful kinds in declaration order; kinds without any useful tier are left
/// out entirely.
pub fn useful_kinds<'a>(
    ingredients: &'a [Ingredient],
    config: &'a GeneratorConfig,
) -> Vec<UsefulKind<'a>> {
    let mut levels = config.levels.clone();
    levels.sort();
    let mut useful = Vec::new();
    for (index, kind) in config.indexed_kinds() {
        let tiers: Vec<(Level, GroupedIngredients<'a>)> = levels
            .iter()
            .filter_map(|level| {
                filter_and_group(ingredients, kind, *level, &config.potency)
                    .into_grouped()
                    .map(|g| (*level, g))
            })
            .collect();
        if tiers.is_empty() {
            debug!(kind = %kind.id, "kind has no qualifying ingredients");
            continue;
        }
        useful.push(UsefulKind { index, kind, tiers });
    }
    useful
}

/// All generated records, grouped in document order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Expansion {
    pub items: Vec<Record>,
    pub add_scripts: Vec<Record>,
    pub check_scripts: Vec<Record>,
    pub del_scripts: Vec<Record>,
    pub level_books: Vec<Record>,
    /// Ids of useful kinds, declaration order.
    pub useful_kinds: Vec<String>,
}

impl Expansion {
    /// Records in document order: items, add scripts, check scripts,
    /// delete scripts, level books.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.items
            .iter()
            .chain(&self.add_scripts)
            .chain(&self.check_scripts)
            .chain(&self.del_scripts)
            .chain(&self.level_books)
    }

    pub fn len(&self) -> usize {
        self.items.len()
            + self.add_scripts.len()
            + self.check_scripts.len()
            + self.del_scripts.len()
            + self.level_books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Generated script names in recompilation order: check, add, delete.
    pub fn script_names(&self) -> impl Iterator<Item = &str> {
        self.check_scripts
            .iter()
            .chain(&self.add_scripts)
            .chain(&self.del_scripts)
            .map(Record::name)
    }
}

/// Expand `ingredients` into every record of the apparatus plugin.
///
/// `ingredients` should already be in listing order; check scripts enumerate
/// them as given.
pub fn expand(ingredients: &[Ingredient], config: &GeneratorConfig) -> Expansion {
    let useful = useful_kinds(ingredients, config);
    let mut out = Expansion::default();

    for (pos, u) in useful.iter().enumerate() {
        let next = useful.get(pos + 1).map(|n| n.index);
        for (level, grouped) in &u.tiers {
            out.items
                .push(records::add_item(config, u.kind, u.index, *level));
            out.add_scripts
                .push(records::add_script(config, u.kind, grouped, *level, u.index));
        }
        let levels = u.levels();
        out.check_scripts.push(records::check_script(
            config,
            u.kind,
            ingredients,
            u.index,
            &levels,
            next,
        ));
        out.del_scripts
            .push(records::del_script(config, u.kind, u.index, &levels, next));
        out.useful_kinds.push(u.kind.id.clone());
    }

    out.level_books = (0..config.book_levels)
        .map(|level| records::level_book(config, level))
        .collect();

    info!(
        useful_kinds = out.useful_kinds.len(),
        items = out.items.len(),
        scripts = out.add_scripts.len() + out.check_scripts.len() + out.del_scripts.len(),
        books = out.level_books.len(),
        "expanded ingredient data"
    );
    out
}
