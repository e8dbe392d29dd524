//! Record generators.
//!
//! Every generator is a pure function of its arguments and returns one
//! [`Record`] ready to be placed into the plugin document.

use crate::GroupedIngredients;
use alchemy_core::{GeneratorConfig, Ingredient, Kind, Level};
use serde_yaml::{Mapping, Number, Value};

/// A generated plugin entry.
#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    AddItem(ItemRecord),
    AddScript(ScriptRecord),
    CheckScript(ScriptRecord),
    DelScript(ScriptRecord),
    LevelBook(BookRecord),
}

/// Apparatus item for one kind at one level.
#[derive(Clone, Debug, PartialEq)]
pub struct ItemRecord {
    /// Record id.
    pub name: String,
    pub model: String,
    /// Name shown in game.
    pub display_name: String,
    pub apparatus_type: String,
    /// Level divided by 100.
    pub quality: f64,
    pub weight: f64,
    pub value: u32,
    pub icon: String,
}

/// Script source. Compiled sizes stay zero; scripts are recompiled after
/// assembly.
#[derive(Clone, Debug, PartialEq)]
pub struct ScriptRecord {
    /// Script id, also the `begin` name.
    pub name: String,
    /// Number of `short` locals declared.
    pub shorts: u32,
    /// Source lines without terminators.
    pub lines: Vec<String>,
}

/// Level book.
#[derive(Clone, Debug, PartialEq)]
pub struct BookRecord {
    /// Record id.
    pub name: String,
    /// Mesh path.
    pub model: String,
    /// Display name with the level substituted.
    pub title: String,
    pub weight: f64,
    /// Gold value.
    pub value: u32,
    /// Inventory icon path.
    pub icon: String,
    /// Body with the level substituted.
    pub text: String,
}

impl Record {
    pub fn name(&self) -> &str {
        match self {
            Record::AddItem(r) => r.name.as_str(),
            Record::AddScript(r) | Record::CheckScript(r) | Record::DelScript(r) => r.name.as_str(),
            Record::LevelBook(r) => r.name.as_str(),
        }
    }

    /// Script payload, for script records.
    pub fn script(&self) -> Option<&ScriptRecord> {
        match self {
            Record::AddScript(r) | Record::CheckScript(r) | Record::DelScript(r) => Some(r),
            _ => None,
        }
    }

    /// Render as one plugin document entry: `{TAG: [{FIELD: value}, ...]}`.
    pub fn to_value(&self) -> Value {
        match self {
            Record::AddItem(r) => entry(
                "APPA",
                vec![
                    field("NAME", Value::from(r.name.as_str())),
                    field("MODL", Value::from(r.model.as_str())),
                    field("FNAM", Value::from(r.display_name.as_str())),
                    field(
                        "AADT",
                        mapping(vec![
                            ("kind", Value::from(r.apparatus_type.as_str())),
                            ("quality", Value::Number(Number::from(r.quality))),
                            ("weight", Value::Number(Number::from(r.weight))),
                            ("value", Value::Number(Number::from(r.value))),
                        ]),
                    ),
                    field("ITEX", Value::from(r.icon.as_str())),
                ],
            ),
            Record::AddScript(r) | Record::CheckScript(r) | Record::DelScript(r) => entry(
                "SCPT",
                vec![
                    field(
                        "SCHD",
                        mapping(vec![
                            ("name", Value::from(r.name.as_str())),
                            (
                                "vars",
                                mapping(vec![
                                    ("shorts", Value::Number(Number::from(r.shorts))),
                                    ("longs", Value::Number(Number::from(0u32))),
                                    ("floats", Value::Number(Number::from(0u32))),
                                ]),
                            ),
                            ("data_size", Value::Number(Number::from(0u32))),
                            ("var_table_size", Value::Number(Number::from(0u32))),
                        ]),
                    ),
                    field(
                        "SCTX",
                        Value::Sequence(r.lines.iter().map(|l| Value::from(l.as_str())).collect()),
                    ),
                ],
            ),
            Record::LevelBook(r) => entry(
                "BOOK",
                vec![
                    field("NAME", Value::from(r.name.as_str())),
                    field("MODL", Value::from(r.model.as_str())),
                    field("FNAM", Value::from(r.title.as_str())),
                    field(
                        "BKDT",
                        mapping(vec![
                            ("weight", Value::Number(Number::from(r.weight))),
                            ("value", Value::Number(Number::from(r.value))),
                            ("flags", Value::Number(Number::from(0u32))),
                            ("skill", Value::Number(Number::from(-1i32))),
                            ("enchantment", Value::Number(Number::from(0u32))),
                        ]),
                    ),
                    field("ITEX", Value::from(r.icon.as_str())),
                    field("TEXT", Value::from(r.text.as_str())),
                ],
            ),
        }
    }
}

fn mapping(entries: Vec<(&str, Value)>) -> Value {
    Value::Mapping(
        entries
            .into_iter()
            .map(|(k, v)| (Value::from(k), v))
            .collect::<Mapping>(),
    )
}

fn field(tag: &str, value: Value) -> Value {
    mapping(vec![(tag, value)])
}

fn entry(tag: &str, fields: Vec<Value>) -> Value {
    field(tag, Value::Sequence(fields))
}

pub fn item_name(prefix: &str, index: usize, level: Level) -> String {
    format!("{prefix}_Apparatus_{index:02}_{level}")
}

pub fn add_script_name(prefix: &str, index: usize, level: Level) -> String {
    format!("{prefix}_AddApparatus_{index:02}_{level}_sc")
}

pub fn check_script_name(prefix: &str, index: usize) -> String {
    format!("{prefix}_CheckApparatus_{index:02}_sc")
}

pub fn del_script_name(prefix: &str, index: usize) -> String {
    format!("{prefix}_DelApparatus_{index:02}_sc")
}

pub fn book_name(prefix: &str, level: u32) -> String {
    format!("{prefix}_LevelBook_{level:02}")
}

/// Apparatus item for `kind` at `level`.
pub fn add_item(config: &GeneratorConfig, kind: &Kind, index: usize, level: Level) -> Record {
    Record::AddItem(ItemRecord {
        name: item_name(&config.prefix, index, level),
        model: config.item.model.clone(),
        display_name: format!("{} ({})", kind.name, level),
        apparatus_type: config.item.apparatus_type.clone(),
        quality: f64::from(level.0) / 100.0,
        weight: config.item.weight,
        value: config.item.value,
        icon: config.item.icon.clone(),
    })
}

/// Script granting the `level` item when the player carries any grouped
/// ingredient. One branch per ingredient, no upper bound.
pub fn add_script(
    config: &GeneratorConfig,
    kind: &Kind,
    grouped: &GroupedIngredients<'_>,
    level: Level,
    index: usize,
) -> Record {
    let name = add_script_name(&config.prefix, index, level);
    let item = item_name(&config.prefix, index, level);
    let mut lines = vec![
        format!("begin {name}"),
        format!("; {} ({})", kind.name, level),
        String::new(),
        "short count".to_string(),
        String::new(),
        format!("if ( player->GetItemCount \"{item}\" > 0 )"),
        format!("\tstopscript {name}"),
        "\treturn".to_string(),
        "endif".to_string(),
        String::new(),
        "set count to 0".to_string(),
    ];
    lines.reserve(grouped.len() * 3);
    for member in grouped.members() {
        lines.push(format!(
            "if ( player->GetItemCount \"{}\" > 0 ) ; slot {}, potency {}",
            member.ingredient.name, member.slot, member.potency
        ));
        lines.push("\tset count to ( count + 1 )".to_string());
        lines.push("endif".to_string());
    }
    lines.extend([
        String::new(),
        "if ( count > 0 )".to_string(),
        format!("\tplayer->AddItem \"{item}\" 1"),
        "endif".to_string(),
        String::new(),
        format!("stopscript {name}"),
        String::new(),
        "end".to_string(),
    ]);
    Record::AddScript(ScriptRecord {
        name,
        shorts: 1,
        lines,
    })
}

fn remove_items(lines: &mut Vec<String>, prefix: &str, index: usize, levels: &[Level], indent: &str) {
    for level in levels {
        let item = item_name(prefix, index, *level);
        lines.push(format!("{indent}if ( player->GetItemCount \"{item}\" > 0 )"));
        lines.push(format!("{indent}\tplayer->RemoveItem \"{item}\" 1"));
        lines.push(format!("{indent}endif"));
    }
}

/// Script removing the kind's items once the player carries none of its
/// ingredients, then starting the next useful kind's check.
pub fn check_script(
    config: &GeneratorConfig,
    kind: &Kind,
    all_ingredients: &[Ingredient],
    index: usize,
    levels: &[Level],
    next: Option<usize>,
) -> Record {
    let name = check_script_name(&config.prefix, index);
    let mut lines = vec![
        format!("begin {name}"),
        format!("; {}", kind.name),
        String::new(),
        "short found".to_string(),
        String::new(),
        "set found to 0".to_string(),
    ];
    for ingredient in all_ingredients.iter().filter(|i| i.has_effect(kind)) {
        lines.push(format!(
            "if ( player->GetItemCount \"{}\" > 0 )",
            ingredient.name
        ));
        lines.push("\tset found to 1".to_string());
        lines.push("endif".to_string());
    }
    lines.push(String::new());
    lines.push("if ( found == 0 )".to_string());
    remove_items(&mut lines, &config.prefix, index, levels, "\t");
    lines.push("endif".to_string());
    lines.push(String::new());
    if let Some(next) = next {
        lines.push(format!(
            "startscript {}",
            check_script_name(&config.prefix, next)
        ));
    }
    lines.push(format!("stopscript {name}"));
    lines.push(String::new());
    lines.push("end".to_string());
    Record::CheckScript(ScriptRecord {
        name,
        shorts: 1,
        lines,
    })
}

/// Script removing every item of the kind, chained to the next useful kind.
pub fn del_script(
    config: &GeneratorConfig,
    kind: &Kind,
    index: usize,
    levels: &[Level],
    next: Option<usize>,
) -> Record {
    let name = del_script_name(&config.prefix, index);
    let mut lines = vec![
        format!("begin {name}"),
        format!("; {}", kind.name),
        String::new(),
    ];
    remove_items(&mut lines, &config.prefix, index, levels, "");
    lines.push(String::new());
    if let Some(next) = next {
        lines.push(format!(
            "startscript {}",
            del_script_name(&config.prefix, next)
        ));
    }
    lines.push(format!("stopscript {name}"));
    lines.push(String::new());
    lines.push("end".to_string());
    Record::DelScript(ScriptRecord {
        name,
        shorts: 0,
        lines,
    })
}

/// Book for one skill level; independent of ingredient data.
pub fn level_book(config: &GeneratorConfig, level: u32) -> Record {
    let level_text = level.to_string();
    Record::LevelBook(BookRecord {
        name: book_name(&config.prefix, level),
        model: config.book.model.clone(),
        title: config.book.title.replace("{level}", &level_text),
        weight: config.book.weight,
        value: config.book.value,
        icon: config.book.icon.clone(),
        text: config.book.text.replace("{level}", &level_text),
    })
}
