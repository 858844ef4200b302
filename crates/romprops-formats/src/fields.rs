//! Structured field records produced by the parsers
//!
//! Every container turns its headers into a [`RomFields`] list: ordered,
//! named values grouped into tabs. The list is presentation-neutral; the
//! `Display` impl gives a plain text dump and [`RomFields::to_json`] a
//! machine-readable one.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::image::Image;

/// Field display flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldFlags(u32);

impl FieldFlags {
    /// No flags
    pub const NONE: Self = Self(0);
    /// Value is a warning shown to the user
    pub const WARNING: Self = Self(1 << 0);
    /// Value should be rendered in a monospace font
    pub const MONOSPACE: Self = Self(1 << 1);

    /// Whether all bits of `other` are set
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

impl std::ops::BitOr for FieldFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Number of age rating slots
pub const AGE_RATINGS_COUNT: usize = 16;

/// Age rating flag bits stored alongside the age (low 5 bits)
pub mod age_rating {
    /// Age mask
    pub const AGE_MASK: u16 = 0x1F;
    /// Rating is in use
    pub const ACTIVE: u16 = 0x0800;
    /// Rating pending
    pub const PENDING: u16 = 0x1000;
    /// Content may change online
    pub const ONLINE_PLAY: u16 = 0x2000;
    /// Prohibited in this territory
    pub const PROHIBITED: u16 = 0x4000;

    /// Japan (CERO)
    pub const JAPAN: usize = 0;
    /// USA (ESRB)
    pub const USA: usize = 1;
    /// Germany (USK)
    pub const GERMANY: usize = 3;
    /// Europe (PEGI)
    pub const EUROPE: usize = 4;
    /// Finland (MEKU)
    pub const FINLAND: usize = 5;
    /// Portugal (PEGI-PT)
    pub const PORTUGAL: usize = 6;
    /// England (BBFC)
    pub const ENGLAND: usize = 7;
    /// Australia (ACB)
    pub const AUSTRALIA: usize = 8;
    /// South Korea (GRB)
    pub const SOUTH_KOREA: usize = 9;
    /// Taiwan (CGSRR)
    pub const TAIWAN: usize = 10;
}

/// Normalized per-territory age ratings
pub type AgeRatings = [u16; AGE_RATINGS_COUNT];

/// Rows of a list field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListRows {
    /// Language-independent rows
    Single(Vec<Vec<String>>),
    /// Rows per language code
    Multi {
        /// Rows keyed by language code
        by_language: BTreeMap<String, Vec<Vec<String>>>,
        /// Preferred language code
        default_lc: String,
    },
}

/// Tabular field, e.g. an achievement list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListData {
    /// Column headers
    pub headers: Vec<String>,
    /// Row data
    pub rows: ListRows,
    /// Optional icon per row
    pub icons: Vec<Option<Image>>,
}

impl ListData {
    /// Rows for the preferred language (or the only set of rows)
    pub fn default_rows(&self) -> &[Vec<String>] {
        match &self.rows {
            ListRows::Single(rows) => rows,
            ListRows::Multi {
                by_language,
                default_lc,
            } => by_language
                .get(default_lc)
                .or_else(|| by_language.values().next())
                .map_or(&[], Vec::as_slice),
        }
    }
}

/// A field value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Plain string
    String(String),
    /// One string per language code
    StringMulti {
        /// Strings keyed by language code
        strings: BTreeMap<String, String>,
        /// Preferred language code
        default_lc: String,
    },
    /// Bitfield with one name per bit
    Bitfield {
        /// Bit names, bit 0 first
        names: Vec<String>,
        /// Suggested names per row when displayed
        per_row: u32,
        /// Bit values
        value: u32,
    },
    /// Seconds since the Unix epoch
    DateTime(i64),
    /// Age ratings
    AgeRatings(AgeRatings),
    /// Tabular data
    ListData(ListData),
}

/// A named field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    /// Field name
    pub name: String,
    /// Tab index
    pub tab: usize,
    /// Display flags
    pub flags: FieldFlags,
    /// Value
    pub value: FieldValue,
}

impl Field {
    /// The value as a plain string, if it is one
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Ordered collection of fields grouped into tabs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RomFields {
    tabs: Vec<String>,
    fields: Vec<Field>,
    #[serde(skip)]
    current_tab: usize,
}

impl Default for RomFields {
    fn default() -> Self {
        Self::new()
    }
}

impl RomFields {
    /// Create an empty field list with one unnamed tab
    pub fn new() -> Self {
        Self {
            tabs: vec![String::new()],
            fields: Vec::new(),
            current_tab: 0,
        }
    }

    /// Name a tab, creating intermediate tabs if needed
    pub fn set_tab_name(&mut self, index: usize, name: impl Into<String>) {
        if self.tabs.len() <= index {
            self.tabs.resize(index + 1, String::new());
        }
        self.tabs[index] = name.into();
    }

    /// Append a tab and make it current
    pub fn add_tab(&mut self, name: impl Into<String>) -> usize {
        self.tabs.push(name.into());
        self.current_tab = self.tabs.len() - 1;
        self.current_tab
    }

    /// Tab names
    pub fn tabs(&self) -> &[String] {
        &self.tabs
    }

    /// All fields in insertion order
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no fields were added
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// First field with the given name
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// First plain-string field with the given name
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Field::as_str)
    }

    /// Warning fields
    pub fn warnings(&self) -> impl Iterator<Item = &Field> {
        self.fields
            .iter()
            .filter(|f| f.flags.contains(FieldFlags::WARNING))
    }

    fn push(&mut self, name: impl Into<String>, flags: FieldFlags, value: FieldValue) {
        self.fields.push(Field {
            name: name.into(),
            tab: self.current_tab,
            flags,
            value,
        });
    }

    /// Add a string field
    pub fn add_string(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.push(name, FieldFlags::NONE, FieldValue::String(value.into()));
    }

    /// Add a string field with display flags
    pub fn add_string_flags(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        flags: FieldFlags,
    ) {
        self.push(name, flags, FieldValue::String(value.into()));
    }

    /// Add a warning field
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.push("Warning", FieldFlags::WARNING, FieldValue::String(message.into()));
    }

    /// Add a multi-language string field
    pub fn add_string_multi(
        &mut self,
        name: impl Into<String>,
        strings: BTreeMap<String, String>,
        default_lc: impl Into<String>,
    ) {
        self.push(
            name,
            FieldFlags::NONE,
            FieldValue::StringMulti {
                strings,
                default_lc: default_lc.into(),
            },
        );
    }

    /// Add a bitfield
    pub fn add_bitfield(
        &mut self,
        name: impl Into<String>,
        names: &[&str],
        per_row: u32,
        value: u32,
    ) {
        self.push(
            name,
            FieldFlags::NONE,
            FieldValue::Bitfield {
                names: names.iter().map(|s| (*s).to_string()).collect(),
                per_row,
                value,
            },
        );
    }

    /// Add a timestamp
    pub fn add_date_time(&mut self, name: impl Into<String>, unix_seconds: i64) {
        self.push(name, FieldFlags::NONE, FieldValue::DateTime(unix_seconds));
    }

    /// Add age ratings
    pub fn add_age_ratings(&mut self, name: impl Into<String>, ratings: AgeRatings) {
        self.push(name, FieldFlags::NONE, FieldValue::AgeRatings(ratings));
    }

    /// Add tabular data
    pub fn add_list_data(&mut self, name: impl Into<String>, data: ListData) {
        self.push(name, FieldFlags::NONE, FieldValue::ListData(data));
    }

    /// Append another field list, giving each of its tabs a new tab here
    pub fn add_fields_with_tabs(&mut self, other: &Self) {
        let base = self.tabs.len();
        self.tabs.extend(other.tabs.iter().cloned());
        for field in &other.fields {
            let mut field = field.clone();
            field.tab += base;
            self.fields.push(field);
        }
    }

    /// Serialize as pretty JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn fmt_value(f: &mut fmt::Formatter<'_>, value: &FieldValue) -> fmt::Result {
    match value {
        FieldValue::String(s) => write!(f, "{s}"),
        FieldValue::StringMulti {
            strings,
            default_lc,
        } => {
            let s = strings
                .get(default_lc)
                .or_else(|| strings.values().next())
                .map_or("", String::as_str);
            write!(f, "{s}")
        }
        FieldValue::Bitfield { names, value, .. } => {
            let set: Vec<&str> = names
                .iter()
                .enumerate()
                .filter(|(i, n)| *i < 32 && value & (1 << i) != 0 && !n.is_empty())
                .map(|(_, n)| n.as_str())
                .collect();
            write!(f, "[{}]", set.join(", "))
        }
        FieldValue::DateTime(t) => write!(f, "{t} (Unix time)"),
        FieldValue::AgeRatings(r) => {
            let active: Vec<String> = r
                .iter()
                .enumerate()
                .filter(|(_, v)| *v & age_rating::ACTIVE != 0)
                .map(|(i, v)| format!("{i}:{}", v & age_rating::AGE_MASK))
                .collect();
            write!(f, "{}", active.join(", "))
        }
        FieldValue::ListData(data) => {
            writeln!(f, "{}", data.headers.join(" | "))?;
            for row in data.default_rows() {
                writeln!(f, "  {}", row.join(" | "))?;
            }
            Ok(())
        }
    }
}

impl fmt::Display for RomFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut last_tab = usize::MAX;
        for field in &self.fields {
            if field.tab != last_tab {
                last_tab = field.tab;
                if let Some(name) = self.tabs.get(field.tab).filter(|n| !n.is_empty()) {
                    writeln!(f, "-- {name} --")?;
                }
            }
            write!(f, "{}: ", field.name)?;
            fmt_value(f, &field.value)?;
            writeln!(f)?;
        }
        Ok(())
    }
}
