//! Xbox 360 language identifiers
//!
//! Shared by XDBF string tables, STFS display names and the parse options.
//! The numeric values are the dashboard language IDs (`1` = English).

use std::fmt;
use std::str::FromStr;

/// Xbox 360 dashboard language
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Language {
    /// English
    English = 1,
    /// Japanese
    Japanese = 2,
    /// German
    German = 3,
    /// French
    French = 4,
    /// Spanish
    Spanish = 5,
    /// Italian
    Italian = 6,
    /// Korean
    Korean = 7,
    /// Traditional Chinese
    ChineseTraditional = 8,
    /// Portuguese
    Portuguese = 9,
    /// Simplified Chinese
    ChineseSimplified = 10,
    /// Polish
    Polish = 11,
    /// Russian
    Russian = 12,
}

impl Language {
    /// All languages in ID order
    pub const ALL: [Self; 12] = [
        Self::English,
        Self::Japanese,
        Self::German,
        Self::French,
        Self::Spanish,
        Self::Italian,
        Self::Korean,
        Self::ChineseTraditional,
        Self::Portuguese,
        Self::ChineseSimplified,
        Self::Polish,
        Self::Russian,
    ];

    /// One past the highest language ID
    pub const MAX: u32 = 13;

    /// Convert a dashboard language ID
    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|l| *l as u32 == id)
    }

    /// Dashboard language ID
    pub fn id(self) -> u32 {
        self as u32
    }

    /// Zero-based index (English = 0)
    pub fn index(self) -> usize {
        self as usize - 1
    }

    /// Language code used as the key of multi-language fields
    pub fn code(self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Japanese => "ja",
            Self::German => "de",
            Self::French => "fr",
            Self::Spanish => "es",
            Self::Italian => "it",
            Self::Korean => "ko",
            Self::ChineseTraditional => "hant",
            Self::Portuguese => "pt",
            Self::ChineseSimplified => "hans",
            Self::Polish => "pl",
            Self::Russian => "ru",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let s = match s.as_str() {
            "zh-tw" | "zh_tw" | "zh-hant" => "hant",
            "zh" | "zh-cn" | "zh_cn" | "zh-hans" => "hans",
            other => other,
        };
        Self::ALL
            .iter()
            .copied()
            .find(|l| l.code() == s)
            .ok_or_else(|| format!("unknown language code: {s}"))
    }
}
