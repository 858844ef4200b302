//! Xbox 360 XDBF resource files
//!
//! XDBF is a small resource database. Executables embed one as an SPA
//! (title strings, achievements, avatar awards and images); gamer profiles
//! store per-title progress as GPD files. Both share the header and entry
//! table; an SPA is recognised by its `XSTC` or `XSRC` metadata entry.
//!
//! String tables and images are loaded on demand and cached until the file
//! is closed.
//!
//! # Examples
//!
//! ```no_run
//! use romprops_formats::{ParseOptions, RomData};
//! use romprops_formats::xdbf::Xdbf;
//!
//! let file = std::fs::File::open("584107D1.spa")?;
//! let mut xdbf = Xdbf::open(file, ParseOptions::default())?;
//! println!("{}", xdbf.fields()?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod builder;
mod error;
pub mod header;

pub use builder::{GpdAchievement, XdbfBuilder};
pub use error::{XdbfError, XdbfResult};
pub use header::{AvatarAward, SpaAchievement, XDBF_ID_TITLE, XdbfEntry, XdbfHeader};

use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read, Seek};

use binrw::BinRead;
use tracing::debug;

use crate::error::{FormatError, Result};
use crate::fields::{ListData, ListRows, RomFields};
use crate::image::{Image, PNG_MAGIC};
use crate::language::Language;
use crate::options::ParseOptions;
use crate::subfile::{read_at, stream_len};
use crate::text::{dos2unix, utf16be_to_string, utf8_to_string};
use crate::{FileType, RomData, SystemNameKind};

use header::{
    AVATAR_AWARD_SIZE, GPD_ACHIEVEMENT_HEADER_SIZE, GPD_NAMESPACE_ACHIEVEMENT,
    GPD_NAMESPACE_STRING, GpdAchievementHeader, MAX_ACHIEVEMENTS, MAX_AVATAR_AWARDS,
    MAX_GPD_ACHIEVEMENT_SIZE, MAX_GPD_STRING_SIZE, MAX_IMAGE_SIZE, MAX_STRING_TABLE_SIZE,
    MIN_IMAGE_SIZE, RECORD_VERSION, SPA_ACHIEVEMENT_SIZE, SPA_NAMESPACE_IMAGE,
    SPA_NAMESPACE_METADATA, SPA_NAMESPACE_STRING_TABLE, TABLE_HEADER_SIZE, TableHeader,
    XACH_MAGIC, XDBF_ENTRY_SIZE, XDBF_HEADER_SIZE, XGAA_MAGIC, XSRC_MAGIC, XSTC_MAGIC,
    XSTC_SIZE, XSTR_ENTRY_HEADER_SIZE, XSTR_HEADER_SIZE, XSTR_MAGIC, XTHD_MAGIC, XTHD_SIZE,
    Xstc, XstrHeader, Xthd, title_type_name,
};

/// Bytes read on open; enough to classify SPA and GPD files
pub const DETECT_SIZE: usize = 512;

/// Resource file flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XdbfType {
    /// Title resources embedded in an executable
    Spa,
    /// Gamer profile data
    Gpd,
}

/// A loaded `XSTR` string table
#[derive(Debug, Clone)]
struct StringTable(Vec<u8>);

impl StringTable {
    fn parse(data: Vec<u8>) -> XdbfResult<Self> {
        let header = XstrHeader::read(&mut Cursor::new(&data))?;
        if header.magic != XSTR_MAGIC || header.version != RECORD_VERSION {
            return Err(XdbfError::InvalidTable("XSTR"));
        }
        Ok(Self(data))
    }

    /// Entries are `(id, length)` headers followed by UTF-8 without terminator
    fn get(&self, string_id: u16) -> Option<String> {
        let data = &self.0;
        let mut pos = XSTR_HEADER_SIZE;
        while pos + XSTR_ENTRY_HEADER_SIZE <= data.len() {
            let id = u16::from_be_bytes([data[pos], data[pos + 1]]);
            let length = usize::from(u16::from_be_bytes([data[pos + 2], data[pos + 3]]));
            let start = pos + XSTR_ENTRY_HEADER_SIZE;
            if id == string_id {
                let text = data.get(start..start + length)?;
                return Some(dos2unix(&utf8_to_string(text)));
            }
            pos = start + length;
        }
        None
    }
}

/// An open XDBF file
pub struct Xdbf<R> {
    file: Option<R>,
    options: ParseOptions,
    xdbf_type: XdbfType,
    header: XdbfHeader,
    entries: Vec<XdbfEntry>,
    data_offset: u64,
    // Entry index of each language's string table, by language ID
    str_tbl_indexes: [Option<usize>; Language::MAX as usize],
    str_tbls: HashMap<Language, StringTable>,
    language: Option<Option<Language>>,
    images: HashMap<u64, Image>,
    // Embedded in an executable, which shows the title strings itself
    in_xex: bool,
    fields: Option<RomFields>,
}

impl<R: Read + Seek> Xdbf<R> {
    /// Open a standalone resource file
    pub fn open(reader: R, options: ParseOptions) -> XdbfResult<Self> {
        Self::open_impl(reader, options, false)
    }

    /// Open a resource embedded in an executable
    ///
    /// The title fields are left to the executable, which adds them to its
    /// own tab with [`Xdbf::add_string_fields`].
    pub fn open_in_xex(reader: R, options: ParseOptions) -> XdbfResult<Self> {
        Self::open_impl(reader, options, true)
    }

    fn open_impl(mut reader: R, options: ParseOptions, in_xex: bool) -> XdbfResult<Self> {
        let file_size = stream_len(&mut reader)?;
        let mut buf = vec![0u8; DETECT_SIZE];
        let got = read_at(&mut reader, 0, &mut buf)?;
        if got < XDBF_HEADER_SIZE {
            return Err(XdbfError::Truncated {
                offset: 0,
                wanted: XDBF_HEADER_SIZE,
                got,
            });
        }
        buf.truncate(got);
        let header = XdbfHeader::parse(&buf)?;
        let xdbf_type = Self::classify(&header, &buf[XDBF_HEADER_SIZE..]);

        let table_size = header.entry_table_length as usize * XDBF_ENTRY_SIZE;
        let available = file_size.saturating_sub(XDBF_HEADER_SIZE as u64);
        if (table_size as u64) > available {
            return Err(XdbfError::Truncated {
                offset: XDBF_HEADER_SIZE as u64,
                wanted: table_size,
                got: usize::try_from(available).unwrap_or(usize::MAX),
            });
        }
        let mut table = vec![0u8; table_size];
        let got = read_at(&mut reader, XDBF_HEADER_SIZE as u64, &mut table)?;
        if got != table_size {
            return Err(XdbfError::Truncated {
                offset: XDBF_HEADER_SIZE as u64,
                wanted: table_size,
                got,
            });
        }
        let mut cursor = Cursor::new(&table);
        let entries = (0..header.entry_table_length)
            .map(|_| XdbfEntry::read(&mut cursor))
            .collect::<binrw::BinResult<Vec<_>>>()?;
        debug!(
            "XDBF: {:?}, {} of {} entries used",
            xdbf_type, header.entry_count, header.entry_table_length
        );

        let mut xdbf = Self {
            file: Some(reader),
            options,
            xdbf_type,
            header,
            entries,
            data_offset: header.data_offset(),
            str_tbl_indexes: [None; Language::MAX as usize],
            str_tbls: HashMap::new(),
            language: None,
            images: HashMap::new(),
            in_xex,
            fields: None,
        };
        xdbf.init_string_table_indexes();
        Ok(xdbf)
    }

    /// SPA if the entries visible in `table` include `XSTC` or `XSRC`
    fn classify(header: &XdbfHeader, table: &[u8]) -> XdbfType {
        let count = (header.entry_count as usize).min(table.len() / XDBF_ENTRY_SIZE);
        let mut cursor = Cursor::new(table);
        for _ in 0..count {
            let Ok(entry) = XdbfEntry::read(&mut cursor) else {
                break;
            };
            if entry.namespace_id == SPA_NAMESPACE_METADATA
                && (entry.resource_id == u64::from(XSTC_MAGIC)
                    || entry.resource_id == u64::from(XSRC_MAGIC))
            {
                return XdbfType::Spa;
            }
        }
        XdbfType::Gpd
    }

    /// File flavour if `header` starts with a valid XDBF header
    pub fn is_supported(header: &[u8]) -> Option<XdbfType> {
        let parsed = XdbfHeader::parse(header).ok()?;
        Some(Self::classify(&parsed, header.get(XDBF_HEADER_SIZE..)?))
    }

    /// File flavour
    pub fn xdbf_type(&self) -> XdbfType {
        self.xdbf_type
    }

    /// File header
    pub fn header(&self) -> &XdbfHeader {
        &self.header
    }

    /// Entry table, including unused slots
    pub fn entries(&self) -> &[XdbfEntry] {
        &self.entries
    }

    fn init_string_table_indexes(&mut self) {
        if self.xdbf_type != XdbfType::Spa {
            return;
        }
        for (idx, entry) in self.entries.iter().enumerate() {
            if entry.namespace_id != SPA_NAMESPACE_STRING_TABLE {
                continue;
            }
            let Ok(lang) = usize::try_from(entry.resource_id) else {
                continue;
            };
            if let Some(slot) = self.str_tbl_indexes.get_mut(lang).filter(|s| s.is_none()) {
                *slot = Some(idx);
            }
        }
    }

    /// Languages with a string table
    pub fn languages(&self) -> Vec<Language> {
        Language::ALL
            .into_iter()
            .filter(|l| self.str_tbl_indexes[l.id() as usize].is_some())
            .collect()
    }

    fn find(&self, namespace_id: u16, resource_id: u64) -> Option<XdbfEntry> {
        self.entries
            .iter()
            .find(|e| e.namespace_id == namespace_id && e.resource_id == resource_id)
            .copied()
    }

    fn read_entry(&mut self, entry: &XdbfEntry) -> XdbfResult<Vec<u8>> {
        let offset = self.data_offset + u64::from(entry.offset);
        let file = self.file.as_mut().ok_or(XdbfError::Closed)?;
        let mut buf = vec![0u8; entry.length as usize];
        let got = read_at(file, offset, &mut buf)?;
        if got != buf.len() {
            return Err(XdbfError::Truncated {
                offset,
                wanted: buf.len(),
                got,
            });
        }
        Ok(buf)
    }

    fn string_table(&mut self, language: Language) -> XdbfResult<Option<&StringTable>> {
        if !self.str_tbls.contains_key(&language) {
            let Some(idx) = self.str_tbl_indexes[language.id() as usize] else {
                return Ok(None);
            };
            let entry = self.entries[idx];
            if entry.length as usize <= XSTR_HEADER_SIZE || entry.length > MAX_STRING_TABLE_SIZE {
                return Err(XdbfError::InvalidSize {
                    table: "XSTR",
                    size: entry.length,
                });
            }
            let table = StringTable::parse(self.read_entry(&entry)?)?;
            self.str_tbls.insert(language, table);
        }
        Ok(self.str_tbls.get(&language))
    }

    fn has_string_table(&mut self, language: Language) -> bool {
        match self.string_table(language) {
            Ok(table) => table.is_some(),
            Err(e) => {
                debug!("XDBF: {language} string table: {e}");
                false
            }
        }
    }

    /// String from an SPA string table
    pub fn spa_string(&mut self, language: Language, string_id: u16) -> Option<String> {
        match self.string_table(language) {
            Ok(table) => table?.get(string_id),
            Err(e) => {
                debug!("XDBF: {language} string table: {e}");
                None
            }
        }
    }

    /// String from `language`, falling back to English
    fn spa_string_or_english(&mut self, language: Language, string_id: u16) -> Option<String> {
        self.spa_string(language, string_id)
            .filter(|s| !s.is_empty())
            .or_else(|| {
                if language == Language::English {
                    None
                } else {
                    self.spa_string(Language::English, string_id)
                }
            })
    }

    /// String entry of a GPD file
    pub fn gpd_string(&mut self, string_id: u16) -> Option<String> {
        let entry = self.entries.iter().copied().find(|e| {
            e.namespace_id == GPD_NAMESPACE_STRING
                && !e.is_sync_entry()
                && e.resource_id == u64::from(string_id)
        })?;
        if entry.length < 2 || entry.length > MAX_GPD_STRING_SIZE || entry.length % 2 != 0 {
            return None;
        }
        // Length includes the terminator, which may be cut short at EOF
        let without_nul = XdbfEntry {
            length: entry.length - 2,
            ..entry
        };
        let data = self.read_entry(&without_nul).ok()?;
        Some(utf16be_to_string(&data))
    }

    /// Language used for the title fields
    ///
    /// The preferred language if it has a string table, else the `XSTC`
    /// default language, else English. `None` for GPD files and SPA files
    /// without any usable table.
    pub fn language(&mut self) -> Option<Language> {
        if let Some(lang) = self.language {
            return lang;
        }
        let lang = self.select_language();
        self.language = Some(lang);
        lang
    }

    fn select_language(&mut self) -> Option<Language> {
        if self.xdbf_type != XdbfType::Spa {
            return None;
        }
        let preferred = self.options.language;
        if let Some(lang) = preferred {
            if self.has_string_table(lang) {
                return Some(lang);
            }
        }

        let xstc = self.default_language_from_xstc();
        if let Some(lang) = xstc.filter(|l| Some(*l) != preferred) {
            if self.has_string_table(lang) {
                return Some(lang);
            }
        }

        if preferred != Some(Language::English)
            && xstc != Some(Language::English)
            && self.has_string_table(Language::English)
        {
            return Some(Language::English);
        }
        None
    }

    fn default_language_from_xstc(&mut self) -> Option<Language> {
        let entry = self.find(SPA_NAMESPACE_METADATA, u64::from(XSTC_MAGIC))?;
        if entry.length as usize != XSTC_SIZE {
            return None;
        }
        let data = self.read_entry(&entry).ok()?;
        let xstc = Xstc::read(&mut Cursor::new(&data)).ok()?;
        if xstc.magic != XSTC_MAGIC
            || xstc.version != RECORD_VERSION
            || xstc.size as usize != XSTC_SIZE - 4
        {
            return None;
        }
        Language::from_id(xstc.default_language)
    }

    fn default_lc(&mut self) -> &'static str {
        self.language().map_or("en", Language::code)
    }

    /// Title type from `XTHD`
    pub fn title_type(&mut self) -> Option<&'static str> {
        let entry = self.find(SPA_NAMESPACE_METADATA, u64::from(XTHD_MAGIC))?;
        if entry.length as usize != XTHD_SIZE {
            return None;
        }
        let data = self.read_entry(&entry).ok()?;
        let xthd = Xthd::read(&mut Cursor::new(&data)).ok()?;
        title_type_name(xthd.title_type)
    }

    /// Title in the selected language
    pub fn title(&mut self) -> Option<String> {
        match self.xdbf_type {
            XdbfType::Spa => {
                let lang = self.language()?;
                self.spa_string(lang, XDBF_ID_TITLE)
            }
            XdbfType::Gpd => self.gpd_string(XDBF_ID_TITLE),
        }
        .filter(|s| !s.is_empty())
    }

    /// PNG image resource, cached by ID
    pub fn image(&mut self, image_id: u64) -> Option<Image> {
        if let Some(image) = self.images.get(&image_id) {
            return Some(image.clone());
        }
        let entry = self.find(SPA_NAMESPACE_IMAGE, image_id)?;
        if entry.length < MIN_IMAGE_SIZE || entry.length > MAX_IMAGE_SIZE {
            debug!("XDBF: image {image_id:X} has size {}", entry.length);
            return None;
        }
        let data = self.read_entry(&entry).ok()?;
        if data[..PNG_MAGIC.len()] != PNG_MAGIC {
            debug!("XDBF: image {image_id:X} is not a PNG");
            return None;
        }
        let image = Image::Png(data);
        self.images.insert(image_id, image.clone());
        Some(image)
    }

    /// Add the title fields to `fields`
    ///
    /// SPA files get a multi-language "Title" (languages whose title
    /// matches the English one are dropped) and a "Type"; GPD files get a
    /// plain "Title".
    pub fn add_string_fields(&mut self, fields: &mut RomFields) -> XdbfResult<()> {
        if self.file.is_none() {
            return Err(XdbfError::Closed);
        }
        match self.xdbf_type {
            XdbfType::Spa => self.add_spa_string_fields(fields),
            XdbfType::Gpd => {
                let title = self.gpd_string(XDBF_ID_TITLE).filter(|s| !s.is_empty());
                fields.add_string("Title", title.as_deref().unwrap_or("Unknown"));
            }
        }
        Ok(())
    }

    fn add_spa_string_fields(&mut self, fields: &mut RomFields) {
        let title_en = if self.str_tbl_indexes[Language::English.id() as usize].is_some() {
            self.spa_string(Language::English, XDBF_ID_TITLE)
                .filter(|s| !s.is_empty())
        } else {
            None
        };

        let mut titles = BTreeMap::new();
        if let Some(en) = &title_en {
            titles.insert(Language::English.code().to_string(), en.clone());
        }
        for lang in Language::ALL.into_iter().skip(1) {
            if self.str_tbl_indexes[lang.id() as usize].is_none() {
                continue;
            }
            let Some(title) = self
                .spa_string(lang, XDBF_ID_TITLE)
                .filter(|s| !s.is_empty())
            else {
                continue;
            };
            if title_en.as_ref() == Some(&title) {
                continue;
            }
            titles.insert(lang.code().to_string(), title);
        }

        if titles.is_empty() {
            fields.add_string("Title", "Unknown");
        } else {
            let default_lc = self.default_lc();
            fields.add_string_multi("Title", titles, default_lc);
        }

        let title_type = self.title_type().unwrap_or("Unknown");
        fields.add_string("Type", title_type);
    }

    /// Row count and data of an `XACH`/`XGAA` table
    fn read_table(
        &mut self,
        magic: u32,
        name: &'static str,
        row_size: usize,
        max_rows: usize,
    ) -> XdbfResult<Option<(usize, Vec<u8>)>> {
        let Some(entry) = self.find(SPA_NAMESPACE_METADATA, u64::from(magic)) else {
            return Ok(None);
        };
        let length = entry.length as usize;
        if length < TABLE_HEADER_SIZE || length > TABLE_HEADER_SIZE + row_size * max_rows {
            return Err(XdbfError::InvalidSize {
                table: name,
                size: entry.length,
            });
        }
        let data = self.read_entry(&entry)?;
        let header = TableHeader::read(&mut Cursor::new(&data))?;
        if header.magic != magic || header.version != RECORD_VERSION {
            return Err(XdbfError::InvalidTable(name));
        }
        let count = usize::from(header.count)
            .min(max_rows)
            .min((length - TABLE_HEADER_SIZE) / row_size);
        Ok(Some((count, data)))
    }

    /// Build a per-language list from `(id, name_id, locked_id, unlocked_id, extra)` rows
    fn spa_list(
        &mut self,
        headers: &[&str],
        rows: &[(String, u16, u16, u16, Option<String>)],
    ) -> Option<ListData> {
        let mut by_language = BTreeMap::new();
        for lang in Language::ALL {
            if self.str_tbl_indexes[lang.id() as usize].is_none() {
                continue;
            }
            let mut lang_rows = Vec::with_capacity(rows.len());
            for (id, name_id, locked_id, unlocked_id, extra) in rows {
                let mut desc = self.spa_string_or_english(lang, *name_id).unwrap_or_default();
                let desc_id = if *locked_id != 0xFFFF { *locked_id } else { *unlocked_id };
                if let Some(locked) = self
                    .spa_string_or_english(lang, desc_id)
                    .filter(|s| !s.is_empty())
                {
                    if !desc.is_empty() {
                        desc.push('\n');
                    }
                    desc.push_str(&locked);
                }
                let mut row = vec![id.clone(), desc];
                row.extend(extra.iter().cloned());
                lang_rows.push(row);
            }
            if !lang_rows.is_empty() {
                by_language.insert(lang.code().to_string(), lang_rows);
            }
        }
        if by_language.is_empty() {
            return None;
        }
        Some(ListData {
            headers: headers.iter().map(|s| (*s).to_string()).collect(),
            rows: ListRows::Multi {
                by_language,
                default_lc: self.default_lc().to_string(),
            },
            icons: Vec::new(),
        })
    }

    /// Achievements of an SPA file, one row set per language
    pub fn spa_achievements(&mut self) -> XdbfResult<Option<ListData>> {
        let Some((count, data)) =
            self.read_table(XACH_MAGIC, "XACH", SPA_ACHIEVEMENT_SIZE, MAX_ACHIEVEMENTS)?
        else {
            return Ok(None);
        };
        let mut cursor = Cursor::new(&data[TABLE_HEADER_SIZE..]);
        let mut rows = Vec::with_capacity(count);
        let mut icons = Vec::with_capacity(count);
        for _ in 0..count {
            let ach = SpaAchievement::read(&mut cursor)?;
            icons.push(self.image(u64::from(ach.image_id)));
            rows.push((
                ach.achievement_id.to_string(),
                ach.name_id,
                ach.locked_desc_id,
                ach.unlocked_desc_id,
                Some(ach.gamerscore.to_string()),
            ));
        }
        Ok(self
            .spa_list(&["ID", "Description", "Gamerscore"], &rows)
            .map(|list| ListData { icons, ..list }))
    }

    /// Avatar awards of an SPA file; a header-only table has none
    pub fn avatar_awards(&mut self) -> XdbfResult<Option<ListData>> {
        let Some((count, data)) =
            self.read_table(XGAA_MAGIC, "XGAA", AVATAR_AWARD_SIZE, MAX_AVATAR_AWARDS)?
        else {
            return Ok(None);
        };
        if count == 0 {
            return Ok(None);
        }
        let mut cursor = Cursor::new(&data[TABLE_HEADER_SIZE..]);
        let mut rows = Vec::with_capacity(count);
        let mut icons = Vec::with_capacity(count);
        for _ in 0..count {
            let award = AvatarAward::read(&mut cursor)?;
            icons.push(self.image(u64::from(award.image_id)));
            rows.push((
                format!("{:04X}", award.avatar_award_id),
                award.name_id,
                award.locked_desc_id,
                award.unlocked_desc_id,
                None,
            ));
        }
        Ok(self
            .spa_list(&["ID", "Description"], &rows)
            .map(|list| ListData { icons, ..list }))
    }

    /// Achievements of a GPD file, one entry each
    pub fn gpd_achievements(&mut self) -> XdbfResult<Option<ListData>> {
        let entries: Vec<XdbfEntry> = self
            .entries
            .iter()
            .filter(|e| e.namespace_id == GPD_NAMESPACE_ACHIEVEMENT && !e.is_sync_entry())
            .copied()
            .collect();

        let mut rows = Vec::new();
        let mut icons = Vec::new();
        for entry in entries {
            if entry.length > MAX_GPD_ACHIEVEMENT_SIZE {
                continue;
            }
            let Ok(data) = self.read_entry(&entry) else {
                continue;
            };
            let Ok(ach) = GpdAchievementHeader::read(&mut Cursor::new(&data)) else {
                continue;
            };
            if ach.size as usize != GPD_ACHIEVEMENT_HEADER_SIZE {
                continue;
            }
            icons.push(self.image(u64::from(ach.image_id)));

            // Name, unlocked description, locked description
            let strings = split_utf16be(&data[GPD_ACHIEVEMENT_HEADER_SIZE..]);
            let desc = strings
                .iter()
                .take(2)
                .filter(|s| !s.is_empty())
                .cloned()
                .collect::<Vec<_>>()
                .join("\n");
            rows.push(vec![
                ach.achievement_id.to_string(),
                desc,
                ach.gamerscore.to_string(),
            ]);
        }

        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(ListData {
            headers: vec!["ID".into(), "Description".into(), "Gamerscore".into()],
            rows: ListRows::Single(rows),
            icons,
        }))
    }

    fn load_fields(&mut self) -> XdbfResult<RomFields> {
        let mut fields = RomFields::new();
        fields.set_tab_name(0, "XDBF");

        if !self.in_xex {
            self.add_string_fields(&mut fields)?;
        }

        // Avatar awards go first
        if self.xdbf_type == XdbfType::Spa {
            match self.avatar_awards() {
                Ok(Some(list)) => fields.add_list_data("Avatar Awards", list),
                Ok(None) => {}
                Err(e) => debug!("XDBF: avatar awards: {e}"),
            }
        }

        let achievements = match self.xdbf_type {
            XdbfType::Spa => self.spa_achievements(),
            XdbfType::Gpd => self.gpd_achievements(),
        };
        match achievements {
            Ok(Some(list)) => fields.add_list_data("Achievements", list),
            Ok(None) => {}
            Err(e) => debug!("XDBF: achievements: {e}"),
        }
        Ok(fields)
    }
}

/// Split NUL-terminated UTF-16BE strings; an unterminated tail is dropped
fn split_utf16be(data: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut pos = 0;
    while pos + 1 < data.len() && out.len() < 3 {
        if data[pos] == 0 && data[pos + 1] == 0 {
            out.push(utf16be_to_string(&data[start..pos]));
            start = pos + 2;
        }
        pos += 2;
    }
    out
}

impl<R: Read + Seek> RomData for Xdbf<R> {
    fn system_name(&self, kind: SystemNameKind) -> &'static str {
        match kind {
            SystemNameKind::Long => "Microsoft Xbox 360",
            SystemNameKind::Short => "Xbox 360",
            SystemNameKind::Abbreviation => "X360",
        }
    }

    fn file_type(&self) -> FileType {
        FileType::ResourceFile
    }

    fn fields(&mut self) -> Result<&RomFields> {
        let fields = match self.fields.take() {
            Some(f) => f,
            None if self.file.is_none() => return Err(FormatError::Closed),
            None => self.load_fields()?,
        };
        Ok(self.fields.insert(fields))
    }

    fn icon(&mut self) -> Result<Option<Image>> {
        if self.file.is_none() {
            return Err(FormatError::Closed);
        }
        Ok(self.image(u64::from(XDBF_ID_TITLE)))
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn close(&mut self) {
        self.str_tbls.clear();
        self.file = None;
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fields::FieldValue;
    use pretty_assertions::assert_eq;

    fn png(tag: &[u8]) -> Vec<u8> {
        let mut data = PNG_MAGIC.to_vec();
        data.extend_from_slice(b"\0\0\0\rIHDR");
        data.extend_from_slice(tag);
        data
    }

    fn spa() -> Vec<u8> {
        XdbfBuilder::spa(0x5841_07D1)
            .title_type(1)
            .string(Language::English, XDBF_ID_TITLE, "Puzzle Game")
            .string(Language::English, 1, "First Match")
            .string(Language::English, 2, "Clear a board.\r\nAny board.")
            .string(Language::French, XDBF_ID_TITLE, "Puzzle Game")
            .string(Language::German, XDBF_ID_TITLE, "Puzzlespiel")
            .string(Language::German, 1, "Erstes Spiel")
            .achievement(SpaAchievement {
                achievement_id: 1,
                name_id: 1,
                unlocked_desc_id: 2,
                locked_desc_id: 0xFFFF,
                image_id: 1,
                gamerscore: 10,
                ..SpaAchievement::default()
            })
            .image(u64::from(XDBF_ID_TITLE), png(b"title"))
            .image(1, png(b"ach-1"))
            .build()
            .expect("build")
    }

    #[test]
    fn test_spa_fields() {
        let mut xdbf = Xdbf::open(Cursor::new(spa()), ParseOptions::default()).expect("open");
        assert_eq!(xdbf.xdbf_type(), XdbfType::Spa);
        assert_eq!(
            xdbf.languages(),
            [Language::English, Language::German, Language::French]
        );
        assert_eq!(xdbf.language(), Some(Language::English));

        let fields = xdbf.fields().expect("fields");
        assert_eq!(fields.tabs()[0], "XDBF");
        assert_eq!(fields.get_str("Type"), Some("Full Game"));
        let Some(FieldValue::StringMulti { strings, default_lc }) =
            fields.get("Title").map(|f| &f.value)
        else {
            panic!("Title should be multi-language");
        };
        assert_eq!(default_lc, "en");
        assert_eq!(strings.keys().collect::<Vec<_>>(), ["de", "en"]);

        let Some(FieldValue::ListData(list)) = fields.get("Achievements").map(|f| &f.value) else {
            panic!("missing achievements");
        };
        let ListRows::Multi { by_language, .. } = &list.rows else {
            panic!("achievements should be per language");
        };
        assert_eq!(
            by_language["en"][0],
            ["1", "First Match\nClear a board.\nAny board.", "10"]
        );
        // German name, English description
        assert_eq!(
            by_language["de"][0][1],
            "Erstes Spiel\nClear a board.\nAny board."
        );
        assert_eq!(list.icons.len(), 1);
        assert!(list.icons[0].is_some());
        assert!(fields.get("Avatar Awards").is_none());
    }

    #[test]
    fn test_preferred_language() {
        let options = ParseOptions::default().language(Language::German);
        let mut xdbf = Xdbf::open(Cursor::new(spa()), options).expect("open");
        assert_eq!(xdbf.language(), Some(Language::German));
        assert_eq!(xdbf.title().as_deref(), Some("Puzzlespiel"));

        // No Japanese table: falls back to the XSTC default (English)
        let options = ParseOptions::default().language(Language::Japanese);
        let mut xdbf = Xdbf::open(Cursor::new(spa()), options).expect("open");
        assert_eq!(xdbf.language(), Some(Language::English));
    }

    #[test]
    fn test_icon() {
        let mut xdbf = Xdbf::open(Cursor::new(spa()), ParseOptions::default()).expect("open");
        assert_eq!(xdbf.icon().expect("icon"), Some(Image::Png(png(b"title"))));
    }

    #[test]
    fn test_avatar_awards() {
        let award = AvatarAward {
            avatar_award_id: 0x1A,
            name_id: 1,
            unlocked_desc_id: 2,
            locked_desc_id: 0xFFFF,
            ..AvatarAward::default()
        };
        let data = XdbfBuilder::spa(1)
            .string(Language::English, 1, "Hat")
            .string(Language::English, 2, "A hat.")
            .avatar_award(award)
            .build()
            .expect("build");
        let mut xdbf = Xdbf::open(Cursor::new(data), ParseOptions::default()).expect("open");
        let list = xdbf.avatar_awards().expect("awards").expect("present");
        assert_eq!(list.default_rows()[0], ["001A", "Hat\nA hat."]);

        let data = XdbfBuilder::spa(1)
            .string(Language::English, 1, "Hat")
            .empty_avatar_awards()
            .build()
            .expect("build");
        let mut xdbf = Xdbf::open(Cursor::new(data), ParseOptions::default()).expect("open");
        assert_eq!(xdbf.avatar_awards().expect("awards"), None);
    }

    #[test]
    fn test_gpd() {
        let data = XdbfBuilder::gpd()
            .string(Language::English, XDBF_ID_TITLE, "Puzzle Game")
            .string(Language::English, 7, "Other")
            .gpd_achievement(GpdAchievement {
                id: 3,
                gamerscore: 20,
                title: "Speedy".into(),
                unlocked_desc: "Win in a minute.".into(),
                locked_desc: "Win quickly.".into(),
                ..GpdAchievement::default()
            })
            .build()
            .expect("build");
        let mut xdbf = Xdbf::open(Cursor::new(data), ParseOptions::default()).expect("open");
        assert_eq!(xdbf.xdbf_type(), XdbfType::Gpd);
        assert_eq!(xdbf.language(), None);
        assert_eq!(xdbf.gpd_string(7).as_deref(), Some("Other"));

        let fields = xdbf.fields().expect("fields");
        assert_eq!(fields.get_str("Title"), Some("Puzzle Game"));
        let Some(FieldValue::ListData(list)) = fields.get("Achievements").map(|f| &f.value) else {
            panic!("missing achievements");
        };
        // The sync list entry is skipped
        assert_eq!(list.default_rows(), [["3", "Speedy\nWin in a minute.", "20"]]);
    }

    #[test]
    fn test_embedded_hides_title() {
        let mut xdbf =
            Xdbf::open_in_xex(Cursor::new(spa()), ParseOptions::default()).expect("open");
        let fields = xdbf.fields().expect("fields");
        assert!(fields.get("Title").is_none());
        assert!(fields.get("Achievements").is_some());

        let mut own = RomFields::new();
        xdbf.add_string_fields(&mut own).expect("strings");
        assert!(own.get("Title").is_some());
    }

    #[test]
    fn test_oversized_image_rejected() {
        let data = XdbfBuilder::spa(1)
            .image(u64::from(XDBF_ID_TITLE), PNG_MAGIC.to_vec())
            .build()
            .expect("build");
        let mut xdbf = Xdbf::open(Cursor::new(data), ParseOptions::default()).expect("open");
        // 8 bytes is below the minimum
        assert_eq!(xdbf.icon().expect("icon"), None);
    }

    #[test]
    fn test_detect() {
        let data = spa();
        assert_eq!(Xdbf::<Cursor<Vec<u8>>>::is_supported(&data), Some(XdbfType::Spa));
        assert_eq!(Xdbf::<Cursor<Vec<u8>>>::is_supported(b"XEX2\0\0"), None);
    }

    #[test]
    fn test_closed() {
        let mut xdbf = Xdbf::open(Cursor::new(spa()), ParseOptions::default()).expect("open");
        xdbf.close();
        assert!(matches!(xdbf.fields(), Err(FormatError::Closed)));
        assert!(matches!(xdbf.icon(), Err(FormatError::Closed)));
    }
}
