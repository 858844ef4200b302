//! Builder for SPA and GPD resource files

use std::collections::BTreeMap;
use std::io::Cursor;

use binrw::BinWrite;

use crate::language::Language;
use crate::text::string_to_utf16be;
use crate::xdbf::XdbfType;
use crate::xdbf::error::XdbfResult;
use crate::xdbf::header::{
    AvatarAward, GPD_ACHIEVEMENT_HEADER_SIZE, GPD_NAMESPACE_ACHIEVEMENT, GPD_NAMESPACE_IMAGE,
    GPD_NAMESPACE_STRING, GPD_SYNC_LIST_ENTRY, GpdAchievementHeader, RECORD_VERSION,
    SPA_NAMESPACE_IMAGE, SPA_NAMESPACE_METADATA, SPA_NAMESPACE_STRING_TABLE, SpaAchievement,
    TableHeader, XACH_MAGIC, XDBF_MAGIC, XDBF_VERSION, XGAA_MAGIC, XSTC_MAGIC, XSTR_MAGIC,
    XTHD_MAGIC, XdbfEntry, XdbfHeader, Xstc, XstrHeader, Xthd,
};

/// A GPD achievement with its strings
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GpdAchievement {
    /// Achievement ID
    pub id: u32,
    /// Image resource ID
    pub image_id: u32,
    /// Gamerscore
    pub gamerscore: u32,
    /// Flags
    pub flags: u32,
    /// Name
    pub title: String,
    /// Description once unlocked
    pub unlocked_desc: String,
    /// Description while locked
    pub locked_desc: String,
}

/// Builder for XDBF files
#[derive(Debug, Clone)]
pub struct XdbfBuilder {
    xdbf_type: XdbfType,
    title_id: u32,
    default_language: Language,
    title_type: Option<u32>,
    spa_strings: BTreeMap<Language, BTreeMap<u16, String>>,
    gpd_strings: BTreeMap<u16, String>,
    achievements: Vec<SpaAchievement>,
    avatar_awards: Option<Vec<AvatarAward>>,
    gpd_achievements: Vec<GpdAchievement>,
    images: BTreeMap<u64, Vec<u8>>,
}

impl XdbfBuilder {
    fn new(xdbf_type: XdbfType, title_id: u32) -> Self {
        Self {
            xdbf_type,
            title_id,
            default_language: Language::English,
            title_type: None,
            spa_strings: BTreeMap::new(),
            gpd_strings: BTreeMap::new(),
            achievements: Vec::new(),
            avatar_awards: None,
            gpd_achievements: Vec::new(),
            images: BTreeMap::new(),
        }
    }

    /// Title resource bundle, as embedded in executables
    pub fn spa(title_id: u32) -> Self {
        Self::new(XdbfType::Spa, title_id)
    }

    /// Gamer profile data
    pub fn gpd() -> Self {
        Self::new(XdbfType::Gpd, 0)
    }

    /// Set the language recorded in `XSTC` (SPA only)
    pub fn default_language(mut self, language: Language) -> Self {
        self.default_language = language;
        self
    }

    /// Add an `XTHD` record with this title type (SPA only)
    pub fn title_type(mut self, title_type: u32) -> Self {
        self.title_type = Some(title_type);
        self
    }

    /// Add a string; GPD files have a single language and ignore `language`
    pub fn string(mut self, language: Language, id: u16, text: &str) -> Self {
        match self.xdbf_type {
            XdbfType::Spa => {
                self.spa_strings
                    .entry(language)
                    .or_default()
                    .insert(id, text.to_string());
            }
            XdbfType::Gpd => {
                self.gpd_strings.insert(id, text.to_string());
            }
        }
        self
    }

    /// Add an `XACH` row (SPA only)
    pub fn achievement(mut self, achievement: SpaAchievement) -> Self {
        self.achievements.push(achievement);
        self
    }

    /// Add an `XGAA` row (SPA only)
    pub fn avatar_award(mut self, award: AvatarAward) -> Self {
        self.avatar_awards.get_or_insert_with(Vec::new).push(award);
        self
    }

    /// Add an `XGAA` table with no rows (SPA only)
    pub fn empty_avatar_awards(mut self) -> Self {
        self.avatar_awards.get_or_insert_with(Vec::new);
        self
    }

    /// Add an achievement entry (GPD only)
    pub fn gpd_achievement(mut self, achievement: GpdAchievement) -> Self {
        self.gpd_achievements.push(achievement);
        self
    }

    /// Add an image resource
    pub fn image(mut self, id: u64, data: Vec<u8>) -> Self {
        self.images.insert(id, data);
        self
    }

    /// Serialize the file
    pub fn build(&self) -> XdbfResult<Vec<u8>> {
        let mut resources = match self.xdbf_type {
            XdbfType::Spa => self.spa_resources()?,
            XdbfType::Gpd => self.gpd_resources()?,
        };
        resources.sort_by_key(|(ns, id, _)| (*ns, *id));

        let mut entries = Vec::with_capacity(resources.len());
        let mut data = Vec::new();
        for (namespace_id, resource_id, blob) in resources {
            entries.push(XdbfEntry {
                namespace_id,
                resource_id,
                offset: data.len() as u32,
                length: blob.len() as u32,
            });
            data.extend_from_slice(&blob);
        }

        let mut out = Cursor::new(Vec::new());
        XdbfHeader {
            magic: XDBF_MAGIC,
            version: XDBF_VERSION,
            entry_table_length: entries.len() as u32,
            entry_count: entries.len() as u32,
            free_space_table_length: 1,
            free_space_table_count: 1,
        }
        .write(&mut out)?;
        for entry in &entries {
            entry.write(&mut out)?;
        }
        let data_len = data.len() as u32;
        data_len.write_be(&mut out)?;
        (u32::MAX - data_len).write_be(&mut out)?;

        let mut out = out.into_inner();
        out.extend_from_slice(&data);
        Ok(out)
    }

    fn spa_resources(&self) -> XdbfResult<Vec<(u16, u64, Vec<u8>)>> {
        let mut resources = Vec::new();

        resources.push((
            SPA_NAMESPACE_METADATA,
            u64::from(XSTC_MAGIC),
            record(&Xstc {
                magic: XSTC_MAGIC,
                version: RECORD_VERSION,
                size: 12,
                default_language: self.default_language.id(),
            })?,
        ));

        if let Some(title_type) = self.title_type {
            resources.push((
                SPA_NAMESPACE_METADATA,
                u64::from(XTHD_MAGIC),
                record(&Xthd {
                    magic: XTHD_MAGIC,
                    version: RECORD_VERSION,
                    size: 40,
                    title_id: self.title_id,
                    title_type,
                    version_major: 1,
                    version_minor: 0,
                    version_build: 0,
                    version_revision: 0,
                    reserved: [0; 16],
                })?,
            ));
        }

        if !self.achievements.is_empty() {
            resources.push((
                SPA_NAMESPACE_METADATA,
                u64::from(XACH_MAGIC),
                table(XACH_MAGIC, &self.achievements)?,
            ));
        }
        if let Some(awards) = &self.avatar_awards {
            resources.push((
                SPA_NAMESPACE_METADATA,
                u64::from(XGAA_MAGIC),
                table(XGAA_MAGIC, awards)?,
            ));
        }

        for (id, image) in &self.images {
            resources.push((SPA_NAMESPACE_IMAGE, *id, image.clone()));
        }

        for (language, strings) in &self.spa_strings {
            let mut body = Vec::new();
            for (id, text) in strings {
                body.extend_from_slice(&id.to_be_bytes());
                body.extend_from_slice(&(text.len() as u16).to_be_bytes());
                body.extend_from_slice(text.as_bytes());
            }
            let mut blob = record(&XstrHeader {
                magic: XSTR_MAGIC,
                version: RECORD_VERSION,
                size: (body.len() + 6) as u32,
                string_count: strings.len() as u16,
            })?;
            blob.extend_from_slice(&body);
            resources.push((SPA_NAMESPACE_STRING_TABLE, u64::from(language.id()), blob));
        }
        Ok(resources)
    }

    fn gpd_resources(&self) -> XdbfResult<Vec<(u16, u64, Vec<u8>)>> {
        let mut resources = vec![(GPD_NAMESPACE_ACHIEVEMENT, GPD_SYNC_LIST_ENTRY, vec![0u8; 16])];

        for ach in &self.gpd_achievements {
            let mut blob = record(&GpdAchievementHeader {
                size: GPD_ACHIEVEMENT_HEADER_SIZE as u32,
                achievement_id: ach.id,
                image_id: ach.image_id,
                gamerscore: ach.gamerscore,
                flags: ach.flags,
                unlock_time: 0,
            })?;
            for text in [&ach.title, &ach.unlocked_desc, &ach.locked_desc] {
                blob.extend_from_slice(&string_to_utf16be(text));
                blob.extend_from_slice(&[0, 0]);
            }
            resources.push((GPD_NAMESPACE_ACHIEVEMENT, u64::from(ach.id), blob));
        }

        for (id, image) in &self.images {
            resources.push((GPD_NAMESPACE_IMAGE, *id, image.clone()));
        }

        for (id, text) in &self.gpd_strings {
            let mut blob = string_to_utf16be(text);
            blob.extend_from_slice(&[0, 0]);
            resources.push((GPD_NAMESPACE_STRING, u64::from(*id), blob));
        }
        Ok(resources)
    }
}

fn record<T: for<'a> BinWrite<Args<'a> = ()>>(value: &T) -> XdbfResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    value.write_be(&mut cursor)?;
    Ok(cursor.into_inner())
}

fn table<T: for<'a> BinWrite<Args<'a> = ()>>(magic: u32, rows: &[T]) -> XdbfResult<Vec<u8>> {
    let mut body = Vec::new();
    for row in rows {
        body.extend_from_slice(&record(row)?);
    }
    let mut blob = record(&TableHeader {
        magic,
        version: RECORD_VERSION,
        size: (body.len() + 6) as u32,
        count: rows.len() as u16,
    })?;
    blob.extend_from_slice(&body);
    Ok(blob)
}
