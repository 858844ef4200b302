//! PlayStation memory card saves
//!
//! Four layouts are recognised: PSV files exported by a PS3, saves with a
//! memory card directory entry, saves with a 54-byte header, and bare save
//! data. All of them carry the same `SC` block with the title and a 16x16
//! icon of up to three frames.

mod builder;
mod error;
pub mod header;

pub use builder::Ps1SaveBuilder;
pub use error::{Ps1SaveError, Ps1SaveResult};
pub use header::{BlockEntry, Ps54Header, PsvHeader, SaveType, ScHeader};

use std::io::{Cursor, Read, Seek};

use binrw::BinRead;
use tracing::debug;

use crate::error::{FormatError, Result};
use crate::fields::RomFields;
use crate::image::{
    AnimationDelay, IconAnimation, Image, bgr555_ps1_to_argb32, decode_linear_ci4,
};
use crate::options::ParseOptions;
use crate::subfile::{read_at, stream_len};
use crate::text::cp1252_sjis_to_string;
use crate::{FileType, RomData, SystemNameKind};

use header::{FILENAME_LEN, PAL_RATE_HZ, icon_frames};

/// Bytes read from the start of the file on open
pub const HEADER_READ_SIZE: usize = 1024;

const ICON_SIZE: u32 = 16;

#[derive(Debug, Clone)]
enum ContainerHeader {
    Psv(PsvHeader),
    Block(BlockEntry),
    Ps54(Ps54Header),
    Raw,
}

/// An open PlayStation save
pub struct Ps1Save<R> {
    file: Option<R>,
    save_type: SaveType,
    container: ContainerHeader,
    sc: ScHeader,
    animation: Option<Option<IconAnimation>>,
    fields: Option<RomFields>,
}

impl<R: Read + Seek> Ps1Save<R> {
    /// Open a save, identifying its layout from the first 1 KiB
    pub fn open(mut reader: R, _options: ParseOptions) -> Ps1SaveResult<Self> {
        let file_size = stream_len(&mut reader)?;
        let mut buf = [0u8; HEADER_READ_SIZE];
        let got = read_at(&mut reader, 0, &mut buf)?;
        if got != HEADER_READ_SIZE {
            return Err(Ps1SaveError::Truncated {
                wanted: HEADER_READ_SIZE,
                got,
            });
        }

        let save_type = Self::is_supported(&buf, file_size).ok_or(Ps1SaveError::UnknownFormat)?;
        debug!("PS1 save: {save_type:?} layout");

        let mut cursor = Cursor::new(&buf[..]);
        let container = match save_type {
            SaveType::Psv => ContainerHeader::Psv(PsvHeader::read(&mut cursor)?),
            SaveType::Block => ContainerHeader::Block(BlockEntry::read(&mut cursor)?),
            SaveType::Ps54 => ContainerHeader::Ps54(Ps54Header::read(&mut cursor)?),
            SaveType::Raw => ContainerHeader::Raw,
        };
        let sc = ScHeader::parse(&buf[save_type.sc_offset()..])?;

        Ok(Self {
            file: Some(reader),
            save_type,
            container,
            sc,
            animation: None,
            fields: None,
        })
    }

    /// Layout of a save starting with `header`, given the total file size
    pub fn is_supported(header: &[u8], file_size: u64) -> Option<SaveType> {
        SaveType::detect(header, file_size)
    }

    /// Container layout
    pub fn save_type(&self) -> SaveType {
        self.save_type
    }

    /// `SC` block
    pub fn sc_header(&self) -> &ScHeader {
        &self.sc
    }

    /// Raw filename from the container header, if the layout has one
    pub fn filename_bytes(&self) -> Option<&[u8]> {
        match &self.container {
            ContainerHeader::Psv(h) => Some(&h.filename[..FILENAME_LEN]),
            ContainerHeader::Block(h) => Some(&h.filename[..FILENAME_LEN]),
            ContainerHeader::Ps54(h) => Some(&h.filename[..FILENAME_LEN]),
            ContainerHeader::Raw => None,
        }
    }

    /// Save title, Shift-JIS with a Windows-1252 fallback
    pub fn title(&self) -> String {
        cp1252_sjis_to_string(&self.sc.title)
    }

    fn decode_animation(&self) -> Option<IconAnimation> {
        let (count, delay) = icon_frames(self.sc.icon_flag)?;
        let palette = self.sc.palette.map(bgr555_ps1_to_argb32);
        let frames: Vec<Image> = self.sc.icon_data[..count]
            .iter()
            .filter_map(|data| decode_linear_ci4(ICON_SIZE, ICON_SIZE, data, &palette))
            .collect();
        let steps = frames.len();
        Some(IconAnimation {
            frames,
            seq_index: (0..steps).collect(),
            delays: vec![AnimationDelay::from_frames(delay, PAL_RATE_HZ); steps],
        })
    }

    /// Icon frames and timing, or `None` when the save has no icon
    pub fn animation(&mut self) -> Option<&IconAnimation> {
        if self.animation.is_none() {
            self.animation = Some(self.decode_animation());
        }
        self.animation.as_ref().and_then(Option::as_ref)
    }

    fn load_fields(&self) -> RomFields {
        let mut fields = RomFields::new();
        if let Some(name) = self.filename_bytes() {
            fields.add_string("Filename", cp1252_sjis_to_string(name));
        }
        let title = self.title();
        fields.add_string("Description", title.clone());
        fields.add_string("Title", title);
        fields
    }
}

impl<R: Read + Seek> RomData for Ps1Save<R> {
    fn system_name(&self, kind: SystemNameKind) -> &'static str {
        match kind {
            SystemNameKind::Long => "Sony PlayStation",
            SystemNameKind::Short => "PlayStation",
            SystemNameKind::Abbreviation => "PS1",
        }
    }

    fn file_type(&self) -> FileType {
        FileType::SaveFile
    }

    fn fields(&mut self) -> Result<&RomFields> {
        let fields = match self.fields.take() {
            Some(f) => f,
            None if self.file.is_none() => return Err(FormatError::Closed),
            None => self.load_fields(),
        };
        Ok(self.fields.insert(fields))
    }

    fn icon(&mut self) -> Result<Option<Image>> {
        Ok(self
            .icon_animation()?
            .and_then(|anim| anim.frames.into_iter().next()))
    }

    fn icon_animation(&mut self) -> Result<Option<IconAnimation>> {
        if self.file.is_none() && self.animation.is_none() {
            return Err(FormatError::Closed);
        }
        Ok(self.animation().cloned())
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn close(&mut self) {
        self.file = None;
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use header::{ICON_ANIM_2, ICON_ANIM_3, ICON_STATIC};
    use pretty_assertions::assert_eq;

    fn open(data: Vec<u8>) -> Ps1Save<Cursor<Vec<u8>>> {
        Ps1Save::open(Cursor::new(data), ParseOptions::default()).expect("open")
    }

    fn save(save_type: SaveType) -> Ps1SaveBuilder {
        Ps1SaveBuilder::new(save_type)
            .filename(b"BASLUS-00594FF7")
            .title("ＦＩＮＡＬ ＦＡＮＴＡＳＹ")
    }

    #[test]
    fn test_layouts() {
        for save_type in [SaveType::Psv, SaveType::Block, SaveType::Ps54, SaveType::Raw] {
            let data = save(save_type).build().expect("build");
            let mut ps1 = open(data);
            assert_eq!(ps1.save_type(), save_type);
            let fields = ps1.fields().expect("fields");
            let filename = (save_type != SaveType::Raw).then_some("BASLUS-00594FF7");
            assert_eq!(fields.get_str("Filename"), filename, "{save_type:?}");
            assert_eq!(
                fields.get_str("Description"),
                Some("ＦＩＮＡＬ ＦＡＮＴＡＳＹ")
            );
            assert_eq!(fields.get_str("Title"), Some("ＦＩＮＡＬ ＦＡＮＴＡＳＹ"));
            assert_eq!(ps1.title(), "ＦＩＮＡＬ ＦＡＮＴＡＳＹ");
        }
    }

    #[test]
    fn test_static_icon() {
        let mut palette = [0u16; 16];
        palette[1] = 0x001F;
        let mut frame = [0u8; 128];
        frame[0] = 0x10;
        let data = save(SaveType::Raw)
            .icon_flag(ICON_STATIC)
            .palette(palette)
            .frame(0, frame)
            .build()
            .expect("build");
        let mut ps1 = open(data);
        let anim = ps1.icon_animation().expect("icon").expect("has icon");
        assert!(!anim.is_animated());
        assert_eq!(anim.delays[0].ms, 0);

        let Some(Image::Argb32 {
            width,
            height,
            pixels,
        }) = ps1.icon().expect("icon")
        else {
            panic!("expected a decoded icon");
        };
        assert_eq!((width, height), (16, 16));
        assert_eq!(pixels[0], 0);
        assert_eq!(pixels[1], 0xFFFF_0000);
    }

    #[test]
    fn test_animated_icons() {
        let data = save(SaveType::Psv)
            .icon_flag(ICON_ANIM_3)
            .build()
            .expect("build");
        let anim = open(data)
            .icon_animation()
            .expect("icon")
            .expect("has icon");
        assert_eq!(anim.frame_count(), 3);
        assert_eq!(anim.seq_index, vec![0, 1, 2]);
        assert_eq!(anim.delays[2], AnimationDelay::from_frames(11, 50));
        assert_eq!(anim.delays[2].ms, 220);

        let data = save(SaveType::Raw)
            .icon_flag(ICON_ANIM_2)
            .build()
            .expect("build");
        let anim = open(data)
            .icon_animation()
            .expect("icon")
            .expect("has icon");
        assert_eq!(anim.frame_count(), 2);
        assert_eq!(anim.delays[0].ms, 320);
    }

    #[test]
    fn test_no_icon() {
        let mut ps1 = open(save(SaveType::Block).build().expect("build"));
        assert_eq!(ps1.icon().expect("icon"), None);
    }

    #[test]
    fn test_rejects() {
        let data = save(SaveType::Raw).build().expect("build");
        assert!(matches!(
            Ps1Save::open(Cursor::new(data[..512].to_vec()), ParseOptions::default()),
            Err(Ps1SaveError::Truncated { got: 512, .. })
        ));

        let mut padded = data.clone();
        padded.push(0);
        assert!(matches!(
            Ps1Save::open(Cursor::new(padded), ParseOptions::default()),
            Err(Ps1SaveError::UnknownFormat)
        ));

        let mut data = save(SaveType::Psv).build().expect("build");
        data[1] = b'X';
        assert!(matches!(
            Ps1Save::open(Cursor::new(data), ParseOptions::default()),
            Err(Ps1SaveError::UnknownFormat)
        ));
    }

    #[test]
    fn test_closed() {
        let mut ps1 = open(save(SaveType::Raw).icon_flag(ICON_STATIC).build().expect("build"));
        ps1.close();
        assert!(!ps1.is_open());
        assert!(matches!(ps1.fields(), Err(FormatError::Closed)));
        assert!(matches!(ps1.icon(), Err(FormatError::Closed)));
        assert_eq!(ps1.system_name(SystemNameKind::Abbreviation), "PS1");
        assert_eq!(ps1.file_type(), FileType::SaveFile);
    }
}
