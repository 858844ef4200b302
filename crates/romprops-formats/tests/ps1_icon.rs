//! PlayStation save icons read from disk

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::fs::File;
use std::io::Write;

use pretty_assertions::assert_eq;
use romprops_formats::ps1_save::header::ICON_ANIM_2;
use romprops_formats::ps1_save::{Ps1SaveBuilder, SaveType};
use romprops_formats::{AnimationDelay, Image, ParseOptions, SystemNameKind, detect_and_open};

#[test]
fn raw_save_with_two_frame_icon() {
    let mut palette = [0u16; 16];
    palette[1] = 0x7FFF;
    let data = Ps1SaveBuilder::new(SaveType::Raw)
        .title("MEMORY CARD TEST")
        .icon_flag(ICON_ANIM_2)
        .palette(palette)
        .frame(0, [0x11; 128])
        .frame(1, [0x00; 128])
        .build()
        .expect("build");
    assert_eq!(&data[..2], b"SC");

    let mut tmp = tempfile::NamedTempFile::new().expect("temp file");
    tmp.write_all(&data).expect("write");

    let mut rom = detect_and_open(File::open(tmp.path()).expect("reopen"), &ParseOptions::default())
        .expect("detect");
    assert_eq!(rom.system_name(SystemNameKind::Short), "PlayStation");
    assert_eq!(
        rom.fields().expect("fields").get_str("Description"),
        Some("MEMORY CARD TEST")
    );

    let anim = rom.icon_animation().expect("icon").expect("animated icon");
    assert_eq!(anim.frame_count(), 2);
    assert!(anim.is_animated());
    assert_eq!(anim.seq_index, vec![0, 1]);
    for delay in &anim.delays {
        assert_eq!(*delay, AnimationDelay::from_frames(16, 50));
        assert_eq!(delay.ms, 320);
    }

    let Image::Argb32 { pixels, .. } = &anim.frames[0] else {
        panic!("expected decoded pixels");
    };
    assert!(pixels.iter().all(|&p| p == 0xFFFF_FFFF));
    let Image::Argb32 { pixels, .. } = &anim.frames[1] else {
        panic!("expected decoded pixels");
    };
    assert!(pixels.iter().all(|&p| p == 0));
}
