//! STFS packages carrying a title executable, read from disk

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::fs::File;
use std::io::Write;

use pretty_assertions::assert_eq;
use romprops_formats::stfs::{Stfs, StfsBuilder, StfsType};
use romprops_formats::xex::XexBuilder;
use romprops_formats::{FileType, ParseOptions, RomData, TitleId, detect_and_open};

const TITLE_ID: TitleId = TitleId(0x5841_07D1);

fn package_file() -> tempfile::NamedTempFile {
    let xex = XexBuilder::new(TITLE_ID).build().expect("xex");
    let data = StfsBuilder::new(StfsType::Live, 0x000D_0000, TITLE_ID)
        .display_name(romprops_formats::Language::English, "Puzzle Game")
        .add_file("default.xex", xex)
        .build()
        .expect("package");

    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(&data).expect("write");
    file.flush().expect("flush");
    file
}

#[test]
fn live_package_opens_nested_executable() {
    let tmp = package_file();
    let mut stfs =
        Stfs::open(File::open(tmp.path()).expect("reopen"), ParseOptions::default()).expect("open");

    assert_eq!(stfs.stfs_type(), StfsType::Live);
    let table = stfs.file_table().expect("file table");
    assert_eq!(table.len(), 1);
    assert!(table[0].is_default_xex());

    let xex = stfs
        .default_xex()
        .expect("lookup")
        .expect("nested executable");
    let xex_fields = xex.fields().expect("xex fields");
    assert_eq!(xex_fields.warnings().count(), 0);
    assert_eq!(xex_fields.get_str("Encryption Key"), Some("None"));

    let fields = stfs.fields().expect("fields");
    assert_eq!(fields.get_str("Content Type"), Some("Arcade Title"));
    assert_eq!(fields.warnings().count(), 0);
}

#[test]
fn detection_picks_the_package_parser() {
    let tmp = package_file();
    let rom = detect_and_open(File::open(tmp.path()).expect("reopen"), &ParseOptions::default())
        .expect("detect");
    assert_eq!(rom.file_type(), FileType::ApplicationPackage);
    assert!(rom.is_open());
}
