//! Size limits on tables and resources read from files

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::io::Cursor;

use romprops_formats::xdbf::header::{MAX_ENTRY_TABLE_LENGTH, XdbfHeader};
use romprops_formats::xdbf::{XdbfBuilder, XdbfError};
use romprops_formats::xex::{MAX_RESOURCE_SIZE, Xex, XexBuilder, XexError};
use romprops_formats::{ParseOptions, TitleId};

const TITLE_ID: TitleId = TitleId(0x4D53_0819);

fn xdbf_header(entry_table_length: u32) -> Vec<u8> {
    let mut data = XdbfBuilder::spa(TITLE_ID.0).build().expect("build");
    data[8..12].copy_from_slice(&entry_table_length.to_be_bytes());
    data
}

#[test]
fn xdbf_entry_table_length_limit() {
    let below = MAX_ENTRY_TABLE_LENGTH - 1;
    let header = XdbfHeader::parse(&xdbf_header(below)).expect("largest accepted length");
    assert_eq!(header.entry_table_length, below);

    assert!(matches!(
        XdbfHeader::parse(&xdbf_header(MAX_ENTRY_TABLE_LENGTH)),
        Err(XdbfError::TooManyEntries(MAX_ENTRY_TABLE_LENGTH))
    ));
}

/// Executable whose resource table entry claims `size` bytes
fn xex_with_resource_size(size: u32) -> Vec<u8> {
    let spa = XdbfBuilder::spa(TITLE_ID.0).build().expect("spa");
    let mut data = XexBuilder::new(TITLE_ID).xdbf(spa).build().expect("xex");
    let name = format!("{:08X}", TITLE_ID.0);
    let pos = data
        .windows(8)
        .position(|w| w == name.as_bytes())
        .expect("resource entry");
    data[pos + 12..pos + 16].copy_from_slice(&size.to_be_bytes());
    data
}

#[test]
fn xex_resource_size_limit() {
    let data = xex_with_resource_size(MAX_RESOURCE_SIZE);
    let mut xex = Xex::open(Cursor::new(data), ParseOptions::default()).expect("open");
    let res = xex.resource_info(None).expect("lookup").expect("resource");
    assert_eq!(res.size, 2 * 1024 * 1024);

    let data = xex_with_resource_size(MAX_RESOURCE_SIZE + 1);
    let mut xex = Xex::open(Cursor::new(data), ParseOptions::default()).expect("open");
    assert!(matches!(
        xex.resource_info(None),
        Err(XexError::ResourceTooLarge(size)) if size == MAX_RESOURCE_SIZE + 1
    ));
}
