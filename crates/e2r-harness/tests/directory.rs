#![forbid(unsafe_code)]

use e2r_error::Ext2Error;
use e2r_harness::ImageBuilder;
use e2r_ondisk::{Ext2FileType, iter_dir_block};
use e2r_types::InodeNumber;
use std::ops::ControlFlow;

fn names(fs: &e2r_core::Ext2Fs, ino: InodeNumber) -> Vec<String> {
    fs.read_dir(ino)
        .expect("read_dir")
        .iter()
        .map(|e| e.name_str())
        .collect()
}

#[test]
fn tombstone_is_skipped_and_cursor_advances_past_it() {
    let mut builder = ImageBuilder::new(1024);
    let a = builder.add_file(2, "a", b"x").expect("a");
    builder.add_file(2, "gone", b"y").expect("gone");
    let bb = builder.add_dir(2, "bb").expect("bb");
    builder.unlink(2, "gone").expect("unlink");
    let img = builder.build().expect("build");
    let fs = img.open().expect("open");

    let entries = fs.read_dir(InodeNumber::ROOT).expect("root");
    let listed: Vec<(String, InodeNumber, Ext2FileType)> = entries
        .iter()
        .map(|e| (e.name_str(), e.inode, e.file_type))
        .collect();
    assert_eq!(
        listed,
        vec![
            (".".to_owned(), InodeNumber::ROOT, Ext2FileType::Dir),
            ("..".to_owned(), InodeNumber::ROOT, Ext2FileType::Dir),
            ("a".to_owned(), InodeNumber(a), Ext2FileType::RegFile),
            ("bb".to_owned(), InodeNumber(bb), Ext2FileType::Dir),
        ]
    );

    // ".", "..", "a" take 12 bytes each; the tombstone's 12 bytes are
    // consumed together with "bb"
    let block = img.layout(2).expect("root layout").data_blocks[0];
    let start = img.block_offset(block);
    let raw = &img.bytes()[start..start + 1024];
    let mut iter = iter_dir_block(raw, 1024);
    for _ in 0..3 {
        iter.next().expect("entry").expect("valid");
    }
    assert_eq!(iter.consumed(), 36);
    let next = iter.next().expect("bb").expect("valid");
    assert_eq!(next.name, b"bb");
    assert_eq!(iter.consumed(), 1024);
    assert!(iter.next().is_none());
}

#[test]
fn multi_block_directory_lists_every_entry_in_order() {
    let mut builder = ImageBuilder::new(1024).inodes_count(128);
    let sub = builder.add_dir(2, "many").expect("dir");
    let mut expected = vec![".".to_owned(), "..".to_owned()];
    for i in 0..60 {
        let name = format!("entry-with-a-fairly-long-name-{i:03}");
        builder.add_file(sub, &name, b"").expect("file");
        expected.push(name);
    }
    let img = builder.build().expect("build");
    assert!(img.layout(sub).expect("layout").data_blocks.len() > 1);
    let fs = img.open().expect("open");

    assert_eq!(names(&fs, InodeNumber(sub)), expected);
}

#[test]
fn scan_stops_at_directory_size_inside_a_block() {
    let mut builder = ImageBuilder::new(1024);
    builder.add_file(2, "a", b"x").expect("a");
    let mut img = builder.build().expect("build");
    // only "." and ".." lie within the first 24 bytes
    img.set_inode_size(2, 24);
    let fs = img.open().expect("open");

    assert_eq!(names(&fs, InodeNumber::ROOT), [".", ".."]);
}

#[test]
fn misaligned_record_length_is_corruption_at_that_block() {
    let mut builder = ImageBuilder::new(1024);
    builder.add_file(2, "a", b"x").expect("a");
    let mut img = builder.build().expect("build");
    let block = img.layout(2).expect("root layout").data_blocks[0];
    // rec_len of ".." (offset 12) becomes 10
    img.put_u16(img.block_offset(block) + 12 + 4, 10);
    let fs = img.open().expect("open");

    let err = fs.read_dir(InodeNumber::ROOT).expect_err("corrupt");
    assert!(
        matches!(err, Ext2Error::Corruption { block: b, .. } if b == u64::from(block)),
        "{err:?}"
    );
    assert_eq!(err.to_errno(), libc::EPROTO);
}

#[test]
fn record_crossing_block_end_is_corruption() {
    let mut builder = ImageBuilder::new(1024);
    builder.add_file(2, "a", b"x").expect("a");
    let mut img = builder.build().expect("build");
    let block = img.layout(2).expect("root layout").data_blocks[0];
    // "a" is the last record; stretch it past the block
    img.put_u16(img.block_offset(block) + 24 + 4, 1024);
    let fs = img.open().expect("open");

    assert!(matches!(
        fs.read_dir(InodeNumber::ROOT),
        Err(Ext2Error::Corruption { .. })
    ));
}

#[test]
fn listing_a_file_is_not_a_directory() {
    let mut builder = ImageBuilder::new(1024);
    let f = builder.add_file(2, "f", b"data").expect("f");
    let img = builder.build().expect("build");
    let fs = img.open().expect("open");

    let err = fs.read_dir(InodeNumber(f)).expect_err("file");
    assert!(matches!(err, Ext2Error::NotDirectory));
    assert_eq!(err.to_errno(), libc::ENOTDIR);
}

#[test]
fn lookup_stops_at_the_first_match() {
    let mut builder = ImageBuilder::new(1024).inodes_count(128);
    let sub = builder.add_dir(2, "many").expect("dir");
    for i in 0..60 {
        builder
            .add_file(sub, &format!("entry-with-a-fairly-long-name-{i:03}"), b"")
            .expect("file");
    }
    let img = builder.build().expect("build");
    let dir_blocks = img.layout(sub).expect("layout").data_blocks.clone();
    let (fs, dev) = img.open_counting().expect("open");
    let bs = img.block_size();

    let hit = fs
        .lookup_name(InodeNumber(sub), b"entry-with-a-fairly-long-name-000")
        .expect("lookup")
        .expect("present");
    assert!(hit.is_regular());
    assert_eq!(dev.reads_of_block(dir_blocks[0], bs), 1);
    for &later in &dir_blocks[1..] {
        assert_eq!(dev.reads_of_block(later, bs), 0, "block {later} was read");
    }

    assert!(fs
        .lookup_name(InodeNumber(sub), b"missing")
        .expect("lookup")
        .is_none());
    assert_eq!(dev.reads_of_block(dir_blocks[dir_blocks.len() - 1], bs), 1);
}

#[test]
fn visitor_break_ends_the_scan() {
    let mut builder = ImageBuilder::new(1024);
    builder.add_file(2, "a", b"x").expect("a");
    builder.add_file(2, "b", b"y").expect("b");
    let img = builder.build().expect("build");
    let fs = img.open().expect("open");

    let mut seen = Vec::new();
    fs.visit_dir(InodeNumber::ROOT, |entry| {
        seen.push(entry.name_str());
        if entry.name == b"a" {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })
    .expect("visit");
    assert_eq!(seen, [".", "..", "a"]);
}

#[test]
fn untyped_entries_report_unknown() {
    let mut builder = ImageBuilder::new(1024).typed_entries(false);
    builder.add_dir(2, "d").expect("d");
    let img = builder.build().expect("build");
    let fs = img.open().expect("open");

    let entries = fs.read_dir(InodeNumber::ROOT).expect("root");
    assert!(entries.iter().all(|e| e.file_type == Ext2FileType::Unknown));
}
