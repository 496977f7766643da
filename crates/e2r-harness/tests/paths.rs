#![forbid(unsafe_code)]

use e2r_core::{FileType, PathExpect};
use e2r_error::Ext2Error;
use e2r_harness::{BuiltImage, ImageBuilder};
use e2r_types::{InodeNumber, S_IFIFO};

struct Tree {
    img: BuiltImage,
    x: u32,
    y: u32,
    deep: u32,
    fifo: u32,
}

/// `/x/y` is a file, `/x/sub/deep.txt` is nested, `/x/pipe` is a FIFO.
fn tree(typed: bool) -> Tree {
    let mut builder = ImageBuilder::new(1024).typed_entries(typed);
    let x = builder.add_dir(2, "x").expect("x");
    let y = builder.add_file(x, "y", b"file y\n").expect("y");
    let sub = builder.add_dir(x, "sub").expect("sub");
    let deep = builder.add_file(sub, "deep.txt", b"deep\n").expect("deep");
    let fifo = builder.add_special(x, "pipe", S_IFIFO | 0o600).expect("fifo");
    Tree {
        img: builder.build().expect("build"),
        x,
        y,
        deep,
        fifo,
    }
}

#[test]
fn root_and_nested_paths_resolve() {
    let t = tree(true);
    let fs = t.img.open().expect("open");

    assert_eq!(fs.resolve_path("/", PathExpect::Any).expect("root"), InodeNumber::ROOT);
    assert_eq!(fs.resolve_path("", PathExpect::Directory).expect("empty"), InodeNumber::ROOT);
    assert_eq!(fs.resolve_path("/x", PathExpect::Directory).expect("x"), InodeNumber(t.x));
    assert_eq!(
        fs.resolve_path("/x/sub/deep.txt", PathExpect::File).expect("deep"),
        InodeNumber(t.deep)
    );
    assert_eq!(
        fs.resolve_path("x//sub/./../y", PathExpect::File).expect("normalized"),
        InodeNumber(t.y)
    );
}

#[test]
fn file_in_the_middle_is_not_a_directory() {
    let t = tree(true);
    let fs = t.img.open().expect("open");

    let err = fs.resolve_path("/x/y/z", PathExpect::Any).expect_err("through file");
    assert!(matches!(err, Ext2Error::NotDirectory), "{err:?}");
}

#[test]
fn missing_component_is_not_found() {
    let t = tree(true);
    let fs = t.img.open().expect("open");

    let err = fs.resolve_path("/x/missing", PathExpect::Any).expect_err("missing");
    assert!(matches!(err, Ext2Error::NotFound(_)), "{err:?}");
    assert_eq!(err.to_errno(), libc::ENOENT);
    assert!(matches!(
        fs.resolve_path("/nope/y", PathExpect::Any),
        Err(Ext2Error::NotFound(_))
    ));
}

#[test]
fn expectation_on_the_final_component_is_enforced() {
    let t = tree(true);
    let fs = t.img.open().expect("open");

    assert!(matches!(
        fs.resolve_path("/x", PathExpect::File),
        Err(Ext2Error::IsDirectory)
    ));
    assert!(matches!(
        fs.resolve_path("/", PathExpect::File),
        Err(Ext2Error::IsDirectory)
    ));
    assert!(matches!(
        fs.resolve_path("/x/y", PathExpect::Directory),
        Err(Ext2Error::NotDirectory)
    ));
    assert_eq!(
        fs.resolve_path("/x/pipe", PathExpect::File).expect("fifo"),
        InodeNumber(t.fifo)
    );
}

#[test]
fn untyped_entries_fall_back_to_inode_mode() {
    let t = tree(false);
    let fs = t.img.open().expect("open");

    assert_eq!(
        fs.resolve_path("/x/sub/deep.txt", PathExpect::File).expect("deep"),
        InodeNumber(t.deep)
    );
    assert!(matches!(
        fs.resolve_path("/x/y/z", PathExpect::Any),
        Err(Ext2Error::NotDirectory)
    ));
    assert!(matches!(
        fs.resolve_path("/x/sub", PathExpect::File),
        Err(Ext2Error::IsDirectory)
    ));
}

#[test]
fn unlinked_name_no_longer_resolves() {
    let mut builder = ImageBuilder::new(1024);
    builder.add_file(2, "keep", b"k").expect("keep");
    builder.add_file(2, "drop", b"d").expect("drop");
    builder.unlink(2, "drop").expect("unlink");
    let img = builder.build().expect("build");
    let fs = img.open().expect("open");

    assert!(fs.resolve_path("/keep", PathExpect::File).is_ok());
    assert!(matches!(
        fs.resolve_path("/drop", PathExpect::Any),
        Err(Ext2Error::NotFound(_))
    ));
}

#[test]
fn open_entity_loads_inode_and_attributes() {
    let t = tree(true);
    let fs = t.img.open().expect("open");

    let entity = fs.open_entity("/x/y").expect("entity");
    assert_eq!(entity.path, "/x/y");
    assert_eq!(entity.ino, InodeNumber(t.y));
    assert_eq!(entity.inode.size, 7);
    assert_eq!(entity.attr.kind, FileType::RegularFile);
    assert_eq!(entity.attr.size, 7);
    assert_eq!(entity.attr.perm, 0o644);
    assert_eq!(entity.attr.nlink, 1);

    let dir = fs.open_entity("/x").expect("dir entity");
    assert_eq!(dir.attr.kind, FileType::Directory);
    // ".", the entry in root, and ".." of the one subdirectory
    assert_eq!(dir.attr.nlink, 3);

    let pipe = fs.open_entity("/x/pipe").expect("fifo entity");
    assert_eq!(pipe.attr.kind, FileType::Fifo);
    assert_eq!(pipe.attr.size, 0);
}
