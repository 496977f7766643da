#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use e2r_core::{ByteWindow, ContentSink, Ext2Fs, FileSink, FnSink, PathExpect};
use e2r_types::{BlockNumber, GroupNumber, InodeNumber};
use serde::Serialize;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

// ── CLI definition ──────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "e2r", about = "Read-only ext2 image inspector")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// Selects an inode by path (default `/`) or by number.
#[derive(Args)]
struct Target {
    /// Path inside the image.
    path: Option<String>,
    /// Inode number; overrides the path.
    #[arg(long, conflicts_with = "path")]
    inode: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the superblock and the first group descriptor.
    Inspect {
        /// Path to the ext2 image.
        image: PathBuf,
        /// Output in JSON format.
        #[arg(long)]
        json: bool,
    },
    /// List a directory.
    Ls {
        image: PathBuf,
        #[command(flatten)]
        target: Target,
    },
    /// Copy file content to stdout or a file.
    Cat {
        image: PathBuf,
        #[command(flatten)]
        target: Target,
        /// First byte to copy.
        #[arg(long, default_value_t = 0)]
        offset: u64,
        /// Maximum number of bytes to copy.
        #[arg(long)]
        length: Option<u64>,
        /// Write to this file instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Print the physical blocks of an inode.
    Blocks {
        image: PathBuf,
        #[command(flatten)]
        target: Target,
    },
    /// Print inode attributes.
    Stat {
        image: PathBuf,
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        json: bool,
    },
}

// ── Serializable outputs ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct InspectOutput {
    block_size: u32,
    blocks_count: u32,
    inodes_count: u32,
    free_blocks_count: u32,
    free_inodes_count: u32,
    first_data_block: u32,
    blocks_per_group: u32,
    inodes_per_group: u32,
    inode_size: u16,
    first_ino: u32,
    rev_level: u32,
    state: u16,
    mnt_count: u16,
    max_mnt_count: u16,
    groups_count: u32,
    volume_name: String,
    last_mounted: String,
    uuid: String,
    group0: GroupOutput,
}

#[derive(Debug, Serialize)]
struct GroupOutput {
    block_bitmap: u32,
    inode_bitmap: u32,
    inode_table: u32,
    free_blocks_count: u16,
    free_inodes_count: u16,
    used_dirs_count: u16,
}

// ── Main ────────────────────────────────────────────────────────────────────

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Inspect { image, json } => inspect(&image, json),
        Command::Ls { image, target } => ls(&image, &target),
        Command::Cat {
            image,
            target,
            offset,
            length,
            output,
        } => cat(&image, &target, offset, length, output.as_deref()),
        Command::Blocks { image, target } => blocks(&image, &target),
        Command::Stat {
            image,
            target,
            json,
        } => stat(&image, &target, json),
    }
}

fn open_image(path: &Path) -> Result<Ext2Fs> {
    Ext2Fs::open(path).with_context(|| format!("failed to open ext2 image {}", path.display()))
}

fn resolve_target(fs: &Ext2Fs, target: &Target, expect: PathExpect) -> Result<InodeNumber> {
    if let Some(ino) = target.inode {
        return Ok(InodeNumber(ino));
    }
    let path = target.path.as_deref().unwrap_or("/");
    fs.resolve_path(path, expect)
        .with_context(|| format!("failed to resolve {path}"))
}

// ── Commands ────────────────────────────────────────────────────────────────

fn inspect(path: &Path, json: bool) -> Result<()> {
    let fs = open_image(path)?;
    let sb = fs.superblock();
    let gd = fs
        .read_group_desc(GroupNumber(0))
        .context("failed to read group 0 descriptor")?;

    let output = InspectOutput {
        block_size: sb.block_size,
        blocks_count: sb.blocks_count,
        inodes_count: sb.inodes_count,
        free_blocks_count: sb.free_blocks_count,
        free_inodes_count: sb.free_inodes_count,
        first_data_block: sb.first_data_block,
        blocks_per_group: sb.blocks_per_group,
        inodes_per_group: sb.inodes_per_group,
        inode_size: sb.inode_size,
        first_ino: sb.first_ino,
        rev_level: sb.rev_level,
        state: sb.state,
        mnt_count: sb.mnt_count,
        max_mnt_count: sb.max_mnt_count,
        groups_count: sb.groups_count(),
        volume_name: sb.volume_name.clone(),
        last_mounted: sb.last_mounted.clone(),
        uuid: format_uuid(&sb.uuid),
        group0: GroupOutput {
            block_bitmap: gd.block_bitmap,
            inode_bitmap: gd.inode_bitmap,
            inode_table: gd.inode_table,
            free_blocks_count: gd.free_blocks_count,
            free_inodes_count: gd.free_inodes_count,
            used_dirs_count: gd.used_dirs_count,
        },
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("serialize output")?
        );
        return Ok(());
    }

    println!("ext2 image: {}", path.display());
    println!("volume_name: {}", output.volume_name);
    println!("uuid: {}", output.uuid);
    println!("rev_level: {}", output.rev_level);
    println!("block_size: {}", output.block_size);
    println!(
        "blocks_count: {} (free {})",
        output.blocks_count, output.free_blocks_count
    );
    println!(
        "inodes_count: {} (free {})",
        output.inodes_count, output.free_inodes_count
    );
    println!("first_data_block: {}", output.first_data_block);
    println!("blocks_per_group: {}", output.blocks_per_group);
    println!("inodes_per_group: {}", output.inodes_per_group);
    println!("inode_size: {}", output.inode_size);
    println!("first_ino: {}", output.first_ino);
    println!("groups_count: {}", output.groups_count);
    println!(
        "mount_count: {}/{}",
        output.mnt_count, output.max_mnt_count
    );
    println!("group 0:");
    println!("  block_bitmap: {}", output.group0.block_bitmap);
    println!("  inode_bitmap: {}", output.group0.inode_bitmap);
    println!("  inode_table: {}", output.group0.inode_table);
    println!(
        "  free: {} blocks, {} inodes; {} dirs",
        output.group0.free_blocks_count,
        output.group0.free_inodes_count,
        output.group0.used_dirs_count
    );
    Ok(())
}

fn ls(path: &Path, target: &Target) -> Result<()> {
    let fs = open_image(path)?;
    let ino = resolve_target(&fs, target, PathExpect::Directory)?;
    let entries = fs
        .read_dir(ino)
        .with_context(|| format!("failed to list inode {ino}"))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for entry in entries {
        writeln!(
            out,
            "{} {:>8} {}",
            entry.file_type.tag(),
            entry.inode.0,
            entry.name_str()
        )?;
    }
    Ok(())
}

fn cat(
    path: &Path,
    target: &Target,
    offset: u64,
    length: Option<u64>,
    output: Option<&Path>,
) -> Result<()> {
    let fs = open_image(path)?;
    let ino = resolve_target(&fs, target, PathExpect::File)?;
    let window = ByteWindow::new(offset, length.unwrap_or(u64::MAX));

    let written = if let Some(dest) = output {
        let file = File::create(dest)
            .with_context(|| format!("failed to create {}", dest.display()))?;
        let mut sink = FileSink::new(file);
        copy(&fs, ino, &mut sink, window)?
    } else {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        // chunks arrive in ascending, contiguous order
        let mut sink = FnSink(|buf: &[u8], _offset: u64| -> io::Result<usize> {
            out.write_all(buf)?;
            Ok(buf.len())
        });
        let written = copy(&fs, ino, &mut sink, window)?;
        out.flush()?;
        written
    };

    if output.is_some() {
        eprintln!("wrote {written} bytes");
    }
    Ok(())
}

fn copy(
    fs: &Ext2Fs,
    ino: InodeNumber,
    sink: &mut dyn ContentSink,
    window: ByteWindow,
) -> Result<u64> {
    fs.copy_inode(ino, sink, Some(window))
        .with_context(|| format!("failed to copy inode {ino}"))
}

fn blocks(path: &Path, target: &Target) -> Result<()> {
    let fs = open_image(path)?;
    let ino = resolve_target(&fs, target, PathExpect::Any)?;
    let mut iter = fs
        .block_iter(ino)
        .with_context(|| format!("failed to read inode {ino}"))?;

    let mut blocks = Vec::new();
    while let Some(block) = iter
        .next_block()
        .with_context(|| format!("block map of inode {ino} at logical {}", iter.position()))?
    {
        blocks.push(block);
    }

    println!("inode {ino}: {} blocks", blocks.len());
    let runs = format_runs(&blocks);
    if !runs.is_empty() {
        println!("{runs}");
    }
    if iter.indirect_reads() > 0 {
        println!("indirect blocks read: {}", iter.indirect_reads());
    }
    Ok(())
}

fn stat(path: &Path, target: &Target, json: bool) -> Result<()> {
    let fs = open_image(path)?;
    let ino = resolve_target(&fs, target, PathExpect::Any)?;
    let inode = fs
        .read_inode(ino)
        .with_context(|| format!("failed to read inode {ino}"))?;
    let attr = fs.read_inode_attr(ino)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&attr).context("serialize output")?
        );
        return Ok(());
    }

    println!("inode: {ino}");
    println!("type: {:?}", attr.kind);
    println!("mode: {:o}", inode.mode);
    println!("size: {}", attr.size);
    println!("links: {}", attr.nlink);
    println!("uid/gid: {}/{}", attr.uid, attr.gid);
    println!("sectors: {}", attr.blocks);
    println!("flags: {:#x}", inode.flags);
    println!("atime: {}", inode.atime);
    println!("mtime: {}", inode.mtime);
    println!("ctime: {}", inode.ctime);
    if inode.dtime != 0 {
        println!("dtime: {}", inode.dtime);
    }
    if attr.rdev != 0 {
        println!("rdev: {:#06x}", attr.rdev);
    }
    Ok(())
}

// ── Formatting ──────────────────────────────────────────────────────────────

/// debugfs-style list: `(logical-range):physical-range`, one run per
/// physically contiguous stretch.
fn format_runs(blocks: &[BlockNumber]) -> String {
    let mut runs = Vec::new();
    let mut start = 0_usize;
    for i in 1..=blocks.len() {
        let contiguous = i < blocks.len() && blocks[i].0 == blocks[i - 1].0 + 1;
        if contiguous {
            continue;
        }
        let (first, last) = (blocks[start].0, blocks[i - 1].0);
        if start == i - 1 {
            runs.push(format!("({start}):{first}"));
        } else {
            runs.push(format!("({start}-{}):{first}-{last}", i - 1));
        }
        start = i;
    }
    runs.join(", ")
}

fn format_uuid(uuid: &[u8; 16]) -> String {
    let hex: String = uuid.iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}
