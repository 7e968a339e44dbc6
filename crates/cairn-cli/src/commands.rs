use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context};
use colored::Colorize;
use serde::Serialize;
use tracing::debug;

use cairn_pack::{PackIndex, PackReader};
use cairn_store::{FsyncObjectFiles, HashMode, ObjectDatabase, StoreConfig};
use cairn_types::{ObjectId, ObjectKind};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let json = matches!(cli.format, OutputFormat::Json);
    match cli.command {
        Command::Init(args) => cmd_init(&cli.dir, args),
        Command::HashObject(args) => cmd_hash_object(&cli.dir, args, json),
        Command::AddBulk(args) => cmd_add_bulk(&cli.dir, args, json),
        Command::CatObject(args) => cmd_cat_object(&cli.dir, args),
        Command::VerifyPack(args) => cmd_verify_pack(args, json),
        Command::ShowToc(args) => cmd_show_toc(args, json),
        Command::Config => cmd_config(&cli.dir, json),
    }
}

fn parse_kind(name: &str) -> anyhow::Result<ObjectKind> {
    name.parse::<ObjectKind>()
        .map_err(|e| anyhow::anyhow!("{e}"))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_init(dir: &Path, args: InitArgs) -> anyhow::Result<()> {
    let config = StoreConfig {
        pack_size_limit: args.pack_size_limit.filter(|&limit| limit > 0),
        compression_level: args.compression_level,
        fsync_object_files: match args.fsync {
            FsyncArg::Off => FsyncObjectFiles::Off,
            FsyncArg::On => FsyncObjectFiles::On,
            FsyncArg::Batch => FsyncObjectFiles::Batch,
        },
    };
    ObjectDatabase::init(dir, config)
        .with_context(|| format!("initializing {}", dir.display()))?;
    println!(
        "{} Initialized object database in {}",
        "✓".green().bold(),
        dir.display().to_string().bold()
    );
    Ok(())
}

#[derive(Serialize)]
struct HashedPath {
    path: String,
    id: ObjectId,
}

fn cmd_hash_object(dir: &Path, args: HashObjectArgs, json: bool) -> anyhow::Result<()> {
    let kind = parse_kind(&args.kind)?;
    if args.paths.is_empty() {
        bail!("no input files");
    }

    let mut results = Vec::with_capacity(args.paths.len());
    if !args.write {
        for path in &args.paths {
            let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            results.push(HashedPath {
                path: path.display().to_string(),
                id: ObjectDatabase::hash_object(kind, &data),
            });
        }
    } else {
        let mut db = ObjectDatabase::open(dir)?;
        for path in &args.paths {
            let id = if args.loose {
                let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
                db.write_loose(kind, &data, None)?
            } else {
                db.index_file(path, kind, HashMode::Write)
                    .with_context(|| format!("checking in {}", path.display()))?
            };
            results.push(HashedPath {
                path: path.display().to_string(),
                id,
            });
        }
    }

    if json {
        return print_json(&results);
    }
    for r in &results {
        println!("{}", r.id.to_hex());
    }
    Ok(())
}

#[derive(Serialize)]
struct BulkSummary {
    objects: Vec<HashedPath>,
    packs: Vec<cairn_store::PackFile>,
}

fn cmd_add_bulk(dir: &Path, args: AddBulkArgs, json: bool) -> anyhow::Result<()> {
    let kind = parse_kind(&args.kind)?;
    let mut db = match args.pack_size_limit {
        Some(limit) => {
            let root_config = ObjectDatabase::open(dir)?.config().clone();
            let config = StoreConfig {
                pack_size_limit: Some(limit).filter(|&l| l > 0),
                ..root_config
            };
            ObjectDatabase::with_config(dir, config)?
        }
        None => ObjectDatabase::open(dir)?,
    };

    debug!(limit = ?db.config().pack_size_limit, files = args.paths.len(), "starting bulk check-in");
    db.plug()?;
    let mut objects = Vec::with_capacity(args.paths.len());
    for path in &args.paths {
        let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let size = file.metadata()?.len();
        let id = db
            .index_stream(&mut file, size, kind, HashMode::Write)
            .with_context(|| format!("checking in {}", path.display()))?;
        objects.push(HashedPath {
            path: path.display().to_string(),
            id,
        });
    }
    let report = db.unplug()?;

    if json {
        return print_json(&BulkSummary {
            objects,
            packs: report.packs,
        });
    }
    for obj in &objects {
        println!("{} {}", obj.id.short_hex().yellow(), obj.path);
    }
    for pack in &report.packs {
        println!(
            "{} {} ({} objects)",
            "✓".green(),
            pack.pack_path.display().to_string().bold(),
            pack.object_count()
        );
    }
    if report.packs.is_empty() {
        println!("Nothing new to pack.");
    }
    Ok(())
}

fn cmd_cat_object(dir: &Path, args: CatObjectArgs) -> anyhow::Result<()> {
    let id = ObjectId::from_hex(&args.id).map_err(|e| anyhow::anyhow!("{e}"))?;
    let db = ObjectDatabase::open(dir)?;
    let obj = db.require_object(&id)?;
    if args.kind {
        println!("{}", obj.kind);
    } else if args.size {
        println!("{}", obj.size());
    } else {
        std::io::stdout().write_all(&obj.data)?;
    }
    Ok(())
}

#[derive(Serialize)]
struct PackSummary {
    pack: String,
    checksum: String,
    objects: Vec<PackObject>,
}

#[derive(Serialize)]
struct PackObject {
    id: ObjectId,
    offset: u64,
    crc32: u32,
}

fn cmd_verify_pack(args: VerifyPackArgs, json: bool) -> anyhow::Result<()> {
    let reader = PackReader::open(&args.pack)
        .with_context(|| format!("opening {}", args.pack.display()))?;
    reader.verify()?;

    let mut objects: Vec<PackObject> = reader
        .index()
        .entries()
        .map(|e| PackObject {
            id: e.id,
            offset: e.offset,
            crc32: e.crc32,
        })
        .collect();
    objects.sort_by_key(|o| o.offset);

    let summary = PackSummary {
        pack: args.pack.display().to_string(),
        checksum: hex::encode(reader.checksum()),
        objects,
    };
    if json {
        return print_json(&summary);
    }
    if args.verbose {
        for o in &summary.objects {
            println!("{} {:>10} {:08x}", o.id.to_hex(), o.offset, o.crc32);
        }
    }
    println!(
        "{} {}: {} objects, checksum {}",
        "✓".green().bold(),
        summary.pack,
        summary.objects.len(),
        &summary.checksum[..16]
    );
    Ok(())
}

#[derive(Serialize)]
struct TocEntry {
    id: String,
    size: usize,
}

fn cmd_show_toc(args: ShowTocArgs, json: bool) -> anyhow::Result<()> {
    let data = std::fs::read(&args.index)
        .with_context(|| format!("reading {}", args.index.display()))?;
    let toc = PackIndex::table_of_contents(&data)?;
    let entries: Vec<TocEntry> = toc
        .ids()
        .iter()
        .map(|&id| TocEntry {
            id: chunk_name(id),
            size: toc.pair_chunk(id).map(<[u8]>::len).unwrap_or(0),
        })
        .collect();

    if json {
        return print_json(&entries);
    }
    for e in &entries {
        println!("{}  {:>10} bytes", e.id.cyan(), e.size);
    }
    Ok(())
}

/// Printable form of a chunk id: its four ASCII letters, or hex.
fn chunk_name(id: u32) -> String {
    let bytes = id.to_be_bytes();
    if bytes.iter().all(|b| b.is_ascii_graphic()) {
        String::from_utf8_lossy(&bytes).into_owned()
    } else {
        format!("{id:08x}")
    }
}

fn cmd_config(dir: &Path, json: bool) -> anyhow::Result<()> {
    let db = ObjectDatabase::open(dir)?;
    let config = db.config();
    if json {
        return print_json(config);
    }
    print!("{}", config.to_toml_string()?);
    Ok(())
}
