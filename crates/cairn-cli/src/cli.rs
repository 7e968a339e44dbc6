use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cairn",
    about = "Cairn: content-addressed object store with streaming pack check-in",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Object database root
    #[arg(short = 'C', long = "dir", global = true, default_value = ".")]
    pub dir: PathBuf,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum FsyncArg {
    Off,
    On,
    Batch,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an object database
    Init(InitArgs),
    /// Compute object IDs, optionally storing the objects
    HashObject(HashObjectArgs),
    /// Check in many files as one plugged batch
    AddBulk(AddBulkArgs),
    /// Print a stored object
    CatObject(CatObjectArgs),
    /// Verify a pack and list its objects
    VerifyPack(VerifyPackArgs),
    /// Print the chunk table of a pack index
    ShowToc(ShowTocArgs),
    /// Show the effective configuration
    Config,
}

#[derive(Args)]
pub struct InitArgs {
    #[arg(long)]
    pub pack_size_limit: Option<u64>,
    #[arg(long, default_value = "6")]
    pub compression_level: u32,
    #[arg(long, value_enum, default_value = "on")]
    pub fsync: FsyncArg,
}

#[derive(Args)]
pub struct HashObjectArgs {
    pub paths: Vec<PathBuf>,
    /// Object kind
    #[arg(short = 't', long = "type", default_value = "blob")]
    pub kind: String,
    /// Store the objects
    #[arg(short, long)]
    pub write: bool,
    /// Store as loose objects instead of streaming into a pack
    #[arg(long, requires = "write")]
    pub loose: bool,
}

#[derive(Args)]
pub struct AddBulkArgs {
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
    #[arg(short = 't', long = "type", default_value = "blob")]
    pub kind: String,
    /// Override the configured pack size limit for this batch
    #[arg(long)]
    pub pack_size_limit: Option<u64>,
}

#[derive(Args)]
pub struct CatObjectArgs {
    pub id: String,
    /// Print only the kind
    #[arg(short = 't', conflicts_with = "size")]
    pub kind: bool,
    /// Print only the size
    #[arg(short = 's')]
    pub size: bool,
}

#[derive(Args)]
pub struct VerifyPackArgs {
    pub pack: PathBuf,
    /// List every object
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Args)]
pub struct ShowTocArgs {
    pub index: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::try_parse_from(["cairn", "init"]).unwrap();
        if let Command::Init(args) = cli.command {
            assert_eq!(args.compression_level, 6);
            assert!(args.pack_size_limit.is_none());
            assert!(matches!(args.fsync, FsyncArg::On));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_init_with_options() {
        let cli = Cli::try_parse_from([
            "cairn", "-C", "/tmp/db", "init", "--pack-size-limit", "1024", "--fsync", "batch",
        ])
        .unwrap();
        assert_eq!(cli.dir, PathBuf::from("/tmp/db"));
        if let Command::Init(args) = cli.command {
            assert_eq!(args.pack_size_limit, Some(1024));
            assert!(matches!(args.fsync, FsyncArg::Batch));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_hash_object() {
        let cli = Cli::try_parse_from(["cairn", "hash-object", "-w", "-t", "tree", "a", "b"]).unwrap();
        if let Command::HashObject(args) = cli.command {
            assert!(args.write);
            assert!(!args.loose);
            assert_eq!(args.kind, "tree");
            assert_eq!(args.paths.len(), 2);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn loose_requires_write() {
        assert!(Cli::try_parse_from(["cairn", "hash-object", "--loose", "a"]).is_err());
    }

    #[test]
    fn add_bulk_requires_paths() {
        assert!(Cli::try_parse_from(["cairn", "add-bulk"]).is_err());
        let cli = Cli::try_parse_from(["cairn", "add-bulk", "x"]).unwrap();
        assert!(matches!(cli.command, Command::AddBulk(_)));
    }

    #[test]
    fn parse_cat_object_flags() {
        let cli = Cli::try_parse_from(["cairn", "cat-object", "-s", "abcd"]).unwrap();
        if let Command::CatObject(args) = cli.command {
            assert!(args.size);
            assert!(!args.kind);
        } else { panic!("wrong command"); }
        assert!(Cli::try_parse_from(["cairn", "cat-object", "-s", "-t", "abcd"]).is_err());
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["cairn", "--format", "json", "verify-pack", "p.pack"]).unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
    }
}
