//! Command-line front end for ixdb index files
use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use ixdb::{
    AttrType, Attribute, IndexFileHandle, IndexKey, IndexManager, IndexOptions, IndexResult,
    PagedFileManager, RecordId, ScanBound,
};

#[derive(Parser, Debug)]
#[command(
    name = "ixdb",
    version,
    about = "Create, edit and inspect disk-resident B+ tree index files"
)]
struct Cli {
    #[command(flatten)]
    key: KeyArgs,

    #[arg(
        long,
        global = true,
        env = "IXDB_MAX_ENTRIES",
        help = "Cap on entries per index page"
    )]
    max_entries: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct KeyArgs {
    #[arg(
        long = "type",
        global = true,
        value_enum,
        default_value_t = KeyType::Int,
        help = "Type of the indexed attribute"
    )]
    key_type: KeyType,

    #[arg(
        long,
        global = true,
        default_value_t = 32,
        help = "Maximum VARCHAR key length in bytes"
    )]
    length: u32,
}

impl KeyArgs {
    fn attribute(&self) -> Attribute {
        let attr_type = match self.key_type {
            KeyType::Int => AttrType::Int,
            KeyType::Real => AttrType::Real,
            KeyType::Varchar => AttrType::VarChar,
        };
        Attribute::new("key", attr_type, self.length)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum KeyType {
    Int,
    Real,
    Varchar,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an empty index file
    Create {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Delete an index file
    Destroy {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Add a (key, record id) entry
    Insert(EntryCmd),
    /// Remove a (key, record id) entry
    Delete(EntryCmd),
    /// Print entries in key order, one per line
    Scan(ScanCmd),
    /// Print the tree as JSON
    Dump {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
struct EntryCmd {
    #[arg(value_name = "FILE")]
    file: PathBuf,
    #[arg(allow_hyphen_values = true)]
    key: String,
    page: u32,
    slot: u32,
}

#[derive(Args, Debug)]
struct ScanCmd {
    #[arg(value_name = "FILE")]
    file: PathBuf,

    #[arg(long, allow_hyphen_values = true, help = "Lower bound of the range")]
    low: Option<String>,

    #[arg(long, allow_hyphen_values = true, help = "Upper bound of the range")]
    high: Option<String>,

    #[arg(long, help = "Leave keys equal to --low out")]
    low_exclusive: bool,

    #[arg(long, help = "Leave keys equal to --high out")]
    high_exclusive: bool,
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let options = IndexOptions {
        max_entries_per_page: cli.max_entries,
    };
    let mut manager = IndexManager::with_options(PagedFileManager::new(), options)?;
    let attr = cli.key.attribute();

    match cli.command {
        Command::Create { file } => manager.create_file(&file)?,
        Command::Destroy { file } => manager.destroy_file(&file)?,
        Command::Insert(cmd) => {
            let key = IndexKey::parse(&attr, &cmd.key)?;
            let rid = RecordId::new(cmd.page, cmd.slot);
            with_index(&mut manager, &cmd.file, |manager, handle| {
                manager.insert_entry(handle, &attr, &key, rid)
            })?;
        }
        Command::Delete(cmd) => {
            let key = IndexKey::parse(&attr, &cmd.key)?;
            let rid = RecordId::new(cmd.page, cmd.slot);
            with_index(&mut manager, &cmd.file, |manager, handle| {
                manager.delete_entry(handle, &attr, &key, rid)
            })?;
        }
        Command::Scan(cmd) => {
            let low = bound(&attr, cmd.low.as_deref(), !cmd.low_exclusive)?;
            let high = bound(&attr, cmd.high.as_deref(), !cmd.high_exclusive)?;
            with_index(&mut manager, &cmd.file, |manager, handle| {
                for entry in manager.scan(handle, &attr, low.as_ref(), high.as_ref())? {
                    let (key, rid) = entry?;
                    println!("{key}\t{rid}");
                }
                Ok(())
            })?;
        }
        Command::Dump { file } => {
            let json = with_index(&mut manager, &file, |manager, handle| {
                manager.print_btree(handle, &attr)
            })?;
            println!("{json}");
        }
    }

    Ok(())
}

fn bound(
    attr: &Attribute,
    text: Option<&str>,
    inclusive: bool,
) -> IndexResult<Option<ScanBound>> {
    let Some(text) = text else {
        return Ok(None);
    };
    Ok(Some(ScanBound {
        key: IndexKey::parse(attr, text)?,
        inclusive,
    }))
}

/// Open `path`, run `op`, report the handle's I/O and close it again
fn with_index<T>(
    manager: &mut IndexManager,
    path: &Path,
    op: impl FnOnce(&IndexManager, &mut IndexFileHandle) -> IndexResult<T>,
) -> IndexResult<T> {
    let mut handle = manager.open_file(path)?;
    let result = op(manager, &mut handle);

    let counters = serde_json::to_string(&handle.io_counters());
    manager.close_file(handle)?;
    eprintln!("io: {}", counters?);
    result
}
