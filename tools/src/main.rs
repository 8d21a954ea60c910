//! Command line utilities around the libr10n core: compile dictionary
//! sources into prism/table files, and dump or restore user db snapshots.

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use libr10n_core::dictionary::Dictionary;
use libr10n_core::userdb::UserDb;

#[derive(Parser)]
#[command(name = "r10n_dict", about = "libr10n dictionary tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a TSV dictionary source (text<TAB>code[<TAB>weight]) into
    /// <name>.prism.bin and <name>.table.bin.
    Compile {
        /// Dictionary name; output files are <name>.prism.bin / <name>.table.bin
        name: String,
        /// Source file, one entry per line
        source: PathBuf,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Print basic facts about a compiled dictionary.
    Inspect {
        name: String,
        #[arg(short, long, default_value = ".")]
        data_dir: PathBuf,
    },
    /// Dump a user db into a text snapshot.
    DumpSnapshot {
        userdb: PathBuf,
        snapshot: PathBuf,
    },
    /// Restore a user db from a text snapshot, most committed entries first.
    RestoreSnapshot {
        userdb: PathBuf,
        snapshot: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Compile {
            name,
            source,
            out_dir,
        } => {
            std::fs::create_dir_all(&out_dir)?;
            let mut dict = Dictionary::new(&name, &out_dir);
            dict.compile(&source)
                .with_context(|| format!("compiling {source:?}"))?;
            println!("compiled dictionary '{name}' into {}", out_dir.display());
        }
        Command::Inspect { name, data_dir } => {
            let mut dict = Dictionary::new(&name, &data_dir);
            anyhow::ensure!(dict.exists(), "dictionary '{name}' not found");
            anyhow::ensure!(dict.load(), "dictionary '{name}' failed to load");
            let table = dict.table().unwrap();
            println!("dictionary:   {name}");
            println!("syllables:    {}", table.num_syllables());
            println!("entries:      {}", table.num_entries());
            println!("checksum:     {:#010x}", table.dict_file_checksum());
        }
        Command::DumpSnapshot { userdb, snapshot } => {
            let db = UserDb::open(&userdb)?;
            let records = db.snapshot_to(&snapshot)?;
            println!("dumped {records} records to {}", snapshot.display());
        }
        Command::RestoreSnapshot { userdb, snapshot } => {
            let db = UserDb::open(&userdb)?;
            let records = db.restore_from(&snapshot)?;
            println!("restored {records} records into {}", userdb.display());
        }
    }
    Ok(())
}
