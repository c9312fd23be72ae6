use clap::{Parser, Subcommand};
use pagetree::naming::StorageKey;
use pagetree::store::PageStore;
use pagetree::{config, output};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pagetree")]
#[command(about = "Flat-file hierarchical page store")]
#[command(long_about = "\
Flat-file hierarchical page store

Folders are pages. A numeric prefix orders a folder among its siblings, a
leading underscore makes it a modular part of its parent, and the markdown
file inside names the page's template and language.

Layout:

  pages/
  ├── 01.home/default.md           # Page 'home', template 'default'
  ├── 02.blog/blog.md              # Page 'blog', template 'blog'
  │   ├── 01.post-a/item.md        # Child page
  │   ├── 01.post-a/item.fr.md     # French variant of the same page
  │   └── _hero/hero.md            # Modular part of 'blog'
  └── drafts/default.md            # No prefix = unordered

Storage keys address folders by their physical names, with optional
template and language after a '|':

  02.blog/01.post-a                # folder
  02.blog/01.post-a|item.fr        # French 'item' variant

Run 'pagetree gen-config' to generate a documented pagetree.toml.")]
#[command(version)]
struct Cli {
    /// Site root (holds pagetree.toml, the data root and the cache dir)
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Log more (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the page tree, rebuilding the index if stale
    Index {
        /// Rebuild even if the cached index is fresh
        #[arg(long)]
        force: bool,
    },
    /// Show one folder's scanned metadata
    Show { key: String },
    /// Print a record's raw content
    Cat { key: String },
    /// Move a record's folder to a new storage key
    Move { from: String, to: String },
    /// Copy a record's folder to a new storage key
    Copy { from: String, to: String },
    /// Renumber a folder and its siblings to follow the given slugs
    Reorder {
        key: String,
        #[arg(required = true)]
        slugs: Vec<String>,
    },
    /// Delete a record (and its folder once no content is left)
    Delete { key: String },
    /// Print a stock pagetree.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let store = PageStore::open(&cli.root)?;
    match cli.command {
        Command::Index { force } => {
            let index = store.index(force)?;
            output::print_index_output(&index);
        }
        Command::Show { key } => {
            let meta = store.metadata(&key)?;
            output::print_metadata(&meta);
        }
        Command::Cat { key } => {
            let raw = store.read_raw(&key)?;
            print!("{}", String::from_utf8_lossy(&raw));
        }
        Command::Move { from, to } => {
            relocate(&store, &from, &to, false)?;
        }
        Command::Copy { from, to } => {
            relocate(&store, &from, &to, true)?;
        }
        Command::Reorder { key, slugs } => {
            let new_key = store.reorder(&key, &slugs)?;
            let siblings: Vec<String> = store
                .metadata(pagetree::naming::parent_key(&new_key))?
                .child_keys()
                .into_iter()
                .map(|(k, _)| k.to_key(false))
                .collect();
            for line in output::format_reordered(&new_key, &siblings) {
                println!("{}", line);
            }
        }
        Command::Delete { key } => {
            store.delete(&key)?;
            println!("Deleted {}", key);
        }
        Command::GenConfig => {}
    }

    Ok(())
}

/// Load `from` and save it under the folder named by `to`, keeping its
/// template and language unless `to` gives them.
fn relocate(
    store: &PageStore,
    from: &str,
    to: &str,
    copy: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let target = StorageKey::parse(to)?;
    let mut record = store.load(from)?;
    if copy {
        record = record.as_copy();
    }
    let has_params = target.has_params();
    record.key.parent_key = target.parent_key;
    record.key.order = target.order;
    record.key.folder = target.folder;
    if has_params {
        record.key.template = target.template;
        record.key.lang = target.lang;
    }
    let saved = store.save(&record)?;
    output::print_saved(from, &saved);
    Ok(())
}

/// `warn` by default, raised by `-v`; `RUST_LOG` wins when set.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}
