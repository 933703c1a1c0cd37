use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ingest a directory of EPUB archives into `manifest.json` and `covers.json`.
    Manifest(ManifestArgs),
    /// Search the catalog by free text and/or genre.
    Search(SearchArgs),
    /// List the catalog's top genres.
    Genres(CatalogArgs),
    /// Print one normalized catalog record.
    Show(ShowArgs),
    /// Recommend books similar to a library.
    Recommend(RecommendArgs),
    /// Open a book and print the current chapter, optionally moving first.
    Read(ReadArgs),
}

#[derive(Debug, Args)]
pub struct ManifestArgs {
    /// Directory containing `.epub` archives.
    #[arg(long)]
    pub input: String,

    /// Output directory for `manifest.json` and `covers.json`.
    #[arg(long)]
    pub out: String,

    /// Cover image directory (default: `<out>/covers`). Wiped on every run.
    #[arg(long)]
    pub covers: Option<String>,

    /// Prefix recorded in front of cover file names in the manifest.
    #[arg(long, default_value = "covers")]
    pub cover_prefix: String,

    /// Copy each archive into this content-addressed store as `{hash}.epub`.
    #[arg(long)]
    pub archive_store: Option<String>,
}

#[derive(Debug, Args)]
pub struct CatalogArgs {
    /// Path to a generated `manifest.json`.
    #[arg(long)]
    pub manifest: String,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[command(flatten)]
    pub catalog: CatalogArgs,

    /// Whitespace-separated terms; every term must match.
    #[arg(long, short)]
    pub query: Option<String>,

    /// Only books carrying this genre (case-insensitive).
    #[arg(long, short)]
    pub genre: Option<String>,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    #[command(flatten)]
    pub catalog: CatalogArgs,

    /// Book id (content hash).
    #[arg(long)]
    pub id: String,
}

#[derive(Debug, Args)]
pub struct RecommendArgs {
    #[command(flatten)]
    pub catalog: CatalogArgs,

    /// Ids of books already in the library (repeatable or comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub library: Vec<String>,
}

#[derive(Debug, Args)]
pub struct ReadArgs {
    #[command(flatten)]
    pub catalog: CatalogArgs,

    /// Book id (content hash).
    #[arg(long)]
    pub book: String,

    /// Archive store directory populated by `manifest --archive-store`.
    #[arg(long)]
    pub archive_store: String,

    /// Directory holding reading progress.
    #[arg(long)]
    pub progress_dir: String,

    /// Reader id used to key progress (default: `$EPUBSHELF_USER`, else `local`).
    #[arg(long)]
    pub user: Option<String>,

    /// Move before printing.
    #[arg(long, value_enum, default_value_t = ReadAction::Current)]
    pub action: ReadAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReadAction {
    Current,
    Next,
    Previous,
}
