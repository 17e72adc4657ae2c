use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Lower the default log filter to debug.
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Download(DownloadArgs),
    Status(StatusArgs),
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// Table-of-contents file (`toc.yaml`) listing volumes and chapter URLs.
    #[arg(long)]
    pub toc: String,

    /// Output directory for volume folders and chapter files.
    #[arg(long)]
    pub out: String,

    /// Resume map path (default: `<out>/resume.json`).
    #[arg(long)]
    pub resume_file: Option<String>,

    /// Per-page fetch timeout.
    #[arg(long, default_value_t = 30)]
    pub page_timeout_secs: u64,

    /// Multiplies the per-chapter deadline to give slow sites more headroom.
    #[arg(long, default_value_t = 1)]
    pub timeout_multiplier: u32,

    /// Maximum chapters downloaded at once.
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// Delay between page fetches within one chapter (politeness).
    #[arg(long, default_value_t = 200)]
    pub delay_ms: u64,

    /// Page markup convention to follow.
    #[arg(long, value_enum, default_value_t = ParserMode::Paged)]
    pub parser: ParserMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ParserMode {
    /// Whole `<body>` per URL; every chapter is a single page.
    Plain,
    /// Follow `rel="next"` links page to page; `rel="next-chapter"` chains
    /// chapters.
    Paged,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Resume map file written by `download`.
    #[arg(long)]
    pub resume_file: String,
}
