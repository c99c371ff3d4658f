use clap::Parser;
use tracing::Level;

use crate::codec::RawDeflate;

#[derive(Parser, Debug)]
#[command(name = "zippen")]
#[command(version)]
#[command(about = "Build and unpack ZIP archives", long_about = None)]
#[command(after_help = "Examples:\n  \
  zippen -c site.zip public/     pack the public/ directory into site.zip\n  \
  zippen data1.zip -x joe        extract all files except joe from data1.zip\n  \
  zippen -p foo.zip | more       send contents of foo.zip via pipe into more\n  \
  zippen -l https://example.com/archive.zip   list files from remote ZIP")]
pub struct Cli {
    /// ZIP file path or HTTP URL
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Files to extract (default: all), or files and directories to add with -c
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,

    /// Create FILE from FILES instead of extracting
    #[arg(short = 'c', conflicts_with_all = ["list", "verbose", "pipe", "extract_dir"])]
    pub create: bool,

    /// DEFLATE level used with -c (0 = fastest, 9 = smallest)
    #[arg(long, value_name = "N", default_value_t = RawDeflate::DEFAULT_LEVEL,
          value_parser = clap::value_parser!(u32).range(0..=9))]
    pub level: u32,

    /// List files (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely/show version info
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Extract files to pipe, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<String>,

    /// Exclude files that follow
    #[arg(short = 'x', value_name = "FILE", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Never overwrite existing files
    #[arg(short = 'n')]
    pub never_overwrite: bool,

    /// Overwrite files WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Junk paths (do not make directories)
    #[arg(short = 'j')]
    pub junk_paths: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// More diagnostics on stderr (repeat for trace output)
    #[arg(long = "verbose-log", action = clap::ArgAction::Count)]
    pub verbose_log: u8,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.file.starts_with("http://") || self.file.starts_with("https://")
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.pipe
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    /// Diagnostics level added on top of `RUST_LOG`.
    pub fn log_level(&self) -> Level {
        if self.verbose_log > 1 {
            Level::TRACE
        } else if self.verbose_log == 1 {
            Level::DEBUG
        } else if self.is_very_quiet() {
            Level::ERROR
        } else if self.verbose {
            Level::INFO
        } else {
            Level::WARN
        }
    }
}
