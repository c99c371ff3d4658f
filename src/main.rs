//! Main entry point for the zippen CLI application.
//!
//! This binary creates ZIP archives from local files and lists or extracts
//! archives from the local filesystem or remote HTTP URLs.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, NaiveDateTime};
use clap::Parser;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use zippen::io::RemoteSource;
use zippen::zip::{ArchiveReader, Entry, EntryStore, ZipFileEntry};
use zippen::{Cli, Crc32, LocalFileReader, LocalFileSink, RawDeflate, ReadAt};

/// Application entry point.
///
/// Parses command-line arguments and dispatches to create, list or extract.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(cli.log_level().into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if cli.create {
        return create_archive(&cli).await;
    }

    if cli.is_http_url() {
        // Range requests when the server allows them, one download otherwise
        let transferred = match RemoteSource::open(cli.file.clone()).await? {
            RemoteSource::Ranged(reader) => {
                let reader = Arc::new(reader);
                process_zip(reader.clone(), &cli).await?;
                reader.transferred_bytes()
            }
            RemoteSource::Downloaded(reader) => {
                let size = reader.size();
                process_zip(Arc::new(reader), &cli).await?;
                size
            }
        };

        if !cli.is_quiet() {
            eprintln!("\nTotal bytes transferred: {}", format_size(transferred));
        }
    } else {
        let reader = Arc::new(LocalFileReader::new(Path::new(&cli.file))?);
        process_zip(reader, &cli).await?;
    }

    Ok(())
}

/// Build a new archive at `cli.file` from the paths in `cli.files`.
///
/// Directories are walked recursively and stored with a trailing `/`, files
/// keep their modification time. The archive is built fully in memory and
/// written in one go, so a failure leaves no partial file behind.
async fn create_archive(cli: &Cli) -> Result<()> {
    if cli.files.is_empty() {
        bail!("Nothing to add: pass files or directories after {}", cli.file);
    }

    let mut store = EntryStore::with_adapters(RawDeflate::new(cli.level), Crc32);

    for input in &cli.files {
        let root = Path::new(input);
        if !root.exists() {
            bail!("No such file or directory: {}", input);
        }

        for item in WalkDir::new(root).sort_by_file_name() {
            let item = item.with_context(|| format!("Cannot walk {}", input))?;
            let path = item.path();
            let is_dir = item.file_type().is_dir();

            if is_dir && cli.junk_paths {
                continue;
            }
            let Some(name) = archive_name(path, is_dir, cli.junk_paths) else {
                continue;
            };

            let metadata = item.metadata()?;
            let modified = metadata.modified().map(to_naive).unwrap_or_else(|_| now());

            if is_dir {
                store.add_directory(name.clone(), modified)?;
            } else {
                let data = fs::read(path)
                    .await
                    .with_context(|| format!("Cannot read {}", path.display()))?;
                store.add_file(name.clone(), modified, data)?;
            }

            if !cli.is_quiet() {
                println!("  adding: {}", name);
            }
        }
    }

    let archive = store.build()?;
    LocalFileSink::new(&cli.file).persist(&archive).await?;

    info!(entries = store.len(), bytes = archive.len(), "wrote {}", cli.file);
    if !cli.is_quiet() {
        println!(
            "{} entries, {} written to {}",
            store.len(),
            format_size(archive.len() as u64),
            cli.file
        );
    }

    Ok(())
}

/// Name an entry is stored under: forward slashes, no root or `.`
/// components, and a trailing `/` for directories.
fn archive_name(path: &Path, is_dir: bool, junk_paths: bool) -> Option<String> {
    if junk_paths {
        return path.file_name().map(|n| n.to_string_lossy().to_string());
    }

    let parts: Vec<_> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        return None;
    }

    let mut name = parts.join("/");
    if is_dir {
        name.push('/');
    }
    Some(name)
}

fn to_naive(time: std::time::SystemTime) -> NaiveDateTime {
    DateTime::<Local>::from(time).naive_local()
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Process a ZIP archive based on CLI options.
///
/// This function handles both listing and extraction modes:
/// - List mode (`-l` or `-v`): Display archive contents
/// - Extract mode: Extract files matching the specified filters
///
/// Both start from the central directory, and extraction then reads only
/// the selected entries.
async fn process_zip<R: ReadAt + 'static>(reader: Arc<R>, cli: &Cli) -> Result<()> {
    let archive = ArchiveReader::new(reader);
    let entries = archive
        .list_files()
        .await
        .with_context(|| format!("Cannot read {}", cli.file))?;

    // List mode: display archive contents and exit
    if cli.list || cli.verbose {
        list_files(&entries, cli.verbose);
        return Ok(());
    }

    // Apply filters to determine which files to extract:
    // 1. Skip directories (they are created automatically during extraction)
    // 2. If specific files are requested, only include matching entries
    // 3. Exclude files matching the exclusion patterns
    let files_to_extract: Vec<_> = entries
        .iter()
        .filter(|e| {
            if e.is_directory {
                return false;
            }

            if !cli.files.is_empty() {
                let matches = cli.files.iter().any(|f| {
                    if has_glob_chars(f) {
                        glob_match(f, &e.file_name)
                    } else {
                        let basename = Path::new(&e.file_name)
                            .file_name()
                            .map(|s| s.to_string_lossy())
                            .unwrap_or_default();
                        e.file_name == *f || basename == f.as_str()
                    }
                });
                if !matches {
                    return false;
                }
            }

            !cli
                .exclude
                .iter()
                .any(|x| e.file_name.contains(x.as_str()) || glob_match(x, &e.file_name))
        })
        .collect();

    let multiple_files = cli.pipe && files_to_extract.len() > 1;
    for listed in files_to_extract {
        let entry = archive.read_entry(listed).await?;
        extract_file(&entry, cli, multiple_files).await?;
    }

    Ok(())
}

/// List files in the ZIP archive.
///
/// Supports two output formats:
/// - Simple format (`-l`): Just file names, one per line
/// - Verbose format (`-v`): Detailed table with size, compression ratio, and timestamps
fn list_files(entries: &[ZipFileEntry], verbose: bool) {
    if verbose {
        println!(
            "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
            "Length", "Size", "Cmpr", "Date", "Time"
        );
        println!("{}", "-".repeat(70));
    }

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in entries {
        if verbose {
            let (year, month, day) = entry.mod_date();
            let (hour, minute, _second) = entry.mod_time();

            println!(
                "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
                entry.uncompressed_size,
                entry.compressed_size,
                ratio(entry.compressed_size, entry.uncompressed_size),
                year,
                month,
                day,
                hour,
                minute,
                entry.file_name
            );

            if !entry.is_directory {
                total_uncompressed += entry.uncompressed_size;
                total_compressed += entry.compressed_size;
                file_count += 1;
            }
        } else {
            println!("{}", entry.file_name);
        }
    }

    if verbose {
        println!("{}", "-".repeat(70));
        println!(
            "{:>10}  {:>10}  {}  {:>21}  {} files",
            total_uncompressed,
            total_compressed,
            ratio(total_compressed, total_uncompressed),
            "",
            file_count
        );
    }
}

/// Compression ratio as percentage saved
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 {
        format!(
            "{:>4}%",
            100i64 - (compressed * 100 / uncompressed) as i64
        )
    } else {
        "  0%".to_string()
    }
}

/// Extract a single file from the archive.
///
/// Handles various extraction options:
/// - Pipe mode (`-p`): Write to stdout instead of file
/// - Custom output directory (`-d`): Extract to specified directory
/// - Junk paths (`-j`): Ignore directory structure in archive
/// - Overwrite control (`-n`, `-o`): Handle existing files
async fn extract_file(entry: &Entry, cli: &Cli, show_filename: bool) -> Result<()> {
    let data = entry.data().unwrap_or_default();

    if cli.pipe {
        let mut stdout = tokio::io::stdout();
        if show_filename {
            stdout
                .write_all(format!("--- {} ---\n", entry.path()).as_bytes())
                .await?;
        }
        stdout.write_all(data).await?;
        return Ok(());
    }

    let file_name = if cli.junk_paths {
        Path::new(entry.path())
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| entry.path().to_string())
    } else {
        entry.path().to_string()
    };

    if !is_safe_path(&file_name) {
        warn!("Skipping: {} (path escapes the output directory)", entry.path());
        return Ok(());
    }

    let output_path = match cli.extract_dir {
        Some(ref dir) => PathBuf::from(dir).join(&file_name),
        None => PathBuf::from(&file_name),
    };

    if output_path.exists() {
        if cli.never_overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (file exists)", entry.path());
            }
            return Ok(());
        }

        if !cli.overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (use -o to overwrite)", entry.path());
            }
            return Ok(());
        }
    }

    if !cli.is_quiet() {
        println!("  extracting: {}", entry.path());
    }

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    fs::write(&output_path, data)
        .await
        .with_context(|| format!("Cannot write {}", output_path.display()))?;

    Ok(())
}

/// Reject absolute names and names that climb out with `..`.
fn is_safe_path(name: &str) -> bool {
    Path::new(name)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Check if a pattern contains glob wildcard characters.
fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// Simple glob pattern matching supporting `*` and `?` wildcards.
///
/// - `*` matches zero or more characters
/// - `?` matches exactly one character
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern_chars: Vec<char> = pattern.chars().collect();
    let text_chars: Vec<char> = text.chars().collect();

    fn do_match(pattern: &[char], text: &[char]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            // Try matching zero characters (skip the star)
            // OR matching one character (keep the star for more)
            (Some('*'), _) => {
                do_match(&pattern[1..], text) || (!text.is_empty() && do_match(pattern, &text[1..]))
            }
            (Some('?'), Some(_)) => do_match(&pattern[1..], &text[1..]),
            (Some(p), Some(t)) if *p == *t => do_match(&pattern[1..], &text[1..]),
            _ => false,
        }
    }

    do_match(&pattern_chars, &text_chars)
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
