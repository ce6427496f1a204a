use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use rgsearch::{
    find_files, list_files, list_files_with_info, search_structured, BinaryMode, Diagnostic,
    EncodingMode, FileInfo, SearchConfig, SearchMatch, SearchReport, SortMode, SortModeKind,
    WalkConfig,
};
use std::io::IsTerminal;
use std::{num::NonZeroUsize, path::PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML configuration file, merged over the global and local ones
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search file contents for patterns
    Search(Box<SearchArgs>),

    /// List files that would be searched
    Files {
        #[command(flatten)]
        walk: WalkArgs,

        /// Show size, kind and modification time
        #[arg(short, long)]
        long: bool,

        /// Print JSON instead of plain text
        #[arg(long)]
        json: bool,
    },

    /// Find files by name
    Find {
        /// Regular expression matched against file names
        name: String,

        #[command(flatten)]
        walk: WalkArgs,

        /// Exclude files matching this glob (can be specified multiple times)
        #[arg(short = 'x', long = "exclude")]
        excludes: Vec<String>,

        /// Print JSON instead of plain text
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct WalkArgs {
    /// Files or directories to search (defaults to the current directory)
    paths: Vec<PathBuf>,

    /// Include or exclude files matching a glob; prefix with ! to exclude,
    /// later globs win
    #[arg(short = 'g', long = "glob")]
    globs: Vec<String>,

    /// Search hidden files and directories
    #[arg(long)]
    hidden: bool,

    /// Don't respect .gitignore and .ignore files
    #[arg(long)]
    no_ignore: bool,

    /// Follow symbolic links
    #[arg(short = 'L', long)]
    follow: bool,

    /// Maximum directory depth
    #[arg(long)]
    max_depth: Option<usize>,

    /// Number of threads to use
    #[arg(short = 'j', long)]
    threads: Option<NonZeroUsize>,

    /// Sort results
    #[arg(long, value_enum, default_value = "none")]
    sort: SortArg,

    /// Reverse the sort order
    #[arg(long)]
    reverse: bool,
}

#[derive(Args)]
struct SearchArgs {
    /// Pattern to search for (can be specified multiple times)
    #[arg(short = 'e', long = "regexp")]
    patterns: Vec<String>,

    #[command(flatten)]
    walk: WalkArgs,

    /// Show line numbers
    #[arg(short = 'n', long)]
    line_number: bool,

    /// Case insensitive search
    #[arg(short = 'i', long)]
    ignore_case: bool,

    /// Treat patterns as literal strings
    #[arg(short = 'F', long)]
    fixed_strings: bool,

    /// Stop after this many matches in total
    #[arg(short = 'm', long)]
    max_count: Option<usize>,

    /// Maximum number of matching lines per file
    #[arg(long)]
    max_per_file: Option<usize>,

    /// Number of context lines after match
    #[arg(short = 'A', long, default_value = "0")]
    after_context: usize,

    /// Number of context lines before match
    #[arg(short = 'B', long, default_value = "0")]
    before_context: usize,

    /// Search binary files as text
    #[arg(short = 'a', long)]
    text: bool,

    /// Replace invalid UTF-8 instead of skipping the file
    #[arg(long)]
    lossy: bool,

    /// Only print the number of matches
    #[arg(short, long)]
    stats: bool,

    /// Print JSON instead of plain text
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    None,
    Path,
}

impl WalkArgs {
    fn sort_mode(&self) -> SortMode {
        let kind = match self.sort {
            SortArg::None => SortModeKind::None,
            SortArg::Path => SortModeKind::Path,
        };
        SortMode {
            kind,
            reverse: self.reverse,
        }
    }

    fn into_config(self) -> WalkConfig {
        let sort = self.sort_mode();
        let mut config = WalkConfig::new(self.paths).globs(self.globs).sort(sort);
        config.hidden = self.hidden;
        config.respect_ignore_files = !self.no_ignore;
        config.follow_links = self.follow;
        config.max_depth = self.max_depth;
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        config
    }
}

impl SearchArgs {
    fn into_config(self) -> SearchConfig {
        let binary = if self.text {
            BinaryMode::Text
        } else {
            BinaryMode::Skip
        };
        let encoding = if self.lossy {
            EncodingMode::Lossy
        } else {
            EncodingMode::FailFast
        };
        SearchConfig {
            patterns: self.patterns,
            walk: self.walk.into_config(),
            line_number: self.line_number,
            case_insensitive: self.ignore_case,
            fixed_strings: self.fixed_strings,
            max_total: self.max_count,
            max_per_file: self.max_per_file,
            context_before: self.before_context,
            context_after: self.after_context,
            binary,
            encoding,
            ..Default::default()
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    let file_config =
        SearchConfig::load_from(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Search(args) => {
            let args = *args;
            let (stats_only, json) = (args.stats, args.json);
            let config = resolve(file_config, args.into_config());
            init_logging(&config.log_level);

            let report = search_structured(&config)?;
            print_diagnostics(&report.diagnostics);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_search_results(&report, config.line_number, stats_only);
            }
        }
        Commands::Files { walk, long, json } => {
            let config = resolve_walk(file_config, walk.into_config());
            init_logging(&config.log_level);

            if long {
                let listing = list_files_with_info(&config.walk)?;
                print_diagnostics(&listing.diagnostics);
                if json {
                    println!("{}", serde_json::to_string_pretty(&listing.files)?);
                } else {
                    for info in &listing.files {
                        print_file_info(info);
                    }
                }
            } else {
                let listing = list_files(&config.walk)?;
                print_diagnostics(&listing.diagnostics);
                print_paths(&listing.files, json)?;
            }
        }
        Commands::Find {
            name,
            walk,
            excludes,
            json,
        } => {
            let config = resolve_walk(file_config, walk.into_config());
            init_logging(&config.log_level);

            let listing = find_files(&name, &excludes, &config.walk)?;
            print_diagnostics(&listing.diagnostics);
            print_paths(&listing.files, json)?;
        }
    }
    Ok(())
}

/// Overlays command line values on the file configuration. Without any
/// path the current directory is searched.
fn resolve(file_config: SearchConfig, cli_config: SearchConfig) -> SearchConfig {
    let mut config = file_config.merge_with_cli(cli_config);
    if config.walk.paths.is_empty() {
        config.walk.paths.push(PathBuf::from("."));
    }
    config
}

fn resolve_walk(file_config: SearchConfig, walk: WalkConfig) -> SearchConfig {
    resolve(
        file_config,
        SearchConfig {
            walk,
            ..Default::default()
        },
    )
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        eprintln!("{} {}", "warning:".yellow(), diagnostic);
    }
}

fn print_paths(paths: &[String], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(paths)?);
    } else {
        for path in paths {
            println!("{}", path);
        }
    }
    Ok(())
}

fn print_file_info(info: &FileInfo) {
    let modified = info
        .modified
        .map(|t| humantime::format_rfc3339_seconds(t).to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:>12} {:<9} {} {}",
        info.size,
        format!("{:?}", info.kind).to_lowercase(),
        modified.dimmed(),
        info.path
    );
}

/// Renders the line with every submatch highlighted
fn highlight(m: &SearchMatch) -> String {
    let mut out = String::with_capacity(m.line_text.len());
    let mut last = 0;
    for sub in &m.submatches {
        out.push_str(&m.line_text[last..sub.start]);
        out.push_str(&sub.text.red().bold().to_string());
        last = sub.end;
    }
    out.push_str(&m.line_text[last..]);
    out
}

fn print_search_results(report: &SearchReport, line_number: bool, stats_only: bool) {
    if !stats_only {
        for m in &report.matches {
            let prefix = if line_number {
                format!("{}:{}:", m.path.blue(), m.line_number.to_string().green())
            } else {
                format!("{}:", m.path.blue())
            };

            for context in &m.context_before {
                println!("{}-{}-{}", m.path.blue(), context.line_number, context.text);
            }
            println!("{}{}", prefix, highlight(m));
            for context in &m.context_after {
                println!("{}-{}-{}", m.path.blue(), context.line_number, context.text);
            }
        }
        println!();
    }

    println!(
        "Found {} matches in {} files",
        report.total_matches(),
        report.files_with_matches
    );
    if report.limit_reached {
        println!("{}", "Match limit reached".yellow());
    }
}
