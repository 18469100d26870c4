use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mosaic::api;
use mosaic::core::{DateFormat, ParseResult, SortOrder};
use mosaic::format::format_event_line;
use mosaic::layout::{
    DEFAULT_HEADER_HEIGHT, DEFAULT_MIN_YEAR_SPACING, DEFAULT_PIXELS_PER_YEAR, LayoutConfig,
    TimelineLayout,
};
use mosaic::parser::MarkdownFileSource;
use mosaic::storage::EventSource;
use tracing::{Level, debug, warn};

#[derive(Debug, Parser)]
#[command(
    name = "mosaic",
    about = "Tag-column timelines from Markdown event documents",
    version
)]
struct Cli {
    /// Enable verbose logging for debugging.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Parse a document and list its events and section errors.
    Parse(ParseArgs),

    /// List every tag, most used first.
    Tags(TagsArgs),

    /// Build one date-sorted column per selected tag.
    Columns(ColumnsArgs),

    /// Compute timeline year positions and century markers for the selected tags.
    Layout(LayoutArgs),
}

#[derive(Debug, Args)]
struct ParseArgs {
    /// Markdown document to read.
    input: PathBuf,
    /// Emit JSON instead of a human-readable list.
    #[arg(long)]
    json: bool,
    /// Date rendering for human-readable output (iso or ja).
    #[arg(long, default_value_t = DateFormat::Iso)]
    date_format: DateFormat,
}

#[derive(Debug, Args)]
struct TagsArgs {
    /// Markdown document to read.
    input: PathBuf,
    /// Emit JSON instead of one tag per line.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct ColumnsArgs {
    /// Markdown document to read.
    input: PathBuf,
    /// Tag to build a column for; repeat for more columns (order is kept).
    #[arg(long = "tag")]
    tags: Vec<String>,
    /// Sort order inside each column (asc or desc).
    #[arg(long, default_value_t = SortOrder::Asc)]
    order: SortOrder,
    /// Emit JSON instead of a human-readable listing.
    #[arg(long)]
    json: bool,
    /// Date rendering for human-readable output (iso or ja).
    #[arg(long, default_value_t = DateFormat::Iso)]
    date_format: DateFormat,
}

#[derive(Debug, Args)]
struct LayoutArgs {
    /// Markdown document to read.
    input: PathBuf,
    /// Tag whose events place years on the timeline; repeat for more.
    #[arg(long = "tag")]
    tags: Vec<String>,
    /// Timeline direction (asc or desc).
    #[arg(long, default_value_t = SortOrder::Asc)]
    order: SortOrder,
    #[command(flatten)]
    config: LayoutFlags,
    /// Emit JSON instead of a human-readable listing.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct LayoutFlags {
    /// Vertical pixels per elapsed year.
    #[arg(long, default_value_t = DEFAULT_PIXELS_PER_YEAR)]
    pixels_per_year: f64,
    /// Minimum pixels between consecutive years.
    #[arg(long, default_value_t = DEFAULT_MIN_YEAR_SPACING)]
    min_year_spacing: f64,
    /// Pixels reserved above the first year.
    #[arg(long, default_value_t = DEFAULT_HEADER_HEIGHT)]
    header_height: f64,
}

impl From<LayoutFlags> for LayoutConfig {
    fn from(flags: LayoutFlags) -> Self {
        LayoutConfig {
            pixels_per_year: flags.pixels_per_year,
            min_year_spacing: flags.min_year_spacing,
            header_height: flags.header_height,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;
    match cli.command {
        Commands::Parse(args) => handle_parse(args),
        Commands::Tags(args) => handle_tags(args),
        Commands::Columns(args) => handle_columns(args),
        Commands::Layout(args) => handle_layout(args),
    }
}

fn init_tracing(verbose: bool) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("installing log subscriber")
}

/// Read and parse `path`. Read failures are fatal; section errors are only reported.
fn load(path: &Path) -> Result<ParseResult> {
    debug!("Parsing {:?}", path);
    let result = MarkdownFileSource
        .load(path)
        .with_context(|| format!("loading {:?}", path))?;
    for error in &result.errors {
        warn!(line = error.line, "skipped section: {}", error.message);
    }
    Ok(result)
}

fn handle_parse(args: ParseArgs) -> Result<()> {
    let ParseArgs {
        input,
        json,
        date_format,
    } = args;
    let result = load(&input)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if result.events.is_empty() {
        eprintln!("No events found in {:?}.", input);
    }
    for event in &result.events {
        println!("{}", format_event_line(event, date_format));
    }
    if !result.errors.is_empty() {
        println!();
        println!("{} section(s) failed to parse:", result.errors.len());
        for error in &result.errors {
            let line = error
                .line
                .map(|l| format!("line {l}"))
                .unwrap_or_else(|| "unknown line".to_string());
            println!("  {}: {}", line, error.message);
        }
    }
    Ok(())
}

fn handle_tags(args: TagsArgs) -> Result<()> {
    let TagsArgs { input, json } = args;
    let response = api::tags_for(&load(&input)?);

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        for tag in &response.tags {
            println!("{tag}");
        }
    }
    Ok(())
}

fn handle_columns(args: ColumnsArgs) -> Result<()> {
    let ColumnsArgs {
        input,
        tags,
        order,
        json,
        date_format,
    } = args;
    let result = load(&input)?;
    let response = api::columns_for(&result, &tags, order);

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    for (idx, column) in response.columns.iter().enumerate() {
        if idx > 0 {
            println!();
        }
        println!("== #{} ({}) ==", column.tag, column.events.len());
        for event in &column.events {
            println!("{}", format_event_line(event, date_format));
        }
    }
    Ok(())
}

fn handle_layout(args: LayoutArgs) -> Result<()> {
    let LayoutArgs {
        input,
        tags,
        order,
        config,
        json,
    } = args;
    let result = load(&input)?;
    let response = api::columns_for(&result, &tags, order);
    let layout = TimelineLayout::new(config.into());
    let timeline = layout.layout(&response.columns, order);

    if json {
        println!("{}", serde_json::to_string_pretty(&timeline)?);
        return Ok(());
    }

    if timeline.years.is_empty() {
        eprintln!("No years to lay out for the selected tags.");
        return Ok(());
    }
    for (year, position) in timeline.years.iter().zip(&timeline.positions) {
        println!("{:>8.1}  {}", position, year);
    }
    println!();
    for marker in &timeline.century_markers {
        println!("{:>8.1}  -- {} --", marker.position, marker.year);
    }
    Ok(())
}
