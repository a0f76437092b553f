//! CLI binary for drumgrid-extract.
//!
//! `drumgrid parse` fills the page cache from the PDF; `drumgrid merge`
//! folds the cache into the catalog. Both are thin shims that map flags to
//! `ExtractionConfig` and print results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use drumgrid_extract::{
    commit_merge, extract_pages, prepare_merge, ExtractionConfig, ExtractionProgressCallback,
    MergeReport, PageRange, PageState, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Prints one line per page event. With a bar, lines go above it; without
/// one (`--no-progress`), straight to stderr.
struct CliProgressCallback {
    bar: Option<ProgressBar>,
    page_started: Mutex<Instant>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new(with_bar: bool) -> Arc<Self> {
        let bar = with_bar.then(|| {
            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.cyan} {prefix:.bold}  \
                     [{bar:42.green/238}] {pos:>3}/{len} pages  \
                     ⏱ {elapsed_precise}  {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  ")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
            );
            bar.set_prefix("Parsing");
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });

        Arc::new(Self {
            bar,
            page_started: Mutex::new(Instant::now()),
            errors: AtomicUsize::new(0),
        })
    }

    fn line(&self, text: String) {
        match self.bar {
            Some(ref bar) => bar.println(text),
            None => eprintln!("{text}"),
        }
    }

    fn status(&self, page: usize, what: &str) {
        if let Some(ref bar) = self.bar {
            bar.set_message(format!("page {page}: {what}"));
        }
    }

    fn advance(&self) {
        if let Some(ref bar) = self.bar {
            bar.inc(1);
        }
        if let Ok(mut started) = self.page_started.lock() {
            *started = Instant::now();
        }
    }

    fn elapsed(&self) -> String {
        let secs = self
            .page_started
            .lock()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        dim(&format!("{secs:.1}s"))
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_run_start(&self, first_page: usize, last_page: usize) {
        if let Some(ref bar) = self.bar {
            bar.set_length((last_page + 1 - first_page) as u64);
        }
        if let Ok(mut started) = self.page_started.lock() {
            *started = Instant::now();
        }
        self.line(bold(&format!("Parsing pages {first_page}-{last_page}…")));
    }

    fn on_page_cached(&self, page: usize, pattern_count: usize, errored: bool) {
        let text = if errored {
            format!("  {} Page {:>3}: {}", yellow("!"), page, dim("errored earlier, skipping"))
        } else {
            format!(
                "  {} Page {:>3}: {}",
                dim("·"),
                page,
                dim(&format!("already done ({pattern_count} patterns), skipping"))
            )
        };
        self.line(text);
        self.advance();
    }

    fn on_page_rendered(&self, page: usize, image_bytes: usize) {
        self.status(page, &format!("rendered ({} KB)", image_bytes / 1024));
        if self.bar.is_none() {
            self.line(format!("  Page {page}: rendered ({} KB)", image_bytes / 1024));
        }
    }

    fn on_page_sent(&self, page: usize) {
        self.status(page, "sent for recognition");
        if self.bar.is_none() {
            self.line(format!("  Page {page}: sent for recognition"));
        }
    }

    fn on_page_complete(&self, page: usize, names: &[&str], skipped: usize) {
        self.line(format!(
            "  {} Page {:>3}: {} patterns (skipped {})  {:?}  {}",
            green("✓"),
            page,
            names.len(),
            skipped,
            names,
            self.elapsed()
        ));
        self.advance();
    }

    fn on_page_error(&self, page: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 100 {
            let cut: String = error.chars().take(99).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };
        self.line(format!("  {} Page {:>3}: {}  {}", red("✗"), page, red(&msg), self.elapsed()));
        self.advance();
    }

    fn on_run_complete(&self, total_patterns: usize, first_page: usize, last_page: usize) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
        let errors = self.errors.load(Ordering::SeqCst);
        let mark = if errors == 0 { green("✔") } else { yellow("⚠") };
        eprintln!(
            "{} Done! {} patterns from pages {}-{}",
            mark,
            bold(&total_patterns.to_string()),
            first_page,
            last_page
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Parse the default range (pages 9-97) into parsed_patterns/
  drumgrid parse --pdf ~/Documents/200-drum-machine-patterns.pdf

  # Parse a single page
  drumgrid parse --pdf patterns.pdf --pages 9

  # Re-run pages that failed earlier
  drumgrid parse --pdf patterns.pdf --pages 9-20 --retry-errors

  # Preview what a merge would change
  drumgrid merge --dry-run

  # Merge into the catalog
  drumgrid merge --catalog src/app/data/patterns.json

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default provider)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium if it is not on the library path

A page that is already cached is never sent again. Delete its
parsed_patterns/page_NNN.json to re-parse it.
"#;

/// Extract drum machine patterns from a scanned PDF into a JSON catalog.
#[derive(Parser, Debug)]
#[command(
    name = "drumgrid",
    version,
    about = "Extract drum machine patterns from a scanned PDF using vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding one cache file per page.
    #[arg(long, global = true, env = "DRUMGRID_CACHE_DIR", default_value = "parsed_patterns")]
    cache_dir: PathBuf,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DRUMGRID_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the final summary.
    #[arg(short, long, global = true, env = "DRUMGRID_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render, recognise and cache a page range.
    Parse(ParseArgs),
    /// Merge every cached page into the catalog.
    Merge(MergeArgs),
}

#[derive(Args, Debug)]
struct ParseArgs {
    /// Scanned pattern book.
    #[arg(long, env = "DRUMGRID_PDF")]
    pdf: PathBuf,

    /// Page selection: 5 or 9-97.
    #[arg(long, env = "DRUMGRID_PAGES", default_value = "9-97")]
    pages: String,

    /// Pause between pages that call the recognizer, in milliseconds.
    #[arg(long, env = "DRUMGRID_DELAY_MS", default_value_t = 1000)]
    delay_ms: u64,

    /// Also pause after pages served from the cache.
    #[arg(long)]
    delay_cached: bool,

    /// Remove error markers in the range so those pages are fetched again.
    #[arg(long)]
    retry_errors: bool,

    /// Vision model ID (default gemini-2.5-pro).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI (72–600).
    #[arg(long, env = "DRUMGRID_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Pattern names containing this term are dropped. Repeatable.
    #[arg(long = "exclude", default_values_t = vec!["break".to_string()])]
    exclude: Vec<String>,

    /// Max LLM output tokens per page.
    #[arg(long, env = "DRUMGRID_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Retries per page on a failed recognition call.
    #[arg(long, env = "DRUMGRID_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Path to a text file containing a custom recognition prompt.
    #[arg(long, env = "DRUMGRID_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Disable the progress bar; print plain per-page lines instead.
    #[arg(long, env = "DRUMGRID_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct MergeArgs {
    /// Catalog file to merge into.
    #[arg(long, env = "DRUMGRID_CATALOG", default_value = "src/app/data/patterns.json")]
    catalog: PathBuf,

    /// Report what would change without writing.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The per-page lines carry the useful feedback; library INFO logs only
    // show with --verbose or RUST_LOG.
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Parse(ref args) => run_parse(&cli, args).await,
        Command::Merge(ref args) => run_merge(&cli, args).await,
    }
}

async fn run_parse(cli: &Cli, args: &ParseArgs) -> Result<()> {
    let progress: Option<ProgressCallback> = if cli.quiet {
        None
    } else {
        let cb = CliProgressCallback::new(!args.no_progress);
        Some(cb as Arc<dyn ExtractionProgressCallback>)
    };

    let config = build_parse_config(cli, args, progress).await?;
    let summary = extract_pages(&config)
        .await
        .context("Extraction failed")?;

    if cli.quiet {
        println!(
            "Done! {} patterns from pages {}",
            summary.total_patterns, config.pages
        );
    } else {
        eprintln!(
            "   {} cached  /  {} fetched  /  {} errored  /  {}ms",
            dim(&summary.cached_pages.to_string()),
            dim(&summary.fetched_pages.to_string()),
            if summary.errored_pages == 0 {
                dim("0")
            } else {
                red(&summary.errored_pages.to_string())
            },
            summary.duration_ms,
        );
        let errored: Vec<usize> = summary
            .pages
            .iter()
            .filter(|p| p.state == PageState::Errored)
            .map(|p| p.page)
            .collect();
        if !errored.is_empty() {
            eprintln!(
                "   errored pages {:?}; re-run with --retry-errors to fetch them again",
                errored
            );
        }
    }

    Ok(())
}

async fn run_merge(cli: &Cli, args: &MergeArgs) -> Result<()> {
    let config = ExtractionConfig::builder()
        .cache_dir(&cli.cache_dir)
        .catalog_path(&args.catalog)
        .build()
        .context("Invalid configuration")?;

    let report = prepare_merge(&config, args.dry_run)
        .await
        .context("Merge failed")?;
    print_merge_summary(&report);
    if report.dry_run {
        return Ok(());
    }

    commit_merge(&report, &config)
        .await
        .context("Failed to write catalog")?;
    println!(
        "Wrote {} patterns to {}",
        report.catalog.len(),
        config.catalog_path.display()
    );
    Ok(())
}

/// Everything known before the catalog is written.
fn print_merge_summary(report: &MergeReport) {
    println!(
        "Found {} unique patterns from {} page files",
        report.unique_patterns, report.page_files
    );

    for c in &report.collisions {
        eprintln!(
            "{} '{}' (page {}) and '{}' (page {}) both map to id '{}'; keeping page {}",
            yellow("⚠"),
            c.earlier_name,
            c.earlier_page,
            c.later_name,
            c.later_page,
            c.id,
            c.later_page
        );
    }

    if report.dry_run {
        println!("\n--- Dry Run ---");
        println!("Would add {} new patterns", report.added());
        println!("Would update {} existing patterns", report.updated());
        if !report.new_ids.is_empty() {
            println!("\nNew: {:?}", report.new_ids);
        }
        if !report.updated_ids.is_empty() {
            println!("\nUpdated: {:?}", report.updated_ids);
        }
        return;
    }

    println!("  Added: {}", report.added());
    println!("  Updated: {}", report.updated());
    println!("  Kept: {}", report.kept);
}

/// Map `parse` args to `ExtractionConfig`.
async fn build_parse_config(
    cli: &Cli,
    args: &ParseArgs,
    progress: Option<ProgressCallback>,
) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .source_pdf(&args.pdf)
        .pages(parse_pages(&args.pages)?)
        .cache_dir(&cli.cache_dir)
        .page_delay_ms(args.delay_ms)
        .delay_cached_pages(args.delay_cached)
        .retry_errored(args.retry_errors)
        .render_dpi(args.dpi)
        .exclusion_terms(args.exclude.iter().cloned())
        .max_tokens(args.max_tokens)
        .max_retries(args.max_retries);

    if let Some(ref model) = args.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref path) = args.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--pages` into a [`PageRange`]: `"5"` or `"9-97"`.
fn parse_pages(s: &str) -> Result<PageRange> {
    let s = s.trim();

    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;
        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!("Invalid page range '{}-{}': start must be <= end", start, end);
        }
        return Ok(PageRange::new(start, end));
    }

    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }
    Ok(PageRange::single(page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pages_accepts_single_and_range() {
        assert_eq!(parse_pages("9").unwrap(), PageRange::new(9, 9));
        assert_eq!(parse_pages(" 9-97 ").unwrap(), PageRange::new(9, 97));
    }

    #[test]
    fn parse_pages_rejects_bad_input() {
        assert!(parse_pages("0").is_err());
        assert!(parse_pages("20-10").is_err());
        assert!(parse_pages("all").is_err());
        assert!(parse_pages("1,3").is_err());
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["drumgrid", "parse", "--pdf", "book.pdf", "--pages", "12"])
            .unwrap();
        match cli.command {
            Command::Parse(ref args) => {
                assert_eq!(args.pdf, PathBuf::from("book.pdf"));
                assert_eq!(args.exclude, vec!["break".to_string()]);
            }
            Command::Merge(_) => panic!("expected parse"),
        }

        let cli = Cli::try_parse_from(["drumgrid", "merge", "--dry-run"]).unwrap();
        assert!(matches!(cli.command, Command::Merge(MergeArgs { dry_run: true, .. })));
        assert_eq!(cli.cache_dir, PathBuf::from("parsed_patterns"));
    }
}
