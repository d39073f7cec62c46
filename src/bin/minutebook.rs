//! CLI binary for edgequake-minutebook.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ClassifierConfig` and prints the section list.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_minutebook::{
    classify, inspect, write_output, ClassificationOutput, ClassificationProgressCallback,
    ClassifierConfig, GapPolicy, OverlapPolicy, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
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
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over batches plus a log line per
/// finished batch. Batches complete out of order under concurrency.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Rendering pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} batches  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, batch: usize) -> f64 {
        self.start_times
            .lock()
            .unwrap()
            .remove(&batch)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ClassificationProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize, total_batches: usize) {
        self.activate_bar(total_batches);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "Classifying {total_pages} pages in {total_batches} batches…"
            ))
        ));
    }

    fn on_batch_start(&self, batch: usize, _total: usize) {
        self.start_times
            .lock()
            .unwrap()
            .insert(batch, Instant::now());
        self.bar.set_message(format!("batch {batch}"));
    }

    fn on_batch_complete(&self, batch: usize, total: usize, pages: usize) {
        let secs = self.elapsed_secs(batch);
        self.bar.println(format!(
            "  {} Batch {:>3}/{:<3}  {:<9}  {}",
            green("✓"),
            batch,
            total,
            dim(&format!("{pages:>2} pages")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_error(&self, batch: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs(batch);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Batch {:>3}/{:<3}  {}  {}",
            red("✗"),
            batch,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_structure_attempt(&self, chunks: usize, attempt: u32) {
        self.bar.set_prefix("Structuring");
        self.bar.set_message(if chunks == 1 {
            format!("attempt {attempt}")
        } else {
            format!("{chunks} chunks, attempt {attempt}")
        });
    }

    fn on_run_complete(&self, sections: usize, failed_pages: usize) {
        self.bar.finish_and_clear();
        let failed_batches = self.errors.load(Ordering::SeqCst);
        if failed_pages == 0 {
            eprintln!(
                "{} {} sections identified",
                green("✔"),
                bold(&sections.to_string())
            );
        } else {
            eprintln!(
                "{} {} sections identified  ({} pages in {} batches failed)",
                cyan("⚠"),
                bold(&sections.to_string()),
                red(&failed_pages.to_string()),
                failed_batches,
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Classify a minute book (JSON on stdout, table on stderr)
  minutebook minute-book.pdf

  # Write the result to a file
  minutebook minute-book.pdf -o sections.json

  # Smaller batches, fewer concurrent calls (rate-limited accounts)
  minutebook --batch-size 4 -c 3 minute-book.pdf

  # Absorb uncovered pages into the preceding section
  minutebook --gap-policy extend-preceding minute-book.pdf

  # Use a specific model
  minutebook --provider anthropic --model claude-sonnet-4-20250514 book.pdf

  # Inspect PDF metadata (no API key needed)
  minutebook --inspect-only minute-book.pdf

OUTPUT:
  {
    "sections": [ { "name": "By Laws", "startPage": 1, "endPage": 12 }, … ],
    "failedPages": [],
    "failedBatches": [],
    "warnings": [],
    "stats": { … }
  }

  Sections always cover every page exactly once, in page order. Pages no
  section claims are reported as "Unclassified".

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium, skips auto-download
  PDFIUM_AUTO_CACHE_DIR   Override the default pdfium cache directory

  PDFium (~30 MB) is downloaded automatically on first run and cached.
"#;

/// Classify the sections of scanned minute books using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "minutebook",
    version,
    about = "Classify the sections of scanned corporate minute books using Vision LLMs",
    long_about = "Read every page of a scanned minute book through a vision model, identify \
where each section (articles, by-laws, resolutions, registers, …) starts and ends, and print \
a corrected, gap-free section list as JSON.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write the JSON result to this file instead of stdout.
    #[arg(short, long, env = "MINUTEBOOK_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Pages per grid image.
    #[arg(long, env = "MINUTEBOOK_BATCH_SIZE", default_value_t = 6,
          value_parser = clap::value_parser!(u32).range(1..=24))]
    batch_size: u32,

    /// Columns in each grid image.
    #[arg(long, env = "MINUTEBOOK_GRID_COLUMNS", default_value_t = 2,
          value_parser = clap::value_parser!(u32).range(1..=6))]
    grid_columns: u32,

    /// Number of concurrent vision calls.
    #[arg(short, long, env = "MINUTEBOOK_CONCURRENCY", default_value_t = 10)]
    concurrency: usize,

    /// Maximum vision calls per batch, first attempt included.
    #[arg(long, env = "MINUTEBOOK_MAX_ATTEMPTS", default_value_t = 5)]
    max_attempts: u32,

    /// Maximum structure calls per chunk strategy.
    #[arg(long, env = "MINUTEBOOK_STRUCTURE_ATTEMPTS", default_value_t = 3)]
    structure_attempts: u32,

    /// How to fill pages no section covers.
    #[arg(long, env = "MINUTEBOOK_GAP_POLICY", value_enum, default_value = "unclassified")]
    gap_policy: GapArg,

    /// How to split pages claimed by two sections.
    #[arg(long, env = "MINUTEBOOK_OVERLAP_POLICY", value_enum, default_value = "midpoint")]
    overlap_policy: OverlapArg,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "MINUTEBOOK_PASSWORD")]
    password: Option<String>,

    /// Include the extracted text of every page in the JSON output.
    #[arg(long, env = "MINUTEBOOK_INCLUDE_TEXT")]
    include_text: bool,

    /// Print PDF metadata only, no classification.
    #[arg(long)]
    inspect_only: bool,

    /// Disable progress bar.
    #[arg(long, env = "MINUTEBOOK_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MINUTEBOOK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the JSON result.
    #[arg(short, long, env = "MINUTEBOOK_QUIET")]
    quiet: bool,

    /// Per-call model timeout in seconds.
    #[arg(long, env = "MINUTEBOOK_API_TIMEOUT", default_value_t = 50)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "MINUTEBOOK_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum GapArg {
    Unclassified,
    ExtendPreceding,
}

impl From<GapArg> for GapPolicy {
    fn from(v: GapArg) -> Self {
        match v {
            GapArg::Unclassified => GapPolicy::Unclassified,
            GapArg::ExtendPreceding => GapPolicy::ExtendPreceding,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OverlapArg {
    Midpoint,
    EarlierWins,
    LaterWins,
}

impl From<OverlapArg> for OverlapPolicy {
    fn from(v: OverlapArg) -> Self {
        match v {
            OverlapArg::Midpoint => OverlapPolicy::Midpoint,
            OverlapArg::EarlierWins => OverlapPolicy::EarlierWins,
            OverlapArg::LaterWins => OverlapPolicy::LaterWins,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Ensure PDFium engine is available ───────────────────────────────────
    #[cfg(feature = "bundled")]
    {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_bundled())
            .context("Failed to extract bundled PDFium engine")?;
    }

    #[cfg(not(feature = "bundled"))]
    if !pdfium_auto::is_pdfium_cached() {
        if !cli.quiet {
            let dl_bar = ProgressBar::new(0);
            dl_bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.cyan} {prefix:.bold}  \
                     [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  ")
                .tick_strings(TICKS),
            );
            dl_bar.set_prefix("PDF engine");
            dl_bar.enable_steady_tick(Duration::from_millis(80));

            let bar = dl_bar.clone();
            tokio::task::block_in_place(|| {
                pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
                    if let Some(t) = total {
                        if bar.length().unwrap_or(0) != t {
                            bar.set_length(t);
                        }
                    }
                    bar.set_position(downloaded);
                }))
            })
            .context("Failed to download PDFium engine")?;

            dl_bar.finish_with_message("ready ✓");
        } else {
            tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
                .context("Failed to download PDFium engine")?;
        }
    }

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let config = build_config(&cli, None)?;
        let meta = inspect(&cli.input, &config)
            .await
            .context("Failed to inspect PDF")?;
        println!(
            "{}",
            serde_json::to_string_pretty(&meta).context("Failed to serialise metadata")?
        );
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ClassificationProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run classification ───────────────────────────────────────────────
    let output = classify(&cli.input, &config)
        .await
        .context("Classification failed")?;

    if !cli.quiet {
        print_summary(&output);
    }

    if let Some(ref output_path) = cli.output {
        write_output(&output, output_path)
            .await
            .context("Failed to write output")?;
        if !cli.quiet {
            eprintln!("{}  →  {}", green("✔"), bold(&output_path.display().to_string()));
        }
    } else {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    }

    Ok(())
}

/// Map CLI args to `ClassifierConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ClassifierConfig> {
    let mut builder = ClassifierConfig::builder()
        .batch_size(cli.batch_size as usize)
        .grid_columns(cli.grid_columns)
        .concurrency(cli.concurrency)
        .max_attempts(cli.max_attempts)
        .structure_max_attempts(cli.structure_attempts)
        .gap_policy(cli.gap_policy.into())
        .overlap_policy(cli.overlap_policy.into())
        .include_page_text(cli.include_text)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Section table, warnings and totals on stderr.
fn print_summary(output: &ClassificationOutput) {
    let width = output
        .sections
        .iter()
        .map(|s| s.section_type.display_name().len())
        .max()
        .unwrap_or(0);

    eprintln!();
    for s in &output.sections {
        let range = if s.start_page == s.end_page {
            format!("{}", s.start_page)
        } else {
            format!("{}-{}", s.start_page, s.end_page)
        };
        eprintln!(
            "  {:<width$}  {:>9}  {}",
            s.section_type.display_name(),
            range,
            dim(&format!("{} pp", s.page_count())),
        );
    }
    eprintln!();

    for w in &output.warnings {
        eprintln!("  {} {}", cyan("⚠"), dim(w));
    }
    if !output.failed_pages.is_empty() {
        eprintln!(
            "  {} text unavailable for pages {:?}",
            red("✗"),
            output.failed_pages
        );
    }

    let stats = &output.stats;
    eprintln!(
        "   {} model requests  /  {} batches ({} failed)  —  {}ms total",
        dim(&stats.model_requests.to_string()),
        stats.total_batches,
        stats.failed_batches,
        stats.total_duration_ms,
    );
}
