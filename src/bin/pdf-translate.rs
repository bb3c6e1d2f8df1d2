//! CLI binary for edgequake-pdf-translate.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf_translate::config::default_concurrency;
use edgequake_pdf_translate::event::{handle_event, EventSettings, LocalObjectStore};
use edgequake_pdf_translate::{
    inspect, translate, translate_to_file, ChunkSeparator, PipelineConfig,
    PipelineReport, PipelineState, ProgressCallback, RetryPolicy, TranslationProgressCallback,
    TriggerEvent,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Renders a chunk progress bar plus one log line per finished chunk.
/// Chunks finish out of order, so start times are keyed by chunk name.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<String, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Splitting PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, chunk: &str) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(chunk))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl TranslationProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_chunks: usize, total_pages: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} chunks  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_chunks as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Translating");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!(
                "{total_pages} pages in {total_chunks} chunks…"
            ))
        ));
    }

    fn on_state_change(&self, state: PipelineState) {
        if state == PipelineState::Reassembling {
            self.bar.set_message("reassembling");
        }
    }

    fn on_chunk_start(&self, chunk: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(chunk.to_string(), Instant::now());
        }
        self.bar.set_message(chunk.to_string());
    }

    fn on_chunk_retry(&self, chunk: &str, attempt: u32, delay: Duration, error: &str) {
        self.bar.println(format!(
            "  {} {:<14} attempt {} failed, retrying in {:.1}s  {}",
            yellow("↻"),
            chunk,
            attempt,
            delay.as_secs_f64(),
            dim(&truncate(error, 60)),
        ));
    }

    fn on_chunk_complete(&self, chunk: &str, text_len: usize) {
        let secs = self.elapsed_secs(chunk);
        self.bar.println(format!(
            "  {} {:<14} {:<12}  {}",
            green("✓"),
            chunk,
            dim(&format!("{text_len:>6} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_chunk_error(&self, chunk: &str, error: &str) {
        let secs = self.elapsed_secs(chunk);
        self.bar.println(format!(
            "  {} {:<14} {}  {}",
            red("✗"),
            chunk,
            red(&truncate(error, 80)),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, report: &PipelineReport) {
        self.bar.finish_and_clear();
        if report.failed == 0 {
            eprintln!(
                "{} {} chunks translated successfully",
                green("✔"),
                bold(&report.succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} chunks translated  ({} failed)",
                if report.succeeded == 0 {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&report.succeeded.to_string()),
                report.total_chunks,
                red(&report.failed.to_string()),
            );
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let head: String = s.chars().take(max_chars - 1).collect();
        format!("{head}\u{2026}")
    } else {
        s.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Translate to Arabic (default), text on stdout
  pdf-translate book.pdf

  # Translate to French, write to file, 5 pages per chunk
  pdf-translate --language French --pages-per-chunk 5 book.pdf -o book.txt

  # Translate from URL with a specific provider
  pdf-translate --provider openai --model gpt-4.1-mini https://example.com/doc.pdf

  # Page count and chunk plan (no API key needed)
  pdf-translate --inspect-only book.pdf

  # Process an object-store notification against a local store
  DEST_BUCKET_NAME=translated pdf-translate --event event.json --store-root ./objects

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (default backend)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  DEST_BUCKET_NAME        Destination bucket for --event mode
  TARGET_LANGUAGE         Target language override for --event mode
  PDF_TRANSLATE_*         Fallback for every flag (see --help)
"#;

/// Translate large PDF documents chunk-by-chunk with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-translate",
    version,
    about = "Translate large PDF documents chunk-by-chunk with an LLM",
    long_about = "Split a PDF into fixed-size page chunks, translate the chunks concurrently \
with a vision-capable LLM, and reassemble the translations in page order with page markers \
renumbered to their position in the whole document.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    #[arg(required_unless_present = "event")]
    input: Option<String>,

    /// Write the translation to this file instead of stdout.
    #[arg(short, long, env = "PDF_TRANSLATE_OUTPUT")]
    output: Option<PathBuf>,

    /// Target language.
    #[arg(short, long, env = "PDF_TRANSLATE_LANGUAGE", default_value = "Arabic")]
    language: String,

    /// Pages per chunk.
    #[arg(long, env = "PDF_TRANSLATE_PAGES_PER_CHUNK", default_value_t = 10,
          value_parser = clap::value_parser!(u64).range(1..))]
    pages_per_chunk: u64,

    /// Maximum chunks translated at once. Default: number of CPUs.
    #[arg(short, long, env = "PDF_TRANSLATE_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Attempts per chunk, including the first.
    #[arg(long, env = "PDF_TRANSLATE_MAX_ATTEMPTS", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: u32,

    /// Fixed wait between attempts, in milliseconds.
    #[arg(long, env = "PDF_TRANSLATE_RETRY_DELAY_MS", default_value_t = 5000)]
    retry_delay_ms: u64,

    /// Upper bound of the random extra wait, in milliseconds.
    #[arg(long, env = "PDF_TRANSLATE_RETRY_JITTER_MS", default_value_t = 3000)]
    retry_jitter_ms: u64,

    /// Append failed chunks to this file. Pass an empty string to disable.
    #[arg(long, env = "PDF_TRANSLATE_FAILURE_LOG", default_value = "errors.log")]
    failure_log: String,

    /// Page-marker words to renumber (comma separated).
    #[arg(long, env = "PDF_TRANSLATE_LABELS", value_delimiter = ',')]
    labels: Vec<String>,

    /// Chunk separator: none, hr, comment, or custom string.
    #[arg(long, env = "PDF_TRANSLATE_SEPARATOR", default_value = "none")]
    separator: String,

    /// Skip the output cleanup (fence stripping, whitespace normalisation).
    #[arg(long, env = "PDF_TRANSLATE_RAW")]
    raw: bool,

    /// LLM model ID (e.g. gemini-2.5-flash, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, mistral, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "PDF_TRANSLATE_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens per chunk.
    #[arg(long, env = "PDF_TRANSLATE_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF_TRANSLATE_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Per-chunk LLM call timeout in seconds.
    #[arg(long, env = "PDF_TRANSLATE_API_TIMEOUT", default_value_t = 300)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF_TRANSLATE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Output the structured result (text + report) as JSON.
    #[arg(long, env = "PDF_TRANSLATE_JSON")]
    json: bool,

    /// Print page count and chunk plan only, no translation.
    #[arg(long)]
    inspect_only: bool,

    /// Process an object-store notification (JSON file) instead of INPUT.
    #[arg(long, conflicts_with_all = ["input", "inspect_only", "output"])]
    event: Option<PathBuf>,

    /// Root directory of the local object store used with --event.
    #[arg(long, env = "PDF_TRANSLATE_STORE_ROOT", requires = "event")]
    store_root: Option<PathBuf>,

    /// Disable progress bar.
    #[arg(long, env = "PDF_TRANSLATE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF_TRANSLATE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF_TRANSLATE_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs unless -v is given.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && cli.event.is_none();
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

    // ── Event mode ───────────────────────────────────────────────────────
    if let Some(ref event_path) = cli.event {
        let raw = tokio::fs::read_to_string(event_path)
            .await
            .with_context(|| format!("Failed to read event from {:?}", event_path))?;
        let event = TriggerEvent::from_json(&raw).context("Failed to parse event")?;

        let mut settings = EventSettings::from_env().context("Invalid event settings")?;
        if let Some(ref root) = cli.store_root {
            settings.store_root = root.clone();
        }
        let store = LocalObjectStore::new(&settings.store_root);
        let config = build_config(&cli, None).await?;

        let response = handle_event(&event, &settings, &store, &config).await;
        println!(
            "{}",
            serde_json::to_string_pretty(&response).context("Failed to serialise response")?
        );
        if !response.is_success() {
            std::process::exit(1);
        }
        return Ok(());
    }

    let input = cli.input.clone().context("INPUT is required")?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect(&input, cli.pages_per_chunk as usize, cli.download_timeout)
            .await
            .context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize document info")?
            );
        } else {
            println!("File:         {}", input);
            println!("Pages:        {}", info.page_count);
            println!("Chunks:       {}", info.chunks.len());
            for range in &info.chunks {
                println!("  {:<16} {} page(s)", range.name(), range.len());
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn TranslationProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Run translation ──────────────────────────────────────────────────
    if let Some(ref output_path) = cli.output {
        let report = translate_to_file(&input, output_path, &config)
            .await
            .context("Translation failed")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialise report")?
            );
        } else if !cli.quiet {
            eprintln!(
                "{}  {}/{} chunks  {} pages  {}ms  →  {}",
                if report.failed == 0 {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                report.succeeded,
                report.total_chunks,
                report.total_pages,
                report.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
            print_failures(&report);
        }
    } else {
        let output = translate(&input, &config)
            .await
            .context("Translation failed")?;

        if cli.json {
            let json =
                serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
            println!("{json}");
        } else {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(output.text.as_bytes())
                .context("Failed to write to stdout")?;
            if !output.text.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }

            if !cli.quiet {
                if !show_progress {
                    eprintln!(
                        "Translated {}/{} chunks ({} pages) in {}ms",
                        output.report.succeeded,
                        output.report.total_chunks,
                        output.report.total_pages,
                        output.report.total_duration_ms
                    );
                }
                print_failures(&output.report);
            }
        }
    }

    Ok(())
}

fn print_failures(report: &PipelineReport) {
    for failed in &report.failures {
        eprintln!(
            "   {} {}  {}",
            red("missing"),
            failed.chunk,
            dim(&truncate(&failed.reason, 80))
        );
    }
    if report.numbering_anomalies > 0 {
        eprintln!(
            "   {} {} page marker(s) were out of sequence",
            yellow("!"),
            report.numbering_anomalies
        );
    }
    if report.total_input_tokens + report.total_output_tokens > 0 {
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&report.total_input_tokens.to_string()),
            dim(&report.total_output_tokens.to_string()),
        );
    }
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .pages_per_chunk(cli.pages_per_chunk as usize)
        .concurrency(cli.concurrency.unwrap_or_else(default_concurrency))
        .retry(RetryPolicy {
            max_attempts: cli.max_attempts,
            base_delay: Duration::from_millis(cli.retry_delay_ms),
            jitter: Duration::from_millis(cli.retry_jitter_ms),
        })
        .target_language(cli.language.clone())
        .chunk_separator(parse_separator(&cli.separator))
        .clean_output(!cli.raw)
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);

    builder = if cli.failure_log.trim().is_empty() {
        builder.no_failure_log()
    } else {
        builder.failure_log(cli.failure_log.trim())
    };
    if !cli.labels.is_empty() {
        builder = builder.labels(cli.labels.iter().map(|l| l.trim().to_string()));
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref path) = cli.system_prompt {
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

/// Parse `--separator` string into `ChunkSeparator`.
fn parse_separator(s: &str) -> ChunkSeparator {
    match s.to_lowercase().as_str() {
        "none" => ChunkSeparator::None,
        "hr" | "---" => ChunkSeparator::HorizontalRule,
        "comment" => ChunkSeparator::Comment,
        _ => ChunkSeparator::Custom(s.to_string()),
    }
}
