//! CLI binary for bloodtest-analyzer.
//!
//! A thin shim over the library crate: maps flags onto `AnalysisConfig` /
//! `ServerConfig`, then either serves HTTP or runs one analysis locally.

use anyhow::{Context, Result};
use bloodtest_analyzer::{
    inspect_with, serve, AnalysisConfig, AnalysisStore, Analyzer, JsonlStore, MemoryStore,
    PdfiumExtractor, PipelineProgressCallback, ProgressCallback, ServerConfig,
};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Renders a bar with one log line per finished step.
struct CliProgressCallback {
    bar: ProgressBar,
    step_started: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.set_message("Extracting report…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            step_started: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.step_started
            .lock()
            .ok()
            .and_then(|mut started| started.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_pipeline_start(&self, total_steps: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:32.green/238}] {pos}/{len} steps  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        self.bar.set_length(total_steps as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Analyzing");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Running {total_steps} analysis steps…"))
        ));
    }

    fn on_step_start(&self, _index: usize, _total: usize, role: &str) {
        if let Ok(mut started) = self.step_started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(role.to_string());
    }

    fn on_step_complete(&self, index: usize, total: usize, role: &str, output_len: usize) {
        let secs = self.elapsed_secs();
        self.bar.println(format!(
            "  {} {:>2}/{:<2} {:<20} {}  {}",
            green("✓"),
            index + 1,
            total,
            role,
            dim(&format!("{output_len:>5} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_step_error(&self, index: usize, total: usize, role: &str, error: &str) {
        let secs = self.elapsed_secs();
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:>2}/{:<2} {:<20} {}  {}",
            red("✗"),
            index + 1,
            total,
            role,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_pipeline_complete(&self, total_steps: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} steps completed",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} steps completed  ({} failed)",
                if failed == total_steps {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_steps,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve the upload API on port 8000, appending records to a JSONL file
  bloodtest serve --listen 0.0.0.0:8000 --store data/analyses.jsonl

  # Analyze a local report
  bloodtest analyze report.pdf --query "Is my iron low?"

  # Full JSON outcome written to a file
  bloodtest analyze report.pdf --json -o analysis.json

  # Extraction only (no API key needed)
  bloodtest inspect report.pdf

  # Upload from another shell
  curl -F file=@report.pdf -F query="Summarize" http://localhost:8000/analyze

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  SERPER_API_KEY          Enables web search for the nutrition and exercise steps
  PDFIUM_LIB_PATH         Path to libpdfium (else ./ then the system library)
  DATA_DIR                Scratch directory for staged uploads
  RUST_LOG                Log filter, overrides -v / -q
"#;

/// Analyse blood-test report PDFs with a sequence of LLM specialists.
#[derive(Parser, Debug)]
#[command(
    name = "bloodtest",
    version,
    about = "Analyse blood-test report PDFs with a sequence of LLM specialists",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "BLOODTEST_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "BLOODTEST_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve `POST /analyze` and `GET /v1/healthz`.
    Serve {
        /// Socket address to bind.
        #[arg(long, env = "BLOODTEST_LISTEN", default_value = "0.0.0.0:8000")]
        listen: String,

        /// Scratch directory for staged uploads.
        #[arg(long, env = "DATA_DIR", default_value = "data")]
        data_dir: PathBuf,

        /// Append one JSON line per request to this file (in-memory when unset).
        #[arg(long, env = "BLOODTEST_STORE")]
        store: Option<PathBuf>,

        /// Request body cap in MiB.
        #[arg(long, env = "BLOODTEST_MAX_UPLOAD_MB", default_value_t = 20)]
        max_upload_mb: usize,
    },

    /// Run the full analysis on a local file or URL and print it.
    Analyze {
        /// Local PDF path or HTTP/HTTPS URL.
        input: String,

        /// Question for the specialists.
        #[arg(long)]
        query: Option<String>,

        /// Print the full outcome as JSON.
        #[arg(long)]
        json: bool,

        /// Write the result to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Disable the progress bar.
        #[arg(long, env = "BLOODTEST_NO_PROGRESS")]
        no_progress: bool,
    },

    /// Extract the report text only; no LLM calls.
    Inspect {
        /// Local PDF path or HTTP/HTTPS URL.
        input: String,

        /// Print the extracted report as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Character budget for the extracted report.
    #[arg(long, global = true, env = "BLOODTEST_MAX_CHARS", default_value_t = 3000)]
    max_chars: usize,

    /// Pause between steps in milliseconds.
    #[arg(long, global = true, env = "BLOODTEST_STEP_DELAY_MS", default_value_t = 1000)]
    step_delay_ms: u64,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "BLOODTEST_TEMPERATURE", default_value_t = 0.2)]
    temperature: f32,

    /// Max LLM output tokens per step.
    #[arg(long, global = true, env = "BLOODTEST_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// Per-step LLM call timeout in seconds.
    #[arg(long, global = true, env = "BLOODTEST_STEP_TIMEOUT", default_value_t = 120)]
    step_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level logs during `analyze`.
    let show_progress = match &cli.command {
        Command::Analyze {
            json, no_progress, ..
        } => !cli.quiet && !*no_progress && !*json,
        _ => false,
    };
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

    match &cli.command {
        Command::Serve {
            listen,
            data_dir,
            store,
            max_upload_mb,
        } => {
            let config = build_config(&cli.pipeline, None)?;
            let sink: Arc<dyn AnalysisStore> = match store {
                Some(path) => Arc::new(JsonlStore::new(path.clone())),
                None => Arc::new(MemoryStore::new()),
            };
            let analyzer = Analyzer::from_config(config, Some(sink))
                .context("Failed to set up the analyzer")?;

            let server_config = ServerConfig {
                listen_addr: listen.clone(),
                data_dir: data_dir.clone(),
                store_path: store.clone(),
                max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
            };
            serve(server_config, Arc::new(analyzer))
                .await
                .context("Server failed")?;
        }

        Command::Analyze {
            input,
            query,
            json,
            output,
            ..
        } => {
            let progress: Option<ProgressCallback> = if show_progress {
                Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
            } else {
                None
            };
            let config = build_config(&cli.pipeline, progress)?;
            let analyzer =
                Analyzer::from_config(config, None).context("Failed to set up the analyzer")?;

            let outcome = analyzer
                .analyze_input(input, query.as_deref())
                .await
                .context("Analysis failed")?;

            let rendered = if *json {
                serde_json::to_string_pretty(&outcome).context("Failed to serialise outcome")?
            } else {
                render_markdown(&outcome)
            };

            match output {
                Some(path) => {
                    write_atomic(path, &rendered).await?;
                    if !cli.quiet {
                        eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
                    }
                }
                None => {
                    let stdout = io::stdout();
                    let mut handle = stdout.lock();
                    handle
                        .write_all(rendered.as_bytes())
                        .context("Failed to write to stdout")?;
                    if !rendered.ends_with('\n') {
                        handle.write_all(b"\n").ok();
                    }
                }
            }

            if !cli.quiet && !*json {
                eprintln!(
                    "   {} tokens in  /  {} tokens out  /  {}ms total",
                    dim(&outcome.stats.total_input_tokens.to_string()),
                    dim(&outcome.stats.total_output_tokens.to_string()),
                    outcome.stats.total_duration_ms,
                );
            }
        }

        Command::Inspect { input, json } => {
            let config = build_config(&cli.pipeline, None)?;
            let (report, user_name) = inspect_with(&PdfiumExtractor::new(), input, &config)
                .await
                .context("Failed to inspect PDF")?;

            if *json {
                let value = serde_json::json!({ "user_name": user_name, "report": report });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&value).context("Failed to serialise report")?
                );
            } else {
                println!("File:         {}", report.file_name);
                println!("Pages:        {}", report.page_count);
                println!("Characters:   {}", report.text.chars().count());
                println!("Truncated:    {}", report.truncated);
                println!("User name:    {}", user_name);
                println!();
                println!("{}", report.text);
            }
        }
    }

    Ok(())
}

/// Map CLI args to `AnalysisConfig`.
fn build_config(args: &PipelineArgs, progress: Option<ProgressCallback>) -> Result<AnalysisConfig> {
    let mut builder = AnalysisConfig::builder()
        .max_report_chars(args.max_chars)
        .step_delay_ms(args.step_delay_ms)
        .temperature(args.temperature)
        .max_tokens(args.max_tokens)
        .step_timeout_secs(args.step_timeout);

    if let Some(ref model) = args.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn render_markdown(outcome: &bloodtest_analyzer::AnalysisOutcome) -> String {
    let mut out = format!(
        "# Blood test analysis for {}\n\n> {}\n",
        outcome.user_name, outcome.query
    );
    if outcome.report.truncated {
        out.push_str("\n_Report text was truncated before analysis._\n");
    }
    for step in outcome.analysis.iter() {
        out.push_str(&format!("\n## {}\n\n{}\n", step.role, step.output));
    }
    out
}

/// Write to a temp file next to `path`, then rename over it.
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, contents)
        .await
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to move output into {}", path.display()))?;
    Ok(())
}
