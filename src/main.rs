use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use screentest::config;
use screentest::{
    Actor, ActorSet, BaselineStore, DiffOptions, DirectorySource, JsonReportSink, MockFramebuffer, Orchestrator,
    ReportModel, RunFile, RunOptions, RunProgress, Status, TestRunResult,
};

/// screentest - visual regression testing against accepted baselines
#[derive(Parser, Debug)]
#[command(
    name = "screentest",
    version,
    about = "Visual regression testing against accepted baselines",
    after_help = "ENVIRONMENT VARIABLES:\n\
        SCREENTEST_OUTPUT_DIR        Artifact root (baseline/, current/, diff/)\n\
        SCREENTEST_CONCURRENCY       Maximum actors in flight\n\
        SCREENTEST_THRESHOLD         Per-pixel threshold (0.0-1.0)\n\
        SCREENTEST_CAPTURE_TIMEOUT   Per-capture timeout in seconds\n\
        SCREENTEST_RUN_TIMEOUT       Whole-run deadline in seconds\n\
        SCREENTEST_LOG               Log filter (e.g. screentest=debug)"
)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compare fresh captures against baselines
    Audition {
        /// Directory of pre-rendered captures (<actor>.png)
        #[arg(short, long)]
        source: PathBuf,

        /// Run file listing actors; without it every PNG in --source is an actor
        #[arg(short, long)]
        actors: Option<PathBuf>,

        /// Artifact root (overrides the run file's output_dir)
        #[arg(short, long, env = "SCREENTEST_OUTPUT_DIR")]
        output: Option<PathBuf>,

        /// Force update baselines
        #[arg(long)]
        update: bool,

        /// Maximum actors in flight
        #[arg(short, long, env = "SCREENTEST_CONCURRENCY", default_value = "1")]
        concurrency: usize,

        /// Per-pixel threshold (0.0-1.0)
        #[arg(short, long, env = "SCREENTEST_THRESHOLD", default_value = "0.2")]
        threshold: f64,

        /// Count anti-aliased pixels as differences
        #[arg(long)]
        include_aa: bool,

        /// Whole-run deadline in seconds
        #[arg(long, env = "SCREENTEST_RUN_TIMEOUT")]
        timeout: Option<f64>,

        /// Per-capture timeout in seconds (0 disables)
        #[arg(long, env = "SCREENTEST_CAPTURE_TIMEOUT", default_value = "30")]
        capture_timeout: f64,

        /// Where to write the JSON report (default: <output>/report.json)
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Print the report model as JSON instead of progress lines
        #[arg(long)]
        json: bool,
    },

    /// Create a mock screenshot for fixtures
    Mock {
        /// Width in pixels
        #[arg(short = 'W', long, default_value = "800")]
        width: u32,

        /// Height in pixels
        #[arg(short = 'H', long, default_value = "600")]
        height: u32,

        /// Output file path
        #[arg(short, long, default_value = "./mock_screenshot.png")]
        output: PathBuf,

        /// Fill color as hex (e.g., "ff0000" for red)
        #[arg(short, long, default_value = "000000")]
        color: String,

        /// Text drawn in the top-left corner
        #[arg(long, default_value = "Mock Framebuffer")]
        label: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let args = Args::parse();

    match args.command {
        Some(Commands::Audition {
            source,
            actors,
            output,
            update,
            concurrency,
            threshold,
            include_aa,
            timeout,
            capture_timeout,
            report,
            json,
        }) => {
            if !(0.0..=1.0).contains(&threshold) {
                bail!("Threshold must be between 0.0 and 1.0, got {}", threshold);
            }
            let provider = DirectorySource::new(&source);

            let (actor_set, file_output) = match actors {
                Some(path) => {
                    let run = RunFile::load(&path).with_context(|| format!("loading {}", path.display()))?;
                    (run.actor_set()?, run.output_dir)
                }
                None => {
                    let names = provider
                        .discover()
                        .with_context(|| format!("reading {}", source.display()))?;
                    let list = names.into_iter().map(|n| Actor::new(n, "Default")).collect();
                    (ActorSet::new(list)?, None)
                }
            };
            let root = output.or(file_output).unwrap_or_else(config::output_dir);

            let options = RunOptions::default()
                .update(update)
                .concurrency(concurrency)
                .capture_timeout(seconds(capture_timeout))
                .run_timeout(timeout.and_then(seconds))
                .diff(DiffOptions::default().threshold(threshold).include_antialiasing(include_aa));

            let store = BaselineStore::open(&root).with_context(|| format!("preparing {}", root.display()))?;
            let orchestrator = Orchestrator::new(Arc::new(provider), store, options);
            let sink = JsonReportSink::new(report.unwrap_or_else(|| root.join("report.json")));

            if !json {
                println!("\nACTION! Starting screentest ({} actors)\n", actor_set.len());
            }
            let model = orchestrator
                .run_with_progress(&actor_set, |event| {
                    if !json {
                        print_progress(event);
                    }
                })
                .await?;
            screentest::deliver(&model, &sink)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&model)?);
            } else {
                print_summary(&model, &sink);
            }

            return Ok(if model.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            });
        }

        Some(Commands::Mock {
            width,
            height,
            output,
            color,
            label,
        }) => {
            let rgb = parse_hex_color(&color)?;
            let fill = [rgb[0], rgb[1], rgb[2], 255];
            let mut fb = MockFramebuffer::with_color(width, height, fill);
            fb.draw_text(10, 10, &label, [255, 255, 255, 255], fill);
            fb.draw_rect(10, 30, 100, 50, [128, 128, 128, 255]);

            std::fs::write(&output, fb.to_png()?)?;
            println!("Created mock screenshot: {}", output.display());
            println!("  Size: {}x{}", width, height);
        }

        None => {
            println!("screentest - visual regression testing against accepted baselines");
            println!();
            println!("Usage: screentest <COMMAND>");
            println!();
            println!("Commands:");
            println!("  audition  Compare fresh captures against baselines");
            println!("  mock      Create a mock screenshot for fixtures");
            println!();
            println!("Run with --help for more information.");
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(config::ENV_LOG)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(config::log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Seconds to a timeout; zero, negative or unrepresentable disables it
fn seconds(secs: f64) -> Option<Duration> {
    if secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}

fn print_progress(event: &RunProgress) {
    match event {
        RunProgress::Started { actor } => println!("  Filming {}...", actor),
        RunProgress::Finished(result) => println!("  {}", describe(result)),
    }
}

fn describe(result: &TestRunResult) -> String {
    match result.status {
        Status::Match => format!("CUT! {} (Perfect Match)", result.actor),
        Status::Mismatch => format!(
            "CUT! {} (Diff: {:.2}%)",
            result.actor,
            result.mismatch_percentage.unwrap_or_default()
        ),
        Status::New => format!("CUT! {} (New Baseline)", result.actor),
        Status::Failed => format!(
            "CUT! {} (Failed: {})",
            result.actor,
            result.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

fn print_summary(model: &ReportModel, sink: &JsonReportSink) {
    println!("\nWrapping production...");
    for group in &model.categories {
        println!("\n[{}]", group.category);
        for result in &group.results {
            println!("  {}", describe(result));
        }
    }
    if let Some(hero) = model.hero() {
        println!("\nHero shot: {}", hero.actor);
    }
    println!(
        "\n{} new, {} matched, {} mismatched, {} failed",
        model.count(Status::New),
        model.count(Status::Match),
        model.count(Status::Mismatch),
        model.count(Status::Failed)
    );
    println!("Report: {}", sink.path().display());
}

fn parse_hex_color(hex: &str) -> Result<[u8; 3]> {
    let hex = hex.trim_start_matches('#');
    if !hex.is_ascii() || hex.len() != 6 {
        bail!("Color must be 6 hex digits (e.g., 'ff0000')");
    }
    let r = u8::from_str_radix(&hex[0..2], 16)?;
    let g = u8::from_str_radix(&hex[2..4], 16)?;
    let b = u8::from_str_radix(&hex[4..6], 16)?;
    Ok([r, g, b])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("ff0000").unwrap(), [255, 0, 0]);
        assert_eq!(parse_hex_color("#0a0B0c").unwrap(), [10, 11, 12]);
        assert!(parse_hex_color("fff").is_err());
        assert!(parse_hex_color("zzzzzz").is_err());
        assert!(parse_hex_color("aébcd").is_err());
    }

    #[test]
    fn test_seconds() {
        assert_eq!(seconds(0.0), None);
        assert_eq!(seconds(-1.0), None);
        assert_eq!(seconds(1.5), Some(Duration::from_millis(1500)));
        assert_eq!(seconds(1e30), None);
        assert_eq!(seconds(f64::INFINITY), None);
        assert_eq!(seconds(f64::NAN), None);
    }

    #[test]
    fn test_describe() {
        let failed = TestRunResult::failed("Desktop_Star", "Desktop", None, screentest::FailureKind::Timeout, "slow");
        assert_eq!(describe(&failed), "CUT! Desktop_Star (Failed: slow)");
    }
}
