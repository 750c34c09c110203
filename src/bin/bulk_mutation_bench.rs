use bulk_mutation_bench::error::HarnessError;
use bulk_mutation_bench::harness::{
    HarnessConfig, DEFAULT_ENDPOINT, DEFAULT_TIMEOUT_SECS,
};
use bulk_mutation_bench::interrupt::install_interrupt_handler;
use bulk_mutation_bench::pipeline::{BenchmarkRun, Pipeline, SweepOutcome};
use bulk_mutation_bench::report::{render_run_header, MetricsReporter};
use bulk_mutation_bench::schema::{RunMeta, SweepReport};
use bulk_mutation_bench::transport::HttpTransport;
use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bulk-mutation-bench")]
#[command(about = "Latency sweep for batched GraphQL create/update mutations")]
struct Args {
    /// GraphQL endpoint to POST mutations to.
    #[arg(long, env = "BULK_BENCH_ENDPOINT", default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Per-request timeout in seconds.
    #[arg(long, env = "BULK_BENCH_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Comma-separated batch sizes, run in the order given.
    #[arg(
        long,
        env = "BULK_BENCH_BATCH_SIZES",
        value_delimiter = ',',
        allow_negative_numbers = true,
        default_value = "10,50,100"
    )]
    batch_sizes: Vec<i64>,

    /// Where to write the JSON report. If omitted, no report is written.
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,
}

fn now_utc_rfc3339() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("unix:{secs}")
}

fn git_sha_short() -> Option<String> {
    std::env::var("GIT_SHA")
        .ok()
        .or_else(|| std::env::var("GITHUB_SHA").ok())
        .map(|s| s.chars().take(12).collect())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(args: Args) -> Result<SweepOutcome, HarnessError> {
    let cfg = HarnessConfig {
        endpoint: args.endpoint,
        timeout: Duration::from_secs(args.timeout_secs),
        batch_sizes: args.batch_sizes,
    };
    cfg.validate()?;

    let transport = HttpTransport::new(cfg.endpoint.clone(), cfg.timeout)?;
    let pipeline = Pipeline::new(transport);
    install_interrupt_handler(pipeline.cancel_flag())?;
    let mut reporter = MetricsReporter::new(io::stdout());
    reporter.emit(&render_run_header(&cfg.endpoint, &cfg.batch_sizes));

    let sweep = BenchmarkRun {
        batch_sizes: cfg.batch_sizes.clone(),
    };
    let outcome = pipeline.run_sweep(&sweep, &mut reporter)?;
    if outcome.cancelled {
        reporter.mark_cancelled();
    }
    let summary = reporter.render_final_summary();
    reporter.emit(&summary);

    if let Some(path) = &args.out {
        let report = SweepReport::new(RunMeta::new(&cfg, now_utc_rfc3339(), git_sha_short()), &outcome);
        report.write_json(path)?;
        tracing::info!(path = %path.display(), "wrote JSON report");
    }

    Ok(outcome)
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    match run(args) {
        Ok(outcome) if outcome.endpoint_unreachable() => {
            tracing::error!("endpoint unreachable on the first request");
            ExitCode::from(1)
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::from(2)
        }
    }
}
