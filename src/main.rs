use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use reconcile_engine::application::audit::AuditTrail;
use reconcile_engine::application::batch::BatchEngine;
use reconcile_engine::application::feedback::ActiveLearner;
use reconcile_engine::application::gateway::ScoringGateway;
use reconcile_engine::application::policy::HybridDecisionPolicy;
use reconcile_engine::application::realtime::RealTimeEngine;
use reconcile_engine::application::stress::{CounterfactualHarness, ScenarioConfig};
use reconcile_engine::config::EngineConfig;
use reconcile_engine::domain::event::{EventRecord, SourceSystem, TransactionEvent};
use reconcile_engine::domain::ports::{AuditSinkRef, MatchScorerRef, RetrainingHookRef};
use reconcile_engine::domain::record::{ExceptionRecord, MatchRecord};
use reconcile_engine::infrastructure::audit::{JsonlAuditSink, TracingAuditSink};
use reconcile_engine::infrastructure::retraining::LoggingRetrainingHook;
use reconcile_engine::infrastructure::scoring::{HeuristicMatchScorer, ZScoreAnomalyDetector};
use reconcile_engine::interfaces::csv::event_reader::{EventReader, stream_order};
use reconcile_engine::interfaces::csv::report_writer::ReportWriter;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Engine configuration (TOML). Documented defaults apply when omitted.
    #[arg(long, global = true, env = "RECON_CONFIG")]
    config: Option<PathBuf>,

    /// Append audit entries to this JSON-lines file instead of the log.
    #[arg(long, global = true)]
    audit_log: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Multi-stage batch reconciliation of two files.
    Batch(RunArgs),
    /// Replay both files through the real-time engine.
    Stream(RunArgs),
    /// Counterfactual replay under the built-in stress scenarios.
    Stress {
        source_a: PathBuf,
        source_b: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Source A events CSV
    source_a: PathBuf,
    /// Source B events CSV
    source_b: PathBuf,
    /// Write matches.csv and exceptions.csv here instead of exceptions to stdout.
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reconcile_engine=info,audit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path).into_diagnostic()?,
        None => EngineConfig::default(),
    };
    let sink: AuditSinkRef = match &cli.audit_log {
        Some(path) => Arc::new(JsonlAuditSink::create(path).into_diagnostic()?),
        None => Arc::new(TracingAuditSink),
    };
    let scorer: MatchScorerRef = Arc::new(HeuristicMatchScorer::new());

    match cli.command {
        Command::Batch(args) => {
            let a = validated(read_events(&args.source_a, SourceSystem::SourceA)?);
            let b = validated(read_events(&args.source_b, SourceSystem::SourceB)?);
            let engine =
                BatchEngine::new(&config, Arc::new(ZScoreAnomalyDetector)).into_diagnostic()?;
            let outcome = engine.run(&a, &b).into_diagnostic()?;
            write_results(
                args.out_dir.as_deref(),
                &outcome.matches,
                &outcome.ranked_exceptions(),
            )?;
        }
        Command::Stream(args) => {
            let events = stream_order(
                read_events(&args.source_a, SourceSystem::SourceA)?,
                read_events(&args.source_b, SourceSystem::SourceB)?,
            );

            let hook: RetrainingHookRef = Arc::new(LoggingRetrainingHook::new());
            let learner = Arc::new(ActiveLearner::new(
                &config.active_learning,
                Some(hook),
                config.breaker.call_timeout(),
            ));
            let gateway = ScoringGateway::from_config(scorer, &config);
            let policy = HybridDecisionPolicy::new(&config, gateway, learner);
            let mut engine = RealTimeEngine::with_policy(&config, policy, AuditTrail::new(sink))
                .into_diagnostic()?;

            for event in events {
                engine.process_event(event).await;
            }
            engine.drain_pending_as_exceptions();

            let snapshot = engine.snapshot();
            let breaker = engine.policy().gateway().breaker().metrics();
            tracing::info!(
                ingested = snapshot.ingested,
                matches = snapshot.matches,
                exceptions = snapshot.exceptions,
                breaker_state = %breaker.state,
                scorer_failures = breaker.total_failures,
                drift_alerts = engine.drift_alerts(),
                audit_failures = engine.audit().delivery_failures(),
                retraining_failures = engine.policy().learner().delivery_failures(),
                "stream run complete"
            );

            let (matches, exceptions) = engine.into_results();
            write_results(args.out_dir.as_deref(), &matches, &exceptions)?;
        }
        Command::Stress { source_a, source_b } => {
            let events = stream_order(
                read_events(&source_a, SourceSystem::SourceA)?,
                read_events(&source_b, SourceSystem::SourceB)?,
            );
            let scenarios = ScenarioConfig::builtin(&config);
            let harness = CounterfactualHarness::new(config, scorer, sink);
            let report = harness
                .run_simulation(&events, &scenarios)
                .await
                .into_diagnostic()?;

            for summary in report.summary() {
                tracing::info!(
                    scenario = %summary.scenario,
                    stable = summary.stable,
                    flipped = summary.flipped,
                    "scenario stability"
                );
            }
            let stdout = io::stdout();
            ReportWriter::new(stdout.lock())
                .write_stability(&report.results)
                .into_diagnostic()?;
        }
    }

    Ok(())
}

/// Missing required columns abort the run; bad rows are reported and skipped.
fn read_events(path: &Path, source: SourceSystem) -> Result<Vec<EventRecord>> {
    let reader = EventReader::from_path(path, source).into_diagnostic()?;
    let mut records = Vec::new();
    for row in reader.events() {
        match row {
            Ok(record) => records.push(record),
            Err(e) => eprintln!("Error reading event from {}: {}", path.display(), e),
        }
    }
    Ok(records)
}

fn validated(records: Vec<EventRecord>) -> Vec<TransactionEvent> {
    records
        .into_iter()
        .filter_map(|record| match TransactionEvent::try_from(record) {
            Ok(event) => Some(event),
            Err(rejected) => {
                eprintln!(
                    "Skipping event {}: {}",
                    rejected.record.txn_ref_id,
                    rejected.reason()
                );
                None
            }
        })
        .collect()
}

fn write_results(
    out_dir: Option<&Path>,
    matches: &[MatchRecord],
    exceptions: &[ExceptionRecord],
) -> Result<()> {
    match out_dir {
        Some(dir) => {
            fs::create_dir_all(dir).into_diagnostic()?;
            let matches_file = File::create(dir.join("matches.csv")).into_diagnostic()?;
            ReportWriter::new(matches_file)
                .write_matches(matches)
                .into_diagnostic()?;
            let exceptions_file = File::create(dir.join("exceptions.csv")).into_diagnostic()?;
            ReportWriter::new(exceptions_file)
                .write_exceptions(exceptions)
                .into_diagnostic()?;
        }
        None => {
            let stdout = io::stdout();
            ReportWriter::new(stdout.lock())
                .write_exceptions(exceptions)
                .into_diagnostic()?;
        }
    }
    Ok(())
}
