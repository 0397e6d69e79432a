use anyhow::Context;
use clap::{Parser, Subcommand};
use northwoods_events::config::{load_or_empty, LoadedConfig};
use northwoods_events::logging;
use northwoods_events::observability::metrics;
use northwoods_events::pipeline::codec::{encode, EncodeOptions};
use northwoods_events::pipeline::storage::write_text;
use northwoods_events::pipeline::{Orchestrator, RunPaths, RunReport};
use northwoods_events::common::time::in_zone;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "northwoods-events")]
#[command(about = "Aggregate regional event listings into one deduplicated calendar feed")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every source and write the calendar, state and report
    Run {
        #[arg(long, default_value = "sources.toml")]
        config: PathBuf,
        #[arg(long, default_value = "build/events.ics")]
        out: PathBuf,
        #[arg(long, default_value = "build/last_run_report.json")]
        report: PathBuf,
        #[arg(long, default_value = "state/events.json")]
        state: PathBuf,
        #[arg(long, default_value = "state/enrichment_cache.json")]
        cache: PathBuf,
    },
    /// Validate the configuration and list resolved and rejected sources
    Check {
        #[arg(long, default_value = "sources.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _log_guard = logging::init_logging();
    metrics::init_from_env();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            out,
            report,
            state,
            cache,
        } => {
            println!("🚀 Running events pipeline...");
            let loaded = load_or_empty(&config);
            let paths = RunPaths {
                output: out,
                report,
                state,
                cache,
            };
            // The run always completes with both output files in place.
            if let Err(e) = run(loaded.clone(), &paths).await {
                error!("Pipeline could not start: {:#}", e);
                println!("❌ Pipeline could not start: {:#}", e);
                write_empty_outputs(&loaded, &paths, &format!("{:#}", e));
            }
        }
        Commands::Check { config } => check(&config),
    }
    Ok(())
}

async fn run(loaded: LoadedConfig, paths: &RunPaths) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::from_config(loaded).context("building HTTP client")?;
    let now = orchestrator.now();
    let report = orchestrator.run(paths, now).await;

    println!("\n📊 Run results:");
    for (source_id, source) in &report.per_source {
        println!(
            "   {:<28} {:<12} {:>4} candidates {:>2} failures",
            source_id, source.kind, source.candidates, source.failures
        );
    }
    println!("   Raw candidates: {}", report.total_raw);
    println!("   Normalized: {}", report.total_normalized);
    println!("   Deduplicated: {} ({} collisions)", report.total_deduplicated, report.collisions);
    println!(
        "   Enrichment: {} fetched, {} enriched, {} cache hits",
        report.enrichment.fetched, report.enrichment.enriched, report.enrichment.cache_hits
    );
    println!(
        "   State: {} merged, {} purged, {} total",
        report.state.merged, report.state.purged, report.state.total
    );
    if !report.dropped.is_empty() {
        println!("\n⚠️  Dropped candidates:");
        for (reason, count) in &report.dropped {
            println!("   - {}: {}", reason, count);
        }
    }
    println!("✅ Calendar written to {}", paths.output.display());
    Ok(())
}

fn write_empty_outputs(loaded: &LoadedConfig, paths: &RunPaths, reason: &str) {
    let run = &loaded.config.run;
    let now = in_zone(&chrono::Utc::now(), run.zone());
    let options = EncodeOptions {
        calendar_name: run.calendar_name.clone(),
        timezone: run.timezone.clone(),
        generated_at: now.with_timezone(&chrono::Utc),
    };
    if let Err(e) = write_text(&paths.output, &encode(&[], &options)) {
        error!("Failed to write calendar {}: {}", paths.output.display(), e);
    }
    let mut report = RunReport::new(now, &run.timezone, run.log_tail);
    report.rejected_sources = loaded.rejected.clone();
    report.config_error = loaded.load_error.clone();
    report.log(reason);
    if let Err(e) = report.save(&paths.report) {
        error!("Failed to write report {}: {}", paths.report.display(), e);
    }
}

fn check(path: &std::path::Path) {
    let loaded = load_or_empty(path);
    if let Some(err) = &loaded.load_error {
        println!("❌ {}", err);
    }
    println!("🔍 {} sources resolved from {}", loaded.sources.len(), path.display());
    for source in &loaded.sources {
        println!(
            "   ✓ {:<28} {:<12} {} ({}{})",
            source.config.source_id,
            source.adapter.kind(),
            source.config.url,
            source.zone.name(),
            if source.config.enrich { ", enrich" } else { "" }
        );
    }
    if !loaded.rejected.is_empty() {
        println!("\n⚠️  {} sources rejected:", loaded.rejected.len());
        for rejected in &loaded.rejected {
            println!("   ✗ {:<28} {:<12} {}", rejected.source_id, rejected.kind, rejected.reason);
        }
    }
    info!(
        resolved = loaded.sources.len(),
        rejected = loaded.rejected.len(),
        "Configuration checked"
    );
}
