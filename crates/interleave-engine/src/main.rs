//! Event generation binary.
//!
//! Loads configuration, starts `run.workers` independent generators on
//! disjoint random streams, generates `run.events` events split between
//! them, and prints the merged run statistics as JSON.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `interleave-config.yaml` (or the path in
//!    `INTERLEAVE_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Spawn one blocking task per worker, each owning a generator
//! 4. Merge the per-worker statistics and print the summary

mod error;

use std::path::PathBuf;

use interleave_core::{
    EventOutcome, GenerateError, Generator, GeneratorConfig, RunStatistics, policy_hooks,
};
use interleave_types::RunId;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "interleave-config.yaml";

/// Environment variable overriding the configuration path.
const CONFIG_PATH_VAR: &str = "INTERLEAVE_CONFIG";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, initialization or a worker fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration before logging so its level applies.
    let (config, source) = load_config()?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.run.log_level)),
        )
        .with_target(true)
        .init();

    info!("interleave-engine starting");
    match &source {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!("Config file not found, using defaults"),
    }
    info!(
        seed = config.run.seed,
        events = config.run.events,
        workers = config.run.workers,
        process = ?config.process.kind,
        interleave_outgoing = config.evolution.interleave_outgoing,
        collisions = config.collisions.enabled,
        "Run configured"
    );

    // 3. Run workers.
    let summary = run(&config).await?;

    // 4. Report.
    let elapsed = summary
        .finished_at
        .map(|finished| finished.signed_duration_since(summary.started_at));
    info!(
        run_id = %summary.run_id,
        tried = summary.tried,
        accepted = summary.accepted,
        vetoed = summary.vetoed_total(),
        failed = summary.failed,
        elapsed_ms = elapsed.map(|d| d.num_milliseconds()),
        "Run complete"
    );
    println!("{}", serde_json::to_string_pretty(&summary).map_err(EngineError::from)?);
    Ok(())
}

/// Spawn the workers and merge their statistics.
async fn run(config: &GeneratorConfig) -> Result<RunStatistics, EngineError> {
    let workers = u64::try_from(config.run.workers.max(1)).unwrap_or(1);
    let mut handles = Vec::new();
    for worker in 0..workers {
        let events = events_for_worker(config.run.events, workers, worker);
        let config = config.clone();
        let handle = tokio::task::spawn_blocking(move || generate(config, worker, events));
        handles.push((worker, handle));
    }

    let mut summary = RunStatistics::new(RunId::new());
    for (worker, handle) in handles {
        let stats = handle.await.map_err(|e| EngineError::Worker {
            worker,
            message: format!("{e}"),
        })??;
        summary.merge(&stats);
    }
    summary.finish();
    Ok(summary)
}

/// Generate `events` events on one independent generator.
fn generate(config: GeneratorConfig, worker: u64, events: u64) -> Result<RunStatistics, EngineError> {
    let hooks = policy_hooks(&config.hooks);
    let mut generator = Generator::from_config(config, hooks, worker)?;
    info!(worker, events, "Worker started");

    for _ in 0..events {
        match generator.next_event() {
            Ok(EventOutcome::Accepted(event)) => {
                if event.number == 1 {
                    debug!(worker, listing = %event.record, "First accepted event");
                }
            }
            Ok(EventOutcome::Vetoed { .. }) => {}
            Err(error @ (GenerateError::Stalled { .. } | GenerateError::Inconsistent { .. })) => {
                warn!(worker, %error, "Event abandoned");
            }
            Err(error) => return Err(error.into()),
        }
    }

    let stats = generator.finish();
    info!(worker, accepted = stats.accepted, "Worker finished");
    Ok(stats)
}

/// Share `events` between `workers`, giving the remainder to the first ones.
fn events_for_worker(events: u64, workers: u64, worker: u64) -> u64 {
    let base = events.checked_div(workers).unwrap_or(events);
    let remainder = events.checked_rem(workers).unwrap_or(0);
    if worker < remainder {
        base.saturating_add(1)
    } else {
        base
    }
}

/// Load the configuration from `INTERLEAVE_CONFIG` or
/// `interleave-config.yaml`, falling back to defaults when neither exists.
fn load_config() -> Result<(GeneratorConfig, Option<PathBuf>), EngineError> {
    let path = std::env::var_os(CONFIG_PATH_VAR)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    if path.exists() {
        let config = GeneratorConfig::from_file(&path)?;
        Ok((config, Some(path)))
    } else {
        Ok((GeneratorConfig::default(), None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_split_without_loss() {
        let split: Vec<u64> = (0..3).map(|w| events_for_worker(10, 3, w)).collect();
        assert_eq!(split, vec![4, 3, 3]);
        assert_eq!(events_for_worker(5, 1, 0), 5);
    }
}
