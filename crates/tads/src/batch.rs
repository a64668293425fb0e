//! Whole-pipeline runs across several symbols.
//!
//! Runs are bounded by a semaphore and launched with a fixed pause
//! between them. Cancellation is cooperative: a cancelled batch stops
//! launching new runs and still awaits the ones in flight.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tads_agents::{Orchestrator, RunOptions};
use tads_models::{DeliberationState, Language, PortfolioConfig};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::TadsError;

pub const COMPARE_MIN_SYMBOLS: usize = 2;
pub const COMPARE_MAX_SYMBOLS: usize = 4;
const COMPARE_MAX_IN_FLIGHT: usize = 2;

/// One pipeline run to perform.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub symbol: String,
    pub as_of: NaiveDate,
    pub language: Language,
    pub options: RunOptions,
}

impl BatchJob {
    pub fn new(symbol: impl Into<String>, as_of: NaiveDate, language: Language) -> Self {
        Self {
            symbol: symbol.into(),
            as_of,
            language,
            options: RunOptions::default(),
        }
    }
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub symbol: String,
    pub result: Result<DeliberationState, TadsError>,
}

pub struct BatchRunner {
    orchestrator: Orchestrator,
    max_concurrent: usize,
    stagger: Duration,
    cancel: CancellationToken,
}

impl BatchRunner {
    pub fn new(orchestrator: Orchestrator, config: &PortfolioConfig) -> Self {
        Self {
            orchestrator,
            max_concurrent: config.max_concurrent_runs.max(1),
            stagger: Duration::from_millis(config.launch_stagger_ms),
            cancel: CancellationToken::new(),
        }
    }

    /// Returns a CancellationToken that stops further launches.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run every job. Outcomes come back in input order, one per job; a
    /// failed or cancelled run never affects the others.
    pub async fn run(&self, jobs: Vec<BatchJob>) -> Vec<BatchOutcome> {
        let start = Instant::now();
        let total = jobs.len();
        let symbols: Vec<String> = jobs.iter().map(|j| j.symbol.clone()).collect();
        let mut results: Vec<Option<Result<DeliberationState, TadsError>>> =
            (0..total).map(|_| None).collect();

        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for (index, job) in jobs.into_iter().enumerate() {
            if index > 0 && !self.stagger.is_zero() {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.stagger) => {}
                }
            }

            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = Arc::clone(&permits).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                warn!(symbol = %job.symbol, "Batch cancelled; run not launched");
                results[index] = Some(Err(TadsError::Cancelled));
                continue;
            };

            info!(symbol = %job.symbol, index, total, "Launching pipeline run");
            let orchestrator = self.orchestrator.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let result = orchestrator
                    .run(&job.symbol, job.as_of, job.language, job.options)
                    .await
                    .map_err(TadsError::from);
                (index, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => {
                    if let Err(e) = &result {
                        warn!(symbol = %symbols[index], error = %e, "Pipeline run failed");
                    }
                    results[index] = Some(result);
                }
                Err(e) => error!(error = %e, "Pipeline task panicked"),
            }
        }

        info!(
            runs = total,
            elapsed_ms = start.elapsed().as_millis(),
            "Batch finished"
        );

        symbols
            .into_iter()
            .zip(results)
            .map(|(symbol, result)| BatchOutcome {
                symbol,
                result: result.unwrap_or_else(|| Err(TadsError::Task("pipeline task panicked".into()))),
            })
            .collect()
    }

    /// Analyse 2 to 4 symbols side by side, at most two at a time.
    pub async fn compare(
        &self,
        symbols: &[String],
        as_of: NaiveDate,
        language: Language,
    ) -> Result<Vec<BatchOutcome>, TadsError> {
        if !(COMPARE_MIN_SYMBOLS..=COMPARE_MAX_SYMBOLS).contains(&symbols.len()) {
            return Err(TadsError::InvalidRequest(format!(
                "compare takes {COMPARE_MIN_SYMBOLS} to {COMPARE_MAX_SYMBOLS} symbols, got {}",
                symbols.len()
            )));
        }

        let limited = BatchRunner {
            orchestrator: self.orchestrator.clone(),
            max_concurrent: self.max_concurrent.min(COMPARE_MAX_IN_FLIGHT),
            stagger: self.stagger,
            cancel: self.cancel.clone(),
        };
        let jobs = symbols
            .iter()
            .map(|s| BatchJob::new(s.clone(), as_of, language))
            .collect();
        Ok(limited.run(jobs).await)
    }
}
