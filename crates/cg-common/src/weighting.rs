//! Weighting service: recomputes derived edge weights from the qualitative
//! attributes stored on candidate→feature edges.
//!
//! Recomputes are idempotent (the weight model is pure, see [`crate::weight`])
//! and only changed weights are written back. Every successful write bumps the
//! shared graph epoch, which is how projections learn they are stale.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::EngineError;
use crate::store::SharedStore;
use crate::weight::{derive_edge_weight, DecayConfig};

/// Monotonic counter over weight-affecting writes. Shared between the
/// weighting service (bumps) and the projection manager (staleness checks).
#[derive(Debug, Clone, Default)]
pub struct GraphEpoch(Arc<AtomicU64>);

impl GraphEpoch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Cooperative cancellation flag for long batch recomputes.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a single-candidate recompute.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct RecalcOutcome {
    pub examined: usize,
    pub updated: usize,
}

/// Per-candidate failure collected during a batch run. The batch keeps going
/// past individual failures and reports them here.
#[derive(Debug, Clone, Serialize)]
pub struct RecalcFailure {
    pub candidate_uid: String,
    pub error: String,
}

/// Report for a (possibly partial) batch recompute. `last_processed` is the
/// resume cursor: pass it back as `resume_from` to continue a cancelled run.
#[derive(Debug, Clone, Serialize)]
pub struct RecalcReport {
    pub run_id: String,
    pub examined: usize,
    pub updated: usize,
    pub failures: Vec<RecalcFailure>,
    pub last_processed: Option<String>,
    pub cancelled: bool,
}

/// Weights closer than this are treated as unchanged and not written back.
const WEIGHT_EPSILON: f64 = 1e-9;

const DEFAULT_PAGE_SIZE: usize = 200;

pub struct WeightingService {
    store: SharedStore,
    epoch: GraphEpoch,
    decay: DecayConfig,
    page_size: usize,
}

impl WeightingService {
    pub fn new(store: SharedStore, epoch: GraphEpoch) -> Self {
        Self {
            store,
            epoch,
            decay: DecayConfig::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_decay(mut self, decay: DecayConfig) -> Self {
        self.decay = decay;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Recompute the weights of every outgoing edge of one candidate.
    ///
    /// Reads the current qualitative attributes, derives each weight at
    /// `as_of`, and writes back only the edges whose weight actually changed.
    /// Running twice with the same `as_of` leaves the second run with zero
    /// updates.
    #[instrument(skip(self))]
    pub async fn recalc_for_candidate(
        &self,
        candidate_uid: &str,
        as_of: DateTime<Utc>,
    ) -> Result<RecalcOutcome, EngineError> {
        let links = self.store.candidate_features(candidate_uid).await?;

        let mut examined = 0;
        let mut updated = 0;
        let mut write_error = None;
        for link in &links {
            let edge = &link.edge;
            let Some(next) = derive_edge_weight(edge.rel_type, &edge.attrs, as_of, &self.decay)
            else {
                continue;
            };
            examined += 1;

            let unchanged = edge
                .weight
                .map(|current| (current - next).abs() < WEIGHT_EPSILON)
                .unwrap_or(false);
            if unchanged {
                continue;
            }

            if let Err(err) = self.store.set_edge_weight(&edge.eid, next, as_of).await {
                write_error = Some(err);
                break;
            }
            updated += 1;
        }

        // Edges written before a failed write are live, so projections must
        // still see the epoch move even when the loop is cut short.
        if updated > 0 {
            let epoch = self.epoch.bump();
            info!(candidate_uid, examined, updated, epoch, "weights recomputed");
        }
        if let Some(err) = write_error {
            return Err(err.into());
        }

        Ok(RecalcOutcome { examined, updated })
    }

    /// Recompute weights across all candidates, in stable ascending-uid order.
    ///
    /// Per-candidate failures are collected rather than aborting the batch.
    /// Cancellation is cooperative and checked between candidates; the report
    /// carries the last processed uid so the run can resume where it stopped.
    #[instrument(skip(self, cancel))]
    pub async fn recalc_all(
        &self,
        resume_from: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<RecalcReport, EngineError> {
        let run_id = crate::run_id::generate();
        let as_of = Utc::now();
        info!(run_id, resume_from, "batch weight recompute started");

        let mut report = RecalcReport {
            run_id: run_id.clone(),
            examined: 0,
            updated: 0,
            failures: Vec::new(),
            last_processed: resume_from.map(str::to_string),
            cancelled: false,
        };

        let mut cursor = resume_from.map(str::to_string);
        loop {
            let page = self
                .store
                .list_candidates(cursor.as_deref(), self.page_size)
                .await?;
            if page.is_empty() {
                break;
            }

            for candidate in &page {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    warn!(
                        run_id,
                        last_processed = report.last_processed.as_deref(),
                        "batch weight recompute cancelled"
                    );
                    return Ok(report);
                }

                match self.recalc_for_candidate(&candidate.uid, as_of).await {
                    Ok(outcome) => {
                        report.examined += outcome.examined;
                        report.updated += outcome.updated;
                    }
                    Err(err) => {
                        warn!(run_id, candidate_uid = candidate.uid, error = %err, "candidate recompute failed");
                        report.failures.push(RecalcFailure {
                            candidate_uid: candidate.uid.clone(),
                            error: err.to_string(),
                        });
                    }
                }
                report.last_processed = Some(candidate.uid.clone());
            }

            cursor = page.last().map(|node| node.uid.clone());
        }

        info!(
            run_id,
            examined = report.examined,
            updated = report.updated,
            failures = report.failures.len(),
            "batch weight recompute finished"
        );
        Ok(report)
    }
}
