pub mod drone;
pub mod progression;
pub mod scheduler;

use std::time::Instant;

use crate::state::AppState;
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Sweep,
    Read,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Sweep => "sweep",
            Trigger::Read => "read",
        }
    }
}

/// Runs the progression engine against the state's clock and records the
/// outcome in metrics.
pub async fn advance_now(state: &AppState, trigger: Trigger) -> Result<usize, StoreError> {
    let start = Instant::now();
    let result = state.engine.advance_detailed(state.clock.now()).await;
    let elapsed = start.elapsed().as_secs_f64();

    let outcome = if result.is_ok() { "success" } else { "error" };
    state
        .metrics
        .advance_latency_seconds
        .with_label_values(&[trigger.as_str()])
        .observe(elapsed);
    state
        .metrics
        .advance_runs_total
        .with_label_values(&[trigger.as_str(), outcome])
        .inc();

    let report = result?;
    state
        .metrics
        .order_transitions_total
        .with_label_values(&["in_delivery"])
        .inc_by(report.dispatched as u64);
    state
        .metrics
        .order_transitions_total
        .with_label_values(&["delivered"])
        .inc_by(report.delivered as u64);

    Ok(report.changed())
}
