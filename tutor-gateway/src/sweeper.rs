//! Periodic cleanup of expired sessions and idle rate-limit windows.
//!
//! Nothing depends on the sweeper for correctness: expired sessions are
//! already rejected at lookup time.

use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::state::AppState;

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions: u64,
    pub addresses: usize,
}

/// Run [`sweep_once`] every `every`, starting one period from now.
#[must_use]
pub fn spawn(state: AppState, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            sweep_once(&state).await;
        }
    })
}

/// One cleanup pass. Store failures are logged and retried next period.
pub async fn sweep_once(state: &AppState) -> SweepReport {
    let sessions = match state.auth.purge_expired_sessions().await {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(error = %e, "session purge failed");
            0
        }
    };
    let addresses = state.limiter.sweep_at(Instant::now());
    if sessions > 0 || addresses > 0 {
        tracing::debug!(sessions, addresses, "sweep complete");
    }
    SweepReport { sessions, addresses }
}
