// ABOUTME: Cooldown gate deciding whether a clip trigger may run right now
// ABOUTME: Tracks the last accepted trigger behind a mutex and reports remaining wait on rejection

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// When the gate stamps the last-trigger timestamp
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownMode {
    /// Stamp only after a clip was created. A failed clip does not consume the
    /// window, but two triggers arriving before the first finishes both run.
    #[default]
    OnSuccess,
    /// Stamp atomically inside `admit`. Closes the double-dispatch window; a
    /// failed clip still consumes the cooldown.
    OnAdmission,
}

impl FromStr for CooldownMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on_success" | "success" => Ok(Self::OnSuccess),
            "on_admission" | "admission" => Ok(Self::OnAdmission),
            other => anyhow::bail!(
                "COOLDOWN_MODE must be 'on_success' or 'on_admission', got: {}",
                other
            ),
        }
    }
}

/// Outcome of asking the gate for permission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// `notify` is set only for the first rejection since the last admitted
    /// trigger, so chat gets one cooldown notice per window
    Rejected { remaining: Duration, notify: bool },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

#[derive(Debug, Default)]
struct GateState {
    last_trigger: Option<Instant>,
    notice_sent: bool,
}

#[derive(Debug)]
pub struct CooldownGate {
    threshold: Duration,
    mode: CooldownMode,
    state: Mutex<GateState>,
}

impl CooldownGate {
    pub fn new(threshold: Duration, mode: CooldownMode) -> Self {
        Self {
            threshold,
            mode,
            state: Mutex::new(GateState::default()),
        }
    }

    pub fn mode(&self) -> CooldownMode {
        self.mode
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Check whether a trigger at `now` is allowed.
    ///
    /// In `OnAdmission` mode an admitted trigger also stamps the gate under the
    /// same lock, so a concurrent caller sees the new timestamp.
    pub fn admit(&self, now: Instant) -> Admission {
        let mut state = self.lock();

        if let Some(previous) = state.last_trigger {
            let elapsed = now.saturating_duration_since(previous);
            if elapsed < self.threshold {
                let notify = !state.notice_sent;
                state.notice_sent = true;
                return Admission::Rejected {
                    remaining: self.threshold - elapsed,
                    notify,
                };
            }
        }

        state.notice_sent = false;
        if self.mode == CooldownMode::OnAdmission {
            state.last_trigger = Some(now);
        }
        Admission::Admitted
    }

    /// Stamp the gate with the admission time of a trigger whose clip succeeded
    pub fn record(&self, admitted_at: Instant) {
        let mut state = self.lock();
        // Never move the stamp backwards when workers finish out of order
        if state
            .last_trigger
            .map_or(true, |previous| admitted_at > previous)
        {
            state.last_trigger = Some(admitted_at);
        }
    }

    pub fn last_trigger(&self) -> Option<Instant> {
        self.lock().last_trigger
    }
}

/// Whole seconds left, rounded up so "0s" is never shown to a rejected user
pub fn remaining_secs(remaining: Duration) -> u64 {
    let secs = remaining.as_secs();
    if remaining.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}
