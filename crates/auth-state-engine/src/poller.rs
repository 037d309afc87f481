//! Timer-driven polling with exponential backoff.
//!
//! The scheduler re-checks auth state while a context waits for an external
//! surface to finish authenticating. Its lifecycle is an explicit state
//! machine rather than nested timer closures:
//!
//! ```text
//! Idle ──Start──▶ Scheduled ──TimerFired──▶ Checking
//!                   │  ▲  ▲                    │
//!                   │  │  └───CheckSettled─────┤
//!                   │  │                       │
//!                 Stop/Exhausted        Stop/Exhausted
//!                   ▼  │                       ▼
//!                Stopped ◀─────────────────────┘
//!                   │  └──Start (resume)
//!                 Reset ──▶ Idle
//! ```
//!
//! Backoff doubles the delay each attempt up to a cap (2s, 4s, 8s by
//! default), bounding polling cost while the external auth completes.

use crate::envelope::AuthStatus;
use crate::SyncResult;
use chrono::Utc;
use futures_util::future::BoxFuture;
use rust_fsm::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::{debug, info, warn};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    poll_machine(Idle)

    Idle => {
        Start => Scheduled
    },
    Scheduled => {
        TimerFired => Checking,
        Exhausted => Stopped,
        Stop => Stopped
    },
    Checking => {
        CheckSettled => Scheduled,
        Exhausted => Stopped,
        Stop => Stopped
    },
    Stopped => {
        Start => Scheduled,
        Reset => Idle
    }
}

use poll_machine::Input as PollInput;
use poll_machine::State as PollMachineState;
use poll_machine::StateMachine as PollMachine;

/// Number of "session definitively absent" check results after which polling
/// stops early instead of waiting out the full retry budget.
const SESSION_MISSING_LIMIT: u32 = 2;

/// Injected async check invoked on every poll tick.
pub type SessionCheck = Arc<dyn Fn() -> BoxFuture<'static, SyncResult<()>> + Send + Sync>;

/// Public view of the scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingStatus {
    /// Never started (or reset).
    Idle,
    /// A timer is armed or a check is running.
    Active,
    /// Explicitly stopped.
    Stopped,
    /// Stopped because the retry budget ran out or the session is
    /// definitively absent.
    Exhausted,
}

/// Configuration for polling backoff behavior.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Maximum number of poll attempts before giving up.
    pub max_retries: u32,
    /// Delay before the first attempt.
    pub base_interval: Duration,
    /// Cap on the backed-off delay.
    pub max_interval: Duration,
    /// Backoff multiplier applied per attempt.
    pub backoff_multiplier: u32,
    /// Route paths where polling is permitted. Polling is deliberately not
    /// global, to bound its cost.
    pub enabled_paths: Vec<String>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_interval: Duration::from_millis(2000),
            max_interval: Duration::from_millis(30000),
            backoff_multiplier: 2,
            enabled_paths: vec![
                "/login".to_string(),
                "/booking".to_string(),
                "/auth/verified".to_string(),
            ],
        }
    }
}

impl PollingConfig {
    /// Delay before the attempt following `retry_count` completed attempts:
    /// `min(base * multiplier^retry_count, max)`.
    pub fn interval_for_attempt(&self, retry_count: u32) -> Duration {
        let factor = u64::from(self.backoff_multiplier).saturating_pow(retry_count);
        let delay_ms = (self.base_interval.as_millis() as u64).saturating_mul(factor);
        let capped_ms = delay_ms.min(self.max_interval.as_millis() as u64);
        Duration::from_millis(capped_ms)
    }

    /// Whether polling is permitted for the given route and auth status.
    pub fn should_poll(&self, path: &str, status: AuthStatus) -> bool {
        if status.is_authenticated() {
            return false;
        }
        self.enabled_paths.iter().any(|p| p == path)
    }
}

/// In-memory polling counters; one instance per manager (i.e., per context).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollingSnapshot {
    /// Completed attempts. Never exceeds `max_retries`.
    pub retry_count: u32,
    /// "Session definitively absent" results seen so far.
    pub missing_count: u32,
    /// Epoch ms of the last attempt.
    pub last_attempt: Option<i64>,
    /// True once polling stopped by running out of budget (as opposed to an
    /// explicit stop).
    pub exhausted: bool,
}

/// Exponentially backed-off polling scheduler.
///
/// At most one polling task runs per scheduler; `start` on an active
/// scheduler is a no-op, `stop` and `reset` are idempotent. Starting a
/// stopped scheduler resumes with the counters it stopped at, so a spent
/// retry budget stays spent until `reset`.
pub struct PollingScheduler {
    config: PollingConfig,
    machine: Arc<Mutex<PollMachine>>,
    snapshot: Arc<Mutex<PollingSnapshot>>,
    /// Replaced on every start so a stale cancel permit cannot kill a new run.
    cancel: Mutex<Arc<Notify>>,
    check: SessionCheck,
}

impl PollingScheduler {
    pub fn new(config: PollingConfig, check: SessionCheck) -> Self {
        Self {
            config,
            machine: Arc::new(Mutex::new(PollMachine::new())),
            snapshot: Arc::new(Mutex::new(PollingSnapshot::default())),
            cancel: Mutex::new(Arc::new(Notify::new())),
            check,
        }
    }

    /// Begin (or resume) polling. No-op while a polling task is active.
    pub fn start(&self) {
        {
            let mut machine = self.machine.lock().expect("lock poisoned");
            if machine.consume(&PollInput::Start).is_err() {
                debug!(state = ?machine.state(), "Polling start ignored");
                return;
            }
        }

        let cancel = Arc::new(Notify::new());
        *self.cancel.lock().expect("lock poisoned") = cancel.clone();

        let machine = self.machine.clone();
        let snapshot = self.snapshot.clone();
        let config = self.config.clone();
        let check = self.check.clone();
        tokio::spawn(async move {
            run_poll_loop(config, machine, snapshot, cancel, check).await;
        });
    }

    /// Cancel the pending timer and mark the scheduler inactive. Idempotent.
    pub fn stop(&self) {
        {
            let mut machine = self.machine.lock().expect("lock poisoned");
            if machine.consume(&PollInput::Stop).is_ok() {
                debug!("Polling stopped");
            }
        }
        self.cancel.lock().expect("lock poisoned").notify_one();
    }

    /// Stop and zero all counters, returning the scheduler to idle.
    pub fn reset(&self) {
        self.stop();
        *self.snapshot.lock().expect("lock poisoned") = PollingSnapshot::default();
        let mut machine = self.machine.lock().expect("lock poisoned");
        let _ = machine.consume(&PollInput::Reset);
    }

    pub fn status(&self) -> PollingStatus {
        let machine_state = self.machine.lock().expect("lock poisoned").state().clone();
        match machine_state {
            PollMachineState::Idle => PollingStatus::Idle,
            PollMachineState::Scheduled | PollMachineState::Checking => PollingStatus::Active,
            PollMachineState::Stopped => {
                if self.snapshot.lock().expect("lock poisoned").exhausted {
                    PollingStatus::Exhausted
                } else {
                    PollingStatus::Stopped
                }
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.status() == PollingStatus::Active
    }

    /// True once polling gave up (retry budget spent or session definitively
    /// absent). This is the signal the UI gets instead of an error.
    pub fn is_exhausted(&self) -> bool {
        self.status() == PollingStatus::Exhausted
    }

    pub fn snapshot(&self) -> PollingSnapshot {
        self.snapshot.lock().expect("lock poisoned").clone()
    }

    pub fn should_poll(&self, path: &str, status: AuthStatus) -> bool {
        self.config.should_poll(path, status)
    }

    pub fn config(&self) -> &PollingConfig {
        &self.config
    }
}

async fn run_poll_loop(
    config: PollingConfig,
    machine: Arc<Mutex<PollMachine>>,
    snapshot: Arc<Mutex<PollingSnapshot>>,
    cancel: Arc<Notify>,
    check: SessionCheck,
) {
    loop {
        let retry_count = snapshot.lock().expect("lock poisoned").retry_count;
        if retry_count >= config.max_retries {
            exhaust(&machine, &snapshot, "retry budget spent");
            break;
        }

        let interval = config.interval_for_attempt(retry_count);
        debug!(retry_count, interval_ms = interval.as_millis() as u64, "Polling timer armed");
        tokio::select! {
            biased;
            _ = cancel.notified() => break,
            _ = sleep(interval) => {}
        }

        // A concurrent stop may have landed while the timer was pending.
        if machine
            .lock()
            .expect("lock poisoned")
            .consume(&PollInput::TimerFired)
            .is_err()
        {
            break;
        }

        {
            let mut snap = snapshot.lock().expect("lock poisoned");
            snap.retry_count += 1;
            snap.last_attempt = Some(Utc::now().timestamp_millis());
        }

        match (check)().await {
            Ok(()) => {}
            Err(e) if e.is_session_missing() => {
                let missing = {
                    let mut snap = snapshot.lock().expect("lock poisoned");
                    snap.missing_count += 1;
                    snap.missing_count
                };
                debug!(occurrences = missing, "Session check reported no session");
                if missing >= SESSION_MISSING_LIMIT {
                    exhaust(&machine, &snapshot, "session definitively absent");
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "Session check failed; continuing backoff");
            }
        }

        if machine
            .lock()
            .expect("lock poisoned")
            .consume(&PollInput::CheckSettled)
            .is_err()
        {
            break;
        }
    }
}

fn exhaust(machine: &Mutex<PollMachine>, snapshot: &Mutex<PollingSnapshot>, reason: &str) {
    let mut machine = machine.lock().expect("lock poisoned");
    if machine.consume(&PollInput::Exhausted).is_ok() {
        snapshot.lock().expect("lock poisoned").exhausted = true;
        info!(reason, "Polling exhausted");
    }
}
