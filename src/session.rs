//! Presentation-side scan control.
//!
//! One [`ScanSession`] per UI session. It allows at most one scan in flight,
//! enforces the cooldown after a quota failure, discards results of scans that
//! were abandoned by a reset, and records successful results in the history.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::errors::{AUTH_SENTINEL, QUOTA_SENTINEL};
use crate::history::HistoryStore;
use crate::models::{AnalysisInput, AnalysisResult};

/// Wait imposed after a quota failure before the next scan.
pub const QUOTA_COOLDOWN: Duration = Duration::from_secs(60);

pub const QUOTA_MESSAGE: &str =
    "QUOTA_LIMIT: You've reached your free tier speed limit. Please wait 60 seconds.";
pub const AUTH_MESSAGE: &str =
    "AUTH_ERROR: Your API key is invalid or not activated. Check .env.";

/// Category of a failed scan, derived from the sentinels in its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Quota,
    Auth,
    Other,
}

/// A failed scan as the presentation layer sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ScanFailure {
    /// Classifies an error string returned by the analyze endpoint.
    pub fn from_error_message(message: &str) -> Self {
        if message.contains(QUOTA_SENTINEL) {
            Self {
                kind: FailureKind::Quota,
                message: QUOTA_MESSAGE.to_string(),
            }
        } else if message.contains(AUTH_SENTINEL) {
            Self {
                kind: FailureKind::Auth,
                message: AUTH_MESSAGE.to_string(),
            }
        } else {
            Self {
                kind: FailureKind::Other,
                message: message.to_string(),
            }
        }
    }
}

impl std::fmt::Display for ScanFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ScanFailure {}

/// Anything that can run an analysis on behalf of a session.
#[async_trait]
pub trait AnalyzeApi: Send + Sync {
    async fn analyze(&self, input: &AnalysisInput) -> Result<AnalysisResult, ScanFailure>;
}

/// Fixed-length wait window started by a quota failure.
#[derive(Debug, Clone)]
pub struct CooldownGate {
    duration: Duration,
    until: Option<Instant>,
}

impl Default for CooldownGate {
    fn default() -> Self {
        Self::new(QUOTA_COOLDOWN)
    }
}

impl CooldownGate {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            until: None,
        }
    }

    pub fn trigger(&mut self, now: Instant) {
        self.until = Some(now + self.duration);
    }

    /// Time left before scans are allowed again; zero when open.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_active(&self, now: Instant) -> bool {
        !self.remaining(now).is_zero()
    }

    pub fn clear(&mut self) {
        self.until = None;
    }
}

/// Why a scan could not start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanRejection {
    InFlight,
    CoolingDown { remaining: Duration },
}

impl std::fmt::Display for ScanRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanRejection::InFlight => write!(f, "A scan is already running"),
            ScanRejection::CoolingDown { remaining } => write!(
                f,
                "Rate limit cooldown active, retry in {}s",
                remaining.as_secs().max(1)
            ),
        }
    }
}

/// Proof that a scan was started in a given session generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTicket {
    generation: u64,
}

/// What happened to a finished scan.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Applied(AnalysisResult),
    Failed(ScanFailure),
    /// The session was reset while the scan was running.
    Discarded,
}

/// What the presentation layer should currently show.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewState {
    Idle,
    Loading,
    Showing(AnalysisResult),
    Failed(String),
}

#[derive(Debug)]
pub struct ScanSession {
    generation: u64,
    in_flight: bool,
    cooldown: CooldownGate,
    history: HistoryStore,
    view: ViewState,
}

impl ScanSession {
    pub fn new(history: HistoryStore) -> Self {
        Self {
            generation: 0,
            in_flight: false,
            cooldown: CooldownGate::default(),
            history,
            view: ViewState::Idle,
        }
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn is_scanning(&self) -> bool {
        self.in_flight
    }

    pub fn cooldown_remaining(&self, now: Instant) -> Duration {
        self.cooldown.remaining(now)
    }

    /// Starts a scan unless one is running or the cooldown is active.
    pub fn begin(&mut self, now: Instant) -> Result<ScanTicket, ScanRejection> {
        if self.in_flight {
            return Err(ScanRejection::InFlight);
        }
        let remaining = self.cooldown.remaining(now);
        if !remaining.is_zero() {
            return Err(ScanRejection::CoolingDown { remaining });
        }

        self.in_flight = true;
        self.view = ViewState::Loading;
        Ok(ScanTicket {
            generation: self.generation,
        })
    }

    /// Applies the outcome of the scan identified by `ticket`.
    ///
    /// Outcomes of scans started before the last [`reset`](Self::reset) are
    /// dropped without touching the view, the cooldown or the history.
    pub fn finish(
        &mut self,
        ticket: ScanTicket,
        outcome: Result<AnalysisResult, ScanFailure>,
        now: Instant,
    ) -> ScanOutcome {
        if ticket.generation != self.generation {
            tracing::debug!(
                "Discarding result of abandoned scan (generation {} < {})",
                ticket.generation,
                self.generation
            );
            return ScanOutcome::Discarded;
        }
        self.in_flight = false;

        match outcome {
            Ok(result) => {
                self.history.insert(result.clone());
                if let Err(e) = self.history.save() {
                    tracing::warn!("Failed to persist history: {:#}", e);
                }
                self.view = ViewState::Showing(result.clone());
                ScanOutcome::Applied(result)
            }
            Err(failure) => {
                if failure.kind == FailureKind::Quota {
                    self.cooldown.trigger(now);
                    tracing::warn!("Quota failure, cooling down for {:?}", QUOTA_COOLDOWN);
                }
                self.view = ViewState::Failed(failure.message.clone());
                ScanOutcome::Failed(failure)
            }
        }
    }

    /// Returns to the idle state. Any scan in flight is abandoned and its
    /// result will be discarded; the cooldown is cleared.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.in_flight = false;
        self.cooldown.clear();
        self.view = ViewState::Idle;
    }

    /// Shows a remembered result. Returns false if the company is unknown.
    pub fn show_from_history(&mut self, company_name: &str) -> bool {
        match self.history.get(company_name) {
            Some(result) => {
                self.view = ViewState::Showing(result.clone());
                true
            }
            None => false,
        }
    }

    pub fn clear_history(&mut self) -> anyhow::Result<()> {
        self.history.clear()
    }
}

/// Runs one scan for `session` through `api`.
///
/// The session lock is only held to start and to finish the scan, never
/// across the network call, so a reset can land while the scan is running.
pub async fn run_scan<A>(
    session: &Mutex<ScanSession>,
    api: &A,
    input: &AnalysisInput,
) -> Result<ScanOutcome, ScanRejection>
where
    A: AnalyzeApi + ?Sized,
{
    let ticket = lock(session).begin(Instant::now())?;
    let outcome = api.analyze(input).await;
    Ok(lock(session).finish(ticket, outcome, Instant::now()))
}

fn lock(session: &Mutex<ScanSession>) -> std::sync::MutexGuard<'_, ScanSession> {
    session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Verdict;

    fn result(company: &str, score: u8) -> AnalysisResult {
        AnalysisResult {
            company_name: company.to_string(),
            summary: "s".to_string(),
            risk_score: score,
            verdict: Verdict::Risky,
            critical_points: vec![],
            expert_opinion: "o".to_string(),
        }
    }

    fn quota_failure() -> ScanFailure {
        ScanFailure::from_error_message("QUOTA_LIMIT: upstream said 429")
    }

    #[test]
    fn test_failure_classification() {
        let quota = quota_failure();
        assert_eq!(quota.kind, FailureKind::Quota);
        assert!(quota.message.contains("QUOTA_LIMIT"));

        let auth = ScanFailure::from_error_message("AUTH_ERROR: bad key");
        assert_eq!(auth.kind, FailureKind::Auth);
        assert_eq!(auth.message, AUTH_MESSAGE);

        let other = ScanFailure::from_error_message("Model did not return valid JSON");
        assert_eq!(other.kind, FailureKind::Other);
        assert_eq!(other.message, "Model did not return valid JSON");
    }

    #[test]
    fn test_only_one_scan_in_flight() {
        let mut session = ScanSession::new(HistoryStore::in_memory());
        let now = Instant::now();

        let _ticket = session.begin(now).unwrap();
        assert_eq!(session.begin(now), Err(ScanRejection::InFlight));
        assert_eq!(session.view(), &ViewState::Loading);
    }

    #[test]
    fn test_quota_failure_starts_sixty_second_cooldown() {
        let mut session = ScanSession::new(HistoryStore::in_memory());
        let now = Instant::now();

        let ticket = session.begin(now).unwrap();
        let outcome = session.finish(ticket, Err(quota_failure()), now);
        assert!(matches!(outcome, ScanOutcome::Failed(ref f) if f.kind == FailureKind::Quota));

        assert_eq!(session.cooldown_remaining(now), QUOTA_COOLDOWN);
        assert_eq!(
            session.begin(now + Duration::from_secs(59)),
            Err(ScanRejection::CoolingDown {
                remaining: Duration::from_secs(1)
            })
        );
        assert!(session.begin(now + Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn test_other_failures_do_not_cool_down() {
        let mut session = ScanSession::new(HistoryStore::in_memory());
        let now = Instant::now();

        let ticket = session.begin(now).unwrap();
        session.finish(
            ticket,
            Err(ScanFailure::from_error_message("AUTH_ERROR: nope")),
            now,
        );

        assert!(session.cooldown_remaining(now).is_zero());
        assert_eq!(session.view(), &ViewState::Failed(AUTH_MESSAGE.to_string()));
        assert!(session.begin(now).is_ok());
    }

    #[test]
    fn test_reset_discards_late_result_and_clears_cooldown() {
        let mut session = ScanSession::new(HistoryStore::in_memory());
        let now = Instant::now();

        let stale = session.begin(now).unwrap();
        session.reset();
        let fresh = session.begin(now).unwrap();

        assert_eq!(
            session.finish(stale, Ok(result("Old", 10)), now),
            ScanOutcome::Discarded
        );
        assert!(session.history().is_empty());
        assert_eq!(session.view(), &ViewState::Loading);
        assert!(session.is_scanning());

        let outcome = session.finish(fresh, Ok(result("New", 20)), now);
        assert!(matches!(outcome, ScanOutcome::Applied(_)));
        assert_eq!(session.history().entries()[0].company_name, "New");

        let ticket = session.begin(now).unwrap();
        session.finish(ticket, Err(quota_failure()), now);
        session.reset();
        assert!(session.cooldown_remaining(now).is_zero());
    }

    #[test]
    fn test_success_updates_history_and_view() {
        let mut session = ScanSession::new(HistoryStore::in_memory());
        let now = Instant::now();

        for score in [30, 75] {
            let ticket = session.begin(now).unwrap();
            session.finish(ticket, Ok(result("Acme", score)), now);
        }

        assert_eq!(session.history().len(), 1);
        assert_eq!(session.history().entries()[0].risk_score, 75);
        assert_eq!(session.view(), &ViewState::Showing(result("Acme", 75)));

        session.reset();
        assert!(session.show_from_history("Acme"));
        assert!(!session.show_from_history("Globex"));
        assert_eq!(session.view(), &ViewState::Showing(result("Acme", 75)));
    }
}
