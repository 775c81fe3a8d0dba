//! Admission control for trial requests.
//!
//! [`evaluate`] is a pure function of the candidate trial, an
//! [`AdmissionSnapshot`] of the store, and the configured ceilings. Checks run
//! in a fixed priority order and the first failing one names the denial.
//! Every ceiling is compared with `>`: a count equal to the ceiling passes.

use chrono::{DateTime, Duration, Utc};
use trialfleet_core::CloudProvider;
use trialfleet_store::{Node, Store, TrialRequest, TrialState};

use crate::config::ControlConfig;
use crate::error::Result;
use crate::lifecycle;

/// Window used for the request-rate ceiling.
pub const RATE_WINDOW_SECONDS: i64 = 60;

/// Reason recorded on approved trials.
pub const APPROVED: &str = "approved";

/// Read-only view of the store an admission decision is made against.
#[derive(Debug, Clone, Default)]
pub struct AdmissionSnapshot {
    /// Nodes in `Launched`, `Ready`, or `Expired`.
    pub active_nodes: usize,
    /// Every trial still `Pending`.
    pub pending_trials: Vec<TrialRequest>,
    /// Trials of any state created in the trailing rate window.
    pub recent_requests: usize,
}

impl AdmissionSnapshot {
    /// Capture a snapshot of `store` as of `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if a store query fails.
    pub fn capture<S: Store>(store: &S, now: DateTime<Utc>) -> Result<Self> {
        let active_nodes = store
            .list_by_states::<Node>(&lifecycle::ACTIVE_STATES)?
            .len();
        let pending_trials = store.list_by_state::<TrialRequest>(TrialState::Pending)?;
        let since = now - Duration::seconds(RATE_WINDOW_SECONDS);
        let recent_requests = store.list_created_after::<TrialRequest>(since)?.len();

        Ok(Self {
            active_nodes,
            pending_trials,
            recent_requests,
        })
    }

    /// Other pending trials from the candidate's company.
    #[must_use]
    pub fn pending_from_company(&self, candidate: &TrialRequest) -> usize {
        self.others(candidate)
            .filter(|t| t.company.trim().eq_ignore_ascii_case(candidate.company.trim()))
            .count()
    }

    /// Other pending trials from the candidate's email address.
    #[must_use]
    pub fn pending_from_email(&self, candidate: &TrialRequest) -> usize {
        self.others(candidate)
            .filter(|t| t.email.trim().eq_ignore_ascii_case(candidate.email.trim()))
            .count()
    }

    fn others<'a>(&'a self, candidate: &'a TrialRequest) -> impl Iterator<Item = &'a TrialRequest> {
        self.pending_trials
            .iter()
            .filter(move |t| t.trial_id != candidate.trial_id)
    }
}

/// The outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Whether the trial may proceed.
    pub approved: bool,
    /// Human-readable reason.
    pub reason: String,
}

impl Decision {
    fn approve() -> Self {
        Self {
            approved: true,
            reason: APPROVED.to_string(),
        }
    }

    fn deny(reason: String) -> Self {
        Self {
            approved: false,
            reason,
        }
    }
}

/// Decide whether `trial` may proceed.
///
/// In order: the provider must be supported, the active node count, the
/// per-company and per-email pending counts (each waived for the internal
/// company or domain), and the trailing-minute request count must not
/// exceed their ceilings.
#[must_use]
pub fn evaluate(
    trial: &TrialRequest,
    snapshot: &AdmissionSnapshot,
    config: &ControlConfig,
) -> Decision {
    if trial.cloud_provider.parse::<CloudProvider>().is_err() {
        return Decision::deny(format!(
            "unsupported cloud provider {:?}",
            trial.cloud_provider
        ));
    }

    if snapshot.active_nodes > config.max_active_nodes {
        return Decision::deny(format!(
            "active node ceiling exceeded: {} active nodes, ceiling is {}",
            snapshot.active_nodes, config.max_active_nodes
        ));
    }

    if !is_exempt_company(trial, config) {
        let count = snapshot.pending_from_company(trial);
        if count > config.max_trials_per_company {
            return Decision::deny(format!(
                "company trial ceiling exceeded: {count} pending trials from {:?}, ceiling is {}",
                trial.company, config.max_trials_per_company
            ));
        }
    }

    if !is_exempt_email(trial, config) {
        let count = snapshot.pending_from_email(trial);
        if count > config.max_trials_per_email {
            return Decision::deny(format!(
                "email trial ceiling exceeded: {count} pending trials from {:?}, ceiling is {}",
                trial.email, config.max_trials_per_email
            ));
        }
    }

    if snapshot.recent_requests > config.max_requests_per_minute {
        return Decision::deny(format!(
            "request rate ceiling exceeded: {} requests in the last minute, ceiling is {}",
            snapshot.recent_requests, config.max_requests_per_minute
        ));
    }

    Decision::approve()
}

fn is_exempt_company(trial: &TrialRequest, config: &ControlConfig) -> bool {
    trial
        .company
        .trim()
        .eq_ignore_ascii_case(config.exempt_company.trim())
}

fn is_exempt_email(trial: &TrialRequest, config: &ControlConfig) -> bool {
    trial
        .email
        .trim()
        .rsplit_once('@')
        .is_some_and(|(_, domain)| domain.eq_ignore_ascii_case(config.exempt_email_domain.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use trialfleet_core::TrialId;
    use trialfleet_store::NotifyCustomer;

    fn trial(id: u64, company: &str, email: &str) -> TrialRequest {
        TrialRequest {
            trial_id: TrialId::new(id),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            email: email.to_string(),
            company: company.to_string(),
            title: None,
            source_ip: Some("10.0.0.1".to_string()),
            cloud_provider: "EMR".to_string(),
            create_cluster: false,
            notify_customer: NotifyCustomer::None,
            created_at: Utc::now(),
            state: TrialState::Pending,
            decision_reason: None,
        }
    }

    /// `n` pending trials from Acme with distinct emails, plus the candidate.
    fn acme_snapshot(n: u64) -> (TrialRequest, AdmissionSnapshot) {
        let candidate = trial(1000, "Acme", "new@acme.com");
        let mut pending: Vec<_> = (1..=n)
            .map(|i| trial(i, "ACME", &format!("user{i}@acme.com")))
            .collect();
        pending.push(candidate.clone());
        let snapshot = AdmissionSnapshot {
            pending_trials: pending,
            ..AdmissionSnapshot::default()
        };
        (candidate, snapshot)
    }

    #[test]
    fn approves_fresh_trial() {
        let candidate = trial(1, "Initech", "peter@initech.com");
        let snapshot = AdmissionSnapshot {
            pending_trials: vec![candidate.clone()],
            recent_requests: 1,
            ..AdmissionSnapshot::default()
        };
        let decision = evaluate(&candidate, &snapshot, &ControlConfig::default());
        assert!(decision.approved);
        assert_eq!(decision.reason, APPROVED);
    }

    #[test]
    fn node_ceiling() {
        let candidate = trial(1, "Initech", "peter@initech.com");
        let config = ControlConfig::default();

        let at_ceiling = AdmissionSnapshot {
            active_nodes: 100,
            ..AdmissionSnapshot::default()
        };
        assert!(evaluate(&candidate, &at_ceiling, &config).approved);

        let over = AdmissionSnapshot {
            active_nodes: 101,
            ..AdmissionSnapshot::default()
        };
        let decision = evaluate(&candidate, &over, &config);
        assert!(!decision.approved);
        assert!(decision.reason.contains("node ceiling"));
    }

    #[test]
    fn company_ceiling_is_inclusive() {
        let config = ControlConfig::default();

        let (candidate, snapshot) = acme_snapshot(10);
        assert!(evaluate(&candidate, &snapshot, &config).approved);

        let (candidate, snapshot) = acme_snapshot(11);
        let decision = evaluate(&candidate, &snapshot, &config);
        assert!(!decision.approved);
        assert!(decision.reason.contains("company"));
    }

    #[test]
    fn exempt_company_bypasses_ceiling() {
        let config = ControlConfig::default();
        let candidate = trial(1000, "Unravel", "new@example.com");
        let pending = (1..=50)
            .map(|i| trial(i, "unravel", &format!("u{i}@example.com")))
            .collect();
        let snapshot = AdmissionSnapshot {
            pending_trials: pending,
            ..AdmissionSnapshot::default()
        };
        assert!(evaluate(&candidate, &snapshot, &config).approved);
    }

    #[test]
    fn email_ceiling_and_exempt_domain() {
        let config = ControlConfig::default();
        let pending = (1..=6)
            .map(|i| trial(i, &format!("Co{i}"), "Repeat@Example.com"))
            .collect();
        let snapshot = AdmissionSnapshot {
            pending_trials: pending,
            ..AdmissionSnapshot::default()
        };

        let candidate = trial(1000, "Fresh", "repeat@example.com");
        let decision = evaluate(&candidate, &snapshot, &config);
        assert!(!decision.approved);
        assert!(decision.reason.contains("email"));

        let pending = (1..=6)
            .map(|i| trial(i, &format!("Co{i}"), "ops@unraveldata.com"))
            .collect();
        let snapshot = AdmissionSnapshot {
            pending_trials: pending,
            ..AdmissionSnapshot::default()
        };
        let candidate = trial(1000, "Fresh", "ops@UnravelData.com");
        assert!(evaluate(&candidate, &snapshot, &config).approved);
    }

    #[test]
    fn request_rate_ceiling() {
        let config = ControlConfig::default();
        let candidate = trial(1, "Initech", "peter@initech.com");

        let snapshot = AdmissionSnapshot {
            recent_requests: 10,
            ..AdmissionSnapshot::default()
        };
        assert!(evaluate(&candidate, &snapshot, &config).approved);

        let snapshot = AdmissionSnapshot {
            recent_requests: 11,
            ..AdmissionSnapshot::default()
        };
        let decision = evaluate(&candidate, &snapshot, &config);
        assert!(!decision.approved);
        assert!(decision.reason.contains("rate"));
    }

    #[test]
    fn checks_run_in_priority_order() {
        let config = ControlConfig::default();
        let (candidate, mut snapshot) = acme_snapshot(20);
        snapshot.active_nodes = 500;
        snapshot.recent_requests = 500;

        let decision = evaluate(&candidate, &snapshot, &config);
        assert!(decision.reason.contains("node ceiling"));

        snapshot.active_nodes = 0;
        let decision = evaluate(&candidate, &snapshot, &config);
        assert!(decision.reason.contains("company"));
    }

    #[test]
    fn unsupported_provider_is_denied_first() {
        let mut candidate = trial(1, "Initech", "peter@initech.com");
        candidate.cloud_provider = "GCP".to_string();
        let snapshot = AdmissionSnapshot {
            active_nodes: 500,
            ..AdmissionSnapshot::default()
        };
        let decision = evaluate(&candidate, &snapshot, &ControlConfig::default());
        assert!(!decision.approved);
        assert!(decision.reason.starts_with("unsupported cloud provider"));
    }
}
