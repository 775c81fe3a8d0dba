//! Engine configuration.

use std::str::FromStr;
use std::time::Duration;

/// Configuration for admission, provisioning, and the tick cadence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlConfig {
    /// Ceiling on nodes in `Launched`, `Ready`, or `Expired`.
    pub max_active_nodes: usize,
    /// Ceiling on other pending trials from one company.
    pub max_trials_per_company: usize,
    /// Ceiling on other pending trials from one email address.
    pub max_trials_per_email: usize,
    /// Ceiling on trial requests received in the trailing minute.
    pub max_requests_per_minute: usize,
    /// TTL for resources whose spec carries none.
    pub default_ttl_hours: u32,
    /// TTL for resources provisioned for a trial.
    pub free_trial_ttl_hours: u32,
    /// Pause between the end of one tick and the start of the next.
    pub tick_interval_seconds: u64,
    /// Internal company exempt from the per-company ceiling.
    pub exempt_company: String,
    /// Internal email domain exempt from the per-email ceiling.
    pub exempt_email_domain: String,
    /// Release installed on trial nodes.
    pub software_version: String,
    /// Tarball the release is installed from.
    pub software_tarball: String,
    /// Database version installed alongside the release.
    pub database_version: String,
    /// User recorded on specs created for trials.
    pub trial_user: String,
    /// Services requested for trial clusters.
    pub default_services: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            max_active_nodes: 100,
            max_trials_per_company: 10,
            max_trials_per_email: 5,
            max_requests_per_minute: 10,
            default_ttl_hours: 72,
            free_trial_ttl_hours: 168, // 1 week
            tick_interval_seconds: 10,
            exempt_company: "unravel".to_string(),
            exempt_email_domain: "unraveldata.com".to_string(),
            software_version: "4.5.5.0".to_string(),
            software_tarball: "unravel-4.5.5.0.tar.gz".to_string(),
            database_version: "5.7".to_string(),
            trial_user: "free_trial".to_string(),
            default_services: "Hadoop,Spark,Hive".to_string(),
        }
    }
}

impl ControlConfig {
    /// Load configuration from `TRIALFLEET_*` environment variables.
    ///
    /// Unset variables keep their defaults; unparseable ones are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        parse_into(&lookup, "TRIALFLEET_MAX_ACTIVE_NODES", &mut config.max_active_nodes);
        parse_into(
            &lookup,
            "TRIALFLEET_MAX_TRIALS_PER_COMPANY",
            &mut config.max_trials_per_company,
        );
        parse_into(
            &lookup,
            "TRIALFLEET_MAX_TRIALS_PER_EMAIL",
            &mut config.max_trials_per_email,
        );
        parse_into(
            &lookup,
            "TRIALFLEET_MAX_REQUESTS_PER_MINUTE",
            &mut config.max_requests_per_minute,
        );
        parse_into(&lookup, "TRIALFLEET_DEFAULT_TTL_HOURS", &mut config.default_ttl_hours);
        parse_into(
            &lookup,
            "TRIALFLEET_FREE_TRIAL_TTL_HOURS",
            &mut config.free_trial_ttl_hours,
        );
        parse_into(
            &lookup,
            "TRIALFLEET_TICK_INTERVAL_SECONDS",
            &mut config.tick_interval_seconds,
        );
        if let Some(val) = lookup("TRIALFLEET_EXEMPT_COMPANY") {
            config.exempt_company = val;
        }
        if let Some(val) = lookup("TRIALFLEET_EXEMPT_EMAIL_DOMAIN") {
            config.exempt_email_domain = val;
        }

        config
    }

    /// The pause between ticks.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_seconds)
    }
}

fn parse_into<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    if let Some(val) = lookup(key) {
        if let Ok(n) = val.trim().parse() {
            *slot = n;
        } else {
            tracing::warn!(key, value = %val, "Ignoring unparseable configuration value");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let config = ControlConfig::default();
        assert_eq!(config.max_active_nodes, 100);
        assert_eq!(config.max_trials_per_company, 10);
        assert_eq!(config.max_trials_per_email, 5);
        assert_eq!(config.max_requests_per_minute, 10);
        assert_eq!(config.tick_interval(), Duration::from_secs(10));
    }

    #[test]
    fn overrides_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("TRIALFLEET_MAX_ACTIVE_NODES", "5"),
            ("TRIALFLEET_FREE_TRIAL_TTL_HOURS", " 24 "),
            ("TRIALFLEET_TICK_INTERVAL_SECONDS", "soon"),
            ("TRIALFLEET_EXEMPT_COMPANY", "acme"),
        ]
        .into_iter()
        .collect();

        let config = ControlConfig::from_lookup(|key| vars.get(key).map(ToString::to_string));
        assert_eq!(config.max_active_nodes, 5);
        assert_eq!(config.free_trial_ttl_hours, 24);
        assert_eq!(config.tick_interval_seconds, 10);
        assert_eq!(config.exempt_company, "acme");
        assert_eq!(config.exempt_email_domain, "unraveldata.com");
    }
}
