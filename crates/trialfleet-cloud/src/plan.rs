//! Provider-agnostic cluster plans.
//!
//! A [`ClusterPlan`] is the in-memory form of a stored `ClusterSpec` that the
//! resolver fills in and the gateway provisions from.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use trialfleet_core::{CloudProvider, ClusterSpecId};
use trialfleet_store::ClusterSpec;

use crate::error::ValidationError;
use crate::profile::NetworkPlan;

/// Services a cluster can be asked to run.
pub const SERVICES: &[&str] = &[
    "Airflow",
    "Ambari",
    "Hadoop",
    "Ganglia",
    "HBase",
    "HCatalog",
    "Hive",
    "Hue",
    "Impala",
    "Mahout",
    "Oozie",
    "Phoenix",
    "Presto",
    "HDFS",
    "Spark",
    "Livy",
    "Sqoop",
    "Superset",
    "TensorFlow",
    "Tez",
    "Zeppelin",
    "ZooKeeper",
];

/// Smallest volume the providers accept, in GiB.
pub const MIN_VOLUME_GB: u32 = 5;

/// Tag key every cluster carries naming its owner.
pub const OWNER_TAG: &str = "Owner";

/// Tag key the gateway sets to the cluster name.
pub const NAME_TAG: &str = "Name";

fn tag_value_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9\s_.:/=+\\-]+$").ok())
        .as_ref()
}

/// Parse a comma-delimited service list against [`SERVICES`].
///
/// Matching ignores case and surrounding whitespace; unknown names and
/// duplicates are dropped. Returned names use the catalog spelling.
#[must_use]
pub fn parse_services(list: &str) -> Vec<String> {
    let mut services: Vec<String> = Vec::new();
    for name in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if let Some(known) = SERVICES.iter().find(|s| s.eq_ignore_ascii_case(name)) {
            if !services.iter().any(|s| s == known) {
                services.push((*known).to_string());
            }
        } else {
            tracing::debug!(service = name, "Ignoring unknown service");
        }
    }
    services
}

/// How the effective stack version was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionKind {
    /// The provider's newest release.
    Latest,
    /// The provider's recommended release.
    Stable,
    /// A release named explicitly.
    Specific,
}

/// A cluster specification on its way to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterPlan {
    /// Spec the plan was built from.
    pub spec_id: ClusterSpecId,
    /// Provider name as requested.
    pub provider_name: String,
    /// Parsed provider; set by resolution.
    pub provider: Option<CloudProvider>,
    /// Region; filled with the provider default when absent.
    pub region: Option<String>,
    /// User the cluster is provisioned for.
    pub user: Option<String>,
    /// Name to create the cluster under.
    pub cluster_name: String,
    /// Cluster topology, possibly the `DEFAULT` sentinel before resolution.
    pub cluster_type: String,
    /// Stack version as requested, possibly a sentinel.
    pub requested_version: String,
    /// How the effective version was chosen; set by resolution.
    pub version_kind: Option<VersionKind>,
    /// Concrete stack version; set by resolution.
    pub stack_version: Option<String>,
    /// Head node instance type.
    pub head_node_type: Option<String>,
    /// Worker node instance type.
    pub worker_node_type: Option<String>,
    /// Number of head nodes.
    pub head_node_count: u32,
    /// Number of worker nodes.
    pub worker_node_count: u32,
    /// Root volume size in GiB.
    pub root_volume_gb: u32,
    /// Master volume size in GiB.
    pub master_volume_gb: u32,
    /// Worker volume size in GiB.
    pub worker_volume_gb: u32,
    /// High availability.
    pub high_availability: bool,
    /// SSL.
    pub ssl: bool,
    /// Kerberos.
    pub kerberos: bool,
    /// Known services to install.
    pub services: Vec<String>,
    /// Bootstrap action reference.
    pub bootstrap_action: Option<String>,
    /// Tags applied to the cluster.
    pub tags: BTreeMap<String, String>,
    /// Network placement; set by resolution.
    pub network: Option<NetworkPlan>,
}

impl ClusterPlan {
    /// Build an unresolved plan from a stored spec.
    #[must_use]
    pub fn from_spec(spec: &ClusterSpec) -> Self {
        let user = Some(spec.user.trim().to_string()).filter(|u| !u.is_empty());
        let region = spec
            .region
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(String::from);

        let mut tags = spec.tags.clone();
        if let Some(user) = &user {
            tags.insert(OWNER_TAG.to_string(), user.clone());
        }

        let cluster_name = spec
            .cluster_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("trialfleet-{}", spec.spec_id));

        Self {
            spec_id: spec.spec_id,
            provider_name: spec.cloud_provider.trim().to_string(),
            provider: None,
            region,
            user,
            cluster_name,
            cluster_type: spec.cluster_type.trim().to_uppercase(),
            requested_version: spec.stack_version.trim().to_string(),
            version_kind: None,
            stack_version: None,
            head_node_type: spec.head_node_type.clone(),
            worker_node_type: spec.worker_node_type.clone(),
            head_node_count: spec.head_node_count,
            worker_node_count: spec.worker_node_count,
            root_volume_gb: spec.root_volume_gb,
            master_volume_gb: spec.master_volume_gb,
            worker_volume_gb: spec.worker_volume_gb,
            high_availability: spec.high_availability,
            ssl: spec.ssl,
            kerberos: spec.kerberos,
            services: parse_services(&spec.services),
            bootstrap_action: spec.bootstrap_action.clone(),
            tags,
            network: None,
        }
    }

    /// Check the field-level constraints every provider shares.
    ///
    /// Run after resolution, so the region check sees the substituted
    /// default.
    ///
    /// # Errors
    ///
    /// Returns the first failing constraint: missing user, missing region,
    /// no known services, a volume below [`MIN_VOLUME_GB`], or a tag value
    /// outside the allowed character set.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.user.is_none() {
            return Err(ValidationError::MissingField("user"));
        }
        if self.region.is_none() {
            return Err(ValidationError::MissingField("region"));
        }
        if self.services.is_empty() {
            return Err(ValidationError::NoServices);
        }

        for (volume, size_gb) in [
            ("root", self.root_volume_gb),
            ("master", self.master_volume_gb),
            ("worker", self.worker_volume_gb),
        ] {
            if size_gb < MIN_VOLUME_GB {
                return Err(ValidationError::VolumeTooSmall {
                    volume,
                    size_gb,
                    min_gb: MIN_VOLUME_GB,
                });
            }
        }

        for (key, value) in &self.tags {
            let valid = tag_value_pattern().is_some_and(|re| re.is_match(value));
            if !valid {
                return Err(ValidationError::InvalidTagValue {
                    key: key.clone(),
                    value: value.clone(),
                });
            }
        }

        Ok(())
    }

    /// JSON description stored on the realized cluster.
    #[must_use]
    pub fn to_config_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;

    pub(crate) fn sample_spec() -> ClusterSpec {
        let mut spec = ClusterSpec::new(ClusterSpecId::new(3), "EMR", "alice", Utc::now());
        spec.services = "hadoop, Spark,HIVE".to_string();
        spec
    }

    #[test]
    fn parse_services_normalizes() {
        assert_eq!(
            parse_services(" hive,SPARK , Nope,,spark"),
            vec!["Hive".to_string(), "Spark".to_string()]
        );
        assert!(parse_services("").is_empty());
    }

    #[test]
    fn from_spec_fills_owner_and_name() {
        let plan = ClusterPlan::from_spec(&sample_spec());
        assert_eq!(plan.user.as_deref(), Some("alice"));
        assert_eq!(plan.tags.get(OWNER_TAG).map(String::as_str), Some("alice"));
        assert_eq!(plan.cluster_name, "trialfleet-3");
        assert_eq!(plan.services, vec!["Hadoop", "Spark", "Hive"]);
        assert_eq!(plan.provider, None);
        assert_eq!(plan.network, None);
    }

    #[test]
    fn validate_accepts_resolved_plan() {
        let mut plan = ClusterPlan::from_spec(&sample_spec());
        plan.region = Some("us-east-1".to_string());
        assert_eq!(plan.validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_missing_fields() {
        let mut spec = sample_spec();
        spec.user = "  ".to_string();
        let mut plan = ClusterPlan::from_spec(&spec);
        plan.region = Some("us-east-1".to_string());
        assert_eq!(plan.validate(), Err(ValidationError::MissingField("user")));

        let plan = ClusterPlan::from_spec(&sample_spec());
        assert_eq!(plan.validate(), Err(ValidationError::MissingField("region")));

        let mut spec = sample_spec();
        spec.services = "Cobol".to_string();
        let mut plan = ClusterPlan::from_spec(&spec);
        plan.region = Some("us-east-1".to_string());
        assert_eq!(plan.validate(), Err(ValidationError::NoServices));
    }

    #[test]
    fn validate_rejects_small_volumes() {
        let mut spec = sample_spec();
        spec.worker_volume_gb = 3;
        let mut plan = ClusterPlan::from_spec(&spec);
        plan.region = Some("us-east-1".to_string());

        let err = plan.validate().unwrap_err();
        assert_eq!(err.field(), "worker_volume_size");

        plan.worker_volume_gb = MIN_VOLUME_GB;
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_tag_values() {
        let mut spec = sample_spec();
        spec.tags
            .insert("Team".to_string(), "data-eng/ops: a=b+c".to_string());
        let mut plan = ClusterPlan::from_spec(&spec);
        plan.region = Some("us-east-1".to_string());
        assert!(plan.validate().is_ok());

        plan.tags.insert("Cost".to_string(), "$$$".to_string());
        assert!(matches!(
            plan.validate(),
            Err(ValidationError::InvalidTagValue { key, .. }) if key == "Cost"
        ));
    }
}
