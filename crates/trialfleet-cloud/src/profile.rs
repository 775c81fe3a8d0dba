//! Provider capability profiles.
//!
//! A profile describes what a provider can provision: regions, cluster types,
//! stack versions, instance types, and how clusters are placed on the
//! provider's network. The resolver consults the [`ProviderRegistry`] to fill
//! in defaults and reject unsupported values.

use std::collections::BTreeMap;
use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use trialfleet_core::CloudProvider;

use crate::error::{CloudError, Result, ValidationError};

/// Node roles within a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// Head (master) nodes.
    Head,
    /// Worker (core) nodes.
    Worker,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Head => f.write_str("head"),
            Self::Worker => f.write_str("worker"),
        }
    }
}

/// One rule for accepting an instance type.
#[derive(Debug, Clone)]
pub enum InstanceMatcher {
    /// Case-insensitive equality.
    Exact(String),
    /// Case-insensitive whole-string regular expression.
    Pattern(Regex),
}

impl InstanceMatcher {
    /// An exact-name matcher.
    #[must_use]
    pub fn exact(name: impl Into<String>) -> Self {
        Self::Exact(name.into())
    }

    /// A pattern matcher. The pattern is anchored at both ends.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern does not compile.
    pub fn pattern(pattern: &str) -> Result<Self> {
        // Whole-string match: "r5.2xlarge-extra" is not an r5.2xlarge.
        RegexBuilder::new(&format!("^(?:{pattern})$"))
            .case_insensitive(true)
            .build()
            .map(Self::Pattern)
            .map_err(|e| CloudError::Config(format!("invalid instance pattern {pattern:?}: {e}")))
    }

    /// Whether `instance_type` is accepted.
    #[must_use]
    pub fn matches(&self, instance_type: &str) -> bool {
        match self {
            Self::Exact(name) => name.eq_ignore_ascii_case(instance_type),
            Self::Pattern(re) => re.is_match(instance_type),
        }
    }
}

/// Where a cluster lands on the provider's network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPlan {
    /// Virtual network identifier.
    pub vpc_id: String,
    /// Preferred availability zone.
    pub availability_zone: String,
    /// Preferred subnet.
    pub subnet_id: String,
}

/// How a provider chooses a network for a region.
#[derive(Debug, Clone)]
pub enum NetworkPlacement {
    /// The same network regardless of region.
    Fixed(NetworkPlan),
    /// A network per region; other regions cannot be placed.
    PerRegion(BTreeMap<String, NetworkPlan>),
    /// Placement is not configured for this provider.
    Unavailable,
}

impl NetworkPlacement {
    /// Choose the network for `region`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NetworkUnavailable` if nothing is configured
    /// for the region.
    pub fn place(
        &self,
        provider: CloudProvider,
        region: &str,
    ) -> std::result::Result<NetworkPlan, ValidationError> {
        let plan = match self {
            Self::Fixed(plan) => Some(plan),
            Self::PerRegion(plans) => plans.get(region),
            Self::Unavailable => None,
        };
        plan.cloned().ok_or_else(|| ValidationError::NetworkUnavailable {
            provider,
            region: region.to_string(),
        })
    }
}

/// A region a provider serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Name used in API calls.
    pub code: String,
    /// Human-readable name.
    pub display_name: String,
}

impl Region {
    fn new(code: &str, display_name: &str) -> Self {
        Self {
            code: code.to_string(),
            display_name: display_name.to_string(),
        }
    }
}

/// Everything the resolver needs to know about one provider.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    /// Provider this profile describes.
    pub provider: CloudProvider,
    /// Region used when a plan names none.
    pub default_region: String,
    /// Regions the provider serves.
    pub regions: Vec<Region>,
    /// Cluster type used for the `DEFAULT` sentinel.
    pub default_cluster_type: String,
    /// Cluster types the provider offers.
    pub cluster_types: Vec<String>,
    /// Stack versions the provider offers.
    pub stack_versions: Vec<String>,
    /// Version used for the `LATEST` sentinel.
    pub latest_version: String,
    /// Version used for the `STABLE` sentinel.
    pub stable_version: String,
    /// Head node type used when none is given.
    pub default_head_node_type: String,
    /// Worker node type used when none is given.
    pub default_worker_node_type: String,
    /// Accepted instance types; any single match suffices.
    pub instance_matchers: Vec<InstanceMatcher>,
    /// Network placement.
    pub network: NetworkPlacement,
}

impl ProviderProfile {
    /// The stock Amazon EMR profile.
    ///
    /// # Errors
    ///
    /// Returns an error if an instance pattern fails to compile.
    pub fn emr() -> Result<Self> {
        Ok(Self {
            provider: CloudProvider::Emr,
            default_region: "us-east-1".to_string(),
            regions: vec![
                Region::new("us-east-1", "US East (N. Virginia)"),
                Region::new("us-east-2", "US East (Ohio)"),
                Region::new("us-west-1", "US West (N. California)"),
                Region::new("us-west-2", "US West (Oregon)"),
            ],
            default_cluster_type: "HADOOP".to_string(),
            cluster_types: vec!["HADOOP".to_string()],
            stack_versions: ["5.29.0", "5.28.1", "5.28.0", "5.27.0"]
                .map(String::from)
                .to_vec(),
            latest_version: "5.29.0".to_string(),
            stable_version: "5.28.1".to_string(),
            default_head_node_type: "r5.2xlarge".to_string(),
            default_worker_node_type: "c5.2xlarge".to_string(),
            instance_matchers: vec![
                InstanceMatcher::exact("m3.xlarge"),
                InstanceMatcher::exact("m3.2xlarge"),
                InstanceMatcher::pattern(r"[cdghimprsz]{1,2}\d[adns]?\.\d*x?(medium|large)")?,
            ],
            network: NetworkPlacement::Fixed(NetworkPlan {
                vpc_id: "vpc-c3d079a4".to_string(),
                availability_zone: "us-east-1c".to_string(),
                subnet_id: "subnet-e54410cf".to_string(),
            }),
        })
    }

    /// The stock Azure `HDInsight` profile.
    ///
    /// # Errors
    ///
    /// Returns an error if an instance pattern fails to compile.
    pub fn hdi() -> Result<Self> {
        Ok(Self {
            provider: CloudProvider::Hdi,
            default_region: "East US".to_string(),
            regions: vec![
                Region::new("East US", "East US"),
                Region::new("Central US", "Central US"),
                Region::new("West Central US", "West Central US"),
                Region::new("West US", "West US"),
            ],
            default_cluster_type: "HADOOP".to_string(),
            cluster_types: [
                "HADOOP",
                "SPARK",
                "INTERACTIVE_QUERY",
                "KAFKA",
                "STORM",
                "HBASE",
            ]
            .map(String::from)
            .to_vec(),
            stack_versions: vec!["4.0".to_string(), "3.6".to_string()],
            latest_version: "4.0".to_string(),
            stable_version: "4.0".to_string(),
            default_head_node_type: "A8 v2".to_string(),
            default_worker_node_type: "D4 v2".to_string(),
            instance_matchers: vec![
                InstanceMatcher::exact("E2 v3"),
                InstanceMatcher::pattern(r"[ADEF]\d+m?( v\d+)?")?,
            ],
            network: NetworkPlacement::Unavailable,
        })
    }

    /// Whether the provider serves `region`.
    #[must_use]
    pub fn supports_region(&self, region: &str) -> bool {
        self.regions.iter().any(|r| r.code == region)
    }

    /// Whether the provider offers `cluster_type` (case-insensitive).
    #[must_use]
    pub fn supports_cluster_type(&self, cluster_type: &str) -> bool {
        self.cluster_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(cluster_type))
    }

    /// Whether the provider offers exactly `version`.
    #[must_use]
    pub fn supports_version(&self, version: &str) -> bool {
        self.stack_versions.iter().any(|v| v == version)
    }

    /// Whether any matcher accepts `instance_type`.
    #[must_use]
    pub fn supports_instance_type(&self, instance_type: &str) -> bool {
        self.instance_matchers
            .iter()
            .any(|m| m.matches(instance_type))
    }

    /// The default instance type for a role.
    #[must_use]
    pub fn default_node_type(&self, role: NodeRole) -> &str {
        match role {
            NodeRole::Head => &self.default_head_node_type,
            NodeRole::Worker => &self.default_worker_node_type,
        }
    }
}

/// Capability profiles keyed by provider.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    profiles: BTreeMap<CloudProvider, ProviderProfile>,
}

impl ProviderRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the stock EMR and HDI profiles.
    ///
    /// # Errors
    ///
    /// Returns an error if a stock profile fails to build.
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        registry.insert(ProviderProfile::emr()?);
        registry.insert(ProviderProfile::hdi()?);
        Ok(registry)
    }

    /// Add or replace the profile for its provider.
    pub fn insert(&mut self, profile: ProviderProfile) {
        self.profiles.insert(profile.provider, profile);
    }

    /// The profile for `provider`, if registered.
    #[must_use]
    pub fn get(&self, provider: CloudProvider) -> Option<&ProviderProfile> {
        self.profiles.get(&provider)
    }

    /// Parse a provider name and look up its profile.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::UnknownProvider` if the name is not a
    /// supported provider or has no registered profile.
    pub fn lookup(&self, name: &str) -> std::result::Result<&ProviderProfile, ValidationError> {
        name.parse::<CloudProvider>()
            .ok()
            .and_then(|provider| self.get(provider))
            .ok_or_else(|| ValidationError::UnknownProvider(name.to_string()))
    }
}
