//! Provider default substitution and validation.
//!
//! [`resolve`] turns a partially specified [`ClusterPlan`] into one every
//! field of which the target provider supports. Each step substitutes the
//! provider default for a missing or sentinel value, then checks the
//! resulting value, so callers may omit anything.

use trialfleet_store::{DEFAULT_SENTINEL, LATEST_VERSION, STABLE_VERSION};

use crate::error::ValidationError;
use crate::plan::{ClusterPlan, VersionKind};
use crate::profile::{NodeRole, ProviderProfile, ProviderRegistry};

/// Resolve `plan` in place against the registry.
///
/// Steps run in order and stop at the first failure: provider, cluster type,
/// stack version, region, head and worker instance types, network placement.
/// Resolving an already resolved plan changes nothing.
///
/// # Errors
///
/// Returns a `ValidationError` naming the first unsupported field.
pub fn resolve(plan: &mut ClusterPlan, registry: &ProviderRegistry) -> Result<(), ValidationError> {
    let profile = registry.lookup(&plan.provider_name)?;
    plan.provider = Some(profile.provider);

    resolve_cluster_type(plan, profile)?;
    resolve_stack_version(plan, profile)?;
    let region = resolve_region(plan, profile)?;
    resolve_node_type(plan, profile, NodeRole::Head)?;
    resolve_node_type(plan, profile, NodeRole::Worker)?;

    plan.network = Some(profile.network.place(profile.provider, &region)?);

    tracing::debug!(
        spec_id = %plan.spec_id,
        provider = %profile.provider,
        region = %region,
        cluster_type = %plan.cluster_type,
        stack_version = plan.stack_version.as_deref().unwrap_or_default(),
        "Resolved cluster plan"
    );
    Ok(())
}

fn resolve_cluster_type(
    plan: &mut ClusterPlan,
    profile: &ProviderProfile,
) -> Result<(), ValidationError> {
    if plan.cluster_type.is_empty() || plan.cluster_type.eq_ignore_ascii_case(DEFAULT_SENTINEL) {
        plan.cluster_type.clone_from(&profile.default_cluster_type);
    } else if !profile.supports_cluster_type(&plan.cluster_type) {
        return Err(ValidationError::UnsupportedClusterType {
            provider: profile.provider,
            cluster_type: plan.cluster_type.clone(),
        });
    }
    Ok(())
}

fn resolve_stack_version(
    plan: &mut ClusterPlan,
    profile: &ProviderProfile,
) -> Result<(), ValidationError> {
    let requested = plan.requested_version.as_str();
    let (kind, version) = if requested.is_empty() || requested.eq_ignore_ascii_case(LATEST_VERSION)
    {
        (VersionKind::Latest, profile.latest_version.clone())
    } else if requested.eq_ignore_ascii_case(STABLE_VERSION) {
        (VersionKind::Stable, profile.stable_version.clone())
    } else if profile.supports_version(requested) {
        (VersionKind::Specific, requested.to_string())
    } else {
        return Err(ValidationError::UnsupportedStackVersion {
            provider: profile.provider,
            version: requested.to_string(),
        });
    };

    plan.version_kind = Some(kind);
    plan.stack_version = Some(version);
    Ok(())
}

fn resolve_region(
    plan: &mut ClusterPlan,
    profile: &ProviderProfile,
) -> Result<String, ValidationError> {
    let region = plan
        .region
        .get_or_insert_with(|| profile.default_region.clone())
        .clone();

    if profile.supports_region(&region) {
        Ok(region)
    } else {
        Err(ValidationError::UnsupportedRegion {
            provider: profile.provider,
            region,
        })
    }
}

fn resolve_node_type(
    plan: &mut ClusterPlan,
    profile: &ProviderProfile,
    role: NodeRole,
) -> Result<(), ValidationError> {
    let slot = match role {
        NodeRole::Head => &mut plan.head_node_type,
        NodeRole::Worker => &mut plan.worker_node_type,
    };

    let use_default = slot
        .as_deref()
        .map_or(true, |t| t.trim().is_empty() || t.eq_ignore_ascii_case(DEFAULT_SENTINEL));
    if use_default {
        *slot = Some(profile.default_node_type(role).to_string());
        return Ok(());
    }

    let instance_type = slot.as_deref().unwrap_or_default();
    if profile.supports_instance_type(instance_type) {
        Ok(())
    } else {
        Err(ValidationError::UnsupportedInstanceType {
            provider: profile.provider,
            role,
            instance_type: instance_type.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::tests::sample_spec;
    use trialfleet_core::CloudProvider;

    fn registry() -> ProviderRegistry {
        ProviderRegistry::builtin().unwrap()
    }

    fn emr_plan() -> ClusterPlan {
        ClusterPlan::from_spec(&sample_spec())
    }

    #[test]
    fn fills_every_default() {
        let mut plan = emr_plan();
        resolve(&mut plan, &registry()).unwrap();

        assert_eq!(plan.provider, Some(CloudProvider::Emr));
        assert_eq!(plan.cluster_type, "HADOOP");
        assert_eq!(plan.version_kind, Some(VersionKind::Latest));
        assert_eq!(plan.stack_version.as_deref(), Some("5.29.0"));
        assert_eq!(plan.region.as_deref(), Some("us-east-1"));
        assert_eq!(plan.head_node_type.as_deref(), Some("r5.2xlarge"));
        assert_eq!(plan.worker_node_type.as_deref(), Some("c5.2xlarge"));
        let network = plan.network.as_ref().unwrap();
        assert_eq!(network.vpc_id, "vpc-c3d079a4");
        assert_eq!(network.availability_zone, "us-east-1c");
        assert_eq!(network.subnet_id, "subnet-e54410cf");
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn resolving_twice_is_a_noop() {
        let registry = registry();
        let mut plan = emr_plan();
        plan.requested_version = "stable".to_string();
        plan.head_node_type = Some("DEFAULT".to_string());
        resolve(&mut plan, &registry).unwrap();
        let first = plan.clone();

        resolve(&mut plan, &registry).unwrap();
        assert_eq!(plan, first);
        assert_eq!(plan.stack_version.as_deref(), Some("5.28.1"));
        assert_eq!(plan.version_kind, Some(VersionKind::Stable));
    }

    #[test]
    fn specific_version_is_tagged() {
        let mut plan = emr_plan();
        plan.requested_version = "5.27.0".to_string();
        resolve(&mut plan, &registry()).unwrap();
        assert_eq!(plan.version_kind, Some(VersionKind::Specific));
        assert_eq!(plan.stack_version.as_deref(), Some("5.27.0"));
    }

    #[test]
    fn rejects_unknown_provider() {
        let mut plan = emr_plan();
        plan.provider_name = "DATAPROC".to_string();
        let err = resolve(&mut plan, &registry()).unwrap_err();
        assert_eq!(err, ValidationError::UnknownProvider("DATAPROC".to_string()));
        assert_eq!(err.field(), "cloud_provider");
    }

    #[test]
    fn rejects_unsupported_values_with_distinct_errors() {
        let registry = registry();

        let mut plan = emr_plan();
        plan.cluster_type = "KAFKA".to_string();
        let err = resolve(&mut plan, &registry).unwrap_err();
        assert_eq!(err.field(), "cluster_type");

        let mut plan = emr_plan();
        plan.requested_version = "4.0".to_string();
        let err = resolve(&mut plan, &registry).unwrap_err();
        assert_eq!(err.field(), "stack_version");

        let mut plan = emr_plan();
        plan.region = Some("eu-west-1".to_string());
        let err = resolve(&mut plan, &registry).unwrap_err();
        assert_eq!(err.field(), "region");

        let mut plan = emr_plan();
        plan.worker_node_type = Some("t2.micro".to_string());
        let err = resolve(&mut plan, &registry).unwrap_err();
        assert_eq!(err.field(), "worker_node_type");
        assert!(matches!(
            err,
            ValidationError::UnsupportedInstanceType {
                role: NodeRole::Worker,
                ..
            }
        ));
    }

    #[test]
    fn stops_at_first_failure() {
        let mut plan = emr_plan();
        plan.cluster_type = "STORM".to_string();
        plan.region = Some("nowhere".to_string());
        let err = resolve(&mut plan, &registry()).unwrap_err();
        assert_eq!(err.field(), "cluster_type");
        // Later steps never ran.
        assert_eq!(plan.stack_version, None);
        assert_eq!(plan.head_node_type, None);
    }

    #[test]
    fn hdi_resolves_until_network_placement() {
        let mut spec = sample_spec();
        spec.cloud_provider = "hdi".to_string();
        spec.cluster_type = "spark".to_string();
        spec.worker_node_type = Some("d12 v2".to_string());
        let mut plan = ClusterPlan::from_spec(&spec);

        let err = resolve(&mut plan, &registry()).unwrap_err();
        assert!(matches!(err, ValidationError::NetworkUnavailable { .. }));
        assert_eq!(plan.provider, Some(CloudProvider::Hdi));
        assert_eq!(plan.cluster_type, "SPARK");
        assert_eq!(plan.stack_version.as_deref(), Some("4.0"));
        assert_eq!(plan.region.as_deref(), Some("East US"));
        assert_eq!(plan.head_node_type.as_deref(), Some("A8 v2"));
    }
}
