//! Error types for the cloud crate.

use thiserror::Error;
use trialfleet_core::CloudProvider;

use crate::profile::NodeRole;

/// A cluster plan that cannot be provisioned as requested.
///
/// Every variant names the field that failed. These are never retried: the
/// plan has to change before it can succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provider name is not one of the supported providers.
    #[error("unsupported cloud provider: {0:?}")]
    UnknownProvider(String),

    /// The cluster type is not offered by the provider.
    #[error("cluster type {cluster_type:?} is not supported on {provider}")]
    UnsupportedClusterType {
        /// Provider the plan targets.
        provider: CloudProvider,
        /// Requested cluster type.
        cluster_type: String,
    },

    /// The stack version is not offered by the provider.
    #[error("stack version {version:?} is not supported on {provider}")]
    UnsupportedStackVersion {
        /// Provider the plan targets.
        provider: CloudProvider,
        /// Requested stack version.
        version: String,
    },

    /// The region is not served by the provider.
    #[error("region {region:?} is not supported on {provider}")]
    UnsupportedRegion {
        /// Provider the plan targets.
        provider: CloudProvider,
        /// Requested region.
        region: String,
    },

    /// An instance type matches none of the provider's matchers.
    #[error("{role} node type {instance_type:?} is not supported on {provider}")]
    UnsupportedInstanceType {
        /// Provider the plan targets.
        provider: CloudProvider,
        /// Which node role failed.
        role: NodeRole,
        /// Requested instance type.
        instance_type: String,
    },

    /// The provider cannot place clusters on a network in this region.
    #[error("no network placement configured for {provider} in region {region:?}")]
    NetworkUnavailable {
        /// Provider the plan targets.
        provider: CloudProvider,
        /// Resolved region.
        region: String,
    },

    /// A required field is empty.
    #[error("required field `{0}` is missing")]
    MissingField(&'static str),

    /// None of the requested services is known.
    #[error("at least one known service must be requested")]
    NoServices,

    /// A volume is smaller than the provider minimum.
    #[error("{volume} volume size {size_gb} GiB is below the minimum of {min_gb} GiB")]
    VolumeTooSmall {
        /// Which volume: `root`, `master`, or `worker`.
        volume: &'static str,
        /// Requested size.
        size_gb: u32,
        /// Smallest allowed size.
        min_gb: u32,
    },

    /// A tag value contains characters outside the allowed set.
    #[error("tag {key:?} has invalid value {value:?}")]
    InvalidTagValue {
        /// Tag key.
        key: String,
        /// Offending value.
        value: String,
    },
}

impl ValidationError {
    /// The name of the field the error is about.
    #[must_use]
    pub fn field(&self) -> &'static str {
        match self {
            Self::UnknownProvider(_) => "cloud_provider",
            Self::UnsupportedClusterType { .. } => "cluster_type",
            Self::UnsupportedStackVersion { .. } => "stack_version",
            Self::UnsupportedRegion { .. } => "region",
            Self::UnsupportedInstanceType { role, .. } => match role {
                NodeRole::Head => "head_node_type",
                NodeRole::Worker => "worker_node_type",
            },
            Self::NetworkUnavailable { .. } => "network",
            Self::MissingField(field) => field,
            Self::NoServices => "services",
            Self::VolumeTooSmall { volume, .. } => match *volume {
                "root" => "root_volume_size",
                "master" => "master_volume_size",
                _ => "worker_volume_size",
            },
            Self::InvalidTagValue { .. } => "tags",
        }
    }
}

/// Errors from the Cloud Provisioning Gateway.
#[derive(Error, Debug)]
pub enum CloudError {
    /// The cluster does not exist.
    #[error("cluster not found: {0}")]
    NotFound(String),

    /// The provider rejected the request.
    #[error("provider rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status returned.
        status: u16,
        /// Error message returned.
        message: String,
    },

    /// The request never got an answer.
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered with something unreadable.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// The operation is not available on this provider.
    #[error("operation not supported: {0}")]
    Unsupported(String),

    /// Gateway or profile configuration is broken.
    #[error("configuration error: {0}")]
    Config(String),
}

impl CloudError {
    /// Check if this error is retriable.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// A specialized Result type for gateway operations.
pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_name_their_field() {
        let err = ValidationError::VolumeTooSmall {
            volume: "worker",
            size_gb: 3,
            min_gb: 5,
        };
        assert_eq!(err.field(), "worker_volume_size");
        assert_eq!(
            err.to_string(),
            "worker volume size 3 GiB is below the minimum of 5 GiB"
        );

        let err = ValidationError::UnsupportedInstanceType {
            provider: CloudProvider::Emr,
            role: NodeRole::Head,
            instance_type: "t2.nano".to_string(),
        };
        assert_eq!(err.field(), "head_node_type");
        assert!(err.to_string().starts_with("head node type"));
    }

    #[test]
    fn retriable_errors() {
        assert!(CloudError::Transport("reset".into()).is_retriable());
        assert!(CloudError::Rejected {
            status: 503,
            message: "busy".into()
        }
        .is_retriable());
        assert!(!CloudError::Rejected {
            status: 400,
            message: "bad".into()
        }
        .is_retriable());
        assert!(!CloudError::NotFound("j-1".into()).is_retriable());
    }
}
