//! Database schema definitions and column families.
//!
//! Every record type owns a primary column family plus a by-state index and a
//! by-creation-time index. Specs additionally index the trial request they
//! were created for.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary trial request records, keyed by `trial_id`.
    pub const TRIALS: &str = "trials";
    /// Index: trials by state, keyed by `state || trial_id`.
    pub const TRIALS_BY_STATE: &str = "trials_by_state";
    /// Index: trials by creation time, keyed by `millis || trial_id`.
    pub const TRIALS_BY_CREATED: &str = "trials_by_created";

    /// Primary node spec records, keyed by `spec_id`.
    pub const NODE_SPECS: &str = "node_specs";
    /// Index: node specs by state.
    pub const NODE_SPECS_BY_STATE: &str = "node_specs_by_state";
    /// Index: node specs by creation time.
    pub const NODE_SPECS_BY_CREATED: &str = "node_specs_by_created";
    /// Index: node specs by trial, keyed by `trial_id || spec_id`.
    pub const NODE_SPECS_BY_TRIAL: &str = "node_specs_by_trial";

    /// Primary node records, keyed by `node_id`.
    pub const NODES: &str = "nodes";
    /// Index: nodes by state.
    pub const NODES_BY_STATE: &str = "nodes_by_state";
    /// Index: nodes by launch time.
    pub const NODES_BY_CREATED: &str = "nodes_by_created";

    /// Primary cluster spec records, keyed by `spec_id`.
    pub const CLUSTER_SPECS: &str = "cluster_specs";
    /// Index: cluster specs by state.
    pub const CLUSTER_SPECS_BY_STATE: &str = "cluster_specs_by_state";
    /// Index: cluster specs by creation time.
    pub const CLUSTER_SPECS_BY_CREATED: &str = "cluster_specs_by_created";
    /// Index: cluster specs by trial, keyed by `trial_id || spec_id`.
    pub const CLUSTER_SPECS_BY_TRIAL: &str = "cluster_specs_by_trial";

    /// Primary cluster records, keyed by `cluster_id`.
    pub const CLUSTERS: &str = "clusters";
    /// Index: clusters by state.
    pub const CLUSTERS_BY_STATE: &str = "clusters_by_state";
    /// Index: clusters by launch time.
    pub const CLUSTERS_BY_CREATED: &str = "clusters_by_created";

    /// Next identifier per record type, keyed by table name.
    pub const SEQUENCES: &str = "sequences";
}

/// The column families backing one record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Table {
    /// Table name, also the key in the sequences family.
    pub name: &'static str,
    /// Primary records.
    pub records: &'static str,
    /// By-state index.
    pub by_state: &'static str,
    /// By-creation-time index.
    pub by_created: &'static str,
    /// By-trial index, for record types that reference a trial.
    pub by_trial: Option<&'static str>,
}

/// The tables of every record type.
pub mod tables {
    use super::{cf, Table};

    /// Trial requests.
    pub const TRIALS: Table = Table {
        name: cf::TRIALS,
        records: cf::TRIALS,
        by_state: cf::TRIALS_BY_STATE,
        by_created: cf::TRIALS_BY_CREATED,
        by_trial: None,
    };

    /// Node specs.
    pub const NODE_SPECS: Table = Table {
        name: cf::NODE_SPECS,
        records: cf::NODE_SPECS,
        by_state: cf::NODE_SPECS_BY_STATE,
        by_created: cf::NODE_SPECS_BY_CREATED,
        by_trial: Some(cf::NODE_SPECS_BY_TRIAL),
    };

    /// Nodes.
    pub const NODES: Table = Table {
        name: cf::NODES,
        records: cf::NODES,
        by_state: cf::NODES_BY_STATE,
        by_created: cf::NODES_BY_CREATED,
        by_trial: None,
    };

    /// Cluster specs.
    pub const CLUSTER_SPECS: Table = Table {
        name: cf::CLUSTER_SPECS,
        records: cf::CLUSTER_SPECS,
        by_state: cf::CLUSTER_SPECS_BY_STATE,
        by_created: cf::CLUSTER_SPECS_BY_CREATED,
        by_trial: Some(cf::CLUSTER_SPECS_BY_TRIAL),
    };

    /// Clusters.
    pub const CLUSTERS: Table = Table {
        name: cf::CLUSTERS,
        records: cf::CLUSTERS,
        by_state: cf::CLUSTERS_BY_STATE,
        by_created: cf::CLUSTERS_BY_CREATED,
        by_trial: None,
    };
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::TRIALS,
        cf::TRIALS_BY_STATE,
        cf::TRIALS_BY_CREATED,
        cf::NODE_SPECS,
        cf::NODE_SPECS_BY_STATE,
        cf::NODE_SPECS_BY_CREATED,
        cf::NODE_SPECS_BY_TRIAL,
        cf::NODES,
        cf::NODES_BY_STATE,
        cf::NODES_BY_CREATED,
        cf::CLUSTER_SPECS,
        cf::CLUSTER_SPECS_BY_STATE,
        cf::CLUSTER_SPECS_BY_CREATED,
        cf::CLUSTER_SPECS_BY_TRIAL,
        cf::CLUSTERS,
        cf::CLUSTERS_BY_STATE,
        cf::CLUSTERS_BY_CREATED,
        cf::SEQUENCES,
    ]
}
