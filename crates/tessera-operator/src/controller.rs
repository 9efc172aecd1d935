//! The reconcile driver: one pass converges the platform state of a single
//! cluster toward its spec.
//!
//! A pass validates the spec, expands the node groups into rollout order and
//! applies every synthesized child resource through one generic routine.
//! Create/update/no-op decisions are made per resource against freshly
//! fetched observed state, so the pass is idempotent under restart and
//! replay. Per-resource failures are recorded and the pass continues; the
//! pass always reschedules itself after a fixed interval, which also heals
//! drift no event was delivered for.

use std::{sync::Arc, time::Duration};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt, runtime::controller::Action};
use snafu::{OptionExt, Snafu};
use tracing::{debug, info, warn};

use crate::{
    builder,
    client::{self, Client, ObjectStore, StoredObject, kind_of},
    crd::TesseraCluster,
    ordering::{self, OrderedNodeGroup},
    sync::Synchronize,
    validation::{self, Violations},
};

/// Fixed re-poll interval; every pass reschedules after this delay no matter
/// how it went.
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

pub struct Context {
    pub store: Client,
}

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("cluster spec failed validation: {violations}"))]
    InvalidClusterSpec { violations: Violations },

    #[snafu(transparent)]
    InvalidNodeGroups { source: ordering::Error },

    #[snafu(display("cluster object has no namespace"))]
    NoNamespace,

    #[snafu(display("cluster object has no name or uid yet"))]
    NoOwnerReference,
}

/// What a single resource application did to the platform.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    Created,
    /// Only the replica count drifted.
    Scaled,
    Updated,
    Unchanged,
}

/// Counts of per-resource outcomes over one pass.
#[derive(Debug, Default, Eq, PartialEq)]
pub struct PassSummary {
    pub created: usize,
    pub scaled: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl PassSummary {
    fn record(&mut self, result: Result<Outcome, client::Error>) {
        match result {
            Ok(Outcome::Created) => self.created += 1,
            Ok(Outcome::Scaled) => self.scaled += 1,
            Ok(Outcome::Updated) => self.updated += 1,
            Ok(Outcome::Unchanged) => self.unchanged += 1,
            Err(error) => {
                // Isolated to this resource; the next poll retries it.
                warn!(%error, "failed to reconcile child resource");
                self.failed += 1;
            }
        }
    }

    /// Number of writes the pass issued.
    pub fn writes(&self) -> usize {
        self.created + self.scaled + self.updated
    }
}

/// Entry point wired into the controller runtime.
pub async fn reconcile(cluster: Arc<TesseraCluster>, ctx: Arc<Context>) -> Result<Action> {
    run_pass(&ctx.store, &cluster).await?;
    Ok(Action::requeue(RECONCILE_INTERVAL))
}

pub fn error_policy(_cluster: Arc<TesseraCluster>, error: &Error, _ctx: Arc<Context>) -> Action {
    warn!(%error, "reconciliation failed");
    Action::requeue(RECONCILE_INTERVAL)
}

/// Runs one reconciliation pass. Validation and node-group expansion abort
/// the pass before any write; once applying starts, every resource of every
/// node group is attempted exactly once.
pub async fn run_pass<S: ObjectStore>(store: &S, cluster: &TesseraCluster) -> Result<PassSummary> {
    if let Err(violations) = validation::validate(cluster) {
        return InvalidClusterSpecSnafu { violations }.fail();
    }

    let groups = ordering::ordered_node_groups(cluster)?;
    cluster.namespace().context(NoNamespaceSnafu)?;
    let owner_ref = cluster
        .controller_owner_ref(&())
        .context(NoOwnerReferenceSnafu)?;

    info!(
        cluster = %cluster.name_any(),
        node_groups = groups.len(),
        "reconciling cluster"
    );

    let mut summary = PassSummary::default();
    for group in &groups {
        apply_node_group(store, cluster, group, &owner_ref, &mut summary).await;
    }

    info!(
        cluster = %cluster.name_any(),
        created = summary.created,
        scaled = summary.scaled,
        updated = summary.updated,
        unchanged = summary.unchanged,
        failed = summary.failed,
        "reconciliation pass complete"
    );

    Ok(summary)
}

/// Applies every child resource of one node group. The workload kind is an
/// exhaustive decision on the node type; ingress and disruption budget only
/// exist when the group asks for them.
// TODO: delete child resources of node groups that were removed from the
// spec; currently they stay around until the cluster itself is deleted.
async fn apply_node_group<S: ObjectStore>(
    store: &S,
    cluster: &TesseraCluster,
    group: &OrderedNodeGroup<'_>,
    owner_ref: &OwnerReference,
    summary: &mut PassSummary,
) {
    let OrderedNodeGroup {
        key: _,
        spec: node,
        node_type,
    } = *group;

    if node_type.is_stateful() {
        let desired = builder::build_node_group_statefulset(node, node_type, cluster);
        summary.record(apply_resource(store, owner_ref, &desired).await);
    } else {
        let desired = builder::build_node_group_deployment(node, node_type, cluster);
        summary.record(apply_resource(store, owner_ref, &desired).await);
    }

    let config_map = builder::build_node_group_config_map(node, node_type, cluster);
    summary.record(apply_resource(store, owner_ref, &config_map).await);

    let common_config_map = builder::build_common_config_map(cluster);
    summary.record(apply_resource(store, owner_ref, &common_config_map).await);

    let service = builder::build_node_group_service(node, node_type, cluster);
    summary.record(apply_resource(store, owner_ref, &service).await);

    if let Some(ingress) = node.ingress.as_ref().filter(|ingress| ingress.enabled) {
        let desired = builder::build_node_group_ingress(node, node_type, cluster, ingress);
        summary.record(apply_resource(store, owner_ref, &desired).await);
    }

    if let Some(pdb) = &node.pod_disruption_budget {
        let desired = builder::build_node_group_pdb(node, node_type, cluster, pdb);
        summary.record(apply_resource(store, owner_ref, &desired).await);
    }
}

/// Reconciles one desired resource against observed state.
///
/// Absent objects are created with the owner reference stamped; present
/// objects get the engine-owned fields merged forward and are only written
/// back when that changed anything. A pure replica-count drift is logged as a
/// scale event rather than a general update.
async fn apply_resource<S, K>(
    store: &S,
    owner_ref: &OwnerReference,
    desired: &K,
) -> Result<Outcome, client::Error>
where
    S: ObjectStore,
    K: StoredObject + Synchronize + PartialEq,
{
    let kind = kind_of::<K>();
    let name = desired.name_any();
    let namespace = desired.namespace().unwrap_or_default();

    let Some(observed) = store.get::<K>(&namespace, &name).await? else {
        let mut resource = desired.clone();
        resource
            .meta_mut()
            .owner_references
            .get_or_insert_with(Vec::new)
            .push(owner_ref.clone());
        store.create(&resource).await?;
        info!(%kind, %name, "created child resource");
        return Ok(Outcome::Created);
    };

    let mut merged = observed.clone();
    merged.sync_from(desired);
    if merged == observed {
        debug!(%kind, %name, "child resource is up to date");
        return Ok(Outcome::Unchanged);
    }

    let observed_replicas = observed.replicas();
    let desired_replicas = merged.replicas();
    let scaled = observed_replicas != desired_replicas;
    if scaled {
        info!(
            %kind,
            %name,
            from = observed_replicas,
            to = desired_replicas,
            "scaling workload"
        );
    }

    let scale_only = scaled && {
        let mut rescaled = observed.clone();
        if let Some(replicas) = desired_replicas {
            rescaled.set_replicas(replicas);
        }
        rescaled == merged
    };
    if !scale_only {
        info!(%kind, %name, "updating child resource");
    }

    store.update(&merged).await?;
    Ok(if scale_only {
        Outcome::Scaled
    } else {
        Outcome::Updated
    })
}
