//! Field-level copy-forward of engine-owned fields from desired into observed
//! state.
//!
//! Each implementation merges exactly the mutable fields this operator owns
//! and leaves everything else of the observed object alone: identity fields,
//! owner references, status, resource version and annotations added by other
//! controllers are never touched. Merging is idempotent, applying the same
//! desired state twice changes nothing.

use k8s_openapi::api::{
    apps::v1::{Deployment, StatefulSet},
    core::v1::{ConfigMap, Service},
    networking::v1::Ingress,
    policy::v1::PodDisruptionBudget,
};

/// The per-kind sync capability consumed by the reconcile driver's generic
/// apply routine.
pub trait Synchronize {
    /// Copies the engine-owned fields of `desired` onto `self`.
    fn sync_from(&mut self, desired: &Self);

    /// The replica count, for workload kinds. The driver uses this to log
    /// scaling as its own event.
    fn replicas(&self) -> Option<i32> {
        None
    }

    fn set_replicas(&mut self, _replicas: i32) {}
}

impl Synchronize for StatefulSet {
    fn sync_from(&mut self, desired: &Self) {
        if let (Some(observed), Some(desired)) = (self.spec.as_mut(), desired.spec.as_ref()) {
            observed.replicas = desired.replicas;
            observed.template = desired.template.clone();
            observed.update_strategy = desired.update_strategy.clone();
        }
    }

    fn replicas(&self) -> Option<i32> {
        self.spec.as_ref().and_then(|spec| spec.replicas)
    }

    fn set_replicas(&mut self, replicas: i32) {
        if let Some(spec) = self.spec.as_mut() {
            spec.replicas = Some(replicas);
        }
    }
}

impl Synchronize for Deployment {
    fn sync_from(&mut self, desired: &Self) {
        if let (Some(observed), Some(desired)) = (self.spec.as_mut(), desired.spec.as_ref()) {
            observed.replicas = desired.replicas;
            observed.template = desired.template.clone();
            observed.strategy = desired.strategy.clone();
        }
    }

    fn replicas(&self) -> Option<i32> {
        self.spec.as_ref().and_then(|spec| spec.replicas)
    }

    fn set_replicas(&mut self, replicas: i32) {
        if let Some(spec) = self.spec.as_mut() {
            spec.replicas = Some(replicas);
        }
    }
}

impl Synchronize for Service {
    fn sync_from(&mut self, desired: &Self) {
        if let (Some(observed), Some(desired)) = (self.spec.as_mut(), desired.spec.as_ref()) {
            observed.ports = desired.ports.clone();
            observed.type_ = desired.type_.clone();
        }
    }
}

impl Synchronize for ConfigMap {
    fn sync_from(&mut self, desired: &Self) {
        self.data = desired.data.clone();
        self.binary_data = desired.binary_data.clone();
    }
}

impl Synchronize for Ingress {
    // Only the routing rules are owned; ingress annotations are commonly
    // written by ingress controllers and stay untouched.
    fn sync_from(&mut self, desired: &Self) {
        self.spec = desired.spec.clone();
    }
}

impl Synchronize for PodDisruptionBudget {
    fn sync_from(&mut self, desired: &Self) {
        if let (Some(observed), Some(desired)) = (self.spec.as_mut(), desired.spec.as_ref()) {
            observed.max_unavailable = desired.max_unavailable.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::{
        api::apps::v1::{StatefulSetSpec, StatefulSetStatus},
        apimachinery::pkg::apis::meta::v1::OwnerReference,
    };

    use super::*;
    use crate::{
        builder,
        crd::{
            NodeType,
            fixtures::{cluster_with, node_group},
        },
    };

    fn observed_and_desired() -> (StatefulSet, StatefulSet) {
        let cluster = cluster_with(vec![("hist", node_group("hist", "data-serving"))]);
        let desired = builder::build_node_group_statefulset(
            &cluster.spec.nodes["hist"],
            NodeType::DataServing,
            &cluster,
        );

        // An observed object carries fields the engine does not own.
        let mut observed = desired.clone();
        observed.metadata.resource_version = Some("41".to_owned());
        observed.metadata.owner_references = Some(vec![OwnerReference::default()]);
        observed.metadata.annotations = Some(BTreeMap::from([(
            "external.io/added".to_owned(),
            "elsewhere".to_owned(),
        )]));
        observed.status = Some(StatefulSetStatus::default());
        if let Some(spec) = observed.spec.as_mut() {
            spec.replicas = Some(1);
        }

        (observed, desired)
    }

    #[test]
    fn sync_copies_owned_fields_only() {
        let (mut observed, desired) = observed_and_desired();

        observed.sync_from(&desired);

        assert_eq!(observed.replicas(), Some(3));
        // Unowned fields survive the merge.
        assert_eq!(observed.metadata.resource_version.as_deref(), Some("41"));
        assert!(observed.status.is_some());
        assert!(
            observed
                .metadata
                .annotations
                .as_ref()
                .is_some_and(|annotations| annotations.contains_key("external.io/added"))
        );
        assert!(observed.metadata.owner_references.is_some());
    }

    #[test]
    fn sync_is_idempotent() {
        let (observed, desired) = observed_and_desired();

        let mut once = observed.clone();
        once.sync_from(&desired);
        let mut twice = once.clone();
        twice.sync_from(&desired);

        assert_eq!(once, twice);
    }

    #[test]
    fn service_sync_keeps_the_cluster_ip() {
        let cluster = cluster_with(vec![("hist", node_group("hist", "data-serving"))]);
        let desired = builder::build_node_group_service(
            &cluster.spec.nodes["hist"],
            NodeType::DataServing,
            &cluster,
        );

        let mut observed = desired.clone();
        if let Some(spec) = observed.spec.as_mut() {
            spec.cluster_ip = Some("10.0.0.12".to_owned());
            spec.ports = None;
        }

        observed.sync_from(&desired);

        let spec = observed.spec.expect("service has a spec");
        assert_eq!(spec.cluster_ip.as_deref(), Some("10.0.0.12"));
        assert_eq!(spec.ports, desired.spec.expect("spec is set").ports);
    }

    #[test]
    fn config_map_sync_replaces_data() {
        let cluster = cluster_with(vec![("hist", node_group("hist", "data-serving"))]);
        let desired = builder::build_node_group_config_map(
            &cluster.spec.nodes["hist"],
            NodeType::DataServing,
            &cluster,
        );

        let mut observed = desired.clone();
        observed.data = Some(BTreeMap::from([(
            "runtime.properties".to_owned(),
            "stale".to_owned(),
        )]));

        observed.sync_from(&desired);

        assert_eq!(observed.data, desired.data);
    }

    #[test]
    fn statefulset_sync_without_observed_spec_is_a_no_op() {
        let (_, desired) = observed_and_desired();
        let mut observed = StatefulSet {
            metadata: desired.metadata.clone(),
            spec: None,
            ..Default::default()
        };

        observed.sync_from(&desired);

        assert_eq!(observed.spec, None);
        assert_eq!(observed.replicas(), None);
    }

    #[test]
    fn replicas_accessors_roundtrip() {
        let mut sts = StatefulSet {
            spec: Some(StatefulSetSpec::default()),
            ..Default::default()
        };
        sts.set_replicas(5);
        assert_eq!(sts.replicas(), Some(5));

        let mut service = Service::default();
        service.set_replicas(5);
        assert_eq!(Synchronize::replicas(&service), None);
    }
}
