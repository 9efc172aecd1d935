//! Availability budget builder for node groups that request one.

use k8s_openapi::{
    api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec},
    apimachinery::pkg::{apis::meta::v1::LabelSelector, util::intstr::IntOrString},
};

use super::{node_group_labels, object_meta};
use crate::crd::{NodeGroupSpec, NodeType, PdbConfig, TesseraCluster};

pub fn build_node_group_pdb(
    group: &NodeGroupSpec,
    node_type: NodeType,
    cluster: &TesseraCluster,
    pdb: &PdbConfig,
) -> PodDisruptionBudget {
    PodDisruptionBudget {
        metadata: object_meta(group.object_name(), group, node_type, cluster),
        spec: Some(PodDisruptionBudgetSpec {
            selector: Some(LabelSelector {
                match_labels: Some(node_group_labels(group, node_type)),
                ..Default::default()
            }),
            max_unavailable: Some(IntOrString::Int(pdb.max_unavailable)),
            ..Default::default()
        }),
        ..Default::default()
    }
}
