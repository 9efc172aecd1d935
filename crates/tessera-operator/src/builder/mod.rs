//! Pure builders for the child resources of a node group.
//!
//! Every function here is deterministic and free of I/O: identical inputs
//! yield identical desired objects, so the reconcile driver can attribute any
//! difference against observed state to real drift. Owner references are not
//! set here; the driver stamps them when it creates an object.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;

use crate::crd::{APP_NAME, NodeGroupSpec, NodeType, TesseraCluster};

mod config_map;
mod ingress;
mod pdb;
mod service;
mod workload;

pub use config_map::{build_common_config_map, build_node_group_config_map};
pub use ingress::build_node_group_ingress;
pub use pdb::build_node_group_pdb;
pub use service::build_node_group_service;
pub use workload::{build_node_group_deployment, build_node_group_statefulset};

/// Labels of all child resources of a node group, also used as the workload
/// selector. Labels supplied on the group are used verbatim.
pub(crate) fn node_group_labels(
    group: &NodeGroupSpec,
    node_type: NodeType,
) -> BTreeMap<String, String> {
    match &group.labels {
        Some(labels) => labels.clone(),
        None => BTreeMap::from([
            ("app".to_owned(), APP_NAME.to_owned()),
            ("type".to_owned(), node_type.to_string()),
            ("name".to_owned(), group.name.clone()),
        ]),
    }
}

/// Pod annotations of a node group, defaulting to a minimal app annotation.
pub(crate) fn node_group_annotations(group: &NodeGroupSpec) -> BTreeMap<String, String> {
    match &group.annotations {
        Some(annotations) => annotations.clone(),
        None => BTreeMap::from([("app".to_owned(), APP_NAME.to_owned())]),
    }
}

/// Metadata shared by all child resources of a node group.
pub(crate) fn object_meta(
    name: String,
    group: &NodeGroupSpec,
    node_type: NodeType,
    cluster: &TesseraCluster,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: cluster.namespace(),
        labels: Some(node_group_labels(group, node_type)),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::fixtures::node_group;

    #[test]
    fn default_labels_carry_app_type_and_name() {
        let group = node_group("hist", "data-serving");

        assert_eq!(
            node_group_labels(&group, NodeType::DataServing),
            BTreeMap::from([
                ("app".to_owned(), "tessera".to_owned()),
                ("type".to_owned(), "data-serving".to_owned()),
                ("name".to_owned(), "hist".to_owned()),
            ])
        );
    }

    #[test]
    fn supplied_labels_are_used_verbatim() {
        let mut group = node_group("hist", "data-serving");
        group.labels = Some(BTreeMap::from([("team".to_owned(), "storage".to_owned())]));

        assert_eq!(
            node_group_labels(&group, NodeType::DataServing),
            BTreeMap::from([("team".to_owned(), "storage".to_owned())])
        );
    }
}
