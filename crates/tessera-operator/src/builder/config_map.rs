//! Config artifact builders: one node-local ConfigMap per group plus the
//! cluster-common ConfigMap shared by all groups.

use std::collections::BTreeMap;

use k8s_openapi::{api::core::v1::ConfigMap, apimachinery::pkg::apis::meta::v1::ObjectMeta};
use kube::ResourceExt;

use super::object_meta;
use crate::crd::{
    APP_NAME, COMMON_RUNTIME_PROPERTIES_FILE, LOG_CONFIG_FILE, NodeGroupSpec, NodeType,
    RUNTIME_OPTIONS_FILE, RUNTIME_PROPERTIES_FILE, TesseraCluster,
};

/// Builds the node-local configuration of a group. Runtime options and log
/// configuration are only rendered when effective, i.e. set on the group or
/// inherited from the cluster.
pub fn build_node_group_config_map(
    group: &NodeGroupSpec,
    node_type: NodeType,
    cluster: &TesseraCluster,
) -> ConfigMap {
    let mut data = BTreeMap::from([(
        RUNTIME_PROPERTIES_FILE.to_owned(),
        group.runtime_properties.clone(),
    )]);
    if let Some(options) = group.effective_runtime_options(&cluster.spec) {
        data.insert(RUNTIME_OPTIONS_FILE.to_owned(), options.to_owned());
    }
    if let Some(log_config) = group.effective_log_config(&cluster.spec) {
        data.insert(LOG_CONFIG_FILE.to_owned(), log_config.to_owned());
    }

    ConfigMap {
        metadata: object_meta(group.config_map_name(), group, node_type, cluster),
        data: Some(data),
        ..Default::default()
    }
}

/// Builds the cluster-common configuration, identical for every node group of
/// the cluster.
pub fn build_common_config_map(cluster: &TesseraCluster) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(cluster.common_config_map_name()),
            namespace: cluster.namespace(),
            labels: Some(BTreeMap::from([(
                "app".to_owned(),
                APP_NAME.to_owned(),
            )])),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            COMMON_RUNTIME_PROPERTIES_FILE.to_owned(),
            cluster.spec.common_runtime_properties.clone(),
        )])),
        ..Default::default()
    }
}
