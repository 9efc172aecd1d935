//! Network endpoint builder: one Service per node group.

use k8s_openapi::{
    api::core::v1::{Service, ServicePort, ServiceSpec},
    apimachinery::pkg::util::intstr::IntOrString,
};

use super::{node_group_labels, object_meta};
use crate::crd::{NodeGroupSpec, NodeType, TesseraCluster};

pub fn build_node_group_service(
    group: &NodeGroupSpec,
    node_type: NodeType,
    cluster: &TesseraCluster,
) -> Service {
    Service {
        metadata: object_meta(group.object_name(), group, node_type, cluster),
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                port: group.service.port,
                target_port: Some(IntOrString::Int(group.service.target_port)),
                protocol: Some("TCP".to_owned()),
                ..Default::default()
            }]),
            selector: Some(node_group_labels(group, node_type)),
            type_: Some(group.service.endpoint_type.k8s_service_type()),
            ..Default::default()
        }),
        ..Default::default()
    }
}
