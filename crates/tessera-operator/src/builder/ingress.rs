//! Ingress route builder for node groups with an enabled ingress descriptor.

use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
};

use super::object_meta;
use crate::crd::{IngressConfig, NodeGroupSpec, NodeType, TesseraCluster};

/// Builds the ingress routing `ingress.hostname` to the group's service.
/// Callers only invoke this for groups whose ingress descriptor is enabled;
/// validation guarantees the hostname is set.
pub fn build_node_group_ingress(
    group: &NodeGroupSpec,
    node_type: NodeType,
    cluster: &TesseraCluster,
    ingress: &IngressConfig,
) -> Ingress {
    let mut metadata = object_meta(group.object_name(), group, node_type, cluster);
    metadata.annotations = Some(ingress_annotations(group, ingress));

    Ingress {
        metadata,
        spec: Some(IngressSpec {
            rules: Some(vec![IngressRule {
                host: Some(ingress.hostname.clone()),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some(ingress_path(ingress)),
                        path_type: "Prefix".to_owned(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: group.object_name(),
                                port: Some(ServiceBackendPort {
                                    number: Some(group.service.port),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
            }]),
            tls: ingress.tls_enabled.then(|| {
                vec![IngressTLS {
                    hosts: Some(vec![ingress.hostname.clone()]),
                    secret_name: Some(ingress.tls_secret_name.clone()),
                }]
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn ingress_path(ingress: &IngressConfig) -> String {
    if ingress.path.is_empty() {
        "/".to_owned()
    } else {
        ingress.path.clone()
    }
}

fn ingress_annotations(
    group: &NodeGroupSpec,
    ingress: &IngressConfig,
) -> BTreeMap<String, String> {
    match &ingress.annotations {
        Some(annotations) => annotations.clone(),
        None => BTreeMap::from([("app".to_owned(), group.name.clone())]),
    }
}
