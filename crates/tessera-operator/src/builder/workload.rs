//! Workload builders: one StatefulSet or Deployment per node group, chosen by
//! node type.

use k8s_openapi::{
    api::{
        apps::v1::{
            Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment, StatefulSet,
            StatefulSetSpec, StatefulSetUpdateStrategy,
        },
        core::v1::{
            ConfigMapVolumeSource, Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec,
            Toleration, Volume, VolumeMount,
        },
    },
    apimachinery::pkg::{
        apis::meta::v1::{LabelSelector, ObjectMeta},
        util::intstr::IntOrString,
    },
};

use super::{node_group_annotations, node_group_labels, object_meta};
use crate::crd::{NodeGroupSpec, NodeType, TesseraCluster};

/// Volume name of the cluster-common config mount inside every pod.
const COMMON_CONFIG_VOLUME: &str = "common-config";

/// Builds the stateful workload of a storage-owning node group: stable
/// identity, ordered rollout, one claim per replica from the group's claim
/// templates.
pub fn build_node_group_statefulset(
    group: &NodeGroupSpec,
    node_type: NodeType,
    cluster: &TesseraCluster,
) -> StatefulSet {
    StatefulSet {
        metadata: object_meta(group.object_name(), group, node_type, cluster),
        spec: Some(StatefulSetSpec {
            service_name: Some(group.object_name()),
            selector: LabelSelector {
                match_labels: Some(node_group_labels(group, node_type)),
                ..Default::default()
            },
            replicas: Some(group.replicas),
            template: build_pod_template(group, node_type, cluster),
            pod_management_policy: Some("OrderedReady".to_owned()),
            update_strategy: Some(StatefulSetUpdateStrategy {
                type_: Some("RollingUpdate".to_owned()),
                ..Default::default()
            }),
            volume_claim_templates: (!group.volume_claim_templates.is_empty())
                .then(|| group.volume_claim_templates.clone()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Builds the stateless workload of a node group: no per-replica identity,
/// percentage-bounded rolling updates.
pub fn build_node_group_deployment(
    group: &NodeGroupSpec,
    node_type: NodeType,
    cluster: &TesseraCluster,
) -> Deployment {
    Deployment {
        metadata: object_meta(group.object_name(), group, node_type, cluster),
        spec: Some(DeploymentSpec {
            selector: LabelSelector {
                match_labels: Some(node_group_labels(group, node_type)),
                ..Default::default()
            },
            replicas: Some(group.replicas),
            template: build_pod_template(group, node_type, cluster),
            strategy: Some(DeploymentStrategy {
                type_: Some("RollingUpdate".to_owned()),
                rolling_update: Some(RollingUpdateDeployment {
                    max_unavailable: Some(IntOrString::String("25%".to_owned())),
                    max_surge: Some(IntOrString::String("25%".to_owned())),
                }),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn build_pod_template(
    group: &NodeGroupSpec,
    node_type: NodeType,
    cluster: &TesseraCluster,
) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(node_group_labels(group, node_type)),
            annotations: Some(node_group_annotations(group)),
            ..Default::default()
        }),
        spec: Some(build_pod_spec(group, node_type, cluster)),
    }
}

fn build_pod_spec(group: &NodeGroupSpec, node_type: NodeType, cluster: &TesseraCluster) -> PodSpec {
    PodSpec {
        containers: vec![Container {
            name: group.name.clone(),
            image: Some(cluster.spec.image.clone()),
            command: Some(vec![
                cluster.spec.start_script.clone(),
                node_type.to_string(),
            ]),
            env: build_env(group, cluster),
            resources: group.resources.clone(),
            ports: Some(vec![ContainerPort {
                container_port: group.service.target_port,
                protocol: Some("TCP".to_owned()),
                ..Default::default()
            }]),
            volume_mounts: Some(build_volume_mounts(group, cluster)),
            termination_message_path: Some("/dev/termination-log".to_owned()),
            termination_message_policy: Some("File".to_owned()),
            ..Default::default()
        }],
        volumes: Some(build_volumes(group, cluster)),
        tolerations: build_tolerations(group, cluster),
        affinity: group
            .affinity
            .clone()
            .or_else(|| cluster.spec.affinity.clone()),
        node_selector: group.node_selector.clone(),
        security_context: group
            .security_context
            .clone()
            .or_else(|| cluster.spec.security_context.clone()),
        image_pull_secrets: (!cluster.spec.image_pull_secrets.is_empty())
            .then(|| cluster.spec.image_pull_secrets.clone()),
        ..Default::default()
    }
}

/// The two config volumes come first, user-supplied volumes after.
fn build_volumes(group: &NodeGroupSpec, cluster: &TesseraCluster) -> Vec<Volume> {
    let mut volumes = vec![
        Volume {
            name: group.config_map_name(),
            config_map: Some(ConfigMapVolumeSource {
                name: group.config_map_name(),
                ..Default::default()
            }),
            ..Default::default()
        },
        Volume {
            name: COMMON_CONFIG_VOLUME.to_owned(),
            config_map: Some(ConfigMapVolumeSource {
                name: cluster.common_config_map_name(),
                ..Default::default()
            }),
            ..Default::default()
        },
    ];
    volumes.extend(group.volumes.iter().cloned());
    volumes
}

fn build_volume_mounts(group: &NodeGroupSpec, cluster: &TesseraCluster) -> Vec<VolumeMount> {
    let mut mounts = vec![
        VolumeMount {
            name: group.config_map_name(),
            mount_path: group.mount_path.clone(),
            ..Default::default()
        },
        VolumeMount {
            name: COMMON_CONFIG_VOLUME.to_owned(),
            mount_path: cluster.spec.common_config_mount_path.clone(),
            ..Default::default()
        },
    ];
    mounts.extend(group.volume_mounts.iter().cloned());
    mounts
}

/// Cluster-level variables first, node-group variables after, duplicates kept.
fn build_env(group: &NodeGroupSpec, cluster: &TesseraCluster) -> Option<Vec<EnvVar>> {
    let env = cluster
        .spec
        .env
        .iter()
        .chain(group.env.iter())
        .cloned()
        .collect::<Vec<_>>();
    (!env.is_empty()).then_some(env)
}

/// Cluster-level tolerations first, node-group tolerations after, duplicates
/// kept.
fn build_tolerations(group: &NodeGroupSpec, cluster: &TesseraCluster) -> Option<Vec<Toleration>> {
    let tolerations = cluster
        .spec
        .tolerations
        .iter()
        .chain(group.tolerations.iter())
        .cloned()
        .collect::<Vec<_>>();
    (!tolerations.is_empty()).then_some(tolerations)
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::PersistentVolumeClaim;

    use super::*;
    use crate::crd::fixtures::{cluster_with, node_group};

    fn hist_cluster() -> TesseraCluster {
        cluster_with(vec![("hist", node_group("hist", "data-serving"))])
    }

    #[test]
    fn statefulset_matches_the_node_group() {
        let cluster = hist_cluster();
        let group = &cluster.spec.nodes["hist"];

        let sts = build_node_group_statefulset(group, NodeType::DataServing, &cluster);

        assert_eq!(sts.metadata.name.as_deref(), Some("tessera-hist"));
        assert_eq!(sts.metadata.namespace.as_deref(), Some("default"));

        let spec = sts.spec.expect("statefulset has a spec");
        assert_eq!(spec.replicas, Some(3));
        assert_eq!(spec.service_name.as_deref(), Some("tessera-hist"));
        assert_eq!(spec.pod_management_policy.as_deref(), Some("OrderedReady"));
        assert_eq!(
            spec.update_strategy
                .and_then(|strategy| strategy.type_)
                .as_deref(),
            Some("RollingUpdate")
        );

        let container = &spec.template.spec.expect("pod spec is set").containers[0];
        assert_eq!(
            container.command,
            Some(vec!["/start.sh".to_owned(), "data-serving".to_owned()])
        );
        assert_eq!(container.image.as_deref(), Some("img:1"));
        assert_eq!(
            container.ports.as_ref().expect("port is set")[0].container_port,
            8083
        );
    }

    #[test]
    fn pod_carries_the_two_config_volumes_before_user_volumes() {
        let mut group = node_group("hist", "data-serving");
        group.volumes = vec![Volume {
            name: "scratch".to_owned(),
            ..Default::default()
        }];
        group.volume_mounts = vec![VolumeMount {
            name: "scratch".to_owned(),
            mount_path: "/scratch".to_owned(),
            ..Default::default()
        }];
        let cluster = cluster_with(vec![("hist", group)]);

        let sts = build_node_group_statefulset(
            &cluster.spec.nodes["hist"],
            NodeType::DataServing,
            &cluster,
        );
        let pod = sts
            .spec
            .and_then(|spec| spec.template.spec)
            .expect("pod spec is set");

        let volume_names = pod
            .volumes
            .expect("volumes are set")
            .into_iter()
            .map(|volume| volume.name)
            .collect::<Vec<_>>();
        assert_eq!(
            volume_names,
            ["tessera-hist-config", "common-config", "scratch"]
        );

        let mounts = pod.containers[0]
            .volume_mounts
            .clone()
            .expect("mounts are set");
        assert_eq!(mounts[0].mount_path, "/conf");
        assert_eq!(mounts[1].mount_path, "/common");
        assert_eq!(mounts[2].mount_path, "/scratch");
    }

    #[test]
    fn deployment_uses_percentage_bounded_rolling_updates() {
        let cluster = cluster_with(vec![("router", node_group("router", "query-routing"))]);

        let deployment = build_node_group_deployment(
            &cluster.spec.nodes["router"],
            NodeType::QueryRouting,
            &cluster,
        );

        let rolling_update = deployment
            .spec
            .and_then(|spec| spec.strategy)
            .and_then(|strategy| strategy.rolling_update)
            .expect("rolling update is set");
        assert_eq!(
            rolling_update.max_unavailable,
            Some(IntOrString::String("25%".to_owned()))
        );
        assert_eq!(
            rolling_update.max_surge,
            Some(IntOrString::String("25%".to_owned()))
        );
    }

    #[test]
    fn claim_templates_are_forwarded_to_the_statefulset() {
        let mut group = node_group("hist", "data-serving");
        group.volume_claim_templates = vec![PersistentVolumeClaim::default()];
        let cluster = cluster_with(vec![("hist", group)]);

        let sts = build_node_group_statefulset(
            &cluster.spec.nodes["hist"],
            NodeType::DataServing,
            &cluster,
        );

        assert_eq!(
            sts.spec
                .and_then(|spec| spec.volume_claim_templates)
                .map(|templates| templates.len()),
            Some(1)
        );
    }

    #[test]
    fn env_and_tolerations_concatenate_cluster_before_group() {
        let mut cluster = hist_cluster();
        cluster.spec.env = vec![EnvVar {
            name: "TIER".to_owned(),
            value: Some("default".to_owned()),
            ..Default::default()
        }];
        cluster.spec.tolerations = vec![Toleration {
            key: Some("shared".to_owned()),
            ..Default::default()
        }];

        let mut group = node_group("hist", "data-serving");
        // Deliberately duplicates the cluster-level variable; duplicates are
        // kept and resolve last-wins at the platform level.
        group.env = vec![EnvVar {
            name: "TIER".to_owned(),
            value: Some("hot".to_owned()),
            ..Default::default()
        }];
        group.tolerations = vec![Toleration {
            key: Some("storage".to_owned()),
            ..Default::default()
        }];
        cluster.spec.nodes.insert("hist".to_owned(), group);

        let sts = build_node_group_statefulset(
            &cluster.spec.nodes["hist"],
            NodeType::DataServing,
            &cluster,
        );
        let pod = sts
            .spec
            .and_then(|spec| spec.template.spec)
            .expect("pod spec is set");

        let env = pod.containers[0].env.clone().expect("env is set");
        assert_eq!(env.len(), 2);
        assert_eq!(env[0].value.as_deref(), Some("default"));
        assert_eq!(env[1].value.as_deref(), Some("hot"));

        let tolerations = pod.tolerations.expect("tolerations are set");
        assert_eq!(tolerations[0].key.as_deref(), Some("shared"));
        assert_eq!(tolerations[1].key.as_deref(), Some("storage"));
    }

    #[test]
    fn synthesis_is_deterministic() {
        let cluster = hist_cluster();
        let group = &cluster.spec.nodes["hist"];

        assert_eq!(
            build_node_group_statefulset(group, NodeType::DataServing, &cluster),
            build_node_group_statefulset(group, NodeType::DataServing, &cluster)
        );
        assert_eq!(
            build_node_group_deployment(group, NodeType::QueryBroker, &cluster),
            build_node_group_deployment(group, NodeType::QueryBroker, &cluster)
        );
    }
}
