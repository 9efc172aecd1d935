//! The `TesseraCluster` custom resource and its node-group sub-specifications.
//!
//! A tessera cluster consists of several pools of homogeneous processes
//! (node groups), each tagged with one of the fixed node types. The node type
//! decides both the workload kind (stateful vs. stateless) and the position of
//! the group in the cluster rollout order, see [`NodeType`].

use std::collections::{BTreeMap, HashMap};

use k8s_openapi::api::core::v1::{
    Affinity, EnvVar, LocalObjectReference, PersistentVolumeClaim, PodSecurityContext,
    ResourceRequirements, Toleration, Volume, VolumeMount,
};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

pub const APP_NAME: &str = "tessera";

/// File name of the node-local runtime configuration inside its config volume.
pub const RUNTIME_PROPERTIES_FILE: &str = "runtime.properties";
/// File name of the (JVM-style) runtime options inside the node config volume.
pub const RUNTIME_OPTIONS_FILE: &str = "runtime.options";
/// File name of the log configuration inside the node config volume.
pub const LOG_CONFIG_FILE: &str = "log.config";
/// File name of the cluster-common runtime configuration.
pub const COMMON_RUNTIME_PROPERTIES_FILE: &str = "common.runtime.properties";

/// A tessera query engine cluster, managed as a single declarative resource.
///
/// All mandatory fields are modeled with empty-string defaults so that an
/// incomplete manifest surfaces as an accumulated validation failure instead
/// of a deserialization error.
#[derive(Clone, CustomResource, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[kube(
    group = "tessera.dev",
    version = "v1alpha1",
    kind = "TesseraCluster",
    plural = "tesseraclusters",
    shortname = "tsc",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TesseraClusterSpec {
    /// Node groups keyed by a cluster-unique name. The key order carries no
    /// meaning; groups are rolled out in node-type priority order.
    #[serde(default)]
    pub nodes: HashMap<String, NodeGroupSpec>,

    /// Container image used by every node group.
    #[serde(default)]
    pub image: String,

    /// Start script run as the container command. The node type tag is passed
    /// as its single argument.
    #[serde(default)]
    pub start_script: String,

    /// Runtime options (JVM-style) shared by all node groups. A node group
    /// overrides this by setting its own non-empty `runtimeOptions`.
    #[serde(default)]
    pub runtime_options: String,

    /// Log configuration shared by all node groups, overridable per node
    /// group like `runtimeOptions`.
    #[serde(default)]
    pub log_config: String,

    /// Runtime configuration shared by all node groups. Rendered into a
    /// single ConfigMap mounted at `commonConfigMountPath` in every pod.
    #[serde(default)]
    pub common_runtime_properties: String,

    /// Mount path of the common runtime configuration.
    #[serde(default)]
    pub common_config_mount_path: String,

    /// Default affinity for all node groups, overridable per node group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    /// Tolerations applied to every node group, concatenated with the node
    /// group's own tolerations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,

    /// Image pull secrets for every node group.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<LocalObjectReference>,

    /// Default pod security context, overridable per node group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<PodSecurityContext>,

    /// Environment variables applied to every node group, concatenated with
    /// the node group's own variables.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

/// One homogeneous pool of process replicas within the cluster.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupSpec {
    /// Logical name of the group, unique within the cluster. All child
    /// resource names are derived from it.
    #[serde(default)]
    pub name: String,

    /// Node type tag, one of `data-serving`, `batch-processing`,
    /// `coordination`, `ingestion-control`, `ingestion-worker`,
    /// `query-routing`, `query-broker`.
    #[serde(default)]
    pub node_type: String,

    /// Number of replicas, at least 1.
    #[serde(default)]
    pub replicas: i32,

    /// Mount path of the node-local runtime configuration.
    #[serde(default)]
    pub mount_path: String,

    /// Node-local runtime configuration text.
    #[serde(default)]
    pub runtime_properties: String,

    /// Runtime options for this group. An empty or absent value inherits the
    /// cluster-level `runtimeOptions`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_options: Option<String>,

    /// Log configuration for this group, inheriting like `runtimeOptions`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_config: Option<String>,

    /// The network endpoint exposing this group.
    #[serde(default)]
    pub service: EndpointSpec,

    /// Optional ingress route to the group's endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<IngressConfig>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,

    /// Claim templates for stateful node groups, one claim per replica.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_claim_templates: Vec<PersistentVolumeClaim>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<PodSecurityContext>,

    /// Annotations for the group's pods. Defaults to a minimal app annotation
    /// when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,

    /// Labels for all child resources of the group. When unset, a minimal
    /// `{app, type, name}` set is used. Supplied labels are used verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    /// When set, an availability budget bounding voluntary disruptions of
    /// this group's pods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_disruption_budget: Option<PdbConfig>,
}

/// The network endpoint of a node group.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSpec {
    /// Port exposed by the endpoint.
    #[serde(default)]
    pub port: i32,

    /// Container port the endpoint forwards to.
    #[serde(default)]
    pub target_port: i32,

    #[serde(default)]
    pub endpoint_type: EndpointType,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
pub enum EndpointType {
    #[default]
    #[serde(rename = "ClusterIP")]
    ClusterIp,
    NodePort,
    LoadBalancer,
}

impl EndpointType {
    pub fn k8s_service_type(&self) -> String {
        match self {
            Self::ClusterIp => "ClusterIP",
            Self::NodePort => "NodePort",
            Self::LoadBalancer => "LoadBalancer",
        }
        .to_owned()
    }
}

/// Ingress settings of a node group. `hostname` is mandatory when `enabled`.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub hostname: String,

    /// HTTP path routed to the group's endpoint, `/` when empty.
    #[serde(default)]
    pub path: String,

    #[serde(default)]
    pub tls_enabled: bool,

    /// Name of the secret holding the TLS certificate when `tlsEnabled`.
    #[serde(default)]
    pub tls_secret_name: String,

    /// Annotations for the ingress object, used verbatim when supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

/// Availability budget of a node group.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PdbConfig {
    /// Maximum number of pods of this group that may be unavailable at the
    /// same time due to voluntary disruptions.
    #[serde(default)]
    pub max_unavailable: i32,
}

/// The closed set of node types a group can be tagged with.
///
/// Variant order is rollout order: storage-owning and control-plane types
/// become available before the stateless query-serving types that attach to
/// them. [`crate::ordering`] relies on the derived `Ord` for this.
#[derive(
    Clone, Copy, Debug, Display, EnumIter, EnumString, Eq, Hash, Ord, PartialEq, PartialOrd,
)]
#[strum(serialize_all = "kebab-case")]
pub enum NodeType {
    DataServing,
    Coordination,
    IngestionControl,
    IngestionWorker,
    BatchProcessing,
    QueryBroker,
    QueryRouting,
}

impl NodeType {
    /// Whether groups of this type need stable per-replica identity and
    /// ordered rollout.
    pub fn is_stateful(self) -> bool {
        matches!(self, Self::DataServing | Self::IngestionWorker)
    }
}

impl NodeGroupSpec {
    /// Name of the workload, service, ingress and disruption budget objects
    /// synthesized for this group.
    pub fn object_name(&self) -> String {
        format!("{APP_NAME}-{}", self.name)
    }

    /// Name of the node-local configuration ConfigMap.
    pub fn config_map_name(&self) -> String {
        format!("{APP_NAME}-{}-config", self.name)
    }

    /// The runtime options effective for this group: the group's own value if
    /// set and non-empty, otherwise the cluster-level value.
    pub fn effective_runtime_options<'a>(&'a self, cluster: &'a TesseraClusterSpec) -> Option<&'a str> {
        override_or_inherit(self.runtime_options.as_deref(), &cluster.runtime_options)
    }

    /// The log configuration effective for this group, resolved like
    /// [`Self::effective_runtime_options`].
    pub fn effective_log_config<'a>(&'a self, cluster: &'a TesseraClusterSpec) -> Option<&'a str> {
        override_or_inherit(self.log_config.as_deref(), &cluster.log_config)
    }
}

impl TesseraCluster {
    /// Name of the ConfigMap holding the cluster-common runtime
    /// configuration, shared by all node groups of this cluster.
    pub fn common_config_map_name(&self) -> String {
        format!("{APP_NAME}-{}-common-config", self.name_any())
    }
}

/// An empty string on the node group means "inherit the cluster value".
fn override_or_inherit<'a>(node: Option<&'a str>, cluster: &'a str) -> Option<&'a str> {
    match node {
        Some(value) if !value.is_empty() => Some(value),
        _ if !cluster.is_empty() => Some(cluster),
        _ => None,
    }
}
