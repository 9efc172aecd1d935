//! Expansion of the node-group map into the deterministic rollout sequence.

use std::str::FromStr;

use snafu::{OptionExt, Snafu};

use crate::crd::{NodeGroupSpec, NodeType, TesseraCluster};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("node group [{key}] has unknown node type [{node_type}]"))]
    UnknownNodeType { key: String, node_type: String },
}

/// A node group together with its decoded node type and the key it is stored
/// under in the cluster spec.
#[derive(Clone, Copy, Debug)]
pub struct OrderedNodeGroup<'a> {
    pub key: &'a str,
    pub spec: &'a NodeGroupSpec,
    pub node_type: NodeType,
}

/// Decodes every node group's type tag and returns the groups in node-type
/// priority order.
///
/// Cross-type order is always [`NodeType`]'s rollout order. Within one node
/// type, groups keep the source map's iteration order, which is not stable
/// across passes. Any unknown type tag fails the whole expansion.
pub fn ordered_node_groups(cluster: &TesseraCluster) -> Result<Vec<OrderedNodeGroup<'_>>> {
    let mut groups = Vec::with_capacity(cluster.spec.nodes.len());

    for (key, spec) in &cluster.spec.nodes {
        let node_type = NodeType::from_str(&spec.node_type)
            .ok()
            .context(UnknownNodeTypeSnafu {
                key: key.as_str(),
                node_type: spec.node_type.as_str(),
            })?;
        groups.push(OrderedNodeGroup {
            key,
            spec,
            node_type,
        });
    }

    // Stable sort, so in-type order stays as iterated.
    groups.sort_by_key(|group| group.node_type);

    Ok(groups)
}
