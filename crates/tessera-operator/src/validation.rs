//! Spec validation, run as a gate before every reconciliation pass.
//!
//! All field checks are independent and every violation is accumulated, so a
//! single pass reports everything that is wrong with a manifest.

use std::fmt::{self, Display, Formatter};

use crate::crd::TesseraCluster;

/// A collection of violations discovered during validation.
#[derive(Debug, Eq, PartialEq)]
pub struct Violations(Vec<String>);

impl Violations {
    pub fn messages(&self) -> &[String] {
        &self.0
    }
}

impl Display for Violations {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, message) in self.0.iter().enumerate() {
            let prefix = match i {
                0 => "",
                _ => ", ",
            };
            write!(f, "{prefix}{message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Violations {}

/// Checks every invariant of the cluster spec and its node groups.
///
/// Pure and total: an invalid spec is reported through the returned
/// [`Violations`], never through a panic. Node groups are visited in key
/// order so the report is stable across passes.
pub fn validate(cluster: &TesseraCluster) -> Result<(), Violations> {
    let spec = &cluster.spec;
    let mut violations = Vec::new();

    if spec.image.is_empty() {
        violations.push("image missing from cluster spec".to_owned());
    }
    if spec.start_script.is_empty() {
        violations.push("start script missing from cluster spec".to_owned());
    }
    if spec.common_runtime_properties.is_empty() {
        violations.push("common runtime properties missing from cluster spec".to_owned());
    }
    if spec.common_config_mount_path.is_empty() {
        violations.push("common config mount path missing from cluster spec".to_owned());
    }

    let mut keys = spec.nodes.keys().collect::<Vec<_>>();
    keys.sort();

    for key in keys {
        let node = &spec.nodes[key];

        if node.name.is_empty() {
            violations.push(format!("node group [{key}]: name missing"));
        }
        if node.node_type.is_empty() {
            violations.push(format!("node group [{key}]: node type missing"));
        }
        if node.replicas < 1 {
            violations.push(format!("node group [{key}]: at least one replica required"));
        }
        if node.runtime_properties.is_empty() {
            violations.push(format!("node group [{key}]: runtime properties missing"));
        }
        if node.mount_path.is_empty() {
            violations.push(format!("node group [{key}]: mount path missing"));
        }
        if node.service.port == 0 || node.service.target_port == 0 {
            violations.push(format!(
                "node group [{key}]: service port and target port must be set"
            ));
        }
        if node
            .ingress
            .as_ref()
            .is_some_and(|ingress| ingress.enabled && ingress.hostname.is_empty())
        {
            violations.push(format!(
                "node group [{key}]: ingress is enabled but no hostname is set"
            ));
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(Violations(violations))
    }
}
