//! Resource dependency graph for a site stack.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use thiserror::Error;

use crate::config::SiteConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Bucket,
    OriginAccessIdentity,
    BucketPolicy,
    BucketFolder,
    Certificate,
    ValidationRecord,
    CertificateValidation,
    Distribution,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Bucket => "bucket",
            ResourceKind::OriginAccessIdentity => "origin-access-identity",
            ResourceKind::BucketPolicy => "bucket-policy",
            ResourceKind::BucketFolder => "bucket-folder",
            ResourceKind::Certificate => "certificate",
            ResourceKind::ValidationRecord => "validation-record",
            ResourceKind::CertificateValidation => "certificate-validation",
            ResourceKind::Distribution => "distribution",
        }
    }

    fn dot_shape(&self) -> &'static str {
        match self {
            ResourceKind::Bucket | ResourceKind::BucketFolder => "cylinder",
            ResourceKind::OriginAccessIdentity | ResourceKind::BucketPolicy => "note",
            ResourceKind::Certificate | ResourceKind::CertificateValidation => "octagon",
            ResourceKind::ValidationRecord => "box",
            ResourceKind::Distribution => "doubleoctagon",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceNode {
    pub id: String,
    pub kind: ResourceKind,
    /// Name of the declared resource.
    pub name: String,
    pub depends_on: Vec<String>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GraphError {
    #[error("resource {0} is declared twice")]
    DuplicateId(String),
    #[error("resource {id} depends on undeclared resource {dependency}")]
    UnknownDependency { id: String, dependency: String },
    #[error("unknown resource {0}")]
    UnknownNode(String),
}

/// Nodes in insertion order. A node may only depend on nodes added before it,
/// so the graph is acyclic by construction.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceGraph {
    nodes: Vec<ResourceNode>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        id: impl Into<String>,
        kind: ResourceKind,
        name: impl Into<String>,
        depends_on: &[&str],
    ) -> Result<(), GraphError> {
        let id = id.into();
        if self.index.contains_key(&id) {
            return Err(GraphError::DuplicateId(id));
        }
        if let Some(missing) = depends_on
            .iter()
            .find(|dependency| !self.index.contains_key(**dependency))
        {
            return Err(GraphError::UnknownDependency {
                id,
                dependency: missing.to_string(),
            });
        }

        let mut deps: Vec<String> = Vec::with_capacity(depends_on.len());
        for dependency in depends_on {
            if !deps.iter().any(|existing| existing == dependency) {
                deps.push(dependency.to_string());
            }
        }

        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(ResourceNode {
            id,
            kind,
            name: name.into(),
            depends_on: deps,
        });
        Ok(())
    }

    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn get(&self, id: &str) -> Option<&ResourceNode> {
        self.index.get(id).map(|&position| &self.nodes[position])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn dependencies_of(&self, id: &str) -> Result<&[String], GraphError> {
        self.get(id)
            .map(|node| node.depends_on.as_slice())
            .ok_or_else(|| GraphError::UnknownNode(id.to_string()))
    }

    /// Groups nodes into apply waves. A node lands in the first wave after all of
    /// its dependencies; nodes within a wave keep insertion order.
    pub fn apply_waves(&self) -> Vec<Vec<String>> {
        let mut remaining: Vec<usize> = self.nodes.iter().map(|n| n.depends_on.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (position, node) in self.nodes.iter().enumerate() {
            for dependency in &node.depends_on {
                if let Some(&dep) = self.index.get(dependency) {
                    dependents[dep].push(position);
                }
            }
        }

        let mut waves = Vec::new();
        let mut ready: Vec<usize> = (0..self.nodes.len())
            .filter(|&position| remaining[position] == 0)
            .collect();
        while !ready.is_empty() {
            let mut next = BTreeSet::new();
            for &position in &ready {
                for &dependent in &dependents[position] {
                    remaining[dependent] -= 1;
                    if remaining[dependent] == 0 {
                        next.insert(dependent);
                    }
                }
            }
            waves.push(
                ready
                    .iter()
                    .map(|&position| self.nodes[position].id.clone())
                    .collect(),
            );
            ready = next.into_iter().collect();
        }
        waves
    }

    /// Renders the graph as a Graphviz digraph with edges pointing from a
    /// resource to the resources that need it.
    pub fn to_dot(&self) -> String {
        let mut out = String::with_capacity(1024);
        out.push_str("digraph staticsite {\n");
        out.push_str("    rankdir=LR;\n");
        out.push_str("    node [fontname=\"Helvetica\", fontsize=10];\n\n");
        for node in &self.nodes {
            out.push_str(&format!(
                "    {} [label=\"{}\\n({})\", shape={}];\n",
                sanitize(&node.id),
                escape(&node.name),
                node.kind.as_str(),
                node.kind.dot_shape(),
            ));
        }
        out.push('\n');
        for node in &self.nodes {
            for dependency in &node.depends_on {
                out.push_str(&format!(
                    "    {} -> {};\n",
                    sanitize(dependency),
                    sanitize(&node.id)
                ));
            }
        }
        out.push_str("}\n");
        out
    }
}

fn sanitize(id: &str) -> String {
    id.replace(['-', '.', '/', ' ', ':', '*'], "_")
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

pub const BUCKET: &str = "bucket";
pub const ORIGIN_ACCESS_IDENTITY: &str = "origin-access-identity";
pub const BUCKET_POLICY: &str = "bucket-policy";
pub const BUCKET_FOLDER: &str = "bucket-folder";
pub const CERTIFICATE: &str = "certificate";
pub const CERTIFICATE_VALIDATION: &str = "certificate-validation";
pub const DISTRIBUTION: &str = "distribution";

pub fn validation_record_id(domain: &str) -> String {
    format!("validation-record:{domain}")
}

/// Declares every resource of a site stack and the order they depend on each other.
pub fn site_graph(config: &SiteConfig) -> Result<ResourceGraph, GraphError> {
    let primary = config.primary_domain();
    let primary = primary.as_str();
    let mut graph = ResourceGraph::new();

    graph.add(BUCKET, ResourceKind::Bucket, primary, &[])?;
    graph.add(
        ORIGIN_ACCESS_IDENTITY,
        ResourceKind::OriginAccessIdentity,
        "cdn-s3",
        &[],
    )?;
    graph.add(
        BUCKET_POLICY,
        ResourceKind::BucketPolicy,
        "pol-cdn-s3",
        &[BUCKET, ORIGIN_ACCESS_IDENTITY],
    )?;
    graph.add(BUCKET_FOLDER, ResourceKind::BucketFolder, "/", &[BUCKET])?;
    graph.add(
        CERTIFICATE,
        ResourceKind::Certificate,
        format!("cert-{primary}"),
        &[],
    )?;

    // A wildcard is proven by the same record as its base domain.
    let mut record_ids = Vec::new();
    for alias in config.aliases() {
        let domain = alias.strip_prefix("*.").unwrap_or(&alias);
        let id = validation_record_id(domain);
        if record_ids.contains(&id) {
            continue;
        }
        graph.add(
            id.clone(),
            ResourceKind::ValidationRecord,
            format!("validation-r53-{domain}"),
            &[CERTIFICATE],
        )?;
        record_ids.push(id);
    }

    let mut validation_deps = vec![CERTIFICATE];
    validation_deps.extend(record_ids.iter().map(String::as_str));
    graph.add(
        CERTIFICATE_VALIDATION,
        ResourceKind::CertificateValidation,
        "validation-cert",
        &validation_deps,
    )?;
    graph.add(
        DISTRIBUTION,
        ResourceKind::Distribution,
        primary,
        &[BUCKET, ORIGIN_ACCESS_IDENTITY, CERTIFICATE_VALIDATION],
    )?;
    Ok(graph)
}
