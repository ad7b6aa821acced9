//! Node - a named entity aggregating components.

use crate::types::{ComponentId, GraphId, TypeTag, TypeTags};

/// Base tag every node kind chain ends with.
pub const NODE_TAG: TypeTag = "node";

/// An entity owning an ordered set of components, member of exactly one
/// graph.
///
/// Names are mutable and not unique; identity is the
/// [`NodeId`](crate::types::NodeId) handed out at creation.
pub struct Node {
    name: String,
    tags: TypeTags,
    graph: GraphId,
    pub(crate) components: Vec<ComponentId>,
}

impl Node {
    pub(crate) fn new(name: impl Into<String>, tags: TypeTags, graph: GraphId) -> Self {
        Self {
            name: name.into(),
            tags,
            graph,
            components: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Capability chain of the node's kind; concrete tag first.
    pub fn tags(&self) -> TypeTags {
        self.tags
    }

    /// Concrete kind tag.
    pub fn tag(&self) -> TypeTag {
        self.tags[0]
    }

    /// The graph this node belongs to.
    pub fn graph(&self) -> GraphId {
        self.graph
    }

    /// Owned components in attach order.
    pub fn components(&self) -> &[ComponentId] {
        &self.components
    }
}
