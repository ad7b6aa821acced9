//! Graph-hosting component - embeds a nested graph in the composition and
//! forwards the per-frame lifecycle into it.

use serde_json::{json, Map, Value};

use crate::component::{Component, Typed, COMPONENT_TAG};
use crate::error::{Error, Result};
use crate::graph::GraphOwner;
use crate::system::System;
use crate::types::{ComponentId, FrameContext, GraphId, NodeId, TypeTag, TypeTags};

/// Owns one nested graph; the host's node embeds that graph's contents in
/// the enclosing composition.
pub struct GraphHost {
    graph: Option<GraphId>,
}

impl GraphHost {
    /// Attach a graph host to `node`, creating its nested graph.
    pub fn attach(system: &mut System, node: NodeId) -> Result<ComponentId> {
        let host = system.attach(node, GraphHost { graph: None })?;
        let graph = system.create_graph(GraphOwner::Host(host));
        if let Some(state) = system.component_mut::<GraphHost>(host) {
            state.graph = Some(graph);
        }
        Ok(host)
    }

    /// The nested graph. Always present after [`attach`](Self::attach).
    pub fn graph(&self) -> Option<GraphId> {
        self.graph
    }

    /// The nested graph's designated root node.
    pub fn root(&self, system: &System) -> Option<NodeId> {
        system.graph(self.graph?)?.root()
    }

    /// Designate `node` (a member of the nested graph) as its root.
    pub fn set_root(system: &mut System, host: ComponentId, node: NodeId) -> Result<()> {
        let graph = system
            .component::<GraphHost>(host)
            .and_then(GraphHost::graph)
            .ok_or_else(|| Error::structural("host has no nested graph"))?;
        system.set_graph_root(graph, Some(node))
    }
}

impl Typed for GraphHost {
    const TAG: TypeTag = "graph-host";
    const TAGS: TypeTags = &[Self::TAG, COMPONENT_TAG];
}

impl Component for GraphHost {
    fn tags(&self) -> TypeTags {
        Self::TAGS
    }

    fn update(&mut self, system: &mut System, _me: ComponentId, ctx: &FrameContext) -> bool {
        let Some(graph) = self.graph else {
            return false;
        };
        system.graph_update(graph, ctx)
    }

    /// Marks the host itself changed before delegating, so the nested graph
    /// is never skipped by the render gate upstream.
    fn tick(&mut self, system: &mut System, me: ComponentId, ctx: &FrameContext) {
        system.mark_changed(me);
        if let Some(graph) = self.graph {
            system.graph_tick(graph, ctx);
        }
    }

    fn pre_render(&mut self, system: &mut System, _me: ComponentId, ctx: &FrameContext) {
        if let Some(graph) = self.graph {
            system.graph_pre_render(graph, ctx);
        }
    }

    fn post_render(&mut self, system: &mut System, _me: ComponentId, ctx: &FrameContext) {
        if let Some(graph) = self.graph {
            system.graph_post_render(graph, ctx);
        }
    }

    fn inflate(&mut self, system: &mut System, _me: ComponentId, data: &Value) -> Result<()> {
        let Some(graph) = self.graph else {
            return Err(Error::structural("inflating a host without a nested graph"));
        };
        if let Some(inner) = data.get("graph") {
            system.graph_inflate(graph, inner)?;
        }
        if let Some(index) = data.get("root").and_then(Value::as_u64) {
            let node = system
                .graph(graph)
                .and_then(|g| g.nodes().get(index as usize).copied())
                .ok_or_else(|| {
                    Error::MalformedData(format!("host root index {index} out of range"))
                })?;
            system.set_graph_root(graph, Some(node))?;
        }
        Ok(())
    }

    /// The serialized record carries the nested graph under `graph`.
    fn deflate(&self, system: &System) -> Value {
        let mut record = Map::new();
        if let Some(graph) = self.graph {
            if let Some(g) = system.graph(graph) {
                if let Some(index) = g.root().and_then(|r| g.node_position(r)) {
                    record.insert("root".into(), json!(index));
                }
            }
            record.insert("graph".into(), system.graph_deflate(graph));
        }
        Value::Object(record)
    }

    fn dispose(&mut self, system: &mut System, _me: ComponentId) {
        if let Some(graph) = self.graph.take() {
            system.dispose_graph(graph);
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
