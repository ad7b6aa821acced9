//! System - the process-wide authority for one running composition.
//!
//! The system owns the arenas every object lives in, the global type-indexed
//! registries, the type registry used during deserialization, the event hub
//! and the root graph. The registries are indexes, not owners: lifetime is
//! governed by the explicit disposal paths here, and the global registries
//! are always a superset of every graph's local ones.

use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, warn};
use serde_json::{json, Map, Value};

use crate::component::{Component, ComponentFlags, Typed};
use crate::error::{Error, Result};
use crate::events::Hub;
use crate::graph::{Graph, GraphOwner};
use crate::graph_host::GraphHost;
use crate::hierarchy::{self, Hierarchy};
use crate::node::{Node, NODE_TAG};
use crate::registry::ObjectRegistry;
use crate::types::{Arena, ComponentId, GraphId, NodeId, TypeTag, TypeTags};

// =============================================================================
// Type registry
// =============================================================================

/// Builds a component of one concrete type attached to the given node.
pub type ComponentFactory = fn(&mut System, NodeId) -> Result<ComponentId>;

/// Builds a node of one concrete kind inside the given graph.
pub type NodeFactory = fn(&mut System, GraphId, &str) -> Result<NodeId>;

/// Maps serialized type names to factories.
#[derive(Default)]
pub struct TypeRegistry {
    components: HashMap<TypeTag, ComponentFactory>,
    nodes: HashMap<TypeTag, NodeFactory>,
}

impl TypeRegistry {
    fn component(&self, tag: &str) -> Result<ComponentFactory> {
        self.components
            .get(tag)
            .copied()
            .ok_or_else(|| Error::UnknownType(tag.to_string()))
    }

    fn node(&self, tag: &str) -> Result<NodeFactory> {
        self.nodes
            .get(tag)
            .copied()
            .ok_or_else(|| Error::UnknownType(tag.to_string()))
    }
}

// =============================================================================
// System
// =============================================================================

pub(crate) struct Entry {
    node: NodeId,
    flags: ComponentFlags,
    tags: TypeTags,
    state: Option<Box<dyn Component>>,
}

pub struct System {
    nodes: Arena<NodeId, Node>,
    components: Arena<ComponentId, Entry>,
    graphs: Arena<GraphId, Graph>,
    node_index: ObjectRegistry<NodeId>,
    component_index: ObjectRegistry<ComponentId>,
    types: TypeRegistry,
    hub: Rc<Hub>,
    root: GraphId,
}

impl System {
    /// Create a system with an empty root graph and the built-in node,
    /// hierarchy and graph-host types registered.
    pub fn new() -> Self {
        let mut graphs = Arena::new();
        let root = graphs.insert(Graph::new(GraphOwner::System));
        let mut system = Self {
            nodes: Arena::new(),
            components: Arena::new(),
            graphs,
            node_index: ObjectRegistry::new(),
            component_index: ObjectRegistry::new(),
            types: TypeRegistry::default(),
            hub: Hub::new(),
            root,
        };
        system.register_node_type(NODE_TAG, |system, graph, name| {
            system.create_node(graph, name)
        });
        system.register_component_type(Hierarchy::TAG, Hierarchy::attach);
        system.register_component_type(GraphHost::TAG, GraphHost::attach);
        system
    }

    /// The root graph id.
    pub fn root_graph(&self) -> GraphId {
        self.root
    }

    /// Shared handle on the event hub.
    pub fn hub(&self) -> Rc<Hub> {
        Rc::clone(&self.hub)
    }

    pub fn graph(&self, id: GraphId) -> Option<&Graph> {
        self.graphs.get(id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Global node registry.
    pub fn node_index(&self) -> &ObjectRegistry<NodeId> {
        &self.node_index
    }

    /// Global component registry.
    pub fn component_index(&self) -> &ObjectRegistry<ComponentId> {
        &self.component_index
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    // =========================================================================
    // Type registration
    // =========================================================================

    /// Register a node kind for deserialization.
    pub fn register_node_type(&mut self, tag: TypeTag, factory: NodeFactory) {
        self.types.nodes.insert(tag, factory);
    }

    /// Register a component type for deserialization.
    pub fn register_component_type(&mut self, tag: TypeTag, factory: ComponentFactory) {
        self.types.components.insert(tag, factory);
    }

    // =========================================================================
    // Graphs
    // =========================================================================

    pub(crate) fn create_graph(&mut self, owner: GraphOwner) -> GraphId {
        let id = self.graphs.insert(Graph::new(owner));
        debug!("graph {id:?} created ({owner:?})");
        id
    }

    /// Dispose every node in `graph`, then the graph itself.
    pub(crate) fn dispose_graph(&mut self, graph: GraphId) {
        while let Some(&node) = self.graphs.get(graph).and_then(|g| g.nodes.first()) {
            self.remove_node(node);
        }
        self.graphs.remove(graph);
        debug!("graph {graph:?} disposed");
    }

    /// Designate `node` as `graph`'s traversal root (`None` clears).
    pub fn set_graph_root(&mut self, graph: GraphId, node: Option<NodeId>) -> Result<()> {
        if let Some(node) = node {
            let member = self.nodes.get(node).is_some_and(|n| n.graph() == graph);
            if !member {
                return Err(Error::structural("root node is not a member of the graph"));
            }
        }
        let Some(g) = self.graphs.get_mut(graph) else {
            return Err(Error::structural("graph is not alive"));
        };
        g.root = node;
        Ok(())
    }

    pub(crate) fn graph_components(&self, graph: GraphId) -> Vec<ComponentId> {
        self.graphs
            .get(graph)
            .map(|g| g.component_index.get_array(None).to_vec())
            .unwrap_or_default()
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    /// Create a plain node in `graph`.
    pub fn create_node(&mut self, graph: GraphId, name: &str) -> Result<NodeId> {
        self.create_node_tagged(graph, name, &[NODE_TAG])
    }

    /// Create a node with a custom kind chain (concrete tag first, ending
    /// with the base `node` tag).
    pub fn create_node_tagged(
        &mut self,
        graph: GraphId,
        name: &str,
        tags: TypeTags,
    ) -> Result<NodeId> {
        if self.graphs.get(graph).is_none() {
            return Err(Error::structural("graph is not alive"));
        }
        let id = self.nodes.insert(Node::new(name, tags, graph));
        if let Some(g) = self.graphs.get_mut(graph) {
            g.nodes.push(id);
            g.node_index.add(id, tags);
        }
        self.node_index.add(id, tags);
        debug!("node {id:?} `{name}` created in {graph:?}");
        self.hub.node_added.emit(&id);
        Ok(id)
    }

    /// Dispose `node`: its components in reverse attach order (with the
    /// hierarchy cascade), then the node itself. Stale ids are a no-op.
    pub fn remove_node(&mut self, node: NodeId) {
        if !self.nodes.contains(node) {
            return;
        }
        while let Some(&component) = self.nodes.get(node).and_then(|n| n.components.last()) {
            self.remove_component(component);
        }
        let Some(data) = self.nodes.remove(node) else {
            return;
        };
        let graph = data.graph();
        if let Some(g) = self.graphs.get_mut(graph) {
            g.nodes.retain(|n| *n != node);
            g.node_index.remove(node);
            if g.root == Some(node) {
                g.root = None;
            }
        }
        self.node_index.remove(node);
        debug!("node {node:?} `{}` disposed", data.name());
        self.hub.node_removed.emit(&node);
    }

    // =========================================================================
    // Components
    // =========================================================================

    /// Attach `component` to `node`.
    ///
    /// Fails when the node is dead, when the node already owns a component of
    /// the same concrete tag (unless the type opts out of exclusivity), or
    /// when the type is a system singleton that already has a live instance.
    pub fn attach<C: Component>(&mut self, node: NodeId, component: C) -> Result<ComponentId> {
        self.attach_boxed(node, Box::new(component))
    }

    pub fn attach_boxed(
        &mut self,
        node: NodeId,
        component: Box<dyn Component>,
    ) -> Result<ComponentId> {
        let tags = component.tags();
        let tag = component.tag();
        let Some(node_data) = self.nodes.get(node) else {
            return Err(Error::structural("node is not alive"));
        };
        if component.exclusive()
            && node_data
                .components
                .iter()
                .any(|&c| self.component_tag(c) == Some(tag))
        {
            return Err(Error::structural(format!(
                "node already owns a `{tag}` component"
            )));
        }
        if component.singleton() && self.component_index.has(tag) {
            return Err(Error::DuplicateSingleton(tag));
        }
        let mut flags = ComponentFlags::CHANGED;
        if component.singleton() {
            flags.insert(ComponentFlags::SINGLETON);
        }
        let graph = node_data.graph();
        let id = self.components.insert(Entry {
            node,
            flags,
            tags,
            state: Some(component),
        });
        if let Some(n) = self.nodes.get_mut(node) {
            n.components.push(id);
        }
        if let Some(g) = self.graphs.get_mut(graph) {
            g.component_index.add(id, tags);
        }
        self.component_index.add(id, tags);
        debug!("component {id:?} `{tag}` attached to {node:?}");
        self.hub.component_added.emit(&id);
        Ok(id)
    }

    /// Dispose `component`: structural teardown (hierarchy detach and child
    /// cascade, nested graph disposal), the dispose hook, then registry
    /// removal. Stale ids are a no-op.
    pub fn remove_component(&mut self, component: ComponentId) {
        if !self.components.contains(component) {
            return;
        }
        // Hierarchy teardown runs while every object is still addressable, so
        // the detach multicast reaches the full ancestor chain.
        if self.component::<Hierarchy>(component).is_some() {
            if let Some(parent) = self
                .component::<Hierarchy>(component)
                .and_then(Hierarchy::parent)
            {
                let _ = hierarchy::remove_child(self, parent, component);
            }
            let children: Vec<ComponentId> = self
                .component::<Hierarchy>(component)
                .map(|h| h.children().to_vec())
                .unwrap_or_default();
            for child in children {
                if let Some(node) = self.component_owner(child) {
                    self.remove_node(node);
                }
            }
        }
        let Some(mut state) = self.take_state(component) else {
            // Mid-lifecycle removal: the behavior object is out with its
            // caller; drop the bookkeeping only.
            self.unregister_component(component);
            return;
        };
        state.dispose(self, component);
        self.unregister_component(component);
    }

    fn unregister_component(&mut self, component: ComponentId) {
        let Some(entry) = self.components.remove(component) else {
            return;
        };
        if let Some(n) = self.nodes.get_mut(entry.node) {
            n.components.retain(|c| *c != component);
        }
        if let Some(graph) = self.nodes.get(entry.node).map(Node::graph) {
            if let Some(g) = self.graphs.get_mut(graph) {
                g.component_index.remove(component);
            }
        }
        self.component_index.remove(component);
        debug!("component {component:?} `{}` disposed", entry.tags[0]);
        self.hub.component_removed.emit(&component);
    }

    pub(crate) fn take_state(&mut self, id: ComponentId) -> Option<Box<dyn Component>> {
        self.components.get_mut(id)?.state.take()
    }

    pub(crate) fn put_state(&mut self, id: ComponentId, state: Box<dyn Component>) {
        if let Some(entry) = self.components.get_mut(id) {
            entry.state = Some(state);
        }
    }

    /// Set the changed flag on `component`. Works while the component is mid
    /// lifecycle call.
    pub fn mark_changed(&mut self, component: ComponentId) {
        if let Some(entry) = self.components.get_mut(component) {
            entry.flags.insert(ComponentFlags::CHANGED);
        }
    }

    pub fn is_changed(&self, component: ComponentId) -> bool {
        self.components
            .get(component)
            .is_some_and(|e| e.flags.contains(ComponentFlags::CHANGED))
    }

    pub(crate) fn clear_changed(&mut self, component: ComponentId) {
        if let Some(entry) = self.components.get_mut(component) {
            entry.flags.remove(ComponentFlags::CHANGED);
        }
    }

    /// Borrow `component` as concrete type `C`.
    pub fn component<C: Component + Typed>(&self, id: ComponentId) -> Option<&C> {
        self.components
            .get(id)?
            .state
            .as_ref()?
            .as_any()
            .downcast_ref::<C>()
    }

    pub fn component_mut<C: Component + Typed>(&mut self, id: ComponentId) -> Option<&mut C> {
        self.components
            .get_mut(id)?
            .state
            .as_mut()?
            .as_any_mut()
            .downcast_mut::<C>()
    }

    /// Borrow the behavior object untyped.
    pub fn component_dyn(&self, id: ComponentId) -> Option<&dyn Component> {
        self.components.get(id)?.state.as_deref()
    }

    /// Node owning `component`.
    pub fn component_owner(&self, component: ComponentId) -> Option<NodeId> {
        self.components.get(component).map(|e| e.node)
    }

    /// Capability chain of `component`.
    pub fn component_tags(&self, component: ComponentId) -> Option<TypeTags> {
        self.components.get(component).map(|e| e.tags)
    }

    fn component_tag(&self, component: ComponentId) -> Option<TypeTag> {
        self.components.get(component).map(|e| e.tags[0])
    }

    /// First component on `node` satisfying `tag` (polymorphic).
    pub fn component_on_tag(&self, node: NodeId, tag: &str) -> Option<ComponentId> {
        let node_data = self.nodes.get(node)?;
        node_data.components.iter().copied().find(|&c| {
            self.component_tags(c)
                .is_some_and(|tags| tags.iter().any(|t| *t == tag))
        })
    }

    /// First component on `node` satisfying type `C`.
    pub fn component_on<C: Typed>(&self, node: NodeId) -> Option<ComponentId> {
        self.component_on_tag(node, C::TAG)
    }

    // =========================================================================
    // Typed queries
    // =========================================================================

    /// Single (first) live component filed under `C`, globally.
    pub fn get_component<C: Typed>(&self) -> Result<ComponentId> {
        self.component_index.get(Some(C::TAG))
    }

    /// Non-throwing form of [`get_component`](Self::get_component).
    pub fn get_component_opt<C: Typed>(&self) -> Option<ComponentId> {
        self.component_index.get_opt(Some(C::TAG))
    }

    pub fn components_of<C: Typed>(&self) -> &[ComponentId] {
        self.component_index.get_array(Some(C::TAG))
    }

    pub fn has_component<C: Typed>(&self) -> bool {
        self.component_index.has(C::TAG)
    }

    /// Single (first) live node filed under `tag`, globally.
    pub fn get_node(&self, tag: TypeTag) -> Result<NodeId> {
        self.node_index.get(Some(tag))
    }

    /// Non-throwing form of [`get_node`](Self::get_node).
    pub fn get_node_opt(&self, tag: TypeTag) -> Option<NodeId> {
        self.node_index.get_opt(Some(tag))
    }

    pub fn nodes_of(&self, tag: TypeTag) -> &[NodeId] {
        self.node_index.get_array(Some(tag))
    }

    pub fn has_node(&self, tag: TypeTag) -> bool {
        self.node_index.has(tag)
    }

    fn root_graph_ref(&self) -> Option<&Graph> {
        self.graphs.get(self.root)
    }

    /// [`get_component`](Self::get_component) scoped to the root graph.
    pub fn main_get_component<C: Typed>(&self) -> Result<ComponentId> {
        self.root_graph_ref()
            .ok_or(Error::NotFound(C::TAG))?
            .component_index
            .get(Some(C::TAG))
    }

    /// [`components_of`](Self::components_of) scoped to the root graph.
    pub fn main_components_of<C: Typed>(&self) -> &[ComponentId] {
        self.root_graph_ref()
            .map(|g| g.component_index.get_array(Some(C::TAG)))
            .unwrap_or(&[])
    }

    pub fn main_has_component<C: Typed>(&self) -> bool {
        self.root_graph_ref()
            .is_some_and(|g| g.component_index.has(C::TAG))
    }

    /// [`get_node`](Self::get_node) scoped to the root graph.
    pub fn main_get_node(&self, tag: TypeTag) -> Result<NodeId> {
        self.root_graph_ref()
            .ok_or(Error::NotFound(tag))?
            .node_index
            .get(Some(tag))
    }

    /// [`nodes_of`](Self::nodes_of) scoped to the root graph.
    pub fn main_nodes_of(&self, tag: TypeTag) -> &[NodeId] {
        self.root_graph_ref()
            .map(|g| g.node_index.get_array(Some(tag)))
            .unwrap_or(&[])
    }

    pub fn main_has_node(&self, tag: TypeTag) -> bool {
        self.root_graph_ref().is_some_and(|g| g.node_index.has(tag))
    }

    /// Linear scan over the tag-filtered node sequence; first name match
    /// wins. Returns `None` when nothing matches.
    pub fn find_node_by_name(&self, name: &str, tag: Option<TypeTag>) -> Option<NodeId> {
        self.node_index
            .get_array(tag)
            .iter()
            .copied()
            .find(|&id| self.nodes.get(id).is_some_and(|n| n.name() == name))
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    /// Serialize the whole composition rooted at the root graph.
    pub fn deflate(&self) -> Value {
        self.graph_deflate(self.root)
    }

    /// Serialize one graph to its JSON-compatible record.
    pub fn graph_deflate(&self, graph: GraphId) -> Value {
        let Some(g) = self.graphs.get(graph) else {
            return json!({ "nodes": [] });
        };
        let mut nodes = Vec::with_capacity(g.nodes.len());
        for &node in &g.nodes {
            let Some(node_data) = self.nodes.get(node) else {
                continue;
            };
            let mut components = Vec::new();
            for &component in &node_data.components {
                let Some(state) = self.component_dyn(component) else {
                    continue;
                };
                let mut record = match state.deflate(self) {
                    Value::Object(map) => map,
                    other => {
                        let mut map = Map::new();
                        map.insert("data".into(), other);
                        map
                    }
                };
                record.insert("type".into(), json!(state.tag()));
                components.push(Value::Object(record));
            }
            nodes.push(json!({
                "name": node_data.name(),
                "type": node_data.tag(),
                "components": components,
            }));
        }
        let mut record = Map::new();
        record.insert("nodes".into(), Value::Array(nodes));
        if let Some(index) = g.root.and_then(|r| g.node_position(r)) {
            record.insert("root".into(), json!(index));
        }
        Value::Object(record)
    }

    /// Restore the whole composition from `data`, replacing the current
    /// contents of the root graph.
    pub fn inflate(&mut self, data: &Value) -> Result<()> {
        while let Some(&node) = self.graphs.get(self.root).and_then(|g| g.nodes.first()) {
            self.remove_node(node);
        }
        let root = self.root;
        self.graph_inflate(root, data)
    }

    /// Restore one graph from its record. On failure every node created by
    /// this call is disposed again, so the registries never reference partial
    /// objects.
    pub fn graph_inflate(&mut self, graph: GraphId, data: &Value) -> Result<()> {
        let mut created = Vec::new();
        let result = self.graph_inflate_inner(graph, data, &mut created);
        if result.is_err() {
            warn!(
                "inflate of {graph:?} failed; disposing {} partial nodes",
                created.len()
            );
            for node in created.into_iter().rev() {
                self.remove_node(node);
            }
        }
        result
    }

    fn graph_inflate_inner(
        &mut self,
        graph: GraphId,
        data: &Value,
        created: &mut Vec<NodeId>,
    ) -> Result<()> {
        let record = data
            .as_object()
            .ok_or_else(|| Error::MalformedData("graph record is not an object".into()))?;
        let node_records = record
            .get("nodes")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::MalformedData("graph record has no `nodes` array".into()))?;

        // Phase one: construct every node and component through the type
        // registry, keeping their records for the inflate hooks.
        let mut pending: Vec<(ComponentId, Value)> = Vec::new();
        for node_record in node_records {
            let name = node_record
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::MalformedData("node record has no string `name`".into()))?;
            let kind = node_record
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or(NODE_TAG);
            let factory = self.types.node(kind)?;
            let node = factory(self, graph, name)?;
            created.push(node);
            let component_records = node_record
                .get("components")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            for component_record in component_records {
                let tag = component_record
                    .get("type")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        Error::MalformedData("component record has no string `type`".into())
                    })?;
                let factory = self.types.component(tag)?;
                let component = factory(self, node)?;
                pending.push((component, component_record.clone()));
            }
        }

        // Phase two: run the inflate hooks now that every object exists.
        for (component, component_record) in &pending {
            let Some(mut state) = self.take_state(*component) else {
                continue;
            };
            let result = state.inflate(self, *component, component_record);
            self.put_state(*component, state);
            result?;
        }

        // Root designation, by node position.
        if let Some(index) = record.get("root").and_then(Value::as_u64) {
            let node = self
                .graphs
                .get(graph)
                .and_then(|g| g.nodes.get(index as usize).copied())
                .ok_or_else(|| {
                    Error::MalformedData(format!("graph root index {index} out of range"))
                })?;
            self.set_graph_root(graph, Some(node))?;
        }
        Ok(())
    }
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}
