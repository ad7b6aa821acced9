//! Graph - an addressable scope of nodes and components, plus the per-frame
//! passes that run over one.
//!
//! A graph owns the insertion order of its nodes and mirrors the global
//! registries at local scope. The per-frame passes walk the graph's component
//! sequence: update and tick visit everything, the render passes are gated on
//! the changed flag
//! ([`ComponentFlags::CHANGED`](crate::component::ComponentFlags::CHANGED)).

use log::trace;

use crate::registry::ObjectRegistry;
use crate::system::System;
use crate::types::{ComponentId, FrameContext, GraphId, NodeId};

// =============================================================================
// Graph
// =============================================================================

/// Who a graph belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphOwner {
    /// The system's root graph.
    System,
    /// Nested under a graph-hosting component.
    Host(ComponentId),
}

pub struct Graph {
    owner: GraphOwner,
    pub(crate) nodes: Vec<NodeId>,
    pub(crate) node_index: ObjectRegistry<NodeId>,
    pub(crate) component_index: ObjectRegistry<ComponentId>,
    pub(crate) root: Option<NodeId>,
}

impl Graph {
    pub(crate) fn new(owner: GraphOwner) -> Self {
        Self {
            owner,
            nodes: Vec::new(),
            node_index: ObjectRegistry::new(),
            component_index: ObjectRegistry::new(),
            root: None,
        }
    }

    pub fn owner(&self) -> GraphOwner {
        self.owner
    }

    /// Nodes in creation order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Designated root node for traversal, if any.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Scope-local node registry.
    pub fn node_index(&self) -> &ObjectRegistry<NodeId> {
        &self.node_index
    }

    /// Scope-local component registry.
    pub fn component_index(&self) -> &ObjectRegistry<ComponentId> {
        &self.component_index
    }

    /// Position of `node` in creation order.
    pub fn node_position(&self, node: NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| *n == node)
    }
}

// =============================================================================
// Per-frame passes
// =============================================================================

impl System {
    /// Run the update pass on the root graph. Returns whether anything
    /// changed anywhere in the composition.
    pub fn update(&mut self, ctx: &FrameContext) -> bool {
        self.graph_update(self.root_graph(), ctx)
    }

    /// Run the tick pass on the root graph.
    pub fn tick(&mut self, ctx: &FrameContext) {
        self.graph_tick(self.root_graph(), ctx)
    }

    /// Run the pre-render pass on the root graph.
    pub fn pre_render(&mut self, ctx: &FrameContext) {
        self.graph_pre_render(self.root_graph(), ctx)
    }

    /// Run the post-render pass on the root graph, clearing changed flags.
    pub fn post_render(&mut self, ctx: &FrameContext) {
        self.graph_post_render(self.root_graph(), ctx)
    }

    /// Update every component of `graph` in insertion order, folding
    /// "changed" results into the flags.
    pub fn graph_update(&mut self, graph: GraphId, ctx: &FrameContext) -> bool {
        trace!("update pass on {graph:?} (frame {})", ctx.frame);
        let mut changed = false;
        for id in self.graph_components(graph) {
            let Some(mut state) = self.take_state(id) else {
                continue;
            };
            if state.update(self, id, ctx) {
                self.mark_changed(id);
            }
            changed |= self.is_changed(id);
            self.put_state(id, state);
        }
        changed
    }

    /// Tick every component of `graph` in insertion order.
    pub fn graph_tick(&mut self, graph: GraphId, ctx: &FrameContext) {
        trace!("tick pass on {graph:?} (frame {})", ctx.frame);
        for id in self.graph_components(graph) {
            let Some(mut state) = self.take_state(id) else {
                continue;
            };
            state.tick(self, id, ctx);
            self.put_state(id, state);
        }
    }

    /// Pre-render visits only components whose changed flag is set.
    pub fn graph_pre_render(&mut self, graph: GraphId, ctx: &FrameContext) {
        for id in self.graph_components(graph) {
            if !self.is_changed(id) {
                continue;
            }
            let Some(mut state) = self.take_state(id) else {
                continue;
            };
            state.pre_render(self, id, ctx);
            self.put_state(id, state);
        }
    }

    /// Post-render visits the changed set and clears each flag afterwards.
    pub fn graph_post_render(&mut self, graph: GraphId, ctx: &FrameContext) {
        for id in self.graph_components(graph) {
            if !self.is_changed(id) {
                continue;
            }
            let Some(mut state) = self.take_state(id) else {
                continue;
            };
            state.post_render(self, id, ctx);
            self.put_state(id, state);
            self.clear_changed(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::component::{Component, Typed, COMPONENT_TAG};
    use crate::types::{TypeTag, TypeTags};

    type Log = Rc<RefCell<Vec<&'static str>>>;

    struct Recorder {
        log: Log,
        report_change: bool,
    }

    impl Typed for Recorder {
        const TAG: TypeTag = "recorder";
        const TAGS: TypeTags = &[Self::TAG, COMPONENT_TAG];
    }

    impl Component for Recorder {
        fn tags(&self) -> TypeTags {
            Self::TAGS
        }

        fn update(&mut self, _: &mut System, _: ComponentId, _: &FrameContext) -> bool {
            self.log.borrow_mut().push("update");
            self.report_change
        }

        fn tick(&mut self, _: &mut System, _: ComponentId, _: &FrameContext) {
            self.log.borrow_mut().push("tick");
        }

        fn pre_render(&mut self, _: &mut System, _: ComponentId, _: &FrameContext) {
            self.log.borrow_mut().push("pre_render");
        }

        fn post_render(&mut self, _: &mut System, _: ComponentId, _: &FrameContext) {
            self.log.borrow_mut().push("post_render");
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    fn run_frame(system: &mut System, ctx: &FrameContext) {
        system.update(ctx);
        system.tick(ctx);
        system.pre_render(ctx);
        system.post_render(ctx);
    }

    #[test]
    fn changed_component_goes_through_every_pass() {
        let mut system = System::new();
        let root = system.root_graph();
        let node = system.create_node(root, "n").unwrap();
        let log: Log = Rc::default();
        system
            .attach(
                node,
                Recorder {
                    log: Rc::clone(&log),
                    report_change: true,
                },
            )
            .unwrap();

        run_frame(&mut system, &FrameContext::new(0, 0.016));

        assert_eq!(
            *log.borrow(),
            vec!["update", "tick", "pre_render", "post_render"]
        );
    }

    #[test]
    fn render_passes_skip_unchanged_components() {
        let mut system = System::new();
        let root = system.root_graph();
        let node = system.create_node(root, "n").unwrap();
        let log: Log = Rc::default();
        let recorder = system
            .attach(
                node,
                Recorder {
                    log: Rc::clone(&log),
                    report_change: false,
                },
            )
            .unwrap();

        // First frame: the attach left the component flagged as changed.
        run_frame(&mut system, &FrameContext::new(0, 0.016));
        assert!(!system.is_changed(recorder));
        log.borrow_mut().clear();

        // Second frame: nothing changed, so the render passes skip it.
        run_frame(&mut system, &FrameContext::new(1, 0.016));
        assert_eq!(*log.borrow(), vec!["update", "tick"]);
    }

    #[test]
    fn update_result_reflags_for_render() {
        let mut system = System::new();
        let root = system.root_graph();
        let node = system.create_node(root, "n").unwrap();
        let log: Log = Rc::default();
        let recorder = system
            .attach(
                node,
                Recorder {
                    log: Rc::clone(&log),
                    report_change: true,
                },
            )
            .unwrap();

        let ctx = FrameContext::new(0, 0.016);
        run_frame(&mut system, &ctx);
        log.borrow_mut().clear();

        // update keeps reporting a change, so every pass keeps running.
        let changed = system.update(&ctx);
        assert!(changed);
        assert!(system.is_changed(recorder));
        system.pre_render(&ctx);
        system.post_render(&ctx);
        assert_eq!(*log.borrow(), vec!["update", "pre_render", "post_render"]);
    }
}
