//! Selection controller - tracks which nodes and components are selected.
//!
//! The controller keeps two independent duplicate-free id sets and reacts to
//! system removals so stale entities fall out of the selection on their own.
//! Policy knobs: `multi_select` allows more than one live selection per set,
//! `exclusive_select` makes node and component selection mutually exclusive.
//! Every selection flip is emitted on the system hub, which is what lets
//! observers react to component selection without holding the controller.

use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::events::{HandlerId, Hub, SelectionChange};
use crate::system::System;
use crate::types::{ComponentId, NodeId};

// =============================================================================
// Configuration
// =============================================================================

/// Selection policy. Defaults to single-select, exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Allow more than one selected entity per set.
    pub multi_select: bool,
    /// Selecting a node clears selected components and vice versa.
    pub exclusive_select: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            multi_select: false,
            exclusive_select: true,
        }
    }
}

// =============================================================================
// Controller
// =============================================================================

#[derive(Default)]
struct SelectionState {
    nodes: Vec<NodeId>,
    components: Vec<ComponentId>,
}

struct Subscriptions {
    node_removed: HandlerId,
    component_removed: HandlerId,
}

pub struct SelectionController {
    config: SelectionConfig,
    state: Rc<RefCell<SelectionState>>,
    hub: Rc<Hub>,
    subscriptions: Option<Subscriptions>,
}

impl SelectionController {
    /// Create a controller subscribed to `system`'s removal notifications.
    pub fn new(system: &System, config: SelectionConfig) -> Self {
        let hub = system.hub();
        let state = Rc::new(RefCell::new(SelectionState::default()));

        let node_removed = hub.node_removed.on({
            let state = Rc::clone(&state);
            let hub = Rc::clone(&hub);
            move |&node| {
                let was_selected = {
                    let mut state = state.borrow_mut();
                    let before = state.nodes.len();
                    state.nodes.retain(|n| *n != node);
                    state.nodes.len() != before
                };
                if was_selected {
                    hub.node_selection.emit(&SelectionChange {
                        id: node,
                        selected: false,
                    });
                }
                hub.selection_updated.emit(&());
            }
        });
        let component_removed = hub.component_removed.on({
            let state = Rc::clone(&state);
            let hub = Rc::clone(&hub);
            move |&component| {
                let was_selected = {
                    let mut state = state.borrow_mut();
                    let before = state.components.len();
                    state.components.retain(|c| *c != component);
                    state.components.len() != before
                };
                if was_selected {
                    hub.component_selection.emit(&SelectionChange {
                        id: component,
                        selected: false,
                    });
                }
                hub.selection_updated.emit(&());
            }
        });

        Self {
            config,
            state,
            hub,
            subscriptions: Some(Subscriptions {
                node_removed,
                component_removed,
            }),
        }
    }

    /// Select `node`, honoring the configured policies.
    ///
    /// With `multi_select` and `toggle`, selecting an already-selected node
    /// deselects it; otherwise re-selecting is a no-op. Deselect events for
    /// entities cleared by the exclusivity policies fire before the select
    /// event for `node`.
    pub fn select_node(&self, node: NodeId, toggle: bool) {
        let mut cleared_components: Vec<ComponentId> = Vec::new();
        let mut cleared_nodes: Vec<NodeId> = Vec::new();
        {
            let mut state = self.state.borrow_mut();
            if state.nodes.contains(&node) {
                if self.config.multi_select && toggle {
                    state.nodes.retain(|n| *n != node);
                    drop(state);
                    self.hub.node_selection.emit(&SelectionChange {
                        id: node,
                        selected: false,
                    });
                }
                return;
            }
            if self.config.exclusive_select {
                cleared_components = state.components.drain(..).collect();
            }
            if !(self.config.multi_select && toggle) {
                cleared_nodes = state.nodes.drain(..).collect();
            }
            state.nodes.push(node);
        }
        for component in cleared_components {
            self.hub.component_selection.emit(&SelectionChange {
                id: component,
                selected: false,
            });
        }
        for other in cleared_nodes {
            self.hub.node_selection.emit(&SelectionChange {
                id: other,
                selected: false,
            });
        }
        self.hub.node_selection.emit(&SelectionChange {
            id: node,
            selected: true,
        });
    }

    /// Mirror of [`select_node`](Self::select_node) over components.
    pub fn select_component(&self, component: ComponentId, toggle: bool) {
        let mut cleared_nodes: Vec<NodeId> = Vec::new();
        let mut cleared_components: Vec<ComponentId> = Vec::new();
        {
            let mut state = self.state.borrow_mut();
            if state.components.contains(&component) {
                if self.config.multi_select && toggle {
                    state.components.retain(|c| *c != component);
                    drop(state);
                    self.hub.component_selection.emit(&SelectionChange {
                        id: component,
                        selected: false,
                    });
                }
                return;
            }
            if self.config.exclusive_select {
                cleared_nodes = state.nodes.drain(..).collect();
            }
            if !(self.config.multi_select && toggle) {
                cleared_components = state.components.drain(..).collect();
            }
            state.components.push(component);
        }
        for node in cleared_nodes {
            self.hub.node_selection.emit(&SelectionChange {
                id: node,
                selected: false,
            });
        }
        for other in cleared_components {
            self.hub.component_selection.emit(&SelectionChange {
                id: other,
                selected: false,
            });
        }
        self.hub.component_selection.emit(&SelectionChange {
            id: component,
            selected: true,
        });
    }

    pub fn config(&self) -> SelectionConfig {
        self.config
    }

    /// Snapshot of the selected nodes.
    pub fn selected_nodes(&self) -> Vec<NodeId> {
        self.state.borrow().nodes.clone()
    }

    /// Snapshot of the selected components.
    pub fn selected_components(&self) -> Vec<ComponentId> {
        self.state.borrow().components.clone()
    }

    pub fn is_node_selected(&self, node: NodeId) -> bool {
        self.state.borrow().nodes.contains(&node)
    }

    pub fn is_component_selected(&self, component: ComponentId) -> bool {
        self.state.borrow().components.contains(&component)
    }

    /// Unsubscribe from system notifications. Selection state is kept.
    pub fn dispose(&mut self) {
        if let Some(subscriptions) = self.subscriptions.take() {
            self.hub.node_removed.off(subscriptions.node_removed);
            self.hub.component_removed.off(subscriptions.component_removed);
        }
    }
}

impl Drop for SelectionController {
    fn drop(&mut self) {
        self.dispose();
    }
}
