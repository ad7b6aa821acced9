//! Synchronous notification channels.
//!
//! The emission primitive is deliberately tiny: a [`Channel`] holds a list of
//! handlers and `emit` walks a snapshot of that list. Handlers run
//! synchronously on the emitting thread and receive only the event payload,
//! never access to the [`System`](crate::system::System), so a handler cannot
//! mutate the structure that is mid-notification. Stateful observers keep
//! their state behind `Rc<RefCell<..>>` and capture clones in their handlers.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::types::{ComponentId, NodeId};

// =============================================================================
// Channel
// =============================================================================

/// Subscription handle; pass to [`Channel::off`] to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler<E> = Rc<dyn Fn(&E)>;

/// A single synchronous event channel.
pub struct Channel<E> {
    handlers: RefCell<Vec<(HandlerId, Handler<E>)>>,
    next: Cell<u64>,
}

impl<E> Channel<E> {
    pub fn new() -> Self {
        Self {
            handlers: RefCell::new(Vec::new()),
            next: Cell::new(0),
        }
    }

    /// Subscribe. The handler stays registered until [`off`](Self::off).
    pub fn on(&self, handler: impl Fn(&E) + 'static) -> HandlerId {
        let id = HandlerId(self.next.get());
        self.next.set(id.0 + 1);
        self.handlers.borrow_mut().push((id, Rc::new(handler)));
        id
    }

    /// Unsubscribe. Unknown ids are a no-op.
    pub fn off(&self, id: HandlerId) {
        self.handlers.borrow_mut().retain(|(h, _)| *h != id);
    }

    /// Emit to every handler subscribed at the time of the call.
    ///
    /// Emission walks a snapshot, so handlers may subscribe or unsubscribe
    /// re-entrantly without skipping or double-delivering.
    pub fn emit(&self, event: &E) {
        let snapshot: Vec<Handler<E>> = self
            .handlers
            .borrow()
            .iter()
            .map(|(_, h)| Rc::clone(h))
            .collect();
        for handler in snapshot {
            handler(event);
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.borrow().len()
    }
}

impl<E> Default for Channel<E> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Event payloads
// =============================================================================

/// Object a hierarchy notification is currently firing at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeTarget {
    Component(ComponentId),
    Node(NodeId),
}

/// Payload of the hierarchy-changed multicast.
///
/// One event is emitted per target along the walk: first the (de)attached
/// child and its owning node, then each ancestor and its owning node.
#[derive(Debug, Clone, Copy)]
pub struct HierarchyChange {
    pub target: ChangeTarget,
    pub parent: ComponentId,
    pub child: ComponentId,
    /// True for attach, false for detach.
    pub added: bool,
}

/// Selection flip for a single entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionChange<I> {
    pub id: I,
    /// True when the entity is now selected.
    pub selected: bool,
}

// =============================================================================
// Hub
// =============================================================================

/// Every channel the runtime emits on, shared as `Rc<Hub>`.
#[derive(Default)]
pub struct Hub {
    pub node_added: Channel<NodeId>,
    pub node_removed: Channel<NodeId>,
    pub component_added: Channel<ComponentId>,
    pub component_removed: Channel<ComponentId>,
    pub hierarchy_changed: Channel<HierarchyChange>,
    pub node_selection: Channel<SelectionChange<NodeId>>,
    pub component_selection: Channel<SelectionChange<ComponentId>>,
    pub selection_updated: Channel<()>,
}

impl Hub {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }
}
