//! # weft
//!
//! Node/component composition runtime.
//!
//! Entities ("nodes") aggregate typed behavior units ("components");
//! components can be linked into parent/child trees ("hierarchy"); trees of
//! nodes are grouped into addressable scopes ("graphs"); graphs nest through
//! hosting components; and a process-wide [`System`] tracks every live object
//! by type for fast lookup. A [`SelectionController`] layers selection state
//! with multi/exclusive policies on top and propagates it as events.
//!
//! ## Architecture
//!
//! Objects live in generational arenas owned by the [`System`] and are
//! addressed by copyable ids, so stale ids stop resolving instead of aliasing
//! reused slots. The per-frame lifecycle is driven externally:
//!
//! ```text
//! update -> tick -> pre_render -> post_render
//! ```
//!
//! update and tick visit every component; the render passes are gated on the
//! per-component changed flag, and a nested graph's host marks itself changed
//! every tick so nested content always renders.
//!
//! ## Modules
//!
//! - [`types`] - ids, arenas, frame context
//! - [`registry`] - type-indexed object registry
//! - [`component`] - the component contract and flags
//! - [`node`] - the entity type
//! - [`hierarchy`] - parent/child trees with multicast notifications
//! - [`graph`] - scopes and the per-frame passes
//! - [`graph_host`] - nested graph embedding
//! - [`system`] - registries, factories, serialization
//! - [`selection`] - the selection controller
//! - [`events`] - synchronous notification channels

pub mod component;
pub mod error;
pub mod events;
pub mod graph;
pub mod graph_host;
pub mod hierarchy;
pub mod node;
pub mod registry;
pub mod selection;
pub mod system;
pub mod types;

pub use component::{Component, ComponentFlags, Typed, COMPONENT_TAG};
pub use error::{Error, Result};
pub use events::{ChangeTarget, Channel, HandlerId, HierarchyChange, Hub, SelectionChange};
pub use graph::{Graph, GraphOwner};
pub use graph_host::GraphHost;
pub use hierarchy::Hierarchy;
pub use node::{Node, NODE_TAG};
pub use registry::ObjectRegistry;
pub use selection::{SelectionConfig, SelectionController};
pub use system::{ComponentFactory, NodeFactory, System, TypeRegistry};
pub use types::{ComponentId, FrameContext, GraphId, NodeId, TypeTag, TypeTags};
