//! Component base contract.
//!
//! A component is a typed behavior unit owned by exactly one node.
//! [`Component`] carries the per-frame lifecycle, the serialization hooks and
//! teardown; [`Typed`] pins down the capability chain the registries index
//! by. During any hook the behavior object is lifted out of its arena slot,
//! so re-entrant operations on the same component id fall through as no-ops.

use std::any::Any;

use bitflags::bitflags;
use serde_json::Value;

use crate::error::Result;
use crate::system::System;
use crate::types::{ComponentId, FrameContext, TypeTag, TypeTags};

/// Base tag every component chain ends with.
pub const COMPONENT_TAG: TypeTag = "component";

// =============================================================================
// Static typing
// =============================================================================

/// Static type identity of a concrete component.
///
/// `TAGS` is the capability chain: the concrete `TAG` first, then every
/// ancestor tag the type satisfies, ending with [`COMPONENT_TAG`]. The chain
/// is what the registries bucket by, so a query for an ancestor tag finds
/// every concrete type that carries it.
pub trait Typed {
    const TAG: TypeTag;
    const TAGS: TypeTags;
}

// =============================================================================
// Flags
// =============================================================================

bitflags! {
    /// Per-component bookkeeping kept next to the behavior object.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ComponentFlags: u8 {
        /// Needs reprocessing in the next render pass.
        const CHANGED = 1 << 0;
        /// At most one live instance of this type across the whole system.
        const SINGLETON = 1 << 1;
    }
}

// =============================================================================
// Component trait
// =============================================================================

/// A typed behavior unit attached to exactly one node.
///
/// Hooks receive the owning [`System`], the component's own id and the frame
/// context; the behavior object itself is out of its arena slot for the
/// duration of the call.
pub trait Component: 'static {
    /// Capability chain of the concrete type (see [`Typed::TAGS`]).
    fn tags(&self) -> TypeTags;

    /// Concrete tag; the first entry of the capability chain.
    fn tag(&self) -> TypeTag {
        self.tags()[0]
    }

    /// Restrict this type to one live instance system-wide.
    fn singleton(&self) -> bool {
        false
    }

    /// Allow at most one component of this concrete tag per node.
    fn exclusive(&self) -> bool {
        true
    }

    /// Per-frame update. Return true when internal state changed; the runtime
    /// folds the result into the changed flag.
    fn update(&mut self, _system: &mut System, _me: ComponentId, _ctx: &FrameContext) -> bool {
        false
    }

    /// Per-frame tick, after the update pass.
    fn tick(&mut self, _system: &mut System, _me: ComponentId, _ctx: &FrameContext) {}

    /// Render preparation; only called while the changed flag is set.
    fn pre_render(&mut self, _system: &mut System, _me: ComponentId, _ctx: &FrameContext) {}

    /// Render wrap-up; only called while the changed flag is set. The runtime
    /// clears the flag afterwards.
    fn post_render(&mut self, _system: &mut System, _me: ComponentId, _ctx: &FrameContext) {}

    /// Restore state from a serialized record. Runs after every node and
    /// component of the enclosing graph exists.
    fn inflate(&mut self, _system: &mut System, _me: ComponentId, _data: &Value) -> Result<()> {
        Ok(())
    }

    /// Serialize state to a JSON-compatible record (an object; the runtime
    /// adds the `type` field).
    fn deflate(&self, _system: &System) -> Value {
        Value::Object(serde_json::Map::new())
    }

    /// Structural teardown; runs while the component is being disposed,
    /// before it leaves the registries.
    fn dispose(&mut self, _system: &mut System, _me: ComponentId) {}

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
