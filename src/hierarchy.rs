//! Hierarchy - the component that places its owning node in a parent/child
//! tree.
//!
//! Tree membership is stored as ids: an optional parent and an ordered child
//! list, both pointing at other hierarchy components. Structural mutations
//! multicast a hierarchy-changed notification up the ancestor chain, starting
//! at the (de)attached child; the walk is an explicit loop so deep trees do
//! not grow the stack.

use log::debug;
use serde_json::{json, Value};

use crate::component::{Component, Typed, COMPONENT_TAG};
use crate::error::{Error, Result};
use crate::events::{ChangeTarget, HierarchyChange};
use crate::system::System;
use crate::types::{ComponentId, NodeId, TypeTag, TypeTags};

// =============================================================================
// Component
// =============================================================================

/// Parent/child tree membership for one node.
#[derive(Default)]
pub struct Hierarchy {
    parent: Option<ComponentId>,
    children: Vec<ComponentId>,
}

impl Hierarchy {
    /// Attach a fresh hierarchy to `node`.
    pub fn attach(system: &mut System, node: NodeId) -> Result<ComponentId> {
        system.attach(node, Hierarchy::default())
    }

    /// The hierarchy this one is parented under, if any.
    pub fn parent(&self) -> Option<ComponentId> {
        self.parent
    }

    /// Direct children in attach order.
    pub fn children(&self) -> &[ComponentId] {
        &self.children
    }
}

impl Typed for Hierarchy {
    const TAG: TypeTag = "hierarchy";
    const TAGS: TypeTags = &[Self::TAG, COMPONENT_TAG];
}

impl Component for Hierarchy {
    fn tags(&self) -> TypeTags {
        Self::TAGS
    }

    /// Children are encoded as node positions within the enclosing graph's
    /// node sequence; names are not unique and ids are not stable.
    fn deflate(&self, system: &System) -> Value {
        let positions: Vec<usize> = self
            .children
            .iter()
            .filter_map(|&child| {
                let node = system.component_owner(child)?;
                let graph = system.node(node)?.graph();
                system.graph(graph)?.node_position(node)
            })
            .collect();
        json!({ "children": positions })
    }

    fn inflate(&mut self, system: &mut System, me: ComponentId, data: &Value) -> Result<()> {
        let Some(positions) = data.get("children").and_then(Value::as_array) else {
            return Ok(());
        };
        let node = system
            .component_owner(me)
            .ok_or_else(|| Error::structural("inflating a detached hierarchy"))?;
        let graph = system
            .node(node)
            .map(|n| n.graph())
            .ok_or_else(|| Error::structural("inflating a hierarchy on a dead node"))?;
        for value in positions {
            let index = value.as_u64().ok_or_else(|| {
                Error::MalformedData("hierarchy child index is not an integer".into())
            })? as usize;
            let child_node = system
                .graph(graph)
                .and_then(|g| g.nodes().get(index).copied())
                .ok_or_else(|| {
                    Error::MalformedData(format!("hierarchy child index {index} out of range"))
                })?;
            let child = system.component_on_tag(child_node, Self::TAG).ok_or_else(|| {
                Error::MalformedData(format!("node at index {index} has no hierarchy"))
            })?;
            // Links are wired without the structural multicast here.
            let Some(child_h) = system.component_mut::<Hierarchy>(child) else {
                continue;
            };
            if child_h.parent.is_some() {
                return Err(Error::structural("serialized child already has a parent"));
            }
            child_h.parent = Some(me);
            self.children.push(child);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

// =============================================================================
// Structural mutation
// =============================================================================

/// Parent `child` under `parent`.
///
/// Fails when `child` already has a parent, when either id is not a live
/// hierarchy, or when the attach would create a cycle. On success the change
/// is multicast up the ancestor chain starting at `child`.
pub fn add_child(system: &mut System, parent: ComponentId, child: ComponentId) -> Result<()> {
    if parent == child {
        return Err(Error::structural("cannot parent a hierarchy under itself"));
    }
    if system.component::<Hierarchy>(parent).is_none() {
        return Err(Error::structural("parent is not a live hierarchy"));
    }
    let Some(child_h) = system.component::<Hierarchy>(child) else {
        return Err(Error::structural("child is not a live hierarchy"));
    };
    if child_h.parent.is_some() {
        return Err(Error::structural(
            "child already has a parent; remove it first",
        ));
    }
    // Acyclicity: `child` must not already be an ancestor of `parent`.
    let mut cursor = Some(parent);
    while let Some(h) = cursor {
        if h == child {
            return Err(Error::structural("attach would create a hierarchy cycle"));
        }
        cursor = system.component::<Hierarchy>(h).and_then(Hierarchy::parent);
    }

    if let Some(child_h) = system.component_mut::<Hierarchy>(child) {
        child_h.parent = Some(parent);
    }
    if let Some(parent_h) = system.component_mut::<Hierarchy>(parent) {
        parent_h.children.push(child);
    }
    debug!("hierarchy {child:?} attached under {parent:?}");
    multicast(system, parent, child, true);
    Ok(())
}

/// Detach `child` from `parent`.
///
/// Fails when `child`'s current parent is not `parent`. On success the change
/// is multicast exactly like an attach, with `added = false`.
pub fn remove_child(system: &mut System, parent: ComponentId, child: ComponentId) -> Result<()> {
    let current = system.component::<Hierarchy>(child).and_then(Hierarchy::parent);
    if current != Some(parent) {
        return Err(Error::structural(
            "child is not parented under this hierarchy",
        ));
    }
    if let Some(parent_h) = system.component_mut::<Hierarchy>(parent) {
        parent_h.children.retain(|c| *c != child);
    }
    if let Some(child_h) = system.component_mut::<Hierarchy>(child) {
        child_h.parent = None;
    }
    debug!("hierarchy {child:?} detached from {parent:?}");
    multicast(system, parent, child, false);
    Ok(())
}

/// Emit the hierarchy-changed notification at `child` and its owning node,
/// then at each ancestor (starting from `parent`) and its owning node.
fn multicast(system: &System, parent: ComponentId, child: ComponentId, added: bool) {
    let hub = system.hub();
    let fire = |target: ChangeTarget| {
        hub.hierarchy_changed.emit(&HierarchyChange {
            target,
            parent,
            child,
            added,
        });
    };
    fire(ChangeTarget::Component(child));
    if let Some(node) = system.component_owner(child) {
        fire(ChangeTarget::Node(node));
    }
    let mut cursor = Some(parent);
    while let Some(h) = cursor {
        fire(ChangeTarget::Component(h));
        if let Some(node) = system.component_owner(h) {
            fire(ChangeTarget::Node(node));
        }
        cursor = system.component::<Hierarchy>(h).and_then(Hierarchy::parent);
    }
}

// =============================================================================
// Tree search
// =============================================================================

/// Hierarchy at the top of `h`'s parent chain (`h` itself when detached).
pub fn root_of(system: &System, h: ComponentId) -> ComponentId {
    let mut current = h;
    while let Some(parent) = system.component::<Hierarchy>(current).and_then(Hierarchy::parent) {
        current = parent;
    }
    current
}

/// Component of type `C` on the root node of `h`'s tree.
pub fn get_root<C: Typed>(system: &System, h: ComponentId) -> Option<ComponentId> {
    let root = root_of(system, h);
    let node = system.component_owner(root)?;
    system.component_on_tag(node, C::TAG)
}

/// Component of type `C` on the immediate parent's node; with `recursive`,
/// the walk continues up the ancestor chain. The direct parent is checked
/// exactly once.
pub fn get_parent<C: Typed>(system: &System, h: ComponentId, recursive: bool) -> Option<ComponentId> {
    let mut cursor = system.component::<Hierarchy>(h).and_then(Hierarchy::parent);
    while let Some(p) = cursor {
        if let Some(found) = system
            .component_owner(p)
            .and_then(|node| system.component_on_tag(node, C::TAG))
        {
            return Some(found);
        }
        if !recursive {
            return None;
        }
        cursor = system.component::<Hierarchy>(p).and_then(Hierarchy::parent);
    }
    None
}

/// First component of type `C` found on a child's node. Direct children are
/// exhausted before any subtree is entered, so shallow matches win.
pub fn get_child<C: Typed>(system: &System, h: ComponentId, recursive: bool) -> Option<ComponentId> {
    let hierarchy = system.component::<Hierarchy>(h)?;
    for &child in hierarchy.children() {
        if let Some(found) = system
            .component_owner(child)
            .and_then(|node| system.component_on_tag(node, C::TAG))
        {
            return Some(found);
        }
    }
    if recursive {
        for &child in hierarchy.children() {
            if let Some(found) = get_child::<C>(system, child, true) {
                return Some(found);
            }
        }
    }
    None
}

/// Every component of type `C` in the subtree, direct children first, then
/// each child's subtree in order.
pub fn get_children<C: Typed>(system: &System, h: ComponentId, recursive: bool) -> Vec<ComponentId> {
    let mut found = Vec::new();
    let Some(hierarchy) = system.component::<Hierarchy>(h) else {
        return found;
    };
    for &child in hierarchy.children() {
        if let Some(c) = system
            .component_owner(child)
            .and_then(|node| system.component_on_tag(node, C::TAG))
        {
            found.push(c);
        }
    }
    if recursive {
        for &child in hierarchy.children() {
            found.extend(get_children::<C>(system, child, true));
        }
    }
    found
}

/// Boolean form of [`get_child`].
pub fn has_children<C: Typed>(system: &System, h: ComponentId, recursive: bool) -> bool {
    get_child::<C>(system, h, recursive).is_some()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[derive(Default)]
    struct Marker;

    impl Typed for Marker {
        const TAG: TypeTag = "marker";
        const TAGS: TypeTags = &[Self::TAG, COMPONENT_TAG];
    }

    impl Component for Marker {
        fn tags(&self) -> TypeTags {
            Self::TAGS
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    fn spawn(system: &mut System, name: &str) -> (NodeId, ComponentId) {
        let root = system.root_graph();
        let node = system.create_node(root, name).unwrap();
        let h = Hierarchy::attach(system, node).unwrap();
        (node, h)
    }

    #[test]
    fn add_child_links_both_ends() {
        let mut system = System::new();
        let (_, parent) = spawn(&mut system, "parent");
        let (_, child) = spawn(&mut system, "child");

        add_child(&mut system, parent, child).unwrap();

        let child_h = system.component::<Hierarchy>(child).unwrap();
        assert_eq!(child_h.parent(), Some(parent));
        let parent_h = system.component::<Hierarchy>(parent).unwrap();
        assert_eq!(parent_h.children(), &[child]);
    }

    #[test]
    fn add_child_twice_is_a_structural_violation() {
        let mut system = System::new();
        let (_, parent) = spawn(&mut system, "parent");
        let (_, child) = spawn(&mut system, "child");

        add_child(&mut system, parent, child).unwrap();
        assert!(matches!(
            add_child(&mut system, parent, child),
            Err(Error::StructuralViolation(_))
        ));
        // Still exactly one entry in the child list.
        assert_eq!(
            system.component::<Hierarchy>(parent).unwrap().children(),
            &[child]
        );
    }

    #[test]
    fn remove_child_requires_the_right_parent() {
        let mut system = System::new();
        let (_, a) = spawn(&mut system, "a");
        let (_, b) = spawn(&mut system, "b");
        let (_, child) = spawn(&mut system, "child");

        add_child(&mut system, a, child).unwrap();
        assert!(matches!(
            remove_child(&mut system, b, child),
            Err(Error::StructuralViolation(_))
        ));

        remove_child(&mut system, a, child).unwrap();
        assert_eq!(system.component::<Hierarchy>(child).unwrap().parent(), None);

        // Reattach under a different parent now works.
        add_child(&mut system, b, child).unwrap();
    }

    #[test]
    fn cycles_are_rejected() {
        let mut system = System::new();
        let (_, root) = spawn(&mut system, "root");
        let (_, mid) = spawn(&mut system, "mid");
        let (_, leaf) = spawn(&mut system, "leaf");

        add_child(&mut system, root, mid).unwrap();
        add_child(&mut system, mid, leaf).unwrap();

        assert!(matches!(
            add_child(&mut system, leaf, root),
            Err(Error::StructuralViolation(_))
        ));
        assert!(matches!(
            add_child(&mut system, root, root),
            Err(Error::StructuralViolation(_))
        ));
    }

    #[test]
    fn multicast_walks_the_whole_ancestor_chain() {
        let mut system = System::new();
        let (root_node, root) = spawn(&mut system, "root");
        let (mid_node, mid) = spawn(&mut system, "mid");
        let (leaf_node, leaf) = spawn(&mut system, "leaf");
        add_child(&mut system, root, mid).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        system.hub().hierarchy_changed.on(move |change| {
            sink.borrow_mut().push((change.target, change.added));
        });

        add_child(&mut system, mid, leaf).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![
                (ChangeTarget::Component(leaf), true),
                (ChangeTarget::Node(leaf_node), true),
                (ChangeTarget::Component(mid), true),
                (ChangeTarget::Node(mid_node), true),
                (ChangeTarget::Component(root), true),
                (ChangeTarget::Node(root_node), true),
            ]
        );

        seen.borrow_mut().clear();
        remove_child(&mut system, mid, leaf).unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![
                (ChangeTarget::Component(leaf), false),
                (ChangeTarget::Node(leaf_node), false),
                (ChangeTarget::Component(mid), false),
                (ChangeTarget::Node(mid_node), false),
                (ChangeTarget::Component(root), false),
                (ChangeTarget::Node(root_node), false),
            ]
        );
    }

    #[test]
    fn get_root_finds_the_top_of_the_tree() {
        let mut system = System::new();
        let (root_node, root) = spawn(&mut system, "root");
        let (_, mid) = spawn(&mut system, "mid");
        let (_, leaf) = spawn(&mut system, "leaf");
        add_child(&mut system, root, mid).unwrap();
        add_child(&mut system, mid, leaf).unwrap();

        let marker = system.attach(root_node, Marker).unwrap();

        assert_eq!(root_of(&system, leaf), root);
        assert_eq!(get_root::<Marker>(&system, leaf), Some(marker));
        assert_eq!(get_root::<Hierarchy>(&system, leaf), Some(root));
    }

    #[test]
    fn get_parent_checks_the_direct_parent_once() {
        let mut system = System::new();
        let (root_node, root) = spawn(&mut system, "root");
        let (_, mid) = spawn(&mut system, "mid");
        let (_, leaf) = spawn(&mut system, "leaf");
        add_child(&mut system, root, mid).unwrap();
        add_child(&mut system, mid, leaf).unwrap();

        let marker = system.attach(root_node, Marker).unwrap();

        // Non-recursive: only the direct parent (mid) is searched.
        assert_eq!(get_parent::<Marker>(&system, leaf, false), None);
        // Recursive: the walk continues to root.
        assert_eq!(get_parent::<Marker>(&system, leaf, true), Some(marker));
        // Detached hierarchy has no parent at all.
        assert_eq!(get_parent::<Marker>(&system, root, true), None);
    }

    #[test]
    fn child_search_prefers_direct_children() {
        let mut system = System::new();
        let (_, top) = spawn(&mut system, "top");
        let (_, near) = spawn(&mut system, "near");
        let (near_deep_node, deep_under_near) = spawn(&mut system, "deep-under-near");
        let (far_node, far) = spawn(&mut system, "far");
        add_child(&mut system, top, near).unwrap();
        add_child(&mut system, near, deep_under_near).unwrap();
        add_child(&mut system, top, far).unwrap();

        let deep_marker = system.attach(near_deep_node, Marker).unwrap();
        let far_marker = system.attach(far_node, Marker).unwrap();

        // Non-recursive: only direct children are searched.
        assert_eq!(get_child::<Marker>(&system, top, false), Some(far_marker));
        // Recursive: the direct child's match still wins over the deeper one.
        assert_eq!(get_child::<Marker>(&system, top, true), Some(far_marker));
        assert_eq!(
            get_children::<Marker>(&system, top, true),
            vec![far_marker, deep_marker]
        );
        assert!(has_children::<Marker>(&system, top, true));
        assert!(!has_children::<Marker>(&system, near, false));
    }

    #[test]
    fn removing_a_node_cascades_through_its_subtree() {
        let mut system = System::new();
        let (root_node, root) = spawn(&mut system, "root");
        let (_, mid) = spawn(&mut system, "mid");
        let (_, leaf) = spawn(&mut system, "leaf");
        add_child(&mut system, root, mid).unwrap();
        add_child(&mut system, mid, leaf).unwrap();

        system.remove_node(root_node);

        assert_eq!(system.node_count(), 0);
        assert_eq!(system.component_count(), 0);
        assert!(system.component::<Hierarchy>(leaf).is_none());
    }

    #[test]
    fn removing_a_child_node_detaches_it_from_its_parent() {
        let mut system = System::new();
        let (_, parent) = spawn(&mut system, "parent");
        let (child_node, child) = spawn(&mut system, "child");
        add_child(&mut system, parent, child).unwrap();

        system.remove_node(child_node);

        assert_eq!(
            system.component::<Hierarchy>(parent).unwrap().children(),
            &[] as &[ComponentId]
        );
        assert_eq!(system.node_count(), 1);
    }
}
