//! Type-indexed object registry.
//!
//! One registry tracks every live id of one kind (node or component) within a
//! scope. An id is filed under every tag of its capability chain, its
//! concrete tag plus each ancestor tag, so polymorphic queries are a bucket
//! lookup rather than a scan. Buckets and the overall sequence preserve
//! insertion order.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

use log::warn;

use crate::error::{Error, Result};
use crate::types::{TypeTag, TypeTags};

pub struct ObjectRegistry<I> {
    buckets: HashMap<TypeTag, Vec<I>>,
    filed: HashMap<I, TypeTags>,
    order: Vec<I>,
}

impl<I: Copy + Eq + Hash + Debug> ObjectRegistry<I> {
    pub fn new() -> Self {
        Self::default()
    }

    /// File `id` under every tag of its capability chain.
    ///
    /// Double-adding the same id is a programming error; it is tolerated as a
    /// warn-logged no-op so a buggy caller cannot corrupt bucket order.
    pub fn add(&mut self, id: I, tags: TypeTags) {
        if self.filed.contains_key(&id) {
            warn!("object {id:?} added to registry twice; ignoring");
            return;
        }
        self.filed.insert(id, tags);
        self.order.push(id);
        for &tag in tags {
            self.buckets.entry(tag).or_default().push(id);
        }
    }

    /// Remove `id` from every bucket it was filed under. Absent ids are a
    /// no-op.
    pub fn remove(&mut self, id: I) {
        let Some(tags) = self.filed.remove(&id) else {
            return;
        };
        self.order.retain(|x| *x != id);
        for &tag in tags {
            if let Some(bucket) = self.buckets.get_mut(tag) {
                bucket.retain(|x| *x != id);
                if bucket.is_empty() {
                    self.buckets.remove(tag);
                }
            }
        }
    }

    /// First id filed under `tag`, or the first id overall when `tag` is
    /// `None`. Fails with [`Error::NotFound`] when nothing matches.
    pub fn get(&self, tag: Option<TypeTag>) -> Result<I> {
        self.get_opt(tag)
            .ok_or(Error::NotFound(tag.unwrap_or("<any>")))
    }

    /// Non-throwing form of [`get`](Self::get).
    pub fn get_opt(&self, tag: Option<TypeTag>) -> Option<I> {
        match tag {
            Some(tag) => self.buckets.get(tag).and_then(|b| b.first()).copied(),
            None => self.order.first().copied(),
        }
    }

    /// All ids filed under `tag` (or every id) in insertion order.
    pub fn get_array(&self, tag: Option<TypeTag>) -> &[I] {
        match tag {
            Some(tag) => self.buckets.get(tag).map(Vec::as_slice).unwrap_or(&[]),
            None => &self.order,
        }
    }

    pub fn has(&self, tag: TypeTag) -> bool {
        self.buckets.get(tag).is_some_and(|b| !b.is_empty())
    }

    /// Total number of distinct live ids.
    pub fn count(&self) -> usize {
        self.order.len()
    }

    /// Tags `id` was filed under, if it is live.
    pub fn tags_of(&self, id: I) -> Option<TypeTags> {
        self.filed.get(&id).copied()
    }
}

impl<I> Default for ObjectRegistry<I> {
    fn default() -> Self {
        Self {
            buckets: HashMap::new(),
            filed: HashMap::new(),
            order: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIN: TypeTags = &["spin", "motor", "component"];
    const GEAR: TypeTags = &["gear", "component"];

    #[test]
    fn insertion_order_survives_removal() {
        let mut registry: ObjectRegistry<u32> = ObjectRegistry::new();
        registry.add(1, GEAR);
        registry.add(2, GEAR);
        registry.add(3, GEAR);
        registry.remove(2);

        assert_eq!(registry.get_array(Some("gear")), &[1, 3]);
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn polymorphic_buckets() {
        let mut registry: ObjectRegistry<u32> = ObjectRegistry::new();
        registry.add(1, SPIN);
        registry.add(2, GEAR);

        assert_eq!(registry.get_array(Some("component")), &[1, 2]);
        assert_eq!(registry.get_array(Some("motor")), &[1]);
        assert_eq!(registry.get_array(Some("gear")), &[2]);
        assert!(registry.has("motor"));
        assert!(!registry.has("pulley"));
    }

    #[test]
    fn remove_clears_every_bucket() {
        let mut registry: ObjectRegistry<u32> = ObjectRegistry::new();
        registry.add(1, SPIN);
        registry.remove(1);

        assert!(!registry.has("spin"));
        assert!(!registry.has("motor"));
        assert!(!registry.has("component"));
        assert_eq!(registry.count(), 0);

        // Removing again is a no-op.
        registry.remove(1);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn get_throwing_and_non_throwing() {
        let mut registry: ObjectRegistry<u32> = ObjectRegistry::new();
        registry.add(5, GEAR);

        assert_eq!(registry.get(Some("gear")).unwrap(), 5);
        assert_eq!(registry.get(None).unwrap(), 5);
        assert!(matches!(
            registry.get(Some("motor")),
            Err(Error::NotFound("motor"))
        ));
        assert_eq!(registry.get_opt(Some("motor")), None);
    }

    #[test]
    fn double_add_is_ignored() {
        let mut registry: ObjectRegistry<u32> = ObjectRegistry::new();
        registry.add(1, GEAR);
        registry.add(1, GEAR);

        assert_eq!(registry.get_array(Some("gear")), &[1]);
        assert_eq!(registry.count(), 1);
    }
}
