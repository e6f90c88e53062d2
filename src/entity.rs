//! Collaborators that turn index hits back into entities.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use parking_lot::RwLock;

use crate::document::{EntityRef, IdValue};
use crate::error::Result;

/// Loads entities from the backing store.
pub trait EntityResolver: Send + Sync + fmt::Debug {
    /// The entity `kind`/`id`, with the relation paths in `expand` loaded
    /// eagerly. `Ok(None)` when it no longer exists.
    fn resolve(&self, kind: &str, id: &IdValue, expand: &[String]) -> Result<Option<EntityRef>>;
}

/// Enumerates the subtypes of a kind.
pub trait SubtypeRegistry: Send + Sync + fmt::Debug {
    /// Every kind that is `kind` or derives from it.
    fn subtypes_of(&self, kind: &str) -> BTreeSet<String>;
}

/// Kinds have no subtypes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSubtypes;

impl SubtypeRegistry for NoSubtypes {
    fn subtypes_of(&self, kind: &str) -> BTreeSet<String> {
        BTreeSet::from([kind.to_string()])
    }
}

/// Subtype relation declared up front.
#[derive(Debug, Default)]
pub struct StaticSubtypes {
    children: RwLock<BTreeMap<String, BTreeSet<String>>>,
}

impl StaticSubtypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `child` as a direct subtype of `parent`.
    pub fn register(&self, parent: &str, child: &str) -> &Self {
        self.children
            .write()
            .entry(parent.to_string())
            .or_default()
            .insert(child.to_string());
        self
    }
}

impl SubtypeRegistry for StaticSubtypes {
    fn subtypes_of(&self, kind: &str) -> BTreeSet<String> {
        let children = self.children.read();
        let mut result = BTreeSet::new();
        let mut pending = vec![kind.to_string()];
        while let Some(next) = pending.pop() {
            if !result.insert(next.clone()) {
                continue;
            }
            if let Some(direct) = children.get(&next) {
                pending.extend(direct.iter().cloned());
            }
        }
        result
    }
}

/// Resolver over entities held in memory.
#[derive(Debug, Default)]
pub struct MemoryResolver {
    entities: RwLock<BTreeMap<(String, IdValue), EntityRef>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `entity` under its kind and identifier. Entities without
    /// an identifier are ignored.
    pub fn insert(&self, entity: EntityRef) {
        if let Some(id) = entity.id_value() {
            self.entities
                .write()
                .insert((entity.kind().to_string(), id), entity);
        }
    }

    pub fn remove(&self, kind: &str, id: &IdValue) -> Option<EntityRef> {
        self.entities.write().remove(&(kind.to_string(), id.clone()))
    }

    pub fn len(&self) -> usize {
        self.entities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.read().is_empty()
    }
}

impl EntityResolver for MemoryResolver {
    fn resolve(&self, kind: &str, id: &IdValue, _expand: &[String]) -> Result<Option<EntityRef>> {
        Ok(self
            .entities
            .read()
            .get(&(kind.to_string(), id.clone()))
            .cloned())
    }
}
