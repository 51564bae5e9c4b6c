//! Pluggable, predicate guarded duplication strategies.
//!
//! A strategy clones in two phases: [`CloneStrategy::instantiate`] produces
//! the clone shell, the registry then records it in the identity memo, and
//! only then [`CloneStrategy::populate`] fills it, recursing through the
//! cloner. Back references met while populating therefore resolve to the
//! shell instead of recursing forever.

use std::fmt;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::cloner::CloneContext;
use crate::container::Array;
use crate::error::{CloneError, Result};
use crate::value::ObjRef;

pub trait CloneStrategy: Send + Sync {
    fn name(&self) -> &str;
    fn matches(&self, source: &ObjRef, cx: &CloneContext<'_>) -> bool;
    fn instantiate(&self, source: &ObjRef, cx: &mut CloneContext<'_>) -> Result<ObjRef>;
    fn populate(&self, _source: &ObjRef, _clone: &ObjRef, _cx: &mut CloneContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Where a custom strategy goes relative to those already registered.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Priority {
    First,
    Last,
    Before(String),
    After(String),
}

// ------------- Built-in strategies -------------
/// Shares values of immutable types.
pub struct ImmutablePassthrough;
impl CloneStrategy for ImmutablePassthrough {
    fn name(&self) -> &str {
        "immutable"
    }
    fn matches(&self, source: &ObjRef, cx: &CloneContext<'_>) -> bool {
        cx.is_immutable(source)
    }
    fn instantiate(&self, source: &ObjRef, _cx: &mut CloneContext<'_>) -> Result<ObjRef> {
        Ok(source.clone())
    }
}

pub struct ArrayStrategy;
impl CloneStrategy for ArrayStrategy {
    fn name(&self) -> &str {
        "array"
    }
    fn matches(&self, source: &ObjRef, _cx: &CloneContext<'_>) -> bool {
        source.is::<Array>()
    }
    fn instantiate(&self, source: &ObjRef, _cx: &mut CloneContext<'_>) -> Result<ObjRef> {
        let array = source
            .downcast_ref::<Array>()
            .ok_or_else(|| CloneError::instantiation("Array", "source is not an array"))?;
        Ok(ObjRef::new(Array::new(array.component(), array.len())))
    }
    fn populate(&self, source: &ObjRef, clone: &ObjRef, cx: &mut CloneContext<'_>) -> Result<()> {
        let items = match source.downcast_ref::<Array>() {
            Some(array) => array.items().to_vec(),
            None => return Err(CloneError::instantiation("Array", "source is not an array")),
        };
        for (index, item) in items.iter().enumerate() {
            let copy = cx.clone_value(item).map_err(array_failure)?;
            let mut target = clone
                .downcast_mut::<Array>()
                .ok_or_else(|| CloneError::instantiation("Array", "clone is not an array"))?;
            target
                .set(index, copy)
                .map_err(|cause| CloneError::instantiation("Array", cause))?;
        }
        Ok(())
    }
}

fn array_failure(e: CloneError) -> CloneError {
    match e {
        CloneError::DepthExceeded { .. } => e,
        other => CloneError::instantiation("Array", other.to_string()),
    }
}

/// Delegates to the type's own [`SelfClone`](crate::reflect::SelfClone) capability.
pub struct SelfCloneStrategy;
impl CloneStrategy for SelfCloneStrategy {
    fn name(&self) -> &str {
        "self-clone"
    }
    fn matches(&self, source: &ObjRef, _cx: &CloneContext<'_>) -> bool {
        source.borrow().as_self_clone().is_some()
    }
    fn instantiate(&self, source: &ObjRef, _cx: &mut CloneContext<'_>) -> Result<ObjRef> {
        let obj = source.borrow();
        obj.as_self_clone()
            .map(|capability| capability.self_clone())
            .ok_or_else(|| CloneError::instantiation(obj.type_name(), "lost its self clone capability"))
    }
}

pub struct CollectionStrategy;
impl CloneStrategy for CollectionStrategy {
    fn name(&self) -> &str {
        "collection"
    }
    fn matches(&self, source: &ObjRef, _cx: &CloneContext<'_>) -> bool {
        source.borrow().as_collection().is_some()
    }
    fn instantiate(&self, source: &ObjRef, _cx: &mut CloneContext<'_>) -> Result<ObjRef> {
        let obj = source.borrow();
        obj.as_collection()
            .map(|collection| collection.empty_like())
            .ok_or_else(|| CloneError::instantiation(obj.type_name(), "not a collection"))
    }
    fn populate(&self, source: &ObjRef, clone: &ObjRef, cx: &mut CloneContext<'_>) -> Result<()> {
        let (type_name, elements) = {
            let obj = source.borrow();
            let elements = obj.as_collection().map(|c| c.elements()).unwrap_or_default();
            (obj.type_name(), elements)
        };
        for element in &elements {
            let copy = cx.clone_value(element)?;
            let mut target = clone.borrow_mut();
            let collection = target
                .as_collection_mut()
                .ok_or_else(|| CloneError::instantiation(type_name, "empty copy is not a collection"))?;
            collection
                .push(copy)
                .map_err(|cause| CloneError::instantiation(type_name, cause))?;
        }
        Ok(())
    }
}

pub struct MapStrategy;
impl CloneStrategy for MapStrategy {
    fn name(&self) -> &str {
        "map"
    }
    fn matches(&self, source: &ObjRef, _cx: &CloneContext<'_>) -> bool {
        source.borrow().as_map().is_some()
    }
    fn instantiate(&self, source: &ObjRef, _cx: &mut CloneContext<'_>) -> Result<ObjRef> {
        let obj = source.borrow();
        obj.as_map()
            .map(|map| map.empty_like())
            .ok_or_else(|| CloneError::instantiation(obj.type_name(), "not a map"))
    }
    fn populate(&self, source: &ObjRef, clone: &ObjRef, cx: &mut CloneContext<'_>) -> Result<()> {
        let (type_name, entries) = {
            let obj = source.borrow();
            let entries = obj.as_map().map(|m| m.entries()).unwrap_or_default();
            (obj.type_name(), entries)
        };
        for (key, value) in &entries {
            let key_copy = cx.clone_value(key)?;
            let value_copy = cx.clone_value(value)?;
            let mut target = clone.borrow_mut();
            let map = target
                .as_map_mut()
                .ok_or_else(|| CloneError::instantiation(type_name, "empty copy is not a map"))?;
            map.insert_entry(key_copy, value_copy)
                .map_err(|cause| CloneError::instantiation(type_name, cause))?;
        }
        Ok(())
    }
}

// ------------- Closure strategies -------------
type Predicate = dyn Fn(&ObjRef) -> bool + Send + Sync;
type Shell = dyn Fn(&ObjRef) -> Result<ObjRef> + Send + Sync;
type Populate = dyn Fn(&ObjRef, &ObjRef, &mut CloneContext<'_>) -> Result<()> + Send + Sync;

/// A strategy made of closures: a predicate, a producer of the clone shell
/// and a populator that fills the shell, recursing through the context.
///
/// The shell is registered in the identity memo before the populator runs,
/// so cycles back to the source resolve to the shell.
pub struct FnStrategy {
    name: String,
    predicate: Box<Predicate>,
    shell: Box<Shell>,
    populate: Box<Populate>,
}
impl FnStrategy {
    pub fn new<P, S, F>(name: impl Into<String>, predicate: P, shell: S, populate: F) -> Self
    where
        P: Fn(&ObjRef) -> bool + Send + Sync + 'static,
        S: Fn(&ObjRef) -> Result<ObjRef> + Send + Sync + 'static,
        F: Fn(&ObjRef, &ObjRef, &mut CloneContext<'_>) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
            shell: Box::new(shell),
            populate: Box::new(populate),
        }
    }
    /// A strategy whose producer returns the finished clone without
    /// recursing, e.g. sharing the source or copying a handful of scalars.
    pub fn leaf<P, S>(name: impl Into<String>, predicate: P, producer: S) -> Self
    where
        P: Fn(&ObjRef) -> bool + Send + Sync + 'static,
        S: Fn(&ObjRef) -> Result<ObjRef> + Send + Sync + 'static,
    {
        Self::new(name, predicate, producer, |_, _, _| Ok(()))
    }
}
impl CloneStrategy for FnStrategy {
    fn name(&self) -> &str {
        &self.name
    }
    fn matches(&self, source: &ObjRef, _cx: &CloneContext<'_>) -> bool {
        (self.predicate)(source)
    }
    fn instantiate(&self, source: &ObjRef, _cx: &mut CloneContext<'_>) -> Result<ObjRef> {
        (self.shell)(source)
    }
    fn populate(&self, source: &ObjRef, clone: &ObjRef, cx: &mut CloneContext<'_>) -> Result<()> {
        (self.populate)(source, clone, cx)
    }
}

// ------------- Registry -------------
#[derive(Clone)]
pub struct StrategyRegistry {
    strategies: Vec<Arc<dyn CloneStrategy>>,
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }
    /// The built-ins in priority order: immutable, array, self-clone,
    /// collection, map.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(ImmutablePassthrough, Priority::Last);
        registry.register(ArrayStrategy, Priority::Last);
        registry.register(SelfCloneStrategy, Priority::Last);
        registry.register(CollectionStrategy, Priority::Last);
        registry.register(MapStrategy, Priority::Last);
        registry
    }
    pub fn register(&mut self, strategy: impl CloneStrategy + 'static, priority: Priority) {
        let strategy: Arc<dyn CloneStrategy> = Arc::new(strategy);
        let position = match &priority {
            Priority::First => 0,
            Priority::Last => self.strategies.len(),
            Priority::Before(name) => self.position_of(name).unwrap_or_else(|| {
                warn!(strategy = strategy.name(), missing = %name, "no such strategy, appending");
                self.strategies.len()
            }),
            Priority::After(name) => self.position_of(name).map(|p| p + 1).unwrap_or_else(|| {
                warn!(strategy = strategy.name(), missing = %name, "no such strategy, appending");
                self.strategies.len()
            }),
        };
        self.strategies.insert(position, strategy);
    }
    fn position_of(&self, name: &str) -> Option<usize> {
        self.strategies.iter().position(|s| s.name() == name)
    }
    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
    pub fn len(&self) -> usize {
        self.strategies.len()
    }
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
    /// The first strategy whose predicate accepts the source.
    pub fn find(&self, source: &ObjRef, cx: &CloneContext<'_>) -> Option<&dyn CloneStrategy> {
        self.strategies
            .iter()
            .find(|s| s.matches(source, cx))
            .map(|s| &**s)
    }
    /// Clones through the first matching strategy, or `None` when no
    /// strategy matches.
    pub fn try_clone(&self, source: &ObjRef, cx: &mut CloneContext<'_>) -> Result<Option<ObjRef>> {
        let Some(strategy) = self.find(source, cx) else {
            return Ok(None);
        };
        trace!(strategy = strategy.name(), "strategy selected");
        let clone = strategy.instantiate(source, cx)?;
        cx.register(source, &clone);
        strategy.populate(source, &clone, cx)?;
        Ok(Some(clone))
    }
}
impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloner::Cloner;
    use crate::container::{List, Map, Set};

    fn noop(name: &str) -> FnStrategy {
        FnStrategy::leaf(name, |_| false, |source| Ok(source.clone()))
    }

    #[test]
    fn builtins_are_in_priority_order() {
        let registry = StrategyRegistry::builtin();
        assert_eq!(
            registry.names(),
            vec!["immutable", "array", "self-clone", "collection", "map"]
        );
    }

    #[test]
    fn custom_strategies_land_where_asked() {
        let mut registry = StrategyRegistry::builtin();
        registry.register(noop("first"), Priority::First);
        registry.register(noop("last"), Priority::Last);
        registry.register(noop("before-map"), Priority::Before("map".into()));
        registry.register(noop("after-array"), Priority::After("array".into()));
        registry.register(noop("orphan"), Priority::After("missing".into()));
        assert_eq!(
            registry.names(),
            vec![
                "first",
                "immutable",
                "array",
                "after-array",
                "self-clone",
                "collection",
                "before-map",
                "map",
                "last",
                "orphan"
            ]
        );
    }

    #[test]
    fn first_matching_predicate_wins() {
        let cloner = Cloner::new();
        let cx = CloneContext::new(&cloner);
        let registry = StrategyRegistry::builtin();
        let list = ObjRef::new(List::new());
        let set = ObjRef::new(Set::new());
        let map = ObjRef::new(Map::new());
        assert_eq!(registry.find(&list, &cx).map(|s| s.name()), Some("collection"));
        assert_eq!(registry.find(&set, &cx).map(|s| s.name()), Some("collection"));
        assert_eq!(registry.find(&map, &cx).map(|s| s.name()), Some("map"));
    }

    #[test]
    fn no_match_yields_none() {
        let cloner = Cloner::new();
        let mut cx = CloneContext::new(&cloner);
        let registry = StrategyRegistry::empty();
        let list = ObjRef::new(List::new());
        assert!(registry.try_clone(&list, &mut cx).unwrap().is_none());
    }
}
