//! The graph cloner: walks a value and everything reachable from it.
//!
//! Per object the order is fixed: immutable types are shared, objects
//! already seen in this call resolve through the identity memo, then the
//! strategy registry gets a chance, and finally the structural fallback
//! builds an empty instance of the same type, registers it, and copies every
//! instance field into it.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::compare::Comparator;
use crate::config::CloneOptions;
use crate::error::{CloneError, Result};
use crate::immutable::{Classifier, ImmutabilityRule};
use crate::memo::{IdentityKey, IdentityMemo};
use crate::reflect::{DescriptorCache, Reflect, TypeDescriptor};
use crate::strategy::{CloneStrategy, Priority, StrategyRegistry};
use crate::value::{Handle, ObjRef, Value};

// ------------- Cloner -------------
pub struct Cloner {
    options: CloneOptions,
    descriptors: Arc<DescriptorCache>,
    classifier: Classifier,
    strategies: StrategyRegistry,
}

impl Cloner {
    pub fn new() -> Self {
        Self::with_options(CloneOptions::default())
    }
    pub fn with_options(options: CloneOptions) -> Self {
        Self::with_descriptor_cache(options, Arc::new(DescriptorCache::new()))
    }
    /// A cloner sharing an existing descriptor cache, e.g. one per thread
    /// over a process wide cache.
    pub fn with_descriptor_cache(options: CloneOptions, descriptors: Arc<DescriptorCache>) -> Self {
        Self {
            options,
            classifier: Classifier::new(Arc::clone(&descriptors)),
            descriptors,
            strategies: StrategyRegistry::builtin(),
        }
    }
    pub fn options(&self) -> &CloneOptions {
        &self.options
    }
    pub fn descriptors(&self) -> &Arc<DescriptorCache> {
        &self.descriptors
    }
    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }
    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }
    pub fn register_strategy(&mut self, strategy: impl CloneStrategy + 'static, priority: Priority) {
        self.strategies.register(strategy, priority);
    }
    pub fn register_immutability_rule(&mut self, rule: impl ImmutabilityRule + 'static) {
        self.classifier.register_rule(rule);
    }
    pub fn mark_immutable<T: Reflect>(&mut self) {
        self.classifier.mark_immutable(std::any::TypeId::of::<T>());
    }
    pub fn is_immutable(&self, value: &Value) -> bool {
        self.classifier.is_immutable_value(value)
    }

    /// Deep copies `value`. Either the whole graph is copied or an error is
    /// returned; no partially built copy ever escapes.
    pub fn deep_clone(&self, value: &Value) -> Result<Value> {
        let mut cx = CloneContext::new(self);
        let result = cx.clone_value(value);
        match &result {
            Ok(_) => debug!(copied = cx.memo.len(), "deep clone complete"),
            Err(e) => debug!(error = %e, copied = cx.memo.len(), "deep clone aborted"),
        }
        result
    }
    pub fn clone_object(&self, obj: &ObjRef) -> Result<ObjRef> {
        match self.deep_clone(&Value::Object(obj.clone()))? {
            Value::Object(copy) => Ok(copy),
            _ => Err(CloneError::instantiation(obj.type_name(), "copy is not an object")),
        }
    }
    pub fn clone_handle<T: Reflect>(&self, handle: &Handle<T>) -> Result<Handle<T>> {
        let copy = self.clone_object(handle.obj())?;
        Handle::from_obj(copy).ok_or_else(|| {
            CloneError::instantiation(std::any::type_name::<T>(), "copy has a different type")
        })
    }

    pub fn comparator(&self) -> Comparator<'_> {
        Comparator::new(&self.descriptors, &self.classifier)
    }
    pub fn deep_equals(&self, original: &Value, clone: &Value) -> bool {
        self.comparator().deep_equals(original, clone)
    }
}

impl Default for Cloner {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- CloneContext -------------
/// State of one top-level clone call. The identity memo lives here, so it
/// starts empty for every call.
pub struct CloneContext<'a> {
    cloner: &'a Cloner,
    memo: IdentityMemo,
    depth: usize,
}

enum Instance {
    Fresh(ObjRef),
    Original,
}

impl<'a> CloneContext<'a> {
    pub fn new(cloner: &'a Cloner) -> Self {
        Self {
            cloner,
            memo: IdentityMemo::new(),
            depth: 0,
        }
    }
    pub fn cloner(&self) -> &'a Cloner {
        self.cloner
    }
    pub fn memo(&self) -> &IdentityMemo {
        &self.memo
    }
    pub fn descriptor(&self, obj: &ObjRef) -> Arc<TypeDescriptor> {
        self.cloner.descriptors.of(obj)
    }
    pub fn is_immutable(&self, obj: &ObjRef) -> bool {
        self.cloner.classifier.is_immutable(&self.descriptor(obj))
    }
    /// Records `clone` as the copy of `source` for the rest of this call.
    pub(crate) fn register(&mut self, source: &ObjRef, clone: &ObjRef) {
        self.memo.put(source, clone);
    }

    pub fn clone_value(&mut self, value: &Value) -> Result<Value> {
        match value {
            Value::Object(obj) => self.clone_object(obj).map(Value::Object),
            // scalars are immutable, the copy is the very same value
            scalar => Ok(scalar.clone()),
        }
    }

    pub fn clone_object(&mut self, source: &ObjRef) -> Result<ObjRef> {
        let descriptor = self.descriptor(source);
        if self.cloner.classifier.is_immutable(&descriptor) {
            return Ok(source.clone());
        }
        if let Some(existing) = self.memo.get(&IdentityKey::of(source)) {
            trace!(type_name = descriptor.name, "resolved through memo");
            return Ok(existing);
        }
        if let Some(limit) = self.cloner.options.max_depth {
            if self.depth >= limit {
                return Err(CloneError::DepthExceeded { limit });
            }
        }
        self.depth += 1;
        let result = self.duplicate(source, &descriptor);
        self.depth -= 1;
        result
    }

    fn duplicate(&mut self, source: &ObjRef, descriptor: &TypeDescriptor) -> Result<ObjRef> {
        let cloner = self.cloner;
        if let Some(clone) = cloner.strategies.try_clone(source, self)? {
            return Ok(clone);
        }
        self.clone_structurally(source, descriptor)
    }

    fn clone_structurally(&mut self, source: &ObjRef, descriptor: &TypeDescriptor) -> Result<ObjRef> {
        let shell = match self.instantiate(source, descriptor)? {
            Instance::Fresh(shell) => shell,
            Instance::Original => {
                self.register(source, source);
                return Ok(source.clone());
            }
        };
        self.register(source, &shell);
        for field in descriptor.instance_fields() {
            let value = {
                let obj = source.borrow();
                (field.get)(&*obj)
            }
            .map_err(|cause| CloneError::field_access(descriptor.name, field.name, cause))?;
            let copy = self.clone_value(&value)?;
            let mut target = shell.borrow_mut();
            (field.set)(&mut *target, copy)
                .map_err(|cause| CloneError::field_access(descriptor.name, field.name, cause))?;
        }
        Ok(shell)
    }

    fn instantiate(&self, source: &ObjRef, descriptor: &TypeDescriptor) -> Result<Instance> {
        if let Some(construct) = descriptor.construct {
            trace!(type_name = descriptor.name, "no-arg constructor");
            return Ok(Instance::Fresh(construct()));
        }
        if let Some(copy_construct) = descriptor.copy_construct {
            let copied = {
                let obj = source.borrow();
                copy_construct(&*obj)
            };
            if let Some(shell) = copied {
                trace!(type_name = descriptor.name, "copy constructor");
                return Ok(Instance::Fresh(shell));
            }
        }
        let mut cause = String::from("no accessible no-arg or copy constructor");
        if self.cloner.options.serialization_fallback {
            match self.round_trip(source, descriptor) {
                Ok(shell) => {
                    trace!(type_name = descriptor.name, "serialization round trip");
                    return Ok(Instance::Fresh(shell));
                }
                Err(e) => cause = format!("{}; serialization fallback failed: {}", cause, e),
            }
        }
        if self.cloner.options.return_original {
            warn!(type_name = descriptor.name, %cause, "sharing original");
            return Ok(Instance::Original);
        }
        Err(CloneError::instantiation(descriptor.name, cause))
    }

    fn round_trip(&self, source: &ObjRef, descriptor: &TypeDescriptor) -> std::result::Result<ObjRef, String> {
        let hooks = descriptor
            .serde
            .ok_or_else(|| String::from("type is not serializable"))?;
        let json = {
            let obj = source.borrow();
            (hooks.to_json)(&*obj)?
        };
        (hooks.from_json)(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::List;
    use crate::reflect::{Introspect, TypeDescriptor};
    use crate::{field, reflect};

    #[derive(Default)]
    struct Node {
        label: String,
        next: Value,
    }
    impl Introspect for Node {
        fn describe() -> TypeDescriptor {
            TypeDescriptor::record::<Self>("Node")
                .field(field!(Node, label))
                .field(field!(Node, next))
                .with_default::<Self>()
        }
    }
    reflect!(Node);

    #[test]
    fn memo_starts_empty_for_every_call() {
        let cloner = Cloner::new();
        let node = Value::object(Node {
            label: "a".into(),
            next: Value::Null,
        });
        let first = cloner.deep_clone(&node).unwrap();
        let second = cloner.deep_clone(&node).unwrap();
        assert!(!first.is_same(&second), "each call produces its own copy");
    }

    #[test]
    fn shell_is_registered_before_fields_are_copied() {
        let cloner = Cloner::new();
        let node = ObjRef::new(Node::default());
        node.downcast_mut::<Node>().unwrap().next = Value::Object(node.clone());
        let copy = cloner.clone_object(&node).unwrap();
        assert!(!copy.ptr_eq(&node));
        let next = copy.downcast_ref::<Node>().unwrap().next.clone();
        assert!(next.as_object().unwrap().ptr_eq(&copy));
    }

    #[test]
    fn depth_limit_aborts_the_call() {
        let cloner = Cloner::with_options(CloneOptions {
            max_depth: Some(2),
            ..CloneOptions::default()
        });
        let inner = Value::object(List::from(vec![Value::object(List::new())]));
        let outer = Value::object(List::from(vec![inner]));
        assert_eq!(
            cloner.deep_clone(&outer).unwrap_err(),
            CloneError::DepthExceeded { limit: 2 }
        );
    }

    #[test]
    fn descriptor_cache_is_shared_between_cloners() {
        let cache = Arc::new(DescriptorCache::new());
        let a = Cloner::with_descriptor_cache(CloneOptions::default(), Arc::clone(&cache));
        let b = Cloner::with_descriptor_cache(CloneOptions::default(), Arc::clone(&cache));
        a.deep_clone(&Value::object(Node::default())).unwrap();
        let before = cache.len();
        b.deep_clone(&Value::object(Node::default())).unwrap();
        assert_eq!(cache.len(), before);
        assert!(Arc::ptr_eq(a.descriptors(), b.descriptors()));
    }
}
