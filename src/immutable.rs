//! Decides which types are shared rather than copied.
//!
//! Scalars (the well-known value types) are always immutable. For object
//! types the classifier consults, in this order, the set of types marked
//! immutable by the caller, the registered rules, and the structural rule:
//! a record type that is not extensible and whose every declared field type
//! is immutable is itself immutable.
//!
//! The structural rule recurses through declared field types. A type that is
//! still being evaluated when it is reached again answers "not immutable",
//! so every type on a cycle of type references is mutable.

use std::any::TypeId;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::reflect::{DescriptorCache, FieldType, TypeDescriptor, TypeKind};
use crate::value::Value;

/// A caller supplied immutability predicate over types.
pub trait ImmutabilityRule: Send + Sync {
    fn is_immutable(&self, descriptor: &TypeDescriptor) -> bool;
}
impl<F> ImmutabilityRule for F
where
    F: Fn(&TypeDescriptor) -> bool + Send + Sync,
{
    fn is_immutable(&self, descriptor: &TypeDescriptor) -> bool {
        self(descriptor)
    }
}

pub struct Classifier {
    descriptors: Arc<DescriptorCache>,
    well_known: HashSet<TypeId>,
    rules: Vec<Arc<dyn ImmutabilityRule>>,
    verdicts: DashMap<TypeId, bool>,
}

impl Classifier {
    pub fn new(descriptors: Arc<DescriptorCache>) -> Self {
        Self {
            descriptors,
            well_known: HashSet::new(),
            rules: Vec::new(),
            verdicts: DashMap::new(),
        }
    }
    pub fn mark_immutable(&mut self, type_id: TypeId) {
        self.well_known.insert(type_id);
        self.verdicts.clear();
    }
    pub fn register_rule(&mut self, rule: impl ImmutabilityRule + 'static) {
        self.rules.push(Arc::new(rule));
        self.verdicts.clear();
    }
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
    pub fn is_immutable_value(&self, value: &Value) -> bool {
        match value {
            Value::Object(obj) => self.is_immutable(&self.descriptors.of(obj)),
            _ => true,
        }
    }
    pub fn is_immutable(&self, descriptor: &TypeDescriptor) -> bool {
        let mut in_progress = HashSet::new();
        self.evaluate(descriptor, &mut in_progress)
    }
    pub fn is_immutable_field(&self, declared: &FieldType) -> bool {
        let mut in_progress = HashSet::new();
        self.evaluate_field(declared, &mut in_progress)
    }

    fn evaluate(&self, descriptor: &TypeDescriptor, in_progress: &mut HashSet<TypeId>) -> bool {
        if let Some(verdict) = self.verdicts.get(&descriptor.type_id) {
            return *verdict;
        }
        if in_progress.contains(&descriptor.type_id) {
            return false;
        }
        in_progress.insert(descriptor.type_id);
        let verdict = self.well_known.contains(&descriptor.type_id)
            || self.rules.iter().any(|rule| rule.is_immutable(descriptor))
            || self.structurally_immutable(descriptor, in_progress);
        in_progress.remove(&descriptor.type_id);
        trace!(type_name = descriptor.name, immutable = verdict, "classified");
        self.verdicts.insert(descriptor.type_id, verdict);
        verdict
    }
    fn structurally_immutable(&self, descriptor: &TypeDescriptor, in_progress: &mut HashSet<TypeId>) -> bool {
        descriptor.kind == TypeKind::Record
            && !descriptor.extensible
            && descriptor
                .fields
                .iter()
                .all(|field| self.evaluate_field(&field.declared, in_progress))
    }
    fn evaluate_field(&self, declared: &FieldType, in_progress: &mut HashSet<TypeId>) -> bool {
        match declared {
            FieldType::Scalar(_) => true,
            FieldType::Dynamic => false,
            FieldType::Object(handle) => {
                let descriptor = self.descriptors.of_handle(handle);
                self.evaluate(&descriptor, in_progress)
            }
        }
    }
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Classifier")
            .field("well_known", &self.well_known.len())
            .field("rules", &self.rules.len())
            .field("verdicts", &self.verdicts.len())
            .finish()
    }
}
