//! Deepgraph – deep copies of shared, possibly cyclic object graphs.
//!
//! Given a root [`Value`], the [`Cloner`] produces an independent copy of
//! everything reachable from it while
//! * preserving sharing: two references to one object become two references
//!   to one copy,
//! * terminating on cycles,
//! * sharing, not copying, values of immutable types,
//! * letting pluggable strategies copy arrays, collections, maps and
//!   self-cloning types before falling back to field by field copying.
//!
//! ## Modules
//! * [`value`] – [`Value`], the shared object reference [`ObjRef`] and typed [`Handle`]s.
//! * [`reflect`] – The [`Reflect`] / [`Introspect`] traits that describe a type's
//!   fields and constructors, plus the [`reflect!`] and [`field!`] macros.
//! * [`container`] – Built-in [`Array`], [`List`], [`Set`] and [`Map`].
//! * [`immutable`] – The [`Classifier`] deciding which types are shared.
//! * [`strategy`] – [`CloneStrategy`] and the ordered [`StrategyRegistry`].
//! * [`memo`] – The per call [`IdentityMemo`] that breaks cycles.
//! * [`cloner`] – The [`Cloner`] orchestrating all of the above.
//! * [`compare`] – The [`Comparator`] used to validate a copy against its source.
//! * [`config`] – [`CloneOptions`], loadable from file and environment.
//!
//! ## Quick Start
//! ```
//! use deepgraph::{field, reflect, Cloner, Introspect, List, ObjRef, TypeDescriptor, Value};
//!
//! #[derive(Default)]
//! struct Person {
//!     name: String,
//!     friends: Value,
//! }
//! impl Introspect for Person {
//!     fn describe() -> TypeDescriptor {
//!         TypeDescriptor::record::<Self>("Person")
//!             .field(field!(Person, name))
//!             .field(field!(Person, friends))
//!             .with_default::<Self>()
//!     }
//! }
//! reflect!(Person);
//!
//! let alice = ObjRef::new(Person { name: "Alice".into(), friends: Value::Null });
//! let friends = ObjRef::new(List::from(vec![Value::Object(alice.clone())]));
//! alice.downcast_mut::<Person>().unwrap().friends = Value::Object(friends);
//!
//! let cloner = Cloner::new();
//! let copy = cloner.clone_object(&alice).unwrap();
//! assert!(!copy.ptr_eq(&alice));
//! assert!(cloner.deep_equals(&Value::Object(alice), &Value::Object(copy)));
//! ```

pub mod cloner;
pub mod compare;
pub mod config;
pub mod container;
pub mod error;
pub mod immutable;
pub mod memo;
pub mod reflect;
pub mod strategy;
pub mod value;

pub use cloner::{CloneContext, Cloner};
pub use compare::Comparator;
pub use config::CloneOptions;
pub use container::{Array, List, Map, Set};
pub use error::{CloneError, Result};
pub use immutable::{Classifier, ImmutabilityRule};
pub use memo::{IdentityKey, IdentityMemo};
pub use reflect::{
    Collection, DescriptorCache, FieldDescriptor, FieldType, Introspect, KeyValueMap, Reflect,
    ScalarKind, SelfClone, TypeDescriptor, TypeHandle, TypeKind,
};
pub use strategy::{CloneStrategy, FnStrategy, Priority, StrategyRegistry};
pub use value::{FieldValue, Handle, ObjRef, Uri, Value};

/// Deep copies `value` with a default [`Cloner`].
pub fn deep_clone(value: &Value) -> Result<Value> {
    Cloner::new().deep_clone(value)
}

/// Compares `original` and `clone` with a default [`Cloner`]'s comparator.
pub fn deep_equals(original: &Value, clone: &Value) -> bool {
    Cloner::new().deep_equals(original, clone)
}
