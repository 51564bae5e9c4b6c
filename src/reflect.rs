//! Type introspection for heap objects.
//!
//! Rust has no runtime reflection, so every type that should take part in
//! graph cloning describes itself: the object-safe [`Reflect`] trait is what
//! the cloner sees at runtime, while [`Introspect`] yields the static
//! [`TypeDescriptor`] (fields, constructors, extensibility) without needing an
//! instance. The [`reflect!`](crate::reflect!) and [`field!`](crate::field!)
//! macros generate the repetitive parts.

// used to identify types and to downcast trait objects
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

// descriptors are shared between threads, so the cache is a concurrent map
use dashmap::DashMap;
// used for the serialization fallback
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::value::{FieldValue, ObjRef, Value};

// ------------- Reflect -------------
/// The runtime face of a heap object.
///
/// The capability accessors default to `None`; a type opts into a built-in
/// clone strategy by returning `Some(self)` from the matching accessor.
pub trait Reflect: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn type_name(&self) -> &'static str;
    fn descriptor(&self) -> TypeDescriptor;
    fn as_self_clone(&self) -> Option<&dyn SelfClone> {
        None
    }
    fn as_collection(&self) -> Option<&dyn Collection> {
        None
    }
    fn as_collection_mut(&mut self) -> Option<&mut dyn Collection> {
        None
    }
    fn as_map(&self) -> Option<&dyn KeyValueMap> {
        None
    }
    fn as_map_mut(&mut self) -> Option<&mut dyn KeyValueMap> {
        None
    }
}

/// Static description of a type, available without an instance.
pub trait Introspect: Reflect + Sized {
    fn describe() -> TypeDescriptor;
}

// ------------- Capabilities -------------
/// A type that knows how to copy itself.
pub trait SelfClone {
    fn self_clone(&self) -> ObjRef;
}

/// Ordered or unordered container of values.
pub trait Collection {
    /// Elements in iteration order.
    fn elements(&self) -> Vec<Value>;
    /// A new, empty container of the same kind.
    fn empty_like(&self) -> ObjRef;
    fn push(&mut self, value: Value) -> Result<(), String>;
}

/// Key-value container.
pub trait KeyValueMap {
    /// Entries in iteration order.
    fn entries(&self) -> Vec<(Value, Value)>;
    /// A new, empty map of the same kind.
    fn empty_like(&self) -> ObjRef;
    fn insert_entry(&mut self, key: Value, value: Value) -> Result<(), String>;
}

// ------------- Field types -------------
/// The well-known value types. Values of these kinds are always shared.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ScalarKind {
    Bool,
    Int,
    Float,
    Char,
    Text,
    Decimal,
    Timestamp,
    Date,
    Uri,
}

/// A type referenced by a declared field type. Resolution is lazy through
/// function pointers, which lets a type refer to itself.
#[derive(Clone, Copy, Debug)]
pub struct TypeHandle {
    pub type_id: fn() -> TypeId,
    pub describe: fn() -> TypeDescriptor,
}
impl TypeHandle {
    pub fn of<T: Introspect>() -> Self {
        Self {
            type_id: TypeId::of::<T>,
            describe: T::describe,
        }
    }
}

/// The declared type of a field or of an array's components.
#[derive(Clone, Copy, Debug)]
pub enum FieldType {
    Scalar(ScalarKind),
    Object(TypeHandle),
    Dynamic,
}
impl FieldType {
    pub fn object<T: Introspect>() -> Self {
        FieldType::Object(TypeHandle::of::<T>())
    }
    /// Whether a value may be stored in a slot of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldType::Dynamic, _) => true,
            (FieldType::Scalar(kind), value) => value.scalar_kind() == Some(*kind),
            (FieldType::Object(_), Value::Null) => true,
            (FieldType::Object(handle), Value::Object(obj)) => obj.type_id() == (handle.type_id)(),
            (FieldType::Object(_), _) => false,
        }
    }
}

// ------------- Descriptors -------------
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TypeKind {
    Record,
    Array,
    Collection,
    Map,
    Opaque,
}

pub type FieldGetter = fn(&dyn Reflect) -> Result<Value, String>;
pub type FieldSetter = fn(&mut dyn Reflect, Value) -> Result<(), String>;

#[derive(Clone, Copy)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub declared: FieldType,
    pub constant: bool,
    pub type_level: bool,
    pub get: FieldGetter,
    pub set: FieldSetter,
}
impl FieldDescriptor {
    pub fn constant(mut self) -> Self {
        self.constant = true;
        self
    }
    /// A field that belongs to the type rather than to its instances.
    /// Type-level constants are never copied; they cannot be written.
    pub fn type_level_constant(name: &'static str, declared: FieldType, get: FieldGetter) -> Self {
        Self {
            name,
            declared,
            constant: true,
            type_level: true,
            get,
            set: read_only,
        }
    }
    pub fn is_instance_state(&self) -> bool {
        !(self.constant && self.type_level)
    }
}
impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("declared", &self.declared)
            .field("constant", &self.constant)
            .field("type_level", &self.type_level)
            .finish()
    }
}

fn read_only(_: &mut dyn Reflect, _: Value) -> Result<(), String> {
    Err(String::from("field is read only"))
}

#[derive(Clone, Copy)]
pub struct SerdeHooks {
    pub to_json: fn(&dyn Reflect) -> Result<serde_json::Value, String>,
    pub from_json: fn(serde_json::Value) -> Result<ObjRef, String>,
}

#[derive(Clone)]
pub struct TypeDescriptor {
    pub name: &'static str,
    pub type_id: TypeId,
    pub kind: TypeKind,
    pub extensible: bool,
    pub fields: Vec<FieldDescriptor>,
    pub construct: Option<fn() -> ObjRef>,
    pub copy_construct: Option<fn(&dyn Reflect) -> Option<ObjRef>>,
    pub serde: Option<SerdeHooks>,
}
impl TypeDescriptor {
    pub fn record<T: Reflect>(name: &'static str) -> Self {
        Self::of_kind::<T>(name, TypeKind::Record)
    }
    pub fn of_kind<T: Reflect>(name: &'static str, kind: TypeKind) -> Self {
        Self {
            name,
            type_id: TypeId::of::<T>(),
            kind,
            extensible: false,
            fields: Vec::new(),
            construct: None,
            copy_construct: None,
            serde: None,
        }
    }
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }
    /// Marks the type as open for extension, which rules out structural immutability.
    pub fn extensible(mut self) -> Self {
        self.extensible = true;
        self
    }
    pub fn with_default<T: Reflect + Default>(mut self) -> Self {
        self.construct = Some(construct_default::<T>);
        self
    }
    pub fn with_copy_constructor<T: Reflect + Clone>(mut self) -> Self {
        self.copy_construct = Some(copy_construct::<T>);
        self
    }
    pub fn with_serde<T: Reflect + Serialize + DeserializeOwned>(mut self) -> Self {
        self.serde = Some(SerdeHooks {
            to_json: to_json::<T>,
            from_json: from_json::<T>,
        });
        self
    }
    /// Fields that hold instance state, in declaration order.
    pub fn instance_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_instance_state())
    }
}
impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("extensible", &self.extensible)
            .field("fields", &self.fields)
            .field("construct", &self.construct.is_some())
            .field("copy_construct", &self.copy_construct.is_some())
            .field("serde", &self.serde.is_some())
            .finish()
    }
}

fn construct_default<T: Reflect + Default>() -> ObjRef {
    ObjRef::new(T::default())
}
fn copy_construct<T: Reflect + Clone>(source: &dyn Reflect) -> Option<ObjRef> {
    source
        .as_any()
        .downcast_ref::<T>()
        .map(|t| ObjRef::new(t.clone()))
}
fn to_json<T: Reflect + Serialize>(source: &dyn Reflect) -> Result<serde_json::Value, String> {
    let typed = source
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| format!("expected {}", source.type_name()))?;
    serde_json::to_value(typed).map_err(|e| e.to_string())
}
fn from_json<T: Reflect + DeserializeOwned>(json: serde_json::Value) -> Result<ObjRef, String> {
    let typed: T = serde_json::from_value(json).map_err(|e| e.to_string())?;
    Ok(ObjRef::new(typed))
}

/// Resolves the declared type of a field from an accessor closure, so the
/// [`field!`](crate::field!) macro does not need the field's type spelled out.
pub fn field_type_of<S, F, A>(_accessor: A) -> FieldType
where
    F: FieldValue,
    A: Fn(&S) -> &F,
{
    F::field_type()
}

// ------------- Descriptor cache -------------
/// Type to descriptor memoization. Descriptors are computed on first
/// encounter of a type and never change afterwards, so a single cache may be
/// shared by any number of cloners and threads.
#[derive(Default)]
pub struct DescriptorCache {
    kept: DashMap<TypeId, Arc<TypeDescriptor>>,
}
impl DescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn of(&self, obj: &ObjRef) -> Arc<TypeDescriptor> {
        let type_id = obj.type_id();
        if let Some(kept) = self.kept.get(&type_id) {
            return Arc::clone(kept.value());
        }
        let described = Arc::new(obj.borrow().descriptor());
        Arc::clone(self.kept.entry(type_id).or_insert(described).value())
    }
    pub fn of_handle(&self, handle: &TypeHandle) -> Arc<TypeDescriptor> {
        let type_id = (handle.type_id)();
        if let Some(kept) = self.kept.get(&type_id) {
            return Arc::clone(kept.value());
        }
        let described = Arc::new((handle.describe)());
        Arc::clone(self.kept.entry(type_id).or_insert(described).value())
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
}
impl fmt::Debug for DescriptorCache {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "DescriptorCache({} types)", self.kept.len())
    }
}

// ------------- Macros -------------
/// Implements [`Reflect`] for a type that implements [`Introspect`].
///
/// Capabilities are listed after a semicolon: `self_clone`, `collection`
/// and `map` expose the matching trait implementation to the cloner.
///
/// ```
/// use deepgraph::{field, reflect, Introspect, TypeDescriptor, Value};
///
/// #[derive(Default)]
/// struct Node {
///     label: String,
///     next: Value,
/// }
/// impl Introspect for Node {
///     fn describe() -> TypeDescriptor {
///         TypeDescriptor::record::<Self>("Node")
///             .field(field!(Node, label))
///             .field(field!(Node, next))
///             .with_default::<Self>()
///     }
/// }
/// reflect!(Node);
/// ```
#[macro_export]
macro_rules! reflect {
    (@capability self_clone) => {
        fn as_self_clone(&self) -> Option<&dyn $crate::reflect::SelfClone> {
            Some(self)
        }
    };
    (@capability collection) => {
        fn as_collection(&self) -> Option<&dyn $crate::reflect::Collection> {
            Some(self)
        }
        fn as_collection_mut(&mut self) -> Option<&mut dyn $crate::reflect::Collection> {
            Some(self)
        }
    };
    (@capability map) => {
        fn as_map(&self) -> Option<&dyn $crate::reflect::KeyValueMap> {
            Some(self)
        }
        fn as_map_mut(&mut self) -> Option<&mut dyn $crate::reflect::KeyValueMap> {
            Some(self)
        }
    };
    ($ty:ty $(; $($capability:ident),+ )?) => {
        impl $crate::reflect::Reflect for $ty {
            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
            fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                self
            }
            fn type_name(&self) -> &'static str {
                stringify!($ty)
            }
            fn descriptor(&self) -> $crate::reflect::TypeDescriptor {
                <$ty as $crate::reflect::Introspect>::describe()
            }
            $($( $crate::reflect!(@capability $capability); )+)?
        }
    };
}

/// Builds a [`FieldDescriptor`] for a named field of a struct. The field's
/// type must implement [`FieldValue`].
#[macro_export]
macro_rules! field {
    ($ty:ty, $name:ident) => {
        $crate::reflect::FieldDescriptor {
            name: stringify!($name),
            declared: $crate::reflect::field_type_of(|t: &$ty| &t.$name),
            constant: false,
            type_level: false,
            get: |obj: &dyn $crate::reflect::Reflect| -> ::std::result::Result<$crate::value::Value, String> {
                obj.as_any()
                    .downcast_ref::<$ty>()
                    .map(|t| $crate::value::FieldValue::to_value(&t.$name))
                    .ok_or_else(|| format!("expected {}", stringify!($ty)))
            },
            set: |obj: &mut dyn $crate::reflect::Reflect, value: $crate::value::Value| -> ::std::result::Result<(), String> {
                let t = obj
                    .as_any_mut()
                    .downcast_mut::<$ty>()
                    .ok_or_else(|| format!("expected {}", stringify!($ty)))?;
                t.$name = $crate::value::FieldValue::from_value(value)?;
                Ok(())
            },
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{field, reflect};

    #[derive(Default, Clone)]
    struct Sample {
        count: i64,
        label: String,
        next: Value,
    }
    impl Sample {
        const VERSION: i64 = 3;
    }
    impl Introspect for Sample {
        fn describe() -> TypeDescriptor {
            TypeDescriptor::record::<Self>("Sample")
                .field(field!(Sample, count))
                .field(field!(Sample, label).constant())
                .field(field!(Sample, next))
                .field(FieldDescriptor::type_level_constant(
                    "VERSION",
                    FieldType::Scalar(ScalarKind::Int),
                    |_| Ok(Value::Int(Sample::VERSION)),
                ))
                .with_default::<Self>()
        }
    }
    reflect!(Sample);

    #[test]
    fn field_accessors_read_and_write() {
        let obj = ObjRef::new(Sample {
            count: 4,
            label: "four".into(),
            next: Value::Null,
        });
        let descriptor = obj.borrow().descriptor();
        let count = &descriptor.fields[0];
        assert_eq!((count.get)(&*obj.borrow()), Ok(Value::Int(4)));
        (count.set)(&mut *obj.borrow_mut(), Value::Int(5)).unwrap();
        assert_eq!(obj.downcast_ref::<Sample>().unwrap().count, 5);
        let err = (count.set)(&mut *obj.borrow_mut(), Value::text("five")).unwrap_err();
        assert!(err.contains("Int"), "unexpected message {err}");
    }

    #[test]
    fn instance_fields_skip_type_level_constants() {
        let descriptor = Sample::describe();
        let names: Vec<_> = descriptor.instance_fields().map(|f| f.name).collect();
        assert_eq!(names, vec!["count", "label", "next"]);
    }

    #[test]
    fn declared_types_come_from_field_types() {
        let descriptor = Sample::describe();
        assert!(matches!(
            descriptor.fields[0].declared,
            FieldType::Scalar(ScalarKind::Int)
        ));
        assert!(matches!(
            descriptor.fields[1].declared,
            FieldType::Scalar(ScalarKind::Text)
        ));
        assert!(matches!(descriptor.fields[2].declared, FieldType::Dynamic));
    }

    #[test]
    fn cache_describes_each_type_once() {
        let cache = DescriptorCache::new();
        let a = ObjRef::new(Sample::default());
        let b = ObjRef::new(Sample::default());
        let first = cache.of(&a);
        let second = cache.of(&b);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        let by_handle = cache.of_handle(&TypeHandle::of::<Sample>());
        assert!(Arc::ptr_eq(&first, &by_handle));
    }
}
