//! The runtime value model: scalars, shared heap objects and typed handles.

// objects are shared and mutable within a single thread
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;
// scalar text is shared, never copied
use std::sync::Arc;

use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;

// used for the date and time value types
use chrono::{DateTime, NaiveDate, Utc};
// used for decimal numbers
use bigdecimal::BigDecimal;
// used to validate URIs
use lazy_static::lazy_static;
use regex::Regex;

use crate::reflect::{FieldType, Introspect, Reflect, ScalarKind};

lazy_static! {
    static ref URI_SCHEME: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:\S*$").unwrap();
}

// ------------- Uri -------------
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Uri(Arc<str>);

impl Uri {
    pub fn parse(s: &str) -> Option<Self> {
        URI_SCHEME.is_match(s).then(|| Uri(Arc::from(s)))
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ------------- ObjRef -------------
// The type id is kept beside the cell so identity and type can be read
// without borrowing the object.
struct Slot<T: ?Sized> {
    type_id: TypeId,
    cell: RefCell<T>,
}

/// A shared reference to a heap object. The allocation address is the
/// object's identity.
#[derive(Clone)]
pub struct ObjRef(Rc<Slot<dyn Reflect>>);

impl ObjRef {
    pub fn new<T: Reflect>(value: T) -> Self {
        let slot: Rc<Slot<dyn Reflect>> = Rc::new(Slot {
            type_id: TypeId::of::<T>(),
            cell: RefCell::new(value),
        });
        Self(slot)
    }
    /// # Panics
    /// Panics if the object is currently mutably borrowed.
    pub fn borrow(&self) -> Ref<'_, dyn Reflect> {
        self.0.cell.borrow()
    }
    /// # Panics
    /// Panics if the object is currently borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, dyn Reflect> {
        self.0.cell.borrow_mut()
    }
    pub fn type_id(&self) -> TypeId {
        self.0.type_id
    }
    pub fn type_name(&self) -> &'static str {
        self.borrow().type_name()
    }
    pub fn address(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
    pub fn ptr_eq(&self, other: &ObjRef) -> bool {
        self.address() == other.address()
    }
    pub fn is<T: Reflect>(&self) -> bool {
        self.0.type_id == TypeId::of::<T>()
    }
    pub fn downcast_ref<T: Reflect>(&self) -> Option<Ref<'_, T>> {
        Ref::filter_map(self.borrow(), |r| r.as_any().downcast_ref::<T>()).ok()
    }
    pub fn downcast_mut<T: Reflect>(&self) -> Option<RefMut<'_, T>> {
        RefMut::filter_map(self.borrow_mut(), |r| r.as_any_mut().downcast_mut::<T>()).ok()
    }
}
impl fmt::Debug for ObjRef {
    // never descends into the object, graphs may be cyclic
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0.cell.try_borrow() {
            Ok(obj) => write!(f, "{}@{:#x}", obj.type_name(), self.address()),
            Err(_) => write!(f, "<borrowed>@{:#x}", self.address()),
        }
    }
}

// ------------- Handle -------------
/// An [`ObjRef`] known to point at a `T`.
pub struct Handle<T> {
    obj: ObjRef,
    marker: PhantomData<fn() -> T>,
}

impl<T: Reflect> Handle<T> {
    pub fn new(value: T) -> Self {
        Self {
            obj: ObjRef::new(value),
            marker: PhantomData,
        }
    }
    pub fn from_obj(obj: ObjRef) -> Option<Self> {
        obj.is::<T>().then_some(Self {
            obj,
            marker: PhantomData,
        })
    }
    pub fn obj(&self) -> &ObjRef {
        &self.obj
    }
    pub fn to_value(&self) -> Value {
        Value::Object(self.obj.clone())
    }
    /// # Panics
    /// Panics if the object is currently mutably borrowed.
    pub fn borrow(&self) -> Ref<'_, T> {
        self.obj
            .downcast_ref::<T>()
            .expect("handle always points at its own type")
    }
    /// # Panics
    /// Panics if the object is currently borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        self.obj
            .downcast_mut::<T>()
            .expect("handle always points at its own type")
    }
    pub fn ptr_eq(&self, other: &Handle<T>) -> bool {
        self.obj.ptr_eq(&other.obj)
    }
}
impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            obj: self.obj.clone(),
            marker: PhantomData,
        }
    }
}
impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Handle({:?})", self.obj)
    }
}

// ------------- Value -------------
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    Text(Arc<str>),
    Decimal(Arc<BigDecimal>),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Uri(Uri),
    Object(ObjRef),
}

impl Value {
    pub fn text(s: &str) -> Self {
        Value::Text(Arc::from(s))
    }
    pub fn decimal(d: BigDecimal) -> Self {
        Value::Decimal(Arc::new(d))
    }
    pub fn object<T: Reflect>(value: T) -> Self {
        Value::Object(ObjRef::new(value))
    }
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match self {
            Value::Null | Value::Object(_) => None,
            Value::Bool(_) => Some(ScalarKind::Bool),
            Value::Int(_) => Some(ScalarKind::Int),
            Value::Float(_) => Some(ScalarKind::Float),
            Value::Char(_) => Some(ScalarKind::Char),
            Value::Text(_) => Some(ScalarKind::Text),
            Value::Decimal(_) => Some(ScalarKind::Decimal),
            Value::Timestamp(_) => Some(ScalarKind::Timestamp),
            Value::Date(_) => Some(ScalarKind::Date),
            Value::Uri(_) => Some(ScalarKind::Uri),
        }
    }
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Object(_) => "Object",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::Char(_) => "Char",
            Value::Text(_) => "Text",
            Value::Decimal(_) => "Decimal",
            Value::Timestamp(_) => "Timestamp",
            Value::Date(_) => "Date",
            Value::Uri(_) => "Uri",
        }
    }
    pub fn as_object(&self) -> Option<&ObjRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
    /// Reference identity: true when both values are the very same
    /// allocation (objects, text, decimals) or equal plain scalars.
    pub fn is_same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            // bitwise, so NaN is the same as itself
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => Arc::ptr_eq(a, b),
            (Value::Decimal(a), Value::Decimal(b)) => Arc::ptr_eq(a, b),
            (Value::Uri(a), Value::Uri(b)) => Arc::ptr_eq(&a.0, &b.0),
            (a, b) => a == b,
        }
    }
    pub fn key(&self) -> ValueKey {
        match self {
            Value::Null => ValueKey::Null,
            Value::Bool(b) => ValueKey::Bool(*b),
            Value::Int(i) => ValueKey::Int(*i),
            Value::Float(f) => ValueKey::Float(f.to_bits()),
            Value::Char(c) => ValueKey::Char(*c),
            Value::Text(s) => ValueKey::Text(Arc::clone(s)),
            Value::Decimal(d) => ValueKey::Decimal(Arc::clone(d)),
            Value::Timestamp(t) => ValueKey::Timestamp(*t),
            Value::Date(d) => ValueKey::Date(*d),
            Value::Uri(u) => ValueKey::Uri(u.clone()),
            Value::Object(obj) => ValueKey::Object(obj.address()),
        }
    }
}

// Scalars compare by value, objects by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Uri(a), Value::Uri(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<ObjRef> for Value {
    fn from(obj: ObjRef) -> Self {
        Value::Object(obj)
    }
}
impl<T: Reflect> From<Handle<T>> for Value {
    fn from(handle: Handle<T>) -> Self {
        Value::Object(handle.obj)
    }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::text(s)
    }
}

// ------------- ValueKey -------------
/// Hashable identity of a value, used by sets and maps: scalars by value,
/// objects by address.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum ValueKey {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Char(char),
    Text(Arc<str>),
    Decimal(Arc<BigDecimal>),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Uri(Uri),
    Object(usize),
}

// ------------- FieldValue -------------
/// Conversion between a concrete field type and [`Value`].
pub trait FieldValue: Sized {
    fn field_type() -> FieldType;
    fn to_value(&self) -> Value;
    fn from_value(value: Value) -> Result<Self, String>;
}

fn mismatch(expected: &str, found: &Value) -> String {
    format!("expected {}, found {}", expected, found.kind_name())
}

macro_rules! scalar_field_value {
    ($ty:ty, $kind:ident, $to:expr, $from:pat => $out:expr) => {
        impl FieldValue for $ty {
            fn field_type() -> FieldType {
                FieldType::Scalar(ScalarKind::$kind)
            }
            fn to_value(&self) -> Value {
                let to: fn(&$ty) -> Value = $to;
                to(self)
            }
            fn from_value(value: Value) -> Result<Self, String> {
                match value {
                    $from => Ok($out),
                    other => Err(mismatch(stringify!($kind), &other)),
                }
            }
        }
    };
}

scalar_field_value!(bool, Bool, |b| Value::Bool(*b), Value::Bool(b) => b);
scalar_field_value!(i64, Int, |i| Value::Int(*i), Value::Int(i) => i);
scalar_field_value!(f64, Float, |f| Value::Float(*f), Value::Float(f) => f);
scalar_field_value!(char, Char, |c| Value::Char(*c), Value::Char(c) => c);
scalar_field_value!(String, Text, |s| Value::text(s), Value::Text(s) => s.to_string());
scalar_field_value!(Arc<str>, Text, |s| Value::Text(Arc::clone(s)), Value::Text(s) => s);
scalar_field_value!(BigDecimal, Decimal, |d| Value::decimal(d.clone()), Value::Decimal(d) => (*d).clone());
scalar_field_value!(Arc<BigDecimal>, Decimal, |d| Value::Decimal(Arc::clone(d)), Value::Decimal(d) => d);
scalar_field_value!(DateTime<Utc>, Timestamp, |t| Value::Timestamp(*t), Value::Timestamp(t) => t);
scalar_field_value!(NaiveDate, Date, |d| Value::Date(*d), Value::Date(d) => d);
scalar_field_value!(Uri, Uri, |u| Value::Uri(u.clone()), Value::Uri(u) => u);

// integers narrower than i64 widen losslessly
macro_rules! int_field_value {
    ($($ty:ty),+) => {$(
        impl FieldValue for $ty {
            fn field_type() -> FieldType {
                FieldType::Scalar(ScalarKind::Int)
            }
            fn to_value(&self) -> Value {
                Value::Int(i64::from(*self))
            }
            fn from_value(value: Value) -> Result<Self, String> {
                match value {
                    Value::Int(i) => <$ty>::try_from(i).map_err(|e| e.to_string()),
                    other => Err(mismatch("Int", &other)),
                }
            }
        }
    )+};
}

int_field_value!(i8, i16, i32, u8, u16, u32);

// may exceed i64, such values are carried as decimals
macro_rules! wide_int_field_value {
    ($($ty:ty),+) => {$(
        impl FieldValue for $ty {
            fn field_type() -> FieldType {
                FieldType::Scalar(ScalarKind::Int)
            }
            fn to_value(&self) -> Value {
                match i64::try_from(*self) {
                    Ok(i) => Value::Int(i),
                    Err(_) => Value::decimal(BigDecimal::from(*self as u64)),
                }
            }
            fn from_value(value: Value) -> Result<Self, String> {
                match value {
                    Value::Int(i) => <$ty>::try_from(i).map_err(|e| e.to_string()),
                    Value::Decimal(d) => d
                        .to_string()
                        .parse::<$ty>()
                        .map_err(|e| format!("{}: {}", d, e)),
                    other => Err(mismatch("Int", &other)),
                }
            }
        }
    )+};
}

wide_int_field_value!(u64, usize);

impl FieldValue for f32 {
    fn field_type() -> FieldType {
        FieldType::Scalar(ScalarKind::Float)
    }
    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Float(f) => Ok(f as f32),
            other => Err(mismatch("Float", &other)),
        }
    }
}

// optional scalars map `None` to `Null`
macro_rules! optional_field_value {
    ($($ty:ty),+) => {$(
        impl FieldValue for Option<$ty> {
            fn field_type() -> FieldType {
                <$ty as FieldValue>::field_type()
            }
            fn to_value(&self) -> Value {
                self.as_ref().map_or(Value::Null, <$ty as FieldValue>::to_value)
            }
            fn from_value(value: Value) -> Result<Self, String> {
                match value {
                    Value::Null => Ok(None),
                    other => <$ty as FieldValue>::from_value(other).map(Some),
                }
            }
        }
    )+};
}

optional_field_value!(
    bool, i8, i16, i32, i64, u8, u16, u32, u64, usize, f32, f64, char, String, Arc<str>,
    BigDecimal, Arc<BigDecimal>, DateTime<Utc>, NaiveDate, Uri
);

impl FieldValue for Value {
    fn field_type() -> FieldType {
        FieldType::Dynamic
    }
    fn to_value(&self) -> Value {
        self.clone()
    }
    fn from_value(value: Value) -> Result<Self, String> {
        Ok(value)
    }
}

impl FieldValue for ObjRef {
    fn field_type() -> FieldType {
        FieldType::Dynamic
    }
    fn to_value(&self) -> Value {
        Value::Object(self.clone())
    }
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Object(obj) => Ok(obj),
            other => Err(mismatch("Object", &other)),
        }
    }
}

impl FieldValue for Option<ObjRef> {
    fn field_type() -> FieldType {
        FieldType::Dynamic
    }
    fn to_value(&self) -> Value {
        self.clone().map_or(Value::Null, Value::Object)
    }
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            Value::Object(obj) => Ok(Some(obj)),
            other => Err(mismatch("Object", &other)),
        }
    }
}

impl<T: Introspect> FieldValue for Handle<T> {
    fn field_type() -> FieldType {
        FieldType::object::<T>()
    }
    fn to_value(&self) -> Value {
        self.to_value()
    }
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            // no borrow here, the object may be the one being written to
            Value::Object(obj) => Handle::from_obj(obj)
                .ok_or_else(|| format!("expected {}, found another type", std::any::type_name::<T>())),
            other => Err(mismatch(std::any::type_name::<T>(), &other)),
        }
    }
}

impl<T: Introspect> FieldValue for Option<Handle<T>> {
    fn field_type() -> FieldType {
        FieldType::object::<T>()
    }
    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, Handle::to_value)
    }
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => <Handle<T> as FieldValue>::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_shared_not_copied() {
        let original = Value::text("shared");
        let copy = original.clone();
        assert!(original.is_same(&copy));
        assert!(!original.is_same(&Value::text("shared")));
        assert_eq!(original, Value::text("shared"));
    }

    #[test]
    fn uri_requires_a_scheme() {
        assert!(Uri::parse("https://example.org/a?b=c").is_some());
        assert!(Uri::parse("urn:isbn:0451450523").is_some());
        assert!(Uri::parse("no scheme here").is_none());
        assert!(Uri::parse("/relative/path").is_none());
    }

    #[test]
    fn keys_distinguish_objects_by_identity() {
        use crate::container::List;
        let a = ObjRef::new(List::new());
        let b = ObjRef::new(List::new());
        assert_ne!(Value::Object(a.clone()).key(), Value::Object(b).key());
        assert_eq!(Value::Object(a.clone()).key(), Value::Object(a).key());
        assert_eq!(Value::Int(7).key(), Value::Int(7).key());
    }

    #[test]
    fn nan_is_the_same_as_itself() {
        let nan = Value::Float(f64::NAN);
        assert!(nan.is_same(&nan.clone()));
    }

    #[test]
    fn optional_scalars_round_trip_through_null() {
        let hired = NaiveDate::from_ymd_opt(2020, 1, 1);
        assert_eq!(hired.to_value(), Value::Date(hired.unwrap()));
        assert_eq!(None::<NaiveDate>.to_value(), Value::Null);
        assert_eq!(Option::<NaiveDate>::from_value(Value::Null), Ok(None));
        assert_eq!(Option::<i32>::from_value(Value::Int(4)), Ok(Some(4)));
        assert!(Option::<i32>::from_value(Value::text("4")).is_err());
        assert!(matches!(
            <Option<NaiveDate> as FieldValue>::field_type(),
            FieldType::Scalar(ScalarKind::Date)
        ));
    }

    #[test]
    fn wide_integers_beyond_i64_survive() {
        let big = u64::MAX;
        let value = big.to_value();
        assert!(matches!(value, Value::Decimal(_)));
        assert_eq!(u64::from_value(value), Ok(big));
        assert_eq!(usize::from_value(Value::Int(12)), Ok(12));
        assert!(u32::from_value(Value::Int(-1)).is_err());
        assert_eq!(f32::from_value(Value::Float(0.5)), Ok(0.5));
    }

    #[test]
    fn narrowing_conversion_is_checked() {
        assert_eq!(i32::from_value(Value::Int(12)), Ok(12));
        assert!(i32::from_value(Value::Int(i64::MAX)).is_err());
        assert!(i32::from_value(Value::text("12")).is_err());
    }
}
