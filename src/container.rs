//! Built-in containers: fixed length arrays, lists, sets and maps.
//!
//! Sets and maps key their members by [`ValueKey`], i.e. objects by identity
//! and scalars by value, and keep insertion order so that copies iterate
//! exactly like their sources.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::reflect::{Collection, FieldType, Introspect, KeyValueMap, TypeDescriptor, TypeKind};
use crate::reflect;
use crate::value::{ObjRef, Value, ValueKey};

// ------------- Array -------------
/// A fixed length sequence with a declared component type.
pub struct Array {
    component: FieldType,
    items: Vec<Value>,
}
impl Array {
    /// An array of `len` slots, all `Null`.
    pub fn new(component: FieldType, len: usize) -> Self {
        Self {
            component,
            items: vec![Value::Null; len],
        }
    }
    pub fn from_values(component: FieldType, items: Vec<Value>) -> Result<Self, String> {
        if let Some(bad) = items.iter().find(|v| !v.is_null() && !component.accepts(v)) {
            return Err(format!("component type does not accept {}", bad.kind_name()));
        }
        Ok(Self { component, items })
    }
    pub fn component(&self) -> FieldType {
        self.component
    }
    pub fn len(&self) -> usize {
        self.items.len()
    }
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }
    pub fn set(&mut self, index: usize, value: Value) -> Result<(), String> {
        if !value.is_null() && !self.component.accepts(&value) {
            return Err(format!("component type does not accept {}", value.kind_name()));
        }
        let len = self.items.len();
        let slot = self
            .items
            .get_mut(index)
            .ok_or_else(|| format!("index {} out of bounds for length {}", index, len))?;
        *slot = value;
        Ok(())
    }
    pub fn items(&self) -> &[Value] {
        &self.items
    }
}
impl Introspect for Array {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::of_kind::<Self>("Array", TypeKind::Array)
    }
}
reflect!(Array);

// ------------- List -------------
#[derive(Default)]
pub struct List {
    items: Vec<Value>,
}
impl List {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn push(&mut self, value: impl Into<Value>) {
        self.items.push(value.into());
    }
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.items.get(index)
    }
    pub fn set(&mut self, index: usize, value: Value) -> Option<Value> {
        self.items
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, value))
    }
    pub fn len(&self) -> usize {
        self.items.len()
    }
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }
}
impl From<Vec<Value>> for List {
    fn from(items: Vec<Value>) -> Self {
        Self { items }
    }
}
impl Collection for List {
    fn elements(&self) -> Vec<Value> {
        self.items.clone()
    }
    fn empty_like(&self) -> ObjRef {
        ObjRef::new(List::new())
    }
    fn push(&mut self, value: Value) -> Result<(), String> {
        self.items.push(value);
        Ok(())
    }
}
impl Introspect for List {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::of_kind::<Self>("List", TypeKind::Collection).with_default::<Self>()
    }
}
reflect!(List; collection);

// ------------- Set -------------
#[derive(Default)]
pub struct Set {
    members: Vec<Value>,
    index: HashSet<ValueKey>,
}
impl Set {
    pub fn new() -> Self {
        Self::default()
    }
    /// Returns false when an identical member was already present.
    pub fn insert(&mut self, value: impl Into<Value>) -> bool {
        let value = value.into();
        if self.index.insert(value.key()) {
            self.members.push(value);
            true
        } else {
            false
        }
    }
    pub fn contains(&self, value: &Value) -> bool {
        self.index.contains(&value.key())
    }
    pub fn len(&self) -> usize {
        self.members.len()
    }
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.members.iter()
    }
}
impl Collection for Set {
    fn elements(&self) -> Vec<Value> {
        self.members.clone()
    }
    fn empty_like(&self) -> ObjRef {
        ObjRef::new(Set::new())
    }
    fn push(&mut self, value: Value) -> Result<(), String> {
        self.insert(value);
        Ok(())
    }
}
impl Introspect for Set {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::of_kind::<Self>("Set", TypeKind::Collection).with_default::<Self>()
    }
}
reflect!(Set; collection);

// ------------- Map -------------
#[derive(Default)]
pub struct Map {
    entries: Vec<(Value, Value)>,
    index: HashMap<ValueKey, usize>,
}
impl Map {
    pub fn new() -> Self {
        Self::default()
    }
    /// Inserts or replaces, returning the replaced value.
    pub fn insert(&mut self, key: impl Into<Value>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.index.get(&key.key()) {
            Some(&position) => Some(std::mem::replace(&mut self.entries[position].1, value)),
            None => {
                self.index.insert(key.key(), self.entries.len());
                self.entries.push((key, value));
                None
            }
        }
    }
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.index
            .get(&key.key())
            .map(|&position| &self.entries[position].1)
    }
    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(k, _)| k)
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }
}
impl KeyValueMap for Map {
    fn entries(&self) -> Vec<(Value, Value)> {
        self.entries.clone()
    }
    fn empty_like(&self) -> ObjRef {
        ObjRef::new(Map::new())
    }
    fn insert_entry(&mut self, key: Value, value: Value) -> Result<(), String> {
        self.insert(key, value);
        Ok(())
    }
}
impl Introspect for Map {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::of_kind::<Self>("Map", TypeKind::Map).with_default::<Self>()
    }
}
reflect!(Map; map);

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Array({:?}; {})", self.component, self.items.len())
    }
}
