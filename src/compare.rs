//! Structural comparison of a graph with its copy.
//!
//! Both graphs are rendered to text, every mutable object with its identity
//! token (`Type@0x…`). Immutable objects are shared between a graph and its
//! copy, so they carry no address; they are numbered by first visit instead
//! (`Type#3`), which keeps back references to them distinguishable. Identity
//! tokens are then replaced by the order in which they first appear, so two
//! graphs compare equal exactly when they have the same shape, the same
//! scalars and the same sharing, no matter which allocations they live in.

use std::collections::{HashMap, HashSet};
use std::fmt::Write;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

use crate::container::Array;
use crate::immutable::Classifier;
use crate::reflect::{DescriptorCache, TypeDescriptor};
use crate::value::{ObjRef, Value};

lazy_static! {
    static ref IDENTITY: Regex = Regex::new(r"@(0x[0-9a-f]+)").unwrap();
}

enum Shape {
    Array(Vec<Value>),
    Collection(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Record(Vec<(&'static str, Option<Value>)>),
}

pub struct Comparator<'a> {
    descriptors: &'a DescriptorCache,
    classifier: &'a Classifier,
}

impl<'a> Comparator<'a> {
    pub fn new(descriptors: &'a DescriptorCache, classifier: &'a Classifier) -> Self {
        Self {
            descriptors,
            classifier,
        }
    }

    pub fn deep_equals(&self, original: &Value, clone: &Value) -> bool {
        normalize(&self.render(original)) == normalize(&self.render(clone))
    }

    /// True when no mutable object is reachable from both values.
    pub fn reference_distinct(&self, original: &Value, clone: &Value) -> bool {
        let theirs = self.mutable_objects(clone);
        self.mutable_objects(original).is_disjoint(&theirs)
    }

    pub fn render(&self, value: &Value) -> String {
        let mut out = String::new();
        let mut seen = HashMap::new();
        self.render_value(value, &mut out, &mut seen);
        out
    }

    fn render_value(&self, value: &Value, out: &mut String, seen: &mut HashMap<usize, usize>) {
        // writing into a String cannot fail
        let _ = match value {
            Value::Null => write!(out, "null"),
            Value::Bool(b) => write!(out, "{}", b),
            Value::Int(i) => write!(out, "{}", i),
            Value::Float(f) => write!(out, "{:?}", f),
            Value::Char(c) => write!(out, "{:?}", c),
            Value::Text(s) => write!(out, "{:?}", s),
            Value::Decimal(d) => write!(out, "{}d", d),
            Value::Timestamp(t) => write!(out, "{}", t.to_rfc3339()),
            Value::Date(d) => write!(out, "{}", d),
            Value::Uri(u) => write!(out, "<{}>", u),
            Value::Object(obj) => {
                self.render_object(obj, out, seen);
                Ok(())
            }
        };
    }

    // `seen` maps addresses to their first visit ordinal
    fn render_object(&self, obj: &ObjRef, out: &mut String, seen: &mut HashMap<usize, usize>) {
        let descriptor = self.descriptors.of(obj);
        let next = seen.len() + 1;
        let first_visit = !seen.contains_key(&obj.address());
        let ordinal = *seen.entry(obj.address()).or_insert(next);
        out.push_str(descriptor.name);
        if self.classifier.is_immutable(&descriptor) {
            let _ = write!(out, "#{}", ordinal);
        } else {
            let _ = write!(out, "@{:#x}", obj.address());
        }
        if !first_visit {
            out.push('^');
            return;
        }
        match shape(obj, &descriptor) {
            Shape::Array(items) | Shape::Collection(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.render_value(item, out, seen);
                }
                out.push(']');
            }
            Shape::Map(entries) => {
                out.push('{');
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.render_value(key, out, seen);
                    out.push_str(" => ");
                    self.render_value(value, out, seen);
                }
                out.push('}');
            }
            Shape::Record(fields) => {
                out.push('{');
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(name);
                    out.push_str(": ");
                    match value {
                        Some(value) => self.render_value(value, out, seen),
                        None => out.push_str("<unreadable>"),
                    }
                }
                out.push('}');
            }
        }
    }

    fn mutable_objects(&self, root: &Value) -> HashSet<usize> {
        let mut found = HashSet::new();
        let mut seen = HashSet::new();
        let mut pending = vec![root.clone()];
        while let Some(value) = pending.pop() {
            let Value::Object(obj) = value else {
                continue;
            };
            if !seen.insert(obj.address()) {
                continue;
            }
            let descriptor = self.descriptors.of(&obj);
            if !self.classifier.is_immutable(&descriptor) {
                found.insert(obj.address());
            }
            match shape(&obj, &descriptor) {
                Shape::Array(items) | Shape::Collection(items) => pending.extend(items),
                Shape::Map(entries) => {
                    for (key, value) in entries {
                        pending.push(key);
                        pending.push(value);
                    }
                }
                Shape::Record(fields) => pending.extend(fields.into_iter().filter_map(|(_, v)| v)),
            }
        }
        found
    }
}

fn shape(obj: &ObjRef, descriptor: &TypeDescriptor) -> Shape {
    let borrowed = obj.borrow();
    if let Some(array) = borrowed.as_any().downcast_ref::<Array>() {
        return Shape::Array(array.items().to_vec());
    }
    if let Some(collection) = borrowed.as_collection() {
        return Shape::Collection(collection.elements());
    }
    if let Some(map) = borrowed.as_map() {
        return Shape::Map(map.entries());
    }
    Shape::Record(
        descriptor
            .instance_fields()
            .map(|field| (field.name, (field.get)(&*borrowed).ok()))
            .collect(),
    )
}

/// Replaces identity tokens by their order of first appearance.
pub fn normalize(rendered: &str) -> String {
    let mut ordinals: HashMap<String, usize> = HashMap::new();
    IDENTITY
        .replace_all(rendered, |caps: &Captures| {
            let next = ordinals.len() + 1;
            let ordinal = *ordinals.entry(caps[1].to_string()).or_insert(next);
            format!("@{}", ordinal)
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_numbers_identities_by_first_appearance() {
        let rendered = "List@0x1f[Node@0x2a{next: Node@0x1f^}, Node@0x2a^]";
        assert_eq!(
            normalize(rendered),
            "List@1[Node@2{next: Node@1^}, Node@2^]"
        );
    }

    #[test]
    fn normalize_keeps_distinct_identities_distinct() {
        assert_ne!(
            normalize("[A@0x10{}, A@0x10^]"),
            normalize("[A@0x10{}, A@0x20{}]")
        );
    }
}
