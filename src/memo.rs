// used for the identity memo, keys are addresses so a fast hasher is fine
use core::hash::BuildHasherDefault;
use seahash::SeaHasher;
use std::any::TypeId;
use std::collections::HashMap;

use crate::value::ObjRef;

pub type MemoHasher = BuildHasherDefault<SeaHasher>;

/// (runtime type, reference identity) of a source object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct IdentityKey {
    type_id: TypeId,
    address: usize,
}
impl IdentityKey {
    pub fn of(obj: &ObjRef) -> Self {
        Self {
            type_id: obj.type_id(),
            address: obj.address(),
        }
    }
    pub fn address(&self) -> usize {
        self.address
    }
}

struct Entry {
    // retained so the address cannot be reused while the memo lives
    _source: ObjRef,
    clone: ObjRef,
}

/// Source identity to clone, for one top-level clone call.
#[derive(Default)]
pub struct IdentityMemo {
    kept: HashMap<IdentityKey, Entry, MemoHasher>,
}
impl IdentityMemo {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn get(&self, key: &IdentityKey) -> Option<ObjRef> {
        self.kept.get(key).map(|entry| entry.clone.clone())
    }
    pub fn put(&mut self, source: &ObjRef, clone: &ObjRef) {
        self.kept.insert(
            IdentityKey::of(source),
            Entry {
                _source: source.clone(),
                clone: clone.clone(),
            },
        );
    }
    pub fn contains(&self, source: &ObjRef) -> bool {
        self.kept.contains_key(&IdentityKey::of(source))
    }
    pub fn len(&self) -> usize {
        self.kept.len()
    }
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }
    pub fn clear(&mut self) {
        self.kept.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{List, Map};

    #[test]
    fn keys_are_per_object_not_per_value() {
        let a = ObjRef::new(List::new());
        let b = ObjRef::new(List::new());
        assert_ne!(IdentityKey::of(&a), IdentityKey::of(&b));
        assert_eq!(IdentityKey::of(&a), IdentityKey::of(&a.clone()));
    }

    #[test]
    fn put_then_get_returns_the_registered_clone() {
        let mut memo = IdentityMemo::new();
        let source = ObjRef::new(Map::new());
        let clone = ObjRef::new(Map::new());
        assert!(memo.get(&IdentityKey::of(&source)).is_none());
        memo.put(&source, &clone);
        let found = memo.get(&IdentityKey::of(&source)).unwrap();
        assert!(found.ptr_eq(&clone));
        assert!(memo.contains(&source));
        assert!(!memo.contains(&clone));
        memo.clear();
        assert!(memo.is_empty());
    }
}
