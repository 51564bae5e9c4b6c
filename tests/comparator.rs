use std::sync::Arc;
use std::thread;

use chrono::{TimeZone, Utc};

use deepgraph::{
    field, reflect, CloneOptions, Cloner, DescriptorCache, Introspect, List, Map, ObjRef, Set,
    TypeDescriptor, Uri, Value,
};

#[derive(Default)]
struct Account {
    owner: String,
    opened: Option<ObjRef>,
    tags: Value,
    parent: Value,
}
impl Introspect for Account {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::record::<Self>("Account")
            .field(field!(Account, owner))
            .field(field!(Account, opened))
            .field(field!(Account, tags))
            .field(field!(Account, parent))
            .with_default::<Self>()
    }
}
reflect!(Account);

struct Stamp {
    at: chrono::DateTime<Utc>,
    source: Uri,
}
impl Introspect for Stamp {
    fn describe() -> TypeDescriptor {
        TypeDescriptor::record::<Self>("Stamp")
            .field(field!(Stamp, at))
            .field(field!(Stamp, source))
    }
}
reflect!(Stamp);

/// A ledger map of accounts, each pointing back at the ledger, sharing one
/// tag list and one immutable stamp.
fn ledger() -> Value {
    let stamp = ObjRef::new(Stamp {
        at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        source: Uri::parse("https://example.com/ledger").unwrap(),
    });
    let tags = Value::object(List::from(vec![Value::text("retail"), Value::Int(3)]));
    let ledger = ObjRef::new(Map::new());
    for owner in ["alice", "bob"] {
        let account = Value::object(Account {
            owner: owner.into(),
            opened: Some(stamp.clone()),
            tags: tags.clone(),
            parent: Value::Object(ledger.clone()),
        });
        ledger.downcast_mut::<Map>().unwrap().insert(owner, account);
    }
    let mut nested = Set::new();
    nested.insert(tags.clone());
    nested.insert(Value::Float(0.5));
    ledger
        .downcast_mut::<Map>()
        .unwrap()
        .insert("nested", Value::object(nested));
    Value::Object(ledger)
}

#[test]
fn copy_equals_its_source_and_shares_nothing_mutable() {
    let cloner = Cloner::new();
    let original = ledger();
    let copy = cloner.deep_clone(&original).unwrap();
    let comparator = cloner.comparator();
    assert!(comparator.deep_equals(&original, &copy));
    assert!(comparator.reference_distinct(&original, &copy));
    assert!(!comparator.reference_distinct(&original, &original));
}

#[test]
fn diverging_copy_is_no_longer_equal() {
    let cloner = Cloner::new();
    let original = ledger();
    let copy = cloner.deep_clone(&original).unwrap();
    {
        let map = copy.as_object().unwrap().downcast_ref::<Map>().unwrap();
        let bob = map.get(&Value::text("bob")).unwrap().as_object().unwrap();
        bob.downcast_mut::<Account>().unwrap().owner = "robert".into();
    }
    assert!(!cloner.deep_equals(&original, &copy));
}

#[test]
fn broken_sharing_is_detected() {
    let cloner = Cloner::new();
    let shared = Value::object(List::new());
    let together = Value::object(List::from(vec![shared.clone(), shared]));
    let apart = Value::object(List::from(vec![
        Value::object(List::new()),
        Value::object(List::new()),
    ]));
    assert!(!cloner.deep_equals(&together, &apart));
}

#[test]
fn immutable_objects_carry_no_identity() {
    let cloner = Cloner::new();
    let stamp = |secs| {
        Value::object(Stamp {
            at: Utc.timestamp_opt(secs, 0).unwrap(),
            source: Uri::parse("urn:isbn:0451450523").unwrap(),
        })
    };
    let rendered = cloner.comparator().render(&stamp(0));
    assert!(!rendered.contains('@'), "{}", rendered);
    assert!(cloner.deep_equals(&stamp(0), &stamp(0)));
    assert!(!cloner.deep_equals(&stamp(0), &stamp(60)));
}

#[test]
fn back_references_to_immutables_keep_their_target() {
    let cloner = Cloner::new();
    let stamp = |secs| {
        Value::object(Stamp {
            at: Utc.timestamp_opt(secs, 0).unwrap(),
            source: Uri::parse("urn:stamp").unwrap(),
        })
    };
    let (x, y) = (stamp(1), stamp(2));
    let xyx = Value::object(List::from(vec![x.clone(), y.clone(), x.clone()]));
    let xyy = Value::object(List::from(vec![x, y.clone(), y]));
    assert!(!cloner.deep_equals(&xyx, &xyy), "different back reference targets");
    let copy = cloner.deep_clone(&xyx).unwrap();
    assert!(cloner.deep_equals(&xyx, &copy));
}

#[test]
fn free_functions_use_default_cloner() {
    let original = ledger();
    let copy = deepgraph::deep_clone(&original).unwrap();
    assert!(deepgraph::deep_equals(&original, &copy));
}

#[test]
fn cloners_share_descriptors_across_threads() {
    let cache = Arc::new(DescriptorCache::new());
    let cloner = Arc::new(Cloner::with_descriptor_cache(
        CloneOptions::default(),
        Arc::clone(&cache),
    ));
    thread::scope(|scope| {
        for _ in 0..4 {
            let cloner = Arc::clone(&cloner);
            scope.spawn(move || {
                let original = ledger();
                let copy = cloner.deep_clone(&original).unwrap();
                assert!(cloner.deep_equals(&original, &copy));
            });
        }
    });
    // Map, Account, Stamp, List, Set
    assert_eq!(cache.len(), 5);
}
