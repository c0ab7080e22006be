/// End-to-end behavior of types, instances and observers.
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use openerp_attr::*;

fn log_observer(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Observer {
    let log = log.clone();
    Observer::new(move |change| {
        log.lock().push(format!("{tag}:{}", change.kind.as_str()));
        Ok(())
    })
}

fn indices(ty: &ObjectType) -> Vec<usize> {
    let mut indices: Vec<usize> = ty.schemas().iter().map(|s| s.index()).collect();
    indices.sort_unstable();
    indices
}

#[test]
fn test_multi_inheritance_layout() {
    let multi1 = TypeBuilder::new("Multi1")
        .attr("i1", AttributeSchema::new().with_default(1i64))
        .attr("i2", AttributeSchema::new().with_default(2i64))
        .build()
        .unwrap();
    let multi2 = TypeBuilder::new("Multi2")
        .attr("i3", AttributeSchema::new().with_default(3i64))
        .attr("i4", AttributeSchema::new().with_default(4i64))
        .build()
        .unwrap();
    let multi = TypeBuilder::new("Multi")
        .base(&multi1)
        .base(&multi2)
        .attr("i4", AttributeSchema::new().with_default(12i64))
        .build()
        .unwrap();

    assert_eq!(indices(&multi), vec![0, 1, 2, 3]);
    let obj = Object::new(&multi);
    assert_eq!(obj.get_as::<i64>("i4").unwrap(), Some(12));

    // Values land in distinct slots.
    for (n, name) in ["i1", "i2", "i3", "i4"].iter().enumerate() {
        obj.set(name, n as i64 * 100).unwrap();
    }
    for (n, name) in ["i1", "i2", "i3", "i4"].iter().enumerate() {
        assert_eq!(obj.get_as::<i64>(name).unwrap(), Some(n as i64 * 100));
    }

    // A subclass of the merged type stays contiguous too.
    let sub = TypeBuilder::new("Sub")
        .base(&multi)
        .attr("i5", AttributeSchema::new())
        .build()
        .unwrap();
    assert_eq!(indices(&sub), vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_copy_on_write_mode_change() {
    let base = TypeBuilder::new("Base")
        .attr("x", AttributeSchema::new())
        .build()
        .unwrap();
    let derived = TypeBuilder::new("Derived").base(&base).build().unwrap();

    let shared = derived.schema("x").unwrap();
    derived
        .customize("x", |s| s.set_set_mode(SetMode::ReadOnly))
        .unwrap();

    assert!(!Arc::ptr_eq(&derived.schema("x").unwrap(), &shared));
    assert_eq!(base.schema("x").unwrap().set_mode().label(), "slot");

    let b = Object::new(&base);
    b.set("x", 1i64).unwrap();
    b.set("x", 2i64).unwrap();

    // Observers and metadata added through the derived type stay there.
    let obs = Observer::new(|_| Ok(()));
    derived.add_static_observer("x", obs.clone()).unwrap();
    derived
        .customize("x", |s| {
            s.set_metadata("label", serde_json::json!("X"));
            Ok(())
        })
        .unwrap();
    assert!(derived.schema("x").unwrap().has_observer(&obs));
    assert!(!base.schema("x").unwrap().has_observer(&obs));
    assert_eq!(base.schema("x").unwrap().get_metadata("label"), None);

    let d = Object::new(&derived);
    d.set("x", 1i64).unwrap();
    assert!(d.set("x", 2i64).is_err());
}

#[test]
fn test_notification_order_and_idempotence() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let ty = TypeBuilder::new("Watched")
        .attr("x", AttributeSchema::new().with_default(0i64))
        .observe("x", log_observer(&log, "static"))
        .build()
        .unwrap();
    let obj = Object::new(&ty);
    obj.set("x", 1i64).unwrap();
    obj.observe("x", log_observer(&log, "dynamic")).unwrap();
    log.lock().clear();

    obj.set("x", 2i64).unwrap();
    assert_eq!(*log.lock(), vec!["static:update", "dynamic:update"]);

    obj.set("x", 2i64).unwrap();
    assert_eq!(log.lock().len(), 2);

    obj.delete("x").unwrap();
    assert_eq!(log.lock()[2..], ["static:delete", "dynamic:delete"]);

    assert_eq!(obj.get_as::<i64>("x").unwrap(), Some(0));
    assert_eq!(log.lock()[4..], ["static:create", "dynamic:create"]);
}

#[test]
fn test_suppression_restored_after_error() {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    let ty = TypeBuilder::new("Quiet")
        .attr("a", AttributeSchema::new())
        .attr("b", AttributeSchema::new().typed::<i64>())
        .build()
        .unwrap();
    let obj = Object::new(&ty);
    obj.observe_many(
        &["a", "b"],
        Observer::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    )
    .unwrap();

    let result = obj.with_suppressed(|| -> Result<()> {
        obj.set("a", 1i64)?;
        obj.set("b", "wrong")?;
        Ok(())
    });
    assert!(result.unwrap_err().is_validation());
    assert_eq!(count.load(Ordering::SeqCst), 0);

    obj.set("a", 2i64).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_reentrant_observer_edits() {
    let ty = TypeBuilder::new("Reentrant")
        .attr("x", AttributeSchema::new())
        .build()
        .unwrap();
    let obj = Object::new(&ty);
    let log = Arc::new(Mutex::new(Vec::new()));
    let replacement = log_observer(&log, "replacement");

    // The first observer swaps itself for `replacement` while firing.
    let slot: Arc<Mutex<Option<Observer>>> = Arc::new(Mutex::new(None));
    let me = slot.clone();
    let next = replacement.clone();
    let l = log.clone();
    let first = Observer::new(move |change| {
        l.lock().push("first".to_string());
        if let Some(me) = me.lock().clone() {
            change.object.unobserve("x", &me)?;
        }
        change.object.observe("x", next.clone())
    });
    *slot.lock() = Some(first.clone());
    obj.observe("x", first.clone()).unwrap();
    obj.observe("x", log_observer(&log, "second")).unwrap();

    obj.set("x", 1i64).unwrap();
    assert_eq!(*log.lock(), vec!["first", "second:create"]);
    assert!(!obj.has_observer("x", &first));
    assert!(obj.has_observer("x", &replacement));

    obj.set("x", 2i64).unwrap();
    assert_eq!(
        log.lock()[2..],
        ["second:update".to_string(), "replacement:update".to_string()]
    );
}

#[test]
fn test_staged_edits_commit_when_observer_fails() {
    let ty = TypeBuilder::new("Failing")
        .attr("x", AttributeSchema::new())
        .build()
        .unwrap();
    let obj = Object::new(&ty);
    let late = Observer::new(|_| Ok(()));
    let add = late.clone();
    obj.observe(
        "x",
        Observer::new(move |change| {
            change.object.observe("x", add.clone())?;
            Err(AttrError::callback("observer failed"))
        }),
    )
    .unwrap();

    let err = obj.set("x", 1i64).unwrap_err();
    assert_eq!(err.to_string(), "observer failed");
    assert!(obj.has_observer("x", &late));
}

#[test]
fn test_static_observer_edit_during_dispatch() {
    let hits = Arc::new(AtomicUsize::new(0));
    let h = hits.clone();
    let extra = Observer::new(move |_| {
        h.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let to_add = extra.clone();
    let ty = TypeBuilder::new("Static")
        .attr("x", AttributeSchema::new())
        .observe(
            "x",
            Observer::new(move |change| {
                change
                    .object
                    .object_type()
                    .add_static_observer("x", to_add.clone())
            }),
        )
        .build()
        .unwrap();
    let obj = Object::new(&ty);
    obj.set("x", 1i64).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    obj.set("x", 2i64).unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(ty.schema("x").unwrap().has_observer(&extra));
}

#[test]
fn test_state_round_trip() {
    let ty = TypeBuilder::new("Snapshot")
        .attr("name", AttributeSchema::new().typed::<String>().with_default(""))
        .attr(
            "cache",
            AttributeSchema::new()
                .with_default(0i64)
                .with_getstate_mode(GetStateMode::Exclude),
        )
        .build()
        .unwrap();
    let original = Object::with_values(
        &ty,
        [("name", Value::from("widget")), ("cache", Value::new(99i64))],
    )
    .unwrap();

    let state = original.get_state().unwrap();
    assert!(state.contains_key("name"));
    assert!(!state.contains_key("cache"));

    let restored = Object::new(&ty);
    restored.set_state(&state).unwrap();
    assert_eq!(restored.get("name").unwrap(), original.get("name").unwrap());
    assert_eq!(restored.get_as::<i64>("cache").unwrap(), Some(0));
}

#[test]
fn test_constant_left_out_of_state() {
    let ty = TypeBuilder::new("Versioned")
        .attr("version", AttributeSchema::constant(7i64))
        .attr("payload", AttributeSchema::new().with_default(1i64))
        .build()
        .unwrap();
    let original = Object::with_values(&ty, [("payload", 3i64)]).unwrap();
    let state = original.get_state().unwrap();
    assert!(!state.contains_key("version"));

    let copy = original.restore_copy().unwrap();
    assert_eq!(copy.get_as::<i64>("payload").unwrap(), Some(3));
    assert_eq!(copy.get_as::<i64>("version").unwrap(), Some(7));
}

#[test]
fn test_magic_observer_and_bound_methods() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let ty = TypeBuilder::new("Magic")
        .attr("x", AttributeSchema::new())
        .method(
            "_observe_x",
            Method::observer(move |obj, change| {
                s.lock().push((obj.type_name().to_string(), change.kind));
                Ok(())
            }),
        )
        .build()
        .unwrap();
    let obj = Object::new(&ty);
    obj.set("x", 1i64).unwrap();
    assert_eq!(*seen.lock(), vec![("Magic".to_string(), ChangeKind::Create)]);
    assert!(ty
        .schema("x")
        .unwrap()
        .has_observer(&Observer::method("_observe_x")));
}

#[test]
fn test_static_dotted_observer() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let leaf = TypeBuilder::new("Leaf")
        .attr("value", AttributeSchema::new())
        .build()
        .unwrap();
    let holder = TypeBuilder::new("Holder")
        .attr("leaf", AttributeSchema::new())
        .observe("leaf.value", log_observer(&log, "leaf"))
        .build()
        .unwrap();

    let h = Object::new(&holder);
    let first = Object::new(&leaf);
    let second = Object::new(&leaf);
    h.set("leaf", first.clone()).unwrap();
    first.set("value", 1i64).unwrap();
    h.set("leaf", second.clone()).unwrap();
    first.set("value", 2i64).unwrap();
    second.set("value", 3i64).unwrap();
    assert_eq!(*log.lock(), vec!["leaf:create", "leaf:create"]);
}

#[test]
fn test_describe_ir() {
    let ty = TypeBuilder::new("Described")
        .attr(
            "port",
            AttributeSchema::new()
                .typed::<i64>()
                .with_default(8080i64)
                .with_metadata("label", serde_json::json!("Port")),
        )
        .attr("changed", AttributeSchema::event())
        .build()
        .unwrap();
    let ir = ty.describe();
    assert_eq!(ir["slots"], 2);
    assert_eq!(ir["attributes"][0]["modes"]["default"], "static");
    assert_eq!(ir["attributes"][0]["metadata"]["label"], "Port");
    assert_eq!(ir["attributes"][1]["modes"]["getstate"], "exclude");
}
