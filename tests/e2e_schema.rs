//! End-to-end tests for the property schema layer: typed cells, live-link
//! composition (wrap), snapshot composition (inherit), change notification
//! and cycle rejection.
//!
//! These tests drive schemas directly through `Scene`, without any nodes.

use std::cell::RefCell;
use std::rc::Rc;

use pretty_assertions::assert_eq;
use scenegraph_rs::{
    ElementRegistry, Error, PropType, Scene, SchemaId, Value,
};

fn scene() -> Scene {
    Scene::new(ElementRegistry::new())
}

// ============================================================================
// 1. Live link: a wrapped schema mirrors ancestor changes
// ============================================================================

#[test]
fn test_wrap_mirrors_chain_changes() {
    let mut sc = scene();
    let grand = sc.create_schema("grand");
    let mid = sc.create_schema("mid");
    let leaf = sc.create_schema("leaf");

    sc.set(grand, "color", "red").unwrap();
    sc.wrap(mid, Some(grand)).unwrap();
    sc.wrap(leaf, Some(mid)).unwrap();

    // Resolution climbs two links.
    assert_eq!(
        sc.get(leaf, "color", PropType::Str).unwrap(),
        Value::Str("red".into())
    );

    // Changes at the top cascade all the way down.
    sc.set(grand, "color", "blue").unwrap();
    assert_eq!(
        sc.get(leaf, "color", PropType::Str).unwrap(),
        Value::Str("blue".into())
    );
    assert_eq!(
        sc.get(mid, "color", PropType::Str).unwrap(),
        Value::Str("blue".into())
    );
}

// ============================================================================
// 2. Local override severs the link permanently
// ============================================================================

#[test]
fn test_local_write_severs_link() {
    let mut sc = scene();
    let parent = sc.create_schema("parent");
    let child = sc.create_schema("child");

    sc.set(parent, "size", 10i64).unwrap();
    sc.wrap(child, Some(parent)).unwrap();
    assert_eq!(sc.get(child, "size", PropType::Int).unwrap(), Value::Int(10));

    sc.set(child, "size", 20i64).unwrap();
    sc.set(parent, "size", 99i64).unwrap();

    assert_eq!(sc.get(child, "size", PropType::Int).unwrap(), Value::Int(20));
    assert!(sc.has_own(child, "size"));
}

// ============================================================================
// 3. Mid-chain override shields the schemas below it
// ============================================================================

#[test]
fn test_mid_chain_override_shields_descendants() {
    let mut sc = scene();
    let grand = sc.create_schema("grand");
    let mid = sc.create_schema("mid");
    let leaf = sc.create_schema("leaf");

    sc.set(grand, "color", "red").unwrap();
    sc.wrap(mid, Some(grand)).unwrap();
    sc.wrap(leaf, Some(mid)).unwrap();
    sc.get(leaf, "color", PropType::Str).unwrap();

    // mid takes local authority; leaf now tracks mid, not grand.
    sc.set(mid, "color", "green").unwrap();
    assert_eq!(
        sc.get(leaf, "color", PropType::Str).unwrap(),
        Value::Str("green".into())
    );

    sc.set(grand, "color", "blue").unwrap();
    assert_eq!(
        sc.get(leaf, "color", PropType::Str).unwrap(),
        Value::Str("green".into())
    );
}

// ============================================================================
// 4. Inherit is a snapshot, local cells win
// ============================================================================

#[test]
fn test_inherit_snapshot_does_not_track() {
    let mut sc = scene();
    let template = sc.create_schema("template");
    let instance = sc.create_schema("instance");

    sc.set(template, "speed", 5i64).unwrap();
    sc.set(template, "name", "drone").unwrap();
    sc.set(instance, "name", "mine").unwrap();

    sc.inherit(instance, template).unwrap();

    assert_eq!(sc.get(instance, "speed", PropType::Int).unwrap(), Value::Int(5));
    // The pre-existing local cell is untouched.
    assert_eq!(
        sc.get(instance, "name", PropType::Str).unwrap(),
        Value::Str("mine".into())
    );

    sc.set(template, "speed", 50i64).unwrap();
    assert_eq!(sc.get(instance, "speed", PropType::Int).unwrap(), Value::Int(5));
}

// ============================================================================
// 5. Cycle rejection leaves the graph untouched
// ============================================================================

#[test]
fn test_wrap_rejects_cycles() {
    let mut sc = scene();
    let a = sc.create_schema("a");
    let b = sc.create_schema("b");

    sc.wrap(b, Some(a)).unwrap();

    let err = sc.wrap(a, Some(b)).unwrap_err();
    assert!(matches!(err, Error::CyclicSchema { .. }));
    assert_eq!(sc.schema(a).unwrap().parent(), None);
    assert_eq!(sc.schema(b).unwrap().parent(), Some(a));
}

// ============================================================================
// 6. Unwrap freezes values, later chain changes are invisible
// ============================================================================

#[test]
fn test_unwrap_freezes_cells() {
    let mut sc = scene();
    let parent = sc.create_schema("parent");
    let child = sc.create_schema("child");

    sc.set(parent, "color", "red").unwrap();
    sc.wrap(child, Some(parent)).unwrap();
    sc.get(child, "color", PropType::Str).unwrap();

    sc.wrap(child, None).unwrap();
    sc.set(parent, "color", "blue").unwrap();

    assert_eq!(
        sc.get(child, "color", PropType::Str).unwrap(),
        Value::Str("red".into())
    );
    assert!(sc.has_own(child, "color"));
}

// ============================================================================
// 7. Re-wrap re-links not-yet-overridden cells and resyncs silently
// ============================================================================

#[test]
fn test_rewrap_relinks_and_resyncs() {
    let mut sc = scene();
    let old_parent = sc.create_schema("old");
    let new_parent = sc.create_schema("new");
    let child = sc.create_schema("child");

    sc.set(old_parent, "color", "red").unwrap();
    sc.set(new_parent, "color", "blue").unwrap();
    sc.wrap(child, Some(old_parent)).unwrap();
    sc.get(child, "color", PropType::Str).unwrap();

    // No notification must fire during the resync.
    let fired = Rc::new(RefCell::new(0usize));
    let counter = fired.clone();
    sc.subscribe_property(
        child,
        "color",
        Rc::new(move |_, _| *counter.borrow_mut() += 1),
    )
    .unwrap();

    sc.wrap(child, Some(new_parent)).unwrap();
    assert_eq!(*fired.borrow(), 0);
    assert_eq!(
        sc.get(child, "color", PropType::Str).unwrap(),
        Value::Str("blue".into())
    );

    // And the new link is live.
    sc.set(new_parent, "color", "gold").unwrap();
    assert_eq!(*fired.borrow(), 1);
    assert_eq!(
        sc.get(child, "color", PropType::Str).unwrap(),
        Value::Str("gold".into())
    );
}

// ============================================================================
// 8. Type mismatches degrade, never panic
// ============================================================================

#[test]
fn test_type_mismatch_degrades() {
    let mut sc = scene();
    let a = sc.create_schema("a");

    sc.set(a, "n", 7i64).unwrap();

    // Mismatched write: ignored.
    sc.set(a, "n", [1.0f32, 2.0, 3.0]).unwrap();
    assert_eq!(sc.get(a, "n", PropType::Int).unwrap(), Value::Int(7));

    // Mismatched read: zero of the requested type.
    assert_eq!(
        sc.get(a, "n", PropType::Vec3).unwrap(),
        Value::Vec3([0.0, 0.0, 0.0])
    );
}

// ============================================================================
// 9. Reading an undeclared prop with no chain creates a zero cell
// ============================================================================

#[test]
fn test_get_creates_zero_cell_without_chain() {
    let mut sc = scene();
    let a = sc.create_schema("a");

    assert_eq!(sc.get(a, "missing", PropType::Float).unwrap(), Value::Float(0.0));
    // The cell now exists as a local independent cell.
    assert!(sc.has_own(a, "missing"));
}

// ============================================================================
// 10. get_own seeds a local default instead of linking upward
// ============================================================================

#[test]
fn test_get_own_never_inherits() {
    let mut sc = scene();
    let parent = sc.create_schema("parent");
    let child = sc.create_schema("child");

    sc.set(parent, "mode", "shared").unwrap();
    sc.wrap(child, Some(parent)).unwrap();

    // has() sees the ancestor's own cell; has_own() does not.
    assert!(sc.has(child, "mode"));
    assert!(!sc.has_own(child, "mode"));

    let v = sc.get_own(child, "mode", "private").unwrap();
    assert_eq!(v, Value::Str("private".into()));
    assert!(sc.has_own(child, "mode"));

    // The parent's cell is unaffected.
    assert_eq!(
        sc.get(parent, "mode", PropType::Str).unwrap(),
        Value::Str("shared".into())
    );
}

// ============================================================================
// 11. Change notifications carry old and new values, in order
// ============================================================================

#[test]
fn test_notification_sequence() {
    let mut sc = scene();
    let parent = sc.create_schema("parent");
    let child = sc.create_schema("child");

    sc.set(parent, "n", 0i64).unwrap();
    sc.wrap(child, Some(parent)).unwrap();
    sc.get(child, "n", PropType::Int).unwrap();

    let log: Rc<RefCell<Vec<(SchemaId, i64, i64)>>> = Rc::new(RefCell::new(Vec::new()));
    for schema in [parent, child] {
        let sink = log.clone();
        sc.subscribe_property(
            schema,
            "n",
            Rc::new(move |_, change| {
                sink.borrow_mut().push((
                    change.schema,
                    change.old.as_int().unwrap(),
                    change.new.as_int().unwrap(),
                ));
            }),
        )
        .unwrap();
    }

    sc.set(parent, "n", 1i64).unwrap();
    sc.set(parent, "n", 1i64).unwrap(); // no change, no events

    assert_eq!(*log.borrow(), vec![(parent, 0, 1), (child, 0, 1)]);
}

// ============================================================================
// 12. Unsubscribe stops delivery
// ============================================================================

#[test]
fn test_unsubscribe_property() {
    let mut sc = scene();
    let a = sc.create_schema("a");
    sc.set(a, "n", 0i64).unwrap();

    let fired = Rc::new(RefCell::new(0usize));
    let counter = fired.clone();
    let sub = sc
        .subscribe_property(a, "n", Rc::new(move |_, _| *counter.borrow_mut() += 1))
        .unwrap();

    sc.set(a, "n", 1i64).unwrap();
    sc.unsubscribe_property(a, "n", sub);
    sc.set(a, "n", 2i64).unwrap();

    assert_eq!(*fired.borrow(), 1);
}

// ============================================================================
// 13. Dropping a schema freezes everything that mirrored it
// ============================================================================

#[test]
fn test_drop_schema_freezes_dependents() {
    let mut sc = scene();
    let parent = sc.create_schema("parent");
    let child = sc.create_schema("child");

    sc.set(parent, "color", "red").unwrap();
    sc.wrap(child, Some(parent)).unwrap();
    sc.get(child, "color", PropType::Str).unwrap();

    sc.drop_schema(parent);
    assert!(sc.schema(parent).is_none());
    assert_eq!(
        sc.get(child, "color", PropType::Str).unwrap(),
        Value::Str("red".into())
    );
    assert!(sc.has_own(child, "color"));
}

// ============================================================================
// 14. Dropping a schema fully unwraps its children
// ============================================================================

#[test]
fn test_drop_schema_clears_child_parent_link() {
    let mut sc = scene();
    let parent = sc.create_schema("parent");
    let child = sc.create_schema("child");

    sc.set(parent, "color", "red").unwrap();
    sc.wrap(child, Some(parent)).unwrap();
    // "color" never materialized on the child.

    sc.drop_schema(parent);
    assert_eq!(sc.schema(child).unwrap().parent(), None);
    assert!(!sc.has(child, "color"));

    // Lazy resolution now stays local instead of walking into the
    // missing schema.
    assert_eq!(
        sc.get(child, "color", PropType::Str).unwrap(),
        Value::Str(String::new())
    );
}
