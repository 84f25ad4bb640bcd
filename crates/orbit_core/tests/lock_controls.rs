use orbit_core::hierarchy::locks::{
    can_change_hierarchy, can_move, is_locked, is_locked_named, list_locked, set_lock,
    set_lock_named,
};
use orbit_core::{lock_statistics, set_lock_many, Entity, EntityType, HierarchyState, LockKind};

fn setup() -> HierarchyState {
    HierarchyState::new()
        .with(Entity::with_id("d1", EntityType::Domain))
        .with(Entity::with_id("p1", EntityType::Project))
        .with(Entity::with_id("t1", EntityType::Task))
        .with(Entity::with_id("t2", EntityType::Task))
}

#[test]
fn entities_without_lock_records_are_unlocked() {
    let state = setup();
    let task = state.get(EntityType::Task, "t1").unwrap();

    assert!(task.locks.is_none());
    assert!(!is_locked(task, LockKind::Move));
    assert!(can_move(task));
    assert!(can_change_hierarchy(task));
}

#[test]
fn named_locks_ignore_unknown_names() {
    let mut state = setup();
    let task = state.get_mut(EntityType::Task, "t1").unwrap();

    assert!(!set_lock_named(task, "teleport", true));
    assert!(task.locks.is_none());

    assert!(set_lock_named(task, "move", true));
    assert!(is_locked_named(task, "move"));
    assert!(!is_locked_named(task, "hierarchy"));
    assert!(!is_locked_named(task, "teleport"));
    assert!(!can_move(task));
    assert!(can_change_hierarchy(task));
}

#[test]
fn batch_lock_reports_each_id() {
    let mut state = setup();

    let report = set_lock_many(&mut state, ["p1", "t2", "missing", " "], LockKind::Hierarchy, true);

    assert_eq!(report.requested, 4);
    assert_eq!(report.succeeded, vec!["p1".to_string(), "t2".to_string()]);
    assert_eq!(report.failed.len(), 2);
    assert!(!report.success());
    assert!(is_locked(
        state.get(EntityType::Project, "p1").unwrap(),
        LockKind::Hierarchy
    ));

    let unlocked = set_lock_many(&mut state, ["p1"], LockKind::Hierarchy, false);
    assert!(unlocked.success());
    assert!(can_change_hierarchy(
        state.get(EntityType::Project, "p1").unwrap()
    ));
}

#[test]
fn statistics_and_listing_agree() {
    let mut state = setup();
    set_lock(state.get_mut(EntityType::Task, "t1").unwrap(), LockKind::Move, true);
    set_lock(state.get_mut(EntityType::Task, "t1").unwrap(), LockKind::Hierarchy, true);
    set_lock(state.get_mut(EntityType::Domain, "d1").unwrap(), LockKind::Move, true);

    let stats = lock_statistics(&state);

    assert_eq!(stats.total_entities, 4);
    assert_eq!(stats.move_locked, 2);
    assert_eq!(stats.hierarchy_locked, 1);
    assert_eq!(stats.any_locked, 2);
    assert_eq!(stats.by_type[&EntityType::Task].move_locked, 1);

    let move_locked: Vec<_> = list_locked(&state, Some(LockKind::Move))
        .into_iter()
        .map(|entity| entity.id.as_str())
        .collect();
    assert_eq!(move_locked, vec!["d1", "t1"]);
    assert_eq!(list_locked(&state, None).len(), 2);
}
