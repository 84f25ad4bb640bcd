use orbit_core::hierarchy::locks::{set_lock, LockKind};
use orbit_core::{Entity, EntityType, HierarchyEngine, HierarchyState, MigrationOptions};

fn legacy_state() -> HierarchyState {
    HierarchyState::new()
        .with(Entity::with_id("d1", EntityType::Domain))
        .with(Entity::with_id("p1", EntityType::Project).with_legacy_ancestors(None, Some("d1")))
        .with(
            Entity::with_id("t1", EntityType::Task).with_legacy_ancestors(Some("p1"), Some("d1")),
        )
        .with(Entity::with_id("t2", EntityType::Task).with_legacy_ancestors(None, Some("d1")))
        .with(
            Entity::with_id("n1", EntityType::Note).with_legacy_ancestors(Some("p1"), Some("d1")),
        )
        .with(Entity::with_id("i1", EntityType::Idea).with_legacy_ancestors(Some("p-gone"), None))
}

/// `p1` and `n1` already carry `parentId`; `t1` only has legacy pointers.
fn partially_linked_state() -> HierarchyState {
    HierarchyState::new()
        .with(Entity::with_id("d1", EntityType::Domain))
        .with(
            Entity::with_id("p1", EntityType::Project)
                .with_parent("d1")
                .with_legacy_ancestors(None, Some("d1")),
        )
        .with(
            Entity::with_id("t1", EntityType::Task).with_legacy_ancestors(Some("p1"), Some("d1")),
        )
        .with(
            Entity::with_id("n1", EntityType::Note)
                .with_parent("t1")
                .with_legacy_ancestors(Some("p1"), Some("d1")),
        )
}

#[test]
fn analysis_counts_potential_links_and_flags_dangling_pointers() {
    let engine = HierarchyEngine::default();
    let state = legacy_state();

    let analysis = engine.migrator().analyze_existing_data(&state);

    assert_eq!(analysis.total_objects, 6);
    assert_eq!(analysis.migrated_objects, 0);
    assert_eq!(analysis.existing_links, 0);
    assert_eq!(analysis.potential_links, 4);
    assert_eq!(analysis.by_type[&EntityType::Task].potential_links, 2);
    assert!(analysis.issues.iter().any(|issue| issue.contains("p-gone")));
    assert!(!analysis.recommendations.is_empty());
}

#[test]
fn preview_matches_the_real_migration() {
    let engine = HierarchyEngine::default();
    let mut state = legacy_state();

    let preview = engine.migrator().preview_migration(&state);
    assert_eq!(preview.objects_to_initialize.len(), 6);
    assert_eq!(preview.connections_to_restore.len(), 4);
    assert_eq!(preview.warnings.len(), 1);
    assert!(preview.estimated_time_ms > 0);

    let report = engine
        .migrator()
        .migrate(&mut state, MigrationOptions::default());
    assert_eq!(report.restored_connections, preview.connections_to_restore.len());
}

#[test]
fn migration_restores_links_and_is_idempotent() {
    let engine = HierarchyEngine::default();
    let mut state = legacy_state();

    let first = engine
        .migrator()
        .migrate(&mut state, MigrationOptions::default());

    assert!(first.success, "{:?}", first.errors);
    assert_eq!(first.processed_objects, 6);
    assert_eq!(first.restored_connections, 4);
    assert_eq!(first.validated_connections, 4);
    assert_eq!(first.warnings.len(), 1);
    assert_eq!(first.warnings[0].object_id.as_deref(), Some("i1"));

    let task = state.get(EntityType::Task, "t1").unwrap();
    assert_eq!(task.parent_id.as_deref(), Some("p1"));
    let loose_task = state.get(EntityType::Task, "t2").unwrap();
    assert_eq!(loose_task.parent_id.as_deref(), Some("d1"));
    assert!(state.iter().all(Entity::is_initialized));
    assert!(engine.validate_hierarchy(&state).is_empty());

    let snapshot = state.clone();
    let second = engine
        .migrator()
        .migrate(&mut state, MigrationOptions::default());

    assert!(second.success);
    assert_eq!(second.restored_connections, 0);
    let project = state.get(EntityType::Project, "p1").unwrap();
    let listed = &project.children.as_ref().unwrap()[&EntityType::Task];
    assert_eq!(listed, &vec!["t1".to_string()]);
    assert_eq!(state, snapshot);
}

#[test]
fn analysis_separates_existing_and_legacy_links() {
    let engine = HierarchyEngine::default();
    let state = partially_linked_state();

    let analysis = engine.migrator().analyze_existing_data(&state);
    assert_eq!(analysis.existing_links, 2);
    assert_eq!(analysis.potential_links, 1);
    assert!(analysis.issues.is_empty(), "{:?}", analysis.issues);

    let preview = engine.migrator().preview_migration(&state);
    assert_eq!(preview.objects_to_initialize.len(), 4);
    assert_eq!(preview.connections_to_restore.len(), 1);
    assert_eq!(preview.connections_to_restore[0].child_id, "t1");
}

#[test]
fn partially_linked_state_migrates_cleanly_twice() {
    let engine = HierarchyEngine::default();
    let mut state = partially_linked_state();

    let first = engine
        .migrator()
        .migrate(&mut state, MigrationOptions::default());

    assert!(first.success, "{:?}", first.errors);
    assert_eq!(first.processed_objects, 4);
    assert_eq!(first.restored_connections, 1);
    assert_eq!(first.validated_connections, 3);
    assert!(first.warnings.is_empty(), "{:?}", first.warnings);

    let domain = state.get(EntityType::Domain, "d1").unwrap();
    assert_eq!(
        domain.children.as_ref().unwrap()[&EntityType::Project],
        vec!["p1".to_string()]
    );
    let project = state.get(EntityType::Project, "p1").unwrap();
    assert_eq!(
        project.children.as_ref().unwrap()[&EntityType::Task],
        vec!["t1".to_string()]
    );
    let task = state.get(EntityType::Task, "t1").unwrap();
    assert_eq!(task.parent_id.as_deref(), Some("p1"));
    assert_eq!(
        task.children.as_ref().unwrap()[&EntityType::Note],
        vec!["n1".to_string()]
    );
    assert!(engine.validate_hierarchy(&state).is_empty());

    let snapshot = state.clone();
    let second = engine
        .migrator()
        .migrate(&mut state, MigrationOptions::default());

    assert!(second.success, "{:?}", second.errors);
    assert_eq!(second.restored_connections, 0);
    assert_eq!(second.validated_connections, 3);
    assert_eq!(state, snapshot);
}

#[test]
fn stale_children_map_is_still_reported_after_migration() {
    let engine = HierarchyEngine::default();
    let mut state = HierarchyState::new().with(Entity::with_id("d1", EntityType::Domain));
    engine.initialize(&mut state);
    state.insert(
        Entity::with_id("p1", EntityType::Project)
            .with_parent("d1")
            .with_legacy_ancestors(None, Some("d1")),
    );

    let report = engine
        .migrator()
        .migrate(&mut state, MigrationOptions::default());

    assert!(!report.success);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].code, "orphaned_object");
    assert_eq!(report.errors[0].object_id.as_deref(), Some("p1"));

    let errors = engine.validate_hierarchy(&state);
    let fixed = engine.fix_validation_errors(&errors, &mut state);
    assert_eq!(fixed.fixed, 1);

    let again = engine
        .migrator()
        .migrate(&mut state, MigrationOptions::default());
    assert!(again.success, "{:?}", again.errors);
}

#[test]
fn dry_run_reports_without_touching_state() {
    let engine = HierarchyEngine::default();
    let mut state = legacy_state();
    let before = state.clone();

    let report = engine.migrator().migrate(
        &mut state,
        MigrationOptions {
            dry_run: true,
            ..MigrationOptions::default()
        },
    );

    assert!(report.dry_run);
    assert_eq!(report.restored_connections, 4);
    assert_eq!(state, before);
}

#[test]
fn locked_entities_fail_individually() {
    let engine = HierarchyEngine::default();
    let mut state = legacy_state();
    set_lock(
        state.get_mut(EntityType::Task, "t1").unwrap(),
        LockKind::Hierarchy,
        true,
    );

    let report = engine
        .migrator()
        .migrate(&mut state, MigrationOptions::default());

    assert!(!report.success);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].code, "locked");
    assert_eq!(report.restored_connections, 3);
    assert!(state.get(EntityType::Task, "t1").unwrap().parent_id.is_none());
}

#[test]
fn skipping_restore_and_validation_only_initializes() {
    let engine = HierarchyEngine::default();
    let mut state = legacy_state();

    let report = engine.migrator().migrate(
        &mut state,
        MigrationOptions {
            restore_connections: false,
            validate_connections: false,
            ..MigrationOptions::default()
        },
    );

    assert!(report.success);
    assert_eq!(report.restored_connections, 0);
    assert_eq!(report.validated_connections, 0);
    assert!(state.iter().all(|entity| entity.parent_id.is_none()));
    assert!(state.iter().all(Entity::is_initialized));
}

#[test]
fn rollback_clears_relational_fields_and_keeps_legacy_pointers() {
    let engine = HierarchyEngine::default();
    let mut state = legacy_state();
    state.insert(Entity::with_id("c1", EntityType::Checklist));
    engine
        .migrator()
        .migrate(&mut state, MigrationOptions::default());
    // Never migrated: added after the run.
    state.insert(Entity::with_id("c2", EntityType::Checklist));

    let report = engine.migrator().rollback_migration(&mut state);

    assert!(report.success);
    assert_eq!(report.cleared_objects, 7);
    assert_eq!(report.untouched_objects, 1);
    assert!(state.iter().all(|entity| !entity.has_relational_fields()));
    let task = state.get(EntityType::Task, "t1").unwrap();
    assert_eq!(task.project_id.as_deref(), Some("p1"));
    assert_eq!(task.domain_id.as_deref(), Some("d1"));

    let again = engine
        .migrator()
        .migrate(&mut state, MigrationOptions::default());
    assert_eq!(again.restored_connections, 4);
}
