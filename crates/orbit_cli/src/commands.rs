//! Command handlers over a JSON state file.

use crate::{Command, StateArgs};
use anyhow::{anyhow, bail, Context};
use log::{error, info};
use orbit_core::{
    lock_statistics, set_lock_many, AttachRequest, DetachRequest, EntityType, HierarchyConfig,
    HierarchyEngine, HierarchyState, MigrationOptions, MoveRequest, MutationError,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;

/// `type:id` reference accepted on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    pub kind: EntityType,
    pub id: String,
}

impl FromStr for EntityRef {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (kind, id) = value
            .split_once(':')
            .ok_or_else(|| format!("expected `type:id`, got `{value}`"))?;
        let kind = EntityType::parse(kind).ok_or_else(|| format!("unknown entity type `{kind}`"))?;
        let id = id.trim();
        if id.is_empty() {
            return Err(format!("missing id in `{value}`"));
        }
        Ok(Self {
            kind,
            id: id.to_string(),
        })
    }
}

/// Rendered result and whether the operation succeeded.
#[derive(Debug)]
pub struct Outcome {
    pub ok: bool,
    pub body: Value,
}

impl Outcome {
    fn ok(body: impl Serialize) -> anyhow::Result<Self> {
        Ok(Self {
            ok: true,
            body: serde_json::to_value(body).context("failed to serialize result")?,
        })
    }

    fn from_flag(ok: bool, body: impl Serialize) -> anyhow::Result<Self> {
        Ok(Self {
            ok,
            body: serde_json::to_value(body).context("failed to serialize result")?,
        })
    }

    fn rejected(err: &MutationError) -> Self {
        Self {
            ok: false,
            body: json!({ "ok": false, "error": err.code(), "message": err.to_string() }),
        }
    }
}

/// Builds the engine from an optional JSON config file.
pub fn load_engine(config: Option<&Path>) -> anyhow::Result<HierarchyEngine> {
    let config = match config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str::<HierarchyConfig>(&raw)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => HierarchyConfig::default(),
    };
    HierarchyEngine::try_new(config).map_err(|err| anyhow!("invalid config: {err}"))
}

pub fn load_state(path: &Path) -> anyhow::Result<HierarchyState> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read state {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid state file {}", path.display()))
}

/// Replaces the state file via a sibling temp file and rename.
pub fn save_state(path: &Path, state: &HierarchyState) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(state).context("failed to serialize state")?;
    let Some(file_name) = path.file_name() else {
        bail!("state path {} has no file name", path.display());
    };
    let mut staging_name = file_name.to_os_string();
    staging_name.push(".tmp");
    let staging = path.with_file_name(staging_name);
    fs::write(&staging, rendered)
        .with_context(|| format!("failed to write {}", staging.display()))?;
    fs::rename(&staging, path).with_context(|| format!("failed to replace {}", path.display()))
}

/// Runs one command and logs its outcome with timing.
pub fn run(engine: &HierarchyEngine, command: Command) -> anyhow::Result<Outcome> {
    let name = command.name();
    let started_at = Instant::now();
    info!("event=cli_command module=cli status=start command={name}");

    let result = dispatch(engine, command);
    match &result {
        Ok(outcome) => info!(
            "event=cli_command module=cli status={} command={name} duration_ms={}",
            if outcome.ok { "ok" } else { "rejected" },
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=cli_command module=cli status=error command={name} duration_ms={} error={err:#}",
            started_at.elapsed().as_millis()
        ),
    }
    result
}

fn dispatch(engine: &HierarchyEngine, command: Command) -> anyhow::Result<Outcome> {
    match command {
        Command::Analyze { state } => {
            let state = load_state(&state)?;
            Outcome::ok(engine.migrator().analyze_existing_data(&state))
        }
        Command::Preview { state } => {
            let state = load_state(&state)?;
            Outcome::ok(engine.migrator().preview_migration(&state))
        }
        Command::Validate { state } => {
            let state = load_state(&state)?;
            let errors = engine.validate_hierarchy(&state);
            Outcome::from_flag(errors.is_empty(), json!({ "valid": errors.is_empty(), "errors": errors }))
        }
        Command::Fix(target) => mutate(&target, |state| {
            let errors = engine.validate_hierarchy(state);
            let report = engine.fix_validation_errors(&errors, state);
            Outcome::from_flag(report.failed == 0, report)
        }),
        Command::Migrate {
            target,
            dry_run,
            clear_existing,
            no_restore,
            no_validate,
        } => {
            let options = MigrationOptions {
                clear_existing,
                restore_connections: !no_restore,
                validate_connections: !no_validate,
                dry_run,
            };
            mutate(&target, |state| {
                let report = engine.migrator().migrate(state, options);
                Outcome::from_flag(report.success, report)
            })
        }
        Command::Rollback(target) => mutate(&target, |state| {
            let report = engine.migrator().rollback_migration(state);
            Outcome::from_flag(report.success, report)
        }),
        Command::Attach {
            target,
            parent,
            child,
        } => mutate(&target, |state| {
            let request = AttachRequest::new(parent.kind, parent.id, child.kind, child.id);
            match engine.attach(&request, state) {
                Ok(outcome) => Outcome::ok(json!({ "ok": true, "result": outcome })),
                Err(err) => Ok(Outcome::rejected(&err)),
            }
        }),
        Command::Detach { target, child } => mutate(&target, |state| {
            let request = DetachRequest::new(child.kind, child.id);
            match engine.detach(&request, state) {
                Ok(outcome) => Outcome::ok(json!({ "ok": true, "result": outcome })),
                Err(err) => Ok(Outcome::rejected(&err)),
            }
        }),
        Command::Move { target, to, child } => mutate(&target, |state| {
            let request = MoveRequest::new(to.kind, to.id, child.kind, child.id);
            match engine.move_to(&request, state) {
                Ok(outcome) => Outcome::ok(json!({ "ok": true, "result": outcome })),
                Err(err) => Ok(Outcome::rejected(&err)),
            }
        }),
        Command::Lock {
            target,
            kind,
            unlock,
            ids,
        } => mutate(&target, |state| {
            let report = set_lock_many(state, &ids, kind, !unlock);
            Outcome::from_flag(report.success(), report)
        }),
        Command::LockStats { state } => {
            let state = load_state(&state)?;
            Outcome::ok(lock_statistics(&state))
        }
    }
}

/// Loads the state, applies `op`, and saves only on success with `--write`.
fn mutate(
    target: &StateArgs,
    op: impl FnOnce(&mut HierarchyState) -> anyhow::Result<Outcome>,
) -> anyhow::Result<Outcome> {
    let mut state = load_state(&target.state)?;
    let outcome = op(&mut state)?;
    if target.write && outcome.ok {
        save_state(&target.state, &state)?;
    }
    Ok(outcome)
}
