//! Run a scenario script against a manifest and report where every actor ends up.

use super::load_registry;
use crate::config::{CliConfig, OutputFormat};
use crate::demo::{TagStore, TAGS_TOPIC};
use crate::script::{Script, Step};
use anyhow::{Context, Result};
use audience_core::prelude::*;
use audience_core::{AudienceError, AudienceFilter, MetricsSnapshot};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

#[derive(Serialize)]
struct Report {
    actors: Vec<ActorReport>,
    metrics: MetricsSnapshot,
}

#[derive(Serialize)]
struct ActorReport {
    name: String,
    online: bool,
    tags: Vec<String>,
    groups: Vec<GroupState>,
    owners: Vec<Ownership>,
}

#[derive(Serialize)]
struct GroupState {
    group: GroupId,
    state: DisplayState,
    label: &'static str,
}

#[derive(Serialize)]
struct Ownership {
    kind: DisplayKind,
    owner: Option<GroupId>,
}

impl Report {
    fn collect(registry: &AudienceRegistry, store: &TagStore, script: &Script) -> Self {
        let online = registry.online();
        let groups = registry.groups();
        let kinds = registry.display_kinds();

        let actors = script
            .actors()
            .into_iter()
            .map(|name| {
                let actor = ActorId::from_name(&name);
                let groups = groups
                    .iter()
                    .filter_map(|group| {
                        let state = registry.display_state(&group.id, actor)?;
                        Some(GroupState {
                            group: group.id.clone(),
                            state,
                            label: state.label(),
                        })
                    })
                    .collect();
                let owners = kinds
                    .iter()
                    .map(|kind| Ownership {
                        kind: kind.clone(),
                        owner: registry.owner_of(actor, kind).map(|owner| owner.id),
                    })
                    .collect();
                ActorReport {
                    online: online.contains(&actor),
                    tags: store.tags_of(actor),
                    name,
                    groups,
                    owners,
                }
            })
            .collect();

        Report {
            actors,
            metrics: registry.metrics().snapshot(),
        }
    }

    fn print_text(&self) {
        for actor in &self.actors {
            let status = if actor.online { "online" } else { "offline" };
            if actor.tags.is_empty() {
                println!("{} ({})", actor.name, status);
            } else {
                println!("{} ({}) tags: {}", actor.name, status, actor.tags.join(", "));
            }
            for group in &actor.groups {
                println!("  {:<24} {}", group.group.as_str(), group.label);
            }
            for ownership in &actor.owners {
                let owner = ownership
                    .owner
                    .as_ref()
                    .map(GroupId::as_str)
                    .unwrap_or("none");
                println!("  {} -> {}", ownership.kind, owner);
            }
        }
        println!("Metrics:");
        print!("{}", self.metrics);
    }
}

/// Run a scenario with a background ticker
pub async fn simulate(config: &CliConfig, script_path: &Path) -> Result<()> {
    let script = Script::from_file(script_path)
        .with_context(|| format!("Failed to load script {}", script_path.display()))?;

    let store = Arc::new(TagStore::new());
    for (name, tags) in &config.demo.initial_tags {
        for tag in tags {
            store.tag(ActorId::from_name(name), tag);
        }
    }
    let registry = Arc::new(load_registry(config, &store)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ticker = spawn_ticker(registry.clone(), config.tick_interval_ms, shutdown_rx);

    info!(steps = script.steps.len(), "running scenario");
    let outcome = script
        .steps
        .iter()
        .enumerate()
        .try_for_each(|(index, step)| {
            run_step(&registry, &store, step).with_context(|| format!("Step {} failed", index + 1))
        });

    let _ = shutdown_tx.send(true);
    if let Some(ticker) = ticker {
        ticker.await.context("Ticker task failed")?;
    }
    outcome?;

    let report = Report::collect(&registry, &store, &script);
    match config.output {
        OutputFormat::Json => {
            let payload = serde_json::to_string_pretty(&report)?;
            println!("{}", payload);
        }
        OutputFormat::Text => report.print_text(),
    }

    registry.shutdown();
    Ok(())
}

fn run_step(registry: &AudienceRegistry, store: &TagStore, step: &Step) -> Result<()> {
    debug!(?step, "step");
    match step {
        Step::Connect(name) => {
            if !registry.on_actor_connect(ActorId::from_name(name)) {
                debug!(actor = %name, "already connected");
            }
        }
        Step::Disconnect(name) => {
            if !registry.on_actor_disconnect(ActorId::from_name(name)) {
                debug!(actor = %name, "not connected");
            }
        }
        Step::Tag { actor, tag } => {
            let id = ActorId::from_name(actor);
            if store.tag(id, tag) {
                announce(registry, id);
            }
        }
        Step::Untag { actor, tag } => {
            let id = ActorId::from_name(actor);
            if store.untag(id, tag) {
                announce(registry, id);
            }
        }
        Step::Invert { group, inverted } => {
            let invertible = registry.lookup(group).is_some_and(|audience| {
                audience
                    .as_filter()
                    .is_some_and(AudienceFilter::is_invertible)
            });
            if !invertible {
                return Err(AudienceError::UnknownGroup(group.clone()).into());
            }
            registry.set_inverted(group, *inverted);
        }
        Step::Tick(count) => {
            for _ in 0..*count {
                registry.tick();
            }
        }
        Step::Refresh(name) => {
            registry.refresh(ActorId::from_name(name));
        }
    }
    Ok(())
}

fn announce(registry: &AudienceRegistry, actor: ActorId) {
    registry.publish(&AudienceEvent::Changed {
        actor,
        topic: TAGS_TOPIC.to_string(),
    });
}

/// Tick the registry at a fixed cadence until shutdown; disabled at 0 ms
fn spawn_ticker(
    registry: Arc<AudienceRegistry>,
    interval_ms: u64,
    mut shutdown: watch::Receiver<bool>,
) -> Option<JoinHandle<()>> {
    if interval_ms == 0 {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the first tick completes immediately
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => registry.tick(),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("ticker stopped");
    }))
}
