//! Audience registry
//!
//! The registry is the concrete [`AudienceManager`]: it owns every live
//! display, the per-kind ownership tables, the per-actor locks, the event bus
//! and the metrics. Hosts drive it through connect/disconnect, refresh,
//! event publication and ticks.
//!
//! Registries are built from a [`Manifest`] by [`RegistryBuilder`], which
//! validates the group graph and resolves policy names through a
//! [`PolicyCatalog`].

use crate::display::{Audience, AudienceDisplay, DisplayHooks, PassThroughHooks};
use crate::error::{AudienceError, Result};
use crate::events::EventBus;
use crate::filter::{AudienceFilter, FilterPolicy, PassThroughPolicy};
use crate::locks::{ActorLock, ActorLocks};
use crate::manager::AudienceManager;
use crate::membership::MembershipSet;
use crate::metrics::AudienceMetrics;
use crate::single::{NoopSessions, OwnershipTable, SessionFactory, SingleFilter};
use audience_types::{
    ActorId, AudienceEvent, DisplayKind, DisplayState, GroupDefinition, GroupId, GroupKind,
    GroupRef, Manifest,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Registry behavior switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Reject manifests whose filters name unknown children
    pub strict_children: bool,

    /// Drop an actor's lock entry when it disconnects
    pub prune_actor_locks: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            strict_children: true,
            prune_actor_locks: true,
        }
    }
}

/// Named policy implementations referenced from a manifest
#[derive(Clone, Default)]
pub struct PolicyCatalog {
    filters: HashMap<String, Arc<dyn FilterPolicy>>,
    hooks: HashMap<String, Arc<dyn DisplayHooks>>,
    sessions: HashMap<DisplayKind, Arc<dyn SessionFactory>>,
}

impl PolicyCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, name: impl Into<String>, policy: Arc<dyn FilterPolicy>) -> Self {
        self.filters.insert(name.into(), policy);
        self
    }

    pub fn with_hooks(mut self, name: impl Into<String>, hooks: Arc<dyn DisplayHooks>) -> Self {
        self.hooks.insert(name.into(), hooks);
        self
    }

    /// Session factory for every single filter of `kind`
    pub fn with_sessions(
        mut self,
        kind: impl Into<DisplayKind>,
        factory: Arc<dyn SessionFactory>,
    ) -> Self {
        self.sessions.insert(kind.into(), factory);
        self
    }

    pub fn filter(&self, name: &str) -> Option<Arc<dyn FilterPolicy>> {
        self.filters.get(name).cloned()
    }

    pub fn hooks(&self, name: &str) -> Option<Arc<dyn DisplayHooks>> {
        self.hooks.get(name).cloned()
    }

    pub fn sessions(&self, kind: &DisplayKind) -> Option<Arc<dyn SessionFactory>> {
        self.sessions.get(kind).cloned()
    }
}

impl fmt::Debug for PolicyCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut filters: Vec<_> = self.filters.keys().collect();
        filters.sort();
        let mut hooks: Vec<_> = self.hooks.keys().collect();
        hooks.sort();
        let mut sessions: Vec<_> = self.sessions.keys().collect();
        sessions.sort();
        f.debug_struct("PolicyCatalog")
            .field("filters", &filters)
            .field("hooks", &hooks)
            .field("sessions", &sessions)
            .finish()
    }
}

/// Builds an [`AudienceRegistry`] from group definitions
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    manifest: Manifest,
    catalog: PolicyCatalog,
    config: RegistryConfig,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = manifest;
        self
    }

    /// Append one group definition
    pub fn group(mut self, definition: GroupDefinition) -> Self {
        self.manifest.groups.push(definition);
        self
    }

    pub fn catalog(mut self, catalog: PolicyCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the manifest and instantiate every group
    pub fn build(self) -> Result<AudienceRegistry> {
        let RegistryBuilder {
            manifest,
            catalog,
            config,
        } = self;
        validate(&manifest, config.strict_children)?;

        let registry = AudienceRegistry::empty(config);
        let mut order = Vec::with_capacity(manifest.groups.len());
        for definition in &manifest.groups {
            let audience = instantiate(&registry, &catalog, definition)?;
            registry.audiences.insert(definition.id.clone(), audience);
            order.push(definition.id.clone());
        }

        let children: HashSet<&GroupId> = manifest.child_ids().into_iter().collect();
        let roots: Vec<GroupId> = manifest
            .groups
            .iter()
            .filter(|group| !group.child_only && !children.contains(&group.id))
            .map(|group| group.id.clone())
            .collect();

        info!(
            groups = order.len(),
            roots = roots.len(),
            kinds = registry.tables.len(),
            "audience registry built"
        );
        *registry.order.write() = order;
        *registry.roots.write() = roots;
        Ok(registry)
    }
}

fn validate(manifest: &Manifest, strict_children: bool) -> Result<()> {
    let mut seen = HashSet::new();
    for group in &manifest.groups {
        if !seen.insert(&group.id) {
            return Err(AudienceError::DuplicateGroup(group.id.clone()));
        }
    }

    for group in &manifest.groups {
        if let GroupKind::Single { inverted: true, .. } = group.kind {
            return Err(AudienceError::InvertedSingle(group.id.clone()));
        }
        for child in group.children() {
            if seen.contains(child) {
                continue;
            }
            if strict_children {
                return Err(AudienceError::UnknownChild {
                    parent: group.id.clone(),
                    child: child.clone(),
                });
            }
            warn!(parent = %group.id, child = %child, "ignoring unknown child");
        }
    }

    match find_cycle(manifest) {
        Some(group) => Err(AudienceError::Cycle(group)),
        None => Ok(()),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// First group found on a child cycle, if any
fn find_cycle(manifest: &Manifest) -> Option<GroupId> {
    fn visit<'a>(
        id: &'a GroupId,
        graph: &HashMap<&'a GroupId, &'a [GroupId]>,
        marks: &mut HashMap<&'a GroupId, Mark>,
    ) -> Option<GroupId> {
        match marks.get(id) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => return Some(id.clone()),
            None => {}
        }
        marks.insert(id, Mark::Visiting);
        for child in graph.get(id).copied().unwrap_or_default() {
            if let Some(found) = visit(child, graph, marks) {
                return Some(found);
            }
        }
        marks.insert(id, Mark::Done);
        None
    }

    let graph: HashMap<&GroupId, &[GroupId]> = manifest
        .groups
        .iter()
        .map(|group| (&group.id, group.children()))
        .collect();
    let mut marks = HashMap::new();
    manifest
        .groups
        .iter()
        .find_map(|group| visit(&group.id, &graph, &mut marks))
}

fn instantiate(
    registry: &AudienceRegistry,
    catalog: &PolicyCatalog,
    definition: &GroupDefinition,
) -> Result<Arc<dyn Audience>> {
    let unknown = |policy: &str| AudienceError::UnknownPolicy {
        group: definition.id.clone(),
        policy: policy.to_string(),
    };
    let group = definition.group_ref();

    let audience: Arc<dyn Audience> = match &definition.kind {
        GroupKind::Display { hooks } => {
            let hooks: Arc<dyn DisplayHooks> = match hooks {
                Some(name) => catalog.hooks(name).ok_or_else(|| unknown(name))?,
                None => Arc::new(PassThroughHooks),
            };
            Arc::new(AudienceDisplay::new(group, hooks))
        }
        GroupKind::Filter {
            policy,
            inverted,
            children,
        } => {
            let policy: Arc<dyn FilterPolicy> = match policy {
                Some(name) => catalog.filter(name).ok_or_else(|| unknown(name))?,
                None => Arc::new(PassThroughPolicy),
            };
            Arc::new(AudienceFilter::new(group, policy, children.clone(), *inverted))
        }
        GroupKind::Single { display, children, .. } => {
            let table = registry.table_for(display, catalog);
            Arc::new(SingleFilter::new(group, table, children.clone()))
        }
    };
    Ok(audience)
}

/// Concrete audience manager
pub struct AudienceRegistry {
    audiences: DashMap<GroupId, Arc<dyn Audience>>,
    /// Declaration order
    order: RwLock<Vec<GroupId>>,
    roots: RwLock<Vec<GroupId>>,
    tables: DashMap<DisplayKind, Arc<OwnershipTable>>,
    locks: ActorLocks,
    online: MembershipSet,
    events: EventBus,
    metrics: AudienceMetrics,
    config: RegistryConfig,
    closed: AtomicBool,
}

impl AudienceRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn from_manifest(manifest: &Manifest, catalog: PolicyCatalog) -> Result<Self> {
        RegistryBuilder::new()
            .manifest(manifest.clone())
            .catalog(catalog)
            .build()
    }

    fn empty(config: RegistryConfig) -> Self {
        Self {
            audiences: DashMap::new(),
            order: RwLock::new(Vec::new()),
            roots: RwLock::new(Vec::new()),
            tables: DashMap::new(),
            locks: ActorLocks::new(),
            online: MembershipSet::new(),
            events: EventBus::new(),
            metrics: AudienceMetrics::new(),
            config,
            closed: AtomicBool::new(false),
        }
    }

    fn table_for(&self, kind: &DisplayKind, catalog: &PolicyCatalog) -> Arc<OwnershipTable> {
        self.tables
            .entry(kind.clone())
            .or_insert_with(|| {
                let factory = catalog
                    .sessions(kind)
                    .unwrap_or_else(|| Arc::new(NoopSessions));
                Arc::new(OwnershipTable::new(kind.clone(), factory))
            })
            .value()
            .clone()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Connect an actor and offer it to every root group.
    ///
    /// Returns false if the actor was already online or the registry is shut down.
    pub fn on_actor_connect(&self, actor: ActorId) -> bool {
        if self.is_closed() {
            return false;
        }
        {
            let lock = self.actor_lock(actor);
            let _guard = lock.lock();

            if !self.online.insert(actor).inserted {
                return false;
            }
            debug!(actor = %actor, "actor connected");
            for root in self.live_roots() {
                root.add_actor(self, actor);
            }
        }
        self.publish(&AudienceEvent::Connected { actor });
        true
    }

    /// Disconnect an actor and remove it from every group.
    ///
    /// Returns false if the actor was not online.
    /// Returns false if the actor was not online. The `Disconnected` event
    /// is published under the actor's lock, once per online session.
    pub fn on_actor_disconnect(&self, actor: ActorId) -> bool {
        let removed = {
            let lock = self.actor_lock(actor);
            let _guard = lock.lock();

            if self.online.contains(actor) {
                self.publish(&AudienceEvent::Disconnected { actor });
                self.detach(actor)
            } else {
                false
            }
        };
        if self.config.prune_actor_locks {
            self.locks.prune(actor);
        }
        removed
    }

    /// Caller holds the actor's lock
    fn detach(&self, actor: ActorId) -> bool {
        if !self.online.remove(actor).removed {
            return false;
        }
        for root in self.live_roots().into_iter().rev() {
            root.remove_actor(self, actor);
        }
        for table in self.table_snapshot() {
            if table.evict(self, actor) {
                warn!(actor = %actor, kind = %table.kind(), "owner record outlived its groups");
            }
        }
        debug!(actor = %actor, "actor disconnected");
        true
    }

    /// Tick every active display
    pub fn tick(&self) {
        self.metrics.record_tick();
        for audience in self.live_groups() {
            if audience.is_active() {
                audience.tick(self);
            }
        }
    }

    /// Where an actor stands in a group; None if the group is not live
    pub fn display_state(&self, group: &GroupId, actor: ActorId) -> Option<DisplayState> {
        self.lookup(group).map(|audience| audience.display_state(actor))
    }

    pub fn contains(&self, group: &GroupId, actor: ActorId) -> bool {
        self.lookup(group)
            .is_some_and(|audience| audience.contains(actor))
    }

    /// Re-evaluate every filter for an actor, parents before children.
    ///
    /// Returns the number of filters whose outcome changed; always 0 for an
    /// actor that is not online.
    pub fn refresh(&self, actor: ActorId) -> usize {
        if !self.online.contains(actor) {
            return 0;
        }
        let changed = {
            let lock = self.actor_lock(actor);
            let _guard = lock.lock();

            trace!(actor = %actor, "refreshing actor");
            self.live(&self.refresh_order())
                .into_iter()
                .filter(|audience| {
                    audience
                        .as_filter()
                        .is_some_and(|filter| filter.refresh(self, actor))
                })
                .count()
        };
        self.prune_if_offline(actor);
        changed
    }

    /// Re-evaluate one filter for an actor. No-op for an offline actor.
    pub fn refresh_group(&self, group: &GroupId, actor: ActorId) -> bool {
        if !self.online.contains(actor) {
            return false;
        }
        let changed = self.lookup(group).is_some_and(|audience| {
            audience
                .as_filter()
                .is_some_and(|filter| filter.refresh(self, actor))
        });
        self.prune_if_offline(actor);
        changed
    }

    /// Drop a lock entry left behind when a disconnect raced a refresh
    fn prune_if_offline(&self, actor: ActorId) {
        if self.config.prune_actor_locks && !self.online.contains(actor) {
            self.locks.prune(actor);
        }
    }

    /// Deliver an event to every active display
    pub fn publish(&self, event: &AudienceEvent) {
        for group in self.events.subscribers() {
            if let Some(audience) = self.lookup(&group) {
                audience.handle_event(self, event);
            }
        }
    }

    /// Change a filter's inversion. Returns false if the group is not a
    /// live invertible filter or the flag already had this value.
    pub fn set_inverted(&self, group: &GroupId, inverted: bool) -> bool {
        self.lookup(group).is_some_and(|audience| {
            audience
                .as_filter()
                .is_some_and(|filter| filter.set_inverted(self, inverted))
        })
    }

    /// Group currently owning `kind` for an actor
    pub fn owner_of(&self, actor: ActorId, kind: &DisplayKind) -> Option<GroupRef> {
        self.ownership(kind).and_then(|table| table.owner_of(actor))
    }

    pub fn has_single_display(&self, actor: ActorId, kind: &DisplayKind) -> bool {
        self.ownership(kind)
            .is_some_and(|table| table.contains(actor))
    }

    /// Dispose a group and drop it from the registry.
    ///
    /// Parents keep naming it as a child; propagation to it becomes a no-op.
    pub fn unregister(&self, group: &GroupId) -> bool {
        let Some(audience) = self.lookup(group) else {
            return false;
        };
        audience.dispose(self);
        self.audiences.remove(group);
        self.order.write().retain(|id| id != group);
        self.roots.write().retain(|id| id != group);
        info!(group = %group, "group unregistered");
        true
    }

    /// Disconnect everyone, dispose every display and clear all tables.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for actor in self.online.snapshot() {
            let lock = self.actor_lock(actor);
            let _guard = lock.lock();
            self.detach(actor);
        }
        for audience in self.live_groups() {
            audience.dispose(self);
        }
        for table in self.table_snapshot() {
            table.clear(self);
        }

        let groups = self.audiences.len();
        self.audiences.clear();
        self.tables.clear();
        self.order.write().clear();
        self.roots.write().clear();
        self.events.clear();
        self.locks.clear();
        info!(groups, "audience registry shut down");
    }

    /// Connected actors in ascending order
    pub fn online(&self) -> Vec<ActorId> {
        self.online.snapshot()
    }

    /// Live groups in declaration order
    pub fn groups(&self) -> Vec<GroupRef> {
        self.live_groups()
            .iter()
            .map(|audience| audience.group().clone())
            .collect()
    }

    pub fn roots(&self) -> Vec<GroupId> {
        self.roots.read().clone()
    }

    /// Display kinds with an ownership table, sorted
    pub fn display_kinds(&self) -> Vec<DisplayKind> {
        let mut kinds: Vec<_> = self.tables.iter().map(|entry| entry.key().clone()).collect();
        kinds.sort();
        kinds
    }

    /// Indented view of the group graph with membership counts
    pub fn render_tree(&self) -> String {
        let mut lines = Vec::new();
        let mut reached = HashSet::new();
        for root in &self.roots() {
            self.render_node(root, 0, &mut lines, &mut reached);
        }
        let order = self.order.read().clone();
        for id in &order {
            if !reached.contains(id) {
                lines.push(format!("{} (detached)", self.describe(id)));
            }
        }
        lines.join("\n")
    }

    fn render_node(
        &self,
        id: &GroupId,
        depth: usize,
        lines: &mut Vec<String>,
        reached: &mut HashSet<GroupId>,
    ) {
        let indent = "  ".repeat(depth);
        lines.push(format!("{indent}{}", self.describe(id)));
        reached.insert(id.clone());

        let children = self
            .lookup(id)
            .and_then(|audience| audience.as_filter().map(|f| f.children().to_vec()))
            .unwrap_or_default();
        for child in &children {
            self.render_node(child, depth + 1, lines, reached);
        }
    }

    fn describe(&self, id: &GroupId) -> String {
        let Some(audience) = self.lookup(id) else {
            return format!("{id} [missing]");
        };
        let priority = audience.group().priority;
        let members = audience.base().members().len();
        let status = if audience.is_active() { "active" } else { "idle" };

        match (audience.display_kind(), audience.as_filter()) {
            (Some(kind), Some(filter)) => format!(
                "{id} [single:{kind}{}] priority={priority} considered={members} owned={} {status}",
                inverted_suffix(filter),
                filter.filtered().len(),
            ),
            (None, Some(filter)) => format!(
                "{id} [filter{}] priority={priority} considered={members} passed={} {status}",
                inverted_suffix(filter),
                filter.filtered().len(),
            ),
            _ => format!("{id} [display] priority={priority} members={members} {status}"),
        }
    }

    /// Roots first, then breadth-first through children, then anything unreached
    fn refresh_order(&self) -> Vec<GroupId> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut queue: VecDeque<GroupId> = self.roots.read().iter().cloned().collect();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(audience) = self.lookup(&id) {
                if let Some(filter) = audience.as_filter() {
                    queue.extend(filter.children().iter().cloned());
                }
            }
            order.push(id);
        }
        for id in self.order.read().iter() {
            if !seen.contains(id) {
                order.push(id.clone());
            }
        }
        order
    }

    fn live(&self, ids: &[GroupId]) -> Vec<Arc<dyn Audience>> {
        ids.iter().filter_map(|id| self.lookup(id)).collect()
    }

    fn live_roots(&self) -> Vec<Arc<dyn Audience>> {
        let roots = self.roots();
        self.live(&roots)
    }

    fn live_groups(&self) -> Vec<Arc<dyn Audience>> {
        let order = self.order.read().clone();
        self.live(&order)
    }

    fn table_snapshot(&self) -> Vec<Arc<OwnershipTable>> {
        self.tables.iter().map(|entry| entry.value().clone()).collect()
    }

    fn children_of(&self, parent: &GroupRef) -> Vec<Arc<dyn Audience>> {
        let Some(audience) = self.lookup(&parent.id) else {
            trace!(parent = %parent, "parent is not live");
            return Vec::new();
        };
        let Some(filter) = audience.as_filter() else {
            return Vec::new();
        };
        filter
            .children()
            .iter()
            .filter_map(|child| {
                let found = self.lookup(child);
                if found.is_none() {
                    trace!(parent = %parent, child = %child, "child is not live");
                }
                found
            })
            .collect()
    }
}

fn inverted_suffix(filter: &AudienceFilter) -> &'static str {
    if filter.is_inverted() {
        ", inverted"
    } else {
        ""
    }
}

impl AudienceManager for AudienceRegistry {
    fn add_actor_to_children(&self, actor: ActorId, parent: &GroupRef) {
        for child in self.children_of(parent) {
            child.add_actor(self, actor);
        }
    }

    fn remove_actor_from_children(&self, actor: ActorId, parent: &GroupRef) {
        for child in self.children_of(parent) {
            child.remove_actor(self, actor);
        }
    }

    fn lookup(&self, group: &GroupId) -> Option<Arc<dyn Audience>> {
        self.audiences.get(group).map(|entry| entry.value().clone())
    }

    fn find_displays_of_kind(&self, kind: &DisplayKind) -> Vec<Arc<dyn Audience>> {
        self.live_groups()
            .into_iter()
            .filter(|audience| audience.display_kind() == Some(kind))
            .collect()
    }

    fn actor_lock(&self, actor: ActorId) -> ActorLock {
        self.locks.get(actor)
    }

    fn events(&self) -> &EventBus {
        &self.events
    }

    fn metrics(&self) -> &AudienceMetrics {
        &self.metrics
    }

    fn ownership(&self, kind: &DisplayKind) -> Option<Arc<OwnershipTable>> {
        self.tables.get(kind).map(|entry| entry.value().clone())
    }
}

impl fmt::Debug for AudienceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudienceRegistry")
            .field("groups", &self.audiences.len())
            .field("roots", &*self.roots.read())
            .field("kinds", &self.display_kinds())
            .field("online", &self.online.len())
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> ActorId {
        ActorId::from_name("alice")
    }

    #[test]
    fn test_duplicate_group_rejected() {
        let result = AudienceRegistry::builder()
            .group(GroupDefinition::display("a"))
            .group(GroupDefinition::display("a"))
            .build();
        assert!(matches!(result, Err(AudienceError::DuplicateGroup(id)) if id.as_str() == "a"));
    }

    #[test]
    fn test_unknown_child_rejected_when_strict() {
        let result = AudienceRegistry::builder()
            .group(GroupDefinition::filter("root", None, &["ghost"]))
            .build();
        assert!(matches!(result, Err(AudienceError::UnknownChild { .. })));
    }

    #[test]
    fn test_unknown_child_ignored_when_lenient() {
        let registry = AudienceRegistry::builder()
            .group(GroupDefinition::filter("root", None, &["ghost"]))
            .config(RegistryConfig {
                strict_children: false,
                ..Default::default()
            })
            .build()
            .unwrap();

        assert!(registry.on_actor_connect(alice()));
        assert!(registry.contains(&GroupId::from("root"), alice()));
        assert!(!registry.contains(&GroupId::from("ghost"), alice()));
    }

    #[test]
    fn test_cycle_rejected() {
        let result = AudienceRegistry::builder()
            .group(GroupDefinition::filter("a", None, &["b"]))
            .group(GroupDefinition::filter("b", None, &["a"]))
            .build();
        assert!(matches!(result, Err(AudienceError::Cycle(_))));
    }

    #[test]
    fn test_unknown_policy_rejected() {
        let result = AudienceRegistry::builder()
            .group(GroupDefinition::filter("a", Some("tag:staff"), &[]))
            .build();
        assert!(matches!(
            result,
            Err(AudienceError::UnknownPolicy { policy, .. }) if policy == "tag:staff"
        ));
    }

    #[test]
    fn test_roots_skip_children_and_child_only() {
        let registry = AudienceRegistry::builder()
            .group(GroupDefinition::filter("everyone", None, &["inner"]))
            .group(GroupDefinition::display("inner"))
            .group(GroupDefinition::display("orphan").child_only())
            .group(GroupDefinition::display("lobby"))
            .build()
            .unwrap();

        assert_eq!(
            registry.roots(),
            vec![GroupId::from("everyone"), GroupId::from("lobby")]
        );

        registry.on_actor_connect(alice());
        assert!(registry.contains(&GroupId::from("inner"), alice()));
        assert!(!registry.contains(&GroupId::from("orphan"), alice()));
    }

    #[test]
    fn test_connect_and_disconnect_are_idempotent() {
        let registry = AudienceRegistry::builder()
            .group(GroupDefinition::display("lobby"))
            .build()
            .unwrap();

        assert!(registry.on_actor_connect(alice()));
        assert!(!registry.on_actor_connect(alice()));
        assert_eq!(registry.online(), vec![alice()]);

        assert!(registry.on_actor_disconnect(alice()));
        assert!(!registry.on_actor_disconnect(alice()));
        assert!(registry.online().is_empty());
    }

    #[test]
    fn test_lookups_on_missing_group() {
        let registry = AudienceRegistry::builder().build().unwrap();
        let ghost = GroupId::from("ghost");

        assert_eq!(registry.display_state(&ghost, alice()), None);
        assert!(!registry.contains(&ghost, alice()));
        assert!(!registry.refresh_group(&ghost, alice()));
        assert!(!registry.set_inverted(&ghost, true));
        assert!(!registry.unregister(&ghost));
        assert_eq!(registry.owner_of(alice(), &DisplayKind::from("sidebar")), None);
    }

    #[test]
    fn test_unregister_disposes_group() {
        let registry = AudienceRegistry::builder()
            .group(GroupDefinition::filter("everyone", None, &["inner"]))
            .group(GroupDefinition::display("inner"))
            .build()
            .unwrap();
        registry.on_actor_connect(alice());

        let inner = registry.lookup(&GroupId::from("inner")).unwrap();
        assert!(registry.unregister(&GroupId::from("inner")));
        assert!(!inner.is_active());
        assert!(registry.lookup(&GroupId::from("inner")).is_none());

        // propagation to the removed child is a no-op
        registry.on_actor_disconnect(alice());
        registry.on_actor_connect(alice());
        assert!(registry.contains(&GroupId::from("everyone"), alice()));
    }

    #[test]
    fn test_shutdown_clears_everything() {
        let registry = AudienceRegistry::builder()
            .group(GroupDefinition::filter("everyone", None, &["sidebar"]))
            .group(GroupDefinition::single("sidebar", "sidebar", 1))
            .build()
            .unwrap();
        registry.on_actor_connect(alice());
        assert!(registry.has_single_display(alice(), &DisplayKind::from("sidebar")));

        registry.shutdown();
        assert!(registry.is_closed());
        assert!(registry.groups().is_empty());
        assert!(registry.online().is_empty());
        assert!(registry.events().is_empty());
        assert_eq!(registry.metrics().snapshot().live_owners(), 0);
        assert!(!registry.on_actor_connect(alice()));

        // second shutdown is a no-op
        registry.shutdown();
    }

    #[test]
    fn test_render_tree() {
        let registry = AudienceRegistry::builder()
            .group(GroupDefinition::filter("everyone", None, &["staff", "sidebar"]))
            .group(GroupDefinition::filter("staff", None, &[]).with_inverted(true))
            .group(GroupDefinition::single("sidebar", "sidebar", 2))
            .group(GroupDefinition::display("spare").child_only())
            .build()
            .unwrap();
        registry.on_actor_connect(alice());

        insta::assert_snapshot!(registry.render_tree(), @r"
        everyone [filter] priority=0 considered=1 passed=1 active
          staff [filter, inverted] priority=0 considered=1 passed=0 active
          sidebar [single:sidebar] priority=2 considered=1 owned=1 active
        spare [display] priority=0 members=0 idle (detached)
        ");
    }

    #[test]
    fn test_refresh_of_offline_actor_leaves_no_lock() {
        let registry = AudienceRegistry::builder()
            .group(GroupDefinition::filter("everyone", None, &["inner"]))
            .group(GroupDefinition::display("inner"))
            .build()
            .unwrap();
        let everyone = GroupId::from("everyone");
        let stranger = ActorId::from_name("stranger");

        assert_eq!(registry.refresh(stranger), 0);
        assert!(!registry.refresh_group(&everyone, stranger));
        let filter = registry.lookup(&everyone).unwrap();
        assert!(!filter.as_filter().unwrap().try_refresh(&registry, stranger).unwrap());
        assert!(registry.locks.is_empty());

        registry.on_actor_connect(alice());
        registry.on_actor_disconnect(alice());
        assert_eq!(registry.refresh(alice()), 0);
        assert!(registry.locks.is_empty());
    }

    #[test]
    fn test_config_defaults_from_yaml() {
        let config: RegistryConfig = serde_yaml::from_str("prune_actor_locks: false").unwrap();
        assert!(config.strict_children);
        assert!(!config.prune_actor_locks);
    }
}
