//! Demo policies used by the CLI.
//!
//! `tag:<name>` filters pass actors carrying that tag in an in-memory tag
//! store. The `log` display hooks and the session factory only trace what
//! happens to them.

use audience_core::{
    ActorId, AudienceEvent, DisplayHooks, DisplayKind, FilterPolicy, GroupKind, GroupRef,
    Manifest, PolicyCatalog, PolicyError, SessionFactory, SingleSession,
};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Predicate topic published when an actor's tags change
pub const TAGS_TOPIC: &str = "tags";

const TAG_PREFIX: &str = "tag:";

/// In-memory actor tags
#[derive(Debug, Default)]
pub struct TagStore {
    tags: RwLock<HashMap<ActorId, BTreeSet<String>>>,
}

impl TagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the tag was newly added
    pub fn tag(&self, actor: ActorId, tag: &str) -> bool {
        self.tags
            .write()
            .entry(actor)
            .or_default()
            .insert(tag.to_string())
    }

    /// Returns true if the tag was present
    pub fn untag(&self, actor: ActorId, tag: &str) -> bool {
        let mut tags = self.tags.write();
        let Some(set) = tags.get_mut(&actor) else {
            return false;
        };
        let removed = set.remove(tag);
        if set.is_empty() {
            tags.remove(&actor);
        }
        removed
    }

    pub fn has(&self, actor: ActorId, tag: &str) -> bool {
        self.tags
            .read()
            .get(&actor)
            .is_some_and(|set| set.contains(tag))
    }

    pub fn tags_of(&self, actor: ActorId) -> Vec<String> {
        self.tags
            .read()
            .get(&actor)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Passes actors carrying one tag
#[derive(Debug)]
pub struct TagPolicy {
    tag: String,
    store: Arc<TagStore>,
}

impl TagPolicy {
    pub fn new(tag: impl Into<String>, store: Arc<TagStore>) -> Self {
        Self {
            tag: tag.into(),
            store,
        }
    }
}

impl FilterPolicy for TagPolicy {
    fn evaluate(&self, actor: ActorId) -> Result<bool, PolicyError> {
        Ok(self.store.has(actor, &self.tag))
    }

    fn on_filter_added(&self, group: &GroupRef, actor: ActorId) {
        debug!(group = %group.id, actor = %actor, tag = %self.tag, "tag filter passed");
    }

    fn watches(&self, topic: &str) -> bool {
        topic == TAGS_TOPIC
    }
}

/// Display hooks that log lifecycle events
#[derive(Debug, Default)]
pub struct LogHooks;

impl DisplayHooks for LogHooks {
    fn on_actor_add(&self, group: &GroupRef, actor: ActorId) {
        info!(group = %group.id, actor = %actor, "joined display");
    }

    fn on_actor_remove(&self, group: &GroupRef, actor: ActorId) {
        info!(group = %group.id, actor = %actor, "left display");
    }

    fn on_activate(&self, group: &GroupRef) {
        debug!(group = %group.id, "display activated");
    }

    fn on_release(&self, group: &GroupRef) {
        debug!(group = %group.id, "display released");
    }

    fn on_event(&self, group: &GroupRef, event: &AudienceEvent) {
        debug!(group = %group.id, actor = %event.actor(), "display saw event");
    }

    fn tick(&self, group: &GroupRef, members: &[ActorId]) {
        trace!(group = %group.id, members = members.len(), "display tick");
    }
}

/// Sessions that log what an owner record shows
#[derive(Debug, Default)]
pub struct LogSessions;

struct LogSession {
    kind: DisplayKind,
}

impl SingleSession for LogSession {
    fn on_setup(&self, actor: ActorId, owner: &GroupRef) {
        info!(kind = %self.kind, actor = %actor, owner = %owner, "showing display");
    }

    fn on_tear_down(&self, actor: ActorId, owner: &GroupRef) {
        debug!(kind = %self.kind, actor = %actor, owner = %owner, "hiding display");
    }

    fn tick(&self, actor: ActorId, owner: &GroupRef) {
        trace!(kind = %self.kind, actor = %actor, owner = %owner, "display tick");
    }

    fn on_dispose(&self, actor: ActorId) {
        debug!(kind = %self.kind, actor = %actor, "display closed");
    }
}

impl SessionFactory for LogSessions {
    fn create(&self, _actor: ActorId, kind: &DisplayKind) -> Box<dyn SingleSession> {
        Box::new(LogSession { kind: kind.clone() })
    }
}

/// Catalog resolving every demo policy name the manifest uses.
///
/// Unknown names are left out so the registry builder reports them.
pub fn catalog_for(manifest: &Manifest, store: &Arc<TagStore>) -> PolicyCatalog {
    let hooks = Arc::new(LogHooks);
    let sessions = Arc::new(LogSessions);
    let mut catalog = PolicyCatalog::new().with_hooks("log", hooks);

    for group in &manifest.groups {
        match &group.kind {
            GroupKind::Filter {
                policy: Some(name), ..
            } => {
                if let Some(tag) = name.strip_prefix(TAG_PREFIX) {
                    let policy = Arc::new(TagPolicy::new(tag, store.clone()));
                    catalog = catalog.with_filter(name.clone(), policy);
                }
            }
            GroupKind::Single { display, .. } => {
                catalog = catalog.with_sessions(display.clone(), sessions.clone());
            }
            _ => {}
        }
    }
    catalog
}

#[cfg(test)]
mod tests {
    use super::*;
    use audience_core::{AudienceError, AudienceRegistry, GroupDefinition, GroupId};

    #[test]
    fn test_tag_store() {
        let store = TagStore::new();
        let alice = ActorId::from_name("alice");

        assert!(store.tag(alice, "staff"));
        assert!(!store.tag(alice, "staff"));
        assert!(store.has(alice, "staff"));
        assert_eq!(store.tags_of(alice), vec!["staff".to_string()]);

        assert!(store.untag(alice, "staff"));
        assert!(!store.untag(alice, "staff"));
        assert!(store.tags_of(alice).is_empty());
    }

    #[test]
    fn test_catalog_resolves_tag_policies() {
        let store = Arc::new(TagStore::new());
        let manifest = Manifest::new(vec![
            GroupDefinition::filter("staff", Some("tag:staff"), &["board"]),
            GroupDefinition::display("board"),
        ]);
        let registry =
            AudienceRegistry::from_manifest(&manifest, catalog_for(&manifest, &store)).unwrap();
        let alice = ActorId::from_name("alice");

        registry.on_actor_connect(alice);
        assert!(!registry.contains(&GroupId::from("board"), alice));

        store.tag(alice, "staff");
        registry.publish(&AudienceEvent::Changed {
            actor: alice,
            topic: TAGS_TOPIC.to_string(),
        });
        assert!(registry.contains(&GroupId::from("board"), alice));
    }

    #[test]
    fn test_catalog_leaves_unknown_policies() {
        let store = Arc::new(TagStore::new());
        let manifest = Manifest::new(vec![GroupDefinition::filter("vip", Some("billing"), &[])]);
        let result = AudienceRegistry::from_manifest(&manifest, catalog_for(&manifest, &store));
        assert!(matches!(result, Err(AudienceError::UnknownPolicy { .. })));
    }
}
