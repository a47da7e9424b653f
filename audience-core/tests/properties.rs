//! Property tests: random connect/disconnect/refresh/inversion sequences keep
//! the group tree consistent.

use audience_core::prelude::*;
use audience_core::PolicyError;
use parking_lot::RwLock;
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct AllowList(RwLock<HashSet<ActorId>>);

impl FilterPolicy for AllowList {
    fn evaluate(&self, actor: ActorId) -> Result<bool, PolicyError> {
        Ok(self.0.read().contains(&actor))
    }
}

#[derive(Debug, Clone)]
enum Op {
    Connect(usize),
    Disconnect(usize),
    Allow(usize),
    Deny(usize),
    Invert(bool),
    Tick,
}

const ACTORS: usize = 4;

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..ACTORS).prop_map(Op::Connect),
        (0..ACTORS).prop_map(Op::Disconnect),
        (0..ACTORS).prop_map(Op::Allow),
        (0..ACTORS).prop_map(Op::Deny),
        any::<bool>().prop_map(Op::Invert),
        Just(Op::Tick),
    ]
}

fn actor(i: usize) -> ActorId {
    ActorId::from_name(&format!("actor-{i}"))
}

/// everyone → [lobby, s1, vip → [s2, vip-lounge]]
fn registry(vip: Arc<AllowList>) -> AudienceRegistry {
    let manifest = Manifest::new(vec![
        GroupDefinition::filter("everyone", None, &["lobby", "s1", "vip"]),
        GroupDefinition::display("lobby"),
        GroupDefinition::single("s1", "sidebar", 1),
        GroupDefinition::filter("vip", Some("vip"), &["s2", "vip-lounge"]),
        GroupDefinition::single("s2", "sidebar", 5),
        GroupDefinition::display("vip-lounge"),
    ]);
    let catalog = PolicyCatalog::new().with_filter("vip", vip);
    AudienceRegistry::from_manifest(&manifest, catalog).unwrap()
}

fn apply(registry: &AudienceRegistry, vip: &AllowList, op: &Op) {
    match op {
        Op::Connect(i) => {
            registry.on_actor_connect(actor(*i));
        }
        Op::Disconnect(i) => {
            registry.on_actor_disconnect(actor(*i));
        }
        Op::Allow(i) => {
            vip.0.write().insert(actor(*i));
            registry.refresh(actor(*i));
        }
        Op::Deny(i) => {
            vip.0.write().remove(&actor(*i));
            registry.refresh(actor(*i));
        }
        Op::Invert(value) => {
            registry.set_inverted(&GroupId::from("vip"), *value);
        }
        Op::Tick => registry.tick(),
    }
}

fn check_invariants(registry: &AudienceRegistry) -> Result<(), TestCaseError> {
    let sidebar = DisplayKind::from("sidebar");
    for i in 0..ACTORS {
        let a = actor(i);

        // no-skip-level
        for parent in registry.groups() {
            let audience = registry.lookup(&parent.id).unwrap();
            if let Some(filter) = audience.as_filter() {
                for child in filter.children() {
                    if registry.contains(child, a) {
                        prop_assert!(filter.filtered().contains(a));
                    }
                }
            }
        }

        // exclusivity
        let owners = registry
            .find_displays_of_kind(&sidebar)
            .into_iter()
            .filter(|audience| audience.contains(a))
            .count();
        prop_assert!(owners <= 1);
        prop_assert_eq!(owners == 1, registry.has_single_display(a, &sidebar));
    }

    // active iff non-empty
    for group in registry.groups() {
        let audience = registry.lookup(&group.id).unwrap();
        prop_assert_eq!(audience.is_active(), !audience.base().members().is_empty());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Property Tests
// ---------------------------------------------------------------------------

proptest! {
    /// Any operation sequence keeps the tree consistent after every step.
    #[test]
    fn invariants_hold_after_every_step(ops in prop::collection::vec(arb_op(), 1..40)) {
        let vip = Arc::new(AllowList::default());
        let registry = registry(vip.clone());

        for op in &ops {
            apply(&registry, &vip, op);
            check_invariants(&registry)?;
        }
    }

    /// The sidebar owner depends only on the final inputs, not on history.
    #[test]
    fn owner_matches_inputs(ops in prop::collection::vec(arb_op(), 1..40)) {
        let vip = Arc::new(AllowList::default());
        let registry = registry(vip.clone());
        for op in &ops {
            apply(&registry, &vip, op);
        }

        let sidebar = DisplayKind::from("sidebar");
        let inverted = registry
            .lookup(&GroupId::from("vip"))
            .unwrap()
            .as_filter()
            .unwrap()
            .is_inverted();
        let online: HashSet<_> = registry.online().into_iter().collect();
        for i in 0..ACTORS {
            let a = actor(i);
            let expected = if !online.contains(&a) {
                None
            } else if vip.0.read().contains(&a) != inverted {
                Some(GroupRef::new("s2", 5))
            } else {
                Some(GroupRef::new("s1", 1))
            };
            prop_assert_eq!(registry.owner_of(a, &sidebar), expected);
        }
    }

    /// Repeating an operation right away changes nothing.
    #[test]
    fn operations_are_idempotent(
        ops in prop::collection::vec(arb_op(), 0..20),
        last in arb_op(),
    ) {
        let vip = Arc::new(AllowList::default());
        let registry = registry(vip.clone());
        for op in &ops {
            apply(&registry, &vip, op);
        }
        apply(&registry, &vip, &last);
        let once = registry.render_tree();

        apply(&registry, &vip, &last);
        prop_assert_eq!(registry.render_tree(), once);
    }

    /// Disconnecting everyone releases every display and owner record.
    #[test]
    fn disconnect_all_drains(ops in prop::collection::vec(arb_op(), 1..40)) {
        let vip = Arc::new(AllowList::default());
        let registry = registry(vip.clone());
        for op in &ops {
            apply(&registry, &vip, op);
        }
        for i in 0..ACTORS {
            registry.on_actor_disconnect(actor(i));
        }

        prop_assert!(registry.events().is_empty());
        let snapshot = registry.metrics().snapshot();
        prop_assert_eq!(snapshot.live_owners(), 0);
        prop_assert_eq!(snapshot.active_displays(), 0);
    }
}
