//! Property tests for the role-constraint merge algebra.

use promptic::types::{CompletionKind, Role, RoleConstraint, RoleSet};
use proptest::prelude::*;

const ROLES: [Role; 5] = [
    Role::Prefix,
    Role::System,
    Role::User,
    Role::Assistant,
    Role::Tool,
];

fn role_strategy() -> impl Strategy<Value = Role> {
    prop::sample::select(&ROLES[..])
}

fn role_set_strategy() -> impl Strategy<Value = RoleSet> {
    prop::collection::vec(role_strategy(), 0..=5).prop_map(RoleSet::of)
}

fn constraint_strategy() -> impl Strategy<Value = RoleConstraint> {
    prop_oneof![
        // Disallowing every role accepts nothing; keep the constraint
        // satisfiable so merge identities hold.
        role_set_strategy()
            .prop_filter("disallowed set must not cover all roles", |set| {
                *set != RoleSet::ALL
            })
            .prop_map(|roles| RoleConstraint::disallowed(roles.iter())),
        role_set_strategy()
            .prop_filter("allowed set must be non-empty", |set| !set.is_empty())
            .prop_map(|roles| RoleConstraint::allowed(roles.iter())),
        role_strategy().prop_map(RoleConstraint::selected),
    ]
}

proptest! {
    #[test]
    fn merge_is_commutative(a in constraint_strategy(), b in constraint_strategy()) {
        match (a.merge(b), b.merge(a)) {
            (Ok(left), Ok(right)) => prop_assert_eq!(left, right),
            (Err(_), Err(_)) => {}
            (left, right) => prop_assert!(
                false,
                "asymmetric outcome: {:?} vs {:?}",
                left,
                right
            ),
        }
    }

    #[test]
    fn merge_is_associative_over_acceptable_sets(
        a in constraint_strategy(),
        b in constraint_strategy(),
        c in constraint_strategy(),
    ) {
        let left = a.merge(b).and_then(|ab| ab.merge(c));
        let right = b.merge(c).and_then(|bc| a.merge(bc));
        match (left, right) {
            (Ok(left), Ok(right)) => prop_assert_eq!(left.acceptable(), right.acceptable()),
            (Err(_), Err(_)) => {}
            (left, right) => prop_assert!(
                false,
                "grouping changed the outcome: {:?} vs {:?}",
                left,
                right
            ),
        }
    }

    #[test]
    fn merge_with_unconstrained_is_identity_up_to_normalization(a in constraint_strategy()) {
        let merged = a.merge(RoleConstraint::any()).unwrap();
        prop_assert_eq!(merged.acceptable(), a.acceptable());
    }

    #[test]
    fn merge_is_idempotent(a in constraint_strategy()) {
        let merged = a.merge(a).unwrap();
        prop_assert_eq!(merged.acceptable(), a.acceptable());
    }

    #[test]
    fn successful_merge_never_accepts_nothing(
        a in constraint_strategy(),
        b in constraint_strategy(),
    ) {
        if let Ok(merged) = a.merge(b) {
            prop_assert!(!merged.acceptable().is_empty());
            // The merge is a refinement of both operands.
            let shared = a.acceptable().intersection(b.acceptable());
            prop_assert_eq!(merged.acceptable().difference(shared), RoleSet::EMPTY);
        }
    }

    #[test]
    fn singleton_acceptable_sets_resolve(a in constraint_strategy()) {
        if let Some(role) = a.acceptable().sole() {
            prop_assert_eq!(a.resolve(role.completion_kind()).unwrap(), role);
        }
    }

    #[test]
    fn resolve_only_returns_family_members(
        a in constraint_strategy(),
        kind in prop::sample::select(&[CompletionKind::Text, CompletionKind::Chat][..]),
    ) {
        if let Ok(role) = a.resolve(kind) {
            prop_assert_eq!(role.completion_kind(), kind);
            prop_assert!(a.acceptable().contains(role));
        }
    }
}
