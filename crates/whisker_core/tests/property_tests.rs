//! Property-based tests for whisker_core.
//!
//! Uses proptest to verify the state invariants for all starting values and
//! all proposed deltas, not just hand-picked examples.

use proptest::prelude::*;
use whisker_core::{
    Activity, CharacterState, EmotionalState, Location, Patch, ResponsePlan, StateDelta,
};

// ============================================================================
// Strategies
// ============================================================================

fn arb_activity() -> impl Strategy<Value = Option<Activity>> {
    prop_oneof![
        Just(None),
        Just(Some(Activity::Sleeping)),
        Just(Some(Activity::Playing)),
        Just(Some(Activity::Eating)),
    ]
}

fn arb_location() -> impl Strategy<Value = Option<Location>> {
    prop_oneof![
        Just(None),
        Just(Some(Location::Kitchen)),
        Just(Some(Location::Windowsill)),
    ]
}

fn arb_state() -> impl Strategy<Value = CharacterState> {
    (
        0u8..=100,
        0u8..=100,
        0u8..=100,
        -10_000i64..10_000,
        arb_activity(),
        arb_location(),
    )
        .prop_map(|(hunger, happiness, energy, user_affection, activity, location)| {
            CharacterState {
                hunger,
                happiness,
                energy,
                user_affection,
                activity,
                location,
                emotional_state: EmotionalState::default(),
            }
        })
}

/// Raw proposals well outside the allowed range, bounded the way the planner does.
fn arb_delta() -> impl Strategy<Value = StateDelta> {
    (
        -500i64..500,
        -500i64..500,
        -500i64..500,
        -500i64..500,
    )
        .prop_map(|(h, p, e, a)| StateDelta::bounded(h, p, e, a))
}

fn arb_tags() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[ A-Za-z]{0,8}", 0..12)
}

fn plan_with(delta: StateDelta) -> ResponsePlan {
    ResponsePlan {
        response: "mrrp".to_string(),
        new_memory_text: "something happened".to_string(),
        new_activity: Patch::Unchanged,
        new_location: Patch::Unchanged,
        delta,
        emotional_state: EmotionalState::from_tags(["curious"]).unwrap(),
    }
}

// ============================================================================
// Clamping
// ============================================================================

proptest! {
    /// Committed bounded stats always stay in [0, 100].
    #[test]
    fn applied_stats_always_within_bounds(state in arb_state(), delta in arb_delta()) {
        let next = state.apply(&plan_with(delta));
        prop_assert!(next.hunger <= 100);
        prop_assert!(next.happiness <= 100);
        prop_assert!(next.energy <= 100);
    }

    /// Bounded deltas never exceed 20 in magnitude.
    #[test]
    fn bounded_deltas_stay_in_range(delta in arb_delta()) {
        for v in [delta.hunger, delta.happiness, delta.energy, delta.affection] {
            prop_assert!((-20..=20).contains(&v), "delta out of range: {}", v);
        }
    }

    /// Away from the bounds, the delta is applied exactly.
    #[test]
    fn interior_deltas_apply_exactly(start in 20u8..=80, d in -20i32..=20) {
        let state = CharacterState { hunger: start, ..Default::default() };
        let next = state.apply(&plan_with(StateDelta { hunger: d, ..Default::default() }));
        prop_assert_eq!(next.hunger as i32, start as i32 + d);
    }

    /// Affection is never clamped.
    #[test]
    fn affection_is_plain_addition(state in arb_state(), delta in arb_delta()) {
        let next = state.apply(&plan_with(delta));
        prop_assert_eq!(next.user_affection, state.user_affection + delta.affection as i64);
    }

    /// An unchanged patch leaves activity and location as they were.
    #[test]
    fn unchanged_patches_preserve_activity_and_location(
        state in arb_state(),
        delta in arb_delta(),
    ) {
        let next = state.apply(&plan_with(delta));
        prop_assert_eq!(next.activity, state.activity);
        prop_assert_eq!(next.location, state.location);
    }
}

// ============================================================================
// Emotional state bounds
// ============================================================================

proptest! {
    /// Whatever the raw tags, a constructed emotional state has 1..=5 unique entries.
    #[test]
    fn emotional_state_size_in_range(tags in arb_tags()) {
        if let Ok(state) = EmotionalState::from_tags(&tags) {
            prop_assert!(!state.is_empty());
            prop_assert!(state.len() <= 5);
            let mut seen = std::collections::HashSet::new();
            for t in state.tags() {
                prop_assert!(seen.insert(t.clone()), "duplicate tag {}", t);
            }
        } else {
            prop_assert!(tags.iter().all(|t| t.trim().is_empty()));
        }
    }

    /// The committed emotional state is exactly the plan's.
    #[test]
    fn applied_emotional_state_replaces_previous(state in arb_state()) {
        let next = state.apply(&plan_with(StateDelta::default()));
        prop_assert_eq!(next.emotional_state.tags(), &["curious".to_string()][..]);
    }
}
