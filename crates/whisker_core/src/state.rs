//! Character state and the clamp-and-commit arithmetic.
//!
//! Bounded fields (hunger, happiness, energy) live in `[0, 100]`.
//! Affection is an unbounded running score. The emotional state is an
//! ordered, duplicate-free list of 1..=5 tags.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::EmptyEmotionalState;
use crate::stages::ResponsePlan;

pub const STAT_MIN: i64 = 0;
pub const STAT_MAX: i64 = 100;
pub const MAX_EMOTIONS: usize = 5;
pub const DEFAULT_EMOTION: &str = "calm";

/// What the cat is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    Sleeping,
    Eating,
    Playing,
    Grooming,
    Exploring,
    Resting,
    Hunting,
    Watching,
}

/// Where the cat is right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    LivingRoom,
    Kitchen,
    Bedroom,
    Garden,
    Windowsill,
    Rooftop,
}

/// Ordered set of 1..=5 lower-case emotion tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct EmotionalState(Vec<String>);

impl EmotionalState {
    /// Normalise raw tags: trim, lower-case, drop blanks and duplicates, keep
    /// the first five. Fails when nothing usable remains.
    pub fn from_tags<I, S>(tags: I) -> Result<Self, EmptyEmotionalState>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for tag in tags {
            let tag = tag.as_ref().trim().to_lowercase();
            if tag.is_empty() || out.contains(&tag) {
                continue;
            }
            out.push(tag);
            if out.len() == MAX_EMOTIONS {
                break;
            }
        }
        if out.is_empty() {
            return Err(EmptyEmotionalState);
        }
        Ok(Self(out))
    }

    pub fn tags(&self) -> &[String] {
        &self.0
    }

    /// The leading tag. Always present.
    pub fn primary(&self) -> &str {
        &self.0[0]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for EmotionalState {
    fn default() -> Self {
        Self(vec![DEFAULT_EMOTION.to_string()])
    }
}

impl TryFrom<Vec<String>> for EmotionalState {
    type Error = EmptyEmotionalState;

    fn try_from(tags: Vec<String>) -> Result<Self, Self::Error> {
        Self::from_tags(tags)
    }
}

impl From<EmotionalState> for Vec<String> {
    fn from(state: EmotionalState) -> Self {
        state.0
    }
}

impl fmt::Display for EmotionalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

/// Mutable state of one character. Only the coordinator writes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterState {
    pub hunger: u8,
    pub happiness: u8,
    pub energy: u8,
    pub user_affection: i64,
    pub activity: Option<Activity>,
    pub location: Option<Location>,
    pub emotional_state: EmotionalState,
}

impl Default for CharacterState {
    fn default() -> Self {
        Self {
            hunger: 50,
            happiness: 50,
            energy: 50,
            user_affection: 0,
            activity: None,
            location: None,
            emotional_state: EmotionalState::default(),
        }
    }
}

/// Add a signed delta to a bounded stat, saturating at the bounds.
#[inline]
pub fn clamp_stat(current: u8, delta: i32) -> u8 {
    (current as i64 + delta as i64).clamp(STAT_MIN, STAT_MAX) as u8
}

impl CharacterState {
    /// Produce the state that results from committing `plan`.
    ///
    /// `self` is left untouched; the caller decides whether the result is
    /// ever persisted.
    pub fn apply(&self, plan: &ResponsePlan) -> CharacterState {
        let delta = &plan.delta;
        CharacterState {
            hunger: clamp_stat(self.hunger, delta.hunger),
            happiness: clamp_stat(self.happiness, delta.happiness),
            energy: clamp_stat(self.energy, delta.energy),
            user_affection: self.user_affection.saturating_add(delta.affection as i64),
            activity: plan.new_activity.resolve(self.activity),
            location: plan.new_location.resolve(self.location),
            emotional_state: plan.emotional_state.clone(),
        }
    }

    /// One-line summary used in prompts and the CLI.
    pub fn describe(&self) -> String {
        let activity = self
            .activity
            .map(|a| format!("{:?}", a).to_lowercase())
            .unwrap_or_else(|| "idle".to_string());
        let location = self
            .location
            .map(|l| format!("{:?}", l).to_lowercase())
            .unwrap_or_else(|| "somewhere".to_string());
        format!(
            "hunger {}/100, happiness {}/100, energy {}/100, affection {}, \
             {} in the {}, feeling {}",
            self.hunger,
            self.happiness,
            self.energy,
            self.user_affection,
            activity,
            location,
            self.emotional_state
        )
    }
}

/// The persistent character entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{Patch, StateDelta};

    fn plan(delta: StateDelta) -> ResponsePlan {
        ResponsePlan {
            response: "*purrs*".to_string(),
            new_memory_text: "I was fed".to_string(),
            new_activity: Patch::Unchanged,
            new_location: Patch::Unchanged,
            delta,
            emotional_state: EmotionalState::from_tags(["content"]).unwrap(),
        }
    }

    #[test]
    fn test_feed_scenario() {
        let state = CharacterState {
            hunger: 10,
            happiness: 50,
            energy: 90,
            ..Default::default()
        };
        let next = state.apply(&plan(StateDelta {
            hunger: 20,
            happiness: 5,
            energy: 0,
            affection: 0,
        }));
        assert_eq!((next.hunger, next.happiness, next.energy), (30, 55, 90));
    }

    #[test]
    fn test_clamp_at_upper_bound() {
        let state = CharacterState {
            hunger: 95,
            ..Default::default()
        };
        let next = state.apply(&plan(StateDelta {
            hunger: 20,
            ..Default::default()
        }));
        assert_eq!(next.hunger, 100);
    }

    #[test]
    fn test_clamp_at_lower_bound() {
        assert_eq!(clamp_stat(3, -20), 0);
        assert_eq!(clamp_stat(0, 0), 0);
        assert_eq!(clamp_stat(100, 20), 100);
    }

    #[test]
    fn test_affection_is_unbounded() {
        let state = CharacterState {
            user_affection: 990,
            ..Default::default()
        };
        let next = state.apply(&plan(StateDelta {
            affection: 20,
            ..Default::default()
        }));
        assert_eq!(next.user_affection, 1010);
    }

    #[test]
    fn test_patch_tri_state() {
        let state = CharacterState {
            activity: Some(Activity::Sleeping),
            location: Some(Location::Bedroom),
            ..Default::default()
        };
        let mut p = plan(StateDelta::default());
        p.new_activity = Patch::Set(Activity::Playing);
        p.new_location = Patch::Unchanged;
        let next = state.apply(&p);
        assert_eq!(next.activity, Some(Activity::Playing));
        assert_eq!(next.location, Some(Location::Bedroom));

        p.new_location = Patch::Clear;
        let next = state.apply(&p);
        assert_eq!(next.location, None);
    }

    #[test]
    fn test_apply_does_not_touch_original() {
        let state = CharacterState::default();
        let before = state.clone();
        let _ = state.apply(&plan(StateDelta {
            hunger: -20,
            happiness: 20,
            energy: -20,
            affection: 5,
        }));
        assert_eq!(state, before);
    }

    #[test]
    fn test_emotional_state_normalisation() {
        let s = EmotionalState::from_tags([" Happy", "happy", "", "SLEEPY", "a", "b", "c", "d"])
            .unwrap();
        assert_eq!(s.tags(), &["happy", "sleepy", "a", "b", "c"]);
        assert_eq!(s.primary(), "happy");
        assert!(EmotionalState::from_tags(Vec::<String>::new()).is_err());
        assert!(EmotionalState::from_tags(["  ", ""]).is_err());
    }

    #[test]
    fn test_emotional_state_deserialize_rejects_empty() {
        assert!(serde_json::from_str::<EmotionalState>("[]").is_err());
        let s: EmotionalState = serde_json::from_str(r#"["curious"]"#).unwrap();
        assert_eq!(s.primary(), "curious");
    }
}
