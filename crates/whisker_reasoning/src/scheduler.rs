//! Autonomous thought scheduler.
//!
//! Submits AUTONOMOUS_THOUGHT interactions for one character on a ticker.
//! The base interval comes from the configured frequency and is stretched or
//! shortened by the character's last known state.

use crate::coordinator::{InteractionCoordinator, InteractionOutcome, InteractionRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;
use whisker_core::config::ThoughtFrequency;
use whisker_core::{Activity, CharacterState, PipelineError};

const MIN_INTERVAL: Duration = Duration::from_secs(5);

pub struct ThoughtScheduler {
    coordinator: Arc<InteractionCoordinator>,
    character_id: Uuid,
    owner_id: Uuid,
    base_interval: Duration,
}

impl ThoughtScheduler {
    /// `None` when thoughts are switched off.
    pub fn new(
        coordinator: Arc<InteractionCoordinator>,
        character_id: Uuid,
        owner_id: Uuid,
        frequency: &ThoughtFrequency,
    ) -> Option<Self> {
        let base_interval = frequency.interval()?;
        Some(Self {
            coordinator,
            character_id,
            owner_id,
            base_interval,
        })
    }

    /// Delay before the next thought, given what the cat is doing.
    pub fn next_interval(&self, state: Option<&CharacterState>) -> Duration {
        let base = self.base_interval.as_secs_f64();
        let factor = match state {
            None => 1.0,
            Some(s) if s.activity == Some(Activity::Sleeping) => 3.0,
            Some(s) if s.energy < 30 => 1.5,
            Some(s) if s.energy > 70 => 0.75,
            Some(_) => 1.0,
        };
        Duration::from_secs_f64(base * factor).max(MIN_INTERVAL)
    }

    pub async fn think_once(&self) -> Result<InteractionOutcome, PipelineError> {
        self.coordinator
            .submit(InteractionRequest::thought(self.character_id, self.owner_id))
            .await
    }

    /// Run until `shutdown` flips to true or its sender is dropped.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut last_state: Option<CharacterState> = None;
            tracing::info!(
                "thought scheduler started for {} (every ~{:?})",
                self.character_id,
                self.base_interval
            );

            loop {
                let wait = self.next_interval(last_state.as_ref());
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                match self.think_once().await {
                    Ok(InteractionOutcome::Completed {
                        response, state, ..
                    }) => {
                        tracing::info!("thought: {}", response);
                        last_state = Some(state);
                    }
                    Ok(outcome) => {
                        tracing::debug!(
                            "thought {} ended as {}",
                            outcome.interaction_id(),
                            outcome.status()
                        );
                    }
                    Err(e) => tracing::warn!("could not submit thought: {}", e),
                }
            }

            tracing::info!("thought scheduler for {} stopped", self.character_id);
        })
    }
}
