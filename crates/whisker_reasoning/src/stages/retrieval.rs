//! Memory retrieval: rank stored memories, let the backend pick the relevant
//! ones, then normalise what it picked.

use super::{call_backend, malformed, unexpected_output};
use crate::prompts;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use whisker_core::config::PipelineConfig;
use whisker_core::state::DEFAULT_EMOTION;
use whisker_core::{
    CharacterContext, GenerationBackend, Interaction, MemoryExtractionResult, MemoryRecord,
    PipelineError, PipelineStage, StageOutput, StageSchema, ValidationResult,
};

const STAGE: PipelineStage = PipelineStage::MemoryRetrieval;

pub struct MemoryRetriever {
    backend: Arc<dyn GenerationBackend>,
    candidates: usize,
    max_relevant: usize,
}

impl MemoryRetriever {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: &PipelineConfig) -> Self {
        Self {
            backend,
            candidates: config.memory_candidates,
            max_relevant: config.max_relevant_memories,
        }
    }

    /// Only called for interactions whose validation passed.
    pub async fn extract_memories(
        &self,
        interaction: &Interaction,
        ctx: &CharacterContext,
        validation: &ValidationResult,
    ) -> Result<MemoryExtractionResult, PipelineError> {
        let fallback_emotion = ctx.state.emotional_state.primary().to_string();

        if ctx.recent_memories.is_empty() {
            return Ok(MemoryExtractionResult {
                relevant_memories: Vec::new(),
                dominant_emotion: fallback_emotion,
                relevance_summary: "no memories yet".to_string(),
                behavioral_influence: String::new(),
            });
        }

        let query = format!(
            "{} {} {} {}",
            interaction.declared_type.as_str().to_lowercase().replace('_', " "),
            interaction.payload,
            validation.user_mood,
            ctx.state.emotional_state.tags().join(" ")
        );
        let candidates = rank_candidates(&ctx.recent_memories, &query, self.candidates);
        tracing::debug!(
            "{} of {} memories offered to the backend",
            candidates.len(),
            ctx.recent_memories.len()
        );

        let prompt = prompts::memory_prompt(interaction, ctx, validation, &candidates);
        let raw = match call_backend(
            self.backend.as_ref(),
            STAGE,
            StageSchema::MemoryExtraction,
            &prompt,
        )
        .await?
        {
            StageOutput::MemoryExtraction(result) => result,
            other => {
                return Err(unexpected_output(
                    STAGE,
                    StageSchema::MemoryExtraction,
                    other.schema(),
                ))
            }
        };

        self.normalise(raw, &candidates, &fallback_emotion)
    }

    /// Clamp relevance, resolve ids against the candidates, order by
    /// relevance and cap the list.
    fn normalise(
        &self,
        mut raw: MemoryExtractionResult,
        candidates: &[&MemoryRecord],
        fallback_emotion: &str,
    ) -> Result<MemoryExtractionResult, PipelineError> {
        let known: HashSet<_> = candidates.iter().map(|m| m.id).collect();
        let mut seen = HashSet::new();
        let mut memories = Vec::with_capacity(raw.relevant_memories.len());

        for mut memory in raw.relevant_memories.drain(..) {
            if !memory.relevance.is_finite() {
                return Err(malformed(
                    STAGE,
                    StageSchema::MemoryExtraction,
                    "relevance is not a number",
                ));
            }
            memory.relevance = memory.relevance.clamp(0.0, 1.0);

            memory.memory_id = memory
                .memory_id
                .filter(|id| known.contains(id))
                .or_else(|| {
                    candidates
                        .iter()
                        .find(|c| c.text.trim() == memory.text.trim())
                        .map(|c| c.id)
                });
            if let Some(id) = memory.memory_id {
                if !seen.insert(id) {
                    continue;
                }
            }
            if memory.text.trim().is_empty() {
                continue;
            }
            memories.push(memory);
        }

        memories.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
        memories.truncate(self.max_relevant);
        raw.relevant_memories = memories;

        let dominant = raw.dominant_emotion.trim().to_lowercase();
        raw.dominant_emotion = if dominant.is_empty() {
            if fallback_emotion.is_empty() {
                DEFAULT_EMOTION.to_string()
            } else {
                fallback_emotion.to_string()
            }
        } else {
            dominant
        };
        Ok(raw)
    }
}

/// The `limit` memories closest to `query` by bag-of-words cosine
/// similarity. Ties keep the store's most-recent-first order.
pub fn rank_candidates<'a>(
    memories: &'a [MemoryRecord],
    query: &str,
    limit: usize,
) -> Vec<&'a MemoryRecord> {
    let query_vec = term_counts(query);
    let mut scored: Vec<(f32, &MemoryRecord)> = memories
        .iter()
        .map(|m| {
            let doc = format!("{} {}", m.text, m.emotions.join(" "));
            (cosine_similarity(&query_vec, &term_counts(&doc)), m)
        })
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().take(limit).map(|(_, m)| m).collect()
}

fn term_counts(text: &str) -> HashMap<String, f32> {
    let mut counts = HashMap::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1)
    {
        *counts.entry(word.to_lowercase()).or_insert(0.0) += 1.0;
    }
    counts
}

fn cosine_similarity(a: &HashMap<String, f32>, b: &HashMap<String, f32>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let dot: f32 = a
        .iter()
        .filter_map(|(term, x)| b.get(term).map(|y| x * y))
        .sum();
    let norm_a: f32 = a.values().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.values().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;
    use whisker_core::{
        Character, CharacterState, EmotionalState, GenerationError, InteractionType,
        PromptContext, RelevantMemory, ValidationStatus,
    };

    struct FixedExtraction {
        result: MemoryExtractionResult,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GenerationBackend for FixedExtraction {
        async fn generate(
            &self,
            _schema: StageSchema,
            _prompt: &PromptContext,
        ) -> Result<StageOutput, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(StageOutput::MemoryExtraction(self.result.clone()))
        }
    }

    fn memory(text: &str, emotions: &[&str]) -> MemoryRecord {
        MemoryRecord {
            id: Uuid::new_v4(),
            character_id: Uuid::nil(),
            text: text.to_string(),
            emotions: emotions.iter().map(|e| e.to_string()).collect(),
            source_interaction_id: None,
            created_at: 0,
        }
    }

    fn context(memories: Vec<MemoryRecord>) -> CharacterContext {
        CharacterContext {
            character: Character {
                id: Uuid::new_v4(),
                owner_id: Uuid::new_v4(),
                name: "Mochi".to_string(),
            },
            state: CharacterState {
                emotional_state: EmotionalState::from_tags(["sleepy", "calm"]).unwrap(),
                ..Default::default()
            },
            version: 0,
            recent_memories: memories,
            recent_interactions: vec![],
        }
    }

    fn valid() -> ValidationResult {
        ValidationResult {
            detected_type: InteractionType::Feed,
            confidence: 0.9,
            status: ValidationStatus::Valid,
            reason: String::new(),
            user_mood: "kind".to_string(),
        }
    }

    fn retriever(
        result: MemoryExtractionResult,
        max_relevant: usize,
    ) -> (MemoryRetriever, Arc<FixedExtraction>) {
        let backend = Arc::new(FixedExtraction {
            result,
            calls: AtomicUsize::new(0),
        });
        let config = PipelineConfig {
            max_relevant_memories: max_relevant,
            ..Default::default()
        };
        (MemoryRetriever::new(backend.clone(), &config), backend)
    }

    fn relevant(id: Option<Uuid>, text: &str, relevance: f32) -> RelevantMemory {
        RelevantMemory {
            memory_id: id,
            text: text.to_string(),
            emotions: vec![],
            relevance,
            trigger: String::new(),
        }
    }

    #[tokio::test]
    async fn test_no_memories_skips_backend() {
        let (r, backend) = retriever(MemoryExtractionResult::default(), 5);
        let ctx = context(vec![]);
        let interaction =
            Interaction::new(ctx.character.id, Uuid::new_v4(), InteractionType::Feed, "");
        let result = r.extract_memories(&interaction, &ctx, &valid()).await.unwrap();
        assert!(result.relevant_memories.is_empty());
        assert_eq!(result.dominant_emotion, "sleepy");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_results_are_clamped_sorted_and_capped() {
        let stored = vec![
            memory("fed tuna by the window", &["happy"]),
            memory("chased a moth", &["playful"]),
            memory("the vacuum cleaner roared", &["scared"]),
        ];
        let raw = MemoryExtractionResult {
            relevant_memories: vec![
                relevant(Some(stored[1].id), "chased a moth", 0.2),
                relevant(Some(stored[0].id), "fed tuna by the window", 3.0),
                relevant(None, "the vacuum cleaner roared", 0.5),
            ],
            dominant_emotion: "  Hopeful ".to_string(),
            ..Default::default()
        };
        let (r, _) = retriever(raw, 2);
        let ctx = context(stored.clone());
        let interaction =
            Interaction::new(ctx.character.id, Uuid::new_v4(), InteractionType::Feed, "tuna");
        let result = r.extract_memories(&interaction, &ctx, &valid()).await.unwrap();

        assert_eq!(result.relevant_memories.len(), 2);
        assert_eq!(result.relevant_memories[0].relevance, 1.0);
        assert_eq!(result.relevant_memories[0].memory_id, Some(stored[0].id));
        // Matched back to its stored record by text
        assert_eq!(result.relevant_memories[1].memory_id, Some(stored[2].id));
        assert_eq!(result.dominant_emotion, "hopeful");
    }

    #[tokio::test]
    async fn test_unknown_ids_are_dropped_and_empty_emotion_falls_back() {
        let stored = vec![memory("napped in the sun", &["content"])];
        let raw = MemoryExtractionResult {
            relevant_memories: vec![relevant(Some(Uuid::new_v4()), "something invented", 0.9)],
            dominant_emotion: String::new(),
            ..Default::default()
        };
        let (r, _) = retriever(raw, 5);
        let ctx = context(stored);
        let interaction =
            Interaction::new(ctx.character.id, Uuid::new_v4(), InteractionType::Pet, "");
        let result = r.extract_memories(&interaction, &ctx, &valid()).await.unwrap();

        assert_eq!(result.relevant_memories.len(), 1);
        assert_eq!(result.relevant_memories[0].memory_id, None);
        assert!(result.referenced_ids().is_empty());
        assert_eq!(result.dominant_emotion, "sleepy");
    }

    #[tokio::test]
    async fn test_nan_relevance_is_malformed() {
        let stored = vec![memory("napped in the sun", &["content"])];
        let raw = MemoryExtractionResult {
            relevant_memories: vec![relevant(None, "napped in the sun", f32::NAN)],
            ..Default::default()
        };
        let (r, _) = retriever(raw, 5);
        let ctx = context(stored);
        let interaction =
            Interaction::new(ctx.character.id, Uuid::new_v4(), InteractionType::Pet, "");
        let err = r.extract_memories(&interaction, &ctx, &valid()).await.unwrap_err();
        assert_eq!(err.stage(), Some(PipelineStage::MemoryRetrieval));
    }

    #[test]
    fn test_rank_candidates_prefers_overlap() {
        let stored = vec![
            memory("played with the red string", &["playful"]),
            memory("ate salmon for dinner", &["happy"]),
            memory("slept on the sofa", &["calm"]),
        ];
        let ranked = rank_candidates(&stored, "feed salmon dinner", 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].text, "ate salmon for dinner");
    }

    #[test]
    fn test_rank_candidates_keeps_recency_on_ties() {
        let stored = vec![memory("first", &[]), memory("second", &[])];
        let ranked = rank_candidates(&stored, "unrelated words", 5);
        assert_eq!(ranked[0].text, "first");
        assert_eq!(ranked[1].text, "second");
    }

    #[test]
    fn test_cosine_similarity() {
        let a = term_counts("tuna tuna fish");
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &term_counts("sofa")), 0.0);
        assert_eq!(cosine_similarity(&a, &HashMap::new()), 0.0);
    }
}
