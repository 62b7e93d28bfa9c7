pub mod api_types;
pub mod backend;
pub mod coordinator;
pub mod llm;
pub mod locks;
pub mod prompts;
pub mod providers;
pub mod retry;
pub mod scheduler;
pub mod stages;

pub use backend::LlmBackend;
pub use coordinator::{FailureKind, InteractionCoordinator, InteractionOutcome, InteractionRequest};
pub use locks::{CharacterLease, CharacterLocks};
pub use scheduler::ThoughtScheduler;
