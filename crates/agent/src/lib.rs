//! Recommendation runtime - generation orchestration over the wine catalog
//!
//! This crate turns the external language model's raw output into durable,
//! well-formed proposal facts:
//! - **Candidate selection** (`candidates`) - narrow the catalog by declared
//!   wine type and budget before any generation call
//! - **Generation contract** (`llm`) - pluggable client trait plus the typed
//!   request/output shapes exchanged with the collaborator
//! - **Orchestration** (`orchestrator`) - validate ranks, resolve product
//!   references, and assemble the assistant turn with its proposal group
//!
//! # Safety Principle
//!
//! The language model is strictly a ranking translator. It NEVER invents
//! catalog entries, prices, or margins; those come from the catalog snapshot
//! taken at proposal time, and output that references unknown products or
//! breaks rank contiguity is rejected, never repaired.

pub mod candidates;
pub mod llm;
pub mod orchestrator;

pub use candidates::{select_candidates, BUDGET_HEADROOM};
pub use llm::{
    GenerationClient, GenerationError, GenerationOutput, GenerationRequest, ProposedJourney,
    ProposedWine,
};
pub use orchestrator::{Orchestrator, ProposalBatch, ProposalTurn};
