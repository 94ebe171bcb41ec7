// CV screening pipeline: archive → text → per-candidate evaluation → report.
// All evaluation calls go through llm_client via the evaluator.

pub mod archive;
pub mod evaluator;
pub mod extract;
pub mod handlers;
pub mod orchestrator;
pub mod prompts;
pub mod registry;
pub mod report;
