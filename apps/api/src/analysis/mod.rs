// Resume analysis: model resolution, inference, and response contract enforcement.
// All Gemini calls go through llm_client. No direct HTTP calls here.

pub mod contract;
pub mod handlers;
pub mod orchestrator;
pub mod resolver;
