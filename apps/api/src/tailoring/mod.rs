// Resume tailoring engine.
// Pure stages (matcher, scorer, selector, assembler, score) never do I/O; only the
// orchestrator talks to the provider and the rewrite cache.

pub mod assembler;
pub mod breaker;
pub mod cache;
pub mod engine;
pub mod handlers;
pub mod matcher;
pub mod orchestrator;
pub mod score;
pub mod scorer;
pub mod selector;
