// Alert pipeline: change detection, prioritization, deduplication and queueing.
//
// Architecture:
// - model.rs: Categories, priorities, raw changes and alerts
// - triggers.rs: The five change detectors
// - engine.rs: Alert factory (priority table, dedup key, spoken message)
// - queue.rs: Deduplicating priority queue with delivered history

pub mod engine;
pub mod model;
pub mod queue;
pub mod triggers;
