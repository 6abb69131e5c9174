// Shared runtime support: counters, CSV trace, worker threads
pub mod metrics;
pub mod telemetry;
pub mod worker;
