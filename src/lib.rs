//! Batch harness that asks several hosted chat models every prompt in a dataset and
//! writes one wide comparison table plus a latency summary.

pub mod aggregate;
pub mod config;
pub mod dataset;
pub mod infer;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod table;
pub mod util;
pub mod validate;
