//! The resilient scrape pipeline.
//!
//! Request execution, result classification, canonical signing and
//! stabilization-aware polling against one exporter endpoint.

mod poller;
mod request;
mod sigv4;
mod status;

pub use poller::{PollerConfig, StabilizationPoller};
pub use request::{Executor, RequestSpec, RetryPolicy, TRACE_ID_HEADER};
pub use status::{FailureBody, OperationStatus, StatusKind, StatusReason};
