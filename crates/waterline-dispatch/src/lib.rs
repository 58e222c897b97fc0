// crates/waterline-dispatch/src/lib.rs
// ============================================================================
// Module: Waterline Dispatch Library
// Description: Task dispatcher implementations for the pipeline runtime.
// Purpose: Hand run tasks to an in-process queue or an external task runner.
// Dependencies: waterline-core, reqwest, tokio, url
// ============================================================================

//! ## Overview
//! Two implementations of the core dispatcher interface: an in-process
//! queue for embedded deployments and tests, and an HTTP dispatcher that
//! POSTs run tasks to an external fire-and-forget task runner. Neither
//! provides ordering or exactly-once delivery; the runtime's idempotent step
//! advancement absorbs duplicates.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod http;
pub mod local;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use http::HttpDispatcherConfig;
pub use http::HttpDispatcherError;
pub use http::HttpTaskDispatcher;
pub use local::LocalTaskDispatcher;
pub use local::TaskQueue;
pub use local::local_queue;
