//! Scheduler layer
//!
//! Hands run requests to background tasks so API calls return immediately.
//! Serialisation of the runs themselves is the runner's job.

pub mod dispatcher;

pub use dispatcher::Dispatcher;
