//! Execution context carrier and request-id propagation.
//!
//! A unit of work (an inbound request, a job) runs with exactly one
//! [`ExecutionContext`] bound. Code anywhere below the entry point reads it
//! through [`carrier::current`] without it being passed as a parameter.
//!
//! # Flow
//!
//! ```text
//! inbound X-Request-Id ──► propagate_request_id ──► carrier::scope
//!                                                     ├─ handlers / tracker
//!                                                     ├─ carrier::spawn (copy)
//!                                                     └─ inject_request_id ──► outbound
//! ```
//!
//! # Usage
//!
//! 1. Install [`propagate_request_id`] with `from_fn_with_state`.
//! 2. Use [`RequestContext`] in handlers, or [`carrier::current_id`] deeper down.
//! 3. Hand work off with [`carrier::spawn`] so the child gets its own copy.
//! 4. Wrap responses in [`ExecutionEnvelope`].

pub mod carrier;
pub mod context;
pub mod extract;
pub mod middleware;
pub mod response;

pub use carrier::CarrierError;
pub use context::{ExecutionContext, IdSource};
pub use extract::{MissingContext, RequestContext, MISSING_CONTEXT_CODE};
pub use middleware::{
    inject_request_id, propagate_request_id, resolve_context, PropagationState, DEFAULT_HEADER,
};
pub use response::{ErrorBody, ExecutionEnvelope};
