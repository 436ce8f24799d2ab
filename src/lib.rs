//! Review service managing product reviews and a denormalized per-product
//! rating aggregate.
//!
//! The aggregate is always recomputed wholesale from the approved review set,
//! never patched incrementally, and is propagated to other services via
//! asynchronous events. Lifecycle events of other services (order completed,
//! user deleted, product deleted) retroactively mutate the review set and
//! re-trigger aggregation.

pub mod aggregation;
pub mod cache;
pub mod error;
pub mod event;
pub mod external;
pub mod http_api;
pub mod mutation_input_structs;
pub mod order_datatypes;
pub mod rating;
pub mod review;
pub mod service;
pub mod state;
pub mod vote;
