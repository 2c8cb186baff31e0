//! Shared types for the currency-rate platform.
//!
//! - [`EventId`], [`Subscriber`] and [`Rate`] are passed between the broker,
//!   saga and rates crates.
//! - [`BlockingCaller`] bounds a synchronous call (a registry or repository
//!   write) by a cancellation token and a deadline.

pub mod call;
pub mod types;

pub use call::{BlockingCaller, CallError};
pub use types::{EventId, Rate, Subscriber};
