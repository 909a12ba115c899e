//! Ports - seams to external infrastructure.
//!
//! Each trait stands for a piece of shared infrastructure (message broker,
//! key-value result backend, ...). The in-memory implementations live in
//! `impls`; networked backends plug in behind the same traits.

pub mod broker;
pub mod claim_store;
pub mod clock;
pub mod id_generator;
pub mod result_store;

pub use self::broker::{Broker, Delivery};
pub use self::claim_store::ClaimStore;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::result_store::{ResultStore, StateCounts};
