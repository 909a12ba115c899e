//! Impls - in-memory implementations of the ports.
//!
//! Used for development, tests and the single-process runtime. Networked
//! backends (a message broker, a key-value result backend) implement the same
//! traits from `ports` in separate crates.

pub mod inmem_broker;
pub mod inmem_claims;
pub mod inmem_results;

pub use self::inmem_broker::InMemoryBroker;
pub use self::inmem_claims::InMemoryClaimStore;
pub use self::inmem_results::InMemoryResultStore;
