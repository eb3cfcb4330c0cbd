#![warn(missing_docs)]
//! Test support for the session engine: an instrumented world store, an
//! in-process session harness and a TCP test client.

mod counting_world;
mod harness;

pub use counting_world::*;
pub use harness::*;
