//! Utilities for testing code built on the ordering protocol. They are used for testing the
//!  protocol itself, but they are also exported for application testing.

pub mod simulated_network;
