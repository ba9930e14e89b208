//! Coordination primitives shared by the engine and the loader binary.

pub mod shutdown;
