//! Conversions between source JSON values and destination cells.

pub mod coerce;
pub mod infer;
pub mod temporal;
