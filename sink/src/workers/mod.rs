//! Background flush workers and the policy deciding how their failures are handled.

pub mod policy;
pub mod pool;
