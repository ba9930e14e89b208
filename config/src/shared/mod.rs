mod base;
mod batch;
mod checkpoint_store;
mod connection;
mod retry;
mod target;

pub use base::*;
pub use batch::*;
pub use checkpoint_store::*;
pub use connection::*;
pub use retry::*;
pub use target::*;
