//! Mapping declared stream shapes onto MySQL tables.
//!
//! [`TypeMapper`] turns field schemas into column types, [`widen`] decides how an existing
//! column absorbs a newly requested type and [`SchemaReconciler`] plans the DDL that keeps a
//! table a superset of everything a stream declared.

pub mod flatten;
pub mod mapper;
pub mod metadata;
pub mod naming;
pub mod reconciler;
pub mod widen;

pub use mapper::TypeMapper;
pub use reconciler::{DdlOperation, DdlPlan, SchemaReconciler, StreamShape};
pub use widen::{Widening, widen};
