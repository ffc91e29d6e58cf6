//! `datascope-core`: data model for row-level data-permission policies.
//!
//! This crate contains **pure** types (no I/O): identifiers, filters and
//! groups, the field schema and runtime values.

pub mod entity;
pub mod error;
pub mod filter;
pub mod id;
pub mod join;
pub mod schema;
pub mod value;

pub use entity::{Row, ScopedEntity};
pub use error::{CompileError, CompileResult};
pub use filter::{Combinator, Filter, FilterGroup, Operator, ParseFilterError, NEVER_DECLARED_TYPE};
pub use id::{AppId, ResourceKey, UserId};
pub use join::{JoinTable, SemiJoin};
pub use schema::{EntitySchema, FieldRef, FieldType, ScalarKind};
pub use value::{Value, DATETIME_FORMAT};
