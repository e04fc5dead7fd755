//! SQL utilities for the keyed store
//!
//! Naming rules, identifier sanitization, DDL generation and the composable
//! statement builder.

pub mod ddl;
pub mod naming;
pub mod query;
pub mod sanitize;

pub use ddl::DdlGenerator;
pub use naming::{event_name, field_column, reserved_column, table_name};
pub use query::{Filter, Page, Param, QuerySpec, Sort, SortDirection, Statement, StatementBuilder};
pub use sanitize::{MAX_IDENTIFIER_LENGTH, quote_identifier, validate_identifier};
