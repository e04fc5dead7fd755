//! # runtara-keyed-store
//!
//! Namespaced, schema-on-first-use key/value persistence over MySQL.
//!
//! A caller declares a record type once; opening a store for a namespace
//! derives the column mapping, creates the backing table and exposes CRUD,
//! filtering, sorting, pagination, aggregation and TTL expiry without the
//! caller writing any SQL.
//!
//! ## Features
//!
//! - **Declared Field Mapping**: `record!` turns a struct's field list into a checked field map
//! - **Type Translation Registry**: Column DDL plus bind/read functions per field type, replaceable per context
//! - **Composable Queries**: One `QuerySpec` covers key scope, filter, sort and page for listings and aggregates
//! - **Single and Multi-Value Stores**: One record per key, or a group of records per key
//! - **TTL Expiry**: Expired rows are hidden from every read and swept hourly by a server-side event
//! - **SQL Injection Prevention**: Identifiers are validated and quoted, values are always bound
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use runtara_keyed_store::{Filter, Page, QuerySpec, Sort, StoreConfig, StoreContext, record};
//!
//! #[derive(Debug, Default, Clone, PartialEq)]
//! struct Player {
//!     name: String,
//!     score: i64,
//!     active: bool,
//! }
//!
//! record!(Player { name, score, active });
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StoreConfig::builder("localhost", "game")
//!         .user("game")
//!         .password("secret")
//!         .build();
//!     let context = StoreContext::connect(&config).await?;
//!
//!     // Creates `game_players__store` on first use
//!     let players = context.single::<Player>("game.players").await?;
//!
//!     let ada = Player { name: "ada".into(), score: 42, active: true };
//!     players.create("p-1", &ada).await?;
//!     assert_eq!(players.get("p-1").await?, Some(ada));
//!
//!     let leaders = players
//!         .list(
//!             &QuerySpec::new()
//!                 .filter(Filter::is("active", true))
//!                 .sort(Sort::desc("score"))
//!                 .page(Page::new(1, 10)?),
//!         )
//!         .await?;
//!     let total = players.sum("score", &QuerySpec::new()).await?;
//!     println!("{} leaders, {} points", leaders.len(), total);
//!
//!     players.expire_in("p-1", chrono::Duration::hours(1)).await?;
//!     context.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use std::time::Duration;
//! use runtara_keyed_store::StoreConfig;
//!
//! let config = StoreConfig::builder("localhost", "game")
//!     .port(3306)                                 // Default port
//!     .connection_options("?ssl-mode=DISABLED")   // Leading '?' is stripped
//!     .max_connections(10)                        // Concurrent leases
//!     .acquire_timeout(Duration::from_secs(30))   // Lease wait
//!     .build();
//!
//! let same = StoreConfig::from_properties([
//!     ("mysql_host", "localhost"),
//!     ("mysql_database", "game"),
//!     ("mysql_connection_options", "?ssl-mode=DISABLED"),
//! ])
//! .unwrap();
//! assert_eq!(config.url(), same.url());
//! ```
//!
//! ## Time Zones
//!
//! Reserved timestamps and TTLs are compared against the server's `NOW(6)`.
//! The driver sets the session time zone to UTC, so every timestamp the
//! crate reads or writes is UTC.

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod multi;
pub mod pool;
pub mod record;
pub mod registry;
pub mod single;
pub mod sql;
pub mod types;

// Re-export main types for convenience
pub use config::{PoolSettings, StoreConfig, StoreConfigBuilder};
pub use context::StoreContext;
pub use engine::{Entry, QueryEngine, TableKind};
pub use error::{Result, StoreError, TranslationError};
pub use multi::MultiValueStore;
pub use pool::ConnectionProvider;
pub use record::{FieldMap, FieldMapBuilder, FieldSpec, Record};
pub use registry::{Translation, TypeRegistry};
pub use single::SingleValueStore;
pub use types::{FieldType, FieldValue, StoreKey, Value};

// Re-export query types
pub use sql::query::{Filter, Page, QuerySpec, Sort, SortDirection};

// Re-export SQL utilities for advanced users
pub use sql::ddl::DdlGenerator;
pub use sql::sanitize::{quote_identifier, validate_identifier};
