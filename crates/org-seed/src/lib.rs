//! # org-seed
//!
//! Seed a CRM sandbox org with a hierarchically related subset of records
//! from another org, preserving referential integrity across tiers and
//! polymorphic associations.
//!
//! The pipeline discovers relationships from the orgs' schema at run time,
//! queries the source, rewrites every cross-record reference to point at the
//! newly created target records, and writes into the target in a
//! dependency-correct order:
//!
//! - **Core object** first, with shallow data dependencies pulled in and
//!   self-references resolved by a post-insert pass
//! - **Children**, then **grandchildren**, remapped through the identity
//!   registry
//! - **Activities** (Tasks/Events) with polymorphic `WhatId`/`WhoId` remap
//! - **Files** last: binary download, re-upload, and link rebuild
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use org_seed::{RestConnection, SeedPlan, Seeder};
//!
//! #[tokio::main]
//! async fn main() -> org_seed::Result<()> {
//!     let source = Arc::new(RestConnection::new(
//!         "https://source.my.salesforce.com", "token-a", "62.0")?);
//!     let target = Arc::new(RestConnection::new(
//!         "https://target.my.salesforce.com", "token-b", "62.0")?);
//!
//!     let plan = SeedPlan::for_root("Account");
//!     let results = Seeder::new(source, target).run(&plan, None).await?;
//!     println!("{}", results.to_json()?);
//!     Ok(())
//! }
//! ```

pub mod classify;
pub mod connection;
pub mod error;
pub mod pipeline;
pub mod plan;
pub mod prepare;
pub mod registry;
pub mod results;
pub mod schema;
pub mod soql;
pub mod writer;

// Re-exports for convenient access
pub use connection::{Connection, GlobalSObject, QueryPage, Record, RestConnection, SaveResult};
pub use error::{Result, SeedError};
pub use pipeline::Seeder;
pub use plan::{ChildPlan, GrandchildPlan, RecordLimit, SeedPlan};
pub use registry::IdentityRegistry;
pub use results::{FileTransferSummary, ObjectCounts, SeedResults, SeedStatus};
pub use schema::{ObjectDescriptor, SchemaInspector};
