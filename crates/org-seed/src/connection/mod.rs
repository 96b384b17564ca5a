//! The connection seam between the pipeline and the platform REST API.
//!
//! The pipeline only ever talks to [`Connection`] trait objects, so tests can
//! drive it with in-memory fakes and the CLI can hand it authenticated
//! [`RestConnection`](rest::RestConnection)s.

mod rest;

pub use rest::RestConnection;

use crate::error::Result;
use crate::schema::ObjectDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A dynamically shaped record: field name to JSON value.
///
/// Field sets differ per object and per org, so records stay untyped. A field
/// holding `Value::Null` is distinct from an absent field: null is written to
/// the target, absent is left untouched.
pub type Record = serde_json::Map<String, Value>;

/// The `Id` field of a record, when present and a string.
pub fn record_id(record: &Record) -> Option<&str> {
    record.get("Id").and_then(Value::as_str)
}

/// One entry of the global object list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSObject {
    /// API name.
    pub name: String,

    /// Human label, used for sorting pick lists.
    pub label: String,

    /// Whether the object can be queried.
    #[serde(default)]
    pub queryable: bool,

    /// Whether records can be created.
    #[serde(default)]
    pub createable: bool,

    /// Three-character record id prefix, if the object has one.
    #[serde(default)]
    pub key_prefix: Option<String>,
}

/// One page of query results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPage {
    /// Total records matched by the query (across all pages).
    #[serde(default)]
    pub total_size: i64,

    /// Whether this is the final page.
    pub done: bool,

    /// Cursor for the next page when `done` is false.
    #[serde(default)]
    pub next_records_url: Option<String>,

    /// Records in this page.
    #[serde(default)]
    pub records: Vec<Record>,
}

/// One per-record error from a bulk write response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveError {
    /// Platform status code, e.g. `REQUIRED_FIELD_MISSING`.
    #[serde(default)]
    pub status_code: Option<String>,

    /// Human-readable message.
    #[serde(default)]
    pub message: String,

    /// Fields the error applies to.
    #[serde(default)]
    pub fields: Vec<String>,
}

/// One per-record result from a bulk create/update/upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResult {
    /// Target record id, when the platform returns one. Upserts that update an
    /// existing row may omit it.
    #[serde(default)]
    pub id: Option<String>,

    /// Whether the record was accepted.
    pub success: bool,

    /// Upsert only: true when a new record was created, false when an existing
    /// one was updated.
    #[serde(default)]
    pub created: Option<bool>,

    /// Errors when `success` is false.
    #[serde(default)]
    pub errors: Vec<SaveError>,
}

/// An authenticated connection to one org.
///
/// Implementations perform SOQL queries with pagination cursors, bulk
/// create/update/upsert (at most 200 records per call, the platform limit),
/// schema describes, and authenticated binary downloads. The pipeline borrows
/// two of these (source and target) for the duration of a run and never
/// mutates their auth state.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Base URL of the org instance, without a trailing slash.
    fn instance_url(&self) -> &str;

    /// Bearer token used for authenticated requests.
    fn access_token(&self) -> &str;

    /// REST API version, e.g. `62.0`.
    fn api_version(&self) -> &str;

    /// List every object in the org with its queryable/createable flags.
    async fn describe_global(&self) -> Result<Vec<GlobalSObject>>;

    /// Full field and child-relationship metadata for one object.
    async fn describe(&self, object: &str) -> Result<ObjectDescriptor>;

    /// Execute a SOQL query, returning the first page.
    async fn query(&self, soql: &str) -> Result<QueryPage>;

    /// Fetch the next page for a pagination cursor.
    async fn query_more(&self, locator: &str) -> Result<QueryPage>;

    /// Bulk-create up to 200 records.
    async fn create(&self, object: &str, records: Vec<Record>) -> Result<Vec<SaveResult>>;

    /// Bulk-update up to 200 records (each must carry `Id`).
    async fn update(&self, object: &str, records: Vec<Record>) -> Result<Vec<SaveResult>>;

    /// Bulk-upsert up to 200 records keyed by an external-id field.
    async fn upsert(
        &self,
        object: &str,
        external_id_field: &str,
        records: Vec<Record>,
    ) -> Result<Vec<SaveResult>>;

    /// Download the binary body of a content version, following redirects.
    async fn download_version_data(&self, version_id: &str) -> Result<Vec<u8>>;
}
