//! REST implementation of the connection seam.
//!
//! Speaks the platform's `/services/data/v{version}` API: SOQL query with
//! pagination cursors, sObject-collections bulk writes, describes, and
//! authenticated version-data downloads. Bulk calls are capped at the
//! platform's 200-record limit; the writer batches before calling in.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::connection::{Connection, GlobalSObject, QueryPage, Record, SaveResult};
use crate::error::{Result, SeedError};
use crate::schema::ObjectDescriptor;
use crate::writer::BATCH_SIZE;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// An authenticated REST connection to one org.
pub struct RestConnection {
    client: Client,
    instance_url: String,
    access_token: String,
    api_version: String,
}

#[derive(Debug, Deserialize)]
struct DescribeGlobalResponse {
    sobjects: Vec<GlobalSObject>,
}

impl RestConnection {
    /// Create a connection from an instance URL, bearer token, and API
    /// version.
    pub fn new(
        instance_url: impl Into<String>,
        access_token: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let instance_url: String = instance_url.into();
        Ok(Self {
            client,
            instance_url: instance_url.trim_end_matches('/').to_string(),
            access_token: access_token.into(),
            api_version: api_version.into(),
        })
    }

    fn base_url(&self) -> String {
        format!("{}/services/data/v{}", self.instance_url, self.api_version)
    }

    /// Resolve a pagination locator: the platform returns instance-relative
    /// paths.
    fn absolute_url(&self, locator: &str) -> String {
        if locator.starts_with("http") {
            locator.to_string()
        } else {
            format!("{}{}", self.instance_url, locator)
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SeedError::api(status.as_u16(), summarize_error_body(&body)));
        }
        Ok(response.json().await?)
    }

    fn check_batch(records: &[Record]) -> Result<()> {
        if records.len() > BATCH_SIZE {
            return Err(SeedError::Request(format!(
                "bulk call of {} records exceeds the {}-record limit",
                records.len(),
                BATCH_SIZE
            )));
        }
        Ok(())
    }
}

/// Tag each record with the `attributes.type` envelope the collections API
/// requires.
fn with_attributes(object: &str, records: Vec<Record>) -> Vec<Value> {
    records
        .into_iter()
        .map(|mut record| {
            record.insert("attributes".to_string(), json!({ "type": object }));
            Value::Object(record)
        })
        .collect()
}

/// Condense an error response body into one line. The platform answers with a
/// JSON array of `{message, errorCode}` entries.
fn summarize_error_body(body: &str) -> String {
    if body.trim().is_empty() {
        return "empty response body".to_string();
    }
    if let Ok(Value::Array(entries)) = serde_json::from_str::<Value>(body) {
        let lines: Vec<String> = entries
            .iter()
            .filter_map(|e| {
                let message = e.get("message").and_then(Value::as_str)?;
                match e.get("errorCode").and_then(Value::as_str) {
                    Some(code) => Some(format!("{}: {}", code, message)),
                    None => Some(message.to_string()),
                }
            })
            .collect();
        if !lines.is_empty() {
            return lines.join("; ");
        }
    }
    let trimmed = body.trim();
    if trimmed.len() > 300 {
        format!("{}...", &trimmed[..300])
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl Connection for RestConnection {
    fn instance_url(&self) -> &str {
        &self.instance_url
    }

    fn access_token(&self) -> &str {
        &self.access_token
    }

    fn api_version(&self) -> &str {
        &self.api_version
    }

    async fn describe_global(&self) -> Result<Vec<GlobalSObject>> {
        let url = format!("{}/sobjects", self.base_url());
        let response: DescribeGlobalResponse = self.get_json(&url).await?;
        Ok(response.sobjects)
    }

    async fn describe(&self, object: &str) -> Result<ObjectDescriptor> {
        let url = format!("{}/sobjects/{}/describe", self.base_url(), object);
        self.get_json(&url).await
    }

    async fn query(&self, soql: &str) -> Result<QueryPage> {
        let url = format!("{}/query", self.base_url());
        let response = self
            .client
            .get(&url)
            .query(&[("q", soql)])
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn query_more(&self, locator: &str) -> Result<QueryPage> {
        self.get_json(&self.absolute_url(locator)).await
    }

    async fn create(&self, object: &str, records: Vec<Record>) -> Result<Vec<SaveResult>> {
        Self::check_batch(&records)?;
        let url = format!("{}/composite/sobjects", self.base_url());
        let payload = json!({
            "allOrNone": false,
            "records": with_attributes(object, records),
        });
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn update(&self, object: &str, records: Vec<Record>) -> Result<Vec<SaveResult>> {
        Self::check_batch(&records)?;
        let url = format!("{}/composite/sobjects", self.base_url());
        let payload = json!({
            "allOrNone": false,
            "records": with_attributes(object, records),
        });
        let response = self
            .client
            .patch(&url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn upsert(
        &self,
        object: &str,
        external_id_field: &str,
        records: Vec<Record>,
    ) -> Result<Vec<SaveResult>> {
        Self::check_batch(&records)?;
        let url = format!(
            "{}/composite/sobjects/{}/{}",
            self.base_url(),
            object,
            external_id_field
        );
        let payload = json!({
            "allOrNone": false,
            "records": with_attributes(object, records),
        });
        let response = self
            .client
            .patch(&url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn download_version_data(&self, version_id: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}/sobjects/ContentVersion/{}/VersionData",
            self.base_url(),
            version_id
        );
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SeedError::api(404, format!("version {} not found", version_id)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SeedError::api(status.as_u16(), summarize_error_body(&body)));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_url_trailing_slash_trimmed() {
        let conn =
            RestConnection::new("https://org.example.com/", "token", "62.0").unwrap();
        assert_eq!(conn.instance_url(), "https://org.example.com");
        assert_eq!(
            conn.base_url(),
            "https://org.example.com/services/data/v62.0"
        );
    }

    #[test]
    fn test_absolute_url_resolves_relative_locators() {
        let conn = RestConnection::new("https://org.example.com", "token", "62.0").unwrap();
        assert_eq!(
            conn.absolute_url("/services/data/v62.0/query/01g-2000"),
            "https://org.example.com/services/data/v62.0/query/01g-2000"
        );
        assert_eq!(conn.absolute_url("https://other/x"), "https://other/x");
    }

    #[test]
    fn test_with_attributes_tags_records() {
        let mut record = Record::new();
        record.insert("Name".to_string(), json!("Acme"));
        let tagged = with_attributes("Account", vec![record]);
        assert_eq!(tagged[0]["attributes"]["type"], "Account");
        assert_eq!(tagged[0]["Name"], "Acme");
    }

    #[test]
    fn test_summarize_error_body_parses_platform_shape() {
        let body = r#"[{"message": "Session expired", "errorCode": "INVALID_SESSION_ID"}]"#;
        assert_eq!(
            summarize_error_body(body),
            "INVALID_SESSION_ID: Session expired"
        );
        assert_eq!(summarize_error_body(""), "empty response body");
        assert_eq!(summarize_error_body("<html>boom</html>"), "<html>boom</html>");
    }

    #[test]
    fn test_check_batch_rejects_oversize() {
        let records: Vec<Record> = (0..201).map(|_| Record::new()).collect();
        assert!(RestConnection::check_batch(&records).is_err());
        assert!(RestConnection::check_batch(&records[..200]).is_ok());
    }
}
