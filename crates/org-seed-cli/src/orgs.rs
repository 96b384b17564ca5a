//! Org credential resolution.
//!
//! Credentials live in a JSON auth file mapping an org alias to its instance
//! URL, bearer token, and API version:
//!
//! ```json
//! {
//!   "dev": {
//!     "instance_url": "https://dev.my.salesforce.com",
//!     "access_token": "00D...",
//!     "api_version": "62.0"
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use org_seed::{RestConnection, Result, SeedError};

fn default_api_version() -> String {
    "62.0".to_string()
}

/// Credentials for one org.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgAuth {
    /// Instance base URL.
    pub instance_url: String,

    /// Bearer token.
    pub access_token: String,

    /// REST API version (default: 62.0).
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

/// Load and validate the auth file.
pub fn load_auth_file(path: &Path) -> Result<BTreeMap<String, OrgAuth>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        SeedError::Auth(format!("could not read auth file {}: {}", path.display(), e))
    })?;
    let orgs: BTreeMap<String, OrgAuth> = serde_json::from_str(&content)
        .map_err(|e| SeedError::Auth(format!("invalid auth file {}: {}", path.display(), e)))?;

    for (alias, auth) in &orgs {
        if auth.instance_url.trim().is_empty() {
            return Err(SeedError::Auth(format!("org {} has no instance_url", alias)));
        }
        if auth.access_token.trim().is_empty() {
            return Err(SeedError::Auth(format!("org {} has no access_token", alias)));
        }
    }
    Ok(orgs)
}

/// Look up one alias, naming the available aliases on a miss.
pub fn resolve<'a>(orgs: &'a BTreeMap<String, OrgAuth>, alias: &str) -> Result<&'a OrgAuth> {
    orgs.get(alias).ok_or_else(|| {
        let known: Vec<&str> = orgs.keys().map(String::as_str).collect();
        SeedError::Auth(format!(
            "unknown org alias '{}' (available: {})",
            alias,
            if known.is_empty() {
                "none".to_string()
            } else {
                known.join(", ")
            }
        ))
    })
}

/// Open a REST connection for resolved credentials.
pub fn connect(auth: &OrgAuth) -> Result<RestConnection> {
    RestConnection::new(&auth.instance_url, &auth.access_token, &auth.api_version)
}
