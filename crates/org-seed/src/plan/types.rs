//! Seed plan type definitions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How many root records to seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordLimit {
    /// Every record the root query matches.
    All,

    /// At most this many records (positive).
    Count(usize),
}

impl Default for RecordLimit {
    fn default() -> Self {
        RecordLimit::Count(10)
    }
}

impl FromStr for RecordLimit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("all") {
            return Ok(RecordLimit::All);
        }
        match s.parse::<usize>() {
            Ok(0) => Err("count must be a positive integer".to_string()),
            Ok(n) => Ok(RecordLimit::Count(n)),
            Err(_) => Err(format!("expected a positive integer or 'All', got '{}'", s)),
        }
    }
}

impl fmt::Display for RecordLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordLimit::All => write!(f, "All"),
            RecordLimit::Count(n) => write!(f, "{}", n),
        }
    }
}

/// The operator's description of one seeding run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedPlan {
    /// Root object to seed.
    pub root_object: String,

    /// External-id field for upserting root records instead of inserting.
    #[serde(default)]
    pub root_external_id_field: Option<String>,

    /// Child tiers, in the order they will be seeded.
    #[serde(default)]
    pub children: Vec<ChildPlan>,

    /// Seed Task records attached to anything in scope.
    #[serde(default)]
    pub include_tasks: bool,

    /// Seed Event records attached to anything in scope.
    #[serde(default)]
    pub include_events: bool,

    /// Transfer files linked to anything in scope.
    #[serde(default)]
    pub include_files: bool,

    /// Perform all reads and classification but no writes.
    #[serde(default)]
    pub dry_run: bool,

    /// How many root records to pull.
    #[serde(default)]
    pub record_limit: RecordLimit,

    /// Optional WHERE clause applied to the root query.
    #[serde(default)]
    pub where_clause: Option<String>,
}

impl SeedPlan {
    /// A plan seeding only the root object with defaults.
    pub fn for_root(root_object: impl Into<String>) -> Self {
        Self {
            root_object: root_object.into(),
            root_external_id_field: None,
            children: Vec::new(),
            include_tasks: false,
            include_events: false,
            include_files: false,
            dry_run: false,
            record_limit: RecordLimit::default(),
            where_clause: None,
        }
    }
}

/// One child tier of the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildPlan {
    /// Child object API name.
    pub object: String,

    /// The field on the child referencing the root.
    pub parent_lookup_field: String,

    /// External-id field for upserting instead of inserting.
    #[serde(default)]
    pub external_id_field: Option<String>,

    /// Grandchild tiers parented by this child.
    #[serde(default)]
    pub grandchildren: Vec<GrandchildPlan>,
}

/// One grandchild tier of the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrandchildPlan {
    /// Grandchild object API name.
    pub object: String,

    /// The field on the grandchild referencing its parent child object.
    pub parent_lookup_field: String,

    /// External-id field for upserting instead of inserting.
    #[serde(default)]
    pub external_id_field: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_limit_parsing() {
        assert_eq!("All".parse::<RecordLimit>().unwrap(), RecordLimit::All);
        assert_eq!("all".parse::<RecordLimit>().unwrap(), RecordLimit::All);
        assert_eq!("25".parse::<RecordLimit>().unwrap(), RecordLimit::Count(25));
        assert!("0".parse::<RecordLimit>().is_err());
        assert!("-3".parse::<RecordLimit>().is_err());
        assert!("ten".parse::<RecordLimit>().is_err());
    }

    #[test]
    fn test_record_limit_default_is_ten() {
        assert_eq!(RecordLimit::default(), RecordLimit::Count(10));
    }
}
