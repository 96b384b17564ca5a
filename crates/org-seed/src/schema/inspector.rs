//! Run-scoped schema inspection over one connection.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::connection::{Connection, GlobalSObject};
use crate::error::Result;
use crate::schema::{ChildRelationship, DiscoveredGrandchild, ObjectDescriptor};

/// Platform child objects never offered as seedable children. Activities and
/// files are handled by their own pipeline stages; the rest are org-local
/// plumbing that cannot be carried across.
pub const CHILD_OBJECT_DENYLIST: &[&str] = &[
    "ActivityHistory",
    "OpenActivity",
    "Task",
    "Event",
    "ContentDocumentLink",
    "AttachedContentDocument",
    "CombinedAttachment",
    "EntitySubscription",
    "TopicAssignment",
    "RecentlyViewed",
];

/// Child objects whose name ends with one of these are platform side tables.
pub const CHILD_SUFFIX_DENYLIST: &[&str] = &[
    "__Feed",
    "__History",
    "__Share",
    "__ChangeEvent",
    "History",
    "Feed",
    "Share",
    "ChangeEvent",
];

/// Schema inspector for one org connection.
///
/// Describe results are cached for the lifetime of the inspector, one entry
/// per object, so repeated tiers touching the same object cost one round trip.
pub struct SchemaInspector {
    conn: Arc<dyn Connection>,
    describes: Mutex<HashMap<String, Arc<ObjectDescriptor>>>,
    global: Mutex<Option<Arc<Vec<GlobalSObject>>>>,
}

impl SchemaInspector {
    /// Create an inspector over a connection.
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self {
            conn,
            describes: Mutex::new(HashMap::new()),
            global: Mutex::new(None),
        }
    }

    /// Describe an object, using the run cache when possible.
    pub async fn describe_object(&self, object: &str) -> Result<Arc<ObjectDescriptor>> {
        if let Some(cached) = self.describes.lock().unwrap().get(object) {
            return Ok(Arc::clone(cached));
        }

        debug!("describing {}", object);
        let descriptor = Arc::new(self.conn.describe(object).await?);
        self.describes
            .lock()
            .unwrap()
            .insert(object.to_string(), Arc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Objects that are both queryable and createable, sorted by label.
    pub async fn list_insertable_objects(&self) -> Result<Arc<Vec<GlobalSObject>>> {
        if let Some(cached) = self.global.lock().unwrap().as_ref() {
            return Ok(Arc::clone(cached));
        }

        let mut objects: Vec<GlobalSObject> = self
            .conn
            .describe_global()
            .await?
            .into_iter()
            .filter(|o| o.queryable && o.createable)
            .collect();
        objects.sort_by(|a, b| a.label.cmp(&b.label));

        let objects = Arc::new(objects);
        *self.global.lock().unwrap() = Some(Arc::clone(&objects));
        Ok(objects)
    }

    /// Child relationships of an object that make sense to seed.
    ///
    /// Excludes the platform deny-list, side-table suffixes, children absent
    /// from the insertable global list, and relationships with no lookup
    /// field. Sorted by child object name.
    pub async fn discover_children(&self, object: &str) -> Result<Vec<ChildRelationship>> {
        let descriptor = self.describe_object(object).await?;
        let insertable: HashSet<String> = self
            .list_insertable_objects()
            .await?
            .iter()
            .map(|o| o.name.clone())
            .collect();

        let mut children: Vec<ChildRelationship> = descriptor
            .child_relationships
            .iter()
            .filter(|rel| child_passes_filters(rel, &insertable))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.child_s_object.cmp(&b.child_s_object));

        debug!("{}: {} seedable child relationship(s)", object, children.len());
        Ok(children)
    }

    /// Grandchild relationships for each declared child, skipping any object
    /// already in scope (the root or a declared child) to break cycles.
    pub async fn discover_grandchildren(
        &self,
        child_names: &[String],
        root: &str,
    ) -> Result<Vec<DiscoveredGrandchild>> {
        let mut in_scope: HashSet<&str> = child_names.iter().map(String::as_str).collect();
        in_scope.insert(root);

        let mut grandchildren = Vec::new();
        for child in child_names {
            for rel in self.discover_children(child).await? {
                if in_scope.contains(rel.child_s_object.as_str()) {
                    continue;
                }
                grandchildren.push(DiscoveredGrandchild {
                    parent_object: child.clone(),
                    relationship: rel,
                });
            }
        }
        Ok(grandchildren)
    }
}

/// Whether a child relationship survives the discovery filters.
fn child_passes_filters(rel: &ChildRelationship, insertable: &HashSet<String>) -> bool {
    let name = rel.child_s_object.as_str();
    if name.is_empty() || rel.field.is_none() {
        return false;
    }
    if CHILD_OBJECT_DENYLIST.contains(&name) {
        return false;
    }
    if CHILD_SUFFIX_DENYLIST.iter().any(|s| name.ends_with(s)) {
        return false;
    }
    insertable.contains(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rel(child: &str, field: Option<&str>) -> ChildRelationship {
        ChildRelationship {
            child_s_object: child.to_string(),
            field: field.map(str::to_string),
            cascade_delete: false,
        }
    }

    fn insertable(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_denylist_excludes_platform_children() {
        let set = insertable(&["Task", "Contact"]);
        assert!(!child_passes_filters(&rel("Task", Some("WhatId")), &set));
        assert!(child_passes_filters(&rel("Contact", Some("AccountId")), &set));
    }

    #[test]
    fn test_suffix_rules_exclude_side_tables() {
        let set = insertable(&[
            "AccountHistory",
            "Custom__Feed",
            "AccountShare",
            "ContactChangeEvent",
            "Contact",
        ]);
        assert!(!child_passes_filters(&rel("AccountHistory", Some("AccountId")), &set));
        assert!(!child_passes_filters(&rel("Custom__Feed", Some("ParentId")), &set));
        assert!(!child_passes_filters(&rel("AccountShare", Some("AccountId")), &set));
        assert!(!child_passes_filters(&rel("ContactChangeEvent", Some("ContactId")), &set));
        assert!(child_passes_filters(&rel("Contact", Some("AccountId")), &set));
    }

    #[test]
    fn test_missing_field_or_not_insertable_excluded() {
        let set = insertable(&["Contact"]);
        assert!(!child_passes_filters(&rel("Contact", None), &set));
        assert!(!child_passes_filters(&rel("Opportunity", Some("AccountId")), &set));
    }
}
