//! Seed plan validation.

use std::collections::HashSet;

use super::SeedPlan;
use crate::error::{Result, SeedError};
use crate::plan::RecordLimit;

/// Validate a seed plan before the pipeline runs it.
pub fn validate(plan: &SeedPlan) -> Result<()> {
    if plan.root_object.trim().is_empty() {
        return Err(SeedError::Plan("root object is required".into()));
    }
    if plan.record_limit == RecordLimit::Count(0) {
        return Err(SeedError::Plan("record count must be at least 1".into()));
    }
    if let Some(field) = &plan.root_external_id_field {
        if field.trim().is_empty() {
            return Err(SeedError::Plan("root external-id field must not be blank".into()));
        }
    }

    let mut seen_children = HashSet::new();
    for child in &plan.children {
        if child.object.trim().is_empty() {
            return Err(SeedError::Plan("child object name must not be blank".into()));
        }
        if child.parent_lookup_field.trim().is_empty() {
            return Err(SeedError::Plan(format!(
                "child {} has no parent lookup field",
                child.object
            )));
        }
        if child.object == plan.root_object {
            return Err(SeedError::Plan(format!(
                "child {} duplicates the root object",
                child.object
            )));
        }
        if !seen_children.insert(child.object.clone()) {
            return Err(SeedError::Plan(format!(
                "child {} is declared more than once",
                child.object
            )));
        }
    }

    for child in &plan.children {
        let mut seen_grandchildren = HashSet::new();
        for gc in &child.grandchildren {
            if gc.object.trim().is_empty() {
                return Err(SeedError::Plan("grandchild object name must not be blank".into()));
            }
            if gc.parent_lookup_field.trim().is_empty() {
                return Err(SeedError::Plan(format!(
                    "grandchild {} has no parent lookup field",
                    gc.object
                )));
            }
            // An object already seeded as root or child would cycle.
            if gc.object == plan.root_object || seen_children.contains(&gc.object) {
                return Err(SeedError::Plan(format!(
                    "grandchild {} is already in scope as root or child",
                    gc.object
                )));
            }
            if !seen_grandchildren.insert(gc.object.clone()) {
                return Err(SeedError::Plan(format!(
                    "grandchild {} is declared more than once under {}",
                    gc.object, child.object
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{ChildPlan, GrandchildPlan};

    fn child(object: &str, field: &str) -> ChildPlan {
        ChildPlan {
            object: object.to_string(),
            parent_lookup_field: field.to_string(),
            external_id_field: None,
            grandchildren: Vec::new(),
        }
    }

    fn valid_plan() -> SeedPlan {
        let mut plan = SeedPlan::for_root("Account");
        plan.children = vec![child("Contact", "AccountId"), child("Opportunity", "AccountId")];
        plan
    }

    #[test]
    fn test_valid_plan() {
        assert!(validate(&valid_plan()).is_ok());
    }

    #[test]
    fn test_empty_root_rejected() {
        let plan = SeedPlan::for_root("  ");
        assert!(validate(&plan).is_err());
    }

    #[test]
    fn test_duplicate_child_rejected() {
        let mut plan = valid_plan();
        plan.children.push(child("Contact", "AccountId"));
        assert!(validate(&plan).is_err());
    }

    #[test]
    fn test_child_matching_root_rejected() {
        let mut plan = valid_plan();
        plan.children.push(child("Account", "ParentId"));
        assert!(validate(&plan).is_err());
    }

    #[test]
    fn test_grandchild_cycle_rejected() {
        let mut plan = valid_plan();
        plan.children[0].grandchildren.push(GrandchildPlan {
            object: "Account".to_string(),
            parent_lookup_field: "AccountId".to_string(),
            external_id_field: None,
        });
        assert!(validate(&plan).is_err());
    }

    #[test]
    fn test_blank_parent_field_rejected() {
        let mut plan = valid_plan();
        plan.children[0].parent_lookup_field = String::new();
        assert!(validate(&plan).is_err());
    }
}
