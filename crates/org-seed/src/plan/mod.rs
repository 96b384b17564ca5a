//! Seed plan: what to copy, and how.

mod types;
mod validation;

pub use types::{ChildPlan, GrandchildPlan, RecordLimit, SeedPlan};

use crate::error::Result;

impl SeedPlan {
    /// Validate the plan.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}
