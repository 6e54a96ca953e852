use std::collections::BTreeSet;
use std::time::Duration;

use super::domain::Category;
use super::inspection::InspectionChecklist;
use super::transitions::ReviewTier;
use crate::payments::RetryPolicy;

/// Deployment-specific knobs for the registration workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationPolicy {
    /// Categories whose approval needs state-level sign-off after inspection.
    pub state_review_categories: BTreeSet<Category>,
    pub checklist: InspectionChecklist,
    pub gateway_timeout: Duration,
    pub reconcile_retry: RetryPolicy,
    /// Initiated attempts older than this are expired by the sweep.
    pub payment_expiry: chrono::Duration,
    /// Read-only data console; only ever enabled in development and test.
    pub console_enabled: bool,
}

impl RegistrationPolicy {
    pub fn tier_for(&self, category: Category) -> ReviewTier {
        if self.state_review_categories.contains(&category) {
            ReviewTier::State
        } else {
            ReviewTier::District
        }
    }
}

impl Default for RegistrationPolicy {
    fn default() -> Self {
        Self {
            state_review_categories: BTreeSet::from([Category::Diamond]),
            checklist: InspectionChecklist::standard(),
            gateway_timeout: Duration::from_secs(20),
            reconcile_retry: RetryPolicy::default(),
            payment_expiry: chrono::Duration::minutes(30),
            console_enabled: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_configured_categories_need_state_review() {
        let policy = RegistrationPolicy::default();
        assert_eq!(policy.tier_for(Category::Diamond), ReviewTier::State);
        assert_eq!(policy.tier_for(Category::Gold), ReviewTier::District);
        assert_eq!(policy.tier_for(Category::Silver), ReviewTier::District);
    }
}
