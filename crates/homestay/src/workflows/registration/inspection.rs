use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::UserId;
use super::fees::round_money;

/// Criteria the inspecting team must answer, configured per scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionChecklist {
    pub mandatory: Vec<String>,
    pub desirable: Vec<String>,
}

impl InspectionChecklist {
    pub fn standard() -> Self {
        let mandatory = [
            "valid_ownership_documents",
            "fire_safety_equipment",
            "clean_drinking_water",
            "sanitation_and_hygiene",
            "adequate_ventilation_and_lighting",
            "guest_register_maintained",
            "first_aid_kit",
        ];
        let desirable = [
            "local_cuisine_offered",
            "parking_available",
            "internet_connectivity",
            "waste_segregation",
            "rainwater_harvesting",
        ];

        Self {
            mandatory: mandatory.iter().map(|item| item.to_string()).collect(),
            desirable: desirable.iter().map(|item| item.to_string()).collect(),
        }
    }

    /// Validate findings against the checklist and derive the report.
    pub fn evaluate(
        &self,
        findings: InspectionFindings,
        submitted_by: UserId,
        submitted_at: DateTime<Utc>,
        cycle: u32,
    ) -> Result<InspectionReport, InspectionError> {
        let missing: Vec<String> = self
            .mandatory
            .iter()
            .filter(|criterion| !findings.mandatory.contains_key(*criterion))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(InspectionError::MissingMandatory(missing));
        }

        if let Some(unknown) = findings
            .mandatory
            .keys()
            .find(|key| !self.mandatory.contains(key))
            .or_else(|| {
                findings
                    .desirable
                    .keys()
                    .find(|key| !self.desirable.contains(key))
            })
        {
            return Err(InspectionError::UnknownCriterion(unknown.clone()));
        }

        let mandatory_met = findings.mandatory.values().all(|passed| *passed);
        if findings.recommendation == InspectionRecommendation::Approve && !mandatory_met {
            return Err(InspectionError::ApprovalWithFailedMandatory);
        }

        let answered = findings.mandatory.len() + findings.desirable.len();
        let satisfied = findings
            .mandatory
            .values()
            .chain(findings.desirable.values())
            .filter(|passed| **passed)
            .count();
        let compliance_percent = if answered == 0 {
            round_money(Decimal::ZERO)
        } else {
            round_money(
                Decimal::from(satisfied as u64) * Decimal::ONE_HUNDRED
                    / Decimal::from(answered as u64),
            )
        };

        Ok(InspectionReport {
            cycle,
            inspected_on: findings.inspected_on,
            submitted_by,
            submitted_at,
            mandatory: findings.mandatory,
            desirable: findings.desirable,
            recommendation: findings.recommendation,
            mandatory_met,
            compliance_percent,
            remarks: findings
                .remarks
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty()),
        })
    }
}

impl Default for InspectionChecklist {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionRecommendation {
    Approve,
    Reject,
    RaiseObjections,
}

/// Payload submitted after a site visit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionFindings {
    pub inspected_on: NaiveDate,
    pub mandatory: BTreeMap<String, bool>,
    #[serde(default)]
    pub desirable: BTreeMap<String, bool>,
    pub recommendation: InspectionRecommendation,
    #[serde(default)]
    pub remarks: Option<String>,
}

/// Immutable record of one inspection cycle. The last report on an application is the active one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionReport {
    pub cycle: u32,
    pub inspected_on: NaiveDate,
    pub submitted_by: UserId,
    pub submitted_at: DateTime<Utc>,
    pub mandatory: BTreeMap<String, bool>,
    pub desirable: BTreeMap<String, bool>,
    pub recommendation: InspectionRecommendation,
    pub mandatory_met: bool,
    pub compliance_percent: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InspectionError {
    #[error("inspection report is missing mandatory criteria: {}", .0.join(", "))]
    MissingMandatory(Vec<String>),
    #[error("'{0}' is not an inspection checklist criterion")]
    UnknownCriterion(String),
    #[error("approval cannot be recommended while a mandatory criterion failed")]
    ApprovalWithFailedMandatory,
}
