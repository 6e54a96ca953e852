use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier wrapper for homestay applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

impl ApplicationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Human readable number assigned on first submission, e.g. `HS/2026/000042`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationNumber(pub String);

impl ApplicationNumber {
    pub fn new(year: i32, sequence: u64) -> Self {
        Self(format!("HS/{year}/{sequence:06}"))
    }
}

/// Portal user reference (owner or officer).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Homestay classification driving the fee rate table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Diamond,
    Gold,
    Silver,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Diamond, Category::Gold, Category::Silver];

    pub const fn label(self) -> &'static str {
        match self {
            Category::Diamond => "diamond",
            Category::Gold => "gold",
            Category::Silver => "silver",
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "diamond" => Ok(Category::Diamond),
            "gold" => Ok(Category::Gold),
            "silver" => Ok(Category::Silver),
            other => Err(format!(
                "unknown category '{other}' (expected diamond, gold or silver)"
            )),
        }
    }
}

/// Portal roles. `System` is reserved for gateway reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    DistrictOfficer,
    DealingAssistant,
    Dtdo,
    StateOfficer,
    Admin,
    System,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::DistrictOfficer => "district_officer",
            Role::DealingAssistant => "dealing_assistant",
            Role::Dtdo => "dtdo",
            Role::StateOfficer => "state_officer",
            Role::Admin => "admin",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "owner" | "property_owner" => Ok(Role::Owner),
            "district_officer" => Ok(Role::DistrictOfficer),
            "dealing_assistant" | "da" => Ok(Role::DealingAssistant),
            "dtdo" | "district_tourism_officer" => Ok(Role::Dtdo),
            "state_officer" => Ok(Role::StateOfficer),
            "admin" | "super_admin" => Ok(Role::Admin),
            "system" => Ok(Role::System),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Authenticated caller performing an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: UserId(user_id.into()),
            role,
        }
    }

    pub fn system() -> Self {
        Self::new("system", Role::System)
    }
}

/// Canonical application status. `pending` is accepted as a legacy alias of `submitted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Draft,
    #[serde(alias = "pending")]
    Submitted,
    DistrictReview,
    UnderScrutiny,
    SentBackForCorrections,
    ForwardedToDtdo,
    DtdoReview,
    InspectionScheduled,
    InspectionCompleted,
    StateReview,
    PaymentPending,
    VerifiedForPayment,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 14] = [
        ApplicationStatus::Draft,
        ApplicationStatus::Submitted,
        ApplicationStatus::DistrictReview,
        ApplicationStatus::UnderScrutiny,
        ApplicationStatus::SentBackForCorrections,
        ApplicationStatus::ForwardedToDtdo,
        ApplicationStatus::DtdoReview,
        ApplicationStatus::InspectionScheduled,
        ApplicationStatus::InspectionCompleted,
        ApplicationStatus::StateReview,
        ApplicationStatus::PaymentPending,
        ApplicationStatus::VerifiedForPayment,
        ApplicationStatus::Approved,
        ApplicationStatus::Rejected,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::Draft => "draft",
            ApplicationStatus::Submitted => "submitted",
            ApplicationStatus::DistrictReview => "district_review",
            ApplicationStatus::UnderScrutiny => "under_scrutiny",
            ApplicationStatus::SentBackForCorrections => "sent_back_for_corrections",
            ApplicationStatus::ForwardedToDtdo => "forwarded_to_dtdo",
            ApplicationStatus::DtdoReview => "dtdo_review",
            ApplicationStatus::InspectionScheduled => "inspection_scheduled",
            ApplicationStatus::InspectionCompleted => "inspection_completed",
            ApplicationStatus::StateReview => "state_review",
            ApplicationStatus::PaymentPending => "payment_pending",
            ApplicationStatus::VerifiedForPayment => "verified_for_payment",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Approved | ApplicationStatus::Rejected
        )
    }

    /// Owners may only edit while the application is with them.
    pub const fn owner_editable(self) -> bool {
        matches!(
            self,
            ApplicationStatus::Draft | ApplicationStatus::SentBackForCorrections
        )
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        if normalized == "pending" {
            return Ok(ApplicationStatus::Submitted);
        }
        ApplicationStatus::ALL
            .into_iter()
            .find(|status| status.label() == normalized)
            .ok_or_else(|| format!("unknown status '{value}'"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountEligibility {
    #[serde(default)]
    pub female_owner: bool,
    #[serde(default)]
    pub special_region: bool,
}

/// Validated property classification captured from the owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDetails {
    pub property_name: String,
    pub category: Category,
    pub total_rooms: u32,
    pub validity_years: u32,
    pub eligibility: DiscountEligibility,
}

/// Owner supplied form data before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationForm {
    pub property_name: String,
    pub category: String,
    pub total_rooms: u32,
    pub validity_years: u32,
    #[serde(default)]
    pub female_owner: bool,
    #[serde(default)]
    pub special_region: bool,
    #[serde(default)]
    pub documents: Vec<DocumentUpload>,
}

/// Metadata for an uploaded file; the file itself lives in object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentUpload {
    pub document_type: String,
    pub file_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Verified,
    Rejected,
    NeedsCorrection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub document_type: String,
    pub file_path: String,
    pub status: DocumentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

impl Document {
    pub fn from_upload(upload: DocumentUpload) -> Self {
        Self {
            id: DocumentId(Uuid::new_v4().to_string()),
            document_type: upload.document_type,
            file_path: upload.file_path,
            status: DocumentStatus::Pending,
            remarks: None,
        }
    }
}

/// Officer note. Remarks are append-only and tagged with the review cycle they belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Remark {
    pub author: UserId,
    pub role: Role,
    pub text: String,
    pub cycle: u32,
    pub at: DateTime<Utc>,
}

/// DTDO instruction recorded when an application is accepted for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionOrder {
    pub scheduled_for: NaiveDate,
    pub inspector: String,
    pub ordered_by: UserId,
    pub cycle: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub number: String,
    pub issued_on: NaiveDate,
    pub valid_until: NaiveDate,
}
