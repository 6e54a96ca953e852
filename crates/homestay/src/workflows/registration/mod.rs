//! Homestay registration: application intake, fee computation, the district and state review
//! workflow, inspection, payment and certificate issuance.
//!
//! The service owns every state change; the router is a thin HTTP layer over it, and the
//! repository and event publisher traits keep storage and notification swappable.

pub mod console;
pub mod domain;
pub mod fees;
pub mod inspection;
pub mod memory;
pub mod policy;
pub mod record;
pub mod repository;
pub mod requests;
pub mod router;
pub mod scrutiny;
pub mod seed;
pub mod service;
pub mod store;
pub mod transitions;

#[cfg(test)]
mod tests;

pub use domain::{
    Actor, ApplicationForm, ApplicationId, ApplicationNumber, ApplicationStatus, Category,
    DiscountEligibility, DocumentUpload, Role, UserId,
};
pub use fees::{FeeBreakdown, FeeCalculator, FeeError, FeeSchedule};
pub use inspection::{InspectionChecklist, InspectionFindings, InspectionRecommendation};
pub use memory::{InMemoryApplicationRepository, RecordingEventPublisher};
pub use policy::RegistrationPolicy;
pub use record::{ApplicationRecord, ApplicationView, TimelineEntry};
pub use repository::{
    ApplicationRepository, EventPublisher, PublishError, RepositoryError, WorkflowEvent,
};
pub use requests::{
    CreateApplication, DtdoAcceptRequest, FeePreviewRequest, ManualPaymentReport,
    PaymentDecision, PaymentVerdict, RemarksRequest, ReviewDecision, ReviewRequest,
    ScrutinyRequest, UpdateApplication,
};
pub use router::registration_router;
pub use service::{
    PaymentStart, ReconcileOutcome, RegistrationError, RegistrationService, ResetOperation,
    ResetSummary, SeedKind, SeedSummary,
};
pub use transitions::{Action, ReviewTier};
