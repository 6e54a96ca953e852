use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{NaiveDate, Utc};
use serde_json::Value;

use crate::payments::{
    GatewayError, GatewayKind, GatewaySettlement, PaymentGateway, PaymentGateways,
    PaymentInitiation, PaymentInstruction, PaymentRequest, Reconciliation, RetryPolicy,
};
use crate::workflows::registration::domain::{
    Actor, ApplicationForm, DocumentStatus, DocumentUpload, Role,
};
use crate::workflows::registration::fees::FeeCalculator;
use crate::workflows::registration::inspection::{
    InspectionChecklist, InspectionFindings, InspectionRecommendation,
};
use crate::workflows::registration::memory::{
    InMemoryApplicationRepository, RecordingEventPublisher,
};
use crate::workflows::registration::policy::RegistrationPolicy;
use crate::workflows::registration::record::ApplicationRecord;
use crate::workflows::registration::repository::{EventPublisher, PublishError, WorkflowEvent};
use crate::workflows::registration::requests::{
    CreateApplication, DtdoAcceptRequest, RemarksRequest, ScrutinyRequest,
};
use crate::workflows::registration::scrutiny::DocumentVerification;
use crate::workflows::registration::{registration_router, RegistrationService};

pub(super) type TestService =
    RegistrationService<InMemoryApplicationRepository, RecordingEventPublisher>;

pub(super) fn owner() -> Actor {
    Actor::new("owner-1", Role::Owner)
}

pub(super) fn other_owner() -> Actor {
    Actor::new("owner-2", Role::Owner)
}

pub(super) fn dealing_assistant() -> Actor {
    Actor::new("da-shimla", Role::DealingAssistant)
}

pub(super) fn district_officer() -> Actor {
    Actor::new("do-shimla", Role::DistrictOfficer)
}

pub(super) fn dtdo() -> Actor {
    Actor::new("dtdo-shimla", Role::Dtdo)
}

pub(super) fn state_officer() -> Actor {
    Actor::new("state-1", Role::StateOfficer)
}

pub(super) fn admin() -> Actor {
    Actor::new("admin-1", Role::Admin)
}

pub(super) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub(super) fn form(category: &str, rooms: u32, years: u32) -> ApplicationForm {
    ApplicationForm {
        property_name: "Cedar Ridge Homestay".to_string(),
        category: category.to_string(),
        total_rooms: rooms,
        validity_years: years,
        female_owner: false,
        special_region: false,
        documents: vec![
            DocumentUpload {
                document_type: "ownership_proof".to_string(),
                file_path: "uploads/owner-1/ownership.pdf".to_string(),
            },
            DocumentUpload {
                document_type: "fire_noc".to_string(),
                file_path: "uploads/owner-1/fire-noc.pdf".to_string(),
            },
        ],
    }
}

pub(super) fn policy() -> RegistrationPolicy {
    RegistrationPolicy {
        gateway_timeout: Duration::from_millis(200),
        reconcile_retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        },
        console_enabled: true,
        ..RegistrationPolicy::default()
    }
}

pub(super) fn build_service() -> (
    TestService,
    Arc<InMemoryApplicationRepository>,
    Arc<RecordingEventPublisher>,
) {
    build_service_with(PaymentGateways::new(), policy())
}

pub(super) fn build_service_with(
    gateways: PaymentGateways,
    policy: RegistrationPolicy,
) -> (
    TestService,
    Arc<InMemoryApplicationRepository>,
    Arc<RecordingEventPublisher>,
) {
    let repository = Arc::new(InMemoryApplicationRepository::default());
    let events = Arc::new(RecordingEventPublisher::default());
    let service = RegistrationService::new(
        repository.clone(),
        events.clone(),
        FeeCalculator::default(),
        policy,
    )
    .with_gateways(gateways);
    (service, repository, events)
}

pub(super) fn router_for(service: TestService) -> axum::Router {
    registration_router(Arc::new(service))
}

pub(super) fn findings(recommendation: InspectionRecommendation) -> InspectionFindings {
    let checklist = InspectionChecklist::standard();
    InspectionFindings {
        inspected_on: today(),
        mandatory: checklist
            .mandatory
            .iter()
            .map(|criterion| (criterion.clone(), true))
            .collect(),
        desirable: checklist
            .desirable
            .iter()
            .take(2)
            .map(|criterion| (criterion.clone(), true))
            .collect(),
        recommendation,
        remarks: Some("site visited with the owner".to_string()),
    }
}

pub(super) fn remarks(text: &str) -> RemarksRequest {
    RemarksRequest {
        remarks: Some(text.to_string()),
    }
}

/// Draft created and submitted by [`owner`].
pub(super) fn submitted(service: &TestService, category: &str, rooms: u32) -> ApplicationRecord {
    service
        .create(
            &owner(),
            CreateApplication {
                form: form(category, rooms, 1),
                submit: true,
            },
        )
        .expect("application submits")
}

/// Scrutinised with every document verified and forwarded to the DTDO.
pub(super) fn forwarded(service: &TestService, category: &str, rooms: u32) -> ApplicationRecord {
    let record = submitted(service, category, rooms);
    service
        .start_scrutiny(&dealing_assistant(), &record.id)
        .expect("scrutiny starts");
    let verifications = record
        .documents
        .iter()
        .map(|document| {
            (
                document.id.clone(),
                DocumentVerification {
                    status: DocumentStatus::Verified,
                    remarks: None,
                },
            )
        })
        .collect();
    service
        .forward_to_dtdo(
            &dealing_assistant(),
            &record.id,
            ScrutinyRequest {
                verifications,
                remarks: None,
            },
        )
        .expect("forwarded to dtdo")
}

pub(super) fn scheduled(service: &TestService, category: &str, rooms: u32) -> ApplicationRecord {
    let record = forwarded(service, category, rooms);
    service
        .dtdo_accept(
            &dtdo(),
            &record.id,
            DtdoAcceptRequest {
                remarks: Some("documents in order, inspection ordered".to_string()),
                inspection_date: today(),
                inspector: "Inspection team A".to_string(),
            },
        )
        .expect("inspection scheduled")
}

pub(super) fn inspected(
    service: &TestService,
    category: &str,
    rooms: u32,
    recommendation: InspectionRecommendation,
) -> ApplicationRecord {
    let record = scheduled(service, category, rooms);
    service
        .submit_inspection_report(&dtdo(), &record.id, findings(recommendation))
        .expect("inspection report filed")
}

/// District-tier application approved after inspection and waiting for the fee.
pub(super) fn payment_pending(
    service: &TestService,
    category: &str,
    rooms: u32,
) -> ApplicationRecord {
    let record = inspected(service, category, rooms, InspectionRecommendation::Approve);
    service
        .approve_inspection(&dtdo(), &record.id, RemarksRequest::default())
        .expect("inspection approved")
}

/// Gateway double: scripted reconciliation answers, optional initiation failure or delay.
pub(super) struct StubGateway {
    kind: GatewayKind,
    initiation_error: Mutex<Option<GatewayError>>,
    initiate_delay: Option<Duration>,
    settlements: Mutex<VecDeque<Result<GatewaySettlement, GatewayError>>>,
    references: AtomicUsize,
    reconcile_calls: AtomicUsize,
}

impl StubGateway {
    pub(super) fn new(kind: GatewayKind) -> Self {
        Self {
            kind,
            initiation_error: Mutex::new(None),
            initiate_delay: None,
            settlements: Mutex::new(VecDeque::new()),
            references: AtomicUsize::new(0),
            reconcile_calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn failing(kind: GatewayKind, error: GatewayError) -> Self {
        let gateway = Self::new(kind);
        *gateway
            .initiation_error
            .lock()
            .expect("stub mutex poisoned") = Some(error);
        gateway
    }

    pub(super) fn slow(kind: GatewayKind, delay: Duration) -> Self {
        Self {
            initiate_delay: Some(delay),
            ..Self::new(kind)
        }
    }

    pub(super) fn answer(&self, outcome: Result<GatewaySettlement, GatewayError>) {
        self.settlements
            .lock()
            .expect("stub mutex poisoned")
            .push_back(outcome);
    }

    pub(super) fn reconcile_calls(&self) -> usize {
        self.reconcile_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    fn kind(&self) -> GatewayKind {
        self.kind
    }

    async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentInitiation, GatewayError> {
        if let Some(delay) = self.initiate_delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self
            .initiation_error
            .lock()
            .expect("stub mutex poisoned")
            .clone();
        if let Some(error) = failure {
            return Err(error);
        }

        let sequence = self.references.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PaymentInitiation {
            external_ref: format!("STUB-{}-{sequence}", self.kind.label().to_uppercase()),
            instruction: PaymentInstruction::Redirect {
                url: format!("https://pay.example/checkout/{}", request.application_id),
            },
        })
    }

    async fn reconcile(&self, external_ref: &str) -> Result<Reconciliation, GatewayError> {
        self.reconcile_calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .settlements
            .lock()
            .expect("stub mutex poisoned")
            .pop_front()
            .unwrap_or(Ok(GatewaySettlement::Unpaid));
        next.map(|settlement| Reconciliation {
            external_ref: external_ref.to_string(),
            settlement,
        })
    }
}

pub(super) fn gateways_with(stub: Arc<StubGateway>) -> PaymentGateways {
    PaymentGateways::new().with(stub)
}

/// Publisher whose transport is always down.
#[derive(Default)]
pub(super) struct FailingPublisher;

impl EventPublisher for FailingPublisher {
    fn publish(&self, _event: WorkflowEvent) -> Result<(), PublishError> {
        Err(PublishError::Transport("broker offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
