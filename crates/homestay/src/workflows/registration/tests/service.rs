use super::common::*;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;

use chrono::Days;
use rust_decimal::Decimal;

use crate::payments::PaymentGateways;
use crate::workflows::registration::domain::{
    ApplicationId, ApplicationStatus, DocumentStatus, DocumentUpload, Role,
};
use crate::workflows::registration::fees::FeeCalculator;
use crate::workflows::registration::inspection::InspectionRecommendation;
use crate::workflows::registration::memory::InMemoryApplicationRepository;
use crate::workflows::registration::policy::RegistrationPolicy;
use crate::workflows::registration::record::{ApplicationRecord, ApplicationView};
use crate::workflows::registration::repository::ApplicationRepository;
use crate::workflows::registration::requests::{
    CreateApplication, DtdoAcceptRequest, ListQuery, ManualPaymentReport, RemarksRequest,
    ReviewDecision, ReviewRequest, ScrutinyRequest, UpdateApplication,
};
use crate::workflows::registration::scrutiny::DocumentVerification;
use crate::workflows::registration::transitions::Action;
use crate::workflows::registration::{RegistrationError, RegistrationService};

fn money(raw: &str) -> Decimal {
    Decimal::from_str(raw).expect("valid decimal")
}

#[test]
fn create_is_reserved_for_owners() {
    let (service, repository, _) = build_service();

    let result = service.create(
        &dealing_assistant(),
        CreateApplication {
            form: form("silver", 4, 1),
            submit: false,
        },
    );

    assert!(matches!(result, Err(RegistrationError::Authorization(_))));
    assert!(repository.is_empty());
}

#[test]
fn create_reports_the_offending_field() {
    let (service, _, _) = build_service();

    let mut bad_rooms = form("gold", 0, 1);
    bad_rooms.property_name = "Hill Crest".to_string();
    match service.create(
        &owner(),
        CreateApplication {
            form: bad_rooms,
            submit: false,
        },
    ) {
        Err(RegistrationError::Validation { field, .. }) => assert_eq!(field, "total_rooms"),
        other => panic!("expected validation error, got {other:?}"),
    }

    match service.create(
        &owner(),
        CreateApplication {
            form: form("platinum", 4, 1),
            submit: false,
        },
    ) {
        Err(RegistrationError::Validation { field, .. }) => assert_eq!(field, "category"),
        other => panic!("expected validation error, got {other:?}"),
    }

    let mut unnamed = form("gold", 4, 1);
    unnamed.property_name = "   ".to_string();
    match service.create(
        &owner(),
        CreateApplication {
            form: unnamed,
            submit: false,
        },
    ) {
        Err(RegistrationError::Validation { field, .. }) => assert_eq!(field, "property_name"),
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn submit_assigns_number_and_locks_server_computed_fee() {
    let (service, _, events) = build_service();

    let record = submitted(&service, "silver", 4);

    assert_eq!(record.status, ApplicationStatus::Submitted);
    assert_eq!(record.review_cycle, 1);
    let number = record.number.expect("number assigned").0;
    assert!(number.starts_with("HS/"), "unexpected number {number}");
    assert!(number.ends_with("/000001"), "unexpected number {number}");
    let fee = record.fee.expect("fee locked");
    assert_eq!(fee.total_fee, money("3304.00"));
    assert!(record.submitted_at.is_some());

    let actions: Vec<Action> = events.events().iter().map(|event| event.action).collect();
    assert_eq!(actions, vec![Action::UpdateDraft, Action::Submit]);
}

#[test]
fn owner_update_recomputes_the_fee() {
    let (service, _, _) = build_service();
    let draft = service
        .create(
            &owner(),
            CreateApplication {
                form: form("silver", 4, 1),
                submit: false,
            },
        )
        .expect("draft created");

    let updated = service
        .update(
            &owner(),
            &draft.id,
            UpdateApplication {
                total_rooms: Some(6),
                category: Some("gold".to_string()),
                submit: true,
                ..UpdateApplication::default()
            },
        )
        .expect("draft updated and submitted");

    assert_eq!(updated.status, ApplicationStatus::Submitted);
    assert_eq!(updated.property.total_rooms, 6);
    assert_eq!(
        updated.fee.expect("fee").total_fee,
        money("5664.00")
    );
}

#[test]
fn owners_only_see_their_own_applications() {
    let (service, _, _) = build_service();
    let record = submitted(&service, "silver", 4);

    let result = service.get(&other_owner(), &record.id);
    assert!(matches!(result, Err(RegistrationError::Authorization(_))));

    let listed = service
        .list(&other_owner(), &ListQuery::default())
        .expect("list succeeds");
    assert!(listed.is_empty());

    let fetched = service.get(&dtdo(), &record.id).expect("officers can read");
    assert_eq!(fetched.id, record.id);
}

#[test]
fn missing_application_is_not_found() {
    let (service, _, _) = build_service();
    let result = service.get(&dtdo(), &ApplicationId("missing".to_string()));
    assert!(matches!(result, Err(RegistrationError::NotFound(_))));
}

#[test]
fn officer_listing_defaults_to_work_queue() {
    let (service, _, _) = build_service();
    let queued = submitted(&service, "silver", 4);
    let draft = service
        .create(
            &owner(),
            CreateApplication {
                form: form("gold", 4, 1),
                submit: false,
            },
        )
        .expect("draft");

    let queue = service
        .list(&dealing_assistant(), &ListQuery::default())
        .expect("queue");
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].id, queued.id);

    let drafts = service
        .list(
            &dealing_assistant(),
            &ListQuery {
                status: Some("draft".to_string()),
            },
        )
        .expect("filtered");
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].id, draft.id);

    let legacy = service
        .list(
            &district_officer(),
            &ListQuery {
                status: Some("pending".to_string()),
            },
        )
        .expect("legacy alias accepted");
    assert_eq!(legacy.len(), 1);
    assert_eq!(legacy[0].status, ApplicationStatus::Submitted);

    let invalid = service.list(
        &district_officer(),
        &ListQuery {
            status: Some("archived".to_string()),
        },
    );
    assert!(matches!(
        invalid,
        Err(RegistrationError::Validation { ref field, .. }) if field == "status"
    ));
}

#[test]
fn dtdo_reject_without_remarks_keeps_status() {
    let (service, repository, _) = build_service();
    let record = forwarded(&service, "silver", 4);

    let result = service.dtdo_reject(&dtdo(), &record.id, remarks("   "));

    match result {
        Err(RegistrationError::Validation { field, .. }) => assert_eq!(field, "remarks"),
        other => panic!("expected remarks validation, got {other:?}"),
    }
    let stored = repository
        .fetch(&record.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.status, ApplicationStatus::ForwardedToDtdo);
    assert_eq!(stored.version, record.version);
}

#[test]
fn wrong_role_is_refused_before_remarks_are_checked() {
    let (service, _, _) = build_service();
    let record = forwarded(&service, "silver", 4);

    let result = service.dtdo_reject(&dealing_assistant(), &record.id, RemarksRequest::default());
    assert!(matches!(result, Err(RegistrationError::Authorization(_))));

    let result = service.start_scrutiny(&owner(), &record.id);
    assert!(matches!(result, Err(RegistrationError::Conflict(_))));
}

#[test]
fn other_owners_cannot_submit() {
    let (service, _, _) = build_service();
    let draft = service
        .create(
            &owner(),
            CreateApplication {
                form: form("silver", 4, 1),
                submit: false,
            },
        )
        .expect("draft");

    let result = service.submit(&other_owner(), &draft.id);
    assert!(matches!(result, Err(RegistrationError::Authorization(_))));
}

#[test]
fn generic_review_follows_the_table() {
    let (service, _, _) = build_service();
    let record = submitted(&service, "gold", 4);

    let started = service
        .review(
            &district_officer(),
            &record.id,
            ReviewRequest {
                decision: ReviewDecision::Start,
                remarks: None,
            },
        )
        .expect("review started");
    assert_eq!(started.status, ApplicationStatus::DistrictReview);

    let approved = service
        .review(
            &district_officer(),
            &record.id,
            ReviewRequest {
                decision: ReviewDecision::Approve,
                remarks: None,
            },
        )
        .expect("approved to dtdo");
    assert_eq!(approved.status, ApplicationStatus::ForwardedToDtdo);

    let again = service.review(
        &district_officer(),
        &record.id,
        ReviewRequest {
            decision: ReviewDecision::Approve,
            remarks: None,
        },
    );
    assert!(matches!(again, Err(RegistrationError::Conflict(_))));
}

#[test]
fn dtdo_decisions_cannot_skip_their_own_checks() {
    let (service, repository, _) = build_service();
    let unfavourable = inspected(&service, "silver", 4, InspectionRecommendation::Reject);
    let waiting = forwarded(&service, "gold", 5);

    let approve = service.review(
        &dtdo(),
        &unfavourable.id,
        ReviewRequest {
            decision: ReviewDecision::Approve,
            remarks: None,
        },
    );
    assert!(matches!(approve, Err(RegistrationError::Authorization(_))));
    let direct = service.approve_inspection(&dtdo(), &unfavourable.id, RemarksRequest::default());
    assert!(matches!(
        direct,
        Err(RegistrationError::Validation { ref field, .. }) if field == "inspection"
    ));

    let accept = service.review(
        &dtdo(),
        &waiting.id,
        ReviewRequest {
            decision: ReviewDecision::Accept,
            remarks: Some("site visit".to_string()),
        },
    );
    assert!(matches!(accept, Err(RegistrationError::Authorization(_))));

    let scrutiny = service.review(
        &dealing_assistant(),
        &submitted(&service, "silver", 3).id,
        ReviewRequest {
            decision: ReviewDecision::Accept,
            remarks: None,
        },
    );
    assert!(matches!(scrutiny, Err(RegistrationError::Authorization(_))));

    let stored = repository
        .fetch(&unfavourable.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.status, ApplicationStatus::InspectionCompleted);
    let stored = repository.fetch(&waiting.id).expect("fetch").expect("present");
    assert_eq!(stored.status, ApplicationStatus::ForwardedToDtdo);
    assert!(stored.inspection.is_none());
}

#[test]
fn terminal_applications_refuse_every_action() {
    let (service, _, _) = build_service();
    let record = forwarded(&service, "silver", 4);
    service
        .dtdo_reject(&dtdo(), &record.id, remarks("fire safety certificate forged"))
        .expect("rejected");

    let result = service.dtdo_revert(&dtdo(), &record.id, remarks("reconsidered"));
    assert!(matches!(result, Err(RegistrationError::Conflict(_))));
}

#[test]
fn forwarding_carries_unresolved_documents() {
    let (service, _, _) = build_service();
    let record = submitted(&service, "silver", 4);
    service
        .start_scrutiny(&dealing_assistant(), &record.id)
        .expect("scrutiny");

    let flagged = record.documents[1].id.clone();
    let verifications = [
        (
            record.documents[0].id.clone(),
            DocumentVerification {
                status: DocumentStatus::Verified,
                remarks: None,
            },
        ),
        (
            flagged.clone(),
            DocumentVerification {
                status: DocumentStatus::NeedsCorrection,
                remarks: Some("certificate expired".to_string()),
            },
        ),
    ]
    .into_iter()
    .collect();

    let forwarded = service
        .forward_to_dtdo(
            &dealing_assistant(),
            &record.id,
            ScrutinyRequest {
                verifications,
                remarks: Some("fire NOC needs renewal".to_string()),
            },
        )
        .expect("forwarded");

    assert_eq!(forwarded.status, ApplicationStatus::ForwardedToDtdo);
    assert_eq!(forwarded.carried_over_documents, vec![flagged]);
    let view = forwarded.view_for(Role::Dtdo);
    assert_eq!(view.scrutiny.verified, 1);
    assert_eq!(view.scrutiny.percent_complete, money("100.00"));
}

#[test]
fn rejecting_a_document_requires_remarks() {
    let (service, _, _) = build_service();
    let record = submitted(&service, "silver", 4);
    service
        .start_scrutiny(&dealing_assistant(), &record.id)
        .expect("scrutiny");

    let verifications = [(
        record.documents[0].id.clone(),
        DocumentVerification {
            status: DocumentStatus::Rejected,
            remarks: None,
        },
    )]
    .into_iter()
    .collect();
    let result = service.save_scrutiny(
        &dealing_assistant(),
        &record.id,
        ScrutinyRequest {
            verifications,
            remarks: None,
        },
    );

    assert!(matches!(
        result,
        Err(RegistrationError::Validation { ref field, .. }) if field == "verifications"
    ));
}

#[test]
fn send_back_and_resubmit_opens_a_new_cycle() {
    let (service, _, _) = build_service();
    let record = submitted(&service, "silver", 4);
    let number = record.number.clone();
    service
        .start_scrutiny(&dealing_assistant(), &record.id)
        .expect("scrutiny");
    let sent_back = service
        .send_back(
            &dealing_assistant(),
            &record.id,
            remarks("ownership proof is illegible"),
        )
        .expect("sent back");
    assert_eq!(sent_back.status, ApplicationStatus::SentBackForCorrections);

    let resubmitted = service
        .update(
            &owner(),
            &record.id,
            UpdateApplication {
                documents: vec![DocumentUpload {
                    document_type: "ownership_proof".to_string(),
                    file_path: "uploads/owner-1/ownership-v2.pdf".to_string(),
                }],
                submit: true,
                ..UpdateApplication::default()
            },
        )
        .expect("resubmitted");

    assert_eq!(resubmitted.status, ApplicationStatus::Submitted);
    assert_eq!(resubmitted.review_cycle, 2);
    assert_eq!(resubmitted.number, number);
    assert_eq!(resubmitted.documents.len(), 2);
    assert_eq!(
        resubmitted.documents[0].file_path,
        "uploads/owner-1/ownership-v2.pdf"
    );
    assert_eq!(resubmitted.remarks.len(), 1);
    assert_eq!(resubmitted.remarks[0].cycle, 1);
}

#[test]
fn inspection_cannot_be_scheduled_in_the_past() {
    let (service, _, _) = build_service();
    let record = forwarded(&service, "silver", 4);
    let yesterday = today()
        .checked_sub_days(Days::new(1))
        .expect("valid date");

    let result = service.dtdo_accept(
        &dtdo(),
        &record.id,
        DtdoAcceptRequest {
            remarks: Some("inspect".to_string()),
            inspection_date: yesterday,
            inspector: "Team B".to_string(),
        },
    );

    assert!(matches!(
        result,
        Err(RegistrationError::Validation { ref field, .. }) if field == "inspection_date"
    ));
}

#[test]
fn inspection_report_must_answer_every_mandatory_item() {
    let (service, _, _) = build_service();
    let record = scheduled(&service, "silver", 4);
    let mut incomplete = findings(InspectionRecommendation::Approve);
    incomplete.mandatory.remove("first_aid_kit");

    let result = service.submit_inspection_report(&dtdo(), &record.id, incomplete);

    assert!(matches!(
        result,
        Err(RegistrationError::Validation { ref field, .. }) if field == "mandatory"
    ));
}

#[test]
fn approval_needs_a_supporting_report() {
    let (service, _, _) = build_service();
    let record = inspected(&service, "silver", 4, InspectionRecommendation::Reject);

    let result = service.approve_inspection(&dtdo(), &record.id, RemarksRequest::default());
    assert!(matches!(
        result,
        Err(RegistrationError::Validation { ref field, .. }) if field == "inspection"
    ));

    let rejected = service
        .reject_inspection(&dtdo(), &record.id, remarks("no fire extinguishers"))
        .expect("rejected");
    assert_eq!(rejected.status, ApplicationStatus::Rejected);
}

#[test]
fn district_tier_goes_straight_to_payment() {
    let (service, _, _) = build_service();
    let record = payment_pending(&service, "gold", 4);
    assert_eq!(record.status, ApplicationStatus::PaymentPending);
    let report = record.active_inspection_report().expect("active report");
    assert!(report.mandatory_met);
    assert_eq!(report.compliance_percent, money("100.00"));
}

#[test]
fn diamond_applications_need_state_sign_off() {
    let (service, _, _) = build_service();
    let record = inspected(&service, "diamond", 10, InspectionRecommendation::Approve);

    let escalated = service
        .approve_inspection(&dtdo(), &record.id, RemarksRequest::default())
        .expect("escalated");
    assert_eq!(escalated.status, ApplicationStatus::StateReview);

    let refused = service.review(
        &dtdo(),
        &record.id,
        ReviewRequest {
            decision: ReviewDecision::Approve,
            remarks: None,
        },
    );
    assert!(matches!(refused, Err(RegistrationError::Authorization(_))));

    let approved = service
        .review(
            &state_officer(),
            &record.id,
            ReviewRequest {
                decision: ReviewDecision::Approve,
                remarks: Some("meets diamond standards".to_string()),
            },
        )
        .expect("state approval");
    assert_eq!(approved.status, ApplicationStatus::PaymentPending);
}

#[test]
fn objections_start_a_new_review_cycle() {
    let (service, _, _) = build_service();
    let record = inspected(&service, "silver", 4, InspectionRecommendation::RaiseObjections);

    let objected = service
        .raise_objections(&dtdo(), &record.id, remarks("kitchen hygiene below standard"))
        .expect("objections raised");
    assert_eq!(objected.status, ApplicationStatus::SentBackForCorrections);

    let resubmitted = service
        .submit(&owner(), &record.id)
        .expect("resubmitted");
    assert_eq!(resubmitted.review_cycle, 2);
    assert!(resubmitted.inspection.is_none());
    assert!(resubmitted.active_inspection_report().is_none());
    assert_eq!(resubmitted.inspection_reports.len(), 1);
}

#[test]
fn objections_require_a_completed_inspection() {
    let (service, _, _) = build_service();
    let record = scheduled(&service, "silver", 4);

    let result = service.raise_objections(&dtdo(), &record.id, remarks("not yet"));
    assert!(matches!(result, Err(RegistrationError::Conflict(_))));
}

#[test]
fn concurrent_approvals_advance_once() {
    let (service, repository, _) = build_service();
    let record = inspected(&service, "gold", 4, InspectionRecommendation::Approve);
    let service = Arc::new(service);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            let id = record.id.clone();
            thread::spawn(move || {
                service.approve_inspection(&dtdo(), &id, RemarksRequest::default())
            })
        })
        .collect();
    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("thread completes"))
        .collect();

    let successes = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(results
        .iter()
        .filter_map(|result| result.as_ref().err())
        .all(|error| matches!(error, RegistrationError::Conflict(_))));

    let stored = repository
        .fetch(&record.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.status, ApplicationStatus::PaymentPending);
    assert_eq!(stored.version, record.version + 1);
    let approvals = stored
        .timeline
        .iter()
        .filter(|entry| entry.action == Action::Approve)
        .count();
    assert_eq!(approvals, 1);
}

#[test]
fn publisher_failure_does_not_roll_back() {
    let repository = Arc::new(InMemoryApplicationRepository::default());
    let service = RegistrationService::new(
        repository.clone(),
        Arc::new(FailingPublisher),
        FeeCalculator::default(),
        RegistrationPolicy::default(),
    );

    let record = service
        .create(
            &owner(),
            CreateApplication {
                form: form("silver", 4, 1),
                submit: true,
            },
        )
        .expect("committed despite publisher outage");

    let stored = repository
        .fetch(&record.id)
        .expect("fetch")
        .expect("present");
    assert_eq!(stored.status, ApplicationStatus::Submitted);
}

#[test]
fn timeline_and_version_track_every_commit() {
    let (service, _, events) = build_service();
    let record = forwarded(&service, "silver", 4);

    let transitions: Vec<(ApplicationStatus, ApplicationStatus)> = record
        .timeline
        .iter()
        .map(|entry| (entry.from, entry.to))
        .collect();
    assert_eq!(
        transitions,
        vec![
            (ApplicationStatus::Draft, ApplicationStatus::Draft),
            (ApplicationStatus::Draft, ApplicationStatus::Submitted),
            (ApplicationStatus::Submitted, ApplicationStatus::UnderScrutiny),
            (ApplicationStatus::UnderScrutiny, ApplicationStatus::ForwardedToDtdo),
        ]
    );
    assert_eq!(record.version, 3);
    let last = events.events().pop().expect("event published");
    assert_eq!(last.version, record.version);
    assert_eq!(last.to, ApplicationStatus::ForwardedToDtdo);
}

#[test]
fn stored_records_survive_a_json_round_trip() {
    let (service, _, _) = build_service();
    let record = payment_pending(&service, "silver", 4);

    let encoded = serde_json::to_string(&record).expect("serialize");
    let decoded: ApplicationRecord = serde_json::from_str(&encoded).expect("deserialize");
    assert_eq!(decoded, record);
}

#[test]
fn application_views_survive_the_wire_format() {
    let (service, _, _) = build_service();
    let record = payment_pending(&service, "gold", 6);
    let record = service
        .report_manual_payment(
            &owner(),
            &record.id,
            ManualPaymentReport {
                transaction_ref: "UTR-WIRE-1".to_string(),
                amount: money("5664.00"),
            },
        )
        .expect("reported");
    let view = record.view_for(Role::Dtdo);

    let encoded = serde_json::to_value(&view).expect("serialize");
    assert_eq!(encoded["fee"]["total_fee"], "5664.00");
    assert_eq!(encoded["payments"][0]["outcome"], "awaiting_confirmation");
    assert!(encoded["last_transition_at"].is_string());

    let decoded: ApplicationView = serde_json::from_value(encoded).expect("deserialize");
    assert_eq!(decoded, view);
    assert_eq!(decoded.last_transition_at, record.last_transition_at);
    let fee = decoded.fee.expect("fee");
    assert_eq!(fee.total_fee, money("5664.00"));
    assert_eq!(fee.total_fee.scale(), 2);
}

#[test]
fn views_list_only_actions_for_the_caller() {
    let (service, _, _) = build_service();
    let record = forwarded(&service, "silver", 4);

    let dtdo_view = record.view_for(Role::Dtdo);
    assert!(dtdo_view.available_actions.contains(&Action::Accept));
    assert!(dtdo_view.available_actions.contains(&Action::Reject));
    assert!(record.view_for(Role::Owner).available_actions.is_empty());
}

#[test]
fn custom_policy_moves_gold_to_state_review() {
    let policy = RegistrationPolicy {
        state_review_categories: [
            crate::workflows::registration::domain::Category::Diamond,
            crate::workflows::registration::domain::Category::Gold,
        ]
        .into_iter()
        .collect(),
        ..policy()
    };
    let (service, _, _) = build_service_with(PaymentGateways::new(), policy);
    let record = inspected(&service, "gold", 4, InspectionRecommendation::Approve);

    let escalated = service
        .approve_inspection(&dtdo(), &record.id, RemarksRequest::default())
        .expect("escalated");
    assert_eq!(escalated.status, ApplicationStatus::StateReview);
}
