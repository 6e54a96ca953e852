use crate::infra::{build_gateways, fee_calculator};
use chrono::Utc;
use clap::Args;
use homestay::config::{AppConfig, GatewayConfig};
use homestay::error::AppError;
use homestay::payments::{GatewayKind, ManualUpiConfig, PaymentInstruction};
use homestay::workflows::registration::domain::DocumentStatus;
use homestay::workflows::registration::scrutiny::DocumentVerification;
use homestay::workflows::registration::{
    Actor, ApplicationForm, ApplicationRecord, ApplicationStatus, CreateApplication,
    DiscountEligibility, DocumentUpload, DtdoAcceptRequest, FeeBreakdown, FeeCalculator,
    InMemoryApplicationRepository, InspectionChecklist, InspectionFindings,
    InspectionRecommendation, ManualPaymentReport, PaymentDecision, PaymentVerdict,
    RecordingEventPublisher, RegistrationError, RegistrationPolicy, RegistrationService,
    RemarksRequest, ReviewDecision, ReviewRequest, Role, ScrutinyRequest,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug)]
pub(crate) struct FeeArgs {
    /// Property category (silver, gold or diamond)
    #[arg(long)]
    pub(crate) category: String,
    /// Number of rooms offered to guests
    #[arg(long)]
    pub(crate) rooms: u32,
    /// Registration validity in years (1 to 3)
    #[arg(long, default_value_t = 1)]
    pub(crate) years: u32,
    /// Apply the female-owner discount
    #[arg(long)]
    pub(crate) female_owner: bool,
    /// Apply the special-region discount
    #[arg(long)]
    pub(crate) special_region: bool,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Property category for the sample application.
    #[arg(long, default_value = "silver")]
    pub(crate) category: String,
    /// Number of rooms on the sample application.
    #[arg(long, default_value_t = 4)]
    pub(crate) rooms: u32,
    /// Registration validity in years.
    #[arg(long, default_value_t = 1)]
    pub(crate) years: u32,
    /// Mark the sample owner as eligible for the female-owner discount.
    #[arg(long)]
    pub(crate) female_owner: bool,
}

pub(crate) fn run_fee_quote(args: FeeArgs) -> Result<(), AppError> {
    let FeeArgs {
        category,
        rooms,
        years,
        female_owner,
        special_region,
    } = args;

    let config = AppConfig::load()?;
    let fee = fee_calculator(&config.registration)?
        .quote(
            &category,
            rooms,
            years,
            DiscountEligibility {
                female_owner,
                special_region,
            },
        )
        .map_err(RegistrationError::from)?;
    render_fee(&fee);
    Ok(())
}

fn render_fee(fee: &FeeBreakdown) {
    println!(
        "Fee quote: {} | {} rooms | {} year(s)",
        fee.category.label(),
        fee.total_rooms,
        fee.validity_years
    );
    println!("- Base fee:               {}", fee.base_fee);
    println!("- Per-room fee:           {}", fee.per_room_fee);
    println!("- One-year subtotal:      {}", fee.subtotal_one_year);
    println!("- Before discounts:       {}", fee.total_before_discounts);
    println!("- Validity discount:      {}", fee.validity_discount);
    println!("- Female-owner discount:  {}", fee.female_owner_discount);
    println!("- Special-region discount:{}", fee.special_region_discount);
    println!("- Net amount:             {}", fee.net_amount);
    println!("- GST ({}%):              {}", fee.gst_percent, fee.gst_amount);
    println!("- Total payable:          {}", fee.total_fee);
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        category,
        rooms,
        years,
        female_owner,
    } = args;

    println!("Homestay registration demo");

    let gateways = build_gateways(
        &GatewayConfig {
            manual_upi: Some(ManualUpiConfig {
                vpa: "hptourism@upi".to_string(),
                payee: "Department of Tourism".to_string(),
            }),
            ..GatewayConfig::default()
        },
        Duration::from_secs(10),
    )?;
    let events = Arc::new(RecordingEventPublisher::default());
    let service = RegistrationService::new(
        Arc::new(InMemoryApplicationRepository::default()),
        events.clone(),
        FeeCalculator::default(),
        RegistrationPolicy::default(),
    )
    .with_gateways(gateways);

    let owner = Actor::new("owner-demo", Role::Owner);
    let assistant = Actor::new("da-demo", Role::DealingAssistant);
    let dtdo = Actor::new("dtdo-demo", Role::Dtdo);
    let state = Actor::new("state-demo", Role::StateOfficer);

    let record = match service.create(
        &owner,
        CreateApplication {
            form: ApplicationForm {
                property_name: "Demo Valley Homestay".to_string(),
                category,
                total_rooms: rooms,
                validity_years: years,
                female_owner,
                special_region: false,
                documents: vec![
                    DocumentUpload {
                        document_type: "ownership_proof".to_string(),
                        file_path: "uploads/demo/ownership.pdf".to_string(),
                    },
                    DocumentUpload {
                        document_type: "fire_noc".to_string(),
                        file_path: "uploads/demo/fire-noc.pdf".to_string(),
                    },
                ],
            },
            submit: true,
        },
    ) {
        Ok(record) => record,
        Err(err) => {
            println!("  Submission rejected: {}", err);
            return Ok(());
        }
    };
    let number = record
        .number
        .as_ref()
        .map(|number| number.0.clone())
        .unwrap_or_default();
    println!("- Submitted {} -> status {}", number, record.status);
    if let Some(fee) = &record.fee {
        render_fee(fee);
    }

    let id = record.id.clone();
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
    let today = Utc::now().date_naive();
    let checklist = InspectionChecklist::standard();

    let Some(_) = step("Scrutiny started", service.start_scrutiny(&assistant, &id)) else {
        return Ok(());
    };
    let Some(_) = step(
        "Forwarded to DTDO",
        service.forward_to_dtdo(
            &assistant,
            &id,
            ScrutinyRequest {
                verifications,
                remarks: Some("documents verified".to_string()),
            },
        ),
    ) else {
        return Ok(());
    };
    let Some(_) = step(
        "Inspection scheduled",
        service.dtdo_accept(
            &dtdo,
            &id,
            DtdoAcceptRequest {
                remarks: Some("site visit ordered".to_string()),
                inspection_date: today,
                inspector: "Demo inspection team".to_string(),
            },
        ),
    ) else {
        return Ok(());
    };
    let findings = InspectionFindings {
        inspected_on: today,
        mandatory: checklist
            .mandatory
            .iter()
            .map(|item| (item.clone(), true))
            .collect(),
        desirable: checklist
            .desirable
            .iter()
            .map(|item| (item.clone(), true))
            .collect(),
        recommendation: InspectionRecommendation::Approve,
        remarks: None,
    };
    let Some(_) = step(
        "Inspection report filed",
        service.submit_inspection_report(&dtdo, &id, findings),
    ) else {
        return Ok(());
    };
    let Some(mut current) = step(
        "Inspection approved",
        service.approve_inspection(&dtdo, &id, RemarksRequest::default()),
    ) else {
        return Ok(());
    };

    if current.status == ApplicationStatus::StateReview {
        let review = ReviewRequest {
            decision: ReviewDecision::Approve,
            remarks: Some("state sign-off".to_string()),
        };
        match step("State approval", service.review(&state, &id, review)) {
            Some(record) => current = record,
            None => return Ok(()),
        }
    }

    let start = match service
        .initiate_payment(&owner, &id, GatewayKind::ManualUpi)
        .await
    {
        Ok(start) => start,
        Err(err) => {
            println!("  Payment could not start: {}", err);
            return Ok(());
        }
    };
    if let PaymentInstruction::ManualTransfer { vpa, amount, .. } = &start.instruction {
        println!("- Payment instruction: transfer {} to {}", amount, vpa);
    }

    let amount = current
        .fee
        .as_ref()
        .map(|fee| fee.total_fee)
        .unwrap_or_default();
    let utr = format!("UTR{}", Utc::now().timestamp());
    let report = ManualPaymentReport {
        transaction_ref: utr.clone(),
        amount,
    };
    let Some(_) = step(
        "Transfer reported",
        service.report_manual_payment(&owner, &id, report),
    ) else {
        return Ok(());
    };

    let decision = PaymentDecision {
        status: PaymentVerdict::Verified,
        verified_amount: None,
        remarks: Some("credit confirmed".to_string()),
    };
    let Some(approved) = step(
        "Payment verified",
        service.verify_payment(&dtdo, &utr, decision),
    ) else {
        return Ok(());
    };

    if let Some(certificate) = &approved.certificate {
        println!(
            "  Certificate {} valid {} to {}",
            certificate.number, certificate.issued_on, certificate.valid_until
        );
    }

    println!("\nTimeline:");
    for entry in &approved.timeline {
        println!(
            "  {} | {:<17} | {} -> {} | {} ({})",
            entry.at.format("%H:%M:%S"),
            entry.action.label(),
            entry.from,
            entry.to,
            entry.actor,
            entry.role
        );
    }
    println!("Events published: {}", events.events().len());

    Ok(())
}

fn step(
    label: &str,
    result: Result<ApplicationRecord, RegistrationError>,
) -> Option<ApplicationRecord> {
    match result {
        Ok(record) => {
            println!("- {} -> status {}", label, record.status);
            Some(record)
        }
        Err(err) => {
            println!("  {} failed: {}", label, err);
            None
        }
    }
}
