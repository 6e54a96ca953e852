use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use super::{validation, RegistrationError, RegistrationService};
use crate::payments::{
    call_with_timeout, retry_idempotent, GatewayKind, GatewaySettlement, Payment, PaymentId,
    PaymentInstruction, PaymentRequest, PaymentStatus, EXPIRED_REASON,
};
use crate::workflows::registration::domain::{
    Actor, ApplicationId, ApplicationStatus, Certificate,
};
use crate::workflows::registration::fees::round_money;
use crate::workflows::registration::record::ApplicationRecord;
use crate::workflows::registration::repository::{
    ApplicationRepository, EventPublisher, RepositoryError,
};
use crate::workflows::registration::requests::{
    ManualPaymentReport, PaymentDecision, PaymentVerdict,
};
use crate::workflows::registration::transitions::Action;

/// Result of starting a gateway payment.
#[derive(Debug, Clone)]
pub struct PaymentStart {
    pub application: ApplicationRecord,
    pub payment: Payment,
    pub instruction: PaymentInstruction,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub application: ApplicationRecord,
    pub payment: Payment,
}

impl<R, E> RegistrationService<R, E>
where
    R: ApplicationRepository + 'static,
    E: EventPublisher + 'static,
{
    /// Start a payment through `kind`. The gateway call is never retried; a failure is recorded
    /// as a failed attempt and the application stays in `payment_pending`.
    pub async fn initiate_payment(
        &self,
        actor: &Actor,
        id: &ApplicationId,
        kind: GatewayKind,
    ) -> Result<PaymentStart, RegistrationError> {
        let record = self.store.get(id)?;
        self.authorize(actor, &record, Action::InitiatePayment, None)?;
        ensure_slot_free(&record)?;
        let amount = locked_fee(&record)?;
        let gateway = self.gateways.get(kind)?;

        let request = PaymentRequest {
            application_id: record.id.0.clone(),
            application_number: record
                .number
                .as_ref()
                .map(|number| number.0.clone())
                .unwrap_or_else(|| record.id.0.clone()),
            payer: actor.user_id.0.clone(),
            amount,
        };
        let result =
            call_with_timeout(kind, self.policy.gateway_timeout, gateway.initiate(&request)).await;

        let now = Utc::now();
        let (record, (payment_id, outcome)) = self.store.mutate(id, |record| {
            let transition = self.authorize(actor, record, Action::InitiatePayment, None)?;
            ensure_slot_free(record)?;
            let (payment, outcome) = match &result {
                Ok(initiation) => (
                    Payment::initiated(kind, initiation.external_ref.clone(), amount, now),
                    Ok(initiation.instruction.clone()),
                ),
                Err(error) => (
                    Payment::failed(kind, amount, error.to_string(), now),
                    Err(error.clone()),
                ),
            };
            let payment_id = payment.id.clone();
            record.payments.push(payment);
            record.apply(&transition, actor, now);
            Ok::<_, RegistrationError>((payment_id, outcome))
        })?;
        self.announce(&record);

        match outcome {
            Ok(instruction) => {
                let payment = find_payment(&record, &payment_id)?;
                info!(
                    application_id = %record.id,
                    gateway = %kind,
                    payment_id = %payment.id,
                    "payment initiated"
                );
                Ok(PaymentStart {
                    application: record,
                    payment,
                    instruction,
                })
            }
            Err(error) => {
                warn!(
                    application_id = %record.id,
                    gateway = %kind,
                    %error,
                    "payment initiation failed"
                );
                Err(RegistrationError::ExternalGateway(error))
            }
        }
    }

    /// Owner reports a direct UPI transfer; the application waits for officer verification.
    pub fn report_manual_payment(
        &self,
        actor: &Actor,
        id: &ApplicationId,
        report: ManualPaymentReport,
    ) -> Result<ApplicationRecord, RegistrationError> {
        let reference = report.transaction_ref.trim().to_string();
        if reference.is_empty() {
            return Err(validation("transaction_ref", "transaction reference is required"));
        }
        if report.amount <= Decimal::ZERO {
            return Err(validation("amount", "amount must be positive"));
        }

        // Held until the claiming write commits so two applications cannot take one reference.
        let _claim = self.reference_claims.lock().map_err(|_| {
            RepositoryError::Unavailable("reference claim lock poisoned".to_string())
        })?;
        if self
            .store
            .repository()
            .find_by_payment(&reference)?
            .is_some()
        {
            return Err(RegistrationError::Conflict(format!(
                "transaction reference '{reference}' has already been reported"
            )));
        }

        self.transition(actor, id, Action::RecordPayment, None, |record, _, now| {
            ensure_slot_free(record)?;
            let fee = locked_fee(record)?;
            let amount = round_money(report.amount);
            if amount < fee {
                return Err(validation(
                    "amount",
                    format!("reported amount {amount} is below the registration fee {fee}"),
                ));
            }

            let pending_manual = record.payments.iter_mut().rev().find(|payment| {
                payment.gateway == GatewayKind::ManualUpi
                    && payment.status == PaymentStatus::Initiated
            });
            match pending_manual {
                Some(payment) => {
                    payment.external_ref = Some(reference);
                    payment.amount = amount;
                    payment.status = PaymentStatus::PendingVerification;
                    payment.updated_at = now;
                }
                None => {
                    let mut payment =
                        Payment::initiated(GatewayKind::ManualUpi, reference, amount, now);
                    payment.status = PaymentStatus::PendingVerification;
                    record.payments.push(payment);
                }
            }
            Ok(())
        })
    }

    /// Officer verification of a payment awaiting confirmation (`PATCH /payments/:id`).
    pub fn verify_payment(
        &self,
        actor: &Actor,
        reference: &str,
        decision: PaymentDecision,
    ) -> Result<ApplicationRecord, RegistrationError> {
        let record = self
            .store
            .repository()
            .find_by_payment(reference)?
            .ok_or_else(|| RegistrationError::NotFound(format!("payment '{reference}'")))?;
        let payment_id = find_payment_by_reference(&record, reference)?.id;

        match decision.status {
            PaymentVerdict::Verified => self.transition(
                actor,
                &record.id,
                Action::PaymentVerified,
                decision.remarks.as_deref(),
                |record, _, now| {
                    let fee = locked_fee(record)?;
                    let payment = awaiting_verification(record, &payment_id)?;
                    let amount = round_money(decision.verified_amount.unwrap_or(payment.amount));
                    if amount < fee {
                        return Err(validation(
                            "verified_amount",
                            format!("verified amount {amount} is below the registration fee {fee}"),
                        ));
                    }
                    payment.status = PaymentStatus::Verified;
                    payment.verified_amount = Some(amount);
                    payment.updated_at = now;
                    issue_certificate(record, now)
                },
            ),
            PaymentVerdict::Failed => self.transition(
                actor,
                &record.id,
                Action::PaymentFailed,
                decision.remarks.as_deref(),
                |record, transition, now| {
                    let payment = awaiting_verification(record, &payment_id)?;
                    let reason = transition
                        .remarks
                        .clone()
                        .unwrap_or_else(|| "rejected during verification".to_string());
                    payment.mark_failed(reason, now);
                    Ok(())
                },
            ),
        }
    }

    /// Idempotent reconciliation by gateway reference. Attempts that already reached a final
    /// status are returned exactly as stored, except expired ones, which the gateway may still
    /// settle.
    pub async fn reconcile_payment(
        &self,
        external_ref: &str,
    ) -> Result<ReconcileOutcome, RegistrationError> {
        let reference = external_ref.trim();
        if reference.is_empty() {
            return Err(validation("external_ref", "external reference is required"));
        }

        let record = self
            .store
            .repository()
            .find_by_payment(reference)?
            .ok_or_else(|| RegistrationError::NotFound(format!("payment '{reference}'")))?;
        let payment = find_payment_by_reference(&record, reference)?;
        if payment.status.is_final() && !payment.is_expired() {
            return Ok(ReconcileOutcome {
                application: record,
                payment,
            });
        }

        let gateway_ref = payment
            .external_ref
            .clone()
            .ok_or_else(|| validation("external_ref", "attempt has no gateway reference"))?;
        let gateway = self.gateways.get(payment.gateway)?;
        let timeout = self.policy.gateway_timeout;
        let reconciliation = retry_idempotent(&self.policy.reconcile_retry, || {
            call_with_timeout(payment.gateway, timeout, gateway.reconcile(&gateway_ref))
        })
        .await?;

        let system = Actor::system();
        let now = Utc::now();
        let (record, transitioned) = self.store.mutate(&record.id, |record| {
            self.settle(record, &payment.id, reconciliation.settlement, &system, now)
        })?;
        if transitioned {
            self.announce(&record);
        }

        let payment = find_payment(&record, &payment.id)?;
        info!(
            application_id = %record.id,
            gateway = %payment.gateway,
            payment_status = ?payment.status,
            status = %record.status,
            "payment reconciled"
        );
        Ok(ReconcileOutcome {
            application: record,
            payment,
        })
    }

    /// Apply a gateway settlement to one attempt. Returns whether the application transitioned.
    fn settle(
        &self,
        record: &mut ApplicationRecord,
        payment_id: &PaymentId,
        settlement: GatewaySettlement,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<bool, RegistrationError> {
        let index = record
            .payments
            .iter()
            .position(|payment| &payment.id == payment_id)
            .ok_or_else(|| RegistrationError::NotFound(format!("payment '{payment_id}'")))?;
        let status = record.payments[index].status;
        if status.is_final() && !record.payments[index].is_expired() {
            return Ok(false);
        }
        let holds_slot = status == PaymentStatus::PendingVerification;

        match settlement {
            GatewaySettlement::Unpaid => Ok(false),
            GatewaySettlement::Pending => {
                if holds_slot || record.settling_payment().is_some() {
                    return Ok(false);
                }
                let transition = self.authorize(actor, record, Action::RecordPayment, None)?;
                let payment = &mut record.payments[index];
                payment.status = PaymentStatus::PendingVerification;
                payment.failure_reason = None;
                payment.updated_at = now;
                record.apply(&transition, actor, now);
                Ok(true)
            }
            GatewaySettlement::Success { amount } => {
                let amount = round_money(amount);
                let fee = locked_fee(record)?;

                if record.has_verified_payment() || record.status.is_terminal() {
                    let payment = &mut record.payments[index];
                    payment.verified_amount = Some(amount);
                    payment.mark_failed("duplicate settlement, refund required", now);
                    warn!(
                        application_id = %record.id,
                        payment_id = %payment_id,
                        "duplicate settlement recorded"
                    );
                    return Ok(false);
                }

                if amount < fee {
                    record.payments[index].mark_failed(
                        format!("amount mismatch: received {amount}, expected {fee}"),
                        now,
                    );
                    return self.release_slot(record, holds_slot, actor, now);
                }

                let transition = self.authorize(actor, record, Action::PaymentVerified, None)?;
                for other in record
                    .payments
                    .iter_mut()
                    .filter(|other| &other.id != payment_id && other.status.is_settling())
                {
                    other.mark_failed("superseded by a confirmed gateway payment", now);
                }
                let payment = &mut record.payments[index];
                payment.status = PaymentStatus::Verified;
                payment.verified_amount = Some(amount);
                payment.failure_reason = None;
                payment.updated_at = now;
                issue_certificate(record, now)?;
                record.apply(&transition, actor, now);
                Ok(true)
            }
            GatewaySettlement::Failed { reason } => {
                if status == PaymentStatus::Failed {
                    return Ok(false);
                }
                record.payments[index].mark_failed(reason, now);
                self.release_slot(record, holds_slot, actor, now)
            }
        }
    }

    /// A failed attempt that held the settlement slot returns the application to
    /// `payment_pending`.
    fn release_slot(
        &self,
        record: &mut ApplicationRecord,
        held_slot: bool,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<bool, RegistrationError> {
        if !held_slot || record.status != ApplicationStatus::VerifiedForPayment {
            return Ok(false);
        }
        let transition = self.authorize(actor, record, Action::PaymentFailed, None)?;
        record.apply(&transition, actor, now);
        Ok(true)
    }

    /// Settle or expire `initiated` attempts older than the expiry window. Each one is polled
    /// first; only an attempt the gateway reports as unpaid is expired. An attempt whose poll
    /// fails stays `initiated` for the next sweep. The application itself stays in
    /// `payment_pending` so the owner can start again.
    pub async fn expire_stale_payments(
        &self,
        now: DateTime<Utc>,
    ) -> Result<usize, RegistrationError> {
        let cutoff = now - self.policy.payment_expiry;

        let mut expired = 0;
        for record in self.store.list()? {
            let stale: Vec<Payment> = record
                .payments
                .iter()
                .filter(|payment| {
                    payment.status == PaymentStatus::Initiated && payment.created_at <= cutoff
                })
                .cloned()
                .collect();
            for payment in stale {
                match self.sweep_attempt(&record.id, &payment, now).await {
                    Ok(true) => expired += 1,
                    Ok(false) => {}
                    Err(error) => warn!(
                        application_id = %record.id,
                        payment_id = %payment.id,
                        %error,
                        "could not settle or expire payment attempt"
                    ),
                }
            }
        }

        if expired > 0 {
            info!(expired, "expired stale payment attempts");
        }
        Ok(expired)
    }

    /// Returns whether the attempt was expired.
    async fn sweep_attempt(
        &self,
        id: &ApplicationId,
        payment: &Payment,
        now: DateTime<Utc>,
    ) -> Result<bool, RegistrationError> {
        let settlement = match (self.gateways.get(payment.gateway), &payment.external_ref) {
            (Ok(gateway), Some(reference)) => {
                let timeout = self.policy.gateway_timeout;
                retry_idempotent(&self.policy.reconcile_retry, || {
                    call_with_timeout(payment.gateway, timeout, gateway.reconcile(reference))
                })
                .await?
                .settlement
            }
            _ => GatewaySettlement::Unpaid,
        };

        let system = Actor::system();
        let (record, (transitioned, expired)) = self.store.mutate(id, |record| {
            let still_initiated = record
                .payment_mut(&payment.id)
                .is_some_and(|stored| stored.status == PaymentStatus::Initiated);
            if !still_initiated {
                return Ok((false, false));
            }
            match settlement {
                GatewaySettlement::Unpaid => {
                    if let Some(stored) = record.payment_mut(&payment.id) {
                        stored.mark_failed(EXPIRED_REASON, now);
                    }
                    Ok((false, true))
                }
                settlement => self
                    .settle(record, &payment.id, settlement, &system, now)
                    .map(|transitioned| (transitioned, false)),
            }
        })?;
        if transitioned {
            self.announce(&record);
        }
        Ok(expired)
    }
}

fn locked_fee(record: &ApplicationRecord) -> Result<Decimal, RegistrationError> {
    record.fee.as_ref().map(|fee| fee.total_fee).ok_or_else(|| {
        RegistrationError::Conflict("no fee has been computed for this application".to_string())
    })
}

fn ensure_slot_free(record: &ApplicationRecord) -> Result<(), RegistrationError> {
    match record.settling_payment() {
        Some(payment) if payment.status == PaymentStatus::Verified => Err(
            RegistrationError::Conflict("the registration fee has already been paid".to_string()),
        ),
        Some(payment) => Err(RegistrationError::Conflict(format!(
            "payment {} is awaiting confirmation",
            payment.id
        ))),
        None => Ok(()),
    }
}

fn find_payment(
    record: &ApplicationRecord,
    payment_id: &PaymentId,
) -> Result<Payment, RegistrationError> {
    record
        .payments
        .iter()
        .find(|payment| &payment.id == payment_id)
        .cloned()
        .ok_or_else(|| RegistrationError::NotFound(format!("payment '{payment_id}'")))
}

fn find_payment_by_reference(
    record: &ApplicationRecord,
    reference: &str,
) -> Result<Payment, RegistrationError> {
    record
        .payment_by_reference(reference)
        .cloned()
        .ok_or_else(|| RegistrationError::NotFound(format!("payment '{reference}'")))
}

fn awaiting_verification<'a>(
    record: &'a mut ApplicationRecord,
    payment_id: &PaymentId,
) -> Result<&'a mut Payment, RegistrationError> {
    let payment = record
        .payment_mut(payment_id)
        .ok_or_else(|| RegistrationError::NotFound(format!("payment '{payment_id}'")))?;
    if payment.status != PaymentStatus::PendingVerification {
        return Err(RegistrationError::Conflict(format!(
            "payment {payment_id} is not awaiting verification"
        )));
    }
    Ok(payment)
}

/// Record the registration certificate, valid for the chosen number of years from today.
fn issue_certificate(
    record: &mut ApplicationRecord,
    now: DateTime<Utc>,
) -> Result<(), RegistrationError> {
    let issued_on = now.date_naive();
    let valid_until = issued_on
        .checked_add_months(Months::new(12 * record.property.validity_years))
        .ok_or_else(|| {
            validation("validity_years", "certificate validity overflows the calendar")
        })?;
    let number = match &record.number {
        Some(number) => number.0.replacen("HS/", "HSC/", 1),
        None => format!("HSC/{}", record.id),
    };
    record.certificate = Some(Certificate {
        number,
        issued_on,
        valid_until,
    });
    Ok(())
}
