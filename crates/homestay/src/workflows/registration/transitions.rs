//! Static transition table for the registration workflow.
//!
//! Every status change, and every role check that goes with it, is answered by [`TRANSITIONS`].
//! Role-scoped listings and the "available actions" hint shown to clients are derived from the
//! same rows, so there is exactly one place where authorization lives.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::domain::{ApplicationStatus, Role};

/// Operations an actor can request against an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    UpdateDraft,
    Submit,
    StartReview,
    Accept,
    Approve,
    Reject,
    SendBack,
    StartScrutiny,
    SaveScrutiny,
    Forward,
    Revert,
    CompleteInspection,
    RaiseObjections,
    InitiatePayment,
    RecordPayment,
    PaymentVerified,
    PaymentFailed,
    /// Administrative data reset; never present in the table.
    AdminReset,
}

impl Action {
    pub const fn label(self) -> &'static str {
        match self {
            Action::UpdateDraft => "update_draft",
            Action::Submit => "submit",
            Action::StartReview => "start_review",
            Action::Accept => "accept",
            Action::Approve => "approve",
            Action::Reject => "reject",
            Action::SendBack => "send_back",
            Action::StartScrutiny => "start_scrutiny",
            Action::SaveScrutiny => "save_scrutiny",
            Action::Forward => "forward",
            Action::Revert => "revert",
            Action::CompleteInspection => "complete_inspection",
            Action::RaiseObjections => "raise_objections",
            Action::InitiatePayment => "initiate_payment",
            Action::RecordPayment => "record_payment",
            Action::PaymentVerified => "payment_verified",
            Action::PaymentFailed => "payment_failed",
            Action::AdminReset => "admin_reset",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether a transition expects officer remarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemarksRule {
    NotApplicable,
    Optional,
    Required,
}

/// Approval routing: some categories need state-level sign-off after inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewTier {
    District,
    State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Status(ApplicationStatus),
    ByTier {
        district: ApplicationStatus,
        state: ApplicationStatus,
    },
}

impl Target {
    const fn resolve(self, tier: ReviewTier) -> ApplicationStatus {
        match (self, tier) {
            (Target::Status(status), _) => status,
            (Target::ByTier { district, .. }, ReviewTier::District) => district,
            (Target::ByTier { state, .. }, ReviewTier::State) => state,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TransitionRule {
    pub from: ApplicationStatus,
    pub action: Action,
    pub roles: &'static [Role],
    pub remarks: RemarksRule,
    pub target: Target,
}

use ApplicationStatus as S;
use RemarksRule::{NotApplicable, Optional, Required};

const OWNER: &[Role] = &[Role::Owner];
const DISTRICT: &[Role] = &[Role::DistrictOfficer];
const DA: &[Role] = &[Role::DealingAssistant];
const DTDO: &[Role] = &[Role::Dtdo];
const STATE: &[Role] = &[Role::StateOfficer];
const PAYER: &[Role] = &[Role::Owner, Role::System];
const SETTLEMENT: &[Role] = &[Role::System, Role::Dtdo];

const fn rule(
    from: ApplicationStatus,
    action: Action,
    roles: &'static [Role],
    remarks: RemarksRule,
    to: ApplicationStatus,
) -> TransitionRule {
    TransitionRule {
        from,
        action,
        roles,
        remarks,
        target: Target::Status(to),
    }
}

pub static TRANSITIONS: &[TransitionRule] = &[
    // owner
    rule(S::Draft, Action::UpdateDraft, OWNER, NotApplicable, S::Draft),
    rule(
        S::SentBackForCorrections,
        Action::UpdateDraft,
        OWNER,
        NotApplicable,
        S::SentBackForCorrections,
    ),
    rule(S::Draft, Action::Submit, OWNER, NotApplicable, S::Submitted),
    rule(
        S::SentBackForCorrections,
        Action::Submit,
        OWNER,
        NotApplicable,
        S::Submitted,
    ),
    // district officer variant
    rule(
        S::Submitted,
        Action::StartReview,
        DISTRICT,
        NotApplicable,
        S::DistrictReview,
    ),
    rule(S::Submitted, Action::Accept, DISTRICT, Optional, S::ForwardedToDtdo),
    rule(
        S::DistrictReview,
        Action::Approve,
        DISTRICT,
        Optional,
        S::ForwardedToDtdo,
    ),
    rule(S::DistrictReview, Action::Reject, DISTRICT, Required, S::Rejected),
    rule(
        S::DistrictReview,
        Action::SendBack,
        DISTRICT,
        Required,
        S::SentBackForCorrections,
    ),
    // dealing assistant scrutiny
    rule(
        S::Submitted,
        Action::StartScrutiny,
        DA,
        NotApplicable,
        S::UnderScrutiny,
    ),
    rule(S::UnderScrutiny, Action::SaveScrutiny, DA, Optional, S::UnderScrutiny),
    rule(S::UnderScrutiny, Action::Forward, DA, Optional, S::ForwardedToDtdo),
    rule(
        S::UnderScrutiny,
        Action::SendBack,
        DA,
        Required,
        S::SentBackForCorrections,
    ),
    // DTDO decision
    rule(
        S::ForwardedToDtdo,
        Action::StartReview,
        DTDO,
        NotApplicable,
        S::DtdoReview,
    ),
    rule(
        S::ForwardedToDtdo,
        Action::Accept,
        DTDO,
        Required,
        S::InspectionScheduled,
    ),
    rule(S::DtdoReview, Action::Accept, DTDO, Required, S::InspectionScheduled),
    rule(S::ForwardedToDtdo, Action::Reject, DTDO, Required, S::Rejected),
    rule(S::DtdoReview, Action::Reject, DTDO, Required, S::Rejected),
    rule(
        S::ForwardedToDtdo,
        Action::Revert,
        DTDO,
        Required,
        S::SentBackForCorrections,
    ),
    rule(
        S::DtdoReview,
        Action::Revert,
        DTDO,
        Required,
        S::SentBackForCorrections,
    ),
    // inspection
    rule(
        S::InspectionScheduled,
        Action::CompleteInspection,
        DTDO,
        Optional,
        S::InspectionCompleted,
    ),
    TransitionRule {
        from: S::InspectionCompleted,
        action: Action::Approve,
        roles: DTDO,
        remarks: Optional,
        target: Target::ByTier {
            district: S::PaymentPending,
            state: S::StateReview,
        },
    },
    rule(S::InspectionCompleted, Action::Reject, DTDO, Required, S::Rejected),
    rule(
        S::InspectionCompleted,
        Action::RaiseObjections,
        DTDO,
        Required,
        S::SentBackForCorrections,
    ),
    // state sign-off
    rule(S::StateReview, Action::Approve, STATE, Optional, S::PaymentPending),
    rule(S::StateReview, Action::Reject, STATE, Required, S::Rejected),
    // payment
    rule(
        S::PaymentPending,
        Action::InitiatePayment,
        OWNER,
        NotApplicable,
        S::PaymentPending,
    ),
    rule(
        S::PaymentPending,
        Action::RecordPayment,
        PAYER,
        NotApplicable,
        S::VerifiedForPayment,
    ),
    rule(
        S::PaymentPending,
        Action::PaymentVerified,
        SETTLEMENT,
        NotApplicable,
        S::Approved,
    ),
    rule(
        S::VerifiedForPayment,
        Action::PaymentVerified,
        SETTLEMENT,
        NotApplicable,
        S::Approved,
    ),
    rule(
        S::VerifiedForPayment,
        Action::PaymentFailed,
        SETTLEMENT,
        Optional,
        S::PaymentPending,
    ),
];

/// Outcome of a pure table lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionVerdict {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_status: Option<ApplicationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub remarks: RemarksRule,
}

/// A validated transition ready to be applied to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: ApplicationStatus,
    pub to: ApplicationStatus,
    pub action: Action,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("application is {status}; no further transitions are possible")]
    Terminal { status: ApplicationStatus },
    #[error("action '{action}' is not available while the application is {status}")]
    NotPermitted {
        action: Action,
        status: ApplicationStatus,
    },
    #[error("role '{role}' may not {action} an application that is {status}")]
    Unauthorized {
        role: Role,
        action: Action,
        status: ApplicationStatus,
    },
    #[error("remarks are required to {action}")]
    RemarksRequired { action: Action },
}

fn rules_for(
    current: ApplicationStatus,
    action: Action,
) -> impl Iterator<Item = &'static TransitionRule> {
    TRANSITIONS
        .iter()
        .filter(move |rule| rule.from == current && rule.action == action)
}

fn lookup(
    current: ApplicationStatus,
    action: Action,
    role: Role,
) -> Result<&'static TransitionRule, TransitionError> {
    if current.is_terminal() {
        return Err(TransitionError::Terminal { status: current });
    }

    let mut candidates = rules_for(current, action).peekable();
    if candidates.peek().is_none() {
        return Err(TransitionError::NotPermitted {
            action,
            status: current,
        });
    }

    candidates
        .find(|rule| rule.roles.contains(&role))
        .ok_or(TransitionError::Unauthorized {
            role,
            action,
            status: current,
        })
}

/// Pure query: may `role` perform `action` while the application is `current`?
pub fn can_transition(
    current: ApplicationStatus,
    action: Action,
    role: Role,
    tier: ReviewTier,
) -> TransitionVerdict {
    match lookup(current, action, role) {
        Ok(rule) => TransitionVerdict {
            allowed: true,
            next_status: Some(rule.target.resolve(tier)),
            reason: None,
            remarks: rule.remarks,
        },
        Err(error) => TransitionVerdict {
            allowed: false,
            next_status: None,
            reason: Some(error.to_string()),
            remarks: RemarksRule::NotApplicable,
        },
    }
}

/// Validate a requested transition including its remarks payload.
///
/// Role/state authorization is checked before remarks so that callers without the right to act
/// never learn about payload requirements.
pub fn authorize(
    current: ApplicationStatus,
    action: Action,
    role: Role,
    tier: ReviewTier,
    remarks: Option<&str>,
) -> Result<Transition, TransitionError> {
    let rule = lookup(current, action, role)?;
    let remarks = remarks
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string);

    if rule.remarks == RemarksRule::Required && remarks.is_none() {
        return Err(TransitionError::RemarksRequired { action });
    }

    Ok(Transition {
        from: current,
        to: rule.target.resolve(tier),
        action,
        remarks,
    })
}

/// Actions `role` can take from `status`, in table order.
pub fn actions_for(status: ApplicationStatus, role: Role) -> Vec<Action> {
    let mut actions = Vec::new();
    for rule in TRANSITIONS
        .iter()
        .filter(|rule| rule.from == status && rule.roles.contains(&role))
    {
        if !actions.contains(&rule.action) {
            actions.push(rule.action);
        }
    }
    actions
}

/// Statuses in which `role` has at least one action; drives officer work queues.
pub fn statuses_actionable_by(role: Role) -> Vec<ApplicationStatus> {
    ApplicationStatus::ALL
        .into_iter()
        .filter(|status| !actions_for(*status, role).is_empty())
        .collect()
}

/// Roles allowed to perform `action` from any status.
pub fn roles_for(action: Action) -> Vec<Role> {
    let mut roles = Vec::new();
    for rule in TRANSITIONS.iter().filter(|rule| rule.action == action) {
        for role in rule.roles {
            if !roles.contains(role) {
                roles.push(*role);
            }
        }
    }
    roles
}
