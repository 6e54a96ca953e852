use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::{Document, DocumentId, DocumentStatus};
use super::fees::round_money;

/// Dealing-assistant verdict for a single document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentVerification {
    pub status: DocumentStatus,
    #[serde(default)]
    pub remarks: Option<String>,
}

/// Checklist progress shown to the DA and carried to the DTDO.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrutinyProgress {
    pub total_documents: usize,
    pub reviewed: usize,
    pub verified: usize,
    /// `reviewed / total_documents` as a percentage; zero when nothing was uploaded.
    pub percent_complete: Decimal,
    /// Documents not yet verified; forwarded to the DTDO as carried-over risk.
    pub unresolved: Vec<DocumentId>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScrutinyError {
    #[error("document '{0}' is not attached to this application")]
    UnknownDocument(DocumentId),
    #[error("remarks are required when marking document '{0}' as {1}")]
    MissingRemarks(DocumentId, &'static str),
}

pub fn progress(documents: &[Document]) -> ScrutinyProgress {
    let total_documents = documents.len();
    let reviewed = documents
        .iter()
        .filter(|document| document.status != DocumentStatus::Pending)
        .count();
    let verified = documents
        .iter()
        .filter(|document| document.status == DocumentStatus::Verified)
        .count();
    let unresolved = documents
        .iter()
        .filter(|document| document.status != DocumentStatus::Verified)
        .map(|document| document.id.clone())
        .collect();

    let percent_complete = if total_documents == 0 {
        round_money(Decimal::ZERO)
    } else {
        round_money(
            Decimal::from(reviewed as u64) * Decimal::ONE_HUNDRED
                / Decimal::from(total_documents as u64),
        )
    };

    ScrutinyProgress {
        total_documents,
        reviewed,
        verified,
        percent_complete,
        unresolved,
    }
}

/// Apply a batch of verdicts. Validates the whole batch before touching any document.
pub fn apply_verifications(
    documents: &mut [Document],
    updates: &BTreeMap<DocumentId, DocumentVerification>,
) -> Result<usize, ScrutinyError> {
    for (id, verification) in updates {
        if !documents.iter().any(|document| &document.id == id) {
            return Err(ScrutinyError::UnknownDocument(id.clone()));
        }
        let needs_remarks = match verification.status {
            DocumentStatus::Rejected => Some("rejected"),
            DocumentStatus::NeedsCorrection => Some("needs_correction"),
            DocumentStatus::Pending | DocumentStatus::Verified => None,
        };
        let has_remarks = verification
            .remarks
            .as_deref()
            .is_some_and(|text| !text.trim().is_empty());
        if let Some(label) = needs_remarks {
            if !has_remarks {
                return Err(ScrutinyError::MissingRemarks(id.clone(), label));
            }
        }
    }

    let mut changed = 0;
    for document in documents.iter_mut() {
        if let Some(verification) = updates.get(&document.id) {
            document.status = verification.status;
            document.remarks = verification
                .remarks
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string);
            changed += 1;
        }
    }
    Ok(changed)
}

/// Prepare documents for a fresh review cycle: anything not verified goes back to pending.
pub fn reopen_for_resubmission(documents: &mut [Document]) {
    for document in documents
        .iter_mut()
        .filter(|document| document.status != DocumentStatus::Verified)
    {
        document.status = DocumentStatus::Pending;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(id: &str, status: DocumentStatus) -> Document {
        Document {
            id: DocumentId(id.to_string()),
            document_type: "ownership_proof".to_string(),
            file_path: format!("uploads/{id}.pdf"),
            status,
            remarks: None,
        }
    }

    #[test]
    fn progress_counts_everything_not_pending() {
        let documents = vec![
            document("a", DocumentStatus::Verified),
            document("b", DocumentStatus::NeedsCorrection),
            document("c", DocumentStatus::Pending),
            document("d", DocumentStatus::Rejected),
        ];
        let progress = progress(&documents);
        assert_eq!(progress.reviewed, 3);
        assert_eq!(progress.verified, 1);
        assert_eq!(progress.percent_complete, Decimal::from(75));
        assert_eq!(
            progress.unresolved,
            vec![
                DocumentId("b".to_string()),
                DocumentId("c".to_string()),
                DocumentId("d".to_string())
            ]
        );
    }

    #[test]
    fn empty_checklists_report_zero_progress() {
        let progress = progress(&[]);
        assert_eq!(progress.total_documents, 0);
        assert_eq!(progress.percent_complete, Decimal::ZERO);
    }

    #[test]
    fn unknown_documents_reject_the_whole_batch() {
        let mut documents = vec![document("a", DocumentStatus::Pending)];
        let mut updates = BTreeMap::new();
        updates.insert(
            DocumentId("a".to_string()),
            DocumentVerification {
                status: DocumentStatus::Verified,
                remarks: None,
            },
        );
        updates.insert(
            DocumentId("zz".to_string()),
            DocumentVerification {
                status: DocumentStatus::Verified,
                remarks: None,
            },
        );

        let error = apply_verifications(&mut documents, &updates).expect_err("unknown id");
        assert_eq!(error, ScrutinyError::UnknownDocument(DocumentId("zz".to_string())));
        assert_eq!(documents[0].status, DocumentStatus::Pending);
    }

    #[test]
    fn corrections_need_remarks() {
        let mut documents = vec![document("a", DocumentStatus::Pending)];
        let mut updates = BTreeMap::new();
        updates.insert(
            DocumentId("a".to_string()),
            DocumentVerification {
                status: DocumentStatus::NeedsCorrection,
                remarks: Some("  ".to_string()),
            },
        );
        assert!(matches!(
            apply_verifications(&mut documents, &updates),
            Err(ScrutinyError::MissingRemarks(_, "needs_correction"))
        ));
    }

    #[test]
    fn reopening_keeps_verified_documents() {
        let mut documents = vec![
            document("a", DocumentStatus::Verified),
            document("b", DocumentStatus::Rejected),
        ];
        reopen_for_resubmission(&mut documents);
        assert_eq!(documents[0].status, DocumentStatus::Verified);
        assert_eq!(documents[1].status, DocumentStatus::Pending);
    }
}
