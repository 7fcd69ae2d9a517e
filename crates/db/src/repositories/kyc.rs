//! KYC verification repository.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
    TransactionTrait,
};

use meridian_core::access::AccessScope;
use meridian_core::kyc::{
    DocumentSide, KycError, KycService, KycStatus, KycSubmission, KycVerification, ReviewDecision,
};
use meridian_shared::types::{KycVerificationId, PageRequest, UserId};

use super::user::UserRepository;
use crate::entities::kyc_verifications;
use crate::scope::ScopedSelect;

fn db_err(err: DbErr) -> KycError {
    KycError::Database(err.to_string())
}

fn trimmed(key: Option<&String>) -> Option<String> {
    key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty())
}

impl TryFrom<kyc_verifications::Model> for KycVerification {
    type Error = KycError;

    fn try_from(m: kyc_verifications::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: KycVerificationId::from_uuid(m.id),
            user_id: UserId::from_uuid(m.user_id),
            document_type: m.document_type.parse()?,
            front_key: m.front_key,
            back_key: m.back_key,
            selfie_key: m.selfie_key,
            status: m.status.parse()?,
            rejection_reason: m.rejection_reason,
            reviewed_by: m.reviewed_by.map(UserId::from_uuid),
            submitted_at: m.submitted_at.with_timezone(&Utc),
            reviewed_at: m.reviewed_at.map(|t| t.with_timezone(&Utc)),
        })
    }
}

/// KYC verification repository.
#[derive(Debug, Clone)]
pub struct KycRepository {
    db: Arc<DatabaseConnection>,
}

impl KycRepository {
    /// Creates a new KYC repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// The user's most recent submission.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn latest_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Option<KycVerification>, KycError> {
        Self::latest_for_user_in(self.db.as_ref(), user_id).await
    }

    async fn latest_for_user_in<C: ConnectionTrait>(
        conn: &C,
        user_id: UserId,
    ) -> Result<Option<KycVerification>, KycError> {
        kyc_verifications::Entity::find()
            .filter(kyc_verifications::Column::UserId.eq(user_id.into_inner()))
            .order_by_desc(kyc_verifications::Column::SubmittedAt)
            .one(conn)
            .await
            .map_err(db_err)?
            .map(KycVerification::try_from)
            .transpose()
    }

    /// Stores a submission and marks the user `pending`.
    ///
    /// # Errors
    ///
    /// Returns `AlreadySubmitted` when a pending or approved verification
    /// exists, a validation error for missing or foreign documents, or a
    /// database error.
    pub async fn submit(
        &self,
        user_id: UserId,
        submission: &KycSubmission,
    ) -> Result<KycVerification, KycError> {
        let txn = self.db.begin().await.map_err(db_err)?;

        let current = Self::latest_for_user_in(&txn, user_id)
            .await?
            .map(|v| v.status);
        KycService::validate_submission(user_id, submission, current)?;

        let front_key = trimmed(submission.front_key.as_ref()).ok_or(KycError::MissingDocument {
            document_type: submission.document_type,
            side: DocumentSide::Front,
        })?;
        let now: DateTimeWithTimeZone = Utc::now().into();
        let model = kyc_verifications::ActiveModel {
            id: Set(submission.submission_id.into_inner()),
            user_id: Set(user_id.into_inner()),
            document_type: Set(submission.document_type.as_str().to_string()),
            front_key: Set(front_key),
            back_key: Set(trimmed(submission.back_key.as_ref())),
            selfie_key: Set(trimmed(submission.selfie_key.as_ref())),
            status: Set(KycStatus::Pending.as_str().to_string()),
            rejection_reason: Set(None),
            reviewed_by: Set(None),
            submitted_at: Set(now),
            reviewed_at: Set(None),
        }
        .insert(&txn)
        .await
        .map_err(db_err)?;

        UserRepository::set_kyc_status_in(&txn, user_id, KycStatus::Pending)
            .await
            .map_err(db_err)?;
        txn.commit().await.map_err(db_err)?;

        tracing::info!(user_id = %user_id, verification_id = %model.id, "KYC submitted");
        KycVerification::try_from(model)
    }

    /// Submissions of users in `scope`, optionally by status, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_scoped(
        &self,
        scope: &AccessScope,
        status: Option<KycStatus>,
        page: &PageRequest,
    ) -> Result<(Vec<KycVerification>, u64), KycError> {
        let mut query =
            kyc_verifications::Entity::find().scoped(kyc_verifications::Column::UserId, scope);
        if let Some(status) = status {
            query = query.filter(kyc_verifications::Column::Status.eq(status.as_str()));
        }
        let total = query.clone().count(self.db.as_ref()).await.map_err(db_err)?;
        let rows = query
            .order_by_asc(kyc_verifications::Column::SubmittedAt)
            .offset(page.offset())
            .limit(page.limit())
            .all(self.db.as_ref())
            .await
            .map_err(db_err)?;
        let items = rows
            .into_iter()
            .map(KycVerification::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((items, total))
    }

    /// Finds a submission.
    ///
    /// # Errors
    ///
    /// Returns `KycError::NotFound` when it does not exist.
    pub async fn get(&self, id: KycVerificationId) -> Result<KycVerification, KycError> {
        kyc_verifications::Entity::find_by_id(id.into_inner())
            .one(self.db.as_ref())
            .await
            .map_err(db_err)?
            .ok_or(KycError::NotFound(id))
            .and_then(KycVerification::try_from)
    }

    /// Applies a reviewer decision and mirrors the status onto the user.
    /// The caller checks the owner is in scope.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `NotPending`, `RejectionReasonRequired` or a
    /// database error.
    pub async fn review(
        &self,
        id: KycVerificationId,
        decision: &ReviewDecision,
        reviewer: UserId,
    ) -> Result<KycVerification, KycError> {
        let txn = self.db.begin().await.map_err(db_err)?;

        let row = kyc_verifications::Entity::find_by_id(id.into_inner())
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(db_err)?
            .ok_or(KycError::NotFound(id))?;
        let current: KycStatus = row.status.parse()?;
        let user_id = UserId::from_uuid(row.user_id);
        let outcome = KycService::review(current, decision, reviewer)?;

        let mut active = row.into_active_model();
        active.status = Set(outcome.status.as_str().to_string());
        active.rejection_reason = Set(outcome.rejection_reason.clone());
        active.reviewed_by = Set(Some(reviewer.into_inner()));
        active.reviewed_at = Set(Some(outcome.reviewed_at.into()));
        let saved = active.update(&txn).await.map_err(db_err)?;

        UserRepository::set_kyc_status_in(&txn, user_id, outcome.status)
            .await
            .map_err(db_err)?;
        txn.commit().await.map_err(db_err)?;

        tracing::info!(
            verification_id = %id,
            reviewer = %reviewer,
            status = outcome.status.as_str(),
            "KYC reviewed"
        );
        KycVerification::try_from(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::transaction_log;
    use meridian_core::kyc::DocumentType;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use uuid::Uuid;

    fn row(id: Uuid, user_id: Uuid, status: &str) -> kyc_verifications::Model {
        kyc_verifications::Model {
            id,
            user_id,
            document_type: "passport".into(),
            front_key: format!("kyc/{user_id}/{id}/front-p.jpg"),
            back_key: None,
            selfie_key: None,
            status: status.into(),
            rejection_reason: None,
            reviewed_by: None,
            submitted_at: Utc::now().into(),
            reviewed_at: None,
        }
    }

    #[tokio::test]
    async fn test_pending_submission_blocks_resubmit() {
        let user = UserId::new();
        let existing = Uuid::now_v7();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![row(existing, user.into_inner(), "pending")]])
            .into_connection();

        let submission_id = KycVerificationId::new();
        let result = KycRepository::new(Arc::new(db))
            .submit(
                user,
                &KycSubmission {
                    submission_id,
                    document_type: DocumentType::Passport,
                    front_key: Some(KycService::document_key(
                        user,
                        submission_id,
                        DocumentSide::Front,
                        "p.jpg",
                    )),
                    back_key: None,
                    selfie_key: None,
                },
            )
            .await;
        assert!(matches!(
            result,
            Err(KycError::AlreadySubmitted(KycStatus::Pending))
        ));
    }

    #[tokio::test]
    async fn test_submit_after_rejection_marks_user_pending() {
        let user = UserId::new();
        let submission_id = KycVerificationId::new();
        let stored = row(submission_id.into_inner(), user.into_inner(), "pending");
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![row(Uuid::now_v7(), user.into_inner(), "rejected")]])
            .append_query_results([vec![stored.clone()]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection());

        let verification = KycRepository::new(Arc::clone(&db))
            .submit(
                user,
                &KycSubmission {
                    submission_id,
                    document_type: DocumentType::Passport,
                    front_key: Some(stored.front_key.clone()),
                    back_key: None,
                    selfie_key: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(verification.status, KycStatus::Pending);

        let sql = format!("{:?}", transaction_log(db));
        assert!(sql.contains("kyc_status"));
    }

    #[tokio::test]
    async fn test_review_of_approved_submission_conflicts() {
        let id = Uuid::now_v7();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![row(id, Uuid::now_v7(), "approved")]])
            .into_connection();

        let result = KycRepository::new(Arc::new(db))
            .review(
                KycVerificationId::from_uuid(id),
                &ReviewDecision::Approve,
                UserId::new(),
            )
            .await;
        assert!(matches!(
            result,
            Err(KycError::NotPending(KycStatus::Approved))
        ));
    }
}
