//! Idempotent create-or-update of one record by natural key.

use crate::deadline::Deadline;
use crate::error::AppError;
use crate::model::{Entity, Fields, Record};
use crate::registry::ModelHandle;
use crate::service::RequestValidator;

/// Atomic writes attempted before a persisting write race becomes [`AppError::Conflict`].
pub const MAX_UPSERT_ATTEMPTS: u32 = 3;

pub struct UpsertService;

impl UpsertService {
    /// Create the record for `natural_key` with `fields`, or merge `fields` into the
    /// existing one. Returns the record as persisted by the write.
    ///
    /// The write is a single atomic find-or-create-or-update on the backend. When the
    /// backend reports a write conflict, a reconciliation read decides: if the stored
    /// record already carries `fields` that record is the result, otherwise the write is
    /// retried.
    pub async fn upsert(
        model: &ModelHandle,
        natural_key: &str,
        fields: &Fields,
        deadline: &Deadline,
    ) -> Result<Record, AppError> {
        RequestValidator::validate(fields, natural_key, model.schema())?;
        deadline
            .run("upsert", Self::write_and_reconcile(model, natural_key, fields))
            .await
    }

    /// [`UpsertService::upsert`] decoded into the entity type.
    pub async fn upsert_entity<T: Entity>(
        model: &ModelHandle,
        natural_key: &str,
        fields: &Fields,
        deadline: &Deadline,
    ) -> Result<T, AppError> {
        let record = Self::upsert(model, natural_key, fields, deadline).await?;
        T::from_record(&record)
    }

    async fn write_and_reconcile(model: &ModelHandle, natural_key: &str, fields: &Fields) -> Result<Record, AppError> {
        for attempt in 1..=MAX_UPSERT_ATTEMPTS {
            match model.find_one_and_upsert(natural_key, fields).await {
                Ok(record) => {
                    tracing::debug!(
                        database = %model.database().name(),
                        model = %model.schema().name,
                        key = natural_key,
                        attempt,
                        "upserted"
                    );
                    return Ok(record);
                }
                Err(AppError::WriteConflict(reason)) => {
                    tracing::warn!(
                        database = %model.database().name(),
                        model = %model.schema().name,
                        key = natural_key,
                        attempt,
                        %reason,
                        "write conflict, reconciling"
                    );
                    if let Some(existing) = model.find_one(natural_key).await? {
                        if existing.has_fields(fields) {
                            return Ok(existing);
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(AppError::Conflict(format!(
            "{} '{}' in '{}': write still conflicting after {} attempts",
            model.schema().name,
            natural_key,
            model.database().name(),
            MAX_UPSERT_ATTEMPTS
        )))
    }
}
