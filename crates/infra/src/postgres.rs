//! Postgres-backed withdrawal store.
//!
//! Implements the engine's store port on top of the `withdrawal`, `item`
//! and `withdrawal_has_item` tables.
//!
//! ## Atomicity
//!
//! Every multi-row mutation runs inside one transaction obtained from the
//! pool: commit on success, rollback on every error path (dropping an
//! uncommitted transaction rolls it back). Status guards are part of the
//! mutating statements themselves (`UPDATE ... WHERE status = ...`), so a
//! precondition observed before the call is re-validated under the
//! transaction and two concurrent confirm/cancel callers cannot both win.
//! Per-serial reservation is a single compare-and-set UPDATE, making
//! double-reservation of a serial impossible.
//!
//! ## Error Mapping
//!
//! sqlx errors are mapped to `StoreError` by Postgres error code:
//! unique violations (23505) become `Conflict`, foreign key and check
//! violations (23503, 23514) become `Constraint`, everything else
//! `Backend`.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::instrument;

use stockroom_core::{BranchCode, DepartmentCode, SerialNo, StaffCode, WithdrawalId};
use stockroom_inventory::{
    Item, ItemStatus, ItemTransition, Withdrawal, WithdrawalDraft, WithdrawalFilter,
    WithdrawalKind, WithdrawalStatus,
};

use stockroom_engine::store::{
    CascadeOutcome, Page, ReleaseOutcome, ReserveOutcome, StoreError, WithdrawalStore,
};

/// Postgres implementation of [`WithdrawalStore`].
///
/// Cheap to clone; the pool is shared.
#[derive(Debug, Clone)]
pub struct PostgresWithdrawalStore {
    pool: PgPool,
}

impl PostgresWithdrawalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch a withdrawal's status, for classifying a failed guard.
    async fn classify_guard_miss<'c, E>(
        executor: E,
        id: WithdrawalId,
    ) -> Result<CascadeOutcome, StoreError>
    where
        E: sqlx::Executor<'c, Database = sqlx::Postgres>,
    {
        let row = sqlx::query(r#"SELECT "status" FROM "withdrawal" WHERE "id" = $1"#)
            .bind(id.as_i64())
            .fetch_optional(executor)
            .await
            .map_err(|e| map_sqlx_error("classify_guard_miss", e))?;

        match row {
            None => Ok(CascadeOutcome::NotFound),
            Some(row) => {
                let status: String = row
                    .try_get("status")
                    .map_err(|e| map_sqlx_error("classify_guard_miss", e))?;
                Ok(CascadeOutcome::WrongStatus {
                    current: parse_status(&status)?,
                })
            }
        }
    }
}

#[async_trait]
impl WithdrawalStore for PostgresWithdrawalStore {
    #[instrument(skip(self, draft), fields(kind = %draft.kind), err)]
    async fn insert_withdrawal(
        &self,
        draft: &WithdrawalDraft,
    ) -> Result<WithdrawalId, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO "withdrawal" (
                "type",
                "status",
                "for_branch_code",
                "for_department_code",
                "created_by_staff_code",
                "date",
                "return_by",
                "install_date",
                "remarks"
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING "id"
            "#,
        )
        .bind(draft.kind.as_str())
        .bind(WithdrawalStatus::Pending.as_str())
        .bind(draft.for_branch_code.as_ref().map(BranchCode::as_str))
        .bind(draft.for_department_code.as_ref().map(DepartmentCode::as_str))
        .bind(draft.created_by_staff_code.as_str())
        .bind(draft.date)
        .bind(draft.return_by)
        .bind(draft.install_date)
        .bind(draft.remarks.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_withdrawal", e))?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| map_sqlx_error("insert_withdrawal", e))?;
        Ok(WithdrawalId::new(id))
    }

    #[instrument(skip(self), fields(%id), err)]
    async fn fetch_withdrawal(&self, id: WithdrawalId) -> Result<Option<Withdrawal>, StoreError> {
        let row = sqlx::query(WITHDRAWAL_COLS_WHERE_ID)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_withdrawal", e))?;

        row.map(|r| withdrawal_from_row(&r)).transpose()
    }

    #[instrument(skip(self, draft), fields(%id), err)]
    async fn update_header(
        &self,
        id: WithdrawalId,
        draft: &WithdrawalDraft,
    ) -> Result<CascadeOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE "withdrawal"
            SET "type" = $2,
                "for_branch_code" = $3,
                "for_department_code" = $4,
                "created_by_staff_code" = $5,
                "date" = $6,
                "return_by" = $7,
                "install_date" = $8
            WHERE "id" = $1 AND "status" = $9
            "#,
        )
        .bind(id.as_i64())
        .bind(draft.kind.as_str())
        .bind(draft.for_branch_code.as_ref().map(BranchCode::as_str))
        .bind(draft.for_department_code.as_ref().map(DepartmentCode::as_str))
        .bind(draft.created_by_staff_code.as_str())
        .bind(draft.date)
        .bind(draft.return_by)
        .bind(draft.install_date)
        .bind(WithdrawalStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_header", e))?;

        if result.rows_affected() == 0 {
            return Self::classify_guard_miss(&self.pool, id).await;
        }
        Ok(CascadeOutcome::Applied)
    }

    #[instrument(skip(self, remarks), fields(%id), err)]
    async fn update_remarks(
        &self,
        id: WithdrawalId,
        remarks: Option<&str>,
    ) -> Result<CascadeOutcome, StoreError> {
        let result = sqlx::query(r#"UPDATE "withdrawal" SET "remarks" = $2 WHERE "id" = $1"#)
            .bind(id.as_i64())
            .bind(remarks)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_remarks", e))?;

        if result.rows_affected() == 0 {
            return Ok(CascadeOutcome::NotFound);
        }
        Ok(CascadeOutcome::Applied)
    }

    #[instrument(skip(self, filter), err)]
    async fn list_withdrawals(
        &self,
        filter: &WithdrawalFilter,
        page: Page,
    ) -> Result<Vec<Withdrawal>, StoreError> {
        // Optional filters expressed as null-tolerant parameters, so one
        // prepared statement serves every filter combination.
        let rows = sqlx::query(
            r#"
            SELECT
                "id",
                "type",
                "status",
                "for_branch_code",
                "for_department_code",
                "created_by_staff_code",
                "date",
                "return_by",
                "install_date",
                "remarks"
            FROM "withdrawal"
            WHERE ($1::text IS NULL OR "type" = $1)
                AND ($2::text IS NULL OR "status" = $2)
                AND ($3::date IS NULL OR "date" >= $3)
                AND ($4::date IS NULL OR "date" <= $4)
            ORDER BY "id" ASC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.date_from)
        .bind(filter.date_to)
        .bind(i64::from(page.limit))
        .bind(i64::from(page.offset))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_withdrawals", e))?;

        rows.iter().map(withdrawal_from_row).collect()
    }

    #[instrument(skip(self), fields(serial = %serial), err)]
    async fn fetch_item(&self, serial: &SerialNo) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT "serial_no", "status", "reserved_branch_code"
            FROM "item"
            WHERE "serial_no" = $1
            "#,
        )
        .bind(serial.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_item", e))?;

        row.map(|r| item_from_row(&r)).transpose()
    }

    #[instrument(skip(self), fields(%id), err)]
    async fn items_of(&self, id: WithdrawalId) -> Result<Vec<Item>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT "item"."serial_no", "item"."status", "item"."reserved_branch_code"
            FROM "withdrawal_has_item"
            JOIN "item" ON "withdrawal_has_item"."serial_no" = "item"."serial_no"
            WHERE "withdrawal_has_item"."withdrawal_id" = $1
            ORDER BY "item"."serial_no" ASC
            "#,
        )
        .bind(id.as_i64())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("items_of", e))?;

        rows.iter().map(item_from_row).collect()
    }

    #[instrument(skip(self, eligible_from, branch), fields(%id, serial = %serial, target = %target), err)]
    async fn reserve_and_associate(
        &self,
        id: WithdrawalId,
        serial: &SerialNo,
        eligible_from: &[ItemStatus],
        target: ItemStatus,
        branch: Option<&BranchCode>,
    ) -> Result<ReserveOutcome, StoreError> {
        let eligible: Vec<String> = eligible_from.iter().map(|s| s.as_str().to_string()).collect();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        // Single compare-and-set: only a concurrent winner can beat us, and
        // then rows_affected is 0.
        let updated = sqlx::query(
            r#"
            UPDATE "item"
            SET "status" = $2, "reserved_branch_code" = $3
            WHERE "serial_no" = $1 AND "status" = ANY($4)
            "#,
        )
        .bind(serial.as_str())
        .bind(target.as_str())
        .bind(branch.map(BranchCode::as_str))
        .bind(&eligible)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("reserve_item", e))?;

        if updated.rows_affected() == 0 {
            let row = sqlx::query(r#"SELECT "status" FROM "item" WHERE "serial_no" = $1"#)
                .bind(serial.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("reserve_item", e))?;
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;

            return match row {
                None => Ok(ReserveOutcome::NotFound),
                Some(row) => {
                    let status: String = row
                        .try_get("status")
                        .map_err(|e| map_sqlx_error("reserve_item", e))?;
                    Ok(ReserveOutcome::Ineligible {
                        current: parse_item_status(&status)?,
                    })
                }
            };
        }

        // Same transaction as the item update: if this insert fails the
        // reservation rolls back, so no item is ever left reserved without
        // an association row.
        sqlx::query(
            r#"INSERT INTO "withdrawal_has_item" ("withdrawal_id", "serial_no") VALUES ($1, $2)"#,
        )
        .bind(id.as_i64())
        .bind(serial.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_association", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(ReserveOutcome::Reserved)
    }

    #[instrument(skip(self), fields(%id, serial = %serial), err)]
    async fn release_and_dissociate(
        &self,
        id: WithdrawalId,
        serial: &SerialNo,
        revert_to: ItemStatus,
    ) -> Result<ReleaseOutcome, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        let deleted = sqlx::query(
            r#"DELETE FROM "withdrawal_has_item" WHERE "withdrawal_id" = $1 AND "serial_no" = $2"#,
        )
        .bind(id.as_i64())
        .bind(serial.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("delete_association", e))?;

        if deleted.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(ReleaseOutcome::NotAssociated);
        }

        sqlx::query(
            r#"
            UPDATE "item"
            SET "status" = $2, "reserved_branch_code" = NULL
            WHERE "serial_no" = $1
            "#,
        )
        .bind(serial.as_str())
        .bind(revert_to.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("revert_item", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(ReleaseOutcome::Released)
    }

    #[instrument(skip(self, transition), fields(%id), err)]
    async fn confirm_withdrawal(
        &self,
        id: WithdrawalId,
        transition: Option<ItemTransition>,
    ) -> Result<CascadeOutcome, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        // The guard is part of the UPDATE itself, so the PENDING check the
        // engine made is re-validated under this transaction.
        let updated = sqlx::query(
            r#"UPDATE "withdrawal" SET "status" = $2 WHERE "id" = $1 AND "status" = $3"#,
        )
        .bind(id.as_i64())
        .bind(WithdrawalStatus::Confirmed.as_str())
        .bind(WithdrawalStatus::Pending.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("confirm_withdrawal", e))?;

        if updated.rows_affected() == 0 {
            let outcome = Self::classify_guard_miss(&mut *tx, id).await?;
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(outcome);
        }

        if let Some(t) = transition {
            sqlx::query(
                r#"
                UPDATE "item"
                SET "status" = $3, "reserved_branch_code" = NULL
                FROM "withdrawal_has_item"
                WHERE "item"."serial_no" = "withdrawal_has_item"."serial_no"
                    AND "withdrawal_has_item"."withdrawal_id" = $1
                    AND "item"."status" = $2
                "#,
            )
            .bind(id.as_i64())
            .bind(t.from.as_str())
            .bind(t.to.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("confirm_items", e))?;
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(CascadeOutcome::Applied)
    }

    #[instrument(skip(self), fields(%id), err)]
    async fn cancel_withdrawal(&self, id: WithdrawalId) -> Result<CascadeOutcome, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        // PENDING is the only non-terminal status.
        let updated = sqlx::query(
            r#"UPDATE "withdrawal" SET "status" = $2 WHERE "id" = $1 AND "status" = $3"#,
        )
        .bind(id.as_i64())
        .bind(WithdrawalStatus::Cancelled.as_str())
        .bind(WithdrawalStatus::Pending.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("cancel_withdrawal", e))?;

        if updated.rows_affected() == 0 {
            let outcome = Self::classify_guard_miss(&mut *tx, id).await?;
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(outcome);
        }

        sqlx::query(
            r#"
            UPDATE "item"
            SET "status" = $2, "reserved_branch_code" = NULL
            FROM "withdrawal_has_item"
            WHERE "item"."serial_no" = "withdrawal_has_item"."serial_no"
                AND "withdrawal_has_item"."withdrawal_id" = $1
            "#,
        )
        .bind(id.as_i64())
        .bind(ItemStatus::InStock.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("revert_items", e))?;

        sqlx::query(r#"DELETE FROM "withdrawal_has_item" WHERE "withdrawal_id" = $1"#)
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("purge_associations", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(CascadeOutcome::Applied)
    }

    #[instrument(skip(self), fields(%id), err)]
    async fn delete_withdrawal(&self, id: WithdrawalId) -> Result<CascadeOutcome, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        // Lock the header so the status we check is the status we delete.
        let row = sqlx::query(r#"SELECT "status" FROM "withdrawal" WHERE "id" = $1 FOR UPDATE"#)
            .bind(id.as_i64())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_withdrawal", e))?;

        let status = match row {
            None => {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Ok(CascadeOutcome::NotFound);
            }
            Some(row) => {
                let status: String = row
                    .try_get("status")
                    .map_err(|e| map_sqlx_error("delete_withdrawal", e))?;
                parse_status(&status)?
            }
        };

        if status != WithdrawalStatus::Cancelled {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(CascadeOutcome::WrongStatus { current: status });
        }

        sqlx::query(r#"DELETE FROM "withdrawal_has_item" WHERE "withdrawal_id" = $1"#)
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("purge_associations", e))?;

        // A failure here (e.g. a referential constraint) aborts the whole
        // transaction; the association rows above come back with it.
        sqlx::query(r#"DELETE FROM "withdrawal" WHERE "id" = $1"#)
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_header", e))?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(CascadeOutcome::Applied)
    }
}

const WITHDRAWAL_COLS_WHERE_ID: &str = r#"
    SELECT
        "id",
        "type",
        "status",
        "for_branch_code",
        "for_department_code",
        "created_by_staff_code",
        "date",
        "return_by",
        "install_date",
        "remarks"
    FROM "withdrawal"
    WHERE "id" = $1
"#;

fn withdrawal_from_row(row: &sqlx::postgres::PgRow) -> Result<Withdrawal, StoreError> {
    let kind: String = row.try_get("type").map_err(row_error)?;
    let status: String = row.try_get("status").map_err(row_error)?;
    let for_branch_code: Option<String> = row.try_get("for_branch_code").map_err(row_error)?;
    let for_department_code: Option<String> =
        row.try_get("for_department_code").map_err(row_error)?;
    let created_by: String = row.try_get("created_by_staff_code").map_err(row_error)?;

    Ok(Withdrawal {
        id: WithdrawalId::new(row.try_get("id").map_err(row_error)?),
        kind: parse_kind(&kind)?,
        status: parse_status(&status)?,
        for_branch_code: for_branch_code.map(BranchCode::new),
        for_department_code: for_department_code.map(DepartmentCode::new),
        created_by_staff_code: StaffCode::new(created_by),
        date: row.try_get("date").map_err(row_error)?,
        return_by: row.try_get("return_by").map_err(row_error)?,
        install_date: row.try_get("install_date").map_err(row_error)?,
        remarks: row.try_get("remarks").map_err(row_error)?,
    })
}

fn item_from_row(row: &sqlx::postgres::PgRow) -> Result<Item, StoreError> {
    let serial: String = row.try_get("serial_no").map_err(row_error)?;
    let status: String = row.try_get("status").map_err(row_error)?;
    let branch: Option<String> = row.try_get("reserved_branch_code").map_err(row_error)?;

    Ok(Item {
        serial_no: SerialNo::new(serial),
        status: parse_item_status(&status)?,
        reserved_branch_code: branch.map(BranchCode::new),
    })
}

fn parse_status(raw: &str) -> Result<WithdrawalStatus, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::Backend(format!("unexpected withdrawal status in row: {raw}")))
}

fn parse_kind(raw: &str) -> Result<WithdrawalKind, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::Backend(format!("unexpected withdrawal type in row: {raw}")))
}

fn parse_item_status(raw: &str) -> Result<ItemStatus, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::Backend(format!("unexpected item status in row: {raw}")))
}

fn row_error(e: sqlx::Error) -> StoreError {
    StoreError::Backend(format!("failed to decode row: {e}"))
}

/// Map sqlx errors to `StoreError` by Postgres error code.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("23503") | Some("23514") => StoreError::Constraint(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_row_literals_are_backend_errors() {
        assert!(parse_status("PENDING").is_ok());
        assert!(matches!(
            parse_status("SHIPPED"),
            Err(StoreError::Backend(_))
        ));
        assert!(matches!(
            parse_item_status("MISSING"),
            Err(StoreError::Backend(_))
        ));
        assert!(matches!(parse_kind("DONATION"), Err(StoreError::Backend(_))));
    }
}
