//! Postgres 死信仓储（PgDeadLetterRepository）
//!
//! 表结构见 `migrations/0001_dead_letter_events.sql`。pending 窗口内的去重由部分唯一索引
//! `(event_id, handler_id) WHERE status = 'pending'` 保证，`upsert_pending` 使用
//! `INSERT ... ON CONFLICT ... DO UPDATE` 一次往返完成。
//! 状态迁移与失败计数都是带 `WHERE status = ...` 条件的单条 `UPDATE ... RETURNING`。
//!
use super::entry::{DeadLetterEntry, DeadLetterFilter, DeadLetterStatus, Pagination, RetryFailure};
use super::repository::DeadLetterRepository;
use crate::error::{DomainError, DomainResult as Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

const COLUMNS: &str = "id, event_id, event_name, event_data, handler_id, error_message, \
     error_stack, retry_count, last_retry_at, created_at, status, correlation_id, source_id";

#[derive(Debug, FromRow)]
struct DeadLetterRow {
    id: Uuid,
    event_id: String,
    event_name: String,
    event_data: Value,
    handler_id: String,
    error_message: String,
    error_stack: Option<String>,
    retry_count: i32,
    last_retry_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    status: String,
    correlation_id: Option<String>,
    source_id: Option<String>,
}

impl TryFrom<DeadLetterRow> for DeadLetterEntry {
    type Error = DomainError;

    fn try_from(row: DeadLetterRow) -> Result<Self> {
        Ok(DeadLetterEntry {
            id: row.id,
            event_id: row.event_id,
            event_name: row.event_name,
            event_data: row.event_data,
            handler_id: row.handler_id,
            error_message: row.error_message,
            error_stack: row.error_stack,
            retry_count: u32::try_from(row.retry_count).map_err(|_| DomainError::InvalidValue {
                reason: format!(
                    "negative retry_count {} for dead letter {}",
                    row.retry_count, row.id
                ),
            })?,
            last_retry_at: row.last_retry_at,
            created_at: row.created_at,
            status: row.status.parse::<DeadLetterStatus>()?,
            correlation_id: row.correlation_id,
            source_id: row.source_id,
        })
    }
}

#[derive(Clone)]
pub struct PgDeadLetterRepository {
    pool: PgPool,
}

impl PgDeadLetterRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &DeadLetterFilter) {
        builder.push(" WHERE 1 = 1");
        if let Some(name) = &filter.event_name {
            builder.push(" AND event_name = ").push_bind(name.clone());
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(from) = filter.from_date {
            builder.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = filter.to_date {
            builder.push(" AND created_at <= ").push_bind(to);
        }
    }
}

#[async_trait]
impl DeadLetterRepository for PgDeadLetterRepository {
    async fn upsert_pending(&self, entry: DeadLetterEntry) -> Result<DeadLetterEntry> {
        let sql = format!(
            r#"
            INSERT INTO dead_letter_events
                (id, event_id, event_name, event_data, handler_id, error_message, error_stack,
                 retry_count, created_at, status, correlation_id, source_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending', $10, $11)
            ON CONFLICT (event_id, handler_id) WHERE status = 'pending' DO UPDATE SET
                retry_count = dead_letter_events.retry_count + 1,
                error_message = EXCLUDED.error_message,
                error_stack = EXCLUDED.error_stack,
                last_retry_at = NOW()
            RETURNING {COLUMNS}
            "#
        );

        let row: DeadLetterRow = sqlx::query_as(&sql)
            .bind(entry.id)
            .bind(&entry.event_id)
            .bind(&entry.event_name)
            .bind(&entry.event_data)
            .bind(&entry.handler_id)
            .bind(&entry.error_message)
            .bind(&entry.error_stack)
            .bind(entry.retry_count as i32)
            .bind(entry.created_at)
            .bind(&entry.correlation_id)
            .bind(&entry.source_id)
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    async fn get(&self, id: Uuid) -> Result<Option<DeadLetterEntry>> {
        let sql = format!("SELECT {COLUMNS} FROM dead_letter_events WHERE id = $1");
        let row: Option<DeadLetterRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(DeadLetterEntry::try_from).transpose()
    }

    async fn transition(
        &self,
        id: Uuid,
        from: DeadLetterStatus,
        to: DeadLetterStatus,
    ) -> Result<Option<DeadLetterEntry>> {
        let sql = format!(
            "UPDATE dead_letter_events SET status = $3 \
             WHERE id = $1 AND status = $2 RETURNING {COLUMNS}"
        );
        let row: Option<DeadLetterRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(from.as_str())
            .bind(to.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| match err {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    DomainError::InvalidState {
                        reason: format!("another pending dead letter exists for {id}"),
                    }
                }
                other => other.into(),
            })?;

        row.map(DeadLetterEntry::try_from).transpose()
    }

    async fn record_retry_failure(
        &self,
        id: Uuid,
        failure: &RetryFailure,
    ) -> Result<Option<DeadLetterEntry>> {
        let sql = format!(
            r#"
            UPDATE dead_letter_events
            SET retry_count = retry_count + 1,
                error_message = $2,
                error_stack = $3,
                last_retry_at = NOW(),
                status = CASE WHEN $4 OR retry_count + 1 > $5 THEN 'exhausted' ELSE 'pending' END
            WHERE id = $1 AND status = 'pending'
            RETURNING {COLUMNS}
            "#
        );
        let row: Option<DeadLetterRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(&failure.error_message)
            .bind(&failure.error_stack)
            .bind(failure.permanent)
            .bind(i32::try_from(failure.max_retry_count).unwrap_or(i32::MAX))
            .fetch_optional(&self.pool)
            .await?;

        row.map(DeadLetterEntry::try_from).transpose()
    }

    async fn list(
        &self,
        filter: &DeadLetterFilter,
        page: Pagination,
    ) -> Result<(Vec<DeadLetterEntry>, u64)> {
        let page = page.normalized();

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM dead_letter_events");
        Self::push_filter(&mut count, filter);
        let (total,): (i64,) = count.build_query_as().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {COLUMNS} FROM dead_letter_events"
        ));
        Self::push_filter(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(i64::from(page.offset));

        let rows: Vec<DeadLetterRow> = select.build_query_as().fetch_all(&self.pool).await?;
        let entries = rows
            .into_iter()
            .map(DeadLetterEntry::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok((entries, total.max(0) as u64))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM dead_letter_events WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(retry_count: i32, status: &str) -> DeadLetterRow {
        DeadLetterRow {
            id: Uuid::new_v4(),
            event_id: "e-1".into(),
            event_name: "UserUpdated".into(),
            event_data: json!({"userId": "u1"}),
            handler_id: "audit".into(),
            error_message: "boom".into(),
            error_stack: None,
            retry_count,
            last_retry_at: None,
            created_at: Utc::now(),
            status: status.into(),
            correlation_id: None,
            source_id: None,
        }
    }

    #[test]
    fn row_converts_to_entry() {
        let entry = DeadLetterEntry::try_from(row(3, "exhausted")).unwrap();
        assert_eq!(entry.retry_count, 3);
        assert_eq!(entry.status, DeadLetterStatus::Exhausted);
    }

    #[test]
    fn corrupt_rows_are_rejected() {
        assert!(matches!(
            DeadLetterEntry::try_from(row(-1, "pending")),
            Err(DomainError::InvalidValue { .. })
        ));
        assert!(matches!(
            DeadLetterEntry::try_from(row(0, "archived")),
            Err(DomainError::InvalidValue { .. })
        ));
    }
}
