use crate::error::AppError;
use crate::query::Query;
use backbone_domain::cache::InvalidationMetricsSnapshot;
use backbone_domain::dead_letter::{DeadLetterFilter, DeadLetterPage, DeadLetterStatus, Pagination};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// 死信列表查询（对应 `GET /dlq` 的查询参数）
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDeadLetters {
    pub event_name: Option<String>,
    pub status: Option<DeadLetterStatus>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListDeadLetters {
    pub(crate) fn into_parts(self) -> Result<(DeadLetterFilter, Pagination), AppError> {
        if let (Some(from), Some(to)) = (self.from_date, self.to_date) {
            if from > to {
                return Err(AppError::Validation(format!(
                    "fromDate {from} is after toDate {to}"
                )));
            }
        }
        if self.limit == Some(0) {
            return Err(AppError::Validation("limit must be positive".into()));
        }

        let filter = DeadLetterFilter {
            event_name: self.event_name,
            status: self.status,
            from_date: self.from_date,
            to_date: self.to_date,
        };
        let page = Pagination::new(
            self.limit.unwrap_or(Pagination::DEFAULT_LIMIT),
            self.offset.unwrap_or(0),
        );
        Ok((filter, page))
    }
}

impl Query for ListDeadLetters {
    const NAME: &'static str = "ListDeadLetters";
    type Dto = DeadLetterPage;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct GetCacheMetrics;

impl Query for GetCacheMetrics {
    const NAME: &'static str = "GetCacheMetrics";
    type Dto = InvalidationMetricsSnapshot;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn binds_query_string_shape_and_clamps_limit() {
        let q: ListDeadLetters = serde_json::from_value(json!({
            "eventName": "UserUpdated",
            "status": "pending",
            "limit": 10_000
        }))
        .unwrap();

        let (filter, page) = q.into_parts().unwrap();
        assert_eq!(filter.event_name.as_deref(), Some("UserUpdated"));
        assert_eq!(filter.status, Some(DeadLetterStatus::Pending));
        assert_eq!(page.limit, Pagination::MAX_LIMIT);
        assert_eq!(page.offset, 0);
    }

    #[test]
    fn rejects_inverted_date_window_and_zero_limit() {
        let now = Utc::now();
        let inverted = ListDeadLetters {
            from_date: Some(now),
            to_date: Some(now - Duration::hours(1)),
            ..Default::default()
        };
        assert!(matches!(inverted.into_parts(), Err(AppError::Validation(_))));

        let zero = ListDeadLetters {
            limit: Some(0),
            ..Default::default()
        };
        assert!(matches!(zero.into_parts(), Err(AppError::Validation(_))));

        let (_, page) = ListDeadLetters::default().into_parts().unwrap();
        assert_eq!(page, Pagination::default());
    }
}
