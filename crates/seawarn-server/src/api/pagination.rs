use serde::Deserialize;
use utoipa::IntoParams;

/// Query-string paging for the alert and delivery list endpoints.
/// Values arrive as text in the query string; axum's `Query` extractor
/// parses them into integers and rejects anything else with a 400.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    /// Page size, capped at 1000 (default 20)
    #[param(required = false)]
    pub limit: Option<u64>,
    /// Rows to skip (default 0)
    #[param(required = false)]
    pub offset: Option<u64>,
}

const DEFAULT_PAGE_LIMIT: u64 = 20;
const MAX_PAGE_LIMIT: u64 = 1000;

impl PaginationParams {
    pub fn limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT) as usize
    }

    pub fn offset(&self) -> usize {
        self.offset.unwrap_or(0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let p = PaginationParams::default();
        assert_eq!(p.limit(), 20);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn limit_is_clamped_to_a_sane_range() {
        let p = PaginationParams {
            limit: Some(1_000_000),
            offset: Some(40),
        };
        assert_eq!(p.limit(), 1000);
        assert_eq!(p.offset(), 40);

        let p = PaginationParams {
            limit: Some(0),
            offset: None,
        };
        assert_eq!(p.limit(), 1);
    }
}
