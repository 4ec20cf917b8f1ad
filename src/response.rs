//! Response envelopes: paginated listings and increment results.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResult<T> {
    pub data: Vec<T>,
    /// Rows in this page.
    pub count: u64,
    /// Rows matching the filter across all pages.
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub page_count: u64,
}

/// Wrap one page of rows. `pageCount = ceil(total / pageSize)` when both are
/// positive, else 1.
pub fn paginate<T>(data: Vec<T>, total: u64, page_size: u32, page: u32) -> PaginatedResult<T> {
    let page_count = if total > 0 && page_size > 0 {
        total.div_ceil(page_size as u64)
    } else {
        1
    };
    PaginatedResult {
        count: data.len() as u64,
        data,
        total,
        page,
        page_size,
        page_count,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementResult {
    pub success: bool,
    pub affected: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_count() {
        assert_eq!(paginate(vec![0; 20], 95, 20, 1).page_count, 5);
        assert_eq!(paginate(vec![0; 20], 100, 20, 1).page_count, 5);
        assert_eq!(paginate(Vec::<u8>::new(), 0, 20, 1).page_count, 1);
        assert_eq!(paginate(Vec::<u8>::new(), 10, 0, 1).page_count, 1);
    }

    #[test]
    fn test_envelope_shape() {
        let page = paginate(vec![json!({"id": 1})], 21, 10, 3);
        assert_eq!(
            serde_json::to_value(&page).unwrap(),
            json!({"data": [{"id": 1}], "count": 1, "total": 21, "page": 3, "pageSize": 10, "pageCount": 3})
        );
    }
}
