//! Offset-based pagination walker
//!
//! The Web API paginates every listing endpoint the same way: a `total`
//! count plus an `items` array, sometimes nested one level down (search
//! answers `{"albums": {"total": ..., "items": [...]}}`). `page_all` walks
//! such an endpoint to completion; `get_count` asks for the count alone.

use serde_json::Value;
use std::future::Future;

use crate::api::spotify::ApiError;

/// Page size requested from listing endpoints (the API maximum)
pub const DEFAULT_PAGE_LIMIT: u64 = 50;

/// One decoded page of a paginated response
#[derive(Debug, Clone)]
pub struct Page {
    pub total: u64,
    pub items: Vec<Value>,
}

/// Decode one page, descending into `sub_layer` when given
pub fn parse_page(response: &Value, sub_layer: Option<&str>) -> Result<Page, ApiError> {
    let layer = match sub_layer {
        Some(key) => response.get(key).ok_or_else(|| {
            ApiError::InvalidResponse(format!("missing `{}` layer in paged response", key))
        })?,
        None => response,
    };

    let total = layer
        .get("total")
        .and_then(Value::as_u64)
        .ok_or_else(|| ApiError::InvalidResponse("paged response without `total`".to_string()))?;

    let items = layer
        .get("items")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    Ok(Page { total, items })
}

/// Walk a paginated endpoint to completion and return all items in
/// received order.
///
/// `fetch` is called with `(limit, offset)` until the accumulated item
/// count reaches the reported total (or `max_items` when given). Items
/// beyond the total are truncated. An endpoint reporting `total == 0`
/// costs exactly one fetch and yields an empty list; an endpoint that
/// stops producing items terminates the walk rather than looping.
pub async fn page_all<F, Fut>(
    mut fetch: F,
    sub_layer: Option<&str>,
    limit: u64,
    max_items: Option<u64>,
) -> Result<Vec<Value>, ApiError>
where
    F: FnMut(u64, u64) -> Fut,
    Fut: Future<Output = Result<Value, ApiError>>,
{
    let mut items: Vec<Value> = Vec::new();
    let mut target: Option<u64> = max_items;

    loop {
        let response = fetch(limit, items.len() as u64).await?;
        let page = parse_page(&response, sub_layer)?;

        // The cap is max_items when given, else the first reported total,
        // never more than the endpoint claims to have
        let total = (*target.get_or_insert(page.total)).min(page.total) as usize;
        let fetched = page.items.len();
        let remaining = total.saturating_sub(items.len());
        items.extend(page.items.into_iter().take(remaining));

        if items.len() >= total || fetched == 0 {
            return Ok(items);
        }
    }
}

/// Fetch only the total item count of a paginated endpoint, with a single
/// minimal page request.
pub async fn get_count<F, Fut>(fetch: F, sub_layer: Option<&str>) -> Result<u64, ApiError>
where
    F: FnOnce(u64, u64) -> Fut,
    Fut: Future<Output = Result<Value, ApiError>>,
{
    let response = fetch(1, 0).await?;
    Ok(parse_page(&response, sub_layer)?.total)
}
