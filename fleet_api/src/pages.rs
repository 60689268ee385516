use std::sync::Arc;

use anyhow::Result;
use async_stream::stream;
use futures::Stream;
use url::Url;

use crate::fetcher::JsonFetcher;

const CONTINUATION_TOKEN_FIELD: &str = "continuationToken";

/// Offset pagination: request `count` items per page, advancing `offset`
/// until a page comes back short. The upstream has no other stop signal.
/// Pages are fetched lazily, one per poll, so callers can stop early
/// without paying for pages they never consume.
pub fn offset_pages(
    fetcher: Arc<dyn JsonFetcher>,
    base_url: Url,
    items_field: &'static str,
    page_size: u64,
) -> impl Stream<Item = Result<serde_json::Value>> {
    stream! {
        let mut offset = 0u64;
        loop {
            let mut url = base_url.clone();
            url.query_pairs_mut()
                .append_pair("count", &page_size.to_string());
            if offset > 0 {
                url.query_pairs_mut()
                    .append_pair("offset", &offset.to_string());
            }
            let page = match fetcher.fetch_json(&url).await {
                Ok(page) => page,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };
            let item_count = page
                .get(items_field)
                .and_then(|items| items.as_array())
                .map(|items| items.len() as u64)
                .unwrap_or(0);
            yield Ok(page);
            if item_count < page_size {
                break;
            }
            offset += page_size;
        }
    }
}

/// Continuation-token pagination: follow the token the response echoes
/// until a page arrives without one. Every page is yielded; accumulation
/// is the caller's job.
pub fn token_pages(
    fetcher: Arc<dyn JsonFetcher>,
    base_url: Url,
) -> impl Stream<Item = Result<serde_json::Value>> {
    stream! {
        let mut token: Option<String> = None;
        loop {
            let mut url = base_url.clone();
            if let Some(token) = &token {
                url.query_pairs_mut()
                    .append_pair(CONTINUATION_TOKEN_FIELD, token);
            }
            let page = match fetcher.fetch_json(&url).await {
                Ok(page) => page,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };
            token = page
                .get(CONTINUATION_TOKEN_FIELD)
                .and_then(|t| t.as_str())
                .map(|t| t.to_string());
            yield Ok(page);
            if token.is_none() {
                break;
            }
        }
    }
}
