//! Readwise v2 API client.
//!
//! Only two endpoints are used: `auth/` to check the token and `export/` to page
//! through books with their highlights, filtered by `updatedAfter`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

use crate::config::Readwise;
use crate::error::{SourceError, SourceResult};

#[async_trait]
pub trait HighlightSource: Send + Sync {
    async fn validate_credentials(&self) -> SourceResult<()>;

    /// Returns every batch updated after `since`. Pagination happens inside; a page
    /// failure after the first page yields what was gathered with `complete == false`.
    async fn fetch_since(&self, since: Option<DateTime<Utc>>) -> SourceResult<FetchOutcome>;
}

#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub batches: Vec<HighlightBatch>,
    pub complete: bool,
}

/// A source document and its highlights.
#[derive(Debug, Clone, Deserialize)]
pub struct HighlightBatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub highlights: Vec<Highlight>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Highlight {
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub text: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub note: String,
    #[serde(default, deserialize_with = "nullable_string")]
    pub readwise_url: String,
}

#[derive(Debug, Deserialize)]
struct ExportPage {
    #[serde(default)]
    results: Vec<HighlightBatch>,
    #[serde(rename = "nextPageCursor", default)]
    next_page_cursor: Option<serde_json::Value>,
}

fn opaque_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn nullable_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn cursor_to_string(cursor: serde_json::Value) -> Option<String> {
    match cursor {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) if s.is_empty() => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

pub struct ReadwiseClient {
    client: Client,
    base_url: String,
    token: String,
}

impl ReadwiseClient {
    pub fn new(cfg: &Readwise) -> SourceResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            token: cfg.token.clone(),
        })
    }

    fn auth_header(&self) -> String {
        format!("Token {}", self.token)
    }

    async fn export_page(
        &self,
        since: Option<&str>,
        cursor: Option<&str>,
    ) -> SourceResult<ExportPage> {
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(cursor) = cursor {
            query.push(("pageCursor", cursor));
        }
        if let Some(since) = since {
            query.push(("updatedAfter", since));
        }

        tracing::debug!(?query, "requesting export page");
        let response = self
            .client
            .get(format!("{}/export/", self.base_url))
            .header("Authorization", self.auth_header())
            .query(&query)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json::<ExportPage>().await?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SourceError::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.trim().parse::<u64>().ok());
                Err(SourceError::RateLimited { retry_after })
            }
            status => {
                let message = response.text().await.unwrap_or_default();
                Err(SourceError::Api {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

#[async_trait]
impl HighlightSource for ReadwiseClient {
    async fn validate_credentials(&self) -> SourceResult<()> {
        let response = self
            .client
            .get(format!("{}/auth/", self.base_url))
            .header("Authorization", self.auth_header())
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT => {
                tracing::info!("readwise token is valid");
                Ok(())
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SourceError::Unauthorized),
            status => Err(SourceError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn fetch_since(&self, since: Option<DateTime<Utc>>) -> SourceResult<FetchOutcome> {
        let since = since.map(|ts| ts.to_rfc3339());
        tracing::info!(updated_after = since.as_deref().unwrap_or("beginning"), "fetching highlights");

        let mut outcome = FetchOutcome::default();
        let mut cursor: Option<String> = None;
        let mut pages = 0;

        loop {
            let page = match self.export_page(since.as_deref(), cursor.as_deref()).await {
                Ok(page) => page,
                Err(e) if pages == 0 => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        error = %crate::unpack_error(&e),
                        pages,
                        "failed to fetch a page of highlights, keeping what was gathered"
                    );
                    break;
                }
            };

            pages += 1;
            outcome.batches.extend(page.results);
            cursor = page.next_page_cursor.and_then(cursor_to_string);
            if cursor.is_none() {
                outcome.complete = true;
                break;
            }
        }

        tracing::info!(
            batches = outcome.batches.len(),
            pages,
            complete = outcome.complete,
            "fetched highlights"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_page_deserialize() {
        let body = serde_json::json!({
            "count": 1,
            "nextPageCursor": 1234,
            "results": [{
                "user_book_id": 7,
                "title": "Moby Dick",
                "author": null,
                "highlights": [
                    {"id": 99, "text": "Call me Ishmael.", "note": null, "readwise_url": "https://readwise.io/open/99"},
                    {"id": "abc", "text": "x"}
                ]
            }]
        });

        let page: ExportPage = serde_json::from_value(body).unwrap();
        assert_eq!(page.next_page_cursor.and_then(cursor_to_string), Some("1234".to_string()));
        let batch = &page.results[0];
        assert_eq!(batch.title.as_deref(), Some("Moby Dick"));
        assert_eq!(batch.author, None);
        assert_eq!(batch.highlights[0].id, "99");
        assert_eq!(batch.highlights[0].note, "");
        assert_eq!(batch.highlights[1].id, "abc");
        assert_eq!(batch.highlights[1].readwise_url, "");
    }

    #[test]
    fn test_cursor_end() {
        assert_eq!(cursor_to_string(serde_json::Value::Null), None);
        assert_eq!(cursor_to_string(serde_json::json!("")), None);
        assert_eq!(cursor_to_string(serde_json::json!("next")), Some("next".to_string()));
    }
}
