//! Notion sink: one database page per synced row.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use sheetsync_engine::{RecordSchema, SinkAck, SinkError, SinkWriter, SyncRecord};

/// API version sent with every request.
pub const NOTION_VERSION: &str = "2022-06-28";

/// Writes records as pages of a Notion database.
#[derive(Debug, Clone)]
pub struct NotionClient {
    http: Client,
    base_url: String,
    api_key: String,
    database_id: String,
    schema: RecordSchema,
}

#[derive(Debug, Deserialize)]
struct CreatedPage {
    id: String,
}

impl NotionClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        database_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            database_id: database_id.into(),
            schema: RecordSchema::form_submission(),
        })
    }

    pub fn database_id(&self) -> &str {
        &self.database_id
    }

    /// Page creation body for a record.
    pub fn page_payload(&self, record: &SyncRecord) -> Value {
        let text = |name: &str| record.value(name).unwrap_or_default();

        json!({
            "parent": { "database_id": self.database_id },
            "properties": {
                "Name": { "title": [{ "text": { "content": text("name") } }] },
                "Email": { "email": text("email") },
                "Description": { "rich_text": [{ "text": { "content": text("message") } }] },
                "Date": { "date": { "start": text("date") } },
            }
        })
    }
}

/// Map a failed response to the engine's retry classification.
///
/// Validation failures are final. Auth, missing database, conflicts, rate
/// limits and server errors can all clear up without touching the row.
fn classify(status: StatusCode, body: String) -> SinkError {
    let reason = format!("Notion API returned {}: {}", status.as_u16(), notion_message(&body));
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => SinkError::Rejected(reason),
        _ => SinkError::Unavailable(reason),
    }
}

/// Notion errors carry a `message` field; fall back to the raw body.
fn notion_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl SinkWriter for NotionClient {
    async fn write(&self, record: &SyncRecord) -> Result<SinkAck, SinkError> {
        self.schema
            .validate(record)
            .map_err(|e| SinkError::Rejected(e.to_string()))?;

        let response = self
            .http
            .post(format!("{}/v1/pages", self.base_url))
            .bearer_auth(&self.api_key)
            .header("Notion-Version", NOTION_VERSION)
            .json(&self.page_payload(record))
            .send()
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify(status, body));
        }

        // The page exists at this point; an unreadable body only loses the id.
        let ack = match response.json::<CreatedPage>().await {
            Ok(page) => SinkAck::new(page.id),
            Err(e) => {
                tracing::warn!("Notion page created but response unreadable: {}", e);
                SinkAck::default()
            }
        };

        tracing::info!(
            row = record.source_index,
            page_id = ?ack.remote_id,
            "Added to Notion"
        );
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetsync_engine::{FormRowTransformer, RawRow, RowTransformer};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> NotionClient {
        NotionClient::new(server.uri(), "secret_test", "db-123", Duration::from_secs(5)).unwrap()
    }

    fn record(date: &str) -> SyncRecord {
        FormRowTransformer::new().transform(
            4,
            &RawRow::new(["Alice", "alice@example.com", "Hello", date]),
        )
    }

    #[test]
    fn payload_maps_form_fields() {
        let notion =
            NotionClient::new("http://localhost", "k", "db-123", Duration::from_secs(1)).unwrap();
        let payload = notion.page_payload(&record("2024-02-01"));

        assert_eq!(payload["parent"]["database_id"], "db-123");
        assert_eq!(payload["properties"]["Name"]["title"][0]["text"]["content"], "Alice");
        assert_eq!(payload["properties"]["Email"]["email"], "alice@example.com");
        assert_eq!(
            payload["properties"]["Description"]["rich_text"][0]["text"]["content"],
            "Hello"
        );
        assert_eq!(payload["properties"]["Date"]["date"]["start"], "2024-02-01");
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify(StatusCode::BAD_REQUEST, r#"{"message":"bad date"}"#.into()),
            SinkError::Rejected(reason) if reason.contains("bad date")
        ));
        assert!(classify(StatusCode::UNPROCESSABLE_ENTITY, String::new()) == SinkError::Rejected(
            "Notion API returned 422: ".into()
        ));
        assert!(classify(StatusCode::TOO_MANY_REQUESTS, String::new()).is_retryable());
        assert!(classify(StatusCode::UNAUTHORIZED, String::new()).is_retryable());
        assert!(classify(StatusCode::NOT_FOUND, String::new()).is_retryable());
        assert!(classify(StatusCode::SERVICE_UNAVAILABLE, String::new()).is_retryable());
    }

    #[tokio::test]
    async fn creates_page_and_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/pages"))
            .and(header("authorization", "Bearer secret_test"))
            .and(header("notion-version", NOTION_VERSION))
            .and(body_partial_json(json!({ "parent": { "database_id": "db-123" } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "page",
                "id": "page-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let ack = client(&server).write(&record("2024-02-01")).await.unwrap();
        assert_eq!(ack.remote_id.as_deref(), Some("page-1"));
    }

    #[tokio::test]
    async fn invalid_record_is_rejected_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let result = client(&server).write(&record("not a date")).await;
        assert!(matches!(
            result,
            Err(SinkError::Rejected(reason)) if reason.starts_with("type mismatch for field 'date'")
        ));
    }

    #[tokio::test]
    async fn rate_limit_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "object": "error",
                "code": "rate_limited",
                "message": "slow down"
            })))
            .mount(&server)
            .await;

        let err = client(&server).write(&record("2024-02-01")).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn validation_error_is_final() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "object": "error",
                "code": "validation_error",
                "message": "Email is not a property that exists."
            })))
            .mount(&server)
            .await;

        let err = client(&server).write(&record("2024-02-01")).await.unwrap_err();
        assert!(matches!(err, SinkError::Rejected(_)));
    }
}
