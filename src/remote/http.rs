//! HTTP remote store.
//!
//! Talks to a JSON REST collection (json-server style):
//!
//! | Operation | Request |
//! |---|---|
//! | fetch all | `GET {base}` |
//! | create | `POST {base}` |
//! | update | `PATCH {base}/{id}` |
//! | delete | `DELETE {base}/{id}` |
//! | health | `HEAD {base}` |

use std::time::Duration;

use reqwest::{Client, Response, Url};
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{Record, RecordPatch};
use crate::storage::cache::records_from_values;

use super::store::RemoteStore;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// reqwest-based [`RemoteStore`].
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base: Url,
}

impl HttpRemoteStore {
    /// Create a store for the collection at `base_url` with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is invalid or the client cannot
    /// be built.
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Create a store with a custom per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is invalid or the client cannot
    /// be built.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("Invalid server URL '{base_url}': {e}")))?;
        if base.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "Server URL '{base_url}' cannot have path segments"
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client, base })
    }

    /// The collection URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    /// URL of a single record, with the id percent-encoded as one segment.
    #[must_use]
    pub fn item_url(&self, id: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(id);
        }
        url
    }

    async fn decode_record(response: Response) -> Result<Record> {
        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Format(format!("response is not JSON: {e}")))?;
        serde_json::from_value(body)
            .map_err(|e| Error::Format(format!("response is not a record: {e}")))
    }
}

impl RemoteStore for HttpRemoteStore {
    async fn fetch_all(&self) -> Result<Vec<Record>> {
        let response = self
            .client
            .get(self.base.clone())
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Format(format!("response is not JSON: {e}")))?;

        match body {
            Value::Array(items) => Ok(records_from_values(items)),
            other => Err(Error::Format(format!(
                "expected an array of quotes, got {}",
                json_kind(&other)
            ))),
        }
    }

    async fn create(&self, record: &Record) -> Result<Record> {
        let response = self
            .client
            .post(self.base.clone())
            .json(record)
            .send()
            .await?
            .error_for_status()?;

        Self::decode_record(response).await
    }

    async fn update(&self, id: &str, patch: &RecordPatch) -> Result<Record> {
        let response = self
            .client
            .patch(self.item_url(id))
            .json(patch)
            .send()
            .await?
            .error_for_status()?;

        Self::decode_record(response).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.client
            .delete(self.item_url(id))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn health_check(&self) -> bool {
        match self.client.head(self.base.clone()).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                debug!(status = %response.status(), "health check failed");
                false
            }
            Err(e) => {
                debug!(error = %e, "health check failed");
                false
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    // Port 9 (discard) is closed on loopback in test environments.
    const DEAD_URL: &str = "http://127.0.0.1:9/quotes";

    #[test]
    fn test_invalid_url_is_config_error() {
        assert!(matches!(
            HttpRemoteStore::new("not a url"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            HttpRemoteStore::new("mailto:someone@example.com"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_item_url_encodes_id() {
        let store = HttpRemoteStore::new("http://localhost:3000/quotes").unwrap();
        assert_eq!(store.item_url("7").as_str(), "http://localhost:3000/quotes/7");
        assert_eq!(
            store.item_url("a b/c").as_str(),
            "http://localhost:3000/quotes/a%20b%2Fc"
        );

        let trailing = HttpRemoteStore::new("http://localhost:3000/quotes/").unwrap();
        assert_eq!(trailing.item_url("7").as_str(), "http://localhost:3000/quotes/7");
    }

    #[test]
    fn test_json_kind() {
        assert_eq!(json_kind(&serde_json::json!({})), "an object");
        assert_eq!(json_kind(&serde_json::json!(null)), "null");
    }

    #[tokio::test]
    async fn test_health_check_unreachable_is_false() {
        let store = HttpRemoteStore::with_timeout(DEAD_URL, Duration::from_millis(500)).unwrap();
        assert!(!store.health_check().await);
    }

    #[tokio::test]
    async fn test_fetch_unreachable_is_network_error() {
        let store = HttpRemoteStore::with_timeout(DEAD_URL, Duration::from_millis(500)).unwrap();
        let err = store.fetch_all().await.unwrap_err();
        assert!(matches!(err, Error::Network(_)), "got {err:?}");
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_create_unreachable_is_network_error() {
        let store = HttpRemoteStore::with_timeout(DEAD_URL, Duration::from_millis(500)).unwrap();
        let record = Record::new("text", "cat", None);
        assert!(matches!(store.create(&record).await, Err(Error::Network(_))));
    }

    // ── Canned responses ──────────────────────────────────────

    struct Canned {
        status: &'static str,
        body: &'static str,
        delay: Duration,
    }

    fn reply(status: &'static str, body: &'static str) -> Canned {
        Canned {
            status,
            body,
            delay: Duration::ZERO,
        }
    }

    /// Serve one canned response per connection, in order. The handle
    /// yields the raw requests received.
    async fn serve(responses: Vec<Canned>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/quotes", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();
            for canned in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                requests.push(read_request(&mut socket).await);
                tokio::time::sleep(canned.delay).await;
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    canned.status,
                    canned.body.len(),
                    canned.body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
            requests
        });

        (url, handle)
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut raw = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&raw);
            let Some(header_end) = text.find("\r\n\r\n") else {
                continue;
            };
            let length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if raw.len() >= header_end + 4 + length {
                break;
            }
        }
        String::from_utf8_lossy(&raw).into_owned()
    }

    fn store(url: &str) -> HttpRemoteStore {
        HttpRemoteStore::with_timeout(url, Duration::from_millis(300)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_server_error_is_network_error() {
        let (url, server) = serve(vec![reply("500 Internal Server Error", "{}")]).await;

        let err = store(&url).fetch_all().await.unwrap_err();

        assert!(matches!(err, Error::Network(ref msg) if msg.contains("500")), "got {err:?}");
        assert!(err.is_transient());
        assert!(server.await.unwrap()[0].starts_with("GET /quotes "));
    }

    #[tokio::test]
    async fn test_fetch_non_array_is_format_error() {
        let (url, _server) = serve(vec![reply("200 OK", r#"{"quotes":[]}"#)]).await;

        let err = store(&url).fetch_all().await.unwrap_err();

        assert!(matches!(err, Error::Format(ref msg) if msg.contains("an object")), "got {err:?}");
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_fetch_invalid_json_is_format_error() {
        let (url, _server) = serve(vec![reply("200 OK", "<html>")]).await;
        let err = store(&url).fetch_all().await.unwrap_err();
        assert!(matches!(err, Error::Format(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_fetch_skips_non_object_elements() {
        let body = r#"[{"id":"1","text":"A","category":"X","author":"Bob","editable":false}, 5, "x"]"#;
        let (url, _server) = serve(vec![reply("200 OK", body)]).await;

        let records = store(&url).fetch_all().await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "1");
        assert!(!records[0].editable);
    }

    #[tokio::test]
    async fn test_slow_response_times_out_as_network_error() {
        let (url, server) = serve(vec![Canned {
            status: "200 OK",
            body: "[]",
            delay: Duration::from_secs(2),
        }])
        .await;

        let err = store(&url).fetch_all().await.unwrap_err();

        assert!(matches!(err, Error::Network(ref msg) if msg.contains("timed out")), "got {err:?}");
        server.abort();
    }

    #[tokio::test]
    async fn test_health_check_follows_status() {
        let (url, server) = serve(vec![
            reply("503 Service Unavailable", ""),
            reply("200 OK", ""),
        ])
        .await;
        let store = store(&url);

        assert!(!store.health_check().await);
        assert!(store.health_check().await);

        let requests = server.await.unwrap();
        assert!(requests.iter().all(|r| r.starts_with("HEAD /quotes ")));
    }

    #[tokio::test]
    async fn test_create_returns_echoed_record() {
        let body = r#"{"id":"srv-1","text":"A","category":"X","author":"Bob","editable":true}"#;
        let (url, server) = serve(vec![reply("201 Created", body)]).await;

        let created = store(&url)
            .create(&Record::new("A", "X", Some("Bob")))
            .await
            .unwrap();

        assert_eq!(created.id, "srv-1");
        let request = &server.await.unwrap()[0];
        assert!(request.starts_with("POST /quotes "));
        assert!(request.contains(r#""text":"A""#));
    }

    #[tokio::test]
    async fn test_update_and_delete_target_item_url() {
        let body = r#"{"id":"7","text":"B","category":"X","author":"Bob","editable":true}"#;
        let (url, server) = serve(vec![reply("200 OK", body), reply("204 No Content", "")]).await;
        let store = store(&url);

        let patch = RecordPatch {
            text: Some("B".into()),
            ..Default::default()
        };
        assert_eq!(store.update("7", &patch).await.unwrap().text, "B");
        store.delete("7").await.unwrap();

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("PATCH /quotes/7 "));
        assert!(requests[0].ends_with(r#"{"text":"B"}"#));
        assert!(requests[1].starts_with("DELETE /quotes/7 "));
    }

    #[tokio::test]
    async fn test_delete_not_found_is_network_error() {
        let (url, _server) = serve(vec![reply("404 Not Found", "{}")]).await;
        assert!(matches!(store(&url).delete("7").await, Err(Error::Network(_))));
    }
}
