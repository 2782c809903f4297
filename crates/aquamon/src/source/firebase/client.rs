use async_trait::async_trait;
use futures::StreamExt;
use reqwest::RequestBuilder;
use reqwest::Response;
use reqwest::header;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::stream::RecordStream;
use super::stream::SseDecoder;
use crate::config::FirebaseConfig;
use crate::source::DataSource;
use crate::source::Patch;
use crate::source::SUBSCRIPTION_CHANNEL_SIZE;
use crate::source::SourceError;
use crate::source::Subscription;
use crate::source::tree;

/// Realtime Database backend speaking the REST and streaming protocol.
///
/// No timeouts are configured: a stalled request stalls only the caller
/// awaiting it.
pub struct FirebaseSource {
    http: reqwest::Client,
    base_url: String,
    auth: Option<String>,
}

impl FirebaseSource {
    pub fn new(config: &FirebaseConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("aquamon/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            auth: config.auth.clone(),
        })
    }

    /// REST URL for a database path (`/FirebasePWI` -> `{base}/FirebasePWI.json`).
    pub fn url(&self, path: &str) -> String {
        let path = tree::normalize(path);
        if path == "/" {
            format!("{}/.json", self.base_url)
        } else {
            format!("{}{}.json", self.base_url, path)
        }
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Some(auth) => request.query(&[("auth", auth)]),
            None => request,
        }
    }
}

/// Turn non-success responses into `SourceError::Status`, keeping the body.
async fn check_status(response: Response) -> Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SourceError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl DataSource for FirebaseSource {
    fn name(&self) -> &str {
        "firebase"
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, SourceError> {
        let url = self.url(path);
        info!("Opening stream on {}", url);

        let response = self
            .with_auth(self.http.get(&url))
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = check_status(response).await?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_CHANNEL_SIZE);
        let task = tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut decoder = SseDecoder::new();
            let mut record = RecordStream::new();

            'stream: while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        error!("Stream on {} failed: {}", url, e);
                        break;
                    }
                };

                for frame in decoder.feed(&chunk) {
                    debug!("Stream event '{}' on {}", frame.event, url);
                    match record.apply(&frame) {
                        Ok(Some(event)) => {
                            if tx.send(event).await.is_err() {
                                break 'stream;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            error!("Stream on {} ended: {}", url, e);
                            break 'stream;
                        }
                    }
                }
            }

            warn!("Stream task for {} exiting", url);
        });

        Ok(Subscription::new(rx, Some(task)))
    }

    async fn get(&self, path: &str) -> Result<Option<Value>, SourceError> {
        let response = self.with_auth(self.http.get(self.url(path))).send().await?;
        let value: Value = check_status(response).await?.json().await?;
        Ok(match value {
            Value::Null => None,
            v => Some(v),
        })
    }

    async fn patch(&self, path: &str, patch: &Patch) -> Result<(), SourceError> {
        let response = self
            .with_auth(self.http.patch(self.url(path)))
            .json(patch)
            .send()
            .await?;
        check_status(response).await?;
        debug!("Patched {} with {:?}", path, patch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::time::Duration;

    use axum::Router;
    use axum::body::Body;
    use axum::extract::RawQuery;
    use axum::extract::State;
    use axum::http::HeaderMap;
    use axum::http::StatusCode;
    use axum::http::header as http_header;
    use axum::response::IntoResponse;
    use axum::response::Response;
    use axum::routing::get;
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::*;
    use crate::source::RecordEvent;

    fn source(url: &str) -> FirebaseSource {
        source_with_auth(url, None)
    }

    fn source_with_auth(url: &str, auth: Option<&str>) -> FirebaseSource {
        FirebaseSource::new(&FirebaseConfig {
            url: url.to_string(),
            auth: auth.map(str::to_string),
        })
        .unwrap()
    }

    /// A request as the fake database saw it.
    #[derive(Debug, Clone)]
    struct Seen {
        method: &'static str,
        query: Option<String>,
        accept: Option<String>,
        body: String,
    }

    type Log = Arc<Mutex<Vec<Seen>>>;

    const STREAM_FRAMES: &[&str] = &[
        "event: put\ndata: {\"path\":\"/\",\"data\":{\"POMPA1\":\"1\",",
        "\"SUHU\":26}}\n\n",
        "event: keep-alive\ndata: null\n\n",
        "event: patch\ndata: {\"path\":\"/\",\"data\":{\"POMPA1\":\"0\"}}\n\n",
        "event: cancel\ndata: permission denied\n\n",
    ];

    fn accept(headers: &HeaderMap) -> Option<String> {
        headers
            .get(http_header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    async fn record_get(
        State(log): State<Log>,
        headers: HeaderMap,
        RawQuery(query): RawQuery,
    ) -> Response {
        let accept = accept(&headers);
        log.lock().unwrap().push(Seen {
            method: "GET",
            query,
            accept: accept.clone(),
            body: String::new(),
        });

        if accept.as_deref() == Some("text/event-stream") {
            // The connection stays open after `cancel`; only the client
            // can end the subscription.
            let frames = futures::stream::iter(
                STREAM_FRAMES
                    .iter()
                    .map(|f| Ok::<_, Infallible>(f.to_string())),
            )
            .chain(futures::stream::pending());
            return (
                [(http_header::CONTENT_TYPE, "text/event-stream")],
                Body::from_stream(frames),
            )
                .into_response();
        }

        axum::Json(json!({"POMPA1": "1", "SUHU": 26})).into_response()
    }

    async fn record_patch(
        State(log): State<Log>,
        headers: HeaderMap,
        RawQuery(query): RawQuery,
        body: String,
    ) -> impl IntoResponse {
        log.lock().unwrap().push(Seen {
            method: "PATCH",
            query,
            accept: accept(&headers),
            body: body.clone(),
        });
        body
    }

    async fn missing() -> impl IntoResponse {
        "null"
    }

    async fn denied() -> impl IntoResponse {
        (
            StatusCode::UNAUTHORIZED,
            r#"{"error":"Permission denied"}"#,
        )
    }

    /// Serve a fake database on an ephemeral port and return its base URL.
    async fn fake_database() -> (String, Log) {
        let log = Log::default();
        let app = Router::new()
            .route("/FirebasePWI.json", get(record_get).patch(record_patch))
            .route("/Missing.json", get(missing))
            .route("/Denied.json", get(denied).patch(denied))
            .with_state(log.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (format!("http://{}", addr), log)
    }

    async fn next_event(subscription: &mut Subscription) -> Option<RecordEvent> {
        tokio::time::timeout(Duration::from_secs(5), subscription.next())
            .await
            .expect("stream stalled")
    }

    #[tokio::test]
    async fn test_get_sends_auth_and_decodes_record() {
        let (url, log) = fake_database().await;
        let source = source_with_auth(&url, Some("secret"));

        let record = source.get("/FirebasePWI").await.unwrap();
        assert_eq!(record, Some(json!({"POMPA1": "1", "SUHU": 26})));

        let seen = log.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, "GET");
        assert_eq!(seen[0].query.as_deref(), Some("auth=secret"));
    }

    #[tokio::test]
    async fn test_no_auth_means_no_query() {
        let (url, log) = fake_database().await;
        source(&url).get("/FirebasePWI").await.unwrap();
        assert_eq!(log.lock().unwrap()[0].query, None);
    }

    #[tokio::test]
    async fn test_get_null_is_absent() {
        let (url, _) = fake_database().await;
        assert_eq!(source(&url).get("/Missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_error_status_keeps_body() {
        let (url, _) = fake_database().await;
        let source = source(&url);

        let err = source.get("/Denied").await.unwrap_err();
        let (status, body) = match err {
            SourceError::Status { status, body } => (status, body),
            other => panic!("expected a status error, got {:?}", other),
        };
        assert_eq!(status, 401);
        assert!(body.contains("Permission denied"), "body: {}", body);

        let patch = Patch::new().set("POMPA1", "1");
        let err = source.patch("/Denied", &patch).await.unwrap_err();
        assert!(matches!(err, SourceError::Status { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_patch_sends_flat_object() {
        let (url, log) = fake_database().await;
        let source = source_with_auth(&url, Some("secret"));

        let patch = Patch::new().set("OTOMATIS", "0").set("POMPA1", "1");
        source.patch("/FirebasePWI", &patch).await.unwrap();

        let seen = log.lock().unwrap().clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, "PATCH");
        assert_eq!(seen[0].query.as_deref(), Some("auth=secret"));
        let body: Value = serde_json::from_str(&seen[0].body).unwrap();
        assert_eq!(body, json!({"OTOMATIS": "0", "POMPA1": "1"}));
    }

    #[tokio::test]
    async fn test_subscribe_follows_stream_until_cancel() {
        let (url, log) = fake_database().await;
        let source = source_with_auth(&url, Some("secret"));

        let mut subscription = source.subscribe("/FirebasePWI").await.unwrap();

        assert_eq!(
            next_event(&mut subscription).await,
            Some(RecordEvent::Value(json!({"POMPA1": "1", "SUHU": 26})))
        );
        assert_eq!(
            next_event(&mut subscription).await,
            Some(RecordEvent::Value(json!({"POMPA1": "0", "SUHU": 26})))
        );
        // `cancel` ends the stream task even though the server keeps the
        // connection open.
        assert_eq!(next_event(&mut subscription).await, None);

        let seen = log.lock().unwrap().clone();
        assert_eq!(seen[0].accept.as_deref(), Some("text/event-stream"));
        assert_eq!(seen[0].query.as_deref(), Some("auth=secret"));
    }

    #[tokio::test]
    async fn test_subscribe_error_status() {
        let (url, _) = fake_database().await;
        let err = source(&url).subscribe("/Denied").await.unwrap_err();
        assert!(matches!(err, SourceError::Status { status: 401, .. }));
    }

    #[test]
    fn test_url_for_record_path() {
        let source = source("https://tank-default-rtdb.firebaseio.com/");
        assert_eq!(
            source.url("/FirebasePWI"),
            "https://tank-default-rtdb.firebaseio.com/FirebasePWI.json"
        );
        assert_eq!(
            source.url("FirebasePWI/POMPA1/"),
            "https://tank-default-rtdb.firebaseio.com/FirebasePWI/POMPA1.json"
        );
        assert_eq!(
            source.url("/"),
            "https://tank-default-rtdb.firebaseio.com/.json"
        );
    }
}
