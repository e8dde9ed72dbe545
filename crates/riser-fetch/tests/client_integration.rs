//! ApiClient integration tests against a local mock server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use mockito::{Matcher, Server};
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use riser_core::{BackoffConfig, ProviderConfig};
use riser_fetch::{
    ApiClient, ErrorCode, FetchError, RateLimitTracker, RequestInterceptor, RequestOptions,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[derive(Debug, Deserialize, PartialEq)]
struct Quote {
    symbol: String,
    price: f64,
}

/// Millisecond backoff so retry tests finish quickly.
fn fast_provider(base_url: &str) -> ProviderConfig {
    ProviderConfig::new("alpha", base_url).with_backoff(BackoffConfig {
        base_delay_ms: 1,
        max_delay_ms: 5,
        jitter_ms: 0,
    })
}

#[tokio::test]
async fn test_get_decodes_json_and_sends_params() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/quote")
        .match_query(Matcher::UrlEncoded("symbol".into(), "AAPL".into()))
        .match_header("content-type", "application/json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"symbol":"AAPL","price":190.2}"#)
        .expect(1)
        .create_async()
        .await;

    let client = ApiClient::new(fast_provider(&server.url())).unwrap();
    let quote: Quote = client
        .get("/quote", RequestOptions::new().param("symbol", "AAPL"))
        .await
        .unwrap();

    assert_eq!(
        quote,
        Quote {
            symbol: "AAPL".into(),
            price: 190.2
        }
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_retryable_failure_uses_full_budget() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/flaky")
        .with_status(503)
        .with_body(r#"{"message":"upstream overloaded"}"#)
        .expect(4)
        .create_async()
        .await;

    let client = ApiClient::new(fast_provider(&server.url()).with_max_retries(3)).unwrap();
    let err = client
        .get::<Value>("flaky", RequestOptions::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        FetchError::ServerError {
            status: 503,
            message: "upstream overloaded".into()
        }
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/missing")
        .with_status(404)
        .with_body(r#"{"error":"unknown symbol"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = ApiClient::new(fast_provider(&server.url())).unwrap();
    let err = client
        .get::<Value>("missing", RequestOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::ClientError);
    assert_eq!(err.http_status(), Some(404));
    assert_eq!(err.to_string(), "unknown symbol");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_rate_limited_response() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/limited")
        .with_status(429)
        .with_header("retry-after", "2")
        .with_header("x-ratelimit-remaining", "0")
        .with_header("x-ratelimit-limit", "5")
        .with_header("x-ratelimit-reset", "1700000000")
        .expect(3)
        .create_async()
        .await;

    let client = ApiClient::new(fast_provider(&server.url()).with_max_retries(2)).unwrap();
    let err = client
        .get::<Value>("limited", RequestOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
    assert!(err.is_retryable());
    mock.assert_async().await;

    // 실패 응답의 헤더도 기록됨
    let snapshot = client.rate_limit().unwrap();
    assert_eq!(snapshot.remaining, 0);
    assert_eq!(snapshot.limit, 5);
    assert_eq!(snapshot.reset_at.timestamp(), 1_700_000_000);
}

#[tokio::test]
async fn test_rate_limit_headers_tracked_per_upstream() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/news")
        .with_status(200)
        .with_header("x-ratelimit-remaining", "99")
        .with_body("[]")
        .create_async()
        .await;
    server
        .mock("GET", "/plain")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let tracker = Arc::new(RateLimitTracker::new());
    let news = ApiClient::builder(fast_provider(&server.url()))
        .rate_limits(Arc::clone(&tracker))
        .build()
        .unwrap();
    let other = ApiClient::builder(ProviderConfig::new("other", server.url()))
        .rate_limits(Arc::clone(&tracker))
        .build()
        .unwrap();

    let _: Value = news.get("news", RequestOptions::new()).await.unwrap();
    let _: Value = other.get("plain", RequestOptions::new()).await.unwrap();

    let snapshot = tracker.get("alpha").unwrap();
    assert_eq!(snapshot.remaining, 99);
    assert_eq!(snapshot.limit, 0);
    assert!(tracker.get("other").is_none());
    assert_eq!(tracker.snapshots().len(), 1);
}

#[tokio::test]
async fn test_concurrent_identical_requests_are_deduplicated() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/quote")
        .match_query(Matcher::UrlEncoded("symbol".into(), "MSFT".into()))
        .with_status(200)
        .with_body(r#"{"symbol":"MSFT","price":420.0}"#)
        .expect(1)
        .create_async()
        .await;

    let client = ApiClient::new(fast_provider(&server.url())).unwrap();
    let calls = (0..5).map(|_| {
        client.get::<Quote>("quote", RequestOptions::new().param("symbol", "MSFT"))
    });
    let results = join_all(calls).await;

    for result in results {
        assert_eq!(result.unwrap().price, 420.0);
    }
    assert_eq!(client.pending_requests(), 0);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_malformed_success_body() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/broken")
        .with_status(200)
        .with_body("<html>maintenance</html>")
        .expect(1)
        .create_async()
        .await;

    let client = ApiClient::new(fast_provider(&server.url())).unwrap();
    let err = client
        .get::<Value>("broken", RequestOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::MalformedResponse);
    assert!(!err.is_retryable());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_caller_predicate_limits_retries() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/flaky")
        .with_status(500)
        .expect(1)
        .create_async()
        .await;

    let client = ApiClient::new(fast_provider(&server.url())).unwrap();
    let err = client
        .get::<Value>(
            "flaky",
            RequestOptions::new().retry_if(|e| e.http_status() != Some(500)),
        )
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "HTTP 500: Internal Server Error");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_post_sends_json_body_and_bearer() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/watchlist")
        .match_header("authorization", "Bearer test-key")
        .match_header("x-trace", "abc")
        .match_body(Matcher::Json(json!({"symbols": ["AAPL", "MSFT"]})))
        .with_status(201)
        .with_body(r#"{"id":7}"#)
        .expect(1)
        .create_async()
        .await;

    let config = fast_provider(&format!("{}/v1/", server.url())).with_api_key("test-key");
    let client = ApiClient::new(config).unwrap();
    let created: Value = client
        .post(
            "/watchlist",
            &json!({"symbols": ["AAPL", "MSFT"]}),
            RequestOptions::new().header("X-Trace", "abc"),
        )
        .await
        .unwrap();

    assert_eq!(created["id"], 7);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_delete_with_empty_body() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("DELETE", "/watchlist/7")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let client = ApiClient::new(fast_provider(&server.url())).unwrap();
    let result: Value = client
        .delete("watchlist/7", RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(result, Value::Null);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_attempt_timeout_is_retried_then_surfaced() {
    // 연결은 받지만 응답하지 않는 서버
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            held.push(socket);
        }
    });

    let config = fast_provider(&format!("http://{}", addr))
        .with_timeout_ms(100)
        .with_max_retries(1);
    let client = ApiClient::new(config).unwrap();

    let err = client
        .get::<Value>("slow", RequestOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::Timeout);
    assert!(err.is_retryable());
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn test_per_call_timeout_override() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let client = ApiClient::new(fast_provider(&format!("http://{}", addr)).with_max_retries(0))
        .unwrap();

    let started = std::time::Instant::now();
    let err = client
        .get::<Value>(
            "slow",
            RequestOptions::new().timeout(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::TimedOut(_)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_connection_refused_is_network_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client =
        ApiClient::new(fast_provider(&format!("http://{}", addr)).with_max_retries(2)).unwrap();
    let err = client
        .get::<Value>("anything", RequestOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::NetworkError);
    assert!(err.is_retryable());
}

/// Serves `response` verbatim on every connection, then closes the socket.
async fn raw_server(response: &'static str) -> (String, Arc<AtomicUsize>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });
    (format!("http://{}", addr), accepted)
}

#[tokio::test]
async fn test_body_cut_off_is_retryable_network_failure() {
    let (base_url, accepted) =
        raw_server("HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n{\"a\":").await;
    let client = ApiClient::new(fast_provider(&base_url).with_max_retries(3)).unwrap();

    let err = client
        .get::<Value>("partial", RequestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::NetworkFailure(_)), "got {:?}", err);
    assert!(err.is_retryable());
    assert_eq!(accepted.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_body_cut_off_keeps_server_error_status() {
    let (base_url, accepted) = raw_server(
        "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 100\r\n\r\n{\"message\":",
    )
    .await;
    let client = ApiClient::new(fast_provider(&base_url).with_max_retries(1)).unwrap();

    let err = client
        .get::<Value>("partial", RequestOptions::new())
        .await
        .unwrap_err();

    assert_eq!(err.http_status(), Some(503));
    assert_eq!(err.code(), ErrorCode::ServerError);
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
}

#[derive(Default)]
struct Recorder {
    requests: AtomicUsize,
    responses: Mutex<Vec<u16>>,
    errors: Mutex<Vec<FetchError>>,
}

/// Shares one [`Recorder`] with the client.
struct RecordingInterceptor(Arc<Recorder>);

impl RequestInterceptor for RecordingInterceptor {
    fn on_request(&self, method: &Method, _url: &str, _headers: &HeaderMap) {
        assert_eq!(*method, Method::GET);
        self.0.requests.fetch_add(1, Ordering::SeqCst);
    }

    fn on_response(&self, _url: &str, status: StatusCode, _headers: &HeaderMap) {
        self.0.responses.lock().unwrap().push(status.as_u16());
    }

    fn on_error(&self, _url: &str, error: &FetchError) {
        self.0.errors.lock().unwrap().push(error.clone());
    }
}

#[tokio::test]
async fn test_interceptor_hooks_fire_per_call_and_attempt() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/quote")
        .with_status(503)
        .with_body("down")
        .expect(3)
        .create_async()
        .await;

    let recorder = Arc::new(Recorder::default());
    let client = ApiClient::builder(fast_provider(&server.url()).with_max_retries(2))
        .interceptor(RecordingInterceptor(Arc::clone(&recorder)))
        .build()
        .unwrap();

    let err = client
        .get::<Value>("quote", RequestOptions::new())
        .await
        .unwrap_err();

    mock.assert_async().await;
    let expected = FetchError::ServerError {
        status: 503,
        message: "HTTP 503: Service Unavailable".to_string(),
    };
    assert_eq!(err, expected);
    assert_eq!(recorder.requests.load(Ordering::SeqCst), 1);
    assert_eq!(*recorder.responses.lock().unwrap(), vec![503, 503, 503]);
    assert_eq!(*recorder.errors.lock().unwrap(), vec![expected]);
}

#[tokio::test]
async fn test_interceptor_success_reports_no_error() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/quote")
        .with_status(200)
        .with_body(r#"{"symbol":"AAPL","price":1.0}"#)
        .create_async()
        .await;

    let recorder = Arc::new(Recorder::default());
    let client = ApiClient::builder(fast_provider(&server.url()))
        .interceptor(RecordingInterceptor(Arc::clone(&recorder)))
        .build()
        .unwrap();

    let quote: Quote = client.get("quote", RequestOptions::new()).await.unwrap();

    assert_eq!(quote.symbol, "AAPL");
    assert_eq!(recorder.requests.load(Ordering::SeqCst), 1);
    assert_eq!(*recorder.responses.lock().unwrap(), vec![200]);
    assert!(recorder.errors.lock().unwrap().is_empty());
}
