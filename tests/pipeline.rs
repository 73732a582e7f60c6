//! End-to-end tests of the document pipeline against mock backends.

use std::time::{Duration, Instant};

use futures_util::future::join_all;
use reqwest::StatusCode;
use serde_json::Value;

mod common;

use common::{
    aborted_count, client, config_for, start_mock_backend, start_programmable_backend, start_proxy,
    start_streaming_backend, MockReply, Trickle,
};

#[tokio::test]
async fn pdf_is_served_inline() {
    let (backend, _) = start_mock_backend(
        MockReply::ok("%PDF-1.7 fake").header("Content-Type", "application/pdf"),
    )
    .await;
    let (proxy, shutdown) = start_proxy(config_for(backend)).await;

    let res = client()
        .get(format!("http://{proxy}/document/doc1/attachment/file.pdf"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-disposition"], "inline");
    assert_eq!(res.headers()["content-type"], "application/pdf");
    assert_eq!(res.headers()["x-content-type-options"], "nosniff");
    assert_eq!(res.headers()["x-frame-options"], "DENY");
    assert_eq!(res.text().await.unwrap(), "%PDF-1.7 fake");

    shutdown.trigger();
}

#[tokio::test]
async fn body_is_byte_exact_and_backend_headers_are_hidden() {
    let body: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
    let (backend, _) = start_mock_backend(
        MockReply::ok(body.clone())
            .header("Server", "Windows-Azure-Blob/1.0 Microsoft-HTTPAPI/2.0")
            .header("x-ms-request-id", "8c0a1b2e-0001")
            .header("x-ms-version", "2021-08-06")
            .header("x-ms-blob-type", "BlockBlob")
            .header("ETag", "\"0x8DB\""),
    )
    .await;
    let (proxy, shutdown) = start_proxy(config_for(backend)).await;

    let res = client()
        .get(format!("http://{proxy}/document/abc123/attachment/archive.zip"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let headers = res.headers().clone();
    assert!(headers.get("server").is_none());
    assert!(headers.keys().all(|name| !name.as_str().starts_with("x-ms-")));
    assert_eq!(headers["etag"], "\"0x8DB\"");
    assert_eq!(headers["content-disposition"], "attachment");
    assert_eq!(headers["content-type"], "application/zip");

    let received = res.bytes().await.unwrap();
    assert_eq!(&received[..], &body[..]);

    shutdown.trigger();
}

#[tokio::test]
async fn upstream_request_is_built_from_template_and_allow_list() {
    let (backend, recorded) = start_mock_backend(MockReply::ok("x")).await;
    let (proxy, shutdown) = start_proxy(config_for(backend)).await;

    let res = client()
        .get(format!("http://{proxy}/document/abc123/attachment/report.pdf?download=1"))
        .header("Range", "bytes=0-0")
        .header("Cookie", "session=secret")
        .header("X-Forwarded-For", "6.6.6.6")
        .header("X-Request-Id", "trace-42")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-request-id"], "trace-42");

    let head = recorded.lock().unwrap()[0].to_lowercase();
    assert!(
        head.starts_with("get /documents/abc123/attachment/report.pdf http/1.1\r\n"),
        "unexpected request line: {head}"
    );
    assert!(head.contains(&format!("host: {backend}\r\n")));
    assert!(head.contains("user-agent: document-proxy/"));
    assert!(head.contains("range: bytes=0-0\r\n"));
    assert!(head.contains("x-request-id: trace-42\r\n"));
    assert!(!head.contains("cookie"));
    assert!(!head.contains("x-forwarded-for"));

    shutdown.trigger();
}

#[tokio::test]
async fn traversal_is_rejected_without_backend_call() {
    let (backend, recorded) = start_mock_backend(MockReply::ok("secret")).await;
    let (proxy, shutdown) = start_proxy(config_for(backend)).await;

    let res = client()
        .get(format!("http://{proxy}/document/../etc/attachment/x"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_id");
    assert!(recorded.lock().unwrap().is_empty());

    shutdown.trigger();
}

#[tokio::test]
async fn twenty_first_request_is_rate_limited() {
    let (backend, _) = start_mock_backend(MockReply::ok("x")).await;
    let (proxy, shutdown) = start_proxy(config_for(backend)).await;
    let client = client();
    let url = format!("http://{proxy}/document/doc1/attachment/file.pdf");

    let responses = join_all((0..21).map(|_| client.get(&url).send())).await;
    let statuses: Vec<StatusCode> = responses.into_iter().map(|r| r.unwrap().status()).collect();

    let admitted = statuses.iter().filter(|s| **s == StatusCode::OK).count();
    let limited = statuses
        .iter()
        .filter(|s| **s == StatusCode::TOO_MANY_REQUESTS)
        .count();
    assert_eq!(admitted, 20, "statuses: {statuses:?}");
    assert_eq!(limited, 1, "statuses: {statuses:?}");

    tokio::time::sleep(Duration::from_secs(1)).await;

    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    shutdown.trigger();
}

#[tokio::test]
async fn unreachable_backend_is_bad_gateway_without_details() {
    // Reserve a port, then free it so connections are refused.
    let unused = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = unused.local_addr().unwrap();
    drop(unused);

    let (proxy, shutdown) = start_proxy(config_for(backend)).await;

    let res = client()
        .get(format!("http://{proxy}/document/doc1/attachment/file.pdf"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let text = res.text().await.unwrap();
    assert!(!text.contains("127.0.0.1"));
    assert!(!text.contains(&backend.port().to_string()));
    let body: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["error"], "upstream_unavailable");

    shutdown.trigger();
}

#[tokio::test]
async fn health_answers_while_backend_is_down() {
    let unused = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = unused.local_addr().unwrap();
    drop(unused);

    let (proxy, shutdown) = start_proxy(config_for(backend)).await;

    let res = client().get(format!("http://{proxy}/health")).send().await.unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "text/plain");
    assert_eq!(res.text().await.unwrap(), "healthy");

    shutdown.trigger();
}

#[tokio::test]
async fn backend_not_found_becomes_envelope() {
    let (backend, _) = start_mock_backend(
        MockReply::status(404, "<?xml version=\"1.0\"?><Error><Code>BlobNotFound</Code></Error>")
            .header("Content-Type", "application/xml")
            .header("x-ms-error-code", "BlobNotFound"),
    )
    .await;
    let (proxy, shutdown) = start_proxy(config_for(backend)).await;

    let res = client()
        .get(format!("http://{proxy}/document/doc1/attachment/missing.pdf"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(res.headers().get("x-ms-error-code").is_none());
    let text = res.text().await.unwrap();
    assert!(!text.contains("BlobNotFound"));
    let body: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["error"], "not_found");

    shutdown.trigger();
}

#[tokio::test]
async fn backend_server_error_is_masked() {
    let (backend, _) = start_mock_backend(MockReply::status(500, "InternalError at acct.blob")).await;
    let (proxy, shutdown) = start_proxy(config_for(backend)).await;

    let res = client()
        .get(format!("http://{proxy}/document/doc1/attachment/file.pdf"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    let text = res.text().await.unwrap();
    assert!(!text.contains("acct.blob"));

    shutdown.trigger();
}

#[tokio::test]
async fn other_backend_status_keeps_code_but_not_body() {
    let (backend, _) = start_mock_backend(
        MockReply::status(
            403,
            "<?xml version=\"1.0\"?><Error><Code>AuthorizationFailure</Code>\
             <Message>acct.blob.core.windows.net denied</Message></Error>",
        )
        .header("Content-Type", "application/xml")
        .header("x-ms-error-code", "AuthorizationFailure"),
    )
    .await;
    let (proxy, shutdown) = start_proxy(config_for(backend)).await;

    let res = client()
        .get(format!("http://{proxy}/document/doc1/attachment/file.pdf"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert!(res.headers().get("x-ms-error-code").is_none());
    assert!(res.headers().get("content-disposition").is_none());
    assert_eq!(res.headers()["content-type"], "application/json");

    let text = res.text().await.unwrap();
    assert!(!text.contains("blob.core"));
    assert!(!text.contains("AuthorizationFailure"));
    let body: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["error"], "upstream_rejected");
    assert_eq!(body.as_object().unwrap().len(), 2);

    shutdown.trigger();
}

#[tokio::test]
async fn head_is_answered_without_a_body() {
    let (backend, recorded) = start_mock_backend(
        MockReply::ok(vec![7u8; 4096]).header("Content-Type", "application/pdf"),
    )
    .await;
    let mut config = config_for(backend);
    config.pool.max_in_flight = 1;
    let (proxy, shutdown) = start_proxy(config).await;
    let client = client();
    let url = format!("http://{proxy}/document/doc1/attachment/file.pdf");

    let res = client.head(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-disposition"], "inline");
    assert_eq!(res.headers()["content-type"], "application/pdf");
    assert!(res.bytes().await.unwrap().is_empty());

    let head = recorded.lock().unwrap()[0].to_lowercase();
    assert!(head.starts_with("get /documents/doc1/attachment/file.pdf http/1.1\r\n"));

    // The single upstream slot was released with the discarded body.
    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.bytes().await.unwrap().len(), 4096);

    shutdown.trigger();
}

#[tokio::test]
async fn slow_backend_times_out() {
    let (backend, _) = start_programmable_backend(|| async {
        tokio::time::sleep(Duration::from_secs(3)).await;
        MockReply::ok("late")
    })
    .await;
    let mut config = config_for(backend);
    config.timeouts.response_ms = 300;
    let (proxy, shutdown) = start_proxy(config).await;

    let res = client()
        .get(format!("http://{proxy}/document/doc1/attachment/file.pdf"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "upstream_timeout");

    shutdown.trigger();
}

#[tokio::test]
async fn saturated_pool_fails_fast() {
    let (backend, _) = start_programmable_backend(|| async {
        tokio::time::sleep(Duration::from_millis(600)).await;
        MockReply::ok("slow")
    })
    .await;
    let mut config = config_for(backend);
    config.pool.max_in_flight = 1;
    config.timeouts.pool_acquire_ms = 50;
    let (proxy, shutdown) = start_proxy(config).await;

    let client = client();
    let url = format!("http://{proxy}/document/doc1/attachment/file.pdf");

    let first = {
        let client = client.clone();
        let url = url.clone();
        tokio::spawn(async move { client.get(&url).send().await.unwrap().status() })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = client.get(&url).send().await.unwrap();
    assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = second.json().await.unwrap();
    assert_eq!(body["error"], "upstream_busy");

    assert_eq!(first.await.unwrap(), StatusCode::OK);

    shutdown.trigger();
}

#[tokio::test]
async fn direct_container_path_is_forbidden() {
    let (backend, recorded) = start_mock_backend(MockReply::ok("x")).await;
    let (proxy, shutdown) = start_proxy(config_for(backend)).await;

    let res = client()
        .get(format!("http://{proxy}/documents/doc1/attachment/file.pdf"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");
    assert!(recorded.lock().unwrap().is_empty());

    shutdown.trigger();
}

#[tokio::test]
async fn client_disconnect_aborts_upstream_and_frees_slot() {
    let (backend, aborted) = start_streaming_backend(Trickle {
        content_length: 1 << 30,
        chunks: usize::MAX,
        chunk_size: 16 * 1024,
        interval: Duration::from_millis(20),
    })
    .await;
    let mut config = config_for(backend);
    config.pool.max_in_flight = 1;
    config.timeouts.pool_acquire_ms = 200;
    let (proxy, shutdown) = start_proxy(config).await;
    let client = client();
    let url = format!("http://{proxy}/document/doc1/attachment/big.pdf");

    let mut first = client.get(&url).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert!(first.chunk().await.unwrap().is_some());
    drop(first);

    let deadline = Instant::now() + Duration::from_secs(10);
    while aborted_count(&aborted) == 0 {
        assert!(Instant::now() < deadline, "backend kept streaming after the client left");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let second = client.get(&url).send().await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    drop(second);

    shutdown.trigger();
}

#[tokio::test]
async fn stalled_body_is_cut_by_read_idle_timeout() {
    let (backend, _) = start_streaming_backend(Trickle {
        content_length: 64 * 1024,
        chunks: 1,
        chunk_size: 1024,
        interval: Duration::from_millis(10),
    })
    .await;
    let mut config = config_for(backend);
    config.timeouts.read_idle_ms = 300;
    config.pool.max_in_flight = 1;
    config.timeouts.pool_acquire_ms = 200;
    let (proxy, shutdown) = start_proxy(config).await;
    let client = client();
    let url = format!("http://{proxy}/document/doc1/attachment/stalled.pdf");

    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = tokio::time::timeout(Duration::from_secs(5), res.bytes())
        .await
        .expect("body did not end after the idle timeout");
    assert!(body.is_err(), "truncated body must surface as an error");

    // The slot held by the stalled stream is free again.
    let again = client.get(&url).send().await.unwrap();
    assert_eq!(again.status(), StatusCode::OK);
    drop(again);

    shutdown.trigger();
}
