//! Edge case tests for hx-net
//!
//! Request/response value types and the HTTP client against a loopback server.

use hx_net::*;
use smol::io::{AsyncReadExt, AsyncWriteExt};
use smol::net::TcpListener;
use std::time::Duration;

/// Serve one canned reply per accepted connection, returning the raw requests
async fn serve(listener: TcpListener, replies: Vec<String>) -> Vec<String> {
    let mut seen = Vec::new();
    for reply in replies {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 4096];
        let n = stream.read(&mut buf).await.unwrap();
        seen.push(String::from_utf8_lossy(&buf[..n]).into_owned());
        stream.write_all(reply.as_bytes()).await.unwrap();
        stream.flush().await.unwrap();
    }
    seen
}

// ============================================================================
// REQUEST BUILDER TESTS
// ============================================================================

#[test]
fn test_request_get() {
    let req = Request::get("http://example.com");
    assert_eq!(req.method, Method::Get);
    assert_eq!(req.url, "http://example.com");
    assert!(req.headers.is_empty());
    assert!(req.body.is_none());
}

#[test]
fn test_request_headers_keep_order() {
    let req = Request::post("http://example.com")
        .with_header("HX-Request", "true")
        .with_header("HX-Target", "out")
        .with_header("Content-Type", "application/x-www-form-urlencoded");

    let names: Vec<&str> = req.headers.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["HX-Request", "HX-Target", "Content-Type"]);
}

#[test]
fn test_request_body_text_lossy() {
    let req = Request::post("http://example.com").with_body(vec![b'a', 0xff, b'b']);
    assert_eq!(req.body_text(), "a\u{fffd}b");
    assert_eq!(Request::get("http://x").body_text(), "");
}

// ============================================================================
// RESPONSE TESTS
// ============================================================================

#[test]
fn test_response_status_classes() {
    assert!(Response::new(204, "").ok());
    assert!(!Response::new(302, "").ok());
    assert!(!Response::new(500, "").ok());
}

#[test]
fn test_response_json_error() {
    let resp = Response::new(200, "<html>");
    let parsed: Result<serde_json::Value, _> = resp.json();
    assert!(matches!(parsed, Err(NetError::Protocol(_))));
}

// ============================================================================
// CLIENT TESTS
// ============================================================================

#[test]
fn test_client_round_trip() {
    smol::block_on(async {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = smol::spawn(serve(
            listener,
            vec!["HTTP/1.1 200 OK\r\nContent-Length: 9\r\nHX-Trigger: done\r\n\r\n<p>hi</p>".into()],
        ));

        let client = HttpClient::new();
        let req = Request::post(&format!("http://{}/save?x=1", addr))
            .with_header("HX-Request", "true")
            .with_body(b"a=1".to_vec());
        let resp = client.send(req).await.unwrap();

        assert_eq!(resp.status, 200);
        assert_eq!(resp.text(), "<p>hi</p>");
        assert_eq!(resp.header("hx-trigger"), Some("done"));

        let seen = server.await;
        assert!(seen[0].starts_with("POST /save?x=1 HTTP/1.1\r\n"));
        assert!(seen[0].contains("HX-Request: true\r\n"));
        assert!(seen[0].ends_with("a=1"));
    });
}

#[test]
fn test_client_follows_redirect_as_get() {
    smol::block_on(async {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = smol::spawn(serve(
            listener,
            vec![
                "HTTP/1.1 303 See Other\r\nLocation: /done\r\nContent-Length: 0\r\n\r\n".into(),
                "HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok".into(),
            ],
        ));

        let client = HttpClient::new();
        let resp = client
            .execute(Request::post(&format!("http://{}/form", addr)).with_body(b"k=v".to_vec()))
            .await
            .unwrap();
        assert_eq!(resp.text(), "ok");

        let seen = server.await;
        assert!(seen[1].starts_with("GET /done HTTP/1.1\r\n"));
    });
}

#[test]
fn test_client_redirect_limit_returns_last_response() {
    smol::block_on(async {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = smol::spawn(serve(
            listener,
            vec!["HTTP/1.1 302 Found\r\nLocation: /again\r\nContent-Length: 0\r\n\r\n".into()],
        ));

        let client = HttpClient::builder().max_redirects(0).build();
        let resp = client.execute(Request::get(&format!("http://{}/", addr))).await.unwrap();
        assert_eq!(resp.status, 302);
    });
}

#[test]
fn test_client_request_timeout() {
    smol::block_on(async {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept but never answer
        let _server = smol::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            smol::Timer::after(Duration::from_secs(5)).await;
            drop(stream);
        });

        let client = HttpClient::builder()
            .request_timeout(Duration::from_millis(50))
            .build();
        let err = client.execute(Request::get(&format!("http://{}/", addr))).await.unwrap_err();
        assert!(matches!(err, NetError::Network(_)));
    });
}

// ============================================================================
// MALFORMED RESPONSES
// ============================================================================

#[test]
fn test_client_overflowing_chunk_size_is_protocol_error() {
    smol::block_on(async {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = smol::spawn(serve(
            listener,
            vec!["HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n1\r\na\r\nffffffffffffffff\r\nb\r\n0\r\n\r\n".into()],
        ));

        let client = HttpClient::new();
        let err = client.execute(Request::get(&format!("http://{}/", addr))).await.unwrap_err();
        assert!(matches!(err, NetError::Protocol(_)));
    });
}

#[test]
fn test_client_rejects_body_over_limit() {
    smol::block_on(async {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = smol::spawn(serve(
            listener,
            vec!["HTTP/1.1 200 OK\r\nContent-Length: 64\r\n\r\nshort".into()],
        ));

        let client = HttpClient::builder().max_body_size(16).build();
        let err = client.execute(Request::get(&format!("http://{}/", addr))).await.unwrap_err();
        assert!(matches!(err, NetError::Protocol(_)));
    });
}
