//! Request and response body framing through whole sends.

use std::io::{Cursor, Write};
use std::sync::Arc;
use wirenet::http::events::EventSequence;
use wirenet::socket::mock::MockTransport;
use wirenet::urlrequest::adapter::SocketAdapter;
use wirenet::urlrequest::request::{ParamValue, URLRequest};

fn request_over(mock: &Arc<MockTransport>, url: &str, method: &str) -> URLRequest {
    let mut request = URLRequest::with_url(url, method).unwrap();
    request.set_adapter(Arc::new(SocketAdapter::with_transport(mock.clone())));
    request
}

fn head_of(sent: &str) -> &str {
    sent.split("\r\n\r\n").next().unwrap()
}

#[tokio::test]
async fn test_content_length_is_exact() {
    let mock = Arc::new(MockTransport::new());
    mock.push_response("HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhelloEXTRA BYTES");

    let response = request_over(&mock, "http://www.example.com/", "GET")
        .send()
        .await
        .unwrap();
    assert_eq!(response.body(), b"hello");
}

#[tokio::test]
async fn test_short_content_length_body_is_accepted() {
    let mock = Arc::new(MockTransport::new());
    mock.push_response("HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nshort");

    let response = request_over(&mock, "http://www.example.com/", "GET")
        .send()
        .await
        .unwrap();
    assert_eq!(response.text(), "short");
}

#[tokio::test]
async fn test_body_until_close() {
    let mock = Arc::new(MockTransport::new());
    mock.push_response("HTTP/1.0 200 OK\r\nContent-Type: text/plain\r\n\r\nall of it\nuntil the end");

    let response = request_over(&mock, "http://www.example.com/", "GET")
        .send()
        .await
        .unwrap();
    assert_eq!(response.text(), "all of it\nuntil the end");
}

#[tokio::test]
async fn test_head_has_no_body() {
    let mock = Arc::new(MockTransport::new());
    mock.push_stalled("HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n");

    let mut request = request_over(&mock, "http://www.example.com/", "HEAD");
    request.set_config("timeout", 5).unwrap();
    let response = request.send().await.unwrap();
    assert_eq!(response.header("content-length").as_deref(), Some("1000"));
    assert!(response.body().is_empty());
}

#[tokio::test]
async fn test_chunked_response() {
    let mock = Arc::new(MockTransport::new());
    mock.push_response(
        "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n\
         4;ext=1\r\nWiki\r\n5\r\npedia\r\nE\r\n in\r\n\r\nchunks.\r\n0\r\nX-Trailer: yes\r\n\r\n",
    );

    let response = request_over(&mock, "http://www.example.com/", "GET")
        .send()
        .await
        .unwrap();
    assert_eq!(response.text(), "Wikipedia in\r\n\r\nchunks.");
}

#[tokio::test]
async fn test_store_body_disabled() {
    let mock = Arc::new(MockTransport::new());
    mock.push_response("HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");
    let events = Arc::new(EventSequence::watching(&["receivedBodyPart", "receivedBody"]));

    let mut request = request_over(&mock, "http://www.example.com/", "GET");
    request.set_config("store_body", false).unwrap();
    request.attach(events.clone());
    let response = request.send().await.unwrap();

    assert!(response.body().is_empty());
    assert_eq!(events.sequence(), vec!["receivedBodyPart", "receivedBody"]);
}

#[tokio::test]
async fn test_unknown_length_body_is_chunked() {
    let mock = Arc::new(MockTransport::new());
    mock.push_response("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");

    let mut request = request_over(&mock, "http://www.example.com/", "PUT");
    request.set_config("buffer_size", 4).unwrap();
    request
        .set_body_stream(Cursor::new(b"abcdefghij".to_vec()), None)
        .unwrap();
    request.send().await.unwrap();

    let sent = &mock.request_texts()[0];
    assert!(head_of(sent).contains("Transfer-Encoding: chunked"));
    assert!(head_of(sent).contains("Content-Type: application/octet-stream"));
    assert!(sent.ends_with("\r\n\r\n4\r\nabcd\r\n4\r\nefgh\r\n2\r\nij\r\n0\r\n\r\n"));
}

#[tokio::test]
async fn test_large_body_waits_for_continue() {
    let mock = Arc::new(MockTransport::new());
    mock.push_response("HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    let body = vec![b'a'; 1024 * 1024 + 1];

    let mut request = request_over(&mock, "http://www.example.com/", "POST");
    request.set_body(body.clone());
    let response = request.send().await.unwrap();

    assert_eq!(response.status(), 200);
    let sent = &mock.requests()[0];
    let text = String::from_utf8_lossy(sent);
    assert!(head_of(&text).contains("Expect: 100-continue"));
    assert!(sent.ends_with(&body));
}

#[tokio::test]
async fn test_early_response_skips_body() {
    let mock = Arc::new(MockTransport::new());
    mock.push_response("HTTP/1.1 413 Payload Too Large\r\nContent-Length: 0\r\n\r\n");
    let events = Arc::new(EventSequence::watching(&["sentBodyPart", "sentBody"]));

    let mut request = request_over(&mock, "http://www.example.com/", "POST");
    request.set_body(vec![b'a'; 2 * 1024 * 1024]);
    request.attach(events.clone());
    let response = request.send().await.unwrap();

    assert_eq!(response.status(), 413);
    let sent = &mock.request_texts()[0];
    assert!(head_of(sent).contains("Expect: 100-continue"));
    assert!(sent.ends_with("\r\n\r\n"));
    assert!(!sent.contains("aaaa"));
    assert_eq!(events.sequence(), vec!["sentBody"]);
}

#[tokio::test]
async fn test_empty_expect_suppresses_continue() {
    let mock = Arc::new(MockTransport::new());
    mock.push_response("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");

    let mut request = request_over(&mock, "http://www.example.com/", "POST");
    request.set_header_line("Expect: ").unwrap();
    request.set_body(vec![b'a'; 1024 * 1024 + 1]);
    request.send().await.unwrap();

    let text = mock.request_texts()[0].clone();
    assert!(!head_of(&text).contains("Expect"));
}

#[tokio::test]
async fn test_multipart_upload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("plaintext.txt");
    std::fs::File::create(&path)
        .unwrap()
        .write_all(b"This is a test.")
        .unwrap();

    let mock = Arc::new(MockTransport::new());
    mock.push_response("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    mock.push_response("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");

    let mut request = request_over(&mock, "http://www.example.com/upload", "POST");
    request.add_post_parameter("foo", "bar");
    request
        .add_upload("upload", &path, None, Some("text/plain"))
        .unwrap();
    request.send().await.unwrap();
    request.send().await.unwrap();

    for sent in mock.request_texts() {
        let (head, body) = sent.split_once("\r\n\r\n").unwrap();
        let content_type = head
            .lines()
            .find_map(|l| l.strip_prefix("Content-Type: "))
            .unwrap();
        let boundary = content_type
            .strip_prefix("multipart/form-data; boundary=")
            .unwrap();
        let length: usize = head
            .lines()
            .find_map(|l| l.strip_prefix("Content-Length: "))
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(length, body.len());

        let field = body.find("name=\"foo\"\r\n\r\nbar\r\n").unwrap();
        let file = body
            .find("name=\"upload\"; filename=\"plaintext.txt\"\r\nContent-Type: text/plain\r\n\r\nThis is a test.\r\n")
            .unwrap();
        assert!(field < file);
        assert!(body.ends_with(&format!("--{}--\r\n", boundary)));
    }
}

#[tokio::test]
async fn test_upload_many_names_parts() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("a.bin");
    let second = dir.path().join("b.bin");
    std::fs::write(&first, b"one").unwrap();
    std::fs::write(&second, b"two").unwrap();

    let mock = Arc::new(MockTransport::new());
    mock.push_response("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");

    let mut request = request_over(&mock, "http://www.example.com/upload", "POST");
    request.add_upload_many("files", &[&first, &second]).unwrap();
    request.send().await.unwrap();

    let sent = &mock.request_texts()[0];
    assert!(sent.contains("name=\"files[0]\"; filename=\"a.bin\"\r\nContent-Type: application/octet-stream"));
    assert!(sent.contains("name=\"files[1]\"; filename=\"b.bin\""));
}

#[tokio::test]
async fn test_multipart_nested_field_names() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.bin");
    std::fs::write(&path, b"one").unwrap();

    let mock = Arc::new(MockTransport::new());
    mock.push_response("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");

    let mut request = request_over(&mock, "http://www.example.com/upload", "POST");
    request.add_post_parameter(
        "meta",
        ParamValue::map([("owner", ParamValue::map([("name", "alice")]))]),
    );
    request.add_upload("file", &path, None, None).unwrap();
    request.send().await.unwrap();

    let sent = &mock.request_texts()[0];
    assert!(sent.contains("name=\"meta[owner][name]\"\r\n\r\nalice\r\n"));
}

#[tokio::test]
async fn test_http10_request_line() {
    let mock = Arc::new(MockTransport::new());
    mock.push_response("HTTP/1.0 200 OK\r\n\r\n");

    let mut request = request_over(&mock, "http://www.example.com/old", "GET");
    request.set_config("protocol_version", "1.0").unwrap();
    request.send().await.unwrap();

    assert!(mock.request_texts()[0].starts_with("GET /old HTTP/1.0\r\n"));
}
