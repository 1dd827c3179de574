//! Observer event sequences for whole sends.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use wirenet::base::neterror::NetError;
use wirenet::http::events::{EventSequence, NetEvent, Observer};
use wirenet::socket::mock::MockTransport;
use wirenet::urlrequest::adapter::SocketAdapter;
use wirenet::urlrequest::request::URLRequest;

fn request_over(mock: &Arc<MockTransport>, url: &str, method: &str) -> URLRequest {
    let mut request = URLRequest::with_url(url, method).unwrap();
    request.set_adapter(Arc::new(SocketAdapter::with_transport(mock.clone())));
    request
}

/// Fails the send once more than `limit` body bytes arrive.
struct SizeLimit {
    limit: usize,
    seen: AtomicUsize,
}

impl Observer for SizeLimit {
    fn on_event(&self, event: &NetEvent<'_>) -> Result<(), NetError> {
        if let NetEvent::ReceivedBodyPart(data) = event {
            let seen = self.seen.fetch_add(data.len(), Ordering::SeqCst) + data.len();
            if seen > self.limit {
                return Err(NetError::Aborted(format!(
                    "Body size limit of {} bytes exceeded",
                    self.limit
                )));
            }
        }
        Ok(())
    }
}

#[derive(Default)]
struct Warnings(Mutex<Vec<String>>);

impl Observer for Warnings {
    fn on_event(&self, event: &NetEvent<'_>) -> Result<(), NetError> {
        if let NetEvent::Warning(message) = event {
            self.0.lock().unwrap().push(message.to_string());
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_get_sequence() {
    let mock = Arc::new(MockTransport::new());
    mock.push_response("HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello");
    let events = Arc::new(EventSequence::new());

    let mut request = request_over(&mock, "http://www.example.com/", "GET");
    request.attach(events.clone());
    request.send().await.unwrap();

    assert_eq!(
        events.sequence(),
        vec!["sentHeaders", "receivedHeaders", "receivedBodyPart", "receivedBody"]
    );
}

#[tokio::test]
async fn test_default_redirect_drops_body() {
    let mock = Arc::new(MockTransport::new());
    mock.push_response("HTTP/1.1 302 Found\r\nLocation: /target\r\nContent-Length: 0\r\n\r\n");
    mock.push_response("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    let events = Arc::new(EventSequence::watching(&[
        "sentHeaders",
        "sentBodyPart",
        "sentBody",
        "receivedHeaders",
    ]));

    let mut request = request_over(&mock, "http://www.example.com/form", "POST");
    request.set_config("follow_redirects", true).unwrap();
    request.set_body("foo=bar");
    request.attach(events.clone());
    let response = request.send().await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        events.sequence(),
        vec![
            "sentHeaders",
            "sentBodyPart",
            "sentBody",
            "receivedHeaders",
            "sentHeaders",
            "receivedHeaders"
        ]
    );
    let sent = mock.request_texts();
    assert!(sent[1].starts_with("GET /target HTTP/1.1\r\n"), "{}", sent[1]);
    assert!(!sent[1].contains("foo=bar"));
    assert!(!sent[1].contains("Content-Length"));
}

#[tokio::test]
async fn test_strict_redirect_resends_body() {
    let mock = Arc::new(MockTransport::new());
    mock.push_response("HTTP/1.1 302 Found\r\nLocation: /target\r\nContent-Length: 0\r\n\r\n");
    mock.push_response("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    let events = Arc::new(EventSequence::watching(&[
        "sentHeaders",
        "sentBodyPart",
        "sentBody",
        "receivedHeaders",
    ]));

    let mut request = request_over(&mock, "http://www.example.com/form", "POST");
    request
        .set_config("follow_redirects", true)
        .unwrap()
        .set_config("strict_redirects", true)
        .unwrap();
    request.set_body("foo=bar");
    request.attach(events.clone());
    request.send().await.unwrap();

    assert_eq!(
        events.sequence(),
        vec![
            "sentHeaders",
            "sentBodyPart",
            "sentBody",
            "receivedHeaders",
            "sentHeaders",
            "sentBodyPart",
            "sentBody",
            "receivedHeaders"
        ]
    );
    let sent = mock.request_texts();
    assert!(sent[1].starts_with("POST /target HTTP/1.1\r\n"));
    assert!(sent[1].ends_with("\r\n\r\nfoo=bar"));
}

#[tokio::test]
async fn test_interim_response_yields_one_received_headers() {
    let mock = Arc::new(MockTransport::new());
    mock.push_response(
        "HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok",
    );
    let events = Arc::new(EventSequence::watching(&["receivedHeaders"]));

    let mut request = request_over(&mock, "http://www.example.com/", "GET");
    request.attach(events.clone());
    let response = request.send().await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(events.sequence(), vec!["receivedHeaders"]);
}

#[tokio::test]
async fn test_incomplete_chunked_body_is_accepted() {
    let mock = Arc::new(MockTransport::new());
    mock.push_response("HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n");
    let events = Arc::new(EventSequence::watching(&["receivedBodyPart", "receivedBody"]));
    let warnings = Arc::new(Warnings::default());

    let mut request = request_over(&mock, "http://www.example.com/", "GET");
    request.attach(events.clone()).attach(warnings.clone());
    let response = request.send().await.unwrap();

    assert_eq!(response.text(), "hello");
    assert_eq!(events.sequence(), vec!["receivedBodyPart", "receivedBody"]);
    assert_eq!(warnings.0.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_observer_can_abort_download() {
    let mock = Arc::new(MockTransport::new());
    mock.push_response(format!(
        "HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n{}",
        "x".repeat(100)
    ));
    let limit = Arc::new(SizeLimit {
        limit: 10,
        seen: AtomicUsize::new(0),
    });

    let mut request = request_over(&mock, "http://www.example.com/", "GET");
    request.attach(limit);
    let err = request.send().await.unwrap_err();

    assert!(err.is_message_error());
    assert!(err.to_string().contains("limit"));
}

#[tokio::test]
async fn test_attach_once_and_detach() {
    let mock = Arc::new(MockTransport::new());
    mock.push_response("HTTP/1.1 204 No Content\r\n\r\n");
    mock.push_response("HTTP/1.1 204 No Content\r\n\r\n");
    let events = Arc::new(EventSequence::watching(&["sentHeaders"]));
    let observer: Arc<dyn Observer> = events.clone();

    let mut request = request_over(&mock, "http://www.example.com/", "GET");
    request.attach(observer.clone()).attach(observer.clone());
    request.send().await.unwrap();
    assert_eq!(events.sequence(), vec!["sentHeaders"]);

    request.detach(&observer).detach(&observer);
    request.send().await.unwrap();
    assert_eq!(events.sequence(), vec!["sentHeaders"]);
}
