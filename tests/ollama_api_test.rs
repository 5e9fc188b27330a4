use diagramchat::error::GenerationError;
use diagramchat::ollama_api::{GenerationService, OllamaClient};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ndjson(lines: &[&str]) -> String {
    lines.iter().map(|l| format!("{}\n", l)).collect()
}

fn recorder() -> (Arc<Mutex<Vec<String>>>, Box<dyn FnMut(String) + Send>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, Box::new(move |text| sink.lock().unwrap().push(text)))
}

#[tokio::test]
async fn stream_delivers_full_text_so_far() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(serde_json::json!({ "model": "llama3", "stream": true })))
        .respond_with(ResponseTemplate::new(200).set_body_string(ndjson(&[
            r#"{"response":"@startuml\n","done":false}"#,
            r#"{"response":"A->B\n","done":false}"#,
            r#"{"response":"@enduml","done":false}"#,
            r#"{"response":"","done":true}"#,
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = OllamaClient::new(server.uri());
    let (seen, on_partial) = recorder();
    let text = client
        .stream("llama3", "draw", CancellationToken::new(), on_partial)
        .await
        .unwrap();

    assert_eq!(text, "@startuml\nA->B\n@enduml");
    assert_eq!(
        *seen.lock().unwrap(),
        vec!["@startuml\n", "@startuml\nA->B\n", "@startuml\nA->B\n@enduml"]
    );
}

#[tokio::test]
async fn last_line_without_newline_is_read() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"response":"graph TD","done":true}"#),
        )
        .mount(&server)
        .await;

    let (_seen, on_partial) = recorder();
    let text = OllamaClient::new(server.uri())
        .stream("llama3", "draw", CancellationToken::new(), on_partial)
        .await
        .unwrap();
    assert_eq!(text, "graph TD");
}

#[tokio::test]
async fn reasoning_block_is_hidden() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ndjson(&[
            r#"{"response":"<think>plan","done":false}"#,
            r#"{"response":"</think>\n","done":false}"#,
            r#"{"response":"@startmindmap","done":true}"#,
        ])))
        .mount(&server)
        .await;

    let (seen, on_partial) = recorder();
    let text = OllamaClient::new(server.uri())
        .stream("deepseek-r1", "draw", CancellationToken::new(), on_partial)
        .await
        .unwrap();

    assert_eq!(text, "@startmindmap");
    assert_eq!(*seen.lock().unwrap(), vec!["", "", "@startmindmap"]);
}

#[tokio::test]
async fn http_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (_seen, on_partial) = recorder();
    let err = OllamaClient::new(server.uri())
        .stream("llama3", "draw", CancellationToken::new(), on_partial)
        .await
        .unwrap_err();

    assert!(matches!(err, GenerationError::Status(status) if status.as_u16() == 500));
    assert!(!err.is_cancelled());
}

#[tokio::test]
async fn error_inside_stream_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(ndjson(&[r#"{"error":"model 'nope' not found"}"#])),
        )
        .mount(&server)
        .await;

    let (_seen, on_partial) = recorder();
    let err = OllamaClient::new(server.uri())
        .stream("nope", "draw", CancellationToken::new(), on_partial)
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Generator reported an error: model 'nope' not found");
}

#[tokio::test]
async fn cancellation_while_waiting_is_reported_as_cancelled() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(ndjson(&[r#"{"response":"late","done":true}"#]))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let (seen, on_partial) = recorder();
    let err = OllamaClient::new(server.uri())
        .stream("llama3", "draw", token, on_partial)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.to_string(), "Interrupted");
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn models_are_listed_from_tags() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "models": [{ "name": "llama3:latest" }, { "name": "qwen2:7b" }]
        })))
        .mount(&server)
        .await;

    let models = OllamaClient::new(server.uri()).fetch_models().await.unwrap();
    assert_eq!(models, vec!["llama3:latest", "qwen2:7b"]);
}
