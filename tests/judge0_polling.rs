//! Judge0 submission and polling against a mock RapidAPI endpoint.

use codebuddy::backends::judge0::INPUT_PROMPT;
use codebuddy::backends::{Judge0Backend, Judge0Client, Judge0Error};
use codebuddy::config::Judge0Config;
use codebuddy::console::{RecordingSurface, Relay};
use codebuddy::languages::Language;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> Arc<Judge0Client> {
    let config = Judge0Config {
        api_url: server.uri(),
        api_key: Some("test-key".into()),
        poll_interval_ms: 1,
        ..Judge0Config::default()
    };
    Arc::new(Judge0Client::new(&config).unwrap())
}

async fn mock_submission(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/submissions"))
        .and(header("X-RapidAPI-Key", "test-key"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "token": token })))
        .expect(1)
        .mount(server)
        .await;
}

async fn run(backend: Judge0Backend, language: Language, source: &str) -> (Relay, Arc<RecordingSurface>) {
    let surface = Arc::new(RecordingSurface::new());
    let relay = Relay::new(surface.clone());
    relay
        .start(source, language, Arc::new(backend))
        .finished()
        .await;
    (relay, surface)
}

#[tokio::test]
async fn accepted_program_output_is_composed() {
    let server = MockServer::start().await;
    mock_submission(&server, "tok-1").await;
    Mock::given(method("GET"))
        .and(path("/submissions/tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": { "id": 3, "description": "Accepted" },
            "stdout": "Hello, World from C!\n",
            "stderr": null,
            "compile_output": null
        })))
        .mount(&server)
        .await;

    let backend = Judge0Backend::new(client(&server), Language::C);
    let (relay, surface) = run(backend, Language::C, "int main() { return 0; }").await;

    assert_eq!(
        relay.render(),
        "Compiling C code (Language ID: 103)...\nRunning program...\n\n\
         Program Output:\nHello, World from C!\n\n"
    );
    assert_eq!(surface.finished_count(), 1);
}

#[tokio::test]
async fn pending_forever_times_out_with_one_error() {
    let server = MockServer::start().await;
    mock_submission(&server, "slow").await;
    Mock::given(method("GET"))
        .and(path("/submissions/slow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": { "id": 2, "description": "Processing" }
        })))
        .expect(30)
        .mount(&server)
        .await;

    let backend = Judge0Backend::new(client(&server), Language::Cpp);
    let (relay, surface) = run(backend, Language::Cpp, "int main() {}").await;

    let transcript = relay.transcript();
    let errors: Vec<_> = transcript.entries().iter().filter(|e| e.is_error()).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].text(),
        "Execution timeout - program took too long to complete"
    );
    assert_eq!(surface.finished_count(), 1);
}

#[tokio::test]
async fn submit_failure_surfaces_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/submissions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("quota exceeded"))
        .mount(&server)
        .await;

    let client = client(&server);
    let err = client.submit(103, "int main() {}", "").await.unwrap_err();
    match err.downcast_ref::<Judge0Error>() {
        Some(Judge0Error::Http { status, body, .. }) => {
            assert_eq!(*status, 500);
            assert_eq!(body, "quota exceeded");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn stdin_is_collected_before_submission() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/submissions"))
        .and(body_partial_json(serde_json::json!({ "language_id": 103, "stdin": "10 20" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "token": "io" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/submissions/io"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": { "id": 3, "description": "Accepted" },
            "stdout": "30\n"
        })))
        .mount(&server)
        .await;

    let surface = Arc::new(RecordingSurface::new());
    let relay = Relay::new(surface.clone());
    let source = "#include <stdio.h>\nint main() { int a, b; scanf(\"%d %d\", &a, &b); printf(\"%d\\n\", a + b); }";
    let handle = relay.start(
        source,
        Language::C,
        Arc::new(Judge0Backend::new(client(&server), Language::C)),
    );

    for _ in 0..200 {
        if relay.is_waiting_for_input() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(relay.snapshot().pending_prompt.as_deref(), Some(INPUT_PROMPT));
    assert!(relay.submit_input("  10 20 \n"));
    handle.finished().await;

    let rendered = relay.render();
    assert!(rendered.starts_with("This program requires input.\n"), "{rendered}");
    assert!(rendered.contains("Input provided: 10 20\n"), "{rendered}");
    assert!(rendered.ends_with("Program Output:\n30\n\n"), "{rendered}");
}

#[tokio::test]
async fn connection_check_counts_languages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/languages"))
        .and(header("X-RapidAPI-Key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            { "id": 103, "name": "C (GCC 14.1.0)" },
            { "id": 105, "name": "C++ (GCC 14.1.0)" }
        ])))
        .mount(&server)
        .await;

    assert_eq!(client(&server).check_connection().await.unwrap(), 2);
}

#[tokio::test]
async fn unreachable_service_is_one_error_then_completion() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = Judge0Config {
        api_url: format!("http://127.0.0.1:{port}"),
        api_key: Some("test-key".into()),
        poll_interval_ms: 1,
        request_timeout_secs: 5,
        ..Judge0Config::default()
    };
    let client = Arc::new(Judge0Client::new(&config).unwrap());

    let (relay, surface) = run(
        Judge0Backend::new(client, Language::C),
        Language::C,
        "int main() { return 0; }",
    )
    .await;

    let transcript = relay.transcript();
    let errors: Vec<_> = transcript.entries().iter().filter(|e| e.is_error()).collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        transcript.last().map(|e| e.is_error()),
        Some(true),
        "nothing may follow the error"
    );
    assert_eq!(surface.finished_count(), 1);
}
