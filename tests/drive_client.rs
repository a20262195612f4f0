//! Drive storage against a mock Google API.

use codebuddy::storage::{is_unauthorized, DriveClient, DriveError};
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, header_regex, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "ya29.test";

fn client(server: &MockServer) -> DriveClient {
    DriveClient::new(&server.uri(), TOKEN, "CodeBuddy").unwrap()
}

async fn mock_existing_folder(server: &MockServer, id: &str) {
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("pageSize", "10"))
        .and(header("Authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [{ "id": id, "name": "CodeBuddy" }]
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn missing_folder_is_created() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("pageSize", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "files": [] })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/drive/v3/files"))
        .and(body_string_contains("application/vnd.google-apps.folder"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "folder-new", "name": "CodeBuddy"
        })))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(client(&server).ensure_folder().await.unwrap(), "folder-new");
}

#[tokio::test]
async fn cached_folder_skips_the_search() {
    let server = MockServer::start().await;
    let tmp = TempDir::new().unwrap();
    let state = tmp.path().join("drive_state.json");
    std::fs::write(&state, r#"{"folder_id":"folder-cached"}"#).unwrap();

    Mock::given(method("GET"))
        .and(path("/drive/v3/files/folder-cached"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "folder-cached",
            "name": "CodeBuddy",
            "mimeType": "application/vnd.google-apps.folder",
            "trashed": false
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let drive = client(&server).with_folder_cache(&state);
    assert_eq!(drive.ensure_folder().await.unwrap(), "folder-cached");
}

#[tokio::test]
async fn stale_cache_falls_back_to_search_and_is_rewritten() {
    let server = MockServer::start().await;
    let tmp = TempDir::new().unwrap();
    let state = tmp.path().join("drive_state.json");
    std::fs::write(&state, r#"{"folder_id":"gone"}"#).unwrap();

    Mock::given(method("GET"))
        .and(path("/drive/v3/files/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_string("File not found"))
        .mount(&server)
        .await;
    mock_existing_folder(&server, "folder-found").await;

    let drive = client(&server).with_folder_cache(&state);
    assert_eq!(drive.ensure_folder().await.unwrap(), "folder-found");
    let cached = std::fs::read_to_string(&state).unwrap();
    assert!(cached.contains("folder-found"));
}

#[tokio::test]
async fn upload_sends_multipart_into_the_folder() {
    let server = MockServer::start().await;
    mock_existing_folder(&server, "folder-1").await;
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(query_param("uploadType", "multipart"))
        .and(header_regex("Content-Type", "^multipart/related; boundary=-------314159265358979323846$"))
        .and(body_string_contains(r#""parents":["folder-1"]"#))
        .and(body_string_contains("print('hi')"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "file-9",
            "name": "hello.py",
            "webViewLink": "https://drive.google.com/file/d/file-9/view"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let uploaded = client(&server).upload("hello.py", "print('hi')\n").await.unwrap();
    assert_eq!(uploaded.id, "file-9");
    assert_eq!(uploaded.name.as_deref(), Some("hello.py"));
    assert!(uploaded.web_view_link.is_some());
}

#[tokio::test]
async fn upload_goes_to_root_when_the_folder_cannot_be_resolved() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(403).set_body_string("insufficient scope"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "root-file" })))
        .expect(1)
        .mount(&server)
        .await;

    let uploaded = client(&server).upload("a.js", "1").await.unwrap();
    assert_eq!(uploaded.id, "root-file");

    let requests = server.received_requests().await.unwrap();
    let upload = requests
        .iter()
        .find(|r| r.url.path() == "/upload/drive/v3/files")
        .unwrap();
    let body = String::from_utf8_lossy(&upload.body);
    assert!(!body.contains("parents"), "{body}");
}

#[tokio::test]
async fn list_download_and_delete() {
    let server = MockServer::start().await;
    mock_existing_folder(&server, "folder-1").await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("pageSize", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [
                { "id": "f1", "name": "main.c", "mimeType": "text/plain" },
                { "id": "f2", "name": "notes.md", "mimeType": "text/plain" }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/f1"))
        .and(query_param("alt", "media"))
        .respond_with(ResponseTemplate::new(200).set_body_string("int main() {}\n"))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/drive/v3/files/f2"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let drive = client(&server);
    let files = drive.list_files().await.unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].name, "main.c");

    assert_eq!(drive.download("f1").await.unwrap(), "int main() {}\n");
    drive.delete("f2").await.unwrap();
}

#[tokio::test]
async fn expired_token_is_reported_as_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oauth2/v3/userinfo"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_token"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let drive = client(&server);
    let err = drive.user_info().await.unwrap_err();
    assert!(is_unauthorized(&err));
    assert!(matches!(err.downcast_ref::<DriveError>(), Some(DriveError::Unauthorized)));

    // A rejected session must not fall back to a root upload.
    let err = drive.upload("a.js", "1").await.unwrap_err();
    assert!(is_unauthorized(&err));
}
