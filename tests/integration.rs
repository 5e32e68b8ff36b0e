use actix_web::{http::StatusCode, test, web, App};
use chrono::Duration;
use serde_json::Value;
use std::sync::Arc;

use file_drop::api;
use file_drop::app_state::AppState;
use file_drop::clock::ManualClock;
use file_drop::config::AppConfig;
use file_drop::metadata::mock_store::MockMetadataStore;
use file_drop::storage::mock_store::MockBlobStore;

fn state_with(config: AppConfig, clock: ManualClock) -> AppState {
    AppState::assemble(
        config,
        Arc::new(MockBlobStore::new()),
        Arc::new(MockMetadataStore::new()),
        Arc::new(clock),
    )
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state.clone()))
                .configure(api::configure),
        )
        .await
    };
}

macro_rules! upload {
    ($app:expr, $uri:expr, $password:expr, $payload:expr) => {{
        let mut req = test::TestRequest::post()
            .uri($uri)
            .insert_header(("content-type", "application/octet-stream"))
            .set_payload($payload.to_vec());
        let password: Option<&str> = $password;
        if let Some(password) = password {
            req = req.insert_header((api::PASSWORD_HEADER, password));
        }
        let resp = test::call_service(&$app, req.to_request()).await;
        let status = resp.status();
        let body = test::read_body(resp).await;
        let json: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }};
}

#[actix_web::test]
async fn test_upload_then_download() {
    let state = state_with(AppConfig::default(), ManualClock::default());
    let app = app!(state);

    let (status, receipt) = upload!(app, "/upload?name=notes.txt&retention=1h", None, b"hello world");
    assert_eq!(status, StatusCode::OK);
    let id = receipt["id"].as_str().unwrap().to_string();
    assert_eq!(id.len(), 6);
    assert_eq!(receipt["original_name"], "notes.txt");

    let req = test::TestRequest::get().uri(&format!("/download/{}", id)).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let headers = resp.headers();
    assert_eq!(headers.get("content-type").unwrap(), "application/octet-stream");
    let disposition = headers.get("content-disposition").unwrap().to_str().unwrap();
    assert!(disposition.starts_with("attachment"));
    assert!(disposition.contains("notes.txt"));
    let etag = headers.get("etag").unwrap().to_str().unwrap().to_string();
    assert_eq!(etag, format!("\"{:x}\"", md5::compute(b"hello world")));

    let body = test::read_body(resp).await;
    assert_eq!(&body[..], b"hello world");
}

#[actix_web::test]
async fn test_upload_rejects_bad_retention_and_name() {
    let state = state_with(AppConfig::default(), ManualClock::default());
    let app = app!(state);

    let (status, body) = upload!(app, "/upload?name=a.txt&retention=99h", None, b"x");
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");

    let (status, body) = upload!(app, "/upload?name=..%2Fa.txt&retention=1h", None, b"x");
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation");
}

#[actix_web::test]
async fn test_names_with_control_characters_are_rejected() {
    let state = state_with(AppConfig::default(), ManualClock::default());
    let app = app!(state);

    for name in ["a%0Ab.txt", "a%0Db.txt", "a%01b.txt"] {
        let (status, body) = upload!(app, &format!("/upload?name={}&retention=1h", name), None, b"data");
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", name);
        assert_eq!(body["error"], "validation", "{}", name);
    }
    assert_eq!(state.service.list_all().unwrap().len(), 0);
}

#[actix_web::test]
async fn test_unusual_names_round_trip() {
    let state = state_with(AppConfig::default(), ManualClock::default());
    let app = app!(state);

    // "отчёт.txt" and `say "hi".txt`, percent-encoded
    for name in ["%D0%BE%D1%82%D1%87%D1%91%D1%82.txt", "say%20%22hi%22.txt"] {
        let (status, receipt) = upload!(app, &format!("/upload?name={}&retention=1h", name), None, b"data");
        assert_eq!(status, StatusCode::OK, "{}", name);
        let id = receipt["id"].as_str().unwrap();

        let req = test::TestRequest::get().uri(&format!("/download/{}", id)).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK, "{}", name);
        let body = test::read_body(resp).await;
        assert_eq!(&body[..], b"data");
    }
}

#[actix_web::test]
async fn test_file_id_log_context_is_cleared_after_request() {
    let state = state_with(AppConfig::default(), ManualClock::default());
    let app = app!(state);

    let (_, receipt) = upload!(app, "/upload?name=a.txt&retention=1h", None, b"tagged");
    assert!(log_mdc::get("file_id", |v| v.is_none()));

    let id = receipt["id"].as_str().unwrap();
    let req = test::TestRequest::get().uri(&format!("/download/{}", id)).to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(&body[..], b"tagged");
    assert!(log_mdc::get("file_id", |v| v.is_none()));
}

#[actix_web::test]
async fn test_oversized_upload_is_413() {
    let mut config = AppConfig::default();
    config.ingest.max_file_size = 8;
    let state = state_with(config, ManualClock::default());
    let app = app!(state);

    let (status, body) = upload!(app, "/upload?name=big.bin&retention=1h", None, &[0u8; 9]);
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "capacity");

    let req = test::TestRequest::get().uri("/files").to_request();
    let files: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(files.as_array().unwrap().len(), 0);
}

#[actix_web::test]
async fn test_password_protected_download() {
    let state = state_with(AppConfig::default(), ManualClock::default());
    let app = app!(state);

    let (_, receipt) = upload!(app, "/upload?name=s.txt&retention=1h", Some("hunter2"), b"secret");
    let id = receipt["id"].as_str().unwrap();

    for uri in [format!("/download/{}", id), format!("/download/{}?password=nope", id)] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{}", uri);
    }

    let req = test::TestRequest::get()
        .uri(&format!("/download/{}?password=hunter2", id))
        .to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(&body[..], b"secret");
}

#[actix_web::test]
async fn test_expired_file_disappears() {
    let clock = ManualClock::default();
    let state = state_with(AppConfig::default(), clock.clone());
    let app = app!(state);

    let (_, receipt) = upload!(app, "/upload?name=a.txt&retention=5m", Some("pw"), b"brief");
    let id = receipt["id"].as_str().unwrap().to_string();

    clock.advance(Duration::minutes(5));

    // Expiry wins over a wrong password
    let req = test::TestRequest::get()
        .uri(&format!("/download/{}?password=wrong", id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let req = test::TestRequest::get().uri("/files").to_request();
    let files: Value = test::call_and_read_body_json(&app, req).await;
    assert!(files.as_array().unwrap().is_empty());

    assert_eq!(state.service.sweep(state.service.now()).unwrap(), 1);
}

#[actix_web::test]
async fn test_list_and_delete() {
    let clock = ManualClock::default();
    let state = state_with(AppConfig::default(), clock.clone());
    let app = app!(state);

    let (_, first) = upload!(app, "/upload?name=first.txt&retention=1h", None, b"1");
    clock.advance(Duration::seconds(1));
    let (_, second) = upload!(app, "/upload?name=second.txt&retention=1h", None, b"22");

    let req = test::TestRequest::get().uri("/files").to_request();
    let files: Value = test::call_and_read_body_json(&app, req).await;
    let files = files.as_array().unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0]["id"], second["id"]);
    assert_eq!(files[0]["size_bytes"], 2);
    assert_eq!(files[1]["id"], first["id"]);

    let uri = format!("/files/{}", first["id"].as_str().unwrap());
    let resp = test::call_service(&app, test::TestRequest::delete().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = test::call_service(&app, test::TestRequest::delete().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "not_found");
}

#[actix_web::test]
async fn test_unknown_id_is_404() {
    let state = AppState::new_for_testing();
    let app = app!(state);
    let resp = test::call_service(&app, test::TestRequest::get().uri("/download/zzzzzz").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
