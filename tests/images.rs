mod common;

use axum::http::StatusCode;
use chrono::{TimeZone, Utc};
use common::{TestApp, app, fake_jpeg};

async fn seed(app: &TestApp, hour: u32, random: bool) -> String {
    app.metadata
        .pin_time(Utc.with_ymd_and_hms(2025, 3, 1, hour, 0, 0).unwrap());
    if random {
        // keep only the first image of the batch
        let next = app.media.upload_calls() + 1;
        app.media.fail_upload_number(next + 1);
        app.media.fail_upload_number(next + 2);
        let res = app.post_empty("/upload_random_images").await;
        assert_eq!(res.json()["count"], 1);
        res.json()["images"][0]["firebase_doc_id"]
            .as_str()
            .unwrap()
            .to_string()
    } else {
        let res = app.upload_jpeg(&fake_jpeg(128)).await;
        assert_eq!(res.status, StatusCode::OK);
        res.json()["firebase_doc_id"].as_str().unwrap().to_string()
    }
}

// ---------------------------------------------------------------------------
// GET /get_images
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lists_newest_first() {
    let app = app();
    let first = seed(&app, 8, false).await;
    let second = seed(&app, 10, false).await;
    let third = seed(&app, 9, false).await;

    let res = app.get("/get_images").await;
    assert_eq!(res.status, StatusCode::OK);
    let body = res.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 3);

    let ids: Vec<&str> = body["images"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![second.as_str(), third.as_str(), first.as_str()]);
}

#[tokio::test]
async fn filters_by_source_type_and_limit() {
    let app = app();
    seed(&app, 8, false).await;
    seed(&app, 9, false).await;
    seed(&app, 10, false).await;
    let random = seed(&app, 11, true).await;

    let res = app.get("/get_images?source_type=esp32&limit=2").await;
    let body = res.json();
    assert_eq!(body["count"], 2);
    assert!(
        body["images"]
            .as_array()
            .unwrap()
            .iter()
            .all(|i| i["source_type"] == "esp32")
    );

    let res = app.get("/get_images?source_type=random").await;
    let body = res.json();
    assert_eq!(body["count"], 1);
    assert_eq!(body["images"][0]["id"], random.as_str());

    let res = app.get("/get_images?source_type=all&limit=50").await;
    assert_eq!(res.json()["count"], 4);
}

#[tokio::test]
async fn unknown_source_type_returns_empty_list() {
    let app = app();
    seed(&app, 8, false).await;

    let res = app.get("/get_images?source_type=doorbell").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["count"], 0);
}

#[tokio::test]
async fn invalid_limit_is_rejected() {
    let app = app();
    for uri in ["/get_images?limit=abc", "/get_images?limit=0", "/get_images?limit=-3"] {
        let res = app.get(uri).await;
        assert_eq!(res.status, StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(res.json()["success"], false);
    }
}

#[tokio::test]
async fn limit_is_bounded_by_store_maximum() {
    let app = app();
    seed(&app, 8, false).await;

    let res = app.get("/get_images?limit=99999999999").await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.message(), "Invalid limit `99999999999`");

    let res = app.get("/get_images?limit=2147483648").await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);

    let res = app.get("/get_images?limit=2147483647").await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.json()["count"], 1);
}

#[tokio::test]
async fn listing_without_metadata_store_fails() {
    let app = TestApp::without_metadata();
    let res = app.get("/get_images").await;

    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.message(), "Metadata store not initialized");
}

#[tokio::test]
async fn listing_reports_store_errors() {
    let app = app();
    app.metadata.set_unreachable(true);

    let res = app.get("/get_images").await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(res.message().starts_with("Error fetching images"));
}

// ---------------------------------------------------------------------------
// DELETE /delete_image/{id}
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_removes_binary_and_record() {
    let app = app();
    let id = seed(&app, 8, false).await;
    let public_id = app.metadata.snapshot()[0].public_id.clone().unwrap();

    let res = app.delete(&format!("/delete_image/{}", id)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.message(), "Image deleted successfully");
    assert!(app.metadata.is_empty());
    assert!(!app.media.contains(&public_id));

    let res = app.get("/get_images").await;
    assert_eq!(res.json()["count"], 0);
}

#[tokio::test]
async fn delete_of_unknown_id_is_not_found() {
    let app = app();
    seed(&app, 8, false).await;

    let res = app.delete("/delete_image/no-such-record").await;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    assert_eq!(res.message(), "Image not found in database");
    assert_eq!(app.media.delete_calls(), 0);
    assert_eq!(app.metadata.len(), 1);
}

#[tokio::test]
async fn escaped_characters_are_part_of_the_id() {
    let app = app();
    let id = seed(&app, 8, false).await;

    for suffix in ["%3Fx=1", "%23frag", "%2Fextra"] {
        let res = app.delete(&format!("/delete_image/{}{}", id, suffix)).await;
        assert_eq!(res.status, StatusCode::NOT_FOUND, "{}", suffix);
    }
    assert_eq!(app.metadata.len(), 1);
    assert_eq!(app.media.delete_calls(), 0);
}

#[tokio::test]
async fn delete_proceeds_when_media_delete_fails() {
    let app = app();
    let id = seed(&app, 8, false).await;
    app.media.fail_deletes(true);

    let res = app.delete(&format!("/delete_image/{}", id)).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(app.media.delete_calls(), 1);
    assert!(app.metadata.is_empty());
}

#[tokio::test]
async fn delete_reports_metadata_failure() {
    let app = app();
    let id = seed(&app, 8, false).await;
    app.metadata.fail_deletes(true);

    let res = app.delete(&format!("/delete_image/{}", id)).await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(res.message().starts_with("Error deleting image"));
}

#[tokio::test]
async fn delete_without_metadata_store_fails() {
    let app = TestApp::without_metadata();
    let res = app.delete("/delete_image/anything").await;

    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.message(), "Metadata store not initialized");
    assert_eq!(app.media.delete_calls(), 0);
}
