//! End-to-end runs of the profile picture download against a mocked avatar host

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::*;
use serde_json::json;
use slack_export_enrich::config::{ArchiveConfig, ProfilePictureConfig};
use slack_export_enrich::{PictureFetcher, fetch_profile_pictures};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const JPEG: &[u8] = b"\xff\xd8\xff\xe0fake-jpeg";
const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake-png";

fn fetcher_for(server: &MockServer) -> PictureFetcher {
    PictureFetcher::new(ProfilePictureConfig {
        allowed_prefix: format!("{}/", server.uri()),
        ..ProfilePictureConfig::default()
    })
    .unwrap()
}

fn users_json(server: &MockServer) -> Vec<u8> {
    let base = server.uri();
    serde_json::to_vec(&json!([
        {"id": "U123", "name": "ada", "profile": {"image_original": format!("{base}/2020-01-01/U123_512.jpg")}},
        {"id": "U456", "name": "bob", "profile": {"image_original": format!("{base}/2020-01-01/U456_original.png")}},
        {"id": "U789", "name": "eve", "profile": {"image_original": "https://secure.gravatar.com/avatar/abc.jpg"}},
        {"id": "U000", "name": "gone", "profile": {"image_original": format!("{base}/2020-01-01/U000_512.jpg")}},
        {"name": "no-id", "profile": {"image_original": format!("{base}/x.jpg")}},
        {"id": "U999", "name": "no-profile"}
    ]))
    .unwrap()
}

async fn mount_avatars(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/2020-01-01/U123_512.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(JPEG.to_vec()))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/2020-01-01/U456_original.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG.to_vec()))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/2020-01-01/U000_512.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/x.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(JPEG.to_vec()))
        .expect(0)
        .mount(server)
        .await;
}

#[tokio::test]
async fn pictures_are_added_as_entries_and_linked_from_profiles() {
    let server = MockServer::start().await;
    mount_avatars(&server).await;

    let dir = TempDir::new().unwrap();
    let input = dir.path().join("export.zip");
    let output = dir.path().join("with-pictures.zip");
    let users = users_json(&server);
    write_export(
        &input,
        &[
            ("channels.json", CHANNELS_JSON),
            ("users.json", &users),
            ("general/2020-01-01.json", GENERAL_DAY_JSON),
        ],
    );

    let summary = fetch_profile_pictures(ArchiveConfig::new(&input, &output), fetcher_for(&server))
        .await
        .unwrap();

    assert!(summary.target_rewritten);
    assert_eq!(summary.added, 2);
    assert_eq!(
        entry_names(&output),
        vec![
            "channels.json",
            "profile_pictures/U123.jpg",
            "profile_pictures/U456.png",
            "users.json",
            "general/2020-01-01.json",
        ]
    );
    assert_eq!(read_entry(&output, "profile_pictures/U123.jpg"), JPEG);
    assert_eq!(read_entry(&output, "profile_pictures/U456.png"), PNG);

    let before: serde_json::Value = serde_json::from_slice(&users).unwrap();
    let after = read_users(&output);
    assert_eq!(after[0]["profile"]["image_path"], "profile_pictures/U123.jpg");
    assert_eq!(after[1]["profile"]["image_path"], "profile_pictures/U456.png");
    // Other origin, failed download, no id, no profile: unchanged
    for i in 2..6 {
        assert_eq!(after[i], before[i], "record {i} should be untouched");
    }

    assert_eq!(
        raw_entry(&output, "channels.json"),
        raw_entry(&input, "channels.json")
    );
}

#[tokio::test]
async fn picture_already_in_export_is_not_duplicated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/U123.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(JPEG.to_vec()))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let input = dir.path().join("export.zip");
    let output = dir.path().join("out.zip");
    let users = serde_json::to_vec(&json!([
        {"id": "U123", "profile": {"image_original": format!("{}/U123.jpg", server.uri())}}
    ]))
    .unwrap();
    write_export(
        &input,
        &[
            ("profile_pictures/U123.jpg", b"original"),
            ("users.json", &users),
        ],
    );

    let summary = fetch_profile_pictures(ArchiveConfig::new(&input, &output), fetcher_for(&server))
        .await
        .unwrap();

    assert_eq!(summary.added, 0);
    assert_eq!(entry_names(&output), entry_names(&input));
    assert_eq!(read_entry(&output, "profile_pictures/U123.jpg"), b"original");
    assert!(read_users(&output)[0]["profile"].get("image_path").is_none());
}

#[tokio::test]
async fn export_without_users_json_gains_no_entries() {
    let server = MockServer::start().await;

    let dir = TempDir::new().unwrap();
    let input = dir.path().join("export.zip");
    let output = dir.path().join("out.zip");
    write_export(&input, &[("channels.json", CHANNELS_JSON)]);

    let summary = fetch_profile_pictures(ArchiveConfig::new(&input, &output), fetcher_for(&server))
        .await
        .unwrap();

    assert!(!summary.target_rewritten);
    assert_eq!(entry_names(&output), vec!["channels.json"]);
    assert_eq!(read_entry(&output, "channels.json"), CHANNELS_JSON);
}

#[tokio::test]
async fn entry_extra_fields_and_comments_survive_the_rewrite() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/U123.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(JPEG.to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let input = dir.path().join("export.zip");
    let output = dir.path().join("out.zip");
    let users = serde_json::to_vec(&json!([
        {"id": "U123", "profile": {"image_original": format!("{}/U123.jpg", server.uri())}}
    ]))
    .unwrap();
    let channels_extra = extended_timestamp(1_577_836_800);
    let users_extra = extended_timestamp(1_577_836_801);
    write_annotated_export(
        &input,
        &[
            AnnotatedEntry {
                name: "channels.json",
                content: CHANNELS_JSON,
                extra: channels_extra.clone(),
                comment: "keepme",
                streamed: true,
            },
            AnnotatedEntry {
                name: "users.json",
                content: &users,
                extra: users_extra.clone(),
                comment: "directory",
                streamed: true,
            },
        ],
        "slack export",
    );

    fetch_profile_pictures(ArchiveConfig::new(&input, &output), fetcher_for(&server))
        .await
        .unwrap();

    assert_eq!(
        entry_names(&output),
        vec!["channels.json", "profile_pictures/U123.jpg", "users.json"]
    );
    assert_eq!(archive_comment(&output), b"slack export");

    // Copied entry: headers, data and data descriptor are carried over as is
    assert_eq!(
        entry_annotations(&output, "channels.json"),
        (channels_extra.clone(), "keepme".to_string())
    );
    assert_eq!(local_extra(&output, "channels.json"), channels_extra);
    let copied_len = header_start(&input, "users.json") as usize;
    assert_eq!(
        header_start(&output, "profile_pictures/U123.jpg") as usize,
        copied_len
    );
    assert_eq!(
        std::fs::read(&output).unwrap()[..copied_len],
        std::fs::read(&input).unwrap()[..copied_len]
    );
    assert_eq!(read_entry(&output, "channels.json"), CHANNELS_JSON);

    // Rewritten entry: new contents under the same extra field and comment
    assert_eq!(
        entry_annotations(&output, "users.json"),
        (users_extra.clone(), "directory".to_string())
    );
    assert_eq!(local_extra(&output, "users.json"), users_extra);
    assert_eq!(
        read_users(&output)[0]["profile"]["image_path"],
        "profile_pictures/U123.jpg"
    );
}
