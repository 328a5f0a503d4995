use std::fs;

use chrono::Utc;
use serde_json::{Value, json};
use sporcharts::{
    management::{ClientCredentials, TokenManager},
    output::read_column,
    spotify::{
        Entity, WebApiClient, album_record, fetch_metadata, process_albums, process_artists,
        process_tracks, track_record,
    },
    types::{Album, Artist, Token, Track},
};
use tempfile::tempdir;

mod common;
use common::{Reply, serve};

fn track_json(id: &str) -> Value {
    json!({
        "id": id,
        "name": format!("Song {}", id),
        "album": {"id": "alb1", "name": "Nested album fields are dropped"},
        "artists": [
            {"id": "art1", "name": "First"},
            {"id": "art2", "name": "Second"}
        ],
        "available_markets": ["DE", "US"],
        "disc_number": 1,
        "track_number": 3,
        "duration_ms": 201000,
        "explicit": false,
        "preview_url": null,
        "popularity": 55,
        "external_ids": {"isrc": "USRC17607839"},
        "external_urls": {"spotify": "https://open.spotify.com/track/x"}
    })
}

fn track(id: &str) -> Track {
    serde_json::from_value(track_json(id)).unwrap()
}

fn album() -> Album {
    serde_json::from_value(json!({
        "id": "alb1",
        "name": "Album",
        "album_type": "album",
        "release_date": "2019-05-01",
        "release_date_precision": "day",
        "total_tracks": 12,
        "label": "Label",
        "artists": [{"id": "art1", "name": "First"}],
        "available_markets": ["DE"],
        "images": [
            {"url": "https://i.scdn.co/image/large", "width": 640, "height": 640},
            {"url": "https://i.scdn.co/image/unknown", "width": null, "height": null}
        ],
        "copyrights": [
            {"text": "2019 Label", "type": "C"},
            {"text": "2019 Label", "type": "P"}
        ],
        "external_ids": {"upc": "00602577", "amgid": "123"},
        "external_urls": {"spotify": "https://open.spotify.com/album/alb1"},
        "tracks": {"items": []}
    }))
    .unwrap()
}

fn artist() -> Artist {
    serde_json::from_value(json!({
        "id": "art1",
        "name": "First",
        "followers": {"href": null, "total": 1234},
        "genres": ["pop", "dance pop"],
        "images": [{"url": "https://i.scdn.co/image/a", "width": 160, "height": 160}],
        "popularity": 70,
        "external_urls": {"spotify": "https://open.spotify.com/artist/art1"}
    }))
    .unwrap()
}

fn headers(table: Option<&sporcharts::output::Table>) -> Vec<String> {
    table.unwrap().headers().to_vec()
}

#[test]
fn test_process_tracks() {
    let tables = process_tracks(&[track("t1"), track("t2")]);
    assert_eq!(tables.names().collect::<Vec<_>>(), vec!["artists", "markets", "metadata"]);

    let metadata = tables.get("metadata").unwrap();
    assert_eq!(metadata.len(), 2);
    assert_eq!(
        metadata.headers(),
        [
            "track_id",
            "name",
            "album_id",
            "disc_number",
            "track_number",
            "duration_ms",
            "explicit",
            "preview_url",
            "isrc_id",
            "ean_id",
            "upc_id",
        ]
    );
    assert_eq!(metadata.rows()[0][2], "alb1");
    assert_eq!(metadata.rows()[0][7], "");
    assert_eq!(metadata.rows()[0][8], "USRC17607839");

    let artists = tables.get("artists").unwrap();
    assert_eq!(headers(Some(artists)), vec!["track_id", "artist_id", "pos"]);
    assert_eq!(artists.rows()[0], vec!["t1", "art1", "1"]);
    assert_eq!(artists.rows()[1], vec!["t1", "art2", "2"]);
    assert_eq!(artists.len(), 4);

    let markets = tables.get("markets").unwrap();
    assert_eq!(markets.len(), 4);
    assert_eq!(markets.rows()[1], vec!["t1", "US"]);
}

#[test]
fn test_track_record_skips_spotify_url() {
    let record = track_record(&track("t1"));
    assert!(record.columns().all(|c| c != "spotify_url"));
    assert_eq!(record.get("explicit"), Some("false"));
}

#[test]
fn test_process_albums() {
    let tables = process_albums(&[album()]);

    let metadata = tables.get("metadata").unwrap();
    assert_eq!(metadata.rows()[0][0], "alb1");
    let columns = headers(Some(metadata));
    assert!(columns.contains(&"upc_id".to_string()));
    assert!(columns.contains(&"amgid_id".to_string()));
    assert!(!columns.iter().any(|c| c == "tracks" || c == "images"));

    let images = tables.get("images").unwrap();
    assert_eq!(headers(Some(images)), vec!["album_id", "url", "width", "height"]);
    assert_eq!(images.rows()[1], vec!["alb1", "https://i.scdn.co/image/unknown", "", ""]);

    let copyrights = tables.get("copyrights").unwrap();
    assert_eq!(headers(Some(copyrights)), vec!["album_id", "text", "type"]);
    assert_eq!(copyrights.rows()[1], vec!["alb1", "2019 Label", "P"]);

    assert_eq!(tables.get("artists").unwrap().rows()[0], vec!["alb1", "art1", "1"]);
    assert_eq!(tables.get("markets").unwrap().rows()[0], vec!["alb1", "DE"]);
}

#[test]
fn test_album_record_label() {
    let record = album_record(&album());
    assert_eq!(record.get("label"), Some("Label"));
    assert_eq!(record.get("isrc_id"), Some(""));
}

#[test]
fn test_process_artists() {
    let tables = process_artists(&[artist()]);

    let metadata = tables.get("metadata").unwrap();
    assert_eq!(headers(Some(metadata)), vec!["artist_id", "name", "followers"]);
    assert_eq!(metadata.rows()[0], vec!["art1", "First", "1234"]);

    let genres = tables.get("genres").unwrap();
    assert_eq!(genres.rows(), [vec!["art1", "pop"], vec!["art1", "dance pop"]]);

    assert_eq!(tables.get("images").unwrap().rows()[0][2], "160");
}

#[test]
fn test_entity_batches() {
    assert_eq!(Entity::Tracks.batch_size(), 50);
    assert_eq!(Entity::Albums.batch_size(), 20);
    assert_eq!(Entity::Artists.batch_size(), 50);
    assert_eq!(Entity::Albums.id_column(), "album_id");
}

fn client(base_url: String) -> WebApiClient {
    let token = Token {
        access_token: "test-token".to_string(),
        token_type: "Bearer".to_string(),
        expires_in: 3600,
        obtained_at: Utc::now().timestamp() as u64,
    };
    WebApiClient::with_tokens(TokenManager::new(Some(token)), base_url).max_attempts(2)
}

#[tokio::test]
async fn test_several_tracks_reports_null_entries() {
    let body = json!({"tracks": [track_json("t1"), null]}).to_string();
    let mut client = client(serve(vec![Reply::json(200, body)]).await.url);

    let ids = vec!["t1".to_string(), "missing".to_string()];
    let batch = client.several_tracks(&ids).await.unwrap();
    assert_eq!(batch.items.len(), 1);
    assert_eq!(batch.items[0].id, "t1");
    assert_eq!(batch.invalid_ids, vec!["missing"]);
    assert!(batch.raw["tracks"][1].is_null());
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let mut client = client(serve(vec![Reply::json(400, "{}")]).await.url);
    let err = client.several_artists(&["x".to_string()]).await.unwrap_err();
    assert!(err.to_string().contains("400"));
}

#[tokio::test]
async fn test_malformed_batch_response() {
    let mut client = client(serve(vec![Reply::json(200, json!({"albums": "nope"}).to_string())]).await.url);
    assert!(client.several_albums(&["a".to_string()]).await.is_err());
}

#[tokio::test]
async fn test_fetch_metadata_resumes_and_appends() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("metadata.csv"), "track_id,name\nt1,Song t1\n").unwrap();

    let body = json!({"tracks": [track_json("t2"), null]}).to_string();
    let mut client = client(serve(vec![Reply::json(200, body)]).await.url);

    let ids = vec![
        "t1".to_string(),
        "t2".to_string(),
        "t2".to_string(),
        "gone".to_string(),
    ];
    let summary = fetch_metadata(&mut client, Entity::Tracks, ids, dir.path())
        .await
        .unwrap();

    assert_eq!(summary.requested, 3);
    assert_eq!(summary.already_present, 1);
    assert_eq!(summary.fetched, 1);
    assert_eq!(summary.invalid_ids, vec!["gone"]);

    let ids = read_column(&dir.path().join("metadata.csv"), "track_id").unwrap();
    assert_eq!(ids, vec!["t1", "t2"]);
    let artists = read_column(&dir.path().join("artists.csv"), "artist_id").unwrap();
    assert_eq!(artists, vec!["art1", "art2"]);

    let raw = fs::read_to_string(dir.path().join("responses.jsonl")).unwrap();
    let line: Value = serde_json::from_str(raw.lines().next().unwrap()).unwrap();
    assert_eq!(line["source"], "tracks");
    assert_eq!(line["response"]["tracks"][0]["id"], "t2");
}

#[tokio::test]
async fn test_fetch_metadata_without_pending_ids_makes_no_request() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("metadata.csv"), "artist_id,name\na1,A\n").unwrap();

    // Nothing is listening here.
    let mut client = client("http://127.0.0.1:9".to_string());
    let summary = fetch_metadata(&mut client, Entity::Artists, vec!["a1".to_string()], dir.path())
        .await
        .unwrap();
    assert_eq!(summary.already_present, 1);
    assert_eq!(summary.fetched, 0);
    assert!(!dir.path().join("responses.jsonl").exists());
}

#[tokio::test]
async fn test_get_json_requests_new_token_after_401() {
    let token = json!({"access_token": "fresh-token", "token_type": "Bearer", "expires_in": 3600});
    let server = serve(vec![
        Reply::json(401, "{}"),
        Reply::json(200, token.to_string()),
        Reply::json(200, json!({"ok": true}).to_string()),
    ])
    .await;

    let tokens = TokenManager::new(Some(Token {
        access_token: "revoked-token".to_string(),
        token_type: "Bearer".to_string(),
        expires_in: 3600,
        obtained_at: Utc::now().timestamp() as u64,
    }))
    .with_credentials(ClientCredentials {
        client_id: "id".to_string(),
        client_secret: "secret".to_string(),
        token_url: format!("{}/api/token", server.url),
    });
    let mut client = WebApiClient::with_tokens(tokens, server.url.clone()).max_attempts(2);

    let body = client.get_json(&format!("{}/tracks?ids=t1", server.url)).await.unwrap();
    assert_eq!(body["ok"], true);

    assert_eq!(
        server.requests.lines(),
        vec![
            "GET /tracks?ids=t1 HTTP/1.1",
            "POST /api/token HTTP/1.1",
            "GET /tracks?ids=t1 HTTP/1.1",
        ]
    );
    let heads = server.requests.heads();
    assert!(heads[0].to_lowercase().contains("bearer revoked-token"));
    assert!(heads[2].to_lowercase().contains("bearer fresh-token"));
}

#[tokio::test]
async fn test_get_json_waits_for_retry_after() {
    let server = serve(vec![
        Reply::json(429, "{}").header("retry-after", "0"),
        Reply::json(200, json!({"tracks": []}).to_string()),
    ])
    .await;
    let mut client = client(server.url.clone());

    let body = client.get_json(&format!("{}/tracks?ids=t1", server.url)).await.unwrap();
    assert_eq!(body["tracks"], json!([]));
    assert_eq!(server.requests.lines().len(), 2);
}

#[tokio::test]
async fn test_fetch_metadata_rerun_completes_a_failed_batch() {
    let dir = tempdir().unwrap();
    // Appending artists.csv fails while it is a directory.
    fs::create_dir(dir.path().join("artists.csv")).unwrap();

    let body = json!({"tracks": [track_json("t1")]}).to_string();
    let server = serve(vec![Reply::json(200, body.clone()), Reply::json(200, body)]).await;
    let mut client = client(server.url.clone());

    let ids = vec!["t1".to_string()];
    assert!(fetch_metadata(&mut client, Entity::Tracks, ids.clone(), dir.path()).await.is_err());
    assert!(!dir.path().join("metadata.csv").exists());

    fs::remove_dir(dir.path().join("artists.csv")).unwrap();
    let summary = fetch_metadata(&mut client, Entity::Tracks, ids, dir.path()).await.unwrap();
    assert_eq!(summary.already_present, 0);
    assert_eq!(summary.fetched, 1);

    let artists = read_column(&dir.path().join("artists.csv"), "artist_id").unwrap();
    assert_eq!(artists, vec!["art1", "art2"]);
    let ids = read_column(&dir.path().join("metadata.csv"), "track_id").unwrap();
    assert_eq!(ids, vec!["t1"]);
    assert_eq!(server.requests.lines().len(), 2);
}

#[tokio::test]
async fn test_fetch_metadata_skips_known_invalid_ids() {
    let dir = tempdir().unwrap();
    let body = json!({"artists": [null]}).to_string();
    let mut client = client(serve(vec![Reply::json(200, body)]).await.url);

    let ids = vec!["gone".to_string()];
    let summary = fetch_metadata(&mut client, Entity::Artists, ids.clone(), dir.path())
        .await
        .unwrap();
    assert_eq!(summary.invalid_ids, vec!["gone"]);
    assert_eq!(
        fs::read_to_string(dir.path().join("invalid_ids.csv")).unwrap(),
        "artist_id\ngone\n"
    );

    // The server is gone; a second request would fail.
    let summary = fetch_metadata(&mut client, Entity::Artists, ids, dir.path())
        .await
        .unwrap();
    assert_eq!(summary.known_invalid, 1);
    assert_eq!(summary.fetched, 0);
    assert!(summary.invalid_ids.is_empty());
}
