use std::{collections::HashSet, fs, time::Duration};

use reqwest::header::{AUTHORIZATION, HeaderMap};
use serde_json::json;
use sporcharts::{
    internal::{
        FetchOptions, InternalFetcher, InternalSink, Resource, credit_rows, fetch_resource,
        ids_for_market, process_credits, status_counts,
    },
    management::{
        HeaderManager, PERMANENT_STATUSES, StateManager, error_ids_to_skip, parse_headers,
        read_jsonl,
    },
    pool::{Completion, CompletionKind, Fetcher, Sink, Verdict},
    output::{FileFormat, Table, read_column, read_rows},
    types::{ContentType, CreditsContent, ResponseRecord},
};
use tempfile::tempdir;

mod common;
use common::{Reply, serve};

fn record(track_id: &str, status: u16, content: serde_json::Value) -> ResponseRecord {
    ResponseRecord::new(status, &content.to_string(), "https://example.test", track_id)
}

fn credits_body() -> serde_json::Value {
    json!({
        "trackUri": "spotify:track:t1",
        "roleCredits": [
            {
                "roleTitle": "Performers",
                "artists": [
                    {"uri": "spotify:artist:a1", "name": "Singer", "subroles": ["main artist"]},
                    {"uri": "", "name": "Choir", "subroles": ["vocals", "vocals"]}
                ]
            },
            {
                "roleTitle": "Writers",
                "artists": [
                    {
                        "uri": "spotify:artist:a2",
                        "name": "Writer",
                        "subroles": ["composer", "lyricist", "composer"],
                        "externalUrl": "https://example.test/writer",
                        "creatorUri": "spotify:creator:c2"
                    }
                ]
            },
            {
                "roleTitle": "Producers",
                "artists": [
                    {"uri": "spotify:artist:a3", "name": "Producer", "subroles": ["producer"]},
                    {"name": "Engineer", "subroles": ["producer", "mixing engineer"]}
                ]
            }
        ]
    })
}

#[test]
fn test_error_ids_to_skip() {
    let errors = [
        ("a", 404),
        ("b", 404),
        ("b", 403),
        ("b", 400),
        ("a", 500),
        ("c", 401),
    ];
    let statuses: HashSet<u16> = [404, 403].into_iter().collect();
    let skip = error_ids_to_skip(errors, &statuses);
    let expected: HashSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
    assert_eq!(skip, expected);
}

#[test]
fn test_error_ids_to_skip_empty_statuses() {
    let skip = error_ids_to_skip([("a", 404)], &HashSet::new());
    assert!(skip.is_empty());
}

#[test]
fn test_response_record_json_and_text() {
    let json_record = ResponseRecord::new(200, r#"{"ok": true}"#, "u", "t");
    assert_eq!(json_record.content_type, ContentType::Json);
    assert_eq!(json_record.content, json!({"ok": true}));
    assert_eq!(json_record.track_id, "t");
    assert!(json_record.timestamp.ends_with('Z'));

    let text_record = ResponseRecord::new(502, "<html>Bad Gateway</html>", "u", "t");
    assert_eq!(text_record.content_type, ContentType::Text);
    assert_eq!(text_record.content, json!("<html>Bad Gateway</html>"));
}

#[test]
fn test_response_record_from_error() {
    let record = ResponseRecord::from_error("timed out", "u", "t");
    assert_eq!(record.status_code, 0);
    assert_eq!(record.content_type, ContentType::Text);
    assert!(record.is_error());
}

#[test]
fn test_is_error() {
    assert!(!record("t", 200, json!({"lyrics": {}})).is_error());
    assert!(record("t", 200, json!({"error": {"status": 404}})).is_error());
    assert!(record("t", 404, json!({"lyrics": {}})).is_error());
    assert!(ResponseRecord::new(200, "internal error", "u", "t").is_error());
    assert!(!ResponseRecord::new(200, "fine", "u", "t").is_error());
    assert!(record("t", 200, json!(["ok", "error"])).is_error());
    assert!(!record("t", 200, json!(["ok"])).is_error());
}

#[test]
fn test_status_counts() {
    let records = vec![
        record("a", 200, json!({})),
        record("b", 404, json!({})),
        record("c", 200, json!({})),
    ];
    let counts = status_counts(&records);
    assert_eq!(counts.get(&200), Some(&2));
    assert_eq!(counts.get(&404), Some(&1));
}

#[test]
fn test_record_serializes_content_type_lowercase() {
    let line = serde_json::to_value(ResponseRecord::new(200, "{}", "u", "t")).unwrap();
    assert_eq!(line["content_type"], "json");
    assert_eq!(line["status_code"], 200);
}

#[test]
fn test_credit_rows() {
    let content: CreditsContent = serde_json::from_value(credits_body()).unwrap();
    let rows = credit_rows("t1", &content);
    assert_eq!(rows.len(), 5);

    let singer = &rows[0];
    assert_eq!(singer.role, "Performer");
    assert_eq!(singer.artist_id.as_deref(), Some("a1"));
    assert_eq!(singer.pos, 1);

    let choir = &rows[1];
    assert_eq!(choir.artist_id, None);
    assert_eq!(choir.pos, 2);
    assert_eq!(choir.subroles, vec!["vocals"]);

    let writer = &rows[2];
    assert_eq!(writer.role, "Writer");
    assert_eq!(writer.pos, 1);
    assert_eq!(writer.subroles, vec!["composer", "lyricist"]);
    assert_eq!(writer.external_url.as_deref(), Some("https://example.test/writer"));
    assert_eq!(writer.creator_uri.as_deref(), Some("spotify:creator:c2"));

    assert_eq!(rows[4].artist_id, None);
}

#[test]
fn test_process_credits_splits_roles() {
    let records = vec![
        record("t1", 200, credits_body()),
        record("t2", 404, json!({"error": "not found"})),
        ResponseRecord::new(200, "plain text body", "u", "t3"),
    ];
    let tables = process_credits(&records);

    assert_eq!(tables.writers.len(), 1);
    assert_eq!(tables.producers.len(), 2);
    assert_eq!(tables.performers.len(), 2);
    assert_eq!(tables.irregular_producers.len(), 1);
    assert_eq!(tables.irregular_producers[0].name, "Engineer");
    assert_eq!(tables.unreadable, 1);
}

#[test]
fn test_credit_tables_write() {
    let dir = tempdir().unwrap();
    let tables = process_credits(&[record("t1", 200, credits_body())]);
    tables.write(dir.path(), FileFormat::Csv).unwrap();

    let writers = fs::read_to_string(dir.path().join("writers.csv")).unwrap();
    let mut lines = writers.lines();
    assert_eq!(
        lines.next(),
        Some("track_id,artist_id,name,pos,subroles,external_url,creator_uri")
    );
    assert_eq!(
        lines.next(),
        Some(
            r#"t1,a2,Writer,1,"[""composer"",""lyricist""]",https://example.test/writer,spotify:creator:c2"#
        )
    );

    let producers = fs::read_to_string(dir.path().join("producers.csv")).unwrap();
    assert!(producers.starts_with("track_id,artist_id,name,pos\n"));
    assert!(producers.contains("t1,,Engineer,2"));

    assert!(dir.path().join("performers.csv").is_file());
}

#[test]
fn test_parse_headers() {
    let headers = parse_headers(
        r#"{
            ":authority": "spclient.wg.spotify.com",
            "Authorization": "Bearer abc",
            "client-token": "xyz",
            "accept-encoding": "gzip, deflate, br",
            "content-length": "0",
            "sec-ch-ua-mobile": "?0",
            "retries": 3
        }"#,
    )
    .unwrap();

    assert_eq!(headers.len(), 3);
    assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer abc");
    assert_eq!(headers.get("client-token").unwrap(), "xyz");
    assert!(headers.get("accept-encoding").is_none());
    assert!(headers.get("content-length").is_none());
}

#[test]
fn test_parse_headers_rejects_unusable_input() {
    assert!(parse_headers("[1, 2]").is_err());
    assert!(parse_headers("{}").is_err());
    assert!(parse_headers(r#"{":method": "GET"}"#).is_err());
    assert!(parse_headers("not json").is_err());
}

#[tokio::test]
async fn test_header_manager_refresh_picks_up_new_capture() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("headers.json");
    fs::write(&path, r#"{"authorization": "Bearer old"}"#).unwrap();

    let manager = HeaderManager::from_file(&path)
        .await
        .unwrap()
        .with_refresh_wait(20, Duration::from_millis(10));
    assert_eq!(manager.current().await.get(AUTHORIZATION).unwrap(), "Bearer old");

    let writer_path = path.clone();
    let writer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        fs::write(&writer_path, r#"{"authorization": "Bearer new"}"#).unwrap();
    });

    manager.refresh().await.unwrap();
    writer.await.unwrap();
    assert_eq!(manager.current().await.get(AUTHORIZATION).unwrap(), "Bearer new");
}

#[tokio::test]
async fn test_header_manager_refresh_gives_up() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("headers.json");
    fs::write(&path, r#"{"authorization": "Bearer old"}"#).unwrap();

    let manager = HeaderManager::from_file(&path)
        .await
        .unwrap()
        .with_refresh_wait(2, Duration::from_millis(5));
    assert!(manager.refresh().await.is_err());
}

#[tokio::test]
async fn test_fixed_headers_cannot_refresh() {
    let manager = HeaderManager::from_bearer("token").unwrap();
    assert_eq!(
        manager.current().await.get(AUTHORIZATION).unwrap(),
        "Bearer token"
    );
    assert!(manager.refresh().await.is_err());
}

#[test]
fn test_ids_for_market() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("markets.csv");
    fs::write(
        &path,
        "track_id,market\nt1,DE\nt1,US\nt2,US\nt3,de\nt4,FR\n",
    )
    .unwrap();

    let ids = ids_for_market(&path, "DE").unwrap();
    let expected: HashSet<String> = ["t1", "t3"].iter().map(|s| s.to_string()).collect();
    assert_eq!(ids, expected);
}

#[test]
fn test_ids_for_market_requires_columns() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("markets.csv");
    fs::write(&path, "id,country\nt1,DE\n").unwrap();
    assert!(ids_for_market(&path, "DE").is_err());
}

#[tokio::test]
async fn test_read_jsonl_skips_broken_lines() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("log.jsonl");
    assert!(read_jsonl::<ResponseRecord>(&path).await.unwrap().is_empty());

    let line = serde_json::to_string(&record("a", 200, json!({}))).unwrap();
    fs::write(&path, format!("{}\n\n{{\"status_code\": 2", line)).unwrap();
    let records: Vec<ResponseRecord> = read_jsonl(&path).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].track_id, "a");
}

#[tokio::test]
async fn test_state_manager_pending() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("credits.jsonl");
    let state = StateManager::for_output(&output);
    assert_eq!(state.error_log(), dir.path().join("credits_errors.jsonl"));

    let done = serde_json::to_string(&record("done", 200, json!({}))).unwrap();
    fs::write(&output, format!("{}\n", done)).unwrap();

    let errors = [
        record("gone", 404, json!({})),
        record("forbidden", 403, json!({})),
        record("flaky", 500, json!({})),
        record("unauthorized", 401, json!({})),
    ]
    .iter()
    .map(|r| serde_json::to_string(r).unwrap())
    .collect::<Vec<_>>()
    .join("\n");
    fs::write(state.error_log(), errors).unwrap();

    let ids = ["done", "gone", "forbidden", "flaky", "unauthorized", "new"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let pending = state.pending(ids).await.unwrap();
    assert_eq!(pending, vec!["flaky", "unauthorized", "new"]);
    assert_eq!(PERMANENT_STATUSES, [403, 404]);
}

#[test]
fn test_internal_fetcher_classify() {
    let fetcher = InternalFetcher::new(
        Resource::Credits,
        HeaderManager::from_map(HeaderMap::new()),
        "http://127.0.0.1:9",
    );
    let id = "t".to_string();
    let classify = |status: u16, content: serde_json::Value| {
        fetcher.classify(&id, &Ok(record("t", status, content)))
    };

    assert_eq!(classify(200, json!({"roleCredits": []})), Verdict::Success);
    assert_eq!(classify(200, json!({"error": "x"})), Verdict::Failed);
    assert_eq!(classify(204, json!({})), Verdict::Failed);
    assert_eq!(classify(401, json!({})), Verdict::Refresh);
    assert_eq!(classify(404, json!({})), Verdict::Permanent);
    assert_eq!(classify(503, json!({})), Verdict::Retry(None));
    assert_eq!(
        fetcher.classify(&id, &Err("connection reset".into())),
        Verdict::Retry(None)
    );
}

#[test]
fn test_internal_sink_routes_records() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("lyrics.jsonl");
    let errors = dir.path().join("lyrics_errors.jsonl");
    let mut sink = InternalSink::open(Resource::Lyrics, "https://api.test", &output, &errors).unwrap();

    sink.accept(Completion {
        item: "ok".to_string(),
        response: Some(record("ok", 200, json!({"lyrics": {}}))),
        error: None,
        kind: CompletionKind::Succeeded,
        attempts: 1,
    })
    .unwrap();
    sink.accept(Completion {
        item: "missing".to_string(),
        response: Some(record("missing", 404, json!({}))),
        error: None,
        kind: CompletionKind::Permanent,
        attempts: 1,
    })
    .unwrap();
    sink.accept(Completion {
        item: "offline".to_string(),
        response: None,
        error: Some("connection refused".to_string()),
        kind: CompletionKind::Exhausted,
        attempts: 5,
    })
    .unwrap();

    assert_eq!(sink.written(), 1);
    assert_eq!(sink.failed(), 2);

    let error_lines = fs::read_to_string(&errors).unwrap();
    let logged: Vec<ResponseRecord> = error_lines
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(logged[1].status_code, 0);
    assert_eq!(logged[1].track_id, "offline");
    assert_eq!(logged[1].content, json!("connection refused"));
    assert_eq!(logged[1].url, "https://api.test/color-lyrics/v2/track/offline");
}

#[tokio::test]
async fn test_fetch_resource_with_nothing_pending() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("tracks.csv");
    fs::write(&input, "track_id,name\ndone,Song\ndone,Song\n").unwrap();
    let done = serde_json::to_string(&record("done", 200, json!({}))).unwrap();
    fs::write(dir.path().join("credits.jsonl"), format!("{}\n", done)).unwrap();

    let options = FetchOptions {
        resource: Resource::Credits,
        // Nothing is listening here.
        api_url: "http://127.0.0.1:9".to_string(),
        input,
        output: None,
        markets: None,
        parallel: Some(2),
        max_attempts: 3,
    };
    assert_eq!(options.output_path(), dir.path().join("credits.jsonl"));

    let summary = fetch_resource(options, HeaderManager::from_map(HeaderMap::new()))
        .await
        .unwrap();
    assert_eq!(summary.input_ids, 1);
    assert_eq!(summary.pending, 0);
    assert_eq!(summary.report.total(), 0);
    assert_eq!(summary.error_log, dir.path().join("credits_errors.jsonl"));
}

#[test]
fn test_resource_endpoints() {
    assert_eq!(
        Resource::Credits.url("https://api.test", "abc"),
        "https://api.test/track-credits-view/v0/experimental/abc/credits"
    );
    assert_eq!(
        Resource::Lyrics.url("https://api.test", "abc"),
        "https://api.test/color-lyrics/v2/track/abc"
    );
    assert!(Resource::Lyrics.requires_login());
    assert!(!Resource::Credits.requires_login());
    assert_eq!(Resource::Credits.default_parallelism(), 100);
    assert_eq!(Resource::Lyrics.default_parallelism(), 50);
}

#[test]
fn test_credit_tables_write_parquet() {
    let dir = tempdir().unwrap();
    let tables = process_credits(&[record("t1", 200, credits_body())]);
    tables.write(dir.path(), FileFormat::Parquet).unwrap();
    assert!(!dir.path().join("writers.csv").exists());

    let writers = read_rows(
        &dir.path().join("writers.parquet"),
        &["track_id", "pos", "subroles", "creator_uri"],
    )
    .unwrap();
    assert_eq!(
        writers,
        vec![vec!["t1", "1", r#"["composer","lyricist"]"#, "spotify:creator:c2"]]
    );

    let producers = read_rows(&dir.path().join("producers.parquet"), &["artist_id", "name"]).unwrap();
    assert_eq!(producers, vec![vec!["a3", "Producer"], vec!["", "Engineer"]]);
}

#[test]
fn test_ids_for_market_from_parquet() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("markets.parquet");
    let mut table = Table::new(["track_id", "market"]);
    for (id, market) in [("t1", "DE"), ("t2", "US"), ("t3", "de")] {
        table.push_row(vec![id.to_string(), market.to_string()]);
    }
    table.write(&path).unwrap();

    let ids = ids_for_market(&path, "DE").unwrap();
    let expected: HashSet<String> = ["t1", "t3"].iter().map(|s| s.to_string()).collect();
    assert_eq!(ids, expected);
    assert_eq!(read_column(&path, "track_id").unwrap(), vec!["t1", "t2", "t3"]);
}

#[tokio::test]
async fn test_fetch_resource_against_server() {
    let server = serve(vec![
        Reply::json(200, json!({"roleCredits": []}).to_string()),
        Reply::json(200, json!({"error": {"status": 500}}).to_string()),
        Reply::json(404, "{}"),
    ])
    .await;

    let dir = tempdir().unwrap();
    let input = dir.path().join("tracks.csv");
    fs::write(&input, "track_id\ngood\nbroken\nmissing\n").unwrap();

    let options = FetchOptions {
        resource: Resource::Credits,
        api_url: server.url.clone(),
        input,
        output: None,
        markets: None,
        parallel: Some(1),
        // An error body is not retried, so every ID needs one request.
        max_attempts: 3,
    };
    let summary = fetch_resource(options, HeaderManager::from_map(HeaderMap::new()))
        .await
        .unwrap();
    assert_eq!(summary.pending, 3);
    assert_eq!(summary.written, 1);
    assert_eq!(summary.failed, 2);
    assert_eq!(
        server.requests.lines(),
        vec![
            "GET /track-credits-view/v0/experimental/good/credits HTTP/1.1",
            "GET /track-credits-view/v0/experimental/broken/credits HTTP/1.1",
            "GET /track-credits-view/v0/experimental/missing/credits HTTP/1.1",
        ]
    );

    let written: Vec<ResponseRecord> = read_jsonl(&summary.output).await.unwrap();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].track_id, "good");

    let errors: Vec<ResponseRecord> = read_jsonl(&summary.error_log).await.unwrap();
    let failed: Vec<(&str, u16)> = errors
        .iter()
        .map(|r| (r.track_id.as_str(), r.status_code))
        .collect();
    assert_eq!(failed, vec![("broken", 200), ("missing", 404)]);
    assert_eq!(errors[0].content, json!({"error": {"status": 500}}));
}
