use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use assert_json_diff::assert_json_include;
use async_trait::async_trait;
use geo_common::hub::{HubTemplate, DEFAULT_LIVE_MAP_TEMPLATE, DEFAULT_LOG_TEMPLATE};
use geo_common::ids::ClientResolver;
use geo_common::point::Point;
use geo_common::retry::RetryPolicy;
use httpmock::prelude::*;
use serde_json::{json, Value};

use geo_relay::dedup::{Deduplicator, RateLimit};
use geo_relay::error::RelayError;
use geo_relay::forwarder::Forwarder;
use geo_relay::pipeline::{Outcome, Pipeline};
use geo_relay::sink::Sink;
use geo_relay::source::gpsd::parse_report;
use geo_relay::source::status::{as_record, status_point, StatusSource};
use geo_relay::source::{Handshake, PointSource};

/// Hands out a fixed script of acquisitions, then reports no data.
struct ScriptedSource {
    script: VecDeque<Option<Point>>,
    vehicle: Option<String>,
    fallback: &'static str,
}

#[async_trait]
impl PointSource for ScriptedSource {
    fn fallback_client(&self) -> &'static str {
        self.fallback
    }

    async fn start(&mut self) -> Result<Handshake, RelayError> {
        Ok(Handshake {
            vehicle: self.vehicle.clone(),
        })
    }

    async fn acquire(&mut self, _timeout: Duration) -> Option<Point> {
        self.script.pop_front().flatten()
    }
}

fn status(latitude: f64, server_time: i64) -> Point {
    let record = as_record(json!({
        "latitude": latitude,
        "longitude": 13.4,
        "speed": 30.2,
        "serverTime": server_time,
        "tzn": "ICE 1234",
        "wagonClass": "SECOND",
    }))
    .unwrap();
    status_point(record).unwrap()
}

fn tpv(time: &str) -> Point {
    parse_report(&format!(
        r#"{{"class":"TPV","mode":3,"time":"{time}","lat":52.1,"lon":13.4,"speed":8.3}}"#
    ))
    .unwrap()
}

async fn pipeline(
    server: &MockServer,
    source: Box<dyn PointSource>,
    deduplicator: Deduplicator,
    rate_limit: RateLimit,
    output: &Path,
) -> Pipeline {
    let host = server.address().to_string();
    let hub = HubTemplate::new(DEFAULT_LOG_TEMPLATE, "http", &host, "s3cret").unwrap();
    let live_map = HubTemplate::new(DEFAULT_LIVE_MAP_TEMPLATE, "http", &host, "s3cret").unwrap();
    let identity = ClientResolver::new("", source.fallback_client()).unwrap();
    let forwarder = Forwarder::new(hub, identity, Duration::from_secs(5)).unwrap();
    let sink = Sink::new(Some(output));

    Pipeline::new(
        source,
        deduplicator,
        rate_limit,
        forwarder,
        sink,
        live_map,
        Duration::from_millis(100),
    )
}

fn sink_lines(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).expect("every line is a JSON object"))
        .collect()
}

#[tokio::test]
async fn it_emits_once_per_new_position_when_polling() {
    let server = MockServer::start_async().await;
    let hub = server
        .mock_async(|when, then| {
            when.method(POST).path("/geo/ICE1234/log");
            then.status(200);
        })
        .await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("traindata.jsonlines");

    // The same position for three polls, then a new one.
    let source = ScriptedSource {
        script: VecDeque::from([
            Some(status(52.1, 1_700_000_000_000)),
            Some(status(52.1, 1_700_000_005_000)),
            Some(status(52.1, 1_700_000_010_000)),
            Some(status(52.2, 1_700_000_015_000)),
        ]),
        vehicle: Some("ICE 1234".to_owned()),
        fallback: "TRAIN",
    };
    let mut pipeline = pipeline(
        &server,
        Box::new(source),
        Deduplicator::last_position(),
        RateLimit::pace(Duration::ZERO),
        &output,
    )
    .await;

    let session = pipeline.start().await.unwrap();
    assert_eq!(session.client, "ICE1234");
    assert!(session
        .live_map_url
        .ends_with("/geo/assets/livemap.html?client=ICE1234&secret=s3cret"));

    let mut outcomes = Vec::new();
    for _ in 0..4 {
        outcomes.push(pipeline.step().await.unwrap());
    }

    assert_eq!(
        outcomes,
        vec![
            Outcome::Emitted,
            Outcome::Duplicate,
            Outcome::Duplicate,
            Outcome::Emitted
        ]
    );
    assert_eq!(hub.hits_async().await, 2);

    let lines = sink_lines(&output);
    assert_eq!(lines.len(), 2);
    assert_json_include!(
        actual: lines[0].clone(),
        expected: json!({"latitude": 52.1, "tzn": "ICE 1234", "wagonClass": "SECOND"})
    );
    assert_json_include!(
        actual: lines[1].clone(),
        expected: json!({"latitude": 52.2, "serverTime": 1_700_000_015_000_i64})
    );
}

#[tokio::test]
async fn it_keeps_relaying_when_the_hub_fails() {
    let server = MockServer::start_async().await;
    let hub = server
        .mock_async(|when, then| {
            when.method(POST).path("/geo/ICE1234/log");
            then.status(500);
        })
        .await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("traindata.jsonlines");

    let source = ScriptedSource {
        script: VecDeque::from([
            Some(status(52.1, 1_700_000_000_000)),
            Some(status(52.2, 1_700_000_005_000)),
        ]),
        vehicle: None,
        fallback: "TRAIN",
    };
    let mut pipeline = pipeline(
        &server,
        Box::new(source),
        Deduplicator::last_position(),
        RateLimit::pace(Duration::ZERO),
        &output,
    )
    .await;
    pipeline.start().await.unwrap();

    assert_eq!(pipeline.step().await.unwrap(), Outcome::Emitted);
    assert_eq!(pipeline.step().await.unwrap(), Outcome::Emitted);

    // Both deliveries were attempted, both points were persisted anyway.
    assert_eq!(hub.hits_async().await, 2);
    assert_eq!(sink_lines(&output).len(), 2);
}

#[tokio::test]
async fn it_drops_repeated_gpsd_fixes_and_empty_reads() {
    let server = MockServer::start_async().await;
    let hub = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/geo/gpsd/log")
                .query_param("time", "2023-11-14T22:13:20Z")
                .json_body(json!({"class": "TPV", "mode": 3}));
            then.status(200);
        })
        .await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("data.jsonlines");

    let source = ScriptedSource {
        script: VecDeque::from([
            None,
            Some(tpv("2023-11-14T22:13:20.000Z")),
            Some(tpv("2023-11-14T22:13:20.000Z")),
            None,
        ]),
        vehicle: None,
        fallback: "gpsd",
    };
    let mut pipeline = pipeline(
        &server,
        Box::new(source),
        Deduplicator::seen_timestamps(),
        RateLimit::gate(Duration::ZERO),
        &output,
    )
    .await;

    let session = pipeline.start().await.unwrap();
    assert_eq!(session.client, "gpsd");

    let mut outcomes = Vec::new();
    for _ in 0..4 {
        outcomes.push(pipeline.step().await.unwrap());
    }

    assert_eq!(
        outcomes,
        vec![
            Outcome::NoData,
            Outcome::Emitted,
            Outcome::Duplicate,
            Outcome::NoData
        ]
    );
    hub.assert_async().await;

    let lines = sink_lines(&output);
    assert_eq!(lines.len(), 1);
    assert_json_include!(
        actual: lines[0].clone(),
        expected: json!({"class": "TPV", "lat": 52.1, "lon": 13.4, "time": "2023-11-14T22:13:20.000Z"})
    );
}

#[tokio::test]
async fn it_gates_gpsd_fixes_inside_the_interval() {
    let server = MockServer::start_async().await;
    let hub = server
        .mock_async(|when, then| {
            when.method(POST).path("/geo/gpsd/log");
            then.status(200);
        })
        .await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("data.jsonlines");

    let source = ScriptedSource {
        script: VecDeque::from([
            Some(tpv("2023-11-14T22:13:20.000Z")),
            Some(tpv("2023-11-14T22:13:21.000Z")),
            // Already seen while the gate was closed.
            Some(tpv("2023-11-14T22:13:21.000Z")),
        ]),
        vehicle: None,
        fallback: "gpsd",
    };
    let mut pipeline = pipeline(
        &server,
        Box::new(source),
        Deduplicator::seen_timestamps(),
        RateLimit::gate(Duration::from_secs(3600)),
        &output,
    )
    .await;
    pipeline.start().await.unwrap();

    assert_eq!(pipeline.step().await.unwrap(), Outcome::RateLimited);
    assert_eq!(pipeline.step().await.unwrap(), Outcome::RateLimited);
    assert_eq!(pipeline.step().await.unwrap(), Outcome::Duplicate);

    assert_eq!(hub.hits_async().await, 0);
    assert!(sink_lines(&output).is_empty());
}

#[tokio::test]
async fn it_polls_a_status_endpoint_end_to_end() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api1/rs/status");
            then.status(200).json_body(json!({
                "latitude": 52.1,
                "longitude": 13.4,
                "speed": 30.2,
                "serverTime": 1_700_000_000_000_i64,
                "tzn": "ICE 1234",
            }));
        })
        .await;
    let hub = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/geo/ICE1234/log")
                .query_param("secret", "s3cret")
                .query_param("lat", "52.1")
                .query_param("longitude", "13.4")
                .query_param("s", "30.2")
                .query_param("time", "2023-11-14T22:13:20Z")
                .json_body(json!({"tzn": "ICE 1234"}));
            then.status(200);
        })
        .await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("traindata.jsonlines");

    let source = StatusSource::new(
        &server.url("/api1/rs/status"),
        Duration::from_secs(5),
        RetryPolicy::fixed(Duration::from_millis(10)),
    )
    .unwrap();
    let mut pipeline = pipeline(
        &server,
        Box::new(source),
        Deduplicator::last_position(),
        RateLimit::pace(Duration::ZERO),
        &output,
    )
    .await;

    assert_eq!(pipeline.start().await.unwrap().client, "ICE1234");
    assert_eq!(pipeline.step().await.unwrap(), Outcome::Emitted);
    // The train has not moved.
    assert_eq!(pipeline.step().await.unwrap(), Outcome::Duplicate);

    hub.assert_async().await;
    assert_eq!(sink_lines(&output).len(), 1);
}

#[tokio::test]
async fn it_terminates_on_an_empty_first_status() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api1/rs/status");
            then.status(200).json_body(json!(null));
        })
        .await;
    let hub = server
        .mock_async(|when, then| {
            when.method(POST);
            then.status(200);
        })
        .await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("traindata.jsonlines");

    let source = StatusSource::new(
        &server.url("/api1/rs/status"),
        Duration::from_secs(5),
        RetryPolicy::fixed(Duration::from_millis(10)),
    )
    .unwrap();
    let pipeline = pipeline(
        &server,
        Box::new(source),
        Deduplicator::last_position(),
        RateLimit::pace(Duration::ZERO),
        &output,
    )
    .await;

    assert!(matches!(pipeline.run().await, Err(RelayError::EmptySource)));
    assert_eq!(hub.hits_async().await, 0);
}
