//! Integration tests for butterfly-scenario
//!
//! These tests exercise the full scenario lifecycle against stub OSRM
//! binaries (shell scripts that mimic the toolchain's observable behavior)
//! and the comparison engine against mocked HTTP endpoints, so no real OSRM
//! installation is needed.

#![cfg(unix)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use butterfly_scenario::{
    Algorithm, BehaviorProfile, ComparisonEngine, Environment, MapDataset, ODPair, ParallelGroup,
    PointSet, QueryClient, Scenario, ServeOptions, Toolchain,
};

/// Write an executable shell script faking one OSRM binary
fn stub(dir: &Path, name: &str, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}

/// Toolchain of stubs: extract produces the dataset artifact, routed prints
/// the readiness marker and lingers
fn stub_toolchain(dir: &Path) -> Toolchain {
    Toolchain {
        extract: stub(
            dir,
            "extract",
            "base=\"${1%%.osm*}\"\n: > \"${base}.osrm\"",
        ),
        partition: stub(dir, "partition", "exit 0"),
        customize: stub(dir, "customize", "exit 0"),
        contract: stub(dir, "contract", "exit 0"),
        routed: stub(
            dir,
            "routed",
            "echo '[info] running and waiting for requests'\nexec sleep 60",
        ),
    }
}

fn fixture(dir: &Path, map: &str, profile: &str) -> (MapDataset, BehaviorProfile) {
    let map_path = dir.join(format!("{map}.osm.pbf"));
    fs::write(&map_path, b"pbf").unwrap();
    let profile_path = dir.join(format!("{profile}.lua"));
    fs::write(&profile_path, b"-- profile").unwrap();
    (
        MapDataset::new(map_path).unwrap(),
        BehaviorProfile::new(profile_path).unwrap(),
    )
}

#[tokio::test]
async fn test_scenario_lifecycle_build_serve_stop() {
    let dir = tempfile::tempdir().unwrap();
    let env = Environment::new(dir.path().join("work")).with_toolchain(stub_toolchain(dir.path()));
    let (map, profile) = fixture(dir.path(), "region", "walk_normal");

    let mut scenario = Scenario::new(&env, map, profile).with_serve_options(ServeOptions {
        startup_timeout: Duration::from_secs(10),
        ..Default::default()
    });
    assert_eq!(scenario.name(), "region_walk_normal");
    assert_eq!(scenario.algorithm(), Algorithm::Contraction);

    // Compile produces the servable artifact in the working directory.
    let dataset = scenario.compile().await.unwrap();
    assert!(dataset.is_file());
    assert_eq!(dataset.extension().unwrap(), "osrm");

    // Serve reaches readiness and hands out a working client handle.
    let client = scenario.serve().await.unwrap();
    assert!(client.base_url().starts_with("http://127.0.0.1:"));

    // Serving again reuses the running server instead of starting another.
    let again = scenario.serve().await.unwrap();
    assert_eq!(again.base_url(), client.base_url());

    scenario.stop().await;
    assert!(scenario.client().is_none());
}

#[tokio::test]
async fn test_parallel_group_serves_distinct_ports() {
    let dir = tempfile::tempdir().unwrap();
    let env = Environment::new(dir.path().join("work")).with_toolchain(stub_toolchain(dir.path()));

    let (map_a, profile_a) = fixture(dir.path(), "region", "walk_normal");
    let (map_b, profile_b) = fixture(dir.path(), "region2", "walk_flood");
    let mut normal = Scenario::new(&env, map_a, profile_a);
    let mut flood = Scenario::new(&env, map_b, profile_b);

    let mut group = ParallelGroup::new(vec![&mut normal, &mut flood]).unwrap();
    let clients = group.start().await.unwrap();

    assert_eq!(clients.len(), 2);
    let urls: Vec<&str> = clients.values().map(QueryClient::base_url).collect();
    assert_ne!(urls[0], urls[1], "each member gets its own port");

    group.stop().await;
}

/// Mount a table endpoint answering with a fixed duration matrix
async fn mount_table(server: &MockServer, durations: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/table/v1/.*"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "Ok",
            "durations": durations,
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_comparison_flow_over_http() {
    let normal_server = MockServer::start().await;
    let flood_server = MockServer::start().await;

    // Flood slows down exactly one pair: (origin_2, dest_1).
    mount_table(
        &normal_server,
        json!([[100.0, 200.0], [300.0, 400.0], [500.0, 600.0]]),
    )
    .await;
    mount_table(
        &flood_server,
        json!([[100.0, 200.0], [950.0, 400.0], [500.0, 600.0]]),
    )
    .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/route/v1/.*"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "Ok",
            "routes": [{
                "duration": 950.0,
                "distance": 1400.0,
                "geometry": {"type": "LineString",
                             "coordinates": [[31.12, -26.52], [31.20, -26.60]]}
            }]
        })))
        .mount(&flood_server)
        .await;

    let origins = PointSet::from_points(
        "homesteads",
        vec![
            ("origin_1", (31.10, -26.50)),
            ("origin_2", (31.12, -26.52)),
            ("origin_3", (31.14, -26.54)),
        ],
    )
    .unwrap();
    let dests = PointSet::from_points(
        "schools",
        vec![("dest_1", (31.20, -26.60)), ("dest_2", (31.22, -26.62))],
    )
    .unwrap();

    let mut clients = HashMap::new();
    clients.insert(
        "normal".to_string(),
        QueryClient::with_base_url(normal_server.uri()),
    );
    clients.insert(
        "flood".to_string(),
        QueryClient::with_base_url(flood_server.uri()),
    );

    let mut engine = ComparisonEngine::new(origins, dests, clients);

    let diff = engine.difference("normal", "flood").await.unwrap();
    assert_eq!(diff.rows.len(), 1);
    assert_eq!(diff.rows[0].origin_id, "origin_2");
    assert_eq!(diff.rows[0].dest_id, "dest_1");
    assert_eq!(diff.rows[0].durations, vec![300.0, 950.0]);

    let same = engine.same("normal", "flood").await.unwrap();
    assert_eq!(same.rows.len(), 5);

    // Route geometry for the changed pair comes from the flood endpoint.
    let pairs = vec![ODPair::new("origin_2", "dest_1")];
    let records = engine.routes("flood", Some(&pairs)).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].duration, 950.0);
    assert_eq!(
        records[0].geometry.as_ref().unwrap()["type"],
        "LineString"
    );
}

#[tokio::test]
async fn test_matrix_is_cached_per_scenario() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/table/v1/.*"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "Ok",
            "durations": [[10.0]],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let origins = PointSet::from_points("o", vec![("o1", (0.0, 0.0))]).unwrap();
    let dests = PointSet::from_points("d", vec![("d1", (1.0, 1.0))]).unwrap();
    let mut clients = HashMap::new();
    clients.insert("only".to_string(), QueryClient::with_base_url(server.uri()));

    let mut engine = ComparisonEngine::new(origins, dests, clients);
    engine.duration_matrix("only").await.unwrap();
    let matrix = engine.duration_matrix("only").await.unwrap();
    assert_eq!(matrix.get("o1", "d1"), Some(10.0));

    // The .expect(1) above verifies the second call never hit the wire.
    server.verify().await;
}
