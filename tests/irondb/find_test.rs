// Discovery: pattern resolution, batching of discovered leaves and laziness

use super::test_utils::{
    config, find_branch, find_leaf, leaf_data, series_body, DEAD_HOST, FIND_PATH, SERIES_PATH,
};
use futures::StreamExt;
use irondb_finder::irondb::{Finder, Node, SeriesSource};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_find_preserves_backend_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FIND_PATH))
        .and(query_param("query", "app.*"))
        .and(header("accept", "application/json"))
        .and(header("x-snowth-timeout", "2000ms"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            find_branch("app.web"),
            find_leaf("app.cpu"),
            find_branch("app.db"),
            find_leaf("app.mem"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let finder = Finder::new(&config(&[&server.uri()])).unwrap();
    let nodes: Vec<Node> = finder.find_nodes("app.*").collect().await;

    let listed: Vec<(&str, bool)> = nodes.iter().map(|n| (n.name(), n.is_leaf())).collect();
    assert_eq!(
        listed,
        vec![
            ("app.web", false),
            ("app.cpu", true),
            ("app.db", false),
            ("app.mem", true),
        ]
    );
}

#[tokio::test]
async fn test_find_is_lazy() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FIND_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([find_leaf("a.b")])))
        .mount(&server)
        .await;

    let finder = Finder::new(&config(&[&server.uri()])).unwrap();
    let mut nodes = finder.find_nodes("a.*");

    let before = server.received_requests().await.unwrap_or_default();
    assert!(before.is_empty(), "discovery must wait for the first poll");

    let first = nodes.next().await.expect("one node");
    assert_eq!(first.name(), "a.b");
    assert!(nodes.next().await.is_none());

    let after = server.received_requests().await.unwrap_or_default();
    assert_eq!(after.len(), 1);
}

#[tokio::test]
async fn test_unresolvable_pattern_yields_no_nodes() {
    let finder = Finder::new(&config(&[DEAD_HOST, DEAD_HOST])).unwrap();
    let nodes: Vec<Node> = finder.find_nodes("nothing.*").collect().await;
    assert!(nodes.is_empty());
}

#[tokio::test]
async fn test_auth_headers_are_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FIND_PATH))
        .and(header("x-circonus-auth-token", "secret-token"))
        .and(header("x-circonus-app-name", "graphite-web"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([find_leaf("a.b")])))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config(&[&server.uri()]);
    config.auth_token = Some("secret-token".to_string());
    let finder = Finder::new(&config).unwrap();

    let nodes: Vec<Node> = finder.find_nodes("a.*").collect().await;
    assert_eq!(nodes.len(), 1);
}

#[tokio::test]
async fn test_leaf_batches_share_one_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FIND_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            find_leaf("svc.a"),
            find_branch("svc.sub"),
            find_leaf("svc.b"),
            find_leaf("svc.c"),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SERIES_PATH))
        .and(body_json(json!({
            "names": [
                {"leaf_name": "svc.a", "leaf_data": leaf_data("svc.a")},
                {"leaf_name": "svc.b", "leaf_data": leaf_data("svc.b")},
                {"leaf_name": "svc.c", "leaf_data": leaf_data("svc.c")},
            ],
            "start": 0,
            "end": 60,
            "database_rollups": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(series_body(
            0,
            60,
            30,
            &[("svc.a", vec![Some(1.0), Some(2.0)]), ("svc.c", vec![Some(5.0), None])],
        )))
        .expect(1)
        .mount(&server)
        .await;

    let finder = Finder::new(&config(&[&server.uri()])).unwrap();
    let nodes: Vec<Node> = finder.find_nodes("svc.*").collect().await;
    let leaves: Vec<_> = nodes.iter().filter_map(Node::as_leaf).collect();
    assert_eq!(leaves.len(), 3);

    let results =
        futures::future::join_all(leaves.iter().map(|leaf| leaf.reader.fetch(0, 60))).await;

    assert_eq!(results[0].as_ref().unwrap().values, vec![Some(1.0), Some(2.0)]);
    assert_eq!(results[1].as_ref().unwrap().values, vec![None, None]);
    assert_eq!(results[2].as_ref().unwrap().values, vec![Some(5.0), None]);
}

#[tokio::test]
async fn test_batch_size_one_fetches_each_leaf_separately() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(FIND_PATH))
        .and(query_param("query", "app.*.cpu"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([find_leaf("app.web.cpu"), find_leaf("app.db.cpu")])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(SERIES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(series_body(
            0,
            60,
            60,
            &[("app.web.cpu", vec![Some(0.5)]), ("app.db.cpu", vec![Some(0.7)])],
        )))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = config(&[&server.uri()]);
    config.batch_size = 1;
    let finder = Finder::new(&config).unwrap();

    let nodes: Vec<Node> = finder.find_nodes("app.*.cpu").collect().await;
    let web = nodes[0].as_leaf().unwrap();
    let db = nodes[1].as_leaf().unwrap();
    assert!(!Arc::ptr_eq(web.reader.batch(), db.reader.batch()));

    assert_eq!(web.reader.fetch(0, 60).await.unwrap().values, vec![Some(0.5)]);
    assert_eq!(db.reader.fetch(0, 60).await.unwrap().values, vec![Some(0.7)]);
}

#[tokio::test]
async fn test_batches_split_at_configured_size() {
    let server = MockServer::start().await;
    let entries: Vec<_> = (0..7).map(|i| find_leaf(&format!("m.{i}"))).collect();
    Mock::given(method("GET"))
        .and(path(FIND_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(entries)))
        .mount(&server)
        .await;

    let mut config = config(&[&server.uri()]);
    config.batch_size = 3;
    let finder = Finder::new(&config).unwrap();
    let nodes: Vec<Node> = finder.find_nodes("m.*").collect().await;

    let mut ids: Vec<usize> = nodes
        .iter()
        .filter_map(Node::as_leaf)
        .map(|leaf| leaf.reader.batch().id())
        .collect();
    assert_eq!(ids, vec![0, 0, 0, 1, 1, 1, 2]);

    ids.dedup();
    assert_eq!(ids.len(), 3);
}
