//! Drives the stream consumer against a local stub feed.

use std::time::Duration;

use serde_json::json;

use edgeside_smoke_tests::{spawn_feed, spawn_worker};

#[tokio::test]
async fn consumer_connects_and_resumes_with_a_cursor() {
    let events = vec![
        json!({ "time_us": 1111, "commit": { "record": { "text": "first post" } } }).to_string(),
        json!({ "time_us": 2222, "commit": { "record": { "text": "second post" } } }).to_string(),
    ];
    let (feed, queries) = spawn_feed(events).await;
    let worker =
        edgeside_stream_consumer_example::worker_with(&feed.ws_url("/subscribe?kinds=post"))
            .expect("worker");
    let server = spawn_worker(worker).await;
    let base = server.base_url();

    let status = reqwest::get(format!("{base}/status"))
        .await
        .expect("request")
        .text()
        .await
        .expect("body");
    assert_eq!(status, "Feed status: connected");
    assert_eq!(
        queries.lock().expect("queries").first().map(String::as_str),
        Some("kinds=post")
    );

    // The stub hangs up after replaying its events; a later status request
    // notices the drop and reconnects from the recorded cursor.
    let mut resumed = None;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        reqwest::get(format!("{base}/status")).await.expect("request");
        let recorded = queries.lock().expect("queries");
        if recorded.len() >= 2 {
            resumed = Some(recorded[1].clone());
            break;
        }
    }
    let resumed = resumed.expect("feed never reconnected");
    assert_eq!(resumed, "kinds=post&cursor=2222");
}

#[tokio::test]
async fn root_lists_available_endpoints() {
    let (feed, _queries) = spawn_feed(Vec::new()).await;
    let worker =
        edgeside_stream_consumer_example::worker_with(&feed.ws_url("/subscribe?kinds=post"))
            .expect("worker");
    let server = spawn_worker(worker).await;

    let body = reqwest::get(server.base_url())
        .await
        .expect("request")
        .text()
        .await
        .expect("body");
    assert!(body.contains("/status"));
}
