//! Polling and log streaming wired to the gateway

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lpfactory::console::refresh::{LogStream, Poller, StreamStatus};
use lpfactory::console::state::AppStore;
use lpfactory::console::sync::{JobQuery, RequestOptions};
use lpfactory::console::{Config, SyncClient};
use lpfactory::shared::models::{Job, JobStatus};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, Request, Respond, ResponseTemplate};

use crate::common::*;

/// Job status advancing by one step per request
struct JobProgress {
    calls: AtomicUsize,
}

impl Respond for JobProgress {
    fn respond(&self, _: &Request) -> ResponseTemplate {
        let status = match self.calls.fetch_add(1, Ordering::SeqCst) {
            0 => "queued",
            1 | 2 => "running",
            _ => "succeeded",
        };
        ResponseTemplate::new(200).set_body_json(json!({
            "id": "job-7", "type": "publish", "status": status
        }))
    }
}

#[tokio::test]
async fn test_poll_job_until_terminal() {
    let (server, _store, client) = engine().await;
    Mock::given(method("GET"))
        .and(path("/jobs/job-7"))
        .respond_with(JobProgress {
            calls: AtomicUsize::new(0),
        })
        .mount(&server)
        .await;

    let handle = Poller::new(Duration::from_millis(20))
        .stop_when(|job: &Job| job.status.is_terminal())
        .spawn(move |cancel| {
            let client = client.clone();
            async move {
                client
                    .get_job_with("job-7", RequestOptions::new().cancel(cancel))
                    .await
            }
        });

    let latest = handle.subscribe();
    handle.join().await;
    let job = latest.borrow().clone();
    assert_eq!(job.map(|j| j.status), Some(JobStatus::Succeeded));
    assert_eq!(request_count(&server).await, 4);
}

#[tokio::test]
async fn test_poll_survives_engine_outage() {
    let url = refused_url();
    let (store, _) = real_store(&url);
    let client = real_client(&store, &url);

    let handle = Poller::new(Duration::from_millis(10)).spawn(move |cancel| {
        let client = client.clone();
        async move {
            client
                .request(
                    lpfactory::console::sync::Method::Get,
                    "/jobs",
                    None,
                    RequestOptions::new().cancel(cancel),
                )
                .await
        }
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(handle.ticks() >= 2, "ticks: {}", handle.ticks());
    assert!(!handle.is_finished());
    assert!(!store.is_reachable());
    assert_eq!(handle.latest(), None);
    handle.cancel();
}

#[tokio::test]
async fn test_cancelled_poll_does_not_touch_reachability() {
    let (server, store, client) = engine().await;
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_millis(150)),
        )
        .mount(&server)
        .await;
    store.set_reachable(false);

    let handle = Poller::new(Duration::from_millis(10)).spawn(move |cancel| {
        let client = client.clone();
        async move {
            client
                .list_jobs_with(&JobQuery::default(), RequestOptions::new().cancel(cancel))
                .await
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.cancel();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(!store.is_reachable());
    assert_eq!(handle.ticks(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_mock_poll_counts_in_flight() {
    let store = AppStore::in_memory();
    // Mock latency longer than the interval
    let client = SyncClient::new(store, &Config::new()).with_mock_latency(Duration::from_millis(300));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_in_flight = Arc::new(AtomicUsize::new(0));
    let (flight, max) = (Arc::clone(&in_flight), Arc::clone(&max_in_flight));

    let handle = Poller::new(Duration::from_millis(50)).spawn(move |cancel| {
        let client = client.clone();
        let flight = Arc::clone(&flight);
        let max = Arc::clone(&max);
        async move {
            let now = flight.fetch_add(1, Ordering::SeqCst) + 1;
            max.fetch_max(now, Ordering::SeqCst);
            let result = client
                .list_jobs_with(&JobQuery::default(), RequestOptions::new().cancel(cancel))
                .await;
            flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    });

    tokio::time::sleep(Duration::from_secs(3)).await;
    handle.cancel();
    assert!(handle.ticks() >= 5);
    assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(handle.latest().map(|jobs| jobs.len()), Some(3));
}

#[tokio::test]
async fn test_mock_job_log_stream() {
    let store = AppStore::in_memory();
    let client = SyncClient::new(store, &Config::new()).with_mock_latency(Duration::ZERO);

    let stream = LogStream::for_job(client, "job-2");
    assert_eq!(stream.settled().await, StreamStatus::Ended);
    let lines = stream.lines();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0], "[job-2] job accepted");
}

#[tokio::test]
async fn test_real_job_log_stream() {
    let (server, store, client) = engine().await;
    let body: String = (1..=300).map(|n| format!("step {}\r\n", n)).collect();
    Mock::given(method("GET"))
        .and(path("/jobs/job-9/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let stream = LogStream::for_job(client, "job-9");
    assert_eq!(stream.settled().await, StreamStatus::Ended);
    let lines = stream.lines();
    assert_eq!(lines.len(), 200);
    assert_eq!(lines[0], "step 101");
    assert_eq!(lines[199], "step 300");
    assert!(store.is_reachable());
}

#[tokio::test]
async fn test_unavailable_stream_then_reconnect() {
    let (server, store, client) = engine().await;
    Mock::given(method("GET"))
        .and(path("/jobs/job-4/stream"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/jobs/job-4/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_string("resumed\n"))
        .mount(&server)
        .await;

    let stream = LogStream::for_job(client, "job-4");
    let status = stream.settled().await;
    assert!(matches!(status, StreamStatus::Unavailable(_)), "{:?}", status);
    assert!(store.is_reachable());

    stream.reconnect();
    assert_eq!(stream.settled().await, StreamStatus::Ended);
    assert_eq!(stream.lines(), vec!["resumed"]);

    stream.cancel();
    stream.cancel();
    stream.reconnect();
    assert_eq!(stream.status(), StreamStatus::Ended);
}
