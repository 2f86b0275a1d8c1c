mod common;

use axum::http::header::REFERER;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::Router;
use common::{serve, Hits};
use internetometer::provider::Probe;
use internetometer::settings::SITE_REFERER;
use internetometer::speedtest::{EventSink, LatencyProbe, TestUpdate};
use internetometer::SpeedTestError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn probe() -> LatencyProbe {
    LatencyProbe::new(reqwest::Client::new(), EventSink::none())
}

#[tokio::test]
async fn only_the_successful_attempt_counts() {
    let hits = Hits::default();
    let counted = hits.clone();
    let addr = serve(move |_| {
        Router::new().route(
            "/ping",
            get(move || {
                let counted = counted.clone();
                async move {
                    if counted.hit() == 1 {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        StatusCode::OK
                    } else {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                }
            }),
        )
    })
    .await;

    let (sink, mut rx) = EventSink::channel(16);
    let latency = LatencyProbe::new(reqwest::Client::new(), sink)
        .with_rounds(3)
        .measure(&[Probe::new(format!("http://{addr}/ping"))], &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(hits.count(), 3);
    assert!(latency >= Duration::from_millis(50));
    assert!(latency < Duration::from_secs(1));

    let samples: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    assert_eq!(samples, vec![TestUpdate::LatencySample(latency)]);
}

#[tokio::test]
async fn fastest_probe_wins() {
    let addr = serve(|_| {
        Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    StatusCode::OK
                }),
            )
            .route("/fast", get(|| async { StatusCode::OK }))
    })
    .await;

    let probes = [
        Probe::new(format!("http://{addr}/slow")),
        Probe::new(format!("http://{addr}/fast")),
    ];
    let latency = probe()
        .with_rounds(1)
        .measure(&probes, &CancellationToken::new())
        .await
        .unwrap();

    assert!(latency < Duration::from_millis(300));
}

#[tokio::test]
async fn non_ok_status_is_not_a_sample() {
    let addr = serve(|_| Router::new().route("/ping", get(|| async { StatusCode::NO_CONTENT })))
        .await;

    let result = probe()
        .measure(&[Probe::new(format!("http://{addr}/ping"))], &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(SpeedTestError::NoLatency)));
}

#[tokio::test]
async fn probe_timeout_bounds_each_attempt() {
    let addr = serve(|_| {
        Router::new().route(
            "/ping",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                StatusCode::OK
            }),
        )
    })
    .await;

    let started = std::time::Instant::now();
    let result = probe()
        .with_rounds(2)
        .measure(
            &[Probe::new(format!("http://{addr}/ping")).with_timeout(Duration::from_millis(100))],
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(SpeedTestError::NoLatency)));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn round_trips_carry_the_site_referer() {
    let addr = serve(|_| {
        Router::new().route(
            "/ping",
            get(|headers: HeaderMap| async move {
                match headers.get(REFERER).and_then(|v| v.to_str().ok()) {
                    Some(referer) if referer == SITE_REFERER => StatusCode::OK,
                    _ => StatusCode::BAD_REQUEST,
                }
            }),
        )
    })
    .await;

    let latency = probe()
        .with_rounds(1)
        .measure(&[Probe::new(format!("http://{addr}/ping"))], &CancellationToken::new())
        .await;
    assert!(latency.is_ok());
}
