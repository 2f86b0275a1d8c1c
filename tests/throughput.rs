mod common;

use axum::body::{to_bytes, Body};
use axum::http::header::{ORIGIN, REFERER};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use common::{serve, Hits, MIB};
use internetometer::settings::{ROOT_REFERER, SITE_ORIGIN, SITE_REFERER};
use internetometer::speedtest::{Direction, EventSink, ThroughputMeasurer, TestUpdate};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const PER_REQUEST_DELAY: Duration = Duration::from_millis(50);

fn measurer() -> ThroughputMeasurer {
    ThroughputMeasurer::new(reqwest::Client::new(), EventSink::none())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn download_rate_is_bounded_by_bytes_served() {
    let hits = Hits::default();
    let served = hits.clone();
    let addr = serve(move |_| {
        Router::new().route(
            "/download",
            get(move || {
                let served = served.clone();
                async move {
                    served.hit();
                    tokio::time::sleep(PER_REQUEST_DELAY).await;
                    vec![0u8; MIB]
                }
            }),
        )
    })
    .await;

    let window = Duration::from_secs(2);
    let concurrency = 2;
    let started = Instant::now();
    let rate = measurer()
        .measure(
            Direction::Download,
            &format!("http://{addr}/download"),
            concurrency,
            window,
            &CancellationToken::new(),
        )
        .await;
    let elapsed = started.elapsed();

    assert!(rate > 0.0, "no bytes were counted");
    assert!(elapsed >= window);
    assert!(elapsed < window + Duration::from_secs(2));

    // Counted bytes can never exceed what the server handed out.
    let requests = hits.count();
    let served_bits = (requests * MIB * 8) as f64;
    assert!(rate <= served_bits / window.as_secs_f64());

    // Each worker finishes at most one request per mock delay.
    let max_requests = concurrency * (window.as_millis() / PER_REQUEST_DELAY.as_millis() + 1) as usize;
    assert!(requests <= max_requests, "{requests} requests");
    let ceiling = (max_requests * MIB * 8) as f64 / window.as_secs_f64();
    assert!(rate <= ceiling);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn upload_counts_posted_bytes() {
    let received = Hits::default();
    let sink = received.clone();
    let addr = serve(move |_| {
        Router::new().route(
            "/upload",
            post(move |body: Body| {
                let sink = sink.clone();
                async move {
                    // uploads cut off at the window edge arrive truncated
                    match to_bytes(body, usize::MAX).await {
                        Ok(bytes) if bytes.iter().all(|&b| b == 0) => {
                            sink.hit();
                            StatusCode::OK
                        }
                        _ => StatusCode::BAD_REQUEST,
                    }
                }
            }),
        )
    })
    .await;

    let (events, mut rx) = EventSink::channel(4096);
    let rate = ThroughputMeasurer::new(reqwest::Client::new(), events)
        .with_upload_size(256 * 1024)
        .measure(
            Direction::Upload,
            &format!("http://{addr}/upload"),
            2,
            Duration::from_secs(1),
            &CancellationToken::new(),
        )
        .await;

    assert!(rate > 0.0);
    assert!(received.count() >= 1);

    let mut peak = 0;
    while let Ok(update) = rx.try_recv() {
        if let TestUpdate::Progress(sample) = update {
            assert_eq!(sample.direction, Direction::Upload);
            peak = peak.max(sample.bytes_total);
        }
    }
    assert!(peak >= 256 * 1024);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn forbidden_probe_is_retried_with_backoff() {
    let hits = Hits::default();
    let counted = hits.clone();
    let addr = serve(move |_| {
        Router::new().route(
            "/download",
            get(move || {
                let counted = counted.clone();
                async move {
                    counted.hit();
                    StatusCode::FORBIDDEN
                }
            }),
        )
    })
    .await;

    let rate = measurer()
        .measure(
            Direction::Download,
            &format!("http://{addr}/download"),
            2,
            Duration::from_millis(1500),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(rate, 0.0);
    // two workers, one try per second of backoff, so at most two rounds each
    let hits = hits.count();
    assert!((2..=4).contains(&hits), "{hits} hits");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn outer_cancel_unblocks_in_flight_requests() {
    let addr = serve(|_| {
        Router::new().route(
            "/download",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                StatusCode::OK
            }),
        )
    })
    .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let rate = measurer()
        .measure(
            Direction::Download,
            &format!("http://{addr}/download"),
            4,
            Duration::from_secs(8),
            &cancel,
        )
        .await;

    assert_eq!(rate, 0.0);
    assert!(started.elapsed() < Duration::from_secs(2));
}

fn header_is(headers: &HeaderMap, name: axum::http::HeaderName, value: &str) -> bool {
    headers.get(name).and_then(|v| v.to_str().ok()) == Some(value)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transfers_carry_site_headers() {
    let addr = serve(|_| {
        Router::new()
            .route(
                "/download",
                get(|headers: HeaderMap| async move {
                    if header_is(&headers, REFERER, ROOT_REFERER) {
                        Ok(vec![0u8; 64 * 1024])
                    } else {
                        Err(StatusCode::BAD_REQUEST)
                    }
                }),
            )
            .route(
                "/upload",
                post(|headers: HeaderMap, body: Body| async move {
                    let _ = to_bytes(body, usize::MAX).await;
                    if header_is(&headers, REFERER, SITE_REFERER)
                        && header_is(&headers, ORIGIN, SITE_ORIGIN)
                    {
                        StatusCode::OK
                    } else {
                        StatusCode::BAD_REQUEST
                    }
                }),
            )
    })
    .await;

    let measurer = measurer().with_upload_size(64 * 1024);
    for (direction, path) in [(Direction::Download, "download"), (Direction::Upload, "upload")] {
        let rate = measurer
            .measure(
                direction,
                &format!("http://{addr}/{path}"),
                1,
                Duration::from_millis(500),
                &CancellationToken::new(),
            )
            .await;
        assert!(rate > 0.0, "{path} was rejected");
    }
}
