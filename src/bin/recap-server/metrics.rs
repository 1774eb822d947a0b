use std::sync::OnceLock;
use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::Request;
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts as PromOpts,
    Registry, TextEncoder,
};

/// Request latency buckets, in seconds. Transcription and summarization calls
/// run whole model inferences (and may load weights on first use), so the
/// upper buckets stretch far past typical HTTP latencies.
const REQUEST_SECONDS_BUCKETS: &[f64] = &[0.05, 0.25, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

/// Duration buckets for uploaded audio, in seconds of audio.
const AUDIO_SECONDS_BUCKETS: &[f64] = &[5.0, 15.0, 30.0, 60.0, 300.0, 900.0, 1800.0, 3600.0];

struct Metrics {
    registry: Registry,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    http_in_flight_requests: IntGauge,
    audio_upload_seconds: Histogram,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

fn metrics() -> &'static Metrics {
    METRICS.get_or_init(|| {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            PromOpts::new(
                "recap_http_requests_total",
                "Total HTTP requests served by recap-server.",
            ),
            &["route", "status"],
        )
        .expect("metrics definition must be valid");

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "recap_http_request_duration_seconds",
                "HTTP request latency in seconds, including model inference.",
            )
            .buckets(REQUEST_SECONDS_BUCKETS.to_vec()),
            &["route", "status"],
        )
        .expect("metrics definition must be valid");

        let http_in_flight_requests = IntGauge::new(
            "recap_http_in_flight_requests",
            "Current number of in-flight HTTP requests.",
        )
        .expect("metrics definition must be valid");

        let audio_upload_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "recap_audio_upload_seconds",
                "Duration of uploaded recordings after preprocessing, in seconds of audio.",
            )
            .buckets(AUDIO_SECONDS_BUCKETS.to_vec()),
        )
        .expect("metrics definition must be valid");

        registry
            .register(Box::new(http_requests_total.clone()))
            .expect("metrics must register");
        registry
            .register(Box::new(http_request_duration_seconds.clone()))
            .expect("metrics must register");
        registry
            .register(Box::new(http_in_flight_requests.clone()))
            .expect("metrics must register");
        registry
            .register(Box::new(audio_upload_seconds.clone()))
            .expect("metrics must register");

        Metrics {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            http_in_flight_requests,
            audio_upload_seconds,
        }
    })
}

pub fn init() {
    let _ = metrics();
}

/// Record the audio duration of a processed upload.
pub fn observe_audio_seconds(seconds: f64) {
    metrics().audio_upload_seconds.observe(seconds);
}

pub async fn prometheus_metrics() -> Response {
    let families = metrics().registry.gather();
    let mut buf = Vec::new();
    if TextEncoder::new().encode(&families, &mut buf).is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "failed to encode metrics",
        )
            .into_response();
    }

    (
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
        )],
        buf,
    )
        .into_response()
}

pub async fn track_http_metrics(req: Request<Body>, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str())
        .unwrap_or_else(|| req.uri().path())
        .to_owned();

    if route == "/metrics" || route == "/health" {
        return next.run(req).await;
    }

    let start = Instant::now();

    metrics().http_in_flight_requests.inc();
    let response = next.run(req).await;
    metrics().http_in_flight_requests.dec();

    let status = response.status().as_u16().to_string();
    metrics()
        .http_requests_total
        .with_label_values(&[&route, &status])
        .inc();
    metrics()
        .http_request_duration_seconds
        .with_label_values(&[&route, &status])
        .observe(start.elapsed().as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_service_metric_families() {
        init();
        observe_audio_seconds(42.0);
        metrics()
            .http_requests_total
            .with_label_values(&["/transcribe", "200"])
            .inc();

        let families = metrics().registry.gather();
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&families, &mut buf)
            .expect("encode metrics");
        let text = String::from_utf8(buf).expect("metrics are utf-8");

        assert!(text.contains("recap_http_requests_total"));
        assert!(text.contains("recap_http_request_duration_seconds"));
        assert!(text.contains("recap_audio_upload_seconds"));
        assert!(text.contains("route=\"/transcribe\""));
    }

    #[test]
    fn latency_buckets_cover_long_inference() {
        assert!(REQUEST_SECONDS_BUCKETS.windows(2).all(|w| w[0] < w[1]));
        assert!(*REQUEST_SECONDS_BUCKETS.last().unwrap() >= 300.0);
    }
}
