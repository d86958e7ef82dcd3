//! Metrics module
//!
//! Provides Prometheus metrics for uploads and HTTP requests.

pub mod server;

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    HistogramVec,
};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "form_uploadr_uploads_total",
        "Total number of uploads",
        &["bucket", "status"]
    ).expect("uploads_total metric registers once");

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "form_uploadr_upload_bytes_total",
        "Total bytes uploaded"
    ).expect("upload_bytes_total metric registers once");

    pub static ref UPLOAD_DURATION: HistogramVec = register_histogram_vec!(
        "form_uploadr_upload_duration_seconds",
        "Upload duration in seconds, from first body byte to storage response",
        &["bucket"],
        vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]
    ).expect("upload_duration metric registers once");

    // HTTP metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "form_uploadr_http_requests_total",
        "HTTP requests by route and status code",
        &["route", "status"]
    ).expect("http_requests_total metric registers once");

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "form_uploadr_errors_total",
        "Total errors",
        &["type"]
    ).expect("errors_total metric registers once");
}

/// Record a successful upload
pub fn record_upload_success(bucket: &str, bytes: u64) {
    UPLOADS_TOTAL.with_label_values(&[bucket, "success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a failed upload
pub fn record_upload_failure(bucket: &str) {
    UPLOADS_TOTAL.with_label_values(&[bucket, "failure"]).inc();
}

/// Record upload duration
pub fn record_upload_duration(bucket: &str, duration_secs: f64) {
    UPLOAD_DURATION
        .with_label_values(&[bucket])
        .observe(duration_secs);
}

/// Record a served HTTP request
pub fn record_http_request(route: &str, status: u16) {
    let status = status.to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[route, status.as_str()])
        .inc();
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}
