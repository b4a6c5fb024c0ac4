use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec, TextEncoder,
};

// Prometheus metrics (default registry)
pub static STORE_CONNECT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "backbone_store_connect_total",
        "Completed store connects by backend",
        &["store"]
    )
    .expect("register store_connect_total")
});

pub static STORE_OPERATION_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "backbone_store_operation_failures_total",
        "Store operations that failed and were reported to the caller",
        &["store"]
    )
    .expect("register store_operation_failures_total")
});

pub static CREDENTIAL_FALLBACK_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "backbone_credential_fallback_total",
        "Object store connects that fell back to the default credential chain"
    )
    .expect("register credential_fallback_total")
});

pub static SERVICE_START_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "backbone_service_start_failures_total",
        "Service start hooks that returned an error or panicked",
        &["service"]
    )
    .expect("register service_start_failures_total")
});

pub fn encode_metrics() -> (axum::http::StatusCode, String) {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encode error: {e}"),
        );
    }
    (
        axum::http::StatusCode::OK,
        String::from_utf8(buffer).unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_encoded_output() {
        STORE_OPERATION_FAILURES_TOTAL.with_label_values(&["cache"]).inc();
        let (status, body) = encode_metrics();
        assert_eq!(status, axum::http::StatusCode::OK);
        assert!(body.contains("backbone_store_operation_failures_total"));
    }
}
