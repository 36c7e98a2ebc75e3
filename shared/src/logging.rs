use tracing::Span;

pub fn init() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();
}

pub fn request_span(function: &'static str, request_id: &str) -> Span {
    tracing::info_span!("request", function, request_id = %request_id)
}
