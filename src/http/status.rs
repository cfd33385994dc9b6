use axum::http::StatusCode;

pub async fn status() -> (StatusCode, &'static str) {
    (StatusCode::OK, "I'm OK")
}
