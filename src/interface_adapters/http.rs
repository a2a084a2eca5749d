// Shared response body for HTTP-level rejections.

#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
