use crate::errors::CodecError;
use crate::models::irondb::{DiscoveryEntry, FetchResult};
use reqwest::header::CONTENT_TYPE;

pub const JSON_CONTENT_TYPE: &str = "application/json";
pub const FIND_RESULT_CONTENT_TYPE: &str = "application/x-flatbuffer-metric-find-result-list";
pub const GET_RESULT_CONTENT_TYPE: &str = "application/x-flatbuffer-metric-get-result-list";

/// Decoder for IRONdb's compact binary result encodings.
///
/// Implementations must produce the same logical structures as the JSON path.
/// A finder without a codec only negotiates JSON.
pub trait MetricCodec: Send + Sync {
    fn decode_find_results(&self, body: &[u8]) -> Result<Vec<DiscoveryEntry>, CodecError>;

    fn decode_get_results(&self, body: &[u8]) -> Result<FetchResult, CodecError>;
}

/// Encoding of a response body, taken from its `Content-Type` essence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentKind {
    Json,
    FindResults,
    GetResults,
    Other(String),
}

impl ContentKind {
    pub fn parse(content_type: &str) -> Self {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            JSON_CONTENT_TYPE => ContentKind::Json,
            FIND_RESULT_CONTENT_TYPE => ContentKind::FindResults,
            GET_RESULT_CONTENT_TYPE => ContentKind::GetResults,
            _ => ContentKind::Other(essence),
        }
    }

    pub fn of(response: &reqwest::Response) -> Self {
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        Self::parse(content_type)
    }
}
