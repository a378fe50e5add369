// Response-envelope normalization.
//
// Each backend wraps payloads differently. Everything leaving the client
// is `{data, meta}` regardless of variant. Normalization is total: a body
// that does not look like the expected envelope is passed through as data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope keys the cloud-stable API wraps around every payload.
const CLOUD_ENVELOPE_KEYS: [&str; 2] = ["httpStatusCode", "traceId"];

/// Pagination keys the gateway returns next to `data`, kept in `meta`.
const PAGE_KEYS: [&str; 4] = ["offset", "limit", "count", "totalCount"];

/// The envelope a backend variant is expected to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeShape {
    /// `{data, httpStatusCode, traceId}`
    CloudStable,
    /// The body is the payload.
    Bare,
    /// `{data, count, totalCount}` (plus `offset`/`limit`)
    Paged,
}

/// Uniform response handed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub data: Value,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl ApiResponse {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            meta: Map::new(),
        }
    }

    /// The response as a `{data, meta}` JSON object.
    pub fn into_value(self) -> Value {
        let mut obj = Map::with_capacity(2);
        obj.insert("data".into(), self.data);
        obj.insert("meta".into(), Value::Object(self.meta));
        Value::Object(obj)
    }

    /// `data` as a slice when it is an array, empty otherwise.
    pub fn items(&self) -> &[Value] {
        self.data
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// `meta.totalCount`, when the backend reported one.
    pub fn total_count(&self) -> Option<u64> {
        self.meta.get("totalCount").and_then(Value::as_u64)
    }
}

/// `true` for an object that is already exactly `{data, meta: {...}}`.
fn is_normalized(obj: &Map<String, Value>) -> bool {
    obj.len() == 2 && obj.contains_key("data") && obj.get("meta").is_some_and(Value::is_object)
}

/// Unwrap `raw` according to `shape`.
///
/// Never fails. Re-normalizing an already normalized value is a no-op.
pub fn normalize(raw: Value, shape: EnvelopeShape) -> ApiResponse {
    let Value::Object(mut obj) = raw else {
        return ApiResponse::new(raw);
    };

    if is_normalized(&obj) {
        let meta = match obj.remove("meta") {
            Some(Value::Object(meta)) => meta,
            _ => Map::new(),
        };
        let data = obj.remove("data").unwrap_or(Value::Null);
        return ApiResponse { data, meta };
    }

    match shape {
        EnvelopeShape::CloudStable
            if obj.contains_key("data")
                && CLOUD_ENVELOPE_KEYS.iter().any(|k| obj.contains_key(*k)) =>
        {
            let data = obj.remove("data").unwrap_or(Value::Null);
            ApiResponse::new(data)
        }
        EnvelopeShape::Paged
            if obj.contains_key("data")
                && (obj.contains_key("count") || obj.contains_key("totalCount")) =>
        {
            let data = obj.remove("data").unwrap_or(Value::Null);
            let meta = PAGE_KEYS
                .iter()
                .filter_map(|k| obj.remove(*k).map(|v| ((*k).to_owned(), v)))
                .collect();
            ApiResponse { data, meta }
        }
        _ => ApiResponse::new(Value::Object(obj)),
    }
}
