//! JSON-RPC 2.0 codec — newline-delimited messages over a byte stream.
//!
//! Holds the wire types, the standard error codes, a size-bounded line
//! reader and request decoding that recovers the request identifier from
//! malformed requests whenever the line is at least a JSON object.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error};

/// Maximum size of a single JSON-RPC line (10 MiB).
pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

/// Bytes of an over-long line kept for identifier recovery.
pub const OVERSIZED_PREFIX_BYTES: usize = 4 * 1024;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
/// Implementation-defined bucket for I/O and execution failures.
pub const SERVER_ERROR: i64 = -32000;

// ---------------------------------------------------------------------------
// JSON-RPC 2.0 types
// ---------------------------------------------------------------------------

/// JSON-RPC 2.0 request. `id: None` (absent or `null`) marks a notification.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

pub fn success_response(id: Value, result: &impl Serialize) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(v) => JsonRpcResponse {
            jsonrpc: "2.0".to_owned(),
            id,
            result: Some(v),
            error: None,
        },
        Err(e) => {
            error!(error = %e, "failed to serialize success response");
            error_response(
                id,
                INTERNAL_ERROR,
                &format!("internal error: failed to serialize result: {e}"),
                None,
            )
        }
    }
}

pub fn error_response(id: Value, code: i64, message: &str, data: Option<Value>) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".to_owned(),
        id,
        result: None,
        error: Some(JsonRpcError {
            code,
            message: message.to_owned(),
            data,
        }),
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Outcome of decoding one input line.
#[derive(Debug)]
pub enum Decoded {
    /// A well-formed request or notification.
    Request(JsonRpcRequest),
    /// Malformed, but addressed: the caller owes `id` a parse error.
    Malformed { id: Value, reason: String },
    /// Malformed with no recoverable identifier; nobody to answer.
    Unaddressable { reason: String },
}

/// Decode one line into a request.
pub fn decode_request(line: &[u8]) -> Decoded {
    let value: Value = match serde_json::from_slice(line) {
        Ok(v) => v,
        Err(e) => {
            return Decoded::Unaddressable {
                reason: e.to_string(),
            };
        }
    };

    let id = value.get("id").filter(|id| !id.is_null()).cloned();

    match serde_json::from_value::<JsonRpcRequest>(value) {
        Ok(request) => Decoded::Request(request),
        Err(e) => match id {
            Some(id) => Decoded::Malformed {
                id,
                reason: e.to_string(),
            },
            None => Decoded::Unaddressable {
                reason: e.to_string(),
            },
        },
    }
}

/// Find a top-level `"id"` in the leading bytes of a JSON object that was
/// too large to decode whole.
///
/// Only string and number ids are returned; nested objects are skipped so
/// an `"id"` inside `params` is never mistaken for the request's.
pub fn recover_id(prefix: &[u8]) -> Option<Value> {
    let mut depth = 0usize;
    let mut i = 0;
    while i < prefix.len() {
        match prefix[i] {
            b'"' => {
                let end = string_end(prefix, i)?;
                if depth == 1 && &prefix[i + 1..end] == b"id" {
                    let rest = prefix[end + 1..].trim_ascii_start();
                    if let Some(value) = rest.strip_prefix(b":") {
                        let mut values =
                            serde_json::Deserializer::from_slice(value).into_iter::<Value>();
                        return match values.next() {
                            Some(Ok(id)) if id.is_string() || id.is_number() => Some(id),
                            _ => None,
                        };
                    }
                }
                i = end + 1;
            }
            b'{' | b'[' => {
                depth += 1;
                i += 1;
            }
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                i += 1;
            }
            _ => i += 1,
        }
    }
    None
}

/// Index of the quote closing the string that opens at `start`.
fn string_end(buf: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 1;
    while i < buf.len() {
        match buf[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Stream I/O
// ---------------------------------------------------------------------------

/// Result of [`read_line_limited`].
#[derive(Debug, PartialEq, Eq)]
pub enum LineRead {
    /// End of input; nothing was read.
    Eof,
    /// A line (or the unterminated tail of the input) is in the buffer.
    Line,
    /// The line exceeded the limit and was consumed; only its first
    /// [`OVERSIZED_PREFIX_BYTES`] are left in the buffer.
    Oversized,
}

/// Read a line from `reader` into `buf`, stopping at newline or `max_bytes`.
///
/// An over-long line is consumed up to and including its newline so the
/// next call starts on a fresh line. `buf` is expected to be empty.
pub async fn read_line_limited<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_bytes: usize,
) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let mut total = 0usize;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(if total == 0 { LineRead::Eof } else { LineRead::Line });
        }
        let (consumed, found_newline) = match available.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };
        if total + consumed > max_bytes {
            let keep = OVERSIZED_PREFIX_BYTES.saturating_sub(buf.len()).min(consumed);
            buf.extend_from_slice(&available[..keep]);
            buf.truncate(OVERSIZED_PREFIX_BYTES);
            reader.consume(consumed);
            if !found_newline {
                skip_to_newline(reader).await?;
            }
            return Ok(LineRead::Oversized);
        }
        buf.extend_from_slice(&available[..consumed]);
        total += consumed;
        reader.consume(consumed);
        if found_newline {
            return Ok(LineRead::Line);
        }
    }
}

async fn skip_to_newline<R>(reader: &mut R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let rest = reader.fill_buf().await?;
        if rest.is_empty() {
            return Ok(());
        }
        if let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            reader.consume(pos + 1);
            return Ok(());
        }
        let n = rest.len();
        reader.consume(n);
    }
}

/// Write a JSON-RPC response as a single line and flush.
pub async fn write_response<W>(out: &mut W, resp: &JsonRpcResponse) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    use anyhow::Context;

    let mut json = serde_json::to_vec(resp).context("failed to serialize response")?;
    debug!(response = %String::from_utf8_lossy(&json), "sending response");
    json.push(b'\n');
    out.write_all(&json)
        .await
        .context("failed to write response")?;
    out.flush().await.context("failed to flush output")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_request_with_id() {
        let line = br#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;
        match decode_request(line) {
            Decoded::Request(req) => {
                assert_eq!(req.id, Some(json!(1)));
                assert_eq!(req.method, "ping");
                assert!(!req.is_notification());
            }
            other => panic!("unexpected decode result: {other:?}"),
        }
    }

    #[test]
    fn test_decode_null_id_is_notification() {
        let line = br#"{"jsonrpc":"2.0","id":null,"method":"notifications/initialized"}"#;
        match decode_request(line) {
            Decoded::Request(req) => assert!(req.is_notification()),
            other => panic!("unexpected decode result: {other:?}"),
        }
    }

    #[test]
    fn test_decode_recovers_id_from_bad_shape() {
        let line = br#"{"jsonrpc":"2.0","id":"abc","method":42}"#;
        match decode_request(line) {
            Decoded::Malformed { id, .. } => assert_eq!(id, json!("abc")),
            other => panic!("unexpected decode result: {other:?}"),
        }
    }

    #[test]
    fn test_decode_garbage_is_unaddressable() {
        assert!(matches!(
            decode_request(b"{not json"),
            Decoded::Unaddressable { .. }
        ));
        assert!(matches!(
            decode_request(br#"{"id":null,"method":7}"#),
            Decoded::Unaddressable { .. }
        ));
        assert!(matches!(
            decode_request(b"[1,2,3]"),
            Decoded::Unaddressable { .. }
        ));
    }

    #[tokio::test]
    async fn test_read_line_limited_discards_oversized_line() {
        let input = b"aaaaaaaaaaaaaaaa\nok\n".to_vec();
        let mut reader = tokio::io::BufReader::with_capacity(4, input.as_slice());
        let mut buf = Vec::new();

        let first = read_line_limited(&mut reader, &mut buf, 8).await.expect("read");
        assert_eq!(first, LineRead::Oversized);
        assert!(buf.iter().all(|&b| b == b'a'));
        assert!(!buf.is_empty());

        buf.clear();
        let second = read_line_limited(&mut reader, &mut buf, 8).await.expect("read");
        assert_eq!(second, LineRead::Line);
        assert_eq!(buf, b"ok\n");

        buf.clear();
        let third = read_line_limited(&mut reader, &mut buf, 8).await.expect("read");
        assert_eq!(third, LineRead::Eof);
    }

    #[tokio::test]
    async fn test_read_line_limited_returns_unterminated_tail() {
        let input = b"{\"id\":1}".to_vec();
        let mut reader = tokio::io::BufReader::new(input.as_slice());
        let mut buf = Vec::new();
        let read = read_line_limited(&mut reader, &mut buf, MAX_LINE_BYTES)
            .await
            .expect("read");
        assert_eq!(read, LineRead::Line);
        assert_eq!(buf, b"{\"id\":1}");
    }

    #[test]
    fn test_recover_id_from_truncated_object() {
        let prefix = br#"{"jsonrpc":"2.0","params":{"id":5,"text":"a \"id\": 9"},"id":42,"method":"tools/call","params2":"xxxx"#;
        assert_eq!(recover_id(prefix), Some(json!(42)));
        assert_eq!(recover_id(br#"{"id" : "req-1", "params": {"content": "aaa"#), Some(json!("req-1")));
    }

    #[test]
    fn test_recover_id_rejects_missing_or_null() {
        assert_eq!(recover_id(br#"{"method":"ping","params":{"id":3,"#), None);
        assert_eq!(recover_id(br#"{"id":null,"method":"x"#), None);
        assert_eq!(recover_id(br#"[{"id":1}"#), None);
        assert_eq!(recover_id(b"garbage"), None);
    }

    #[test]
    fn test_error_response_skips_result() {
        let resp = error_response(json!(2), METHOD_NOT_FOUND, "Method not found", None);
        let text = serde_json::to_string(&resp).expect("serialize");
        assert!(text.contains("-32601"));
        assert!(!text.contains("result"));
        assert!(!text.contains("data"));
    }
}
