//! Upstream forwarding: sending the (possibly re-encoded) request on, and
//! turning its reply — buffered JSON or a live SSE stream — into the
//! response the original client expects.

use std::io;
use std::pin::Pin;

use axum::body::{Body, Bytes};
use axum::response::Response;
use dialect::{stream::Transcoder, Dialect};
use futures_util::{Stream, StreamExt};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use proxy_config::{ErrorCode, ErrorEnvelope};
use serde_json::Value;
use url::Url;

use crate::error_response;

/// Headers that must never be forwarded verbatim: they describe the
/// hop between client and proxy, not the one between proxy and upstream.
const HOP_BY_HOP: &[&str] = &[
    "host",
    "connection",
    "proxy-connection",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
    "content-length",
];

/// Strip hop-by-hop headers before handing the rest on to the upstream call.
pub fn filter_request_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers.iter() {
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Forward the request bytes to `upstream` unchanged and stream the reply
/// back verbatim: the dialect bridge and moderation stages never saw this
/// request (neither was enabled, or no dialect could be identified and
/// strict parsing is off).
pub async fn passthrough(http: &reqwest::Client, method: Method, headers: HeaderMap, upstream: Url, body: Bytes, timeout: std::time::Duration) -> Response {
    match send(http, method, headers, upstream, body, timeout).await {
        Ok(resp) => raw_stream_response(resp),
        Err(envelope) => error_response(envelope),
    }
}

/// Send the request on; forward its reply, transcoding if `source != target`
/// or streaming raw bytes back when they're identical.
#[allow(clippy::too_many_arguments)]
pub async fn send_and_transcode(
    http: &reqwest::Client,
    method: Method,
    headers: HeaderMap,
    upstream: Url,
    body: Bytes,
    source: Dialect,
    target: Dialect,
    stream: bool,
    timeout: std::time::Duration,
) -> Response {
    let resp = match send(http, method, headers, upstream, body, timeout).await {
        Ok(resp) => resp,
        Err(envelope) => return error_response(envelope),
    };

    let is_event_stream = resp
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("text/event-stream"));

    if stream && is_event_stream {
        return streaming_response(resp, source, target);
    }

    buffered_response(resp, source, target).await
}

async fn send(http: &reqwest::Client, method: Method, headers: HeaderMap, upstream: Url, body: Bytes, timeout: std::time::Duration) -> Result<reqwest::Response, ErrorEnvelope> {
    http.request(method, upstream)
        .headers(headers)
        .timeout(timeout)
        .body(body)
        .send()
        .await
        .map_err(|err| {
            let message = if err.is_timeout() {
                format!("upstream request timed out: {err}")
            } else {
                format!("upstream request failed: {err}")
            };
            ErrorEnvelope::new(ErrorCode::UpstreamError, message)
        })
}

fn status_of(resp: &reqwest::Response) -> StatusCode {
    StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY)
}

fn raw_stream_response(resp: reqwest::Response) -> Response {
    let status = status_of(&resp);
    let content_type = resp.headers().get(http::header::CONTENT_TYPE).cloned();

    let body = Body::from_stream(resp.bytes_stream().map(|chunk| chunk.map_err(|err| io::Error::other(err.to_string()))));

    let mut builder = Response::builder().status(status);
    if let Some(ct) = content_type {
        builder = builder.header(http::header::CONTENT_TYPE, ct);
    }
    builder.body(body).unwrap_or_else(|_| Response::new(Body::empty()))
}

async fn buffered_response(resp: reqwest::Response, source: Dialect, target: Dialect) -> Response {
    let status = status_of(&resp);
    let content_type = resp.headers().get(http::header::CONTENT_TYPE).cloned();

    let bytes = match resp.bytes().await {
        Ok(bytes) => bytes,
        Err(err) => return error_response(ErrorEnvelope::new(ErrorCode::UpstreamError, format!("failed to read upstream response body: {err}"))),
    };

    if source == target {
        return raw_bytes_response(status, content_type, bytes);
    }

    let transcoded = serde_json::from_slice::<Value>(&bytes)
        .ok()
        .and_then(|json| dialect::decode_response(target, &json).ok())
        .and_then(|internal| dialect::encode_response(source, &internal).ok())
        .and_then(|value| serde_json::to_vec(&value).ok());

    match transcoded {
        Some(body) => raw_bytes_response(status, Some(HeaderValue::from_static("application/json")), Bytes::from(body)),
        None => {
            log::warn!("response transcoding {target}->{source} failed; forwarding upstream body unchanged");
            raw_bytes_response(status, content_type, bytes)
        }
    }
}

fn raw_bytes_response(status: StatusCode, content_type: Option<HeaderValue>, bytes: Bytes) -> Response {
    let mut builder = Response::builder().status(status);
    if let Some(ct) = content_type {
        builder = builder.header(http::header::CONTENT_TYPE, ct);
    }
    builder.body(Body::from(bytes)).unwrap_or_else(|_| Response::new(Body::empty()))
}

fn streaming_response(resp: reqwest::Response, source: Dialect, target: Dialect) -> Response {
    let status = status_of(&resp);

    let byte_stream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>> = Box::pin(resp.bytes_stream());
    let state = TranscodeState {
        byte_stream,
        transcoder: Some(Transcoder::new(target, source)),
        leftover: Vec::new(),
    };

    let stream = futures_util::stream::unfold(state, next_chunk);

    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "text/event-stream")
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

struct TranscodeState {
    byte_stream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    /// `None` once the upstream stream has ended and the trailing frame (if
    /// any) has already been flushed; the next poll then yields `None`.
    transcoder: Option<Transcoder>,
    /// Bytes left over from a chunk boundary that split a multi-byte UTF-8
    /// character; carried forward and prepended to the next chunk.
    leftover: Vec<u8>,
}

async fn next_chunk(mut state: TranscodeState) -> Option<(Result<Bytes, io::Error>, TranscodeState)> {
    loop {
        let Some(mut transcoder) = state.transcoder.take() else {
            return None;
        };

        match state.byte_stream.next().await {
            Some(Ok(chunk)) => {
                let text = decode_utf8_incremental(&mut state.leftover, &chunk);
                if text.is_empty() {
                    state.transcoder = Some(transcoder);
                    continue;
                }

                match transcoder.push(&text) {
                    Ok(out) => {
                        state.transcoder = Some(transcoder);
                        if out.is_empty() {
                            continue;
                        }
                        return Some((Ok(Bytes::from(out)), state));
                    }
                    Err(err) => return Some((Err(io::Error::new(io::ErrorKind::InvalidData, err.to_string())), state)),
                }
            }
            Some(Err(err)) => return Some((Err(io::Error::other(err.to_string())), state)),
            None => {
                let out = transcoder.finish().unwrap_or_else(|err| {
                    log::debug!("stream transcoder: failed to flush trailing frame: {err}");
                    String::new()
                });
                if out.is_empty() {
                    return None;
                }
                return Some((Ok(Bytes::from(out)), state));
            }
        }
    }
}

/// Append `chunk` to `leftover` and decode as much valid UTF-8 as possible,
/// keeping any trailing incomplete multi-byte sequence in `leftover` for the
/// next call rather than lossily replacing it.
fn decode_utf8_incremental(leftover: &mut Vec<u8>, chunk: &[u8]) -> String {
    leftover.extend_from_slice(chunk);

    match std::str::from_utf8(leftover) {
        Ok(s) => {
            let out = s.to_string();
            leftover.clear();
            out
        }
        Err(err) => {
            let valid_up_to = err.valid_up_to();
            let out = String::from_utf8(leftover[..valid_up_to].to_vec()).expect("valid_up_to always points at a UTF-8 boundary");
            leftover.drain(..valid_up_to);
            out
        }
    }
}
