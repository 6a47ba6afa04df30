//! The per-request orchestrator: extract config, detect the caller's wire
//! dialect, run moderation against the decoded text, re-encode if asked to,
//! and forward on to the upstream provider.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::response::Response;
use dialect::{Dialect, DetectionMode, DetectionRequest};
use proxy_config::{ErrorCode, ErrorEnvelope, FromSpec, RequestConfig};
use serde_json::Value;

use crate::forward;
use crate::moderate;
use crate::state::AppState;

const ALL_DIALECTS: [Dialect; 4] = [Dialect::OpenaiChat, Dialect::OpenaiResponses, Dialect::ClaudeChat, Dialect::GeminiChat];

/// Axum handler mounted as the catch-all route: every request that isn't the
/// health check lands here.
pub async fn handle(State(state): State<Arc<AppState>>, request: axum::extract::Request) -> Response {
    match run(&state, request).await {
        Ok(response) => response,
        Err(envelope) => error_response(envelope),
    }
}

pub fn error_response(envelope: ErrorEnvelope) -> Response {
    let status = axum::http::StatusCode::from_u16(envelope.status()).unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::to_vec(&envelope).unwrap_or_else(|_| b"{}".to_vec());

    Response::builder()
        .status(status)
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

async fn run(state: &AppState, request: axum::extract::Request) -> Result<Response, ErrorEnvelope> {
    let raw_target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().to_string());
    let method = request.method().clone();
    let headers = request.headers().clone();

    let extracted = proxy_config::extract(&raw_target)?;
    let config = extracted.config;
    let upstream = extracted.upstream;

    let body_bytes = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .map_err(|err| ErrorEnvelope::new(ErrorCode::ProxyError, format!("failed to read request body: {err}")))?;

    let basic_enabled = config.basic_moderation.enabled;
    let smart_enabled = config.smart_moderation.enabled;
    let transform_enabled = config.format_transform.enabled;

    if !basic_enabled && !smart_enabled && !transform_enabled {
        let forward_headers = forward::filter_request_headers(&headers);
        return Ok(forward::passthrough(&state.http, method, forward_headers, upstream, body_bytes, state.guardian.upstream_timeout).await);
    }

    let body_json: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).map_err(|err| ErrorEnvelope::new(ErrorCode::TransformError, format!("request body is not valid JSON: {err}")))?
    };

    let lower_headers: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_ascii_lowercase(), v.to_string())))
        .collect();

    let Some(source_dialect) = identify_dialect(&config, &upstream, &lower_headers, &body_json)? else {
        // No dialect could be identified and strict_parse is off: nothing to
        // moderate or transform against, so this request bypasses both stages.
        let forward_headers = forward::filter_request_headers(&headers);
        return Ok(forward::passthrough(&state.http, method, forward_headers, upstream, body_bytes, state.guardian.upstream_timeout).await);
    };

    let stream_hint = upstream.path().contains(":streamGenerateContent");
    let internal_request = dialect::decode_request(source_dialect, &body_json, stream_hint)
        .map_err(|err| ErrorEnvelope::new(ErrorCode::TransformError, err.to_string()).with_source_format(source_dialect.as_str()))?;

    let decision = moderate_request(state, &config, &internal_request, basic_enabled, smart_enabled).await?;
    if decision.blocked {
        return Err(blocked_envelope(&decision, source_dialect));
    }

    let (outgoing_body, effective_target) = reencode_request(&config, source_dialect, &internal_request, &body_bytes, transform_enabled);

    let stream = config.format_transform.stream.resolve(internal_request.stream);
    let forward_headers = forward::filter_request_headers(&headers);

    Ok(forward::send_and_transcode(
        &state.http,
        method,
        forward_headers,
        upstream,
        outgoing_body,
        source_dialect,
        effective_target,
        stream,
        state.guardian.upstream_timeout,
    )
    .await)
}

fn identify_dialect(config: &RequestConfig, upstream: &url::Url, headers: &HashMap<String, String>, body: &Value) -> Result<Option<Dialect>, ErrorEnvelope> {
    let allowed = config.format_transform.from.allowed().unwrap_or_else(|| ALL_DIALECTS.to_vec());
    let mode = if config.format_transform.strict_parse {
        DetectionMode::Strict
    } else {
        DetectionMode::PassThroughOnMiss
    };

    let detection_request = DetectionRequest {
        path: upstream.path(),
        host: upstream.host_str(),
        headers,
        body,
    };

    dialect::detect(&detection_request, &allowed, mode).map_err(|err| {
        let envelope = ErrorEnvelope::new(ErrorCode::TransformError, err.to_string());
        match &config.format_transform.from {
            FromSpec::Single(name) if name != "auto" => envelope.with_source_format(name.clone()),
            _ => envelope,
        }
    })
}

async fn moderate_request(
    state: &AppState,
    config: &RequestConfig,
    internal_request: &dialect::InternalChatRequest,
    basic_enabled: bool,
    smart_enabled: bool,
) -> Result<moderation::Decision, ErrorEnvelope> {
    let profile = moderate::resolve_profile(&state.guardian, config).map_err(|err| ErrorEnvelope::new(ErrorCode::ConfigParseError, format!("moderation profile error: {err}")))?;
    let keywords_path = moderate::resolve_keywords_path(&state.guardian, config);
    let text = moderation::text::project(internal_request);

    Ok(moderate::evaluate_and_record(&state.http, profile.as_ref(), &keywords_path, &text, basic_enabled, smart_enabled).await)
}

fn blocked_envelope(decision: &moderation::Decision, source_dialect: Dialect) -> ErrorEnvelope {
    let message = match decision.stage {
        moderation::Stage::Basic => {
            let keyword = decision.category.as_deref().and_then(|c| c.strip_prefix("keyword:")).unwrap_or("unknown");
            format!("request blocked by keyword filter: {keyword}")
        }
        _ => match &decision.category {
            Some(category) => format!("request blocked by moderation policy (category: {category})"),
            None => "request blocked by moderation policy".to_string(),
        },
    };

    ErrorEnvelope::new(ErrorCode::ModerationBlocked, message).with_source_format(source_dialect.as_str())
}

/// Re-encode into the requested target dialect, falling back to the original
/// source body unchanged if encoding fails or the transform is disabled.
fn reencode_request(
    config: &RequestConfig,
    source_dialect: Dialect,
    internal_request: &dialect::InternalChatRequest,
    source_body: &axum::body::Bytes,
    transform_enabled: bool,
) -> (axum::body::Bytes, Dialect) {
    if !transform_enabled {
        return (source_body.clone(), source_dialect);
    }

    let target_dialect = config.format_transform.to_dialect().unwrap_or(source_dialect);

    match dialect::encode_request(target_dialect, internal_request) {
        Ok(value) => match serde_json::to_vec(&value) {
            Ok(bytes) => (axum::body::Bytes::from(bytes), target_dialect),
            Err(err) => {
                log::warn!("dialect bridge: failed to serialize encoded request for {target_dialect} ({err}); forwarding source body unchanged");
                (source_body.clone(), source_dialect)
            }
        },
        Err(err) => {
            log::warn!("dialect bridge: failed to encode request into {target_dialect} ({err}); forwarding source body unchanged");
            (source_body.clone(), source_dialect)
        }
    }
}
