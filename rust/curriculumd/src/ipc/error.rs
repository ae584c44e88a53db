use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let message = message.into();
    log::debug!("event=request_failed id={} code={} message={}", id, code, message);
    let mut error = json!({
        "code": code,
        "message": message,
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Envelope for a store failure, logged at warn since it is never the
/// caller's fault.
pub fn db_err(id: &str, code: &str, e: anyhow::Error) -> serde_json::Value {
    log::warn!("event=db_error id={} code={} error={:#}", id, code, e);
    err(id, code, format!("{e:#}"), None)
}
