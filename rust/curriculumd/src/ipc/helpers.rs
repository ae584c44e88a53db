use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::planning::MAX_UNIT_INDEX;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, JsonValue> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, JsonValue> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn required_unit_index(req: &Request, key: &str) -> Result<u32, JsonValue> {
    let raw = req
        .params
        .get(key)
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))?;
    raw.as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n <= MAX_UNIT_INDEX)
        .ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be an integer in 0..={}", key, MAX_UNIT_INDEX),
                None,
            )
        })
}

pub fn parse_opt_string(v: Option<&JsonValue>) -> Result<Option<String>, &'static str> {
    match v {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let s = v.as_str().ok_or("must be string or null")?.trim().to_string();
            if s.is_empty() {
                Ok(None)
            } else {
                Ok(Some(s))
            }
        }
    }
}

pub fn parse_iso_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| format!("invalid date `{}`; expected YYYY-MM-DD", raw.trim()))
}

pub fn parse_opt_date(v: Option<&JsonValue>) -> Result<Option<NaiveDate>, String> {
    match parse_opt_string(v) {
        Ok(None) => Ok(None),
        Ok(Some(s)) => parse_iso_date(&s).map(Some),
        Err(m) => Err(m.to_string()),
    }
}

pub fn parse_string_array(v: Option<&JsonValue>) -> Result<Vec<String>, &'static str> {
    match v {
        None => Ok(Vec::new()),
        Some(v) if v.is_null() => Ok(Vec::new()),
        Some(v) => {
            let arr = v.as_array().ok_or("must be array of strings")?;
            let mut out = Vec::with_capacity(arr.len());
            for item in arr {
                let s = item
                    .as_str()
                    .ok_or("must be array of strings")?
                    .trim()
                    .to_string();
                if !s.is_empty() && !out.contains(&s) {
                    out.push(s);
                }
            }
            Ok(out)
        }
    }
}

/// Deserializes `params[key]` into a typed snapshot value.
pub fn required_typed<T: DeserializeOwned>(req: &Request, key: &str) -> Result<T, JsonValue> {
    let raw = req
        .params
        .get(key)
        .filter(|v| !v.is_null())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))?;
    serde_json::from_value(raw.clone())
        .map_err(|e| err(&req.id, "bad_params", format!("{} is malformed: {}", key, e), None))
}
