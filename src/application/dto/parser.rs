// src/application/dto/parser.rs
// Parsers for inbound stream records

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use std::str::FromStr;

use crate::domain::errors::{EnrichmentError, EnrichmentResult};
use crate::domain::models::PriceObservation;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse one JSON stream record into a validated observation
pub fn parse_observation(payload: &str) -> EnrichmentResult<PriceObservation> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| EnrichmentError::InvalidJson(e.to_string()))?;

    let object = value
        .as_object()
        .ok_or_else(|| EnrichmentError::InvalidJson("expected a JSON object".to_string()))?;

    let symbol = required(object, "symbol")?
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid("symbol", "must be a non-empty string"))?
        .to_string();

    Ok(PriceObservation {
        symbol,
        timestamp: parse_timestamp(required(object, "timestamp")?)?,
        open: parse_price(object, "open")?,
        high: parse_price(object, "high")?,
        low: parse_price(object, "low")?,
        price: parse_price(object, "price")?,
        previous_close: parse_price(object, "previous_close")?,
        volume: parse_volume(required(object, "volume")?)?,
    })
}

/// Best-effort symbol and timestamp of a payload, for rejection logs
pub fn peek_identity(payload: &str) -> (Option<String>, Option<String>) {
    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(_) => return (None, None),
    };

    let text = |field: &str| {
        value.get(field).and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    };

    (text("symbol"), text("timestamp"))
}

fn required<'a>(object: &'a Map<String, Value>, field: &str) -> EnrichmentResult<&'a Value> {
    match object.get(field) {
        None | Some(Value::Null) => Err(EnrichmentError::MissingField(field.to_string())),
        Some(value) => Ok(value),
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> EnrichmentError {
    EnrichmentError::InvalidField {
        field: field.to_string(),
        reason: reason.into(),
    }
}

fn parse_decimal_text(text: &str) -> Option<Decimal> {
    let text = text.trim();
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

fn parse_price(object: &Map<String, Value>, field: &str) -> EnrichmentResult<Decimal> {
    let value = required(object, field)?;

    let decimal = match value {
        Value::Number(n) => parse_decimal_text(&n.to_string()),
        Value::String(s) => parse_decimal_text(s),
        _ => None,
    }
    .ok_or_else(|| invalid(field, format!("not a number: {}", value)))?;

    if decimal.is_sign_negative() && !decimal.is_zero() {
        return Err(invalid(field, format!("must be non-negative, got {}", decimal)));
    }

    Ok(decimal)
}

fn parse_volume(value: &Value) -> EnrichmentResult<u64> {
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                return Ok(v);
            }
            match n.as_f64() {
                Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => Ok(f as u64),
                _ => Err(invalid(
                    "volume",
                    format!("must be a non-negative integer, got {}", n),
                )),
            }
        }
        Value::String(s) => s.trim().parse::<u64>().map_err(|_| {
            invalid("volume", format!("must be a non-negative integer, got {:?}", s))
        }),
        other => Err(invalid("volume", format!("not a number: {}", other))),
    }
}

/// Years outside 0000-9999 have no fixed-width RFC 3339 form and would break key ordering
fn parse_timestamp(value: &Value) -> EnrichmentResult<DateTime<Utc>> {
    let timestamp = match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Ok(ts.with_timezone(&Utc));
            }
            NAIVE_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
                .map(|naive| naive.and_utc())
                .ok_or_else(|| invalid("timestamp", format!("unrecognised timestamp {:?}", s)))
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| invalid("timestamp", format!("invalid epoch milliseconds {}", n))),
        other => Err(invalid("timestamp", format!("unsupported type: {}", other))),
    }?;

    if !(0..=9999).contains(&timestamp.year()) {
        return Err(invalid(
            "timestamp",
            format!("year {} outside 0000-9999", timestamp.year()),
        ));
    }
    Ok(timestamp)
}
