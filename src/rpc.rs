//! On-demand query protocol over the backend stream.
//!
//! # Protocol
//!
//! Request: `{"id": <string|number>, "method": "get_last_n", "params": {"n": 5}}`
//!
//! Every recognized request is answered with an acknowledgment frame
//! `{"id":...,"result":"ok"}` followed by one frame holding newline-delimited
//! readings `{"ts":<ms>,"sensor":<name>,"value":<number>}`. Unknown methods get
//! `{"id":...,"error":"unknown_method"}`. Requests without an id or method are
//! dropped without a reply.

use crate::sensor::SensorSource;
use log::{debug, info};
use serde::Serialize;
use serde_json::Value;

/// Samples returned by `get_last_n` when `params.n` is absent.
pub const DEFAULT_LAST_N: i64 = 10;

/// Upper bound for `params.n`.
pub const MAX_LAST_N: i64 = 200;

/// Spacing of synthesized history samples.
pub const HISTORY_STEP_MS: u64 = 500;

/// Error kind for unrecognized methods.
pub const UNKNOWN_METHOD: &str = "unknown_method";

/// A parsed request.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    /// Echoed back unchanged.
    pub id: Value,
    pub method: RpcMethod,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcMethod {
    /// History of `n` samples ending now.
    GetLastN { n: u32 },
    /// One sample for the current instant.
    GetLatest,
    Unknown(String),
}

impl RpcRequest {
    /// Parse a request object. `None` when there is nothing to reply to.
    pub fn parse(msg: &Value) -> Option<Self> {
        let id = msg.get("id")?;
        if id.is_null() || id.as_str() == Some("") {
            return None;
        }
        let method = msg.get("method").and_then(Value::as_str)?;

        let method = match method {
            "" => return None,
            "get_last_n" => {
                let n = msg
                    .get("params")
                    .and_then(|p| p.get("n"))
                    .and_then(Value::as_i64)
                    .unwrap_or(DEFAULT_LAST_N)
                    .clamp(1, MAX_LAST_N);
                RpcMethod::GetLastN { n: n as u32 }
            }
            "get_latest" => RpcMethod::GetLatest,
            other => RpcMethod::Unknown(other.to_string()),
        };

        Some(Self {
            id: id.clone(),
            method,
        })
    }
}

#[derive(Serialize)]
struct Reply<'a> {
    id: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
}

#[derive(Serialize)]
struct Reading<'a> {
    ts: u64,
    sensor: &'a str,
    value: f64,
}

/// Round to two decimals for the wire.
fn two_decimals(v: f32) -> f64 {
    (f64::from(v) * 100.0).round() / 100.0
}

/// Answers requests using readings from a [`SensorSource`].
pub struct RpcHandler<S: SensorSource> {
    sensors: S,
}

impl<S: SensorSource> RpcHandler<S> {
    pub fn new(sensors: S) -> Self {
        Self { sensors }
    }

    /// Handle one inbound request. Returns the frames to send, in order.
    pub fn handle(&mut self, msg: &Value, now_ms: u64) -> Vec<String> {
        let Some(request) = RpcRequest::parse(msg) else {
            debug!("Dropping malformed request");
            return Vec::new();
        };

        match request.method {
            RpcMethod::GetLastN { n } => {
                let mut batch = String::with_capacity(n as usize * 3 * 64);
                for i in (0..u64::from(n)).rev() {
                    let ts = now_ms.saturating_sub(i * HISTORY_STEP_MS);
                    self.append_sample(&mut batch, ts);
                }
                info!("Sending last {} samples ({} lines)", n, n * 3);
                vec![ack(&request.id), batch]
            }
            RpcMethod::GetLatest => {
                let mut batch = String::new();
                self.append_sample(&mut batch, now_ms);
                info!("Sending latest sample");
                vec![ack(&request.id), batch]
            }
            RpcMethod::Unknown(name) => {
                info!("Unknown RPC method: {}", name);
                vec![error_reply(&request.id, UNKNOWN_METHOD)]
            }
        }
    }

    fn append_sample(&mut self, batch: &mut String, ts: u64) {
        let sample = self.sensors.sample_at(ts);
        for (sensor, value) in sample.channels() {
            let line = Reading {
                ts,
                sensor,
                value: two_decimals(value),
            };
            if let Ok(json) = serde_json::to_string(&line) {
                batch.push_str(&json);
                batch.push('\n');
            }
        }
    }
}

fn encode_reply(reply: &Reply<'_>) -> String {
    serde_json::to_string(reply).unwrap_or_default()
}

fn ack(id: &Value) -> String {
    encode_reply(&Reply {
        id,
        result: Some("ok"),
        error: None,
    })
}

fn error_reply(id: &Value, kind: &'static str) -> String {
    encode_reply(&Reply {
        id,
        result: None,
        error: Some(kind),
    })
}
