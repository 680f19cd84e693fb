//! Method-call bridge between a UI layer and the alarm service.
//!
//! Requests are `{"method": ..., "arguments": {...}}` objects; every request
//! gets exactly one [`MethodResult`]. Ids default to `0` so a single-alarm
//! client can omit them.

use crate::error::BridgeError;
use crate::service::AlarmService;
use reveille_core::types::{AlarmId, Resolution};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One request from the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }
}

/// The answer to a [`MethodCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MethodResult {
    Success {
        #[serde(default)]
        result: Value,
    },
    Error {
        code: String,
        message: String,
    },
    NotImplemented {
        method: String,
    },
}

impl MethodResult {
    pub fn is_success(&self) -> bool {
        matches!(self, MethodResult::Success { .. })
    }
}

impl From<BridgeError> for MethodResult {
    fn from(err: BridgeError) -> Self {
        MethodResult::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Dispatch one call against the service.
pub fn handle(service: &AlarmService, call: &MethodCall) -> MethodResult {
    let outcome = match call.method.as_str() {
        "setAlarm" => set_alarm(service, &call.arguments),
        "cancelAlarm" => cancel_alarm(service, &call.arguments),
        "snoozeAlarm" => resolve(service, &call.arguments, Resolution::Snooze),
        "stopAlarm" => resolve(service, &call.arguments, Resolution::Stop),
        "getAlarm" => get_alarm(service, &call.arguments),
        "listAlarms" => to_value(&service.alarms()),
        "setExactAlarmPermission" => set_permission(service, &call.arguments),
        other => {
            tracing::debug!(method = %other, "Unknown bridge method");
            return MethodResult::NotImplemented {
                method: other.to_string(),
            };
        }
    };

    match outcome {
        Ok(result) => MethodResult::Success { result },
        Err(e) => {
            tracing::debug!(method = %call.method, error = %e, "Bridge call failed");
            e.into()
        }
    }
}

/// `setAlarm { id?, time, vibrate? }`.
///
/// `time` is required (epoch millis). A call without it is rejected with
/// `invalid_arguments` rather than booking an alarm at the epoch.
fn set_alarm(service: &AlarmService, args: &Value) -> Result<Value, BridgeError> {
    let id = alarm_id(args)?;
    let time = required_i64(args, "time")?;
    let vibrate = optional_bool(args, "vibrate")?.unwrap_or(true);

    service.schedule_alarm(id, time, vibrate)?;
    to_value(&service.alarm(id)?)
}

fn cancel_alarm(service: &AlarmService, args: &Value) -> Result<Value, BridgeError> {
    service.cancel_alarm(alarm_id(args)?)?;
    Ok(Value::Null)
}

fn resolve(service: &AlarmService, args: &Value, action: Resolution) -> Result<Value, BridgeError> {
    let event = service.resolve(alarm_id(args)?, action)?;
    to_value(&event)
}

fn get_alarm(service: &AlarmService, args: &Value) -> Result<Value, BridgeError> {
    to_value(&service.alarm(alarm_id(args)?)?)
}

fn set_permission(service: &AlarmService, args: &Value) -> Result<Value, BridgeError> {
    let granted = optional_bool(args, "granted")?.ok_or(BridgeError::MissingArgument("granted"))?;
    service.set_exact_alarms_permitted(granted);
    Ok(json!({ "granted": granted }))
}

// =============================================================================
// Argument decoding
// =============================================================================

fn alarm_id(args: &Value) -> Result<AlarmId, BridgeError> {
    match args.get("id") {
        None | Some(Value::Null) => Ok(AlarmId(0)),
        Some(v) => v.as_i64().map(AlarmId).ok_or(BridgeError::InvalidArgument {
            name: "id",
            reason: format!("expected integer, got {}", v),
        }),
    }
}

fn required_i64(args: &Value, name: &'static str) -> Result<i64, BridgeError> {
    let v = args.get(name).ok_or(BridgeError::MissingArgument(name))?;
    v.as_i64().ok_or(BridgeError::InvalidArgument {
        name,
        reason: format!("expected integer, got {}", v),
    })
}

fn optional_bool(args: &Value, name: &'static str) -> Result<Option<bool>, BridgeError> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_bool().map(Some).ok_or(BridgeError::InvalidArgument {
            name,
            reason: format!("expected boolean, got {}", v),
        }),
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, BridgeError> {
    Ok(serde_json::to_value(value)?)
}
