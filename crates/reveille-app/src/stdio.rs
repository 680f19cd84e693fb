//! Line protocol on stdin/stdout: one `MethodCall` JSON object per input
//! line, one `MethodResult` JSON object per output line.

use reveille_engine::bridge;
use reveille_engine::{AlarmService, MethodCall, MethodResult};
use std::io::{self, Write};

/// Decode and dispatch one request line.
///
/// Returns `None` for blank lines. Lines that are not a valid `MethodCall`
/// get an `invalid_request` error instead of being dropped.
pub fn dispatch_line(service: &AlarmService, line: &str) -> Option<MethodResult> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let result = match serde_json::from_str::<MethodCall>(line) {
        Ok(call) => {
            tracing::debug!(method = %call.method, "Method call received");
            bridge::handle(service, &call)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Malformed method call");
            MethodResult::Error {
                code: "invalid_request".to_string(),
                message: e.to_string(),
            }
        }
    };
    Some(result)
}

pub fn write_result<W: Write>(out: &mut W, result: &MethodResult) -> io::Result<()> {
    let mut line = serde_json::to_vec(result)?;
    line.push(b'\n');
    out.write_all(&line)?;
    out.flush()
}
