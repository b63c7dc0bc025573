use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::warn;

use crate::capabilities::Capabilities;
use crate::record::LogRecord;
use crate::stream::LogStream;

/// Method name invoked on the application server for every record.
pub const LOG_CLIENT_METHOD: &str = "logClient";

/// Reports records to the application server through the injected RPC
/// invoker.
///
/// Arguments are `(level, message, logCode, extraInfo[, userInfo])`; the
/// trailing `userInfo` is only sent while the auth context reports an
/// active meeting. A failing or panicking invoker is reported as a `warn`
/// event on the local subscriber and otherwise ignored.
pub struct RpcStream {
    capabilities: Arc<Capabilities>,
}

impl RpcStream {
    pub fn new(capabilities: Arc<Capabilities>) -> Self {
        RpcStream { capabilities }
    }

    fn arguments(&self, record: &LogRecord) -> Vec<Value> {
        let mut args = vec![
            Value::from(record.level.as_str()),
            Value::from(record.message.as_str()),
            record.log_code.clone().map(Value::from).unwrap_or(Value::Null),
            record
                .extra_info
                .clone()
                .unwrap_or_else(|| Value::Object(Map::new())),
        ];
        if let Some(auth) = self.capabilities.auth_info().filter(|a| a.has_active_meeting()) {
            if let Ok(user_info) = serde_json::to_value(auth) {
                args.push(user_info);
            }
        }
        args
    }
}

impl LogStream for RpcStream {
    fn name(&self) -> &'static str {
        "server"
    }

    fn write(&self, record: &LogRecord) {
        let args = self.arguments(record);
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.capabilities.invoke_rpc(LOG_CLIENT_METHOD, &args)
        }));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "logger rpc call failed"),
            Err(_) => warn!("logger rpc invoker panicked"),
        }
    }
}
