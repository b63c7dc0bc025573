//! Runtime-replaceable providers for auth context, session id and RPC.
//!
//! The real providers only exist once the application has finished its
//! session bootstrap, while logging has to work from process start. Every
//! provider therefore starts as a no-op and can be swapped at any time;
//! streams go through [`Capabilities`] on every write and never hold on to
//! a provider or its result.

use arc_swap::ArcSwap;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use tracing::debug;

use crate::record::AuthInfo;

pub type AuthInfoProvider = Box<dyn Fn() -> Option<AuthInfo> + Send + Sync>;
pub type SessionIdProvider = Box<dyn Fn() -> Option<String> + Send + Sync>;
pub type RpcInvoker = Box<dyn Fn(&str, &[Value]) -> Result<(), RpcError> + Send + Sync>;

/// Failure reported by an injected RPC invoker.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("rpc channel is not connected")]
    NotConnected,

    #[error("rpc call `{method}` failed: {message}")]
    Failed { method: String, message: String },
}

/// Holder for the three injectable providers. Last writer wins.
pub struct Capabilities {
    auth_info: ArcSwap<AuthInfoProvider>,
    session_id: ArcSwap<SessionIdProvider>,
    rpc: ArcSwap<RpcInvoker>,
}

impl Capabilities {
    /// A registry with every provider set to its no-op default.
    pub fn new() -> Self {
        Capabilities {
            auth_info: ArcSwap::from_pointee(Box::new(|| -> Option<AuthInfo> { None }) as AuthInfoProvider),
            session_id: ArcSwap::from_pointee(Box::new(|| -> Option<String> { None }) as SessionIdProvider),
            rpc: ArcSwap::from_pointee(Box::new(|_: &str, _: &[Value]| -> Result<(), RpcError> { Ok(()) }) as RpcInvoker),
        }
    }

    /// The process-wide registry used by default-built streams.
    pub fn global() -> Arc<Capabilities> {
        static GLOBAL: OnceLock<Arc<Capabilities>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(Capabilities::new())).clone()
    }

    pub fn set_auth_info_provider<F>(&self, provider: F)
    where
        F: Fn() -> Option<AuthInfo> + Send + Sync + 'static,
    {
        self.auth_info.store(Arc::new(Box::new(provider) as AuthInfoProvider));
    }

    pub fn set_session_id_provider<F>(&self, provider: F)
    where
        F: Fn() -> Option<String> + Send + Sync + 'static,
    {
        self.session_id.store(Arc::new(Box::new(provider) as SessionIdProvider));
    }

    pub fn set_rpc_invoker<F>(&self, invoker: F)
    where
        F: Fn(&str, &[Value]) -> Result<(), RpcError> + Send + Sync + 'static,
    {
        self.rpc.store(Arc::new(Box::new(invoker) as RpcInvoker));
    }

    /// Current auth context, freshly obtained from the installed provider.
    ///
    /// A panicking provider counts as having no context.
    pub fn auth_info(&self) -> Option<AuthInfo> {
        let provider = self.auth_info.load_full();
        catch_unwind(AssertUnwindSafe(|| (**provider)())).unwrap_or_else(|_| {
            debug!("auth info provider panicked");
            None
        })
    }

    /// Current session (connection) id. A panicking provider yields `None`.
    pub fn session_id(&self) -> Option<String> {
        let provider = self.session_id.load_full();
        catch_unwind(AssertUnwindSafe(|| (**provider)())).unwrap_or_else(|_| {
            debug!("session id provider panicked");
            None
        })
    }

    /// Invoke `method` through the installed RPC invoker.
    pub fn invoke_rpc(&self, method: &str, args: &[Value]) -> Result<(), RpcError> {
        let invoker = self.rpc.load_full();
        (**invoker)(method, args)
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities::new()
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities").finish_non_exhaustive()
    }
}

/// Install the auth context provider on the process-wide registry.
pub fn set_auth_info_provider<F>(provider: F)
where
    F: Fn() -> Option<AuthInfo> + Send + Sync + 'static,
{
    Capabilities::global().set_auth_info_provider(provider);
}

/// Install the session id provider on the process-wide registry.
pub fn set_session_id_provider<F>(provider: F)
where
    F: Fn() -> Option<String> + Send + Sync + 'static,
{
    Capabilities::global().set_session_id_provider(provider);
}

/// Install the RPC invoker on the process-wide registry.
pub fn set_rpc_invoker<F>(invoker: F)
where
    F: Fn(&str, &[Value]) -> Result<(), RpcError> + Send + Sync + 'static,
{
    Capabilities::global().set_rpc_invoker(invoker);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn defaults_are_no_ops() {
        let caps = Capabilities::new();
        assert_eq!(caps.auth_info(), None);
        assert_eq!(caps.session_id(), None);
        assert_eq!(caps.invoke_rpc("logClient", &[json!("info")]), Ok(()));
    }

    #[test]
    fn last_installed_provider_wins() {
        let caps = Capabilities::new();
        caps.set_session_id_provider(|| Some("first".into()));
        caps.set_session_id_provider(|| Some("second".into()));
        assert_eq!(caps.session_id().as_deref(), Some("second"));
    }

    #[test]
    fn providers_are_called_on_every_read() {
        let caps = Capabilities::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        caps.set_auth_info_provider(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            Some(AuthInfo {
                host: Some(format!("host-{n}")),
                ..AuthInfo::default()
            })
        });

        assert_eq!(caps.auth_info().unwrap().host.as_deref(), Some("host-0"));
        assert_eq!(caps.auth_info().unwrap().host.as_deref(), Some("host-1"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn rpc_invoker_receives_method_and_args() {
        let caps = Capabilities::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        caps.set_rpc_invoker(move |method, args| {
            sink.lock().unwrap().push((method.to_string(), args.to_vec()));
            Ok(())
        });

        caps.invoke_rpc("logClient", &[json!("warn"), json!("msg")]).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "logClient");
        assert_eq!(seen[0].1, vec![json!("warn"), json!("msg")]);
    }

    #[test]
    fn panicking_providers_read_as_absent() {
        let caps = Capabilities::new();
        caps.set_auth_info_provider(|| panic!("auth store gone"));
        caps.set_session_id_provider(|| panic!("socket gone"));
        assert_eq!(caps.auth_info(), None);
        assert_eq!(caps.session_id(), None);

        caps.set_session_id_provider(|| Some("back".into()));
        assert_eq!(caps.session_id().as_deref(), Some("back"));
    }
}
