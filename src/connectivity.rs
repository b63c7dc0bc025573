//! Network reachability tracking.
//!
//! The platform side owns a [`ConnectivitySource`] and reports changes to
//! it; each stream that gates delivery on reachability takes its own
//! [`ConnectivityMonitor`] via [`ConnectivitySource::subscribe`]. Only the
//! latest state is kept. Dropping a monitor is its unsubscription.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Writer half of the reachability signal.
#[derive(Clone, Debug)]
pub struct ConnectivitySource {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivitySource {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        ConnectivitySource { tx: Arc::new(tx) }
    }

    /// The process-wide source used by default-built streams.
    ///
    /// Starts online; the application reports the real state through
    /// [`ConnectivitySource::set_online`] once its platform listener runs.
    pub fn global() -> ConnectivitySource {
        static GLOBAL: OnceLock<ConnectivitySource> = OnceLock::new();
        GLOBAL.get_or_init(|| ConnectivitySource::new(true)).clone()
    }

    /// Report the current reachability. Monitors observe it immediately.
    pub fn set_online(&self, online: bool) {
        let previous = self.tx.send_replace(online);
        if previous != online {
            debug!(online, "connectivity changed");
        }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Create a new monitor bound to this source.
    pub fn subscribe(&self) -> ConnectivityMonitor {
        ConnectivityMonitor {
            rx: self.tx.subscribe(),
        }
    }

    /// Drive this source from a periodic TCP connect probe against `addr`.
    ///
    /// Useful where no native reachability API exists. The probe runs until
    /// the returned handle is aborted. Fails when called outside a Tokio
    /// runtime.
    pub fn spawn_tcp_probe(&self, addr: String, interval: Duration) -> Result<JoinHandle<()>, TryCurrentError> {
        let runtime = Handle::try_current()?;
        let source = self.clone();
        let connect_timeout = interval.min(Duration::from_secs(5));
        Ok(runtime.spawn(async move {
            loop {
                let online = matches!(
                    tokio::time::timeout(connect_timeout, TcpStream::connect(addr.as_str())).await,
                    Ok(Ok(_))
                );
                source.set_online(online);
                tokio::time::sleep(interval).await;
            }
        }))
    }
}

/// Reader half of the reachability signal, owned by a single stream.
#[derive(Debug)]
pub struct ConnectivityMonitor {
    rx: watch::Receiver<bool>,
}

impl ConnectivityMonitor {
    pub fn is_online(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the source reports online.
    ///
    /// Returns `false` if the source went away while offline, in which case
    /// the state can no longer change.
    pub async fn wait_online(&mut self) -> bool {
        if self.rx.wait_for(|online| *online).await.is_ok() {
            return true;
        }
        self.is_online()
    }
}
