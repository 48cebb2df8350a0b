use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::{NetworkObserver, NetworkStatus, StatusSink};
use crate::error::ConnectivityError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Observer that polls TCP reachability of a single host.
///
/// Used where no platform connectivity callback exists (the CLI). Until the
/// first probe completes the host is assumed reachable.
pub struct TcpProbeObserver {
    addr: String,
    interval: Duration,
    online: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TcpProbeObserver {
    pub fn new(host: &str, port: u16, interval: Duration) -> Self {
        Self {
            addr: format!("{}:{}", host, port),
            interval,
            online: Arc::new(AtomicBool::new(true)),
            task: Mutex::new(None),
        }
    }

    /// Probe the host and port of `url` (default port by scheme).
    pub fn from_url(url: &str, interval: Duration) -> Result<Self, ConnectivityError> {
        let parsed =
            url::Url::parse(url).map_err(|e| ConnectivityError::InvalidTarget(format!("{}: {}", url, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| ConnectivityError::InvalidTarget(format!("{}: missing host", url)))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| ConnectivityError::InvalidTarget(format!("{}: unknown port", url)))?;
        Ok(Self::new(host, port, interval))
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn probe(addr: &str) -> bool {
        matches!(
            tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await,
            Ok(Ok(_))
        )
    }
}

impl NetworkObserver for TcpProbeObserver {
    fn current_status(&self) -> NetworkStatus {
        NetworkStatus::from_online(self.online.load(Ordering::SeqCst))
    }

    fn register(&self, sink: StatusSink) -> Result<(), ConnectivityError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ConnectivityError::Registration(e.to_string()))?;

        let addr = self.addr.clone();
        let interval = self.interval;
        let online = self.online.clone();

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let reachable = Self::probe(&addr).await;
                trace!("Probe {} -> {}", addr, reachable);
                online.store(reachable, Ordering::SeqCst);
                sink.send(NetworkStatus::from_online(reachable));
            }
        });

        if let Some(previous) = self.task.lock().replace(handle) {
            previous.abort();
        }
        debug!("Reachability probe started for {}", self.addr);
        Ok(())
    }

    fn unregister(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
            debug!("Reachability probe stopped for {}", self.addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ConnectivityMonitor;

    #[test]
    fn test_from_url_uses_scheme_default_port() {
        let observer =
            TcpProbeObserver::from_url("https://api.jikan.moe/v4", Duration::from_secs(5)).unwrap();
        assert_eq!(observer.addr(), "api.jikan.moe:443");
    }

    #[test]
    fn test_from_url_explicit_port() {
        let observer =
            TcpProbeObserver::from_url("http://127.0.0.1:8080/v4", Duration::from_secs(5)).unwrap();
        assert_eq!(observer.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_from_url_rejects_garbage() {
        assert!(TcpProbeObserver::from_url("not a url", Duration::from_secs(5)).is_err());
    }

    #[test]
    fn test_registration_without_runtime_still_reports_state() {
        let observer = Arc::new(TcpProbeObserver::new("127.0.0.1", 9, Duration::from_secs(5)));
        let monitor = ConnectivityMonitor::new(observer);
        let _sub = monitor.subscribe();
        assert!(!monitor.is_registered());
    }

    #[tokio::test]
    async fn test_probe_detects_listening_socket() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        assert!(TcpProbeObserver::probe(&addr).await);
    }
}
