//! Pool of interchangeable backend hosts.
//!
//! Local inference backends expose a fixed set of base URLs, each of which
//! must serve at most one job at a time. Callers check a host out for the
//! full duration of a job and the lease returns it on drop, so a host goes
//! back into rotation on every exit path, including panics and early `?`
//! returns.

use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// Fixed-size pool of host base URLs.
pub struct HostPool {
    returns: mpsc::UnboundedSender<String>,
    available: Mutex<mpsc::UnboundedReceiver<String>>,
    size: usize,
}

impl HostPool {
    /// Build a pool from a list of host base URLs. The list must be
    /// non-empty; an empty pool would deadlock every caller.
    pub fn new(hosts: Vec<String>) -> EngineResult<Self> {
        if hosts.is_empty() {
            return Err(EngineError::config("host pool requires at least one host"));
        }
        let size = hosts.len();
        let (tx, rx) = mpsc::unbounded_channel();
        for host in hosts {
            // The receiver is live, so send cannot fail here.
            tx.send(host)
                .map_err(|_| EngineError::config("host pool channel closed during init"))?;
        }
        Ok(Self {
            returns: tx,
            available: Mutex::new(rx),
            size,
        })
    }

    /// Number of hosts the pool was built with.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Wait for a free host and lease it. Waiters are served roughly in
    /// arrival order.
    pub async fn acquire(&self) -> EngineResult<HostLease> {
        let mut rx = self.available.lock().await;
        let host = rx
            .recv()
            .await
            .ok_or_else(|| EngineError::config("host pool channel closed"))?;
        debug!(host = %host, "leased backend host");
        Ok(HostLease {
            host: Some(host),
            returns: self.returns.clone(),
        })
    }
}

/// Exclusive lease on one pool host. Returns the host on drop.
pub struct HostLease {
    host: Option<String>,
    returns: mpsc::UnboundedSender<String>,
}

impl HostLease {
    /// Base URL of the leased host.
    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or_default()
    }
}

impl Drop for HostLease {
    fn drop(&mut self) {
        if let Some(host) = self.host.take() {
            debug!(host = %host, "returned backend host");
            let _ = self.returns.send(host);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn empty_pool_rejected() {
        assert!(HostPool::new(vec![]).is_err());
    }

    #[tokio::test]
    async fn lease_returns_host_on_drop() {
        let pool = HostPool::new(vec!["http://a:8188".to_string()]).unwrap();

        let lease = pool.acquire().await.unwrap();
        assert_eq!(lease.host(), "http://a:8188");
        drop(lease);

        // The same host is available again.
        let lease = pool.acquire().await.unwrap();
        assert_eq!(lease.host(), "http://a:8188");
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_blocks_until_release() {
        let pool = Arc::new(
            HostPool::new(vec!["http://a:8188".to_string()]).unwrap(),
        );

        let held = pool.acquire().await.unwrap();

        let waiter = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.acquire().await.unwrap().host().to_string() })
        };

        // The waiter cannot make progress while the lease is held.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!waiter.is_finished());

        drop(held);
        assert_eq!(waiter.await.unwrap(), "http://a:8188");
    }

    #[tokio::test]
    async fn concurrent_leases_never_share_a_host() {
        let hosts = vec![
            "http://a:8188".to_string(),
            "http://b:8188".to_string(),
            "http://c:8188".to_string(),
        ];
        let pool = Arc::new(HostPool::new(hosts.clone()).unwrap());
        let in_flight = Arc::new(std::sync::Mutex::new(HashSet::new()));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let pool = Arc::clone(&pool);
            let in_flight = Arc::clone(&in_flight);
            tasks.push(tokio::spawn(async move {
                for _ in 0..25 {
                    let lease = pool.acquire().await.unwrap();
                    {
                        let mut held = in_flight.lock().unwrap();
                        // A leased host is held nowhere else, and there
                        // are never more leases than hosts.
                        assert!(held.insert(lease.host().to_string()));
                        assert!(held.len() <= pool.size());
                    }
                    tokio::task::yield_now().await;
                    // Unregister before the drop makes the host
                    // acquirable again.
                    in_flight.lock().unwrap().remove(lease.host());
                    drop(lease);
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        // After the churn every host is back, each exactly once.
        let leases = [
            pool.acquire().await.unwrap(),
            pool.acquire().await.unwrap(),
            pool.acquire().await.unwrap(),
        ];
        let mut recovered: Vec<String> =
            leases.iter().map(|l| l.host().to_string()).collect();
        recovered.sort();
        let mut expected = hosts;
        expected.sort();
        assert_eq!(recovered, expected);
    }
}
