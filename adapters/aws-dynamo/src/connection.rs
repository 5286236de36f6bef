//! Process-scoped lazy connection.
//!
//! The first caller runs the connect future; every caller that arrives while
//! it is in flight awaits that same attempt instead of opening its own. A
//! failed attempt is not cached, so the next caller starts a fresh one.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use domain::ConnectionState;
use tokio::sync::OnceCell;

pub struct LazyConnection<T> {
    cell: OnceCell<T>,
    connecting: AtomicBool,
    attempts: AtomicUsize,
}

/// Clears the `connecting` flag even if the connect future is dropped midway.
struct ConnectingGuard<'a>(&'a AtomicBool);

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<T> LazyConnection<T> {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::const_new(),
            connecting: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn state(&self) -> ConnectionState {
        if self.cell.initialized() {
            ConnectionState::Ready
        } else if self.connecting.load(Ordering::SeqCst) {
            ConnectionState::Connecting
        } else {
            ConnectionState::Uninitialized
        }
    }

    /// Already connected, e.g. with a client built by the caller.
    pub fn ready(value: T) -> Self {
        Self {
            cell: OnceCell::new_with(Some(value)),
            connecting: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Number of connect attempts started so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Return the cached handle, connecting first if nobody has yet.
    pub async fn get_or_connect<F, Fut, E>(&self, connect: F) -> Result<&T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.cell
            .get_or_try_init(|| async move {
                self.connecting.store(true, Ordering::SeqCst);
                let _guard = ConnectingGuard(&self.connecting);
                self.attempts.fetch_add(1, Ordering::SeqCst);
                connect().await
            })
            .await
    }
}

impl<T> Default for LazyConnection<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_use_connects_once() {
        let conn: Arc<LazyConnection<u32>> = Arc::new(LazyConnection::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let conn = conn.clone();
            handles.push(tokio::spawn(async move {
                let v = conn
                    .get_or_connect(|| async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, String>(7)
                    })
                    .await
                    .unwrap();
                *v
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), 7);
        }
        assert_eq!(conn.attempts(), 1);
        assert_eq!(conn.state(), ConnectionState::Ready);
    }

    #[tokio::test]
    async fn failed_attempt_is_not_cached() {
        let conn: LazyConnection<u32> = LazyConnection::new();
        assert_eq!(conn.state(), ConnectionState::Uninitialized);

        let err = conn
            .get_or_connect(|| async { Err::<u32, _>("refused") })
            .await
            .unwrap_err();
        assert_eq!(err, "refused");
        assert_eq!(conn.state(), ConnectionState::Uninitialized);

        let v = conn
            .get_or_connect(|| async { Ok::<_, &str>(3) })
            .await
            .unwrap();
        assert_eq!(*v, 3);
        assert_eq!(conn.attempts(), 2);
    }

    #[tokio::test]
    async fn reports_connecting_while_in_flight() {
        let conn: Arc<LazyConnection<u32>> = Arc::new(LazyConnection::new());
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let task = {
            let conn = conn.clone();
            tokio::spawn(async move {
                conn.get_or_connect(move || async move {
                    let _ = rx.await;
                    Ok::<_, String>(1)
                })
                .await
                .map(|v| *v)
            })
        };
        while conn.state() != ConnectionState::Connecting {
            tokio::task::yield_now().await;
        }
        tx.send(()).unwrap();
        assert_eq!(task.await.unwrap().unwrap(), 1);
        assert_eq!(conn.state(), ConnectionState::Ready);
    }
}
