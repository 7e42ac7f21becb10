//! Single-flight lazy initialization
//!
//! [`SingleFlight`] guards a lazily built shared value:
//!
//! ```text
//! Uninitialized ──get_or_try_init──► Initializing ──ok──► Ready
//!       ▲                                 │
//!       └──────────────err────────────────┘
//! ```
//!
//! Concurrent first-time callers all await the same in-flight construction
//! and observe the same outcome, error included. A failed attempt leaves
//! the cell `Uninitialized`, so the next call starts a fresh attempt. Once
//! `Ready`, the value is handed out for the life of the cell.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use tokio::sync::Mutex;

/// Observable lifecycle phase of a [`SingleFlight`] cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightPhase {
    Uninitialized,
    Initializing,
    Ready,
}

type Flight<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

enum FlightState<T, E>
where
    T: Clone,
    E: Clone,
{
    Uninitialized,
    Initializing { attempt: u64, flight: Flight<T, E> },
    Ready(T),
}

pub struct SingleFlight<T, E>
where
    T: Clone,
    E: Clone,
{
    state: Mutex<FlightState<T, E>>,
    attempts: std::sync::atomic::AtomicU64,
}

impl<T, E> Default for SingleFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<tokio::task::JoinError> + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> SingleFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<tokio::task::JoinError> + 'static,
{
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FlightState::Uninitialized),
            attempts: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Returns the value, building it with `init` if no construction has
    /// succeeded yet
    ///
    /// `init` is only invoked by the caller that moves the cell out of
    /// `Uninitialized`; everyone arriving while that attempt runs shares its
    /// result. The construction runs on its own task, so it completes even
    /// if the initiating caller is dropped.
    pub async fn get_or_try_init<F, Fut>(&self, init: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (attempt, flight) = {
            let mut state = self.state.lock().await;
            match &*state {
                FlightState::Ready(value) => return Ok(value.clone()),
                FlightState::Initializing { attempt, flight } => (*attempt, flight.clone()),
                FlightState::Uninitialized => {
                    let attempt = self
                        .attempts
                        .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
                        + 1;
                    let handle = tokio::spawn(init());
                    let flight = async move { handle.await.map_err(E::from)? }
                        .boxed()
                        .shared();
                    *state = FlightState::Initializing {
                        attempt,
                        flight: flight.clone(),
                    };
                    (attempt, flight)
                }
            }
        };

        let outcome = flight.await;

        let mut state = self.state.lock().await;
        if matches!(&*state, FlightState::Initializing { attempt: current, .. } if *current == attempt)
        {
            *state = match &outcome {
                Ok(value) => FlightState::Ready(value.clone()),
                Err(_) => FlightState::Uninitialized,
            };
        }

        outcome
    }

    /// The value if construction already succeeded
    pub async fn get(&self) -> Option<T> {
        match &*self.state.lock().await {
            FlightState::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    pub async fn phase(&self) -> FlightPhase {
        match &*self.state.lock().await {
            FlightState::Uninitialized => FlightPhase::Uninitialized,
            FlightState::Initializing { .. } => FlightPhase::Initializing,
            FlightState::Ready(_) => FlightPhase::Ready,
        }
    }

    /// Number of constructions started so far
    pub fn attempts(&self) -> u64 {
        self.attempts.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct TestError(String);

    impl From<tokio::task::JoinError> for TestError {
        fn from(err: tokio::task::JoinError) -> Self {
            TestError(err.to_string())
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_construction() {
        let cell: Arc<SingleFlight<Arc<String>, TestError>> = Arc::new(SingleFlight::new());
        let builds = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..16 {
            let cell = cell.clone();
            let builds = builds.clone();
            tasks.push(tokio::spawn(async move {
                cell.get_or_try_init(|| async move {
                    builds.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(Arc::new("server".to_string()))
                })
                .await
            }));
        }

        let mut values = Vec::new();
        for task in tasks {
            values.push(task.await.unwrap().unwrap());
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(values.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(cell.phase().await, FlightPhase::Ready);
        assert_eq!(cell.attempts(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_shared_then_retry_succeeds() {
        let cell: Arc<SingleFlight<u32, TestError>> = Arc::new(SingleFlight::new());

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let cell = cell.clone();
            tasks.push(tokio::spawn(async move {
                cell.get_or_try_init(|| async {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    Err(TestError("handshake refused".into()))
                })
                .await
            }));
        }
        for task in tasks {
            assert_eq!(
                task.await.unwrap(),
                Err(TestError("handshake refused".into()))
            );
        }

        assert_eq!(cell.phase().await, FlightPhase::Uninitialized);
        assert_eq!(cell.get().await, None);

        let value = cell.get_or_try_init(|| async { Ok(7) }).await;
        assert_eq!(value, Ok(7));
        assert_eq!(cell.phase().await, FlightPhase::Ready);
        assert_eq!(cell.attempts(), 2);
    }

    #[tokio::test]
    async fn test_ready_value_is_never_rebuilt() {
        let cell: SingleFlight<u32, TestError> = SingleFlight::new();
        assert_eq!(cell.get_or_try_init(|| async { Ok(1) }).await, Ok(1));
        assert_eq!(cell.get_or_try_init(|| async { Ok(2) }).await, Ok(1));
        assert_eq!(cell.attempts(), 1);
    }

    #[tokio::test]
    async fn test_phase_reports_initializing_while_in_flight() {
        let cell: Arc<SingleFlight<u32, TestError>> = Arc::new(SingleFlight::new());
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let waiter = {
            let cell = cell.clone();
            tokio::spawn(async move {
                cell.get_or_try_init(|| async move {
                    let _ = release_rx.await;
                    Ok(5)
                })
                .await
            })
        };

        while cell.phase().await != FlightPhase::Initializing {
            tokio::task::yield_now().await;
        }
        release_tx.send(()).unwrap();

        assert_eq!(waiter.await.unwrap(), Ok(5));
        assert_eq!(cell.phase().await, FlightPhase::Ready);
    }
}
