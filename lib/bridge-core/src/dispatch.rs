//! Per-loop dispatch of delivery tasks

use crate::config::DispatchMode;
use crate::metrics::RelayMetrics;
use crate::policy::Direction;
use futures::FutureExt;
use prometheus::IntGauge;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error};

/// Keeps the in-flight gauge and the concurrency permit for one delivery
struct InFlight {
    gauge: IntGauge,
    _permit: Option<OwnedSemaphorePermit>,
}

impl InFlight {
    fn new(gauge: IntGauge, permit: Option<OwnedSemaphorePermit>) -> Self {
        gauge.inc();
        Self {
            gauge,
            _permit: permit,
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

/// DispatchPool runs the deliveries of a single relay loop
pub(crate) struct DispatchPool {
    kind: &'static str,
    mode: DispatchMode,
    limit: Option<Arc<Semaphore>>,
    tasks: JoinSet<()>,
    in_flight: IntGauge,
}

impl DispatchPool {
    pub(crate) fn new(
        direction: Direction,
        kind: &'static str,
        mode: DispatchMode,
        metrics: &RelayMetrics,
    ) -> Self {
        let limit = match mode {
            DispatchMode::Bounded { max_in_flight } => {
                Some(Arc::new(Semaphore::new(
                    max_in_flight.clamp(1, Semaphore::MAX_PERMITS),
                )))
            }
            DispatchMode::Unbounded | DispatchMode::Sequential => None,
        };

        Self {
            kind,
            mode,
            limit,
            tasks: JoinSet::new(),
            in_flight: metrics
                .dispatch_in_flight
                .with_label_values(&[direction.as_str(), kind]),
        }
    }

    /// Run or schedule one delivery.
    ///
    /// In bounded mode this waits for a free slot, in sequential mode for the
    /// delivery itself.
    pub(crate) async fn submit<F>(&mut self, delivery: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.mode {
            DispatchMode::Sequential => {
                let _in_flight = InFlight::new(self.in_flight.clone(), None);
                delivery.await;
            }
            DispatchMode::Unbounded => self.spawn(delivery, None),
            DispatchMode::Bounded { .. } => {
                let permit = match &self.limit {
                    Some(limit) => limit.clone().acquire_owned().await.ok(),
                    None => None,
                };
                self.spawn(delivery, permit);
            }
        }

        self.reap();
    }

    /// Wait for every outstanding delivery to finish
    pub(crate) async fn drain(mut self) {
        if !self.tasks.is_empty() {
            debug!(kind = self.kind, pending = self.tasks.len(), "Draining dispatch tasks");
        }
        while let Some(result) = self.tasks.join_next().await {
            check(self.kind, result);
        }
    }

    fn spawn<F>(&mut self, delivery: F, permit: Option<OwnedSemaphorePermit>)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let in_flight = InFlight::new(self.in_flight.clone(), permit);
        self.tasks.spawn(async move {
            let _in_flight = in_flight;
            delivery.await;
        });
    }

    /// Collect finished tasks without waiting
    fn reap(&mut self) {
        while let Some(Some(result)) = self.tasks.join_next().now_or_never() {
            check(self.kind, result);
        }
    }

    #[cfg(test)]
    fn pending(&self) -> usize {
        self.tasks.len()
    }
}

fn check(kind: &'static str, result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(kind, "dispatch task panicked");
        }
    }
}
