use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use tonic::{Code, Status};

/// Request kinds tracked by [`DiscoveryStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscoveryEventType {
    ServiceQuery,
    StaticAnnouncement,
    StaticAnnouncementList,
    StaticAnnouncementDelete,
    DynamicAnnouncement,
    DynamicAnnouncementDelete,
}

impl DiscoveryEventType {
    pub const ALL: [DiscoveryEventType; 6] = [
        DiscoveryEventType::ServiceQuery,
        DiscoveryEventType::StaticAnnouncement,
        DiscoveryEventType::StaticAnnouncementList,
        DiscoveryEventType::StaticAnnouncementDelete,
        DiscoveryEventType::DynamicAnnouncement,
        DiscoveryEventType::DynamicAnnouncementDelete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DiscoveryEventType::ServiceQuery => "service_query",
            DiscoveryEventType::StaticAnnouncement => "static_announcement",
            DiscoveryEventType::StaticAnnouncementList => "static_announcement_list",
            DiscoveryEventType::StaticAnnouncementDelete => "static_announcement_delete",
            DiscoveryEventType::DynamicAnnouncement => "dynamic_announcement",
            DiscoveryEventType::DynamicAnnouncementDelete => "dynamic_announcement_delete",
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    success: AtomicU64,
    failure: AtomicU64,
    total_micros: AtomicU64,
}

/// Point-in-time copy of one request kind's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub success: u64,
    pub failure: u64,
    pub total_time: Duration,
}

/// Per-kind request counters.
#[derive(Debug, Default)]
pub struct DiscoveryStats {
    kinds: [Counters; DiscoveryEventType::ALL.len()],
}

impl DiscoveryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: DiscoveryEventType, success: bool, elapsed: Duration) {
        let c = &self.kinds[kind as usize];
        if success {
            c.success.fetch_add(1, Ordering::Relaxed);
        } else {
            c.failure.fetch_add(1, Ordering::Relaxed);
        }
        c.total_micros.fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn get(&self, kind: DiscoveryEventType) -> StatsSnapshot {
        let c = &self.kinds[kind as usize];
        StatsSnapshot {
            success: c.success.load(Ordering::Relaxed),
            failure: c.failure.load(Ordering::Relaxed),
            total_time: Duration::from_micros(c.total_micros.load(Ordering::Relaxed)),
        }
    }
}

/// Outcomes that are the caller's fault still count as served requests.
fn is_failure(status: &Status) -> bool {
    !matches!(
        status.code(),
        Code::InvalidArgument | Code::NotFound | Code::AlreadyExists | Code::FailedPrecondition
    )
}

/// Records a request when dropped, so a cancelled handler is counted too.
struct InFlight<'a> {
    kind: DiscoveryEventType,
    stats: &'a DiscoveryStats,
    start: Instant,
    outcome: Option<Result<(), String>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let kind = self.kind.as_str();
        match self.outcome.take() {
            Some(Ok(())) => {
                self.stats.record(self.kind, true, elapsed);
                tracing::debug!(kind, elapsed_us = elapsed.as_micros() as u64, "request served");
            }
            Some(Err(error)) => {
                self.stats.record(self.kind, false, elapsed);
                tracing::warn!(kind, elapsed_us = elapsed.as_micros() as u64, %error, "request failed");
            }
            None => {
                self.stats.record(self.kind, false, elapsed);
                tracing::warn!(kind, elapsed_us = elapsed.as_micros() as u64, "request cancelled");
            }
        }
    }
}

/// Run `fut` as a request of kind `kind`, recording its outcome and latency.
pub async fn monitored<T, F>(kind: DiscoveryEventType, stats: &DiscoveryStats, fut: F) -> Result<T, Status>
where
    F: Future<Output = Result<T, Status>>,
{
    let mut in_flight = InFlight { kind, stats, start: Instant::now(), outcome: None };
    let result = fut.await;
    in_flight.outcome = Some(match &result {
        Err(status) if is_failure(status) => Err(status.message().to_string()),
        _ => Ok(()),
    });
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_success_and_failure_per_kind() {
        let stats = DiscoveryStats::new();

        let ok: Result<u32, Status> =
            monitored(DiscoveryEventType::ServiceQuery, &stats, async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let _ = monitored(DiscoveryEventType::StaticAnnouncement, &stats, async {
            Err::<(), _>(Status::internal("disk on fire"))
        })
        .await;

        // Client errors are served requests.
        let _ = monitored(DiscoveryEventType::DynamicAnnouncementDelete, &stats, async {
            Err::<(), _>(Status::not_found("no such node"))
        })
        .await;

        let q = stats.get(DiscoveryEventType::ServiceQuery);
        assert_eq!((q.success, q.failure), (1, 0));
        let s = stats.get(DiscoveryEventType::StaticAnnouncement);
        assert_eq!((s.success, s.failure), (0, 1));
        let d = stats.get(DiscoveryEventType::DynamicAnnouncementDelete);
        assert_eq!((d.success, d.failure), (1, 0));
        assert_eq!(stats.get(DiscoveryEventType::StaticAnnouncementList), StatsSnapshot::default());
    }

    #[tokio::test(start_paused = true)]
    async fn accumulates_processing_time() {
        let stats = DiscoveryStats::new();
        for _ in 0..2 {
            let _ = monitored(DiscoveryEventType::DynamicAnnouncement, &stats, async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok::<_, Status>(())
            })
            .await;
        }
        let d = stats.get(DiscoveryEventType::DynamicAnnouncement);
        assert_eq!(d.success, 2);
        assert!(d.total_time >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn cancelled_request_counts_as_failure() {
        let stats = DiscoveryStats::new();
        let fut = monitored(DiscoveryEventType::ServiceQuery, &stats, std::future::pending::<Result<(), Status>>());
        let _ = tokio::time::timeout(Duration::from_millis(5), fut).await;
        let q = stats.get(DiscoveryEventType::ServiceQuery);
        assert_eq!((q.success, q.failure), (0, 1));
    }
}
