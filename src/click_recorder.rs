use crate::{link_store::LinkStore, models::ClickRecord};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const RETRY_BACKOFFS_MS: &[u64] = &[100, 500, 2_000];
const POLL_INTERVAL: Duration = Duration::from_millis(200);

struct Job {
    link_id: i64,
    record: ClickRecord,
}

/// Off-request-path click writer: handlers hand off a `ClickRecord` and
/// return immediately, a fixed pool of workers drains a bounded queue and
/// persists each one with retry. Keeps redirects from blocking on a
/// database write.
pub struct ClickRecorder {
    tx: mpsc::Sender<Job>,
    dropped: Arc<AtomicU64>,
    shutting_down: Arc<AtomicBool>,
    workers_done: Arc<tokio::sync::Barrier>,
}

impl ClickRecorder {
    /// `queue_capacity` bounds the channel; `worker_count` is the number of
    /// concurrent writers draining it.
    pub fn spawn(store: LinkStore, queue_capacity: usize, worker_count: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        let shutting_down = Arc::new(AtomicBool::new(false));
        let workers_done = Arc::new(tokio::sync::Barrier::new(worker_count + 1));

        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        for worker_id in 0..worker_count {
            let rx = rx.clone();
            let store = store.clone();
            let shutting_down = shutting_down.clone();
            let workers_done = workers_done.clone();

            tokio::spawn(async move {
                loop {
                    let received = {
                        let mut guard = rx.lock().await;
                        tokio::time::timeout(POLL_INTERVAL, guard.recv()).await
                    };

                    match received {
                        Ok(Some(job)) => write_logging_errors(&store, worker_id, &job).await,
                        Ok(None) => break, // channel closed, no sender can ever enqueue again
                        Err(_elapsed) => {
                            if shutting_down.load(Ordering::Acquire) {
                                // Drain whatever is left without blocking, then exit.
                                let mut guard = rx.lock().await;
                                while let Ok(job) = guard.try_recv() {
                                    write_logging_errors(&store, worker_id, &job).await;
                                }
                                break;
                            }
                        }
                    }
                }
                workers_done.wait().await;
            });
        }

        Self {
            tx,
            dropped,
            shutting_down,
            workers_done,
        }
    }

    /// Queue a click for async persistence. Never blocks the caller: if the
    /// bounded queue is full the click is counted as dropped and discarded
    /// rather than applying backpressure to the redirect path.
    pub fn enqueue(&self, link_id: i64, record: ClickRecord) {
        match self.tx.try_send(Job { link_id, record }) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("click queue full, dropping click");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of jobs currently sitting in the bounded queue, awaiting a
    /// worker.
    pub fn queue_depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Signal all workers to drain the remaining queue and stop, waiting up
    /// to `timeout` for them to finish.
    pub async fn shutdown(&self, timeout: Duration) {
        self.shutting_down.store(true, Ordering::Release);
        let _ = tokio::time::timeout(timeout, self.workers_done.wait()).await;
    }
}

impl Clone for ClickRecorder {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            dropped: self.dropped.clone(),
            shutting_down: self.shutting_down.clone(),
            workers_done: self.workers_done.clone(),
        }
    }
}

async fn write_logging_errors(store: &LinkStore, worker_id: usize, job: &Job) {
    if let Err(e) = write_with_retry(store, job).await {
        tracing::error!(worker = worker_id, slug = %job.record.slug, error = %e, "click write exhausted retries, dropping");
    }
}

async fn write_with_retry(store: &LinkStore, job: &Job) -> Result<(), sqlx::Error> {
    let mut last_err = None;
    for (attempt, backoff_ms) in std::iter::once(0).chain(RETRY_BACKOFFS_MS.iter().copied()).enumerate() {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        }
        match store.record_click(job.link_id, &job.record).await {
            Ok(()) => return Ok(()),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err.expect("loop runs at least once"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LinkCache;
    use crate::db;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_store() -> LinkStore {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        LinkStore::new(pool, LinkCache::new())
    }

    fn record(slug: &str) -> ClickRecord {
        ClickRecord {
            slug: slug.to_owned(),
            ip: Some("9.9.9.9".into()),
            user_agent: None,
            referer: None,
            device: "desktop".into(),
            valid: true,
            invalid_reason: None,
        }
    }

    #[tokio::test]
    async fn enqueued_click_is_eventually_persisted() {
        let store = test_store().await;
        let link = db::create_link(store.pool(), "promo", "https://x", None, None, None, None)
            .await
            .unwrap();

        let recorder = ClickRecorder::spawn(store.clone(), 16, 2);
        recorder.enqueue(link.id, record("promo"));
        recorder.shutdown(Duration::from_secs(5)).await;

        let reloaded = db::get_link_by_id(store.pool(), link.id).await.unwrap().unwrap();
        assert_eq!(reloaded.total_clicks, 1);
    }

    #[tokio::test]
    async fn full_queue_increments_dropped_counter() {
        let store = test_store().await;
        let recorder = ClickRecorder::spawn(store, 1, 0);
        // With zero workers nothing ever drains, so the 2nd+ enqueue overflows
        // once the bounded channel's single slot is occupied.
        for i in 0..5 {
            recorder.enqueue(1, record(&format!("s{i}")));
        }
        assert!(recorder.dropped_count() >= 1);
    }
}
