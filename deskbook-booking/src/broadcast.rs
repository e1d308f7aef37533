use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate};
use deskbook_core::{AvailabilityFilter, AvailabilitySnapshot, CoreError, CoreResult};
use deskbook_shared::ReservationEvent;
use futures_util::future::join_all;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::availability::AvailabilityService;
use crate::metrics::Metrics;

pub type Outbox = mpsc::Sender<Arc<AvailabilitySnapshot>>;

#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    /// Fallback refresh period.
    pub interval: Duration,
    /// Budget for one filter group's query.
    pub query_timeout: Duration,
    /// Change-driven pushes to the same viewer are at least this far apart.
    pub min_push_interval: Duration,
    /// Consecutive failed refreshes before a viewer is dropped.
    pub max_consecutive_failures: u32,
    pub outbox_capacity: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            query_timeout: Duration::from_secs(3),
            min_push_interval: Duration::from_millis(500),
            max_consecutive_failures: 3,
            outbox_capacity: 8,
        }
    }
}

/// Why a refresh runs.
#[derive(Debug, Clone)]
pub enum Trigger {
    Tick,
    Change(ReservationEvent),
}

struct Viewer {
    filter: AvailabilityFilter,
    outbox: Outbox,
    failures: u32,
    last_push: Option<Instant>,
}

/// Keeps every connected viewer's snapshot current.
///
/// Viewers sharing a filter set share one query per refresh. Each group's
/// query runs under its own timeout and groups run concurrently, so a slow
/// or failing group never holds up the rest. Pushes never block: a full
/// outbox drops the push, a closed one removes the viewer.
pub struct BroadcastCoordinator {
    availability: Arc<AvailabilityService>,
    metrics: Arc<Metrics>,
    settings: BroadcastSettings,
    viewers: RwLock<HashMap<Uuid, Viewer>>,
}

impl BroadcastCoordinator {
    pub fn new(
        availability: Arc<AvailabilityService>,
        metrics: Arc<Metrics>,
        settings: BroadcastSettings,
    ) -> Self {
        Self {
            availability,
            metrics,
            settings,
            viewers: RwLock::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &BroadcastSettings {
        &self.settings
    }

    /// Register a viewer with no filters and push it an initial snapshot.
    pub async fn connect(&self, outbox: Outbox) -> Uuid {
        let viewer_id = Uuid::new_v4();
        {
            let mut viewers = self.viewers.write().await;
            viewers.insert(
                viewer_id,
                Viewer {
                    filter: AvailabilityFilter::default(),
                    outbox,
                    failures: 0,
                    last_push: None,
                },
            );
            self.metrics.connected_viewers.set(viewers.len() as i64);
        }
        info!("Viewer {} connected", viewer_id);

        self.push_to(viewer_id, AvailabilityFilter::default()).await;
        viewer_id
    }

    /// Replace a viewer's filters and push a fresh snapshot right away.
    pub async fn update_filter(&self, viewer_id: Uuid, filter: AvailabilityFilter) -> CoreResult<()> {
        {
            let mut viewers = self.viewers.write().await;
            let viewer = viewers
                .get_mut(&viewer_id)
                .ok_or_else(|| CoreError::NotFound(format!("Viewer {} is not connected", viewer_id)))?;
            viewer.filter = filter.clone();
        }
        debug!("Viewer {} updated filters: {:?}", viewer_id, filter);

        self.push_to(viewer_id, filter).await;
        Ok(())
    }

    pub async fn disconnect(&self, viewer_id: Uuid) {
        let mut viewers = self.viewers.write().await;
        if viewers.remove(&viewer_id).is_some() {
            info!("Viewer {} disconnected", viewer_id);
        }
        self.metrics.connected_viewers.set(viewers.len() as i64);
    }

    pub async fn viewer_count(&self) -> usize {
        self.viewers.read().await.len()
    }

    /// Recompute and push snapshots. Returns the number of snapshots handed
    /// to outboxes.
    pub async fn refresh(&self, trigger: Trigger) -> usize {
        self.refresh_at(trigger, Local::now().date_naive()).await
    }

    async fn refresh_at(&self, trigger: Trigger, today: NaiveDate) -> usize {
        let groups = self.group_viewers(&trigger, today).await;
        if groups.is_empty() {
            return 0;
        }
        debug!("Refreshing {} filter groups ({:?})", groups.len(), trigger);

        let results = join_all(groups.into_iter().map(|(filter, viewer_ids)| async move {
            let result = self.query(&filter, today).await;
            (filter, viewer_ids, result)
        }))
        .await;

        let mut delivered = 0;
        for (filter, viewer_ids, result) in results {
            match result {
                Ok(snapshot) => delivered += self.deliver(&filter, &viewer_ids, Arc::new(snapshot)).await,
                Err(e) => self.record_failure(&filter, &viewer_ids, &e).await,
            }
        }
        delivered
    }

    /// Bucket viewers by filter set. Change-driven refreshes only consider
    /// viewers looking at the changed date who were not pushed to recently.
    async fn group_viewers(
        &self,
        trigger: &Trigger,
        today: NaiveDate,
    ) -> HashMap<AvailabilityFilter, Vec<Uuid>> {
        let now = Instant::now();
        let viewers = self.viewers.read().await;
        let mut groups: HashMap<AvailabilityFilter, Vec<Uuid>> = HashMap::new();

        for (viewer_id, viewer) in viewers.iter() {
            if let Trigger::Change(event) = trigger {
                if viewer.filter.resolved_date(today) != event.booking_date {
                    continue;
                }
                let recent = viewer
                    .last_push
                    .is_some_and(|at| now.duration_since(at) < self.settings.min_push_interval);
                if recent {
                    continue;
                }
            }
            groups.entry(viewer.filter.clone()).or_default().push(*viewer_id);
        }
        groups
    }

    async fn query(&self, filter: &AvailabilityFilter, today: NaiveDate) -> CoreResult<AvailabilitySnapshot> {
        match time::timeout(self.settings.query_timeout, self.availability.snapshot_at(filter, today)).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::StoreUnavailable(format!(
                "Availability query timed out after {:?}",
                self.settings.query_timeout
            ))),
        }
    }

    async fn push_to(&self, viewer_id: Uuid, filter: AvailabilityFilter) {
        let today = Local::now().date_naive();
        match self.query(&filter, today).await {
            Ok(snapshot) => {
                self.deliver(&filter, &[viewer_id], Arc::new(snapshot)).await;
            }
            Err(e) => self.record_failure(&filter, &[viewer_id], &e).await,
        }
    }

    /// Hand `snapshot`, computed for `filter`, to the listed viewers that
    /// still have that filter.
    async fn deliver(
        &self,
        filter: &AvailabilityFilter,
        viewer_ids: &[Uuid],
        snapshot: Arc<AvailabilitySnapshot>,
    ) -> usize {
        let mut viewers = self.viewers.write().await;
        let mut delivered = 0;

        for viewer_id in viewer_ids {
            // Disconnected or refiltered while the query ran.
            let Some(viewer) = viewers.get_mut(viewer_id).filter(|v| &v.filter == filter) else {
                continue;
            };
            viewer.failures = 0;
            match viewer.outbox.try_send(snapshot.clone()) {
                Ok(()) => {
                    viewer.last_push = Some(Instant::now());
                    delivered += 1;
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!("Outbox full for viewer {}, dropping push", viewer_id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("Outbox closed for viewer {}, removing", viewer_id);
                    viewers.remove(viewer_id);
                }
            }
        }

        self.metrics.connected_viewers.set(viewers.len() as i64);
        delivered
    }

    async fn record_failure(&self, filter: &AvailabilityFilter, viewer_ids: &[Uuid], error: &CoreError) {
        self.metrics.broadcast_failures.inc();
        let mut viewers = self.viewers.write().await;

        for viewer_id in viewer_ids {
            let Some(viewer) = viewers.get_mut(viewer_id).filter(|v| &v.filter == filter) else {
                continue;
            };
            viewer.failures += 1;
            warn!(
                "Refresh failed for viewer {} ({} consecutive): {}",
                viewer_id, viewer.failures, error
            );
            if viewer.failures >= self.settings.max_consecutive_failures {
                warn!("Dropping viewer {} after repeated failures", viewer_id);
                viewers.remove(viewer_id);
            }
        }

        self.metrics.connected_viewers.set(viewers.len() as i64);
    }

    /// Refresh on every tick of the fallback interval and on every
    /// reservation change until the task is aborted.
    pub async fn run(self: Arc<Self>, mut changes: broadcast::Receiver<ReservationEvent>) {
        let mut ticker = time::interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut changes_open = true;

        info!("Broadcast coordinator started (interval {:?})", self.settings.interval);
        loop {
            let trigger = tokio::select! {
                _ = ticker.tick() => Trigger::Tick,
                change = changes.recv(), if changes_open => match change {
                    Ok(event) => Trigger::Change(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Broadcast coordinator lagged by {} change events", skipped);
                        Trigger::Tick
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Change feed closed, continuing on interval only");
                        changes_open = false;
                        continue;
                    }
                },
            };
            self.refresh(trigger).await;
        }
    }
}
