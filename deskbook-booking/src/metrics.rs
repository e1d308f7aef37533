use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Prometheus instruments for the reservation engine.
pub struct Metrics {
    registry: Registry,
    pub transitions: IntCounterVec,
    pub connected_viewers: IntGauge,
    pub broadcast_failures: IntCounter,
    pub snapshot_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let transitions = IntCounterVec::new(
            Opts::new("deskbook_reservation_transitions_total", "Reservation state transitions by outcome"),
            &["transition", "outcome"],
        )?;
        let connected_viewers = IntGauge::new("deskbook_connected_viewers", "Viewers subscribed to availability pushes")?;
        let broadcast_failures = IntCounter::new("deskbook_broadcast_failures_total", "Snapshot queries that failed or timed out during a broadcast")?;
        let snapshot_seconds = Histogram::with_opts(HistogramOpts::new(
            "deskbook_snapshot_seconds",
            "Time spent assembling one availability snapshot",
        ))?;

        registry.register(Box::new(transitions.clone()))?;
        registry.register(Box::new(connected_viewers.clone()))?;
        registry.register(Box::new(broadcast_failures.clone()))?;
        registry.register(Box::new(snapshot_seconds.clone()))?;

        Ok(Self {
            registry,
            transitions,
            connected_viewers,
            broadcast_failures,
            snapshot_seconds,
        })
    }

    pub fn record_transition(&self, transition: &str, outcome: &str) {
        self.transitions.with_label_values(&[transition, outcome]).inc();
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
