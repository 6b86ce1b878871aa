//! Detection Controller (C4): LOAD/RESTORE/TRAIN_SEED/TRAIN/RUN/DONE state
//! machine, the composite alert predicate, and checkpoint persistence.

use chrono::{NaiveDateTime, Timelike};

use crate::aggregator::{reduce_rows, CdrSource};
use crate::alert::{AlertArchive, AlertSink, AlertStatus};
use crate::category::{ActiveSet, CallType};
use crate::checkpoint::CheckpointStore;
use crate::clock::{Advance, RunMode, WindowClock};
use crate::config::Config;
use crate::domain::{Baseline, Observation};
use crate::engine;
use crate::error::DaemonError;
use crate::shutdown::ShutdownFlag;

/// The subset of `Config` a tick actually consults, copied out so the
/// controller doesn't hold a borrow of the whole config for its lifetime.
#[derive(Debug, Clone)]
struct DetectionParams {
    institution: String,
    active: ActiveSet,
    sigma: f64,
    alpha: f64,
    freq_floor: f64,
    dur_floor: f64,
    dur_mobile: f64,
    dur_international: f64,
    dur_premium: f64,
    office_start_minus_one: i64,
    office_end: u32,
    training_period_minutes: i64,
}

impl DetectionParams {
    fn from_config(cfg: &Config) -> Self {
        DetectionParams {
            institution: cfg.institution.clone(),
            active: cfg.active,
            sigma: cfg.sensitivity,
            alpha: cfg.adaptability,
            freq_floor: cfg.freq_floor,
            dur_floor: cfg.dur_floor_seconds,
            dur_mobile: cfg.dur_mobile_seconds,
            dur_international: cfg.dur_international_seconds,
            dur_premium: cfg.dur_premium_seconds,
            office_start_minus_one: cfg.office_start_minus_one,
            office_end: cfg.office_end,
            training_period_minutes: cfg.training_period_minutes,
        }
    }

    /// Business hours: inclusive of the open hour, exclusive of the close
    /// hour, matching the source's off-by-one-adjusted comparison.
    fn is_office_hours(&self, cursor: NaiveDateTime) -> bool {
        let hour = cursor.hour() as i64;
        hour > self.office_start_minus_one && hour < self.office_end as i64
    }
}

/// The composite alert predicate.
fn alert_predicate(baseline: &Baseline, o: &Observation, office: bool, p: &DetectionParams) -> bool {
    if o.dist <= baseline.threshold {
        return false;
    }

    // Deliberately conservative: opting one of these three categories into
    // the feature vector at all escalates any distance-anomalous window
    // unconditionally.
    if p.active.is_active(CallType::Domestic)
        || p.active.is_active(CallType::Service)
        || p.active.is_active(CallType::Emergency)
    {
        return true;
    }

    let mobile = o.stats(CallType::Mobile);
    let intl = o.stats(CallType::International);
    let prem = o.stats(CallType::Premium);

    if office {
        let b_intl = baseline.stats(CallType::International);
        let b_prem = baseline.stats(CallType::Premium);
        mobile.d > p.dur_mobile
            || intl.d > p.dur_international
            || prem.d > p.dur_premium
            || (b_intl.n > 0.0 && intl.n > p.sigma * b_intl.n)
            || (b_prem.n > 0.0 && prem.n > p.sigma * b_prem.n)
    } else {
        mobile.d > p.dur_mobile || intl.n > o.num_total / p.sigma || prem.n > o.num_total / p.sigma
    }
}

/// A fully bootstrapped controller, positioned to start the `RUN` detect
/// loop. Construct with [`Controller::bootstrap`].
pub struct Controller<C, K, A, S> {
    cdr_source: C,
    checkpoint_store: K,
    alert_archive: A,
    alert_sink: S,
    clock: WindowClock,
    baseline: Baseline,
    params: DetectionParams,
    /// One-shot `detection-start-ts` snap, consumed on the first `RUN` tick
    /// only for a non-restored session.
    pending_detect_start: Option<NaiveDateTime>,
}

impl<C, K, A, S> Controller<C, K, A, S>
where
    C: CdrSource,
    K: CheckpointStore,
    A: AlertArchive,
    S: AlertSink,
{
    /// Runs `LOAD` → `{RESTORE | TRAIN_SEED → TRAIN}`, returning a
    /// controller ready for `RUN`.
    pub async fn bootstrap(
        cfg: &Config,
        cdr_source: C,
        checkpoint_store: K,
        alert_archive: A,
        alert_sink: S,
    ) -> Result<Self, DaemonError> {
        let params = DetectionParams::from_config(cfg);

        if cfg.threshold_restore {
            if let Some(checkpoint) = checkpoint_store.load_latest().await? {
                let mut clock = WindowClock::new(checkpoint.cursor, cfg.interval_minutes, cfg.ending_date, cfg.run_mode);

                if let Some(ts) = cfg.detection_start_ts {
                    clock.snap_forward(ts);
                }
                tracing::info!(cursor = %clock.peek(), checkpoint_id = checkpoint.checkpoint_id, "restored baseline from checkpoint");

                return Ok(Controller {
                    cdr_source,
                    checkpoint_store,
                    alert_archive,
                    alert_sink,
                    clock,
                    baseline: checkpoint.baseline,
                    params,
                    pending_detect_start: None,
                });
            }
        }

        let start = match cfg.initial_timestamp {
            Some(ts) => ts,
            None => cdr_source.second_row_calldate().await?,
        };
        let mut clock = WindowClock::new(start, cfg.interval_minutes, cfg.ending_date, cfg.run_mode);
        let mut baseline = Baseline::zero();

        Self::train(&cdr_source, &mut clock, &mut baseline, &params).await?;
        checkpoint_store.store(&baseline, clock.peek()).await?;
        tracing::info!(cursor = %clock.peek(), "initial training complete");

        Ok(Controller {
            cdr_source,
            checkpoint_store,
            alert_archive,
            alert_sink,
            clock,
            baseline,
            params,
            pending_detect_start: cfg.detection_start_ts,
        })
    }

    /// Cold-start training: seed from the
    /// first two windows, then continue until the training period elapses.
    async fn train(
        cdr_source: &C,
        clock: &mut WindowClock,
        baseline: &mut Baseline,
        params: &DetectionParams,
    ) -> Result<(), DaemonError> {
        let mut o0 = Self::aggregate_at(cdr_source, clock.peek(), clock.delta_minutes(), params).await?;
        clock.advance();
        let o1 = Self::aggregate_at(cdr_source, clock.peek(), clock.delta_minutes(), params).await?;
        baseline.adopt_observation(&o1);

        engine::seed_baseline(&mut o0, baseline, &params.active, params.sigma, params.alpha);

        let mut elapsed = clock.delta_minutes() * 2;
        while elapsed < params.training_period_minutes {
            clock.advance();
            let mut o = Self::aggregate_at(cdr_source, clock.peek(), clock.delta_minutes(), params).await?;
            engine::distance(baseline, &mut o, &params.active);
            if o.dist > 0.0 {
                engine::update_baseline(baseline, &o, params.sigma, params.alpha);
            }
            elapsed += clock.delta_minutes();
        }
        Ok(())
    }

    async fn aggregate_at(
        cdr_source: &C,
        cursor: NaiveDateTime,
        delta_minutes: i64,
        params: &DetectionParams,
    ) -> Result<Observation, DaemonError> {
        let rows = cdr_source
            .fetch_window(cursor, delta_minutes, &params.institution, &params.active)
            .await?;
        Ok(reduce_rows(&rows, &params.active, params.freq_floor, params.dur_floor))
    }

    /// One detection tick.
    async fn tick(&mut self) -> Result<Advance, DaemonError> {
        if let Some(ts) = self.pending_detect_start.take() {
            self.clock.snap_forward(ts);
        }

        let cursor = self.clock.peek();
        let rows = self
            .cdr_source
            .fetch_window(cursor, self.clock.delta_minutes(), &self.params.institution, &self.params.active)
            .await?;
        let mut o = reduce_rows(&rows, &self.params.active, self.params.freq_floor, self.params.dur_floor);
        let dist = engine::distance(&self.baseline, &mut o, &self.params.active);
        let office = self.params.is_office_hours(cursor);
        let alert = alert_predicate(&self.baseline, &o, office, &self.params);

        tracing::debug!(cursor = %cursor, dist, threshold = self.baseline.threshold, alert, "tick");

        if alert {
            let alert_id = self.alert_archive.log_alert(&rows).await?;
            tracing::warn!(institution = %self.params.institution, alert_id, cursor = %cursor, "anomalous window");
            self.alert_sink.notify(AlertStatus::Alert, cursor, &self.params.institution, Some(alert_id));
        } else {
            if o.dist > 0.0 {
                engine::update_baseline(&mut self.baseline, &o, self.params.sigma, self.params.alpha);
                self.checkpoint_store.store(&self.baseline, cursor).await?;
            }
            self.alert_sink.notify(AlertStatus::Ok, cursor, &self.params.institution, None);
        }

        Ok(self.clock.advance())
    }

    /// Runs `RUN` to completion: ticks until `DONE` (offline) or until
    /// `shutdown` is observed at a tick boundary.
    pub async fn run(mut self, shutdown: &ShutdownFlag) -> Result<(), DaemonError> {
        loop {
            if shutdown.is_set() {
                break;
            }
            match self.tick().await? {
                Advance::Done => break,
                Advance::Continue => {
                    if self.clock.mode() == RunMode::Online {
                        self.pace(shutdown).await;
                    }
                }
            }
        }
        Ok(())
    }

    /// Wall-clock pacing between online-mode ticks, polled at 1 Hz so
    /// shutdown is effectively immediate between tick boundaries.
    async fn pace(&self, shutdown: &ShutdownFlag) {
        let total_seconds = self.clock.delta_minutes() * 60;
        for _ in 0..total_seconds {
            if shutdown.is_set() {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        }
    }
}
