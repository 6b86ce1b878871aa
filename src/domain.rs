//! Observation and Baseline value types.

use crate::category::{ActiveSet, CallType};

/// Per-category counters shared by `Observation` and `Baseline`: call count
/// and total billed seconds, plus the derived frequency/duration
/// probabilities.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CategoryStats {
    pub n: f64,
    pub d: f64,
    pub pf: f64,
    pub pd: f64,
}

/// One aggregated window of CDR traffic, consumed then dropped.
#[derive(Debug, Clone)]
pub struct Observation {
    pub categories: [CategoryStats; 6],
    pub num_total: f64,
    pub dur_total: f64,
    pub dist: f64,
}

impl Observation {
    pub fn empty() -> Self {
        Observation {
            categories: [CategoryStats::default(); 6],
            num_total: 0.0,
            dur_total: 0.0,
            dist: 0.0,
        }
    }

    pub fn stats(&self, c: CallType) -> CategoryStats {
        self.categories[c.index()]
    }

    fn stats_mut(&mut self, c: CallType) -> &mut CategoryStats {
        &mut self.categories[c.index()]
    }

    /// Add one raw CDR row's billed seconds to the given category's
    /// accumulators.
    pub fn record_call(&mut self, c: CallType, billsec: f64) {
        let entry = self.stats_mut(c);
        entry.n += 1.0;
        entry.d += billsec;
    }

    /// Derive `num_total`/`dur_total` and, only if either floor is exceeded,
    /// the per-category probabilities.
    pub fn finalize(&mut self, active: &ActiveSet, freq_floor: f64, dur_floor: f64) {
        self.num_total = self.categories.iter().map(|s| s.n).sum();
        self.dur_total = self.categories.iter().map(|s| s.d).sum();

        if self.num_total <= freq_floor && self.dur_total <= dur_floor {
            return;
        }
        let denom = self.num_total + self.dur_total;
        if denom == 0.0 {
            return;
        }
        for c in active.active_iter() {
            let entry = self.stats_mut(c);
            entry.pf = entry.n / denom;
            entry.pd = entry.d / denom;
        }
    }
}

/// The learned "normal" baseline plus the streaming EWMA scalars.
#[derive(Debug, Clone)]
pub struct Baseline {
    pub categories: [CategoryStats; 6],
    pub num_total: f64,
    pub dur_total: f64,
    pub dist_ewma: f64,
    pub mdev_ewma: f64,
    pub threshold: f64,
    /// Set once a checkpoint has been restored into this baseline; governs
    /// the `detect_start_ts` one-shot-snap asymmetry.
    pub restored: bool,
}

impl Baseline {
    pub fn zero() -> Self {
        Baseline {
            categories: [CategoryStats::default(); 6],
            num_total: 0.0,
            dur_total: 0.0,
            dist_ewma: 0.0,
            mdev_ewma: 0.0,
            threshold: 0.0,
            restored: false,
        }
    }

    pub fn stats(&self, c: CallType) -> CategoryStats {
        self.categories[c.index()]
    }

    /// Treat this baseline as a plain observation for the cold-start seed.
    pub fn as_observation(&self) -> Observation {
        Observation {
            categories: self.categories,
            num_total: self.num_total,
            dur_total: self.dur_total,
            dist: 0.0,
        }
    }

    pub fn adopt_observation(&mut self, o: &Observation) {
        self.categories = o.categories;
        self.num_total = o.num_total;
        self.dur_total = o.dur_total;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_has_zero_probabilities() {
        let active = ActiveSet::parse("mobile").unwrap();
        let mut o = Observation::empty();
        o.finalize(&active, 0.0, 0.0);
        assert_eq!(o.num_total, 0.0);
        assert_eq!(o.stats(CallType::Mobile).pf, 0.0);
    }

    #[test]
    fn sparse_window_below_floors_leaves_probabilities_zero() {
        let active = ActiveSet::parse("mobile").unwrap();
        let mut o = Observation::empty();
        o.record_call(CallType::Mobile, 30.0);
        o.finalize(&active, 100.0, 1000.0);
        assert_eq!(o.stats(CallType::Mobile).pf, 0.0);
        assert_eq!(o.stats(CallType::Mobile).pd, 0.0);
    }

    #[test]
    fn window_above_floor_gets_probabilities() {
        let active = ActiveSet::parse("mobile").unwrap();
        let mut o = Observation::empty();
        for _ in 0..10 {
            o.record_call(CallType::Mobile, 60.0);
        }
        o.finalize(&active, 0.0, 0.0);
        assert_eq!(o.num_total, 10.0);
        assert_eq!(o.dur_total, 600.0);
        let stats = o.stats(CallType::Mobile);
        assert!((stats.pf - 10.0 / 610.0).abs() < 1e-12);
        assert!((stats.pd - 600.0 / 610.0).abs() < 1e-12);
    }

    #[test]
    fn single_active_category_duration_only_traffic() {
        let active = ActiveSet::parse("mobile").unwrap();
        let mut o = Observation::empty();
        o.categories[CallType::Mobile.index()].d = 500.0;
        o.finalize(&active, 0.0, 0.0);
        assert_eq!(o.stats(CallType::Mobile).pf, 0.0);
        assert!(o.stats(CallType::Mobile).pd > 0.0);
    }
}
