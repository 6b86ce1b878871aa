//! Hellinger Engine (C3): the adaptive baseline and its streaming distance
//! statistic.

use crate::category::{ActiveSet, CallType};
use crate::domain::{Baseline, CategoryStats, Observation};

/// Streaming gains fixed by the source algorithm; preserved exactly.
const DIST_GAIN: f64 = 1.0 / 8.0;
const MDEV_GAIN: f64 = 1.0 / 4.0;

trait CategoryView {
    fn stats(&self, c: CallType) -> CategoryStats;
}

impl CategoryView for Observation {
    fn stats(&self, c: CallType) -> CategoryStats {
        Observation::stats(self, c)
    }
}

impl CategoryView for Baseline {
    fn stats(&self, c: CallType) -> CategoryStats {
        Baseline::stats(self, c)
    }
}

/// Unnormalized sum of squared root-differences over the concatenated
/// frequency/duration probability vectors. A coordinate on the *testing*
/// (second-argument) side that is exactly zero contributes nothing, matching
/// the source's "skip if testing side is zero".
fn hellinger_sum(reference: &impl CategoryView, testing: &impl CategoryView, active: &ActiveSet) -> f64 {
    let mut sum = 0.0;
    for c in active.active_iter() {
        let r = reference.stats(c);
        let t = testing.stats(c);
        if t.pf != 0.0 {
            sum += (r.pf.sqrt() - t.pf.sqrt()).powi(2);
        }
        if t.pd != 0.0 {
            sum += (r.pd.sqrt() - t.pd.sqrt()).powi(2);
        }
    }
    sum
}

/// *distance(B, O) → double.* Side-effect free save for writing the result
/// into `o.dist`.
pub fn distance(baseline: &Baseline, o: &mut Observation, active: &ActiveSet) -> f64 {
    let d = hellinger_sum(baseline, o, active);
    o.dist = d;
    d
}

/// *update_baseline(B, O).* Returns whether the outlier-rejection gate
/// passed (and thus whether `B` was mutated).
///
/// The gate is evaluated on the *signed* error before the absolute-value
/// reassignment; this ordering is load-bearing — do not "simplify" by
/// taking `abs()` up front.
pub fn update_baseline(b: &mut Baseline, o: &Observation, sigma: f64, alpha: f64) -> bool {
    let mut err = o.dist - b.dist_ewma;
    let gate = (err < alpha && err > -alpha) || b.dist_ewma == 0.0;
    if !gate {
        return false;
    }
    b.dist_ewma += DIST_GAIN * err;
    err = err.abs();
    b.mdev_ewma += MDEV_GAIN * (err - b.mdev_ewma);
    b.threshold = sigma * b.dist_ewma + alpha * b.mdev_ewma;
    b.adopt_observation(o);
    true
}

/// Cold-start seed: window 0 is the scratch
/// reference `o0`, window 1 has already been adopted into `b` directly (`b`
/// is treated as a plain observation at this moment). Computes
/// `distance(o0, b)`, stores it as `o0.dist`, then calls `update_baseline`
/// unconditionally — `b.dist_ewma` is still zero so the gate trivially
/// passes regardless of the computed distance.
pub fn seed_baseline(o0: &mut Observation, b: &mut Baseline, active: &ActiveSet, sigma: f64, alpha: f64) {
    let d = hellinger_sum(&*o0, &*b, active);
    o0.dist = d;
    update_baseline(b, o0, sigma, alpha);
}
