//! Window Clock (C1): advances the detection cursor over CDR time.

use chrono::NaiveDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Online,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Continue,
    Done,
}

/// Holds the current window cursor and decides when the offline stream is
/// exhausted.
#[derive(Debug, Clone)]
pub struct WindowClock {
    cursor: NaiveDateTime,
    previous: NaiveDateTime,
    delta_minutes: i64,
    end: Option<NaiveDateTime>,
    mode: RunMode,
}

impl WindowClock {
    pub fn new(start: NaiveDateTime, delta_minutes: i64, end: Option<NaiveDateTime>, mode: RunMode) -> Self {
        WindowClock {
            cursor: start,
            previous: start,
            delta_minutes,
            end,
            mode,
        }
    }

    pub fn peek(&self) -> NaiveDateTime {
        self.cursor
    }

    /// The cursor value as of just before the most recent `advance()` call
    /// (used to label alert/status lines).
    pub fn previous(&self) -> NaiveDateTime {
        self.previous
    }

    pub fn delta_minutes(&self) -> i64 {
        self.delta_minutes
    }

    /// Snap the cursor forward to `ts`, but only if `ts` is strictly later
    /// than the current cursor.
    pub fn snap_forward(&mut self, ts: NaiveDateTime) {
        if ts > self.cursor {
            self.cursor = ts;
        }
    }

    pub fn set_cursor(&mut self, ts: NaiveDateTime) {
        self.cursor = ts;
        self.previous = ts;
    }

    /// Move the cursor forward by `delta_minutes` using calendar arithmetic.
    /// Returns `Done` if, in offline mode, the *new* cursor exceeds the
    /// configured end (checked after advancing, not before).
    pub fn advance(&mut self) -> Advance {
        self.previous = self.cursor;
        self.cursor += chrono::Duration::minutes(self.delta_minutes);
        if self.mode == RunMode::Offline
            && let Some(end) = self.end
            && self.cursor > end
        {
            return Advance::Done;
        }
        Advance::Continue
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(y: i32, m: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn cursor_monotonicity() {
        let mut clock = WindowClock::new(dt(2024, 1, 15, 10, 0), 10, None, RunMode::Online);
        let first = clock.peek();
        clock.advance();
        let second = clock.peek();
        assert_eq!(second, first + chrono::Duration::minutes(10));
        clock.advance();
        let third = clock.peek();
        assert_eq!(third, second + chrono::Duration::minutes(10));
    }

    #[test]
    fn hour_rollover_is_handled() {
        let mut clock = WindowClock::new(dt(2024, 1, 15, 23, 55), 10, None, RunMode::Online);
        clock.advance();
        assert_eq!(clock.peek(), dt(2024, 1, 16, 0, 5));
    }

    #[test]
    fn offline_termination_after_exact_tick_count() {
        // ending-date = 2024-01-15 11:00:00, start 10:00:00, delta=10 => 7
        // ticks then DONE (scenario 6: T_end = cursor + 6*delta, k+1 = 7).
        let start = dt(2024, 1, 15, 10, 0);
        let end = dt(2024, 1, 15, 11, 0);
        let mut clock = WindowClock::new(start, 10, Some(end), RunMode::Offline);
        let mut ticks = 0;
        loop {
            ticks += 1;
            if clock.advance() == Advance::Done {
                break;
            }
            assert!(ticks <= 10, "runaway loop");
        }
        assert_eq!(ticks, 7);
    }

    #[test]
    fn offline_termination_generalizes_to_k_ticks() {
        // T_end = cursor + k*delta performs exactly k+1 ticks (invariant 6).
        let start = dt(2024, 1, 10, 0, 0);
        let k = 4;
        let end = start + chrono::Duration::minutes(k * 10);
        let mut clock = WindowClock::new(start, 10, Some(end), RunMode::Offline);
        let mut ticks = 0;
        loop {
            ticks += 1;
            if clock.advance() == Advance::Done {
                break;
            }
            assert!(ticks <= 20, "runaway loop");
        }
        assert_eq!(ticks, (k + 1) as i32);
    }

    #[test]
    fn previous_reflects_pre_advance_cursor() {
        let mut clock = WindowClock::new(dt(2024, 1, 15, 10, 0), 10, None, RunMode::Online);
        clock.advance();
        assert_eq!(clock.previous(), dt(2024, 1, 15, 10, 0));
        assert_eq!(clock.peek(), dt(2024, 1, 15, 10, 10));
    }

    #[test]
    fn snap_forward_ignores_earlier_timestamps() {
        let mut clock = WindowClock::new(dt(2024, 1, 15, 10, 0), 10, None, RunMode::Online);
        clock.snap_forward(dt(2024, 1, 15, 9, 0));
        assert_eq!(clock.peek(), dt(2024, 1, 15, 10, 0));
        clock.snap_forward(dt(2024, 1, 15, 12, 0));
        assert_eq!(clock.peek(), dt(2024, 1, 15, 12, 0));
    }
}
