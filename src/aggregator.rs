//! CDR Aggregator (C2): fetches and reduces one window's CDR rows.

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::category::{ActiveSet, CallType};
use crate::cdr::CdrRow;
use crate::domain::Observation;
use crate::error::StoreError;

/// The external CDR relation, interfaced narrowly so the engine never knows
/// about SQL or connection pooling.
#[async_trait]
pub trait CdrSource: Send + Sync {
    /// Rows with `calldate` in `[start, start + delta_minutes]` (inclusive
    /// upper bound, matching the source's `between … and …+interval` — spec
    /// §4.2), `calltype` in `active`, and `accountcode = institution`.
    async fn fetch_window(
        &self,
        start: NaiveDateTime,
        delta_minutes: i64,
        institution: &str,
        active: &ActiveSet,
    ) -> Result<Vec<CdrRow>, StoreError>;

    /// The second row's `calldate`, ordered by `id` — used to pick a
    /// starting cursor when none is configured.
    async fn second_row_calldate(&self) -> Result<NaiveDateTime, StoreError>;
}

/// Reduce a batch of rows into an `Observation`. Pure, so it is
/// reused by both the real `tokio-postgres` source and any fake used in
/// tests.
pub fn reduce_rows(rows: &[CdrRow], active: &ActiveSet, freq_floor: f64, dur_floor: f64) -> Observation {
    let mut o = Observation::empty();
    for row in rows {
        if let Some(ct) = CallType::parse(&row.calltype) {
            o.record_call(ct, row.billsec as f64);
        }
    }
    o.finalize(active, freq_floor, dur_floor);
    o
}

pub struct PostgresCdrSource {
    client: tokio_postgres::Client,
    table: String,
}

impl PostgresCdrSource {
    pub fn new(client: tokio_postgres::Client, table: String) -> Self {
        PostgresCdrSource { client, table }
    }
}

#[async_trait]
impl CdrSource for PostgresCdrSource {
    async fn fetch_window(
        &self,
        start: NaiveDateTime,
        delta_minutes: i64,
        institution: &str,
        active: &ActiveSet,
    ) -> Result<Vec<CdrRow>, StoreError> {
        let end = start + chrono::Duration::minutes(delta_minutes);
        let calltypes: Vec<&str> = active.active_iter().map(|c| c.as_str()).collect();

        // Parameterized query: calltype/accountcode/timestamps are all bind
        // parameters, never interpolated into the SQL text.
        let query = format!(
            "select id, calldate, src, dst, billsec, calltype, accountcode from {} \
             where calldate between $1 and $2 and calltype = any($3) and accountcode = $4",
            self.table
        );
        let rows = self
            .client
            .query(&query, &[&start, &end, &calltypes, &institution])
            .await
            .map_err(StoreError::from)?;

        Ok(rows
            .into_iter()
            .map(|row| CdrRow {
                id: row.get(0),
                calldate: row.get(1),
                src: row.get(2),
                dst: row.get(3),
                billsec: row.get(4),
                calltype: row.get(5),
                accountcode: row.get(6),
            })
            .collect())
    }

    async fn second_row_calldate(&self) -> Result<NaiveDateTime, StoreError> {
        let query = format!("select calldate from {} order by id limit 1 offset 1", self.table);
        let row = self
            .client
            .query_one(&query, &[])
            .await
            .map_err(StoreError::from)?;
        Ok(row.get(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(calltype: &str, billsec: i64) -> CdrRow {
        CdrRow {
            id: 1,
            calldate: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(10, 0, 0).unwrap(),
            src: "1000".into(),
            dst: "2000".into(),
            billsec,
            calltype: calltype.into(),
            accountcode: "acct".into(),
        }
    }

    #[test]
    fn reduce_rows_buckets_by_category() {
        let active = ActiveSet::all();
        let rows = vec![row("MOBILE", 60), row("MOBILE", 30), row("PREMIUM", 120)];
        let o = reduce_rows(&rows, &active, 0.0, 0.0);
        assert_eq!(o.stats(CallType::Mobile).n, 2.0);
        assert_eq!(o.stats(CallType::Mobile).d, 90.0);
        assert_eq!(o.stats(CallType::Premium).n, 1.0);
        assert_eq!(o.num_total, 3.0);
    }

    #[test]
    fn reduce_rows_ignores_unparseable_calltype() {
        let active = ActiveSet::all();
        let rows = vec![row("CARRIER_PIGEON", 60)];
        let o = reduce_rows(&rows, &active, 0.0, 0.0);
        assert_eq!(o.num_total, 0.0);
    }

    #[test]
    fn reduce_rows_respects_floors() {
        let active = ActiveSet::parse("mobile").unwrap();
        let rows = vec![row("MOBILE", 10)];
        let o = reduce_rows(&rows, &active, 100.0, 1000.0);
        assert_eq!(o.stats(CallType::Mobile).pf, 0.0);
    }
}
