//! Durable baseline checkpoints.

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::category::CallType;
use crate::domain::Baseline;
use crate::error::StoreError;

/// A snapshot of `B` plus the cursor it was taken at. Column order within
/// `categories` is the canonical order (`CallType::ALL`).
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub checkpoint_id: i64,
    pub baseline: Baseline,
    pub cursor: NaiveDateTime,
}

/// External collaborator for durable checkpoint storage, interfaced
/// narrowly so the controller never knows about SQL.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// The checkpoint with the maximum `checkpoint_id`, if any exist.
    async fn load_latest(&self) -> Result<Option<Checkpoint>, StoreError>;

    /// Insert a new checkpoint row; `checkpoint_id` is assigned by the
    /// store and is strictly increasing.
    async fn store(&self, baseline: &Baseline, cursor: NaiveDateTime) -> Result<i64, StoreError>;
}

pub struct PostgresCheckpointStore {
    client: tokio_postgres::Client,
    table: String,
}

impl PostgresCheckpointStore {
    pub fn new(client: tokio_postgres::Client, table: String) -> Self {
        PostgresCheckpointStore { client, table }
    }
}

#[async_trait]
impl CheckpointStore for PostgresCheckpointStore {
    async fn load_latest(&self) -> Result<Option<Checkpoint>, StoreError> {
        let max_query = format!("select max(threshold_id) from {}", self.table);
        let max_row = self.client.query_one(&max_query, &[]).await.map_err(StoreError::from)?;
        let max_id: Option<i64> = max_row.get(0);
        let Some(max_id) = max_id else {
            return Ok(None);
        };

        let select_query = format!(
            "select threshold_id, \
             num_int, dur_int, p_fint, p_dint, \
             num_mob, dur_mob, p_fmob, p_dmob, \
             num_prem, dur_prem, p_fprem, p_dprem, \
             num_ser, dur_ser, p_fser, p_dser, \
             num_dom, dur_dom, p_fdom, p_ddom, \
             num_emr, dur_emr, p_femr, p_demr, \
             num_total, dur_total, dist_value, mean_dev, threshold, last_ts \
             from {} where threshold_id = $1",
            self.table
        );
        let row = self
            .client
            .query_one(&select_query, &[&max_id])
            .await
            .map_err(StoreError::from)?;

        let mut baseline = Baseline::zero();
        for (i, _) in CallType::ALL.iter().enumerate() {
            let base = 1 + i * 4;
            baseline.categories[i].n = row.get::<_, f64>(base);
            baseline.categories[i].d = row.get::<_, f64>(base + 1);
            baseline.categories[i].pf = row.get::<_, f64>(base + 2);
            baseline.categories[i].pd = row.get::<_, f64>(base + 3);
        }
        baseline.num_total = row.get(25);
        baseline.dur_total = row.get(26);
        baseline.dist_ewma = row.get(27);
        baseline.mdev_ewma = row.get(28);
        baseline.threshold = row.get(29);
        baseline.restored = true;
        let cursor: NaiveDateTime = row.get(30);

        Ok(Some(Checkpoint {
            checkpoint_id: max_id,
            baseline,
            cursor,
        }))
    }

    async fn store(&self, baseline: &Baseline, cursor: NaiveDateTime) -> Result<i64, StoreError> {
        let next_id_query = format!("select coalesce(max(threshold_id), 0) + 1 from {}", self.table);
        let row = self.client.query_one(&next_id_query, &[]).await.map_err(StoreError::from)?;
        let next_id: i64 = row.get(0);

        let insert = format!(
            "insert into {}( \
             threshold_id, \
             num_int, dur_int, p_fint, p_dint, \
             num_mob, dur_mob, p_fmob, p_dmob, \
             num_prem, dur_prem, p_fprem, p_dprem, \
             num_ser, dur_ser, p_fser, p_dser, \
             num_dom, dur_dom, p_fdom, p_ddom, \
             num_emr, dur_emr, p_femr, p_demr, \
             num_total, dur_total, dist_value, mean_dev, threshold, last_ts) \
             values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22,$23,$24,$25,$26,$27,$28,$29,$30,$31)",
            self.table
        );

        let c = &baseline.categories;
        self.client
            .execute(
                &insert,
                &[
                    &next_id,
                    &c[0].n, &c[0].d, &c[0].pf, &c[0].pd,
                    &c[1].n, &c[1].d, &c[1].pf, &c[1].pd,
                    &c[2].n, &c[2].d, &c[2].pf, &c[2].pd,
                    &c[3].n, &c[3].d, &c[3].pf, &c[3].pd,
                    &c[4].n, &c[4].d, &c[4].pf, &c[4].pd,
                    &c[5].n, &c[5].d, &c[5].pf, &c[5].pd,
                    &baseline.num_total,
                    &baseline.dur_total,
                    &baseline.dist_ewma,
                    &baseline.mdev_ewma,
                    &baseline.threshold,
                    &cursor,
                ],
            )
            .await
            .map_err(StoreError::from)?;

        Ok(next_id)
    }
}
