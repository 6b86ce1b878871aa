//! Raw CDR row schema.

use chrono::NaiveDateTime;

/// One row as read from the CDR relation: `(id, calldate, src, dst, billsec,
/// calltype, accountcode)`.
#[derive(Debug, Clone)]
pub struct CdrRow {
    pub id: i64,
    pub calldate: NaiveDateTime,
    pub src: String,
    pub dst: String,
    pub billsec: i64,
    pub calltype: String,
    pub accountcode: String,
}
