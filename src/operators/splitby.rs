use crate::core::error::Result;
use crate::core::types::FieldId;
use crate::store::{RecordSet, Store};

/// Splits a record set, already sorted by `field_id`, into runs wherever
/// two consecutive numeric values differ by more than `delta`
/// (`spec.md` §4.10) — e.g. bucketing a timestamp-sorted stream into
/// sessions.
pub struct SplitBy;

impl SplitBy {
    pub fn apply(store: &Store, set: &RecordSet, field_id: FieldId, delta: f64) -> Result<Vec<RecordSet>> {
        let mut groups = Vec::new();
        let mut current = Vec::new();
        let mut prev: Option<f64> = None;

        for &(rec_id, freq) in set.items() {
            let value = store.get_field_flt(rec_id, field_id)?;
            if let Some(p) = prev {
                if (value - p).abs() > delta {
                    groups.push(RecordSet::from_raw(set.store_id, std::mem::take(&mut current)));
                }
            }
            current.push((rec_id, freq));
            prev = Some(value);
        }
        if !current.is_empty() {
            groups.push(RecordSet::from_raw(set.store_id, current));
        }
        Ok(groups)
    }
}
