use std::collections::HashMap;

use crate::core::error::Result;
use crate::core::types::FieldId;
use crate::store::{RecordSet, Store};

/// Groups a record set by a field's value, preserving the order groups
/// were first seen (`spec.md` §4.10). Partitions by exact value equality
/// regardless of order, unlike `RecordSet::split_by`'s gap-based runs
/// over a sorted field.
pub struct GroupBy;

impl GroupBy {
    pub fn apply(store: &Store, set: &RecordSet, field_id: FieldId) -> Result<Vec<(String, RecordSet)>> {
        let mut order = Vec::new();
        let mut groups: HashMap<String, Vec<(crate::core::types::RecId, crate::core::types::Freq)>> = HashMap::new();

        for &(rec_id, freq) in set.items() {
            let key = store.get_field(rec_id, field_id)?.to_json().to_string();
            if !groups.contains_key(&key) {
                order.push(key.clone());
            }
            groups.entry(key).or_default().push((rec_id, freq));
        }

        Ok(order.into_iter().map(|key| {
            let items = groups.remove(&key).unwrap_or_default();
            (key, RecordSet::from_raw(set.store_id, items))
        }).collect())
    }
}
