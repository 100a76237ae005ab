use std::cmp::Ordering;

use rand::seq::SliceRandom;
use rand::thread_rng;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{FieldId, FieldValue, Freq, RecId, StoreId};
use crate::index::{Merger, PostingItem, PostingList};
use crate::schema::JoinKind;
use crate::store::store::Store;

/// A weighted set of records from one store — the result of a query
/// leaf, a join traversal, or a store-wide scan (`spec.md` §4.6). Dead
/// `RecId`s are filtered out at construction time, not lazily, so every
/// other operation can assume liveness.
#[derive(Debug, Clone)]
pub struct RecordSet {
    pub store_id: StoreId,
    items: Vec<(RecId, Freq)>,
}

impl RecordSet {
    pub fn new(store_id: StoreId, store: &Store, items: Vec<(RecId, Freq)>) -> Self {
        let live: std::collections::HashSet<RecId> = store.get_all_recs().into_iter().collect();
        let items = items.into_iter().filter(|(rec_id, _)| live.contains(rec_id)).collect();
        RecordSet { store_id, items }
    }

    /// Builds a record set directly from a Gix posting list, filtering
    /// against the store's currently-live records.
    pub fn from_posting_list(store_id: StoreId, store: &Store, list: &PostingList) -> Self {
        let live: std::collections::HashSet<RecId> = store.get_all_recs().into_iter().collect();
        let items = list.0.iter().filter(|p| live.contains(&p.rec_id)).map(|p| (p.rec_id, p.freq)).collect();
        RecordSet { store_id, items }
    }

    pub fn empty(store_id: StoreId) -> Self {
        RecordSet { store_id, items: Vec::new() }
    }

    pub fn from_raw(store_id: StoreId, items: Vec<(RecId, Freq)>) -> Self {
        RecordSet { store_id, items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn rec_ids(&self) -> Vec<RecId> {
        self.items.iter().map(|(r, _)| *r).collect()
    }

    pub fn items(&self) -> &[(RecId, Freq)] {
        &self.items
    }

    pub fn to_posting_list(&self) -> PostingList {
        let mut items: Vec<PostingItem> = self.items.iter().map(|&(r, f)| PostingItem::new(r, f)).collect();
        items.sort_by_key(|p| p.rec_id);
        Merger::normalize(items)
    }

    pub fn sort_by_id(&mut self, ascending: bool) {
        self.items.sort_by(|a, b| if ascending { a.0.cmp(&b.0) } else { b.0.cmp(&a.0) });
    }

    pub fn sort_by_fq(&mut self, ascending: bool) {
        self.items.sort_by(|a, b| if ascending { a.1.cmp(&b.1) } else { b.1.cmp(&a.1) });
    }

    pub fn sort_by_field(&mut self, store: &Store, field_id: FieldId, ascending: bool) -> Result<()> {
        let mut err = None;
        self.items.sort_by(|a, b| {
            let va = store.get_field(a.0, field_id);
            let vb = store.get_field(b.0, field_id);
            match (va, vb) {
                (Ok(va), Ok(vb)) => {
                    let ord = compare_field_values(&va, &vb);
                    if ascending { ord } else { ord.reverse() }
                }
                (Err(e), _) | (_, Err(e)) => {
                    err = Some(e);
                    Ordering::Equal
                }
            }
        });
        match err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn sort_by(&mut self, mut cmp: impl FnMut(RecId, RecId) -> Ordering) {
        self.items.sort_by(|a, b| cmp(a.0, b.0));
    }

    pub fn filter_by_rec_id(&mut self, rec_id: RecId, keep: bool) {
        self.items.retain(|(r, _)| (*r == rec_id) == keep);
    }

    pub fn filter_by_rec_id_set(&mut self, set: &std::collections::HashSet<RecId>, keep: bool) {
        self.items.retain(|(r, _)| set.contains(r) == keep);
    }

    pub fn filter_by_fq(&mut self, min: Freq, max: Freq) {
        self.items.retain(|(_, f)| *f >= min && *f <= max);
    }

    pub fn filter_by_field(&mut self, store: &Store, field_id: FieldId, mut pred: impl FnMut(&FieldValue) -> bool) -> Result<()> {
        let mut keep = Vec::with_capacity(self.items.len());
        for (rec_id, freq) in &self.items {
            let value = store.get_field(*rec_id, field_id)?;
            if pred(&value) {
                keep.push((*rec_id, *freq));
            }
        }
        self.items = keep;
        Ok(())
    }

    pub fn filter_by(&mut self, mut pred: impl FnMut(RecId, Freq) -> bool) {
        self.items.retain(|(r, f)| pred(*r, *f));
    }

    /// Splits a set already sorted by `field_id` into runs wherever two
    /// consecutive numeric values differ by more than `delta` (`spec.md`
    /// §4.6), e.g. bucketing a timestamp-sorted stream into sessions.
    /// Distinct from `GroupBy`, which partitions by exact value equality
    /// regardless of order.
    pub fn split_by(&self, store: &Store, field_id: FieldId, delta: f64) -> Result<Vec<RecordSet>> {
        let mut groups = Vec::new();
        let mut current = Vec::new();
        let mut prev: Option<f64> = None;

        for &(rec_id, freq) in &self.items {
            let value = store.get_field(rec_id, field_id)?.as_flt()?;
            if let Some(p) = prev {
                if (value - p).abs() > delta {
                    groups.push(RecordSet { store_id: self.store_id, items: std::mem::take(&mut current) });
                }
            }
            current.push((rec_id, freq));
            prev = Some(value);
        }
        if !current.is_empty() {
            groups.push(RecordSet { store_id: self.store_id, items: current });
        }
        Ok(groups)
    }

    pub fn sample(&mut self, count: usize) {
        self.items.shuffle(&mut thread_rng());
        self.items.truncate(count);
    }

    pub fn shuffle(&mut self) {
        self.items.shuffle(&mut thread_rng());
    }

    pub fn reverse(&mut self) {
        self.items.reverse();
    }

    pub fn trunc(&mut self, limit: usize) {
        self.items.truncate(limit);
    }

    pub fn limit(&self, limit: usize, offset: usize) -> RecordSet {
        let items = self.items.iter().skip(offset).take(limit).copied().collect();
        RecordSet { store_id: self.store_id, items }
    }

    /// `spec.md` §4.6: set operations "require same store"; a mismatch
    /// is the §4.7 "ambiguous or inconsistent cross-store results" case.
    fn check_same_store(&self, other: &RecordSet) -> Result<()> {
        if self.store_id != other.store_id {
            return Err(Error::new(
                ErrorKind::StoreMismatch,
                format!("cannot combine record sets from different stores ({:?} vs {:?})", self.store_id, other.store_id),
            ));
        }
        Ok(())
    }

    pub fn get_merge(&self, other: &RecordSet) -> Result<RecordSet> {
        self.check_same_store(other)?;
        let merged = Merger::union(&self.to_posting_list(), &other.to_posting_list());
        Ok(RecordSet { store_id: self.store_id, items: merged.0.into_iter().map(|p| (p.rec_id, p.freq)).collect() })
    }

    pub fn get_intersect(&self, other: &RecordSet) -> Result<RecordSet> {
        self.check_same_store(other)?;
        let merged = Merger::intersect(&self.to_posting_list(), &other.to_posting_list());
        Ok(RecordSet { store_id: self.store_id, items: merged.0.into_iter().map(|p| (p.rec_id, p.freq)).collect() })
    }

    /// `self \ other`, by record id (ignores `other`'s frequencies).
    pub fn filter_out(&self, other: &RecordSet) -> RecordSet {
        let merged = Merger::minus(&self.to_posting_list(), &other.to_posting_list());
        RecordSet { store_id: self.store_id, items: merged.0.into_iter().map(|p| (p.rec_id, p.freq)).collect() }
    }

    /// Traverses a join from every record in this set. Index-joins OR
    /// together each record's posting list under the join's Gix key;
    /// field-joins accumulate the target's frequency instead of
    /// unioning postings — the two are not interchangeable, per
    /// `spec.md` §9.
    pub fn do_join(&self, store: &Store, target_store: &Store, join_name: &str, gix: &mut crate::index::Gix) -> Result<RecordSet> {
        let join = store.schema().join_by_name(join_name)?.clone();
        match join.kind {
            JoinKind::Field => {
                let rec_field = join.field_rec_id.unwrap();
                let fq_field = join.field_freq.unwrap();
                let mut out = Vec::with_capacity(self.items.len());
                for &(rec_id, _) in &self.items {
                    let target_id = store.get_field(rec_id, rec_field)?.as_uint64()?;
                    if target_id == u64::MAX {
                        continue;
                    }
                    let freq = store.get_field(rec_id, fq_field)?.as_int()?;
                    out.push((RecId(target_id), freq));
                }
                Ok(RecordSet::from_raw(target_store.id(), out))
            }
            JoinKind::Index => {
                let key_id = join.join_key_id.unwrap();
                let mut acc = PostingList::new();
                for &(rec_id, _) in &self.items {
                    let word_id = crate::core::types::WordId(rec_id.0);
                    let list = gix.get_posting_list(key_id, word_id)?;
                    acc = Merger::union(&acc, &list);
                }
                Ok(RecordSet::from_posting_list(target_store.id(), target_store, &acc))
            }
        }
    }

    pub fn get_json(&self, store: &Store) -> Result<serde_json::Value> {
        let mut out = Vec::with_capacity(self.items.len());
        for &(rec_id, _) in &self.items {
            let record = crate::store::record::Record::by_ref(self.store_id, rec_id);
            out.push(record.to_json(store)?);
        }
        Ok(serde_json::Value::Array(out))
    }

    pub fn get_aggr_json(&self, store: &Store, field_id: FieldId) -> Result<serde_json::Value> {
        let mut count = 0u64;
        let mut sum = 0.0f64;
        for &(rec_id, _) in &self.items {
            if let Ok(v) = store.get_field(rec_id, field_id) {
                if let Ok(f) = v.as_flt() {
                    sum += f;
                    count += 1;
                }
            }
        }
        Ok(serde_json::json!({ "count": count, "sum": sum, "avg": if count > 0 { sum / count as f64 } else { 0.0 } }))
    }
}

fn compare_field_values(a: &FieldValue, b: &FieldValue) -> Ordering {
    match (a, b) {
        (FieldValue::Int(a), FieldValue::Int(b)) => a.cmp(b),
        (FieldValue::UInt64(a), FieldValue::UInt64(b)) => a.cmp(b),
        (FieldValue::Str(a), FieldValue::Str(b)) => a.cmp(b),
        (FieldValue::Flt(a), FieldValue::Flt(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, StoreSchema};

    fn store_with_ages(ages: &[i64]) -> (Store, Vec<RecId>, FieldId) {
        let mut schema = StoreSchema::new(StoreId(0), "people");
        let age_f = schema.add_field("age", FieldType::Int).unwrap();
        let mut store = Store::new(schema);
        let rec_ids = ages.iter().map(|a| store.add_rec(vec![(age_f, FieldValue::Int(*a))]).unwrap()).collect();
        (store, rec_ids, age_f)
    }

    #[test]
    fn sort_by_id_and_fq() {
        let (store, recs, _) = store_with_ages(&[1, 2, 3]);
        let mut set = RecordSet::new(StoreId(0), &store, vec![(recs[2], 1), (recs[0], 9), (recs[1], 3)]);
        set.sort_by_id(true);
        assert_eq!(set.rec_ids(), vec![recs[0], recs[1], recs[2]]);
        set.sort_by_fq(false);
        assert_eq!(set.items()[0].1, 9);
    }

    #[test]
    fn sort_by_field_orders_by_value() {
        let (store, recs, age_f) = store_with_ages(&[30, 10, 20]);
        let mut set = RecordSet::new(StoreId(0), &store, recs.iter().map(|r| (*r, 1)).collect());
        set.sort_by_field(&store, age_f, true).unwrap();
        let ages: Vec<i64> = set.rec_ids().iter().map(|r| store.get_field_int(*r, age_f).unwrap()).collect();
        assert_eq!(ages, vec![10, 20, 30]);
    }

    #[test]
    fn dead_rec_ids_are_filtered_at_construction() {
        let (mut store, recs, _) = store_with_ages(&[1, 2]);
        store.del_rec(recs[0]).unwrap();
        let set = RecordSet::new(StoreId(0), &store, vec![(recs[0], 1), (recs[1], 1)]);
        assert_eq!(set.rec_ids(), vec![recs[1]]);
    }

    #[test]
    fn get_merge_and_intersect_combine_same_store_sets() {
        let (store, recs, _) = store_with_ages(&[1, 2, 3]);
        let a = RecordSet::new(StoreId(0), &store, vec![(recs[0], 1), (recs[1], 1)]);
        let b = RecordSet::new(StoreId(0), &store, vec![(recs[1], 1), (recs[2], 1)]);

        let mut merged = a.get_merge(&b).unwrap();
        merged.sort_by_id(true);
        assert_eq!(merged.rec_ids(), vec![recs[0], recs[1], recs[2]]);

        let inter = a.get_intersect(&b).unwrap();
        assert_eq!(inter.rec_ids(), vec![recs[1]]);

        let minus = a.filter_out(&b);
        assert_eq!(minus.rec_ids(), vec![recs[0]]);
    }

    #[test]
    fn get_merge_across_stores_errors_with_store_mismatch() {
        let (store, recs, _) = store_with_ages(&[1]);
        let a = RecordSet::new(StoreId(0), &store, vec![(recs[0], 1)]);
        let b = RecordSet::new(StoreId(1), &store, vec![(recs[0], 1)]);
        let err = a.get_merge(&b).unwrap_err();
        assert_eq!(err.kind, ErrorKind::StoreMismatch);
        let err = a.get_intersect(&b).unwrap_err();
        assert_eq!(err.kind, ErrorKind::StoreMismatch);
    }

    #[test]
    fn split_by_breaks_on_gaps_larger_than_delta() {
        let (store, recs, age_f) = store_with_ages(&[5, 7, 8, 20, 21]);
        let set = RecordSet::new(StoreId(0), &store, recs.iter().map(|r| (*r, 1)).collect());
        let groups = set.split_by(&store, age_f, 2.0).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].rec_ids(), vec![recs[0], recs[1], recs[2]]);
        assert_eq!(groups[1].rec_ids(), vec![recs[3], recs[4]]);
    }

    #[test]
    fn split_by_keeps_one_run_when_delta_covers_every_gap() {
        let (store, recs, age_f) = store_with_ages(&[5, 7, 5, 9, 7]);
        let set = RecordSet::new(StoreId(0), &store, recs.iter().map(|r| (*r, 1)).collect());
        let groups = set.split_by(&store, age_f, 10.0).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].rec_ids(), recs);
    }

    #[test]
    fn limit_applies_offset_then_truncates() {
        let (store, recs, _) = store_with_ages(&[1, 2, 3, 4]);
        let set = RecordSet::new(StoreId(0), &store, recs.iter().map(|r| (*r, 1)).collect());
        let limited = set.limit(2, 1);
        assert_eq!(limited.rec_ids(), vec![recs[1], recs[2]]);
    }
}
