//! Geo index, one per geo-flagged `IndexKey` (`spec.md` §4.3). Recovered
//! from `original_source/src/qminer/qminer_core.cpp`'s `TGeoIndex` —
//! there is no teacher equivalent, so this module follows the original
//! bucket-quantization + great-circle search design directly, using the
//! `geo` crate's haversine primitive in place of hand-rolled trig.

use std::collections::HashMap;

use geo::{HaversineDistance, Point};
use serde::{Deserialize, Serialize};

use crate::core::types::RecId;

/// Default quantization factor: `round(lat * PRECISION)` buckets
/// locations to roughly one meter, matching `TGeoIndex::New()`'s
/// `1000000.0` default.
pub const DEFAULT_PRECISION: f64 = 1_000_000.0;

type BucketId = (i64, i64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoIndex {
    precision: f64,
    buckets: HashMap<BucketId, Vec<RecId>>,
    bucket_loc: HashMap<BucketId, (f64, f64)>,
}

impl GeoIndex {
    pub fn new(precision: f64) -> Self {
        GeoIndex { precision, buckets: HashMap::new(), bucket_loc: HashMap::new() }
    }

    fn bucket_id(&self, lat: f64, lon: f64) -> BucketId {
        ((lat * self.precision).round() as i64, (lon * self.precision).round() as i64)
    }

    /// Adds `rec_id` at `(lat, lon)`, reusing the bucket if one already
    /// exists at this precision, allocating a new one otherwise.
    pub fn add(&mut self, lat: f64, lon: f64, rec_id: RecId) {
        let id = self.bucket_id(lat, lon);
        self.bucket_loc.entry(id).or_insert((lat, lon));
        self.buckets.entry(id).or_default().push(rec_id);
    }

    /// Removes `rec_id` from `(lat, lon)`'s bucket; drops the bucket
    /// entirely once its last record is gone.
    pub fn del(&mut self, lat: f64, lon: f64, rec_id: RecId) {
        let id = self.bucket_id(lat, lon);
        if let Some(recs) = self.buckets.get_mut(&id) {
            recs.retain(|&r| r != rec_id);
            if recs.is_empty() {
                self.buckets.remove(&id);
                self.bucket_loc.remove(&id);
            }
        }
    }

    /// All records within `radius_m` meters of `(lat, lon)`, truncated at
    /// `limit` (nearest buckets first, so the surviving records are the
    /// closest ones when the radius holds more than `limit`), then
    /// returned sorted by `RecId` — distance decides who makes the cut,
    /// `RecId` decides the output order.
    pub fn range(&self, lat: f64, lon: f64, radius_m: f64, limit: usize) -> Vec<RecId> {
        let origin = Point::new(lon, lat);
        let mut hits: Vec<(f64, BucketId)> = self
            .bucket_loc
            .iter()
            .filter_map(|(&id, &(blat, blon))| {
                let p = Point::new(blon, blat);
                let d = origin.haversine_distance(&p);
                (d <= radius_m).then_some((d, id))
            })
            .collect();
        hits.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        let mut out = self.collect_limited(&hits, limit);
        out.sort();
        out
    }

    /// The `limit` nearest records to `(lat, lon)`, regardless of
    /// distance.
    pub fn nn(&self, lat: f64, lon: f64, limit: usize) -> Vec<RecId> {
        let origin = Point::new(lon, lat);
        let mut hits: Vec<(f64, BucketId)> = self
            .bucket_loc
            .iter()
            .map(|(&id, &(blat, blon))| {
                let p = Point::new(blon, blat);
                (origin.haversine_distance(&p), id)
            })
            .collect();
        hits.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        self.collect_limited(&hits, limit)
    }

    fn collect_limited(&self, hits: &[(f64, BucketId)], limit: usize) -> Vec<RecId> {
        let mut out = Vec::with_capacity(limit);
        for &(_, id) in hits {
            if let Some(recs) = self.buckets.get(&id) {
                out.extend(recs.iter().copied());
                if out.len() >= limit {
                    break;
                }
            }
        }
        out.truncate(limit);
        out
    }

    /// Whether two locations fall in the same quantization bucket.
    pub fn loc_equals(&self, lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> bool {
        self.bucket_id(lat1, lon1) == self.bucket_id(lat2, lon2)
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn rec_count(&self) -> usize {
        self.buckets.values().map(|v| v.len()).sum()
    }
}

impl Default for GeoIndex {
    fn default() -> Self {
        GeoIndex::new(DEFAULT_PRECISION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_range_finds_nearby() {
        let mut idx = GeoIndex::default();
        idx.add(46.0569, 14.5058, RecId(1)); // Ljubljana
        idx.add(48.8566, 2.3522, RecId(2)); // Paris

        let near = idx.range(46.05, 14.5, 20_000.0, 10);
        assert_eq!(near, vec![RecId(1)]);
    }

    #[test]
    fn del_drops_empty_bucket() {
        let mut idx = GeoIndex::default();
        idx.add(10.0, 10.0, RecId(7));
        idx.del(10.0, 10.0, RecId(7));
        assert_eq!(idx.bucket_count(), 0);
    }

    #[test]
    fn loc_equals_is_precision_bucketed() {
        let idx = GeoIndex::new(100.0);
        assert!(idx.loc_equals(1.001, 2.001, 1.004, 2.004));
        assert!(!idx.loc_equals(1.001, 2.001, 1.1, 2.1));
    }

    #[test]
    fn nn_orders_by_distance() {
        let mut idx = GeoIndex::default();
        idx.add(0.0, 0.0, RecId(1));
        idx.add(0.0, 1.0, RecId(2));
        idx.add(0.0, 5.0, RecId(3));

        let nearest = idx.nn(0.0, 0.0, 2);
        assert_eq!(nearest, vec![RecId(1), RecId(2)]);
    }
}
