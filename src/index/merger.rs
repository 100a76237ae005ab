//! The posting-list algebra: `Union`, `Intersect`, `Minus`, `Normalize`,
//! per `spec.md` §4.2 and the invariants in §8 (P3, P4). Grounded on the
//! teacher's `parallel/merger.rs` — same name, same job (combine sorted
//! sequences), generalized from segment metadata to `(RecId, Freq)`.

use crate::core::types::Freq;
use crate::index::posting::{PostingItem, PostingList};

pub struct Merger;

impl Merger {
    /// `Union(A,B)`: merge, summing frequencies on key collision.
    pub fn union(a: &PostingList, b: &PostingList) -> PostingList {
        let mut out = Vec::with_capacity(a.len() + b.len());
        let (mut i, mut j) = (0, 0);
        while i < a.0.len() && j < b.0.len() {
            let (pa, pb) = (a.0[i], b.0[j]);
            if pa.rec_id == pb.rec_id {
                out.push(PostingItem::new(pa.rec_id, pa.freq + pb.freq));
                i += 1;
                j += 1;
            } else if pa.rec_id < pb.rec_id {
                out.push(pa);
                i += 1;
            } else {
                out.push(pb);
                j += 1;
            }
        }
        out.extend_from_slice(&a.0[i..]);
        out.extend_from_slice(&b.0[j..]);
        PostingList(out)
    }

    /// `Intersect(A,B)`: keep keys present in both, summing frequencies.
    pub fn intersect(a: &PostingList, b: &PostingList) -> PostingList {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < a.0.len() && j < b.0.len() {
            let (pa, pb) = (a.0[i], b.0[j]);
            if pa.rec_id == pb.rec_id {
                out.push(PostingItem::new(pa.rec_id, pa.freq + pb.freq));
                i += 1;
                j += 1;
            } else if pa.rec_id < pb.rec_id {
                i += 1;
            } else {
                j += 1;
            }
        }
        PostingList(out)
    }

    /// `Minus(A,B) = {a ∈ A : a.key ∉ B}`. B's frequencies are ignored.
    pub fn minus(a: &PostingList, b: &PostingList) -> PostingList {
        let mut out = Vec::with_capacity(a.len());
        let (mut i, mut j) = (0, 0);
        while i < a.0.len() && j < b.0.len() {
            let (pa, pb) = (a.0[i], b.0[j]);
            if pa.rec_id == pb.rec_id {
                i += 1;
                j += 1;
            } else if pa.rec_id < pb.rec_id {
                out.push(pa);
                i += 1;
            } else {
                j += 1;
            }
        }
        out.extend_from_slice(&a.0[i..]);
        PostingList(out)
    }

    /// Sort if needed, fold duplicate record ids by summing their
    /// frequencies, and drop any item whose final frequency is `<= 0`
    /// (the tombstone encoding from §4.2/§9). A final freq strictly
    /// below zero indicates oversubtracting somewhere upstream — a bug,
    /// not a valid state — and is logged, not silently swallowed.
    pub fn normalize(mut items: Vec<PostingItem>) -> PostingList {
        if items.windows(2).any(|w| w[0].rec_id > w[1].rec_id) {
            items.sort_by_key(|p| p.rec_id);
        }

        let mut out: Vec<PostingItem> = Vec::with_capacity(items.len());
        for item in items {
            if let Some(last) = out.last_mut() {
                if last.rec_id == item.rec_id {
                    last.freq += item.freq;
                    continue;
                }
            }
            out.push(item);
        }

        out.retain(|p| {
            if p.freq < 0 {
                eprintln!(
                    "[warn] posting list normalize: rec {} has negative final freq {} (oversubtracted)",
                    p.rec_id.0, p.freq
                );
            }
            p.freq > 0
        });

        PostingList(out)
    }

    /// Clamp every item's frequency to `{0, 1}` — used where duplicate
    /// detection matters more than accumulated weight (§4.2).
    pub fn clamp_unit(list: &PostingList) -> PostingList {
        PostingList(
            list.0
                .iter()
                .map(|p| PostingItem::new(p.rec_id, clamp(p.freq)))
                .collect(),
        )
    }

    pub fn union_unique(a: &PostingList, b: &PostingList) -> PostingList {
        Self::normalize(Self::union(&Self::clamp_unit(a), &Self::clamp_unit(b)).0)
    }

    pub fn intersect_unique(a: &PostingList, b: &PostingList) -> PostingList {
        Self::normalize(Self::intersect(&Self::clamp_unit(a), &Self::clamp_unit(b)).0)
    }

    pub fn minus_unique(a: &PostingList, b: &PostingList) -> PostingList {
        Self::normalize(Self::minus(&Self::clamp_unit(a), &Self::clamp_unit(b)).0)
    }
}

fn clamp(freq: Freq) -> Freq {
    if freq > 0 { 1 } else { 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RecId;

    fn pl(items: &[(u64, i64)]) -> PostingList {
        PostingList(items.iter().map(|&(r, f)| PostingItem::new(RecId(r), f)).collect())
    }

    #[test]
    fn union_adds_overlapping_freqs() {
        let a = pl(&[(1, 2), (3, 1)]);
        let b = pl(&[(2, 5), (3, 4)]);
        let u = Merger::union(&a, &b);
        assert_eq!(u.rec_ids(), vec![RecId(1), RecId(2), RecId(3)]);
        assert_eq!(u.0[2].freq, 5);
    }

    #[test]
    fn intersect_keeps_only_shared_keys() {
        let a = pl(&[(1, 2), (2, 1), (3, 7)]);
        let b = pl(&[(2, 5), (3, 4), (4, 1)]);
        let i = Merger::intersect(&a, &b);
        assert_eq!(i.rec_ids(), vec![RecId(2), RecId(3)]);
    }

    #[test]
    fn minus_ignores_b_freqs() {
        let a = pl(&[(1, 2), (2, 1), (3, 7)]);
        let b = pl(&[(2, 0)]);
        let m = Merger::minus(&a, &b);
        assert_eq!(m.rec_ids(), vec![RecId(1), RecId(3)]);
    }

    #[test]
    fn normalize_drops_tombstones_and_sums_dupes() {
        let items = vec![
            PostingItem::new(RecId(5), 1),
            PostingItem::new(RecId(1), 3),
            PostingItem::new(RecId(1), -3),
            PostingItem::new(RecId(2), 0),
        ];
        let n = Merger::normalize(items);
        assert_eq!(n.rec_ids(), vec![RecId(5)]);
    }

    #[test]
    fn merger_algebra_p4() {
        let a = pl(&[(1, 1), (2, 1), (3, 1)]);
        let b = pl(&[(2, 1), (3, 1), (4, 1)]);
        let union: std::collections::HashSet<_> = Merger::union(&a, &b).rec_ids().into_iter().collect();
        let a_set: std::collections::HashSet<_> = a.rec_ids().into_iter().collect();
        let b_set: std::collections::HashSet<_> = b.rec_ids().into_iter().collect();
        assert!(a_set.is_subset(&union));
        assert!(b_set.is_subset(&union));

        let inter: std::collections::HashSet<_> = Merger::intersect(&a, &b).rec_ids().into_iter().collect();
        assert!(inter.is_subset(&a_set));
        assert!(inter.is_subset(&b_set));

        let minus: std::collections::HashSet<_> = Merger::minus(&a, &b).rec_ids().into_iter().collect();
        let reunited: std::collections::HashSet<_> = minus.union(&inter).copied().collect();
        assert_eq!(reunited, a_set);
    }
}
