use crate::core::error::Result;
use crate::core::types::{FieldId, FieldValue};
use crate::store::{RecordSet, Store};

/// Linear-scan predicates over one field (`spec.md` §4.10): a fallback
/// for fields that carry no `IndexKey`, or for comparisons the index
/// can't answer directly.
#[derive(Debug, Clone)]
pub enum LinSearchOp {
    Eq(FieldValue),
    Ne(FieldValue),
    Lt(FieldValue),
    Gt(FieldValue),
    Range(FieldValue, FieldValue),
    In(Vec<FieldValue>),
    NotIn(Vec<FieldValue>),
}

pub struct LinSearch;

impl LinSearch {
    pub fn apply(store: &Store, set: &RecordSet, field_id: FieldId, op: &LinSearchOp) -> Result<RecordSet> {
        let mut result = set.clone();
        result.filter_by_field(store, field_id, |v| matches(v, op))?;
        Ok(result)
    }
}

fn matches(value: &FieldValue, op: &LinSearchOp) -> bool {
    use std::cmp::Ordering;
    let cmp = |a: &FieldValue, b: &FieldValue| -> Option<Ordering> {
        match (a, b) {
            (FieldValue::Int(a), FieldValue::Int(b)) => a.partial_cmp(b),
            (FieldValue::UInt64(a), FieldValue::UInt64(b)) => a.partial_cmp(b),
            (FieldValue::Flt(a), FieldValue::Flt(b)) => a.partial_cmp(b),
            (FieldValue::Str(a), FieldValue::Str(b)) => a.partial_cmp(b),
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => a.partial_cmp(b),
            _ => None,
        }
    };
    let eq = |a: &FieldValue, b: &FieldValue| cmp(a, b) == Some(Ordering::Equal);

    match op {
        LinSearchOp::Eq(target) => eq(value, target),
        LinSearchOp::Ne(target) => !eq(value, target),
        LinSearchOp::Lt(bound) => cmp(value, bound) == Some(Ordering::Less),
        LinSearchOp::Gt(bound) => cmp(value, bound) == Some(Ordering::Greater),
        LinSearchOp::Range(lo, hi) => matches!(cmp(value, lo), Some(Ordering::Greater | Ordering::Equal)) && matches!(cmp(value, hi), Some(Ordering::Less | Ordering::Equal)),
        LinSearchOp::In(targets) => targets.iter().any(|t| eq(value, t)),
        LinSearchOp::NotIn(targets) => !targets.iter().any(|t| eq(value, t)),
    }
}
