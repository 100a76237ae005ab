use serde::{Deserialize, Serialize};

use crate::core::types::{FieldId, RecId, StoreId};

/// A query tree node (`spec.md` §4.7). One struct per variant, matching
/// the teacher's `query/ast.rs` tagged-union shape, re-keyed to
/// qminer's node set: no `Phrase`/`Fuzzy`/`Prefix`/relevance-scoring
/// variants, since there is no ranking model here — a record set's
/// weight is `Freq`, not a score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Node {
    /// Matches every record whose `key`'s posting list contains `word`.
    LeafGix { key_name: String, word: String },
    /// Range leaf: every record whose `key`'s sort order places it
    /// between `from` and `to` (either bound optional).
    LeafRange { key_name: String, from: Option<String>, to: Option<String> },
    /// Glob leaf: every record whose `key` has a word matching the
    /// wildcard pattern.
    LeafWildcard { key_name: String, pattern: String },
    /// Geo leaf: records within `radius_m` meters of `(lat, lon)`.
    Geo { key_name: String, lat: f64, lon: f64, radius_m: f64, limit: usize },
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
    /// A single explicit record.
    Rec { store: StoreId, rec_id: RecId },
    /// An explicit, caller-supplied set of records.
    RecSet { store: StoreId, rec_ids: Vec<RecId> },
    /// Every live record in a store.
    Store { store: StoreId },
    /// Joins the result of `source` across `join_name`.
    Join { join_name: String, source: Box<Node> },
}

impl Node {
    pub fn and(children: Vec<Node>) -> Node {
        Node::And(children)
    }

    pub fn or(children: Vec<Node>) -> Node {
        Node::Or(children)
    }

    pub fn not(child: Node) -> Node {
        Node::Not(Box::new(child))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDir {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SortSpec {
    ById(SortDir),
    ByFq(SortDir),
    ByField(FieldId, SortDir),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub store: StoreId,
    pub root: Node,
    pub aggr_fields: Vec<FieldId>,
    pub sort: Option<SortSpec>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Query {
    pub fn new(store: StoreId, root: Node) -> Self {
        Query { store, root, aggr_fields: Vec::new(), sort: None, limit: None, offset: 0 }
    }
}
