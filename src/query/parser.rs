//! JSON query surface (`spec.md` §4.7, §6): `$and/$or/$not/$join/$from/
//! $id/$name/$sort/$limit/$offset/$aggr`, plain keys as `IndexKey`
//! constraints, `$ne/$gt/$lt/$wc/$location+$radius+$limit`, array-under-
//! key as implicit And. Grounded on the teacher's `query/parser.rs`
//! string-query tokenizer, generalized to a `serde_json::Value` walk.

use serde_json::Value;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{RecId, StoreId};
use crate::query::ast::{Node, Query, SortDir, SortSpec};
use crate::schema::StoreSchema;

/// Resolves store/field names to ids while parsing — implemented by
/// whatever owns the schema registry (typically `Base`).
pub trait SchemaLookup {
    fn store_id_by_name(&self, name: &str) -> Result<StoreId>;
    fn schema(&self, store_id: StoreId) -> Result<&StoreSchema>;
}

pub fn parse_query(value: &Value, lookup: &impl SchemaLookup) -> Result<Query> {
    let obj = value.as_object().ok_or_else(|| Error::new(ErrorKind::MalformedQuery, "query root must be an object"))?;

    let store_id = if let Some(from) = obj.get("$from") {
        let name = from.as_str().ok_or_else(|| Error::new(ErrorKind::MalformedQuery, "$from must be a string"))?;
        lookup.store_id_by_name(name)?
    } else {
        return Err(Error::new(ErrorKind::MalformedQuery, "query is missing $from"));
    };

    let root = parse_node(value, store_id, lookup)?;
    let mut query = Query::new(store_id, root);

    if let Some(sort) = obj.get("$sort") {
        query.sort = Some(parse_sort(sort, store_id, lookup)?);
    }
    if let Some(limit) = obj.get("$limit") {
        query.limit = Some(limit.as_u64().ok_or_else(|| Error::new(ErrorKind::MalformedQuery, "$limit must be a number"))? as usize);
    }
    if let Some(offset) = obj.get("$offset") {
        query.offset = offset.as_u64().ok_or_else(|| Error::new(ErrorKind::MalformedQuery, "$offset must be a number"))? as usize;
    }
    if let Some(aggr) = obj.get("$aggr") {
        let names = aggr.as_array().ok_or_else(|| Error::new(ErrorKind::MalformedQuery, "$aggr must be an array"))?;
        let schema = lookup.schema(store_id)?;
        for n in names {
            let n = n.as_str().ok_or_else(|| Error::new(ErrorKind::MalformedQuery, "$aggr entries must be strings"))?;
            query.aggr_fields.push(schema.field_by_name(n)?.field_id);
        }
    }

    Ok(query)
}

fn parse_sort(value: &Value, store_id: StoreId, lookup: &impl SchemaLookup) -> Result<SortSpec> {
    let obj = value.as_object().ok_or_else(|| Error::new(ErrorKind::MalformedQuery, "$sort must be an object"))?;
    let (name, dir) = obj.iter().next().ok_or_else(|| Error::new(ErrorKind::MalformedQuery, "$sort must name one field"))?;
    let dir = if dir.as_i64().unwrap_or(1) >= 0 { SortDir::Asc } else { SortDir::Desc };
    match name.as_str() {
        "$id" => Ok(SortSpec::ById(dir)),
        "$fq" => Ok(SortSpec::ByFq(dir)),
        field_name => {
            let schema = lookup.schema(store_id)?;
            Ok(SortSpec::ByField(schema.field_by_name(field_name)?.field_id, dir))
        }
    }
}

fn parse_node(value: &Value, store_id: StoreId, lookup: &impl SchemaLookup) -> Result<Node> {
    let obj = match value.as_object() {
        Some(obj) => obj,
        None => return Err(Error::new(ErrorKind::MalformedQuery, "query node must be an object")),
    };

    let mut and_terms = Vec::new();

    for (key, val) in obj {
        match key.as_str() {
            "$from" | "$sort" | "$limit" | "$offset" | "$aggr" => continue,
            "$and" => {
                let arr = val.as_array().ok_or_else(|| Error::new(ErrorKind::MalformedQuery, "$and must be an array"))?;
                let children: Result<Vec<Node>> = arr.iter().map(|v| parse_node(v, store_id, lookup)).collect();
                and_terms.push(Node::and(children?));
            }
            "$or" => {
                let arr = val.as_array().ok_or_else(|| Error::new(ErrorKind::MalformedQuery, "$or must be an array"))?;
                let children: Result<Vec<Node>> = arr.iter().map(|v| parse_node(v, store_id, lookup)).collect();
                and_terms.push(Node::or(children?));
            }
            "$not" => {
                and_terms.push(Node::not(parse_node(val, store_id, lookup)?));
            }
            "$id" => {
                let id = val.as_u64().ok_or_else(|| Error::new(ErrorKind::MalformedQuery, "$id must be a number"))?;
                and_terms.push(Node::Rec { store: store_id, rec_id: RecId(id) });
            }
            "$name" => {
                return Err(Error::new(ErrorKind::UnknownQueryOp, "$name lookup requires a primary-key index, not supported at this layer"));
            }
            "$join" => {
                let join_obj = val.as_object().ok_or_else(|| Error::new(ErrorKind::MalformedQuery, "$join must be an object"))?;
                let name = join_obj.get("name").and_then(Value::as_str).ok_or_else(|| Error::new(ErrorKind::MalformedQuery, "$join requires 'name'"))?;
                let query_val = join_obj.get("query").ok_or_else(|| Error::new(ErrorKind::MalformedQuery, "$join requires 'query'"))?;
                let target_store = lookup.schema(store_id)?.join_by_name(name)?.join_store_id;
                let inner = parse_node(query_val, target_store, lookup)?;
                and_terms.push(Node::Join { join_name: name.to_string(), source: Box::new(inner) });
            }
            "$location" => {
                let loc = val.as_array().ok_or_else(|| Error::new(ErrorKind::MalformedQuery, "$location must be [lat, lon]"))?;
                let (lat, lon) = (loc.first().and_then(Value::as_f64), loc.get(1).and_then(Value::as_f64));
                let (lat, lon) = (lat.ok_or_else(|| Error::new(ErrorKind::MalformedQuery, "bad $location"))?, lon.ok_or_else(|| Error::new(ErrorKind::MalformedQuery, "bad $location"))?);
                let radius = obj.get("$radius").and_then(Value::as_f64).unwrap_or(0.0);
                let limit = obj.get("$limit").and_then(Value::as_u64).unwrap_or(100) as usize;
                let key_name = obj.get("$key").and_then(Value::as_str).unwrap_or("location");
                and_terms.push(Node::Geo { key_name: key_name.to_string(), lat, lon, radius_m: radius, limit });
            }
            "$radius" | "$key" => continue,
            other if other.starts_with('$') => {
                return Err(Error::new(ErrorKind::UnknownQueryOp, format!("unknown query operator '{}'", other)));
            }
            field_name => {
                and_terms.push(parse_field_constraint(field_name, val, store_id, lookup)?);
            }
        }
    }

    match and_terms.len() {
        0 => Ok(Node::Store { store: store_id }),
        1 => Ok(and_terms.pop().unwrap()),
        _ => Ok(Node::and(and_terms)),
    }
}

fn parse_field_constraint(field_name: &str, val: &Value, store_id: StoreId, lookup: &impl SchemaLookup) -> Result<Node> {
    let schema = lookup.schema(store_id)?;
    let key = schema.key_by_name(field_name).map_err(|_| Error::new(ErrorKind::UnknownKey, field_name.to_string()))?;
    let key_name = key.name.clone();

    if let Some(arr) = val.as_array() {
        let children: Result<Vec<Node>> = arr.iter().map(|v| parse_field_constraint(field_name, v, store_id, lookup)).collect();
        return Ok(Node::and(children?));
    }

    if let Some(obj) = val.as_object() {
        if let Some(ne) = obj.get("$ne") {
            return Ok(Node::not(eq_leaf(&key_name, ne)?));
        }
        if obj.contains_key("$gt") || obj.contains_key("$lt") {
            let from = obj.get("$gt").map(value_to_word_string).transpose()?;
            let to = obj.get("$lt").map(value_to_word_string).transpose()?;
            return Ok(Node::LeafRange { key_name, from, to });
        }
        if let Some(wc) = obj.get("$wc") {
            let pattern = wc.as_str().ok_or_else(|| Error::new(ErrorKind::MalformedQuery, "$wc must be a string"))?;
            return Ok(Node::LeafWildcard { key_name, pattern: pattern.to_string() });
        }
        if let Some(or_val) = obj.get("$or") {
            let arr = or_val.as_array().ok_or_else(|| Error::new(ErrorKind::MalformedQuery, "$or must be an array"))?;
            let children: Result<Vec<Node>> = arr.iter().map(|v| parse_field_constraint(field_name, v, store_id, lookup)).collect();
            return Ok(Node::or(children?));
        }
        return Err(Error::new(ErrorKind::UnknownQueryOp, format!("unrecognized operator object for '{}'", field_name)));
    }

    eq_leaf(&key_name, val)
}

fn eq_leaf(key_name: &str, val: &Value) -> Result<Node> {
    Ok(Node::LeafGix { key_name: key_name.to_string(), word: value_to_word_string(val)? })
}

fn value_to_word_string(val: &Value) -> Result<String> {
    match val {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(Error::new(ErrorKind::MalformedQuery, "expected a scalar value")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{FieldId, StoreId};
    use crate::schema::{FieldType, IndexKey, JoinDesc, JoinKind, StoreSchema};
    use crate::vocab::SortType;
    use serde_json::json;

    struct FixtureLookup {
        people: StoreSchema,
        books: StoreSchema,
    }

    impl FixtureLookup {
        fn new() -> Self {
            let mut people = StoreSchema::new(StoreId(0), "people");
            let name_f = people.add_field("name", FieldType::String).unwrap();
            let age_f = people.add_field("age", FieldType::Int).unwrap();
            people.add_key(IndexKey::value(crate::core::types::KeyId(0), "name", name_f, SortType::ByStr)).unwrap();
            people.add_key(IndexKey::value(crate::core::types::KeyId(1), "age", age_f, SortType::ByFlt)).unwrap();

            let books = StoreSchema::new(StoreId(1), "books");

            people.add_join(JoinDesc::index_join(crate::core::types::JoinId(0), "wrote", StoreId(1), crate::core::types::KeyId(2))).unwrap();

            FixtureLookup { people, books }
        }
    }

    impl SchemaLookup for FixtureLookup {
        fn store_id_by_name(&self, name: &str) -> Result<StoreId> {
            match name {
                "people" => Ok(StoreId(0)),
                "books" => Ok(StoreId(1)),
                other => Err(Error::new(ErrorKind::UnknownStore, other.to_string())),
            }
        }
        fn schema(&self, store_id: StoreId) -> Result<&StoreSchema> {
            match store_id {
                StoreId(0) => Ok(&self.people),
                StoreId(1) => Ok(&self.books),
                _ => Err(Error::new(ErrorKind::UnknownStore, format!("{:?}", store_id))),
            }
        }
    }

    fn assert_field_id(_: FieldId) {}

    #[test]
    fn plain_key_parses_as_gix_leaf() {
        let lookup = FixtureLookup::new();
        let query = parse_query(&json!({"$from": "people", "name": "Ada"}), &lookup).unwrap();
        match query.root {
            Node::LeafGix { key_name, word } => {
                assert_eq!(key_name, "name");
                assert_eq!(word, "Ada");
            }
            other => panic!("expected LeafGix, got {:?}", other),
        }
    }

    #[test]
    fn two_sided_range_parses_into_one_leaf_range() {
        let lookup = FixtureLookup::new();
        let query = parse_query(&json!({"$from": "people", "age": {"$gt": "17", "$lt": "50"}}), &lookup).unwrap();
        match query.root {
            Node::LeafRange { key_name, from, to } => {
                assert_eq!(key_name, "age");
                assert_eq!(from.as_deref(), Some("17"));
                assert_eq!(to.as_deref(), Some("50"));
            }
            other => panic!("expected LeafRange, got {:?}", other),
        }
    }

    #[test]
    fn not_wraps_inner_node() {
        let lookup = FixtureLookup::new();
        let query = parse_query(&json!({"$from": "people", "$not": {"name": "Ada"}}), &lookup).unwrap();
        assert!(matches!(query.root, Node::Not(_)));
    }

    #[test]
    fn implicit_and_from_multiple_fields() {
        let lookup = FixtureLookup::new();
        let query = parse_query(&json!({"$from": "people", "name": "Ada", "age": "36"}), &lookup).unwrap();
        match query.root {
            Node::And(children) => assert_eq!(children.len(), 2),
            other => panic!("expected And, got {:?}", other),
        }
    }

    #[test]
    fn join_node_resolves_target_store() {
        let lookup = FixtureLookup::new();
        let query = parse_query(&json!({"$from": "people", "$join": {"name": "wrote", "query": {"$from": "books"}}}), &lookup).unwrap();
        match query.root {
            Node::Join { join_name, source } => {
                assert_eq!(join_name, "wrote");
                assert!(matches!(*source, Node::Store { store: StoreId(1) }));
            }
            other => panic!("expected Join, got {:?}", other),
        }
    }

    #[test]
    fn location_node_defaults_limit_and_key() {
        let lookup = FixtureLookup::new();
        let query = parse_query(&json!({"$from": "people", "$location": [1.0, 2.0]}), &lookup).unwrap();
        match query.root {
            Node::Geo { key_name, lat, lon, radius_m, limit } => {
                assert_eq!(key_name, "location");
                assert_eq!((lat, lon), (1.0, 2.0));
                assert_eq!(radius_m, 0.0);
                assert_eq!(limit, 100);
            }
            other => panic!("expected Geo, got {:?}", other),
        }
    }

    #[test]
    fn unknown_key_errors() {
        let lookup = FixtureLookup::new();
        let err = parse_query(&json!({"$from": "people", "nope": "x"}), &lookup).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownKey);
    }

    #[test]
    fn unknown_dollar_operator_errors_as_unknown_query_op() {
        let lookup = FixtureLookup::new();
        let err = parse_query(&json!({"$from": "people", "$bogus": {"name": "Ada"}}), &lookup).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnknownQueryOp);
    }

    #[test]
    fn field_level_or_parses_into_or_node() {
        let lookup = FixtureLookup::new();
        let query = parse_query(&json!({"$from": "people", "name": {"$or": ["Ada", "Bob"]}}), &lookup).unwrap();
        match query.root {
            Node::Or(children) => assert_eq!(children.len(), 2),
            other => panic!("expected Or, got {:?}", other),
        }
    }

    #[test]
    fn missing_from_errors() {
        let lookup = FixtureLookup::new();
        let err = parse_query(&json!({"name": "Ada"}), &lookup).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedQuery);
    }

    #[test]
    fn sort_and_limit_and_offset_parse() {
        let lookup = FixtureLookup::new();
        let query = parse_query(&json!({"$from": "people", "$sort": {"age": -1}, "$limit": 5, "$offset": 2}), &lookup).unwrap();
        assert!(matches!(query.sort, Some(SortSpec::ByField(_, SortDir::Desc))));
        assert_eq!(query.limit, Some(5));
        assert_eq!(query.offset, 2);
        if let Some(SortSpec::ByField(field_id, _)) = query.sort {
            assert_field_id(field_id);
        }
    }
}
