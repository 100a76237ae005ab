//! Properties P1, P2, P5, P6, P7, P9 from `spec.md` §8 that aren't
//! already exercised by `tests/end_to_end.rs`'s six literal scenarios.
//! P3/P4 (posting-list sortedness / merger algebra) live next to
//! `Merger` in `src/index/merger.rs`; P8 (sliding window) is covered by
//! `scenario_sliding_window_aggregate` in `end_to_end.rs`.

use std::sync::{Arc, Mutex};

use qminer_core::base::JoinSpec;
use qminer_core::core::config::OpenMode;
use qminer_core::core::error::{ErrorKind, Result};
use qminer_core::core::types::{FieldValue, RecId};
use qminer_core::schema::FieldType;
use qminer_core::store::store::Store;
use qminer_core::store::trigger::Trigger;
use qminer_core::vocab::SortType;
use qminer_core::Config;
use serde_json::json;
use tempfile::tempdir;

fn fresh_base(dir: &std::path::Path) -> qminer_core::Base {
    let mut config = Config::default();
    config.storage_path = dir.to_path_buf();
    config.open_mode = OpenMode::Create;
    qminer_core::Base::open(config).unwrap()
}

/// P1 — names are unique across fields and joins within a store.
#[test]
fn p1_field_and_join_names_collide() {
    let dir = tempdir().unwrap();
    let mut base = fresh_base(dir.path());

    let people = base.create_store("people").unwrap();
    base.add_field(people, "age", FieldType::Int).unwrap();

    let err = base.add_field(people, "age", FieldType::String).unwrap_err();
    assert_eq!(err.kind, ErrorKind::NameCollision);

    let other = base.create_store("other").unwrap();
    let err = base
        .define_join(people, "age", other, JoinSpec::Index)
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NameCollision);
}

/// P1 — store names are unique within a base.
#[test]
fn p1_store_names_unique() {
    let dir = tempdir().unwrap();
    let mut base = fresh_base(dir.path());

    base.create_store("people").unwrap();
    let err = base.create_store("people").unwrap_err();
    assert_eq!(err.kind, ErrorKind::NameCollision);
}

/// P2 — inverse joins are symmetric: a record linked A->B is visible
/// from B->A via the inverse, with matching frequency.
#[test]
fn p2_join_inverse_symmetry() {
    let dir = tempdir().unwrap();
    let mut base = fresh_base(dir.path());

    let authors = base.create_store("authors").unwrap();
    let author_name = base.add_field(authors, "name", FieldType::String).unwrap();
    base.add_value_key(authors, "name", author_name, SortType::ByStr).unwrap();

    let books = base.create_store("books").unwrap();
    let title_f = base.add_field(books, "title", FieldType::String).unwrap();
    base.add_value_key(books, "title", title_f, SortType::ByStr).unwrap();

    let wrote = base
        .define_join(authors, "wrote", books, JoinSpec::Index)
        .unwrap();
    let authors_of = base
        .define_join(books, "authors", authors, JoinSpec::Index)
        .unwrap();
    base.link_inverse(authors, wrote, books, authors_of).unwrap();

    let ada = base.add_rec(authors, &json!({"name": "Ada"})).unwrap();
    let book = base.add_rec(books, &json!({"title": "X"})).unwrap();

    base.add_join(authors, wrote, ada, book, 1).unwrap();

    // The symmetric edge should exist on the books side without a
    // second explicit add_join call.
    let authors_of_book = base
        .search(&json!({"$from": "books", "title": "X", "$join": {"name": "authors", "query": {"$from": "authors"}}}))
        .unwrap();
    assert_eq!(authors_of_book.store_id, authors);
    assert_eq!(authors_of_book.rec_ids(), vec![ada]);

    base.del_join(authors, wrote, ada, book).unwrap();
    let authors_of_book = base
        .search(&json!({"$from": "books", "title": "X", "$join": {"name": "authors", "query": {"$from": "authors"}}}))
        .unwrap();
    assert_eq!(authors_of_book.len(), 0);
}

/// P5 — executing the same query twice with no intervening writes
/// yields equal record sets.
#[test]
fn p5_query_idempotence() {
    let dir = tempdir().unwrap();
    let mut base = fresh_base(dir.path());

    let people = base.create_store("people").unwrap();
    let name_f = base.add_field(people, "name", FieldType::String).unwrap();
    let age_f = base.add_field(people, "age", FieldType::Int).unwrap();
    base.add_value_key(people, "name", name_f, SortType::ByStr).unwrap();
    base.add_value_key(people, "age", age_f, SortType::ByFlt).unwrap();

    base.add_rec(people, &json!({"name": "Ada", "age": 36})).unwrap();
    base.add_rec(people, &json!({"name": "Bob", "age": 17})).unwrap();
    base.add_rec(people, &json!({"name": "Cy", "age": 18})).unwrap();

    let q = json!({"$from": "people", "age": {"$gt": "17"}});
    let mut first = base.search(&q).unwrap();
    let mut second = base.search(&q).unwrap();
    first.sort_by_id(true);
    second.sort_by_id(true);
    assert_eq!(first.rec_ids(), second.rec_ids());
}

/// P6 — Not(Not(Q)) == Q.
#[test]
fn p6_double_negation() {
    let dir = tempdir().unwrap();
    let mut base = fresh_base(dir.path());

    let people = base.create_store("people").unwrap();
    let name_f = base.add_field(people, "name", FieldType::String).unwrap();
    base.add_value_key(people, "name", name_f, SortType::ByStr).unwrap();

    base.add_rec(people, &json!({"name": "Ada"})).unwrap();
    base.add_rec(people, &json!({"name": "Bob"})).unwrap();

    let mut plain = base.search(&json!({"$from": "people", "name": "Ada"})).unwrap();
    let mut double_negated = base
        .search(&json!({"$from": "people", "$not": {"$not": {"name": "Ada"}}}))
        .unwrap();

    plain.sort_by_id(true);
    double_negated.sort_by_id(true);
    assert_eq!(plain.rec_ids(), double_negated.rec_ids());
}

/// P7 — a trigger attached before `add_rec` returns observes the
/// record in write -> index -> trigger order, with final field values
/// already visible.
struct RecordingTrigger {
    seen_ages: Arc<Mutex<Vec<i64>>>,
}

impl Trigger for RecordingTrigger {
    fn name(&self) -> &str {
        "recording"
    }

    fn on_add_rec(&mut self, store: &Store, rec_id: RecId) -> Result<()> {
        let age_field = store.schema().field_by_name("age").unwrap().field_id;
        if let FieldValue::Int(age) = store.get_field(rec_id, age_field)? {
            self.seen_ages.lock().unwrap().push(age);
        }
        Ok(())
    }

    fn on_update_rec(&mut self, _store: &Store, _rec_id: RecId) -> Result<()> {
        Ok(())
    }

    fn on_delete_rec(&mut self, _store: &Store, _rec_id: RecId) -> Result<()> {
        Ok(())
    }
}

#[test]
fn p7_trigger_sees_final_field_values_in_order() {
    let dir = tempdir().unwrap();
    let mut base = fresh_base(dir.path());

    let people = base.create_store("people").unwrap();
    base.add_field(people, "age", FieldType::Int).unwrap();

    let seen_ages = Arc::new(Mutex::new(Vec::new()));
    base.store_mut(people)
        .unwrap()
        .add_trigger(Box::new(RecordingTrigger { seen_ages: seen_ages.clone() }));

    base.add_rec(people, &json!({"age": 42})).unwrap();
    base.add_rec(people, &json!({"age": 7})).unwrap();

    assert_eq!(*seen_ages.lock().unwrap(), vec![42, 7]);
}

/// P9 — nn(q, k) returns records in non-decreasing distance from q,
/// with exactly min(k, total_locs) elements.
#[test]
fn p9_geo_nn_distance_ordered_and_bounded() {
    let dir = tempdir().unwrap();
    let mut base = fresh_base(dir.path());

    let places = base.create_store("places").unwrap();
    let loc_f = base.add_field(places, "loc", FieldType::FloatPair).unwrap();
    base.add_location_key(places, "loc", loc_f).unwrap();

    base.add_rec(places, &json!({"loc": [0.0, 0.0]})).unwrap();
    base.add_rec(places, &json!({"loc": [0.0, 0.0001]})).unwrap();
    base.add_rec(places, &json!({"loc": [1.0, 1.0]})).unwrap();

    let one = base.geo_nn(places, "loc", 0.0, 0.0, 1).unwrap();
    assert_eq!(one.len(), 1);

    let all = base.geo_nn(places, "loc", 0.0, 0.0, 10).unwrap();
    assert_eq!(all.len(), 3, "limit above total_locs should clamp to total_locs");

    // Verify non-decreasing distance from the query point.
    let dist = |rec_id: RecId| -> f64 {
        let rec_set_loc = match base.store(places).unwrap().get_field(rec_id, loc_f).unwrap() {
            FieldValue::FltPair(a, b) => (a, b),
            other => panic!("unexpected field value {other:?}"),
        };
        haversine_m(0.0, 0.0, rec_set_loc.0, rec_set_loc.1)
    };
    let distances: Vec<f64> = all.iter().copied().map(dist).collect();
    for pair in distances.windows(2) {
        assert!(pair[0] <= pair[1], "nn results must be non-decreasing in distance: {distances:?}");
    }
}

fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;
    let (lat1, lat2) = (lat1.to_radians(), lat2.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_M * c
}
