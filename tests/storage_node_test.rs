//! Tag resolution and field buffering as a storage node uses them

use chronicle_cluster::memdb::decode_segment;
use chronicle_cluster::*;

const HOUR: i64 = 3_600_000;

fn index() -> TagIndex {
    let index = TagIndex::new();
    for (host, zone) in [("web-1", "z1"), ("web-2", "z2"), ("db-1", "z1")] {
        index
            .register_tags("ns", "cpu", &[("host", host), ("zone", zone)])
            .unwrap();
    }
    index
}

#[test]
fn test_and_or_not_yields_one_entry_per_leaf() {
    let index = index();
    let condition = Expr::and(
        Expr::tag(TagFilter::like("host", "web-*")),
        Expr::paren(Expr::or(
            Expr::tag(TagFilter::equals("zone", "z1")),
            Expr::not(Expr::tag(TagFilter::equals("host", "db-1"))),
        )),
    );

    let result = TagSearch::new("ns", "cpu", Some(&condition), &index)
        .filter()
        .unwrap();

    assert_eq!(result.len(), 3);
    let web: Vec<u32> = result["host like web-*"].tag_value_ids.iter().collect();
    assert_eq!(web, vec![1, 2]);
    // NOT is not inverted here
    let db: Vec<u32> = result["host=db-1"].tag_value_ids.iter().collect();
    assert_eq!(db, vec![3]);
    assert_eq!(
        result["zone=z1"].tag_key_id,
        index.get_tag_key_id("ns", "cpu", "zone").unwrap()
    );
}

#[test]
fn test_invalid_operator_fails_whole_search() {
    let index = index();
    let condition = Expr::or(
        Expr::tag(TagFilter::equals("host", "web-1")),
        Expr::binary(
            BinaryOp::Sub,
            Expr::tag(TagFilter::equals("zone", "z1")),
            Expr::tag(TagFilter::equals("zone", "z2")),
        ),
    );

    let err = TagSearch::new("ns", "cpu", Some(&condition), &index)
        .filter()
        .unwrap_err();
    assert_eq!(err.to_string(), "wrong binary operator in tag filter: -");
}

#[test]
fn test_suggest_values() {
    let index = index();
    let key_id = index.get_tag_key_id("ns", "cpu", "host").unwrap();
    assert_eq!(
        index.suggest_tag_values(key_id, "web", 10).unwrap(),
        vec!["web-1".to_string(), "web-2".to_string()]
    );
    assert_eq!(index.suggest_tag_values(key_id, "", 1).unwrap().len(), 1);
}

#[test]
fn test_write_flush_cycle() {
    let interval = 10_000;
    let mut store = FieldStore::new("requests", 3, FieldType::Sum);

    for ts in [HOUR + 5_000, HOUR + 7_000, 2 * HOUR + 30_000, HOUR + 600_000] {
        let ctx = WriteContext::for_timestamp(ts, interval, HOUR).unwrap();
        store.write(&Field::new("requests", FieldValue::Sum(1.0)), ctx);
    }
    assert_eq!(store.family_times(), vec![HOUR, 2 * HOUR]);

    let range = store.time_range(interval).unwrap();
    assert_eq!(range, TimeRange::new(HOUR, 2 * HOUR + 30_000));

    let mut flusher = MemoryTableFlusher::new();
    assert!(store.flush_field_to(&mut flusher, HOUR));
    assert!(!store.flush_field_to(&mut flusher, HOUR));
    assert!(!store.flush_field_to(&mut flusher, 5 * HOUR));

    let flushed = flusher.drain();
    assert_eq!(flushed.len(), 1);
    assert_eq!((flushed[0].start_slot, flushed[0].end_slot), (0, 60));
    let block = decode_segment(&flushed[0].data).unwrap();
    assert_eq!(block.values, vec![(0, 2.0), (60, 1.0)]);

    let range = store.time_range(interval).unwrap();
    assert_eq!(range, TimeRange::new(2 * HOUR + 30_000, 2 * HOUR + 30_000));
}
