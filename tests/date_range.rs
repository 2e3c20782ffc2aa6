use chrono::{NaiveDate, TimeZone};
use chrono_tz::America::New_York;
use chrono_tz::Europe::London;
use chrono_tz::{Tz, UTC};
use tickstore::{
    DateBound, DateRange, IntervalKind, MemoryStore, ReadRequest, Tick, TickStore, TickStoreConfig,
};

fn at(tz: Tz, y: i32, m: u32, d: u32, h: u32, mi: u32) -> chrono::DateTime<Tz> {
    tz.with_ymd_and_hms(y, m, d, h, mi, 0).single().expect("valid local time")
}

fn dummy_data() -> Vec<Tick> {
    vec![
        Tick::new(at(London, 2013, 1, 1, 0, 0)).with("a", 1.0).with("b", 2.0),
        Tick::new(at(London, 2013, 1, 2, 0, 0)).with("b", 3.0).with("c", 4.0),
        Tick::new(at(London, 2013, 1, 3, 0, 0)).with("b", 5.0).with("c", 6.0),
        Tick::new(at(London, 2013, 1, 4, 0, 0)).with("b", 7.0).with("c", 8.0),
        Tick::new(at(London, 2013, 1, 5, 0, 0)).with("b", 9.0).with("c", 10.0),
    ]
}

fn column_b(store: &TickStore<MemoryStore>, range: DateRange) -> Vec<f64> {
    store
        .read("SYM", &ReadRequest::new().date_range(range))
        .expect("read")
        .column("b")
        .expect("b column")
        .to_f64_vec()
        .expect("numeric")
}

fn ymd(start: u32, end: u32) -> DateRange {
    DateRange::ymd(start, end).expect("valid dates")
}

fn bound(value: u32) -> DateBound {
    DateBound::ymd(value).expect("valid date")
}

/// Chunks handed out by the store for one read.
fn chunks_read(store: &TickStore<MemoryStore>, range: DateRange) -> usize {
    store.store().reset_stats();
    store
        .read("SYM", &ReadRequest::new().date_range(range))
        .expect("read");
    store.store().stats().documents_returned
}

#[test]
fn date_range() {
    let mut store = TickStore::new(MemoryStore::new());
    store.write("SYM", &dummy_data()).expect("write");

    let frame = store
        .read("SYM", &ReadRequest::new().date_range(ymd(20130101, 20130103)))
        .expect("read");
    let a = frame.column("a").unwrap().to_f64_vec().unwrap();
    assert_eq!(a[0], 1.0);
    assert!(a[1].is_nan() && a[2].is_nan());
    assert_eq!(column_b(&store, ymd(20130101, 20130103)), vec![2.0, 3.0, 5.0]);
    let c = frame.column("c").unwrap().to_f64_vec().unwrap();
    assert!(c[0].is_nan());
    assert_eq!(&c[1..], &[4.0, 6.0]);

    assert_eq!(store.delete("SYM").expect("delete"), 1);

    // Two chunks: 1-3 Jan and 4-5 Jan.
    store
        .write_with_chunk_size("SYM", &dummy_data(), 3)
        .expect("write");

    let cases: [(u32, u32, &[f64], usize); 7] = [
        (20130101, 20130103, &[2.0, 3.0, 5.0], 1),
        (20130102, 20130103, &[3.0, 5.0], 1),
        (20130103, 20130103, &[5.0], 1),
        (20130102, 20130104, &[3.0, 5.0, 7.0], 2),
        (20130102, 20130105, &[3.0, 5.0, 7.0, 9.0], 2),
        (20130103, 20130104, &[5.0, 7.0], 2),
        (20130104, 20130105, &[7.0, 9.0], 1),
    ];
    for (start, end, expected, chunks) in cases {
        assert_eq!(column_b(&store, ymd(start, end)), expected, "{start}-{end}");
        assert_eq!(chunks_read(&store, ymd(start, end)), chunks, "{start}-{end}");
    }
}

#[test]
fn interval_kinds() {
    let mut store = TickStore::new(MemoryStore::new());
    store
        .write_with_chunk_size("SYM", &dummy_data(), 3)
        .expect("write");

    let kinds: [(IntervalKind, &[f64]); 4] = [
        (IntervalKind::ClosedClosed, &[7.0, 9.0]),
        (IntervalKind::ClosedOpen, &[7.0]),
        (IntervalKind::OpenClosed, &[9.0]),
        (IntervalKind::OpenOpen, &[]),
    ];
    for (kind, expected) in kinds {
        let range = ymd(20130104, 20130105).with_kind(kind);
        let frame = store
            .read("SYM", &ReadRequest::new().date_range(range))
            .expect("read");
        let b = frame
            .column("b")
            .and_then(|c| c.to_f64_vec())
            .unwrap_or_default();
        assert_eq!(b, expected, "{kind:?}");
    }
}

#[test]
fn pruning_never_reads_more_than_overlapping_chunks() {
    for chunk_size in [1, 3, 100] {
        let mut store = TickStore::new(MemoryStore::new());
        store
            .write_with_chunk_size("SYM", &dummy_data(), chunk_size)
            .expect("write");
        let total = store.chunks("SYM").expect("chunks").len();

        let range = ymd(20130102, 20130103);
        let resolved = range.resolve(&UTC).expect("resolve");
        let overlapping = store
            .chunks("SYM")
            .expect("chunks")
            .iter()
            .filter(|meta| resolved.overlaps(meta.start, meta.end))
            .count();

        let touched = chunks_read(&store, range);
        assert!(touched <= overlapping, "chunk_size {chunk_size}");
        if total > 1 {
            assert!(touched < total, "chunk_size {chunk_size}");
        }
    }
}

#[test]
fn date_range_end_not_in_range() {
    let ticks = vec![
        Tick::new(at(London, 2013, 1, 1, 0, 0)).with("a", 1.0).with("b", 2.0),
        Tick::new(at(London, 2013, 1, 2, 10, 1)).with("b", 3.0).with("c", 4.0),
    ];
    let mut store = TickStore::new(MemoryStore::new());
    store.write_with_chunk_size("SYM", &ticks, 1).expect("write");

    let end = NaiveDate::from_ymd_opt(2013, 1, 2)
        .unwrap()
        .and_hms_opt(9, 0, 0)
        .unwrap();
    let range = DateRange::new(bound(20130101), end);
    assert_eq!(column_b(&store, range), vec![2.0]);
    assert_eq!(chunks_read(&store, range), 1);
}

#[test]
fn date_range_default_timezone() {
    for tz in [UTC, London, New_York] {
        let ticks = vec![
            Tick::new(at(tz, 2013, 1, 1, 0, 0)).with("a", 1.0).with("b", 2.0),
            Tick::new(at(tz, 2013, 7, 1, 0, 0)).with("b", 3.0).with("c", 4.0),
        ];
        let config = TickStoreConfig::default().with_timezone(tz);
        let mut store = TickStore::with_config(MemoryStore::new(), config).expect("store");
        store.write_with_chunk_size("SYM", &ticks, 1).expect("write");

        let frame = store
            .read("SYM", &ReadRequest::new().date_range(ymd(20130101, 20130701)))
            .expect("read");
        assert_eq!(frame.len(), 2, "{tz}");
        assert_eq!(frame.index()[1], at(tz, 2013, 7, 1, 0, 0));
        assert_eq!(frame.timezone(), tz);

        let frame = store
            .read("SYM", &ReadRequest::new().date_range(ymd(20130101, 20130101)))
            .expect("read");
        assert_eq!(frame.len(), 1, "{tz}");

        let frame = store
            .read("SYM", &ReadRequest::new().date_range(ymd(20130701, 20130701)))
            .expect("read");
        assert_eq!(frame.len(), 1, "{tz}");
    }
}

#[test]
fn date_range_no_bounds() {
    let ticks = vec![
        Tick::new(at(London, 2013, 1, 1, 0, 0)).with("a", 1.0).with("b", 2.0),
        Tick::new(at(London, 2013, 1, 30, 0, 0)).with("a", 3.0).with("b", 4.0),
        Tick::new(at(London, 2013, 2, 2, 10, 1)).with("b", 5.0).with("c", 6.0),
    ];
    let mut store = TickStore::new(MemoryStore::new());
    store.write_with_chunk_size("SYM", &ticks, 1).expect("write");

    let all = store.read("SYM", &ReadRequest::new()).expect("read");
    assert_eq!(all.column("b").unwrap().to_f64_vec().unwrap(), vec![2.0, 4.0, 5.0]);

    assert_eq!(column_b(&store, DateRange::unbounded()), vec![2.0, 4.0, 5.0]);
    assert_eq!(
        column_b(&store, DateRange::from_start(bound(20121231))),
        vec![2.0, 4.0, 5.0]
    );
    assert_eq!(
        column_b(&store, DateRange::from_start(bound(20130101))),
        vec![2.0, 4.0, 5.0]
    );
    assert_eq!(
        column_b(&store, DateRange::from_start(bound(20130102))),
        vec![4.0, 5.0]
    );
    assert_eq!(column_b(&store, DateRange::until(bound(20130102))), vec![2.0]);
    assert_eq!(
        column_b(&store, DateRange::until(bound(20131212))),
        vec![2.0, 4.0, 5.0]
    );
}

#[test]
fn date_range_bst() {
    let ticks = vec![
        Tick::new(at(London, 2013, 6, 1, 12, 0)).with("a", 1.0).with("b", 2.0),
        Tick::new(at(London, 2013, 6, 1, 13, 0)).with("a", 3.0).with("b", 4.0),
    ];
    let mut store = TickStore::new(MemoryStore::new());
    store.write_with_chunk_size("SYM", &ticks, 1).expect("write");

    assert_eq!(column_b(&store, DateRange::unbounded()), vec![2.0, 4.0]);

    let london = DateRange::new(at(London, 2013, 6, 1, 12, 0), at(London, 2013, 6, 1, 13, 0));
    assert_eq!(column_b(&store, london), vec![2.0, 4.0]);

    let utc = DateRange::new(at(UTC, 2013, 6, 1, 12, 0), at(UTC, 2013, 6, 1, 13, 0));
    assert_eq!(column_b(&store, utc), vec![4.0]);
}

#[test]
fn date_range_day_starting_in_dst_gap() {
    let sao_paulo = chrono_tz::America::Sao_Paulo;
    let ticks = vec![
        Tick::new(at(UTC, 2013, 10, 19, 12, 0)).with("b", 1.0),
        Tick::new(at(UTC, 2013, 10, 20, 12, 0)).with("b", 2.0),
    ];
    let config = TickStoreConfig::default().with_timezone(sao_paulo);
    let mut store = TickStore::with_config(MemoryStore::new(), config).expect("store");
    store.write_with_chunk_size("SYM", &ticks, 1).expect("write");

    // Midnight of 2013-10-20 does not exist there; the day starts at 01:00.
    assert_eq!(column_b(&store, ymd(20131020, 20131021)), vec![2.0]);
    assert_eq!(column_b(&store, DateRange::until(bound(20131020))), vec![1.0]);
}
