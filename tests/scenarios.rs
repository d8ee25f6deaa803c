use memdb::sql::scripted::ScriptedSource;
use memdb::{
    CmpOp, ColumnFlags, ColumnType, IndexKind, Mdb, MdbConfig, MdbError, RowStatus, SqlErrorKind,
    SqlSource, Table, Timestamp, Value, Where,
};
use proptest::prelude::*;

fn checked() -> MdbConfig {
    MdbConfig {
        verify_integrity: true,
        ..MdbConfig::default()
    }
}

/// T(id: Identity, name: VarString(20) not null, age: Int nullable)
fn person_table(mdb: &mut Mdb) -> &mut Table {
    let table = mdb.create_table("T").unwrap();
    table
        .add_column("id", ColumnType::Identity, 0, ColumnFlags::empty())
        .unwrap();
    table
        .add_column("name", ColumnType::VarString, 20, ColumnFlags::empty())
        .unwrap();
    table
        .add_column("age", ColumnType::Int, 0, ColumnFlags::NULLABLE)
        .unwrap();
    table
}

#[test]
fn alice_identity_lookup_and_stream_round_trip() {
    let mut mdb = Mdb::with_config(checked());
    let table = person_table(&mut mdb);

    let mut row = table.create_row();
    assert_eq!(row.status(), RowStatus::ALLOCATED);
    row.field_mut(1).set_str("Alice");
    row.field_mut(2).set_null();
    let id = table.insert_row(row).unwrap();

    let alice = table.row(id).unwrap();
    assert!(alice.inserted());
    assert_eq!(alice.field(0).get_int(), 1);
    assert_eq!(table.select_row(0, &Value::Int(1)).unwrap(), Some(id));
    assert!(alice.field(2).is_null());
    assert!(table.modified());

    let mut bytes = Vec::new();
    mdb.write_to(&mut bytes).unwrap();

    let mut copy = Mdb::with_config(checked());
    person_table(&mut copy);
    copy.read_from(&mut bytes.as_slice()).unwrap();
    let table = copy.table("T").unwrap();
    assert!(!table.modified());
    assert_eq!(table.len(), 1);
    assert_eq!(table.next_identity(), Some(2));
    assert_eq!(
        table.row_at(0).unwrap().values(),
        [Value::Int(1), Value::from("Alice"), Value::Null]
    );
}

#[test]
fn foreign_key_without_match_is_rejected() {
    let mut mdb = Mdb::with_config(checked());
    person_table(&mut mdb);
    let pets = mdb.create_table("pets").unwrap();
    pets.add_column("name", ColumnType::FixedString, 10, ColumnFlags::empty())
        .unwrap();
    mdb.add_foreign_column("pets", "owner", ColumnFlags::empty(), "T", "id")
        .unwrap();

    let pets = mdb.table_mut("pets").unwrap();
    let mut row = pets.create_row();
    row.field_mut(0).set_str("rex");
    row.field_mut(1).load(&Value::Int(42));
    let err = pets.insert_row(row).unwrap_err();
    assert!(matches!(err, MdbError::ForeignKeyViolation { value, .. } if value == "42"));
    assert!(pets.is_empty());
}

#[test]
fn failing_query_leaves_mdb_unchanged() {
    let mut source = ScriptedSource::new();
    source.open("dsn=test").unwrap();
    source.fail_on("SELECT a,b FROM t");

    let mut mdb = Mdb::new();
    mdb.create_table("existing").unwrap();
    let err = mdb
        .create_table_from_sql("t", &mut source, Some("SELECT a,b FROM t"))
        .unwrap_err();

    assert!(matches!(err, MdbError::Sql(ref e) if e.kind == SqlErrorKind::ExecFailed));
    assert_eq!(mdb.table_names(), ["existing"]);
}

#[test]
fn fetch_failure_during_create_drops_partial_table() {
    let query = "SELECT a, b FROM t";
    let mut source = ScriptedSource::new().with_result(
        query,
        vec![
            memdb::CursorColumn::new("a", ColumnType::Int, 4, ColumnFlags::NULLABLE),
            memdb::CursorColumn::new("b", ColumnType::Double, 8, ColumnFlags::NULLABLE),
        ],
        vec![
            vec![Value::Int(1), Value::Double(0.5)],
            vec![Value::Int(2), Value::Null],
        ],
    );
    source.fail_fetch_after(query, 1);
    source.open("dsn=test").unwrap();

    let mut mdb = Mdb::new();
    assert!(mdb.create_table_from_sql("t", &mut source, Some(query)).is_err());
    assert!(mdb.is_empty());
}

#[test]
fn identity_never_reused_after_deletes() {
    let mut mdb = Mdb::with_config(checked());
    let table = person_table(&mut mdb);
    let mut ids = Vec::new();
    for name in ["a", "b", "c"] {
        let mut row = table.create_row();
        row.field_mut(1).set_str(name);
        ids.push(table.insert_row(row).unwrap());
    }
    table.delete_row(ids[2]).unwrap();
    table.delete_row(ids[1]).unwrap();

    let mut row = table.create_row();
    row.field_mut(1).set_str("d");
    let d = table.insert_row(row).unwrap();
    assert_eq!(table.row(d).unwrap().field(0).get_int(), 4);
    // the removed keys are gone from the identity index
    assert_eq!(table.select_row(0, &Value::Int(3)).unwrap(), None);
}

#[test]
#[should_panic(expected = "read-only")]
fn identity_is_not_writable() {
    let mut mdb = Mdb::new();
    let table = person_table(&mut mdb);
    let mut row = table.create_row();
    row.field_mut(0).set_int(5);
}

#[test]
fn select_row_requires_unique_index() {
    let mut table = Table::with_config("scores", checked());
    table
        .add_column("player", ColumnType::Int, 0, ColumnFlags::empty())
        .unwrap();
    table.add_index(0, IndexKind::Int, 100).unwrap();
    for player in [7, 7, 8] {
        let mut row = table.create_row();
        row.field_mut(0).set_int(player);
        table.insert_row(row).unwrap();
    }
    // duplicates are accepted by the non-unique index, lookups are not
    assert_eq!(table.len(), 3);
    assert!(matches!(
        table.select_row(0, &Value::Int(7)),
        Err(MdbError::NotIndexed { .. })
    ));
    let sevens = table.select(&Where::equal(0, 7));
    assert_eq!(sevens.ids(), [table.id_at(0).unwrap(), table.id_at(1).unwrap()]);
}

#[test]
fn status_transitions_through_a_row_life() {
    let mut mdb = Mdb::with_config(checked());
    let table = person_table(&mut mdb);
    let mut row = table.create_row();
    row.field_mut(1).set_str("Bob");
    let id = table.insert_row(row).unwrap();

    let mut bytes = Vec::new();
    table.write_to(&mut bytes).unwrap();
    assert!(table.row(id).unwrap().original());

    // same value again: no dirty transition
    table.update_row(id, |row| row.field_mut(1).set_str("Bob")).unwrap();
    assert!(!table.modified());

    table.update_row(id, |row| row.field_mut(2).set_int(40)).unwrap();
    let bob = table.row(id).unwrap();
    assert!(bob.updated() && bob.modified());
    assert!(table.modified());
}

#[test]
fn timestamps_survive_the_stream() {
    let mut table = Table::with_config("events", checked());
    table
        .add_column("at", ColumnType::Timestamp, 0, ColumnFlags::empty())
        .unwrap();
    table
        .add_column("day", ColumnType::DateTime, 0, ColumnFlags::NULLABLE)
        .unwrap();
    let mut row = table.create_row();
    row.field_mut(0)
        .set_timestamp(Timestamp::new(1_700_000_000, 123_456_789));
    row.field_mut(1).set_time(1_699_920_000);
    table.insert_row(row).unwrap();

    let mut bytes = Vec::new();
    table.write_to(&mut bytes).unwrap();
    let mut copy = Table::with_config("events", checked());
    copy.add_column("at", ColumnType::Timestamp, 0, ColumnFlags::empty())
        .unwrap();
    copy.add_column("day", ColumnType::DateTime, 0, ColumnFlags::NULLABLE)
        .unwrap();
    copy.read_from(&mut bytes.as_slice()).unwrap();

    let row = copy.row_at(0).unwrap();
    assert_eq!(
        row.field(0).get_timestamp(),
        Timestamp::new(1_700_000_000, 123_456_789)
    );
    assert_eq!(row.field(1).get_time(), 1_699_920_000);
}

fn ages_table(ages: &[Option<i32>]) -> Table {
    let mut table = Table::with_config("ages", checked());
    table
        .add_column("age", ColumnType::Int, 0, ColumnFlags::NULLABLE)
        .unwrap();
    for age in ages {
        let mut row = table.create_row();
        row.field_mut(0).set_value(&(*age).into());
        table.insert_row(row).unwrap();
    }
    table
}

proptest! {
    #[test]
    fn prop_select_matches_filter_in_order(
        ages in prop::collection::vec(prop::option::of(-5i32..5), 0..40),
        pivot in -5i32..5,
    ) {
        let table = ages_table(&ages);
        let filter = Where::cmp(0, CmpOp::Gt, pivot) | Where::equal(0, Value::Null);
        let selected: Vec<usize> = table
            .select(&filter)
            .iter()
            .filter_map(|id| table.position(id))
            .collect();
        let expected: Vec<usize> = ages
            .iter()
            .enumerate()
            .filter(|(_, age)| age.is_none_or(|a| a > pivot))
            .map(|(n, _)| n)
            .collect();
        prop_assert_eq!(selected, expected);

        let complement = table.select(&!filter);
        prop_assert_eq!(complement.len() + table.select(&Where::cmp(0, CmpOp::Gt, pivot)).len()
            + table.select(&Where::equal(0, Value::Null)).len(), ages.len());
    }

    #[test]
    fn prop_stream_round_trip(ages in prop::collection::vec(prop::option::of(any::<i32>()), 0..30)) {
        let mut table = ages_table(&ages);
        let mut bytes = Vec::new();
        table.write_to(&mut bytes).unwrap();

        let mut copy = ages_table(&[]);
        copy.read_from(&mut bytes.as_slice()).unwrap();
        prop_assert_eq!(copy.len(), ages.len());
        prop_assert!(!copy.modified());
        for (n, age) in ages.iter().enumerate() {
            prop_assert_eq!(copy.row_at(n).unwrap().field(0).value(), Value::from(*age));
        }
    }
}
