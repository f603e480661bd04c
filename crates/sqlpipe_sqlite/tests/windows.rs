//! Native window functions and their subquery emulation must agree.

use sqlpipe_core::config::SqlConfig;
use sqlpipe_core::connection::{Connection, RowSet};
use sqlpipe_core::expr::{call, col, desc, lit};
use sqlpipe_core::relational::{LazyQuery, TableSource};
use sqlpipe_core::scalar::ScalarValue;
use sqlpipe_sqlite::SqliteConnection;

const SETUP: &str = "
CREATE TABLE scores (team TEXT, player TEXT, points INTEGER);
INSERT INTO scores VALUES
    ('red', 'ann', 10),
    ('red', 'bob', 7),
    ('red', 'cat', 10),
    ('red', 'dan', 3),
    ('blue', 'eve', 4),
    ('blue', 'fay', 9),
    ('blue', 'gus', 9),
    (NULL, 'hal', 5),
    (NULL, 'ivy', 1);
";

fn connections() -> (SqliteConnection, SqliteConnection) {
    let native = SqliteConnection::open_in_memory().unwrap();
    native.execute_batch(SETUP).unwrap();
    let emulated = SqliteConnection::open_in_memory()
        .unwrap()
        .without_window_functions();
    emulated.execute_batch(SETUP).unwrap();
    (native, emulated)
}

fn scores() -> LazyQuery {
    LazyQuery::new(TableSource::new("scores", ["team", "player", "points"]))
}

fn run(conn: &SqliteConnection, query: &LazyQuery) -> RowSet {
    let rendered = query.render(conn.dialect(), &SqlConfig::default()).unwrap();
    conn.execute(&rendered.sql).unwrap()
}

/// Rows in a stable order for comparison.
fn sorted(mut rows: RowSet) -> Vec<Vec<String>> {
    rows.rows.sort_by_key(|row| row.iter().map(|v| v.to_string()).collect::<Vec<_>>());
    rows.rows
        .into_iter()
        .map(|row| row.iter().map(|v| v.to_string()).collect())
        .collect()
}

fn assert_same(query: LazyQuery) {
    let (native, emulated) = connections();
    let native_sql = query
        .render(native.dialect(), &SqlConfig::default())
        .unwrap()
        .sql;
    let emulated_sql = query
        .render(emulated.dialect(), &SqlConfig::default())
        .unwrap()
        .sql;
    assert!(native_sql.contains("OVER"), "{native_sql}");
    assert!(!emulated_sql.contains("OVER"), "{emulated_sql}");

    let expected = run(&native, &query);
    let got = run(&emulated, &query);
    assert_eq!(expected.columns, got.columns);
    assert_eq!(sorted(expected), sorted(got));
}

#[test]
fn grouped_aggregate_mutate() {
    assert_same(
        scores()
            .group_by(["team"])
            .mutate([("avg_points", call("mean", [col("points")]))]),
    );
}

#[test]
fn grouped_rank_mutate() {
    assert_same(
        scores()
            .group_by(["team"])
            .mutate([("r", call("min_rank", [desc(col("points"))]))]),
    );
}

#[test]
fn grouped_dense_rank_mutate() {
    assert_same(
        scores()
            .group_by(["team"])
            .mutate([("r", call("dense_rank", [col("points")]))]),
    );
}

#[test]
fn aggregate_and_rank_together() {
    assert_same(
        scores()
            .group_by(["team"])
            .mutate([
                ("total", call("sum", [col("points")])),
                ("r", call("rank", [col("points")])),
            ]),
    );
}

#[test]
fn ungrouped_aggregate_mutate() {
    assert_same(scores().mutate([(
        "share",
        call("/", [col("points"), call("sum", [col("points")])]),
    )]));
}

#[test]
fn windowed_filter() {
    let query = scores()
        .group_by(["team"])
        .filter([call(">", [col("points"), call("mean", [col("points")])])]);
    assert_same(query.clone());

    let (native, _) = connections();
    let rows = run(&native, &query);
    assert_eq!(vec!["team", "player", "points"], rows.columns);
    let mut players: Vec<String> = rows.column("player").unwrap().map(|v| v.to_string()).collect();
    players.sort();
    assert_eq!(vec!["ann", "cat", "fay", "gus", "hal"], players);
}

#[test]
fn top_per_group() {
    let query = scores()
        .group_by(["team"])
        .filter([call("==", [call("rank", [desc(col("points"))]), lit(1)])]);
    assert_same(query.clone());

    let (_, emulated) = connections();
    let mut players: Vec<String> = run(&emulated, &query)
        .column("player")
        .unwrap()
        .map(|v| v.to_string())
        .collect();
    players.sort();
    assert_eq!(vec!["ann", "cat", "fay", "gus", "hal"], players);
}

#[test]
fn unsupported_emulation() {
    let (_, emulated) = connections();
    let query = scores()
        .group_by(["team"])
        .mutate([("prev", call("lag", [col("points")]))]);
    let err = query
        .render(emulated.dialect(), &SqlConfig::default())
        .unwrap_err();
    assert!(matches!(
        err,
        sqlpipe_core::errors::SqlPipeError::UnsupportedWindowEmulation { .. }
    ));
}

#[test]
fn summarise_without_windows() {
    let (_, emulated) = connections();
    let query = scores()
        .group_by(["team"])
        .summarise([("n", call("n", []))])
        .arrange([col("n")]);
    let rows = run(&emulated, &query);
    let counts: Vec<ScalarValue> = rows.column("n").unwrap().cloned().collect();
    assert_eq!(
        vec![ScalarValue::from(2), ScalarValue::from(3), ScalarValue::from(4)],
        counts
    );
}

#[test]
fn distinct_count_per_group() {
    let query = scores()
        .group_by(["team"])
        .mutate([("k", call("n_distinct", [col("points")]))]);

    let (native, emulated) = connections();
    let expected = run(&native, &query);
    let got = run(&emulated, &query);
    assert_eq!(vec!["team", "player", "points", "k"], expected.columns);
    assert_eq!(expected.columns, got.columns);
    assert_eq!(sorted(expected.clone()), sorted(got));

    let mut by_player: Vec<(String, ScalarValue)> = expected
        .column("player")
        .unwrap()
        .map(|v| v.to_string())
        .zip(expected.column("k").unwrap().cloned())
        .collect();
    by_player.sort_by(|a, b| a.0.cmp(&b.0));
    let counts: Vec<ScalarValue> = by_player.into_iter().map(|(_, k)| k).collect();
    // red has 3 distinct scores, blue and the NULL team 2 each.
    let expected_counts: Vec<ScalarValue> =
        [3, 3, 3, 3, 2, 2, 2, 2, 2].into_iter().map(ScalarValue::from).collect();
    assert_eq!(expected_counts, counts);
}

#[test]
fn distinct_count_filter() {
    let query = scores().group_by(["team"]).filter([call(
        ">",
        [call("n_distinct", [col("points")]), lit(2)],
    )]);

    let (native, emulated) = connections();
    let expected = run(&native, &query);
    assert_eq!(sorted(expected.clone()), sorted(run(&emulated, &query)));

    let mut players: Vec<String> = expected
        .column("player")
        .unwrap()
        .map(|v| v.to_string())
        .collect();
    players.sort();
    assert_eq!(vec!["ann", "bob", "cat", "dan"], players);
}
