//! Benchmarks for write latency with live queries attached.
//!
//! Every write re-runs the dependent live queries before it returns, so
//! write latency grows with the number of subscribers and the size of
//! their result sets. These benchmarks measure that cost.

use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use todo_core::types::{NewTask, SortOrder, TaskStatus};
use todo_storage::{Database, LiveQuery, TaskQuery, TaskStore};

/// Database pre-filled with `rows` tasks, every other one completed.
fn make_store(rows: usize) -> (Arc<Database>, TaskStore) {
    let db = Arc::new(Database::in_memory().expect("in-memory database"));
    let store = TaskStore::new(Arc::clone(&db));
    let batch: Vec<NewTask> = (0..rows)
        .map(|i| {
            NewTask::new(format!("Task {}", i))
                .description(format!("Description {}", i))
                .completed(i % 2 == 0)
        })
        .collect();
    store.insert_many(&batch).expect("seed tasks");
    (db, store)
}

fn subscribe(db: &Database, query: TaskQuery) -> LiveQuery<todo_core::types::Task> {
    db.watch(query.tables(), move |conn| query.run(conn))
        .expect("register live query")
}

/// Toggle latency with 0, 1, and 3 live queries attached.
fn bench_write_with_subscribers(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_with_subscribers");
    group.sample_size(100);
    group.measurement_time(Duration::from_secs(5));

    for subscribers in [0usize, 1, 3] {
        let (db, store) = make_store(500);
        let queries = [
            TaskQuery::active(SortOrder::Newest),
            TaskQuery::completed(SortOrder::Title),
            TaskQuery::search(TaskStatus::Active, "task 1", SortOrder::Deadline),
        ];
        let _live: Vec<_> = queries
            .into_iter()
            .take(subscribers)
            .map(|query| subscribe(&db, query))
            .collect();
        let first = store
            .insert(&NewTask::new("toggled"))
            .expect("insert toggled task");

        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, _| {
                let mut completed = false;
                b.iter(|| {
                    completed = !completed;
                    store.set_completed(first, completed).expect("toggle")
                });
            },
        );
    }

    group.finish();
}

/// Refresh cost of one active-task subscriber as the table grows.
fn bench_refresh_by_table_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("refresh_by_table_size");
    group.sample_size(50);

    for rows in [100usize, 1_000, 5_000] {
        let (db, store) = make_store(rows);
        let _live = subscribe(&db, TaskQuery::active(SortOrder::Newest));
        let target = store
            .insert(&NewTask::new("renamed"))
            .expect("insert renamed task");
        let mut task = store
            .find_by_id(target)
            .expect("find task")
            .expect("task exists");

        group.bench_with_input(BenchmarkId::from_parameter(rows), &rows, |b, _| {
            let mut n = 0u64;
            b.iter(|| {
                n += 1;
                task.title = format!("renamed {}", n);
                store.update(&task).expect("update")
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_write_with_subscribers, bench_refresh_by_table_size);
criterion_main!(benches);
