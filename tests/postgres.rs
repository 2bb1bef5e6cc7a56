// Store contract against a real Postgres. Skipped unless TEST_DATABASE_URL
// points at a database the tests may write to.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use uuid::Uuid;

use stairtimer::auth::repo_types::NewUser;
use stairtimer::clock::ManualClock;
use stairtimer::leaderboard::range::TimeRange;
use stairtimer::leaderboard::Leaderboard;
use stairtimer::store::{OpenOutcome, PgStore, TimerStore, UserStore};
use stairtimer::timer::{TimerEngine, TimerError};

async fn store() -> Result<Option<PgStore>> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return Ok(None);
    };
    let store = PgStore::connect(&url, 5, Duration::from_secs(5)).await?;
    store.migrate().await?;
    Ok(Some(store))
}

/// Usernames are unique per run so tests can share one database.
async fn user(store: &PgStore, prefix: &str) -> Result<(i64, String)> {
    let name = format!("{prefix}-{}", &Uuid::new_v4().simple().to_string()[..8]);
    let u = store
        .create_user(NewUser {
            username: name.clone(),
            email: format!("{name}@example.com"),
            password_hash: "x".into(),
            one_time_code: "c".into(),
        })
        .await?;
    Ok((u.id, name))
}

#[tokio::test]
async fn partial_index_blocks_second_open_session() -> Result<()> {
    let Some(store) = store().await? else { return Ok(()) };
    let (id, _) = user(&store, "open").await?;

    assert!(matches!(store.open_session(id, 1).await?, OpenOutcome::Started(_)));
    assert_eq!(store.open_session(id, 2).await?, OpenOutcome::AlreadyOpen);

    let open: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM timing_sessions WHERE user_id = $1 AND ended_at IS NULL",
    )
    .bind(id)
    .fetch_one(store.pool())
    .await?;
    assert_eq!(open, 1);
    Ok(())
}

#[tokio::test]
async fn concurrent_starts_open_one_session() -> Result<()> {
    let Some(store) = store().await? else { return Ok(()) };
    let (id, _) = user(&store, "race").await?;
    let engine = TimerEngine::new(Arc::new(store.clone()));

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.start_timer(id).await })
        })
        .collect();
    for h in handles {
        h.await??;
    }

    let open: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM timing_sessions WHERE user_id = $1 AND ended_at IS NULL",
    )
    .bind(id)
    .fetch_one(store.pool())
    .await?;
    assert_eq!(open, 1);
    Ok(())
}

#[tokio::test]
async fn engine_scenario_against_postgres() -> Result<()> {
    let Some(store) = store().await? else { return Ok(()) };
    let (a, _) = user(&store, "A").await?;
    let (b, _) = user(&store, "B").await?;
    let clock = Arc::new(ManualClock::new(1_000));
    let engine = TimerEngine::with_clock(Arc::new(store.clone()), clock.clone());

    engine.start_timer(a).await?;
    clock.set(4_500);
    assert_eq!(engine.end_timer(a).await?, 3_500);
    assert!(matches!(engine.end_timer(b).await, Err(TimerError::NoActiveTimer)));

    let row: (i64, i64, i64) = sqlx::query_as(
        "SELECT started_at, ended_at, elapsed_ms FROM timing_sessions WHERE user_id = $1",
    )
    .bind(a)
    .fetch_one(store.pool())
    .await?;
    assert_eq!(row.2, row.1 - row.0);
    Ok(())
}

#[tokio::test]
async fn rankings_within_range() -> Result<()> {
    let Some(store) = store().await? else { return Ok(()) };
    // a window far from any other test's sessions
    let base = 4_000_000_000_000 + (rand_offset() * 1_000_000);
    let (a, name_a) = user(&store, "A").await?;
    let (b, name_b) = user(&store, "B").await?;
    let clock = Arc::new(ManualClock::new(base));
    let engine = TimerEngine::with_clock(Arc::new(store.clone()), clock.clone());

    engine.start_timer(a).await?;
    clock.advance(3_500);
    engine.end_timer(a).await?;

    engine.start_timer(b).await?;
    clock.advance(2_200);
    engine.end_timer(b).await?;

    engine.start_timer(b).await?;
    clock.advance(9_000);
    engine.end_timer(b).await?;

    let range = Some(TimeRange::new(base, base + 60_000));
    let board = Leaderboard::new(Arc::new(store.clone()));

    let best = board.best_times(range).await?;
    let got: Vec<(i64, &str, i64)> = best
        .iter()
        .map(|r| (r.rank, r.username.as_str(), r.best_ms))
        .collect();
    assert_eq!(got, vec![(1, name_b.as_str(), 2_200), (2, name_a.as_str(), 3_500)]);

    let counts = board.attempt_counts(range).await?;
    let got: Vec<(i64, i64, &str)> = counts
        .iter()
        .map(|r| (r.rank, r.count, r.username.as_str()))
        .collect();
    assert_eq!(got, vec![(1, 2, name_b.as_str()), (2, 1, name_a.as_str())]);
    Ok(())
}

#[tokio::test]
async fn duplicate_username_is_reported() -> Result<()> {
    let Some(store) = store().await? else { return Ok(()) };
    let (_, name) = user(&store, "dup").await?;
    let err = store
        .create_user(NewUser {
            username: name,
            email: format!("{}@example.com", Uuid::new_v4().simple()),
            password_hash: "x".into(),
            one_time_code: "c".into(),
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("username"));
    Ok(())
}

fn rand_offset() -> i64 {
    (Uuid::new_v4().as_u128() % 1_000_000) as i64
}
