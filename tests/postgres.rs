//! PostgreSQL repository and dispatch tests.
//!
//! These need a reachable database; migrations are applied on connect:
//!   DATABASE_URL="postgres://..." cargo test --test postgres -- --ignored
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use import_gateway::dispatch::{DispatchQueue, ImportTask, PgDispatchQueue, IMPORT_JOB_TYPE};
use import_gateway::state::models::{ImportJob, JobSource, JobState, NewImportJob, STUCK_ERROR};
use import_gateway::state::{Database, JobRepository, PgJobRepository, PgTokenStore, TokenStore};

async fn pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let db = Database::connect(&url).await.unwrap();
    db.migrate().await.unwrap();
    db.pool().clone()
}

/// Timestamps at the precision `timestamptz` keeps.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn job(state: JobState, at: DateTime<Utc>) -> ImportJob {
    let mut job = ImportJob::create(
        NewImportJob {
            user_id: Uuid::new_v4(),
            source: JobSource::Url("http://x/data.csv".into()),
            service_name: Some("generic".into()),
            service_item_id: Some("http://x/data.csv".into()),
            table_name: None,
            table_id: Some("t-1".into()),
            append: true,
        },
        at,
    );
    job.state = state;
    job
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn insert_then_find_round_trips() {
    let repo = PgJobRepository::new(pool().await);
    let job = job(JobState::Pending, now());
    repo.insert(&job).await.unwrap();

    assert_eq!(repo.find(job.id).await.unwrap(), Some(job.clone()));
    assert_eq!(repo.list_ids_for_user(job.user_id).await.unwrap(), vec![job.id]);
    assert_eq!(repo.find(Uuid::new_v4()).await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn compare_and_set_requires_current_state() {
    let repo = PgJobRepository::new(pool().await);
    let job = job(JobState::Pending, now());
    repo.insert(&job).await.unwrap();

    let at = now();
    let queued = repo
        .compare_and_set(job.id, JobState::Pending, JobState::Queued, None, at)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(queued.state, JobState::Queued);
    assert_eq!(queued.last_activity_at, at);

    let stale = repo
        .compare_and_set(job.id, JobState::Pending, JobState::Running, None, now())
        .await
        .unwrap();
    assert!(stale.is_none());
    assert_eq!(repo.find(job.id).await.unwrap().unwrap().state, JobState::Queued);

    let failed = repo
        .compare_and_set(job.id, JobState::Queued, JobState::Failed, Some("boom"), now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.error_info.as_deref(), Some("boom"));
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn inactive_job_fails_once() {
    let repo = PgJobRepository::new(pool().await);
    let started = now() - Duration::hours(3);
    let job = job(JobState::Running, started);
    repo.insert(&job).await.unwrap();

    let cutoff = now() - Duration::hours(1);
    let failed = repo
        .fail_if_inactive_since(job.id, cutoff, STUCK_ERROR)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(failed.state, JobState::Failed);
    assert_eq!(failed.error_info.as_deref(), Some(STUCK_ERROR));

    assert!(repo
        .fail_if_inactive_since(job.id, cutoff, STUCK_ERROR)
        .await
        .unwrap()
        .is_none());

    let fresh = self::job(JobState::Queued, now());
    repo.insert(&fresh).await.unwrap();
    assert!(repo
        .fail_if_inactive_since(fresh.id, cutoff, STUCK_ERROR)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn touch_skips_terminal_jobs() {
    let repo = PgJobRepository::new(pool().await);
    let running = job(JobState::Running, now() - Duration::minutes(5));
    let complete = job(JobState::Complete, now() - Duration::minutes(5));
    repo.insert(&running).await.unwrap();
    repo.insert(&complete).await.unwrap();

    let at = now();
    assert!(repo.touch(running.id, at).await.unwrap());
    assert_eq!(repo.find(running.id).await.unwrap().unwrap().last_activity_at, at);

    assert!(!repo.touch(complete.id, at).await.unwrap());
    assert_eq!(
        repo.find(complete.id).await.unwrap().unwrap().last_activity_at,
        complete.last_activity_at
    );
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn pending_before_lists_only_old_pending_jobs() {
    let repo = PgJobRepository::new(pool().await);
    let old = job(JobState::Pending, now() - Duration::hours(1));
    let queued = job(JobState::Queued, now() - Duration::hours(1));
    repo.insert(&old).await.unwrap();
    repo.insert(&queued).await.unwrap();

    let ids = repo.pending_before(now() - Duration::minutes(30)).await.unwrap();
    assert!(ids.contains(&old.id));
    assert!(!ids.contains(&queued.id));
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn token_put_replaces_and_remove_reports_presence() {
    let store = PgTokenStore::new(pool().await);
    let user = Uuid::new_v4();

    assert!(store.get(user, "google_drive").await.unwrap().is_none());

    store.put(user, "google_drive", "first").await.unwrap();
    let replaced = store.put(user, "google_drive", "second").await.unwrap();
    assert_eq!(replaced.token, "second");
    assert_eq!(
        store.get(user, "google_drive").await.unwrap().unwrap().token,
        "second"
    );

    assert!(store.remove(user, "google_drive").await.unwrap());
    assert!(!store.remove(user, "google_drive").await.unwrap());
    assert!(store.get(user, "google_drive").await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires PostgreSQL (DATABASE_URL)"]
async fn publish_writes_background_job_row() {
    let pool = pool().await;
    let queue = PgDispatchQueue::new(pool.clone());
    let job_id = Uuid::new_v4();

    queue.publish(ImportTask { job_id }).await.unwrap();

    let data: Value = sqlx::query_scalar(
        "SELECT data FROM background_jobs WHERE job_type = $1 AND data->>'job_id' = $2",
    )
    .bind(IMPORT_JOB_TYPE)
    .bind(job_id.to_string())
    .fetch_one(&pool)
    .await
    .unwrap();

    let task: ImportTask = serde_json::from_value(data).unwrap();
    assert_eq!(task, ImportTask { job_id });
}
