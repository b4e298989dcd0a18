//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p membership-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use domain::{Member, Project, Task, TaskStatus};
use membership_store::{
    AddOutcome, AggregateId, MembershipStore, PostgresMembershipStore, RemoveOutcome, StoreError,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_membership_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh pool with cleared tables
async fn get_test_pool() -> PgPool {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE projects, tasks")
        .execute(&pool)
        .await
        .unwrap();

    pool
}

fn alice() -> Member {
    Member::new("alice", "Alice", "Smith")
}

#[tokio::test]
#[serial]
async fn insert_and_find_project() {
    let store = PostgresMembershipStore::<Project>::new(get_test_pool().await);
    let project = Project::new("P1", "Apollo")
        .with_manager("manager")
        .with_members([alice()]);

    store.insert(project.clone()).await.unwrap();

    let loaded = store.find(&AggregateId::from("P1")).await.unwrap();
    assert_eq!(loaded, Some(project));
    assert!(
        store
            .find(&AggregateId::from("missing"))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
#[serial]
async fn insert_duplicate_id_fails() {
    let store = PostgresMembershipStore::<Project>::new(get_test_pool().await);
    store.insert(Project::new("P1", "Apollo")).await.unwrap();

    let result = store.insert(Project::new("P1", "Gemini")).await;
    assert!(matches!(result, Err(StoreError::Duplicate { .. })));
}

#[tokio::test]
#[serial]
async fn add_member_appends_once() {
    let store = PostgresMembershipStore::<Project>::new(get_test_pool().await);
    let id = AggregateId::from("P1");
    store.insert(Project::new("P1", "Apollo")).await.unwrap();

    assert_eq!(
        store.add_member(&id, alice()).await.unwrap(),
        AddOutcome::Added
    );
    assert_eq!(
        store.add_member(&id, alice()).await.unwrap(),
        AddOutcome::AlreadyMember
    );
    assert!(store.member_exists(&id, "alice").await.unwrap());
    assert_eq!(store.get_members(&id).await.unwrap(), vec![alice()]);
}

#[tokio::test]
#[serial]
async fn add_member_to_missing_project_is_not_found() {
    let store = PostgresMembershipStore::<Project>::new(get_test_pool().await);
    let result = store.add_member(&AggregateId::from("nope"), alice()).await;
    assert!(matches!(result, Err(StoreError::NotFound { .. })));
}

#[tokio::test]
#[serial]
async fn closed_project_is_frozen() {
    let store = PostgresMembershipStore::<Project>::new(get_test_pool().await);
    let id = AggregateId::from("P1");
    store
        .insert(Project::new("P1", "Apollo").closed().with_members([alice()]))
        .await
        .unwrap();

    assert_eq!(
        store
            .add_member(&id, Member::with_username("bob"))
            .await
            .unwrap(),
        AddOutcome::Frozen
    );
    assert_eq!(
        store.remove_member(&id, "alice").await.unwrap(),
        RemoveOutcome::Frozen
    );
    assert_eq!(store.get_members(&id).await.unwrap(), vec![alice()]);
}

#[tokio::test]
#[serial]
async fn remove_member_preserves_order_of_the_rest() {
    let store = PostgresMembershipStore::<Task>::new(get_test_pool().await);
    let id = AggregateId::from("T1");
    store
        .insert(Task::new("T1", "P1", "Docs").with_members([
            Member::with_username("carol"),
            alice(),
            Member::with_username("bob"),
        ]))
        .await
        .unwrap();

    assert_eq!(
        store.remove_member(&id, "alice").await.unwrap(),
        RemoveOutcome::Removed
    );
    assert_eq!(
        store.remove_member(&id, "alice").await.unwrap(),
        RemoveOutcome::NotMember
    );

    let usernames: Vec<_> = store
        .get_members(&id)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.username)
        .collect();
    assert_eq!(usernames, ["carol", "bob"]);
}

#[tokio::test]
#[serial]
async fn finished_task_round_trips_status() {
    let store = PostgresMembershipStore::<Task>::new(get_test_pool().await);
    let task = Task::new("T1", "P1", "Docs").with_status(TaskStatus::Finished);
    store.insert(task.clone()).await.unwrap();

    let loaded = store.find(&AggregateId::from("T1")).await.unwrap().unwrap();
    assert_eq!(loaded.status, TaskStatus::Finished);
    assert_eq!(
        store
            .remove_member(&AggregateId::from("T1"), "alice")
            .await
            .unwrap(),
        RemoveOutcome::Frozen
    );
}

#[tokio::test]
#[serial]
async fn concurrent_adds_store_a_single_entry() {
    let store = PostgresMembershipStore::<Project>::new(get_test_pool().await);
    let id = AggregateId::from("P1");
    store.insert(Project::new("P1", "Apollo")).await.unwrap();

    let attempts = (0..8).map(|_| store.add_member(&id, alice()));
    let outcomes = futures_util::future::join_all(attempts).await;

    let added = outcomes
        .iter()
        .filter(|o| matches!(o, Ok(AddOutcome::Added)))
        .count();
    assert_eq!(added, 1);
    assert!(
        outcomes
            .iter()
            .all(|o| matches!(o, Ok(AddOutcome::Added | AddOutcome::AlreadyMember)))
    );
    assert_eq!(store.get_members(&id).await.unwrap().len(), 1);
}
