use std::marker::PhantomData;

use async_trait::async_trait;
use domain::{Member, Membered, Project, Task, TaskStatus};
use serde_json::json;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row};

use crate::{
    AggregateId, Result, StoreError,
    store::{AddOutcome, MembershipStore, RemoveOutcome},
};

/// How many times a conditional write is re-attempted when the follow-up
/// read shows it should have matched.
const CONTENDED_ATTEMPTS: usize = 3;

/// Maps an aggregate onto its PostgreSQL document table.
pub trait PgDocument: Membered {
    /// Table holding one row per aggregate.
    const TABLE: &'static str;

    /// SQL boolean expression that is true when the roster is frozen.
    const FROZEN_SQL: &'static str;

    /// Builds the `INSERT` statement for a new document.
    fn insert_query(&self, members: serde_json::Value) -> Query<'static, Postgres, PgArguments>;

    /// Decodes a full row into the aggregate.
    fn from_row(row: &PgRow) -> Result<Self>;
}

fn members_from_row(row: &PgRow) -> Result<Vec<Member>> {
    let members: Json<Vec<Member>> = row.try_get("members")?;
    Ok(members.0)
}

impl PgDocument for Project {
    const TABLE: &'static str = "projects";
    const FROZEN_SQL: &'static str = "closed";

    fn insert_query(&self, members: serde_json::Value) -> Query<'static, Postgres, PgArguments> {
        sqlx::query(
            "INSERT INTO projects (id, name, manager, closed, members) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(self.id.as_str().to_string())
        .bind(self.name.clone())
        .bind(self.manager.clone())
        .bind(self.closed)
        .bind(members)
    }

    fn from_row(row: &PgRow) -> Result<Self> {
        Ok(Project {
            id: AggregateId::from(row.try_get::<String, _>("id")?),
            name: row.try_get("name")?,
            manager: row.try_get("manager")?,
            closed: row.try_get("closed")?,
            members: members_from_row(row)?,
        })
    }
}

impl PgDocument for Task {
    const TABLE: &'static str = "tasks";
    const FROZEN_SQL: &'static str = "status = 'FINISHED'";

    fn insert_query(&self, members: serde_json::Value) -> Query<'static, Postgres, PgArguments> {
        sqlx::query(
            "INSERT INTO tasks (id, project_id, name, status, members) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(self.id.as_str().to_string())
        .bind(self.project_id.as_str().to_string())
        .bind(self.name.clone())
        .bind(self.status.as_str())
        .bind(members)
    }

    fn from_row(row: &PgRow) -> Result<Self> {
        let status: String = row.try_get("status")?;
        let status: TaskStatus = status
            .parse()
            .map_err(|e: domain::DomainError| StoreError::Corrupt(e.to_string()))?;

        Ok(Task {
            id: AggregateId::from(row.try_get::<String, _>("id")?),
            project_id: AggregateId::from(row.try_get::<String, _>("project_id")?),
            name: row.try_get("name")?,
            status,
            members: members_from_row(row)?,
        })
    }
}

/// Containment probe matching any roster entry with this username.
fn username_probe(username: &str) -> serde_json::Value {
    json!([{ "username": username }])
}

/// PostgreSQL-backed membership store.
///
/// Rosters live in a JSONB array column. Pushes and pulls are single
/// `UPDATE` statements whose `WHERE` clause carries the id, the frozen
/// guard and the username (non-)containment check.
pub struct PostgresMembershipStore<A> {
    pool: PgPool,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A> Clone for PostgresMembershipStore<A> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _aggregate: PhantomData,
        }
    }
}

impl<A: PgDocument> PostgresMembershipStore<A> {
    /// Creates a new PostgreSQL membership store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _aggregate: PhantomData,
        }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn not_found(id: &AggregateId) -> StoreError {
        StoreError::NotFound {
            kind: A::kind(),
            id: id.clone(),
        }
    }

    /// Reads the frozen flag and username presence for a document.
    async fn probe(&self, id: &AggregateId, username: &str) -> Result<Option<(bool, bool)>> {
        let sql = format!(
            "SELECT ({frozen}) AS frozen, members @> $2 AS present FROM {table} WHERE id = $1",
            frozen = A::FROZEN_SQL,
            table = A::TABLE,
        );
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .bind(username_probe(username))
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let frozen: bool = row.try_get("frozen")?;
        let present: bool = row.try_get("present")?;
        Ok(Some((frozen, present)))
    }
}

#[async_trait]
impl<A: PgDocument> MembershipStore<A> for PostgresMembershipStore<A> {
    #[tracing::instrument(skip(self, aggregate), fields(id = %aggregate.id()))]
    async fn insert(&self, aggregate: A) -> Result<()> {
        let members = serde_json::to_value(aggregate.members())?;
        aggregate
            .insert_query(members)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.is_unique_violation()
                {
                    return StoreError::Duplicate {
                        kind: A::kind(),
                        id: aggregate.id().clone(),
                    };
                }
                StoreError::Database(e)
            })?;
        Ok(())
    }

    async fn find(&self, id: &AggregateId) -> Result<Option<A>> {
        let sql = format!("SELECT * FROM {} WHERE id = $1", A::TABLE);
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(A::from_row).transpose()
    }

    async fn member_exists(&self, id: &AggregateId, username: &str) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1 AND members @> $2)",
            A::TABLE
        );
        let exists: bool = sqlx::query_scalar(&sql)
            .bind(id.as_str())
            .bind(username_probe(username))
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    #[tracing::instrument(skip(self, member), fields(username = %member.username))]
    async fn add_member(&self, id: &AggregateId, member: Member) -> Result<AddOutcome> {
        let sql = format!(
            r#"
            UPDATE {table}
            SET members = members || $2
            WHERE id = $1 AND NOT ({frozen}) AND NOT (members @> $3)
            "#,
            table = A::TABLE,
            frozen = A::FROZEN_SQL,
        );
        let pushed = serde_json::to_value([&member])?;

        for _ in 0..CONTENDED_ATTEMPTS {
            let result = sqlx::query(&sql)
                .bind(id.as_str())
                .bind(pushed.clone())
                .bind(username_probe(&member.username))
                .execute(&self.pool)
                .await?;

            if result.rows_affected() == 1 {
                metrics::counter!("membership_store_mutations_total", "op" => "add").increment(1);
                return Ok(AddOutcome::Added);
            }

            match self.probe(id, &member.username).await? {
                None => return Err(Self::not_found(id)),
                Some((true, _)) => return Ok(AddOutcome::Frozen),
                Some((false, true)) => return Ok(AddOutcome::AlreadyMember),
                // Someone pulled the member between our write and the probe.
                Some((false, false)) => continue,
            }
        }

        Err(StoreError::Contended {
            kind: A::kind(),
            id: id.clone(),
        })
    }

    #[tracing::instrument(skip(self))]
    async fn remove_member(&self, id: &AggregateId, username: &str) -> Result<RemoveOutcome> {
        let sql = format!(
            r#"
            UPDATE {table}
            SET members = COALESCE(
                (SELECT jsonb_agg(elem ORDER BY pos)
                 FROM jsonb_array_elements(members) WITH ORDINALITY AS roster(elem, pos)
                 WHERE elem->>'username' <> $2),
                '[]'::jsonb)
            WHERE id = $1 AND NOT ({frozen}) AND members @> $3
            "#,
            table = A::TABLE,
            frozen = A::FROZEN_SQL,
        );

        for _ in 0..CONTENDED_ATTEMPTS {
            let result = sqlx::query(&sql)
                .bind(id.as_str())
                .bind(username)
                .bind(username_probe(username))
                .execute(&self.pool)
                .await?;

            if result.rows_affected() == 1 {
                metrics::counter!("membership_store_mutations_total", "op" => "remove")
                    .increment(1);
                return Ok(RemoveOutcome::Removed);
            }

            match self.probe(id, username).await? {
                None => return Err(Self::not_found(id)),
                Some((true, _)) => return Ok(RemoveOutcome::Frozen),
                Some((false, false)) => return Ok(RemoveOutcome::NotMember),
                Some((false, true)) => continue,
            }
        }

        Err(StoreError::Contended {
            kind: A::kind(),
            id: id.clone(),
        })
    }

    async fn get_members(&self, id: &AggregateId) -> Result<Vec<Member>> {
        let sql = format!("SELECT members FROM {} WHERE id = $1", A::TABLE);
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Self::not_found(id))?;
        members_from_row(&row)
    }
}
