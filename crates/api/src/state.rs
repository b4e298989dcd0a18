//! Shared application state and its wiring from configuration.

use std::sync::Arc;
use std::time::Duration;

use domain::{Project, Task};
use membership_saga::{
    AvailableMembersClient, EligibilityService, HttpNotifier, MembershipOrchestrator, Notifier,
    OrchestratorSettings, ProjectRosterClient,
};
use membership_store::{InMemoryMembershipStore, MembershipStore, PostgresMembershipStore};
use resilience::{CircuitBreaker, RemoteClient};
use sqlx::postgres::PgPoolOptions;
use tokio::time::Instant;

use crate::config::Config;
use crate::error::StartupError;

/// Orchestrator over type-erased store and peer adapters.
pub type Orchestrator<A> = MembershipOrchestrator<
    A,
    Arc<dyn MembershipStore<A>>,
    Arc<dyn EligibilityService>,
    Arc<dyn Notifier>,
>;

type Stores = (
    Arc<dyn MembershipStore<Project>>,
    Arc<dyn MembershipStore<Task>>,
);

/// Peer service adapters.
#[derive(Clone)]
pub struct Peers {
    /// Decides who may join a project.
    pub project_eligibility: Arc<dyn EligibilityService>,
    /// Decides who may join a task: the owning project's roster.
    pub task_eligibility: Arc<dyn EligibilityService>,
    pub notifier: Arc<dyn Notifier>,
}

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub projects: Orchestrator<Project>,
    pub tasks: Orchestrator<Task>,
    /// Breakers reported by the health endpoint.
    pub breakers: Vec<Arc<CircuitBreaker>>,
    /// Budget for all peer calls made on behalf of one request.
    pub request_deadline: Duration,
}

impl AppState {
    pub fn new(
        project_store: Arc<dyn MembershipStore<Project>>,
        task_store: Arc<dyn MembershipStore<Task>>,
        peers: Peers,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            projects: MembershipOrchestrator::new(
                project_store,
                peers.project_eligibility,
                Arc::clone(&peers.notifier),
            )
            .with_settings(settings),
            tasks: MembershipOrchestrator::new(task_store, peers.task_eligibility, peers.notifier)
                .with_settings(settings),
            breakers: Vec::new(),
            request_deadline: Duration::from_secs(10),
        }
    }

    pub fn with_breakers(mut self, breakers: Vec<Arc<CircuitBreaker>>) -> Self {
        self.breakers = breakers;
        self
    }

    pub fn with_request_deadline(mut self, request_deadline: Duration) -> Self {
        self.request_deadline = request_deadline;
        self
    }

    /// Returns the deadline for a request starting now.
    pub fn deadline(&self) -> Instant {
        Instant::now() + self.request_deadline
    }
}

/// Builds the application state: stores from `DATABASE_URL` (or in memory)
/// and one resilient client per peer service.
pub async fn build_state(config: &Config) -> Result<AppState, StartupError> {
    let (project_store, task_store) = match &config.database_url {
        Some(url) => postgres_stores(url).await?,
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores");
            in_memory_stores()
        }
    };

    let users = RemoteClient::new(config.remote("users", &config.users_service_url))?;
    let projects = RemoteClient::new(config.remote("projects", &config.projects_service_url))?;
    let notifications = RemoteClient::new(
        config.remote("notifications", &config.notifications_service_url),
    )?;
    let breakers = vec![
        Arc::clone(users.breaker()),
        Arc::clone(projects.breaker()),
        Arc::clone(notifications.breaker()),
    ];

    let peers = Peers {
        project_eligibility: Arc::new(AvailableMembersClient::new(users)),
        task_eligibility: Arc::new(ProjectRosterClient::new(projects)),
        notifier: Arc::new(HttpNotifier::new(notifications)),
    };

    Ok(
        AppState::new(project_store, task_store, peers, config.orchestrator())
            .with_breakers(breakers)
            .with_request_deadline(config.request_deadline),
    )
}

async fn postgres_stores(url: &str) -> Result<Stores, StartupError> {
    let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
    let projects = PostgresMembershipStore::<Project>::new(pool.clone());
    projects.run_migrations().await?;
    tracing::info!("connected to PostgreSQL, migrations applied");

    let project_store: Arc<dyn MembershipStore<Project>> = Arc::new(projects);
    let task_store: Arc<dyn MembershipStore<Task>> =
        Arc::new(PostgresMembershipStore::<Task>::new(pool));
    Ok((project_store, task_store))
}

fn in_memory_stores() -> Stores {
    let project_store: Arc<dyn MembershipStore<Project>> =
        Arc::new(InMemoryMembershipStore::<Project>::new());
    let task_store: Arc<dyn MembershipStore<Task>> =
        Arc::new(InMemoryMembershipStore::<Task>::new());
    (project_store, task_store)
}
