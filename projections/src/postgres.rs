//! `PostgreSQL` read-model and audit stores.
//!
//! # Overview
//!
//! Documents are stored as JSONB, one table per document kind:
//!
//! ```sql
//! CREATE TABLE tickets (id TEXT PRIMARY KEY, data JSONB NOT NULL, updated_at TIMESTAMPTZ NOT NULL);
//! CREATE TABLE priorities (id TEXT PRIMARY KEY, data JSONB NOT NULL);
//! CREATE TABLE statuses (id TEXT PRIMARY KEY, data JSONB NOT NULL);
//! CREATE TABLE ticket_events (
//!     id UUID PRIMARY KEY,
//!     ticket_id TEXT NOT NULL,
//!     created TIMESTAMPTZ NOT NULL,
//!     data JSONB NOT NULL
//! );
//! ```
//!
//! All stores share one [`PgPool`]; handlers never lock. Ticket writes are
//! upserts, so concurrent updates of the same ticket resolve last-write-wins.
//! Audit inserts use `ON CONFLICT DO NOTHING`, making redelivery of an event
//! with a derived audit id a no-op.
//!
//! # Example
//!
//! ```ignore
//! let read_model = PostgresReadModel::connect("postgres://localhost/ticketflow", 10).await?;
//! read_model.migrate().await?;
//!
//! let tickets: Arc<dyn TicketStore> = Arc::new(read_model.tickets());
//! ```

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use ticketflow_core::read_model::{Priority, Status, Ticket, TicketEventRecord};
use ticketflow_core::store::{
    AuditStore, PriorityStore, StatusStore, StoreError, StoreFuture, TicketStore,
};
use ticketflow_core::types::{PriorityId, StatusId, TicketId};

/// Connection pool and migrations for the read-model database.
#[derive(Clone)]
pub struct PostgresReadModel {
    pool: PgPool,
}

impl PostgresReadModel {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool of at most `max_connections` connections.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to connect: {e}")))?;
        Ok(Self::new(pool))
    }

    /// Create the read-model tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Ticket store on this pool.
    #[must_use]
    pub fn tickets(&self) -> PostgresTicketStore {
        PostgresTicketStore {
            pool: self.pool.clone(),
        }
    }

    /// Priority store on this pool.
    #[must_use]
    pub fn priorities(&self) -> PostgresPriorityStore {
        PostgresPriorityStore {
            pool: self.pool.clone(),
        }
    }

    /// Status store on this pool.
    #[must_use]
    pub fn statuses(&self) -> PostgresStatusStore {
        PostgresStatusStore {
            pool: self.pool.clone(),
        }
    }

    /// Audit store on this pool.
    #[must_use]
    pub fn audit(&self) -> PostgresAuditStore {
        PostgresAuditStore {
            pool: self.pool.clone(),
        }
    }
}

/// Tickets in the `tickets` table.
#[derive(Clone)]
pub struct PostgresTicketStore {
    pool: PgPool,
}

impl TicketStore for PostgresTicketStore {
    fn find<'a>(&'a self, id: &'a TicketId) -> StoreFuture<'a, Ticket> {
        Box::pin(async move {
            let row: Option<(Json<Ticket>,)> =
                sqlx::query_as("SELECT data FROM tickets WHERE id = $1")
                    .bind(id.as_str())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| StoreError::Backend(format!("Failed to load ticket: {e}")))?;

            row.map(|(Json(ticket),)| ticket)
                .ok_or_else(|| StoreError::NotFound {
                    entity: "ticket",
                    id: id.to_string(),
                })
        })
    }

    fn update<'a>(&'a self, ticket: &'a Ticket) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO tickets (id, data, updated_at)
                 VALUES ($1, $2, now())
                 ON CONFLICT (id) DO UPDATE
                 SET data = EXCLUDED.data, updated_at = now()",
            )
            .bind(ticket.id.as_str())
            .bind(Json(ticket))
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to save ticket: {e}")))?;
            Ok(())
        })
    }
}

/// Priorities in the `priorities` table.
#[derive(Clone)]
pub struct PostgresPriorityStore {
    pool: PgPool,
}

impl PriorityStore for PostgresPriorityStore {
    fn find<'a>(&'a self, id: &'a PriorityId) -> StoreFuture<'a, Priority> {
        Box::pin(async move {
            let row: Option<(Json<Priority>,)> =
                sqlx::query_as("SELECT data FROM priorities WHERE id = $1")
                    .bind(id.as_str())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| StoreError::Backend(format!("Failed to load priority: {e}")))?;

            row.map(|(Json(priority),)| priority)
                .ok_or_else(|| StoreError::NotFound {
                    entity: "priority",
                    id: id.to_string(),
                })
        })
    }
}

/// Statuses in the `statuses` table.
#[derive(Clone)]
pub struct PostgresStatusStore {
    pool: PgPool,
}

impl StatusStore for PostgresStatusStore {
    fn find<'a>(&'a self, id: &'a StatusId) -> StoreFuture<'a, Status> {
        Box::pin(async move {
            let row: Option<(Json<Status>,)> =
                sqlx::query_as("SELECT data FROM statuses WHERE id = $1")
                    .bind(id.as_str())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| StoreError::Backend(format!("Failed to load status: {e}")))?;

            row.map(|(Json(status),)| status)
                .ok_or_else(|| StoreError::NotFound {
                    entity: "status",
                    id: id.to_string(),
                })
        })
    }
}

/// Audit records in the `ticket_events` table.
#[derive(Clone)]
pub struct PostgresAuditStore {
    pool: PgPool,
}

impl PostgresAuditStore {
    /// Audit records of `ticket_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the query fails.
    pub async fn for_ticket(
        &self,
        ticket_id: &TicketId,
    ) -> Result<Vec<TicketEventRecord>, StoreError> {
        let rows: Vec<(Json<TicketEventRecord>,)> = sqlx::query_as(
            "SELECT data FROM ticket_events
             WHERE ticket_id = $1
             ORDER BY created ASC",
        )
        .bind(ticket_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(format!("Failed to load ticket events: {e}")))?;

        Ok(rows.into_iter().map(|(Json(record),)| record).collect())
    }
}

impl AuditStore for PostgresAuditStore {
    fn add<'a>(&'a self, record: &'a TicketEventRecord) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let result = sqlx::query(
                "INSERT INTO ticket_events (id, ticket_id, created, data)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(*record.id.as_uuid())
            .bind(record.ticket_id.as_str())
            .bind(record.created)
            .bind(Json(record))
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to add ticket event: {e}")))?;

            if result.rows_affected() == 0 {
                tracing::debug!(audit_id = %record.id, "Audit record already stored");
            }
            Ok(())
        })
    }
}
