//! SQLite-backed app record store.

use std::path::Path;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::app::App;
use crate::error::CoreError;
use crate::state::InstallationState;

use super::{
    APP_COLUMNS, AppPatch, AppRecord, AppStore, ColumnValue, PENDING_RUN_STATES, StateConstraint,
    row_values,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

/// SQLite-backed app record store.
#[derive(Clone)]
pub struct SqliteAppStore {
    pool: SqlitePool,
}

impl SqliteAppStore {
    /// Create a store from an existing, migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) a database file and run migrations.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = SqliteAppStore::from_path(".data/apps.db").await?;
    /// ```
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::DatabaseError {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        Self::connect(&url).await
    }

    /// Connect to a `sqlite:` URL and run migrations.
    pub async fn connect(url: &str) -> Result<Self, CoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {}: {}", url, e),
            })?;

        migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn exists(&self, app_id: &str) -> Result<bool, CoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM apps WHERE id = ?")
            .bind(app_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }
}

/// Run the embedded SQLite migrations.
pub async fn migrate(pool: &SqlitePool) -> Result<(), CoreError> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| CoreError::DatabaseError {
            operation: "migrate".to_string(),
            details: format!("Failed to run migrations: {}", e),
        })
}

fn bind_value(qb: &mut QueryBuilder<'_, Sqlite>, value: ColumnValue) {
    match value {
        ColumnValue::Text(v) => qb.push_bind(v),
        ColumnValue::Int(v) => qb.push_bind(v),
        ColumnValue::Time(v) => qb.push_bind(v),
    };
}

fn push_constraint(qb: &mut QueryBuilder<'_, Sqlite>, constraint: StateConstraint) {
    match constraint {
        StateConstraint::Any => {}
        StateConstraint::InstallationStateIn(states) => {
            qb.push(" AND installation_state IN (");
            let mut list = qb.separated(", ");
            for state in states {
                list.push_bind(state.as_str());
            }
            list.push_unseparated(")");
        }
        StateConstraint::RunCommandAllowed => {
            qb.push(" AND installation_state = ")
                .push_bind(InstallationState::Installed.as_str());
            qb.push(" AND run_state NOT IN (");
            let mut list = qb.separated(", ");
            for state in PENDING_RUN_STATES {
                list.push_bind(state.as_str());
            }
            list.push_unseparated(")");
        }
    }
}

#[async_trait::async_trait]
impl AppStore for SqliteAppStore {
    async fn add(&self, app: &App) -> Result<(), CoreError> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("INSERT INTO apps ({}) VALUES (", APP_COLUMNS));
        for (i, value) in row_values(app)?.into_iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            bind_value(&mut qb, value);
        }
        qb.push(")");

        match qb.build().execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(CoreError::AppAlreadyExists {
                    app_id: app.id.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, app_id: &str) -> Result<Option<App>, CoreError> {
        let sql = format!("SELECT {} FROM apps WHERE id = ?", APP_COLUMNS);
        let record = sqlx::query_as::<_, AppRecord>(&sql)
            .bind(app_id)
            .fetch_optional(&self.pool)
            .await?;

        record.map(App::try_from).transpose()
    }

    async fn list(&self) -> Result<Vec<App>, CoreError> {
        let sql = format!("SELECT {} FROM apps ORDER BY id", APP_COLUMNS);
        let records = sqlx::query_as::<_, AppRecord>(&sql)
            .fetch_all(&self.pool)
            .await?;

        records.into_iter().map(App::try_from).collect()
    }

    async fn update(
        &self,
        app_id: &str,
        patch: &AppPatch,
        constraint: StateConstraint,
    ) -> Result<(), CoreError> {
        let assignments = patch.assignments()?;
        if assignments.is_empty() {
            return Ok(());
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE apps SET ");
        for (i, (column, value)) in assignments.into_iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push(column).push(" = ");
            bind_value(&mut qb, value);
        }
        qb.push(" WHERE id = ").push_bind(app_id.to_string());
        push_constraint(&mut qb, constraint);

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() > 0 {
            return Ok(());
        }

        if self.exists(app_id).await? {
            Err(CoreError::StateConflict {
                app_id: app_id.to_string(),
                constraint: constraint.describe(),
            })
        } else {
            Err(CoreError::AppNotFound {
                app_id: app_id.to_string(),
            })
        }
    }

    async fn delete(&self, app_id: &str) -> Result<(), CoreError> {
        let result = sqlx::query("DELETE FROM apps WHERE id = ?")
            .bind(app_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::AppNotFound {
                app_id: app_id.to_string(),
            });
        }
        Ok(())
    }
}
