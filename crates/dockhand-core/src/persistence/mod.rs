//! App Record Store interfaces and backends.
//!
//! The store is the only durable state of the system. Every write goes
//! through [`AppStore::update`], which carries a [`StateConstraint`] rendered
//! into the `WHERE` clause; a write that matches no row is reported as a
//! conflict (or a missing app), never silently dropped.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresAppStore;
pub use self::sqlite::SqliteAppStore;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::app::{
    AccessRestriction, AddonConfig, AlternateDomain, App, DebugMode, Manifest, OldConfig, PortBinding,
    RestoreConfig, UpdateConfig,
};
use crate::error::CoreError;
use crate::state::{Health, InstallationState, RunState, TransitionRule};

/// Columns selected for an app row, shared by both backends.
pub(crate) const APP_COLUMNS: &str = "id, app_store_id, installation_state, installation_progress, \
     run_state, health, container_id, manifest_json, location, domain, alternate_domains_json, \
     port_bindings_json, env_json, addon_config_json, access_restriction_json, memory_limit, debug_mode_json, \
     old_config_json, update_config_json, restore_config_json, http_port, data_dir, \
     update_time, created_at";

/// App row as stored in the database.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppRecord {
    /// App identifier.
    pub id: String,
    /// Catalog reference.
    pub app_store_id: Option<String>,
    /// Installation state.
    pub installation_state: String,
    /// Progress or failure message.
    pub installation_progress: String,
    /// Run state.
    pub run_state: String,
    /// Health.
    pub health: Option<String>,
    /// Primary container.
    pub container_id: Option<String>,
    /// Serialized manifest.
    pub manifest_json: String,
    /// Subdomain.
    pub location: String,
    /// Zone.
    pub domain: String,
    /// Serialized alternate domains.
    pub alternate_domains_json: String,
    /// Serialized port bindings.
    pub port_bindings_json: String,
    /// Serialized environment overrides.
    pub env_json: String,
    /// Serialized addon configuration.
    pub addon_config_json: String,
    /// Serialized access restriction.
    pub access_restriction_json: Option<String>,
    /// Memory limit override.
    pub memory_limit: i64,
    /// Serialized debug mode.
    pub debug_mode_json: Option<String>,
    /// Serialized pre-change snapshot.
    pub old_config_json: Option<String>,
    /// Serialized pending update.
    pub update_config_json: Option<String>,
    /// Serialized restore coordinates.
    pub restore_config_json: Option<String>,
    /// Reserved HTTP host port.
    pub http_port: Option<i64>,
    /// Custom data directory.
    pub data_dir: Option<String>,
    /// Last update completion.
    pub update_time: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

fn parse_json<T: serde::de::DeserializeOwned>(
    column: &str,
    raw: &str,
) -> Result<T, CoreError> {
    serde_json::from_str(raw).map_err(|e| CoreError::DatabaseError {
        operation: "decode".to_string(),
        details: format!("column {}: {}", column, e),
    })
}

fn parse_optional_json<T: serde::de::DeserializeOwned>(
    column: &str,
    raw: Option<&str>,
) -> Result<Option<T>, CoreError> {
    raw.map(|raw| parse_json(column, raw)).transpose()
}

impl TryFrom<AppRecord> for App {
    type Error = CoreError;

    fn try_from(row: AppRecord) -> Result<Self, Self::Error> {
        let http_port = row
            .http_port
            .map(|port| {
                u16::try_from(port).map_err(|_| CoreError::DatabaseError {
                    operation: "decode".to_string(),
                    details: format!("http_port {} out of range", port),
                })
            })
            .transpose()?;

        Ok(App {
            installation_state: row.installation_state.parse()?,
            run_state: row.run_state.parse()?,
            health: row
                .health
                .as_deref()
                .map(str::parse::<Health>)
                .transpose()?,
            manifest: parse_json("manifest_json", &row.manifest_json)?,
            alternate_domains: parse_json("alternate_domains_json", &row.alternate_domains_json)?,
            port_bindings: parse_json("port_bindings_json", &row.port_bindings_json)?,
            env: parse_json("env_json", &row.env_json)?,
            addon_config: parse_json("addon_config_json", &row.addon_config_json)?,
            access_restriction: parse_optional_json(
                "access_restriction_json",
                row.access_restriction_json.as_deref(),
            )?,
            debug_mode: parse_optional_json("debug_mode_json", row.debug_mode_json.as_deref())?,
            old_config: parse_optional_json("old_config_json", row.old_config_json.as_deref())?,
            update_config: parse_optional_json(
                "update_config_json",
                row.update_config_json.as_deref(),
            )?,
            restore_config: parse_optional_json(
                "restore_config_json",
                row.restore_config_json.as_deref(),
            )?,
            http_port,
            id: row.id,
            app_store_id: row.app_store_id,
            installation_progress: row.installation_progress,
            container_id: row.container_id,
            location: row.location,
            domain: row.domain,
            memory_limit: row.memory_limit,
            data_dir: row.data_dir,
            update_time: row.update_time,
            created_at: row.created_at,
        })
    }
}

/// A value bound into an `UPDATE ... SET` clause.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ColumnValue {
    Text(Option<String>),
    Int(Option<i64>),
    Time(Option<DateTime<Utc>>),
}

/// Serialized column values of a full app row, in [`APP_COLUMNS`] order.
pub(crate) fn row_values(app: &App) -> Result<Vec<ColumnValue>, CoreError> {
    use ColumnValue::*;

    Ok(vec![
        Text(Some(app.id.clone())),
        Text(app.app_store_id.clone()),
        Text(Some(app.installation_state.as_str().to_string())),
        Text(Some(app.installation_progress.clone())),
        Text(Some(app.run_state.as_str().to_string())),
        Text(app.health.map(|h| h.as_str().to_string())),
        Text(app.container_id.clone()),
        Text(Some(serde_json::to_string(&app.manifest)?)),
        Text(Some(app.location.clone())),
        Text(Some(app.domain.clone())),
        Text(Some(serde_json::to_string(&app.alternate_domains)?)),
        Text(Some(serde_json::to_string(&app.port_bindings)?)),
        Text(Some(serde_json::to_string(&app.env)?)),
        Text(Some(serde_json::to_string(&app.addon_config)?)),
        Text(to_optional_json(&app.access_restriction)?),
        Int(Some(app.memory_limit)),
        Text(to_optional_json(&app.debug_mode)?),
        Text(to_optional_json(&app.old_config)?),
        Text(to_optional_json(&app.update_config)?),
        Text(to_optional_json(&app.restore_config)?),
        Int(app.http_port.map(i64::from)),
        Text(app.data_dir.clone()),
        Time(app.update_time),
        Time(Some(app.created_at)),
    ])
}

fn to_optional_json<T: serde::Serialize>(value: &Option<T>) -> Result<Option<String>, CoreError> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(CoreError::from)
}

/// Partial update of an app record.
///
/// `None` leaves a column untouched; for nullable columns `Some(None)` writes NULL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppPatch {
    /// New installation state.
    pub installation_state: Option<InstallationState>,
    /// New progress message.
    pub installation_progress: Option<String>,
    /// New run state.
    pub run_state: Option<RunState>,
    /// New health.
    pub health: Option<Option<Health>>,
    /// New primary container.
    pub container_id: Option<Option<String>>,
    /// New manifest.
    pub manifest: Option<Manifest>,
    /// New location.
    pub location: Option<String>,
    /// New domain.
    pub domain: Option<String>,
    /// New alternate domains.
    pub alternate_domains: Option<Vec<AlternateDomain>>,
    /// New port bindings.
    pub port_bindings: Option<BTreeMap<String, PortBinding>>,
    /// New environment overrides.
    pub env: Option<BTreeMap<String, String>>,
    /// New addon configuration.
    pub addon_config: Option<AddonConfig>,
    /// New access restriction.
    pub access_restriction: Option<Option<AccessRestriction>>,
    /// New memory limit.
    pub memory_limit: Option<i64>,
    /// New debug mode.
    pub debug_mode: Option<Option<DebugMode>>,
    /// New pre-change snapshot.
    pub old_config: Option<Option<OldConfig>>,
    /// New pending update.
    pub update_config: Option<Option<UpdateConfig>>,
    /// New restore coordinates.
    pub restore_config: Option<Option<RestoreConfig>>,
    /// New reserved HTTP port.
    pub http_port: Option<Option<u16>>,
    /// New data directory.
    pub data_dir: Option<Option<String>>,
    /// New update completion time.
    pub update_time: Option<Option<DateTime<Utc>>>,
}

impl AppPatch {
    /// Patch that only writes the progress message.
    pub fn progress(message: impl Into<String>) -> Self {
        Self {
            installation_progress: Some(message.into()),
            ..Default::default()
        }
    }

    /// Whether the patch writes nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Column assignments for `UPDATE apps SET ...`.
    pub(crate) fn assignments(&self) -> Result<Vec<(&'static str, ColumnValue)>, CoreError> {
        use ColumnValue::*;

        let mut out = Vec::new();
        if let Some(v) = self.installation_state {
            out.push(("installation_state", Text(Some(v.as_str().to_string()))));
        }
        if let Some(v) = &self.installation_progress {
            out.push(("installation_progress", Text(Some(v.clone()))));
        }
        if let Some(v) = self.run_state {
            out.push(("run_state", Text(Some(v.as_str().to_string()))));
        }
        if let Some(v) = self.health {
            out.push(("health", Text(v.map(|h| h.as_str().to_string()))));
        }
        if let Some(v) = &self.container_id {
            out.push(("container_id", Text(v.clone())));
        }
        if let Some(v) = &self.manifest {
            out.push(("manifest_json", Text(Some(serde_json::to_string(v)?))));
        }
        if let Some(v) = &self.location {
            out.push(("location", Text(Some(v.clone()))));
        }
        if let Some(v) = &self.domain {
            out.push(("domain", Text(Some(v.clone()))));
        }
        if let Some(v) = &self.alternate_domains {
            out.push(("alternate_domains_json", Text(Some(serde_json::to_string(v)?))));
        }
        if let Some(v) = &self.port_bindings {
            out.push(("port_bindings_json", Text(Some(serde_json::to_string(v)?))));
        }
        if let Some(v) = &self.env {
            out.push(("env_json", Text(Some(serde_json::to_string(v)?))));
        }
        if let Some(v) = &self.addon_config {
            out.push(("addon_config_json", Text(Some(serde_json::to_string(v)?))));
        }
        if let Some(v) = &self.access_restriction {
            out.push(("access_restriction_json", Text(to_optional_json(v)?)));
        }
        if let Some(v) = self.memory_limit {
            out.push(("memory_limit", Int(Some(v))));
        }
        if let Some(v) = &self.debug_mode {
            out.push(("debug_mode_json", Text(to_optional_json(v)?)));
        }
        if let Some(v) = &self.old_config {
            out.push(("old_config_json", Text(to_optional_json(v)?)));
        }
        if let Some(v) = &self.update_config {
            out.push(("update_config_json", Text(to_optional_json(v)?)));
        }
        if let Some(v) = &self.restore_config {
            out.push(("restore_config_json", Text(to_optional_json(v)?)));
        }
        if let Some(v) = self.http_port {
            out.push(("http_port", Int(v.map(i64::from))));
        }
        if let Some(v) = &self.data_dir {
            out.push(("data_dir", Text(v.clone())));
        }
        if let Some(v) = self.update_time {
            out.push(("update_time", Time(v)));
        }
        Ok(out)
    }

    /// Apply the patch to an in-memory copy of the record.
    pub fn apply_to(&self, app: &mut App) {
        if let Some(v) = self.installation_state {
            app.installation_state = v;
        }
        if let Some(v) = &self.installation_progress {
            app.installation_progress = v.clone();
        }
        if let Some(v) = self.run_state {
            app.run_state = v;
        }
        if let Some(v) = self.health {
            app.health = v;
        }
        if let Some(v) = &self.container_id {
            app.container_id = v.clone();
        }
        if let Some(v) = &self.manifest {
            app.manifest = v.clone();
        }
        if let Some(v) = &self.location {
            app.location = v.clone();
        }
        if let Some(v) = &self.domain {
            app.domain = v.clone();
        }
        if let Some(v) = &self.alternate_domains {
            app.alternate_domains = v.clone();
        }
        if let Some(v) = &self.port_bindings {
            app.port_bindings = v.clone();
        }
        if let Some(v) = &self.env {
            app.env = v.clone();
        }
        if let Some(v) = &self.addon_config {
            app.addon_config = v.clone();
        }
        if let Some(v) = &self.access_restriction {
            app.access_restriction = v.clone();
        }
        if let Some(v) = self.memory_limit {
            app.memory_limit = v;
        }
        if let Some(v) = &self.debug_mode {
            app.debug_mode = v.clone();
        }
        if let Some(v) = &self.old_config {
            app.old_config = v.clone();
        }
        if let Some(v) = &self.update_config {
            app.update_config = v.clone();
        }
        if let Some(v) = &self.restore_config {
            app.restore_config = v.clone();
        }
        if let Some(v) = self.http_port {
            app.http_port = v;
        }
        if let Some(v) = &self.data_dir {
            app.data_dir = v.clone();
        }
        if let Some(v) = self.update_time {
            app.update_time = v;
        }
    }
}

/// Precondition on the current row for a constrained update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateConstraint {
    /// No precondition.
    Any,
    /// `installation_state` must be one of the listed states.
    InstallationStateIn(&'static [InstallationState]),
    /// App is installed and no start/stop request is outstanding.
    RunCommandAllowed,
}

impl StateConstraint {
    /// Constraint enforcing the transition table for a target state.
    pub fn for_target(app_id: &str, target: InstallationState) -> Result<Self, CoreError> {
        match TransitionRule::for_target(target) {
            TransitionRule::FromAny => Ok(Self::Any),
            TransitionRule::From(sources) => Ok(Self::InstallationStateIn(sources)),
            TransitionRule::NotIssuable => Err(CoreError::InvalidTransition {
                app_id: app_id.to_string(),
                current: "any".to_string(),
                target: target.as_str().to_string(),
            }),
        }
    }

    /// Human readable form used in conflict errors.
    pub fn describe(&self) -> String {
        match self {
            Self::Any => "any state".to_string(),
            Self::InstallationStateIn(states) => format!(
                "installation_state in [{}]",
                states
                    .iter()
                    .map(InstallationState::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Self::RunCommandAllowed => {
                "installation_state = installed and no pending run command".to_string()
            }
        }
    }
}

/// Run states that block a new run command.
pub(crate) const PENDING_RUN_STATES: [RunState; 2] = [RunState::PendingStart, RunState::PendingStop];

/// Persistence for app records.
#[async_trait]
pub trait AppStore: Send + Sync {
    /// Insert a new record.
    async fn add(&self, app: &App) -> Result<(), CoreError>;

    /// Load a record.
    async fn get(&self, app_id: &str) -> Result<Option<App>, CoreError>;

    /// Load all records ordered by id.
    async fn list(&self) -> Result<Vec<App>, CoreError>;

    /// Apply `patch` if the row satisfies `constraint`.
    ///
    /// Returns `AppNotFound` when the row does not exist and `StateConflict`
    /// when it exists but the constraint does not hold.
    async fn update(
        &self,
        app_id: &str,
        patch: &AppPatch,
        constraint: StateConstraint,
    ) -> Result<(), CoreError>;

    /// Delete a record.
    async fn delete(&self, app_id: &str) -> Result<(), CoreError>;

    /// Request a pipeline run by moving the app into `target`.
    async fn set_installation_command(
        &self,
        app_id: &str,
        target: InstallationState,
        extra: AppPatch,
    ) -> Result<(), CoreError> {
        let constraint = StateConstraint::for_target(app_id, target)?;
        let patch = AppPatch {
            installation_state: Some(target),
            installation_progress: Some(String::new()),
            ..extra
        };
        self.update(app_id, &patch, constraint).await
    }

    /// Request a start or stop of the primary container.
    async fn set_run_command(&self, app_id: &str, run_state: RunState) -> Result<(), CoreError> {
        let patch = AppPatch {
            run_state: Some(run_state),
            ..Default::default()
        };
        self.update(app_id, &patch, StateConstraint::RunCommandAllowed)
            .await
    }

    /// Record a health report.
    async fn set_health(
        &self,
        app_id: &str,
        health: Option<Health>,
        run_state: RunState,
    ) -> Result<(), CoreError> {
        let patch = AppPatch {
            health: Some(health),
            run_state: Some(run_state),
            ..Default::default()
        };
        self.update(app_id, &patch, StateConstraint::RunCommandAllowed)
            .await
    }
}
