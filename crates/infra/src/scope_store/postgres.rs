//! Postgres-backed adapters.
//!
//! ## Tables
//!
//! | Table | Columns | Used by |
//! |-------|---------|---------|
//! - `data_scope_policies (user_id, resource_key, app_id, position, filter_group JSONB)`,
//!   read by [`PgPolicyStore`]
//! - `organizational_units (id, parent_id, app_id)` and
//!   `user_organizational_units (user_id, app_id, organizational_unit_id)`,
//!   read by [`PgOrgHierarchy`]
//!
//! Rule fragments are arbitrary SQL run by [`PgRuleQueryEngine`]; each must
//! project an `"Id"` and a `"MapKey"` column.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError |
//! |------------|------------|
//! | PoolClosed, PoolTimedOut, Io, Tls | `Unavailable` |
//! | ColumnDecode, Decode, ColumnNotFound, TypeNotFound | `Decode` |
//! | Database, other | `Query` |

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use datascope_core::{AppId, FilterGroup, ResourceKey, UserId};
use datascope_policy::{
    OrgHierarchyLookup, PolicyStore, RulePair, RuleQueryEngine, StoreError, UnionQuery,
};

/// Policy rows, one JSON-encoded [`FilterGroup`] per row.
#[derive(Debug, Clone)]
pub struct PgPolicyStore {
    pool: Arc<PgPool>,
}

impl PgPolicyStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the policy table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS data_scope_policies (
                user_id      TEXT    NOT NULL,
                resource_key TEXT    NOT NULL,
                app_id       TEXT    NOT NULL,
                position     INTEGER NOT NULL,
                filter_group JSONB   NOT NULL,
                PRIMARY KEY (user_id, resource_key, app_id, position)
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    #[instrument(
        skip(self),
        fields(user_id = %user_id, resource = %resource_key, app_id = %app_id),
        err
    )]
    pub async fn load_groups(
        &self,
        user_id: &UserId,
        resource_key: &ResourceKey,
        app_id: &AppId,
    ) -> Result<Vec<FilterGroup>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT filter_group
            FROM data_scope_policies
            WHERE user_id = $1 AND resource_key = $2 AND app_id = $3
            ORDER BY position ASC
            "#,
        )
        .bind(user_id.as_str())
        .bind(resource_key.as_str())
        .bind(app_id.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_groups", e))?;

        let mut groups = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: serde_json::Value = row
                .try_get("filter_group")
                .map_err(|e| map_sqlx_error("load_groups", e))?;
            let group = serde_json::from_value(raw)
                .map_err(|e| StoreError::Decode(format!("invalid filter group: {e}")))?;
            groups.push(group);
        }

        debug!(groups = groups.len(), "policy groups loaded");
        Ok(groups)
    }

    /// Replace every group stored for `(user, resource, app)` atomically.
    #[instrument(
        skip(self, groups),
        fields(
            user_id = %user_id,
            resource = %resource_key,
            app_id = %app_id,
            groups = groups.len()
        ),
        err
    )]
    pub async fn replace_groups(
        &self,
        user_id: &UserId,
        resource_key: &ResourceKey,
        app_id: &AppId,
        groups: &[FilterGroup],
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("replace_groups", e))?;

        sqlx::query(
            r#"
            DELETE FROM data_scope_policies
            WHERE user_id = $1 AND resource_key = $2 AND app_id = $3
            "#,
        )
        .bind(user_id.as_str())
        .bind(resource_key.as_str())
        .bind(app_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("replace_groups", e))?;

        for (position, group) in groups.iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|_| StoreError::Query("too many filter groups".to_string()))?;
            let payload = serde_json::to_value(group)
                .map_err(|e| StoreError::Decode(format!("unencodable filter group: {e}")))?;

            sqlx::query(
                r#"
                INSERT INTO data_scope_policies
                    (user_id, resource_key, app_id, position, filter_group)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(user_id.as_str())
            .bind(resource_key.as_str())
            .bind(app_id.as_str())
            .bind(position)
            .bind(payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("replace_groups", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("replace_groups", e))
    }
}

#[async_trait]
impl PolicyStore for PgPolicyStore {
    async fn get_filter_groups(
        &self,
        user_id: &UserId,
        resource_key: &ResourceKey,
        app_id: &AppId,
    ) -> Result<Vec<FilterGroup>, StoreError> {
        self.load_groups(user_id, resource_key, app_id).await
    }
}

/// Organization membership backed by an adjacency-list unit table.
#[derive(Debug, Clone)]
pub struct PgOrgHierarchy {
    pool: Arc<PgPool>,
}

impl PgOrgHierarchy {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the unit and membership tables if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for ddl in [
            r#"
            CREATE TABLE IF NOT EXISTS organizational_units (
                id        TEXT PRIMARY KEY,
                parent_id TEXT NULL REFERENCES organizational_units (id),
                app_id    TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS user_organizational_units (
                user_id                TEXT NOT NULL,
                app_id                 TEXT NOT NULL,
                organizational_unit_id TEXT NOT NULL REFERENCES organizational_units (id),
                PRIMARY KEY (user_id, app_id, organizational_unit_id)
            )
            "#,
        ] {
            sqlx::query(ddl)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user_id, app_id = %app_id), err)]
    pub async fn own_units(
        &self,
        user_id: &UserId,
        app_id: &AppId,
    ) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT organizational_unit_id AS id
            FROM user_organizational_units
            WHERE user_id = $1 AND app_id = $2
            ORDER BY organizational_unit_id
            "#,
        )
        .bind(user_id.as_str())
        .bind(app_id.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("own_units", e))?;

        ids_from_rows("own_units", rows)
    }

    /// The user's units and every descendant. `UNION` deduplicates, which
    /// also stops the recursion on a cyclic tree.
    #[instrument(skip(self), fields(user_id = %user_id, app_id = %app_id), err)]
    pub async fn subtree_units(
        &self,
        user_id: &UserId,
        app_id: &AppId,
    ) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            r#"
            WITH RECURSIVE subtree(id) AS (
                SELECT organizational_unit_id
                FROM user_organizational_units
                WHERE user_id = $1 AND app_id = $2
                UNION
                SELECT child.id
                FROM organizational_units child
                JOIN subtree parent ON child.parent_id = parent.id
                WHERE child.app_id = $2
            )
            SELECT id FROM subtree ORDER BY id
            "#,
        )
        .bind(user_id.as_str())
        .bind(app_id.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("subtree_units", e))?;

        ids_from_rows("subtree_units", rows)
    }
}

#[async_trait]
impl OrgHierarchyLookup for PgOrgHierarchy {
    async fn get_org_ids(
        &self,
        user_id: &UserId,
        app_id: &AppId,
    ) -> Result<Vec<String>, StoreError> {
        self.own_units(user_id, app_id).await
    }

    async fn get_org_subtree_ids(
        &self,
        user_id: &UserId,
        app_id: &AppId,
    ) -> Result<Vec<String>, StoreError> {
        self.subtree_units(user_id, app_id).await
    }
}

fn ids_from_rows(
    operation: &str,
    rows: Vec<sqlx::postgres::PgRow>,
) -> Result<Vec<String>, StoreError> {
    rows.iter()
        .map(|row| row.try_get::<String, _>("id").map_err(|e| map_sqlx_error(operation, e)))
        .collect()
}

/// Runs the unioned rule query built by the membership resolver.
#[derive(Debug, Clone)]
pub struct PgRuleQueryEngine {
    pool: Arc<PgPool>,
}

impl PgRuleQueryEngine {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    #[instrument(skip(self, query), fields(fragments = query.fragments().len()), err)]
    pub async fn run_union(&self, query: &UnionQuery) -> Result<Vec<RulePair>, StoreError> {
        if query.is_empty() {
            return Ok(vec![]);
        }

        let sql = query.to_sql();
        let rows = sqlx::query(&sql)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("run_union", e))?;

        let mut pairs = Vec::with_capacity(rows.len());
        for row in rows {
            let id: Option<String> = row.try_get("Id").map_err(|e| map_sqlx_error("run_union", e))?;
            let map_key: Option<String> = row
                .try_get("MapKey")
                .map_err(|e| map_sqlx_error("run_union", e))?;
            // A NULL id cannot match any row.
            if let (Some(id), Some(map_key)) = (id, map_key) {
                pairs.push(RulePair::new(id, map_key));
            }
        }

        debug!(rows = pairs.len(), "rule query returned");
        Ok(pairs)
    }
}

#[async_trait]
impl RuleQueryEngine for PgRuleQueryEngine {
    async fn query_pairs(&self, query: &UnionQuery) -> Result<Vec<RulePair>, StoreError> {
        self.run_union(query).await
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::Io(e) => StoreError::Unavailable(format!("io error in {operation}: {e}")),
        sqlx::Error::Tls(e) => StoreError::Unavailable(format!("tls error in {operation}: {e}")),
        sqlx::Error::ColumnDecode { index, source } => {
            StoreError::Decode(format!("column {index} in {operation}: {source}"))
        }
        sqlx::Error::ColumnNotFound(column) => {
            StoreError::Decode(format!("column {column} missing in {operation}"))
        }
        sqlx::Error::Decode(e) => StoreError::Decode(format!("decode error in {operation}: {e}")),
        sqlx::Error::TypeNotFound { type_name } => {
            StoreError::Decode(format!("type {type_name} not found in {operation}"))
        }
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();
            StoreError::Query(format!(
                "database error in {operation} [{code}]: {}",
                db_err.message()
            ))
        }
        other => StoreError::Query(format!("sqlx error in {operation}: {other}")),
    }
}
