//! Configuration loading from the process environment.

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};

use datascope_core::JoinTable;
use datascope_observability::LogFormat;
use datascope_policy::EvaluatorSettings;

pub const ORG_FIELD: &str = "DATASCOPE_ORG_FIELD";
pub const ROW_ID_FIELD: &str = "DATASCOPE_ROW_ID_FIELD";
pub const JOIN_TABLE: &str = "DATASCOPE_JOIN_TABLE";
pub const JOIN_ORG_COLUMN: &str = "DATASCOPE_JOIN_ORG_COLUMN";
pub const JOIN_BUSINESS_ID_COLUMN: &str = "DATASCOPE_JOIN_BUSINESS_ID_COLUMN";
pub const JOIN_BUSINESS_TABLE_COLUMN: &str = "DATASCOPE_JOIN_BUSINESS_TABLE_COLUMN";
pub const LOG_FORMAT: &str = "DATASCOPE_LOG_FORMAT";
pub const DATABASE_URL: &str = "DATABASE_URL";

/// Process-level configuration. Unset variables fall back to the defaults
/// of [`EvaluatorSettings`] and [`JoinTable`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataScopeConfig {
    pub settings: EvaluatorSettings,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
}

impl DataScopeConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = EvaluatorSettings::default();
        let join = JoinTable::default();

        let log_format = match get(LOG_FORMAT) {
            Some(raw) => raw
                .parse::<LogFormat>()
                .with_context(|| format!("invalid {LOG_FORMAT}"))?,
            None => LogFormat::default(),
        };

        Ok(Self {
            settings: EvaluatorSettings {
                org_field: get(ORG_FIELD).unwrap_or(defaults.org_field),
                row_id_field: get(ROW_ID_FIELD).unwrap_or(defaults.row_id_field),
                join: JoinTable {
                    table: get(JOIN_TABLE).unwrap_or(join.table),
                    member_column: get(JOIN_ORG_COLUMN).unwrap_or(join.member_column),
                    business_id_column: get(JOIN_BUSINESS_ID_COLUMN)
                        .unwrap_or(join.business_id_column),
                    business_table_column: get(JOIN_BUSINESS_TABLE_COLUMN)
                        .unwrap_or(join.business_table_column),
                },
            },
            log_format,
            database_url: get(DATABASE_URL),
        })
    }

    pub fn into_settings(self) -> EvaluatorSettings {
        self.settings
    }

    /// Connect to `DATABASE_URL`.
    pub async fn connect(&self) -> Result<PgPool> {
        let url = self
            .database_url
            .as_deref()
            .with_context(|| format!("{DATABASE_URL} is not set"))?;

        PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .context("failed to connect to Postgres")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = DataScopeConfig::from_lookup(lookup(&[])).unwrap();

        assert_eq!(config, DataScopeConfig::default());
        assert_eq!(config.settings.org_field, "OrganizationalUnitId");
        assert_eq!(config.settings.join.table, "organizational_unit_business");
    }

    #[test]
    fn variables_override_defaults() {
        let config = DataScopeConfig::from_lookup(lookup(&[
            (ORG_FIELD, "DeptId"),
            (JOIN_TABLE, "dept_links"),
            (LOG_FORMAT, "pretty"),
            (DATABASE_URL, "postgres://localhost/scope"),
            (ROW_ID_FIELD, "  "),
        ]))
        .unwrap();

        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/scope"));
        let settings = config.into_settings();
        assert_eq!(settings.org_field, "DeptId");
        assert_eq!(settings.row_id_field, "Id");
        assert_eq!(settings.join.table, "dept_links");
        assert_eq!(settings.join.member_column, "OrganizationalUnitId");
    }

    #[test]
    fn bad_log_format_is_rejected() {
        let err = DataScopeConfig::from_lookup(lookup(&[(LOG_FORMAT, "xml")])).unwrap_err();
        assert!(err.to_string().contains(LOG_FORMAT));
    }

    #[tokio::test]
    async fn connect_requires_a_url() {
        assert!(DataScopeConfig::default().connect().await.is_err());
    }
}
