//! Cross-table membership tests (semi-joins) referenced by compiled predicates.

use serde::{Deserialize, Serialize};

use crate::schema::FieldRef;

/// Layout of a join table linking business rows to organizational units,
/// e.g. `(OrganizationalUnitId, BusinessId, BusinessTable)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinTable {
    pub table: String,
    pub member_column: String,
    pub business_id_column: String,
    pub business_table_column: String,
}

impl Default for JoinTable {
    fn default() -> Self {
        Self {
            table: "organizational_unit_business".to_string(),
            member_column: "OrganizationalUnitId".to_string(),
            business_id_column: "BusinessId".to_string(),
            business_table_column: "BusinessTable".to_string(),
        }
    }
}

/// "Some row of `join.table` links this row to one of `members`."
///
/// The link is `join.business_id_column = row[row_field]` and
/// `join.business_table_column = row_field.entity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemiJoin {
    pub join: JoinTable,
    pub row_field: FieldRef,
    pub members: Vec<String>,
}
