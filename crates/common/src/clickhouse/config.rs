use crate::domain::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickHouseConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub table: String,
    pub username: String,
    pub password: String,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8123,
            database: "default".to_string(),
            table: "uplinks".to_string(),
            username: "default".to_string(),
            password: "".to_string(),
        }
    }
}

impl ClickHouseConfig {
    /// HTTP interface URL built from host and port
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Reject table names that would need quoting; the name is interpolated into DDL.
    pub fn validate_table_name(&self) -> DomainResult<()> {
        let valid = !self.table.is_empty()
            && !self.table.starts_with(|c: char| c.is_ascii_digit())
            && self
                .table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');

        if valid {
            Ok(())
        } else {
            Err(DomainError::InvalidConfig(format!(
                "Invalid table name '{}': expected letters, digits and underscores",
                self.table
            )))
        }
    }
}
