//! Builds a `tokio-postgres` connection string per identity from the
//! shared warehouse coordinates plus a per-identity username/password
//! (spec §6: `WAREHOUSE_ACCOUNT/USER/PASSWORD/WAREHOUSE/DATABASE/SCHEMA/ROLE`).

/// Coordinates shared by every identity against one warehouse.
#[derive(Debug, Clone)]
pub struct WarehouseDsn {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub schema: Option<String>,
    pub role: Option<String>,
}

impl WarehouseDsn {
    /// Renders a full connection string for one identity's username and
    /// password. The schema/role, if set, ride along as `options`.
    #[must_use]
    pub fn connection_string(&self, username: &str, password: &str) -> String {
        let mut dsn = format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.database, username, password
        );
        if let Some(schema) = &self.schema {
            dsn.push_str(&format!(" options='-c search_path={schema}'"));
        }
        if let Some(role) = &self.role {
            dsn.push_str(&format!(" options='-c role={role}'"));
        }
        dsn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_string_carries_identity_credentials() {
        let dsn = WarehouseDsn { host: "wh.example".into(), port: 5432, database: "analytics".into(), schema: None, role: None };
        let conn = dsn.connection_string("acct-a", "secret");
        assert!(conn.contains("user=acct-a"));
        assert!(conn.contains("password=secret"));
        assert!(conn.contains("dbname=analytics"));
    }
}
