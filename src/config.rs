use crate::error::{AttendanceError, Result};

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
}

impl Config {
    /// Reads `DATABASE_URL` and the optional `ATTENDANCE_DB_MAX_CONNECTIONS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| {
                AttendanceError::Config(
                    "DATABASE_URL must be set to a production Postgres instance".to_string(),
                )
            })?;

        let max_connections = match lookup("ATTENDANCE_DB_MAX_CONNECTIONS") {
            Some(raw) => raw.trim().parse::<u32>().ok().filter(|n| *n > 0).ok_or_else(|| {
                AttendanceError::Config(format!(
                    "ATTENDANCE_DB_MAX_CONNECTIONS must be a positive integer, got {raw:?}"
                ))
            })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            database_url,
            max_connections,
        })
    }
}
