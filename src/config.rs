use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DbError, DbResult};
use crate::file::{DEFAULT_POOL_PAGES, PAGE_SIZE};
use crate::lock::DEFAULT_LOCK_TIMEOUT_MS;

/// Declared length of a bare `string` column
pub const STRING_LEN: usize = 128;

/// Runtime settings of a [`crate::database::Database`]
///
/// Every field is optional in the JSON form; missing ones take the default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub page_size: usize,
    pub pool_pages: usize,
    pub lock_timeout_ms: u64,
    pub string_len: usize,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            pool_pages: DEFAULT_POOL_PAGES,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            string_len: STRING_LEN,
        }
    }
}

impl DbConfig {
    /// Read a JSON config file and validate it
    pub fn load<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: DbConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> DbResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> DbResult<()> {
        if self.page_size == 0 {
            return Err(DbError::InvalidConfig("page_size must be positive".to_string()));
        }
        if self.pool_pages == 0 {
            return Err(DbError::InvalidConfig("pool_pages must be positive".to_string()));
        }
        if self.string_len == 0 {
            return Err(DbError::InvalidConfig("string_len must be positive".to_string()));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
