use std::env;

use anyhow::{Context, Result};

use crate::db::DEFAULT_MAX_POOL_SIZE;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size = env::var("DATABASE_MAX_POOL_SIZE")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_MAX_POOL_SIZE);

        Ok(Self {
            database_url,
            database_max_pool_size,
        })
    }
}
