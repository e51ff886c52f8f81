use crate::config::Config;
use crate::forecast::ModelSlot;
use crate::session::Session;
use crate::store::SqliteStore;
use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub config: Config,
    pub session: Option<Session>,
    pub model: ModelSlot,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            session: None,
            model: ModelSlot::default(),
        }
    }

    /// Opens (or replaces) the record store. The previous session and its
    /// cached tables are dropped only once the new store is open.
    pub fn open_store(&mut self, path: &Path) -> anyhow::Result<()> {
        let sheets = self.config.store.sheet_names();
        if let Some(creds) = &self.config.store.credentials_path {
            tracing::warn!(path = %creds.display(), "credentials are not used by the SQLite store");
        }
        let store = SqliteStore::open(path, &sheets.layouts())
            .with_context(|| format!("open record store {}", path.display()))?;
        self.session = Some(Session::new(Box::new(store), sheets));
        self.config.store.path = Some(path.to_path_buf());
        Ok(())
    }
}
