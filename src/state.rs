use crate::config::Config;
use crate::session::SessionStore;
use crate::sheets::SharedStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub sessions: Arc<SessionStore>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: SharedStore, config: Config) -> Self {
        Self {
            store,
            sessions: Arc::new(SessionStore::new()),
            config: Arc::new(config),
        }
    }
}
