// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    config::Config,
    engine::{clock::Clock, seed::SeedGenerator},
    services::AttemptService,
    store::AttemptStore,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AttemptStore>,
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub seeds: Arc<SeedGenerator>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn AttemptStore>,
        config: Config,
        clock: Arc<dyn Clock>,
        seeds: Arc<SeedGenerator>,
    ) -> Self {
        Self {
            store,
            config,
            clock,
            seeds,
        }
    }

    pub fn attempts(&self) -> AttemptService {
        AttemptService::new(self.store.clone(), self.clock.clone(), self.seeds.clone())
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
