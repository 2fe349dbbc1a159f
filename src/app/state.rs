//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::{MatchRegistry, RatingLedger};
use crate::matchmaking::MatchmakingService;
use crate::store::{ProfileStore, SupabaseClient};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub profile_store: ProfileStore,
    pub matchmaking: Arc<MatchmakingService>,
    pub match_registry: Arc<MatchRegistry>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        let supabase = SupabaseClient::new(&config);
        let profile_store = ProfileStore::new(supabase);

        let match_registry = Arc::new(MatchRegistry::new());

        // Match results are written back through the profile store
        let ledger: Arc<dyn RatingLedger> = Arc::new(profile_store.clone());
        let matchmaking = Arc::new(MatchmakingService::new(
            match_registry.clone(),
            ledger,
            config.match_settings.clone(),
        ));

        Self {
            config,
            profile_store,
            matchmaking,
            match_registry,
        }
    }
}
