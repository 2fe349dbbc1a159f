//! Player records and rating persistence

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::game::{PlayerIdentity, RatingLedger};

use super::supabase::{SupabaseClient, SupabaseError};

/// Rating assumed for rows that have none yet
pub const DEFAULT_TROPHIES: i32 = 500;

/// Row of the `users` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: Uuid,
    pub username: String,
    #[serde(default)]
    pub trophies: Option<i32>,
    #[serde(default)]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl PlayerRecord {
    pub fn identity(&self) -> PlayerIdentity {
        PlayerIdentity {
            id: self.id,
            username: self.username.clone(),
            rating: self.trophies.unwrap_or(DEFAULT_TROPHIES),
        }
    }
}

/// Arguments of the `increment_trophies` database function
#[derive(Debug, Serialize)]
struct IncrementTrophies {
    user_id: Uuid,
    delta: i32,
}

/// Player store operations
#[derive(Clone)]
pub struct ProfileStore {
    client: SupabaseClient,
}

impl ProfileStore {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// Get a player by account id
    pub async fn get_player(&self, user_id: Uuid) -> Result<Option<PlayerRecord>, SupabaseError> {
        let query = format!("id=eq.{}&select=id,username,trophies,created_at", user_id);
        self.client.get_one("users", &query).await
    }

    /// Atomically add `delta` to a player's trophies
    pub async fn adjust_trophies(&self, user_id: Uuid, delta: i32) -> Result<(), SupabaseError> {
        self.client
            .rpc("increment_trophies", &IncrementTrophies { user_id, delta })
            .await
    }
}

impl RatingLedger for ProfileStore {
    /// Fire and forget: the update runs on its own task and failures are
    /// only logged.
    fn adjust_rating(&self, player_id: Uuid, delta: i32) {
        let store = self.clone();
        tokio::spawn(async move {
            match store.adjust_trophies(player_id, delta).await {
                Ok(()) => debug!(player_id = %player_id, delta, "Rating updated"),
                Err(e) => warn!(player_id = %player_id, delta, error = %e, "Rating update failed"),
            }
        });
    }
}
