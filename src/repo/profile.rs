use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use super::Clock;
use crate::error::AppResult;
use crate::models::profile::{Profile, ProfilePatch};
use crate::store::ProfileStore;

#[derive(Clone)]
pub struct ProfileRepository {
    store: Arc<dyn ProfileStore>,
    clock: Clock,
}

impl ProfileRepository {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self::with_clock(store, Utc::now)
    }

    pub fn with_clock(store: Arc<dyn ProfileStore>, clock: Clock) -> Self {
        Self { store, clock }
    }

    /// The stored profile, or an empty one if the user never saved it.
    pub async fn load(&self, user_id: Uuid) -> AppResult<Profile> {
        let profile = self
            .store
            .get_profile(user_id)
            .await?
            .unwrap_or_else(|| Profile::empty(user_id));
        Ok(profile)
    }

    pub async fn save(&self, user_id: Uuid, patch: ProfilePatch) -> AppResult<Profile> {
        patch.validate()?;
        let profile = self
            .store
            .merge_profile(user_id, patch, (self.clock)())
            .await?;

        tracing::info!(user_id = %user_id, "Profile saved");
        Ok(profile)
    }
}
