use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Per-user health history document (`users` collection).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Profile {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub personal_history: String,
    pub family_history: String,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// What `load` hands back for a user that has never saved a profile.
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            email: None,
            personal_history: String::new(),
            family_history: String::new(),
            updated_at: None,
        }
    }
}

/// Merge-write payload. Omitted fields keep their stored value; `email` is not
/// writable after registration.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProfilePatch {
    #[validate(length(max = 20000, message = "Personal history is too long"))]
    pub personal_history: Option<String>,

    #[validate(length(max = 20000, message = "Family history is too long"))]
    pub family_history: Option<String>,
}

impl ProfilePatch {
    pub fn apply(&self, profile: &mut Profile) {
        if let Some(personal) = &self.personal_history {
            profile.personal_history = personal.clone();
        }
        if let Some(family) = &self.family_history {
            profile.family_history = family.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_leaves_omitted_fields() {
        let mut profile = Profile::empty(Uuid::new_v4());
        profile.family_history = "Diabetes (father)".into();

        let patch = ProfilePatch {
            personal_history: Some("Asthma".into()),
            family_history: None,
        };
        patch.apply(&mut profile);

        assert_eq!(profile.personal_history, "Asthma");
        assert_eq!(profile.family_history, "Diabetes (father)");
    }

    #[test]
    fn test_patch_deserializes_partial_body() {
        let patch: ProfilePatch = serde_json::from_str(r#"{"family_history":"None"}"#).unwrap();
        assert!(patch.personal_history.is_none());
        assert_eq!(patch.family_history.as_deref(), Some("None"));
    }
}
