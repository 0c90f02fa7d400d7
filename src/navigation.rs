//! Screen routing state for a single client session.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    Home,
    Login,
    Register,
    Choice,
    Profile,
    Calendar,
    Chat,
    Report,
}

impl Screen {
    pub fn requires_auth(self) -> bool {
        !matches!(self, Screen::Home | Screen::Login | Screen::Register)
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum NavigationError {
    #[error("Sign in to open {0:?}")]
    AuthRequired(Screen),
}

#[derive(Debug, Clone)]
pub struct Navigator {
    current: Screen,
    user_id: Option<Uuid>,
}

impl Default for Navigator {
    fn default() -> Self {
        Self {
            current: Screen::Home,
            user_id: None,
        }
    }
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Screen {
        self.current
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user_id
    }

    /// Sign-in lands on the choice screen, sign-out on home.
    pub fn on_auth_changed(&mut self, user_id: Option<Uuid>) -> Screen {
        self.user_id = user_id;
        self.current = if user_id.is_some() {
            Screen::Choice
        } else {
            Screen::Home
        };
        self.current
    }

    pub fn navigate(&mut self, to: Screen) -> Result<Screen, NavigationError> {
        if to.requires_auth() && self.user_id.is_none() {
            return Err(NavigationError::AuthRequired(to));
        }
        self.current = to;
        Ok(to)
    }

    pub fn sign_out(&mut self) -> Screen {
        self.on_auth_changed(None)
    }
}
