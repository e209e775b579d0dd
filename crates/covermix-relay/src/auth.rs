//! Bearer-token role mapping.
//!
//! Exactly three tokens exist, one per role. This is deliberately simple:
//! the relay only needs to tell the three callers apart, and the roles are
//! a closed set.

use covermix_proto::Role;

/// The relay's three accepted bearer tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessTokens {
    /// Token presented by the source application.
    pub source: String,
    /// Token presented by the contact application.
    pub contact: String,
    /// Token presented by the mixer.
    pub mixer: String,
}

impl AccessTokens {
    /// Resolve a presented token to its role.
    pub fn role_for(&self, token: &str) -> Option<Role> {
        if token == self.source {
            Some(Role::Source)
        } else if token == self.contact {
            Some(Role::Contact)
        } else if token == self.mixer {
            Some(Role::Mixer)
        } else {
            None
        }
    }

    /// The token a given role must present.
    pub fn token_for(&self, role: Role) -> &str {
        match role {
            Role::Source => &self.source,
            Role::Contact => &self.contact,
            Role::Mixer => &self.mixer,
        }
    }
}

impl Default for AccessTokens {
    fn default() -> Self {
        // Demonstration tokens; real deployments configure their own.
        Self {
            source: "source_app_token".to_string(),
            contact: "contact_app_token".to_string(),
            mixer: "mixer_token".to_string(),
        }
    }
}
