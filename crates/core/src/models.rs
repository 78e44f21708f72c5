//! Domain model types stored in the object store.
//!
//! Both types implement [`Mapped`] so any configured mapper can render them
//! into traversal paths.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ModelError;
use crate::mapper::{Mapped, ObjectId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A user who signs up with email or through a social media login.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    /// Row id; zero until the user has been stored.
    pub id: i64,
    pub uuid: Uuid,
    /// Optional public handle, chosen after activation.
    pub username: Option<String>,
    pub email: String,
    pub full_name: Option<String>,
    /// How the user signed up, e.g. `email` or `facebook`.
    pub registration_source: Option<String>,
    /// Support can disable accounts on suspected malicious activity.
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Email confirmed or first social login.
    pub activated_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<IpAddr>,
    #[serde(default)]
    pub groups: Vec<Group>,
}

impl User {
    pub const USER_MEDIA_DUMMY: &'static str = "dummy";
    pub const USER_MEDIA_EMAIL: &'static str = "email";
    pub const USER_MEDIA_FACEBOOK: &'static str = "facebook";
    pub const USER_MEDIA_GITHUB: &'static str = "github";

    /// Name of the group whose members see the admin interface.
    pub const GROUP_ADMIN: &'static str = "admin";

    /// Prefix of usernames assigned by [`generate_username`](Self::generate_username).
    pub const GENERATED_USERNAME_PREFIX: &'static str = "user-";

    /// A new, unsaved, enabled user.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: 0,
            uuid: Uuid::new_v4(),
            username: None,
            email: email.into(),
            full_name: None,
            registration_source: None,
            enabled: true,
            created_at: Utc::now(),
            updated_at: None,
            activated_at: None,
            last_login_at: None,
            last_login_ip: None,
            groups: Vec::new(),
        }
    }

    /// How we present the user's name to the user itself.
    ///
    /// Picks the full name, then a user-chosen username, then the email.
    pub fn friendly_name(&self) -> &str {
        if let Some(full_name) = self.full_name.as_deref().filter(|n| !n.is_empty()) {
            return full_name;
        }

        match self.username.as_deref() {
            Some(username)
                if !username.is_empty()
                    && !username.starts_with(Self::GENERATED_USERNAME_PREFIX) =>
            {
                username
            }
            _ => self.email.as_str(),
        }
    }

    /// The default username given to a stored user.
    pub fn generate_username(&self) -> Result<String, ModelError> {
        if self.id <= 0 {
            return Err(ModelError::NotPersisted {
                entity: "user".into(),
            });
        }
        Ok(format!("{}{}", Self::GENERATED_USERNAME_PREFIX, self.id))
    }

    pub fn is_activated(&self) -> bool {
        self.activated_at.is_some()
    }

    /// Is this user allowed to log in.
    pub fn can_login(&self) -> bool {
        self.enabled && self.is_activated()
    }

    pub fn is_in_group(&self, name: &str) -> bool {
        self.groups.iter().any(|g| g.name == name)
    }

    /// Does this user see the admin interface.
    pub fn is_admin(&self) -> bool {
        self.is_in_group(Self::GROUP_ADMIN)
    }
}

impl Mapped for User {
    fn attribute(&self, name: &str) -> Option<ObjectId> {
        match name {
            "id" if self.id > 0 => Some(ObjectId::Int(self.id)),
            "uuid" => Some(ObjectId::Uuid(self.uuid)),
            "username" => self.username.clone().map(ObjectId::Text),
            "email" => Some(ObjectId::Text(self.email.clone())),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// A named set of users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Group {
    /// Row id; zero until the group has been stored.
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Last description update; membership changes do not touch this.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            uuid: Uuid::new_v4(),
            name: name.into(),
            description: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

impl Mapped for Group {
    fn attribute(&self, name: &str) -> Option<ObjectId> {
        match name {
            "id" if self.id > 0 => Some(ObjectId::Int(self.id)),
            "uuid" => Some(ObjectId::Uuid(self.uuid)),
            "name" => Some(ObjectId::Text(self.name.clone())),
            _ => None,
        }
    }
}
