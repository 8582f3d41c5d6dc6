//! Fixtures shared by this crate's unit tests.

use serde::{Deserialize, Serialize};
use stow_types::Identity;

use crate::entity::StorableEntity;

/// A small entity with an optional secondary index and transient state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: Option<Identity>,
    pub name: String,
    pub email: Option<String>,
    pub tags: Vec<String>,
    /// Transient; dropped on eviction and rebuilt on reload.
    #[serde(skip)]
    pub session: Option<String>,
    /// Transient; counts `after_reload` runs on this instance.
    #[serde(skip)]
    pub reloads: u32,
}

impl Account {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            email: None,
            tags: Vec::new(),
            session: Some("live-session".into()),
            reloads: 0,
        }
    }

    pub fn with_id(mut self, token: &str) -> Self {
        self.id = Some(Identity::new(token).unwrap());
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }
}

impl StorableEntity for Account {
    const KIND: &'static str = "account";

    fn identity(&self) -> Option<&Identity> {
        self.id.as_ref()
    }

    fn assign_identity(&mut self, id: Identity) {
        self.id = Some(id);
    }

    fn index_entries(&self) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = self
            .tags
            .iter()
            .map(|t| ("tag".to_string(), t.clone()))
            .collect();
        if let Some(email) = &self.email {
            entries.push(("email".to_string(), email.clone()));
        }
        entries
    }

    fn before_evict(&mut self) {
        self.session = None;
    }

    fn after_reload(&mut self) {
        self.session = Some("rebuilt-session".into());
        self.reloads += 1;
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("name must not be empty".into());
        }
        Ok(())
    }
}

/// A second entity kind, for kind-mismatch tests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: Option<Identity>,
    pub text: String,
}

impl StorableEntity for Note {
    const KIND: &'static str = "note";

    fn identity(&self) -> Option<&Identity> {
        self.id.as_ref()
    }

    fn assign_identity(&mut self, id: Identity) {
        self.id = Some(id);
    }
}
