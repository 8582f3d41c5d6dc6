//! Test entity for this crate's unit tests.

use serde::{Deserialize, Serialize};
use stow_store::StorableEntity;
use stow_types::Identity;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: Option<Identity>,
    pub name: String,
    pub age: u32,
    pub email: Option<String>,
}

impl Person {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            age: 0,
            email: None,
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }
}

impl StorableEntity for Person {
    const KIND: &'static str = "person";

    fn identity(&self) -> Option<&Identity> {
        self.id.as_ref()
    }

    fn assign_identity(&mut self, id: Identity) {
        self.id = Some(id);
    }

    fn index_entries(&self) -> Vec<(String, String)> {
        self.email
            .iter()
            .map(|e| ("email".to_string(), e.clone()))
            .collect()
    }
}
