use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use stow_store::StorableEntity;
use stow_types::Identity;

/// Free-form string record stored by the CLI.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Option<Identity>,
    pub fields: BTreeMap<String, String>,
    /// Field names that get a secondary index entry.
    pub indexed: BTreeSet<String>,
}

impl Record {
    pub fn new(fields: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            id: None,
            fields: fields.into_iter().collect(),
            indexed: BTreeSet::new(),
        }
    }

    pub fn index(mut self, field: impl Into<String>) -> Self {
        self.indexed.insert(field.into());
        self
    }
}

impl StorableEntity for Record {
    const KIND: &'static str = "record";

    fn identity(&self) -> Option<&Identity> {
        self.id.as_ref()
    }

    fn assign_identity(&mut self, id: Identity) {
        self.id = Some(id);
    }

    fn index_entries(&self) -> Vec<(String, String)> {
        self.indexed
            .iter()
            .filter_map(|name| self.fields.get(name).map(|v| (name.clone(), v.clone())))
            .collect()
    }

    fn validate(&self) -> Result<(), String> {
        if self.fields.is_empty() {
            return Err("record has no fields".into());
        }
        match self.indexed.iter().find(|name| !self.fields.contains_key(*name)) {
            Some(missing) => Err(format!("indexed field '{missing}' is not set")),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(k: &str, v: &str) -> (String, String) {
        (k.to_string(), v.to_string())
    }

    #[test]
    fn only_indexed_fields_produce_entries() {
        let record = Record::new([pair("name", "x"), pair("email", "a@x.com")]).index("email");
        assert_eq!(record.index_entries(), vec![pair("email", "a@x.com")]);
    }

    #[test]
    fn indexing_an_unset_field_is_invalid() {
        let record = Record::new([pair("name", "x")]).index("email");
        assert!(record.validate().unwrap_err().contains("email"));
    }

    #[test]
    fn empty_record_is_invalid() {
        assert!(Record::default().validate().is_err());
    }
}
