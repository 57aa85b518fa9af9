//! Customer profile lookup used to seed start-request defaults.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use tracing::info;

use crate::{AppError, Result};

/// One customer record: field name → value.
pub type Profile = BTreeMap<String, String>;

/// Field holding the customer's unique identifier.
pub const ID_FIELD: &str = "id";

/// Field consulted when inferring a voice type.
pub const GENDER_FIELD: &str = "gender";

/// Read-only access to customer profiles.
pub trait ProfileStore: Send + Sync {
    /// Profile for a customer, if known.
    fn lookup(&self, customer_id: &str) -> Option<Profile>;

    /// Every field name present in the store, sorted.
    fn fields(&self) -> Vec<String>;

    /// All profiles projected onto `fields`; an empty list keeps every field.
    fn list(&self, fields: &[String]) -> Vec<Profile>;
}

/// Profiles loaded from a JSON array of string-valued objects.
#[derive(Debug, Clone, Default)]
pub struct JsonProfileStore {
    records: Vec<Profile>,
}

impl JsonProfileStore {
    /// Build a store from in-memory records.
    #[must_use]
    pub fn new(records: Vec<Profile>) -> Self {
        Self { records }
    }

    /// Load records from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Profile` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            AppError::Profile(format!("failed to read {}: {err}", path.display()))
        })?;
        let store = Self::from_json_str(&raw)?;
        info!(path = %path.display(), records = store.records.len(), "profile store loaded");
        Ok(store)
    }

    /// Parse records from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Profile` if the JSON is not an array of objects
    /// with string values.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let records: Vec<Profile> = serde_json::from_str(raw)
            .map_err(|err| AppError::Profile(format!("invalid profile database: {err}")))?;
        Ok(Self { records })
    }
}

impl ProfileStore for JsonProfileStore {
    fn lookup(&self, customer_id: &str) -> Option<Profile> {
        if customer_id.is_empty() {
            return None;
        }
        self.records
            .iter()
            .find(|record| record.get(ID_FIELD).is_some_and(|id| id == customer_id))
            .cloned()
    }

    fn fields(&self) -> Vec<String> {
        self.records
            .iter()
            .flat_map(|record| record.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn list(&self, fields: &[String]) -> Vec<Profile> {
        let wanted: Vec<&str> = fields
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .collect();
        if wanted.is_empty() {
            return self.records.clone();
        }
        self.records
            .iter()
            .map(|record| {
                record
                    .iter()
                    .filter(|(key, _)| wanted.contains(&key.as_str()))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .collect()
    }
}

/// Render a prompt template, replacing `{field}` with the profile's values.
///
/// Placeholders without a matching field are left untouched.
#[must_use]
pub fn render_prompt(template: &str, profile: &Profile) -> String {
    profile
        .iter()
        .fold(template.to_owned(), |prompt, (key, value)| {
            prompt.replace(&format!("{{{key}}}"), value)
        })
}

/// Voice type for a customer: the opposite of the customer's gender.
///
/// Returns `None` when the profile carries no gender.
#[must_use]
pub fn infer_voice_type(profile: &Profile) -> Option<&'static str> {
    let gender = profile.get(GENDER_FIELD)?;
    let female = gender.contains('女') || gender.trim().eq_ignore_ascii_case("female");
    Some(if female { "male" } else { "female" })
}
