//! Static admin directory (email -> reserved user id)

use gdf_common::config::AdminEntry;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct AdminDirectory {
    /// Keyed by lowercased, trimmed email
    reserved_ids: HashMap<String, String>,
}

impl AdminDirectory {
    pub fn new(entries: &[AdminEntry]) -> Self {
        let reserved_ids = entries
            .iter()
            .map(|e| (normalize_email(&e.email), e.viht_id.clone()))
            .collect();
        Self { reserved_ids }
    }

    /// Reserved id for an admin email
    pub fn reserved_id(&self, email: Option<&str>) -> Option<&str> {
        let email = normalize_email(email?);
        self.reserved_ids.get(&email).map(String::as_str)
    }

    pub fn is_admin(&self, email: Option<&str>) -> bool {
        self.reserved_id(email).is_some()
    }

    pub fn len(&self) -> usize {
        self.reserved_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reserved_ids.is_empty()
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
