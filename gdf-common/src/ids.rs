//! Identifier generation

use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

/// Prefix of generated pseudonymous user ids
pub const VIHT_ID_PREFIX: &str = "VIHT-";

/// Random suffix length
pub const VIHT_ID_SUFFIX_LEN: usize = 16;

/// Generate a new pseudonymous user id (`VIHT-` + 16 alphanumerics)
pub fn generate_viht_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(VIHT_ID_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{}{}", VIHT_ID_PREFIX, suffix)
}

/// Generate an opaque client key
pub fn generate_client_key() -> String {
    Uuid::new_v4().simple().to_string()
}
