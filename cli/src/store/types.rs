//! Credential data types persisted by the token store.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One OAuth grant for one client identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// The access token presented to resource servers.
    pub access_token: String,
    /// The refresh token. Empty only before the first issuance.
    #[serde(default)]
    pub refresh_token: String,
    /// Token type, `Bearer` when set.
    #[serde(default)]
    pub token_type: String,
    /// When the access token expires.
    pub expires_at: DateTime<Utc>,
    /// The client identity this grant belongs to; always equals its map key.
    #[serde(default)]
    pub client_id: String,
}

impl CredentialRecord {
    /// Check whether the access token is still usable at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Check whether the access token is still usable.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Remaining lifetime of the access token, clamped at zero.
    #[must_use]
    pub fn remaining_lifetime(&self) -> Duration {
        (self.expires_at - Utc::now()).max(Duration::zero())
    }

    /// Check if the record carries a refresh token.
    #[must_use]
    pub fn can_refresh(&self) -> bool {
        !self.refresh_token.is_empty()
    }
}

/// The full persisted token file: every client's record keyed by `client_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialStoreDocument {
    /// Records keyed by client identity.
    #[serde(default)]
    pub tokens: HashMap<String, CredentialRecord>,
}

impl CredentialStoreDocument {
    /// Look up the record for a client.
    #[must_use]
    pub fn get(&self, client_id: &str) -> Option<&CredentialRecord> {
        self.tokens.get(client_id)
    }

    /// Insert or overwrite the record under its own `client_id`.
    ///
    /// Records for other clients are left untouched.
    pub fn merge(&mut self, record: CredentialRecord) {
        self.tokens.insert(record.client_id.clone(), record);
    }

    /// Number of clients with a stored record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no client has a stored record.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(client_id: &str, access_token: &str) -> CredentialRecord {
        CredentialRecord {
            access_token: access_token.to_string(),
            refresh_token: "refresh-token".to_string(),
            token_type: "Bearer".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
            client_id: client_id.to_string(),
        }
    }

    #[test]
    fn merge_overwrites_only_matching_client() {
        let mut doc = CredentialStoreDocument::default();
        doc.merge(record("client-a", "access-a-1"));
        doc.merge(record("client-b", "access-b-1"));
        doc.merge(record("client-a", "access-a-2"));

        assert_eq!(doc.len(), 2);
        assert_eq!(doc.get("client-a").unwrap().access_token, "access-a-2");
        assert_eq!(doc.get("client-b").unwrap().access_token, "access-b-1");
    }

    #[test]
    fn expired_record_is_not_valid() {
        let mut rec = record("client", "access-token-value");
        assert!(rec.is_valid());

        rec.expires_at = Utc::now() - Duration::seconds(1);
        assert!(!rec.is_valid());
        assert_eq!(rec.remaining_lifetime(), Duration::zero());
    }

    #[test]
    fn document_uses_tokens_wire_shape() {
        let json = r#"{
            "tokens": {
                "abc": {
                    "access_token": "AAAAAAAAAA",
                    "refresh_token": "R1",
                    "token_type": "Bearer",
                    "expires_at": "2030-01-01T00:00:00Z",
                    "client_id": "abc"
                }
            }
        }"#;

        let doc: CredentialStoreDocument = serde_json::from_str(json).unwrap();
        let rec = doc.get("abc").unwrap();
        assert_eq!(rec.refresh_token, "R1");
        assert_eq!(rec.expires_at.to_rfc3339(), "2030-01-01T00:00:00+00:00");
    }

    #[test]
    fn missing_tokens_key_yields_empty_document() {
        let doc: CredentialStoreDocument = serde_json::from_str("{}").unwrap();
        assert!(doc.is_empty());
    }
}
