// Shared fixtures for unit tests

use std::sync::Arc;

use jsonwebtoken::{encode, EncodingKey, Header};
use uuid::Uuid;

use crate::config::Config;
use crate::db::MemoryStore;
use crate::middleware::auth::{Claims, Identity, TOKEN_AUDIENCE};
use crate::models::AppState;

pub const TEST_SECRET: &str = "test-jwt-secret";

pub fn mint_token(secret: &str, user_id: Uuid, exp_offset_secs: i64) -> String {
    let exp = chrono::Utc::now().timestamp() + exp_offset_secs;
    let claims = Claims {
        sub: user_id.to_string(),
        exp: exp.max(0) as usize,
        aud: TOKEN_AUDIENCE.to_string(),
        email: Some(format!("{}@example.com", user_id.simple())),
        role: Some("authenticated".to_string()),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("token encodes")
}

pub fn identity(user_id: Uuid) -> Identity {
    Identity {
        user_id,
        email: Some(format!("{}@example.com", user_id.simple())),
    }
}

/// State over a fresh in-memory store. The store handle is returned so
/// tests can seed users and inject failures.
pub fn test_state() -> (AppState, MemoryStore) {
    test_state_with(Config::for_local(TEST_SECRET))
}

pub fn test_state_with(config: Config) -> (AppState, MemoryStore) {
    let store = MemoryStore::new();
    let state = AppState::new(Arc::new(store.clone()), config);
    (state, store)
}
