//! PostgreSQL store integration tests
//!
//! These require a running database. Set DATABASE_URL and run:
//! cargo test -p prismfit-core -- --ignored

use chrono::{Duration, Utc};
use prismfit_core::{PgStore, RefreshToken, RefreshTokenStore, StoreError, User, UserDirectory};
use uuid::Uuid;

async fn connect() -> PgStore {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let store = PgStore::connect(&url, 5).await.expect("connect");
    store.migrate().await.expect("migrate");
    store
}

fn unique_email() -> String {
    format!("{}@prismfit.test", Uuid::new_v4())
}

#[tokio::test]
#[ignore = "requires database"]
async fn test_user_roundtrip_and_unique_email() {
    let store = connect().await;
    let email = unique_email();

    let user = User::new(&email, "hash".to_string(), "nick".to_string(), 0);
    let saved = UserDirectory::save(&store, user.clone()).await.unwrap();
    assert_eq!(saved.id, user.id);

    let found = store.find_by_email(&email).await.unwrap().unwrap();
    assert_eq!(found.id, user.id);
    assert_eq!(found.hashed_password, "hash");

    let duplicate = User::new(&email, "other".to_string(), "nick2".to_string(), 0);
    let result = UserDirectory::save(&store, duplicate).await;
    assert!(matches!(result, Err(StoreError::Conflict(_))));

    store.remove(user.id).await.unwrap();
    assert!(store.find_by_id(user.id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires database"]
async fn test_refresh_token_conditional_delete() {
    let store = connect().await;
    let user = User::new(&unique_email(), "hash".to_string(), "nick".to_string(), 0);
    UserDirectory::save(&store, user.clone()).await.unwrap();

    let record = RefreshToken::new(user.id, "fingerprint".to_string(), Utc::now() + Duration::days(1));
    RefreshTokenStore::save(&store, record).await.unwrap();

    assert!(store
        .find_by_user_id_and_hash(user.id, "fingerprint")
        .await
        .unwrap()
        .is_some());

    let (first, second) = tokio::join!(
        store.delete_by_user_id_and_hash(user.id, "fingerprint"),
        store.delete_by_user_id_and_hash(user.id, "fingerprint"),
    );
    let wins = [first.unwrap(), second.unwrap()].iter().filter(|w| **w).count();
    assert_eq!(wins, 1);

    store.remove(user.id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires database"]
async fn test_expired_records_hidden_and_purged() {
    let store = connect().await;
    let user = User::new(&unique_email(), "hash".to_string(), "nick".to_string(), 0);
    UserDirectory::save(&store, user.clone()).await.unwrap();

    let expired = RefreshToken::new(user.id, "old".to_string(), Utc::now() - Duration::minutes(1));
    RefreshTokenStore::save(&store, expired).await.unwrap();

    assert!(store
        .find_by_user_id_and_hash(user.id, "old")
        .await
        .unwrap()
        .is_none());
    assert!(store.purge_expired(Utc::now()).await.unwrap() >= 1);

    store.remove(user.id).await.unwrap();
}
