//! End-to-end login tests: account creation, password login, token claims.

use std::sync::Arc;

use chrono::Duration;

use kubegate::crypto::{CryptoService, HashParams};
use kubegate::identity::{
    create_account, FrontendAuthManager, FrontendAuthPayload, JwtService, LocalAuthManager, LoginError, TokenData,
    TokenError, UserRole,
};
use kubegate::storage::{DataStore, LocalDataStore, NewUser, StoreError};

const SECRET: &[u8] = b"integration-secret-0123456789abcdefghij";

fn crypto() -> Arc<CryptoService> {
    Arc::new(CryptoService::new(HashParams { memory_kib: 1024, iterations: 1, parallelism: 1 }).unwrap())
}

struct Harness {
    store: LocalDataStore,
    crypto: Arc<CryptoService>,
    jwt: Arc<JwtService>,
    auth: LocalAuthManager,
}

fn harness() -> Harness {
    let store = LocalDataStore::in_memory();
    store.open().unwrap();
    store.init().unwrap();
    let crypto = crypto();
    let jwt = Arc::new(JwtService::new(SECRET, Duration::minutes(15)).unwrap());
    let auth = LocalAuthManager::new(store.user_service(), Arc::clone(&crypto), Arc::clone(&jwt)).unwrap();
    Harness { store, crypto, jwt, auth }
}

fn login(auth: &LocalAuthManager, u: &str, p: &str) -> Result<String, LoginError> {
    auth.login(&FrontendAuthPayload { username: u.into(), password: p.into() }).map(|r| r.jwt_token)
}

#[test]
fn alice_logs_in_with_stored_role() {
    let h = harness();
    let users = h.store.user_service();
    let alice = users
        .create_user(NewUser {
            username: "alice".into(),
            password_hash: h.crypto.hash("pw123").unwrap(),
            role: UserRole::Admin,
        })
        .unwrap();

    let token = login(&h.auth, "alice", "pw123").unwrap();
    let claims = h.jwt.decrypt(&token).unwrap().data;
    assert_eq!(claims, TokenData { id: alice.id, username: "alice".into(), role: alice.role });

    assert!(matches!(login(&h.auth, "alice", "wrong"), Err(LoginError::Authentication)));
}

#[test]
fn unknown_user_and_bad_password_are_indistinguishable() {
    let h = harness();
    create_account(h.store.user_service().as_ref(), &h.crypto, "bob", "hunter2", UserRole::NormalUser).unwrap();
    let wrong_pw = login(&h.auth, "bob", "hunter3").unwrap_err();
    let no_user = login(&h.auth, "carol", "hunter2").unwrap_err();
    assert_eq!(format!("{wrong_pw:?}"), format!("{no_user:?}"));
}

#[test]
fn usernames_are_case_sensitive() {
    let h = harness();
    create_account(h.store.user_service().as_ref(), &h.crypto, "Dave", "pw", UserRole::NormalUser).unwrap();
    assert!(login(&h.auth, "Dave", "pw").is_ok());
    assert!(matches!(login(&h.auth, "dave", "pw"), Err(LoginError::Authentication)));
}

#[test]
fn duplicate_create_keeps_existing_record() {
    let h = harness();
    let users = h.store.user_service();
    let first = create_account(users.as_ref(), &h.crypto, "erin", "one", UserRole::NormalUser).unwrap();
    let err = users
        .create_user(NewUser { username: "erin".into(), password_hash: h.crypto.hash("two").unwrap(), role: UserRole::Admin })
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateUsername(_)));
    assert_eq!(users.user_by_username("erin").unwrap(), first);
    assert!(login(&h.auth, "erin", "one").is_ok());
    assert!(login(&h.auth, "erin", "two").is_err());
}

#[test]
fn role_change_does_not_touch_issued_tokens() {
    let h = harness();
    let users = h.store.user_service();
    let frank = create_account(users.as_ref(), &h.crypto, "frank", "pw", UserRole::Admin).unwrap();
    let old = login(&h.auth, "frank", "pw").unwrap();
    users
        .update_user(frank.id, NewUser { username: "frank".into(), password_hash: frank.password_hash.clone(), role: UserRole::NormalUser })
        .unwrap();
    assert_eq!(h.jwt.decrypt(&old).unwrap().data.role, UserRole::Admin);
    let new = login(&h.auth, "frank", "pw").unwrap();
    assert_eq!(h.jwt.decrypt(&new).unwrap().data.role, UserRole::NormalUser);
}

#[test]
fn storage_failure_is_not_reported_as_bad_credentials() {
    let h = harness();
    create_account(h.store.user_service().as_ref(), &h.crypto, "gina", "pw", UserRole::NormalUser).unwrap();
    h.store.close().unwrap();
    assert!(matches!(login(&h.auth, "gina", "pw"), Err(LoginError::Storage(StoreError::Closed))));
}

#[test]
fn tokens_expire() {
    let h = harness();
    create_account(h.store.user_service().as_ref(), &h.crypto, "hank", "pw", UserRole::NormalUser).unwrap();
    let token = login(&h.auth, "hank", "pw").unwrap();
    let later = chrono::Utc::now() + Duration::minutes(16);
    assert_eq!(h.jwt.decrypt_at(&token, later).unwrap_err(), TokenError::Expired);
}

#[test]
fn unknown_user_costs_a_hash_like_a_bad_password() {
    let store = LocalDataStore::in_memory();
    store.open().unwrap();
    let crypto = Arc::new(CryptoService::new(HashParams { memory_kib: 8 * 1024, iterations: 2, parallelism: 1 }).unwrap());
    let jwt = Arc::new(JwtService::new(SECRET, Duration::minutes(15)).unwrap());
    create_account(store.user_service().as_ref(), &crypto, "ivan", "pw", UserRole::NormalUser).unwrap();
    let auth = LocalAuthManager::new(store.user_service(), crypto, jwt).unwrap();

    let time = |u: &str| {
        let start = std::time::Instant::now();
        for _ in 0..5 {
            assert!(matches!(login(&auth, u, "wrong"), Err(LoginError::Authentication)));
        }
        start.elapsed()
    };
    let known = time("ivan");
    let unknown = time("nobody");
    // Without a hash on the unknown path the gap is several orders of magnitude.
    assert!(unknown * 5 >= known, "known: {known:?} unknown: {unknown:?}");
}
