use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{validate_new_user, DataStore, NewUser, StoreError, StoreResult, User, UserId, UserService};
use crate::identity::UserRole;

const SCHEMA_VERSION: u32 = 1;
const USERS_FILE: &str = "users.json";

/// On-disk layout of `users.json`.
#[derive(Serialize, Deserialize)]
struct Document {
    version: u32,
    next_id: u64,
    users: Vec<User>,
}

#[derive(Clone)]
struct Table {
    open: bool,
    next_id: u64,
    users: BTreeMap<UserId, User>,
}

impl Default for Table {
    fn default() -> Self {
        Self { open: false, next_id: 1, users: BTreeMap::new() }
    }
}

impl Table {
    fn ensure_open(&self) -> StoreResult<()> {
        if self.open { Ok(()) } else { Err(StoreError::Closed) }
    }

    fn find_username(&self, username: &str) -> Option<&User> {
        self.users.values().find(|u| u.username == username)
    }

    fn to_document(&self) -> Document {
        Document { version: SCHEMA_VERSION, next_id: self.next_id, users: self.users.values().cloned().collect() }
    }
}

struct Inner {
    dir: Option<PathBuf>,
    table: RwLock<Table>,
}

impl Inner {
    fn users_path(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(USERS_FILE))
    }

    fn persist(&self, table: &Table) -> StoreResult<()> {
        let Some(path) = self.users_path() else { return Ok(()); };
        let bytes = serde_json::to_vec_pretty(&table.to_document())?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Apply `f` under the write lock and persist the result before releasing
    /// it. A failed write restores the previous table.
    fn mutate<T>(&self, f: impl FnOnce(&mut Table) -> StoreResult<T>) -> StoreResult<T> {
        let mut table = self.table.write();
        table.ensure_open()?;
        let before = table.clone();
        let out = f(&mut table)?;
        if let Err(e) = self.persist(&table) {
            *table = before;
            return Err(e);
        }
        Ok(out)
    }

    fn read<T>(&self, f: impl FnOnce(&Table) -> StoreResult<T>) -> StoreResult<T> {
        let table = self.table.read();
        table.ensure_open()?;
        f(&table)
    }
}

fn load_document(path: &Path) -> StoreResult<Table> {
    let bytes = std::fs::read(path)?;
    let doc: Document = serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::Corrupt(format!("{}: {}", path.display(), e)))?;
    if doc.version != SCHEMA_VERSION {
        return Err(StoreError::Corrupt(format!("unsupported schema version {}", doc.version)));
    }
    if doc.next_id == 0 {
        return Err(StoreError::Corrupt("next_id must be at least 1".into()));
    }
    let mut users = BTreeMap::new();
    let mut names = HashSet::new();
    for u in doc.users {
        let fields = NewUser { username: u.username.clone(), password_hash: u.password_hash.clone(), role: u.role };
        validate_new_user(&fields).map_err(|e| StoreError::Corrupt(format!("user {}: {}", u.id, e)))?;
        if u.id.0 >= doc.next_id {
            return Err(StoreError::Corrupt(format!("user id {} is not below next_id {}", u.id, doc.next_id)));
        }
        if !names.insert(u.username.clone()) {
            return Err(StoreError::Corrupt(format!("duplicate username `{}`", u.username)));
        }
        if users.insert(u.id, u).is_some() {
            return Err(StoreError::Corrupt("duplicate user id".into()));
        }
    }
    Ok(Table { open: false, next_id: doc.next_id, users })
}

/// User store kept in memory, optionally mirrored to `<dir>/users.json`.
///
/// All writers go through one `RwLock`, so concurrent updates of the same
/// record apply in lock order and each one is persisted before the next runs.
#[derive(Clone)]
pub struct LocalDataStore {
    inner: Arc<Inner>,
}

impl LocalDataStore {
    pub fn in_memory() -> Self {
        Self { inner: Arc::new(Inner { dir: None, table: RwLock::new(Table::default()) }) }
    }

    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self { inner: Arc::new(Inner { dir: Some(dir.into()), table: RwLock::new(Table::default()) }) }
    }
}

impl DataStore for LocalDataStore {
    fn open(&self) -> StoreResult<()> {
        let mut table = self.inner.table.write();
        if table.open {
            return Ok(());
        }
        if let Some(path) = self.inner.users_path() {
            if path.exists() {
                *table = load_document(&path)?;
                info!(target: "store", path = %path.display(), users = table.users.len(), "loaded user table");
            } else {
                *table = Table::default();
                debug!(target: "store", path = %path.display(), "user table not present yet");
            }
        }
        table.open = true;
        Ok(())
    }

    fn init(&self) -> StoreResult<()> {
        let table = self.inner.table.write();
        table.ensure_open()?;
        let (Some(dir), Some(path)) = (self.inner.dir.as_ref(), self.inner.users_path()) else {
            return Ok(());
        };
        std::fs::create_dir_all(dir)?;
        if !path.exists() {
            self.inner.persist(&table)?;
            info!(target: "store", path = %path.display(), "initialized user table");
        }
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        let mut table = self.inner.table.write();
        if !table.open {
            return Ok(());
        }
        if self.inner.dir.as_ref().is_some_and(|d| d.exists()) {
            self.inner.persist(&table)?;
        }
        table.open = false;
        debug!(target: "store", "user table closed");
        Ok(())
    }

    fn user_service(&self) -> Arc<dyn UserService> {
        Arc::new(LocalUserService { inner: Arc::clone(&self.inner) })
    }
}

struct LocalUserService {
    inner: Arc<Inner>,
}

impl UserService for LocalUserService {
    fn user(&self, id: UserId) -> StoreResult<User> {
        self.inner.read(|t| t.users.get(&id).cloned().ok_or_else(|| StoreError::NotFound(id.to_string())))
    }

    fn user_by_username(&self, username: &str) -> StoreResult<User> {
        self.inner.read(|t| t.find_username(username).cloned().ok_or_else(|| StoreError::NotFound(username.to_string())))
    }

    fn users(&self) -> StoreResult<Vec<User>> {
        self.inner.read(|t| Ok(t.users.values().cloned().collect()))
    }

    fn users_by_role(&self, role: UserRole) -> StoreResult<Vec<User>> {
        self.inner.read(|t| Ok(t.users.values().filter(|u| u.role == role).cloned().collect()))
    }

    fn create_user(&self, user: NewUser) -> StoreResult<User> {
        validate_new_user(&user)?;
        let created = self.inner.mutate(|t| {
            if t.find_username(&user.username).is_some() {
                return Err(StoreError::DuplicateUsername(user.username.clone()));
            }
            let id = UserId(t.next_id);
            t.next_id = t
                .next_id
                .checked_add(1)
                .ok_or_else(|| StoreError::Corrupt("user id space exhausted".into()))?;
            let record = User { id, username: user.username, password_hash: user.password_hash, role: user.role };
            t.users.insert(id, record.clone());
            Ok(record)
        })?;
        info!(target: "store", id = %created.id, username = %created.username, role = %created.role, "user created");
        Ok(created)
    }

    fn update_user(&self, id: UserId, user: NewUser) -> StoreResult<User> {
        validate_new_user(&user)?;
        let updated = self.inner.mutate(|t| {
            if !t.users.contains_key(&id) {
                return Err(StoreError::NotFound(id.to_string()));
            }
            if t.find_username(&user.username).is_some_and(|other| other.id != id) {
                return Err(StoreError::DuplicateUsername(user.username.clone()));
            }
            let record = User { id, username: user.username, password_hash: user.password_hash, role: user.role };
            t.users.insert(id, record.clone());
            Ok(record)
        })?;
        info!(target: "store", id = %id, "user updated");
        Ok(updated)
    }

    fn delete_user(&self, id: UserId) -> StoreResult<()> {
        self.inner.mutate(|t| {
            t.users.remove(&id).map(|_| ()).ok_or_else(|| StoreError::NotFound(id.to_string()))
        })?;
        info!(target: "store", id = %id, "user deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "$argon2id$v=19$m=1024,t=1,p=1$c2FsdHNhbHRzYWx0$2mFzvXDq5NBAuKzWmHiLpQZ0KsIYZeL4bP9p0A6Yk9s";

    fn new_user(name: &str, role: UserRole) -> NewUser {
        NewUser { username: name.into(), password_hash: DIGEST.into(), role }
    }

    fn opened() -> LocalDataStore {
        let s = LocalDataStore::in_memory();
        s.open().unwrap();
        s.init().unwrap();
        s
    }

    #[test]
    fn create_and_lookup() {
        let store = opened();
        let users = store.user_service();
        let a = users.create_user(new_user("alice", UserRole::Admin)).unwrap();
        assert_eq!(a.id, UserId(1));
        assert_eq!(users.user(a.id).unwrap(), a);
        assert_eq!(users.user_by_username("alice").unwrap(), a);
        assert!(users.user_by_username("Alice").unwrap_err().is_not_found());
    }

    #[test]
    fn duplicate_username_leaves_original() {
        let store = opened();
        let users = store.user_service();
        let a = users.create_user(new_user("alice", UserRole::Admin)).unwrap();
        let err = users.create_user(new_user("alice", UserRole::NormalUser)).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUsername(ref n) if n == "alice"));
        assert_eq!(users.user_by_username("alice").unwrap(), a);
        assert_eq!(users.users().unwrap().len(), 1);
    }

    #[test]
    fn ids_are_not_reused() {
        let store = opened();
        let users = store.user_service();
        let a = users.create_user(new_user("a", UserRole::NormalUser)).unwrap();
        users.delete_user(a.id).unwrap();
        let b = users.create_user(new_user("b", UserRole::NormalUser)).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn delete_missing_is_not_found() {
        let store = opened();
        let users = store.user_service();
        let a = users.create_user(new_user("a", UserRole::NormalUser)).unwrap();
        users.delete_user(a.id).unwrap();
        assert!(users.delete_user(a.id).unwrap_err().is_not_found());
    }

    #[test]
    fn update_replaces_whole_record() {
        let store = opened();
        let users = store.user_service();
        let a = users.create_user(new_user("a", UserRole::NormalUser)).unwrap();
        let u = users.update_user(a.id, new_user("a2", UserRole::Admin)).unwrap();
        assert_eq!(u.id, a.id);
        assert_eq!(u.username, "a2");
        assert_eq!(u.role, UserRole::Admin);
        assert!(users.user_by_username("a").unwrap_err().is_not_found());
        assert!(users.update_user(UserId(99), new_user("z", UserRole::Admin)).unwrap_err().is_not_found());
    }

    #[test]
    fn update_cannot_steal_username() {
        let store = opened();
        let users = store.user_service();
        users.create_user(new_user("a", UserRole::NormalUser)).unwrap();
        let b = users.create_user(new_user("b", UserRole::NormalUser)).unwrap();
        let err = users.update_user(b.id, new_user("a", UserRole::NormalUser)).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateUsername(_)));
        // same name on the same record is fine
        users.update_user(b.id, new_user("b", UserRole::Admin)).unwrap();
    }

    #[test]
    fn users_by_role_filters() {
        let store = opened();
        let users = store.user_service();
        users.create_user(new_user("a", UserRole::Admin)).unwrap();
        users.create_user(new_user("b", UserRole::NormalUser)).unwrap();
        users.create_user(new_user("c", UserRole::NormalUser)).unwrap();
        let mut names: Vec<String> =
            users.users_by_role(UserRole::NormalUser).unwrap().into_iter().map(|u| u.username).collect();
        names.sort();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn rejects_plaintext_and_empty_names() {
        let store = opened();
        let users = store.user_service();
        let bad = NewUser { username: "a".into(), password_hash: "hunter2".into(), role: UserRole::Admin };
        assert!(matches!(users.create_user(bad), Err(StoreError::Validation(_))));
        assert!(matches!(users.create_user(new_user("  ", UserRole::Admin)), Err(StoreError::Validation(_))));
    }

    #[test]
    fn closed_store_refuses_calls() {
        let store = LocalDataStore::in_memory();
        let users = store.user_service();
        assert!(matches!(users.users(), Err(StoreError::Closed)));
        assert!(matches!(store.init(), Err(StoreError::Closed)));
        store.open().unwrap();
        users.users().unwrap();
        store.close().unwrap();
        assert!(matches!(users.user(UserId(1)), Err(StoreError::Closed)));
    }

    #[test]
    fn redacted_debug() {
        let u = User { id: UserId(1), username: "a".into(), password_hash: DIGEST.into(), role: UserRole::Admin };
        let s = format!("{:?}", u);
        assert!(!s.contains("argon2"));
    }
}
