use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::users::repo_types::{Role, User, UserPatch};

#[derive(Debug, Error)]
#[error("email already registered")]
pub struct DuplicateEmail;

/// Filter used by the search endpoint. `query` matches name or email,
/// case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub query: Option<String>,
    pub role: Option<Role>,
}

impl UserFilter {
    fn matches(&self, user: &User) -> bool {
        let role_ok = self.role.map_or(true, |r| user.role == r);
        let query_ok = self.query.as_deref().map_or(true, |q| {
            let q = q.to_lowercase();
            user.email.contains(&q) || user.name.to_lowercase().contains(&q)
        });
        role_ok && query_ok
    }
}

/// In-memory user table, kept in insertion order. Cloning shares the table.
#[derive(Clone, Default)]
pub struct UserStore {
    users: Arc<RwLock<Vec<User>>>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a user; the email uniqueness check and the push happen under
    /// one write lock.
    pub async fn insert(&self, user: User) -> Result<User, DuplicateEmail> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.email == user.email) {
            return Err(DuplicateEmail);
        }
        users.push(user.clone());
        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Option<User> {
        let email = email.trim().to_lowercase();
        self.users
            .read()
            .await
            .iter()
            .find(|u| u.email == email)
            .cloned()
    }

    pub async fn find_by_id(&self, id: Uuid) -> Option<User> {
        self.users.read().await.iter().find(|u| u.id == id).cloned()
    }

    pub async fn exists(&self, id: Uuid) -> bool {
        self.users.read().await.iter().any(|u| u.id == id)
    }

    pub async fn count(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn list(&self) -> Vec<User> {
        self.users.read().await.clone()
    }

    pub async fn search(&self, filter: &UserFilter) -> Vec<User> {
        self.users
            .read()
            .await
            .iter()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect()
    }

    /// Merge `patch` over the stored record. `Ok(None)` when no such user.
    pub async fn update(&self, id: Uuid, patch: UserPatch) -> Result<Option<User>, DuplicateEmail> {
        let mut users = self.users.write().await;
        if let Some(email) = patch.email.as_deref() {
            if users.iter().any(|u| u.id != id && u.email == email) {
                return Err(DuplicateEmail);
            }
        }
        let Some(user) = users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        patch.merge_into(user);
        Ok(Some(user.clone()))
    }

    pub async fn delete(&self, id: Uuid) -> Option<User> {
        let mut users = self.users.write().await;
        let idx = users.iter().position(|u| u.id == id)?;
        Some(users.remove(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(email: &str, name: &str, role: Role) -> User {
        User::new(email, "hash".into(), name, role)
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_email_case_insensitively() {
        let store = UserStore::new();
        store.insert(user("bob@example.com", "Bob", Role::User)).await.unwrap();
        let err = store.insert(user("BOB@example.com", "Bobby", Role::User)).await;
        assert!(err.is_err());
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn update_refuses_to_steal_another_email() {
        let store = UserStore::new();
        let a = store.insert(user("a@example.com", "Anna", Role::User)).await.unwrap();
        store.insert(user("b@example.com", "Bert", Role::User)).await.unwrap();

        let patch = UserPatch {
            email: Some("b@example.com".into()),
            ..UserPatch::default()
        };
        assert!(store.update(a.id, patch).await.is_err());

        // keeping your own email is fine
        let patch = UserPatch {
            email: Some("a@example.com".into()),
            name: Some("Anna Maria".into()),
            ..UserPatch::default()
        };
        let updated = store.update(a.id, patch).await.unwrap().unwrap();
        assert_eq!(updated.name, "Anna Maria");
    }

    #[tokio::test]
    async fn update_and_delete_unknown_id() {
        let store = UserStore::new();
        assert!(store.update(Uuid::new_v4(), UserPatch::activate()).await.unwrap().is_none());
        assert!(store.delete(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn search_matches_name_or_email_and_role() {
        let store = UserStore::new();
        store.insert(user("carol@example.com", "Carol King", Role::Admin)).await.unwrap();
        store.insert(user("dave@corp.io", "Dave", Role::User)).await.unwrap();

        let by_name = UserFilter { query: Some("KING".into()), role: None };
        assert_eq!(store.search(&by_name).await.len(), 1);

        let by_domain = UserFilter { query: Some("corp".into()), role: None };
        assert_eq!(store.search(&by_domain).await[0].name, "Dave");

        let admins = UserFilter { query: None, role: Some(Role::Admin) };
        assert_eq!(store.search(&admins).await[0].email, "carol@example.com");
    }
}
