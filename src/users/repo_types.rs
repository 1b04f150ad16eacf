use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(r#"Invalid role. Must be either "user" or "admin""#.into()),
        }
    }
}

/// User record held by the in-memory store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String, // lower-cased, unique
    #[serde(skip_serializing)]
    pub password_hash: String, // argon2 PHC string, never exposed
    pub name: String,
    pub role: Role,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl User {
    pub fn new(email: &str, password_hash: String, name: &str, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.trim().to_lowercase(),
            password_hash,
            name: name.trim().to_string(),
            role,
            is_active: false,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Field-by-field update applied over a stored [`User`]. Every field is
/// validated by the caller before the patch reaches the store.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
    pub password_hash: Option<String>,
    pub is_active: Option<bool>,
}

impl UserPatch {
    pub fn password(hash: String) -> Self {
        Self {
            password_hash: Some(hash),
            ..Self::default()
        }
    }

    pub fn activate() -> Self {
        Self {
            is_active: Some(true),
            ..Self::default()
        }
    }

    pub(crate) fn merge_into(self, user: &mut User) {
        if let Some(name) = self.name {
            user.name = name;
        }
        if let Some(email) = self.email {
            user.email = email;
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        if let Some(hash) = self.password_hash {
            user.password_hash = hash;
        }
        if let Some(active) = self.is_active {
            user.is_active = active;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_user_has_no_password_field() {
        let user = User::new("Alice@Example.com ", "$argon2id$secret".into(), "Alice", Role::User);
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("$argon2id$secret"));
        assert!(json.contains("\"isActive\":false"));
        assert_eq!(user.email, "alice@example.com");
    }

    #[test]
    fn patch_only_touches_present_fields() {
        let mut user = User::new("a@b.io", "h".into(), "Old Name", Role::User);
        UserPatch {
            name: Some("New Name".into()),
            ..UserPatch::default()
        }
        .merge_into(&mut user);
        assert_eq!(user.name, "New Name");
        assert_eq!(user.email, "a@b.io");
        assert_eq!(user.role, Role::User);
        assert_eq!(user.password_hash, "h");
    }

    #[test]
    fn role_parses_known_values_only() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert!("root".parse::<Role>().is_err());
    }
}
