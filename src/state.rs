use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    auth::{jwt::JwtKeys, password::hash_password_async},
    config::AppConfig,
    mail::{HttpMailer, LogMailer, Mailer},
    rate_limit::{self, RateLimiter},
    tokens::{self, AccountActivationService, PasswordResetService},
    users::{
        repo::UserStore,
        repo_types::{Role, User},
    },
};

#[derive(Clone)]
pub struct Limiters {
    pub general: RateLimiter,
    pub auth: RateLimiter,
    pub strict: RateLimiter,
}

/// Process-wide components, built once and shared by handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub keys: JwtKeys,
    pub users: UserStore,
    pub resets: PasswordResetService,
    pub activations: AccountActivationService,
    pub limits: Limiters,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let mailer: Arc<dyn Mailer> = match &config.mail.api_key {
            Some(key) => Arc::new(HttpMailer::new(&config.mail.api_url, key)?),
            None => {
                warn!("MAIL_API_KEY not set; emails will only be logged");
                Arc::new(LogMailer)
            }
        };

        let state = Self::from_parts(config, mailer);
        if state.config.seed_demo_users {
            state.seed_demo_users().await?;
        }
        Ok(state)
    }

    pub fn from_parts(config: AppConfig, mailer: Arc<dyn Mailer>) -> Self {
        let rl = &config.rate_limit;
        let limits = Limiters {
            general: RateLimiter::new(
                "general",
                rl.general,
                "Too many requests. Please try again later.",
            ),
            auth: RateLimiter::new(
                "auth",
                rl.auth,
                "Too many authentication attempts. Please try again later.",
            ),
            strict: RateLimiter::new(
                "strict",
                rl.strict,
                "Too many password change attempts. Please try again later.",
            ),
        };

        Self {
            keys: JwtKeys::from_config(&config.jwt),
            users: UserStore::new(),
            resets: PasswordResetService::new(&config.tokens, config.mail.clone(), mailer.clone()),
            activations: AccountActivationService::new(&config.tokens, config.mail.clone(), mailer),
            limits,
            config: Arc::new(config),
        }
    }

    /// Active demo accounts: `admin@test.com`/`admin123` and `user@test.com`/`user123`.
    pub async fn seed_demo_users(&self) -> anyhow::Result<()> {
        let demo = [
            ("admin@test.com", "admin123", "Admin User", Role::Admin),
            ("user@test.com", "user123", "Regular User", Role::User),
        ];
        for (email, password, name, role) in demo {
            let hash = hash_password_async(password.to_string()).await?;
            let mut user = User::new(email, hash, name, role);
            user.is_active = true;
            if self.users.insert(user).await.is_err() {
                warn!(email, "demo user already present");
            }
        }
        info!(total = self.users.count().await, "demo users seeded");
        Ok(())
    }

    pub fn spawn_sweepers(&self) -> Vec<JoinHandle<()>> {
        let t = &self.config.tokens;
        vec![
            tokens::spawn_sweeper(
                self.resets.store().clone(),
                Duration::from_secs(t.reset_sweep_minutes.max(1) * 60),
                "password_reset",
            ),
            tokens::spawn_sweeper(
                self.activations.store().clone(),
                Duration::from_secs(t.activation_sweep_minutes.max(1) * 60),
                "account_activation",
            ),
            rate_limit::spawn_sweeper(self.limits.general.clone()),
            rate_limit::spawn_sweeper(self.limits.auth.clone()),
            rate_limit::spawn_sweeper(self.limits.strict.clone()),
        ]
    }
}

#[cfg(test)]
pub use fakes::*;


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeding_creates_active_demo_accounts() {
        let state = AppState::fake();
        state.seed_demo_users().await.unwrap();
        let admin = state.users.find_by_email("admin@test.com").await.unwrap();
        assert!(admin.is_active);
        assert_eq!(admin.role, Role::Admin);
        let user = state.users.find_by_email("user@test.com").await.unwrap();
        assert!(crate::auth::password::verify_password("user123", &user.password_hash));
    }
}
