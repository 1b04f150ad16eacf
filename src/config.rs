use serde::Deserialize;

const DEV_JWT_SECRET: &str = "userapi-development-secret";

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub reset_ttl_minutes: i64,
    pub activation_ttl_minutes: i64,
    pub reset_sweep_minutes: u64,
    pub activation_sweep_minutes: u64,
    /// How long a consumed token is kept around to report ALREADY_USED.
    pub consumed_grace_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub from: String,
    pub frontend_url: String,
    pub api_url: String,
    pub api_key: Option<String>,
}

/// `max` requests per `window_secs` for one client key.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitPolicy {
    pub max: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub general: RateLimitPolicy,
    pub auth: RateLimitPolicy,
    pub strict: RateLimitPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_env: String,
    pub jwt: JwtConfig,
    pub tokens: TokenConfig,
    pub mail: MailConfig,
    pub rate_limit: RateLimitConfig,
    /// Return freshly issued reset/activation tokens in responses.
    pub expose_dev_tokens: bool,
    pub seed_demo_users: bool,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Parses `"<max>/<window_secs>"`, e.g. `"5/900"`.
fn env_policy(key: &str, default: RateLimitPolicy) -> RateLimitPolicy {
    std::env::var(key)
        .ok()
        .and_then(|v| {
            let (max, window) = v.split_once('/')?;
            Some(RateLimitPolicy {
                max: max.trim().parse().ok()?,
                window_secs: window.trim().parse().ok()?,
            })
        })
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let app_env = env_or("APP_ENV", "production");
        let is_dev = app_env == "development" || app_env == "test";

        let secret = match std::env::var("JWT_SECRET") {
            Ok(s) if !s.is_empty() => s,
            _ if is_dev => {
                tracing::warn!("JWT_SECRET not set; using the development secret");
                DEV_JWT_SECRET.to_string()
            }
            _ => anyhow::bail!("JWT_SECRET must be set outside development"),
        };

        let jwt = JwtConfig {
            secret,
            issuer: env_or("JWT_ISSUER", "userapi"),
            audience: env_or("JWT_AUDIENCE", "userapi-clients"),
            ttl_minutes: env_parse("JWT_TTL_MINUTES", 60 * 24),
        };

        let tokens = TokenConfig {
            reset_ttl_minutes: env_parse("RESET_TOKEN_TTL_MINUTES", 60),
            activation_ttl_minutes: env_parse("ACTIVATION_TOKEN_TTL_MINUTES", 60 * 24),
            reset_sweep_minutes: env_parse("RESET_SWEEP_MINUTES", 30),
            activation_sweep_minutes: env_parse("ACTIVATION_SWEEP_MINUTES", 60),
            consumed_grace_secs: env_parse("CONSUMED_TOKEN_GRACE_SECS", 5 * 60),
        };

        let mail = MailConfig {
            from: env_or("MAIL_FROM", "noreply@userapi.local"),
            frontend_url: env_or("FRONTEND_URL", "http://localhost:3000"),
            api_url: env_or("MAIL_API_URL", "https://api.resend.com/emails"),
            api_key: std::env::var("MAIL_API_KEY").ok().filter(|k| !k.is_empty()),
        };

        let rate_limit = RateLimitConfig {
            general: env_policy(
                "RATE_LIMIT_GENERAL",
                RateLimitPolicy { max: 100, window_secs: 15 * 60 },
            ),
            auth: env_policy(
                "RATE_LIMIT_AUTH",
                RateLimitPolicy { max: 5, window_secs: 15 * 60 },
            ),
            strict: env_policy(
                "RATE_LIMIT_STRICT",
                RateLimitPolicy { max: 3, window_secs: 60 * 60 },
            ),
        };

        let expose_dev_tokens = env_flag("EXPOSE_DEV_TOKENS")
            .unwrap_or(app_env == "development" || mail.api_key.is_none());

        Ok(Self {
            app_env,
            jwt,
            tokens,
            mail,
            rate_limit,
            expose_dev_tokens,
            seed_demo_users: env_flag("SEED_DEMO_USERS").unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_parses_max_and_window() {
        std::env::set_var("USERAPI_TEST_POLICY", "7/120");
        let p = env_policy("USERAPI_TEST_POLICY", RateLimitPolicy { max: 1, window_secs: 1 });
        assert_eq!(p.max, 7);
        assert_eq!(p.window_secs, 120);
    }

    #[test]
    fn malformed_policy_falls_back_to_default() {
        std::env::set_var("USERAPI_TEST_BAD_POLICY", "lots");
        let p = env_policy("USERAPI_TEST_BAD_POLICY", RateLimitPolicy { max: 4, window_secs: 60 });
        assert_eq!(p.max, 4);
        assert_eq!(p.window_secs, 60);
    }
}
