//! Single-use, expiring tokens (password reset, account activation).
//!
//! A token moves `issued -> consumed | expired | not_found`. Lookups are keyed
//! by the token string. `consume` runs its check and its mark while holding
//! the map shard's write guard, so two concurrent consumes of one token can
//! never both succeed.

use std::{sync::Arc, time::Duration as StdDuration};

use dashmap::DashMap;
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub mod activation;
pub mod reset;

pub use activation::AccountActivationService;
pub use reset::PasswordResetService;

/// 32 random bytes, hex encoded.
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token not found")]
    NotFound,
    #[error("Token already used")]
    AlreadyUsed,
    #[error("Token expired")]
    Expired,
}

impl TokenError {
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::NotFound => "TOKEN_NOT_FOUND",
            TokenError::AlreadyUsed => "TOKEN_ALREADY_USED",
            TokenError::Expired => "TOKEN_EXPIRED",
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
struct TokenRecord<S> {
    subject: S,
    expires_at: OffsetDateTime,
    consumed_at: Option<OffsetDateTime>,
}

enum Verdict<S> {
    Live(S),
    Used,
    Expired,
    /// consumed and past the retention window
    Stale,
}

#[derive(Clone)]
pub struct TokenStore<S> {
    tokens: Arc<DashMap<String, TokenRecord<S>>>,
    ttl: Duration,
    grace: Duration,
}

pub fn generate_token() -> String {
    let mut buf = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

impl<S> TokenStore<S>
where
    S: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new(ttl: Duration, grace: Duration) -> Self {
        Self {
            tokens: Arc::new(DashMap::new()),
            ttl,
            grace,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn issue(&self, subject: S) -> IssuedToken {
        let now = OffsetDateTime::now_utc();
        let token = generate_token();
        let expires_at = now + self.ttl;
        self.tokens.insert(
            token.clone(),
            TokenRecord {
                subject,
                expires_at,
                consumed_at: None,
            },
        );
        IssuedToken { token, expires_at }
    }

    /// Drop every unconsumed token for `subject`, then issue a fresh one.
    pub fn reissue(&self, subject: S) -> IssuedToken {
        let dropped = self.invalidate_for(&subject);
        if dropped > 0 {
            debug!(dropped, "invalidated outstanding tokens before reissue");
        }
        self.issue(subject)
    }

    /// Remove unconsumed tokens belonging to `subject`. Consumed ones stay
    /// until their retention window runs out.
    pub fn invalidate_for(&self, subject: &S) -> usize {
        let before = self.tokens.len();
        self.tokens
            .retain(|_, rec| rec.consumed_at.is_some() || rec.subject != *subject);
        before.saturating_sub(self.tokens.len())
    }

    pub fn revoke(&self, token: &str) {
        self.tokens.remove(token);
    }

    fn judge(&self, rec: &TokenRecord<S>, now: OffsetDateTime) -> Verdict<S> {
        match rec.consumed_at {
            Some(at) if now > at + self.grace => Verdict::Stale,
            Some(_) => Verdict::Used,
            None if now > rec.expires_at => Verdict::Expired,
            None => Verdict::Live(rec.subject.clone()),
        }
    }

    fn settle(&self, token: &str, verdict: Verdict<S>) -> Result<S, TokenError> {
        match verdict {
            Verdict::Live(subject) => Ok(subject),
            Verdict::Used => Err(TokenError::AlreadyUsed),
            Verdict::Expired => {
                self.tokens.remove(token);
                Err(TokenError::Expired)
            }
            Verdict::Stale => {
                self.tokens.remove(token);
                Err(TokenError::NotFound)
            }
        }
    }

    /// Check a token without consuming it. Expired entries are purged.
    pub fn validate(&self, token: &str) -> Result<S, TokenError> {
        let now = OffsetDateTime::now_utc();
        let verdict = match self.tokens.get(token) {
            Some(rec) => self.judge(&rec, now),
            None => return Err(TokenError::NotFound),
        };
        self.settle(token, verdict)
    }

    /// Validate and mark used in one step.
    pub fn consume(&self, token: &str) -> Result<S, TokenError> {
        let now = OffsetDateTime::now_utc();
        let verdict = match self.tokens.get_mut(token) {
            Some(mut rec) => {
                let verdict = self.judge(&rec, now);
                if matches!(verdict, Verdict::Live(_)) {
                    rec.consumed_at = Some(now);
                }
                verdict
            }
            None => return Err(TokenError::NotFound),
        };
        self.settle(token, verdict)
    }

    /// Remove expired tokens and consumed tokens past their retention window.
    pub fn sweep_expired(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        let before = self.tokens.len();
        self.tokens.retain(|_, rec| match rec.consumed_at {
            Some(at) => now <= at + self.grace,
            None => now <= rec.expires_at,
        });
        before.saturating_sub(self.tokens.len())
    }
}

/// Run `sweep_expired` every `every` until the runtime shuts down.
pub fn spawn_sweeper<S>(store: TokenStore<S>, every: StdDuration, label: &'static str) -> JoinHandle<()>
where
    S: Clone + PartialEq + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = store.sweep_expired();
            info!(store = label, removed, remaining = store.len(), "expired tokens cleaned");
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(ttl: Duration) -> TokenStore<String> {
        TokenStore::new(ttl, Duration::minutes(5))
    }

    #[test]
    fn generated_tokens_are_long_and_distinct() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), TOKEN_BYTES * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn validate_does_not_consume() {
        let s = store(Duration::hours(1));
        let issued = s.issue("alice@example.com".into());
        assert_eq!(s.validate(&issued.token).unwrap(), "alice@example.com");
        assert_eq!(s.validate(&issued.token).unwrap(), "alice@example.com");
    }

    #[test]
    fn second_consume_reports_already_used() {
        let s = store(Duration::hours(1));
        let issued = s.issue("alice@example.com".into());
        assert!(s.consume(&issued.token).is_ok());
        assert_eq!(s.consume(&issued.token), Err(TokenError::AlreadyUsed));
        assert_eq!(s.validate(&issued.token), Err(TokenError::AlreadyUsed));
    }

    #[test]
    fn unknown_token_is_not_found() {
        let s = store(Duration::hours(1));
        assert_eq!(s.consume("nope"), Err(TokenError::NotFound));
    }

    #[tokio::test]
    async fn expired_token_fails_then_disappears() {
        let s = store(Duration::milliseconds(5));
        let issued = s.issue("late@example.com".into());
        tokio::time::sleep(StdDuration::from_millis(30)).await;
        assert_eq!(s.validate(&issued.token), Err(TokenError::Expired));
        // purged on access
        assert_eq!(s.consume(&issued.token), Err(TokenError::NotFound));
    }

    #[tokio::test]
    async fn sweep_removes_expired_and_keeps_live() {
        let short = store(Duration::milliseconds(5));
        let gone = short.issue("a@example.com".into());
        tokio::time::sleep(StdDuration::from_millis(30)).await;
        assert_eq!(short.sweep_expired(), 1);
        assert_eq!(short.validate(&gone.token), Err(TokenError::NotFound));

        let long = store(Duration::hours(1));
        let kept = long.issue("b@example.com".into());
        assert_eq!(long.sweep_expired(), 0);
        assert!(long.validate(&kept.token).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_cleans_on_its_interval() {
        let short = store(Duration::milliseconds(1));
        short.issue("a@example.com".into());
        let long = store(Duration::hours(1));
        let kept = long.issue("b@example.com".into());
        // expiry is wall-clock, the sweep interval is tokio time
        std::thread::sleep(StdDuration::from_millis(5));

        let every = StdDuration::from_secs(60);
        let h1 = spawn_sweeper(short.clone(), every, "short");
        let h2 = spawn_sweeper(long.clone(), every, "long");

        tokio::time::sleep(StdDuration::from_secs(30)).await;
        assert_eq!(short.len(), 1, "no sweep before the first interval");

        tokio::time::sleep(StdDuration::from_secs(31)).await;
        assert_eq!(short.len(), 0);
        assert!(long.validate(&kept.token).is_ok());

        h1.abort();
        h2.abort();
    }

    #[test]
    fn consumed_token_dropped_after_grace() {
        let s: TokenStore<String> = TokenStore::new(Duration::hours(1), Duration::ZERO);
        let issued = s.issue("a@example.com".into());
        s.consume(&issued.token).unwrap();
        std::thread::sleep(StdDuration::from_millis(5));
        assert_eq!(s.sweep_expired(), 1);
        assert_eq!(s.consume(&issued.token), Err(TokenError::NotFound));
    }

    #[test]
    fn reissue_invalidates_only_that_subject() {
        let s = store(Duration::hours(1));
        let old = s.issue("a@example.com".into());
        let other = s.issue("b@example.com".into());
        let fresh = s.reissue("a@example.com".into());

        assert_eq!(s.validate(&old.token), Err(TokenError::NotFound));
        assert!(s.validate(&fresh.token).is_ok());
        assert!(s.validate(&other.token).is_ok());
    }

    #[tokio::test]
    async fn concurrent_consumes_have_one_winner() {
        let s = store(Duration::hours(1));
        let issued = s.issue("race@example.com".into());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let s = s.clone();
            let token = issued.token.clone();
            handles.push(tokio::spawn(async move { s.consume(&token) }));
        }

        let mut wins = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => wins += 1,
                Err(e) => assert_eq!(e, TokenError::AlreadyUsed),
            }
        }
        assert_eq!(wins, 1);
    }
}
