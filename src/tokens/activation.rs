use std::sync::Arc;

use time::Duration;
use tracing::info;
use uuid::Uuid;

use super::{IssuedToken, TokenError, TokenStore};
use crate::{
    config::{MailConfig, TokenConfig},
    mail::{self, DeliveryError, Mailer},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationSubject {
    pub email: String,
    pub user_id: Uuid,
}

/// Account-activation tokens for newly registered users.
#[derive(Clone)]
pub struct AccountActivationService {
    store: TokenStore<ActivationSubject>,
    mailer: Arc<dyn Mailer>,
    mail: MailConfig,
}

impl AccountActivationService {
    pub fn new(cfg: &TokenConfig, mail: MailConfig, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            store: TokenStore::new(
                Duration::minutes(cfg.activation_ttl_minutes),
                Duration::seconds(cfg.consumed_grace_secs),
            ),
            mailer,
            mail,
        }
    }

    pub fn store(&self) -> &TokenStore<ActivationSubject> {
        &self.store
    }

    /// Issue an activation token, dropping any the user still holds.
    pub fn issue(&self, email: &str, user_id: Uuid) -> IssuedToken {
        let issued = self.store.reissue(ActivationSubject {
            email: email.to_string(),
            user_id,
        });
        info!(email, %user_id, expires_at = %issued.expires_at, "ACTIVATION_TOKEN_GENERATED");
        issued
    }

    pub async fn deliver(&self, email: &str, issued: &IssuedToken) -> Result<(), DeliveryError> {
        let msg = mail::activation_email(
            &self.mail,
            email,
            &issued.token,
            self.store.ttl().whole_minutes(),
        );
        self.mailer.send(&msg).await
    }

    pub fn validate(&self, token: &str) -> Result<ActivationSubject, TokenError> {
        self.store.validate(token)
    }

    pub fn consume(&self, token: &str) -> Result<ActivationSubject, TokenError> {
        let subject = self.store.consume(token)?;
        info!(email = %subject.email, user_id = %subject.user_id, "ACTIVATION_TOKEN_CONSUMED");
        Ok(subject)
    }

    pub fn revoke(&self, token: &str) {
        self.store.revoke(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::RecordingMailer;

    fn service() -> AccountActivationService {
        let cfg = TokenConfig {
            reset_ttl_minutes: 60,
            activation_ttl_minutes: 24 * 60,
            reset_sweep_minutes: 30,
            activation_sweep_minutes: 60,
            consumed_grace_secs: 300,
        };
        let mail = MailConfig {
            from: "noreply@test.local".into(),
            frontend_url: "http://front.test".into(),
            api_url: "http://mail.test".into(),
            api_key: None,
        };
        AccountActivationService::new(&cfg, mail, Arc::new(RecordingMailer::default()))
    }

    #[test]
    fn activation_token_lives_for_a_day() {
        let svc = service();
        let issued = svc.issue("new@example.com", Uuid::new_v4());
        let ttl = issued.expires_at - time::OffsetDateTime::now_utc();
        assert!(ttl > Duration::hours(23) && ttl <= Duration::hours(24));
    }

    #[test]
    fn consume_returns_subject_once() {
        let svc = service();
        let id = Uuid::new_v4();
        let issued = svc.issue("new@example.com", id);
        let subject = svc.consume(&issued.token).unwrap();
        assert_eq!(subject.user_id, id);
        assert_eq!(subject.email, "new@example.com");
        assert_eq!(svc.consume(&issued.token), Err(TokenError::AlreadyUsed));
    }

    #[test]
    fn resend_for_one_user_leaves_others_alone() {
        let svc = service();
        let a = svc.issue("a@example.com", Uuid::new_v4());
        let b_id = Uuid::new_v4();
        let b_old = svc.issue("b@example.com", b_id);
        let b_new = svc.issue("b@example.com", b_id);

        assert!(svc.validate(&a.token).is_ok());
        assert_eq!(svc.validate(&b_old.token), Err(TokenError::NotFound));
        assert!(svc.validate(&b_new.token).is_ok());
    }
}
