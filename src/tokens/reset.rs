use std::sync::Arc;

use time::Duration;
use tracing::info;
use uuid::Uuid;

use super::{IssuedToken, TokenError, TokenStore};
use crate::{
    config::{MailConfig, TokenConfig},
    mail::{self, DeliveryError, Mailer},
};

/// Who a reset token was issued to. The id is authoritative; the email is
/// the address the link went to and may since have changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetSubject {
    pub email: String,
    pub user_id: Uuid,
}

/// Password-reset tokens for existing accounts.
#[derive(Clone)]
pub struct PasswordResetService {
    store: TokenStore<ResetSubject>,
    mailer: Arc<dyn Mailer>,
    mail: MailConfig,
}

impl PasswordResetService {
    pub fn new(cfg: &TokenConfig, mail: MailConfig, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            store: TokenStore::new(
                Duration::minutes(cfg.reset_ttl_minutes),
                Duration::seconds(cfg.consumed_grace_secs),
            ),
            mailer,
            mail,
        }
    }

    pub fn store(&self) -> &TokenStore<ResetSubject> {
        &self.store
    }

    /// Issue a reset token for the account, replacing any outstanding ones.
    pub fn issue(&self, email: &str, user_id: Uuid) -> IssuedToken {
        let issued = self.store.reissue(ResetSubject {
            email: email.to_string(),
            user_id,
        });
        info!(email, %user_id, expires_at = %issued.expires_at, "PASSWORD_RESET_TOKEN_GENERATED");
        issued
    }

    pub async fn deliver(&self, email: &str, issued: &IssuedToken) -> Result<(), DeliveryError> {
        let msg = mail::reset_email(
            &self.mail,
            email,
            &issued.token,
            self.store.ttl().whole_minutes(),
        );
        self.mailer.send(&msg).await
    }

    pub fn validate(&self, token: &str) -> Result<ResetSubject, TokenError> {
        self.store.validate(token)
    }

    pub fn consume(&self, token: &str) -> Result<ResetSubject, TokenError> {
        let subject = self.store.consume(token)?;
        info!(email = %subject.email, user_id = %subject.user_id, "PASSWORD_RESET_TOKEN_CONSUMED");
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

    fn alice() -> Uuid {
        Uuid::from_u128(7)
    }

    fn service(mailer: Arc<RecordingMailer>) -> PasswordResetService {
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
        PasswordResetService::new(&cfg, mail, mailer)
    }

    #[tokio::test]
    async fn issued_token_expires_in_an_hour_and_is_emailed() {
        let mailer = Arc::new(RecordingMailer::default());
        let svc = service(mailer.clone());
        let issued = svc.issue("test@example.com", alice());

        let ttl = issued.expires_at - time::OffsetDateTime::now_utc();
        assert!(ttl <= Duration::hours(1) && ttl > Duration::minutes(59));

        svc.deliver("test@example.com", &issued).await.unwrap();
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].html.contains(&issued.token));
    }

    #[test]
    fn consume_then_validate_reports_already_used() {
        let svc = service(Arc::new(RecordingMailer::default()));
        let issued = svc.issue("test@example.com", alice());
        assert_eq!(svc.validate(&issued.token).unwrap().user_id, alice());
        let subject = svc.consume(&issued.token).unwrap();
        assert_eq!(subject.email, "test@example.com");
        assert_eq!(subject.user_id, alice());
        assert_eq!(svc.validate(&issued.token), Err(TokenError::AlreadyUsed));
    }

    #[test]
    fn reissue_replaces_previous_request() {
        let svc = service(Arc::new(RecordingMailer::default()));
        let first = svc.issue("test@example.com", alice());
        let other = svc.issue("bob@example.com", Uuid::from_u128(8));
        let second = svc.issue("test@example.com", alice());
        assert_eq!(svc.consume(&first.token), Err(TokenError::NotFound));
        assert!(svc.consume(&second.token).is_ok());
        assert!(svc.consume(&other.token).is_ok());
    }
}
