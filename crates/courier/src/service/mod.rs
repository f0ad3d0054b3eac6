//! Business rules turning decoded user events into notification requests.

use std::sync::Arc;

use async_trait::async_trait;
use courier_protocol::{Channel, UserData};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info};

use crate::publisher::{PublishError, Publisher};

/// Template names understood by the delivery services.
pub struct Template;

impl Template {
    pub const WELCOME: &str = "welcome";
    pub const PASSWORD_RECOVERY: &str = "password_recovery";
    pub const ACCOUNT_VERIFIED: &str = "account_verified";
    pub const PASSWORD_CHANGED_ALERT: &str = "password_changed_alert";
    pub const LOGIN_ALERT: &str = "login_alert";
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Publish(#[from] PublishError),
}

#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Welcome email with the activation link.
    async fn on_user_registered(&self, user: &UserData, url: &str) -> Result<(), ServiceError>;

    /// Generic alert on the given channel.
    async fn send_notification(
        &self,
        user: &UserData,
        channel: Channel,
        template: &str,
    ) -> Result<(), ServiceError>;

    /// Password recovery email carrying the OTP link.
    async fn send_otp_recovery(&self, user: &UserData, url: &str) -> Result<(), ServiceError>;

    /// Account verified confirmation email.
    async fn on_user_verified(&self, user: &UserData) -> Result<(), ServiceError>;
}

/// Default [`NotificationService`], delegating every request to the [`Publisher`].
pub struct UserNotificationService {
    publisher: Arc<Publisher>,
}

impl UserNotificationService {
    pub fn new(publisher: Arc<Publisher>) -> Self {
        Self { publisher }
    }

    async fn publish(
        &self,
        channel: Channel,
        template: &str,
        to: &str,
        user: &UserData,
        data: Map<String, Value>,
    ) -> Result<(), ServiceError> {
        match self.publisher.send_event(channel, template, to, data).await {
            Ok(id) => {
                info!(
                    notification_id = %id,
                    channel = %channel,
                    template = %template,
                    to = %to,
                    user_id = user.id,
                    "notification published"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    error = %e,
                    channel = %channel,
                    template = %template,
                    user_id = user.id,
                    "failed to publish notification"
                );
                Err(e.into())
            }
        }
    }
}

fn contact_data(user: &UserData) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("user_id".into(), Value::from(user.id));
    data.insert("name".into(), Value::from(user.name.clone()));
    data
}

#[async_trait]
impl NotificationService for UserNotificationService {
    async fn on_user_registered(&self, user: &UserData, url: &str) -> Result<(), ServiceError> {
        let mut data = contact_data(user);
        data.insert("phone".into(), Value::from(user.phone.clone()));
        data.insert("url".into(), Value::from(url));

        self.publish(Channel::Email, Template::WELCOME, &user.email, user, data)
            .await
    }

    async fn send_notification(
        &self,
        user: &UserData,
        channel: Channel,
        template: &str,
    ) -> Result<(), ServiceError> {
        let to = channel.recipient(&user.email, &user.phone);
        let mut data = contact_data(user);
        data.insert("phone".into(), Value::from(user.phone.clone()));

        self.publish(channel, template, to, user, data).await
    }

    async fn send_otp_recovery(&self, user: &UserData, url: &str) -> Result<(), ServiceError> {
        let mut data = contact_data(user);
        data.insert("url".into(), Value::from(url));

        self.publish(
            Channel::Email,
            Template::PASSWORD_RECOVERY,
            &user.email,
            user,
            data,
        )
        .await
    }

    async fn on_user_verified(&self, user: &UserData) -> Result<(), ServiceError> {
        let mut data = contact_data(user);
        data.insert("phone".into(), Value::from(user.phone.clone()));

        self.publish(
            Channel::Email,
            Template::ACCOUNT_VERIFIED,
            &user.email,
            user,
            data,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSink;
    use courier_protocol::NotificationEvent;

    fn user() -> UserData {
        UserData {
            id: 42,
            email: "ana@example.com".to_string(),
            name: "Ana".to_string(),
            phone: "+5491100000000".to_string(),
        }
    }

    fn service(sink: Arc<RecordingSink>) -> UserNotificationService {
        UserNotificationService::new(Arc::new(Publisher::new(sink)))
    }

    fn only(sink: &RecordingSink) -> NotificationEvent {
        let sent = sink.events();
        assert_eq!(sent.len(), 1);
        sent.into_iter().next().unwrap()
    }

    #[tokio::test]
    async fn test_welcome_goes_to_email() {
        let sink = Arc::new(RecordingSink::new());
        service(sink.clone())
            .on_user_registered(&user(), "https://example.com/activate")
            .await
            .unwrap();

        let event = only(&sink);
        assert_eq!(event.channel, Channel::Email);
        assert_eq!(event.template, "welcome");
        assert_eq!(event.to, "ana@example.com");
        assert_eq!(event.data["user_id"], 42);
        assert_eq!(event.data["url"], "https://example.com/activate");
        assert_eq!(event.data["phone"], "+5491100000000");
    }

    #[tokio::test]
    async fn test_sms_goes_to_phone() {
        let sink = Arc::new(RecordingSink::new());
        service(sink.clone())
            .send_notification(&user(), Channel::Sms, Template::LOGIN_ALERT)
            .await
            .unwrap();

        let event = only(&sink);
        assert_eq!(event.channel, Channel::Sms);
        assert_eq!(event.template, "login_alert");
        assert_eq!(event.to, "+5491100000000");
        assert!(event.data.get("url").is_none());
    }

    #[tokio::test]
    async fn test_otp_recovery_data_has_no_phone() {
        let sink = Arc::new(RecordingSink::new());
        service(sink.clone())
            .send_otp_recovery(&user(), "https://example.com/recover")
            .await
            .unwrap();

        let event = only(&sink);
        assert_eq!(event.template, "password_recovery");
        assert_eq!(event.to, "ana@example.com");
        assert_eq!(event.data["url"], "https://example.com/recover");
        assert!(event.data.get("phone").is_none());
    }

    #[tokio::test]
    async fn test_verified_template() {
        let sink = Arc::new(RecordingSink::new());
        service(sink.clone()).on_user_verified(&user()).await.unwrap();

        let event = only(&sink);
        assert_eq!(event.template, "account_verified");
        assert_eq!(event.channel, Channel::Email);
    }

    #[tokio::test]
    async fn test_publish_error_propagates() {
        let sink = Arc::new(RecordingSink::new());
        sink.fail_next(1);
        let err = service(sink.clone())
            .on_user_verified(&user())
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::Publish(PublishError::Send(_))));
        assert!(sink.events().is_empty());
    }
}
