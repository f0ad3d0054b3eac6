use std::sync::Arc;

use async_trait::async_trait;
use courier_protocol::{Channel, EventKind, InboundEvent, UserData};
use tracing::{error, info};

use super::HandlerError;
use crate::registry::EventHandler;
use crate::service::{NotificationService, Template};

/// `USER_LOGIN` → login alert by email, then by SMS.
pub struct UserLoginHandler {
    service: Arc<dyn NotificationService>,
}

impl UserLoginHandler {
    pub fn new(service: Arc<dyn NotificationService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for UserLoginHandler {
    fn event_types(&self) -> &[&'static str] {
        &[EventKind::USER_LOGIN]
    }

    async fn handle(&self, event: &InboundEvent) -> Result<(), HandlerError> {
        let user: UserData = event
            .decode_payload()
            .map_err(|e| HandlerError::decode(EventKind::USER_LOGIN, e))?;

        self.service
            .send_notification(&user, Channel::Email, Template::LOGIN_ALERT)
            .await
            .map_err(|e| {
                error!(error = %e, user_id = user.id, "failed to send login email notification");
                e
            })?;

        self.service
            .send_notification(&user, Channel::Sms, Template::LOGIN_ALERT)
            .await
            .map_err(|e| {
                error!(error = %e, user_id = user.id, "failed to send login sms notification");
                e
            })?;

        info!(
            user_id = user.id,
            email = %user.email,
            phone = %user.phone,
            "processed USER_LOGIN"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingService, ServiceCall};
    use serde_json::json;

    fn event() -> InboundEvent {
        InboundEvent::new(
            "evt-1",
            EventKind::USER_LOGIN,
            json!({"id": 3, "email": "a@b.c", "name": "A", "phone": "+1"}),
        )
    }

    #[tokio::test]
    async fn test_email_failure_skips_sms() {
        let service = Arc::new(RecordingService::new());
        service.fail_on(Channel::Email);

        let result = UserLoginHandler::new(service.clone()).handle(&event()).await;

        assert!(matches!(result, Err(HandlerError::Service(_))));
        assert_eq!(
            service.calls(),
            vec![ServiceCall::Notification {
                user_id: 3,
                channel: Channel::Email,
                template: "login_alert".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_both_channels_on_success() {
        let service = Arc::new(RecordingService::new());
        UserLoginHandler::new(service.clone())
            .handle(&event())
            .await
            .unwrap();

        let channels: Vec<Channel> = service
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                ServiceCall::Notification { channel, .. } => Some(channel),
                _ => None,
            })
            .collect();
        assert_eq!(channels, vec![Channel::Email, Channel::Sms]);
    }
}
