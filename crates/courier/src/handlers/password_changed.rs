use std::sync::Arc;

use async_trait::async_trait;
use courier_protocol::{Channel, EventKind, InboundEvent, UserData};
use tracing::{error, info};

use super::HandlerError;
use crate::registry::EventHandler;
use crate::service::{NotificationService, Template};

/// `PASSWORD_CHANGED` → security alert by email, then by SMS.
pub struct PasswordChangedHandler {
    service: Arc<dyn NotificationService>,
}

impl PasswordChangedHandler {
    pub fn new(service: Arc<dyn NotificationService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for PasswordChangedHandler {
    fn event_types(&self) -> &[&'static str] {
        &[EventKind::PASSWORD_CHANGED]
    }

    async fn handle(&self, event: &InboundEvent) -> Result<(), HandlerError> {
        let user: UserData = event.decode_payload().map_err(|e| {
            error!(error = %e, event_id = %event.id, "failed to decode PASSWORD_CHANGED payload");
            HandlerError::decode(EventKind::PASSWORD_CHANGED, e)
        })?;

        for channel in [Channel::Email, Channel::Sms] {
            if let Err(e) = self
                .service
                .send_notification(&user, channel, Template::PASSWORD_CHANGED_ALERT)
                .await
            {
                error!(
                    error = %e,
                    user_id = user.id,
                    channel = %channel,
                    "failed to send password changed alert"
                );
                return Err(e.into());
            }
        }

        info!(user_id = user.id, email = %user.email, "processed PASSWORD_CHANGED");
        Ok(())
    }
}
