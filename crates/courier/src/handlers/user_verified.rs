use std::sync::Arc;

use async_trait::async_trait;
use courier_protocol::{EventKind, InboundEvent, UserData};
use tracing::{error, info};

use super::HandlerError;
use crate::registry::EventHandler;
use crate::service::NotificationService;

/// `USER_VERIFIED` → account verified email.
pub struct UserVerifiedHandler {
    service: Arc<dyn NotificationService>,
}

impl UserVerifiedHandler {
    pub fn new(service: Arc<dyn NotificationService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for UserVerifiedHandler {
    fn event_types(&self) -> &[&'static str] {
        &[EventKind::USER_VERIFIED]
    }

    async fn handle(&self, event: &InboundEvent) -> Result<(), HandlerError> {
        let user: UserData = event.decode_payload().map_err(|e| {
            error!(error = %e, event_id = %event.id, "failed to decode USER_VERIFIED payload");
            HandlerError::decode(EventKind::USER_VERIFIED, e)
        })?;

        if let Err(e) = self.service.on_user_verified(&user).await {
            error!(error = %e, user_id = user.id, email = %user.email, "user service failed for USER_VERIFIED");
            return Err(e.into());
        }

        info!(user_id = user.id, email = %user.email, "processed USER_VERIFIED");
        Ok(())
    }
}
