use std::sync::Arc;

use async_trait::async_trait;
use courier_protocol::{EventKind, InboundEvent, UserRegisteredData};
use tracing::{error, info};

use super::HandlerError;
use crate::registry::EventHandler;
use crate::service::NotificationService;

/// `USER_REGISTERED` → welcome email.
pub struct UserRegisteredHandler {
    service: Arc<dyn NotificationService>,
}

impl UserRegisteredHandler {
    pub fn new(service: Arc<dyn NotificationService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for UserRegisteredHandler {
    fn event_types(&self) -> &[&'static str] {
        &[EventKind::USER_REGISTERED]
    }

    async fn handle(&self, event: &InboundEvent) -> Result<(), HandlerError> {
        let data: UserRegisteredData = event
            .decode_payload()
            .map_err(|e| HandlerError::decode(EventKind::USER_REGISTERED, e))?;

        if let Err(e) = self.service.on_user_registered(&data.user, &data.url).await {
            error!(error = %e, user_id = data.user.id, "user service failed for USER_REGISTERED");
            return Err(e.into());
        }

        info!(
            user_id = data.user.id,
            email = %data.user.email,
            url = %data.url,
            "processed USER_REGISTERED"
        );
        Ok(())
    }
}
