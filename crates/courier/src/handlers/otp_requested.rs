use std::sync::Arc;

use async_trait::async_trait;
use courier_protocol::{EventKind, InboundEvent, OtpRequestedData};
use tracing::{error, info};

use super::HandlerError;
use crate::registry::EventHandler;
use crate::service::NotificationService;

/// `OTP_REQUESTED` → password recovery email with the OTP link.
pub struct OtpRequestedHandler {
    service: Arc<dyn NotificationService>,
}

impl OtpRequestedHandler {
    pub fn new(service: Arc<dyn NotificationService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EventHandler for OtpRequestedHandler {
    fn event_types(&self) -> &[&'static str] {
        &[EventKind::OTP_REQUESTED]
    }

    async fn handle(&self, event: &InboundEvent) -> Result<(), HandlerError> {
        let data: OtpRequestedData = event.decode_payload().map_err(|e| {
            error!(error = %e, event_id = %event.id, "failed to decode OTP_REQUESTED payload");
            HandlerError::decode(EventKind::OTP_REQUESTED, e)
        })?;

        if let Err(e) = self.service.send_otp_recovery(&data.user, &data.url).await {
            error!(
                error = %e,
                user_id = data.user.id,
                email = %data.user.email,
                "failed to send password recovery email"
            );
            return Err(e.into());
        }

        info!(
            user_id = data.user.id,
            email = %data.user.email,
            url = %data.url,
            "processed OTP_REQUESTED"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingService, ServiceCall};
    use serde_json::json;

    #[tokio::test]
    async fn test_recovery_link_forwarded() {
        let service = Arc::new(RecordingService::new());
        let event = InboundEvent::new(
            "evt-1",
            EventKind::OTP_REQUESTED,
            json!({"id": 5, "email": "a@b.c", "url-recovery": "https://r/123"}),
        );

        OtpRequestedHandler::new(service.clone())
            .handle(&event)
            .await
            .unwrap();

        assert_eq!(
            service.calls(),
            vec![ServiceCall::OtpRecovery { user_id: 5, url: "https://r/123".to_string() }]
        );
    }
}
