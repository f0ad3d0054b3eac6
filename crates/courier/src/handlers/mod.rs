//! One handler per inbound user event kind.
//!
//! A handler decodes its payload first; a payload that does not decode never
//! reaches the notification service. Handlers that notify over several
//! channels do so in order and stop at the first failure.

mod otp_requested;
mod password_changed;
mod user_login;
mod user_registered;
mod user_verified;

use std::sync::Arc;

use thiserror::Error;

pub use otp_requested::OtpRequestedHandler;
pub use password_changed::PasswordChangedHandler;
pub use user_login::UserLoginHandler;
pub use user_registered::UserRegisteredHandler;
pub use user_verified::UserVerifiedHandler;

use crate::registry::{EventHandler, HandlerRegistry};
use crate::service::{NotificationService, ServiceError};

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid {kind} payload: {source}")]
    Decode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl HandlerError {
    pub fn decode(kind: &'static str, source: serde_json::Error) -> Self {
        Self::Decode { kind, source }
    }
}

/// Register every built-in handler, in the order events were introduced.
pub fn register_defaults(registry: &mut HandlerRegistry, service: Arc<dyn NotificationService>) {
    let handlers: Vec<Arc<dyn EventHandler>> = vec![
        Arc::new(UserRegisteredHandler::new(service.clone())),
        Arc::new(PasswordChangedHandler::new(service.clone())),
        Arc::new(OtpRequestedHandler::new(service.clone())),
        Arc::new(UserLoginHandler::new(service.clone())),
        Arc::new(UserVerifiedHandler::new(service)),
    ];

    for handler in handlers {
        registry.register(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingService;
    use courier_protocol::EventKind;

    #[test]
    fn test_defaults_cover_every_kind_once() {
        let mut registry = HandlerRegistry::new();
        register_defaults(&mut registry, Arc::new(RecordingService::new()));

        for kind in [
            EventKind::USER_REGISTERED,
            EventKind::PASSWORD_CHANGED,
            EventKind::OTP_REQUESTED,
            EventKind::USER_LOGIN,
            EventKind::USER_VERIFIED,
        ] {
            assert_eq!(registry.handlers_for(kind).unwrap().len(), 1, "{kind}");
        }
        assert_eq!(registry.kinds().len(), 5);
    }
}
