//! Shared wire definitions for courier and the services that talk to it.
//!
//! Upstream services publish [`InboundEvent`] envelopes to the user-events topic;
//! courier answers with [`NotificationEvent`] envelopes on the notifications topic.

pub mod events;
pub mod notification;

pub use events::{EventKind, InboundEvent, OtpRequestedData, UserData, UserRegisteredData};
pub use notification::{Channel, NotificationEvent};
