//! Outbound notification requests consumed by the delivery services.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Delivery channel of a notification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Channel {
    Email,
    Sms,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "EMAIL",
            Channel::Sms => "SMS",
        }
    }

    /// Pick the address this channel delivers to.
    pub fn recipient<'a>(&self, email: &'a str, phone: &'a str) -> &'a str {
        match self {
            Channel::Email => email,
            Channel::Sms => phone,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope written to the notifications topic.
///
/// `id` is minted per publish and carries no link to the inbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub channel: Channel,
    pub template: String,
    pub to: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}
