//! Domain events produced from MESSAGE envelopes.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Domain level category of a topic
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    /// `channel-bits-events`
    BitsDonated,
    /// `channel-bits-badge-unlocks`
    BitsBadgeUnlocked,
    /// `channel-points-channel`
    RewardRedeemed,
    /// `channel-subscribe-events`
    SubscriptionReceived,
    /// `chat_moderator_actions`
    ModeratorActionSent,
    /// `whispers`
    WhisperReceived,
}

impl EventKind {
    /// All kinds in declaration order
    pub const ALL: [EventKind; 6] = [
        Self::BitsDonated,
        Self::BitsBadgeUnlocked,
        Self::RewardRedeemed,
        Self::SubscriptionReceived,
        Self::ModeratorActionSent,
        Self::WhisperReceived,
    ];

    /// Resolve the event kind of a topic such as `channel-bits-events-v2.44322889`.
    ///
    /// Only the part before the first `.` matters, with a trailing `-v<digits>` removed.
    /// Unknown topics resolve to `None`.
    pub fn from_topic(topic: &str) -> Option<Self> {
        let prefix = topic.split('.').next().unwrap_or(topic);
        Self::from_prefix(strip_version(prefix))
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "channel-bits-events" => Some(Self::BitsDonated),
            "channel-bits-badge-unlocks" => Some(Self::BitsBadgeUnlocked),
            "channel-points-channel" => Some(Self::RewardRedeemed),
            "channel-subscribe-events" => Some(Self::SubscriptionReceived),
            "chat_moderator_actions" => Some(Self::ModeratorActionSent),
            "whispers" => Some(Self::WhisperReceived),
            _ => None,
        }
    }

    /// kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BitsDonated => "BitsDonated",
            Self::BitsBadgeUnlocked => "BitsBadgeUnlocked",
            Self::RewardRedeemed => "RewardRedeemed",
            Self::SubscriptionReceived => "SubscriptionReceived",
            Self::ModeratorActionSent => "ModeratorActionSent",
            Self::WhisperReceived => "WhisperReceived",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn strip_version(prefix: &str) -> &str {
    let digits = prefix.len() - prefix.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return prefix;
    }
    prefix[..prefix.len() - digits]
        .strip_suffix("-v")
        .unwrap_or(prefix)
}

/// Typed event handed to the dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// event kind resolved from topic
    pub kind: EventKind,
    /// full topic, e.g. `whispers.44322889`
    pub topic: String,
    /// decoded inner message
    pub data: Value,
}
