//! Streamer (content source) model.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::StreamerId;

/// Source platform for streams and publish targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Twitch,
    Youtube,
    Kick,
    /// Publish-only target.
    X,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitch => "twitch",
            Platform::Youtube => "youtube",
            Platform::Kick => "kick",
            Platform::X => "x",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of a content source. Owns zero or more streams.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Streamer {
    /// Unique streamer ID
    pub id: StreamerId,

    /// Unique username on the source platform
    pub username: String,

    /// Display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Source platform
    pub platform: Platform,

    /// Platform-native channel/user ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform_id: Option<String>,

    /// Avatar URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,

    /// Last time this streamer's metadata was synced
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Streamer {
    /// Register a new streamer.
    pub fn new(username: impl Into<String>, platform: Platform) -> Self {
        let now = Utc::now();
        Self {
            id: StreamerId::new(),
            username: username.into(),
            display_name: None,
            platform,
            platform_id: None,
            avatar_url: None,
            last_synced_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a metadata sync.
    pub fn touch_sync(&mut self) {
        self.last_synced_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }
}
