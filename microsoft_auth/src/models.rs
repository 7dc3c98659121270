use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCodeInfo {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    /// Seconds the server asks clients to wait between token polls.
    pub interval: u64,
    pub expires_in: u64,
    pub message: Option<String>,
}

/// Tokens granted by the Microsoft identity platform once the user approved
/// the device code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicrosoftTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XboxToken {
    pub token: String,
    pub user_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XstsToken {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinecraftToken {
    pub access_token: String,
    pub expires_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TextureState {
    Active,
    Inactive,
}

#[derive(Debug, Error)]
#[error("unknown texture state {0:?}")]
pub struct UnknownTextureState(pub String);

impl TextureState {
    pub fn as_str(self) -> &'static str {
        match self {
            TextureState::Active => "ACTIVE",
            TextureState::Inactive => "INACTIVE",
        }
    }
}

impl FromStr for TextureState {
    type Err = UnknownTextureState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(TextureState::Active),
            "INACTIVE" => Ok(TextureState::Inactive),
            other => Err(UnknownTextureState(other.to_string())),
        }
    }
}

impl fmt::Display for TextureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Skin {
    pub id: String,
    pub state: TextureState,
    pub url: String,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub texture_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cape {
    pub id: String,
    pub state: TextureState,
    pub url: String,
    #[serde(default)]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    #[serde(rename = "id")]
    pub uuid: Uuid,
    #[serde(rename = "name")]
    pub username: String,
    #[serde(default)]
    pub skins: Vec<Skin>,
    #[serde(default)]
    pub capes: Vec<Cape>,
}

impl PlayerProfile {
    pub fn active_skin(&self) -> Option<&Skin> {
        self.skins.iter().find(|s| s.state == TextureState::Active)
    }

    pub fn active_cape(&self) -> Option<&Cape> {
        self.capes.iter().find(|c| c.state == TextureState::Active)
    }
}

/// A signed-in, entitled Minecraft account.
///
/// Only a completed login flow builds one from scratch; a credential store
/// can persist it and load it back through serde.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    uuid: Uuid,
    username: String,
    oauth_token: MicrosoftTokens,
    minecraft_token: MinecraftToken,
    skins: Vec<Skin>,
    capes: Vec<Cape>,
}

impl Account {
    pub(crate) fn new(
        oauth_token: MicrosoftTokens,
        minecraft_token: MinecraftToken,
        profile: PlayerProfile,
    ) -> Self {
        Self {
            uuid: profile.uuid,
            username: profile.username,
            oauth_token,
            minecraft_token,
            skins: profile.skins,
            capes: profile.capes,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn oauth_token(&self) -> &MicrosoftTokens {
        &self.oauth_token
    }

    pub fn minecraft_token(&self) -> &MinecraftToken {
        &self.minecraft_token
    }

    pub fn skins(&self) -> &[Skin] {
        &self.skins
    }

    pub fn active_skin(&self) -> Option<&Skin> {
        self.skins.iter().find(|s| s.state == TextureState::Active)
    }

    pub fn capes(&self) -> &[Cape] {
        &self.capes
    }

    pub fn active_cape(&self) -> Option<&Cape> {
        self.capes.iter().find(|c| c.state == TextureState::Active)
    }
}

pub(crate) fn unix_timestamp_after(duration: Duration) -> u64 {
    SystemTime::now()
        .checked_add(duration)
        .unwrap_or(SystemTime::now())
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
