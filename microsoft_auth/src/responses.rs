use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct DeviceCodeResponse {
    pub(crate) device_code: String,
    pub(crate) user_code: String,
    pub(crate) verification_uri: String,
    #[serde(default = "default_interval")]
    pub(crate) interval: u64,
    #[serde(default)]
    pub(crate) expires_in: u64,
    #[serde(default)]
    pub(crate) message: Option<String>,
}

fn default_interval() -> u64 {
    5
}

/// Body of a token poll; Microsoft answers pending polls with HTTP 400 and an
/// `error` member, so both shapes share one struct.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenPollResponse {
    #[serde(default)]
    pub(crate) access_token: Option<String>,
    #[serde(default)]
    pub(crate) refresh_token: Option<String>,
    #[serde(default)]
    pub(crate) expires_in: Option<u64>,
    #[serde(default)]
    pub(crate) error: Option<String>,
    #[serde(default)]
    pub(crate) error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct XboxAuthResponse {
    #[serde(rename = "Token")]
    pub(crate) token: String,
    #[serde(rename = "DisplayClaims", default)]
    pub(crate) display_claims: XboxDisplayClaims,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct XboxDisplayClaims {
    #[serde(default)]
    pub(crate) xui: Vec<XboxUserHash>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct XboxUserHash {
    pub(crate) uhs: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct XboxErrorResponse {
    #[serde(rename = "XErr")]
    pub(crate) x_err: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MinecraftLoginResponse {
    pub(crate) access_token: String,
    #[serde(default = "default_minecraft_expiry")]
    pub(crate) expires_in: u64,
}

fn default_minecraft_expiry() -> u64 {
    86400
}

#[derive(Debug, Deserialize)]
pub(crate) struct EntitlementsResponse {
    #[serde(default)]
    pub(crate) items: Vec<EntitlementItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EntitlementItem {
    #[serde(default)]
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) signature: Option<String>,
}
