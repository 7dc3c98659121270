use serde::{Deserialize, Serialize};

pub const DEFAULT_SCOPE: &str = "XboxLive.signin offline_access";

/// URLs of every service the login flow talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub device_code: String,
    pub token: String,
    pub xbox_live: String,
    pub xsts: String,
    pub minecraft_login: String,
    pub entitlements: String,
    pub profile: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            device_code: "https://login.microsoftonline.com/consumers/oauth2/v2.0/devicecode"
                .to_string(),
            token: "https://login.microsoftonline.com/consumers/oauth2/v2.0/token".to_string(),
            xbox_live: "https://user.auth.xboxlive.com/user/authenticate".to_string(),
            xsts: "https://xsts.auth.xboxlive.com/xsts/authorize".to_string(),
            minecraft_login: "https://api.minecraftservices.com/authentication/login_with_xbox"
                .to_string(),
            entitlements: "https://api.minecraftservices.com/entitlements/mcstore".to_string(),
            profile: "https://api.minecraftservices.com/minecraft/profile".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSettings {
    pub client_id: String,
    pub scope: String,
    pub endpoints: Endpoints,
}

impl AuthSettings {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            scope: DEFAULT_SCOPE.to_string(),
            endpoints: Endpoints::default(),
        }
    }
}
