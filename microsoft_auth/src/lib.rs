//! Microsoft device-code sign-in for Minecraft: device code, token polling,
//! Xbox Live / XSTS / Minecraft token exchange, entitlement check and profile
//! lookup, driven as one cancellable stream of [`FlowState`]s.

mod authenticator;
mod chain;
mod device_code;
mod entitlement;
mod errors;
mod models;
mod poller;
mod profile;
mod responses;
mod settings;
mod transport;

pub use authenticator::{
    FlowState, LoginFlow, MicrosoftAuthenticator, NoBrowser, SystemBrowser, UrlOpener,
};
pub use chain::IdentityChainExchanger;
pub use device_code::DeviceCodeRequester;
pub use entitlement::EntitlementChecker;
pub use errors::{
    AuthError, AuthResult, BoxError, HttpError, HttpResult, PollError, PollResult, XboxDenial,
};
pub use models::{
    Account, Cape, DeviceCodeInfo, MicrosoftTokens, MinecraftToken, PlayerProfile, Skin,
    TextureState, UnknownTextureState, XboxToken, XstsToken,
};
pub use poller::{MAX_POLL_INTERVAL_SECS, TokenPoller};
pub use profile::ProfileFetcher;
pub use settings::{AuthSettings, DEFAULT_SCOPE, Endpoints};
pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, Method, RequestBody, ReqwestTransport,
};
pub use tokio_util::sync::CancellationToken;
