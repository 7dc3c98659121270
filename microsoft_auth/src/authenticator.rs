use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::chain::IdentityChainExchanger;
use crate::device_code::DeviceCodeRequester;
use crate::entitlement::EntitlementChecker;
use crate::errors::{AuthError, AuthResult, BoxError, HttpError, HttpResult};
use crate::models::{Account, MicrosoftTokens};
use crate::poller::TokenPoller;
use crate::profile::ProfileFetcher;
use crate::settings::AuthSettings;
use crate::transport::{HttpTransport, ReqwestTransport};

const STATE_BUFFER: usize = 8;

/// One step of a device-code login, in emission order.
#[derive(Debug)]
pub enum FlowState {
    Start,
    /// The user has to enter `user_code` at `verification_uri`.
    AwaitUser {
        user_code: String,
        verification_uri: String,
    },
    Polling,
    GetAccountInfo,
    Succeeded(Box<Account>),
    Failed(AuthError),
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::Succeeded(_) | FlowState::Failed(_))
    }
}

/// Side effect run when the user code is ready.
pub trait UrlOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<(), BoxError>;
}

pub struct SystemBrowser;

impl UrlOpener for SystemBrowser {
    fn open(&self, url: &str) -> Result<(), BoxError> {
        webbrowser::open(url)?;
        Ok(())
    }
}

/// Leaves opening the link to the user, for headless sessions.
pub struct NoBrowser;

impl UrlOpener for NoBrowser {
    fn open(&self, _url: &str) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Entry point for signing a Microsoft account into Minecraft.
#[derive(Clone)]
pub struct MicrosoftAuthenticator {
    requester: DeviceCodeRequester,
    poller: TokenPoller,
    chain: IdentityChainExchanger,
    entitlements: EntitlementChecker,
    profiles: ProfileFetcher,
    opener: Arc<dyn UrlOpener>,
}

impl MicrosoftAuthenticator {
    pub fn new(settings: &AuthSettings, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            requester: DeviceCodeRequester::new(transport.clone(), settings),
            poller: TokenPoller::new(transport.clone(), settings),
            chain: IdentityChainExchanger::new(transport.clone(), settings),
            entitlements: EntitlementChecker::new(transport.clone(), settings),
            profiles: ProfileFetcher::new(transport, settings),
            opener: Arc::new(SystemBrowser),
        }
    }

    pub fn with_reqwest(settings: &AuthSettings, timeout: Duration) -> HttpResult<Self> {
        let transport = ReqwestTransport::new(timeout)?;
        Ok(Self::new(settings, Arc::new(transport)))
    }

    pub fn with_url_opener(mut self, opener: Arc<dyn UrlOpener>) -> Self {
        self.opener = opener;
        self
    }

    /// Starts a fresh login and returns its state stream.
    ///
    /// Must be called inside a tokio runtime. Dropping the returned
    /// [`LoginFlow`] cancels the login wherever it is waiting.
    pub fn start(&self) -> LoginFlow {
        let (tx, rx) = mpsc::channel(STATE_BUFFER);
        let cancel = CancellationToken::new();

        let this = self.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move { this.run(tx, task_cancel).await });

        LoginFlow {
            states: rx,
            cancel: cancel.clone(),
            _guard: cancel.drop_guard(),
        }
    }

    /// Turns granted Microsoft tokens into an entitled account: the three
    /// token hops, the entitlement check, then the profile.
    pub async fn account_info(
        &self,
        tokens: MicrosoftTokens,
        cancel: &CancellationToken,
    ) -> AuthResult<Account> {
        let minecraft = self.chain.exchange(&tokens.access_token, cancel).await?;

        if !self.entitlements.has_game(&minecraft, cancel).await? {
            tracing::info!("account does not own the game");
            return Err(AuthError::NotEntitled);
        }

        let profile = self
            .profiles
            .get_profile(&minecraft, cancel)
            .await
            .map_err(|err| match err {
                HttpError::Status { status: 404, .. } => AuthError::ProfileNotCreated,
                other => other.into(),
            })?;

        Ok(Account::new(tokens, minecraft, profile))
    }

    async fn run(self, tx: mpsc::Sender<FlowState>, cancel: CancellationToken) {
        let terminal = match self.drive(&tx, &cancel).await {
            Ok(account) => {
                tracing::info!(username = account.username(), "login succeeded");
                FlowState::Succeeded(Box::new(account))
            }
            Err(err) => {
                tracing::info!(error = %err, "login failed");
                FlowState::Failed(err)
            }
        };
        let _ = tx.send(terminal).await;
    }

    async fn drive(
        &self,
        tx: &mpsc::Sender<FlowState>,
        cancel: &CancellationToken,
    ) -> AuthResult<Account> {
        emit(tx, FlowState::Start).await;
        let device = self.requester.request_device_code(cancel).await?;

        emit(
            tx,
            FlowState::AwaitUser {
                user_code: device.user_code.clone(),
                verification_uri: device.verification_uri.clone(),
            },
        )
        .await;
        if let Err(err) = self.opener.open(&device.verification_uri) {
            tracing::warn!(error = %err, "failed to open the verification page");
        }

        emit(tx, FlowState::Polling).await;
        let tokens = self
            .poller
            .poll_for_token(&device.device_code, device.interval, cancel)
            .await?;

        emit(tx, FlowState::GetAccountInfo).await;
        self.account_info(tokens, cancel).await
    }
}

async fn emit(tx: &mpsc::Sender<FlowState>, state: FlowState) {
    tracing::info!(?state, "login state");
    // A closed channel means the subscriber is gone; its drop guard has
    // already cancelled the flow.
    let _ = tx.send(state).await;
}

/// States of one running login. Ends after the terminal state.
pub struct LoginFlow {
    states: mpsc::Receiver<FlowState>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl LoginFlow {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this flow; hand it to whatever should be able to
    /// abort the login (a Ctrl-C handler, a UI button).
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Stream for LoginFlow {
    type Item = FlowState;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<FlowState>> {
        self.states.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::StreamExt;
    use serde_json::{Value, json};

    use super::*;
    use crate::errors::XboxDenial;
    use crate::models::TextureState;
    use crate::settings::Endpoints;
    use crate::transport::fake::ScriptedTransport;

    #[derive(Default)]
    struct RecordingOpener {
        urls: Mutex<Vec<String>>,
    }

    impl UrlOpener for RecordingOpener {
        fn open(&self, url: &str) -> Result<(), BoxError> {
            self.urls.lock().unwrap().push(url.to_string());
            Ok(())
        }
    }

    struct FailingOpener;

    impl UrlOpener for FailingOpener {
        fn open(&self, _url: &str) -> Result<(), BoxError> {
            Err("no display".into())
        }
    }

    struct Harness {
        authenticator: MicrosoftAuthenticator,
        transport: Arc<ScriptedTransport>,
        opener: Arc<RecordingOpener>,
        endpoints: Endpoints,
    }

    fn harness() -> Harness {
        let settings = AuthSettings::new("client-123");
        let transport = Arc::new(ScriptedTransport::default());
        let opener = Arc::new(RecordingOpener::default());
        let authenticator = MicrosoftAuthenticator::new(&settings, transport.clone())
            .with_url_opener(opener.clone());
        Harness {
            authenticator,
            transport,
            opener,
            endpoints: settings.endpoints,
        }
    }

    fn device_code() -> Value {
        json!({
            "device_code": "DEV",
            "user_code": "ABCD-EFGH",
            "verification_uri": "https://www.microsoft.com/link",
            "expires_in": 900,
            "interval": 5
        })
    }

    fn profile() -> Value {
        json!({
            "id": "069a79f444e94726a5befca90e38aaf5",
            "name": "Notch",
            "skins": [{
                "id": "6a6e65e5-76dd-4c3c-a625-162924514568",
                "state": "ACTIVE",
                "url": "http://textures.minecraft.net/texture/abc",
                "variant": "CLASSIC"
            }],
            "capes": [{
                "id": "1981aad3-73ce-4e3a-b4b4-b4e0d8c9b1a1",
                "state": "INACTIVE",
                "url": "http://textures.minecraft.net/texture/def",
                "alias": "Migrator"
            }]
        })
    }

    impl Harness {
        fn script_until_polling(&self) {
            self.transport
                .respond(&self.endpoints.device_code, 200, device_code());
        }

        fn script_token_and_chain(&self) {
            self.transport
                .respond(
                    &self.endpoints.token,
                    200,
                    json!({"access_token": "ms-access", "refresh_token": "ms-refresh", "expires_in": 3600}),
                )
                .respond(
                    &self.endpoints.xbox_live,
                    200,
                    json!({"Token": "T1", "DisplayClaims": {"xui": [{"uhs": "abc"}]}}),
                )
                .respond(&self.endpoints.xsts, 200, json!({"Token": "T2"}))
                .respond(
                    &self.endpoints.minecraft_login,
                    200,
                    json!({"access_token": "mc-token", "expires_in": 86400}),
                );
        }

        fn script_entitlement(&self, signature: &str) {
            self.transport.respond(
                &self.endpoints.entitlements,
                200,
                json!({"items": [{"name": "game_minecraft", "signature": signature}]}),
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn happy_path_emits_every_state_in_order() {
        let h = harness();
        h.script_until_polling();
        h.transport.respond(
            &h.endpoints.token,
            400,
            json!({"error": "authorization_pending"}),
        );
        h.script_token_and_chain();
        h.script_entitlement("eyJh");
        h.transport.respond(&h.endpoints.profile, 200, profile());

        let states: Vec<FlowState> = h.authenticator.start().collect().await;

        assert_eq!(states.len(), 5);
        assert!(matches!(states[0], FlowState::Start));
        assert!(matches!(
            &states[1],
            FlowState::AwaitUser { user_code, verification_uri }
                if user_code == "ABCD-EFGH" && verification_uri == "https://www.microsoft.com/link"
        ));
        assert!(matches!(states[2], FlowState::Polling));
        assert!(matches!(states[3], FlowState::GetAccountInfo));

        let FlowState::Succeeded(account) = &states[4] else {
            panic!("expected success, got {:?}", states[4]);
        };
        assert_eq!(account.username(), "Notch");
        assert_eq!(
            account.uuid().to_string(),
            "069a79f4-44e9-4726-a5be-fca90e38aaf5"
        );
        assert_eq!(account.oauth_token().access_token, "ms-access");
        assert_eq!(account.minecraft_token().access_token, "mc-token");
        assert_eq!(account.skins()[0].state, TextureState::Active);
        assert_eq!(account.capes()[0].state, TextureState::Inactive);

        assert_eq!(h.transport.requests_to(&h.endpoints.token).len(), 2);
        assert_eq!(
            *h.opener.urls.lock().unwrap(),
            vec!["https://www.microsoft.com/link".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn not_owning_the_game_skips_the_profile() {
        let h = harness();
        h.script_until_polling();
        h.script_token_and_chain();
        h.script_entitlement("");
        h.transport.respond(&h.endpoints.profile, 200, profile());

        let states: Vec<FlowState> = h.authenticator.start().collect().await;

        assert!(matches!(states[3], FlowState::GetAccountInfo));
        assert!(matches!(
            states.last(),
            Some(FlowState::Failed(AuthError::NotEntitled))
        ));
        assert!(h.transport.requests_to(&h.endpoints.profile).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn declined_login_stops_after_polling() {
        let h = harness();
        h.script_until_polling();
        h.transport.respond(
            &h.endpoints.token,
            400,
            json!({"error": "authorization_declined"}),
        );

        let states: Vec<FlowState> = h.authenticator.start().collect().await;

        assert_eq!(states.len(), 4);
        assert!(matches!(states[2], FlowState::Polling));
        assert!(matches!(states[3], FlowState::Failed(AuthError::Declined)));
        assert!(h.transport.requests_to(&h.endpoints.xbox_live).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn bad_verification_code_has_its_own_outcome() {
        let h = harness();
        h.script_until_polling();
        h.transport.respond(
            &h.endpoints.token,
            400,
            json!({"error": "bad_verification_code"}),
        );

        let states: Vec<FlowState> = h.authenticator.start().collect().await;

        assert!(matches!(
            states.last(),
            Some(FlowState::Failed(AuthError::BadVerificationCode))
        ));
    }

    #[tokio::test]
    async fn device_code_failure_ends_right_after_start() {
        let h = harness();
        h.transport.fail(&h.endpoints.device_code, "offline");

        let states: Vec<FlowState> = h.authenticator.start().collect().await;

        assert_eq!(states.len(), 2);
        assert!(matches!(states[0], FlowState::Start));
        assert!(matches!(states[1], FlowState::Failed(AuthError::Network(_))));
        assert!(h.opener.urls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn missing_profile_is_reported_separately() {
        let h = harness();
        h.script_until_polling();
        h.script_token_and_chain();
        h.script_entitlement("eyJh");
        h.transport
            .respond(&h.endpoints.profile, 404, json!({"error": "NOT_FOUND"}));

        let states: Vec<FlowState> = h.authenticator.start().collect().await;

        assert!(matches!(
            states.last(),
            Some(FlowState::Failed(AuthError::ProfileNotCreated))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn xsts_refusal_reaches_the_subscriber() {
        let h = harness();
        h.script_until_polling();
        h.transport
            .respond(&h.endpoints.token, 200, json!({"access_token": "ms-access"}))
            .respond(
                &h.endpoints.xbox_live,
                200,
                json!({"Token": "T1", "DisplayClaims": {"xui": [{"uhs": "abc"}]}}),
            )
            .respond(&h.endpoints.xsts, 401, json!({"XErr": 2148916238u64}));

        let states: Vec<FlowState> = h.authenticator.start().collect().await;

        assert!(matches!(
            states.last(),
            Some(FlowState::Failed(AuthError::XboxDenied(XboxDenial::ChildAccount)))
        ));
        assert!(h.transport.requests_to(&h.endpoints.minecraft_login).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_while_polling_ends_with_cancelled() {
        let h = harness();
        h.script_until_polling();
        h.transport.respond(
            &h.endpoints.token,
            400,
            json!({"error": "authorization_pending"}),
        );

        let mut flow = h.authenticator.start();
        assert!(matches!(flow.next().await, Some(FlowState::Start)));
        assert!(matches!(flow.next().await, Some(FlowState::AwaitUser { .. })));
        assert!(matches!(flow.next().await, Some(FlowState::Polling)));

        tokio::time::sleep(Duration::from_secs(7)).await;
        let polls_before_cancel = h.transport.requests_to(&h.endpoints.token).len();
        flow.cancel();

        assert!(matches!(
            flow.next().await,
            Some(FlowState::Failed(AuthError::Cancelled))
        ));
        assert!(flow.next().await.is_none());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(polls_before_cancel, 1);
        assert_eq!(h.transport.requests_to(&h.endpoints.token).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_flow_stops_polling() {
        let h = harness();
        h.script_until_polling();
        h.transport.respond(
            &h.endpoints.token,
            400,
            json!({"error": "authorization_pending"}),
        );

        let mut flow = h.authenticator.start();
        while let Some(state) = flow.next().await {
            if matches!(state, FlowState::Polling) {
                break;
            }
        }
        drop(flow);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(h.transport.requests_to(&h.endpoints.token).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn browser_failure_does_not_fail_the_flow() {
        let h = harness();
        h.script_until_polling();
        h.transport
            .respond(&h.endpoints.token, 400, json!({"error": "expired_token"}));
        let authenticator = h.authenticator.with_url_opener(Arc::new(FailingOpener));

        let states: Vec<FlowState> = authenticator.start().collect().await;

        assert_eq!(states.len(), 4);
        assert!(matches!(states[2], FlowState::Polling));
        assert!(matches!(states[3], FlowState::Failed(AuthError::Expired)));
    }

    #[test]
    fn only_success_and_failure_are_terminal() {
        assert!(!FlowState::Start.is_terminal());
        assert!(!FlowState::Polling.is_terminal());
        assert!(!FlowState::GetAccountInfo.is_terminal());
        assert!(FlowState::Failed(AuthError::Cancelled).is_terminal());
    }
}
