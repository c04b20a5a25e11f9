//! Credential lifecycle: load, validate, refresh or re-authorize, use.
//!
//! This is the only layer that turns errors into decisions. An
//! `invalid_grant`/`invalid_token` refresh answer starts a new device
//! flow; anything else is reported to the caller.

use std::future::Future;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::auth::cancel::FlowCancel;
use crate::auth::error::{ExchangeError, PollError};
use crate::auth::poller::Poller;
use crate::auth::server::AuthServer;
use crate::auth::tokens::open_browser;
use crate::error::{AuthgateError, Result};
use crate::store::{CredentialRecord, CredentialStore, StoreError};
use crate::ui::{FlowObserver, TokenSummary};

/// Coordinates the token store, the authorization server and the poller
/// for one client identity.
pub struct FlowOrchestrator<S, C> {
    server: S,
    store: Arc<C>,
    observer: Arc<dyn FlowObserver>,
    client_id: String,
    launch_browser: bool,
}

impl<S, C> FlowOrchestrator<S, C>
where
    S: AuthServer,
    C: CredentialStore + 'static,
{
    pub fn new(
        server: S,
        store: Arc<C>,
        observer: Arc<dyn FlowObserver>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            server,
            store,
            observer,
            client_id: client_id.into(),
            launch_browser: false,
        }
    }

    /// Open the verification page in a browser when a device code is issued.
    #[must_use]
    pub fn with_browser(mut self, launch: bool) -> Self {
        self.launch_browser = launch;
        self
    }

    /// Returns a usable credential, from the store, a refresh, or a new
    /// device flow, and reports it with `done`.
    pub async fn acquire(&self, cancel: &FlowCancel) -> Result<CredentialRecord> {
        let record = match self.load().await? {
            Some(cached) => {
                self.observer.tokens_found();
                if cached.is_valid() {
                    self.observer.token_valid();
                    cached
                } else {
                    self.observer.token_expired();
                    self.renew(&cached, cancel).await?
                }
            },
            None => {
                self.observer.tokens_not_found();
                self.device_flow(cancel).await?
            },
        };

        self.observer.done(&TokenSummary::from_record(&record));
        Ok(record)
    }

    /// Refreshes an expired record, falling back to a device flow when the
    /// refresh token is unusable.
    async fn renew(&self, cached: &CredentialRecord, cancel: &FlowCancel) -> Result<CredentialRecord> {
        match self.refresh(cached, cancel).await {
            Err(err) if err.requires_reauth() => {
                self.observer.reauth_required();
                self.device_flow(cancel).await
            },
            result => result,
        }
    }

    /// Exchanges the record's refresh token and persists the result.
    ///
    /// Returns [`AuthgateError::NotAuthenticated`] when there is no refresh token.
    pub async fn refresh(
        &self,
        cached: &CredentialRecord,
        cancel: &FlowCancel,
    ) -> Result<CredentialRecord> {
        if !cached.can_refresh() {
            debug!("stored record has no refresh token");
            return Err(AuthgateError::NotAuthenticated);
        }

        self.observer.refreshing();
        let refreshed = until_cancelled(cancel, self.server.refresh(&cached.refresh_token)).await?;
        match refreshed {
            Ok(record) => {
                self.observer.refresh_ok();
                self.persist(record).await
            },
            Err(err) => {
                self.observer.refresh_failed(&err);
                Err(err.into())
            },
        }
    }

    /// Runs a complete device authorization and persists the result.
    pub async fn device_flow(&self, cancel: &FlowCancel) -> Result<CredentialRecord> {
        let authorization = until_cancelled(cancel, self.server.request_device_code()).await??;
        self.observer.device_code_ready(&authorization);
        if self.launch_browser {
            self.observer.browser_opened(open_browser(&authorization));
        }

        let polling = cancel.child();
        let deadline = authorization
            .time_left(chrono::Utc::now())
            .and_then(|left| Instant::now().checked_add(left))
            .map(|at| polling.cancel_at(at));

        let mut poller = Poller::new(&self.server, &authorization, self.observer.as_ref());
        let outcome = poller.run(&polling).await;
        if let Some(timer) = deadline {
            timer.abort();
        }

        let record = outcome?;
        self.observer.auth_success();
        self.persist(record).await
    }

    /// Checks the access token with the introspection endpoint.
    ///
    /// Failures are reported to the observer only.
    pub async fn verify(&self, record: &CredentialRecord, cancel: &FlowCancel) -> Result<()> {
        self.observer.verifying();
        match until_cancelled(cancel, self.server.introspect(&record.access_token)).await? {
            Ok(info) => self.observer.verify_ok(&info),
            Err(err) => self.observer.verify_failed(&err),
        }
        Ok(())
    }

    /// Runs `call` with `record`, recovering once from a rejected access token.
    ///
    /// On [`ExchangeError::Unauthorized`] the record is refreshed and `call`
    /// retried. If the refresh token is no longer valid, a new device flow
    /// runs first. Returns the call's value with the record finally used.
    pub async fn call_with_refresh<T, F, Fut>(
        &self,
        record: CredentialRecord,
        cancel: &FlowCancel,
        call: F,
    ) -> Result<(T, CredentialRecord)>
    where
        F: Fn(CredentialRecord) -> Fut,
        Fut: Future<Output = std::result::Result<T, ExchangeError>>,
    {
        match until_cancelled(cancel, call(record.clone())).await? {
            Ok(value) => return Ok((value, record)),
            Err(ExchangeError::Unauthorized) => self.observer.access_token_rejected(),
            Err(err) => return Err(err.into()),
        }

        let renewed = match self.refresh(&record, cancel).await {
            Ok(renewed) => renewed,
            Err(err) if err.requires_reauth() => {
                self.observer.reauth_required();
                self.device_flow(cancel).await?
            },
            Err(err) => return Err(err),
        };

        self.observer.token_refreshed_retrying();
        let value = until_cancelled(cancel, call(renewed.clone())).await??;
        Ok((value, renewed))
    }

    /// Loads the cached record. A corrupted token file counts as absent.
    async fn load(&self) -> Result<Option<CredentialRecord>> {
        let store = Arc::clone(&self.store);
        let client_id = self.client_id.clone();
        match tokio::task::spawn_blocking(move || store.load(&client_id)).await? {
            Ok(record) => Ok(Some(record)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err @ StoreError::Corrupted { .. }) => {
                warn!(error = %err, "ignoring unreadable token file");
                Ok(None)
            },
            Err(err) => Err(err.into()),
        }
    }

    /// Saves `record`. A failed save is reported but does not fail the flow.
    async fn persist(&self, mut record: CredentialRecord) -> Result<CredentialRecord> {
        if record.client_id.is_empty() {
            record.client_id.clone_from(&self.client_id);
        }

        let store = Arc::clone(&self.store);
        let to_save = record.clone();
        match tokio::task::spawn_blocking(move || store.save(&to_save)).await? {
            Ok(()) => self.observer.token_saved(&self.store.location()),
            Err(err) => {
                warn!(error = %err, "failed to save credentials");
                self.observer.token_save_failed(&err);
            },
        }
        Ok(record)
    }
}

/// Races `fut` against `cancel`.
async fn until_cancelled<T>(cancel: &FlowCancel, fut: impl Future<Output = T>) -> Result<T> {
    tokio::select! {
        biased;
        cause = cancel.cancelled() => Err(PollError::Cancelled(cause).into()),
        value = fut => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::cancel::CancelCause;
    use crate::auth::error::{OAuthErrorCode, ValidationError};
    use crate::auth::server::MockAuthServer;
    use crate::auth::tokens::{DeviceAuthorization, DeviceCodeResponse};
    use crate::store::storage::MockCredentialStore;
    use crate::store::FileCredentialStore;
    use crate::ui::testing::RecordingObserver;
    use chrono::{Duration, Utc};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const CLIENT: &str = "cli-test";

    fn record(access: &str, refresh: &str, expires_in: i64) -> CredentialRecord {
        CredentialRecord {
            access_token: access.to_string(),
            refresh_token: refresh.to_string(),
            token_type: "Bearer".to_string(),
            expires_at: Utc::now() + Duration::seconds(expires_in),
            client_id: CLIENT.to_string(),
        }
    }

    fn authorization(expires_in: i64) -> DeviceAuthorization {
        DeviceAuthorization::from_response(
            DeviceCodeResponse {
                device_code: "D1".to_string(),
                user_code: "ABC12345".to_string(),
                verification_uri: "https://auth.example.com/device".to_string(),
                verification_uri_complete: None,
                expires_in,
                interval: 5,
            },
            Utc::now(),
        )
    }

    fn invalid_grant() -> ExchangeError {
        ExchangeError::Protocol {
            code: OAuthErrorCode::InvalidGrant,
            description: Some("refresh token revoked".to_string()),
        }
    }

    /// Server whose device flow issues `access` on the first poll.
    fn expect_device_flow(server: &mut MockAuthServer, access: &'static str) {
        server
            .expect_request_device_code()
            .times(1)
            .returning(|| Ok(authorization(600)));
        server
            .expect_exchange_device_code()
            .times(1)
            .returning(move |_| Ok(record(access, "R-device", 3600)));
    }

    struct Harness {
        _dir: TempDir,
        path: PathBuf,
        store: Arc<FileCredentialStore>,
        observer: Arc<RecordingObserver>,
    }

    impl Harness {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let path = dir.path().join("tokens.json");
            Self {
                store: Arc::new(FileCredentialStore::new(&path)),
                path,
                _dir: dir,
                observer: Arc::new(RecordingObserver::default()),
            }
        }

        fn with_cached(self, cached: &CredentialRecord) -> Self {
            self.store.save(cached).unwrap();
            self
        }

        fn orchestrator(
            &self,
            server: MockAuthServer,
        ) -> FlowOrchestrator<MockAuthServer, FileCredentialStore> {
            FlowOrchestrator::new(
                server,
                Arc::clone(&self.store),
                Arc::clone(&self.observer) as Arc<dyn FlowObserver>,
                CLIENT,
            )
        }

        fn stored(&self) -> CredentialRecord {
            self.store.load(CLIENT).unwrap()
        }
    }

    #[tokio::test]
    async fn valid_cached_token_is_used_without_network() {
        let harness = Harness::new().with_cached(&record("CACHED-TOKEN", "R1", 3600));
        let flow = harness.orchestrator(MockAuthServer::new());

        let got = flow.acquire(&FlowCancel::new()).await.unwrap();

        assert_eq!(got.access_token, "CACHED-TOKEN");
        assert_eq!(
            harness.observer.events(),
            vec!["tokens_found", "token_valid", "done"]
        );
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_persisted() {
        let harness = Harness::new().with_cached(&record("OLD-ACCESS", "R1", -60));
        let mut server = MockAuthServer::new();
        server
            .expect_refresh()
            .withf(|token| token == "R1")
            .times(1)
            .returning(|_| Ok(record("NEW-ACCESS", "R1", 3600)));
        let flow = harness.orchestrator(server);

        let got = flow.acquire(&FlowCancel::new()).await.unwrap();

        assert_eq!(got.access_token, "NEW-ACCESS");
        assert_eq!(harness.stored().access_token, "NEW-ACCESS");
        assert_eq!(harness.stored().refresh_token, "R1");
        assert!(harness.observer.saw("refresh_ok"));
        assert!(harness.observer.saw("token_saved"));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_grant_on_refresh_runs_device_flow() {
        let harness = Harness::new().with_cached(&record("OLD-ACCESS", "R1", -60));
        let mut server = MockAuthServer::new();
        server
            .expect_refresh()
            .times(1)
            .returning(|_| Err(invalid_grant()));
        expect_device_flow(&mut server, "DEVICE-ACCESS");
        let flow = harness.orchestrator(server);

        let got = flow.acquire(&FlowCancel::new()).await.unwrap();

        assert_eq!(got.access_token, "DEVICE-ACCESS");
        assert_eq!(harness.stored().refresh_token, "R-device");
        let events = harness.observer.events();
        let failed = events.iter().position(|e| e == "refresh_failed").unwrap();
        let reauth = events.iter().position(|e| e == "reauth_required").unwrap();
        let code = events.iter().position(|e| e == "device_code_ready").unwrap();
        assert!(failed < reauth && reauth < code, "{events:?}");
        assert!(events.contains(&"auth_success".to_string()));
    }

    #[tokio::test]
    async fn other_refresh_errors_are_reported() {
        let harness = Harness::new().with_cached(&record("OLD-ACCESS", "R1", -60));
        let mut server = MockAuthServer::new();
        server.expect_refresh().times(1).returning(|_| {
            Err(ExchangeError::Status {
                endpoint: crate::auth::error::Endpoint::Token,
                status: 500,
                body: "oops".to_string(),
            })
        });
        server.expect_request_device_code().never();
        let flow = harness.orchestrator(server);

        let err = flow.acquire(&FlowCancel::new()).await.unwrap_err();

        assert!(matches!(err, AuthgateError::Exchange(ExchangeError::Status { status: 500, .. })));
        assert_eq!(harness.stored().access_token, "OLD-ACCESS");
        assert!(!harness.observer.saw("reauth_required"));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_record_without_refresh_token_runs_device_flow() {
        let harness = Harness::new().with_cached(&record("OLD-ACCESS", "", -60));
        let mut server = MockAuthServer::new();
        server.expect_refresh().never();
        expect_device_flow(&mut server, "DEVICE-ACCESS");
        let flow = harness.orchestrator(server);

        let got = flow.acquire(&FlowCancel::new()).await.unwrap();
        assert_eq!(got.access_token, "DEVICE-ACCESS");
        assert!(harness.observer.saw("reauth_required"));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_record_goes_straight_to_device_flow() {
        let harness = Harness::new();
        let mut server = MockAuthServer::new();
        expect_device_flow(&mut server, "DEVICE-ACCESS");
        let flow = harness.orchestrator(server);

        flow.acquire(&FlowCancel::new()).await.unwrap();

        let events = harness.observer.events();
        assert_eq!(events.first().map(String::as_str), Some("tokens_not_found"));
        assert_eq!(events.last().map(String::as_str), Some("done"));
        assert_eq!(harness.stored().access_token, "DEVICE-ACCESS");
    }

    #[tokio::test(start_paused = true)]
    async fn corrupted_token_file_is_treated_as_missing() {
        let harness = Harness::new();
        std::fs::write(&harness.path, "{not json").unwrap();
        let mut server = MockAuthServer::new();
        expect_device_flow(&mut server, "DEVICE-ACCESS");
        let flow = harness.orchestrator(server);

        flow.acquire(&FlowCancel::new()).await.unwrap();

        assert!(harness.observer.saw("tokens_not_found"));
        assert_eq!(harness.stored().access_token, "DEVICE-ACCESS");
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_token_response_is_never_persisted() {
        let harness = Harness::new();
        let mut server = MockAuthServer::new();
        server
            .expect_request_device_code()
            .returning(|| Ok(authorization(600)));
        server
            .expect_exchange_device_code()
            .times(1)
            .returning(|_| Err(ValidationError::AccessTokenTooShort(5).into()));
        let flow = harness.orchestrator(server);

        let err = flow.acquire(&FlowCancel::new()).await.unwrap_err();

        assert!(matches!(
            err,
            AuthgateError::Poll(PollError::Exchange(ExchangeError::InvalidToken(_)))
        ));
        assert!(!harness.path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_client_id_is_filled_before_save() {
        let harness = Harness::new();
        let mut server = MockAuthServer::new();
        server
            .expect_request_device_code()
            .returning(|| Ok(authorization(600)));
        server.expect_exchange_device_code().returning(|_| {
            let mut issued = record("DEVICE-ACCESS", "R1", 3600);
            issued.client_id = String::new();
            Ok(issued)
        });
        let flow = harness.orchestrator(server);

        let got = flow.acquire(&FlowCancel::new()).await.unwrap();

        assert_eq!(got.client_id, CLIENT);
        assert_eq!(harness.stored().client_id, CLIENT);
    }

    #[tokio::test(start_paused = true)]
    async fn save_failure_does_not_fail_the_flow() {
        let mut store = MockCredentialStore::new();
        store.expect_load().returning(|client_id| {
            Err(StoreError::NotFound {
                client_id: client_id.to_string(),
            })
        });
        store.expect_save().times(1).returning(|_| {
            Err(StoreError::LockTimeout {
                path: PathBuf::from("tokens.json.lock"),
                waited: std::time::Duration::from_secs(5),
            })
        });
        let mut server = MockAuthServer::new();
        expect_device_flow(&mut server, "DEVICE-ACCESS");
        let observer = Arc::new(RecordingObserver::default());
        let flow = FlowOrchestrator::new(
            server,
            Arc::new(store),
            Arc::clone(&observer) as Arc<dyn FlowObserver>,
            CLIENT,
        );

        let got = flow.acquire(&FlowCancel::new()).await.unwrap();

        assert_eq!(got.access_token, "DEVICE-ACCESS");
        assert!(observer.saw("token_save_failed"));
        assert!(!observer.saw("token_saved"));
    }

    #[tokio::test(start_paused = true)]
    async fn denied_device_flow_is_an_error() {
        let harness = Harness::new();
        let mut server = MockAuthServer::new();
        server
            .expect_request_device_code()
            .returning(|| Ok(authorization(600)));
        server.expect_exchange_device_code().times(1).returning(|_| {
            Err(ExchangeError::Protocol {
                code: OAuthErrorCode::AccessDenied,
                description: None,
            })
        });
        let flow = harness.orchestrator(server);

        let err = flow.acquire(&FlowCancel::new()).await.unwrap_err();

        assert!(matches!(err, AuthgateError::Poll(PollError::Denied)));
        assert!(!harness.observer.saw("done"));
    }

    #[tokio::test(start_paused = true)]
    async fn device_code_expiry_cancels_polling() {
        let harness = Harness::new();
        let mut server = MockAuthServer::new();
        server
            .expect_request_device_code()
            .returning(|| Ok(authorization(12)));
        server.expect_exchange_device_code().returning(|_| {
            Err(ExchangeError::Protocol {
                code: OAuthErrorCode::AuthorizationPending,
                description: None,
            })
        });
        let flow = harness.orchestrator(server);

        let err = flow.acquire(&FlowCancel::new()).await.unwrap_err();

        assert!(matches!(
            err,
            AuthgateError::Poll(PollError::Cancelled(CancelCause::DeadlineExceeded))
        ));
    }

    #[tokio::test]
    async fn interrupt_is_reported_as_cancellation() {
        let harness = Harness::new();
        let mut server = MockAuthServer::new();
        server
            .expect_request_device_code()
            .times(0..=1)
            .returning(|| Ok(authorization(600)));
        server.expect_exchange_device_code().never();
        let flow = harness.orchestrator(server);
        let cancel = FlowCancel::new();
        cancel.cancel(CancelCause::Interrupted);

        let err = flow.acquire(&cancel).await.unwrap_err();

        assert!(matches!(
            err,
            AuthgateError::Poll(PollError::Cancelled(CancelCause::Interrupted))
        ));
    }

    #[tokio::test]
    async fn verify_failure_is_not_fatal() {
        let harness = Harness::new();
        let mut server = MockAuthServer::new();
        server
            .expect_introspect()
            .times(1)
            .returning(|_| Err(ExchangeError::Unauthorized));
        let flow = harness.orchestrator(server);

        flow.verify(&record("AAAAAAAAAA", "R1", 3600), &FlowCancel::new())
            .await
            .unwrap();

        assert_eq!(harness.observer.events(), vec!["verifying", "verify_failed"]);
    }

    #[tokio::test]
    async fn rejected_call_is_retried_after_refresh() {
        let harness = Harness::new();
        let mut server = MockAuthServer::new();
        server
            .expect_refresh()
            .withf(|token| token == "R1")
            .times(1)
            .returning(|_| Ok(record("FRESH-ACCESS", "R2", 3600)));
        let flow = harness.orchestrator(server);
        let seen = Mutex::new(Vec::new());

        let (value, used) = flow
            .call_with_refresh(record("STALE-ACCESS", "R1", 3600), &FlowCancel::new(), |rec| {
                seen.lock().unwrap().push(rec.access_token.clone());
                let accepted = rec.access_token == "FRESH-ACCESS";
                async move {
                    if accepted {
                        Ok("ok")
                    } else {
                        Err(ExchangeError::Unauthorized)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "ok");
        assert_eq!(used.refresh_token, "R2");
        assert_eq!(*seen.lock().unwrap(), vec!["STALE-ACCESS", "FRESH-ACCESS"]);
        assert_eq!(harness.stored().access_token, "FRESH-ACCESS");
        let events = harness.observer.events();
        assert!(events.contains(&"access_token_rejected".to_string()));
        assert!(events.contains(&"token_refreshed_retrying".to_string()));
        assert!(!events.contains(&"reauth_required".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_call_with_dead_refresh_token_reauthorizes() {
        let harness = Harness::new();
        let mut server = MockAuthServer::new();
        server
            .expect_refresh()
            .times(1)
            .returning(|_| Err(invalid_grant()));
        expect_device_flow(&mut server, "DEVICE-ACCESS");
        let flow = harness.orchestrator(server);

        let (_, used) = flow
            .call_with_refresh(record("STALE-ACCESS", "R1", 3600), &FlowCancel::new(), |rec| {
                let accepted = rec.access_token == "DEVICE-ACCESS";
                async move {
                    if accepted {
                        Ok(())
                    } else {
                        Err(ExchangeError::Unauthorized)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(used.access_token, "DEVICE-ACCESS");
        let events = harness.observer.events();
        let reauth = events.iter().position(|e| e == "reauth_required").unwrap();
        let retry = events.iter().position(|e| e == "token_refreshed_retrying").unwrap();
        assert!(reauth < retry);
    }

    #[tokio::test]
    async fn non_auth_call_failure_is_returned_without_refresh() {
        let harness = Harness::new();
        let mut server = MockAuthServer::new();
        server.expect_refresh().never();
        let flow = harness.orchestrator(server);

        let err = flow
            .call_with_refresh(record("AAAAAAAAAA", "R1", 3600), &FlowCancel::new(), |_| async {
                Err::<(), _>(ExchangeError::Status {
                    endpoint: crate::auth::error::Endpoint::TokenInfo,
                    status: 503,
                    body: String::new(),
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AuthgateError::Exchange(ExchangeError::Status { status: 503, .. })));
    }
}
