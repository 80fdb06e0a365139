//! Credential Manager
//!
//! Sole owner of the vendor access token. The token is refreshed
//! proactively once `now >= expires_at - safety_margin`, or reactively
//! through [`CredentialManager::force_refresh`] after the API answered 401.
//! Both paths go through the same async mutex, so readers never observe a
//! half-replaced credential.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use contracts::{ApiConfig, ContractError, Credential, VendorApi};

use crate::clock::{Clock, SystemClock};

pub struct CredentialManager<A> {
    api: Arc<A>,
    login: String,
    password: String,
    margin: chrono::Duration,
    clock: Arc<dyn Clock>,
    credential: Mutex<Option<Credential>>,
}

impl<A: VendorApi> CredentialManager<A> {
    pub fn new(api: Arc<A>, config: &ApiConfig) -> Self {
        Self {
            api,
            login: config.login.clone(),
            password: config.password.clone(),
            margin: config.token_safety_margin.as_chrono(),
            clock: Arc::new(SystemClock),
            credential: Mutex::new(None),
        }
    }

    /// Replace the wall clock (tests)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn api(&self) -> &Arc<A> {
        &self.api
    }

    /// A token valid for at least the safety margin
    #[instrument(name = "credential_current_token", skip(self))]
    pub async fn current_token(&self) -> Result<String, ContractError> {
        let mut held = self.credential.lock().await;
        let now = self.clock.now();

        if let Some(credential) = held.as_ref() {
            if credential.is_fresh(now, self.margin) {
                return Ok(credential.token.clone());
            }
            debug!(expires_at = %credential.expires_at, "token inside safety margin");
        }

        let trigger = if held.is_some() { "expiry" } else { "initial" };
        let credential = self.refresh(trigger).await?;
        let token = credential.token.clone();
        *held = Some(credential);
        Ok(token)
    }

    /// Replace a token the API rejected
    ///
    /// When another caller already swapped out `rejected`, the newer token is
    /// returned without a second round-trip.
    #[instrument(name = "credential_force_refresh", skip_all)]
    pub async fn force_refresh(&self, rejected: &str) -> Result<String, ContractError> {
        let mut held = self.credential.lock().await;
        let now = self.clock.now();

        if let Some(credential) = held.as_ref() {
            if credential.token != rejected && credential.is_fresh(now, self.margin) {
                return Ok(credential.token.clone());
            }
        }

        *held = None;
        let credential = self.refresh("forced").await?;
        let token = credential.token.clone();
        *held = Some(credential);
        Ok(token)
    }

    /// Expiry of the held token, if any
    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.credential.lock().await.as_ref().map(|c| c.expires_at)
    }

    async fn refresh(&self, trigger: &'static str) -> Result<Credential, ContractError> {
        counter!("sensorpushd_token_refresh_total", "trigger" => trigger).increment(1);

        match self.api.authenticate(&self.login, &self.password).await {
            Ok(credential) => {
                info!(trigger, expires_at = %credential.expires_at, "access token refreshed");
                Ok(credential)
            }
            Err(err) => {
                warn!(trigger, error = %err, "access token refresh failed");
                Err(ContractError::credential_refresh(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use contracts::Span;
    use vendor_client::{MockFailure, MockVendorApi};

    fn api_config() -> ApiConfig {
        ApiConfig {
            login: "me@example.com".into(),
            password: "pw".into(),
            base_url: "http://mock".into(),
            token_ttl: Span::from_mins(60),
            token_safety_margin: Span::from_mins(5),
            timeout: Span::from_secs(5),
            verify_tls: true,
        }
    }

    fn manager(api: Arc<MockVendorApi>) -> (CredentialManager<MockVendorApi>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let manager = CredentialManager::new(api, &api_config()).with_clock(clock.clone());
        (manager, clock)
    }

    #[tokio::test]
    async fn test_token_reused_while_fresh() {
        let api = Arc::new(MockVendorApi::new());
        let (manager, clock) = manager(api.clone());

        let first = manager.current_token().await.unwrap();
        clock.advance(chrono::Duration::minutes(30));
        let second = manager.current_token().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(api.auth_calls(), 1);
    }

    #[tokio::test]
    async fn test_proactive_refresh_inside_margin() {
        let api = Arc::new(MockVendorApi::new());
        let (manager, clock) = manager(api.clone());

        let first = manager.current_token().await.unwrap();
        // one hour token, five minute margin
        clock.advance(chrono::Duration::minutes(56));
        let second = manager.current_token().await.unwrap();

        assert_ne!(first, second);
        assert_eq!(api.auth_calls(), 2);
    }

    #[tokio::test]
    async fn test_force_refresh_replaces_rejected_token_once() {
        let api = Arc::new(MockVendorApi::new());
        let (manager, _clock) = manager(api.clone());

        let stale = manager.current_token().await.unwrap();
        let fresh = manager.force_refresh(&stale).await.unwrap();
        assert_ne!(stale, fresh);

        // a second caller holding the same stale token reuses the new one
        let again = manager.force_refresh(&stale).await.unwrap();
        assert_eq!(fresh, again);
        assert_eq!(api.auth_calls(), 2);
    }

    #[tokio::test]
    async fn test_refresh_failure_is_transient() {
        let api = Arc::new(MockVendorApi::new());
        api.fail_next_auth(MockFailure::Unavailable);
        let (manager, _clock) = manager(api.clone());

        let err = manager.current_token().await.unwrap_err();
        assert!(matches!(err, ContractError::CredentialRefresh { .. }));
        assert!(err.is_transient());
        assert_eq!(manager.expires_at().await, None);

        assert!(manager.current_token().await.is_ok());
    }
}
