// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Challenge-response authentication and session lifecycle.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use super::challenge::{Challenge, ChallengeStore};
use super::identity::{normalize_address, IdentityResolver};
use super::rate_limit::{IdentifierKind, RateLimiter};
use super::roles::Role;
use super::signature::{decode_signature, SignatureVerifier};
use super::tokens::{SessionTokens, TokenService};
use crate::error::{BrokerError, BrokerResult};

#[derive(Debug, Clone, Deserialize)]
pub struct AuthenticateRequest {
    pub address: String,
    /// Hex personal_sign signature over the challenge message.
    pub signature: String,
    /// Caller origin (IP) for per-origin rate limiting.
    pub origin: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthSession {
    #[serde(flatten)]
    pub tokens: SessionTokens,
    pub address: String,
    pub role: Role,
    pub did: Option<String>,
}

pub struct AuthenticationService {
    challenges: ChallengeStore,
    limiter: RateLimiter,
    verifier: SignatureVerifier,
    resolver: IdentityResolver,
    tokens: Arc<TokenService>,
}

impl AuthenticationService {
    pub fn new(
        challenges: ChallengeStore,
        limiter: RateLimiter,
        verifier: SignatureVerifier,
        resolver: IdentityResolver,
        tokens: Arc<TokenService>,
    ) -> Self {
        Self {
            challenges,
            limiter,
            verifier,
            resolver,
            tokens,
        }
    }

    #[cfg(test)]
    fn challenges(&self) -> &ChallengeStore {
        &self.challenges
    }

    /// Issue a challenge for the address.
    pub async fn challenge(&self, address: &str) -> BrokerResult<Challenge> {
        let (_, canonical) = normalize_address(address)?;
        Ok(self.challenges.issue(&canonical).await?)
    }

    /// Verify a signed challenge and mint a session.
    pub async fn authenticate(&self, request: AuthenticateRequest) -> BrokerResult<AuthSession> {
        let (address, canonical) = normalize_address(&request.address)?;
        let origin = request.origin.as_deref().filter(|o| !o.is_empty());

        self.ensure_not_blocked(&canonical, IdentifierKind::Address).await?;
        if let Some(origin) = origin {
            self.ensure_not_blocked(origin, IdentifierKind::Ip).await?;
        }

        let Some(challenge) = self.challenges.peek(&canonical).await? else {
            self.record_failure(&canonical, origin).await;
            return Err(BrokerError::InvalidChallenge);
        };

        let Some(signature) = decode_signature(&request.signature) else {
            self.record_failure(&canonical, origin).await;
            return Err(BrokerError::InvalidSignature);
        };

        // Without a DID result the registry cannot be consulted, so local
        // recovery is only acceptable when fallback is enabled.
        let did_lookup = match self.resolver.lookup_did(address).await {
            Err(e) if !self.verifier.allows_fallback() => {
                warn!(address = %canonical, error = %e, "DID lookup failed and registry fallback is disabled");
                return Err(e);
            }
            lookup => lookup,
        };
        let did = did_lookup.as_ref().ok().and_then(Option::as_ref);

        if !self
            .verifier
            .verify(address, &challenge.message, &signature, did)
            .await?
        {
            warn!(address = %canonical, "Signature does not match challenge");
            self.record_failure(&canonical, origin).await;
            return Err(BrokerError::InvalidSignature);
        }

        if !self.challenges.consume(&canonical, &challenge.message).await? {
            warn!(address = %canonical, "Challenge consumed concurrently");
            self.record_failure(&canonical, origin).await;
            return Err(BrokerError::InvalidChallenge);
        }

        let identity = self.resolver.identity_for(address, did_lookup).await?;

        self.clear_failures(&canonical, origin).await;

        let tokens = self
            .tokens
            .mint_session(&canonical, identity.role, identity.did.clone())?;
        info!(address = %canonical, role = %identity.role, "Session issued");

        Ok(AuthSession {
            tokens,
            address: canonical,
            role: identity.role,
            did: identity.did,
        })
    }

    /// Exchange a refresh token. When `address` is given it must match the
    /// token subject.
    pub async fn refresh(&self, refresh_token: &str, address: Option<&str>) -> BrokerResult<AuthSession> {
        if let Some(address) = address {
            let claims = self
                .tokens
                .verify_refresh(refresh_token)
                .await
                .map_err(|r| r.into_refresh_error())?;
            if !claims.sub.eq_ignore_ascii_case(address.trim()) {
                return Err(BrokerError::InvalidRefreshToken);
            }
        }

        let (claims, identity, tokens) = self.tokens.refresh(refresh_token, &self.resolver).await?;
        info!(address = %claims.sub, role = %identity.role, "Session refreshed");

        Ok(AuthSession {
            tokens,
            address: claims.sub,
            role: identity.role,
            did: identity.did,
        })
    }

    /// Revoke the access token and, if supplied, the refresh token.
    pub async fn logout(
        &self,
        address: &str,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> BrokerResult<()> {
        self.tokens.invalidate(access_token, address).await?;
        if let Some(refresh_token) = refresh_token {
            self.tokens.invalidate(refresh_token, address).await?;
        }
        info!(address = %address.to_ascii_lowercase(), "Logged out");
        Ok(())
    }

    /// Limiter store failures are logged and treated as not blocked.
    async fn ensure_not_blocked(&self, identifier: &str, kind: IdentifierKind) -> BrokerResult<()> {
        match self.limiter.check(identifier, kind).await {
            Ok(status) if status.is_blocked => Err(BrokerError::TooManyAttempts {
                retry_after_secs: status.retry_after_secs(),
            }),
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(identifier, ?kind, error = %e, "Rate limiter unavailable, allowing attempt");
                Ok(())
            }
        }
    }

    async fn record_failure(&self, address: &str, origin: Option<&str>) {
        let targets = std::iter::once((address, IdentifierKind::Address))
            .chain(origin.map(|o| (o, IdentifierKind::Ip)));
        for (identifier, kind) in targets {
            if let Err(e) = self.limiter.record_attempt(identifier, kind).await {
                warn!(identifier, ?kind, error = %e, "Failed to record authentication attempt");
            }
        }
    }

    async fn clear_failures(&self, address: &str, origin: Option<&str>) {
        let targets = std::iter::once((address, IdentifierKind::Address))
            .chain(origin.map(|o| (o, IdentifierKind::Ip)));
        for (identifier, kind) in targets {
            if let Err(e) = self.limiter.reset(identifier, kind).await {
                warn!(identifier, ?kind, error = %e, "Failed to reset rate limiter");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::rate_limit::RateLimitPolicy;
    use crate::auth::roles::RoleRanking;
    use crate::auth::tokens::{TokenRejection, TokenSettings};
    use crate::chain::role_id;
    use crate::storage::{KeyValueStore, MemoryStore};
    use crate::testutil::{FailingStore, MockIdentityOracle};
    use alloy::signers::{local::PrivateKeySigner, SignerSync};
    use std::time::Duration;

    fn build(
        oracle: MockIdentityOracle,
        store: Arc<dyn KeyValueStore>,
        max_attempts: u32,
        allow_fallback: bool,
    ) -> AuthenticationService {
        let oracle: Arc<MockIdentityOracle> = Arc::new(oracle);
        let timeout = Duration::from_secs(1);
        let tokens = Arc::new(TokenService::new(
            TokenSettings {
                access_secret: b"access".to_vec(),
                refresh_secret: b"refresh".to_vec(),
                access_ttl: Duration::from_secs(900),
                refresh_ttl: Duration::from_secs(3600),
                issuer: "did-access-broker".into(),
            },
            Arc::new(MemoryStore::new()),
        ));
        AuthenticationService::new(
            ChallengeStore::new(Arc::clone(&store), Duration::from_secs(60)),
            RateLimiter::new(
                store,
                RateLimitPolicy {
                    max_attempts,
                    lockout: Duration::from_secs(60),
                    window: Duration::from_secs(60),
                },
            ),
            SignatureVerifier::new(oracle.clone(), timeout, allow_fallback),
            IdentityResolver::new(oracle, RoleRanking::standard(), timeout),
            tokens,
        )
    }

    fn service(oracle: MockIdentityOracle) -> AuthenticationService {
        build(oracle, Arc::new(MemoryStore::new()), 5, true)
    }

    fn sign(signer: &PrivateKeySigner, message: &str) -> String {
        let signature = signer.sign_message_sync(message.as_bytes()).unwrap();
        format!("0x{}", alloy::hex::encode(signature.as_bytes()))
    }

    fn request(signer: &PrivateKeySigner, signature: String) -> AuthenticateRequest {
        AuthenticateRequest {
            address: signer.address().to_string(),
            signature,
            origin: Some("203.0.113.7".into()),
        }
    }

    #[tokio::test]
    async fn signed_challenge_yields_consumer_session() {
        let auth = service(MockIdentityOracle::new());
        let signer = PrivateKeySigner::random();

        let challenge = auth.challenge(&signer.address().to_string()).await.unwrap();
        assert!(challenge
            .message
            .starts_with("Sign this message to authenticate: "));

        let session = auth
            .authenticate(request(&signer, sign(&signer, &challenge.message)))
            .await
            .unwrap();
        assert_eq!(session.role, Role::Consumer);
        assert_eq!(session.address, format!("{:#x}", signer.address()));
        assert!(!session.tokens.access_token.is_empty());
        assert!(!session.tokens.refresh_token.is_empty());
    }

    #[tokio::test]
    async fn replayed_signature_fails() {
        let auth = service(MockIdentityOracle::new());
        let signer = PrivateKeySigner::random();
        let challenge = auth.challenge(&signer.address().to_string()).await.unwrap();
        let signature = sign(&signer, &challenge.message);

        auth.authenticate(request(&signer, signature.clone())).await.unwrap();
        assert!(matches!(
            auth.authenticate(request(&signer, signature.clone())).await,
            Err(BrokerError::InvalidChallenge)
        ));

        // A fresh challenge does not revive the old signature.
        auth.challenge(&signer.address().to_string()).await.unwrap();
        assert!(matches!(
            auth.authenticate(request(&signer, signature)).await,
            Err(BrokerError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn wrong_signer_is_rejected_with_valid_challenge() {
        let auth = service(MockIdentityOracle::new());
        let signer = PrivateKeySigner::random();
        let impostor = PrivateKeySigner::random();
        let challenge = auth.challenge(&signer.address().to_string()).await.unwrap();

        assert!(matches!(
            auth.authenticate(request(&signer, sign(&impostor, &challenge.message)))
                .await,
            Err(BrokerError::InvalidSignature)
        ));
        // The challenge survives a failed verification.
        assert!(auth
            .challenges()
            .peek(&signer.address().to_string())
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn did_holder_gets_ranked_role() {
        let signer = PrivateKeySigner::random();
        let address = signer.address().to_string();
        let oracle = MockIdentityOracle::new()
            .with_did(&address, "did:ethr:producer", true)
            .with_role("did:ethr:producer", role_id("producer"))
            .with_registry_signature_result(true);
        let auth = service(oracle);
        let challenge = auth.challenge(&address).await.unwrap();

        let session = auth
            .authenticate(request(&signer, sign(&signer, &challenge.message)))
            .await
            .unwrap();
        assert_eq!(session.role, Role::Producer);
        assert_eq!(session.did.as_deref(), Some("did:ethr:producer"));
    }

    #[tokio::test]
    async fn registry_outage_without_fallback_refuses_login() {
        let auth = build(
            MockIdentityOracle::new().failing(),
            Arc::new(MemoryStore::new()),
            5,
            false,
        );
        let signer = PrivateKeySigner::random();
        let challenge = auth.challenge(&signer.address().to_string()).await.unwrap();

        assert!(matches!(
            auth.authenticate(request(&signer, sign(&signer, &challenge.message)))
                .await,
            Err(BrokerError::UpstreamUnavailable(_))
        ));
        // Nothing was consumed, so a retry after recovery can still succeed.
        assert_eq!(
            auth.challenges()
                .peek(&signer.address().to_string())
                .await
                .unwrap(),
            Some(challenge)
        );
    }

    #[tokio::test]
    async fn registry_outage_with_fallback_uses_local_recovery() {
        let auth = build(
            MockIdentityOracle::new().failing(),
            Arc::new(MemoryStore::new()),
            5,
            true,
        );
        let signer = PrivateKeySigner::random();
        let challenge = auth.challenge(&signer.address().to_string()).await.unwrap();

        let session = auth
            .authenticate(request(&signer, sign(&signer, &challenge.message)))
            .await
            .unwrap();
        assert_eq!(session.role, Role::Consumer);
        assert_eq!(session.did, None);
    }

    #[tokio::test]
    async fn concurrent_verifications_of_one_challenge_have_one_winner() {
        let auth = service(MockIdentityOracle::new());
        let signer = PrivateKeySigner::random();
        let challenge = auth.challenge(&signer.address().to_string()).await.unwrap();
        let signature = sign(&signer, &challenge.message);

        let (first, second) = tokio::join!(
            auth.authenticate(request(&signer, signature.clone())),
            auth.authenticate(request(&signer, signature.clone())),
        );
        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(BrokerError::InvalidChallenge)))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn deactivated_did_cannot_log_in() {
        let signer = PrivateKeySigner::random();
        let address = signer.address().to_string();
        let oracle = MockIdentityOracle::new()
            .with_did(&address, "did:ethr:gone", false)
            .with_registry_signature_result(true);
        let auth = service(oracle);
        let challenge = auth.challenge(&address).await.unwrap();

        assert!(matches!(
            auth.authenticate(request(&signer, sign(&signer, &challenge.message)))
                .await,
            Err(BrokerError::DeactivatedUser)
        ));
    }

    #[tokio::test]
    async fn repeated_failures_lock_out() {
        let auth = build(MockIdentityOracle::new(), Arc::new(MemoryStore::new()), 2, true);
        let signer = PrivateKeySigner::random();

        for _ in 0..2 {
            assert!(matches!(
                auth.authenticate(request(&signer, "0x00".into())).await,
                Err(BrokerError::InvalidChallenge)
            ));
        }
        let challenge = auth.challenge(&signer.address().to_string()).await.unwrap();
        assert!(matches!(
            auth.authenticate(request(&signer, sign(&signer, &challenge.message)))
                .await,
            Err(BrokerError::TooManyAttempts { .. })
        ));
    }

    #[tokio::test]
    async fn rate_limiter_outage_does_not_block_login() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let auth = build(MockIdentityOracle::new(), Arc::clone(&store), 5, true);
        // Limiter on a failing store, challenges on a working one.
        let auth = AuthenticationService {
            limiter: RateLimiter::new(Arc::new(FailingStore), RateLimitPolicy::default()),
            ..auth
        };
        let signer = PrivateKeySigner::random();
        let challenge = auth.challenge(&signer.address().to_string()).await.unwrap();

        assert!(auth
            .authenticate(request(&signer, sign(&signer, &challenge.message)))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn refresh_and_logout() {
        let auth = service(MockIdentityOracle::new());
        let signer = PrivateKeySigner::random();
        let challenge = auth.challenge(&signer.address().to_string()).await.unwrap();
        let session = auth
            .authenticate(request(&signer, sign(&signer, &challenge.message)))
            .await
            .unwrap();

        assert!(matches!(
            auth.refresh(
                &session.tokens.refresh_token,
                Some("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb")
            )
            .await,
            Err(BrokerError::InvalidRefreshToken)
        ));

        let renewed = auth
            .refresh(&session.tokens.refresh_token, Some(&session.address))
            .await
            .unwrap();
        assert_eq!(renewed.address, session.address);

        auth.logout(
            &session.address,
            &renewed.tokens.access_token,
            Some(&renewed.tokens.refresh_token),
        )
        .await
        .unwrap();
        assert_eq!(
            auth.tokens.verify_access(&renewed.tokens.access_token).await,
            Err(TokenRejection::Revoked)
        );
        assert!(matches!(
            auth.refresh(&renewed.tokens.refresh_token, None).await,
            Err(BrokerError::InvalidRefreshToken)
        ));
    }
}
