// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Session Tokens
//!
//! Access and refresh tokens are HS256 JWTs signed with two distinct
//! secrets, so a leaked refresh secret cannot forge access tokens and vice
//! versa. Revocation entries live in the shared key-value store under
//! `revoked:<sha256(token)>` and expire when the token itself would have.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::identity::{normalize_address, IdentityResolver, ResolvedIdentity};
use super::roles::Role;
use crate::crypto::{hash, Encoding, HashAlgorithm};
use crate::error::{BrokerError, BrokerResult};
use crate::storage::{KeyValueStore, StoreResult};

/// Clock skew tolerance for `exp`/`iat`.
const CLOCK_SKEW_LEEWAY: u64 = 5;
const REVOKED_PREFIX: &str = "revoked:";
const ACCESS_TYPE: &str = "access";
const REFRESH_TYPE: &str = "refresh";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Lower-cased subject address.
    pub sub: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub iss: String,
    pub typ: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    /// 128-bit random token id.
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub typ: String,
}

/// Claims common to both token kinds, used when revoking.
#[derive(Debug, Deserialize)]
struct RevocableClaims {
    sub: String,
    exp: i64,
    typ: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    pub token_type: String,
}

/// Why a token was not accepted. Callers usually collapse this to
/// `InvalidToken`; the detail is for logs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenRejection {
    #[error("malformed token")]
    Malformed,
    #[error("token expired")]
    Expired,
    #[error("bad signature")]
    BadSignature,
    #[error("token revoked")]
    Revoked,
    #[error("revocation store unavailable")]
    RevocationUnavailable,
}

impl TokenRejection {
    pub fn into_access_error(self) -> BrokerError {
        match self {
            TokenRejection::RevocationUnavailable => {
                BrokerError::UpstreamUnavailable("revocation store".into())
            }
            _ => BrokerError::InvalidToken,
        }
    }

    pub fn into_refresh_error(self) -> BrokerError {
        match self {
            TokenRejection::RevocationUnavailable => {
                BrokerError::UpstreamUnavailable("revocation store".into())
            }
            _ => BrokerError::InvalidRefreshToken,
        }
    }
}

#[derive(Clone)]
pub struct TokenSettings {
    pub access_secret: Vec<u8>,
    pub refresh_secret: Vec<u8>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub issuer: String,
}

impl std::fmt::Debug for TokenSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSettings")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    issuer: String,
    revocations: Arc<dyn KeyValueStore>,
}

/// Log-safe token reference.
pub fn token_fingerprint(token: &str) -> String {
    hash(token.as_bytes(), HashAlgorithm::Sha256, Encoding::Hex)
}

fn revocation_key(token: &str) -> String {
    format!("{REVOKED_PREFIX}{}", token_fingerprint(token))
}

fn whole_seconds(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

/// Seconds until a token with this `exp` stops verifying. Tokens stay
/// verifiable for the leeway past `exp`.
fn remaining_lifetime(exp: i64) -> i64 {
    exp.saturating_add(CLOCK_SKEW_LEEWAY as i64)
        .saturating_sub(Utc::now().timestamp())
}

fn random_token_id() -> String {
    let mut id = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut id);
    alloy::hex::encode(id)
}

fn map_jwt_error(e: jsonwebtoken::errors::Error) -> TokenRejection {
    match e.kind() {
        ErrorKind::ExpiredSignature => TokenRejection::Expired,
        ErrorKind::InvalidSignature => TokenRejection::BadSignature,
        _ => TokenRejection::Malformed,
    }
}

impl TokenService {
    pub fn new(settings: TokenSettings, revocations: Arc<dyn KeyValueStore>) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(&settings.access_secret),
            access_decoding: DecodingKey::from_secret(&settings.access_secret),
            refresh_encoding: EncodingKey::from_secret(&settings.refresh_secret),
            refresh_decoding: DecodingKey::from_secret(&settings.refresh_secret),
            access_ttl: settings.access_ttl,
            refresh_ttl: settings.refresh_ttl,
            issuer: settings.issuer,
            revocations,
        }
    }

    fn validation(&self, validate_exp: bool) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.leeway = CLOCK_SKEW_LEEWAY;
        validation.validate_exp = validate_exp;
        validation.validate_aud = false;
        validation
    }

    /// Mint an access/refresh pair for an already-resolved identity.
    pub fn mint_session(
        &self,
        address: &str,
        role: Role,
        did: Option<String>,
    ) -> BrokerResult<SessionTokens> {
        let now = Utc::now().timestamp();
        let sub = address.to_ascii_lowercase();

        let access = AccessClaims {
            sub: sub.clone(),
            role,
            did,
            iat: now,
            exp: now.saturating_add(whole_seconds(self.access_ttl)),
            jti: uuid::Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
            typ: ACCESS_TYPE.into(),
        };
        let refresh = RefreshClaims {
            sub,
            jti: random_token_id(),
            iat: now,
            exp: now.saturating_add(whole_seconds(self.refresh_ttl)),
            iss: self.issuer.clone(),
            typ: REFRESH_TYPE.into(),
        };

        let header = Header::new(Algorithm::HS256);
        let access_token = encode(&header, &access, &self.access_encoding)
            .map_err(|e| BrokerError::Internal(format!("access token encoding: {e}")))?;
        let refresh_token = encode(&header, &refresh, &self.refresh_encoding)
            .map_err(|e| BrokerError::Internal(format!("refresh token encoding: {e}")))?;

        Ok(SessionTokens {
            access_token,
            refresh_token,
            expires_in: self.access_ttl.as_secs(),
            token_type: "Bearer".into(),
        })
    }

    pub async fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenRejection> {
        let claims: AccessClaims = self.decode(token, &self.access_decoding, true)?;
        if claims.typ != ACCESS_TYPE {
            return Err(TokenRejection::Malformed);
        }
        self.ensure_not_revoked(token).await?;
        Ok(claims)
    }

    pub async fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenRejection> {
        let claims: RefreshClaims = self.decode(token, &self.refresh_decoding, true)?;
        if claims.typ != REFRESH_TYPE {
            return Err(TokenRejection::Malformed);
        }
        self.ensure_not_revoked(token).await?;
        Ok(claims)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        token: &str,
        key: &DecodingKey,
        validate_exp: bool,
    ) -> Result<T, TokenRejection> {
        decode::<T>(token, key, &self.validation(validate_exp))
            .map(|data| data.claims)
            .map_err(map_jwt_error)
    }

    /// Revocation lookups fail closed.
    async fn ensure_not_revoked(&self, token: &str) -> Result<(), TokenRejection> {
        match self.revocations.get(&revocation_key(token)).await {
            Ok(None) => Ok(()),
            Ok(Some(_)) => Err(TokenRejection::Revoked),
            Err(e) => {
                warn!(error = %e, "Revocation lookup failed, rejecting token");
                Err(TokenRejection::RevocationUnavailable)
            }
        }
    }

    /// Revoke a token held by `claimed_address`.
    ///
    /// Either token kind is accepted. The entry lives exactly as long as the
    /// token would have; an already-expired token needs no entry.
    pub async fn invalidate(&self, token: &str, claimed_address: &str) -> BrokerResult<()> {
        let claims = self
            .decode::<RevocableClaims>(token, &self.access_decoding, false)
            .ok()
            .filter(|c| c.typ == ACCESS_TYPE)
            .or_else(|| {
                self.decode::<RevocableClaims>(token, &self.refresh_decoding, false)
                    .ok()
                    .filter(|c| c.typ == REFRESH_TYPE)
            })
            .ok_or(BrokerError::InvalidToken)?;

        if !claims.sub.eq_ignore_ascii_case(claimed_address.trim()) {
            warn!(
                token = %token_fingerprint(token),
                "Token subject does not match the requesting address"
            );
            return Err(BrokerError::Unauthorized);
        }

        if remaining_lifetime(claims.exp) < 0 {
            debug!(token = %token_fingerprint(token), "Token already expired, nothing to revoke");
            return Ok(());
        }
        self.revoke(token, claims.exp).await?;
        Ok(())
    }

    /// Add a revocation entry. Returns `false` if the token was already
    /// revoked.
    ///
    /// An entry is always written, so a token verified at the edge of its
    /// lifetime still cannot be exchanged twice.
    async fn revoke(&self, token: &str, exp: i64) -> StoreResult<bool> {
        let ttl = Duration::from_secs(remaining_lifetime(exp).max(1) as u64);
        let inserted = self
            .revocations
            .compare_and_swap(&revocation_key(token), None, exp.to_string().as_bytes(), Some(ttl))
            .await?;

        match self.revocations.purge_expired(REVOKED_PREFIX).await {
            Ok(purged) if purged > 0 => debug!(purged, "Pruned expired revocation entries"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Revocation pruning failed"),
        }

        if inserted {
            info!(token = %token_fingerprint(token), "Token revoked");
        }
        Ok(inserted)
    }

    /// Exchange a refresh token for a new session.
    ///
    /// The role is re-resolved on chain. The presented token is single use:
    /// it is revoked before the new pair is minted, and a concurrent
    /// exchange of the same token loses.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        resolver: &IdentityResolver,
    ) -> BrokerResult<(RefreshClaims, ResolvedIdentity, SessionTokens)> {
        let claims = self
            .verify_refresh(refresh_token)
            .await
            .map_err(TokenRejection::into_refresh_error)?;

        let (address, canonical) =
            normalize_address(&claims.sub).map_err(|_| BrokerError::InvalidRefreshToken)?;
        let identity = resolver.resolve(address).await?;

        if !self.revoke(refresh_token, claims.exp).await? {
            warn!(token = %token_fingerprint(refresh_token), "Refresh token already exchanged");
            return Err(BrokerError::InvalidRefreshToken);
        }

        let tokens = self.mint_session(&canonical, identity.role, identity.did.clone())?;
        Ok((claims, identity, tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::roles::RoleRanking;
    use crate::storage::MemoryStore;
    use crate::testutil::{FailingStore, MockIdentityOracle, RecordingStore, ADDRESS_A};

    fn settings() -> TokenSettings {
        TokenSettings {
            access_secret: b"access-secret-for-tests".to_vec(),
            refresh_secret: b"refresh-secret-for-tests".to_vec(),
            access_ttl: Duration::from_secs(3600),
            refresh_ttl: Duration::from_secs(7200),
            issuer: "did-access-broker".into(),
        }
    }

    fn service() -> TokenService {
        TokenService::new(settings(), Arc::new(MemoryStore::new()))
    }

    fn resolver(oracle: MockIdentityOracle) -> IdentityResolver {
        IdentityResolver::new(Arc::new(oracle), RoleRanking::standard(), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn mint_then_verify_round_trips_subject_and_role() {
        let tokens = service();
        let session = tokens
            .mint_session(ADDRESS_A, Role::Producer, Some("did:ethr:alice".into()))
            .unwrap();
        assert_eq!(session.token_type, "Bearer");
        assert_eq!(session.expires_in, 3600);

        let claims = tokens.verify_access(&session.access_token).await.unwrap();
        assert_eq!(claims.sub, ADDRESS_A.to_ascii_lowercase());
        assert_eq!(claims.role, Role::Producer);
        assert_eq!(claims.did.as_deref(), Some("did:ethr:alice"));

        let refresh = tokens.verify_refresh(&session.refresh_token).await.unwrap();
        assert_eq!(refresh.sub, claims.sub);
        assert_eq!(refresh.jti.len(), 32);
    }

    #[tokio::test]
    async fn token_kinds_are_not_interchangeable() {
        let tokens = service();
        let session = tokens.mint_session(ADDRESS_A, Role::Consumer, None).unwrap();
        assert_eq!(
            tokens.verify_access(&session.refresh_token).await,
            Err(TokenRejection::BadSignature)
        );
        assert_eq!(
            tokens.verify_refresh(&session.access_token).await,
            Err(TokenRejection::BadSignature)
        );
    }

    #[tokio::test]
    async fn invalidated_token_is_rejected_despite_valid_signature() {
        let tokens = service();
        let session = tokens.mint_session(ADDRESS_A, Role::Consumer, None).unwrap();

        tokens
            .invalidate(&session.access_token, &ADDRESS_A.to_ascii_uppercase().replace("0X", "0x"))
            .await
            .unwrap();
        assert_eq!(
            tokens.verify_access(&session.access_token).await,
            Err(TokenRejection::Revoked)
        );
    }

    #[tokio::test]
    async fn invalidate_checks_subject() {
        let tokens = service();
        let session = tokens.mint_session(ADDRESS_A, Role::Consumer, None).unwrap();
        assert!(matches!(
            tokens
                .invalidate(&session.access_token, "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb")
                .await,
            Err(BrokerError::Unauthorized)
        ));
        assert!(tokens.verify_access(&session.access_token).await.is_ok());
    }

    #[tokio::test]
    async fn expired_and_garbage_tokens_are_rejected() {
        let tokens = service();
        let now = Utc::now().timestamp();
        let stale = AccessClaims {
            sub: ADDRESS_A.to_ascii_lowercase(),
            role: Role::Consumer,
            did: None,
            iat: now - 7200,
            exp: now - 3600,
            jti: "stale".into(),
            iss: "did-access-broker".into(),
            typ: ACCESS_TYPE.into(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &stale,
            &EncodingKey::from_secret(b"access-secret-for-tests"),
        )
        .unwrap();

        assert_eq!(tokens.verify_access(&token).await, Err(TokenRejection::Expired));
        assert_eq!(tokens.verify_access("not.a.jwt").await, Err(TokenRejection::Malformed));
        // Revoking an expired token is a no-op.
        tokens.invalidate(&token, ADDRESS_A).await.unwrap();
    }

    #[tokio::test]
    async fn revocation_store_failure_fails_closed() {
        let minting = service();
        let session = minting.mint_session(ADDRESS_A, Role::Consumer, None).unwrap();

        let broken = TokenService::new(settings(), Arc::new(FailingStore));
        assert_eq!(
            broken.verify_access(&session.access_token).await,
            Err(TokenRejection::RevocationUnavailable)
        );
    }

    #[tokio::test]
    async fn refresh_rotates_and_reresolves_role() {
        let tokens = service();
        let session = tokens.mint_session(ADDRESS_A, Role::Consumer, None).unwrap();

        let oracle = MockIdentityOracle::new()
            .with_did(ADDRESS_A, "did:ethr:alice", true)
            .with_role("did:ethr:alice", crate::chain::role_id("provider"));
        let (_, identity, renewed) = tokens
            .refresh(&session.refresh_token, &resolver(oracle))
            .await
            .unwrap();
        assert_eq!(identity.role, Role::Provider);

        let claims = tokens.verify_access(&renewed.access_token).await.unwrap();
        assert_eq!(claims.role, Role::Provider);

        let replay = tokens
            .refresh(&session.refresh_token, &resolver(MockIdentityOracle::new()))
            .await;
        assert!(matches!(replay, Err(BrokerError::InvalidRefreshToken)));
    }

    #[tokio::test]
    async fn refresh_for_deactivated_identity_issues_nothing() {
        let tokens = service();
        let session = tokens.mint_session(ADDRESS_A, Role::Consumer, None).unwrap();
        let oracle = MockIdentityOracle::new().with_did(ADDRESS_A, "did:ethr:alice", false);

        assert!(matches!(
            tokens.refresh(&session.refresh_token, &resolver(oracle)).await,
            Err(BrokerError::DeactivatedUser)
        ));
        // The refresh token was not consumed by the failed attempt.
        assert!(tokens.verify_refresh(&session.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn revocation_entry_lives_as_long_as_the_token() {
        let store = Arc::new(RecordingStore::new());
        let tokens = TokenService::new(settings(), store.clone());
        let session = tokens.mint_session(ADDRESS_A, Role::Consumer, None).unwrap();

        tokens.invalidate(&session.access_token, ADDRESS_A).await.unwrap();

        let ttl = store
            .ttl_of_write(REVOKED_PREFIX)
            .flatten()
            .expect("revocation written with a ttl");
        let expected = 3600 + CLOCK_SKEW_LEEWAY;
        assert!(ttl.as_secs() <= expected && ttl.as_secs() >= expected - 2, "ttl {ttl:?}");
    }

    #[tokio::test]
    async fn revoking_prunes_lapsed_entries() {
        let store = Arc::new(RecordingStore::new());
        store
            .inner
            .put("revoked:lapsed", b"0", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let tokens = TokenService::new(settings(), store.clone());
        let session = tokens.mint_session(ADDRESS_A, Role::Consumer, None).unwrap();
        tokens.invalidate(&session.access_token, ADDRESS_A).await.unwrap();

        assert_eq!(store.purged(REVOKED_PREFIX), 1);
        assert_eq!(
            tokens.verify_access(&session.access_token).await,
            Err(TokenRejection::Revoked)
        );
    }

    #[tokio::test]
    async fn token_at_end_of_lifetime_is_still_single_use() {
        let tokens = service();
        let exp = Utc::now().timestamp() - CLOCK_SKEW_LEEWAY as i64;

        assert!(tokens.revoke("edge-token", exp).await.unwrap());
        assert!(!tokens.revoke("edge-token", exp).await.unwrap());
    }
}
