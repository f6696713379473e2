// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! DID registry and consent registry contract bindings.

use std::str::FromStr;

use alloy::{
    primitives::{Address, Bytes, B256},
    providers::{DynProvider, Provider, ProviderBuilder},
    sol,
};
use async_trait::async_trait;

use super::oracle::{AuthorizationOracle, DidRecord, IdentityOracle, OracleError};

sol! {
    #[sol(rpc)]
    interface IDidRegistry {
        function resolveDid(address controller) external view returns (string did, bool active);
        function hasRole(string did, bytes32 role) external view returns (bool);
        function verifySignature(address controller, string message, bytes signature) external view returns (bool);
    }
}

sol! {
    #[sol(rpc)]
    interface IConsentRegistry {
        function isAuthorized(string blobRef, address consumer) external view returns (bool);
    }
}

/// Both registries behind one HTTP provider.
pub struct EvmRegistry {
    did_registry: IDidRegistry::IDidRegistryInstance<DynProvider>,
    consent_registry: IConsentRegistry::IConsentRegistryInstance<DynProvider>,
}

impl EvmRegistry {
    pub fn new(
        rpc_url: &str,
        did_registry: &str,
        consent_registry: &str,
    ) -> Result<Self, OracleError> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e: url::ParseError| OracleError::InvalidRpcUrl(e.to_string()))?;
        let did_address = parse_address(did_registry)?;
        let consent_address = parse_address(consent_registry)?;

        let provider = ProviderBuilder::new().connect_http(url).erased();

        Ok(Self {
            did_registry: IDidRegistry::new(did_address, provider.clone()),
            consent_registry: IConsentRegistry::new(consent_address, provider),
        })
    }

    /// Current head, used as a reachability check.
    pub async fn block_number(&self) -> Result<u64, OracleError> {
        self.did_registry
            .provider()
            .get_block_number()
            .await
            .map_err(|e| OracleError::Rpc(e.to_string()))
    }
}

pub fn parse_address(value: &str) -> Result<Address, OracleError> {
    Address::from_str(value.trim()).map_err(|e| OracleError::InvalidAddress(e.to_string()))
}

#[async_trait]
impl IdentityOracle for EvmRegistry {
    async fn resolve_did(&self, address: Address) -> Result<Option<DidRecord>, OracleError> {
        let result = self
            .did_registry
            .resolveDid(address)
            .call()
            .await
            .map_err(|e| OracleError::Contract(e.to_string()))?;

        if result.did.is_empty() {
            return Ok(None);
        }
        Ok(Some(DidRecord {
            did: result.did,
            active: result.active,
        }))
    }

    async fn has_role(&self, did: &str, role_id: B256) -> Result<bool, OracleError> {
        self.did_registry
            .hasRole(did.to_string(), role_id)
            .call()
            .await
            .map_err(|e| OracleError::Contract(e.to_string()))
    }

    async fn verify_signature(
        &self,
        address: Address,
        message: &str,
        signature: &[u8],
    ) -> Result<bool, OracleError> {
        self.did_registry
            .verifySignature(
                address,
                message.to_string(),
                Bytes::copy_from_slice(signature),
            )
            .call()
            .await
            .map_err(|e| OracleError::Contract(e.to_string()))
    }
}

#[async_trait]
impl AuthorizationOracle for EvmRegistry {
    async fn is_authorized(&self, blob_ref: &str, address: Address) -> Result<bool, OracleError> {
        self.consent_registry
            .isAuthorized(blob_ref.to_string(), address)
            .call()
            .await
            .map_err(|e| OracleError::Contract(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DID_REGISTRY: &str = "0x1111111111111111111111111111111111111111";
    const CONSENT_REGISTRY: &str = "0x2222222222222222222222222222222222222222";

    #[test]
    fn rejects_bad_configuration() {
        assert!(matches!(
            EvmRegistry::new("not a url", DID_REGISTRY, CONSENT_REGISTRY),
            Err(OracleError::InvalidRpcUrl(_))
        ));
        assert!(matches!(
            EvmRegistry::new("http://127.0.0.1:8545", "0x1234", CONSENT_REGISTRY),
            Err(OracleError::InvalidAddress(_))
        ));
    }

    #[test]
    fn builds_against_valid_configuration() {
        assert!(EvmRegistry::new("http://127.0.0.1:8545", DID_REGISTRY, CONSENT_REGISTRY).is_ok());
    }

    #[test]
    fn parses_mixed_case_addresses() {
        let lower = parse_address("0xabcdefabcdefabcdefabcdefabcdefabcdefabcd").unwrap();
        let upper = parse_address(" 0xABCDEFABCDEFABCDEFABCDEFABCDEFABCDEFABCD ").unwrap();
        assert_eq!(lower, upper);
    }
}
