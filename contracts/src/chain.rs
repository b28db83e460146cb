//! # Chain Facade
//!
//! Owns one [`NativeChain`], one [`TokenRegistry`], and the [`Weth`]
//! contract deployed into it, and wires them into vaults.

use std::sync::Arc;

use vault_protocol::config::VaultConfig;
use vault_protocol::primitives::{Address, TokenId};
use vault_protocol::vault::{Collaborators, Vault, VaultError};

use crate::native::NativeChain;
use crate::token_registry::{TokenError, TokenRegistry};
use crate::weth::Weth;

/// Label of the address that deploys token contracts.
const DEPLOYER_LABEL: &str = "token-deployer";

/// An in-memory chain with WETH already deployed.
#[derive(Clone)]
pub struct Chain {
    native: Arc<NativeChain>,
    tokens: Arc<TokenRegistry>,
    weth: Arc<Weth>,
}

impl Chain {
    /// Creates an empty chain and deploys WETH as its first token.
    pub fn new() -> Result<Self, TokenError> {
        let native = Arc::new(NativeChain::new());
        let tokens = Arc::new(TokenRegistry::new(Address::derive(DEPLOYER_LABEL)));
        let weth = Arc::new(Weth::deploy(Arc::clone(&native), Arc::clone(&tokens))?);
        Ok(Self {
            native,
            tokens,
            weth,
        })
    }

    /// The native-asset ledger.
    pub fn native(&self) -> &Arc<NativeChain> {
        &self.native
    }

    /// The token registry.
    pub fn tokens(&self) -> &Arc<TokenRegistry> {
        &self.tokens
    }

    /// The WETH contract.
    pub fn weth(&self) -> &Arc<Weth> {
        &self.weth
    }

    /// Address of the WETH token.
    pub fn weth_address(&self) -> TokenId {
        self.weth.address()
    }

    /// The three primitives as vault collaborators.
    pub fn collaborators(&self) -> Collaborators {
        Collaborators::new(
            self.native.clone(),
            self.tokens.clone(),
            self.weth.clone(),
        )
    }

    /// Deploys a vault with the default custody account.
    pub fn deploy_vault(&self) -> Result<Vault, VaultError> {
        self.deploy_vault_with(VaultConfig::with_wrapped_token(self.weth_address()))
    }

    /// Deploys a vault with an explicit configuration.
    pub fn deploy_vault_with(&self, config: VaultConfig) -> Result<Vault, VaultError> {
        Vault::new(config, self.collaborators())
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("weth", &self.weth_address())
            .field("tokens", &self.tokens.token_count())
            .finish()
    }
}
