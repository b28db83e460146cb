//! # Script Replay
//!
//! Executes a JSON operation script against a fresh in-memory chain and
//! vault. A script is an array of steps tagged by `op`:
//!
//! ```json
//! [
//!   { "op": "fund", "account": "alice", "amount": "10" },
//!   { "op": "deposit_native", "account": "alice", "amount": "1.5" },
//!   { "op": "expect_balance", "account": "alice", "asset": "ETH", "amount": "1.5" }
//! ]
//! ```
//!
//! Accounts are labels (hashed into addresses) or `0x` hex addresses. Tokens
//! are symbols or hex addresses; the asset `ETH` (or `native`) names the
//! native asset. Amounts are decimal strings scaled by the asset's decimals.
//!
//! A vault operation that fails is reported and the replay continues. Chain
//! setup failures, unresolvable references, and `expect_balance` mismatches
//! abort the run.

use std::io::Write;
use std::path::Path;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use vault_contracts::Chain;
use vault_protocol::config::ETHER_DECIMALS;
use vault_protocol::primitives::{format_units, parse_units, Address, Amount, TokenId};
use vault_protocol::vault::{Asset, LedgerSnapshot, Vault, VaultError};

use crate::metrics::VaultMetrics;

/// One scripted action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Deploy an ERC20 token.
    CreateToken {
        name: String,
        symbol: String,
        decimals: u8,
        issuer: String,
    },
    /// Mint native funds to an account outside the vault.
    Fund { account: String, amount: String },
    /// Mint tokens as the token's issuer.
    Mint {
        token: String,
        to: String,
        amount: String,
    },
    /// Let the vault pull `amount` of `token` from `account`.
    Approve {
        account: String,
        token: String,
        amount: String,
    },
    /// Deposit native funds into the vault.
    DepositNative { account: String, amount: String },
    /// Withdraw native funds from the vault.
    WithdrawNative { account: String, amount: String },
    /// Deposit an approved token amount into the vault.
    DepositToken {
        account: String,
        token: String,
        amount: String,
    },
    /// Withdraw tokens from the vault.
    WithdrawToken {
        account: String,
        token: String,
        amount: String,
    },
    /// Convert vault-held native funds into WETH.
    Wrap { account: String, amount: String },
    /// Convert vault-held WETH back into native funds.
    Unwrap { account: String, amount: String },
    /// Print a vault balance.
    Balance { account: String, asset: String },
    /// Abort unless a vault balance equals `amount`.
    ExpectBalance {
        account: String,
        asset: String,
        amount: String,
    },
}

impl Step {
    /// The `op` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Step::CreateToken { .. } => "create_token",
            Step::Fund { .. } => "fund",
            Step::Mint { .. } => "mint",
            Step::Approve { .. } => "approve",
            Step::DepositNative { .. } => "deposit_native",
            Step::WithdrawNative { .. } => "withdraw_native",
            Step::DepositToken { .. } => "deposit_token",
            Step::WithdrawToken { .. } => "withdraw_token",
            Step::Wrap { .. } => "wrap_native",
            Step::Unwrap { .. } => "unwrap_wrapped",
            Step::Balance { .. } => "balance",
            Step::ExpectBalance { .. } => "expect_balance",
        }
    }
}

/// Reads and parses a script file.
pub fn load_script(path: &Path) -> Result<Vec<Step>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("malformed script {}", path.display()))
}

/// Totals for one replay run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub run_id: Uuid,
    pub steps: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// A chain, a vault on it, and the run's counters.
pub struct Replay {
    chain: Chain,
    vault: Vault,
    run_id: Uuid,
    succeeded: usize,
    failed: usize,
}

impl Replay {
    /// Deploys a fresh chain and vault.
    pub fn new() -> Result<Self> {
        let chain = Chain::new().context("failed to deploy chain")?;
        let vault = chain.deploy_vault().context("failed to deploy vault")?;
        Ok(Self {
            chain,
            vault,
            run_id: Uuid::new_v4(),
            succeeded: 0,
            failed: 0,
        })
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.vault.snapshot()
    }

    /// Executes `steps` in order, writing one report line per step to `out`.
    pub fn run(
        &mut self,
        steps: &[Step],
        metrics: &VaultMetrics,
        out: &mut impl Write,
    ) -> Result<ReplaySummary> {
        let span = info_span!("replay", run_id = %self.run_id);
        let _enter = span.enter();
        info!(steps = steps.len(), "replay started");

        for (index, step) in steps.iter().enumerate() {
            let n = index + 1;
            metrics.steps_total.inc();
            self.execute(n, step, metrics, out)
                .with_context(|| format!("step {n} ({}) failed", step.name()))?;
        }

        let summary = ReplaySummary {
            run_id: self.run_id,
            steps: steps.len(),
            succeeded: self.succeeded,
            failed: self.failed,
        };
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            "replay finished"
        );
        Ok(summary)
    }

    fn execute(
        &mut self,
        n: usize,
        step: &Step,
        metrics: &VaultMetrics,
        out: &mut impl Write,
    ) -> Result<()> {
        debug!(step = n, op = step.name(), "executing");
        match step {
            Step::CreateToken {
                name,
                symbol,
                decimals,
                issuer,
            } => {
                let issuer = account(issuer)?;
                let token = self
                    .chain
                    .tokens()
                    .create_token(name, symbol, *decimals, issuer)?;
                writeln!(out, "[{n}] create_token {symbol} at {token}")?;
            }
            Step::Fund { account: who, amount } => {
                let value = parse_units(amount, ETHER_DECIMALS)?;
                self.chain.native().fund(&account(who)?, value)?;
                writeln!(out, "[{n}] fund {who} {amount} ETH")?;
            }
            Step::Mint { token, to, amount } => {
                let id = self.token(token)?;
                let info = self
                    .chain
                    .tokens()
                    .token_info(&id)
                    .with_context(|| format!("unknown token '{token}'"))?;
                let value = parse_units(amount, info.decimals)?;
                self.chain
                    .tokens()
                    .mint(&id, &info.issuer, &account(to)?, value)?;
                writeln!(out, "[{n}] mint {amount} {} to {to}", info.symbol)?;
            }
            Step::Approve {
                account: who,
                token,
                amount,
            } => {
                let id = self.token(token)?;
                let value = parse_units(amount, self.decimals(&Asset::Token(id))?)?;
                self.chain
                    .tokens()
                    .approve(&id, &account(who)?, &self.vault.custodian(), value)?;
                writeln!(out, "[{n}] approve {who} {amount} {token} for the vault")?;
            }
            Step::DepositNative { account: who, amount } => {
                let caller = account(who)?;
                let value = parse_units(amount, ETHER_DECIMALS)?;
                let started = Instant::now();
                let result = self.vault.deposit_native(&caller, value);
                self.report(n, step, who, amount, Asset::Native, result, started, metrics, out)?;
            }
            Step::WithdrawNative { account: who, amount } => {
                let caller = account(who)?;
                let value = parse_units(amount, ETHER_DECIMALS)?;
                let started = Instant::now();
                let result = self.vault.withdraw_native(&caller, value);
                self.report(n, step, who, amount, Asset::Native, result, started, metrics, out)?;
            }
            Step::DepositToken {
                account: who,
                token,
                amount,
            } => {
                let caller = account(who)?;
                let id = self.token(token)?;
                let value = parse_units(amount, self.decimals(&Asset::Token(id))?)?;
                let started = Instant::now();
                let result = self.vault.deposit_token(&caller, &id, value);
                self.report(n, step, who, amount, Asset::Token(id), result, started, metrics, out)?;
            }
            Step::WithdrawToken {
                account: who,
                token,
                amount,
            } => {
                let caller = account(who)?;
                let id = self.token(token)?;
                let value = parse_units(amount, self.decimals(&Asset::Token(id))?)?;
                let started = Instant::now();
                let result = self.vault.withdraw_token(&caller, &id, value);
                self.report(n, step, who, amount, Asset::Token(id), result, started, metrics, out)?;
            }
            Step::Wrap { account: who, amount } => {
                let caller = account(who)?;
                let value = parse_units(amount, ETHER_DECIMALS)?;
                let wrapped = Asset::Token(self.vault.wrapped_token());
                let started = Instant::now();
                let result = self.vault.wrap_native(&caller, value);
                self.report(n, step, who, amount, wrapped, result, started, metrics, out)?;
            }
            Step::Unwrap { account: who, amount } => {
                let caller = account(who)?;
                let value = parse_units(amount, ETHER_DECIMALS)?;
                let started = Instant::now();
                let result = self.vault.unwrap_wrapped(&caller, value);
                self.report(n, step, who, amount, Asset::Native, result, started, metrics, out)?;
            }
            Step::Balance { account: who, asset } => {
                let resolved = self.asset(asset)?;
                let balance = self.balance(&account(who)?, &resolved);
                let shown = format_units(balance, self.decimals(&resolved)?)?;
                writeln!(out, "[{n}] balance {who} {asset} = {shown}")?;
            }
            Step::ExpectBalance {
                account: who,
                asset,
                amount,
            } => {
                let resolved = self.asset(asset)?;
                let decimals = self.decimals(&resolved)?;
                let expected = parse_units(amount, decimals)?;
                let actual = self.balance(&account(who)?, &resolved);
                if actual != expected {
                    bail!(
                        "expected {who} to hold {amount} {asset} in the vault, found {}",
                        format_units(actual, decimals)?
                    );
                }
                writeln!(out, "[{n}] expect_balance {who} {asset} = {amount} ok")?;
            }
        }
        Ok(())
    }

    /// Records and prints the outcome of a vault operation. A failed
    /// operation is counted, not propagated.
    #[allow(clippy::too_many_arguments)]
    fn report(
        &mut self,
        n: usize,
        step: &Step,
        who: &str,
        amount: &str,
        balance_asset: Asset,
        result: Result<Amount, VaultError>,
        started: Instant,
        metrics: &VaultMetrics,
        out: &mut impl Write,
    ) -> Result<()> {
        let op = step.name();
        metrics.observe(op, result.is_ok(), started.elapsed());
        match result {
            Ok(balance) => {
                self.succeeded += 1;
                let shown = format_units(balance, self.decimals(&balance_asset)?)?;
                writeln!(out, "[{n}] {op} {who} {amount} -> ok (balance {shown})")?;
            }
            Err(err) => {
                self.failed += 1;
                warn!(step = n, op, account = who, amount, error = %err, "operation failed");
                writeln!(out, "[{n}] {op} {who} {amount} -> failed: {err}")?;
            }
        }
        Ok(())
    }

    fn balance(&self, who: &Address, asset: &Asset) -> Amount {
        match asset {
            Asset::Native => self.vault.native_balance(who),
            Asset::Token(token) => self.vault.token_balance(who, token),
        }
    }

    fn decimals(&self, asset: &Asset) -> Result<u8> {
        match asset {
            Asset::Native => Ok(ETHER_DECIMALS),
            Asset::Token(token) => self
                .chain
                .tokens()
                .token_info(token)
                .map(|info| info.decimals)
                .with_context(|| format!("unknown token {token}")),
        }
    }

    /// `ETH` / `native`, or a token reference.
    fn asset(&self, reference: &str) -> Result<Asset> {
        if reference.eq_ignore_ascii_case("eth") || reference.eq_ignore_ascii_case("native") {
            return Ok(Asset::Native);
        }
        Ok(Asset::Token(self.token(reference)?))
    }

    /// A token symbol, or the hex address of a deployed token.
    fn token(&self, reference: &str) -> Result<TokenId> {
        if let Some(token) = self.chain.tokens().find_by_symbol(reference) {
            return Ok(token);
        }
        let address: Address = reference
            .parse()
            .with_context(|| format!("unknown token '{reference}'"))?;
        if self.chain.tokens().token_info(&address).is_none() {
            bail!("no token deployed at {address}");
        }
        Ok(address)
    }
}

/// A `0x` hex address, or a label hashed into one.
fn account(reference: &str) -> Result<Address> {
    if reference.starts_with("0x") || reference.starts_with("0X") {
        return reference
            .parse()
            .with_context(|| format!("invalid address '{reference}'"));
    }
    Ok(Address::derive(reference))
}
