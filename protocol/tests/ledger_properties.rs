//! Randomized operation sequences against the vault ledger.
//!
//! Each run drives a vault through a few thousand seeded operations over a
//! handful of accounts, with the external primitives failing at random. After
//! every step the vault is compared to a plain shadow model and to what its
//! custody account actually holds:
//!
//! - balances match the model exactly (failed operations change nothing);
//! - custody holdings equal the ledger totals for every asset;
//! - the journal grows by exactly one record per successful operation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use vault_protocol::config::VaultConfig;
use vault_protocol::primitives::{Address, Amount, TokenId};
use vault_protocol::vault::{
    Asset, AssetWrapper, Collaborators, NativeAsset, TokenTransfer, TransferError, Vault,
    VaultError,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

/// Holdings keyed by `(asset, holder)`, with failures injected on demand.
#[derive(Default)]
struct Custody {
    holdings: Mutex<HashMap<(Asset, Address), Amount>>,
    /// Number of upcoming calls that must fail.
    fail_next: AtomicU32,
    weth: TokenId,
}

impl Custody {
    fn held(&self, asset: Asset, who: &Address) -> Amount {
        self.holdings.lock().get(&(asset, *who)).copied().unwrap_or(0)
    }

    fn fund(&self, asset: Asset, who: &Address, amount: Amount) {
        *self.holdings.lock().entry((asset, *who)).or_insert(0) += amount;
    }

    fn step(
        &self,
        operation: &'static str,
        asset: Asset,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TransferError> {
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(TransferError::new(operation, "injected failure"));
        }
        let mut holdings = self.holdings.lock();
        let src = holdings.entry((asset, *from)).or_insert(0);
        if *src < amount {
            return Err(TransferError::new(operation, "short"));
        }
        *src -= amount;
        *holdings.entry((asset, *to)).or_insert(0) += amount;
        Ok(())
    }
}

impl NativeAsset for Custody {
    fn transfer(&self, from: &Address, to: &Address, amount: Amount) -> Result<(), TransferError> {
        self.step("native transfer", Asset::Native, from, to, amount)
    }
}

impl TokenTransfer for Custody {
    fn pull(&self, token: &TokenId, from: &Address, to: &Address, amount: Amount) -> Result<(), TransferError> {
        self.step("token pull", Asset::Token(*token), from, to, amount)
    }

    fn push(&self, token: &TokenId, from: &Address, to: &Address, amount: Amount) -> Result<(), TransferError> {
        self.step("token push", Asset::Token(*token), from, to, amount)
    }
}

impl AssetWrapper for Custody {
    fn wrapped_token(&self) -> TokenId {
        self.weth
    }

    fn wrap(&self, holder: &Address, amount: Amount) -> Result<(), TransferError> {
        self.step("wrap", Asset::Native, holder, &self.weth, amount)?;
        self.fund(Asset::Token(self.weth), holder, amount);
        Ok(())
    }

    fn unwrap(&self, holder: &Address, amount: Amount) -> Result<(), TransferError> {
        self.step("unwrap", Asset::Token(self.weth), holder, &Address::ZERO, amount)?;
        self.fund(Asset::Native, holder, amount);
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
enum Op {
    DepositNative,
    WithdrawNative,
    DepositToken(TokenId),
    WithdrawToken(TokenId),
    Wrap,
    Unwrap,
}

struct Harness {
    vault: Vault,
    custody: Arc<Custody>,
    accounts: Vec<Address>,
    tokens: Vec<TokenId>,
    model: HashMap<(Asset, Address), Amount>,
    successes: usize,
}

impl Harness {
    fn new(accounts: usize) -> Self {
        let custody = Arc::new(Custody {
            weth: Address::derive("weth"),
            ..Default::default()
        });
        let tokens = vec![custody.weth, Address::derive("usdc"), Address::derive("dai")];
        let accounts: Vec<Address> = (0..accounts)
            .map(|i| Address::derive(&format!("account-{i}")))
            .collect();
        for account in &accounts {
            custody.fund(Asset::Native, account, 1_000_000);
            for token in &tokens[1..] {
                custody.fund(Asset::Token(*token), account, 1_000_000);
            }
        }

        let collaborators =
            Collaborators::new(custody.clone(), custody.clone(), custody.clone());
        let config = VaultConfig::with_wrapped_token(custody.weth);
        let vault = Vault::new(config, collaborators).unwrap();

        Self {
            vault,
            custody,
            accounts,
            tokens,
            model: HashMap::new(),
            successes: 0,
        }
    }

    fn modelled(&self, asset: Asset, who: &Address) -> Amount {
        self.model.get(&(asset, *who)).copied().unwrap_or(0)
    }

    fn adjust(&mut self, asset: Asset, who: &Address, delta: i128) {
        let cell = self.model.entry((asset, *who)).or_insert(0);
        *cell = (*cell as i128 + delta) as Amount;
    }

    /// Runs one operation and checks the outcome against the model.
    fn apply(&mut self, op: Op, who: Address, amount: Amount, inject_failure: bool) {
        let weth = Asset::Token(self.custody.weth);
        let (debit_asset, credit_asset, outside) = match op {
            Op::DepositNative => (None, Some(Asset::Native), Some(Asset::Native)),
            Op::WithdrawNative => (Some(Asset::Native), None, None),
            Op::DepositToken(t) => (None, Some(Asset::Token(t)), Some(Asset::Token(t))),
            Op::WithdrawToken(t) => (Some(Asset::Token(t)), None, None),
            Op::Wrap => (Some(Asset::Native), Some(weth), None),
            Op::Unwrap => (Some(weth), Some(Asset::Native), None),
        };

        let short = debit_asset.map_or(false, |asset| self.modelled(asset, &who) < amount);
        let unfunded = outside.map_or(false, |asset| self.custody.held(asset, &who) < amount);

        if inject_failure {
            self.custody.fail_next.store(1, Ordering::SeqCst);
        }

        let result = match op {
            Op::DepositNative => self.vault.deposit_native(&who, amount),
            Op::WithdrawNative => self.vault.withdraw_native(&who, amount),
            Op::DepositToken(t) => self.vault.deposit_token(&who, &t, amount),
            Op::WithdrawToken(t) => self.vault.withdraw_token(&who, &t, amount),
            Op::Wrap => self.vault.wrap_native(&who, amount),
            Op::Unwrap => self.vault.unwrap_wrapped(&who, amount),
        };
        // An injected failure the vault never reached must not leak into
        // the next step.
        self.custody.fail_next.store(0, Ordering::SeqCst);

        if amount == 0 {
            assert!(result.is_ok(), "{op:?} of zero failed: {result:?}");
            return;
        }
        if short {
            assert!(
                matches!(result, Err(VaultError::InsufficientBalance { .. })),
                "{op:?} {amount} by {who} should be short, got {result:?}"
            );
            return;
        }
        if inject_failure || unfunded {
            assert!(
                matches!(result, Err(VaultError::TransferFailed(_))),
                "{op:?} {amount} by {who} should fail to transfer, got {result:?}"
            );
            return;
        }

        let balance = result.unwrap_or_else(|e| panic!("{op:?} {amount} by {who} failed: {e}"));
        if let Some(asset) = debit_asset {
            self.adjust(asset, &who, -(amount as i128));
        }
        if let Some(asset) = credit_asset {
            self.adjust(asset, &who, amount as i128);
        }
        let reported = credit_asset.or(debit_asset).unwrap_or(Asset::Native);
        assert_eq!(balance, self.modelled(reported, &who));
        self.successes += 1;
    }

    fn check_invariants(&self) {
        let custodian = self.vault.custodian();
        for account in &self.accounts {
            assert_eq!(self.vault.native_balance(account), self.modelled(Asset::Native, account));
            for token in &self.tokens {
                assert_eq!(
                    self.vault.token_balance(account, token),
                    self.modelled(Asset::Token(*token), account)
                );
            }
        }
        assert_eq!(self.vault.total_native(), self.custody.held(Asset::Native, &custodian));
        for token in &self.tokens {
            assert_eq!(
                self.vault.total_token(token),
                self.custody.held(Asset::Token(*token), &custodian)
            );
        }
        assert_eq!(self.vault.events().len(), self.successes);
    }
}

fn random_op(rng: &mut StdRng, tokens: &[TokenId]) -> Op {
    let token = tokens[rng.gen_range(0..tokens.len())];
    match rng.gen_range(0..6) {
        0 => Op::DepositNative,
        1 => Op::WithdrawNative,
        2 => Op::DepositToken(token),
        3 => Op::WithdrawToken(token),
        4 => Op::Wrap,
        _ => Op::Unwrap,
    }
}

fn run(seed: u64, steps: usize) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut harness = Harness::new(5);
    for _ in 0..steps {
        let op = random_op(&mut rng, &harness.tokens);
        let who = harness.accounts[rng.gen_range(0..harness.accounts.len())];
        let amount = match rng.gen_range(0..10) {
            0 => 0,
            1 => rng.gen_range(500_000..2_000_000),
            _ => rng.gen_range(1..50_000),
        };
        let inject_failure = rng.gen_ratio(1, 10);
        harness.apply(op, who, amount, inject_failure);
        harness.check_invariants();
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn random_sequences_match_model_and_stay_solvent() {
    for seed in [1, 7, 42, 1337] {
        run(seed, 2_000);
    }
}

#[test]
fn event_sequence_numbers_are_gap_free() {
    let mut rng = StdRng::seed_from_u64(99);
    let mut harness = Harness::new(3);
    for _ in 0..500 {
        let op = random_op(&mut rng, &harness.tokens);
        let who = harness.accounts[rng.gen_range(0..harness.accounts.len())];
        let amount = rng.gen_range(0..20_000);
        harness.apply(op, who, amount, rng.gen_ratio(1, 8));
    }
    let seqs: Vec<u64> = harness.vault.events().iter().map(|r| r.seq).collect();
    let expected: Vec<u64> = (1..=seqs.len() as u64).collect();
    assert_eq!(seqs, expected);
}
