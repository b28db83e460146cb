//! # Built-in Demo Scenario
//!
//! The three reference scenarios (native deposit/withdraw, USDC
//! deposit/withdraw, wrap/unwrap) as a replay script. Each over-withdrawal
//! is expected to be rejected, and the closing `expect_balance` steps prove
//! that the rejections left every balance untouched.

use crate::replay::Step;

fn deposit_native(account: &str, amount: &str) -> Step {
    Step::DepositNative {
        account: account.into(),
        amount: amount.into(),
    }
}

fn withdraw_native(account: &str, amount: &str) -> Step {
    Step::WithdrawNative {
        account: account.into(),
        amount: amount.into(),
    }
}

fn wrap(account: &str, amount: &str) -> Step {
    Step::Wrap {
        account: account.into(),
        amount: amount.into(),
    }
}

fn unwrap(account: &str, amount: &str) -> Step {
    Step::Unwrap {
        account: account.into(),
        amount: amount.into(),
    }
}

fn expect(account: &str, asset: &str, amount: &str) -> Step {
    Step::ExpectBalance {
        account: account.into(),
        asset: asset.into(),
        amount: amount.into(),
    }
}

/// The demo script.
pub fn script() -> Vec<Step> {
    vec![
        // Native asset.
        Step::Fund {
            account: "user".into(),
            amount: "10".into(),
        },
        deposit_native("user", "1.0"),
        withdraw_native("user", "0.5"),
        withdraw_native("user", "2.0"),
        expect("user", "ETH", "0.5"),
        // Tokens.
        Step::CreateToken {
            name: "USD Coin".into(),
            symbol: "USDC".into(),
            decimals: 6,
            issuer: "owner".into(),
        },
        Step::Mint {
            token: "USDC".into(),
            to: "owner".into(),
            amount: "1000".into(),
        },
        Step::Approve {
            account: "owner".into(),
            token: "USDC".into(),
            amount: "100".into(),
        },
        Step::DepositToken {
            account: "owner".into(),
            token: "USDC".into(),
            amount: "100".into(),
        },
        Step::WithdrawToken {
            account: "owner".into(),
            token: "USDC".into(),
            amount: "200".into(),
        },
        expect("owner", "USDC", "100"),
        Step::WithdrawToken {
            account: "owner".into(),
            token: "USDC".into(),
            amount: "50".into(),
        },
        expect("owner", "USDC", "50"),
        // Wrap / unwrap.
        Step::Fund {
            account: "owner".into(),
            amount: "5".into(),
        },
        deposit_native("owner", "1.0"),
        wrap("owner", "1.0"),
        expect("owner", "WETH", "1.0"),
        expect("owner", "ETH", "0"),
        unwrap("owner", "0.5"),
        unwrap("owner", "2.0"),
        expect("owner", "WETH", "0.5"),
        expect("owner", "ETH", "0.5"),
    ]
}
