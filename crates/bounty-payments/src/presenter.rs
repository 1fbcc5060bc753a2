//! Maps attempt snapshots to what a payment dialog shows.
//!
//! The presenter is a pure function of a [`PaymentAttempt`] and a
//! [`ViewContext`]; renderers subscribe to the orchestrator and call
//! [`present`] on every snapshot.

use crate::amount;
use crate::attempt::{PaymentAttempt, PaymentPhase};
use crate::config::{BaseChainConfig, PaymentConfig};
use crate::error::RetryAffordance;
use crate::types::{CostEstimate, TokenRef};
use serde::Serialize;
use std::fmt;

/// Dialog step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModalStep {
    Confirm,
    Processing,
    Success,
    Error,
}

/// Settings the presenter needs from configuration.
#[derive(Debug, Clone)]
pub struct ViewContext {
    pub token: TokenRef,
    pub confirmations: u64,
    pub base: BaseChainConfig,
}

impl ViewContext {
    pub fn from_config(config: &PaymentConfig) -> Self {
        Self {
            token: config.token.clone(),
            confirmations: config.monitor.confirmations,
            base: config.base.clone(),
        }
    }
}

/// Everything a dialog renders for one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentView {
    pub step: ModalStep,
    pub title: String,
    pub message: String,
    pub amount: Option<String>,
    pub recipient: Option<String>,
    pub balance: Option<String>,
    pub gas: Option<String>,
    pub warning: Option<String>,
    pub transaction: Option<String>,
    pub explorer_link: Option<String>,
    pub confirmations: Option<String>,
    pub error: Option<String>,
    pub retry: Option<RetryAffordance>,
    /// The pay button is enabled.
    pub can_submit: bool,
}

/// `0x742d...2Ae1` style abbreviation. Short strings are returned as is.
pub fn short_hex(value: &str) -> String {
    if value.chars().count() <= 10 {
        return value.to_string();
    }
    let head: String = value.chars().take(6).collect();
    let tail: String = value
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("{}...{}", head, tail)
}

/// Button label for a retry affordance.
pub fn retry_label(retry: RetryAffordance) -> Option<&'static str> {
    match retry {
        RetryAffordance::EditRequest => Some("Edit payment"),
        RetryAffordance::TopUpBalance => Some("Top up balance"),
        RetryAffordance::TryAgain => Some("Try again"),
        RetryAffordance::CheckExplorer => Some("View on explorer"),
        RetryAffordance::None => None,
    }
}

fn step_for(phase: &PaymentPhase) -> ModalStep {
    match phase {
        PaymentPhase::Idle | PaymentPhase::AwaitingSubmission => ModalStep::Confirm,
        PaymentPhase::Validating
        | PaymentPhase::Estimating
        | PaymentPhase::Submitted
        | PaymentPhase::Confirming => ModalStep::Processing,
        PaymentPhase::Succeeded => ModalStep::Success,
        PaymentPhase::Failed(_) => ModalStep::Error,
    }
}

fn gas_hint(estimate: &CostEstimate) -> String {
    match estimate {
        CostEstimate::Quoted { gas_units } => format!("~{} gas", gas_units),
        CostEstimate::Fallback { gas_units, .. } => format!("~{} gas (default, estimate failed)", gas_units),
        CostEstimate::Unavailable { .. } => "unavailable".to_string(),
    }
}

/// Build the view for `attempt`.
pub fn present(attempt: &PaymentAttempt, ctx: &ViewContext) -> PaymentView {
    let decimals = ctx.token.decimals;
    let symbol = &ctx.token.symbol;
    let step = step_for(&attempt.phase);

    let amount = match (attempt.amount, attempt.request.as_ref()) {
        (Some(minor), _) => Some(format!("{} {}", amount::decode(minor, decimals), symbol)),
        (None, Some(request)) => Some(format!("{} {}", request.amount.trim(), symbol)),
        (None, None) => None,
    };
    let recipient = attempt
        .request
        .as_ref()
        .map(|request| short_hex(&request.recipient));
    let balance = attempt
        .balance
        .as_ref()
        .map(|b| format!("{} {}", amount::decode(b.amount, decimals), symbol));

    let warning = match (attempt.amount, attempt.balance.as_ref()) {
        (Some(minor), Some(b)) if !b.covers(minor) && !attempt.phase.is_terminal() => Some(format!(
            "Insufficient {} balance. You need {} {} but only have {} {}.",
            symbol,
            amount::decode(minor, decimals),
            symbol,
            amount::decode(b.amount, decimals),
            symbol
        )),
        _ => None,
    };

    let transaction = attempt
        .transaction_reference
        .as_ref()
        .map(|tx| short_hex(tx.as_str()));
    let explorer_link = attempt
        .transaction_reference
        .as_ref()
        .map(|tx| ctx.base.explorer_tx_url(tx.as_str()));
    let confirmations = attempt.transaction_reference.as_ref().map(|_| {
        format!(
            "{}/{}",
            attempt.confirmation_count.min(ctx.confirmations),
            ctx.confirmations
        )
    });

    let (title, message) = match &attempt.phase {
        PaymentPhase::Idle => ("Payment".to_string(), "No payment in progress.".to_string()),
        PaymentPhase::AwaitingSubmission => (
            "Confirm Payment".to_string(),
            match attempt.request.as_ref().and_then(|r| r.description.as_deref()) {
                Some(description) => format!("You're about to pay for: {}", description),
                None => "You're about to send a payment.".to_string(),
            },
        ),
        PaymentPhase::Validating => (
            "Processing Payment".to_string(),
            "Checking payment details...".to_string(),
        ),
        PaymentPhase::Estimating => (
            "Processing Payment".to_string(),
            "Estimating network fee...".to_string(),
        ),
        PaymentPhase::Submitted => (
            "Processing Payment".to_string(),
            "Transaction sent, waiting for it to be mined...".to_string(),
        ),
        PaymentPhase::Confirming => (
            "Processing Payment".to_string(),
            "Waiting for confirmations. This may take a few moments.".to_string(),
        ),
        PaymentPhase::Succeeded => (
            "Payment Successful!".to_string(),
            format!(
                "Your payment of {} has been sent successfully.",
                amount.clone().unwrap_or_default()
            ),
        ),
        PaymentPhase::Failed(_) => (
            "Payment Failed".to_string(),
            "There was an error processing your payment.".to_string(),
        ),
    };

    let error = attempt.terminal_error().map(ToString::to_string);
    let retry = attempt.terminal_error().map(|e| e.retry_affordance());

    PaymentView {
        can_submit: attempt.phase == PaymentPhase::AwaitingSubmission && warning.is_none(),
        step,
        title,
        message,
        amount,
        recipient,
        balance,
        gas: attempt.cost_estimate.as_ref().map(gas_hint),
        warning,
        transaction,
        explorer_link,
        confirmations,
        error,
        retry,
    }
}

impl fmt::Display for PaymentView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== {} ==", self.title)?;
        writeln!(f, "{}", self.message)?;

        let rows = [
            ("Amount", &self.amount),
            ("Recipient", &self.recipient),
            ("Your balance", &self.balance),
            ("Est. gas", &self.gas),
            ("Transaction", &self.transaction),
            ("Confirmations", &self.confirmations),
            ("Explorer", &self.explorer_link),
        ];
        for (label, value) in rows {
            if let Some(value) = value {
                writeln!(f, "  {:<14} {}", format!("{}:", label), value)?;
            }
        }

        if let Some(warning) = &self.warning {
            writeln!(f, "  ! {}", warning)?;
        }
        if let Some(error) = &self.error {
            writeln!(f, "  Error: {}", error)?;
        }
        if let Some(label) = self.retry.and_then(retry_label) {
            writeln!(f, "  [{}]", label)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PaymentError, ValidationError};
    use crate::types::{BalanceSnapshot, MinorAmount, PaymentRequest, TransactionReference};

    const RECIPIENT: &str = "0x742d35Cc6634C0532925a3b8D0Ac6d7d3f8b2Ae1";
    const TX: &str = "0x9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    fn ctx() -> ViewContext {
        ViewContext::from_config(&PaymentConfig::default())
    }

    fn prepared(balance: u128) -> PaymentAttempt {
        let mut attempt = PaymentAttempt::start(
            PaymentRequest::new("10.5", RECIPIENT).with_description("Payment for bounty: Audit"),
        );
        attempt.amount = Some(MinorAmount(10_500_000));
        attempt.advance(PaymentPhase::Estimating).unwrap();
        attempt.cost_estimate = Some(CostEstimate::Quoted { gas_units: 65_000 });
        attempt.balance = Some(BalanceSnapshot::new(RECIPIENT, MinorAmount(balance)));
        attempt.advance(PaymentPhase::AwaitingSubmission).unwrap();
        attempt
    }

    #[test]
    fn test_short_hex() {
        assert_eq!(short_hex(RECIPIENT), "0x742d...2Ae1");
        assert_eq!(short_hex("0x1234"), "0x1234");
    }

    #[test]
    fn test_confirm_step() {
        let view = present(&prepared(50_000_000), &ctx());

        assert_eq!(view.step, ModalStep::Confirm);
        assert_eq!(view.title, "Confirm Payment");
        assert_eq!(view.message, "You're about to pay for: Payment for bounty: Audit");
        assert_eq!(view.amount.as_deref(), Some("10.500000 USDC"));
        assert_eq!(view.recipient.as_deref(), Some("0x742d...2Ae1"));
        assert_eq!(view.balance.as_deref(), Some("50.000000 USDC"));
        assert_eq!(view.gas.as_deref(), Some("~65000 gas"));
        assert!(view.warning.is_none());
        assert!(view.can_submit);
    }

    #[test]
    fn test_insufficient_balance_warning_disables_submit() {
        let view = present(&prepared(1_000_000), &ctx());

        assert_eq!(
            view.warning.as_deref(),
            Some("Insufficient USDC balance. You need 10.500000 USDC but only have 1.000000 USDC.")
        );
        assert!(!view.can_submit);
    }

    #[test]
    fn test_fallback_gas_is_labelled() {
        let mut attempt = prepared(50_000_000);
        attempt.cost_estimate = Some(CostEstimate::Fallback {
            gas_units: 100_000,
            reason: "rpc down".into(),
        });
        let view = present(&attempt, &ctx());
        assert!(view.gas.unwrap().contains("estimate failed"));
    }

    #[test]
    fn test_confirming_shows_counter_and_link() {
        let mut attempt = prepared(50_000_000);
        attempt.transaction_reference = Some(TransactionReference::new(TX));
        attempt.advance(PaymentPhase::Submitted).unwrap();
        attempt.advance(PaymentPhase::Confirming).unwrap();
        attempt.record_confirmations(2);

        let view = present(&attempt, &ctx());
        assert_eq!(view.step, ModalStep::Processing);
        assert_eq!(view.confirmations.as_deref(), Some("2/3"));
        assert_eq!(view.transaction.as_deref(), Some("0x9f86...0a08"));
        assert_eq!(
            view.explorer_link.as_deref(),
            Some(format!("https://basescan.org/tx/{}", TX).as_str())
        );
        assert!(!view.can_submit);
    }

    #[test]
    fn test_success_step() {
        let mut attempt = prepared(50_000_000);
        attempt.transaction_reference = Some(TransactionReference::new(TX));
        attempt.advance(PaymentPhase::Submitted).unwrap();
        attempt.advance(PaymentPhase::Confirming).unwrap();
        attempt.record_confirmations(4);
        attempt.advance(PaymentPhase::Succeeded).unwrap();

        let view = present(&attempt, &ctx());
        assert_eq!(view.step, ModalStep::Success);
        assert_eq!(view.title, "Payment Successful!");
        assert_eq!(
            view.message,
            "Your payment of 10.500000 USDC has been sent successfully."
        );
        assert_eq!(view.confirmations.as_deref(), Some("3/3"));
        assert!(view.error.is_none());
        assert!(view.retry.is_none());
    }

    #[test]
    fn test_error_kinds_get_distinct_affordances() {
        let mut low = prepared(1_000_000);
        low.fail(PaymentError::InsufficientBalance {
            required: "10.500000".into(),
            available: "1.000000".into(),
        })
        .unwrap();
        let mut rejected = prepared(50_000_000);
        rejected
            .fail(PaymentError::SubmissionRejected("User denied".into()))
            .unwrap();

        let low_view = present(&low, &ctx());
        let rejected_view = present(&rejected, &ctx());

        assert_eq!(low_view.step, ModalStep::Error);
        assert_eq!(low_view.retry, Some(RetryAffordance::TopUpBalance));
        assert!(low_view.warning.is_none());
        assert_eq!(rejected_view.retry, Some(RetryAffordance::TryAgain));
        assert_eq!(
            rejected_view.error.as_deref(),
            Some("Transaction rejected in wallet: User denied")
        );
    }

    #[test]
    fn test_validation_failure_before_amount_parsed() {
        let mut attempt = PaymentAttempt::start(PaymentRequest::new(" abc ", "0x123"));
        attempt
            .fail(ValidationError::NonPositiveAmount("abc".into()).into())
            .unwrap();

        let view = present(&attempt, &ctx());
        assert_eq!(view.amount.as_deref(), Some("abc USDC"));
        assert_eq!(view.recipient.as_deref(), Some("0x123"));
        assert_eq!(view.retry, Some(RetryAffordance::EditRequest));
        assert_eq!(retry_label(RetryAffordance::EditRequest), Some("Edit payment"));
    }

    #[test]
    fn test_display_renders_rows() {
        let rendered = present(&prepared(50_000_000), &ctx()).to_string();
        assert!(rendered.starts_with("== Confirm Payment ==\n"));
        assert!(rendered.contains("Amount:        10.500000 USDC"));
        assert!(rendered.contains("Recipient:     0x742d...2Ae1"));
        assert!(!rendered.contains("Transaction:"));
    }
}
