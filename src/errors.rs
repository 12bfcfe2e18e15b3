//! Error taxonomy for a distribution attempt and the classifier that maps raw
//! chain failures into it.

use crate::chain::ChainError;
use crate::recipients::InputError;
use ethers::types::{TxHash, U256};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("wallet is not connected")]
    NotConnected,
    #[error("connected to chain {actual}, but this distribution targets chain {expected}")]
    WrongNetwork { expected: u64, actual: u64 },
    #[error("switch to chain {0} was declined")]
    NetworkSwitchDeclined(u64),
    #[error("chain {0} has no known RPC endpoint")]
    UnsupportedNetwork(u64),
    #[error("the signature request was rejected")]
    Rejected,
    #[error("the wallet account or network changed")]
    SessionChanged,
    #[error("wallet unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("transaction reverted{}", .reason.as_deref().map(|r| format!(": {}", r)).unwrap_or_default())]
    Reverted { reason: Option<String> },
    #[error("gas estimation failed: {0}")]
    GasEstimation(String),
    #[error("no confirmation within {0}s; the transaction may still be mined")]
    ConfirmationTimeout(u64),
    #[error("transaction failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApprovalFailure {
    #[error("approval was rejected in the wallet")]
    Rejected,
    #[error("approval transaction {0:?} reverted")]
    Reverted(TxHash),
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OwnershipFailure {
    #[error("owned by {0:?}")]
    NotOwner(ethers::types::Address),
    #[error("ownership could not be read: {0}")]
    Unreadable(String),
}

/// Every failure a distribution attempt can end with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistributionError {
    #[error("{} invalid line(s); first: {}", .0.len(), .0.first().map(|e| e.to_string()).unwrap_or_default())]
    Input(Vec<InputError>),
    #[error("no recipients to send to")]
    NoRecipients,
    #[error("token contract is not loaded")]
    AssetNotLoaded,
    #[error("invalid token contract: {0}")]
    InvalidContract(String),
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),
    #[error("token id {token_id} cannot be sent: {reason}")]
    Ownership { token_id: U256, reason: OwnershipFailure },
    #[error("approval failed: {0}")]
    Approval(ApprovalFailure),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error("network error: {0}")]
    Network(String),
    #[error("another distribution is already in progress")]
    Busy,
}

/// Coarse grouping for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Wallet,
    InsufficientBalance,
    Ownership,
    Approval,
    Transaction,
    Network,
    Busy,
}

impl DistributionError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            DistributionError::Input(_)
            | DistributionError::NoRecipients
            | DistributionError::AssetNotLoaded
            | DistributionError::InvalidContract(_) => ErrorCategory::Input,
            DistributionError::Wallet(_) => ErrorCategory::Wallet,
            DistributionError::InsufficientBalance(_) => ErrorCategory::InsufficientBalance,
            DistributionError::Ownership { .. } => ErrorCategory::Ownership,
            DistributionError::Approval(_) => ErrorCategory::Approval,
            DistributionError::Transaction(_) => ErrorCategory::Transaction,
            DistributionError::Network(_) => ErrorCategory::Network,
            DistributionError::Busy => ErrorCategory::Busy,
        }
    }

    /// What the user can do about it
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            DistributionError::Input(_) => Some("Fix the highlighted lines and submit again."),
            DistributionError::NoRecipients => Some("Enter at least one `address=value` line."),
            DistributionError::AssetNotLoaded => Some("Enter the token contract address and press Load."),
            DistributionError::InvalidContract(_) => Some("Check the contract address and the selected asset type."),
            DistributionError::Wallet(WalletError::NotConnected) => Some("Connect a wallet first."),
            DistributionError::Wallet(WalletError::WrongNetwork { .. })
            | DistributionError::Wallet(WalletError::NetworkSwitchDeclined(_)) => {
                Some("Switch the wallet to the selected network and submit again.")
            }
            DistributionError::Wallet(WalletError::Rejected) => {
                Some("The request was rejected. Submit again and approve it in the wallet.")
            }
            DistributionError::InsufficientBalance(_) => Some("Lower the amounts or top up the balance."),
            DistributionError::Ownership { .. } => Some("Remove token ids the connected account does not own."),
            DistributionError::Network(_) => Some("Check the RPC endpoint and refresh."),
            _ => None,
        }
    }
}

/// Pipeline step a raw failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Read,
    Approval,
    Disperse,
}

fn is_user_rejection(lower: &str) -> bool {
    lower.contains("user rejected")
        || lower.contains("user denied")
        || lower.contains("rejected by user")
        || lower.contains("denied by the user")
        || lower.contains("action_rejected")
        || lower.contains("code: 4001")
        // Ledger: conditions of use not satisfied
        || lower.contains("6985")
}

fn is_insufficient_funds(lower: &str) -> bool {
    lower.contains("insufficient funds") || lower.contains("exceeds balance")
}

fn is_network_failure(lower: &str) -> bool {
    lower.contains("error sending request")
        || lower.contains("connection refused")
        || lower.contains("connection reset")
        || lower.contains("dns error")
        || lower.contains("timed out")
        || lower.contains("unreachable")
        || lower.contains("502 bad gateway")
        || lower.contains("503 service unavailable")
        || lower.contains("too many requests")
}

/// Byte offset of an ASCII `needle` in `haystack`, ignoring ASCII case.
/// Always a char boundary of `haystack`.
fn find_ascii_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    let bytes = haystack.as_bytes();
    haystack.char_indices().map(|(i, _)| i).find(|&i| {
        bytes
            .get(i..i + needle.len())
            .is_some_and(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
    })
}

fn revert_reason(message: &str) -> Option<Option<String>> {
    let idx = find_ascii_ignore_case(message, "execution reverted")
        .or_else(|| find_ascii_ignore_case(message, "revert"))?;
    let rest = &message[idx..];
    let reason = rest
        .split_once(':')
        .map(|(_, r)| r.trim().trim_end_matches(')').trim_matches('"').to_string())
        .filter(|r| !r.is_empty());
    Some(reason)
}

/// Map a raw chain failure into the taxonomy. Nothing passes through unclassified.
pub fn classify(error: &ChainError, stage: Stage) -> DistributionError {
    let message = error.message().to_string();
    let lower = message.to_lowercase();

    if let ChainError::ConfirmationTimeout(secs) = error {
        return DistributionError::Transaction(TransactionError::ConfirmationTimeout(*secs));
    }
    if is_network_failure(&lower) {
        return DistributionError::Network(message);
    }

    if stage == Stage::Approval {
        return if is_user_rejection(&lower) {
            DistributionError::Approval(ApprovalFailure::Rejected)
        } else {
            DistributionError::Approval(ApprovalFailure::Failed(error.to_string()))
        };
    }

    if is_user_rejection(&lower) {
        return DistributionError::Wallet(WalletError::Rejected);
    }
    if is_insufficient_funds(&lower) {
        return DistributionError::InsufficientBalance(message);
    }
    if let Some(reason) = revert_reason(&message) {
        return match error {
            ChainError::GasEstimation(_) => {
                DistributionError::Transaction(TransactionError::GasEstimation(message))
            }
            _ => DistributionError::Transaction(TransactionError::Reverted { reason }),
        };
    }

    match error {
        ChainError::GasEstimation(_) => DistributionError::Transaction(TransactionError::GasEstimation(message)),
        ChainError::Rpc(_) if stage == Stage::Read => DistributionError::Network(message),
        _ => DistributionError::Transaction(TransactionError::Failed(error.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_rejection_is_wallet_error() {
        let err = ChainError::Signer("MetaMask Tx Signature: User denied transaction signature.".into());
        assert_eq!(classify(&err, Stage::Disperse), DistributionError::Wallet(WalletError::Rejected));
    }

    #[test]
    fn test_ledger_rejection_code() {
        let err = ChainError::Signer("Ledger device: APDU_CODE_CONDITIONS_NOT_SATISFIED (0x6985)".into());
        assert_eq!(classify(&err, Stage::Disperse), DistributionError::Wallet(WalletError::Rejected));
    }

    #[test]
    fn test_rejection_during_approval_is_approval_error() {
        let err = ChainError::Signer("user rejected transaction".into());
        assert_eq!(
            classify(&err, Stage::Approval),
            DistributionError::Approval(ApprovalFailure::Rejected)
        );
    }

    #[test]
    fn test_insufficient_funds() {
        let err = ChainError::Rpc("(code: -32000, message: insufficient funds for gas * price + value)".into());
        assert_eq!(classify(&err, Stage::Disperse).category(), ErrorCategory::InsufficientBalance);
    }

    #[test]
    fn test_revert_reason_is_extracted() {
        let err = ChainError::Rpc("execution reverted: ERC20: transfer amount exceeds allowance".into());
        match classify(&err, Stage::Disperse) {
            DistributionError::Transaction(TransactionError::Reverted { reason }) => {
                assert_eq!(reason.as_deref(), Some("ERC20: transfer amount exceeds allowance"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_revert_after_non_ascii_text() {
        let err = ChainError::Rpc(format!("{} revert", "İ".repeat(10)));
        assert!(matches!(
            classify(&err, Stage::Disperse),
            DistributionError::Transaction(TransactionError::Reverted { reason: None })
        ));

        let err = ChainError::Rpc("İİ Execution Reverted: Ünknown owner".into());
        match classify(&err, Stage::Disperse) {
            DistributionError::Transaction(TransactionError::Reverted { reason }) => {
                assert_eq!(reason.as_deref(), Some("Ünknown owner"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_gas_estimation_revert_stays_gas_estimation() {
        let err = ChainError::GasEstimation("execution reverted".into());
        assert!(matches!(
            classify(&err, Stage::Disperse),
            DistributionError::Transaction(TransactionError::GasEstimation(_))
        ));
    }

    #[test]
    fn test_network_failures() {
        let err = ChainError::Rpc("error sending request for url (https://rpc.example): connection refused".into());
        assert_eq!(classify(&err, Stage::Read).category(), ErrorCategory::Network);
        assert_eq!(classify(&err, Stage::Approval).category(), ErrorCategory::Network);
    }

    #[test]
    fn test_timeout_keeps_its_own_kind() {
        let err = ChainError::ConfirmationTimeout(180);
        assert_eq!(
            classify(&err, Stage::Disperse),
            DistributionError::Transaction(TransactionError::ConfirmationTimeout(180))
        );
    }

    #[test]
    fn test_unknown_failure_keeps_raw_message() {
        let err = ChainError::Signer("something odd happened".into());
        match classify(&err, Stage::Disperse) {
            DistributionError::Transaction(TransactionError::Failed(raw)) => {
                assert!(raw.contains("something odd happened"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_input_error_message_names_first_line() {
        let errors = crate::recipients::parse_recipients("bad", crate::types::AssetMode::Native, 18).errors;
        let message = DistributionError::Input(errors).to_string();
        assert!(message.starts_with("1 invalid line(s); first: line 1:"));
    }
}
