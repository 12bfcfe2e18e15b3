//! Builds the single disperse transaction for a batch, submits it once and
//! follows it to a terminal state.

use crate::chain::{ChainClient, Confirmation, ContractCall};
use crate::config::tx_explorer_url;
use crate::contracts;
use crate::errors::{self, ApprovalFailure, DistributionError, Stage, TransactionError};
use crate::recipients::sum_amounts;
use crate::types::{AssetMode, RecipientEntry, TransactionRecord, TxKind};
use crate::utils;
use ethers::types::{Address, U256};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

/// Pipeline progress reported while a submission runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    CheckingOwnership,
    Approving,
    Submitting,
    /// Broadcast and waiting for a receipt
    Submitted(TransactionRecord),
    /// Reached Confirmed or Failed
    Settled(TransactionRecord),
}

/// Where progress goes. Without a receiver, updates are dropped.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    sender: Option<UnboundedSender<Progress>>,
}

impl ProgressSink {
    pub fn new(sender: UnboundedSender<Progress>) -> Self {
        Self { sender: Some(sender) }
    }

    pub fn emit(&self, progress: Progress) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(progress);
        }
    }
}

/// Recipients and values in input order, ready to encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisperseBatch {
    pub mode: AssetMode,
    pub token: Option<Address>,
    pub recipients: Vec<Address>,
    pub values: Vec<U256>,
    /// Sum of amounts; zero for NFTs
    pub total: U256,
}

impl DisperseBatch {
    pub fn new(mode: AssetMode, token: Option<Address>, entries: &[RecipientEntry]) -> Result<Self, DistributionError> {
        if entries.is_empty() {
            return Err(DistributionError::NoRecipients);
        }
        if mode.requires_contract() && token.is_none() {
            return Err(DistributionError::AssetNotLoaded);
        }
        let recipients = entries.iter().map(|e| e.address).collect();
        let values = entries.iter().map(|e| e.value.raw()).collect();
        let total = match mode {
            AssetMode::Nft => U256::zero(),
            _ => sum_amounts(entries),
        };
        Ok(Self {
            mode,
            token,
            recipients,
            values,
            total,
        })
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    /// Disperse call for this batch. Native sends the total as value.
    pub fn to_call(&self, disperse: Address) -> Result<ContractCall, DistributionError> {
        let abi_failure = |e: contracts::AbiError| DistributionError::Transaction(TransactionError::Failed(e.to_string()));
        let (data, value, label) = match (self.mode, self.token) {
            (AssetMode::Native, _) => (
                contracts::encode_disperse_ether(&self.recipients, &self.values).map_err(abi_failure)?,
                self.total,
                "disperseEther",
            ),
            (AssetMode::Fungible, Some(token)) => (
                contracts::encode_disperse_token(token, &self.recipients, &self.values).map_err(abi_failure)?,
                U256::zero(),
                "disperseToken",
            ),
            (AssetMode::Nft, Some(token)) => (
                contracts::encode_disperse_nft(token, &self.recipients, &self.values).map_err(abi_failure)?,
                U256::zero(),
                "disperseNFT",
            ),
            (_, None) => return Err(DistributionError::AssetNotLoaded),
        };
        Ok(ContractCall {
            to: disperse,
            data,
            value,
            label,
        })
    }
}

/// Balance must still cover the batch right before signing
pub async fn recheck_balance(client: &dyn ChainClient, batch: &DisperseBatch, decimals: u8) -> Result<(), DistributionError> {
    if batch.mode == AssetMode::Nft {
        return Ok(());
    }
    let owner = client.account();
    let balance = crate::balance::get_balance(client, batch.mode, batch.token, owner).await?;
    if balance < batch.total {
        return Err(DistributionError::InsufficientBalance(format!(
            "need {}, have {}",
            utils::format_amount(batch.total, decimals),
            utils::format_amount(balance, decimals)
        )));
    }
    Ok(())
}

/// Submit `call` once and wait for its receipt.
///
/// The pending record is emitted as soon as the node accepts the transaction.
/// A timeout leaves it pending, since it may still be mined.
pub async fn send_and_confirm(
    client: &dyn ChainClient,
    call: ContractCall,
    kind: TxKind,
    stage: Stage,
    sink: &ProgressSink,
) -> Result<TransactionRecord, DistributionError> {
    let hash = client.submit(call).await.map_err(|e| errors::classify(&e, stage))?;
    let mut record = TransactionRecord::pending(hash, kind, tx_explorer_url(client.chain_id(), &format!("{:?}", hash)));
    sink.emit(Progress::Submitted(record.clone()));

    match client.wait_for_receipt(hash).await {
        Ok(Confirmation::Success { block_number, gas_used }) => {
            record.confirm(block_number, gas_used);
            sink.emit(Progress::Settled(record.clone()));
            Ok(record)
        }
        Ok(Confirmation::Reverted { .. }) => {
            record.fail("reverted");
            sink.emit(Progress::Settled(record.clone()));
            Err(match kind {
                TxKind::Approval => DistributionError::Approval(ApprovalFailure::Reverted(hash)),
                TxKind::Disperse => DistributionError::Transaction(TransactionError::Reverted { reason: None }),
            })
        }
        Err(e) => {
            let classified = errors::classify(&e, stage);
            if matches!(classified, DistributionError::Transaction(TransactionError::ConfirmationTimeout(_))) {
                warn!("{} {:?} still pending after timeout", kind.label(), hash);
            } else {
                record.fail(classified.to_string());
                sink.emit(Progress::Settled(record.clone()));
            }
            Err(classified)
        }
    }
}

/// Re-check funds, then send the disperse transaction exactly once.
pub async fn execute(
    client: &dyn ChainClient,
    batch: &DisperseBatch,
    disperse: Address,
    decimals: u8,
    sink: &ProgressSink,
) -> Result<TransactionRecord, DistributionError> {
    recheck_balance(client, batch, decimals).await?;
    let call = batch.to_call(disperse)?;
    info!(
        "Dispersing {} to {} recipients (total {})",
        batch.mode,
        batch.len(),
        utils::format_amount(batch.total, decimals)
    );
    sink.emit(Progress::Submitting);
    send_and_confirm(client, call, TxKind::Disperse, Stage::Disperse, sink).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainError;
    use crate::errors::WalletError;
    use crate::recipients::parse_recipients;
    use crate::testing::FakeChain;
    use crate::types::TxStatus;
    use tokio::sync::mpsc;

    const ALICE: &str = "0xAb5801a7D398351b8bE11C439e05C5B3259aeC9B";
    const BOB: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    fn disperse() -> Address {
        Address::repeat_byte(0xD1)
    }

    fn native_batch(text: &str) -> DisperseBatch {
        let parsed = parse_recipients(text, AssetMode::Native, 18);
        assert!(parsed.errors.is_empty());
        DisperseBatch::new(AssetMode::Native, None, &parsed.entries).unwrap()
    }

    #[test]
    fn test_native_call_carries_total_value() {
        let batch = native_batch(&format!("{}=1.5\n{}=2.5", ALICE, BOB));
        let call = batch.to_call(disperse()).unwrap();
        assert_eq!(call.value, U256::exp10(18) * 4);
        assert_eq!(call.to, disperse());
        assert_eq!(call.label, "disperseEther");
        assert_eq!(batch.recipients.len(), 2);
    }

    #[test]
    fn test_batch_total_matches_aggregate() {
        let parsed = parse_recipients(&format!("{}=0.000001\n{}=12.5\n{}=3", ALICE, BOB, ALICE), AssetMode::Fungible, 6);
        let batch = DisperseBatch::new(AssetMode::Fungible, Some(Address::repeat_byte(1)), &parsed.entries).unwrap();
        let aggregate = crate::aggregate::compute(&parsed.entries, AssetMode::Fungible, None);
        assert_eq!(Some(batch.total), aggregate.total);
        assert_eq!(batch.total, U256::from(15_500_001u64));
    }

    #[test]
    fn test_token_batch_needs_contract() {
        let parsed = parse_recipients(&format!("{}=1", ALICE), AssetMode::Fungible, 6);
        assert_eq!(
            DisperseBatch::new(AssetMode::Fungible, None, &parsed.entries),
            Err(DistributionError::AssetNotLoaded)
        );
    }

    #[test]
    fn test_nft_batch_has_no_total() {
        let parsed = parse_recipients(&format!("{}=7\n{}=8", ALICE, BOB), AssetMode::Nft, 0);
        let batch = DisperseBatch::new(AssetMode::Nft, Some(Address::repeat_byte(1)), &parsed.entries).unwrap();
        assert_eq!(batch.total, U256::zero());
        assert_eq!(batch.values, vec![U256::from(7u64), U256::from(8u64)]);
        assert_eq!(batch.to_call(disperse()).unwrap().value, U256::zero());
    }

    #[tokio::test]
    async fn test_execute_confirms_and_reports_progress() {
        let chain = FakeChain::new();
        chain.set_native_balance(chain.account(), U256::exp10(19));
        let batch = native_batch(&format!("{}=1\n{}=2", ALICE, BOB));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let record = execute(&chain, &batch, disperse(), 18, &ProgressSink::new(tx)).await.unwrap();

        assert!(matches!(record.status, TxStatus::Confirmed { .. }));
        assert_eq!(chain.submitted_labels(), vec!["disperseEther"]);
        assert_eq!(rx.try_recv().unwrap(), Progress::Submitting);
        assert!(matches!(rx.try_recv().unwrap(), Progress::Submitted(r) if r.status == TxStatus::Pending));
        assert!(matches!(rx.try_recv().unwrap(), Progress::Settled(r) if r.is_terminal()));
    }

    #[tokio::test]
    async fn test_balance_drop_blocks_submission() {
        let chain = FakeChain::new();
        chain.set_native_balance(chain.account(), U256::exp10(18));
        let batch = native_batch(&format!("{}=1\n{}=2", ALICE, BOB));

        let err = execute(&chain, &batch, disperse(), 18, &ProgressSink::default()).await.unwrap_err();

        assert!(matches!(err, DistributionError::InsufficientBalance(_)));
        assert!(chain.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let chain = FakeChain::new();
        chain.set_native_balance(chain.account(), U256::exp10(19));
        chain.fail_submit("disperseEther", ChainError::Signer("user rejected transaction".into()));
        let batch = native_batch(&format!("{}=1", ALICE));

        let err = execute(&chain, &batch, disperse(), 18, &ProgressSink::default()).await.unwrap_err();

        assert_eq!(err, DistributionError::Wallet(WalletError::Rejected));
        assert!(chain.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_reverted_disperse_fails_record() {
        let chain = FakeChain::new();
        chain.set_native_balance(chain.account(), U256::exp10(19));
        chain.revert_on("disperseEther");
        let batch = native_batch(&format!("{}=1", ALICE));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let err = execute(&chain, &batch, disperse(), 18, &ProgressSink::new(tx)).await.unwrap_err();

        assert_eq!(err, DistributionError::Transaction(TransactionError::Reverted { reason: None }));
        let mut settled = None;
        while let Ok(p) = rx.try_recv() {
            if let Progress::Settled(r) = p {
                settled = Some(r);
            }
        }
        assert!(matches!(settled.unwrap().status, TxStatus::Failed { .. }));
    }
}
