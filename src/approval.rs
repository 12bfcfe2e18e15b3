//! Pre-flight for token distributions: allowance for ERC-20, ownership and
//! operator approval for ERC-721.

use crate::chain::{ChainClient, ContractCall};
use crate::contracts;
use crate::errors::{self, ApprovalFailure, DistributionError, OwnershipFailure, Stage};
use crate::executor::{send_and_confirm, ProgressSink};
use crate::types::{TransactionRecord, TxKind};
use ethers::types::{Address, U256};
use futures::future::join_all;
use tracing::{debug, info};

/// Whether the disperse contract may move the tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalState {
    pub required: bool,
    pub granted: bool,
}

fn encode_failure(e: contracts::AbiError) -> DistributionError {
    DistributionError::Approval(ApprovalFailure::Failed(e.to_string()))
}

pub async fn check_allowance(
    client: &dyn ChainClient,
    token: Address,
    spender: Address,
    total: U256,
) -> Result<ApprovalState, DistributionError> {
    let allowance = client
        .allowance(token, client.account(), spender)
        .await
        .map_err(|e| errors::classify(&e, Stage::Read))?;
    debug!("Allowance of {:?} for {:?}: {} (need {})", token, spender, allowance, total);
    Ok(ApprovalState {
        required: true,
        granted: allowance >= total,
    })
}

/// Approve exactly `total` if the current allowance is short.
///
/// Returns the approval record when a transaction was sent. Never sends more
/// than one approval per call.
pub async fn ensure_token_allowance(
    client: &dyn ChainClient,
    token: Address,
    spender: Address,
    total: U256,
    sink: &ProgressSink,
) -> Result<Option<TransactionRecord>, DistributionError> {
    if check_allowance(client, token, spender, total).await?.granted {
        return Ok(None);
    }
    info!("Approving {:?} to spend {} of {:?}", spender, total, token);
    let call = ContractCall {
        to: token,
        data: contracts::encode_approve(spender, total).map_err(encode_failure)?,
        value: U256::zero(),
        label: "approve",
    };
    send_and_confirm(client, call, TxKind::Approval, Stage::Approval, sink)
        .await
        .map(Some)
}

/// Every id must be owned by the connected account. Reads run concurrently;
/// the first failure in input order is reported.
pub async fn verify_nft_ownership(client: &dyn ChainClient, token: Address, token_ids: &[U256]) -> Result<(), DistributionError> {
    let owner = client.account();
    let results = join_all(token_ids.iter().map(|id| client.owner_of(token, *id))).await;

    for (token_id, result) in token_ids.iter().zip(results) {
        let reason = match result {
            Ok(actual) if actual == owner => continue,
            Ok(actual) => OwnershipFailure::NotOwner(actual),
            Err(e) => match errors::classify(&e, Stage::Read) {
                DistributionError::Network(m) => return Err(DistributionError::Network(m)),
                other => OwnershipFailure::Unreadable(other.to_string()),
            },
        };
        return Err(DistributionError::Ownership {
            token_id: *token_id,
            reason,
        });
    }
    Ok(())
}

pub async fn check_operator(client: &dyn ChainClient, token: Address, operator: Address) -> Result<ApprovalState, DistributionError> {
    let granted = client
        .is_approved_for_all(token, client.account(), operator)
        .await
        .map_err(|e| errors::classify(&e, Stage::Read))?;
    Ok(ApprovalState { required: true, granted })
}

/// `setApprovalForAll(operator, true)` unless already granted
pub async fn ensure_operator_approval(
    client: &dyn ChainClient,
    token: Address,
    operator: Address,
    sink: &ProgressSink,
) -> Result<Option<TransactionRecord>, DistributionError> {
    if check_operator(client, token, operator).await?.granted {
        return Ok(None);
    }
    info!("Approving {:?} as operator for {:?}", operator, token);
    let call = ContractCall {
        to: token,
        data: contracts::encode_set_approval_for_all(operator, true).map_err(encode_failure)?,
        value: U256::zero(),
        label: "setApprovalForAll",
    };
    send_and_confirm(client, call, TxKind::Approval, Stage::Approval, sink)
        .await
        .map(Some)
}
