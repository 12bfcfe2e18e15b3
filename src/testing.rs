//! In-memory chain and wallet doubles for unit tests.

use crate::chain::{ChainClient, ChainError, Confirmation, ContractCall};
use crate::contracts;
use crate::errors::WalletError;
use crate::wallet::{SessionEvent, SessionInfo, SessionSubscription, WalletGateway};
use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{Address, TxHash, U256};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

pub const FAKE_CHAIN_ID: u64 = 11155111;

#[derive(Default)]
struct FakeToken {
    symbol: String,
    decimals: u8,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
    owners: HashMap<U256, Address>,
    operators: HashSet<(Address, Address)>,
}

#[derive(Default)]
struct FakeState {
    native: HashMap<Address, U256>,
    tokens: HashMap<Address, FakeToken>,
    submitted: Vec<ContractCall>,
    receipts: HashMap<TxHash, Confirmation>,
    submit_failures: HashMap<&'static str, ChainError>,
    reverts: HashSet<&'static str>,
    read_failure: Option<ChainError>,
    next_token: u8,
}

/// A single-account chain. State changes from approvals apply on submit.
pub struct FakeChain {
    account: Address,
    state: Mutex<FakeState>,
}

impl Default for FakeChain {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeChain {
    pub fn new() -> Self {
        Self {
            account: Address::repeat_byte(0xAA),
            state: Mutex::new(FakeState::default()),
        }
    }

    pub fn account(&self) -> Address {
        self.account
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn set_native_balance(&self, owner: Address, value: U256) {
        self.with_state(|s| {
            s.native.insert(owner, value);
        });
    }

    /// Deploy a token; NFTs use `decimals = 0`
    pub fn add_token(&self, symbol: &str, decimals: u8) -> Address {
        self.with_state(|s| {
            s.next_token += 1;
            let address = Address::repeat_byte(0x10 + s.next_token);
            s.tokens.insert(
                address,
                FakeToken {
                    symbol: symbol.to_string(),
                    decimals,
                    ..Default::default()
                },
            );
            address
        })
    }

    pub fn set_token_balance(&self, token: Address, owner: Address, value: U256) {
        self.with_state(|s| {
            if let Some(t) = s.tokens.get_mut(&token) {
                t.balances.insert(owner, value);
            }
        });
    }

    pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, value: U256) {
        self.with_state(|s| {
            if let Some(t) = s.tokens.get_mut(&token) {
                t.allowances.insert((owner, spender), value);
            }
        });
    }

    pub fn set_owner(&self, token: Address, token_id: U256, owner: Address) {
        self.with_state(|s| {
            if let Some(t) = s.tokens.get_mut(&token) {
                t.owners.insert(token_id, owner);
            }
        });
    }

    pub fn set_operator(&self, token: Address, owner: Address, operator: Address) {
        self.with_state(|s| {
            if let Some(t) = s.tokens.get_mut(&token) {
                t.operators.insert((owner, operator));
            }
        });
    }

    /// Make the next `submit` of calls labelled `label` fail with `error`
    pub fn fail_submit(&self, label: &'static str, error: ChainError) {
        self.with_state(|s| {
            s.submit_failures.insert(label, error);
        });
    }

    /// Calls labelled `label` are mined but revert
    pub fn revert_on(&self, label: &'static str) {
        self.with_state(|s| {
            s.reverts.insert(label);
        });
    }

    /// Every read fails with `error` until cleared
    pub fn fail_reads(&self, error: Option<ChainError>) {
        self.with_state(|s| s.read_failure = error);
    }

    pub fn submitted(&self) -> Vec<ContractCall> {
        self.with_state(|s| s.submitted.clone())
    }

    pub fn submitted_labels(&self) -> Vec<&'static str> {
        self.with_state(|s| s.submitted.iter().map(|c| c.label).collect())
    }

    fn read<R>(&self, f: impl FnOnce(&FakeState) -> Result<R, ChainError>) -> Result<R, ChainError> {
        self.with_state(|s| match &s.read_failure {
            Some(e) => Err(e.clone()),
            None => f(s),
        })
    }

    fn token<'a>(state: &'a FakeState, token: Address) -> Result<&'a FakeToken, ChainError> {
        state
            .tokens
            .get(&token)
            .ok_or_else(|| ChainError::Rpc("execution reverted: no contract code".to_string()))
    }

    fn apply_call(state: &mut FakeState, owner: Address, call: &ContractCall) {
        let Some(token) = state.tokens.get_mut(&call.to) else {
            return;
        };
        if call.data.len() < 4 {
            return;
        }
        let (selector, args) = call.data.split_at(4);
        if selector == &contracts::approve().short_signature()[..] {
            if let Ok(tokens) = contracts::approve().decode_input(args) {
                if let (Some(Token::Address(spender)), Some(Token::Uint(amount))) = (tokens.first(), tokens.get(1)) {
                    token.allowances.insert((owner, *spender), *amount);
                }
            }
        } else if selector == &contracts::set_approval_for_all().short_signature()[..] {
            if let Ok(tokens) = contracts::set_approval_for_all().decode_input(args) {
                if let (Some(Token::Address(operator)), Some(Token::Bool(true))) = (tokens.first(), tokens.get(1)) {
                    token.operators.insert((owner, *operator));
                }
            }
        }
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    fn account(&self) -> Address {
        self.account
    }

    fn chain_id(&self) -> u64 {
        FAKE_CHAIN_ID
    }

    async fn native_balance(&self, owner: Address) -> Result<U256, ChainError> {
        self.read(|s| Ok(s.native.get(&owner).copied().unwrap_or_default()))
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, ChainError> {
        self.read(|s| Ok(Self::token(s, token)?.balances.get(&owner).copied().unwrap_or_default()))
    }

    async fn token_decimals(&self, token: Address) -> Result<u8, ChainError> {
        self.read(|s| Ok(Self::token(s, token)?.decimals))
    }

    async fn token_symbol(&self, token: Address) -> Result<String, ChainError> {
        self.read(|s| Ok(Self::token(s, token)?.symbol.clone()))
    }

    async fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256, ChainError> {
        self.read(|s| {
            Ok(Self::token(s, token)?
                .allowances
                .get(&(owner, spender))
                .copied()
                .unwrap_or_default())
        })
    }

    async fn owner_of(&self, token: Address, token_id: U256) -> Result<Address, ChainError> {
        self.read(|s| {
            Self::token(s, token)?
                .owners
                .get(&token_id)
                .copied()
                .ok_or_else(|| ChainError::Rpc("execution reverted: ERC721: invalid token ID".to_string()))
        })
    }

    async fn is_approved_for_all(&self, token: Address, owner: Address, operator: Address) -> Result<bool, ChainError> {
        self.read(|s| Ok(Self::token(s, token)?.operators.contains(&(owner, operator))))
    }

    async fn submit(&self, call: ContractCall) -> Result<TxHash, ChainError> {
        let owner = self.account;
        self.with_state(|s| {
            if let Some(error) = s.submit_failures.remove(call.label) {
                return Err(error);
            }
            let hash = TxHash::from_low_u64_be(s.submitted.len() as u64 + 1);
            let outcome = if s.reverts.contains(call.label) {
                Confirmation::Reverted { block_number: Some(100) }
            } else {
                Self::apply_call(s, owner, &call);
                Confirmation::Success {
                    block_number: Some(100),
                    gas_used: Some(U256::from(21_000u64)),
                }
            };
            s.receipts.insert(hash, outcome);
            s.submitted.push(call);
            Ok(hash)
        })
    }

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<Confirmation, ChainError> {
        self.with_state(|s| s.receipts.get(&hash).cloned().ok_or(ChainError::ConfirmationTimeout(1)))
    }
}

/// A gateway over a `FakeChain` with scriptable session changes.
pub struct FakeGateway {
    chain: Arc<FakeChain>,
    session: Mutex<Option<SessionInfo>>,
    events: broadcast::Sender<SessionEvent>,
    switch_allowed: bool,
}

impl FakeGateway {
    pub fn new(chain: Arc<FakeChain>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            chain,
            session: Mutex::new(None),
            events,
            switch_allowed: true,
        }
    }

    pub fn without_network_switch(mut self) -> Self {
        self.switch_allowed = false;
        self
    }

    pub fn chain(&self) -> &Arc<FakeChain> {
        &self.chain
    }

    /// Put the session on another chain, as a wallet would on a user switch
    pub fn move_to_chain(&self, chain_id: u64) {
        if let Some(info) = self.session.lock().unwrap().as_mut() {
            info.chain_id = chain_id;
        }
        let _ = self.events.send(SessionEvent::ChainChanged(chain_id));
    }

    pub fn change_account(&self, address: Address) {
        if let Some(info) = self.session.lock().unwrap().as_mut() {
            info.address = address;
        }
        let _ = self.events.send(SessionEvent::AccountChanged(address));
    }
}

#[async_trait]
impl WalletGateway for FakeGateway {
    async fn connect(&self) -> Result<SessionInfo, WalletError> {
        let info = SessionInfo {
            address: self.chain.account(),
            chain_id: FAKE_CHAIN_ID,
        };
        *self.session.lock().unwrap() = Some(info);
        let _ = self.events.send(SessionEvent::Connected(info));
        Ok(info)
    }

    async fn disconnect(&self) {
        *self.session.lock().unwrap() = None;
        let _ = self.events.send(SessionEvent::Disconnected);
    }

    fn current_session(&self) -> Option<SessionInfo> {
        *self.session.lock().unwrap()
    }

    async fn ensure_network(&self, expected_chain_id: u64) -> Result<(), WalletError> {
        let current = self.current_session().ok_or(WalletError::NotConnected)?;
        if current.chain_id == expected_chain_id {
            return Ok(());
        }
        if !self.switch_allowed {
            return Err(WalletError::WrongNetwork {
                expected: expected_chain_id,
                actual: current.chain_id,
            });
        }
        self.switch_network(expected_chain_id).await.map(|_| ())
    }

    async fn switch_network(&self, chain_id: u64) -> Result<SessionInfo, WalletError> {
        if chain_id != FAKE_CHAIN_ID {
            return Err(WalletError::UnsupportedNetwork(chain_id));
        }
        self.move_to_chain(chain_id);
        self.current_session().ok_or(WalletError::NotConnected)
    }

    async fn signer(&self) -> Result<Arc<dyn ChainClient>, WalletError> {
        if self.current_session().is_none() {
            return Err(WalletError::NotConnected);
        }
        let client: Arc<dyn ChainClient> = self.chain.clone();
        Ok(client)
    }

    fn subscribe(&self) -> SessionSubscription {
        SessionSubscription::new(self.events.subscribe())
    }
}
