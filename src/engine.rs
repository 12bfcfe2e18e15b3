//! The multisender: recipient input, asset selection, balance and the
//! submission pipeline behind one state holder.
//!
//! All state lives on the caller's thread. Chain work happens in futures
//! built from snapshots (`AssetLoadQuery`, `BalanceQuery`, `SubmissionPlan`)
//! that can run anywhere; their results come back tagged and are dropped if
//! the state they were issued for has since changed.
//!
//! Submission runs through:
//!
//! ```text
//! Idle -> Validating -> [CheckingOwnership] -> [Approving] -> Submitting
//!      -> Confirming -> Succeeded | Failed
//! ```
//!
//! A wallet session change invalidates reads and any running submission.

use crate::aggregate::{self, Aggregate, Remaining};
use crate::approval;
use crate::asset_mode::{self, AssetMetadata, AssetModeController, TokenState};
use crate::balance::{BalanceQuery, BalanceView};
use crate::config::{self, Config};
use crate::errors::{DistributionError, TransactionError, WalletError};
use crate::executor::{self, DisperseBatch, Progress, ProgressSink};
use crate::generation::{Generation, GenerationCounter, Tagged};
use crate::operation_log;
use crate::recipients::{parse_checksummed_address, parse_recipients, LinePolicy, ParsedRecipients};
use crate::types::{AssetMode, TransactionRecord, TxKind};
use crate::utils;
use crate::wallet::{SessionInfo, SessionSubscription, WalletGateway};
use ethers::types::Address;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Chain every distribution targets
    pub chain_id: u64,
    pub disperse_address: Address,
    pub native_symbol: String,
    pub line_policy: LinePolicy,
    pub log_operations: bool,
}

impl EngineSettings {
    pub fn from_config(config: &Config, line_policy: LinePolicy, log_operations: bool) -> Self {
        Self {
            chain_id: config.chain_id,
            disperse_address: config.disperse_address,
            native_symbol: config.native_token().to_string(),
            line_policy,
            log_operations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineStatus {
    Idle,
    WalletRequired,
    Connecting,
    Validating,
    CheckingOwnership,
    Approving,
    Submitting,
    Confirming(TransactionRecord),
    Succeeded(TransactionRecord),
    Failed(DistributionError),
}

impl PipelineStatus {
    /// A submission or connection is running; a second one is refused
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Connecting
                | PipelineStatus::Validating
                | PipelineStatus::CheckingOwnership
                | PipelineStatus::Approving
                | PipelineStatus::Submitting
                | PipelineStatus::Confirming(_)
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            PipelineStatus::Idle => "Ready",
            PipelineStatus::WalletRequired => "Connect a wallet",
            PipelineStatus::Connecting => "Connecting...",
            PipelineStatus::Validating => "Validating...",
            PipelineStatus::CheckingOwnership => "Checking token ownership...",
            PipelineStatus::Approving => "Waiting for approval...",
            PipelineStatus::Submitting => "Submitting...",
            PipelineStatus::Confirming(_) => "Waiting for confirmation...",
            PipelineStatus::Succeeded(_) => "Sent",
            PipelineStatus::Failed(_) => "Failed",
        }
    }
}

/// Token metadata read for a contract address.
#[derive(Debug, Clone)]
pub struct AssetLoadQuery {
    pub generation: Generation,
    pub mode: AssetMode,
    pub address: Address,
}

impl AssetLoadQuery {
    pub async fn run(self, gateway: Arc<dyn WalletGateway>) -> Tagged<(Address, Result<AssetMetadata, DistributionError>)> {
        let result = match gateway.signer().await {
            Ok(client) => asset_mode::load_metadata(client.as_ref(), self.mode, self.address).await,
            Err(e) => Err(e.into()),
        };
        Tagged::new(self.generation, (self.address, result))
    }
}

/// Everything a submission needs, captured when it was validated.
#[derive(Debug, Clone)]
pub struct SubmissionPlan {
    pub generation: Generation,
    pub chain_id: u64,
    pub owner: Address,
    pub disperse: Address,
    pub decimals: u8,
    pub symbol: String,
    pub batch: DisperseBatch,
}

impl SubmissionPlan {
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "mode={} recipients={} from={:?} disperse={:?}",
            self.batch.mode,
            self.batch.len(),
            self.owner,
            self.disperse
        );
        if let Some(token) = self.batch.token {
            summary.push_str(&format!(" token={:?}", token));
        }
        if self.batch.mode != AssetMode::Nft {
            summary.push_str(&format!(
                " total={} {}",
                utils::format_amount(self.batch.total, self.decimals),
                self.symbol
            ));
        }
        summary
    }

    /// Summary followed by one `address value` line per recipient
    pub fn log_details(&self) -> String {
        let mut details = self.summary();
        for (recipient, value) in self.batch.recipients.iter().zip(&self.batch.values) {
            let value = match self.batch.mode {
                AssetMode::Nft => value.to_string(),
                _ => utils::format_amount(*value, self.decimals),
            };
            details.push_str(&format!("\n{:?} {}", recipient, value));
        }
        details
    }

    /// Network check, approvals, then the disperse transaction
    pub async fn run(
        self,
        gateway: Arc<dyn WalletGateway>,
        sink: ProgressSink,
    ) -> Tagged<Result<TransactionRecord, DistributionError>> {
        let result = self.execute(gateway.as_ref(), &sink).await;
        if let Err(e) = &result {
            warn!("Submission {:?} failed: {}", self.generation, e);
        }
        Tagged::new(self.generation, result)
    }

    async fn execute(&self, gateway: &dyn WalletGateway, sink: &ProgressSink) -> Result<TransactionRecord, DistributionError> {
        gateway.ensure_network(self.chain_id).await?;
        let client = gateway.signer().await?;
        if client.account() != self.owner || client.chain_id() != self.chain_id {
            return Err(WalletError::SessionChanged.into());
        }
        let client = client.as_ref();

        match (self.batch.mode, self.batch.token) {
            (AssetMode::Fungible, Some(token)) => {
                sink.emit(Progress::Approving);
                approval::ensure_token_allowance(client, token, self.disperse, self.batch.total, sink).await?;
            }
            (AssetMode::Nft, Some(token)) => {
                sink.emit(Progress::CheckingOwnership);
                approval::verify_nft_ownership(client, token, &self.batch.values).await?;
                sink.emit(Progress::Approving);
                approval::ensure_operator_approval(client, token, self.disperse, sink).await?;
            }
            _ => {}
        }

        executor::execute(client, &self.batch, self.disperse, self.decimals, sink).await
    }
}

struct InFlight {
    generation: Generation,
    /// Session the submission expects; a switch onto it is not a change
    expected: SessionInfo,
    /// Operation log body, extended with each broadcast hash
    details: String,
}

pub struct Multisender {
    gateway: Arc<dyn WalletGateway>,
    settings: EngineSettings,
    assets: AssetModeController,
    input: String,
    parsed: ParsedRecipients,
    balance: BalanceView,
    reads: GenerationCounter,
    submissions: GenerationCounter,
    session: Option<SessionInfo>,
    subscription: SessionSubscription,
    status: PipelineStatus,
    in_flight: Option<InFlight>,
    history: Vec<TransactionRecord>,
}

impl Multisender {
    pub fn new(gateway: Arc<dyn WalletGateway>, settings: EngineSettings) -> Self {
        let subscription = gateway.subscribe();
        let session = gateway.current_session();
        let assets = AssetModeController::new(&settings.native_symbol);
        let mut engine = Self {
            gateway,
            settings,
            assets,
            input: String::new(),
            parsed: ParsedRecipients::default(),
            balance: BalanceView::default(),
            reads: GenerationCounter::default(),
            submissions: GenerationCounter::default(),
            session,
            subscription,
            status: PipelineStatus::Idle,
            in_flight: None,
            history: Vec::new(),
        };
        engine.status = engine.resting_status();
        engine
    }

    // ==================== accessors ====================

    pub fn gateway(&self) -> Arc<dyn WalletGateway> {
        self.gateway.clone()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn mode(&self) -> AssetMode {
        self.assets.mode()
    }

    pub fn token_state(&self) -> &TokenState {
        self.assets.token_state()
    }

    pub fn metadata(&self) -> Option<&AssetMetadata> {
        self.assets.metadata()
    }

    pub fn decimals(&self) -> u8 {
        self.assets.decimals()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn parsed(&self) -> &ParsedRecipients {
        &self.parsed
    }

    pub fn balance(&self) -> &BalanceView {
        &self.balance
    }

    pub fn aggregate(&self) -> Aggregate {
        aggregate::compute(&self.parsed.entries, self.assets.mode(), self.balance.value)
    }

    pub fn session(&self) -> Option<SessionInfo> {
        self.session
    }

    pub fn status(&self) -> &PipelineStatus {
        &self.status
    }

    /// Every broadcast transaction, oldest first
    pub fn history(&self) -> &[TransactionRecord] {
        &self.history
    }

    fn resting_status(&self) -> PipelineStatus {
        if self.session.is_some() {
            PipelineStatus::Idle
        } else {
            PipelineStatus::WalletRequired
        }
    }

    // ==================== input ====================

    /// Replace the recipient text and re-parse it
    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
        self.reparse();
        if matches!(self.status, PipelineStatus::Failed(_) | PipelineStatus::Succeeded(_)) {
            self.status = self.resting_status();
        }
    }

    fn reparse(&mut self) {
        self.parsed = parse_recipients(&self.input, self.assets.mode(), self.assets.decimals());
    }

    pub fn set_line_policy(&mut self, policy: LinePolicy) {
        self.settings.line_policy = policy;
    }

    // ==================== asset selection ====================

    /// Switch asset mode. Drops the token contract, the recipient text and
    /// its errors, and the balance; reads still in flight are discarded.
    pub fn select_mode(&mut self, mode: AssetMode) -> Result<bool, DistributionError> {
        if self.status.is_busy() {
            return Err(DistributionError::Busy);
        }
        if !self.assets.select(mode) {
            return Ok(false);
        }
        self.reads.advance();
        self.input.clear();
        self.parsed = ParsedRecipients::default();
        self.balance.clear();
        self.status = self.resting_status();
        Ok(true)
    }

    pub fn begin_asset_load(&mut self, address_text: &str) -> Result<AssetLoadQuery, DistributionError> {
        if self.status.is_busy() {
            return Err(DistributionError::Busy);
        }
        let mode = self.assets.mode();
        if !mode.requires_contract() {
            return Err(DistributionError::InvalidContract(
                "native transfers have no token contract".to_string(),
            ));
        }
        let address = parse_checksummed_address(address_text.trim())
            .map_err(|kind| DistributionError::InvalidContract(kind.to_string()))?;

        self.assets.begin_load(address);
        self.balance.clear();
        let generation = self.reads.advance();
        Ok(AssetLoadQuery {
            generation,
            mode,
            address,
        })
    }

    /// Apply token metadata. Returns false for a superseded load.
    pub fn apply_asset_load(&mut self, tagged: Tagged<(Address, Result<AssetMetadata, DistributionError>)>) -> bool {
        let Some((address, result)) = tagged.accept(&self.reads) else {
            debug!("Dropping stale token metadata");
            return false;
        };
        let applied = self.assets.finish_load(address, result.map_err(|e| e.to_string()));
        if applied {
            self.reparse();
        }
        applied
    }

    // ==================== balance ====================

    /// Snapshot for a balance read, `None` without a session or asset
    pub fn begin_balance_refresh(&self) -> Option<BalanceQuery> {
        let session = self.session?;
        let mode = self.assets.mode();
        let asset = self.assets.asset_address();
        if mode.requires_contract() && asset.is_none() {
            return None;
        }
        Some(BalanceQuery {
            generation: self.reads.current(),
            mode,
            asset,
            owner: session.address,
        })
    }

    pub fn apply_balance(&mut self, tagged: Tagged<Result<ethers::types::U256, DistributionError>>) -> bool {
        match tagged.accept(&self.reads) {
            Some(result) => {
                self.balance.apply(result);
                true
            }
            None => {
                debug!("Dropping stale balance");
                false
            }
        }
    }

    // ==================== wallet session ====================

    pub fn begin_connect(&mut self) -> Result<(), DistributionError> {
        if self.status.is_busy() {
            return Err(DistributionError::Busy);
        }
        self.status = PipelineStatus::Connecting;
        Ok(())
    }

    pub fn finish_connect(&mut self, result: Result<SessionInfo, WalletError>) {
        match result {
            Ok(info) => {
                info!("Session {:?} on chain {}", info.address, info.chain_id);
                self.status = PipelineStatus::Idle;
                self.handle_session_events();
                self.status = self.resting_status();
            }
            Err(e) => {
                warn!("Connect failed: {}", e);
                self.status = PipelineStatus::Failed(e.into());
            }
        }
    }

    /// Drain session events. Any actual change of account or chain discards
    /// reads, the balance, the loaded token and any running submission,
    /// except a switch onto the network the running submission asked for.
    pub fn handle_session_events(&mut self) -> bool {
        let mut received = false;
        while let Some(event) = self.subscription.try_next() {
            debug!("Session event: {:?}", event);
            received = true;
        }
        if !received {
            return false;
        }
        let current = self.gateway.current_session();
        if current == self.session {
            return false;
        }
        info!("Wallet session changed: {:?} -> {:?}", self.session, current);
        self.session = current;
        self.reads.advance();
        self.balance.clear();

        if let Some(info) = current {
            let symbol = config::network(info.chain_id)
                .map(|n| n.symbol.to_string())
                .unwrap_or_else(|| self.settings.native_symbol.clone());
            self.assets.set_native_symbol(&symbol);
        }

        let requested_switch = matches!(&self.in_flight, Some(f) if Some(f.expected) == current);
        if !requested_switch {
            self.assets.reset_token();
            self.reparse();
            if self.in_flight.take().is_some() {
                self.submissions.advance();
                self.status = PipelineStatus::Failed(WalletError::SessionChanged.into());
            } else if !matches!(self.status, PipelineStatus::Connecting) {
                self.status = self.resting_status();
            }
        }
        true
    }

    /// The user dismissed the network switch prompt
    pub fn decline_network_switch(&mut self) {
        if !self.status.is_busy() {
            self.status = PipelineStatus::Failed(WalletError::NetworkSwitchDeclined(self.settings.chain_id).into());
        }
    }

    pub async fn connect(&mut self) -> Result<SessionInfo, DistributionError> {
        self.begin_connect()?;
        let result = self.gateway.connect().await;
        self.finish_connect(result.clone());
        result.map_err(Into::into)
    }

    // ==================== submission ====================

    /// Validate the current state into a plan and mark the pipeline busy.
    pub fn prepare_submission(&mut self) -> Result<SubmissionPlan, DistributionError> {
        if self.status.is_busy() {
            return Err(DistributionError::Busy);
        }
        self.handle_session_events();

        match self.build_plan() {
            Ok(mut plan) => {
                let generation = self.submissions.advance();
                plan.generation = generation;
                info!("Submission {:?}: {}", generation, plan.summary());
                self.in_flight = Some(InFlight {
                    generation,
                    expected: SessionInfo {
                        address: plan.owner,
                        chain_id: plan.chain_id,
                    },
                    details: plan.log_details(),
                });
                self.status = PipelineStatus::Validating;
                Ok(plan)
            }
            Err(e) => {
                self.status = match e {
                    DistributionError::Wallet(WalletError::NotConnected) => PipelineStatus::WalletRequired,
                    _ => PipelineStatus::Failed(e.clone()),
                };
                Err(e)
            }
        }
    }

    fn build_plan(&self) -> Result<SubmissionPlan, DistributionError> {
        let session = self.session.ok_or(WalletError::NotConnected)?;
        let metadata = self.assets.metadata().ok_or(DistributionError::AssetNotLoaded)?;
        let entries = self
            .parsed
            .accepted(self.settings.line_policy)
            .map_err(|errors| DistributionError::Input(errors.to_vec()))?;
        if entries.is_empty() {
            return Err(DistributionError::NoRecipients);
        }

        let mode = self.assets.mode();
        if mode == AssetMode::Nft && self.settings.disperse_address == config::default_disperse_address() {
            return Err(DistributionError::InvalidContract(
                "the default disperse contract cannot send NFTs; set MULTISEND_DISPERSE_ADDRESS".to_string(),
            ));
        }
        let aggregate = aggregate::compute(entries, mode, self.balance.value);
        if let Some(Remaining::Shortfall(short)) = aggregate.remaining {
            return Err(DistributionError::InsufficientBalance(format!(
                "short by {} {}",
                utils::format_amount(short, metadata.decimals),
                metadata.symbol
            )));
        }

        let batch = DisperseBatch::new(mode, self.assets.asset_address(), entries)?;
        Ok(SubmissionPlan {
            generation: self.submissions.current(),
            chain_id: self.settings.chain_id,
            owner: session.address,
            disperse: self.settings.disperse_address,
            decimals: metadata.decimals,
            symbol: metadata.symbol.clone(),
            batch,
        })
    }

    fn record(&mut self, record: TransactionRecord) {
        match self.history.iter_mut().find(|r| r.hash == record.hash) {
            Some(existing) if !existing.is_terminal() => *existing = record,
            Some(_) => {}
            None => self.history.push(record),
        }
    }

    /// Records always land in history; status follows only the live submission
    pub fn apply_progress(&mut self, generation: Generation, progress: Progress) {
        if let Progress::Submitted(record) | Progress::Settled(record) = &progress {
            self.record(record.clone());
        }
        if let (Progress::Submitted(record), Some(flight)) = (&progress, self.in_flight.as_mut()) {
            if flight.generation == generation {
                flight.details.push_str(&format!("\n{} tx={}", record.kind.label(), record.hash_hex()));
            }
        }
        if !self.submissions.is_current(generation) || !self.status.is_busy() {
            return;
        }
        self.status = match progress {
            Progress::CheckingOwnership => PipelineStatus::CheckingOwnership,
            Progress::Approving => PipelineStatus::Approving,
            Progress::Submitting => PipelineStatus::Submitting,
            Progress::Submitted(record) if record.kind == TxKind::Disperse => PipelineStatus::Confirming(record),
            Progress::Submitted(_) | Progress::Settled(_) => return,
        };
    }

    /// Settle the pipeline. Returns false when the submission was superseded;
    /// its record still lands in history.
    pub fn finish_submission(&mut self, outcome: Tagged<Result<TransactionRecord, DistributionError>>) -> bool {
        let Tagged { generation, value } = outcome;
        if let Ok(record) = &value {
            self.record(record.clone());
        }
        let live = self.submissions.is_current(generation)
            && self.in_flight.as_ref().map(|f| f.generation) == Some(generation);
        if !live {
            info!("Submission {:?} finished after being superseded", generation);
            return false;
        }
        let details = self.in_flight.take().map(|f| f.details).unwrap_or_default();

        if self.settings.log_operations {
            let outcome = match &value {
                Ok(record) => format!("result=confirmed tx={}", record.hash_hex()),
                Err(e) => format!("result=failed error={}", e),
            };
            if let Err(e) = operation_log::append_log("Multisend", self.settings.chain_id, format!("{}\n{}", details, outcome)) {
                warn!("Failed to write operation log: {}", e);
            }
        }

        self.status = match value {
            Ok(record) => PipelineStatus::Succeeded(record),
            Err(e) => PipelineStatus::Failed(e),
        };
        true
    }

    /// The worker running a submission went away without an outcome
    pub fn abandon_submission(&mut self, reason: &str) {
        if self.in_flight.take().is_some() {
            warn!("Submission abandoned: {}", reason);
            self.submissions.advance();
            self.status = PipelineStatus::Failed(TransactionError::Failed(reason.to_string()).into());
        }
    }

    /// Run a whole submission on the current task
    pub async fn submit(&mut self) -> Result<TransactionRecord, DistributionError> {
        let plan = self.prepare_submission()?;
        let generation = plan.generation;
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = plan.run(self.gateway.clone(), ProgressSink::new(tx)).await;

        while let Ok(progress) = rx.try_recv() {
            self.apply_progress(generation, progress);
        }
        self.handle_session_events();
        let result = outcome.value.clone();
        self.finish_submission(outcome);
        result
    }

    pub async fn load_asset(&mut self, address_text: &str) -> Result<(), DistributionError> {
        let query = self.begin_asset_load(address_text)?;
        let tagged = query.run(self.gateway.clone()).await;
        let result = tagged.value.1.clone().map(|_| ());
        self.apply_asset_load(tagged);
        result
    }

    pub async fn refresh_balance(&mut self) {
        if let Some(query) = self.begin_balance_refresh() {
            let tagged = query.run(self.gateway.clone()).await;
            self.apply_balance(tagged);
        }
    }
}
