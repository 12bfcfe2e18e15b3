use super::async_job::AsyncJob;
use super::theme::{configure_style, AppTheme};
use crate::aggregate::Remaining;
use crate::asset_mode::{AssetMetadata, TokenState};
use crate::config::{address_explorer_url, network, Config, DEFAULT_CHAIN_ID, NETWORKS};
use crate::engine::{EngineSettings, Multisender, PipelineStatus};
use crate::errors::{DistributionError, WalletError};
use crate::executor::{Progress, ProgressSink};
use crate::generation::{Generation, Tagged};
use crate::operation_log;
use crate::recipients::{csv_to_recipient_text, separator_hint, LinePolicy};
use crate::types::{AssetMode, TransactionRecord, TxStatus};
use crate::user_settings::{CustomNetwork, UserSettings};
use crate::wallet::{EthersWalletGateway, SessionInfo, WalletBackend, WalletGateway};
use anyhow::{anyhow, Result};
use eframe::{egui, egui::RichText, App, Frame, NativeOptions};
use ethers::types::{Address, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};

type SessionJob = AsyncJob<Result<SessionInfo, WalletError>>;
type AssetJob = AsyncJob<Tagged<(Address, Result<AssetMetadata, DistributionError>)>>;
type BalanceJob = AsyncJob<Tagged<Result<U256, DistributionError>>>;
type SubmitJob = AsyncJob<Tagged<Result<TransactionRecord, DistributionError>>>;

fn build_engine(config: &Config, settings: &UserSettings) -> Multisender {
    let gateway: Arc<dyn WalletGateway> = Arc::new(EthersWalletGateway::new(
        config.clone(),
        settings.wallet_backend.clone(),
        settings.auto_switch_network,
        settings.custom_networks.clone(),
    ));
    Multisender::new(
        gateway,
        EngineSettings::from_config(config, settings.line_policy, settings.log_operations),
    )
}

/// Take a finished job's output and clear the slot
fn take_finished<T>(slot: &mut Option<AsyncJob<T>>) -> Option<Result<T>> {
    let result = slot.as_mut()?.poll()?;
    *slot = None;
    Some(result)
}

fn short_hash(hash: &str) -> String {
    if hash.len() > 14 {
        format!("{}...{}", &hash[..10], &hash[hash.len() - 4..])
    } else {
        hash.to_string()
    }
}

pub struct MultisendApp {
    config: Config,
    settings: UserSettings,
    /// Edited in the settings panel, applied on save
    draft: UserSettings,
    draft_rpc: String,
    engine: Multisender,
    theme: AppTheme,

    recipients_text: String,
    token_input: String,
    notice: Option<String>,
    /// Add-network form: name, chain id, symbol, RPC
    network_form: [String; 4],

    connect_job: Option<SessionJob>,
    switch_job: Option<SessionJob>,
    disconnect_job: Option<AsyncJob<()>>,
    asset_job: Option<AssetJob>,
    /// Generation and address of the running asset load
    asset_pending: Option<(Generation, Address)>,
    balance_job: Option<BalanceJob>,
    submit_job: Option<SubmitJob>,
    progress: Option<(Generation, UnboundedReceiver<Progress>)>,
}

impl MultisendApp {
    pub fn new(config: Config, settings: UserSettings, ctx: &egui::Context) -> Self {
        let theme = AppTheme::default();
        configure_style(ctx, &theme);
        let engine = build_engine(&config, &settings);
        let draft_rpc = settings.get_custom_rpc(config.chain_id).unwrap_or_default().to_string();
        Self {
            draft: settings.clone(),
            draft_rpc,
            config,
            settings,
            engine,
            theme,
            recipients_text: String::new(),
            token_input: String::new(),
            notice: None,
            network_form: Default::default(),
            connect_job: None,
            switch_job: None,
            disconnect_job: None,
            asset_job: None,
            asset_pending: None,
            balance_job: None,
            submit_job: None,
            progress: None,
        }
    }

    fn any_job_running(&self) -> bool {
        self.connect_job.is_some()
            || self.switch_job.is_some()
            || self.disconnect_job.is_some()
            || self.asset_job.is_some()
            || self.balance_job.is_some()
            || self.submit_job.is_some()
    }

    // ==================== job starters ====================

    fn start_connect(&mut self) {
        if let Err(e) = self.engine.begin_connect() {
            self.notice = Some(e.to_string());
            return;
        }
        let gateway = self.engine.gateway();
        self.connect_job = Some(AsyncJob::spawn(move || async move { gateway.connect().await }));
    }

    fn start_disconnect(&mut self) {
        let gateway = self.engine.gateway();
        self.disconnect_job = Some(AsyncJob::spawn(move || async move { gateway.disconnect().await }));
    }

    fn start_switch(&mut self, chain_id: u64) {
        let gateway = self.engine.gateway();
        self.switch_job = Some(AsyncJob::spawn(move || async move { gateway.switch_network(chain_id).await }));
    }

    fn start_asset_load(&mut self) {
        match self.engine.begin_asset_load(&self.token_input) {
            Ok(query) => {
                self.asset_pending = Some((query.generation, query.address));
                let gateway = self.engine.gateway();
                self.asset_job = Some(AsyncJob::spawn(move || query.run(gateway)));
            }
            Err(e) => self.notice = Some(e.to_string()),
        }
    }

    fn start_balance_refresh(&mut self) {
        if let Some(query) = self.engine.begin_balance_refresh() {
            let gateway = self.engine.gateway();
            self.balance_job = Some(AsyncJob::spawn(move || query.run(gateway)));
        }
    }

    fn start_submission(&mut self) {
        match self.engine.prepare_submission() {
            Ok(plan) => {
                let (tx, rx) = mpsc::unbounded_channel();
                self.progress = Some((plan.generation, rx));
                let gateway = self.engine.gateway();
                self.submit_job = Some(AsyncJob::spawn(move || plan.run(gateway, ProgressSink::new(tx))));
            }
            // The status line carries the reason
            Err(e) => tracing::debug!("Submission not started: {}", e),
        }
    }

    fn import_file(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Recipient lists", &["csv", "txt"])
            .pick_file()
        else {
            return;
        };
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                self.notice = Some(format!("Failed to read {}: {}", path.display(), e));
                return;
            }
        };
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        let text = if is_csv {
            match csv_to_recipient_text(&content) {
                Ok(text) => text,
                Err(e) => {
                    self.notice = Some(format!("Failed to import CSV: {}", e));
                    return;
                }
            }
        } else {
            content
        };
        tracing::info!("Imported recipients from {}", path.display());
        self.recipients_text = text;
        self.engine.set_input(self.recipients_text.clone());
    }

    fn apply_settings(&mut self) {
        if self.engine.status().is_busy() {
            self.notice = Some("Wait for the running operation to finish".to_string());
            return;
        }
        let mut settings = self.draft.clone();
        settings.set_custom_rpc(settings.selected_chain_id, self.draft_rpc.clone());
        if let Err(e) = settings.save() {
            self.notice = Some(format!("Failed to save settings: {}", e));
        }

        let config = match settings.build_config().with_env_overrides() {
            Ok(config) => config,
            Err(e) => {
                self.notice = Some(format!("Invalid configuration: {}", e));
                return;
            }
        };
        tracing::info!("Applying settings for chain {}", config.chain_id);

        self.engine = build_engine(&config, &settings);
        self.config = config;
        self.draft = settings.clone();
        self.settings = settings;
        self.recipients_text.clear();
        self.token_input.clear();
        self.connect_job = None;
        self.switch_job = None;
        self.disconnect_job = None;
        self.asset_job = None;
        self.asset_pending = None;
        self.balance_job = None;
        self.submit_job = None;
        self.progress = None;
        self.notice = Some("Settings saved. Connect the wallet again.".to_string());
    }

    fn drain_progress(&mut self) {
        if let Some((generation, rx)) = &mut self.progress {
            let generation = *generation;
            while let Ok(progress) = rx.try_recv() {
                self.engine.apply_progress(generation, progress);
            }
        }
    }

    // ==================== polling ====================

    fn poll_jobs(&mut self) {
        if let Some(result) = take_finished(&mut self.connect_job) {
            let result = result.unwrap_or_else(|e| Err(WalletError::Unavailable(e.to_string())));
            self.engine.finish_connect(result);
            self.start_balance_refresh();
        }

        if let Some(result) = take_finished(&mut self.switch_job) {
            match result {
                Ok(Ok(info)) => {
                    self.notice = Some(format!("Switched to chain {}. Submit again.", info.chain_id));
                }
                Ok(Err(e)) => self.notice = Some(e.to_string()),
                Err(e) => self.notice = Some(e.to_string()),
            }
        }

        if take_finished(&mut self.disconnect_job).is_some() {
            self.engine.handle_session_events();
        }

        if let Some(result) = take_finished(&mut self.asset_job) {
            let pending = self.asset_pending.take();
            let tagged = match (result, pending) {
                (Ok(tagged), _) => Some(tagged),
                (Err(e), Some((generation, address))) => Some(Tagged::new(
                    generation,
                    (address, Err(DistributionError::Network(e.to_string()))),
                )),
                (Err(_), None) => None,
            };
            if let Some(tagged) = tagged {
                if self.engine.apply_asset_load(tagged) {
                    self.start_balance_refresh();
                }
            }
        }

        if let Some(result) = take_finished(&mut self.balance_job) {
            match result {
                Ok(tagged) => {
                    self.engine.apply_balance(tagged);
                }
                Err(e) => tracing::warn!("Balance job lost: {}", e),
            }
        }

        self.drain_progress();
        if let Some(result) = take_finished(&mut self.submit_job) {
            self.drain_progress();
            self.progress = None;
            match result {
                Ok(tagged) => {
                    if self.engine.finish_submission(tagged) {
                        self.start_balance_refresh();
                    }
                }
                Err(e) => self.engine.abandon_submission(&e.to_string()),
            }
        }

        if self.engine.handle_session_events() {
            self.start_balance_refresh();
        }
    }

    // ==================== views ====================

    fn render_top_bar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal_wrapped(|ui| {
            ui.heading(RichText::new("Multisend").strong());
            ui.separator();
            ui.label(format!("{} (chain {})", self.config.network_label(), self.config.chain_id));
            ui.separator();

            match self.engine.session() {
                Some(session) => {
                    let mismatch = session.chain_id != self.config.chain_id;
                    let color = if mismatch { self.theme.warning } else { self.theme.text_secondary };
                    ui.colored_label(color, format!("{:?} @ chain {}", session.address, session.chain_id));
                    if let Some(url) = address_explorer_url(session.chain_id, &format!("{:?}", session.address)) {
                        if ui.small_button("Explorer").clicked() {
                            if let Err(e) = open::that(url) {
                                tracing::warn!("Failed to open explorer: {}", e);
                            }
                        }
                    }
                    if ui
                        .add_enabled(!self.engine.status().is_busy(), self.theme.button_secondary("Disconnect"))
                        .clicked()
                    {
                        self.start_disconnect();
                    }
                }
                None => {
                    ui.colored_label(self.theme.text_secondary, self.settings.wallet_backend.label());
                    let enabled = self.connect_job.is_none() && !self.engine.status().is_busy();
                    if ui.add_enabled(enabled, self.theme.button_secondary("Connect")).clicked() {
                        self.start_connect();
                    }
                }
            }
        });
    }

    fn render_asset_selector(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            for mode in AssetMode::ALL {
                let selected = self.engine.mode() == mode;
                if ui.selectable_label(selected, mode.label()).clicked() && !selected {
                    match self.engine.select_mode(mode) {
                        Ok(true) => {
                            self.recipients_text.clear();
                            self.token_input.clear();
                            self.asset_job = None;
                            self.asset_pending = None;
                            self.balance_job = None;
                            self.start_balance_refresh();
                        }
                        Ok(false) => {}
                        Err(e) => self.notice = Some(e.to_string()),
                    }
                }
            }
        });

        if !self.engine.mode().requires_contract() {
            if let Some(meta) = self.engine.metadata() {
                ui.label(format!("{} Sending {}", meta.icon, meta.symbol));
            }
            return;
        }

        ui.horizontal(|ui| {
            ui.label("Token contract:");
            let response = ui.add(
                egui::TextEdit::singleline(&mut self.token_input)
                    .hint_text("0x...")
                    .desired_width(380.0),
            );
            let submitted = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            let enabled = self.engine.session().is_some() && !self.token_input.trim().is_empty();
            if (ui.add_enabled(enabled, self.theme.button_secondary("Load")).clicked() || (submitted && enabled))
                && !self.engine.status().is_busy()
            {
                self.start_asset_load();
            }
        });

        match self.engine.token_state() {
            TokenState::Unset => {
                if self.engine.session().is_none() {
                    ui.colored_label(self.theme.text_secondary, "Connect a wallet to load a token");
                }
            }
            TokenState::Loading(_) => {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("Loading token...");
                });
            }
            TokenState::Loaded { metadata, .. } => {
                let detail = if self.engine.mode() == AssetMode::Nft {
                    format!("{} {}", metadata.icon, metadata.symbol)
                } else {
                    format!("{} {} ({} decimals)", metadata.icon, metadata.symbol, metadata.decimals)
                };
                ui.colored_label(self.theme.success, detail);
            }
            TokenState::Failed { reason, .. } => {
                ui.colored_label(self.theme.error, reason);
            }
        }
    }

    fn render_recipients(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let format = if self.engine.mode() == AssetMode::Nft {
                format!("One `address=tokenId` per line ({})", separator_hint())
            } else {
                format!("One `address=amount` per line ({})", separator_hint())
            };
            ui.label(format);
            if ui.add(self.theme.button_secondary("Import...")).clicked() {
                self.import_file();
            }
        });

        let response = ui.add(
            egui::TextEdit::multiline(&mut self.recipients_text)
                .font(egui::TextStyle::Monospace)
                .desired_rows(10)
                .desired_width(f32::INFINITY),
        );
        if response.changed() {
            self.engine.set_input(self.recipients_text.clone());
        }

        let parsed = self.engine.parsed();
        if !parsed.errors.is_empty() {
            let skipped = self.settings.line_policy == LinePolicy::SkipInvalid;
            egui::ScrollArea::vertical()
                .id_source("line_errors")
                .max_height(120.0)
                .show(ui, |ui| {
                    for error in &parsed.errors {
                        let text = if skipped {
                            format!("{} (skipped)", error)
                        } else {
                            error.to_string()
                        };
                        ui.colored_label(self.theme.warning, text);
                    }
                });
        }
    }

    fn render_summary(&self, ui: &mut egui::Ui) {
        let aggregate = self.engine.aggregate();
        let decimals = self.engine.decimals();
        let symbol = self.engine.metadata().map(|m| m.symbol.clone()).unwrap_or_default();

        egui::Grid::new("summary").num_columns(2).spacing([24.0, 4.0]).show(ui, |ui| {
            ui.label("Recipients");
            ui.label(aggregate.count.to_string());
            ui.end_row();

            ui.label("Total");
            match aggregate.total_display(decimals) {
                Some(total) => ui.label(format!("{} {}", total, symbol)),
                None => ui.label(format!("{} token(s)", aggregate.count)),
            };
            ui.end_row();

            ui.label("Balance");
            ui.label(format!("{} {}", self.engine.balance().display(decimals), symbol));
            ui.end_row();

            if let Some(remaining) = aggregate.remaining_display(decimals) {
                ui.label("Remaining");
                let color = match aggregate.remaining {
                    Some(Remaining::Shortfall(_)) => self.theme.error,
                    _ => self.theme.text_primary,
                };
                ui.colored_label(color, format!("{} {}", remaining, symbol));
                ui.end_row();
            }
        });
    }

    fn render_submit(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let busy = self.engine.status().is_busy();
            let ready = self.engine.session().is_some() && !self.engine.parsed().entries.is_empty();
            if ui.add_enabled(!busy && ready, self.theme.button_primary("Send")).clicked() {
                self.start_submission();
            }
            if ui
                .add_enabled(!busy && self.engine.session().is_some(), self.theme.button_secondary("Refresh balance"))
                .clicked()
            {
                self.start_balance_refresh();
            }
            if busy {
                ui.spinner();
            }
        });

        let status = self.engine.status().clone();
        match &status {
            PipelineStatus::Failed(error) => {
                ui.colored_label(self.theme.error_color(error.category()), format!("✗ {}", error));
                if let Some(hint) = error.hint() {
                    ui.colored_label(self.theme.text_secondary, hint);
                }
                if let DistributionError::Wallet(WalletError::WrongNetwork { expected, .. }) = error {
                    let expected = *expected;
                    ui.horizontal(|ui| {
                        let enabled = self.switch_job.is_none();
                        if ui.add_enabled(enabled, self.theme.button_secondary("Switch network")).clicked() {
                            self.start_switch(expected);
                        }
                        if ui.add(self.theme.button_secondary("Cancel")).clicked() {
                            self.engine.decline_network_switch();
                        }
                    });
                }
            }
            PipelineStatus::Succeeded(record) => {
                ui.colored_label(self.theme.success, format!("✓ Sent in {}", short_hash(&record.hash_hex())));
            }
            PipelineStatus::Confirming(record) => {
                ui.colored_label(
                    self.theme.warning,
                    format!("Waiting for confirmation of {}", short_hash(&record.hash_hex())),
                );
            }
            other => {
                ui.label(other.label());
            }
        }

        if let Some(notice) = &self.notice {
            let mut dismissed = false;
            ui.horizontal(|ui| {
                ui.colored_label(self.theme.text_secondary, notice);
                dismissed = ui.small_button("x").clicked();
            });
            if dismissed {
                self.notice = None;
            }
        }
    }

    fn render_transactions(&self, ui: &mut egui::Ui) {
        let history = self.engine.history();
        if history.is_empty() {
            return;
        }
        ui.heading("Transactions");
        egui::Grid::new("transactions").num_columns(4).striped(true).show(ui, |ui| {
            for record in history.iter().rev() {
                ui.label(record.kind.label());
                ui.monospace(short_hash(&record.hash_hex()));
                let status = match &record.status {
                    TxStatus::Pending => "pending".to_string(),
                    TxStatus::Confirmed { block_number: Some(block), .. } => format!("confirmed in block {}", block),
                    TxStatus::Confirmed { .. } => "confirmed".to_string(),
                    TxStatus::Failed { reason } => format!("failed: {}", reason),
                };
                ui.colored_label(self.theme.tx_status_color(&record.status), status);
                match &record.explorer_url {
                    Some(url) => {
                        if ui.small_button("View").clicked() {
                            if let Err(e) = open::that(url) {
                                tracing::warn!("Failed to open explorer: {}", e);
                            }
                        }
                    }
                    None => {
                        ui.label("");
                    }
                }
                ui.end_row();
            }
        });
    }

    fn render_settings(&mut self, ui: &mut egui::Ui) {
        ui.collapsing("Settings", |ui| {
            let selected_label = self
                .draft
                .get_custom_network(self.draft.selected_chain_id)
                .map(|n| n.label.clone())
                .or_else(|| network(self.draft.selected_chain_id).map(|n| n.name.to_string()))
                .unwrap_or_else(|| format!("Chain {}", self.draft.selected_chain_id));

            let before = self.draft.selected_chain_id;
            egui::ComboBox::from_label("Network")
                .selected_text(selected_label)
                .show_ui(ui, |ui| {
                    let mut last_kind = None;
                    for builtin in NETWORKS {
                        if last_kind.is_some_and(|k| k != builtin.kind) {
                            ui.separator();
                        }
                        last_kind = Some(builtin.kind);
                        ui.selectable_value(&mut self.draft.selected_chain_id, builtin.chain_id, builtin.name);
                    }
                    for custom in &self.draft.custom_networks {
                        ui.selectable_value(
                            &mut self.draft.selected_chain_id,
                            custom.chain_id,
                            format!("{} (custom)", custom.label),
                        );
                    }
                });
            if before != self.draft.selected_chain_id {
                self.draft_rpc = self
                    .draft
                    .get_custom_rpc(self.draft.selected_chain_id)
                    .unwrap_or_default()
                    .to_string();
            }

            ui.horizontal(|ui| {
                ui.label("RPC override:");
                ui.add(
                    egui::TextEdit::singleline(&mut self.draft_rpc)
                        .hint_text("default")
                        .desired_width(320.0),
                );
            });

            self.render_custom_networks(ui);

            ui.horizontal(|ui| {
                let is_ledger = matches!(self.draft.wallet_backend, WalletBackend::Ledger { .. });
                if ui.radio(is_ledger, "Ledger").clicked() && !is_ledger {
                    self.draft.wallet_backend = WalletBackend::Ledger { account_index: 0 };
                }
                if ui.radio(!is_ledger, "Private key (MULTISEND_PRIVATE_KEY)").clicked() {
                    self.draft.wallet_backend = WalletBackend::PrivateKey;
                }
                if let WalletBackend::Ledger { account_index } = &mut self.draft.wallet_backend {
                    ui.label("Account:");
                    ui.add(egui::DragValue::new(account_index).clamp_range(0..=99));
                }
            });

            egui::ComboBox::from_label("Invalid lines")
                .selected_text(self.draft.line_policy.label())
                .show_ui(ui, |ui| {
                    for policy in [LinePolicy::RejectAll, LinePolicy::SkipInvalid] {
                        ui.selectable_value(&mut self.draft.line_policy, policy, policy.label());
                    }
                });

            ui.add(egui::Slider::new(&mut self.draft.default_gas_speed, 0.8..=2.0).text("Gas speed"));
            ui.checkbox(&mut self.draft.auto_switch_network, "Switch networks without asking");
            ui.checkbox(&mut self.draft.log_operations, "Write the operation log");

            ui.horizontal(|ui| {
                if ui.add(self.theme.button_primary("Save")).clicked() {
                    self.apply_settings();
                }
                if ui.add(self.theme.button_secondary("Open log")).clicked() {
                    if let Err(e) = open::that(operation_log::log_file_path()) {
                        self.notice = Some(format!("Failed to open the operation log: {}", e));
                    }
                }
            });
            ui.colored_label(self.theme.text_secondary, UserSettings::settings_path_display());
        });
    }

    fn render_custom_networks(&mut self, ui: &mut egui::Ui) {
        ui.collapsing("Custom networks", |ui| {
            let mut removed = None;
            for custom in &self.draft.custom_networks {
                ui.horizontal(|ui| {
                    ui.label(format!("{} ({}, chain {})", custom.label, custom.native_token, custom.chain_id));
                    if ui.add(self.theme.button_secondary("Remove")).clicked() {
                        removed = Some(custom.chain_id);
                    }
                });
            }
            if let Some(chain_id) = removed {
                self.draft.remove_custom_network(chain_id);
                if self.draft.selected_chain_id == chain_id {
                    self.draft.selected_chain_id = DEFAULT_CHAIN_ID;
                }
            }

            let [name, chain_id, symbol, rpc] = &mut self.network_form;
            ui.horizontal(|ui| {
                ui.add(egui::TextEdit::singleline(name).hint_text("name").desired_width(120.0));
                ui.add(egui::TextEdit::singleline(chain_id).hint_text("chain id").desired_width(80.0));
                ui.add(egui::TextEdit::singleline(symbol).hint_text("symbol").desired_width(60.0));
                ui.add(egui::TextEdit::singleline(rpc).hint_text("RPC URL").desired_width(220.0));
            });
            if ui.add(self.theme.button_secondary("Add network")).clicked() {
                let [name, chain_id, symbol, rpc] = &self.network_form;
                match CustomNetwork::parse(name, chain_id, symbol, rpc) {
                    Ok(custom) => {
                        let chain_id = custom.chain_id;
                        if self.draft.add_custom_network(custom) {
                            self.network_form = Default::default();
                        } else {
                            self.notice = Some(format!("Chain {} is already configured", chain_id));
                        }
                    }
                    Err(e) => self.notice = Some(format!("Cannot add network: {:#}", e)),
                }
            }
        });
    }
}

impl App for MultisendApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.poll_jobs();

        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.add_space(6.0);
            self.render_top_bar(ui);
            ui.add_space(6.0);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                let frame = self.theme.frame_panel();
                frame.show(ui, |ui| self.render_asset_selector(ui));
                ui.add_space(self.theme.spacing_sm);
                frame.show(ui, |ui| self.render_recipients(ui));
                ui.add_space(self.theme.spacing_sm);
                frame.show(ui, |ui| {
                    self.render_summary(ui);
                    ui.add_space(self.theme.spacing_sm);
                    self.render_submit(ui);
                });
                ui.add_space(self.theme.spacing_md);
                self.render_transactions(ui);
                ui.add_space(self.theme.spacing_md);
                self.render_settings(ui);
            });
        });

        if self.any_job_running() {
            ctx.request_repaint_after(Duration::from_millis(100));
        } else {
            // Wallet events arrive without user input
            ctx.request_repaint_after(Duration::from_millis(500));
        }
    }
}

pub fn launch(config: Config, settings: UserSettings) -> Result<()> {
    let app_creator = move |cc: &eframe::CreationContext<'_>| {
        Box::new(MultisendApp::new(config.clone(), settings.clone(), &cc.egui_ctx)) as Box<dyn App>
    };

    let viewport = egui::ViewportBuilder::default().with_inner_size([960.0, 760.0]);
    let native_options = NativeOptions {
        viewport,
        persist_window: true,
        ..Default::default()
    };

    eframe::run_native("Multisend", native_options, Box::new(app_creator))
        .map_err(|e| anyhow!("Failed to start GUI: {}", e))
}
