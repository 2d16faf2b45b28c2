//! In-memory collaborators for unit tests.

use async_trait::async_trait;
use sell_client::{
    AppListing, ClientError, EarningsSummary, MarketplaceApi, PriceQuote, PublishRequest,
    PublishedAppsPage,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::balance::{ChannelClient, ChannelState, ChannelStatus, Wallet, WalletError, WalletProvider};
use crate::credentials::{CredentialsError, PasswordPrompt};
use crate::lifecycle::{InfrastructureStatus, PrimitiveResult, RuntimeError, RuntimeManager};
use crate::provisioner::{ProvisionError, SystemInstaller};
use crate::publication::{
    report_publish_result, Confirm, HostAddress, PublishListener, PublishStatus,
};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

// ============================================================================
// Marketplace
// ============================================================================

/// Marketplace that keeps published apps in memory.
#[derive(Default)]
pub struct FakeMarketplace {
    price: Option<f64>,
    buffer: u64,
    pages: Vec<Vec<AppListing>>,
    password: Option<String>,
    login_unreachable: bool,
    published: Mutex<Vec<AppListing>>,
    pages_requested: Mutex<Vec<u32>>,
    earnings_calls: AtomicUsize,
    login_attempts: AtomicUsize,
}

impl FakeMarketplace {
    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_buffer(mut self, buffer: u64) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn with_pages(mut self, pages: Vec<Vec<AppListing>>) -> Self {
        self.pages = pages;
        self
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn login_unreachable(mut self) -> Self {
        self.login_unreachable = true;
        self
    }

    pub fn pages_requested(&self) -> Vec<u32> {
        lock(&self.pages_requested).clone()
    }

    pub fn earnings_calls(&self) -> usize {
        self.earnings_calls.load(Ordering::SeqCst)
    }

    pub fn login_attempts(&self) -> usize {
        self.login_attempts.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> Vec<AppListing> {
        lock(&self.published).clone()
    }

    fn unavailable(path: &str) -> ClientError {
        ClientError::Http {
            status: 503,
            url: format!("fake://{path}"),
            body: "unavailable".to_string(),
        }
    }
}

#[async_trait]
impl MarketplaceApi for FakeMarketplace {
    async fn quote_bitcoin_price(&self, _satoshis: u64) -> sell_client::Result<PriceQuote> {
        self.price
            .map(|price| PriceQuote { price })
            .ok_or_else(|| Self::unavailable("price"))
    }

    async fn get_published_apps(
        &self,
        _publisher: &str,
        page: u32,
    ) -> sell_client::Result<PublishedAppsPage> {
        lock(&self.pages_requested).push(page);

        let mut pages = self.pages.clone();
        let published = self.published();
        if !published.is_empty() {
            if pages.is_empty() {
                pages.push(Vec::new());
            }
            if let Some(last) = pages.last_mut() {
                last.extend(published);
            }
        }

        let total_pages = u32::try_from(pages.len()).unwrap_or(u32::MAX);
        let results = usize::try_from(page)
            .ok()
            .and_then(|index| pages.get(index).cloned())
            .unwrap_or_default();
        Ok(PublishedAppsPage {
            results,
            total_pages,
        })
    }

    async fn login(&self, _payout_address: &str, password: &str) -> sell_client::Result<()> {
        self.login_attempts.fetch_add(1, Ordering::SeqCst);
        if self.login_unreachable {
            return Err(Self::unavailable("login"));
        }
        match &self.password {
            Some(expected) if expected != password => Err(ClientError::AuthRejected { status: 401 }),
            _ => Ok(()),
        }
    }

    async fn get_earnings(&self) -> sell_client::Result<EarningsSummary> {
        self.earnings_calls.fetch_add(1, Ordering::SeqCst);
        Ok(EarningsSummary {
            total_earnings: self.buffer,
        })
    }

    async fn publish_app(&self, request: &PublishRequest) -> sell_client::Result<()> {
        let mut published = lock(&self.published);
        if published.iter().any(|app| app.app_url == request.app_url) {
            return Err(ClientError::Conflict(request.app_url.clone()));
        }
        published.push(AppListing {
            app_url: request.app_url.clone(),
            title: Some(request.title.clone()),
        });
        Ok(())
    }
}

// ============================================================================
// Runtime
// ============================================================================

/// Runtime that records every primitive it is asked to run.
#[derive(Default)]
pub struct FakeRuntime {
    failing: HashSet<String>,
    messages: HashMap<String, String>,
    publish_outcomes: HashMap<String, PublishStatus>,
    silent: HashSet<String>,
    running: Vec<String>,
    infrastructure: InfrastructureStatus,
    calls: Mutex<Vec<String>>,
}

impl FakeRuntime {
    pub fn failing(mut self, service: &str) -> Self {
        self.failing.insert(service.to_string());
        self
    }

    pub fn with_message(mut self, service: &str, message: &str) -> Self {
        self.messages.insert(service.to_string(), message.to_string());
        self
    }

    pub fn publish_outcome(mut self, service: &str, status: PublishStatus) -> Self {
        self.publish_outcomes.insert(service.to_string(), status);
        self
    }

    /// Publishing `service` reports no outcome at all.
    pub fn publish_silently(mut self, service: &str) -> Self {
        self.silent.insert(service.to_string());
        self
    }

    pub fn with_running(mut self, services: &[&str]) -> Self {
        self.running = services.iter().map(|s| (*s).to_string()).collect();
        self
    }

    pub fn with_infrastructure(mut self, status: InfrastructureStatus) -> Self {
        self.infrastructure = status;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    fn primitive(&self, action: &str, service: &str) -> PrimitiveResult {
        lock(&self.calls).push(format!("{action} {service}"));
        PrimitiveResult {
            succeeded: !self.failing.contains(service),
            message: self.messages.get(service).cloned(),
        }
    }
}

#[async_trait]
impl RuntimeManager for FakeRuntime {
    async fn build(&self, service: &str) -> PrimitiveResult {
        self.primitive("build", service)
    }

    async fn start(&self, service: &str) -> PrimitiveResult {
        self.primitive("start", service)
    }

    async fn stop(&self, service: &str) -> PrimitiveResult {
        self.primitive("stop", service)
    }

    async fn restart(&self, service: &str) -> PrimitiveResult {
        self.primitive("restart", service)
    }

    async fn running_services(&self) -> Result<Vec<String>, RuntimeError> {
        Ok(self.running.clone())
    }

    async fn infrastructure_status(&self) -> InfrastructureStatus {
        self.infrastructure.clone()
    }

    async fn market_address(&self) -> Option<String> {
        self.infrastructure.market_address.clone()
    }

    async fn publish_service(
        &self,
        service: &str,
        address: &HostAddress,
        client: &dyn MarketplaceApi,
        listener: &mut dyn PublishListener,
    ) {
        lock(&self.calls).push(format!("publish {service}"));
        if self.silent.contains(service) {
            return;
        }
        match self.publish_outcomes.get(service) {
            Some(PublishStatus::Published) => listener.on_published(service),
            Some(PublishStatus::AlreadyPublished) => listener.on_already_published(service),
            Some(PublishStatus::FailedToPublish) => listener.on_failed(service),
            Some(PublishStatus::UnknownError) => listener.on_unknown_error(service),
            None => {
                let request = PublishRequest::for_service(service, &address.to_string());
                let result = client.publish_app(&request).await;
                report_publish_result(service, result, listener);
            }
        }
    }
}

// ============================================================================
// Installer
// ============================================================================

/// Installer over an in-memory package table.
pub struct FakeInstaller {
    packages: Mutex<Vec<(String, bool)>>,
    docker_fails: bool,
    mesh_lies: bool,
    privilege_denied: bool,
    requires_group: bool,
    in_group: bool,
    privilege_calls: AtomicUsize,
    docker_install_calls: AtomicUsize,
}

impl FakeInstaller {
    /// Every dependency missing.
    pub fn new() -> Self {
        Self::with_packages(false)
    }

    pub fn all_installed() -> Self {
        Self::with_packages(true)
    }

    fn with_packages(installed: bool) -> Self {
        Self {
            packages: Mutex::new(vec![
                ("docker".to_string(), installed),
                ("docker-compose".to_string(), installed),
                ("zerotier".to_string(), installed),
            ]),
            docker_fails: false,
            mesh_lies: false,
            privilege_denied: false,
            requires_group: false,
            in_group: true,
            privilege_calls: AtomicUsize::new(0),
            docker_install_calls: AtomicUsize::new(0),
        }
    }

    pub fn docker_install_fails(mut self) -> Self {
        self.docker_fails = true;
        self
    }

    /// The mesh installer reports success without installing anything.
    pub fn mesh_install_lies(mut self) -> Self {
        self.mesh_lies = true;
        self
    }

    pub fn privilege_denied(mut self) -> Self {
        self.privilege_denied = true;
        self
    }

    /// Group membership is required but not active in this session.
    pub fn group_pending(mut self) -> Self {
        self.requires_group = true;
        self.in_group = false;
        self
    }

    pub fn privilege_calls(&self) -> usize {
        self.privilege_calls.load(Ordering::SeqCst)
    }

    pub fn docker_install_calls(&self) -> usize {
        self.docker_install_calls.load(Ordering::SeqCst)
    }

    fn mark_installed(&self, predicate: impl Fn(&str) -> bool) {
        for (name, installed) in lock(&self.packages).iter_mut() {
            if predicate(name) {
                *installed = true;
            }
        }
    }
}

#[async_trait]
impl SystemInstaller for FakeInstaller {
    async fn check_dependencies(&self) -> Result<Vec<(String, bool)>, ProvisionError> {
        Ok(lock(&self.packages).clone())
    }

    async fn acquire_privilege(&self) -> Result<(), ProvisionError> {
        self.privilege_calls.fetch_add(1, Ordering::SeqCst);
        if self.privilege_denied {
            return Err(ProvisionError::PrivilegeDenied("password rejected".to_string()));
        }
        Ok(())
    }

    async fn install_docker_tools(&self) -> bool {
        self.docker_install_calls.fetch_add(1, Ordering::SeqCst);
        if self.docker_fails {
            return false;
        }
        self.mark_installed(|name| self.is_privileged_package(name));
        true
    }

    async fn install_mesh_network_client(&self) -> bool {
        if !self.mesh_lies {
            self.mark_installed(|name| name == "zerotier");
        }
        true
    }

    fn is_privileged_package(&self, name: &str) -> bool {
        name.starts_with("docker")
    }

    fn mesh_network_package(&self) -> &str {
        "zerotier"
    }

    async fn already_in_privileged_group(&self) -> bool {
        self.in_group
    }

    fn requires_group_membership(&self) -> bool {
        self.requires_group
    }
}

// ============================================================================
// Wallets
// ============================================================================

/// Wallets keyed by seed phrase. Unknown seeds fail to import.
#[derive(Default)]
pub struct FakeWallets {
    wallets: HashMap<String, FakeWallet>,
}

impl FakeWallets {
    pub fn with_wallet(mut self, mnemonic: &str, wallet: FakeWallet) -> Self {
        self.wallets.insert(mnemonic.to_string(), wallet);
        self
    }
}

impl WalletProvider for FakeWallets {
    fn import_wallet(&self, mnemonic: &str) -> Result<Arc<dyn Wallet>, WalletError> {
        self.wallets
            .get(mnemonic)
            .map(|wallet| Arc::new(wallet.clone()) as Arc<dyn Wallet>)
            .ok_or_else(|| WalletError::InvalidMnemonic("unknown seed".to_string()))
    }
}

#[derive(Clone)]
pub struct FakeWallet {
    balance: u64,
    channels: Vec<(String, ChannelStatus)>,
}

impl FakeWallet {
    pub fn new(balance: u64) -> Self {
        Self {
            balance,
            channels: Vec::new(),
        }
    }

    pub fn with_channel(mut self, url: &str, balance: u64, state: ChannelState) -> Self {
        self.channels
            .push((url.to_string(), ChannelStatus { balance, state }));
        self
    }
}

#[async_trait]
impl Wallet for FakeWallet {
    async fn total_balance(&self) -> Result<u64, WalletError> {
        Ok(self.balance)
    }

    fn channel_client(&self) -> Box<dyn ChannelClient> {
        Box::new(FakeChannels {
            channels: self.channels.clone(),
            synced: false,
        })
    }
}

struct FakeChannels {
    channels: Vec<(String, ChannelStatus)>,
    synced: bool,
}

#[async_trait]
impl ChannelClient for FakeChannels {
    async fn sync(&mut self) -> Result<(), WalletError> {
        self.synced = true;
        Ok(())
    }

    async fn list_channels(&self) -> Result<Vec<String>, WalletError> {
        if !self.synced {
            return Err(WalletError::Query("channels not synced".to_string()));
        }
        Ok(self.channels.iter().map(|(url, _)| url.clone()).collect())
    }

    async fn status(&self, url: &str) -> Result<ChannelStatus, WalletError> {
        self.channels
            .iter()
            .find(|(known, _)| known == url)
            .map(|(_, status)| *status)
            .ok_or_else(|| WalletError::Channel {
                url: url.to_string(),
                reason: "unknown channel".to_string(),
            })
    }
}

// ============================================================================
// Prompts
// ============================================================================

/// Confirmation prompt with a fixed answer.
pub struct ScriptedConfirm {
    answer: bool,
    prompts: AtomicUsize,
}

impl ScriptedConfirm {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            prompts: AtomicUsize::new(0),
        }
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, _prompt: &str) -> bool {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

/// Password prompt that replays a fixed list of answers.
pub struct ScriptedPassword {
    answers: Mutex<VecDeque<String>>,
    asked: AtomicUsize,
}

impl ScriptedPassword {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(|a| (*a).to_string()).collect()),
            asked: AtomicUsize::new(0),
        }
    }

    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

impl PasswordPrompt for ScriptedPassword {
    fn password(&self, _prompt: &str) -> Result<String, CredentialsError> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        lock(&self.answers)
            .pop_front()
            .ok_or_else(|| CredentialsError::Prompt("no scripted answer left".to_string()))
    }
}
