// ── Polling coordinator ──
//
// Full lifecycle management for one cloud account: session setup,
// periodic telemetry refresh with bounded retries, action routing,
// and reactive state for entity consumers.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::{json, Value};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use halite_api::{RestClient, TokenCache, TransportConfig};
use halite_config::{CredentialStore, Settings};

use crate::descriptions::{EntityKind, EntityRegistry, ValueClass};
use crate::diagnostics;
use crate::error::CoreError;
use crate::keys;
use crate::model::{Device, DeviceMetadata, EntityAction};
use crate::normalize;
use crate::store::DeviceStore;

/// Tries per refresh round; the whole session+fetch sequence repeats.
pub const MAX_ATTEMPTS: u32 = 3;
/// Pause between refresh attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);
/// Poll interval when settings do not override it.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(300);

const EVENT_CHANNEL_SIZE: usize = 256;

// ── PollState ────────────────────────────────────────────────────

/// Coordinator lifecycle state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Created, `connect()` not yet called.
    Uninitialized,
    /// Session setup in progress.
    Connecting,
    /// Last refresh round succeeded.
    Ready,
    /// Last refresh round exhausted its retries; the store still holds
    /// the previous data.
    Degraded,
}

// ── Events ───────────────────────────────────────────────────────

/// Broadcast events for entity consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    /// A device appeared in the account for the first time this
    /// session. Fires once per device.
    DeviceDiscovered { device_id: u64 },
    /// Normalized readings that changed since the previous cycle.
    ReadingsChanged { device_id: u64, keys: Vec<String> },
}

// ── Configuration ────────────────────────────────────────────────

/// Connection parameters for one cloud account.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub base_url: Url,
    pub username: String,
    pub password: SecretString,
    pub poll_interval: Duration,
    pub automation_channels: u8,
    pub transport: TransportConfig,
}

impl CoordinatorConfig {
    /// Build from persisted settings plus account credentials.
    pub fn from_settings(settings: &Settings, username: String, password: SecretString) -> Self {
        let transport = TransportConfig {
            tls: if settings.verify_tls {
                halite_api::TlsMode::System
            } else {
                halite_api::TlsMode::DangerAcceptInvalid
            },
            timeout: Duration::from_secs(settings.timeout_secs),
        };
        Self {
            base_url: settings.base_url.clone(),
            username,
            password,
            poll_interval: Duration::from_secs(settings.poll_interval_secs),
            automation_channels: settings.automation_channels,
            transport,
        }
    }
}

// ── Coordinator ──────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc`. Manages the session lifecycle, the
/// background poll task, action routing, and the reactive device
/// store.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    config: CoordinatorConfig,
    registry: EntityRegistry,
    store: DeviceStore,
    poll_state: watch::Sender<PollState>,
    event_tx: broadcast::Sender<CoordinatorEvent>,
    cancel: CancellationToken,
    client: Mutex<Option<RestClient>>,
    tokens: TokenCache,
    /// Last account payload from login/check-token, for diagnostics.
    account: Mutex<Option<Value>>,
    persistence: Option<TokenPersistence>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

struct TokenPersistence {
    store: Arc<Mutex<CredentialStore>>,
    instance: String,
}

impl Coordinator {
    /// Create a coordinator. Does NOT connect — call
    /// [`connect()`](Self::connect) to authenticate and start polling.
    pub fn new(config: CoordinatorConfig) -> Result<Self, CoreError> {
        let registry = EntityRegistry::new(config.automation_channels)?;
        let (poll_state, _) = watch::channel(PollState::Uninitialized);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        Ok(Self {
            inner: Arc::new(CoordinatorInner {
                config,
                registry,
                store: DeviceStore::new(),
                poll_state,
                event_tx,
                cancel: CancellationToken::new(),
                client: Mutex::new(None),
                tokens: TokenCache::new(),
                account: Mutex::new(None),
                persistence: None,
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Create a coordinator that persists session tokens to the
    /// credential store under `instance`, and restores the previous
    /// token on connect.
    pub fn with_persistence(
        config: CoordinatorConfig,
        store: Arc<Mutex<CredentialStore>>,
        instance: String,
    ) -> Result<Self, CoreError> {
        let mut coordinator = Self::new(config)?;
        let inner = Arc::get_mut(&mut coordinator.inner)
            .ok_or_else(|| CoreError::Internal("coordinator already shared".into()))?;
        inner.persistence = Some(TokenPersistence { store, instance });
        Ok(coordinator)
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &DeviceStore {
        &self.inner.store
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.inner.registry
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Authenticate, run the first refresh round, and start the
    /// background poll task.
    pub async fn connect(&self) -> Result<(), CoreError> {
        // send_replace, not send: the state must advance even while
        // nobody holds a receiver.
        self.inner.poll_state.send_replace(PollState::Connecting);

        let client = RestClient::new(
            self.inner.config.base_url.clone(),
            &self.inner.config.transport,
            self.inner.tokens.clone(),
        )
        .map_err(CoreError::from)?;

        // Resume the previous session if a token was persisted.
        if let Some(persistence) = &self.inner.persistence {
            let stored = persistence.store.lock().await.token(&persistence.instance);
            if let Some(token) = stored {
                debug!("restoring persisted session token");
                self.inner.tokens.set(token).await;
            }
        }

        *self.inner.client.lock().await = Some(client);

        // The poll task starts before the first round runs: a first
        // round that exhausts its retries leaves the instance Degraded,
        // and only the scheduled polls can bring it back to Ready.
        let interval = self.inner.config.poll_interval;
        if !interval.is_zero() {
            let coordinator = self.clone();
            let cancel = self.inner.cancel.clone();
            let handle = tokio::spawn(poll_task(coordinator, interval, cancel));
            self.inner.task_handles.lock().await.push(handle);
        }

        self.refresh().await?;

        info!(devices = self.inner.store.len(), "connected to pool cloud");
        Ok(())
    }

    /// Cancel background tasks and drop the session.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        *self.inner.client.lock().await = None;
        self.inner.tokens.clear().await;
        self.inner.poll_state.send_replace(PollState::Uninitialized);
        debug!("coordinator shut down");
    }

    // ── Refresh ──────────────────────────────────────────────────

    /// Run one refresh round: up to [`MAX_ATTEMPTS`] tries of the whole
    /// session+fetch sequence, [`RETRY_DELAY`] apart. An auth failure
    /// clears the cached token so the next attempt logs in fresh.
    ///
    /// On exhaustion the previous data stays in the store, the state
    /// drops to [`PollState::Degraded`], and the error is returned so
    /// callers see the failed round.
    pub async fn refresh(&self) -> Result<(), CoreError> {
        let mut last_error = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            match self.try_refresh().await {
                Ok(()) => {
                    self.inner.poll_state.send_replace(PollState::Ready);
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "refresh attempt failed");
                    if matches!(e, CoreError::AuthenticationFailed { .. }) {
                        // Force a fresh login on the next attempt.
                        self.inner.tokens.clear().await;
                        self.persist_token(None).await;
                    }
                    last_error = e.to_string();
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }

        warn!(
            attempts = MAX_ATTEMPTS,
            "refresh round exhausted, keeping previous readings"
        );
        self.inner.poll_state.send_replace(PollState::Degraded);
        Err(CoreError::RefreshExhausted {
            attempts: MAX_ATTEMPTS,
            last_error,
        })
    }

    /// One attempt: validate or establish the session, then fetch and
    /// normalize every device.
    async fn try_refresh(&self) -> Result<(), CoreError> {
        let client_guard = self.inner.client.lock().await;
        let client = client_guard.as_ref().ok_or(CoreError::NotConnected)?;

        let envelope = self.ensure_session(client).await?;

        let records: Vec<_> = envelope
            .data
            .as_ref()
            .map(|data| data.all_devices().cloned().collect())
            .unwrap_or_default();

        if let Some(data) = &envelope.data {
            *self.inner.account.lock().await = Some(json!({
                "member": data.member,
                "ownedDevices": data.owned_devices,
                "devices": data.devices,
            }));
        }

        for record in records {
            let metadata = DeviceMetadata::from(&record);
            let telemetry = client.device_status(record.id).await?;
            self.apply_device(Device {
                id: record.id,
                metadata,
                telemetry,
            });
        }

        Ok(())
    }

    /// Validate the cached token, logging in when it is absent or
    /// rejected. Returns the account envelope either way.
    async fn ensure_session(
        &self,
        client: &RestClient,
    ) -> Result<halite_api::models::AuthEnvelope, CoreError> {
        if self.inner.tokens.is_set().await {
            match client.check_token().await {
                Ok(envelope) => return Ok(envelope),
                Err(e) if e.is_auth_expired() => {
                    debug!("cached token rejected, logging in again");
                    self.inner.tokens.clear().await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        let envelope = client
            .login(&self.inner.config.username, &self.inner.config.password)
            .await?;
        self.persist_token(envelope.token.as_deref()).await;
        Ok(envelope)
    }

    /// Store a fetched device and emit discovery/change events.
    fn apply_device(&self, device: Device) {
        let device_id = device.id;
        let discovered = !self.inner.store.contains(device_id);

        let mut changed_keys = Vec::new();
        if let Some(telemetry) = &device.telemetry {
            let mut live_keys = std::collections::HashSet::new();
            for description in self.inner.registry.iter() {
                if !description.applicability.matches(telemetry) {
                    continue;
                }
                let Some(reading) = normalize::normalize(description, telemetry) else {
                    continue;
                };
                live_keys.insert(description.key.clone());
                if self
                    .inner
                    .store
                    .record_reading(device_id, &description.key, reading)
                {
                    changed_keys.push(description.key.clone());
                }
            }
            self.inner.store.retain_readings(device_id, &live_keys);
        }

        self.inner.store.upsert(device);

        if discovered {
            debug!(device_id, "device discovered");
            let _ = self
                .inner
                .event_tx
                .send(CoordinatorEvent::DeviceDiscovered { device_id });
        }
        if !changed_keys.is_empty() {
            let _ = self.inner.event_tx.send(CoordinatorEvent::ReadingsChanged {
                device_id,
                keys: changed_keys,
            });
        }
    }

    async fn persist_token(&self, token: Option<&str>) {
        if let Some(persistence) = &self.inner.persistence {
            let mut store = persistence.store.lock().await;
            if let Err(e) = store.update_token(&persistence.instance, token) {
                warn!(error = %e, "failed to persist session token");
            }
        }
    }

    // ── Actions ──────────────────────────────────────────────────

    /// Route an entity action to the cloud, then refresh immediately so
    /// the store reflects the device's accepted state.
    ///
    /// Writes are fire-and-forget on the vendor side; the forced
    /// refresh is the only confirmation.
    pub async fn execute_action(
        &self,
        device_id: u64,
        key: &str,
        action: EntityAction,
        argument: Option<Value>,
    ) -> Result<(), CoreError> {
        let description = self
            .inner
            .registry
            .by_key(key)
            .ok_or_else(|| CoreError::UnknownKey { key: key.to_owned() })?
            .clone();

        {
            let client_guard = self.inner.client.lock().await;
            let client = client_guard.as_ref().ok_or(CoreError::NotConnected)?;

            match action {
                EntityAction::TurnOn | EntityAction::TurnOff | EntityAction::Toggle => {
                    if description.kind != EntityKind::Switch {
                        return Err(CoreError::UnsupportedAction {
                            key: key.to_owned(),
                            action,
                        });
                    }
                    let target = match action {
                        EntityAction::TurnOn => true,
                        EntityAction::TurnOff => false,
                        _ => !self.current_switch_state(device_id, key),
                    };
                    self.write_switch(client, device_id, key, target).await?;
                }
                EntityAction::SelectOption => {
                    if description.kind != EntityKind::Select {
                        return Err(CoreError::UnsupportedAction {
                            key: key.to_owned(),
                            action,
                        });
                    }
                    let option = argument
                        .as_ref()
                        .and_then(Value::as_str)
                        .ok_or_else(|| CoreError::InvalidArgument {
                            message: "select_option requires a string option".into(),
                        })?;
                    let parsed: i64 =
                        option.parse().map_err(|_| CoreError::InvalidArgument {
                            message: format!("option '{option}' is not an integer"),
                        })?;
                    client.set_value(device_id, key, json!(parsed)).await?;
                }
                EntityAction::SetNativeValue => {
                    if description.kind != EntityKind::Number {
                        return Err(CoreError::UnsupportedAction {
                            key: key.to_owned(),
                            action,
                        });
                    }
                    let value = argument
                        .as_ref()
                        .and_then(Value::as_f64)
                        .ok_or_else(|| CoreError::InvalidArgument {
                            message: "set_native_value requires a number".into(),
                        })?;
                    let encoded = encode_for_write(description.class, value);
                    client.set_value(device_id, key, encoded).await?;
                }
            }
        }

        if let Err(e) = self.refresh().await {
            warn!(error = %e, "post-write refresh failed");
        }
        Ok(())
    }

    /// Current boolean state of a switch, defaulting to off when the
    /// reading is missing.
    fn current_switch_state(&self, device_id: u64, key: &str) -> bool {
        self.inner
            .store
            .reading(device_id, key)
            .and_then(|reading| reading.value.as_bool())
            .unwrap_or(false)
    }

    /// Switch writes. Master power must ship together with the current
    /// turbo flags or the vendor resets them.
    async fn write_switch(
        &self,
        client: &RestClient,
        device_id: u64,
        key: &str,
        on: bool,
    ) -> Result<(), CoreError> {
        let state = json!(i32::from(on));

        if key == keys::RUNTIME_DEVICE_ON {
            let device = self
                .inner
                .store
                .get(device_id)
                .ok_or(CoreError::DeviceNotFound { device_id })?;
            let turbo = device
                .raw(keys::RUNTIME_DEVICE_TURBO)
                .cloned()
                .unwrap_or_else(|| json!(0));
            let turbo_time = device
                .raw(keys::RUNTIME_DEVICE_TURBO_TIME)
                .cloned()
                .unwrap_or_else(|| json!(0));

            client
                .set_values(
                    device_id,
                    &[
                        (keys::RUNTIME_DEVICE_ON, state),
                        (keys::RUNTIME_DEVICE_TURBO, turbo),
                        (keys::RUNTIME_DEVICE_TURBO_TIME, turbo_time),
                    ],
                )
                .await?;
        } else {
            client.set_value(device_id, key, state).await?;
        }
        Ok(())
    }

    // ── State observation ────────────────────────────────────────

    /// Subscribe to poll state changes.
    pub fn poll_state(&self) -> watch::Receiver<PollState> {
        self.inner.poll_state.subscribe()
    }

    pub fn current_state(&self) -> PollState {
        *self.inner.poll_state.borrow()
    }

    /// Subscribe to the event broadcast stream.
    pub fn events(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.inner.event_tx.subscribe()
    }

    // ── Diagnostics ──────────────────────────────────────────────

    /// Account and device dump with sensitive fields redacted.
    pub async fn diagnostics(&self) -> Value {
        let account = self.inner.account.lock().await.clone();

        let devices: Vec<Value> = self
            .inner
            .store
            .snapshot()
            .iter()
            .map(|device| {
                json!({
                    "id": device.id,
                    "nickname": device.metadata.nickname,
                    "serialNumber": device.metadata.serial_number,
                    "model": device.metadata.model,
                    "firmwareVersion": device.metadata.firmware_version,
                    "telemetry": device.telemetry,
                })
            })
            .collect();

        diagnostics::redact(&json!({
            "account": account,
            "devices": devices,
            "state": format!("{:?}", self.current_state()),
        }))
    }
}

/// Encode a number for the vendor's fixed-point wire formats.
fn encode_for_write(class: ValueClass, value: f64) -> Value {
    match class {
        ValueClass::Temperature => json!(normalize::encode_temperature(value)),
        // 7.25 -> 725, same digit-shift as the decode.
        ValueClass::Ph => json!((value * 100.0).round() as i64),
        _ => {
            if value.fract() == 0.0 {
                json!(value as i64)
            } else {
                json!(value)
            }
        }
    }
}

// ── Background task ──────────────────────────────────────────────

/// Periodic refresh until cancelled. A failed round already logged and
/// flipped the state to Degraded; the loop keeps trying on schedule.
///
/// Cancellation races the in-flight round too, so teardown drops any
/// pending HTTP call instead of waiting out its retries.
async fn poll_task(coordinator: Coordinator, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = coordinator.refresh() => {
                if let Err(e) = result {
                    warn!(error = %e, "scheduled refresh failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_for_write_shifts_fixed_point() {
        assert_eq!(encode_for_write(ValueClass::Ph, 7.25), json!(725));
        assert_eq!(encode_for_write(ValueClass::Temperature, 23.5), json!(2350));
        assert_eq!(encode_for_write(ValueClass::Raw, 80.0), json!(80));
        assert_eq!(encode_for_write(ValueClass::Raw, 2.5), json!(2.5));
    }
}
