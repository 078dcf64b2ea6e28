//! Engine coordinator.
//!
//! Owns the shared datagram socket, the registry and the signals handed to
//! the hosting process. [`Engine::start`] runs the startup discovery burst
//! and spawns the Listener and Poller under one cancellation token.

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use chrono::Utc;
use futures::future;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::device::direct::{self, DirectChannel, TcpChannel};
use crate::device::{Device, DeviceKind, DeviceState, FollowUp, Liveness};
use crate::discovery::{broadcast as broadcast_resolver, create_broadcast_socket, listener, poller};
use crate::error::{CoreError, DeviceError, ProtocolError, Result};
use crate::protocol::{classify, deobfuscate, obfuscate, Commands, Inbound, Sysinfo};
use crate::refresh::RefreshSignal;
use crate::registry::Registry;

/// Capacity of the liveness event channel. Slow subscribers see `Lagged`.
const LIVENESS_CHANNEL_CAPACITY: usize = 64;

/// First octets of the placeholder addresses given to cache-seeded records.
const PLACEHOLDER_PREFIX: [u8; 3] = [169, 254, 199];

/// A responsive/unresponsive transition of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LivenessChange {
    pub id: String,
    pub alias: String,
    pub liveness: Liveness,
}

/// Why a datagram was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Malformed,
    UnknownModel,
    UnknownAddress,
    /// The device answered with a non-zero `err_code`
    Rejected,
    Unhandled,
}

/// What the Listener did with one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ack,
    Created(String),
    Updated(String),
    Energy { owners: Vec<String> },
    Dropped(DropReason),
}

pub struct Engine {
    config: EngineConfig,
    socket: Arc<UdpSocket>,
    registry: Registry,
    broadcasts: RwLock<Vec<Ipv4Addr>>,
    refresh: RefreshSignal,
    direct: Arc<dyn DirectChannel>,
    follow_up_permits: Arc<Semaphore>,
    liveness_tx: broadcast::Sender<LivenessChange>,
}

impl Engine {
    /// Bind the shared socket and build an engine using TCP for direct requests.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(config: EngineConfig) -> Result<Arc<Self>> {
        let channel = TcpChannel::new(config.device_port, config.command_timeout());
        Self::with_channel(config, Arc::new(channel))
    }

    /// Like [`Engine::bind`] with a caller-supplied direct channel.
    pub fn with_channel(
        config: EngineConfig,
        direct: Arc<dyn DirectChannel>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let socket = create_broadcast_socket(config.bind_addr)?;
        let broadcasts = config.broadcast_addresses.clone().unwrap_or_default();
        let (liveness_tx, _) = broadcast::channel(LIVENESS_CHANNEL_CAPACITY);
        let follow_up_permits = Arc::new(Semaphore::new(config.follow_up_concurrency));

        Ok(Arc::new(Self {
            config,
            socket: Arc::new(socket),
            registry: Registry::new(),
            broadcasts: RwLock::new(broadcasts),
            refresh: RefreshSignal::new(),
            direct,
            follow_up_permits,
            liveness_tx,
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn refresh(&self) -> &RefreshSignal {
        &self.refresh
    }

    pub(crate) fn socket(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.socket)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn subscribe_liveness(&self) -> broadcast::Receiver<LivenessChange> {
        self.liveness_tx.subscribe()
    }

    /// Snapshot of every record.
    pub async fn snapshot(&self) -> Vec<Device> {
        self.registry.all().await
    }

    // ==================== Lifecycle ====================

    /// Spawn the Listener, run the startup burst, then spawn the Poller.
    ///
    /// Returns once the first snapshot is available.
    pub async fn start(self: &Arc<Self>, cancel: CancellationToken) -> Result<EngineHandle> {
        let listener = tokio::spawn(listener::run(Arc::clone(self), cancel.clone()));

        self.refresh_broadcasts().await;
        match self.discover().await {
            Ok(sent) => debug!(targets = sent, "startup discovery sent"),
            Err(e) => warn!(error = %e, "startup discovery failed"),
        }

        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(self.config.discovery_window()) => {}
        }
        info!(devices = self.registry.len().await, "startup discovery window closed");

        let poller = tokio::spawn(poller::run(Arc::clone(self), cancel.clone()));

        Ok(EngineHandle {
            cancel,
            listener,
            poller,
        })
    }

    // ==================== Discovery ====================

    /// Re-resolve broadcast targets unless they are fixed by configuration.
    pub async fn refresh_broadcasts(&self) {
        let resolved = match &self.config.broadcast_addresses {
            Some(fixed) => fixed.clone(),
            None => broadcast_resolver::resolve(),
        };

        let mut current = self.broadcasts.write().await;
        if *current != resolved {
            info!(addresses = ?resolved, "broadcast targets changed");
            *current = resolved;
        }
    }

    pub async fn broadcast_addresses(&self) -> Vec<Ipv4Addr> {
        self.broadcasts.read().await.clone()
    }

    /// Send the discovery query to every broadcast target. Returns how many sends succeeded.
    pub async fn discover(&self) -> Result<usize> {
        let targets = self.broadcasts.read().await.clone();
        let payload = obfuscate(Commands::get_sysinfo().as_bytes());

        let mut sent = 0;
        let mut last_error = None;
        for target in &targets {
            let addr = SocketAddr::from((*target, self.config.device_port));
            match self.socket.send_to(&payload, addr).await {
                Ok(_) => sent += 1,
                Err(e) => {
                    warn!(%addr, error = %e, "discovery send failed");
                    last_error = Some(e);
                }
            }
        }

        match (sent, last_error) {
            (0, Some(e)) => Err(CoreError::Io(e)),
            _ => Ok(sent),
        }
    }

    // ==================== Inbound ====================

    /// Classify one datagram and apply it to the registry.
    pub async fn handle_datagram(self: &Arc<Self>, payload: &[u8], from: IpAddr) -> Outcome {
        let plain = deobfuscate(payload);

        let inbound = match classify(&plain) {
            Ok(inbound) => inbound,
            Err(e) => {
                debug!(ip = %from, error = %e, "dropping malformed datagram");
                return Outcome::Dropped(DropReason::Malformed);
            }
        };

        match inbound {
            Inbound::Ack { err_code } => {
                if err_code != 0 {
                    warn!(ip = %from, err_code, "device rejected command");
                }
                Outcome::Ack
            }
            Inbound::Energy(realtime) => {
                if realtime.err_code != 0 {
                    warn!(ip = %from, err_code = realtime.err_code, "energy query rejected");
                    return Outcome::Dropped(DropReason::Rejected);
                }

                let owners: Vec<String> = self
                    .registry
                    .update_by_address(from, |d| d.update_energy(&realtime))
                    .await
                    .into_iter()
                    .filter_map(|(id, applied)| applied.then_some(id))
                    .collect();

                if owners.is_empty() {
                    info!(ip = %from, "energy telemetry with no owner, dropping");
                    return Outcome::Dropped(DropReason::UnknownAddress);
                }
                Outcome::Energy { owners }
            }
            Inbound::Sysinfo(info) => self.apply_sysinfo(&info, from).await,
            Inbound::Unknown => {
                debug!(ip = %from, "unhandled payload shape");
                Outcome::Dropped(DropReason::Unhandled)
            }
        }
    }

    async fn apply_sysinfo(self: &Arc<Self>, info: &Sysinfo, from: IpAddr) -> Outcome {
        let id = info.device_id.clone();

        if let Some(outcome) = self.update_known(info, from).await {
            return outcome;
        }

        let (device, follow_ups) = match Device::from_report(info, from) {
            Ok(created) => created,
            Err(ProtocolError::UnknownModel(model)) => {
                info!(%model, ip = %from, id = %id, "unsupported model, ignoring");
                return Outcome::Dropped(DropReason::UnknownModel);
            }
            Err(e) => {
                warn!(ip = %from, error = %e, "could not build record");
                return Outcome::Dropped(DropReason::Malformed);
            }
        };

        let (alias, model) = (device.alias.clone(), device.model);
        if !self.registry.insert(device).await {
            // lost a race with a cache seed; treat as an update
            return self
                .update_known(info, from)
                .await
                .unwrap_or(Outcome::Updated(id));
        }

        info!(%id, %alias, %model, ip = %from, "discovered device");
        self.refresh.raise();
        self.run_follow_ups(&id, from, follow_ups);
        Outcome::Created(id)
    }

    /// Apply a report to an existing record. None if the id is unknown.
    async fn update_known(self: &Arc<Self>, info: &Sysinfo, from: IpAddr) -> Option<Outcome> {
        let id = info.device_id.clone();
        let (follow_ups, recovered, alias, address) = self
            .registry
            .update(&id, |d| {
                let recovered = !d.is_responsive();
                let follow_ups = d.update(info, from);
                (follow_ups, recovered, d.alias.clone(), d.address)
            })
            .await?;

        if recovered {
            info!(%id, %alias, "device responsive again");
            self.publish(LivenessChange {
                id: id.clone(),
                alias,
                liveness: Liveness::Responsive,
            });
        }

        self.run_follow_ups(&id, address, follow_ups);
        Some(Outcome::Updated(id))
    }

    fn run_follow_ups(self: &Arc<Self>, id: &str, address: IpAddr, follow_ups: Vec<FollowUp>) {
        for follow_up in follow_ups {
            let engine = Arc::clone(self);
            let id = id.to_string();
            match follow_up {
                FollowUp::QueryEnergy => {
                    self.spawn_follow_up(async move {
                        if let Err(e) = engine.send_to(address, Commands::get_emeter_realtime()).await {
                            debug!(%id, ip = %address, error = %e, "energy query failed");
                        }
                    });
                }
                FollowUp::QueryChildEnergy { child_id } => {
                    self.spawn_follow_up(async move {
                        let command = Commands::get_child_emeter_realtime(&id, &child_id);
                        if let Err(e) = engine.send_to(address, &command).await {
                            debug!(%id, child = %child_id, error = %e, "child energy query failed");
                        }
                    });
                }
                FollowUp::FetchCountdown => {
                    self.spawn_follow_up(async move {
                        match direct::fetch_countdown_rules(engine.direct.as_ref(), address).await {
                            Ok(rules) => {
                                engine
                                    .registry
                                    .update(&id, |d| d.update_countdown(&rules))
                                    .await;
                            }
                            Err(e) => debug!(%id, ip = %address, error = %e, "countdown fetch failed"),
                        }
                    });
                }
                FollowUp::ClearCountdown => {
                    self.spawn_follow_up(async move {
                        if let Err(e) = direct::clear_countdown_rules(engine.direct.as_ref(), address).await {
                            debug!(%id, ip = %address, error = %e, "countdown clear failed");
                        }
                    });
                }
                FollowUp::FetchDimmerParameters => {
                    self.spawn_follow_up(async move {
                        match direct::fetch_dimmer_parameters(engine.direct.as_ref(), address).await {
                            Ok(params) => {
                                engine
                                    .registry
                                    .update(&id, |d| {
                                        d.state.capability_mut().apply_dimmer_parameters(params)
                                    })
                                    .await;
                            }
                            Err(e) => debug!(%id, ip = %address, error = %e, "dimmer parameter fetch failed"),
                        }
                    });
                }
            }
        }
    }

    /// Run a follow-up once a permit is free. Permits bound how many
    /// queries one burst of reports can put in flight.
    fn spawn_follow_up<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.follow_up_permits);
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            task.await;
        });
    }

    // ==================== Liveness ====================

    /// Probe every stale record. Returns the transitions that happened.
    pub async fn sweep_stale(self: &Arc<Self>) -> Vec<LivenessChange> {
        let cutoff = Utc::now() - self.config.stale_after();
        let stale = self.registry.stale(cutoff).await;
        if stale.is_empty() {
            return Vec::new();
        }
        debug!(count = stale.len(), "probing stale devices");

        stream::iter(stale)
            .map(|id| {
                let engine = Arc::clone(self);
                async move { engine.mark_unresponsive(&id).await }
            })
            .buffer_unordered(self.config.probe_concurrency)
            .filter_map(future::ready)
            .collect()
            .await
    }

    /// Verify a silent record over the direct path before flipping it.
    ///
    /// A successful probe counts as a report and keeps the record
    /// responsive. A failed probe marks it unresponsive; the record stays
    /// in the registry.
    pub async fn mark_unresponsive(self: &Arc<Self>, id: &str) -> Option<LivenessChange> {
        let device = self.registry.get(id).await?;

        let probe = timeout(
            self.config.probe_timeout(),
            direct::fetch_sysinfo(self.direct.as_ref(), device.address),
        )
        .await;

        match probe {
            Ok(Ok(info)) if info.device_id == device.id => {
                let was_unresponsive = !device.is_responsive();
                self.update_known(&info, device.address).await;
                was_unresponsive.then(|| LivenessChange {
                    id: device.id.clone(),
                    alias: info.alias.clone(),
                    liveness: Liveness::Responsive,
                })
            }
            Ok(Ok(info)) => {
                debug!(%id, ip = %device.address, other = %info.device_id, "address now belongs to another device");
                self.flip_unresponsive(id).await
            }
            Ok(Err(e)) => {
                debug!(%id, ip = %device.address, error = %e, "liveness probe failed");
                self.flip_unresponsive(id).await
            }
            Err(_) => {
                debug!(%id, ip = %device.address, "liveness probe timed out");
                self.flip_unresponsive(id).await
            }
        }
    }

    async fn flip_unresponsive(&self, id: &str) -> Option<LivenessChange> {
        let (changed, alias, failures) = self
            .registry
            .update(id, |d| (d.mark_unresponsive(), d.alias.clone(), d.failed_probes))
            .await?;

        if !changed {
            debug!(%id, failures, "device still unresponsive");
            return None;
        }

        warn!(%id, %alias, "device unresponsive");
        let change = LivenessChange {
            id: id.to_string(),
            alias,
            liveness: Liveness::Unresponsive,
        };
        self.publish(change.clone());
        Some(change)
    }

    fn publish(&self, change: LivenessChange) {
        // no subscribers is fine
        let _ = self.liveness_tx.send(change);
    }

    // ==================== Actuation ====================

    async fn send_to(&self, address: IpAddr, command: &str) -> Result<()> {
        let target = SocketAddr::new(address, self.config.device_port);
        self.socket
            .send_to(&obfuscate(command.as_bytes()), target)
            .await
            .map_err(|e| {
                warn!(%target, error = %e, "unicast send failed");
                CoreError::Io(e)
            })?;
        Ok(())
    }

    async fn require(&self, id: &str) -> Result<Device> {
        self.registry
            .get(id)
            .await
            .ok_or_else(|| DeviceError::NotFound(id.to_string()).into())
    }

    fn unsupported(device: &Device, operation: &'static str) -> CoreError {
        DeviceError::Unsupported {
            id: device.id.clone(),
            operation,
        }
        .into()
    }

    /// Switch the relay of a single-relay device.
    pub async fn set_relay(&self, id: &str, on: bool) -> Result<()> {
        let device = self.require(id).await?;
        if device.relay().is_none() {
            return Err(Self::unsupported(&device, "set_relay"));
        }

        self.send_to(device.address, &Commands::set_relay_state(on)).await?;
        self.registry
            .update(id, |d| d.state.capability_mut().set_relay(on))
            .await;
        Ok(())
    }

    /// Set dimmer brightness. Values above 100 are clamped.
    pub async fn set_brightness(&self, id: &str, brightness: u8) -> Result<()> {
        let device = self.require(id).await?;
        if device.kind() != DeviceKind::Dimmer {
            return Err(Self::unsupported(&device, "set_brightness"));
        }

        let brightness = brightness.min(100);
        self.send_to(device.address, &Commands::set_brightness(brightness))
            .await?;
        self.registry
            .update(id, |d| d.state.capability_mut().set_brightness(brightness))
            .await;
        Ok(())
    }

    /// Switch one outlet of a power strip. `child` is the sub-id or the full address.
    pub async fn set_child_relay(&self, id: &str, child: &str, on: bool) -> Result<()> {
        let device = self.require(id).await?;
        let DeviceState::PowerStrip(strip) = &device.state else {
            return Err(Self::unsupported(&device, "set_child_relay"));
        };
        let child_id = strip
            .resolve_child(&device.id, child)
            .map(|c| c.id.clone())
            .ok_or_else(|| DeviceError::NoSuchChild {
                id: device.id.clone(),
                child: child.to_string(),
            })?;

        let command = Commands::set_child_relay_state(&device.id, &child_id, on);
        self.send_to(device.address, &command).await?;
        self.registry
            .update(id, |d| d.state.capability_mut().set_child_relay(&child_id, on))
            .await;
        Ok(())
    }

    /// Replace any countdown with one that flips the relay after `seconds`.
    /// Zero clears the countdown.
    pub async fn set_countdown(&self, id: &str, seconds: u32) -> Result<()> {
        let device = self.require(id).await?;
        let relay = device
            .relay()
            .ok_or_else(|| Self::unsupported(&device, "set_countdown"))?;

        if seconds == 0 {
            direct::clear_countdown_rules(self.direct.as_ref(), device.address).await?;
            self.registry.update(id, |d| d.update_countdown(&[])).await;
            return Ok(());
        }

        direct::add_countdown_rule(self.direct.as_ref(), device.address, seconds, !relay).await?;
        self.registry
            .update(id, |d| d.state.capability_mut().start_countdown(seconds))
            .await;
        Ok(())
    }

    pub async fn set_alias(&self, id: &str, alias: &str) -> Result<()> {
        let device = self.require(id).await?;
        direct::set_alias(self.direct.as_ref(), device.address, alias).await?;
        self.registry
            .update(id, |d| d.alias = alias.to_string())
            .await;
        Ok(())
    }

    // ==================== Warm start ====================

    /// Seed records from cached reports, using placeholder addresses until
    /// the device is heard from. Returns how many records were added.
    pub async fn seed<'a, I>(&self, reports: I) -> usize
    where
        I: IntoIterator<Item = &'a Sysinfo>,
    {
        let mut seeded = 0usize;
        for info in reports {
            let n = (seeded % 254 + 1) as u8;
            let [a, b, c] = PLACEHOLDER_PREFIX;
            let placeholder = IpAddr::from([a, b, c, n]);

            match Device::from_report(info, placeholder) {
                Ok((device, _)) => {
                    if self.registry.insert(device).await {
                        seeded += 1;
                    }
                }
                Err(e) => debug!(id = %info.device_id, error = %e, "skipping cached report"),
            }
        }

        if seeded > 0 {
            info!(count = seeded, "seeded registry from cache");
            self.refresh.raise();
        }
        seeded
    }
}

/// Running Listener and Poller.
pub struct EngineHandle {
    cancel: CancellationToken,
    listener: JoinHandle<Result<()>>,
    poller: JoinHandle<()>,
}

impl EngineHandle {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel both tasks and wait for them. Returns the Listener's exit status.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();

        let listener = self.listener.await;
        if let Err(e) = self.poller.await {
            warn!(error = %e, "poller task ended abnormally");
        }

        listener.map_err(|e| CoreError::Other(format!("listener task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl DirectChannel for Unreachable {
        async fn request(&self, address: IpAddr, _command: &str) -> Result<String> {
            Err(DeviceError::Offline {
                ip: address.to_string(),
            }
            .into())
        }
    }

    fn engine() -> Arc<Engine> {
        let config = EngineConfig {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            broadcast_addresses: Some(vec![Ipv4Addr::LOCALHOST]),
            ..Default::default()
        };
        Engine::with_channel(config, Arc::new(Unreachable)).unwrap()
    }

    fn datagram(plain: &str) -> Vec<u8> {
        obfuscate(plain.as_bytes())
    }

    const SOURCE: IpAddr = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));

    #[tokio::test]
    async fn test_ack_is_discarded() {
        let engine = engine();
        let outcome = engine
            .handle_datagram(&datagram(r#"{"system":{"set_relay_state":{"err_code":0}}}"#), SOURCE)
            .await;
        assert_eq!(outcome, Outcome::Ack);
        assert!(engine.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_energy_from_unknown_address_dropped() {
        let engine = engine();
        let outcome = engine
            .handle_datagram(
                &datagram(r#"{"emeter":{"get_realtime":{"power_mw":100,"err_code":0}}}"#),
                SOURCE,
            )
            .await;
        assert_eq!(outcome, Outcome::Dropped(DropReason::UnknownAddress));
    }

    #[tokio::test]
    async fn test_seed_uses_placeholders_and_skips_unknown_models() {
        let engine = engine();
        let reports = vec![
            Sysinfo {
                model: "HS103(US)".to_string(),
                device_id: "A".to_string(),
                ..Default::default()
            },
            Sysinfo {
                model: "LB130(US)".to_string(),
                device_id: "B".to_string(),
                ..Default::default()
            },
        ];

        assert_eq!(engine.seed(&reports).await, 1);
        let device = engine.registry().get("A").await.unwrap();
        assert_eq!(device.address, IpAddr::from([169, 254, 199, 1]));
        assert!(!engine.registry().contains("B").await);
        assert_eq!(engine.refresh().generation(), 1);
    }

    #[tokio::test]
    async fn test_actuation_errors() {
        let engine = engine();
        assert!(matches!(
            engine.set_relay("missing", true).await,
            Err(CoreError::Device(DeviceError::NotFound(_)))
        ));

        let outlet = r#"{"system":{"get_sysinfo":{"model":"HS103(US)","deviceId":"X1","alias":"Lamp","relay_state":0}}}"#;
        engine.handle_datagram(&datagram(outlet), SOURCE).await;
        assert!(matches!(
            engine.set_brightness("X1", 50).await,
            Err(CoreError::Device(DeviceError::Unsupported { .. }))
        ));
        assert!(matches!(
            engine.set_child_relay("X1", "00", true).await,
            Err(CoreError::Device(DeviceError::Unsupported { .. }))
        ));
    }

    #[tokio::test]
    async fn test_unresponsive_is_published_once() {
        let engine = engine();
        let mut events = engine.subscribe_liveness();
        let outlet = r#"{"system":{"get_sysinfo":{"model":"HS200(US)","deviceId":"S1","alias":"Hall"}}}"#;
        engine.handle_datagram(&datagram(outlet), SOURCE).await;

        let change = engine.mark_unresponsive("S1").await.unwrap();
        assert_eq!(change.liveness, Liveness::Unresponsive);
        assert_eq!(events.recv().await.unwrap(), change);

        assert!(engine.mark_unresponsive("S1").await.is_none());
        assert_eq!(engine.registry().get("S1").await.unwrap().failed_probes, 2);
    }
}
