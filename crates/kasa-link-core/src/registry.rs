//! Shared device registry keyed by device id.

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::device::Device;

/// Set of known devices. At most one record per id; records are never evicted.
#[derive(Debug, Default)]
pub struct Registry {
    devices: RwLock<HashMap<String, Device>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<Device> {
        self.devices.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.devices.read().await.contains_key(id)
    }

    /// Insert a record unless one with the same id exists. Returns true if inserted.
    pub async fn insert(&self, device: Device) -> bool {
        let mut devices = self.devices.write().await;
        if devices.contains_key(&device.id) {
            return false;
        }
        devices.insert(device.id.clone(), device);
        true
    }

    /// Snapshot of all records, ordered by id.
    pub async fn all(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.devices.read().await.values().cloned().collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }

    /// Run `f` against the record with `id`, if present.
    pub async fn update<F, R>(&self, id: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut Device) -> R,
    {
        self.devices.write().await.get_mut(id).map(f)
    }

    /// Run `f` against every record currently owning `address`. Returns the ids and results.
    pub async fn update_by_address<F, R>(&self, address: IpAddr, mut f: F) -> Vec<(String, R)>
    where
        F: FnMut(&mut Device) -> R,
    {
        self.devices
            .write()
            .await
            .values_mut()
            .filter(|d| d.address == address)
            .map(|d| (d.id.clone(), f(d)))
            .collect()
    }

    /// Ids of records not heard from since `cutoff`.
    pub async fn stale(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        let mut ids: Vec<String> = self
            .devices
            .read()
            .await
            .values()
            .filter(|d| d.is_stale(cutoff))
            .map(|d| d.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Run `f` against every record not heard from since `cutoff`.
    pub async fn for_each_stale<F>(&self, cutoff: DateTime<Utc>, mut f: F)
    where
        F: FnMut(&mut Device),
    {
        self.devices
            .write()
            .await
            .values_mut()
            .filter(|d| d.is_stale(cutoff))
            .for_each(|d| f(d));
    }

    /// Lookup by id or, failing that, by case-insensitive alias or address.
    pub async fn find(&self, target: &str) -> Option<Device> {
        let devices = self.devices.read().await;
        if let Some(device) = devices.get(target) {
            return Some(device.clone());
        }
        devices
            .values()
            .find(|d| d.alias.eq_ignore_ascii_case(target) || d.address.to_string() == target)
            .cloned()
    }
}
