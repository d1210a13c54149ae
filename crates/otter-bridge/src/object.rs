//! Associative container view of an engine object
//!
//! Keys are the object's enumerable own property names, integer-like names
//! included. Every query re-reads the key set from the engine, because script
//! code may change the object between calls.

use crate::error::{BridgeError, BridgeResult};
use crate::proxy::{ForeignObject, ScriptObject};
use crate::value::HostValue;

impl ScriptObject {
    /// Current keys, integer-like names first
    pub fn keys(&self) -> BridgeResult<Vec<String>> {
        self.core()
            .exclusive(|host, handle| Ok(host.property_names(handle, true)?))
    }

    pub fn values(&self) -> BridgeResult<Vec<HostValue>> {
        Ok(self.entries()?.into_iter().map(|(_, value)| value).collect())
    }

    /// Key-value pairs, read in one engine turn
    pub fn entries(&self) -> BridgeResult<Vec<(String, HostValue)>> {
        let core = self.core();
        core.exclusive(|host, handle| {
            let marshaler = core.bridge().marshaler(host);
            host.property_names(handle, true)?
                .into_iter()
                .map(|key| {
                    let value = host.get_property(handle, &key)?;
                    Ok((key, marshaler.to_host_property(value, core)?))
                })
                .collect()
        })
    }

    pub fn len(&self) -> BridgeResult<usize> {
        Ok(self.keys()?.len())
    }

    pub fn is_empty(&self) -> BridgeResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Whether `key` is an own property
    pub fn contains_key(&self, key: &str) -> BridgeResult<bool> {
        let core = self.core();
        core.exclusive(|host, handle| match host.try_get_property(handle, key)? {
            Some(value) => {
                core.bridge().marshaler(host).discard(value);
                Ok(true)
            }
            None => Ok(false),
        })
    }

    /// Whether `key` is an own property holding `value`
    pub fn contains(&self, key: &str, value: &HostValue) -> BridgeResult<bool> {
        Ok(self.try_get(key)?.is_some_and(|current| &current == value))
    }

    /// Value of the own property `key`, if present
    pub fn try_get(&self, key: &str) -> BridgeResult<Option<HostValue>> {
        let core = self.core();
        core.exclusive(|host, handle| {
            host.try_get_property(handle, key)?
                .map(|value| core.bridge().marshaler(host).to_host_property(value, core))
                .transpose()
        })
    }

    /// Value of the own property `key`, failing when it is absent
    pub fn require(&self, key: &str) -> BridgeResult<HostValue> {
        self.try_get(key)?
            .ok_or_else(|| BridgeError::KeyNotFound(key.to_string()))
    }

    /// Add or overwrite `key`
    pub fn insert(&self, key: &str, value: impl Into<HostValue>) -> BridgeResult<()> {
        self.set_property(key, value)
    }

    pub fn remove(&self, key: &str) -> BridgeResult<bool> {
        self.delete_property(key)
    }

    /// Remove `key` only while it holds `value`
    pub fn remove_entry(&self, key: &str, value: &HostValue) -> BridgeResult<bool> {
        if self.contains(key, value)? {
            self.remove(key)
        } else {
            Ok(false)
        }
    }

    /// Delete every current key
    pub fn clear(&self) -> BridgeResult<()> {
        self.core().exclusive(|host, handle| {
            for key in host.property_names(handle, true)? {
                host.delete_property(handle, &key)?;
            }
            Ok(())
        })
    }

    /// Copy all entries into `dest` starting at `index`
    ///
    /// Fails without writing anything when `dest` cannot hold them all.
    pub fn copy_to(&self, dest: &mut [(String, HostValue)], index: usize) -> BridgeResult<()> {
        let entries = self.entries()?;
        let available = dest.len().saturating_sub(index);
        if index > dest.len() || entries.len() > available {
            return Err(BridgeError::InsufficientSpace {
                needed: entries.len(),
                available,
            });
        }
        for (slot, entry) in dest[index..].iter_mut().zip(entries) {
            *slot = entry;
        }
        Ok(())
    }
}
