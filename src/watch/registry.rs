use std::io;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use winreg::RegKey;
use winreg::enums::{HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE};

use super::Watch;
use crate::models::SettingValue;

/// Minimum time between two registry reads.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Registry hive a [`RegistryWatch`] reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryRoot {
    CurrentUser,
    LocalMachine,
}

impl RegistryRoot {
    fn open(self) -> RegKey {
        match self {
            Self::CurrentUser => RegKey::predef(HKEY_CURRENT_USER),
            Self::LocalMachine => RegKey::predef(HKEY_LOCAL_MACHINE),
        }
    }
}

/// Signals when the values under a registry key change.
///
/// Compares a snapshot of the key's values on each poll, at most once per poll interval.
/// A missing key reads as empty, so creating or deleting it also signals.
#[derive(Debug)]
pub struct RegistryWatch {
    name: String,
    root: RegistryRoot,
    subkey: String,
    poll_interval: Duration,
    last_poll: Instant,
    snapshot: IndexMap<String, SettingValue>,
}

impl RegistryWatch {
    pub fn new(root: RegistryRoot, subkey: impl Into<String>) -> Self {
        let subkey = subkey.into();
        let snapshot = read_values(root, &subkey);

        Self {
            name: format!("{:?}\\{}", root, subkey),
            root,
            subkey,
            poll_interval: DEFAULT_POLL_INTERVAL,
            last_poll: Instant::now(),
            snapshot,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Values seen on the last poll.
    pub fn values(&self) -> &IndexMap<String, SettingValue> {
        &self.snapshot
    }
}

impl Watch for RegistryWatch {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_signaled(&mut self) -> bool {
        if self.last_poll.elapsed() < self.poll_interval {
            return false;
        }
        self.last_poll = Instant::now();

        let current = read_values(self.root, &self.subkey);
        if current == self.snapshot {
            return false;
        }

        self.snapshot = current;
        true
    }
}

fn read_values(root: RegistryRoot, subkey: &str) -> IndexMap<String, SettingValue> {
    match try_read_values(root, subkey) {
        Ok(values) => values,
        Err(e) if e.kind() == io::ErrorKind::NotFound => IndexMap::new(),
        Err(e) => {
            tracing::warn!("Failed to read registry key {}: {}", subkey, e);
            IndexMap::new()
        }
    }
}

fn try_read_values(root: RegistryRoot, subkey: &str) -> io::Result<IndexMap<String, SettingValue>> {
    use winreg::enums::RegType::{REG_DWORD, REG_EXPAND_SZ, REG_MULTI_SZ, REG_QWORD, REG_SZ};
    use winreg::types::FromRegValue;

    let key = root.open().open_subkey(subkey)?;
    let mut values = IndexMap::new();

    for entry in key.enum_values() {
        let (name, value) = entry?;
        let setting = match value.vtype {
            REG_DWORD => u32::from_reg_value(&value).map(|v| SettingValue::Int(v.into())),
            REG_QWORD => u64::from_reg_value(&value).map(|v| SettingValue::Int(v as i64)),
            REG_SZ | REG_EXPAND_SZ => String::from_reg_value(&value).map(SettingValue::String),
            REG_MULTI_SZ => Vec::<String>::from_reg_value(&value).map(SettingValue::StringList),
            _ => continue,
        };

        match setting {
            Ok(setting) => {
                values.insert(name, setting);
            }
            Err(e) => tracing::debug!("Skipping registry value {}: {}", name, e),
        }
    }

    Ok(values)
}
