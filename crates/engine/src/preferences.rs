//! User preferences, validated once at the request boundary
//!
//! Callers send a free-form `name -> optional value` map. Known names become
//! [`PreferenceKey`]s; anything else is kept in an extension map and ignored
//! by the recommenders. A key with no value means "pin to the current
//! resource's value".

use crate::error::{EngineError, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::debug;

macro_rules! preference_keys {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Every preference the engine understands
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub enum PreferenceKey {
            $($variant),+
        }

        impl PreferenceKey {
            pub const ALL: &'static [PreferenceKey] = &[$(PreferenceKey::$variant),+];

            /// Human-facing name as sent by clients
            pub fn name(&self) -> &'static str {
                match self {
                    $(PreferenceKey::$variant => $name),+
                }
            }
        }
    };
}

preference_keys! {
    Region => "Region",
    Tenancy => "Tenancy",
    OperatingSystem => "OperatingSystem",
    LicenseModel => "LicenseModel",
    ProcessorArchitecture => "ProcessorArchitecture",
    CurrentGeneration => "CurrentGeneration",
    EnaSupported => "ENASupported",
    PhysicalProcessor => "PhysicalProcessor",
    ClockSpeed => "ClockSpeed",
    InstanceFamily => "InstanceFamily",
    Vcpu => "vCPU",
    MemoryGb => "MemoryGB",
    NetworkThroughput => "NetworkThroughput",
    PreInstalledSw => "PreInstalledSW",
    ExcludeBurstableInstances => "ExcludeBurstableInstances",
    CpuBreathingRoom => "CPUBreathingRoom",
    MemoryBreathingRoom => "MemoryBreathingRoom",
    NetworkBreathingRoom => "NetworkBreathingRoom",
    Iops => "IOPS",
    Throughput => "Throughput",
    VolumeFamily => "VolumeFamily",
    VolumeType => "VolumeType",
    VolumeSize => "VolumeSize",
    IopsBreathingRoom => "IOPSBreathingRoom",
    ThroughputBreathingRoom => "ThroughputBreathingRoom",
    SizeBreathingRoom => "SizeBreathingRoom",
    Engine => "Engine",
    ClusterType => "ClusterType",
    StorageType => "StorageType",
    StorageSize => "StorageSize",
    MachineFamily => "MachineFamily",
    MachineType => "MachineType",
    DiskType => "DiskType",
    DiskSize => "DiskSize",
    CpuRequestBreathingRoom => "CpuRequestBreathingRoom",
    CpuLimitBreathingRoom => "CpuLimitBreathingRoom",
    MemoryRequestBreathingRoom => "MemoryRequestBreathingRoom",
    MemoryLimitBreathingRoom => "MemoryLimitBreathingRoom",
    MinCpuRequest => "MinCpuRequest",
    MinCpuLimit => "MinCpuLimit",
    MinMemoryRequest => "MinMemoryRequest",
    MinMemoryLimit => "MinMemoryLimit",
}

impl PreferenceKey {
    /// Case-insensitive lookup by human-facing name
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|key| key.name().eq_ignore_ascii_case(name))
    }

    pub fn is_breathing_room(&self) -> bool {
        self.name().ends_with("BreathingRoom")
    }
}

impl fmt::Display for PreferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A literal value, or "use whatever the current resource has"
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceValue {
    Pinned(String),
    Derive,
}

/// Validated preferences for one recommendation call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preferences {
    values: BTreeMap<PreferenceKey, PreferenceValue>,
    breathing_room: BTreeMap<PreferenceKey, f64>,
    extensions: BTreeMap<String, Option<String>>,
}

impl Preferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a raw preference map.
    ///
    /// Blank values count as absent. Breathing-room values must be
    /// non-negative percentages (`"20"` or `"20%"`).
    pub fn parse(raw: &HashMap<String, Option<String>>) -> Result<Self> {
        let mut prefs = Self::new();
        for (name, value) in raw {
            let value = value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string);

            match PreferenceKey::from_name(name) {
                Some(key) => prefs.insert(key, value)?,
                None => {
                    debug!(preference = %name, "Unknown preference kept as extension");
                    prefs.extensions.insert(name.clone(), value);
                }
            }
        }
        Ok(prefs)
    }

    fn insert(&mut self, key: PreferenceKey, value: Option<String>) -> Result<()> {
        if key.is_breathing_room() {
            if let Some(raw) = &value {
                let fraction = parse_percentage(raw)
                    .map_err(|reason| EngineError::invalid_preference(key.name(), reason))?;
                self.breathing_room.insert(key, fraction);
            }
        }
        let value = match value {
            Some(v) => PreferenceValue::Pinned(v),
            None => PreferenceValue::Derive,
        };
        self.values.insert(key, value);
        Ok(())
    }

    /// Pin a key to a literal value
    pub fn pin(mut self, key: PreferenceKey, value: impl Into<String>) -> Result<Self> {
        self.insert(key, Some(value.into()))?;
        Ok(self)
    }

    /// Pin a key to the current resource's value
    pub fn derive(mut self, key: PreferenceKey) -> Self {
        self.values.insert(key, PreferenceValue::Derive);
        self
    }

    pub fn get(&self, key: PreferenceKey) -> Option<&PreferenceValue> {
        self.values.get(&key)
    }

    /// True when the user pinned the key, literally or to the current value
    pub fn is_set(&self, key: PreferenceKey) -> bool {
        self.values.contains_key(&key)
    }

    /// Literal value, if any
    pub fn literal(&self, key: PreferenceKey) -> Option<&str> {
        match self.values.get(&key) {
            Some(PreferenceValue::Pinned(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Resolve a key against the current resource: literal wins, derive falls
    /// back to `current`, unset yields `None`
    pub fn resolve(&self, key: PreferenceKey, current: Option<String>) -> Option<String> {
        match self.values.get(&key)? {
            PreferenceValue::Pinned(v) => Some(v.clone()),
            PreferenceValue::Derive => current.filter(|c| !c.trim().is_empty()),
        }
    }

    /// Breathing room as a fraction (20% → 0.2), zero when not supplied
    pub fn breathing_room(&self, key: PreferenceKey) -> f64 {
        self.breathing_room.get(&key).copied().unwrap_or(0.0)
    }

    pub fn extensions(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.extensions
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// `Name=value` pairs handed to the explanation service
    pub fn honored(&self) -> Vec<String> {
        self.values
            .iter()
            .map(|(key, value)| match value {
                PreferenceValue::Pinned(v) => format!("{}={}", key, v),
                PreferenceValue::Derive => format!("{}=current", key),
            })
            .collect()
    }
}

fn parse_percentage(raw: &str) -> std::result::Result<f64, String> {
    let number = raw.trim().trim_end_matches('%').trim();
    let value: f64 = number
        .parse()
        .map_err(|_| format!("not a number: {:?}", raw))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("must be a non-negative percentage, got {:?}", raw));
    }
    Ok(value / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, Option<&str>)]) -> HashMap<String, Option<String>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
            .collect()
    }

    #[test]
    fn test_names_are_unique_and_resolvable() {
        for key in PreferenceKey::ALL {
            assert_eq!(PreferenceKey::from_name(key.name()), Some(*key));
            assert_eq!(
                PreferenceKey::from_name(&key.name().to_ascii_lowercase()),
                Some(*key)
            );
        }
    }

    #[test]
    fn test_parse_literal_derive_and_unknown() {
        let prefs = Preferences::parse(&raw(&[
            ("Region", Some("eu-west-1")),
            ("Tenancy", None),
            ("vcpu", Some("  ")),
            ("FavouriteColour", Some("blue")),
        ]))
        .unwrap();

        assert_eq!(prefs.literal(PreferenceKey::Region), Some("eu-west-1"));
        assert_eq!(prefs.get(PreferenceKey::Tenancy), Some(&PreferenceValue::Derive));
        assert_eq!(prefs.get(PreferenceKey::Vcpu), Some(&PreferenceValue::Derive));
        assert!(!prefs.is_set(PreferenceKey::MemoryGb));
        assert_eq!(
            prefs.extensions().collect::<Vec<_>>(),
            vec![("FavouriteColour", Some("blue"))]
        );
    }

    #[test]
    fn test_resolve() {
        let prefs = Preferences::new()
            .pin(PreferenceKey::Region, "us-east-1")
            .unwrap()
            .derive(PreferenceKey::Tenancy);

        assert_eq!(
            prefs.resolve(PreferenceKey::Region, Some("eu-west-1".into())).as_deref(),
            Some("us-east-1")
        );
        assert_eq!(
            prefs.resolve(PreferenceKey::Tenancy, Some("Shared".into())).as_deref(),
            Some("Shared")
        );
        assert_eq!(prefs.resolve(PreferenceKey::Tenancy, Some(" ".into())), None);
        assert_eq!(prefs.resolve(PreferenceKey::LicenseModel, Some("x".into())), None);
    }

    #[test]
    fn test_breathing_room_percentages() {
        let prefs = Preferences::parse(&raw(&[
            ("CPUBreathingRoom", Some("20")),
            ("MemoryBreathingRoom", Some("12.5%")),
            ("NetworkBreathingRoom", None),
        ]))
        .unwrap();

        assert!((prefs.breathing_room(PreferenceKey::CpuBreathingRoom) - 0.2).abs() < 1e-12);
        assert!((prefs.breathing_room(PreferenceKey::MemoryBreathingRoom) - 0.125).abs() < 1e-12);
        assert_eq!(prefs.breathing_room(PreferenceKey::NetworkBreathingRoom), 0.0);
        assert_eq!(prefs.breathing_room(PreferenceKey::IopsBreathingRoom), 0.0);
    }

    #[test]
    fn test_invalid_breathing_room_names_key() {
        let err = Preferences::parse(&raw(&[("CPUBreathingRoom", Some("plenty"))])).unwrap_err();
        match err {
            EngineError::InvalidPreference { key, .. } => assert_eq!(key, "CPUBreathingRoom"),
            other => panic!("unexpected error: {:?}", other),
        }

        let err = Preferences::parse(&raw(&[("MemoryBreathingRoom", Some("-5"))])).unwrap_err();
        assert!(err.to_string().contains("MemoryBreathingRoom"));
    }

    #[test]
    fn test_honored_lists_every_set_key() {
        let prefs = Preferences::new()
            .pin(PreferenceKey::VolumeType, "gp3")
            .unwrap()
            .derive(PreferenceKey::Region);
        assert_eq!(prefs.honored(), vec!["Region=current", "VolumeType=gp3"]);
    }
}
