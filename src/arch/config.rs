//! Configurations: which parameters and extensions a concrete (or partial) design pins down.

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use semver::{Op, Version, VersionReq};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::idl::error::{IdlError, IdlResult};
use crate::idl::value::Value;

/// How completely a configuration describes a design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigKind {
    /// Generic architecture; nothing is pinned.
    #[default]
    Unconfigured,
    /// Some extensions are mandatory or prohibited; the rest may go either way.
    #[serde(alias = "partial")]
    PartiallyConfigured,
    /// Every extension and parameter is pinned.
    #[serde(alias = "full")]
    FullyConfigured,
}

/// Tri-state answer to "is this extension present?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Presence {
    Yes,
    No,
    Unknown,
}

impl Presence {
    pub fn known(self) -> Option<bool> {
        match self {
            Presence::Yes => Some(true),
            Presence::No => Some(false),
            Presence::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtensionVersionRef {
    pub name: String,
    pub version: Version,
}

/// An extension with an optional version requirement, as listed in partial configurations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRequirement {
    pub name: String,
    pub requirement: Option<VersionReq>,
}

impl ExtensionRequirement {
    /// The single version allowed by an exact `=x.y.z` requirement.
    pub fn pinned_version(&self) -> Option<Version> {
        let req = self.requirement.as_ref()?;
        match req.comparators.as_slice() {
            [cmp] if cmp.op == Op::Exact => Some(Version {
                major: cmp.major,
                minor: cmp.minor?,
                patch: cmp.patch?,
                pre: cmp.pre.clone(),
                build: semver::BuildMetadata::EMPTY,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub name: String,
    pub kind: ConfigKind,
    pub params: IndexMap<String, Value>,
    pub implemented: Vec<ExtensionVersionRef>,
    pub mandatory: Vec<ExtensionRequirement>,
    pub prohibited: Vec<ExtensionRequirement>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    name: String,
    #[serde(default)]
    kind: ConfigKind,
    #[serde(default)]
    params: IndexMap<String, ParamValue>,
    #[serde(default)]
    implemented: Vec<ExtensionEntry>,
    #[serde(default)]
    mandatory: Vec<ExtensionEntry>,
    #[serde(default)]
    prohibited: Vec<ExtensionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ParamValue {
    Bool(bool),
    Integer(i64),
    String(String),
}

#[derive(Debug, Deserialize)]
struct ExtensionEntry {
    name: String,
    #[serde(default)]
    version: Option<String>,
}

impl Configuration {
    /// The generic architecture.
    pub fn unconfigured(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ConfigKind::Unconfigured,
            params: IndexMap::new(),
            implemented: Vec::new(),
            mandatory: Vec::new(),
            prohibited: Vec::new(),
        }
    }

    pub fn from_toml_str(text: &str) -> IdlResult<Self> {
        let file: ConfigFile = toml::from_str(text)?;
        Self::from_file(file)
    }

    pub fn from_path(path: &Path) -> IdlResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    fn from_file(file: ConfigFile) -> IdlResult<Self> {
        let mut params = IndexMap::with_capacity(file.params.len());
        for (name, value) in file.params {
            let value = match value {
                ParamValue::Bool(flag) => Value::Bool(flag),
                ParamValue::Integer(int) => Value::Bits(crate::idl::value::BitsValue::signed_unsized(
                    i128::from(int),
                )),
                ParamValue::String(text) => Value::String(Arc::from(text.as_str())),
            };
            params.insert(name, value);
        }

        let implemented = file
            .implemented
            .into_iter()
            .map(|entry| {
                let raw = entry.version.ok_or_else(|| {
                    IdlError::Config(format!(
                        "implemented extension '{}' needs an exact version",
                        entry.name
                    ))
                })?;
                Ok(ExtensionVersionRef {
                    version: parse_version(&raw)?,
                    name: entry.name,
                })
            })
            .collect::<IdlResult<Vec<_>>>()?;

        let mandatory = requirements(file.mandatory)?;
        let prohibited = requirements(file.prohibited)?;

        if file.kind != ConfigKind::FullyConfigured && !implemented.is_empty() {
            return Err(IdlError::Config(format!(
                "configuration '{}': only fully configured designs list implemented extensions",
                file.name
            )));
        }
        if file.kind == ConfigKind::Unconfigured && !(mandatory.is_empty() && prohibited.is_empty()) {
            return Err(IdlError::Config(format!(
                "configuration '{}': unconfigured designs cannot constrain extensions",
                file.name
            )));
        }

        Ok(Self {
            name: file.name,
            kind: file.kind,
            params,
            implemented,
            mandatory,
            prohibited,
        })
    }

    pub fn param_value(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    pub fn param_values(&self) -> &IndexMap<String, Value> {
        &self.params
    }

    fn integer_param(&self, name: &str) -> Option<u32> {
        self.param_value(name)
            .and_then(Value::as_bits)
            .and_then(|bits| bits.as_u32())
    }

    /// Effective XLENs the design can run with, ascending.
    ///
    /// An unpinned SXLEN or UXLEN may be 32 unless its mode is ruled out.
    pub fn possible_xlens(&self) -> Vec<u32> {
        let mut xlens: Vec<u32> = ["MXLEN", "SXLEN", "UXLEN"]
            .iter()
            .filter_map(|name| self.integer_param(name))
            .collect();
        if self.integer_param("MXLEN").is_none() {
            xlens.extend([32, 64]);
        }
        let unpinned_mode = [("SXLEN", "S"), ("UXLEN", "U")]
            .iter()
            .any(|(param, ext)| self.integer_param(param).is_none() && self.extension_presence(ext) != Presence::No);
        if unpinned_mode {
            xlens.push(32);
        }
        xlens.sort_unstable();
        xlens.dedup();
        xlens
    }

    /// XLEN when the design only ever runs at one width.
    pub fn fixed_xlen(&self) -> Option<u32> {
        match self.possible_xlens().as_slice() {
            [xlen] => Some(*xlen),
            _ => None,
        }
    }

    pub fn implemented_extension_versions(&self) -> &[ExtensionVersionRef] {
        &self.implemented
    }

    pub fn mandatory_extensions(&self) -> &[ExtensionRequirement] {
        &self.mandatory
    }

    pub fn prohibited_extension_versions(&self) -> &[ExtensionRequirement] {
        &self.prohibited
    }

    pub fn extension_presence(&self, name: &str) -> Presence {
        match self.kind {
            ConfigKind::Unconfigured => Presence::Unknown,
            ConfigKind::FullyConfigured => {
                if self.implemented.iter().any(|ext| ext.name == name) {
                    Presence::Yes
                } else {
                    Presence::No
                }
            }
            ConfigKind::PartiallyConfigured => {
                if self.mandatory.iter().any(|ext| ext.name == name) {
                    Presence::Yes
                } else if self
                    .prohibited
                    .iter()
                    .any(|ext| ext.name == name && ext.requirement.is_none())
                {
                    Presence::No
                } else {
                    Presence::Unknown
                }
            }
        }
    }

    /// Whether a version of `name` satisfying `req` is present.
    pub fn extension_version_presence(&self, name: &str, req: &VersionReq) -> Presence {
        match self.kind {
            ConfigKind::Unconfigured => Presence::Unknown,
            ConfigKind::FullyConfigured => {
                let hit = self
                    .implemented
                    .iter()
                    .any(|ext| ext.name == name && req.matches(&ext.version));
                if hit { Presence::Yes } else { Presence::No }
            }
            ConfigKind::PartiallyConfigured => {
                if self.extension_presence(name) == Presence::No {
                    return Presence::No;
                }
                let pinned = self
                    .mandatory
                    .iter()
                    .filter(|ext| ext.name == name)
                    .find_map(ExtensionRequirement::pinned_version);
                match pinned {
                    Some(version) if req.matches(&version) => return Presence::Yes,
                    Some(_) => return Presence::No,
                    None => {}
                }
                Presence::Unknown
            }
        }
    }

    /// Stable digest of everything that influences checking and pruning.
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        hasher.update([self.kind as u8]);
        for (name, value) in &self.params {
            hasher.update(name.as_bytes());
            hasher.update(value.to_string().as_bytes());
        }
        for ext in &self.implemented {
            hasher.update(format!("+{}@{}", ext.name, ext.version).as_bytes());
        }
        for (marker, list) in [("!", &self.mandatory), ("-", &self.prohibited)] {
            for ext in list {
                let req = ext
                    .requirement
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                hasher.update(format!("{marker}{}@{req}", ext.name).as_bytes());
            }
        }
        hasher.finalize().into()
    }
}

fn requirements(entries: Vec<ExtensionEntry>) -> IdlResult<Vec<ExtensionRequirement>> {
    entries
        .into_iter()
        .map(|entry| {
            let requirement = entry
                .version
                .as_deref()
                .map(parse_requirement)
                .transpose()?;
            Ok(ExtensionRequirement {
                name: entry.name,
                requirement,
            })
        })
        .collect()
}

/// Parses a RISC-V extension version; `2.1` is read as `2.1.0` and `2` as `2.0.0`.
pub fn parse_version(text: &str) -> IdlResult<Version> {
    let text = text.trim();
    let core_len = text.find(['-', '+']).unwrap_or(text.len());
    let (core, suffix) = text.split_at(core_len);
    let padded = match core.split('.').count() {
        1 => format!("{core}.0.0{suffix}"),
        2 => format!("{core}.0{suffix}"),
        _ => text.to_string(),
    };
    Version::parse(&padded)
        .map_err(|err| IdlError::Config(format!("invalid extension version '{text}': {err}")))
}

/// Parses a version requirement.
///
/// `~>` is the pessimistic operator: `~> 2.1` allows any 2.x from 2.1 on, `~> 2.1.0` only 2.1.x.
pub fn parse_requirement(text: &str) -> IdlResult<VersionReq> {
    let text = text.trim();
    let normalized = match text.strip_prefix("~>") {
        Some(rest) => pessimistic(rest.trim())?,
        None if text.chars().next().is_some_and(|ch| ch.is_ascii_digit()) => {
            format!("={}", parse_version(text)?)
        }
        None => text.to_string(),
    };
    VersionReq::parse(&normalized)
        .map_err(|err| IdlError::Config(format!("invalid version requirement '{text}': {err}")))
}

/// Bounds for `~> floor`: the last written component may grow, the one before it is held.
fn pessimistic(floor_text: &str) -> IdlResult<String> {
    let floor = parse_version(floor_text)?;
    let core = floor_text.split(['-', '+']).next().unwrap_or(floor_text);
    let ceiling = match core.split('.').count() {
        0..=2 => Version::new(floor.major + 1, 0, 0),
        _ => Version::new(floor.major, floor.minor + 1, 0),
    };
    Ok(format!(">={floor}, <{ceiling}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARTIAL: &str = r#"
        name = "rv64-partial"
        kind = "partially_configured"

        [params]
        MXLEN = 64
        MISALIGNED_LDST = true

        [[mandatory]]
        name = "I"
        version = "2.1"

        [[prohibited]]
        name = "Q"
    "#;

    #[test]
    fn loads_partial_configuration_from_toml() {
        let config = Configuration::from_toml_str(PARTIAL).expect("config");
        assert_eq!(config.kind, ConfigKind::PartiallyConfigured);
        assert_eq!(config.possible_xlens(), vec![32, 64], "S and U may still run at 32 bits");
        assert_eq!(config.param_value("MISALIGNED_LDST"), Some(&Value::Bool(true)));
        assert_eq!(config.extension_presence("I"), Presence::Yes);
        assert_eq!(config.extension_presence("Q"), Presence::No);
        assert_eq!(config.extension_presence("C"), Presence::Unknown);
    }

    #[test]
    fn lower_modes_pin_or_rule_out_their_xlen() {
        let rv64_only = |extra: &str| {
            Configuration::from_toml_str(&format!(
                "name = \"p\"\nkind = \"partial\"\n{extra}\n[[prohibited]]\nname = \"U\"\n"
            ))
            .expect("config")
        };
        let config = rv64_only("params = { MXLEN = 64, SXLEN = 64 }");
        assert_eq!(config.possible_xlens(), vec![64]);
        assert_eq!(config.fixed_xlen(), Some(64));

        let config = rv64_only("params = { MXLEN = 64 }");
        assert_eq!(config.possible_xlens(), vec![32, 64]);
        assert_eq!(config.fixed_xlen(), None);

        let config = rv64_only("params = { MXLEN = 64 }\n[[prohibited]]\nname = \"S\"");
        assert_eq!(config.fixed_xlen(), Some(64));
    }

    #[test]
    fn fully_configured_presence_uses_implemented_list() {
        let config = Configuration::from_toml_str(
            r#"
            name = "rv32"
            kind = "full"
            params = { MXLEN = 32 }
            implemented = [{ name = "I", version = "2.1" }, { name = "C", version = "2.0" }]
            "#,
        )
        .expect("config");
        assert_eq!(config.extension_presence("C"), Presence::Yes);
        assert_eq!(config.extension_presence("Q"), Presence::No);
        let req = parse_requirement(">= 2.1").expect("req");
        assert_eq!(config.extension_version_presence("I", &req), Presence::Yes);
        assert_eq!(config.extension_version_presence("C", &req), Presence::No);
        assert_eq!(config.fixed_xlen(), Some(32));
    }

    #[test]
    fn unconfigured_designs_know_nothing() {
        let config = Configuration::unconfigured("generic");
        assert_eq!(config.possible_xlens(), vec![32, 64]);
        assert_eq!(config.extension_presence("I"), Presence::Unknown);
        assert_eq!(config.fixed_xlen(), None);
    }

    #[test]
    fn normalizes_riscv_versions() {
        assert_eq!(parse_version("2.1").expect("version"), Version::new(2, 1, 0));
        assert_eq!(parse_version("2").expect("version"), Version::new(2, 0, 0));
        assert!(parse_requirement("~> 2.1").expect("req").matches(&Version::new(2, 5, 0)));
        assert!(!parse_requirement("~> 2.1").expect("req").matches(&Version::new(3, 0, 0)));
        let patch_level = parse_requirement("~> 2.1.0").expect("req");
        assert!(patch_level.matches(&Version::new(2, 1, 7)));
        assert!(!patch_level.matches(&Version::new(2, 2, 0)));
        assert!(!patch_level.matches(&Version::new(2, 9, 0)));
        assert!(parse_requirement("~> 0.1").expect("req").matches(&Version::new(0, 4, 0)));
        assert!(parse_requirement("2.1").expect("req").matches(&Version::new(2, 1, 0)));
    }

    #[test]
    fn rejects_implemented_list_outside_full_configs() {
        let err = Configuration::from_toml_str(
            r#"
            name = "bad"
            kind = "partial"
            implemented = [{ name = "I", version = "2.1" }]
            "#,
        )
        .expect_err("partial configs cannot list implemented extensions");
        assert!(matches!(err, IdlError::Config(_)));
    }

    #[test]
    fn fingerprint_tracks_parameters() {
        let base = Configuration::from_toml_str(PARTIAL).expect("config");
        let mut other = base.clone();
        other.params.insert("MXLEN".into(), Value::unsized_int(32));
        assert_ne!(base.fingerprint(), other.fingerprint());
        assert_eq!(base.fingerprint(), base.clone().fingerprint());
    }
}
