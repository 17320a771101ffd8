//! catalog::ledger
//!
//! The change ledger: scheduled, not yet applied changes.
//!
//! Removals, updates and feature changes of installed modules live in the
//! module's own record ([`ModulePending`]); installs live in
//! [`Catalog::installs`]. The ledger is persisted with the catalog, so a
//! scheduled change survives restarts until an apply pass commits it or
//! the request is cancelled.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{Catalog, CatalogError};
use crate::core::types::{FeatureName, ModuleName, Revision};

/// Pending changes of one installed module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModulePending {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub removal: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<PendingUpdate>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub feature_changes: Vec<FeatureChange>,
}

impl ModulePending {
    pub fn is_empty(&self) -> bool {
        !self.removal && self.update.is_none() && self.feature_changes.is_empty()
    }

    pub fn feature_change(&self, feature: &FeatureName) -> Option<&FeatureChange> {
        self.feature_changes.iter().find(|c| c.feature == *feature)
    }
}

/// A scheduled update to a newer revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PendingUpdate {
    pub revision: Option<Revision>,
    pub schema_text: String,
}

/// A scheduled feature toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureChange {
    pub feature: FeatureName,
    pub enable: bool,
}

/// A module scheduled for installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PendingInstall {
    pub name: ModuleName,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<Revision>,

    pub schema_text: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<FeatureName>,

    /// Seed data stored into both datastores on commit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// A read-only view of one ledger entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScheduledChange<'a> {
    Install(&'a PendingInstall),
    Update(&'a PendingUpdate),
    Remove,
    FeatureChange(&'a FeatureChange),
}

impl ScheduledChange<'_> {
    /// Short description for listings.
    pub fn describe(&self) -> String {
        match self {
            ScheduledChange::Install(i) => match &i.revision {
                Some(rev) => format!("install @{}", rev),
                None => "install".to_string(),
            },
            ScheduledChange::Update(u) => match &u.revision {
                Some(rev) => format!("update to @{}", rev),
                None => "update".to_string(),
            },
            ScheduledChange::Remove => "remove".to_string(),
            ScheduledChange::FeatureChange(c) => {
                format!("{} feature {}", if c.enable { "enable" } else { "disable" }, c.feature)
            }
        }
    }
}

impl Catalog {
    pub fn find_install(&self, name: &str) -> Option<&PendingInstall> {
        self.installs.iter().find(|i| i.name.as_str() == name)
    }

    pub fn find_install_mut(&mut self, name: &str) -> Option<&mut PendingInstall> {
        self.installs.iter_mut().find(|i| i.name.as_str() == name)
    }

    /// Schedule an install.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the module is installed or already scheduled.
    pub fn add_install(&mut self, install: PendingInstall) -> Result<(), CatalogError> {
        let name = install.name.as_str();
        if self.find_module(name).is_some() || self.find_install(name).is_some() {
            return Err(CatalogError::AlreadyExists(install.name));
        }
        self.installs.push(install);
        Ok(())
    }

    pub fn remove_install(&mut self, name: &str) -> Option<PendingInstall> {
        let idx = self.installs.iter().position(|i| i.name.as_str() == name)?;
        Some(self.installs.remove(idx))
    }

    /// Whether anything is scheduled.
    pub fn has_scheduled_changes(&self) -> bool {
        !self.installs.is_empty() || self.modules.iter().any(|m| !m.pending.is_empty())
    }

    /// Every ledger entry, installs first, then per module in catalog order.
    pub fn scheduled_changes(&self) -> Vec<(&ModuleName, ScheduledChange<'_>)> {
        let mut out: Vec<(&ModuleName, ScheduledChange<'_>)> = self
            .installs
            .iter()
            .map(|i| (&i.name, ScheduledChange::Install(i)))
            .collect();
        for m in &self.modules {
            if m.pending.removal {
                out.push((&m.name, ScheduledChange::Remove));
            }
            if let Some(u) = &m.pending.update {
                out.push((&m.name, ScheduledChange::Update(u)));
            }
            for c in &m.pending.feature_changes {
                out.push((&m.name, ScheduledChange::FeatureChange(c)));
            }
        }
        out
    }

    pub(super) fn validate_ledger(&self, installed: &BTreeSet<&ModuleName>) -> Result<(), CatalogError> {
        let mut scheduled = BTreeSet::new();
        for i in &self.installs {
            if installed.contains(&i.name) || !scheduled.insert(&i.name) {
                return Err(CatalogError::Inconsistent(format!(
                    "install of '{}' conflicts with another entry",
                    i.name
                )));
            }
        }
        for m in &self.modules {
            let mut features = BTreeSet::new();
            for c in &m.pending.feature_changes {
                if !features.insert(&c.feature) {
                    return Err(CatalogError::Inconsistent(format!(
                        "module '{}' has two pending changes of feature '{}'",
                        m.name, c.feature
                    )));
                }
            }
            if m.pending.removal && m.pending.update.is_some() {
                return Err(CatalogError::Inconsistent(format!(
                    "module '{}' is scheduled for both removal and update",
                    m.name
                )));
            }
        }
        Ok(())
    }
}
