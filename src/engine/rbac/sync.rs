//! Permission Synchronizer
//!
//! Projects a module's access mask onto the permission store: for every
//! resource type of the module and every action, the codenames implied by
//! that action are granted when the action's bit is set and revoked when it
//! is clear.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error};

use super::action::Action;
use super::error::SyncError;
use super::mask::AccessMask;
use super::registry::{Module, ResourceType};
use super::store::PermissionStore;
use super::RoleId;

/// Placeholder substituted with the resource type's model name
pub const MODEL_PLACEHOLDER: &str = "%s";

/// Action to codename templates, e.g. `read -> ["view_%s", "list_%s"]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodenameMap(BTreeMap<Action, Vec<String>>);

impl Default for CodenameMap {
    fn default() -> Self {
        Self::from_templates([
            (Action::Read, vec!["view_%s"]),
            (Action::Create, vec!["add_%s"]),
            (Action::Update, vec!["change_%s"]),
            (Action::Delete, vec!["delete_%s"]),
        ])
    }
}

impl CodenameMap {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn from_templates<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Action, Vec<&'a str>)>,
    {
        Self(
            entries
                .into_iter()
                .map(|(action, templates)| {
                    (action, templates.into_iter().map(str::to_string).collect())
                })
                .collect(),
        )
    }

    /// Templates configured for an action; unmapped actions imply nothing
    pub fn templates(&self, action: Action) -> &[String] {
        self.0.get(&action).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Concrete codenames an action implies for a model
    pub fn codenames_for(&self, action: Action, model: &str) -> Vec<String> {
        self.templates(action)
            .iter()
            .map(|t| t.replace(MODEL_PLACEHOLDER, model))
            .collect()
    }

    /// Every codename any action implies for a model
    pub fn all_codenames_for(&self, model: &str) -> Vec<String> {
        let mut codenames: Vec<String> = Action::ALL
            .into_iter()
            .flat_map(|a| self.codenames_for(a, model))
            .collect();
        codenames.sort();
        codenames.dedup();
        codenames
    }

    /// Each template must mention the model exactly once
    pub fn validate(&self) -> Result<(), String> {
        for (action, templates) in &self.0 {
            for template in templates {
                if template.matches(MODEL_PLACEHOLDER).count() != 1 {
                    return Err(format!(
                        "codename template {template:?} for action {action} must contain {MODEL_PLACEHOLDER} exactly once"
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Changes made by one synchronization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub granted: usize,
    pub revoked: usize,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.granted == 0 && self.revoked == 0
    }
}

impl std::ops::AddAssign for SyncReport {
    fn add_assign(&mut self, other: Self) {
        self.granted += other.granted;
        self.revoked += other.revoked;
    }
}

pub struct PermissionSynchronizer<'a> {
    codenames: &'a CodenameMap,
}

impl<'a> PermissionSynchronizer<'a> {
    pub fn new(codenames: &'a CodenameMap) -> Self {
        Self { codenames }
    }

    /// Make the role's permissions on every resource type of `module` match
    /// `mask`. Idempotent.
    pub fn sync<S>(
        &self,
        store: &S,
        role: RoleId,
        module: &Module,
        mask: AccessMask,
    ) -> Result<SyncReport, SyncError>
    where
        S: PermissionStore + ?Sized,
    {
        let report = self.sync_resource_types(store, role, &module.resource_types, mask)?;
        debug!(
            role,
            module = %module.name,
            mask = mask.bits(),
            granted = report.granted,
            revoked = report.revoked,
            "synchronized module permissions"
        );
        Ok(report)
    }

    /// Same as [`sync`](Self::sync) for an explicit set of resource types
    pub fn sync_resource_types<S>(
        &self,
        store: &S,
        role: RoleId,
        resource_types: &[ResourceType],
        mask: AccessMask,
    ) -> Result<SyncReport, SyncError>
    where
        S: PermissionStore + ?Sized,
    {
        let mut report = SyncReport::default();

        for resource_type in resource_types {
            let model = &resource_type.model;
            // A codename implied by any allowed action stays granted, even when
            // a disallowed action's template renders the same name.
            let wanted: BTreeSet<String> = mask
                .iter()
                .flat_map(|action| self.codenames.codenames_for(action, model))
                .collect();
            let mut seen = BTreeSet::new();

            for action in Action::ALL {
                for codename in self.codenames.codenames_for(action, model) {
                    if !seen.insert(codename.clone()) {
                        continue;
                    }
                    let Some(permission) = store.find_permission(resource_type, &codename)? else {
                        error!(
                            resource_type = %resource_type,
                            codename = %codename,
                            "permission store is missing a configured codename"
                        );
                        return Err(SyncError::MissingExternalPermission {
                            resource_type: resource_type.to_string(),
                            codename,
                        });
                    };

                    if wanted.contains(&codename) {
                        if store.grant(role, permission)? {
                            debug!(role, codename = %codename, "granted");
                            report.granted += 1;
                        }
                    } else if store.revoke(role, permission)? {
                        debug!(role, codename = %codename, "revoked");
                        report.revoked += 1;
                    }
                }
            }
        }

        Ok(report)
    }
}
