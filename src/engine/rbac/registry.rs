//! Module Registry
//!
//! Immutable snapshot of which resource types each module governs. Built from
//! fixture data or loaded from the database, then handed to the codec and the
//! role service.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use super::error::RegistryError;
use super::ModuleId;

/// A concrete entity type that the permission store grants against,
/// written `app_label.model`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceType {
    pub app_label: String,
    pub model: String,
}

impl ResourceType {
    pub fn new(app_label: &str, model: &str) -> Self {
        Self {
            app_label: app_label.to_string(),
            model: model.to_string(),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.app_label, self.model)
    }
}

impl FromStr for ResourceType {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((app, model))
                if !app.is_empty() && !model.is_empty() && !model.contains('.') =>
            {
                Ok(Self::new(app, model))
            }
            _ => Err(RegistryError::InvalidResourceType(s.to_string())),
        }
    }
}

/// A module and the resource types it owns
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Module {
    pub id: ModuleId,
    pub name: String,
    pub resource_types: Vec<ResourceType>,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Module>,
}

impl ModuleRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Load every module with its resource types
    pub fn load(conn: &Connection) -> Result<Self, RegistryError> {
        let mut stmt = conn.prepare(
            "SELECT m.id, m.name, r.app_label, r.model
             FROM modules m
             LEFT JOIN module_resource_types mr ON mr.module_id = m.id
             LEFT JOIN resource_types r ON r.id = mr.resource_type_id
             ORDER BY m.name, r.app_label, r.model",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, ModuleId>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut modules: BTreeMap<String, Module> = BTreeMap::new();
        for (id, name, app_label, model) in rows {
            let module = modules.entry(name.clone()).or_insert_with(|| Module {
                id,
                name,
                resource_types: Vec::new(),
            });
            if let (Some(app_label), Some(model)) = (app_label, model) {
                module.resource_types.push(ResourceType { app_label, model });
            }
        }

        Ok(Self { modules })
    }

    /// Load one module as currently stored, `None` if there is no such module
    pub fn load_module(conn: &Connection, name: &str) -> Result<Option<Module>, RegistryError> {
        let id: Option<ModuleId> = conn
            .query_row("SELECT id FROM modules WHERE name = ?1", params![name], |row| row.get(0))
            .optional()?;
        let Some(id) = id else {
            return Ok(None);
        };
        Ok(Some(Module {
            id,
            name: name.to_string(),
            resource_types: module_resource_types(conn, id)?,
        }))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    /// Resource types governed by a module, `None` if the module is unknown
    pub fn resource_types_of(&self, name: &str) -> Option<&[ResourceType]> {
        self.modules.get(name).map(|m| m.resource_types.as_slice())
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    /// Module owning a resource type
    pub fn owner_of(&self, resource_type: &ResourceType) -> Option<&Module> {
        self.modules
            .values()
            .find(|m| m.resource_types.contains(resource_type))
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Assembles a registry from fixture data
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    modules: Vec<(String, Vec<ResourceType>)>,
}

impl RegistryBuilder {
    pub fn module<I>(mut self, name: &str, resource_types: I) -> Self
    where
        I: IntoIterator<Item = ResourceType>,
    {
        self.modules
            .push((name.to_string(), resource_types.into_iter().collect()));
        self
    }

    /// Rejects duplicate module names and resource types owned twice
    pub fn build(self) -> Result<ModuleRegistry, RegistryError> {
        let mut modules = BTreeMap::new();
        let mut owners: HashMap<ResourceType, String> = HashMap::new();

        for (index, (name, resource_types)) in self.modules.into_iter().enumerate() {
            if modules.contains_key(&name) {
                return Err(RegistryError::ModuleExists(name));
            }
            for rt in &resource_types {
                if let Some(owner) = owners.insert(rt.clone(), name.clone()) {
                    return Err(RegistryError::ResourceTypeTaken {
                        resource_type: rt.to_string(),
                        module: owner,
                    });
                }
            }
            let module = Module {
                id: index as ModuleId + 1,
                name: name.clone(),
                resource_types,
            };
            modules.insert(name, module);
        }

        Ok(ModuleRegistry { modules })
    }
}

pub(crate) fn module_resource_types(
    conn: &Connection,
    module: ModuleId,
) -> Result<Vec<ResourceType>, RegistryError> {
    let mut stmt = conn.prepare(
        "SELECT r.app_label, r.model
         FROM module_resource_types mr
         JOIN resource_types r ON r.id = mr.resource_type_id
         WHERE mr.module_id = ?1
         ORDER BY r.app_label, r.model",
    )?;
    let resource_types = stmt
        .query_map(params![module], |row| {
            Ok(ResourceType {
                app_label: row.get(0)?,
                model: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(resource_types)
}
