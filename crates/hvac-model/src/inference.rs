//! Schema inference: catalog records to topic model.
//!
//! Records are grouped by component path, split into telemetry and command
//! items, and classified. Which components refuse enable/disable and which
//! item name designates the on/off command are lookup-table policy, not
//! component subtypes, so both are plain configuration.

use std::collections::{BTreeMap, HashSet};

use tracing::warn;

use crate::catalog::{Direction, TopicRecord};
use crate::model::{CommandKind, Component, Item, ItemDirection, TopicModel};

/// Classification policy for the inference pass.
#[derive(Debug, Clone)]
pub struct InferencePolicy {
    /// Component paths that are permanently on and therefore accept
    /// configuration items only. Compared case-insensitively against the
    /// normalised component path.
    pub always_enabled: HashSet<String>,
    /// Item name that designates a component's on/off command.
    pub enable_item: String,
}

impl Default for InferencePolicy {
    fn default() -> Self {
        Self {
            always_enabled: ["BOMBA_AGUA_FRIA", "GENERAL", "VALVULA"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            enable_item: "COMANDO_ENCENDIDO_LSST".to_string(),
        }
    }
}

impl InferencePolicy {
    pub fn supports_enable_disable(&self, component_path: &str) -> bool {
        !self
            .always_enabled
            .iter()
            .any(|name| name.eq_ignore_ascii_case(component_path))
    }
}

/// A catalog that produced no usable components.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("catalog contains no usable components")]
    EmptyCatalog,
}

/// Build a model with the default policy.
pub fn build_model(records: &[TopicRecord]) -> Result<TopicModel, ModelError> {
    build_model_with(records, &InferencePolicy::default())
}

/// Build a model from validated records.
///
/// Non-fatal catalog inconsistencies (duplicate items, range/limit
/// conflicts, empty groups) are logged and survive in the model where
/// possible; only a catalog yielding zero components fails.
pub fn build_model_with(
    records: &[TopicRecord],
    policy: &InferencePolicy,
) -> Result<TopicModel, ModelError> {
    let mut groups: BTreeMap<&str, Vec<&TopicRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry(record.topic.component.as_str())
            .or_default()
            .push(record);
    }

    let mut components = BTreeMap::new();
    for (path, group) in groups {
        let supports_enable_disable = policy.supports_enable_disable(path);

        let mut telemetry: BTreeMap<String, Item> = BTreeMap::new();
        let mut commands: BTreeMap<String, Item> = BTreeMap::new();
        for record in &group {
            let (direction, command_kind) = match record.direction {
                Direction::Read => (ItemDirection::Telemetry, None),
                Direction::Write => {
                    let kind = if supports_enable_disable
                        && record.topic.item.eq_ignore_ascii_case(&policy.enable_item)
                    {
                        CommandKind::Enable
                    } else {
                        CommandKind::Configuration
                    };
                    (ItemDirection::Command, Some(kind))
                }
            };

            let schema_conflict = match (&record.range, &record.limits) {
                (Some(range), Some(limits)) if !limits.encloses(range) => {
                    warn!(
                        component = path,
                        item = %record.topic.item,
                        %range,
                        %limits,
                        "declared range falls outside declared limits"
                    );
                    true
                }
                _ => false,
            };

            let item = Item {
                name: record.topic.item.clone(),
                direction,
                command_kind,
                data_type: record.data_type.clone(),
                unit: record.unit.clone(),
                limits: record.limits,
                range: record.range,
                schema_conflict,
            };

            let slot = match direction {
                ItemDirection::Telemetry => &mut telemetry,
                ItemDirection::Command => &mut commands,
            };
            if slot.insert(item.name.clone(), item).is_some() {
                warn!(
                    component = path,
                    item = %record.topic.item,
                    "duplicate catalog row for item, keeping the last one"
                );
            }
        }

        if telemetry.is_empty() && commands.is_empty() {
            warn!(component = path, "dropping component with no usable items");
            continue;
        }

        // Floor and subsystem are per-component in practice; trust the first
        // row of the group.
        let first = group[0];
        components.insert(
            path.to_string(),
            Component {
                path: path.to_string(),
                floor: first.floor.clone(),
                subsystem: first.subsystem.clone(),
                supports_enable_disable,
                telemetry,
                commands,
            },
        );
    }

    if components.is_empty() {
        return Err(ModelError::EmptyCatalog);
    }
    Ok(TopicModel::new(components))
}
