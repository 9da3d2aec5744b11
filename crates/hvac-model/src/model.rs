//! The in-memory plant model.
//!
//! A [`TopicModel`] is built once from the catalog and read-only afterwards.
//! Components own their items; there are no cross-component references. The
//! process-wide instance lives behind a [`ModelHandle`] so a catalog reload
//! can swap in a freshly built model without disturbing in-flight readers.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::topic::TopicPath;
use crate::units::Limits;
use crate::value::DataType;

/// Whether an item reports values or accepts them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemDirection {
    Telemetry,
    Command,
}

/// Classification of a writable item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    /// The on/off control of the component.
    Enable,
    /// Any other writable item: set-points, modes.
    Configuration,
}

/// A single measurable or settable attribute of a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub direction: ItemDirection,
    /// Present only for command items.
    pub command_kind: Option<CommandKind>,
    pub data_type: DataType,
    pub unit: String,
    pub limits: Option<Limits>,
    pub range: Option<Limits>,
    /// The declared range falls outside the declared limits. The item is
    /// kept; enforcement happens at validation time.
    pub schema_conflict: bool,
}

impl Item {
    pub fn is_telemetry(&self) -> bool {
        self.direction == ItemDirection::Telemetry
    }

    pub fn is_command(&self) -> bool {
        self.direction == ItemDirection::Command
    }
}

/// A logical plant unit (fan coil, chiller, pump, valve), identified by its
/// component path.
///
/// Telemetry and command items are kept apart: a read-back and a set-point
/// may share a name and are still two distinct items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Path between the floor segment and the item, e.g. `FANCOIL01` or
    /// `MANEJADORA/LOWER_01`.
    pub path: String,
    pub floor: String,
    pub subsystem: String,
    /// False only for the reserved always-on components, which accept
    /// configuration items but no on/off command.
    pub supports_enable_disable: bool,
    pub telemetry: BTreeMap<String, Item>,
    pub commands: BTreeMap<String, Item>,
}

impl Component {
    /// The designated on/off command item, if this component has one.
    pub fn enable_item(&self) -> Option<&Item> {
        self.commands
            .values()
            .find(|item| item.command_kind == Some(CommandKind::Enable))
    }

    pub fn item(&self, name: &str, direction: ItemDirection) -> Option<&Item> {
        match direction {
            ItemDirection::Telemetry => self.telemetry.get(name),
            ItemDirection::Command => self.commands.get(name),
        }
    }

    /// All items of the component, telemetry first.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.telemetry.values().chain(self.commands.values())
    }

    pub fn item_count(&self) -> usize {
        self.telemetry.len() + self.commands.len()
    }

    /// The wire topic of one of this component's items.
    pub fn topic_for(&self, item: &Item) -> TopicPath {
        TopicPath {
            floor: self.floor.clone(),
            component: self.path.clone(),
            item: item.name.clone(),
        }
    }
}

/// A resolved (component, item) pair.
#[derive(Debug, Clone, Copy)]
pub struct ItemRef<'a> {
    pub component: &'a Component,
    pub item: &'a Item,
}

/// The immutable plant model: component path to component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopicModel {
    components: BTreeMap<String, Component>,
}

impl TopicModel {
    pub(crate) fn new(components: BTreeMap<String, Component>) -> Self {
        Self { components }
    }

    pub fn component(&self, path: &str) -> Option<&Component> {
        self.components.get(path)
    }

    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Resolve a raw wire topic to its component and item.
    ///
    /// Telemetry items shadow same-named command items here because inbound
    /// traffic is telemetry; command items are looked up explicitly through
    /// [`Component::item`].
    pub fn resolve(&self, raw_topic: &str) -> Option<ItemRef<'_>> {
        let path = TopicPath::parse(raw_topic).ok()?;
        let component = self.components.get(&path.component)?;
        let item = component
            .telemetry
            .get(&path.item)
            .or_else(|| component.commands.get(&path.item))?;
        Some(ItemRef { component, item })
    }
}

/// Shared handle to the current model.
///
/// Readers take a cheap `Arc` clone and keep working against it; a catalog
/// reload builds a full replacement off to the side and swaps it in with
/// [`ModelHandle::replace`].
#[derive(Debug)]
pub struct ModelHandle {
    current: RwLock<Arc<TopicModel>>,
}

impl ModelHandle {
    pub fn new(model: TopicModel) -> Self {
        Self {
            current: RwLock::new(Arc::new(model)),
        }
    }

    /// The model as of this call. In-flight work completes against whichever
    /// model it captured.
    pub fn current(&self) -> Arc<TopicModel> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Swap in a wholesale replacement, returning the previous model.
    pub fn replace(&self, model: TopicModel) -> Arc<TopicModel> {
        let mut slot = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *slot, Arc::new(model))
    }
}

impl From<TopicModel> for ModelHandle {
    fn from(model: TopicModel) -> Self {
        Self::new(model)
    }
}
