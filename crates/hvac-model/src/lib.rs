//! Plant model for the HVAC MQTT bridge.
//!
//! This crate turns the tabular plant description exported by the building
//! automation system into an immutable in-memory model of components and
//! items, which the telemetry and command layers consume.
//!
//! ## Architecture
//!
//! - **catalog**: semicolon-delimited CSV rows to validated [`TopicRecord`]s,
//!   collecting malformed rows instead of failing the load
//! - **inference**: records to a [`TopicModel`], classifying items as
//!   telemetry or command and designating each component's on/off item
//! - **model**: the read-only [`TopicModel`] plus the swappable
//!   [`ModelHandle`] for wholesale reloads
//! - **topic**, **units**, **value**: the naming, unit and value grammars
//!   shared by the above

pub mod catalog;
pub mod inference;
pub mod model;
pub mod topic;
pub mod units;
pub mod value;

pub use catalog::{
    CatalogError, CatalogLoad, Direction, MalformedReason, MalformedRecord, TopicRecord,
};
pub use inference::{build_model, build_model_with, InferencePolicy, ModelError};
pub use model::{
    CommandKind, Component, Item, ItemDirection, ItemRef, ModelHandle, TopicModel,
};
pub use topic::{normalize_floor, TopicParseError, TopicPath, TOPIC_ROOT};
pub use units::{bar_to_pa, normalize_unit, parse_limits, psi_to_pa, Limits, LimitsParseError};
pub use value::{CoerceError, DataType, PlantValue};
