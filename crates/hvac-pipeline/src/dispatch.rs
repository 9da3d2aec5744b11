//! Command validation.
//!
//! The intake layer hands a candidate value for an item; validation checks
//! writability, type and limits, and returns the coerced value ready for
//! transmission. Publishing is the transport layer's job; validation has no
//! side effects.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use hvac_model::{CommandKind, Component, Item, ItemDirection, ModelHandle, PlantValue};

/// Why a candidate command value was refused.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum ValidationError {
    #[error("{item} is not a writable item")]
    NotWritable { item: String },

    #[error("{item} expects {expected}: {detail}")]
    TypeMismatch {
        item: String,
        expected: String,
        detail: String,
    },

    #[error("{value} is outside the limits [{lower}, {upper}] of {item}")]
    OutOfLimits {
        item: String,
        value: f64,
        lower: f64,
        upper: f64,
    },

    #[error("{component} does not accept enable/disable commands")]
    UnknownEnableTarget { component: String },
}

/// Validate a candidate value against a command item.
///
/// On success the returned value is coerced to the item's declared type and
/// inside its limits, ready to be published.
pub fn validate_value(
    component: &Component,
    item: &Item,
    candidate: &serde_json::Value,
) -> Result<PlantValue, ValidationError> {
    if item.direction != ItemDirection::Command {
        return Err(ValidationError::NotWritable {
            item: item.name.clone(),
        });
    }

    // An enable item on an always-on component would mean the model was
    // built wrong; refuse it rather than switching something unswitchable.
    if item.command_kind == Some(CommandKind::Enable) && !component.supports_enable_disable {
        return Err(ValidationError::UnknownEnableTarget {
            component: component.path.clone(),
        });
    }

    let value = item.data_type.coerce_json(candidate).map_err(|err| {
        ValidationError::TypeMismatch {
            item: item.name.clone(),
            expected: item.data_type.type_name().to_string(),
            detail: err.to_string(),
        }
    })?;

    if let (Some(limits), Some(numeric)) = (&item.limits, value.as_f64()) {
        if !limits.contains(numeric) {
            return Err(ValidationError::OutOfLimits {
                item: item.name.clone(),
                value: numeric,
                lower: limits.lower,
                upper: limits.upper,
            });
        }
    }

    Ok(value)
}

/// Model-backed command validator.
pub struct CommandValidator {
    model: Arc<ModelHandle>,
}

impl CommandValidator {
    pub fn new(model: Arc<ModelHandle>) -> Self {
        Self { model }
    }

    /// Validate a candidate value for the named item.
    ///
    /// An item the model does not know as a command, including a
    /// telemetry-only item of that name, is not writable.
    pub fn validate(
        &self,
        component_path: &str,
        item_name: &str,
        candidate: &serde_json::Value,
    ) -> Result<PlantValue, ValidationError> {
        let model = self.model.current();
        let component =
            model
                .component(component_path)
                .ok_or_else(|| ValidationError::NotWritable {
                    item: format!("{component_path}/{item_name}"),
                })?;
        let item = component
            .item(item_name, ItemDirection::Command)
            .ok_or_else(|| ValidationError::NotWritable {
                item: format!("{component_path}/{item_name}"),
            })?;
        validate_value(component, item, candidate)
    }
}
