//! Thermostat document -> flat record mapping.
//!
//! The mapping is a static table of [`FieldSpec`] rows. Each row names the
//! output field, the object it is read from (the selected thermostat or the
//! selected structure) and the vendor property. Values are copied as-is: a
//! number stays a number, a string stays a string. Objects and arrays are
//! dropped with a warning so the record stays flat.

use serde_json::Value;
use tracing::warn;

use crate::document::{get_path, get_path_from, select_single_entry};
use crate::record::Record;

/// Object a field is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Root {
    Thermostat,
    Structure,
}

impl Root {
    pub fn select(self, doc: &Value) -> Option<&Value> {
        match self {
            Root::Thermostat => select_thermostat(doc),
            Root::Structure => select_structure(doc),
        }
    }
}

/// One extraction rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub field: &'static str,
    pub root: Root,
    pub property: &'static str,
}

impl FieldSpec {
    pub const fn thermostat(field: &'static str, property: &'static str) -> Self {
        Self { field, root: Root::Thermostat, property }
    }

    pub const fn structure(field: &'static str, property: &'static str) -> Self {
        Self { field, root: Root::Structure, property }
    }

    /// Reads this field from `doc`, `None` when anything on the way is missing.
    pub fn read<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        get_path_from(self.root.select(doc), &[self.property])
    }
}

/// Fields stored for every reading.
pub const NEST_FIELDS: &[FieldSpec] = &[
    FieldSpec::thermostat("humidity", "humidity"),
    FieldSpec::thermostat("targetTemperature", "target_temperature_c"),
    FieldSpec::thermostat("name", "name"),
    FieldSpec::thermostat("ambientTemperature", "ambient_temperature_c"),
    FieldSpec::thermostat("thermostatId", "device_id"),
    FieldSpec::thermostat("hasLeaf", "has_leaf"),
    FieldSpec::thermostat("heatingState", "hvac_state"),
    FieldSpec::thermostat("timeToTarget", "time_to_target"),
    FieldSpec::thermostat("isUsingEmergencyHeat", "is_using_emergency_heat"),
    FieldSpec::structure("awayStatus", "away"),
    FieldSpec::structure("structureId", "structure_id"),
];

/// The thermostat object under `devices.thermostats`.
pub fn select_thermostat(doc: &Value) -> Option<&Value> {
    select_single_entry(get_path(doc, &["devices", "thermostats"]), "thermostat").map(|(_, t)| t)
}

/// The structure object under `structures`.
pub fn select_structure(doc: &Value) -> Option<&Value> {
    select_single_entry(get_path(doc, &["structures"]), "structure").map(|(_, s)| s)
}

/// Applies every spec to `doc`. Never fails: unresolvable and non-scalar
/// fields are left out.
pub fn extract_all(doc: &Value, specs: &[FieldSpec]) -> Record {
    specs
        .iter()
        .filter_map(|spec| {
            let value = spec.read(doc)?;
            if value.is_object() || value.is_array() {
                warn!("{} ({}) is not a scalar, leaving it out", spec.field, spec.property);
                return None;
            }
            Some((spec.field.to_string(), value.clone()))
        })
        .collect()
}
