/*!
Document fixtures

Builders for device-state and weather payloads in the layouts the real APIs
return them.
*/

use serde_json::{json, Map, Value};

pub const THERMOSTAT_ID: &str = "JZ-U65a4K6EKQmzsnTzFPbTE2K-T_Yco";
pub const STRUCTURE_ID: &str = "c-SEshyQ";

/// Device-state document builder.
#[derive(Debug, Clone, Default)]
pub struct DocumentBuilder {
    thermostats: Map<String, Value>,
    structures: Map<String, Value>,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// One thermostat and one structure with every mapped property set.
    pub fn single_thermostat() -> Self {
        Self::new()
            .thermostat(THERMOSTAT_ID, living_room_thermostat())
            .structure(STRUCTURE_ID, home_structure())
    }

    pub fn thermostat(mut self, id: &str, properties: Value) -> Self {
        self.thermostats.insert(id.to_string(), properties);
        self
    }

    pub fn structure(mut self, id: &str, properties: Value) -> Self {
        self.structures.insert(id.to_string(), properties);
        self
    }

    /// Sets one property on an already added thermostat.
    pub fn with_thermostat_property(mut self, id: &str, key: &str, value: Value) -> Self {
        if let Some(Value::Object(props)) = self.thermostats.get_mut(id) {
            props.insert(key.to_string(), value);
        }
        self
    }

    pub fn without_thermostat_property(mut self, id: &str, key: &str) -> Self {
        if let Some(Value::Object(props)) = self.thermostats.get_mut(id) {
            props.remove(key);
        }
        self
    }

    pub fn build(self) -> Value {
        let mut doc = Map::new();
        if !self.thermostats.is_empty() {
            doc.insert("devices".into(), json!({"thermostats": self.thermostats}));
        }
        if !self.structures.is_empty() {
            doc.insert("structures".into(), Value::Object(self.structures));
        }
        Value::Object(doc)
    }
}

pub fn living_room_thermostat() -> Value {
    json!({
        "humidity": 55,
        "target_temperature_c": 21.5,
        "name": "Living Room (5F9F)",
        "ambient_temperature_c": 20.5,
        "device_id": THERMOSTAT_ID,
        "has_leaf": false,
        "hvac_state": "heating",
        "time_to_target": "~0",
        "is_using_emergency_heat": false
    })
}

pub fn home_structure() -> Value {
    json!({"away": "home", "structure_id": STRUCTURE_ID})
}

/// `currently` payload with all rich readings.
pub fn rich_weather() -> Value {
    json!({"currently": {
        "temperature": 18.3,
        "summary": "Clear",
        "humidity": 0.5,
        "apparentTemperature": 17.9,
        "windSpeed": 3.1,
        "cloudCover": 0.1,
        "dewPoint": 9.2
    }})
}

/// `query.results.channel.item.condition` payload.
pub fn minimal_weather(temp: &str, text: &str) -> Value {
    json!({"query": {"results": {"channel": {"item": {"condition": {"temp": temp, "text": text}}}}}})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_layout() {
        let doc = DocumentBuilder::single_thermostat()
            .with_thermostat_property(THERMOSTAT_ID, "humidity", json!(40))
            .without_thermostat_property(THERMOSTAT_ID, "name")
            .build();

        let thermostat = &doc["devices"]["thermostats"][THERMOSTAT_ID];
        assert_eq!(thermostat["humidity"], 40);
        assert!(thermostat.get("name").is_none());
        assert_eq!(doc["structures"][STRUCTURE_ID]["away"], "home");
    }

    #[test]
    fn test_empty_builder() {
        assert_eq!(DocumentBuilder::new().build(), json!({}));
    }
}
