//! City records and normalization of upstream items
//!
//! The upstream API and local dataset files disagree on field names, so
//! items are decoded loosely and normalized into one record shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::GeoPoint;

/// A city item as it arrives from a source. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCity {
    pub id: Option<Value>,
    pub city: Option<String>,
    pub name: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub latitude: Option<Value>,
    pub lat: Option<Value>,
    pub longitude: Option<Value>,
    pub lon: Option<Value>,
    pub population: Option<Value>,
    pub pop: Option<Value>,
}

/// Envelope of a page response: `{ "data": [...] }`
#[derive(Debug, Default, Deserialize)]
pub struct PagePayload {
    #[serde(default)]
    pub data: Option<Vec<RawCity>>,
}

/// Normalized entity record, owned by the fetch orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityRecord {
    /// Position in the shared store
    pub index: usize,
    pub id: String,
    pub name: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
    pub population: u64,
}

impl CityRecord {
    /// Stand-in for an entity that was never fetched
    pub fn placeholder(index: usize) -> Self {
        RawCity::default().normalize(index)
    }

    /// Triplet mirrored into the shared store
    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude, self.population as f64)
    }
}

impl RawCity {
    /// Both coordinates present and numeric
    pub fn has_coordinates(&self) -> bool {
        first_f64(&self.latitude, &self.lat).is_some()
            && first_f64(&self.longitude, &self.lon).is_some()
    }

    /// Normalize into a record at store position `index`
    pub fn normalize(&self, index: usize) -> CityRecord {
        let id = match &self.id {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => index.to_string(),
        };

        let name = non_empty(&self.city)
            .or_else(|| non_empty(&self.name))
            .unwrap_or_else(|| format!("City {}", index + 1));

        let country = non_empty(&self.country)
            .or_else(|| non_empty(&self.country_code))
            .unwrap_or_else(|| "N/A".to_string());

        let population = first_f64(&self.population, &self.pop)
            .filter(|p| p.is_finite() && *p > 0.0)
            .map(|p| p.trunc() as u64)
            .unwrap_or(0);

        CityRecord {
            index,
            id,
            name,
            country,
            latitude: first_f64(&self.latitude, &self.lat).unwrap_or(0.0),
            longitude: first_f64(&self.longitude, &self.lon).unwrap_or(0.0),
            population,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.is_empty()).cloned()
}

fn first_f64(primary: &Option<Value>, fallback: &Option<Value>) -> Option<f64> {
    as_f64(primary).or_else(|| as_f64(fallback))
}

/// Numbers and numeric strings both count
fn as_f64(value: &Option<Value>) -> Option<f64> {
    match value.as_ref()? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
