//! Planning payloads carried by `flight_results`, `risk_warnings` and `trip_plan` frames
//!
//! Most of these records are produced by the planner's language-model agents, so
//! only the fields the client actually reads are typed. Everything else is kept
//! verbatim in `extra` so nothing the server sends is silently lost.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Deserialization helpers
// ============================================================================

/// Treat an explicit `null` the same as a missing field
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accept any JSON value, keeping it only if it has the expected shape.
///
/// Used for agent-generated numbers that occasionally arrive as strings.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

// ============================================================================
// Flights
// ============================================================================

/// A ranked flight option
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Flight {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<i64>,
    #[serde(default)]
    pub flight_number: Option<String>,
    #[serde(default)]
    pub airline: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub departure_time: Option<String>,
    #[serde(default)]
    pub arrival_time: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub duration_mins: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub stops: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub delay_probability: Option<f64>,
    #[serde(default)]
    pub risk_level: Option<String>,
    /// Composite comfort score computed by the ranking agent
    #[serde(default, deserialize_with = "lenient")]
    pub ccs_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub rank: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub recommended: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Flight {
    /// Short human label, e.g. `IndiGo 6E-201`
    pub fn label(&self) -> String {
        match (&self.airline, &self.flight_number) {
            (Some(airline), Some(number)) => format!("{airline} {number}"),
            (Some(airline), None) => airline.clone(),
            (None, Some(number)) => number.clone(),
            (None, None) => "unknown flight".to_string(),
        }
    }
}

// ============================================================================
// Risk warnings
// ============================================================================

/// Warning severity as rendered by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Red,
    Amber,
    Blue,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Severity {
    /// Red warnings are surfaced inline next to the conversation
    pub fn is_critical(self) -> bool {
        matches!(self, Severity::Red)
    }
}

/// A risk warning attached to a flight
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskWarning {
    #[serde(default)]
    pub flight_number: Option<String>,
    #[serde(default)]
    pub warning_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub severity: Severity,
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Hotels, food, itinerary
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Hotel {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub rating: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub price_per_night: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub distance_centre_km: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub safety_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub rank: Option<u32>,
    #[serde(default)]
    pub recommendation_reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FoodRecommendation {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub cuisine: Option<String>,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub price_range: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One scheduled activity within an itinerary day
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Activity {
    #[serde(default, deserialize_with = "lenient")]
    pub time: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Meal {
    #[serde(default, rename = "type", deserialize_with = "lenient")]
    pub meal_type: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ItineraryDay {
    #[serde(default, deserialize_with = "lenient")]
    pub day: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub theme: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub activities: Vec<Activity>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub meals: Vec<Meal>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Day-by-day itinerary
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Itinerary {
    #[serde(default, deserialize_with = "null_as_default")]
    pub days: Vec<ItineraryDay>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Trip plan
// ============================================================================

/// Structured plan carried by a `trip_plan` frame
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TripPlan {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub travel_date: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub num_days: Option<u32>,
    #[serde(default, deserialize_with = "lenient")]
    pub budget: Option<String>,
    #[serde(default)]
    pub recommended_flight: Option<Flight>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub recommended_hotels: Vec<Hotel>,
    #[serde(default)]
    pub itinerary: Option<Itinerary>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub food_recommendations: Vec<FoodRecommendation>,
}
