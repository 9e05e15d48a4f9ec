//! Chat socket protocol: outbound request frames, inbound tagged frames and
//! the planning payloads they carry.

mod frame;
mod types;

pub use frame::{decode_frame, OutboundFrame, ProtocolError, ServerFrame, KNOWN_TAGS};
pub use types::{
    Activity, Flight, FoodRecommendation, Hotel, Itinerary, ItineraryDay, Meal, RiskWarning,
    Severity, TripPlan,
};
