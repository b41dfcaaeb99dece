//! Points-to domain models

mod abstract_location;
mod flow_state;
mod points_to_set;

pub use abstract_location::{
    AbstractLocation, LocationFactory, LocationId, LocationKind, LocationRequest, NULL_LOCATION,
    UNKNOWN_LOCATION,
};
pub use flow_state::{FieldKey, HeapSlot, PointsToState};
pub use points_to_set::PointsToSet;
