pub mod alert;
pub mod assumptions;
pub mod enrichment;
pub mod listing;
pub mod metrics;
pub mod rent;
pub mod search;

pub use assumptions::{Assumptions, RentScenario};
pub use listing::{DirtyField, Listing, ListingId};
pub use metrics::{BaseInputs, Metrics};
