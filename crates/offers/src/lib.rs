//! Order bumps, bundle selection, cart quantity edits and upsell offers.

pub mod manager;
pub mod state_machine;
pub mod types;

pub use manager::OfferManager;
pub use state_machine::SelectionStateMachine;
pub use types::{
    BumpOffer, BundleSelection, QuantityChange, QuantityMode, SelectionMode, UpsellOutcome,
};
