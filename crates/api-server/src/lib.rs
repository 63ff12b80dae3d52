#![warn(clippy::unwrap_used)]

pub mod ajax;
pub mod auth;
pub mod rest;
pub mod server;
pub mod sessions;
pub mod wire;

pub use ajax::{AjaxAction, AjaxOrchestrator};
pub use auth::HmacTokenVerifier;
pub use server::{router, ApiServer};
pub use sessions::SessionStore;
pub use wire::{AjaxRequest, AjaxResponse, Navigation, PricingPayload};
