//! Credit purchase flow for the skill-exchange client: pick a credit package,
//! confirm an M-Pesa number, and follow the push payment until it resolves.

pub mod api;
pub mod config;
pub mod logging;
pub mod payments;
pub mod services;
pub mod workers;
