//! Infrastructure layer: storage backends, the fulfillment engine, config.

pub mod config;
pub mod fulfillment;
pub mod locks;
pub mod saga;
pub mod services;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
