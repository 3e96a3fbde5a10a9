//! Cross-context integration flows.

pub mod discovery_flows;
pub mod relay_flows;

#[cfg(test)]
pub(crate) mod fixtures;
