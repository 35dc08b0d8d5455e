pub mod events;
pub mod overrides;
pub mod policy;
pub mod stages;
pub mod status;
