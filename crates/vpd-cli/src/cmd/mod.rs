pub mod calc;
pub mod config;
pub mod init;
pub mod overrides;
pub mod policy;
pub mod run;
pub mod stage;
pub mod stages;
pub mod status;
