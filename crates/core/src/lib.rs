pub mod control;
pub mod error;
pub mod logger;
pub mod platform;
pub mod publish;
pub mod recognizer;
pub mod regions;
pub mod settings;
pub mod sleep;
pub mod timer;
pub mod trigger;
pub mod types;
