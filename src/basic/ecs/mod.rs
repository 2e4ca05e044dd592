//! ECS-backed grid model: element components, intake and assembly systems,
//! update application and output extraction around the math core.

pub mod defer_builder;
pub mod elements;
pub mod network;
pub mod plugin;
pub mod post_processing;
pub mod systems;
pub mod units;
pub mod update;
