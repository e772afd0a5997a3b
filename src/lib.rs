pub mod calculator;
pub mod config;
pub mod error;
pub mod fetch;
pub mod locator;
pub mod model;
pub mod numeric;
pub mod pipeline;
pub mod profile;
pub mod render;
pub mod store;
pub mod subsidy;
pub mod table;
pub mod text;
pub mod verify;
