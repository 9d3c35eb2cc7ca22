pub mod activity;
pub mod coordinate;
pub mod drone;
pub mod request;
