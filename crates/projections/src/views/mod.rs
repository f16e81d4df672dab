//! Read model views.

pub mod cars;

pub use cars::{CarProjection, CarReadModel};
