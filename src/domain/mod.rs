// Domain layer - Pure value types and geometry, no I/O
pub mod alert;
pub mod density;
pub mod error;
pub mod geometry;
pub mod route;
