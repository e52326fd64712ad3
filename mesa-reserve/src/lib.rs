//! Seat reservation lifecycle: holds, confirmation, cancellation, waitlist,
//! and the table-availability read model.

pub mod engine;
pub mod tables;

pub use engine::ReservationEngine;
pub use tables::TableMapProjector;
