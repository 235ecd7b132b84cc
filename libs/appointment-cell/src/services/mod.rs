pub mod booking;
pub mod lifecycle;
pub mod store;

pub use booking::BookingEngine;
pub use lifecycle::{allowed_transitions, validate_transition};
pub use store::{
    AppointmentQuery, AppointmentStore, DelayStamp, InMemoryAppointmentStore, StatusChange, StoreError,
    SupabaseAppointmentStore,
};
