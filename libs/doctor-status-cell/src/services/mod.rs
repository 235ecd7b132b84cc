pub mod cascade;
pub mod store;

pub use cascade::DelayCascadeEngine;
pub use store::{DoctorStatusStore, InMemoryDoctorStatusStore, SupabaseDoctorStatusStore};
