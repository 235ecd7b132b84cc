pub mod availability;
pub mod doctor;
pub mod schedule;

pub use availability::AvailabilityChecker;
pub use doctor::{DoctorDirectory, DoctorService, InMemoryDoctorDirectory, SupabaseDoctorDirectory};
pub use schedule::generate_slots;
