pub mod experience;
pub mod job;
pub mod resume;
