pub mod analytics;
pub mod attendance;
pub mod course;
pub mod enrollment;
pub mod sample;
pub mod session;
pub mod user;
