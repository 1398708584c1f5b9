pub mod notification;
pub mod reservation;
pub mod task;
pub mod technician;
pub mod vehicle;
