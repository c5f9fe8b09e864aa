pub mod actor;
pub mod assignment;
pub mod delivery;
pub mod event;
pub mod rider;
