pub mod health;
pub mod playground;
