pub mod health;
pub mod remove_background;
