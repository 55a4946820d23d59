pub mod game;
pub mod game_ws;
pub mod health;
pub mod openings;
pub mod settings;
