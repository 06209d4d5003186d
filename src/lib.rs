pub mod app;
pub mod audio;
pub mod catalog;
pub mod config;
pub mod faces;
pub mod hud;
pub mod logging;
pub mod lyrics;
pub mod prefs;
pub mod preset;
pub mod reaction;
pub mod render;
pub mod services;
pub mod session;
pub mod terminal;
pub mod track;
pub mod transport;
