pub mod embed_controller;
pub mod health_controller;
pub mod index_controller;
