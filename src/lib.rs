mod model_service;
mod ort_service;
mod routes;
mod server;
mod state;

pub mod config;

pub use server::start_server;
