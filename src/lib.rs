pub mod classifier;
pub mod config;
pub mod dataset;
pub mod db;
pub mod error;
pub mod features;
pub mod labeling;
pub mod loader;
pub mod models;
pub mod predictor;
pub mod repository;
