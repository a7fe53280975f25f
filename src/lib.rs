//! Virtual try-on client core.
//!
//! This library drives the try-on flow of the ELO app: capture a model
//! photo, resolve a garment image, upload both to public object storage,
//! submit a generation job to the fashn.ai synthesis provider, and poll the
//! job to a terminal state under an explicit, cancellable state machine.
//! The store/saved/entitlement shell is a thin query layer over PostgreSQL.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
