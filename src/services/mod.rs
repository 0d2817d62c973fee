//! External store clients and the orchestration built on them.

pub mod cloudinary;
pub mod firestore;
pub mod image_service;
pub mod media_store;
pub mod memory;
pub mod metadata_store;
pub mod synthetic;
