//! Core data models for the image gateway.
//!
//! `ImageRecord` is what the metadata store holds; the outcome enums are what
//! the image service hands back to the HTTP layer.

pub mod image_record;
pub mod outcome;

pub use image_record::{ImageQuery, ImageRecord, Metadata, NewImageRecord};
pub use outcome::{BatchReport, DeleteOutcome, StoredImage, UploadOutcome};
