//! camgate: HTTP gateway between a camera and two managed services.
//!
//! Images posted by the camera are stored in a media host (Cloudinary) and
//! described by a record in a document database (Firestore). The gateway
//! owns no storage of its own; it validates uploads, sequences the two
//! external calls and reports partial failures between them.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
