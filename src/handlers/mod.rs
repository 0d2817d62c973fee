pub mod client_ip;
pub mod health_handlers;
pub mod image_handlers;
pub mod ui_handlers;
