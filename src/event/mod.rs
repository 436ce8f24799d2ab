pub mod http_event_service;
pub mod publisher;
