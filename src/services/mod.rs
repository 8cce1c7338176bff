pub mod auth_services;
pub mod media_service;
pub mod paginator;
