pub mod admin_dtos;
pub mod auth_dtos;
pub mod post_dtos;
