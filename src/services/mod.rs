pub mod auth_service;
pub mod download_service;
pub mod order_service;
pub mod payment_service;
pub mod product_service;
