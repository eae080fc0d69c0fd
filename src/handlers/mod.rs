pub mod admin;
pub mod banners;
pub mod health;
pub mod landing;
pub mod redirect;
