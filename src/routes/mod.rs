pub mod health;
pub mod menus;
pub mod pages;
pub mod permissions;
pub mod qr_codes;
pub mod short_urls;
