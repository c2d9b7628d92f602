// src/services/mod.rs

pub mod moderation;
pub mod rating;
pub mod swap_lifecycle;
