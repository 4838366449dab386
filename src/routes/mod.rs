//! Route modules for Inkcheck Server

pub mod health;
pub mod images;
pub mod webhook;
