//! Client side of Adopt a Pixel: the backend façade, the local grid mirror,
//! the auto-reset watcher and the terminal page.

pub mod app;
pub mod config;
pub mod input;
pub mod page;
pub mod render;
pub mod service;
pub mod store;
pub mod subscription;
pub mod watcher;

#[cfg(test)]
mod testing;
