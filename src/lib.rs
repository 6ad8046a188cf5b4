//! Client core of the Savoa wellness app: offline-first lesson progress
//! sync, lesson catalog loading, and the video and meditation playback
//! controllers.

pub mod api_client;
pub mod catalog;
pub mod config;
pub mod error;
pub mod media;
pub mod progress;
pub mod session;
pub mod storage;

pub type SavoaResult<T> = anyhow::Result<T>;
