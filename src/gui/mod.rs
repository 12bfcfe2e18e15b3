//! Desktop front end built with egui/eframe.
//!
//! - `app` - the single-window `MultisendApp` and `launch`
//! - `async_job` - runs engine futures off the frame loop
//! - `theme` - colors, spacing and button styles

mod app;
pub mod async_job;
pub mod theme;

pub use app::{launch, MultisendApp};
pub use async_job::AsyncJob;
pub use theme::{configure_style, AppTheme};
