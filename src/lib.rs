//! Select text, press the trigger, read the translation in a draggable popup.
//!
//! Chinese text goes to English, anything else to Chinese, through an
//! OpenAI-compatible chat-completions endpoint.

pub mod config;
pub mod lang;
pub mod logger;
pub mod popup;
pub mod relay;
pub mod ui;
pub mod widgets;
