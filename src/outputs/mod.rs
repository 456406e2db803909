//! Published output: the served audio files and the podcast feed.
//!
//! # Submodules
//!
//! - [`feed`]: renders the RSS document and publishes episodes
//!
//! # Output Structure
//!
//! ```text
//! docs/
//! ├── feed.xml
//! └── audio/
//!     ├── nc-links-2025-02-20.mp3
//!     └── nc-links-2025-02-21.mp3
//! ```

pub mod feed;
