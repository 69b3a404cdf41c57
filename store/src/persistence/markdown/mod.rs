//! Markdown file backend.
//!
//! Every metric and workout is one human-readable file under a root
//! directory, named by date so the tree can be browsed and versioned by hand.
//! A workout's metrics are embedded in its front-matter.
//!
//! There is no index: reads walk the relevant subtree and parse each header.
//! Writes replace whole files atomically. There is no cross-process locking;
//! concurrent writers to the same workout file keep only the last write.

mod document;
mod layout;
mod repository;

pub use layout::slugify;
pub use repository::MarkdownRepository;
