//! Walks a page's accessibility tree and turns it into the flat
//! `Interactable` list the page-map assembler embeds.

mod detector;

pub use detector::detect_interactables;
