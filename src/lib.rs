//! A rust library for reading and writing image stacks held in hierarchical multidimensional array stores.
//!
//! Datasets of rank 2 to 5 are mapped onto image stacks of 2D planes with `(channels, slices, frames)` dimensions, see [`topology`].
//! Datasets named by a template such as `/t$T/channel$C`, one per frame and channel, are grouped into a single hyperstack, see [`grouping`] and [`range`].
//!
//! ## Getting Started
//! - Implement the [`store`] traits for your array store, or use the in-memory [`MemoryArrayStore`](store::MemoryArrayStore).
//! - Read stacks with [`reader`], write them with [`writer`].
//! - Grouping defaults, the narrowing policy, and the eager memory limit are set in a [`Config`](config::Config).
//!
//! ## Example
//! ```rust
//! # use hyperstack::{config::Config, element::ElementBuffer, path::DatasetPath, store::MemoryArrayStore, topology::LoadStrategy};
//! let store = MemoryArrayStore::new();
//! for frame in 0..2 {
//!     for channel in 0..2 {
//!         let path = DatasetPath::new(&format!("/t{frame}/channel{channel}"))?;
//!         let elements = ElementBuffer::UInt16(vec![frame * 10 + channel; 4 * 6]);
//!         store.insert(&path, &[4, 6], elements.element_type(), &elements)?;
//!     }
//! }
//!
//! let config = Config::default();
//! let (grouping, stack) = hyperstack::reader::read_grouped(&store, &config, None, None)?;
//! assert!(grouping.has_contiguous_frame_range());
//! assert_eq!(stack.dimensions(), (2, 1, 2)); // (channels, slices, frames)
//!
//! let stack = hyperstack::reader::read_dataset(&store, &DatasetPath::new("/t1/channel0")?, LoadStrategy::Virtual, &config)?;
//! println!("{stack}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Crate Features
//! #### Default
//!  - `ndarray`: [`ndarray`] conversions for [`Plane`](plane::Plane) and [`ImageStack`](stack::ImageStack).
//!
//! ## Logging
//! Diagnostics are emitted with the [`log`] facade, the crate never installs a logger.
//! Wrap a store in a [`UsageLogArrayStore`](store::UsageLogArrayStore) to trace every store call.

#![warn(unused_variables)]
#![warn(dead_code)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![deny(clippy::missing_panics_doc)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod config;
pub mod convert;
pub mod element;
pub mod grammar;
pub mod grouping;
pub mod hyperslab;
pub mod path;
pub mod plane;
pub mod range;
pub mod reader;
pub mod stack;
pub mod store;
pub mod topology;
pub mod virtual_source;
pub mod writer;

#[cfg(feature = "ndarray")]
/// Re-export [`ndarray`].
pub use ndarray;
