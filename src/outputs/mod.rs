//! Writing broadcasts out.
//!
//! - [`json`]: one JSON document per broadcast, either as lines on stdout or
//!   as files in the archive layout
//!
//! # Archive Layout
//!
//! ```text
//! json_output_dir/
//! └── stations/
//!     └── b2/
//!         └── 2015/
//!             └── 10/
//!                 └── 21/
//!                     ├── 0012 Concerto bavarese.json
//!                     └── 2305 Nachtmix.json
//! ```

pub mod json;
