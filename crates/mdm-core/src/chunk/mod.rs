//! Byte-range chunk planning and on-disk part files.
//!
//! A chunked transfer splits `[0, size)` into contiguous chunks; each chunk
//! is fetched into its own part file whose size doubles as the resume
//! checkpoint.

mod manifest;
mod part;
mod plan;

pub(crate) use part::remove_dir_if_empty;
pub use manifest::{manifest_path, PartManifest};
pub use part::{
    clean_temp_files, part_index, part_path, remove_parts_from, stream_part_path, temp_dir_for, TEMP_DIR_NAME,
};
pub use plan::{plan_chunks, Chunk};
