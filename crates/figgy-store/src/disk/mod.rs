//! Disk storage and its decorators
//!
//! - [`DiskAdapter`]: files bucketed by resource id under a base directory
//! - [`RetryingDiskAdapter`]: retries uploads on transient I/O errors
//! - [`FallbackDiskAdapter`]: reads from an older repository on a miss
//! - [`DelayCheckFile`]: bounded first touch of a file handle

mod adapter;
mod delay_check;
mod fallback;
mod retrying;

pub use adapter::{bucket_path, DiskAdapter, SCHEME};
pub use delay_check::{DelayCheckFile, SizeProbe};
pub use fallback::FallbackDiskAdapter;
pub use retrying::{RetryingDiskAdapter, DEFAULT_UPLOAD_ATTEMPTS};
