//! CLI module for s3sync
//!
//! Command implementations used by the `s3sync` binary.
//!
//! # Usage
//!
//! ```bash
//! # Pre-signed download link valid for one hour
//! s3sync presign get s3://bucket/report.pdf --expires-in 3600
//!
//! # Pre-signed upload link bound to a content type and custom header
//! s3sync presign put s3://bucket/upload.bin --content-type image/png -H "x-amz-meta-owner: alice"
//!
//! # Compare a local directory with a remote prefix
//! s3sync diff ./photos s3://bucket/photos --json
//!
//! # Object info, listing, transfers
//! s3sync stat s3://bucket/key
//! s3sync ls s3://bucket/prefix
//! s3sync put ./file.txt s3://bucket/dir/
//! s3sync get s3://bucket/dir/file.txt ./file.txt
//! ```

pub mod commands;
pub mod progress;

pub use commands::parse_s3_path;
pub use progress::BarListener;
