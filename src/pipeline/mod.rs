//! Pipeline stages for timesheet extraction.
//!
//! Each submodule implements exactly one transformation step, so every
//! stage can be tested on its own and the collaborators (container format,
//! model provider) can be swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! container ──▶ normalize ──▶ encode ──▶ inference ──▶ parse
//!  (.docx zip)   (RGB ≤1500)   (JPEG b64)  (VLM call)    (JSON → entries)
//! ```
//!
//! 1. [`container`]: pull embedded image blobs out of the document, in
//!    relationship order
//! 2. [`normalize`]: decode, force 3-channel RGB, cap the longest side
//! 3. [`encode`]: JPEG-encode and base64-wrap for the request body
//! 4. [`inference`]: the service seam and its `edgequake-llm` adapter;
//!    the only stage with network I/O
//! 5. [`parse`]: strict decode with a tolerant fallback for replies
//!    that wrap the array in prose

pub mod container;
pub mod encode;
pub mod inference;
pub mod normalize;
pub mod parse;
