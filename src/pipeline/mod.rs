//! Pipeline stages for shipment extraction.
//!
//! Each submodule implements exactly one step. A stage's output is the next
//! stage's only input and no stage edits an earlier stage's output.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ text ──▶ translate ──▶ aggregate ──▶ assemble (resolve per section)
//! (path/URL) (pdfium) (per page)    (SectionMap)  (ExtractionResult)
//! ```
//!
//! 1. [`input`]: canonicalise the user-supplied path or URL to a local PDF
//! 2. [`text`]: read each page's text layer; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 3. [`normalize`]: strip line-ending and invisible-character artefacts
//! 4. [`translate`]: per page: detect language, translate, drop boilerplate
//! 5. [`aggregate`]: split pages into schema sections, merge across pages
//! 6. [`resolve`]: answer every field (gated local/fallback) and list
//! 7. [`assemble`]: walk the schema and build the nested record

pub mod aggregate;
pub mod assemble;
pub mod input;
pub mod normalize;
pub mod resolve;
pub mod text;
pub mod translate;
