//! glot-core - local-first localization workbench core
//!
//! This crate is the storage, pipeline, and policy engine behind a
//! single-operator localization workbench: importing translatable rows,
//! running protect/enforce/TM/provider/QA translation pipelines over them,
//! tracking reviewer decisions, and projecting approved work back out as
//! patch tables or in-place workbook edits. It has no CLI or server of its
//! own; a caller drives it against one `rusqlite::Connection` at a time.
//!
//! ## Module Structure
//!
//! - `config`: project configuration struct and slug derivation
//! - `error`: the crate's error taxonomy (`CoreError`)
//! - `export`: patch table assembly and workbook-copy export
//! - `glossary`: must-use term loading, matching, and enforcement
//! - `importer`: row-view import into assets/segments/schema profiles
//! - `jobs`: job lifecycle plus the translation and change-detection pipelines
//! - `placeholder`: placeholder extraction, protection, and reinjection
//! - `providers`: LLM provider trait, mock/local stubs, and model policy
//! - `qa`: placeholder/newline/glossary QA checks over a translated segment
//! - `review`: candidate and approval storage, review row assembly
//! - `secrets`: secret lookup trait used by provider resolution
//! - `store`: connection/transaction wrapper and schema migrations
//! - `tm`: translation memory normalization, storage, and search

pub mod config;
pub mod error;
pub mod export;
pub mod glossary;
pub mod importer;
pub mod jobs;
pub mod placeholder;
pub mod providers;
pub mod qa;
pub mod review;
pub mod secrets;
pub mod store;
pub mod tm;
