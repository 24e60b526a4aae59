//! Controladoria Import API Library
//!
//! Turns heterogeneous spreadsheet rows (JSON from the browser's sheet parser,
//! or raw CSV) into canonical registros and bulk-inserts them into PostgreSQL.
//!
//! # Modules
//!
//! - `aliases`: Header alias table and field resolution.
//! - `config`: Configuration management.
//! - `db`: Database connection and pool management.
//! - `db_storage`: Registro storage operations.
//! - `errors`: Error handling types.
//! - `gestor`: Gestor suggestions learned from existing registros.
//! - `handlers`: HTTP request handlers and router.
//! - `importer`: Import pipeline shared by the HTTP routes and the CLI.
//! - `models`: Core data models.
//! - `normalizer`: Row normalization.
//! - `parsers`: Date, amount, status and phone parsing.
//! - `registro`: Single-registro create and edit payloads.
//! - `session`: Caller identity from proxy headers.
//! - `sheet`: CSV reading.

pub mod aliases;
pub mod config;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod gestor;
pub mod handlers;
pub mod importer;
pub mod models;
pub mod normalizer;
pub mod parsers;
pub mod registro;
pub mod session;
pub mod sheet;
