//! Bidirectional conversion between CSV on the Web (CSVW) and RDF.
//!
//! [`csv2rdf::Csv2RdfConvertor`] turns CSV files described by CSVW metadata into an RDF quad
//! stream; [`rdf2csvw::Rdf2CsvwConvertor`] reads RDF back into CSV rows, either with a given
//! descriptor or with a schema inferred from the data. All I/O goes through the
//! [`io::Resolver`] trait.

extern crate derive_builder;

pub mod api;
pub mod config;
pub mod consts;
pub mod csv2rdf;
pub mod descriptor;
pub mod errors;
pub mod fetch;
pub mod formats;
pub mod io;
pub mod issues;
pub mod options;
pub mod rdf2csvw;
pub mod template;
pub mod util;
pub mod validate;

pub use config::ConversionOptions;
pub use csv2rdf::Csv2RdfConvertor;
pub use issues::{Issue, IssueTracker};
pub use rdf2csvw::Rdf2CsvwConvertor;
pub use validate::Validator;
