//! SELECT / ASK result serialization
//!
//! One module per format: SPARQL-JSON (with parser for the round-trip
//! law), SPARQL-XML, CSV, plus the human-readable Turtle-style listing
//! below.

pub mod csv;
pub mod json;
pub mod xml;

use crate::ResultSet;
use std::fmt::Write;

/// Human-readable `?var = term` listing
///
/// One line per binding, rows separated by a blank line; unbound
/// variables are omitted.
pub fn turtle_listing(results: &ResultSet<'_>) -> String {
    let mut out = String::new();
    for (index, row) in results.rows.iter().enumerate() {
        if index > 0 {
            out.push('\n');
        }
        for (variable, term) in results.variables.iter().zip(row) {
            if let Some(term) = term {
                let _ = writeln!(out, "?{variable} = {term}");
            }
        }
    }
    out
}
