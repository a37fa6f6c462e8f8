//! The three lookup strategies of the resolver, cheapest first.
//!
//! - `graph` — fact store lookup on the candidate entity
//! - `exact` — exact key match on the first extracted table
//! - `semantic` — nearest table row by embedding similarity

pub mod exact_match;
pub mod graph_lookup;
pub mod semantic;

pub use exact_match::ExactMatch;
pub use graph_lookup::GraphLookup;
pub use semantic::SemanticFallback;
