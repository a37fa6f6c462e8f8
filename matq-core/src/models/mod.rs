pub mod answer;
pub mod fact;
pub mod record;

pub use answer::{Answer, NO_DATA};
pub use fact::Fact;
pub use record::{Record, Relation};
