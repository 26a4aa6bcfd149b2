pub mod enums;
pub mod fields;
mod extraction_record;
mod line_item;
mod quote;
mod submission;

pub use enums::*;
pub use extraction_record::*;
pub use line_item::*;
pub use quote::*;
pub use submission::*;
