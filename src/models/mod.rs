pub mod case;
pub mod enums;
pub mod filters;
pub mod medicine;
pub mod orders;
pub mod page;

pub use case::*;
pub use enums::*;
pub use filters::*;
pub use medicine::*;
pub use orders::*;
pub use page::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },
}
