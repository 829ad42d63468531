pub mod error;
pub mod source;
pub mod store;

pub use error::{ContractError, SourceError};
pub use source::{ContractSource, DirContractSource, HttpContractSource, StaticContractSource};
pub use store::ContractStore;
