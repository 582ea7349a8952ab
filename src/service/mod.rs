pub mod matcher;
pub mod stock;
pub mod workflow;

pub use matcher::MaterialMatcher;
pub use workflow::InvoiceWorkflow;
