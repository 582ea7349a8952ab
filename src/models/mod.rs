pub mod decimal;
pub mod invoice;
pub mod material;
pub mod parsed;
pub mod stock;

pub use decimal::Decimal;
pub use invoice::{
    ConfirmOutcome, DecisionAction, IngestOutcome, InvalidTransition, Invoice, InvoiceDetail,
    InvoiceItem, InvoiceItemView, InvoiceStatus, InvoiceSummary, ItemDecision, ValidationOutcome,
};
pub use material::{Material, NewMaterial};
pub use parsed::{DocumentFormat, MatchSuggestion, ParsedDocument, ParsedHeader, ParsedItem};
pub use stock::{MovementType, StockMovement};
