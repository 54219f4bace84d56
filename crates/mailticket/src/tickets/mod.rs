//! Support tickets: domain model and persistence.

pub mod model;
pub mod store;

pub use model::{
    Analysis, Category, InboundEmail, ParseEnumError, Priority, Sentiment, Ticket, TicketStatus,
    Tone,
};
pub use store::{CreateOutcome, TicketPage, TicketQuery, TicketStore};
