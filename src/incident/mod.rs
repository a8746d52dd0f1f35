//! Incident listing, lifecycle and assignment.

mod filter;
mod service;

pub use filter::{
    DEFAULT_PAGE_SIZE, IncidentFilter, IncidentFilterBuilder, InvalidFilterPredicate,
    MAX_PAGE_SIZE, Page, PageRequest, Predicate, listing_link,
};
pub use service::{IncidentError, IncidentPatch, IncidentService, NewIncident};
