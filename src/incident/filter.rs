//! Listing filters and pagination.
//!
//! Raw query parameters are untrusted text. They are validated here, before
//! any storage access, and turned into a typed `IncidentFilter` that carries
//! one equality predicate per supplied field.

use std::fmt;

use serde::Serialize;
use url::form_urlencoded;

use crate::model::{Literal, Priority, Severity, State};

pub const DEFAULT_PAGE_SIZE: u64 = 5;
pub const MAX_PAGE_SIZE: u64 = 100;

/// Largest offset the store accepts.
const MAX_OFFSET: u64 = i64::MAX as u64;

/// A filter value that is not in its field's literal set, or a page request
/// that cannot be honoured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidFilterPredicate {
    pub field: &'static str,
    pub value: String,
    pub allowed: String,
}

impl InvalidFilterPredicate {
    fn literal<L: Literal>(value: &str) -> Self {
        Self {
            field: L::FIELD,
            value: value.to_string(),
            allowed: L::literal_set(),
        }
    }
}

impl fmt::Display for InvalidFilterPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid {} value '{}', please choose from these: {}",
            self.field, self.value, self.allowed
        )
    }
}

impl std::error::Error for InvalidFilterPredicate {}

/// Zero-based page index and page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    page: u64,
    size: u64,
}

impl PageRequest {
    /// Validate a page request. Size must be within `1..=MAX_PAGE_SIZE` and
    /// the resulting offset must fit the store's signed 64-bit `START`.
    pub fn new(page: u64, size: u64) -> Result<Self, InvalidFilterPredicate> {
        if size == 0 || size > MAX_PAGE_SIZE {
            return Err(InvalidFilterPredicate {
                field: "size",
                value: size.to_string(),
                allowed: format!("1 to {}", MAX_PAGE_SIZE),
            });
        }
        match page.checked_mul(size) {
            Some(offset) if offset <= MAX_OFFSET => Ok(Self { page, size }),
            _ => Err(InvalidFilterPredicate {
                field: "page",
                value: page.to_string(),
                allowed: format!("0 to {}", MAX_OFFSET / size),
            }),
        }
    }

    /// Missing parameters fall back to page 0 and the default size.
    pub fn from_params(page: Option<u64>, size: Option<u64>) -> Result<Self, InvalidFilterPredicate> {
        Self::new(page.unwrap_or(0), size.unwrap_or(DEFAULT_PAGE_SIZE))
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn offset(&self) -> u64 {
        self.page * self.size
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// One equality test against a stored incident field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    /// Storage field name.
    pub field: &'static str,
    pub value: String,
}

/// A validated listing query.
///
/// Every supplied field contributes one predicate; predicates are combined
/// with AND. An absent field does not constrain the listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncidentFilter {
    pub incident_type: Option<String>,
    pub severity: Option<Severity>,
    pub state: Option<State>,
    pub priority: Option<Priority>,
    pub page: PageRequest,
}

impl IncidentFilter {
    pub fn predicates(&self) -> Vec<Predicate> {
        let mut predicates = Vec::new();
        if let Some(incident_type) = &self.incident_type {
            predicates.push(Predicate {
                field: "incident_type",
                value: incident_type.clone(),
            });
        }
        if let Some(severity) = self.severity {
            predicates.push(Predicate {
                field: "severity",
                value: severity.as_str().to_string(),
            });
        }
        if let Some(state) = self.state {
            predicates.push(Predicate {
                field: "state",
                value: state.as_str().to_string(),
            });
        }
        if let Some(priority) = self.priority {
            predicates.push(Predicate {
                field: "priority",
                value: priority.as_str().to_string(),
            });
        }
        predicates
    }

    /// Query pairs for the active filters, in canonical literal form.
    fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = Vec::new();
        if let Some(incident_type) = &self.incident_type {
            pairs.push(("incidentType", incident_type.as_str()));
        }
        if let Some(severity) = self.severity {
            pairs.push(("severity", severity.as_str()));
        }
        if let Some(state) = self.state {
            pairs.push(("state", state.as_str()));
        }
        if let Some(priority) = self.priority {
            pairs.push(("priority", priority.as_str()));
        }
        pairs
    }

    /// Link to `page` of this same listing.
    pub fn page_link(&self, base: &str, page: u64) -> String {
        listing_link(base, page, self.page.size(), &self.query_pairs())
    }
}

/// `base?page=N&size=S` followed by `extra`, form-encoded.
pub fn listing_link(base: &str, page: u64, size: u64, extra: &[(&str, &str)]) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());
    query
        .append_pair("page", &page.to_string())
        .append_pair("size", &size.to_string())
        .extend_pairs(extra);
    format!("{}?{}", base, query.finish())
}

/// Collects raw parameters and validates them in one pass.
#[derive(Debug, Clone, Default)]
pub struct IncidentFilterBuilder {
    incident_type: Option<String>,
    severity: Option<String>,
    state: Option<String>,
    priority: Option<String>,
    page: PageRequest,
}

impl IncidentFilterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate all four raw parameters and the page request in one call.
    pub fn from_raw(
        incident_type: Option<String>,
        severity: Option<String>,
        state: Option<String>,
        priority: Option<String>,
        page: PageRequest,
    ) -> Result<IncidentFilter, InvalidFilterPredicate> {
        Self {
            incident_type,
            severity,
            state,
            priority,
            page,
        }
        .build()
    }

    pub fn incident_type(mut self, raw: Option<impl Into<String>>) -> Self {
        self.incident_type = raw.map(Into::into);
        self
    }

    pub fn severity(mut self, raw: Option<impl Into<String>>) -> Self {
        self.severity = raw.map(Into::into);
        self
    }

    pub fn state(mut self, raw: Option<impl Into<String>>) -> Self {
        self.state = raw.map(Into::into);
        self
    }

    pub fn priority(mut self, raw: Option<impl Into<String>>) -> Self {
        self.priority = raw.map(Into::into);
        self
    }

    pub fn page(mut self, page: PageRequest) -> Self {
        self.page = page;
        self
    }

    /// Validate every supplied literal. A blank literal counts as absent;
    /// `incident_type` is matched exactly as given.
    pub fn build(self) -> Result<IncidentFilter, InvalidFilterPredicate> {
        Ok(IncidentFilter {
            incident_type: self.incident_type,
            severity: parse_optional::<Severity>(self.severity)?,
            state: parse_optional::<State>(self.state)?,
            priority: parse_optional::<Priority>(self.priority)?,
            page: self.page,
        })
    }
}

fn parse_optional<L: Literal>(raw: Option<String>) -> Result<Option<L>, InvalidFilterPredicate> {
    match raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(value) => L::parse_literal(&value)
            .map(Some)
            .ok_or_else(|| InvalidFilterPredicate::literal::<L>(&value)),
    }
}

/// One page of a listing plus what is needed to navigate it.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub size: u64,
    pub total_items: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total_items: u64) -> Self {
        Self {
            items,
            page: request.page(),
            size: request.size(),
            total_items,
        }
    }

    pub fn total_pages(&self) -> u64 {
        self.total_items.div_ceil(self.size)
    }

    pub fn has_next(&self) -> bool {
        self.page.saturating_add(1) < self.total_pages()
    }

    pub fn has_previous(&self) -> bool {
        self.page > 0
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_items: self.total_items,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_builder_is_unconstrained() {
        let filter = IncidentFilterBuilder::new().build().unwrap();
        assert!(filter.predicates().is_empty());
        assert_eq!(filter.page, PageRequest::default());
    }

    #[test]
    fn test_literals_are_normalised() {
        let filter = IncidentFilterBuilder::new()
            .severity(Some("critical"))
            .state(Some("in_progress"))
            .priority(Some("LOW"))
            .build()
            .unwrap();

        assert_eq!(filter.severity, Some(Severity::Critical));
        assert_eq!(filter.state, Some(State::InProgress));
        assert_eq!(filter.priority, Some(Priority::Low));
    }

    #[test]
    fn test_invalid_severity_names_literal_set() {
        let err = IncidentFilterBuilder::new()
            .severity(Some("Catastrophic"))
            .build()
            .unwrap_err();

        assert_eq!(err.field, "severity");
        assert_eq!(err.allowed, "Critical, High, Medium, Low");
        assert!(err.to_string().contains("Catastrophic"));
        assert!(err.to_string().contains("Critical, High, Medium, Low"));
    }

    #[test]
    fn test_from_raw() {
        let filter =
            IncidentFilterBuilder::from_raw(None, Some("high".to_string()), None, None, PageRequest::default())
                .unwrap();
        assert_eq!(filter.severity, Some(Severity::High));
        assert_eq!(filter.predicates().len(), 1);

        let err =
            IncidentFilterBuilder::from_raw(None, Some("bogus".to_string()), None, None, PageRequest::default())
                .unwrap_err();
        assert_eq!(err.allowed, "Critical, High, Medium, Low");
    }

    #[test]
    fn test_invalid_state_and_priority() {
        let err = IncidentFilterBuilder::new()
            .state(Some("Pending"))
            .build()
            .unwrap_err();
        assert_eq!(err.field, "state");
        assert_eq!(err.allowed, "Open, Close, In_Progress");

        let err = IncidentFilterBuilder::new()
            .priority(Some("Critical"))
            .build()
            .unwrap_err();
        assert_eq!(err.field, "priority");
    }

    #[test]
    fn test_blank_literals_are_absent() {
        let filter = IncidentFilterBuilder::new()
            .severity(Some(""))
            .priority(Some("  "))
            .build()
            .unwrap();
        assert!(filter.predicates().is_empty());
    }

    #[test]
    fn test_incident_type_is_kept_verbatim() {
        let filter = IncidentFilterBuilder::new()
            .incident_type(Some(" Malware "))
            .build()
            .unwrap();
        assert_eq!(filter.incident_type.as_deref(), Some(" Malware "));

        let blank = IncidentFilterBuilder::new()
            .incident_type(Some(""))
            .build()
            .unwrap();
        assert_eq!(
            blank.predicates(),
            vec![Predicate { field: "incident_type", value: String::new() }]
        );
    }

    #[test]
    fn test_predicates_use_canonical_literals() {
        let filter = IncidentFilterBuilder::new()
            .incident_type(Some("Phishing"))
            .severity(Some("high"))
            .state(Some("open"))
            .build()
            .unwrap();

        assert_eq!(
            filter.predicates(),
            vec![
                Predicate { field: "incident_type", value: "Phishing".to_string() },
                Predicate { field: "severity", value: "High".to_string() },
                Predicate { field: "state", value: "Open".to_string() },
            ]
        );
    }

    #[test]
    fn test_page_request_bounds() {
        assert!(PageRequest::new(0, 0).is_err());
        assert!(PageRequest::new(0, MAX_PAGE_SIZE + 1).is_err());
        assert!(PageRequest::new(0, MAX_PAGE_SIZE).is_ok());
        assert!(PageRequest::new(u64::MAX, 2).is_err());

        let max_page = i64::MAX as u64;
        assert_eq!(PageRequest::new(max_page, 1).unwrap().offset(), max_page);
        let err = PageRequest::new(u64::MAX, 1).unwrap_err();
        assert_eq!(err.field, "page");
        assert!(PageRequest::new(max_page / 5 + 1, 5).is_err());

        let request = PageRequest::from_params(Some(3), None).unwrap();
        assert_eq!(request.size(), DEFAULT_PAGE_SIZE);
        assert_eq!(request.offset(), 15);
    }

    #[test]
    fn test_page_navigation() {
        let first = Page::new(vec![1, 2, 3, 4, 5], PageRequest::new(0, 5).unwrap(), 12);
        assert_eq!(first.total_pages(), 3);
        assert!(first.has_next());
        assert!(!first.has_previous());

        let last = Page::new(vec![11, 12], PageRequest::new(2, 5).unwrap(), 12);
        assert!(!last.has_next());
        assert!(last.has_previous());

        let beyond = Page::<u8>::new(vec![], PageRequest::new(7, 5).unwrap(), 12);
        assert!(!beyond.has_next());
        assert!(beyond.has_previous());

        let far = Page::<u8>::new(vec![], PageRequest::new(i64::MAX as u64, 1).unwrap(), 3);
        assert!(!far.has_next());
        let edge = Page::<u8> { items: vec![], page: u64::MAX, size: 1, total_items: 3 };
        assert!(!edge.has_next());

        let empty = Page::<u8>::new(vec![], PageRequest::default(), 0);
        assert_eq!(empty.total_pages(), 0);
        assert!(!empty.has_next());
    }

    #[test]
    fn test_page_link_keeps_filters() {
        let filter = IncidentFilterBuilder::new()
            .incident_type(Some("Data leak"))
            .severity(Some("low"))
            .page(PageRequest::new(1, 10).unwrap())
            .build()
            .unwrap();

        assert_eq!(
            filter.page_link("/v1/incidents", 2),
            "/v1/incidents?page=2&size=10&incidentType=Data+leak&severity=Low"
        );
    }

    #[test]
    fn test_listing_link_encodes_reserved_characters() {
        assert_eq!(
            listing_link("/v1/tenants", 1, 5, &[]),
            "/v1/tenants?page=1&size=5"
        );
        assert_eq!(
            listing_link("/v1/incidents", 0, 5, &[("incidentType", "a&b=c")]),
            "/v1/incidents?page=0&size=5&incidentType=a%26b%3Dc"
        );
    }
}
