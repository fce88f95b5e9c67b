//! Tests for cardinality requests

use session_agenda::core::{
    CardinalityConfig, CardinalityRequest, DisplayRequest, ResourceCardinality, ResourceCatalog,
    ResourceSetFlag, SchedulerError, TokenCapacity, UNLIMITED_TOKENS,
};
use session_agenda::infra::InMemoryCatalog;

fn catalog() -> InMemoryCatalog {
    InMemoryCatalog::new()
        .add_resource(1, "valve", TokenCapacity::Limited(1))
        .and_then(|c| c.add_resource(2, "hv", TokenCapacity::Limited(3)))
        .and_then(|c| c.add_resource(3, "monitor", TokenCapacity::Unlimited))
        .and_then(|c| c.add_role(1, "operator", [1, 2, 3], []))
        .unwrap()
}

#[test]
fn test_setters_and_queries() {
    let mut request = CardinalityRequest::new();
    let mut card = ResourceCardinality::new(&mut request);
    card.set_limited_resource(2, 3);
    assert_eq!(card.at(2).unwrap(), 3);
    assert!(card.has_limited_resource(2));

    card.unset_resource(2);
    assert_eq!(card.at(2).unwrap(), 0);
    assert!(card.has_unset_resource(2));

    card.set_unlimited_resource(3);
    assert!(card.has_unlimited_resource(3));
    assert_eq!(card.at(9).unwrap_err(), SchedulerError::MissingCardinality(9));
}

#[test]
fn test_role_overrides_win() {
    let catalog = catalog();
    let role = catalog.role("operator").unwrap();
    let overrides: CardinalityRequest = [(1, 0), (2, 2)].into_iter().collect();
    let mut request = CardinalityRequest::new();
    ResourceCardinality::new(&mut request)
        .build_from_role(&catalog, role, ResourceSetFlag::Functional, &overrides)
        .unwrap();
    assert_eq!(request.get(&1), Some(&0));
    assert_eq!(request.get(&2), Some(&2));
    assert_eq!(request.get(&3), Some(&UNLIMITED_TOKENS));
    assert_eq!(
        DisplayRequest(&request).to_string(),
        "{1: unset, 2: 2, 3: unlimited}"
    );
}

#[test]
fn test_role_override_kind_mismatch() {
    let catalog = catalog();
    let role = catalog.role("operator").unwrap();
    let overrides: CardinalityRequest = [(3, 2)].into_iter().collect();
    let mut request = CardinalityRequest::new();
    let err = ResourceCardinality::new(&mut request)
        .build_from_role(&catalog, role, ResourceSetFlag::Functional, &overrides)
        .unwrap_err();
    assert_eq!(err.resource_id(), Some(3));
    assert!(request.is_empty());
}

#[test]
fn test_configure_from_names() {
    let catalog = catalog();
    let config = CardinalityConfig {
        unset: vec!["valve".into()],
        unlimited: vec!["monitor".into()],
        limited: vec!["hv=2".into()],
    };
    let mut request = CardinalityRequest::new();
    ResourceCardinality::new(&mut request)
        .configure(&config, Some(&catalog))
        .unwrap();
    assert_eq!(request.get(&1), Some(&0));
    assert_eq!(request.get(&2), Some(&2));
    assert_eq!(request.get(&3), Some(&UNLIMITED_TOKENS));

    let too_many = CardinalityConfig {
        limited: vec!["hv=4".into()],
        ..CardinalityConfig::default()
    };
    let err = ResourceCardinality::new(&mut request)
        .configure(&too_many, Some(&catalog))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::CapacityExceeded { id: 2, .. }));
    assert!(request.is_empty());
}
