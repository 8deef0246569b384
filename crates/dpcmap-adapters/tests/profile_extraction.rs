//! Fixture-driven extraction tests: one captured page per source, asserting
//! the full candidate each parser produces from it.

use dpcmap_adapters::{
    candidate_from_alliance, candidate_from_frontier, extract, parse_alliance_profile,
    parse_frontier_payload, ALLIANCE_SOURCE, FRONTIER_SOURCE,
};
use dpcmap_core::PricingConfidence;

const ALLIANCE_PROFILE_HTML: &str = include_str!("fixtures/alliance_profile.html");
const FRONTIER_PRACTICE_JSON: &[u8] = include_bytes!("fixtures/frontier_practice.json");

#[test]
fn alliance_profile_parses_into_a_full_candidate() {
    let payload = parse_alliance_profile(ALLIANCE_PROFILE_HTML, "example-family-medicine");
    assert_eq!(payload.name.as_deref(), Some("Example Family Medicine"));
    assert_eq!(payload.practice_name.as_deref(), Some("Example Family Medicine, PLLC"));
    assert_eq!(
        payload.address_text.as_deref(),
        Some("123 Main St, Suite 4, Springfield, IL 62704")
    );
    assert_eq!(payload.website.as_deref(), Some("https://examplefamilymed.com"));
    assert_eq!(payload.specialties, vec!["Family Medicine", "Pediatrics"]);

    let cand = candidate_from_alliance(&payload, "https://dpcalliance.org").expect("candidate");
    assert_eq!(cand.source, ALLIANCE_SOURCE);
    assert_eq!(cand.source_id, "example-family-medicine");
    assert_eq!(
        cand.source_url.as_deref(),
        Some("https://dpcalliance.org/providers/example-family-medicine")
    );
    assert_eq!(cand.phone.as_deref(), Some("2175550100"));
    assert_eq!(cand.email.as_deref(), Some("frontdesk@examplefamilymed.com"));
    assert_eq!(
        cand.physicians,
        vec!["Jane Doe".to_string(), "John Smith".to_string()]
    );
    assert_eq!(cand.monthly_fee, Some(150.0));
    assert_eq!(cand.child_monthly_fee, Some(40.0));
    assert_eq!(cand.family_fee, Some(300.0));
    assert_eq!(cand.enrollment_fee, Some(99.0));
    assert_eq!(cand.pricing_confidence, Some(PricingConfidence::High));
    assert_eq!(cand.accepting_patients, Some(true));
    assert_eq!(cand.pricing_tiers.len(), 3);
}

#[test]
fn alliance_profile_free_text_extractors_agree_with_the_dom() {
    let payload = parse_alliance_profile(ALLIANCE_PROFILE_HTML, "example-family-medicine");
    assert_eq!(
        extract::physician_names(&payload.body_text),
        vec!["Jane Doe".to_string(), "John Smith".to_string()]
    );
    assert_eq!(
        extract::emails(&payload.body_text),
        vec!["frontdesk@examplefamilymed.com".to_string()]
    );
}

#[test]
fn malformed_profile_still_yields_a_partial_payload() {
    let payload = parse_alliance_profile("<p>just a paragraph, no structure</p>", "mystery");
    assert_eq!(payload.name, None);
    assert_eq!(payload.address_text, None);
    assert_eq!(payload.phone, None);
    assert!(payload.specialties.is_empty());
    assert_eq!(payload.body_text, "just a paragraph, no structure");
}

#[test]
fn frontier_practice_record_parses_into_a_full_candidate() {
    let payload = parse_frontier_payload(FRONTIER_PRACTICE_JSON).expect("payload parses");
    let cand = candidate_from_frontier(&payload, "https://mapper.dpcfrontier.com").expect("candidate");
    assert_eq!(cand.source, FRONTIER_SOURCE);
    assert_eq!(cand.source_id, "17");
    assert_eq!(cand.name.as_deref(), Some("Example Family Medicine"));
    assert_eq!(cand.practice_name.as_deref(), Some("Example Family Medicine, PLLC"));
    assert_eq!(cand.address.as_deref(), Some("123 Main St, Suite 4"));
    assert_eq!(cand.city.as_deref(), Some("Springfield"));
    assert_eq!(cand.state.as_deref(), Some("IL"));
    assert_eq!(cand.zip_code.as_deref(), Some("62704"));
    assert_eq!(cand.latitude, Some(39.7989));
    assert_eq!(cand.longitude, Some(-89.6443));
    assert_eq!(cand.phone.as_deref(), Some("2175550100"));
    assert_eq!(cand.website.as_deref(), Some("https://examplefamilymed.com"));
    assert_eq!(cand.email.as_deref(), Some("frontdesk@examplefamilymed.com"));
    assert_eq!(cand.monthly_fee, Some(150.0));
    assert_eq!(cand.accepting_patients, Some(true));
}
