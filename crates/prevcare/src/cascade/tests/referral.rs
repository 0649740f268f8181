use std::collections::HashSet;

use chrono::Duration;

use super::common::*;
use crate::cascade::messaging::TemplateCategory;
use crate::cascade::referral::{ReferralError, ReferralStatus, REFERRAL_CODE_LENGTH};
use crate::cascade::domain::TestCenterId;

#[test]
fn codes_are_fixed_length_and_unique() {
    let (services, _, _, _, _) = build_services();

    let mut codes = HashSet::new();
    for index in 0..25 {
        let patient_id = patient(&format!("p-20{index:02}"));
        let outcome = run_assessment(&services, &patient_id, &high_risk_answers());
        let referral = outcome.referral.expect("referral opened");
        assert_eq!(referral.code.len(), REFERRAL_CODE_LENGTH);
        assert!(codes.insert(referral.code), "code reused");
    }
}

#[test]
fn lifecycle_advances_through_the_nominal_path() {
    let (services, _, _, _, _) = build_services();
    let patient_id = patient("p-2101");
    let outcome = run_assessment(&services, &patient_id, &high_risk_answers());
    let referral = outcome.referral.expect("referral opened");
    assert_eq!(referral.status, ReferralStatus::Pending);

    let referral = services
        .referrals
        .mark_sent(&referral.id, now())
        .expect("sent");
    assert_eq!(referral.status, ReferralStatus::Sent);

    let referral = services
        .referrals
        .mark_received(&referral.id, now())
        .expect("received");
    assert_eq!(referral.status, ReferralStatus::Received);

    let referral = services
        .referrals
        .schedule(&referral.id, TestCenterId("tc-001".to_string()), now())
        .expect("scheduled");
    assert_eq!(referral.status, ReferralStatus::Scheduled);
    assert!(referral.test_center_id.is_some());
}

#[test]
fn skipping_ahead_is_rejected() {
    let (services, _, _, _, _) = build_services();
    let patient_id = patient("p-2102");
    let referral = run_assessment(&services, &patient_id, &high_risk_answers())
        .referral
        .expect("referral opened");

    match services.referrals.mark_received(&referral.id, now()) {
        Err(ReferralError::InvalidTransition { from, to }) => {
            assert_eq!((from, to), ("pending", "received"));
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
}

#[test]
fn expired_pending_referral_reads_unusable_without_a_sweep() {
    let (services, _, _, _, _) = build_services();
    let patient_id = patient("p-2103");
    let referral = run_assessment(&services, &patient_id, &high_risk_answers())
        .referral
        .expect("referral opened");

    let after_expiry = now() + Duration::days(31);
    assert!(!referral.is_open(after_expiry));
    assert_eq!(referral.effective_status_label(after_expiry), "expired");

    match services.referrals.mark_sent(&referral.id, after_expiry) {
        Err(ReferralError::NotOpen { status }) => assert_eq!(status, "expired"),
        other => panic!("expected not-open rejection, got {other:?}"),
    }
}

#[test]
fn terminal_states_never_change_again() {
    let (services, _, _, _, _) = build_services();
    let patient_id = patient("p-2104");
    let referral = run_assessment(&services, &patient_id, &high_risk_answers())
        .referral
        .expect("referral opened");

    services
        .referrals
        .cancel(&referral.id, now())
        .expect("cancelled");

    match services.referrals.mark_sent(&referral.id, now()) {
        Err(ReferralError::NotOpen { status }) => assert_eq!(status, "cancelled"),
        other => panic!("expected not-open rejection, got {other:?}"),
    }
}

#[test]
fn missed_appointment_can_be_recorded_before_scheduling() {
    let (services, _, _, _, _) = build_services();
    let patient_id = patient("p-2105");
    let referral = run_assessment(&services, &patient_id, &high_risk_answers())
        .referral
        .expect("referral opened");

    services
        .referrals
        .mark_sent(&referral.id, now())
        .expect("sent");
    let referral = services
        .referrals
        .mark_no_show(&referral.id, now())
        .expect("no-show from sent");
    assert_eq!(referral.status, ReferralStatus::NoShow);
}

#[test]
fn tested_is_not_reachable_through_the_lifecycle_table() {
    for status in [
        ReferralStatus::Pending,
        ReferralStatus::Sent,
        ReferralStatus::Received,
        ReferralStatus::Scheduled,
    ] {
        assert!(!status.can_transition_to(ReferralStatus::Tested));
    }
}

#[test]
fn scheduling_enriches_the_notification_with_center_details() {
    let (services, _, _, _, dispatcher) = build_services();
    let patient_id = patient("p-2106");
    scheduled_referral(&services, &patient_id);

    let scheduled: Vec<_> = dispatcher
        .intents()
        .into_iter()
        .filter(|intent| intent.category == TemplateCategory::ReferralScheduled)
        .collect();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(
        scheduled[0].variables.get("center_name").map(String::as_str),
        Some("Harborview Community Clinic")
    );
    assert!(scheduled[0].variables.contains_key("center_phone"));
}

#[test]
fn referrals_resolve_by_code() {
    let (services, _, _, _, _) = build_services();
    let patient_id = patient("p-2107");
    let referral = run_assessment(&services, &patient_id, &high_risk_answers())
        .referral
        .expect("referral opened");

    let found = services
        .referrals
        .find_by_code(&referral.code)
        .expect("code resolves");
    assert_eq!(found.id, referral.id);
}
