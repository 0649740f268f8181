use chrono::NaiveDate;

use super::common::*;
use crate::cascade::audit::AuditAction;
use crate::cascade::billing::{
    BillableService, BillingError, BillingPeriodStatus, EventReference, BILLING_CAP, CSV_HEADER,
};
use crate::cascade::domain::{AssessmentId, ArtPatientId, TestResultId};

fn questionnaire_ref(id: &str) -> EventReference {
    EventReference::Assessments(AssessmentId(id.to_string()))
}

fn result_ref(id: &str) -> EventReference {
    EventReference::TestResults(TestResultId(id.to_string()))
}

fn art_ref(id: &str) -> EventReference {
    EventReference::ArtPatients(ArtPatientId(id.to_string()))
}

#[test]
fn repeat_service_is_rejected_and_the_total_holds() {
    let (services, _, _, _, _) = build_services();
    let patient_id = patient("p-5001");

    services
        .ledger
        .record_event(
            &patient_id,
            BillableService::QuestionnaireDelivered,
            questionnaire_ref("asm-1"),
            &billing_officer(),
            now(),
        )
        .expect("questionnaire billed");
    services
        .ledger
        .record_event(
            &patient_id,
            BillableService::TestResultLogged,
            result_ref("tst-1"),
            &billing_officer(),
            now(),
        )
        .expect("test result billed");
    assert_eq!(services.ledger.total_billed(&patient_id).expect("total"), 350);

    match services.ledger.record_event(
        &patient_id,
        BillableService::TestResultLogged,
        result_ref("tst-2"),
        &billing_officer(),
        now(),
    ) {
        Err(BillingError::AlreadyBilled { service }) => {
            assert_eq!(service, BillableService::TestResultLogged);
        }
        other => panic!("expected already-billed rejection, got {other:?}"),
    }
    assert_eq!(services.ledger.total_billed(&patient_id).expect("total"), 350);
}

#[test]
fn all_three_services_reach_the_cap_and_everything_after_is_rejected() {
    let (services, _, _, _, _) = build_services();
    let patient_id = patient("p-5002");

    services
        .ledger
        .record_event(
            &patient_id,
            BillableService::QuestionnaireDelivered,
            questionnaire_ref("asm-1"),
            &billing_officer(),
            now(),
        )
        .expect("150 billed");
    services
        .ledger
        .record_event(
            &patient_id,
            BillableService::TestResultLogged,
            result_ref("tst-1"),
            &billing_officer(),
            now(),
        )
        .expect("200 billed");
    services
        .ledger
        .record_event(
            &patient_id,
            BillableService::ArtStarted,
            art_ref("art-1"),
            &billing_officer(),
            now(),
        )
        .expect("500 billed");

    assert_eq!(
        services.ledger.total_billed(&patient_id).expect("total"),
        BILLING_CAP
    );
    assert_eq!(
        services
            .ledger
            .remaining_billable_amount(&patient_id)
            .expect("remaining"),
        0
    );

    for service in BillableService::all() {
        match services.ledger.record_event(
            &patient_id,
            service,
            questionnaire_ref("asm-2"),
            &billing_officer(),
            now(),
        ) {
            Err(BillingError::CapReached { remaining, .. }) => assert_eq!(remaining, 0),
            other => panic!("expected cap rejection for {service}, got {other:?}"),
        }
    }
    assert_eq!(
        services.ledger.total_billed(&patient_id).expect("total"),
        BILLING_CAP
    );
}

#[test]
fn remaining_amount_tracks_the_running_total() {
    let (services, _, _, _, _) = build_services();
    let patient_id = patient("p-5003");

    assert_eq!(
        services
            .ledger
            .remaining_billable_amount(&patient_id)
            .expect("remaining"),
        BILLING_CAP
    );

    services
        .ledger
        .record_event(
            &patient_id,
            BillableService::QuestionnaireDelivered,
            questionnaire_ref("asm-1"),
            &billing_officer(),
            now(),
        )
        .expect("billed");

    assert_eq!(
        services
            .ledger
            .remaining_billable_amount(&patient_id)
            .expect("remaining"),
        700
    );
}

#[test]
fn rejections_are_audited_alongside_acceptances() {
    let (services, _, _, audit, _) = build_services();
    let patient_id = patient("p-5004");

    services
        .ledger
        .record_event(
            &patient_id,
            BillableService::ArtStarted,
            art_ref("art-1"),
            &billing_officer(),
            now(),
        )
        .expect("accepted");
    let _ = services.ledger.record_event(
        &patient_id,
        BillableService::ArtStarted,
        art_ref("art-1"),
        &billing_officer(),
        now(),
    );

    let entries = audit.entries();
    assert!(entries
        .iter()
        .any(|entry| entry.action == AuditAction::BillingAccepted));
    assert!(entries
        .iter()
        .any(|entry| entry.action == AuditAction::BillingRejected));
}

#[test]
fn summary_is_recomputed_from_events() {
    let (services, _, _, _, _) = build_services();
    let patient_id = patient("p-5005");

    services
        .ledger
        .record_event(
            &patient_id,
            BillableService::QuestionnaireDelivered,
            questionnaire_ref("asm-1"),
            &billing_officer(),
            now(),
        )
        .expect("billed");
    services
        .ledger
        .record_event(
            &patient_id,
            BillableService::ArtStarted,
            art_ref("art-1"),
            &billing_officer(),
            now(),
        )
        .expect("billed");

    let summary = services.ledger.summary_for(&patient_id).expect("summary");
    assert_eq!(summary.total, 650);
    assert!(summary.questionnaire_billed);
    assert!(!summary.test_result_billed);
    assert!(summary.art_billed);
    assert!(!summary.cap_reached);
}

#[test]
fn superseding_reopens_the_service_slot() {
    let (services, _, _, _, _) = build_services();
    let patient_id = patient("p-5006");

    let event = services
        .ledger
        .record_event(
            &patient_id,
            BillableService::TestResultLogged,
            result_ref("tst-1"),
            &billing_officer(),
            now(),
        )
        .expect("billed");

    services
        .ledger
        .supersede_event(&event.id, &billing_officer(), now())
        .expect("superseded");
    assert_eq!(services.ledger.total_billed(&patient_id).expect("total"), 0);

    services
        .ledger
        .record_event(
            &patient_id,
            BillableService::TestResultLogged,
            result_ref("tst-2"),
            &billing_officer(),
            now(),
        )
        .expect("slot reopened");
}

#[test]
fn open_period_collects_events_and_advances_forward_only() {
    let (services, _, _, _, _) = build_services();
    let patient_id = patient("p-5007");

    let period = services
        .ledger
        .open_period(
            NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid"),
            NaiveDate::from_ymd_opt(2025, 6, 30).expect("valid"),
            &billing_officer(),
            now(),
        )
        .expect("period opens");

    assert!(matches!(
        services.ledger.open_period(
            NaiveDate::from_ymd_opt(2025, 7, 1).expect("valid"),
            NaiveDate::from_ymd_opt(2025, 7, 31).expect("valid"),
            &billing_officer(),
            now(),
        ),
        Err(BillingError::PeriodAlreadyOpen)
    ));

    let event = services
        .ledger
        .record_event(
            &patient_id,
            BillableService::QuestionnaireDelivered,
            questionnaire_ref("asm-1"),
            &billing_officer(),
            now(),
        )
        .expect("billed into the period");
    assert_eq!(event.period_id.as_ref(), Some(&period.id));

    let approved = services
        .ledger
        .advance_period(&period.id, BillingPeriodStatus::Approved, &billing_officer(), now())
        .expect("approved");
    assert_eq!(approved.total_billed, 150);
    assert_eq!(approved.event_count, 1);

    services
        .ledger
        .advance_period(&period.id, BillingPeriodStatus::Paid, &billing_officer(), now())
        .expect("paid");

    match services.ledger.advance_period(
        &period.id,
        BillingPeriodStatus::Disputed,
        &billing_officer(),
        now(),
    ) {
        Err(BillingError::InvalidPeriodTransition { from, to }) => {
            assert_eq!((from, to), ("paid", "disputed"));
        }
        other => panic!("expected sticky paid status, got {other:?}"),
    }
}

#[test]
fn csv_export_renders_header_and_two_decimal_amounts() {
    let (services, _, billing, _, _) = build_services();
    let patient_id = patient("p-5008");
    billing.register_patient(patient_id.clone(), "Amahle Dlamini");

    services
        .ledger
        .record_event(
            &patient_id,
            BillableService::QuestionnaireDelivered,
            questionnaire_ref("asm-1"),
            &billing_officer(),
            now(),
        )
        .expect("billed");
    services
        .ledger
        .record_event(
            &patient_id,
            BillableService::TestResultLogged,
            result_ref("tst-1"),
            &billing_officer(),
            now(),
        )
        .expect("billed");

    let rendered = services
        .ledger
        .export_csv(None, &billing_officer(), now())
        .expect("export succeeds");

    let lines: Vec<&str> = rendered.lines().collect();
    assert_eq!(lines.len(), 3, "header plus one row per service");
    assert_eq!(lines[0], CSV_HEADER.join(","));
    assert!(lines[1].contains("Amahle Dlamini"));
    assert!(lines[1].contains("150.00"));
    assert!(lines[2].contains("200.00"));
    assert!(!rendered.contains('$'));
}

#[test]
fn report_and_export_are_audited_actions() {
    let (services, _, _, audit, _) = build_services();
    let patient_id = patient("p-5009");

    services
        .ledger
        .record_event(
            &patient_id,
            BillableService::QuestionnaireDelivered,
            questionnaire_ref("asm-1"),
            &billing_officer(),
            now(),
        )
        .expect("billed");

    services
        .ledger
        .generate_report(None, &billing_officer(), now())
        .expect("report");
    services
        .ledger
        .export_csv(None, &billing_officer(), now())
        .expect("export");

    let entries = audit.entries();
    assert!(entries
        .iter()
        .any(|entry| entry.action == AuditAction::ReportGenerated));
    assert!(entries
        .iter()
        .any(|entry| entry.action == AuditAction::CsvExported));
}

#[test]
fn report_groups_events_by_patient() {
    let (services, _, _, _, _) = build_services();
    let first = patient("p-5010");
    let second = patient("p-5011");

    for (patient_id, reference) in [(&first, "asm-a"), (&second, "asm-b")] {
        services
            .ledger
            .record_event(
                patient_id,
                BillableService::QuestionnaireDelivered,
                questionnaire_ref(reference),
                &billing_officer(),
                now(),
            )
            .expect("billed");
    }
    services
        .ledger
        .record_event(
            &second,
            BillableService::TestResultLogged,
            result_ref("tst-b"),
            &billing_officer(),
            now(),
        )
        .expect("billed");

    let report = services
        .ledger
        .generate_report(None, &billing_officer(), now())
        .expect("report");
    assert_eq!(report.statements.len(), 2);
    assert_eq!(report.total, 500);

    let second_statement = report
        .statements
        .iter()
        .find(|statement| statement.patient_id == second)
        .expect("second patient present");
    assert_eq!(second_statement.lines.len(), 2);
    assert_eq!(second_statement.total, 350);
}
