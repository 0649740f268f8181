use std::path::PathBuf;

use chrono::{Local, NaiveDate, Utc};
use clap::Args;

use crate::infra::{build_cascade, parse_date, CascadeHandles};
use prevcare::cascade::art::ClinicVisit;
use prevcare::cascade::billing::BillableService;
use prevcare::cascade::domain::{
    PatientId, Principal, ProgramRole, TestCenterId, TestOutcome,
};
use prevcare::cascade::results::TestKind;
use prevcare::cascade::CascadeError;
use prevcare::config::AppConfig;
use prevcare::error::AppError;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Override the demo's reference date (YYYY-MM-DD, defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Skip the ART enrollment and adherence portion of the demo
    #[arg(long)]
    pub(crate) skip_art: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct BillingExportArgs {
    /// Write the CSV to a file instead of stdout
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
    /// Seed the ledger with the demo cascade before exporting
    #[arg(long)]
    pub(crate) seed_demo: bool,
}

fn counselor() -> Principal {
    Principal::new("demo-counselor", ProgramRole::Counselor)
}

fn officer() -> Principal {
    Principal::new("demo-billing", ProgramRole::BillingOfficer)
}

/// Answers that land in the high tier under the standard rule table.
const DEMO_ANSWERS: [(&str, bool); 7] = [
    ("shared_needles", true),
    ("partner_positive", true),
    ("unprotected_sex", true),
    ("multiple_partners", true),
    ("transactional_sex", true),
    ("sti_history", true),
    ("tested_before", false),
];

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { today, skip_art } = args;
    let today = today.unwrap_or_else(|| Local::now().date_naive());

    let config = AppConfig::load()?;
    let handles = build_cascade(&config.program);
    let services = &handles.services;
    let now = Utc::now();

    let patient_id = PatientId("PT-2025-0001".to_string());
    handles
        .billing
        .register_patient(patient_id.clone(), "Amahle Dlamini");

    println!("Care cascade demo (reference date {today})");

    println!("\nRisk assessment");
    let assessment = services
        .assessments
        .start(&patient_id, now)
        .map_err(CascadeError::from)?;
    println!("- Started assessment {}", assessment.id.0);

    let mut final_outcome = None;
    for (question, answer) in DEMO_ANSWERS {
        final_outcome = Some(
            services
                .assessments
                .submit_response(&assessment.id, question, answer, &counselor(), now)
                .map_err(CascadeError::from)?,
        );
    }
    let outcome = match final_outcome {
        Some(outcome) => outcome,
        None => return Ok(()),
    };
    let completed = &outcome.assessment;
    println!(
        "- Completed with score {} -> tier {}",
        completed.total_score.unwrap_or_default(),
        completed
            .risk_tier
            .map(|tier| tier.label())
            .unwrap_or("unknown"),
    );

    let referral = match outcome.referral {
        Some(referral) => referral,
        None => {
            println!("- Low risk: no referral opened, demo ends here");
            return Ok(());
        }
    };
    println!(
        "- Referral {} opened (code {}, expires {})",
        referral.id.0,
        referral.code,
        referral.expires_at.date_naive()
    );

    println!("\nReferral lifecycle");
    services
        .referrals
        .mark_sent(&referral.id, now)
        .map_err(CascadeError::from)?;
    services
        .referrals
        .mark_received(&referral.id, now)
        .map_err(CascadeError::from)?;
    let scheduled = services
        .referrals
        .schedule(&referral.id, TestCenterId("tc-001".to_string()), now)
        .map_err(CascadeError::from)?;
    println!(
        "- Scheduled at center {}",
        scheduled
            .test_center_id
            .as_ref()
            .map(|id| id.0.as_str())
            .unwrap_or("unknown")
    );

    println!("\nTest result");
    let recorded = services
        .recorder
        .record(
            &referral.id,
            TestOutcome::Positive,
            TestKind::Elisa,
            today,
            &counselor(),
            now,
        )
        .map_err(CascadeError::from)?;
    println!(
        "- Recorded positive result {} (referral now {})",
        recorded.result.id.0,
        recorded.referral_status.label()
    );
    services
        .recorder
        .confirm(&recorded.result.id, now)
        .map_err(CascadeError::from)?;
    println!("- Positive result confirmed");

    if !skip_art {
        println!("\nART enrollment");
        match &recorded.enrollment {
            Some(enrollment) => println!(
                "- Enrolled as {} (status {})",
                enrollment.id.0,
                enrollment.status.label()
            ),
            None => {
                println!("- No enrollment was created, skipping ART portion");
                return Ok(());
            }
        }

        services
            .art
            .start_treatment(&patient_id, "TDF/3TC/DTG".to_string(), today)
            .map_err(CascadeError::from)?;
        services
            .art
            .record_clinic_visit(
                &patient_id,
                ClinicVisit {
                    regimen: None,
                    next_appointment: Some(today + chrono::Duration::days(30)),
                },
            )
            .map_err(CascadeError::from)?;
        let level = services
            .art
            .log_adherence(&patient_id, today, 0)
            .map_err(CascadeError::from)?;
        println!("- Treatment started; adherence {}", level.label());
    }

    println!("\nBilling ledger");
    let summary = services
        .ledger
        .summary_for(&patient_id)
        .map_err(CascadeError::from)?;
    let remaining = services
        .ledger
        .remaining_billable_amount(&patient_id)
        .map_err(CascadeError::from)?;
    println!(
        "- Total billed {} | remaining {} | cap reached: {}",
        summary.total, remaining, summary.cap_reached
    );

    match services.ledger.record_event(
        &patient_id,
        BillableService::TestResultLogged,
        prevcare::cascade::billing::EventReference::TestResults(recorded.result.id.clone()),
        &officer(),
        now,
    ) {
        Ok(_) => println!("- Unexpected: repeat billing accepted"),
        Err(err) => println!("- Repeat billing attempt rejected: {err}"),
    }

    let intents = handles.dispatcher.intents();
    println!("\nNotification intents handed to the messaging collaborator:");
    for intent in &intents {
        println!(
            "  - {} -> {} ({} variables)",
            intent.category.label(),
            intent.patient_id.0,
            intent.variables.len()
        );
    }

    println!(
        "\nAudit trail: {} entries (accepted and rejected billing attempts included)",
        handles.audit.entries().len()
    );

    let rendered = services
        .ledger
        .export_csv(None, &officer(), now)
        .map_err(CascadeError::from)?;
    println!("\nPayer CSV:\n{rendered}");

    Ok(())
}

pub(crate) fn run_billing_export(args: BillingExportArgs) -> Result<(), AppError> {
    let BillingExportArgs { output, seed_demo } = args;

    let config = AppConfig::load()?;
    let handles = build_cascade(&config.program);
    let now = Utc::now();

    if seed_demo {
        seed_cascade(&handles)?;
    }

    let rendered = handles
        .services
        .ledger
        .export_csv(None, &officer(), now)
        .map_err(CascadeError::from)?;

    match output {
        Some(path) => {
            std::fs::write(&path, rendered.as_bytes())?;
            println!("Billing CSV written to {}", path.display());
        }
        None => print!("{rendered}"),
    }

    Ok(())
}

/// Drive one patient through the whole cascade so the export has content.
fn seed_cascade(handles: &CascadeHandles) -> Result<(), AppError> {
    let services = &handles.services;
    let now = Utc::now();
    let today = Local::now().date_naive();

    let patient_id = PatientId("PT-2025-0001".to_string());
    handles
        .billing
        .register_patient(patient_id.clone(), "Amahle Dlamini");

    let assessment = services
        .assessments
        .start(&patient_id, now)
        .map_err(CascadeError::from)?;
    let mut outcome = None;
    for (question, answer) in DEMO_ANSWERS {
        outcome = Some(
            services
                .assessments
                .submit_response(&assessment.id, question, answer, &counselor(), now)
                .map_err(CascadeError::from)?,
        );
    }
    let referral = match outcome.and_then(|outcome| outcome.referral) {
        Some(referral) => referral,
        None => return Ok(()),
    };

    services
        .referrals
        .mark_sent(&referral.id, now)
        .map_err(CascadeError::from)?;
    services
        .referrals
        .mark_received(&referral.id, now)
        .map_err(CascadeError::from)?;
    services
        .referrals
        .schedule(&referral.id, TestCenterId("tc-001".to_string()), now)
        .map_err(CascadeError::from)?;
    services
        .recorder
        .record(
            &referral.id,
            TestOutcome::Positive,
            TestKind::Elisa,
            today,
            &counselor(),
            now,
        )
        .map_err(CascadeError::from)?;

    Ok(())
}
