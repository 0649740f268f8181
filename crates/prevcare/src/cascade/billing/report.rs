use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::domain::{BillableService, BillingEvent, BILLING_CAP};
use super::ledger::{BillingError, BillingLedger};
use crate::cascade::audit::{AuditAction, AuditEntry, AuditTrail};
use crate::cascade::domain::{BillingPeriodId, PatientId, Principal};
use crate::cascade::repository::{BillingStore, PatientRegistry};

pub const CSV_HEADER: [&str; 6] = [
    "Patient ID",
    "Patient Name",
    "Service Type",
    "Amount",
    "Date",
    "Reference Number",
];

/// One accepted service on a patient statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementLine {
    pub service: BillableService,
    pub amount: u32,
    pub date: NaiveDate,
    pub reference: String,
}

/// Accepted events for one patient, grouped for the payer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientStatement {
    pub patient_id: PatientId,
    pub patient_name: String,
    pub lines: Vec<StatementLine>,
    pub total: u32,
    pub cap_reached: bool,
}

/// Read-only projection of the ledger, grouped by patient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillingReport {
    pub period_id: Option<BillingPeriodId>,
    pub generated_at: DateTime<Utc>,
    pub statements: Vec<PatientStatement>,
    pub total: u32,
}

impl<B, A> BillingLedger<B, A>
where
    B: BillingStore + PatientRegistry + 'static,
    A: AuditTrail + 'static,
{
    /// Group accepted events by patient. Report generation mutates nothing
    /// but is itself an auditable action under the program's privacy
    /// compliance requirements.
    pub fn generate_report(
        &self,
        period_id: Option<&BillingPeriodId>,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Result<BillingReport, BillingError> {
        let report = self.build_report(period_id, now)?;

        self.append_audit(AuditEntry {
            principal: principal.clone(),
            action: AuditAction::ReportGenerated,
            patient_id: None,
            detail: format!(
                "billing report generated ({} patients, {} units)",
                report.statements.len(),
                report.total
            ),
            before: None,
            after: None,
            recorded_at: now,
        });

        Ok(report)
    }

    /// Render the payer CSV: one row per (patient, service), amounts with
    /// two decimals and no currency symbol, header row mandatory.
    pub fn export_csv(
        &self,
        period_id: Option<&BillingPeriodId>,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Result<String, BillingError> {
        let report = self.build_report(period_id, now)?;

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(CSV_HEADER)
            .map_err(|error| BillingError::Export(error.to_string()))?;

        for statement in &report.statements {
            for line in &statement.lines {
                let amount = format!("{:.2}", f64::from(line.amount));
                let date = line.date.format("%Y-%m-%d").to_string();
                writer
                    .write_record([
                        statement.patient_id.0.as_str(),
                        statement.patient_name.as_str(),
                        line.service.label(),
                        amount.as_str(),
                        date.as_str(),
                        line.reference.as_str(),
                    ])
                    .map_err(|error| BillingError::Export(error.to_string()))?;
            }
        }

        let bytes = writer
            .into_inner()
            .map_err(|error| BillingError::Export(error.to_string()))?;
        let rendered =
            String::from_utf8(bytes).map_err(|error| BillingError::Export(error.to_string()))?;

        self.append_audit(AuditEntry {
            principal: principal.clone(),
            action: AuditAction::CsvExported,
            patient_id: None,
            detail: format!("billing CSV exported ({} patients)", report.statements.len()),
            before: None,
            after: None,
            recorded_at: now,
        });

        Ok(rendered)
    }

    fn build_report(
        &self,
        period_id: Option<&BillingPeriodId>,
        now: DateTime<Utc>,
    ) -> Result<BillingReport, BillingError> {
        let events = self.store().all_events()?;
        let mut grouped: BTreeMap<PatientId, Vec<&BillingEvent>> = BTreeMap::new();

        for event in events.iter().filter(|event| !event.superseded) {
            if let Some(period_id) = period_id {
                if event.period_id.as_ref() != Some(period_id) {
                    continue;
                }
            }
            grouped.entry(event.patient_id.clone()).or_default().push(event);
        }

        let mut statements = Vec::with_capacity(grouped.len());
        let mut grand_total = 0u32;

        for (patient_id, mut events) in grouped {
            events.sort_by_key(|event| event.created_at);

            let patient_name = self
                .store()
                .patient_name(&patient_id)?
                .unwrap_or_else(|| patient_id.0.clone());

            let lines: Vec<StatementLine> = events
                .iter()
                .map(|event| StatementLine {
                    service: event.service,
                    amount: event.amount,
                    date: event.created_at.date_naive(),
                    reference: event.reference.reference_id().to_string(),
                })
                .collect();

            let total: u32 = lines.iter().map(|line| line.amount).sum();
            grand_total += total;

            statements.push(PatientStatement {
                patient_id,
                patient_name,
                lines,
                total,
                cap_reached: total >= BILLING_CAP,
            });
        }

        Ok(BillingReport {
            period_id: period_id.cloned(),
            generated_at: now,
            statements,
            total: grand_total,
        })
    }
}
