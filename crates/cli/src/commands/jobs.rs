//! Run scheduled jobs from the command line.
//!
//! Same jobs as `/api/cron/{job}` on the admin binary, for schedulers that
//! prefer a process over an HTTP call.

use atelier_services::config::{EmailConfig, JobSettings, PaymentConfig, RevalidationConfig};
use atelier_services::{
    CatalogInvalidation, EmailError, EmailService, Job, JobRunner, OrderService, PaymentClient,
    RevalidationClient,
};

/// Run one job and log its report.
pub async fn run(name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let job: Job = name.parse()?;
    let pool = super::connect().await?;

    let payments = PaymentClient::new(&PaymentConfig::from_env()?)?;
    let email_config = EmailConfig::from_env()?;
    let email = EmailService::from_config(email_config.as_ref()).map_err(EmailError::from)?;
    let revalidation = RevalidationClient::new(RevalidationConfig::from_env()?)?;
    let orders = OrderService::new(pool.clone(), payments, email)
        .with_catalog(CatalogInvalidation::Remote(revalidation));
    let runner = JobRunner::new(pool, orders, JobSettings::from_env()?);

    let report = runner.run(job).await?;
    tracing::info!(
        job = %report.job,
        examined = report.examined,
        succeeded = report.succeeded,
        failed = report.failed,
        skipped = report.skipped,
        "Job finished"
    );

    if report.failed > 0 {
        return Err(format!("{} of {} items failed", report.failed, report.examined).into());
    }
    Ok(())
}

/// Print the job names.
#[allow(clippy::print_stdout)]
pub fn list() {
    for job in Job::ALL {
        println!("{job}");
    }
}
