//! Runner: load configuration, build the registry client, report or prune

use crate::cli::args::Args;
use crate::cli::operation_mode::OperationMode;
use crate::config::Settings;
use crate::error::Result;
use crate::logging::Logger;
use crate::output::{ReportTable, summary_line};
use crate::pruner::{Plan, Pruner};
use crate::registry::{Registry, RegistryClient};
use chrono::{DateTime, Utc};
use std::io::Write;
use std::sync::Arc;

/// Successful run
pub const EXIT_OK: u8 = 0;
/// Bad configuration or an error that stopped the run
pub const EXIT_FAILURE: u8 = 1;
/// Prune finished but at least one deletion failed
pub const EXIT_DELETE_FAILED: u8 = 2;

pub struct Runner {
    args: Args,
    logger: Logger,
}

impl Runner {
    pub fn new(args: Args) -> Self {
        let logger = if args.quiet {
            Logger::new_quiet()
        } else {
            Logger::new(args.verbose)
        };
        Self { args, logger }
    }

    pub fn with_logger(args: Args, logger: Logger) -> Self {
        Self { args, logger }
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Run against the registry named in the configuration; returns the exit status.
    pub async fn run(&self) -> u8 {
        let settings = match Settings::from_file(&self.args.config) {
            Ok(settings) => settings,
            Err(e) => {
                self.logger.error(&e.to_string());
                return EXIT_FAILURE;
            }
        };

        let registry = match self.create_registry_client(&settings) {
            Ok(client) => client,
            Err(e) => {
                self.logger.error(&e.to_string());
                return EXIT_FAILURE;
            }
        };

        // Unlocked handles: workers log to stderr while the run is in flight.
        match self
            .execute(
                settings,
                Arc::new(registry),
                Utc::now(),
                &mut std::io::stdout(),
                &mut std::io::stderr(),
            )
            .await
        {
            Ok(code) => code,
            Err(e) => {
                self.logger.error(&e.to_string());
                EXIT_FAILURE
            }
        }
    }

    fn create_registry_client(&self, settings: &Settings) -> Result<RegistryClient> {
        self.logger.subsection("Setting up registry client");
        let client = RegistryClient::builder(settings.registry.clone())
            .with_credentials(settings.credentials.clone())
            .with_skip_tls(settings.skip_tls)
            .with_timeout(settings.timeout)
            .with_logger(self.logger.clone())
            .build()?;
        self.logger
            .info(&format!("Created registry client for {}", client.address()));
        Ok(client)
    }

    /// Plan against `registry` as of `now`, then report or prune.
    ///
    /// The report table goes to `out`; the keep/delete summary goes to `err`.
    pub async fn execute<O, E>(
        &self,
        settings: Settings,
        registry: Arc<dyn Registry>,
        now: DateTime<Utc>,
        out: &mut O,
        err: &mut E,
    ) -> Result<u8>
    where
        O: Write,
        E: Write,
    {
        let mode = self.args.mode;
        self.logger.section(&format!("registry-pruner: {}", mode.description()));
        for rule in &settings.ruleset {
            self.logger.info(&format!("Loaded rule: {}", rule));
        }

        let pruner = Pruner::new(
            registry,
            settings.ruleset,
            settings.parallelism,
            self.logger.clone(),
        );
        let plan = pruner.plan(now).await?;

        match mode {
            OperationMode::Report => {
                ReportTable::from_classification(&plan.classification, now)
                    .write_to(&mut *out)?;
                writeln!(err, "{}", summary_line(&plan.classification))?;
                self.log_summary(&plan, None);
                Ok(EXIT_OK)
            }
            OperationMode::Prune => {
                self.logger.info(&format!(
                    "Beginning deletion of {} images",
                    plan.delete().len()
                ));
                let report = pruner.execute(&plan).await;
                let line = format!(
                    "Deleted {} images, encountered {} errors",
                    report.deleted,
                    report.errors.len()
                );
                writeln!(err, "{}", line)?;
                self.log_summary(&plan, Some(report.deleted));

                if report.is_clean() {
                    self.logger.success(&line);
                    Ok(EXIT_OK)
                } else {
                    self.logger.warning(&line);
                    Ok(EXIT_DELETE_FAILED)
                }
            }
        }
    }

    fn log_summary(&self, plan: &Plan, deleted: Option<usize>) {
        let mut items = vec![
            ("Kept", plan.keep().len().to_string()),
            ("Marked for deletion", plan.delete().len().to_string()),
            ("Scan failures", plan.scan_failures.len().to_string()),
        ];
        if let Some(deleted) = deleted {
            items.push(("Deleted", deleted.to_string()));
        }
        items.push(("Elapsed", self.logger.elapsed_time()));
        self.logger.summary_kv("Summary", &items);
    }
}
