// Background worker registration reconciler
//
// A page can end up with several worker registrations (renamed scripts, old
// deployments under another path). Before registering the current script the
// reconciler looks for registrations that do not run it and, with the user's
// consent, unregisters them. Register is then always invoked with the desired
// script, whether or not cleanup happened.

use async_trait::async_trait;
use std::rc::Rc;

use crate::prompt::UserPrompt;
use crate::Result;

pub const CLEANUP_PROMPT: &str = "Multiple service workers detected. Unregister outdated ones now?";

/// Script URLs held by a registration's worker slots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationInfo {
    pub scope: String,
    pub active: Option<String>,
    pub waiting: Option<String>,
    pub installing: Option<String>,
}

impl RegistrationInfo {
    pub fn scripts(&self) -> impl Iterator<Item = &str> {
        [&self.active, &self.waiting, &self.installing]
            .into_iter()
            .filter_map(|s| s.as_deref())
    }

    /// True when any slot runs `script_url`.
    pub fn runs(&self, script_url: &str) -> bool {
        self.scripts().any(|s| s == script_url)
    }
}

/// Worker registration API of the page's platform.
#[async_trait(?Send)]
pub trait RegistrationPlatform {
    type Registration;

    /// Absolute URL of `script` relative to the current page.
    fn resolve_script_url(&self, script: &str) -> Result<String>;

    async fn registrations(&self) -> Result<Vec<Self::Registration>>;

    fn describe(&self, registration: &Self::Registration) -> RegistrationInfo;

    /// `Ok(false)` when the platform reports nothing was unregistered.
    async fn unregister(&self, registration: &Self::Registration) -> Result<bool>;

    async fn register(&self, script_url: &str) -> Result<()>;
}

/// Indices of registrations that do and do not run the desired script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub matching: Vec<usize>,
    pub stale: Vec<usize>,
}

/// Partition registrations. Nothing is ever stale unless there are at least two.
pub fn plan(desired_url: &str, registrations: &[RegistrationInfo]) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();
    for (idx, info) in registrations.iter().enumerate() {
        if info.runs(desired_url) || registrations.len() < 2 {
            plan.matching.push(idx);
        } else {
            plan.stale.push(idx);
        }
    }
    plan
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub desired_url: Option<String>,
    pub registrations_seen: usize,
    pub stale_found: usize,
    pub unregistered: usize,
    pub consent_declined: bool,
    /// Non-fatal unregister failures
    pub failures: Vec<String>,
    pub registered: bool,
    /// Fatal error that stopped the run
    pub error: Option<String>,
}

pub struct WorkerReconciler<P: RegistrationPlatform> {
    platform: P,
    prompt: Rc<dyn UserPrompt>,
    script: String,
}

impl<P: RegistrationPlatform> WorkerReconciler<P> {
    pub fn new(platform: P, prompt: Rc<dyn UserPrompt>, script: impl Into<String>) -> Self {
        Self {
            platform,
            prompt,
            script: script.into(),
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Reconcile and register. Errors are logged and recorded in the report,
    /// never returned.
    pub async fn run(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        if let Err(e) = self.reconcile(&mut report).await {
            tracing::error!("worker registration failed: {}", e);
            report.error = Some(e.to_string());
        }
        report
    }

    async fn reconcile(&self, report: &mut ReconcileReport) -> Result<()> {
        let desired = self.platform.resolve_script_url(&self.script)?;
        tracing::debug!("desired worker url {}", desired);
        report.desired_url = Some(desired.clone());

        let registrations = self.platform.registrations().await?;
        report.registrations_seen = registrations.len();
        let infos: Vec<RegistrationInfo> = registrations
            .iter()
            .map(|r| self.platform.describe(r))
            .collect();
        tracing::debug!("existing worker registrations: {:?}", infos);

        let plan = plan(&desired, &infos);
        report.stale_found = plan.stale.len();

        if !plan.stale.is_empty() {
            tracing::warn!(
                "{} registrations do not run {}",
                plan.stale.len(),
                desired
            );
            if self.prompt.confirm(CLEANUP_PROMPT) {
                for idx in &plan.stale {
                    self.unregister_one(&registrations[*idx], &infos[*idx], report)
                        .await;
                }
            } else {
                tracing::info!("Keeping outdated worker registrations");
                report.consent_declined = true;
            }
        }

        self.platform.register(&desired).await?;
        report.registered = true;
        tracing::info!("worker registered: {}", desired);
        Ok(())
    }

    async fn unregister_one(
        &self,
        registration: &P::Registration,
        info: &RegistrationInfo,
        report: &mut ReconcileReport,
    ) {
        match self.platform.unregister(registration).await {
            Ok(true) => {
                tracing::info!("unregistered worker for scope {}", info.scope);
                report.unregistered += 1;
            }
            Ok(false) => {
                tracing::warn!("platform refused to unregister scope {}", info.scope);
                report
                    .failures
                    .push(format!("{}: not unregistered", info.scope));
            }
            Err(e) => {
                tracing::warn!("error while unregistering scope {}: {}", info.scope, e);
                report.failures.push(format!("{}: {}", info.scope, e));
            }
        }
    }
}
