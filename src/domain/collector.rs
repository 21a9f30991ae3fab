//! Manifest-driven collection.
//!
//! One orchestration loop serves every platform: run each manifest command in
//! order, normalize what comes back, then (when any patterns are in effect)
//! discover services, match them and query each match's status. A failing
//! command only ever costs its own entry; a lost session aborts the run.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use super::manifest::Manifest;
use super::pattern::match_all;
use super::report::{MetricFailure, MetricValue, Outcome, Report, SERVICES_KEY};
use crate::connector::{Connector, ConnectorError};
use crate::error::CollectError;
use crate::platform::Platform;

/// Progress hooks invoked while a collection runs. All methods default to
/// doing nothing.
pub trait CollectObserver {
    fn metric_started(&self, _name: &str) {}

    fn metric_finished(&self, _name: &str, _outcome: &Outcome) {}

    /// Called once the service listing has been matched against the patterns.
    fn services_discovered(&self, _available: usize, _matched: usize) {}
}

pub struct NoopObserver;

impl CollectObserver for NoopObserver {}

#[derive(Debug, Clone)]
pub struct Collector {
    manifest: Manifest,
    patterns: Vec<String>,
}

impl Collector {
    /// Build a collector for a platform identifier such as `rhel` or `windows`.
    pub fn new(platform: &str, user_patterns: Vec<String>) -> Result<Self, CollectError> {
        let platform: Platform = platform.parse()?;
        Ok(Self::for_platform(platform, user_patterns))
    }

    pub fn for_platform(platform: Platform, user_patterns: Vec<String>) -> Self {
        Self::with_manifest(Manifest::for_platform(platform), user_patterns)
    }

    /// Effective patterns are the manifest defaults followed by `user_patterns`.
    pub fn with_manifest(manifest: Manifest, user_patterns: Vec<String>) -> Self {
        let patterns = manifest
            .services()
            .default_patterns
            .iter()
            .map(|p| p.to_string())
            .chain(user_patterns)
            .collect();
        Self { manifest, patterns }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn collect<C: Connector + ?Sized>(&self, connector: &C) -> Result<Report, CollectError> {
        self.collect_with(connector, &NoopObserver)
    }

    pub fn collect_with<C: Connector + ?Sized>(
        &self,
        connector: &C,
        observer: &dyn CollectObserver,
    ) -> Result<Report, CollectError> {
        if !connector.is_connected() {
            return Err(CollectError::Transport(ConnectorError::NotConnected));
        }

        let mut report = Report::new();

        for metric in self.manifest.metrics() {
            observer.metric_started(metric.name);
            let outcome = match connector.run(&metric.command) {
                Ok(output) if output.trim().is_empty() => {
                    Err(MetricFailure::new(metric.name, "no output"))
                }
                Ok(output) => Ok(MetricValue::normalize(&output)),
                Err(e) if e.is_fatal() => return Err(CollectError::Transport(e)),
                Err(e) => {
                    warn!(metric = metric.name, via = connector.name(), error = %e, "metric collection failed");
                    Err(MetricFailure::new(metric.name, e.to_string()))
                }
            };
            debug!(metric = metric.name, ok = outcome.is_ok(), "collected");
            observer.metric_finished(metric.name, &outcome);
            report.insert(metric.name, outcome);
        }

        if !self.patterns.is_empty() {
            observer.metric_started(SERVICES_KEY);
            let outcome = self.service_pass(connector, observer)?;
            observer.metric_finished(SERVICES_KEY, &outcome);
            report.insert(SERVICES_KEY, outcome);
        }

        Ok(report)
    }

    /// List services, match them, and query the status of every match.
    ///
    /// A failed listing becomes an error-shaped `Services` value. A failed
    /// status query becomes that service's status text.
    fn service_pass<C: Connector + ?Sized>(
        &self,
        connector: &C,
        observer: &dyn CollectObserver,
    ) -> Result<Outcome, CollectError> {
        let probe = self.manifest.services();

        let listing = match connector.run(probe.list_command) {
            Ok(listing) => listing,
            Err(e) if e.is_fatal() => return Err(CollectError::Transport(e)),
            Err(e) => {
                warn!(error = %e, "service listing failed");
                return Ok(Err(MetricFailure::new(SERVICES_KEY, e.to_string())));
            }
        };

        let available = probe.identifiers(&listing);
        let matched = match_all(&self.patterns, &available);
        debug!(
            available = available.len(),
            matched = matched.len(),
            "services matched"
        );
        observer.services_discovered(available.len(), matched.len());

        let mut statuses = BTreeMap::new();
        for service in matched {
            let status = match connector.run(&probe.status_command(&service)) {
                Ok(out) if out.trim().is_empty() => {
                    MetricFailure::new(&service, "no output").display_value()
                }
                Ok(out) => out.trim().to_string(),
                Err(e) if e.is_fatal() => return Err(CollectError::Transport(e)),
                Err(e) => {
                    warn!(service = %service, error = %e, "service status query failed");
                    MetricFailure::new(&service, e.to_string()).display_value()
                }
            };
            statuses.insert(service, status);
        }

        Ok(Ok(MetricValue::Services(statuses)))
    }
}
