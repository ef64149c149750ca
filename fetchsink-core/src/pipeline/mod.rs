//! The fetch → normalise → persist driver.
//!
//! A [`Pipeline`] owns one transport, the registered connection managers and
//! an ordered list of sinks. [`Pipeline::run`] fetches once, normalises once
//! and hands the payload to every sink in turn. A failing sink is recorded in
//! the [`RunReport`] and never stops its siblings.

mod report;

use log::{info, warn};
use thiserror::Error;

use crate::connection::ConnectionManager;
use crate::identifier::IdentifierRule;
use crate::normalize::{NormalizeError, normalize};
use crate::request::{RequestSpec, ResponseFormat};
use crate::sink::{ConnectionRegistry, Sink, SinkContext};
use crate::tabular::FlattenOptions;
use crate::transport::{Transport, TransportError};

pub use report::{RunReport, SinkReport, SinkStatus};

/// How non-2xx responses are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusPolicy {
    /// Abort the run with [`TransportError::Status`].
    #[default]
    RequireSuccess,
    /// Normalise the body whatever the status.
    AcceptAny,
}

/// Failures that abort a run before any sink is invoked.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Fetching failed or returned a rejected status.
    #[error("fetch failed")]
    Fetch(#[from] TransportError),
    /// The response could not be normalised.
    #[error("normalisation failed")]
    Normalize(#[from] NormalizeError),
}

/// Fetches one request and fans the result out to every sink.
pub struct Pipeline<T> {
    transport: T,
    format: ResponseFormat,
    identifier_rule: IdentifierRule,
    status_policy: StatusPolicy,
    flatten: FlattenOptions,
    connections: ConnectionRegistry,
    sinks: Vec<Box<dyn Sink>>,
}

impl<T: Transport> Pipeline<T> {
    /// Start building a pipeline around `transport`.
    pub fn builder(transport: T) -> PipelineBuilder<T> {
        PipelineBuilder {
            pipeline: Self {
                transport,
                format: ResponseFormat::default(),
                identifier_rule: IdentifierRule::default(),
                status_policy: StatusPolicy::default(),
                flatten: FlattenOptions::default(),
                connections: ConnectionRegistry::new(),
                sinks: Vec::new(),
            },
        }
    }

    /// Borrow the transport.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Registered connection managers by name.
    pub const fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Names of the configured sinks, in execution order.
    pub fn sink_names(&self) -> impl Iterator<Item = &str> {
        self.sinks.iter().map(|sink| sink.name())
    }

    /// Execute one run for `request`.
    ///
    /// Fetch, status and normalisation failures abort the run. Sink failures
    /// are captured per sink. Every connection opened during the run is
    /// closed before returning; a connection whose sink failed is closed
    /// straight away and reopened if a later sink needs it.
    pub fn run(&self, request: &RequestSpec) -> Result<RunReport, PipelineError> {
        info!("fetching {}", request.url);
        let mut response = self.transport.fetch(request)?;
        if self.status_policy == StatusPolicy::RequireSuccess {
            response = response.error_for_status()?;
        } else if !response.is_success() {
            warn!(
                "{} answered {}; continuing as configured",
                response.url, response.status
            );
        }

        let (payload, identifier) =
            normalize(&response, request, self.format, &self.identifier_rule)?;
        info!("normalised {} payload as {identifier}", payload.kind());

        let mut ctx = SinkContext::new(&identifier, self.flatten, &self.connections);
        let mut sinks = Vec::with_capacity(self.sinks.len());
        let mut close_failures = Vec::new();
        for sink in &self.sinks {
            let target = sink.target();
            let status = match sink.persist(&payload, &mut ctx) {
                Ok(outcome) => {
                    info!("sink `{}`: {outcome}", sink.name());
                    SinkStatus::Succeeded(outcome)
                }
                Err(err) => {
                    warn!("sink `{}` ({target}) failed: {err}", sink.name());
                    if let Some(connection) = target.connection()
                        && let Err(close_err) = ctx.release(connection)
                    {
                        warn!("closing connection `{connection}` failed: {close_err}");
                        close_failures.push((connection.to_owned(), close_err));
                    }
                    SinkStatus::Failed(err)
                }
            };
            sinks.push(SinkReport {
                name: sink.name().to_owned(),
                target,
                status,
            });
        }
        close_failures.extend(ctx.close_all());
        // Ends the borrow of `identifier` before it moves into the report.
        drop(ctx);

        let report = RunReport {
            identifier,
            sinks,
            close_failures,
        };
        info!(
            "run for {} finished: {} succeeded, {} failed, {} connection close errors",
            report.identifier,
            report.succeeded().count(),
            report.failures().count(),
            report.close_failures.len()
        );
        Ok(report)
    }
}

/// Builder for [`Pipeline`].
pub struct PipelineBuilder<T> {
    pipeline: Pipeline<T>,
}

impl<T: Transport> PipelineBuilder<T> {
    /// How the body is interpreted. Defaults to JSON.
    #[must_use]
    pub const fn format(mut self, format: ResponseFormat) -> Self {
        self.pipeline.format = format;
        self
    }

    /// How the artefact identifier is derived.
    #[must_use]
    pub fn identifier_rule(mut self, rule: IdentifierRule) -> Self {
        self.pipeline.identifier_rule = rule;
        self
    }

    /// How non-2xx responses are treated.
    #[must_use]
    pub const fn status_policy(mut self, policy: StatusPolicy) -> Self {
        self.pipeline.status_policy = policy;
        self
    }

    /// Flattening limits for tabular sinks.
    #[must_use]
    pub const fn flatten_options(mut self, options: FlattenOptions) -> Self {
        self.pipeline.flatten = options;
        self
    }

    /// Register a connection manager under `name`.
    #[must_use]
    pub fn connection(
        mut self,
        name: impl Into<String>,
        manager: impl ConnectionManager + 'static,
    ) -> Self {
        self.pipeline
            .connections
            .insert(name.into(), Box::new(manager));
        self
    }

    /// Append a sink; sinks run in the order they are added.
    #[must_use]
    pub fn sink(mut self, sink: impl Sink + 'static) -> Self {
        self.pipeline.sinks.push(Box::new(sink));
        self
    }

    /// Finish building.
    pub fn build(self) -> Pipeline<T> {
        self.pipeline
    }
}
