//! Remote attribute adapter.
//!
//! Runs every blocking service call on the [`WorkerPool`], bounds it by the
//! configured messaging timeout and classifies faults into [`AdapterError`].

pub mod errors;
pub mod pool;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

pub use errors::AdapterError;
pub use pool::WorkerPool;

use crate::service::{
    AttrValue, Attribute, AttributeService, ElementRef, NotificationKind, NotificationSink,
    ServiceFault, SubscriptionId,
};
use errors::{Operation, classify_fault};

/// Process-wide messaging timeout. Zero means "use the service default" and
/// is reported as unspecified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessagingTimeout(Option<Duration>);

impl MessagingTimeout {
    pub fn from_millis(millis: u64) -> Self {
        if millis == 0 {
            Self(None)
        } else {
            Self(Some(Duration::from_millis(millis)))
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        self.0
    }
}

/// Per-attribute results of a batched initial fetch.
#[derive(Debug, Default)]
pub struct FetchedAttributes {
    entries: HashMap<Attribute, Result<Option<AttrValue>, AdapterError>>,
}

impl FetchedAttributes {
    /// Take the result for `attribute`. Attributes missing from the batch are absent.
    pub fn take(&mut self, attribute: Attribute) -> Result<Option<AttrValue>, AdapterError> {
        self.entries.remove(&attribute).unwrap_or(Ok(None))
    }
}

#[derive(Clone)]
pub struct AttributeAdapter {
    service: Arc<dyn AttributeService>,
    pool: WorkerPool,
    timeout: MessagingTimeout,
}

impl AttributeAdapter {
    pub fn new(
        service: Arc<dyn AttributeService>,
        pool: WorkerPool,
        timeout: MessagingTimeout,
    ) -> Self {
        Self {
            service,
            pool,
            timeout,
        }
    }

    pub fn timeout(&self) -> MessagingTimeout {
        self.timeout
    }

    /// Run `job` on the pool, failing with `Timeout` if it outlives the
    /// messaging timeout. The job itself is not stopped.
    async fn call<F, R>(&self, job: F) -> Result<R, AdapterError>
    where
        F: FnOnce(&dyn AttributeService) -> R + Send + 'static,
        R: Send + 'static,
    {
        let service = self.service.clone();
        let pending = self.pool.run(move || job(service.as_ref()));
        match self.timeout.duration() {
            Some(limit) => tokio::time::timeout(limit, pending)
                .await
                .map_err(|_| AdapterError::Timeout {
                    timeout: Some(limit),
                })?,
            None => pending.await,
        }
    }

    fn classify(
        &self,
        fault: ServiceFault,
        operation: Operation,
        element: ElementRef,
        attribute: Option<Attribute>,
    ) -> AdapterError {
        classify_fault(fault, operation, element, attribute, self.timeout.duration())
    }

    /// Read one attribute. An absent attribute is `Ok(None)`.
    pub async fn read(
        &self,
        element: ElementRef,
        attribute: Attribute,
    ) -> Result<Option<AttrValue>, AdapterError> {
        match self
            .call(move |service| service.read(element, attribute))
            .await?
        {
            Ok(value) => Ok(Some(value)),
            Err(fault) if fault.is_absence() => Ok(None),
            Err(fault) => {
                debug!(
                    event = "core.adapter.read_failed",
                    element = %element,
                    attribute = %attribute,
                    fault = %fault,
                );
                Err(self.classify(fault, Operation::Read, element, Some(attribute)))
            }
        }
    }

    pub async fn write(
        &self,
        element: ElementRef,
        attribute: Attribute,
        value: AttrValue,
    ) -> Result<(), AdapterError> {
        self.call(move |service| service.write(element, attribute, value))
            .await?
            .map_err(|fault| {
                debug!(
                    event = "core.adapter.write_failed",
                    element = %element,
                    attribute = %attribute,
                    fault = %fault,
                );
                self.classify(fault, Operation::Write, element, Some(attribute))
            })
    }

    /// Batched read used for initial fetches: one round trip for all `attributes`.
    pub async fn read_many(
        &self,
        element: ElementRef,
        attributes: &[Attribute],
    ) -> Result<FetchedAttributes, AdapterError> {
        let requested = attributes.to_vec();
        let batch = requested.clone();
        let replies = self
            .call(move |service| service.read_many(element, &batch))
            .await?
            .map_err(|fault| self.classify(fault, Operation::Read, element, None))?;

        if replies.len() != requested.len() {
            warn!(
                event = "core.adapter.batch_length_mismatch",
                element = %element,
                requested = requested.len(),
                received = replies.len(),
            );
        }

        let entries = requested
            .into_iter()
            .zip(replies)
            .map(|(attribute, reply)| {
                let result = match reply {
                    Ok(value) => Ok(Some(value)),
                    Err(fault) if fault.is_absence() => Ok(None),
                    Err(fault) => {
                        Err(self.classify(fault, Operation::Read, element, Some(attribute)))
                    }
                };
                (attribute, result)
            })
            .collect();

        Ok(FetchedAttributes { entries })
    }

    pub async fn subscribe(
        &self,
        element: ElementRef,
        kinds: &'static [NotificationKind],
        sink: NotificationSink,
    ) -> Result<SubscriptionId, AdapterError> {
        self.call(move |service| service.subscribe(element, kinds, sink))
            .await?
            .map_err(|fault| self.classify(fault, Operation::Subscribe, element, None))
    }

    /// Drop a subscription in the background. Must be called from within the
    /// tokio runtime.
    pub fn unsubscribe(&self, subscription: SubscriptionId) {
        let service = self.service.clone();
        let pool = self.pool.clone();
        tokio::spawn(async move {
            if let Err(e) = pool.run(move || service.unsubscribe(subscription)).await {
                warn!(
                    event = "core.adapter.unsubscribe_failed",
                    subscription = subscription.0,
                    error = %e,
                );
            }
        });
    }
}
