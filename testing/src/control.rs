//! In-memory control plane.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tenant_messaging_core::error::TransportError;
use tenant_messaging_core::transport::{ControlTransport, TransportFuture};

#[derive(Default)]
struct State {
    responders: HashMap<String, Vec<u8>>,
    durable: HashMap<String, Vec<Vec<u8>>>,
    requests: Vec<String>,
    report_no_responders: bool,
    unavailable: bool,
    closed: bool,
}

/// In-memory [`ControlTransport`].
///
/// A request on a subject with a registered responder is answered at once.
/// Without one, the request waits out the full timeout and fails with
/// [`TransportError::Timeout`], like a silent network, or fails immediately
/// with [`TransportError::NoResponders`] when [`report_no_responders`] is on.
///
/// Works with `tokio::time::pause()`, so timeout tests do not actually wait.
///
/// [`report_no_responders`]: InMemoryControlPlane::report_no_responders
#[derive(Clone, Default)]
pub struct InMemoryControlPlane {
    state: Arc<Mutex<State>>,
}

impl InMemoryControlPlane {
    /// Create a control plane with no responders.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request on `subject` with `reply`.
    pub fn respond_on(&self, subject: impl Into<String>, reply: impl Into<Vec<u8>>) {
        self.lock().responders.insert(subject.into(), reply.into());
    }

    /// Stop answering requests on `subject`.
    pub fn stop_responding(&self, subject: &str) {
        self.lock().responders.remove(subject);
    }

    /// Fail unanswered requests at once with `NoResponders` instead of timing out.
    pub fn report_no_responders(&self, enabled: bool) {
        self.lock().report_no_responders = enabled;
    }

    /// Make every operation fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Payloads durably published to `subject`, in order.
    #[must_use]
    pub fn published(&self, subject: &str) -> Vec<Vec<u8>> {
        self.lock().durable.get(subject).cloned().unwrap_or_default()
    }

    /// Subjects of every request made so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }

    /// Whether [`ControlTransport::close`] was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    #[allow(clippy::unwrap_used)] // Test infrastructure
    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn check_available(state: &State) -> Result<(), TransportError> {
        if state.closed {
            return Err(TransportError::Closed);
        }
        if state.unavailable {
            return Err(TransportError::Unavailable("control plane unavailable".to_string()));
        }
        Ok(())
    }
}

impl ControlTransport for InMemoryControlPlane {
    fn request<'a>(
        &'a self,
        subject: &'a str,
        _payload: &'a [u8],
        timeout: Duration,
    ) -> TransportFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let report_no_responders = {
                let mut state = self.lock();
                state.requests.push(subject.to_string());
                Self::check_available(&state)?;
                if let Some(reply) = state.responders.get(subject) {
                    return Ok(reply.clone());
                }
                state.report_no_responders
            };

            if report_no_responders {
                return Err(TransportError::NoResponders);
            }
            tokio::time::sleep(timeout).await;
            Err(TransportError::Timeout)
        })
    }

    fn publish_durable<'a>(
        &'a self,
        subject: &'a str,
        payload: &'a [u8],
    ) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.lock();
            Self::check_available(&state)?;
            state
                .durable
                .entry(subject.to_string())
                .or_default()
                .push(payload.to_vec());
            Ok(())
        })
    }

    fn close(&self) -> TransportFuture<'_, ()> {
        self.lock().closed = true;
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn registered_responder_answers() {
        let control = InMemoryControlPlane::new();
        control.respond_on("ctrl.acme.workers.heartbeat", b"{}".to_vec());

        let reply = control
            .request("ctrl.acme.workers.heartbeat", b"{}", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, b"{}");
        assert_eq!(control.requests(), vec!["ctrl.acme.workers.heartbeat"]);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_times_out_after_full_wait() {
        let control = InMemoryControlPlane::new();
        let started = tokio::time::Instant::now();

        let result = control
            .request("ctrl.acme.workers.heartbeat", b"{}", Duration::from_secs(1))
            .await;

        assert_eq!(result, Err(TransportError::Timeout));
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn no_responders_mode_fails_fast() {
        let control = InMemoryControlPlane::new();
        control.report_no_responders(true);

        let result = control.request("ctrl.acme.x", b"{}", Duration::from_secs(60)).await;
        assert_eq!(result, Err(TransportError::NoResponders));
    }

    #[tokio::test]
    async fn durable_publishes_are_recorded_per_subject() {
        let control = InMemoryControlPlane::new();
        control.publish_durable("ctrl.acme.a", b"1").await.unwrap();
        control.publish_durable("ctrl.acme.a", b"2").await.unwrap();
        control.publish_durable("ctrl.beta.a", b"3").await.unwrap();

        assert_eq!(control.published("ctrl.acme.a"), vec![b"1".to_vec(), b"2".to_vec()]);
        assert_eq!(control.published("ctrl.beta.a"), vec![b"3".to_vec()]);
    }

    #[tokio::test]
    async fn closed_control_plane_rejects_operations() {
        let control = InMemoryControlPlane::new();
        control.close().await.unwrap();

        assert!(control.is_closed());
        assert_eq!(
            control.publish_durable("ctrl.acme.a", b"1").await,
            Err(TransportError::Closed)
        );
    }
}
