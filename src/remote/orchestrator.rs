// src/remote/orchestrator.rs
//
// Drives a single decompilation job through its lifecycle:
//
//   Built -> Submitted -> Polling -> Downloading -> Done
//                              \-> Failed | Cancelled
//
// Terminal states are final. All operations within one job run strictly in
// sequence; the poll loop is the only place that sleeps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::errors::RdecError;
use crate::remote::client::{JobHandle, JobStatus, RemoteJobClient, HLL_ARTIFACT};
use crate::remote::request::JobRequest;
use crate::remote::staging::StagedPayload;

/// Poll pacing. The defaults (1s x 60 attempts) bound a job's wait at about
/// a minute; both knobs are configuration, not invariants.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 60,
        }
    }
}

/// Cooperative cancellation signal, observed between poll attempts only.
/// Cancelling never interrupts an in-flight request and leaves the remote
/// job orphaned (the service has no cancel endpoint).
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Built,
    Submitted,
    Polling,
    Downloading,
    Done,
    Failed,
    Cancelled,
}

pub struct JobOrchestrator {
    client: RemoteJobClient,
    poll: PollConfig,
    state: JobState,
}

impl JobOrchestrator {
    pub fn new(client: RemoteJobClient, poll: PollConfig) -> Self {
        Self {
            client,
            poll,
            state: JobState::Built,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Submit the job. Raw-mode payloads are staged to disk first and the
    /// multipart input read back from the staged copy; the staging file is
    /// removed when this call returns, on every path.
    pub async fn submit(&mut self, request: &JobRequest) -> Result<JobHandle, RdecError> {
        self.expect_state(JobState::Built)?;

        let input = if request.mode.is_raw() {
            let staged = match StagedPayload::write(request.payload()) {
                Ok(s) => s,
                Err(e) => return self.fail(e),
            };
            match staged.read() {
                Ok(bytes) => bytes,
                Err(e) => return self.fail(e),
            }
        } else {
            request.payload().to_vec()
        };

        match self.client.submit(request, input).await {
            Ok(handle) => {
                info!("new job created as '{}'", handle.id);
                self.state = JobState::Submitted;
                Ok(handle)
            }
            Err(RdecError::RemoteFailure { status, reason }) => {
                self.fail(RdecError::SubmissionRejected { status, reason })
            }
            Err(e) => self.fail(e),
        }
    }

    /// Poll on a fixed interval until the remote job reaches a terminal
    /// state, the attempt budget runs out, or `cancel` is observed between
    /// attempts. No backoff: the interval is constant by design.
    pub async fn poll_until_done(
        &mut self,
        handle: &JobHandle,
        cancel: &CancelFlag,
    ) -> Result<(), RdecError> {
        self.expect_state(JobState::Submitted)?;
        self.state = JobState::Polling;

        for attempt in 1..=self.poll.max_attempts {
            match self.client.poll_status(handle).await {
                Ok(JobStatus::Finished { succeeded: true }) => {
                    debug!("job '{}' finished after {} poll(s)", handle.id, attempt);
                    self.state = JobState::Downloading;
                    return Ok(());
                }
                Ok(JobStatus::Finished { succeeded: false }) => {
                    warn!("job '{}' reported failure", handle.id);
                    return self.fail(RdecError::JobFailed);
                }
                Ok(JobStatus::Pending) => {}
                Err(e) => return self.fail(e),
            }

            tokio::time::sleep(self.poll.interval).await;
            if cancel.is_cancelled() {
                info!("job '{}' cancelled; remote side left orphaned", handle.id);
                self.state = JobState::Cancelled;
                return Err(RdecError::Cancelled);
            }
        }

        warn!(
            "job '{}' still pending after {} attempts",
            handle.id, self.poll.max_attempts
        );
        self.fail(RdecError::PollTimeout {
            attempts: self.poll.max_attempts,
        })
    }

    /// Fetch the high-level-language artifact of a finished job.
    pub async fn download(&mut self, handle: &JobHandle) -> Result<String, RdecError> {
        self.expect_state(JobState::Downloading)?;

        let artifacts = match self.client.list_artifacts(handle).await {
            Ok(a) => a,
            Err(e) => return self.fail(e),
        };
        let url = match artifacts.get(HLL_ARTIFACT) {
            Some(url) => url.clone(),
            None => {
                return self.fail(RdecError::ArtifactMissing {
                    kind: HLL_ARTIFACT.to_string(),
                })
            }
        };

        match self.client.fetch_artifact(&url).await {
            Ok(text) => {
                self.state = JobState::Done;
                Ok(text)
            }
            Err(e) => self.fail(RdecError::DownloadFailed {
                url,
                reason: e.to_string(),
            }),
        }
    }

    /// Convenience wrapper: submit, poll, download, in order.
    pub async fn run(
        &mut self,
        request: &JobRequest,
        cancel: &CancelFlag,
    ) -> Result<String, RdecError> {
        let handle = self.submit(request).await?;
        self.poll_until_done(&handle, cancel).await?;
        self.download(&handle).await
    }

    fn expect_state(&self, expected: JobState) -> Result<(), RdecError> {
        if self.state != expected {
            return Err(RdecError::Configuration(format!(
                "job is in state {:?}, expected {:?}",
                self.state, expected
            )));
        }
        Ok(())
    }

    fn fail<T>(&mut self, err: RdecError) -> Result<T, RdecError> {
        self.state = JobState::Failed;
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::request::{Endianness, RequestBuilder};
    use std::sync::atomic::AtomicUsize;
    use warp::Filter;

    fn fast_poll(max_attempts: u32) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(5),
            max_attempts,
        }
    }

    fn raw_request() -> JobRequest {
        RequestBuilder::new("x86", Endianness::Little, "elf")
            .unwrap()
            .byte_range("blob", 0x1000, vec![0xc3])
            .unwrap()
    }

    fn handle_for(addr: std::net::SocketAddr) -> JobHandle {
        JobHandle {
            id: "job-1".to_string(),
            status_url: format!("http://{}/status", addr),
            outputs_url: format!("http://{}/outputs", addr),
        }
    }

    /// Status endpoint returning `pending` for the first `pending_polls`
    /// hits, then the given terminal answer; counts hits.
    fn status_server(
        pending_polls: usize,
        succeeded: bool,
        hits: Arc<AtomicUsize>,
    ) -> std::net::SocketAddr {
        let route = warp::path("status").map(move || {
            let n = hits.fetch_add(1, Ordering::SeqCst);
            if n < pending_polls {
                warp::reply::json(&serde_json::json!({"finished": false, "succeeded": false}))
            } else {
                warp::reply::json(&serde_json::json!({"finished": true, "succeeded": succeeded}))
            }
        });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        addr
    }

    fn orchestrator(max_attempts: u32) -> JobOrchestrator {
        let client = RemoteJobClient::new("http://unused.invalid", "key").unwrap();
        let mut orch = JobOrchestrator::new(client, fast_poll(max_attempts));
        // poll tests start from Submitted
        orch.state = JobState::Submitted;
        orch
    }

    #[tokio::test]
    async fn pending_then_succeeded_reaches_downloading() {
        let hits = Arc::new(AtomicUsize::new(0));
        let addr = status_server(2, true, hits.clone());
        let mut orch = orchestrator(10);

        orch.poll_until_done(&handle_for(addr), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(orch.state(), JobState::Downloading);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn remote_reported_failure_is_terminal() {
        let hits = Arc::new(AtomicUsize::new(0));
        let addr = status_server(0, false, hits);
        let mut orch = orchestrator(10);

        let err = orch
            .poll_until_done(&handle_for(addr), &CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RdecError::JobFailed));
        assert_eq!(orch.state(), JobState::Failed);
    }

    #[tokio::test]
    async fn cancellation_between_attempts_stops_polling() {
        let hits = Arc::new(AtomicUsize::new(0));
        let addr = status_server(usize::MAX, true, hits.clone());
        let mut orch = orchestrator(60);

        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = orch
            .poll_until_done(&handle_for(addr), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancellation());
        assert_eq!(orch.state(), JobState::Cancelled);
        // the in-flight poll completes, then the flag is seen; no second poll
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_attempts_is_poll_timeout() {
        let hits = Arc::new(AtomicUsize::new(0));
        let addr = status_server(usize::MAX, true, hits.clone());
        let mut orch = orchestrator(3);

        let err = orch
            .poll_until_done(&handle_for(addr), &CancelFlag::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RdecError::PollTimeout { attempts: 3 }));
        assert_eq!(orch.state(), JobState::Failed);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn missing_hll_artifact_fails_the_download() {
        let route = warp::path("outputs").map(|| {
            warp::reply::json(&serde_json::json!({"links": {"dsm": "http://x/dsm"}}))
        });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        let client = RemoteJobClient::new("http://unused.invalid", "key").unwrap();
        let mut orch = JobOrchestrator::new(client, fast_poll(1));
        orch.state = JobState::Downloading;

        let err = orch.download(&handle_for(addr)).await.unwrap_err();
        assert!(matches!(err, RdecError::ArtifactMissing { .. }));
        assert_eq!(orch.state(), JobState::Failed);
    }

    #[tokio::test]
    async fn full_run_submits_polls_and_downloads() {
        use std::sync::OnceLock;

        // the server hands out links to itself; its own address is only
        // known after binding, hence the OnceLock
        let self_addr: Arc<OnceLock<std::net::SocketAddr>> = Arc::new(OnceLock::new());
        let poll_hits = Arc::new(AtomicUsize::new(0));

        let submit_addr = self_addr.clone();
        let outputs_addr = self_addr.clone();
        let hits = poll_hits.clone();

        let route = warp::post()
            .and(warp::path("decompilations"))
            .map(move || {
                let a = submit_addr.get().copied().unwrap();
                warp::reply::json(&serde_json::json!({
                    "id": "job-9",
                    "links": {
                        "status": format!("http://{}/status", a),
                        "outputs": format!("http://{}/outputs", a)
                    }
                }))
            })
            .or(warp::path("status").map(move || {
                let n = hits.fetch_add(1, Ordering::SeqCst);
                warp::reply::json(
                    &serde_json::json!({"finished": n >= 1, "succeeded": n >= 1}),
                )
            }))
            .or(warp::path("outputs").map(move || {
                let a = outputs_addr.get().copied().unwrap();
                warp::reply::json(&serde_json::json!({
                    "links": {"hll": format!("http://{}/artifact", a)}
                }))
            }))
            .or(warp::path("artifact").map(|| "int f(void) { return 1; }"));

        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        self_addr.set(addr).unwrap();
        tokio::spawn(server);

        let client =
            RemoteJobClient::new(format!("http://{}/decompilations", addr), "key").unwrap();
        let mut orch = JobOrchestrator::new(client, fast_poll(10));

        let text = orch
            .run(&raw_request(), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(text, "int f(void) { return 1; }");
        assert_eq!(orch.state(), JobState::Done);
        assert_eq!(poll_hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn terminal_states_reject_further_transitions() {
        let client = RemoteJobClient::new("http://unused.invalid", "key").unwrap();
        let mut orch = JobOrchestrator::new(client, fast_poll(1));
        orch.state = JobState::Done;
        let err = orch.submit(&raw_request()).await.unwrap_err();
        assert!(matches!(err, RdecError::Configuration(_)));
        assert_eq!(orch.state(), JobState::Done);
    }
}
