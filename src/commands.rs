// src/commands.rs
//
// The host-registered triggers: "decompile this binary", "decompile this
// function", "decompile this byte range". Each runs as one background unit
// of work against the current analysis session and ends in exactly one
// user-visible report; no error from here ever reaches the host.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use tracing::error;

use crate::credentials::ApiKeyStore;
use crate::errors::RdecError;
use crate::host::{AnalysisView, FunctionInfo, HostUi};
use crate::remote::client::{RemoteJobClient, DEFAULT_API_URL};
use crate::remote::orchestrator::{CancelFlag, JobOrchestrator, PollConfig};
use crate::remote::request::{JobRequest, RequestBuilder};
use crate::rewrite::PseudocodeRewriter;

/// Where the service lives and how to talk to it. Poll pacing is exposed
/// here rather than hardcoded in the orchestrator.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_url: String,
    pub key_path: PathBuf,
    pub poll: PollConfig,
}

impl ServiceConfig {
    pub fn new(key_path: impl Into<PathBuf>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            key_path: key_path.into(),
            poll: PollConfig::default(),
        }
    }
}

pub struct Decompiler {
    view: Arc<dyn AnalysisView>,
    ui: Arc<dyn HostUi>,
    config: ServiceConfig,
    // read-or-created on first use, immutable afterwards
    api_key: OnceLock<String>,
}

impl Decompiler {
    pub fn new(view: Arc<dyn AnalysisView>, ui: Arc<dyn HostUi>, config: ServiceConfig) -> Self {
        Self {
            view,
            ui,
            config,
            api_key: OnceLock::new(),
        }
    }

    /// The credential is loaded at most once; later jobs reuse the cached
    /// key even if the file on disk changes. A failed load is not cached,
    /// so the user can fix the configuration and retry.
    fn api_key(&self) -> Result<String, RdecError> {
        if let Some(key) = self.api_key.get() {
            return Ok(key.clone());
        }
        let key = ApiKeyStore::new(&self.config.key_path)
            .load_or_create(&|prompt| self.ui.prompt_line(prompt))?;
        Ok(self.api_key.get_or_init(|| key).clone())
    }

    /// Decompile the entire binary backing the current view.
    pub async fn decompile_file(&self, cancel: &CancelFlag) {
        let path = self.view.file_name();
        let display = basename(&path);
        let title = format!("Decompiled '{}'", display);
        self.ui
            .progress(&format!("decompiling binary '{}'...", display));

        let request = match self.build_file_request(&path, &display).await {
            Ok(r) => r,
            Err(e) => return self.report_error(&title, e),
        };
        self.finish(title, self.run_job(request, cancel).await);
    }

    /// Decompile one function: its start address through the highest end
    /// address of its basic blocks.
    pub async fn decompile_function(&self, func: &FunctionInfo, cancel: &CancelFlag) {
        let title = format!("Decompiled '{}'", func.name);
        self.ui
            .progress(&format!("decompiling function '{}'...", func.name));

        let start = func.start;
        let length = func.max_block_end().saturating_sub(start);
        let request = match self.build_range_request(start, length, true, &func.name) {
            Ok(r) => r,
            Err(e) => return self.report_error(&title, e),
        };
        self.finish(title, self.run_job(request, cancel).await);
    }

    /// Decompile an arbitrary byte range of the view.
    pub async fn decompile_range(&self, addr: u64, length: u64, cancel: &CancelFlag) {
        let title = format!("Decompiled range {:#x}-{:#x}", addr, addr + length);
        self.ui.progress("decompiling byte range...");

        let name = format!("range_{:x}", addr);
        let request = match self.build_range_request(addr, length, false, &name) {
            Ok(r) => r,
            Err(e) => return self.report_error(&title, e),
        };
        self.finish(title, self.run_job(request, cancel).await);
    }

    async fn build_file_request(
        &self,
        path: &str,
        display: &str,
    ) -> Result<JobRequest, RdecError> {
        let payload = tokio::fs::read(path).await?;
        self.builder()?.whole_file(display, payload)
    }

    fn build_range_request(
        &self,
        start: u64,
        length: u64,
        function: bool,
        input_name: &str,
    ) -> Result<JobRequest, RdecError> {
        if !self.view.is_valid_offset(start) {
            return Err(RdecError::Configuration(format!(
                "invalid address {:#x}",
                start
            )));
        }
        let payload = self.view.read(start, length as usize);
        let builder = self.builder()?;
        if function {
            builder.function_range(input_name, start, payload)
        } else {
            builder.byte_range(input_name, start, payload)
        }
    }

    fn builder(&self) -> Result<RequestBuilder, RdecError> {
        RequestBuilder::new(
            &self.view.arch_name(),
            self.view.endianness(),
            self.view.file_format().to_ascii_lowercase(),
        )
    }

    /// Submit, poll, download, rewrite; progress lines between stages.
    async fn run_job(&self, request: JobRequest, cancel: &CancelFlag) -> Result<String, RdecError> {
        let key = self.api_key()?;
        let client = RemoteJobClient::new(self.config.api_url.clone(), key)?;
        let mut orchestrator = JobOrchestrator::new(client, self.config.poll);
        let entry_point = request.raw_vma;

        let handle = orchestrator.submit(&request).await?;
        self.ui.progress(&format!(
            "new job created as '{}', waiting for decompilation to finish...",
            handle.id
        ));
        orchestrator.poll_until_done(&handle, cancel).await?;
        self.ui
            .progress("decompilation done, downloading output...");
        let raw = orchestrator.download(&handle).await?;

        self.ui.progress("integrating host symbols...");
        let rewriter = PseudocodeRewriter::new(self.view.as_ref(), entry_point);
        Ok(rewriter.rewrite(&raw))
    }

    fn finish(&self, title: String, result: Result<String, RdecError>) {
        match result {
            Ok(text) => {
                self.ui.progress("decompilation done");
                self.ui.show_report(&title, &text);
            }
            Err(e) => self.report_error(&title, e),
        }
    }

    fn report_error(&self, title: &str, err: RdecError) {
        if err.is_cancellation() {
            self.ui.progress("decompilation cancelled");
            return;
        }
        error!("decompilation failed: {}", err);
        self.ui
            .show_report(title, &format!("Decompilation failed: {}", err));
    }
}

fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}
