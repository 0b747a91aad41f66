// ABOUTME: Single health probe attempts against an HTTP endpoint.
// ABOUTME: HttpProbe issues the GET from here; HostProbe runs curl on the deployment host.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Empty;
use hyper::Uri;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::Duration;

use crate::remote::{CommandRunner, quote};

/// Why a single probe attempt did not count as healthy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeFailure {
    #[error("HTTP {0}")]
    Status(u16),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("timed out")]
    Timeout,
}

/// Outcome of one probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// 2xx response with this status code.
    Success(u16),
    Failure(ProbeFailure),
}

impl ProbeResult {
    fn from_status(status: u16) -> Self {
        if (200..300).contains(&status) {
            ProbeResult::Success(status)
        } else {
            ProbeResult::Failure(ProbeFailure::Status(status))
        }
    }
}

/// One GET against a health URL. Network errors are results, never panics or errors.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeResult;
}

/// Plain HTTP/1.1 GET issued from the controller.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client<HttpConnector, Empty<Bytes>>,
}

impl HttpProbe {
    pub fn new() -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build_http(),
        }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, url: &str) -> ProbeResult {
        let uri: Uri = match url.parse() {
            Ok(uri) => uri,
            Err(e) => {
                return ProbeResult::Failure(ProbeFailure::Connection(format!(
                    "invalid URL {url}: {e}"
                )));
            }
        };

        match self.client.get(uri).await {
            Ok(response) => ProbeResult::from_status(response.status().as_u16()),
            Err(e) => ProbeResult::Failure(ProbeFailure::Connection(e.to_string())),
        }
    }
}

/// Probe issued from inside the deployment host with `curl`.
///
/// Lets production be verified against `localhost` on the host itself, so
/// external network trouble between the controller and the host does not
/// read as an unhealthy application.
pub struct HostProbe<C: ?Sized> {
    runner: Arc<C>,
    max_time: Duration,
}

impl<C: ?Sized> std::fmt::Debug for HostProbe<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostProbe")
            .field("max_time", &self.max_time)
            .finish()
    }
}

impl<C: CommandRunner + ?Sized> HostProbe<C> {
    pub fn new(runner: Arc<C>) -> Self {
        Self {
            runner,
            max_time: Duration::from_secs(5),
        }
    }

    /// Upper bound curl enforces on the request.
    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = max_time;
        self
    }

    fn command(&self, url: &str) -> String {
        let secs = self.max_time.as_secs().max(1);
        format!(
            "curl -s -o /dev/null -w '%{{http_code}}' --max-time {} {}",
            secs,
            quote(url)
        )
    }
}

/// curl exit code when the operation timed out.
const CURL_TIMEOUT: u32 = 28;
/// Shell exit code for a missing command.
const COMMAND_NOT_FOUND: u32 = 127;

#[async_trait]
impl<C: CommandRunner + ?Sized> Probe for HostProbe<C> {
    async fn probe(&self, url: &str) -> ProbeResult {
        let output = match self.runner.run(&self.command(url)).await {
            Ok(output) => output,
            Err(e) => return ProbeResult::Failure(ProbeFailure::Connection(e.to_string())),
        };

        match output.exit_code {
            CURL_TIMEOUT => return ProbeResult::Failure(ProbeFailure::Timeout),
            COMMAND_NOT_FOUND => {
                return ProbeResult::Failure(ProbeFailure::Connection(format!(
                    "curl not available on {}",
                    self.runner.host()
                )));
            }
            _ => {}
        }

        // curl prints 000 when no response was received.
        match output.stdout.trim().parse::<u16>() {
            Ok(status) if status > 0 => ProbeResult::from_status(status),
            _ => ProbeResult::Failure(ProbeFailure::Connection(format!(
                "curl exited with {} on {}: {}",
                output.exit_code,
                self.runner.host(),
                output.stderr.trim()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{CommandOutput, RemoteError};
    use parking_lot::Mutex;

    struct CannedHost {
        exit_code: u32,
        stdout: &'static str,
        commands: Mutex<Vec<String>>,
    }

    impl CannedHost {
        fn new(exit_code: u32, stdout: &'static str) -> Arc<Self> {
            Arc::new(Self {
                exit_code,
                stdout,
                commands: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CommandRunner for CannedHost {
        fn host(&self) -> &str {
            "prod-1"
        }

        async fn run(&self, command: &str) -> Result<CommandOutput, RemoteError> {
            self.commands.lock().push(command.to_string());
            Ok(CommandOutput {
                exit_code: self.exit_code,
                stdout: self.stdout.to_string(),
                stderr: String::new(),
            })
        }
    }

    #[tokio::test]
    async fn host_probe_reads_status_code() {
        let host = CannedHost::new(0, "204");
        let probe = HostProbe::new(host.clone()).with_max_time(Duration::from_secs(3));

        assert_eq!(
            probe.probe("http://localhost:80/health").await,
            ProbeResult::Success(204)
        );
        assert_eq!(
            host.commands.lock()[0],
            "curl -s -o /dev/null -w '%{http_code}' --max-time 3 'http://localhost:80/health'"
        );
    }

    #[tokio::test]
    async fn host_probe_reports_non_2xx() {
        let probe = HostProbe::new(CannedHost::new(0, "503"));
        assert_eq!(
            probe.probe("http://localhost/").await,
            ProbeResult::Failure(ProbeFailure::Status(503))
        );
    }

    #[tokio::test]
    async fn host_probe_treats_refused_connection_as_failure() {
        let probe = HostProbe::new(CannedHost::new(7, "000"));
        assert!(matches!(
            probe.probe("http://localhost/").await,
            ProbeResult::Failure(ProbeFailure::Connection(_))
        ));
    }

    #[tokio::test]
    async fn host_probe_maps_curl_timeout() {
        let probe = HostProbe::new(CannedHost::new(28, "000"));
        assert_eq!(
            probe.probe("http://localhost/").await,
            ProbeResult::Failure(ProbeFailure::Timeout)
        );
    }

    #[tokio::test]
    async fn http_probe_rejects_unparseable_url() {
        let probe = HttpProbe::new();
        assert!(matches!(
            probe.probe("not a url").await,
            ProbeResult::Failure(ProbeFailure::Connection(_))
        ));
    }
}
