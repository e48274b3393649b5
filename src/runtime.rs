use std::fmt::{Display, Formatter};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Content-addressed image id as reported by the runtime, e.g. `sha256:3f1c…`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageIdentity(pub String);

impl ImageIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, the way `docker images` shows ids.
    pub fn short(&self) -> &str {
        let id = self.0.strip_prefix("sha256:").unwrap_or(&self.0);
        &id[..id.len().min(12)]
    }
}

impl Display for ImageIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Decides whether two identities refer to the same image content.
pub trait IdentityComparable {
    fn same_image(&self, other: &Self) -> bool;
}

impl IdentityComparable for ImageIdentity {
    // Exact comparison of the opaque id. A registry handing out a different id
    // for identical content shows up as a spurious update.
    fn same_image(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Absent,
    Running,
    Stopped,
}

impl Display for SlotState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SlotState::Absent => "absent",
            SlotState::Running => "running",
            SlotState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// What the runtime currently binds to a container name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSlot {
    pub name: String,
    pub state: SlotState,
    pub image: Option<ImageIdentity>,
}

impl ContainerSlot {
    pub fn absent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: SlotState::Absent,
            image: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == SlotState::Running
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("container runtime unavailable: {0}")]
    Unavailable(String),
    #[error("no such object: {0}")]
    NotFound(String),
    #[error("timed out after {0}s")]
    Timeout(u64),
    #[error("pull failed: {0}")]
    Pull(String),
    #[error("compose exited with {status}: {stderr}")]
    Compose { status: i32, stderr: String },
    #[error(transparent)]
    Docker(#[from] bollard::errors::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Bounds a single runtime call. Expiry fails that call only.
pub async fn with_timeout<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, RuntimeError>>,
) -> Result<T, RuntimeError> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| RuntimeError::Timeout(limit.as_secs()))?
}

/// The operations this tool needs from a container runtime and its compose
/// orchestrator. Implementations must not create or restart containers from
/// `pull`.
pub trait ContainerRuntime: Send + Sync {
    /// A missing container is reported as [`SlotState::Absent`], not an error.
    fn inspect(
        &self,
        container: &str,
    ) -> impl Future<Output = Result<ContainerSlot, RuntimeError>> + Send;
    fn pull(&self, image: &str) -> impl Future<Output = Result<(), RuntimeError>> + Send;
    fn inspect_image(
        &self,
        image: &str,
    ) -> impl Future<Output = Result<ImageIdentity, RuntimeError>> + Send;
    fn remove(&self, container: &str) -> impl Future<Output = Result<(), RuntimeError>> + Send;
    fn up_one(&self, service: &str) -> impl Future<Output = Result<(), RuntimeError>> + Send;
    fn up_all(&self) -> impl Future<Output = Result<(), RuntimeError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_comparison_is_exact() {
        let a = ImageIdentity::new("sha256:aaaa");
        assert!(a.same_image(&ImageIdentity::new("sha256:aaaa")));
        assert!(!a.same_image(&ImageIdentity::new("sha256:AAAA")));
        assert!(!a.same_image(&ImageIdentity::new("aaaa")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_expires() {
        let result: Result<(), RuntimeError> =
            with_timeout(Duration::from_secs(30), std::future::pending()).await;
        assert!(matches!(result, Err(RuntimeError::Timeout(30))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_timeout_passes_result_through() {
        let ok = with_timeout(Duration::from_secs(30), async { Ok(7) }).await;
        assert!(matches!(ok, Ok(7)));
        let err: Result<(), RuntimeError> = with_timeout(Duration::from_secs(30), async {
            Err(RuntimeError::NotFound("redis:7".to_string()))
        })
        .await;
        assert!(matches!(err, Err(RuntimeError::NotFound(_))));
    }

    #[test]
    fn test_short_identity() {
        let id = ImageIdentity::new("sha256:0123456789abcdef0123");
        assert_eq!(id.short(), "0123456789ab");
        assert_eq!(ImageIdentity::new("abc").short(), "abc");
    }
}
