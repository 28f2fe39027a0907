//! Pure-data commands: the only thing `Operator`s produce and the only thing
//! the executor is allowed to act on.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identity of the certificate a `Commander::IssueCertificate` requests,
/// matching the `Vault::IssueFor*` family in `infra.rs`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertificateRole {
    /// `kube-apiserver` serving certificate.
    ApiServer,
    /// `kube-scheduler` client certificate.
    Scheduler,
    /// `kube-controller-manager` client certificate.
    ControllerManager,
    /// `kubelet` serving + client certificate.
    Kubelet,
    /// etcd peer certificate.
    EtcdPeer,
    /// etcd client certificate.
    EtcdClient,
}

/// Where a `Commander` runs: a specific node address, or a logical group
/// resolved by the executor (e.g. "all control planes").
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// A single node, by address.
    Node(String),
    /// Every node matching a logical label understood by the executor.
    Label(String),
}

impl Target {
    /// Render the target as a single display string, used by `describe()`
    /// and by tests that assert on `(name, target)` pairs (§8).
    pub fn display(&self) -> String {
        match self {
            Target::Node(addr) => addr.clone(),
            Target::Label(label) => label.clone(),
        }
    }
}

/// Options controlling how `run-container` creates/recreates a container.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunContainerOptions {
    /// Command-line parameters passed to the containerized process.
    #[serde(default)]
    pub params: Vec<String>,
    /// Extra bind mounts, as `host:container` pairs.
    #[serde(default)]
    pub extra_binds: Vec<String>,
    /// Extra environment variables.
    #[serde(default)]
    pub extra_env: BTreeMap<String, String>,
    /// Whether the container should be restarted on failure.
    #[serde(default)]
    pub restart: bool,
}

/// A bounded-retry wait condition, used by the `wait-*` family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitPolicy {
    /// Number of polling attempts before giving up.
    pub retries: u32,
    /// Delay between attempts, in milliseconds.
    pub interval_millis: u64,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            retries: 30,
            interval_millis: 1000,
        }
    }
}

/// One remote side-effecting action.
///
/// Each variant carries everything an executor needs to act without
/// consulting the decision engine again (§4.2). Individual commands are
/// idempotent by contract — see each variant's doc comment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Commander {
    /// Pull `image` onto `target`. Idempotent: succeeds iff the image is
    /// present locally afterwards.
    ImagePull {
        /// Where to pull the image.
        target: Target,
        /// Image reference.
        image: String,
    },

    /// Create and start a container. Idempotent: a no-op if a container of
    /// the same `name` already exists with identical `options`, otherwise
    /// the existing container is recreated.
    RunContainer {
        /// Where to run the container.
        target: Target,
        /// Logical container name.
        name: String,
        /// Image reference.
        image: String,
        /// Creation/start options.
        options: RunContainerOptions,
    },

    /// Stop a running container. Idempotent: absence of the container is
    /// success.
    StopContainer {
        /// Where to stop the container.
        target: Target,
        /// Logical container name.
        name: String,
    },

    /// Forcibly kill a container that did not respond to `StopContainer`.
    KillContainer {
        /// Where to kill the container.
        target: Target,
        /// Logical container name.
        name: String,
    },

    /// Create a directory (and parents) with POSIX semantics. Idempotent.
    MkDir {
        /// Where to create the directory.
        target: Target,
        /// Path to create.
        path: String,
        /// POSIX mode bits.
        mode: u32,
    },

    /// Write a file atomically (temp + rename). Idempotent: writing
    /// identical content twice leaves the same observable state.
    MakeFile {
        /// Where to write the file.
        target: Target,
        /// Path to write.
        path: String,
        /// File content.
        content: Vec<u8>,
        /// POSIX mode bits.
        mode: u32,
    },

    /// Create a named volume. Idempotent.
    VolumeCreate {
        /// Where to create the volume.
        target: Target,
        /// Volume name.
        name: String,
    },

    /// Remove a named volume. Idempotent: absence is success.
    VolumeRemove {
        /// Where to remove the volume.
        target: Target,
        /// Volume name.
        name: String,
    },

    /// Remove a path. Idempotent: absence is success.
    Remove {
        /// Where to remove the path.
        target: Target,
        /// Path to remove.
        path: String,
    },

    /// Request a certificate/key pair from the signer (§6 `Vault`).
    IssueCertificate {
        /// Where the certificate will be installed.
        target: Target,
        /// Which certificate role to request.
        role: CertificateRole,
        /// Certificate subject (commonly a node name or service identity).
        subject: String,
    },

    /// Poll `target` until ready, bounded by `policy`. Fails only on
    /// timeout.
    WaitReady {
        /// Where to poll.
        target: Target,
        /// What readiness means, as a human/executor-readable condition.
        condition: String,
        /// Retry bound.
        policy: WaitPolicy,
    },
}

impl Commander {
    /// The kind name, stable and used both for logging and for the literal
    /// `(name, target)` test scenarios in `spec.md` §8.
    pub fn name(&self) -> &'static str {
        match self {
            Commander::ImagePull { .. } => "image-pull",
            Commander::RunContainer { .. } => "run-container",
            Commander::StopContainer { .. } => "stop-container",
            Commander::KillContainer { .. } => "kill-container",
            Commander::MkDir { .. } => "mkdir",
            Commander::MakeFile { .. } => "make-file",
            Commander::VolumeCreate { .. } => "volume-create",
            Commander::VolumeRemove { .. } => "volume-remove",
            Commander::Remove { .. } => "rm",
            Commander::IssueCertificate { .. } => "issue-certificate",
            Commander::WaitReady { .. } => "wait-ready",
        }
    }

    /// The target this command acts on.
    pub fn target(&self) -> &Target {
        match self {
            Commander::ImagePull { target, .. }
            | Commander::RunContainer { target, .. }
            | Commander::StopContainer { target, .. }
            | Commander::KillContainer { target, .. }
            | Commander::MkDir { target, .. }
            | Commander::MakeFile { target, .. }
            | Commander::VolumeCreate { target, .. }
            | Commander::VolumeRemove { target, .. }
            | Commander::Remove { target, .. }
            | Commander::IssueCertificate { target, .. }
            | Commander::WaitReady { target, .. } => target,
        }
    }

    /// A human-readable one-liner, used for logging by the executor.
    pub fn describe(&self) -> String {
        match self {
            Commander::ImagePull { target, image } => {
                format!("image-pull {} on {}", image, target.display())
            }
            Commander::RunContainer {
                target,
                name,
                image,
                ..
            } => format!(
                "run-container {} ({}) on {}",
                name,
                image,
                target.display()
            ),
            Commander::StopContainer { target, name } => {
                format!("stop-container {} on {}", name, target.display())
            }
            Commander::KillContainer { target, name } => {
                format!("kill-container {} on {}", name, target.display())
            }
            Commander::MkDir { target, path, .. } => {
                format!("mkdir {} on {}", path, target.display())
            }
            Commander::MakeFile { target, path, .. } => {
                format!("make-file {} on {}", path, target.display())
            }
            Commander::VolumeCreate { target, name } => {
                format!("volume-create {} on {}", name, target.display())
            }
            Commander::VolumeRemove { target, name } => {
                format!("volume-remove {} on {}", name, target.display())
            }
            Commander::Remove { target, path } => {
                format!("rm {} on {}", path, target.display())
            }
            Commander::IssueCertificate {
                target,
                role,
                subject,
            } => format!(
                "issue-certificate {:?} for {} on {}",
                role,
                subject,
                target.display()
            ),
            Commander::WaitReady {
                target, condition, ..
            } => format!("wait-ready '{}' on {}", condition, target.display()),
        }
    }
}
