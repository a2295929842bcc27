//! Discovers Go toolchains reachable on the host and keeps a refreshed,
//! read-mostly snapshot of them.
//!
//! Grounded on `original_source/compilers/compiler.go` and
//! `original_source/compilers/local.go` for discovery and name-parsing
//! semantics (`reGoVersion`, PATH lookup, `init()`-time registration),
//! restructured as an injected service with an explicit lifecycle instead
//! of package-level globals.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::warn;

use crate::config::Config;
use crate::error::CoreError;
use crate::model::{Compiler, CompilerInfo};

const SNAPSHOT_TTL: Duration = Duration::from_secs(15);
const FANOUT_ARCHITECTURES: &[&str] = &["amd64", "386", "arm64", "arm", "ppc64"];

fn architecture_priority(arch: &str) -> usize {
    match arch {
        "amd64" => 0,
        "arm64" => 1,
        "ppc64" => 2,
        "386" => 3,
        "arm" => 4,
        _ => usize::MAX,
    }
}

/// An immutable view of all discovered compilers at a point in time.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub compilers: Vec<Compiler>,
    pub by_name: HashMap<String, usize>,
    pub default: Option<usize>,
}

impl Snapshot {
    fn build(mut compilers: Vec<Compiler>) -> Self {
        compilers.sort_by(|a, b| {
            b.version
                .cmp(&a.version)
                .then_with(|| architecture_priority(&a.info.architecture).cmp(&architecture_priority(&b.info.architecture)))
                .then_with(|| a.name.cmp(&b.name))
        });
        let mut by_name = HashMap::with_capacity(compilers.len());
        for (i, c) in compilers.iter().enumerate() {
            by_name.entry(c.name.clone()).or_insert(i);
        }
        let default = if compilers.is_empty() { None } else { Some(0) };
        Snapshot { compilers, by_name, default }
    }

    pub fn get(&self, name: &str) -> Option<&Compiler> {
        self.by_name.get(name).map(|&i| &self.compilers[i])
    }

    pub fn default_compiler(&self) -> Option<&Compiler> {
        self.default.map(|i| &self.compilers[i])
    }
}

/// Injected discovery service: owns a refreshed [`Snapshot`] behind a
/// read-write lock, not a process-wide singleton.
pub struct Registry {
    config: Config,
    inner: RwLock<(Snapshot, Instant)>,
}

impl Registry {
    pub async fn new(config: Config) -> Result<Arc<Self>, CoreError> {
        let snapshot = discover(&config).await?;
        Ok(Arc::new(Registry {
            config,
            inner: RwLock::new((snapshot, Instant::now())),
        }))
    }

    /// Returns a fresh-enough snapshot, refreshing in place if the TTL has
    /// elapsed. A failed refresh keeps serving the previous snapshot.
    pub async fn snapshot(&self) -> Snapshot {
        {
            let guard = self.inner.read().await;
            if guard.1.elapsed() < SNAPSHOT_TTL {
                return guard.0.clone();
            }
        }
        let mut guard = self.inner.write().await;
        if guard.1.elapsed() < SNAPSHOT_TTL {
            return guard.0.clone();
        }
        match discover(&self.config).await {
            Ok(fresh) => {
                guard.0 = fresh.clone();
                guard.1 = Instant::now();
                fresh
            }
            Err(e) => {
                warn!(error = %e, "registry refresh failed, serving stale snapshot");
                guard.1 = Instant::now();
                guard.0.clone()
            }
        }
    }

    pub async fn get(&self, name: &str) -> Result<Compiler, CoreError> {
        let snapshot = self.snapshot().await;
        if snapshot.compilers.is_empty() {
            return Err(CoreError::NoCompilers);
        }
        snapshot
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::CompilerNotFound(name.to_string()))
    }

    pub async fn default_compiler(&self) -> Result<Compiler, CoreError> {
        let snapshot = self.snapshot().await;
        snapshot
            .default_compiler()
            .cloned()
            .ok_or(CoreError::NoCompilers)
    }
}

async fn discover(config: &Config) -> Result<Snapshot, CoreError> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if config.search_go_path {
        if let Some(path) = which_go() {
            candidates.push(path);
        }
    }
    if config.search_sdk_path {
        candidates.extend(scan_sdk_dir());
    }
    for p in &config.local_compilers {
        candidates.push(PathBuf::from(p));
    }

    let mut compilers = Vec::new();
    let mut seen_names = std::collections::HashSet::new();
    for path in candidates {
        match probe(&path).await {
            Ok(compiler) => {
                if seen_names.insert(compiler.name.clone()) {
                    compilers.push(compiler);
                }
            }
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unusable compiler candidate"),
        }
    }

    if config.additional_architectures {
        compilers = fan_out_architectures(compilers);
    }

    Ok(Snapshot::build(compilers))
}

fn which_go() -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join("go");
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn scan_sdk_dir() -> Vec<PathBuf> {
    let Some(home) = std::env::var_os("HOME") else {
        return Vec::new();
    };
    let sdk_dir = PathBuf::from(home).join("sdk");
    let Ok(entries) = std::fs::read_dir(&sdk_dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|n| n.starts_with("go"))
                .unwrap_or(false)
        })
        .map(|e| e.path().join("bin").join("go"))
        .filter(|p| is_executable(p))
        .collect()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

async fn probe(path: &Path) -> Result<Compiler, CoreError> {
    if !is_executable(path) {
        return Err(CoreError::InvalidPath {
            path: path.display().to_string(),
            reason: "not executable".to_string(),
        });
    }
    let output = tokio::process::Command::new(path)
        .arg("version")
        .output()
        .await
        .map_err(|e| CoreError::InvalidPath {
            path: path.display().to_string(),
            reason: format!("cannot run `go version`: {e}"),
        })?;
    if !output.status.success() {
        return Err(CoreError::InvalidPath {
            path: path.display().to_string(),
            reason: "`go version` exited non-zero".to_string(),
        });
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let text = text.trim().strip_prefix("go version ").unwrap_or(text.trim());
    let info = CompilerInfo::parse_canonical_name(text)
        .or_else(|_| CompilerInfo::parse_canonical_name(&format!("go{}", text)))
        .map_err(|_| CoreError::InvalidPath {
            path: path.display().to_string(),
            reason: format!("cannot parse `go version` output: {text:?}"),
        })?;
    let version = info.semver()?;
    Ok(Compiler {
        name: info.canonical_name(),
        info,
        path: path.to_path_buf(),
        version,
    })
}

fn fan_out_architectures(compilers: Vec<Compiler>) -> Vec<Compiler> {
    let mut out = Vec::with_capacity(compilers.len() * FANOUT_ARCHITECTURES.len());
    for compiler in compilers {
        if compiler.info.platform != "linux" {
            out.push(compiler);
            continue;
        }
        for &arch in FANOUT_ARCHITECTURES {
            if arch == compiler.info.architecture {
                out.push(compiler.clone());
                continue;
            }
            let mut clone = compiler.clone();
            clone.info.architecture = arch.to_string();
            clone.name = clone.info.canonical_name();
            out.push(clone);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiler(version: &str, arch: &str) -> Compiler {
        let info = CompilerInfo {
            version: version.to_string(),
            platform: "linux".to_string(),
            architecture: arch.to_string(),
        };
        Compiler {
            name: info.canonical_name(),
            version: info.semver().unwrap(),
            path: PathBuf::from("/usr/bin/go"),
            info,
        }
    }

    #[test]
    fn snapshot_orders_by_semver_then_architecture_priority() {
        let snap = Snapshot::build(vec![
            compiler("1.20.0", "386"),
            compiler("1.22.0", "arm64"),
            compiler("1.22.0", "amd64"),
            compiler("1.21.5", "amd64"),
        ]);
        let names: Vec<_> = snap.compilers.iter().map(|c| c.name.clone()).collect();
        assert_eq!(
            names,
            vec![
                "go1.22.0 linux/amd64".to_string(),
                "go1.22.0 linux/arm64".to_string(),
                "go1.21.5 linux/amd64".to_string(),
                "go1.20.0 linux/386".to_string(),
            ]
        );
        assert_eq!(snap.default_compiler().unwrap().name, "go1.22.0 linux/amd64");
    }

    #[test]
    fn fan_out_adds_non_native_architectures_on_linux() {
        let expanded = fan_out_architectures(vec![compiler("1.22.0", "amd64")]);
        let archs: std::collections::HashSet<_> =
            expanded.iter().map(|c| c.info.architecture.clone()).collect();
        assert_eq!(archs.len(), FANOUT_ARCHITECTURES.len());
        assert!(archs.contains("amd64"));
        assert!(archs.contains("arm"));
    }

    #[test]
    fn empty_snapshot_has_no_default() {
        let snap = Snapshot::build(vec![]);
        assert!(snap.default_compiler().is_none());
    }
}
