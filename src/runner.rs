//! Drives the Go toolchain in a disposable scratch directory and collects
//! its raw, unparsed output.
//!
//! Grounded on `compile-worker/src/main.rs`'s `compile_source` for the
//! general shape (temp dir via `tempfile`, `tokio::process::Command`,
//! `tokio::time::timeout`) and on `original_source/compilers/local.go` for
//! the exact flag and environment semantics (`-trimpath -gcflags`,
//! `GOOS`/`GOARCH` only when they differ from the host).

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::model::{Compiler, CompilerOptions};

const BUILD_OUTPUT_PREFIX: &str = "# command-line-arguments\n";

/// Raw output of one build, before the extractor interprets it.
#[derive(Debug, Clone)]
pub struct RunnerOutput {
    pub build_output: Vec<u8>,
    pub structured_json: Option<Vec<u8>>,
    pub ok: bool,
}

/// Owns a scratch directory for exactly one build; the directory and
/// everything under it is removed when this value is dropped, on every
/// exit path including early returns and panics.
struct ScratchGuard(TempDir);

impl ScratchGuard {
    fn new() -> Result<Self, CoreError> {
        let root = std::env::temp_dir().join("goce");
        std::fs::create_dir_all(&root).map_err(|e| CoreError::Scratch(e.to_string()))?;
        let dir = tempfile::Builder::new()
            .prefix("build-")
            .tempdir_in(&root)
            .map_err(|e| CoreError::Scratch(e.to_string()))?;
        Ok(ScratchGuard(dir))
    }

    fn path(&self) -> &Path {
        self.0.path()
    }
}

/// Compiles one request against one resolved toolchain.
pub struct BuildRunner {
    pub enable_modules: bool,
}

impl BuildRunner {
    pub fn new(enable_modules: bool) -> Self {
        BuildRunner { enable_modules }
    }

    pub async fn compile(
        &self,
        compiler: &Compiler,
        options: &CompilerOptions,
        code: &[u8],
        timeout: Duration,
    ) -> Result<RunnerOutput, CoreError> {
        let scratch = ScratchGuard::new()?;
        let main_go = scratch.path().join("main.go");
        write_source(&main_go, code).await?;

        let env = build_environment(compiler, options);

        if self.enable_modules {
            run_step(
                &compiler.path,
                &["mod", "init", "goce-build"],
                scratch.path(),
                &env,
                timeout,
            )
            .await?;
            run_step(&compiler.path, &["mod", "tidy"], scratch.path(), &env, timeout).await?;
        }

        let json_path = scratch.path().join(".build.json");
        let gcflags = build_gcflags(options, &json_path);
        let args = vec![
            "build".to_string(),
            "-o".to_string(),
            null_device().to_string(),
            "-trimpath".to_string(),
            "-gcflags".to_string(),
            gcflags,
            "main.go".to_string(),
        ];
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        let output = run_command(&compiler.path, &args, scratch.path(), &env, timeout).await?;
        let ok = output.status.success();
        let mut build_output = output.stdout;
        build_output.extend_from_slice(&output.stderr);
        let build_output = trim_prefix(build_output);

        let structured_json = read_structured_json(&json_path).await;

        if !ok {
            debug!("go build exited non-zero, reporting diagnostics printed before failure");
        }

        Ok(RunnerOutput { build_output, structured_json, ok })
    }
}

fn null_device() -> &'static str {
    if cfg!(windows) {
        "NUL"
    } else {
        "/dev/null"
    }
}

async fn write_source(path: &Path, code: &[u8]) -> Result<(), CoreError> {
    let mut f = tokio::fs::File::create(path)
        .await
        .map_err(|e| CoreError::Scratch(format!("create source file: {e}")))?;
    f.write_all(code)
        .await
        .map_err(|e| CoreError::Scratch(format!("write source file: {e}")))?;
    f.sync_all()
        .await
        .map_err(|e| CoreError::Scratch(format!("sync source file: {e}")))?;
    Ok(())
}

fn build_gcflags(options: &CompilerOptions, json_path: &Path) -> String {
    let mut flags = Vec::new();
    if options.disable_inlining {
        flags.push("-l".to_string());
    }
    if options.disable_optimizations {
        flags.push("-N".to_string());
    }
    flags.push("-m=2".to_string());
    flags.push("-S".to_string());
    flags.push(format!("-json=0,{}", json_path.display()));
    flags.join(" ")
}

fn build_environment(compiler: &Compiler, options: &CompilerOptions) -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = std::env::vars().collect();
    if compiler.info.platform != native_platform() {
        env.push(("GOOS".to_string(), compiler.info.platform.clone()));
    }
    if compiler.info.architecture != native_architecture() {
        env.push(("GOARCH".to_string(), compiler.info.architecture.clone()));
    }
    if !options.architecture_level.is_empty() {
        let var = match compiler.info.architecture.as_str() {
            "amd64" => Some("GOAMD64"),
            "ppc64" | "ppc64le" => Some("GOPPC64"),
            "386" => Some("GO386"),
            "arm" => Some("GOARM"),
            _ => None,
        };
        if let Some(var) = var {
            env.push((var.to_string(), options.architecture_level.clone()));
        }
    }
    env
}

fn native_platform() -> &'static str {
    std::env::consts::OS
}

fn native_architecture() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "386",
        other => other,
    }
}

async fn run_step(
    go_path: &Path,
    args: &[&str],
    cwd: &Path,
    env: &[(String, String)],
    timeout: Duration,
) -> Result<(), CoreError> {
    let output = run_command(go_path, args, cwd, env, timeout).await?;
    if !output.status.success() {
        let combined = String::from_utf8_lossy(&output.stdout).into_owned()
            + &String::from_utf8_lossy(&output.stderr);
        return Err(CoreError::Runner(format!(
            "{} {}: {combined}",
            go_path.display(),
            args.join(" ")
        )));
    }
    Ok(())
}

async fn run_command(
    go_path: &Path,
    args: &[&str],
    cwd: &Path,
    env: &[(String, String)],
    timeout: Duration,
) -> Result<std::process::Output, CoreError> {
    let mut cmd = Command::new(go_path);
    cmd.args(args)
        .current_dir(cwd)
        .env_clear()
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());

    let child = cmd
        .spawn()
        .map_err(|e| CoreError::InvalidCompiler(format!("{}: {e}", go_path.display())))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(CoreError::InvalidCompiler(e.to_string())),
        Err(_) => {
            warn!(timeout = ?timeout, "build step timed out, scratch directory will be reclaimed");
            Err(CoreError::Timeout(timeout))
        }
    }
}

fn trim_prefix(mut output: Vec<u8>) -> Vec<u8> {
    if output.starts_with(BUILD_OUTPUT_PREFIX.as_bytes()) {
        output.drain(..BUILD_OUTPUT_PREFIX.len());
    }
    output
}

async fn read_structured_json(build_json_dir: &Path) -> Option<Vec<u8>> {
    let path: PathBuf = build_json_dir.join("main").join("main.json");
    tokio::fs::read(&path).await.ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CompilerInfo;

    fn compiler() -> Compiler {
        let info = CompilerInfo {
            version: "1.22.0".to_string(),
            platform: native_platform().to_string(),
            architecture: native_architecture().to_string(),
        };
        Compiler {
            name: info.canonical_name(),
            version: info.semver().unwrap(),
            path: PathBuf::from("/usr/bin/go"),
            info,
        }
    }

    #[test]
    fn gcflags_reflect_options() {
        let json_path = PathBuf::from("/tmp/goce/build-xyz/.build.json");
        let mut options = CompilerOptions::default();
        assert_eq!(
            build_gcflags(&options, &json_path),
            format!("-m=2 -S -json=0,{}", json_path.display())
        );
        options.disable_inlining = true;
        options.disable_optimizations = true;
        assert_eq!(
            build_gcflags(&options, &json_path),
            format!("-l -N -m=2 -S -json=0,{}", json_path.display())
        );
    }

    #[test]
    fn build_output_prefix_is_trimmed() {
        let raw = format!("{BUILD_OUTPUT_PREFIX}./main.go:3:2: syntax error").into_bytes();
        assert_eq!(
            trim_prefix(raw),
            b"./main.go:3:2: syntax error".to_vec()
        );
    }

    #[test]
    fn native_target_adds_no_cross_compile_env() {
        let c = compiler();
        let options = CompilerOptions::default();
        let env = build_environment(&c, &options);
        assert!(!env.iter().any(|(k, _)| k == "GOOS"));
        assert!(!env.iter().any(|(k, _)| k == "GOARCH"));
    }

    #[test]
    fn cross_target_sets_goos_and_goarch() {
        let mut c = compiler();
        c.info.platform = "linux".to_string();
        c.info.architecture = "arm64".to_string();
        let options = CompilerOptions::default();
        let env = build_environment(&c, &options);
        if native_platform() != "linux" {
            assert!(env.iter().any(|(k, v)| k == "GOOS" && v == "linux"));
        }
        if native_architecture() != "arm64" {
            assert!(env.iter().any(|(k, v)| k == "GOARCH" && v == "arm64"));
        }
    }

    #[test]
    fn architecture_level_maps_to_goamd64() {
        let mut c = compiler();
        c.info.architecture = "amd64".to_string();
        let mut options = CompilerOptions::default();
        options.architecture_level = "v3".to_string();
        let env = build_environment(&c, &options);
        assert!(env.iter().any(|(k, v)| k == "GOAMD64" && v == "v3"));
    }
}
