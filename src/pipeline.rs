//! Orchestrates one compile request end to end: resolve the toolchain,
//! consult the cache, drive the runner, extract diagnostics, cache the
//! result.
//!
//! Grounded on `compile-worker/src/main.rs`'s main loop (cache check →
//! compile → store) and `original_source/api.go`'s `Compile` handler
//! (fingerprint → cache → runner → parser → cache), stripped of the
//! HTTP/queue plumbing neither belongs here.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::cache::Kv;
use crate::error::CoreError;
use crate::extractor::{self, ExtractorInput};
use crate::model::{CompileRequest, CompileResult, CompilerInfo, CompilerOptions};
use crate::registry::Registry;
use crate::runner::BuildRunner;

pub struct Pipeline {
    registry: Arc<Registry>,
    cache: Kv<CompileRequest, CompileResult>,
    runner: BuildRunner,
    compile_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        registry: Arc<Registry>,
        cache: Kv<CompileRequest, CompileResult>,
        enable_modules: bool,
        compile_timeout: Duration,
    ) -> Self {
        Pipeline {
            registry,
            cache,
            runner: BuildRunner::new(enable_modules),
            compile_timeout,
        }
    }

    pub async fn compile(
        &self,
        name: &str,
        options: CompilerOptions,
        code: Vec<u8>,
        cache_ttl: Option<Duration>,
    ) -> Result<CompileResult, CoreError> {
        let compiler = if name.is_empty() {
            self.registry.default_compiler().await?
        } else {
            CompilerInfo::parse_canonical_name(name)?;
            self.registry.get(name).await?
        };

        let request = CompileRequest { compiler_name: compiler.name.clone(), options, code };

        if let Some(cached) = self.cache.get(&request).await? {
            return Ok(cached);
        }

        let runner_output = self
            .runner
            .compile(&compiler, &request.options, &request.code, self.compile_timeout)
            .await?;

        let result = if !runner_output.ok {
            CompileResult {
                build_failed: true,
                build_output: String::from_utf8_lossy(&runner_output.build_output).into_owned(),
                parse_result: None,
            }
        } else {
            let extractor_impl = extractor::find_matching(&compiler.version)
                .ok_or_else(|| CoreError::ParserNotFound(compiler.version.to_string()))?;
            let source_code = String::from_utf8_lossy(&request.code).into_owned();
            let parse_result = extractor_impl.parse(ExtractorInput {
                source_code: &source_code,
                build_output: &runner_output.build_output,
                structured_json: runner_output.structured_json.as_deref(),
            });
            CompileResult {
                build_failed: false,
                build_output: String::from_utf8_lossy(&runner_output.build_output).into_owned(),
                parse_result: Some(parse_result),
            }
        };

        self.cache.set(&request, &result, cache_ttl).await?;
        info!(compiler = %compiler.name, build_failed = result.build_failed, "compile finished");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn unknown_compiler_name_is_reported_without_invoking_the_runner() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::from_env();
        config.local_compilers = Vec::new();
        config.search_go_path = false;
        config.search_sdk_path = false;
        let registry = Registry::new(config).await.unwrap();
        let cache = Kv::open(dir.path().join("cache.db")).unwrap();
        let pipeline = Pipeline::new(registry, cache, false, Duration::from_secs(5));

        let err = pipeline
            .compile("go1.22.0 linux/amd64", CompilerOptions::default(), b"package main".to_vec(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::CompilerNotFound(_) | CoreError::NoCompilers));
    }

    #[tokio::test]
    async fn malformed_compiler_name_is_rejected_before_registry_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::from_env();
        config.search_go_path = false;
        config.search_sdk_path = false;
        let registry = Registry::new(config).await.unwrap();
        let cache = Kv::open(dir.path().join("cache.db")).unwrap();
        let pipeline = Pipeline::new(registry, cache, false, Duration::from_secs(5));

        let err = pipeline
            .compile("not-a-compiler-name", CompilerOptions::default(), b"package main".to_vec(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidName(_)));
    }
}
