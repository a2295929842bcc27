//! Minimal smoke binary: compiles one hardcoded snippet through the full
//! pipeline and prints the resulting JSON. Exercises the core without
//! standing up any HTTP surface, which is out of scope for this crate.

use goce_core::cache::Kv;
use goce_core::config::Config;
use goce_core::model::CompilerOptions;
use goce_core::registry::Registry;
use goce_core::Pipeline;

const SAMPLE: &str = "package main\n\nfunc main() {\n\tprintln(\"hello\")\n}\n";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    let registry = match Registry::new(config.clone()).await {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, "failed to build toolchain registry");
            std::process::exit(1);
        }
    };

    let cache_path = std::path::Path::new(&config.data_dir).join("compile-cache.db");
    if let Some(parent) = cache_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let cache = match Kv::open(&cache_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to open compile cache");
            std::process::exit(1);
        }
    };

    let pipeline = Pipeline::new(registry, cache, config.enable_modules, config.compile_timeout);

    match pipeline
        .compile("", CompilerOptions::default(), SAMPLE.as_bytes().to_vec(), Some(config.compilation_cache_ttl))
        .await
    {
        Ok(result) => println!("{}", serde_json::to_string_pretty(&result).unwrap()),
        Err(e) => {
            tracing::error!(error = %e, "compile failed");
            std::process::exit(1);
        }
    }
}
