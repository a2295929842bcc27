//! Shared data model: compiler identity, compile requests/results and the
//! tagged diagnostic stream the extractor produces.
//!
//! Grounded on `original_source/compilers/compiler.go` (`CompilerInfo`,
//! `Result`) for the compiler-identity shape and on spec §3/§6 for the wire
//! shape of `CompileResult` and its diagnostics.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

use crate::error::CoreError;

static CANONICAL_NAME_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^go(\d+\.\d+(?:\.\d+)?)\s+(\w+)/(\w+)$").unwrap());

/// Identity of a Go toolchain: version, host OS and architecture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerInfo {
    pub version: String,
    pub platform: String,
    pub architecture: String,
}

impl CompilerInfo {
    /// `"go{version} {platform}/{architecture}"`, e.g. `"go1.22.0 linux/amd64"`.
    pub fn canonical_name(&self) -> String {
        format!("go{} {}/{}", self.version, self.platform, self.architecture)
    }

    /// Parses a canonical name produced by [`CompilerInfo::canonical_name`].
    pub fn parse_canonical_name(name: &str) -> Result<CompilerInfo, CoreError> {
        let caps = CANONICAL_NAME_RE
            .captures(name)
            .ok_or_else(|| CoreError::InvalidName(name.to_string()))?;
        Ok(CompilerInfo {
            version: caps[1].to_string(),
            platform: caps[2].to_string(),
            architecture: caps[3].to_string(),
        })
    }

    /// Semantic version, for ordering and the extractor's version gate.
    pub fn semver(&self) -> Result<semver::Version, CoreError> {
        let normalized = if self.version.matches('.').count() == 1 {
            format!("{}.0", self.version)
        } else {
            self.version.clone()
        };
        semver::Version::parse(&normalized)
            .map_err(|e| CoreError::InvalidName(format!("{}: {}", self.version, e)))
    }
}

/// User-controlled compile flags. Its JSON serialization is stable (struct
/// field order) and feeds directly into the cache fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerOptions {
    #[serde(default)]
    pub disable_inlining: bool,
    #[serde(default)]
    pub disable_optimizations: bool,
    #[serde(default)]
    pub architecture_level: String,
}

/// A resolved toolchain entry in the registry.
#[derive(Debug, Clone)]
pub struct Compiler {
    pub name: String,
    pub info: CompilerInfo,
    pub path: std::path::PathBuf,
    pub version: semver::Version,
}

/// Cache key: which compiler, with which options, compiling which bytes.
#[derive(Debug, Clone)]
pub struct CompileRequest {
    pub compiler_name: String,
    pub options: CompilerOptions,
    pub code: Vec<u8>,
}

impl crate::cache::CacheKey for CompileRequest {
    /// SHA-256 over `compiler_name || canonical_json(options) || code`, in
    /// that order — see spec §3/§8 invariant 5 (fingerprint stability).
    fn hash(&self) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(self.compiler_name.as_bytes());
        let options_json =
            serde_json::to_vec(&self.options).expect("CompilerOptions always serializes");
        hasher.update(&options_json);
        hasher.update(&self.code);
        hasher.finalize().to_vec()
    }
}

/// A 1-based `(line, column)` position, column measured in Unicode code
/// points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    #[serde(rename = "l")]
    pub line: usize,
    #[serde(rename = "c")]
    pub column: usize,
}

/// A half-open-in-spirit, closed-in-practice source range: `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    #[serde(rename = "s")]
    pub start: Position,
    #[serde(rename = "e")]
    pub end: Position,
}

impl Range {
    pub fn at(line: usize, start_col: usize, end_col: usize) -> Self {
        Range {
            start: Position { line, column: start_col },
            end: Position { line, column: end_col },
        }
    }
}

/// Association between a source line and a contiguous run of assembly lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    #[serde(rename = "source")]
    pub source_line: usize,
    #[serde(rename = "start")]
    pub assembly_start: usize,
    #[serde(rename = "end")]
    pub assembly_end: usize,
}

/// A typed fact about the user's source, carrying a [`Range`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Diagnostic {
    InliningAnalysis {
        name: String,
        can_inline: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        cost: i64,
        range: Range,
    },
    InlinedCall {
        name: String,
        range: Range,
    },
    HeapEscape {
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        range: Range,
    },
    BoundsCheck {
        range: Range,
    },
}

impl Diagnostic {
    pub fn range(&self) -> Range {
        match self {
            Diagnostic::InliningAnalysis { range, .. } => *range,
            Diagnostic::InlinedCall { range, .. } => *range,
            Diagnostic::HeapEscape { range, .. } => *range,
            Diagnostic::BoundsCheck { range, .. } => *range,
        }
    }
}

/// Everything the extractor produces from one successful compile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    pub assembly: String,
    pub mapping: Vec<Mapping>,
    pub diagnostics: Vec<Diagnostic>,
}

/// The cached result of a compile request.
///
/// `parse_result` is a plain nested field, not flattened: this struct is the
/// cache's on-disk representation, encoded with `bincode`, which can't
/// serialize or deserialize a flattened field (it needs a self-describing
/// format for that, which bincode isn't). A flattened wire shape for an HTTP
/// response would be a separate, JSON-only type built from this one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResult {
    pub build_failed: bool,
    pub build_output: String,
    pub parse_result: Option<ParseResult>,
}
