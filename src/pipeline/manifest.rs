//! Pipeline file parsing
//!
//! A pipeline is a TOML file naming the cache branch and listing stages in
//! build order:
//!
//! ```toml
//! branch = "org.example.App/x86_64/master"
//!
//! [[stage]]
//! name = "init"
//! commands = ["mkdir -p files/bin"]
//!
//! [[stage]]
//! name = "build"
//! commands = ["cc -o files/bin/hello ../hello.c"]
//! inputs = ["hello.c"]
//! env = { CFLAGS = "-O2" }
//! ```

use crate::checksum::Checksum;
use crate::error::{CacheError, CacheResult};
use serde::Deserialize;
use sha2::{Digest as _, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// File name looked up in the current directory when no pipeline is given
pub const PIPELINE_FILE: &str = "stagecache.toml";

/// Parsed pipeline file
#[derive(Debug, Clone, Deserialize)]
pub struct Pipeline {
    /// Cache lineage for this build
    pub branch: String,

    /// Stages in build order
    #[serde(rename = "stage", default)]
    pub stages: Vec<StageSpec>,

    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// One stage of a pipeline
#[derive(Debug, Clone, Deserialize)]
pub struct StageSpec {
    /// Stage name, unique within the pipeline
    pub name: String,

    /// Shell commands run in the working directory on a miss
    #[serde(default)]
    pub commands: Vec<String>,

    /// Extra environment for the commands
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Files whose contents feed the stage's checksum
    #[serde(default)]
    pub inputs: Vec<PathBuf>,
}

impl Pipeline {
    /// Parse a pipeline from a TOML file on disk
    pub async fn from_file(path: &Path) -> CacheResult<Self> {
        if !path.exists() {
            return Err(CacheError::PipelineNotFound(path.to_path_buf()));
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CacheError::io(format!("reading pipeline {}", path.display()), e))?;

        let mut pipeline = Self::parse(&content, path)?;
        pipeline.base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(pipeline)
    }

    /// Parse and validate a pipeline from a TOML string
    pub fn parse(content: &str, path: &Path) -> CacheResult<Self> {
        let invalid = |reason: String| CacheError::PipelineInvalid {
            path: path.to_path_buf(),
            reason,
        };

        let pipeline: Self = toml::from_str(content).map_err(|e| invalid(e.to_string()))?;

        if pipeline.branch.trim().is_empty() {
            return Err(invalid("branch must not be empty".to_string()));
        }
        if pipeline.stages.is_empty() {
            return Err(invalid("at least one [[stage]] is required".to_string()));
        }

        let mut seen = HashSet::new();
        for stage in &pipeline.stages {
            if stage.name.is_empty() {
                return Err(invalid("stage name must not be empty".to_string()));
            }
            // These would become `.` and `..` ref path components
            if stage.name == "." || stage.name == ".." {
                return Err(invalid(format!("stage name cannot be {}", stage.name)));
            }
            if !seen.insert(stage.name.as_str()) {
                return Err(invalid(format!("duplicate stage name: {}", stage.name)));
            }
        }

        Ok(pipeline)
    }

    /// Find the pipeline file in a directory
    pub fn find_local(dir: &Path) -> Option<PathBuf> {
        let path = dir.join(PIPELINE_FILE);
        path.is_file().then_some(path)
    }

    /// Names of all stages, in order
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }
}

impl StageSpec {
    /// Feed everything that determines this stage's output into `checksum`
    pub async fn absorb(&self, checksum: &mut Checksum, base_dir: &Path) -> CacheResult<()> {
        checksum.absorb_str(Some(&self.name));
        checksum.absorb_strv(Some(self.commands.as_slice()));

        let env: Vec<String> = self
            .env
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect();
        checksum.absorb_strv(Some(env.as_slice()));

        checksum.absorb_u32(self.inputs.len() as u32);
        for input in &self.inputs {
            let path = base_dir.join(input);
            let content = tokio::fs::read(&path)
                .await
                .map_err(|e| CacheError::io(format!("reading stage input {}", path.display()), e))?;
            checksum.absorb_str(Some(&input.to_string_lossy()));
            checksum.absorb_bytes(&Sha256::digest(&content));
        }
        Ok(())
    }

    /// Commit body describing the stage
    pub fn commit_body(&self) -> String {
        let mut body = format!("stage {}\n", self.name);
        for command in &self.commands {
            body.push_str(&format!("\n$ {}", command));
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PIPELINE: &str = r#"
branch = "org.example.App/x86_64/master"

[[stage]]
name = "init"
commands = ["mkdir -p files"]

[[stage]]
name = "build"
commands = ["make", "make install"]
inputs = ["Makefile"]
env = { CFLAGS = "-O2", PREFIX = "/app" }

[[stage]]
name = "finish"
"#;

    fn parse(content: &str) -> CacheResult<Pipeline> {
        Pipeline::parse(content, Path::new("stagecache.toml"))
    }

    #[test]
    fn parse_pipeline() {
        let pipeline = parse(PIPELINE).unwrap();
        assert_eq!(pipeline.branch, "org.example.App/x86_64/master");
        assert_eq!(pipeline.stage_names(), vec!["init", "build", "finish"]);

        let build = &pipeline.stages[1];
        assert_eq!(build.commands, vec!["make", "make install"]);
        assert_eq!(build.env.get("CFLAGS").unwrap(), "-O2");
        assert_eq!(build.inputs, vec![PathBuf::from("Makefile")]);
        assert!(pipeline.stages[2].commands.is_empty());
    }

    #[test]
    fn duplicate_stage_rejected() {
        let err = parse(
            r#"
branch = "b"
[[stage]]
name = "init"
[[stage]]
name = "init"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("duplicate stage name: init"));
    }

    #[test]
    fn dot_stage_names_rejected() {
        for name in [".", ".."] {
            let err = parse(&format!("branch = \"b\"\n[[stage]]\nname = \"{}\"", name))
                .unwrap_err();
            assert!(err.to_string().contains("stage name cannot be"));
        }
        assert!(parse("branch = \"b\"\n[[stage]]\nname = \".hidden\"").is_ok());
    }

    #[test]
    fn empty_pipeline_rejected() {
        assert!(parse("branch = \"b\"").is_err());
        assert!(parse("branch = \"\"\n[[stage]]\nname = \"x\"").is_err());
        assert!(parse("[[stage]]\nname = \"x\"").is_err());
    }

    #[test]
    fn commit_body_lists_commands() {
        let pipeline = parse(PIPELINE).unwrap();
        let body = pipeline.stages[1].commit_body();
        assert!(body.starts_with("stage build\n"));
        assert!(body.contains("$ make install"));
    }

    #[tokio::test]
    async fn absorb_depends_on_input_content() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = parse(PIPELINE).unwrap();
        pipeline.base_dir = dir.path().to_path_buf();
        let build = &pipeline.stages[1];

        std::fs::write(dir.path().join("Makefile"), "all:\n").unwrap();
        let mut first = Checksum::new();
        build.absorb(&mut first, &pipeline.base_dir).await.unwrap();

        let mut same = Checksum::new();
        build.absorb(&mut same, &pipeline.base_dir).await.unwrap();
        assert_eq!(first.current_digest(), same.current_digest());

        std::fs::write(dir.path().join("Makefile"), "all: hello\n").unwrap();
        let mut changed = Checksum::new();
        build.absorb(&mut changed, &pipeline.base_dir).await.unwrap();
        assert_ne!(first.current_digest(), changed.current_digest());
    }

    #[tokio::test]
    async fn missing_input_is_an_error() {
        let dir = TempDir::new().unwrap();
        let pipeline = parse(PIPELINE).unwrap();
        let mut checksum = Checksum::new();
        let result = pipeline.stages[1].absorb(&mut checksum, dir.path()).await;
        assert!(matches!(result, Err(CacheError::Io { .. })));
    }

    #[tokio::test]
    async fn missing_file() {
        let dir = TempDir::new().unwrap();
        let err = Pipeline::from_file(&dir.path().join("stagecache.toml"))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::PipelineNotFound(_)));
        assert!(Pipeline::find_local(dir.path()).is_none());
    }
}
