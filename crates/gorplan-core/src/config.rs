//! Planner configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Directory where content-addressed query results are written.
    pub cache_dir: String,

    /// Project root; cache paths generated for bare `write` stages are made
    /// relative to it.
    pub project_root: String,

    /// Trust content hashes embedded in `<hash>_md5.<ext>` file names. The
    /// name refers to files produced by external tools; the embedded stem is
    /// used as an opaque signature and never recomputed, while signatures the
    /// planner computes itself are blake3.
    pub md5_cache_names: bool,

    /// Treat files inside `cache_dir` as already validated (signature `"0"`).
    pub cache_dir_shortcut: bool,

    /// Above this many tags a dictionary reference is fingerprinted as the
    /// whole dictionary. `None` disables the cap.
    pub dictionary_tag_limit: Option<usize>,

    /// Hard cap on macro rewrite passes for a single task.
    pub max_expansion_rounds: usize,

    /// Hard cap on planning rounds the driver runs for one script.
    pub max_rounds: usize,

    /// Force a cache miss for queries that contain a `write` stage.
    pub force_run_side_effects: bool,

    /// Leading verbs of top-level queries that get a signature up front.
    pub parallel_verbs: Vec<String>,

    /// Genomic regions the reference split resolver partitions over.
    pub split_regions: Vec<String>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            cache_dir: "result_cache".to_string(),
            project_root: ".".to_string(),
            md5_cache_names: false,
            cache_dir_shortcut: true,
            dictionary_tag_limit: Some(1000),
            max_expansion_rounds: 64,
            max_rounds: 256,
            force_run_side_effects: false,
            parallel_verbs: vec!["pgor".into(), "partgor".into(), "parallel".into()],
            split_regions: default_regions(),
        }
    }
}

fn default_regions() -> Vec<String> {
    let mut regions: Vec<String> = (1..=22).map(|i| format!("chr{i}")).collect();
    regions.extend(["chrX", "chrY", "chrM"].into_iter().map(String::from));
    regions
}

impl PlannerConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `GORPLAN_CACHE_DIR`: result cache directory
    /// - `GORPLAN_PROJECT_ROOT`: project root
    /// - `GORPLAN_MD5_CACHE_NAMES`: trust `_md5` file names (`true`/`false`)
    /// - `GORPLAN_CACHE_DIR_SHORTCUT`: cache files get signature `"0"`
    /// - `GORPLAN_DICT_TAG_LIMIT`: dictionary tag cap (`none` disables it)
    /// - `GORPLAN_MAX_EXPANSION_ROUNDS`: macro rewrite pass cap
    /// - `GORPLAN_MAX_ROUNDS`: planning round cap
    /// - `GORPLAN_FORCE_RUN_SIDE_EFFECTS`: always re-run queries that write
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("GORPLAN_CACHE_DIR") {
            cfg.cache_dir = s;
        }

        if let Ok(s) = std::env::var("GORPLAN_PROJECT_ROOT") {
            cfg.project_root = s;
        }

        if let Ok(s) = std::env::var("GORPLAN_MD5_CACHE_NAMES") {
            if let Ok(v) = s.parse::<bool>() {
                cfg.md5_cache_names = v;
            }
        }

        if let Ok(s) = std::env::var("GORPLAN_CACHE_DIR_SHORTCUT") {
            if let Ok(v) = s.parse::<bool>() {
                cfg.cache_dir_shortcut = v;
            }
        }

        if let Ok(s) = std::env::var("GORPLAN_DICT_TAG_LIMIT") {
            if s.eq_ignore_ascii_case("none") {
                cfg.dictionary_tag_limit = None;
            } else if let Ok(v) = s.parse::<usize>() {
                cfg.dictionary_tag_limit = Some(v);
            }
        }

        if let Ok(s) = std::env::var("GORPLAN_MAX_EXPANSION_ROUNDS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_expansion_rounds = v;
            }
        }

        if let Ok(s) = std::env::var("GORPLAN_MAX_ROUNDS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_rounds = v;
            }
        }

        if let Ok(s) = std::env::var("GORPLAN_FORCE_RUN_SIDE_EFFECTS") {
            if let Ok(v) = s.parse::<bool>() {
                cfg.force_run_side_effects = v;
            }
        }

        cfg
    }

    /// Parse a JSON config document; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_dir.trim().is_empty() {
            return Err(crate::Error::Config("cache_dir must not be empty".into()));
        }
        if self.max_expansion_rounds == 0 {
            return Err(crate::Error::Config(
                "max_expansion_rounds must be at least 1".into(),
            ));
        }
        if self.max_rounds == 0 {
            return Err(crate::Error::Config("max_rounds must be at least 1".into()));
        }
        Ok(())
    }

    /// `cache_dir` normalised to end with exactly one `/`.
    pub fn cache_folder(&self) -> String {
        format!("{}/", self.cache_dir.trim_end_matches('/'))
    }

    /// Whether `path` lies inside the result cache directory.
    pub fn is_in_cache_dir(&self, path: &str) -> bool {
        let path = path.strip_prefix("./").unwrap_or(path);
        let folder = self.cache_folder();
        let folder = folder.strip_prefix("./").unwrap_or(&folder);
        path.starts_with(folder)
    }

    pub fn is_parallel_verb(&self, verb: &str) -> bool {
        self.parallel_verbs.iter().any(|v| v.eq_ignore_ascii_case(verb))
    }

    /// Make `path` relative to the project root when it lies below it.
    pub fn relativize(&self, path: &str) -> String {
        let root = self.project_root.trim_end_matches('/');
        if root.is_empty() || root == "." {
            return path.to_string();
        }
        match path.strip_prefix(root) {
            Some(rest) if rest.starts_with('/') => rest.trim_start_matches('/').to_string(),
            _ => path.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_overrides_defaults() {
        let cfg = PlannerConfig::from_json(
            r#"{ "cache_dir": "/tmp/cache/", "dictionary_tag_limit": null }"#,
        )
        .unwrap();
        assert_eq!(cfg.cache_dir, "/tmp/cache/");
        assert_eq!(cfg.dictionary_tag_limit, None);
        assert_eq!(cfg.max_expansion_rounds, 64);
        assert_eq!(cfg.cache_folder(), "/tmp/cache/");
    }

    #[test]
    fn test_rejects_zero_round_cap() {
        let err = PlannerConfig::from_json(r#"{ "max_rounds": 0 }"#).unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
    }

    #[test]
    fn test_cache_dir_membership() {
        let cfg = PlannerConfig {
            cache_dir: "./result_cache".into(),
            ..Default::default()
        };
        assert!(cfg.is_in_cache_dir("result_cache/abc.gorz"));
        assert!(cfg.is_in_cache_dir("./result_cache/abc.gorz"));
        assert!(!cfg.is_in_cache_dir("result_cache_old/abc.gorz"));
    }

    #[test]
    fn test_relativize_against_project_root() {
        let cfg = PlannerConfig {
            project_root: "/proj".into(),
            ..Default::default()
        };
        assert_eq!(cfg.relativize("/proj/cache/a.gord"), "cache/a.gord");
        assert_eq!(cfg.relativize("/other/a.gord"), "/other/a.gord");
    }
}
