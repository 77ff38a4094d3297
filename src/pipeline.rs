//! Rule directory loading and the region-aware rewrite pipeline.
//!
//! A [`Pipeline`] watches one directory of `.yml`/`.yaml` rule files. Each
//! refresh re-stats the directory and reparses only the files whose
//! modification time or size changed, pruning entries whose file is gone.
//! Files apply in name order, every file against every region.
//!
//! [`Pipeline::cache_key`] digests the loaded file set together with the
//! raw inputs, so callers holding a memoized rewrite result can tell when
//! either the inputs or the rules on disk changed under them.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};

use crate::engine::Engine;
use crate::error::Result;
use crate::prompt::RegionPrompt;
use crate::rules::RuleList;
use crate::trace::TraceEvent;

/// One parsed rule file and the metadata used for staleness checks.
struct RuleFile {
    path: PathBuf,
    rules: RuleList,
    mtime_ns: u128,
    size: u64,
}

impl RuleFile {
    fn load(path: &Path, name: &str) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let metadata = fs::metadata(path)?;
        let rules = RuleList::parse_str(name, &text)?;
        tracing::debug!(file = name, rules = rules.len(), "loaded rule file");
        Ok(Self {
            path: path.to_path_buf(),
            rules,
            mtime_ns: mtime_ns(&metadata),
            size: metadata.len(),
        })
    }

    fn is_fresh(&self, metadata: &fs::Metadata) -> bool {
        self.mtime_ns == mtime_ns(metadata) && self.size == metadata.len()
    }
}

fn mtime_ns(metadata: &fs::Metadata) -> u128 {
    metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |duration| duration.as_nanos())
}

/// The trace of one rule file applied to one region.
#[derive(Debug, Clone)]
pub struct FileTrace {
    pub region: usize,
    pub file: String,
    pub events: Vec<TraceEvent>,
}

/// A cached rule directory that rewrites prompt pairs.
pub struct Pipeline {
    directory: PathBuf,
    cache: BTreeMap<String, RuleFile>,
}

impl Pipeline {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self { directory: directory.into(), cache: BTreeMap::new() }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Sync the cache with the directory: load new and changed files, drop
    /// entries whose file disappeared. The first invalid file aborts with
    /// its validation error; the cache keeps the last good state.
    pub fn refresh(&mut self) -> Result<()> {
        let mut seen = Vec::new();

        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            let path = entry.path();
            let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if !matches!(extension, "yml" | "yaml") {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }

            let fresh = self.cache.get(name).is_some_and(|file| file.is_fresh(&metadata));
            if !fresh {
                let file = RuleFile::load(&path, name)?;
                self.cache.insert(name.to_string(), file);
            }
            seen.push(name.to_string());
        }

        self.cache.retain(|name, _| seen.contains(name));
        Ok(())
    }

    /// Digest of the loaded rule files plus the raw inputs. Stable across
    /// calls while neither the inputs nor the rule directory change.
    pub fn cache_key(&mut self, positive: &str, negative: &str) -> Result<String> {
        self.refresh()?;

        let mut hasher = Sha256::new();
        for (name, file) in &self.cache {
            hasher.update(name.as_bytes());
            hasher.update(file.path.to_string_lossy().as_bytes());
            hasher.update(file.mtime_ns.to_le_bytes());
            hasher.update(file.size.to_le_bytes());
        }
        hasher.update(positive.as_bytes());
        hasher.update(negative.as_bytes());

        let digest = hasher.finalize();
        Ok(digest.iter().map(|byte| format!("{byte:02x}")).collect())
    }

    /// Apply every rule file, in name order, to every region pair.
    pub fn run(&mut self, positive: &mut RegionPrompt, negative: &mut RegionPrompt) -> Result<()> {
        self.refresh()?;
        self.run_regions(positive, negative, None);
        Ok(())
    }

    /// Like [`run`](Self::run), additionally recording a trace per file and
    /// region.
    pub fn run_traced(
        &mut self,
        positive: &mut RegionPrompt,
        negative: &mut RegionPrompt,
    ) -> Result<Vec<FileTrace>> {
        self.refresh()?;
        let mut traces = Vec::new();
        self.run_regions(positive, negative, Some(&mut traces));
        Ok(traces)
    }

    fn run_regions(
        &self,
        positive: &mut RegionPrompt,
        negative: &mut RegionPrompt,
        mut traces: Option<&mut Vec<FileTrace>>,
    ) {
        let regions = positive.len().max(negative.len()).max(1);

        for region in 0..regions {
            positive.get_or_create(region);
            negative.get_or_create(region);
            let (pos, pos_base) = positive.region_pair(region);
            let (neg, neg_base) = negative.region_pair(region);

            for (name, file) in &self.cache {
                let mut engine = Engine::with_bases(pos, pos_base, neg, neg_base);
                match traces.as_deref_mut() {
                    None => engine.run(&file.rules),
                    Some(traces) => traces.push(FileTrace {
                        region,
                        file: name.clone(),
                        events: engine.run_traced(&file.rules),
                    }),
                }
            }
        }
    }
}
