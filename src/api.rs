//! Public entry points for rewriting a prompt pair.

use std::time::{Duration, Instant};

use crate::engine::Engine;
use crate::error::Result;
use crate::pipeline::{FileTrace, Pipeline};
use crate::prompt::RegionPrompt;
use crate::rules::RuleList;

/// A rewritten prompt pair in model-facing form.
#[derive(Debug, Clone)]
pub struct RewriteResult {
    pub positive: String,
    pub negative: String,
    pub elapsed: Duration,
}

/// Extra detail captured by the verbose entry point.
#[derive(Debug, Clone)]
pub struct RewriteDetails {
    /// Number of region pairs the rules ran against.
    pub regions: usize,
    pub traces: Vec<FileTrace>,
}

#[derive(Debug, Clone)]
pub struct RewriteResultVerbose {
    pub positive: String,
    pub negative: String,
    pub elapsed: Duration,
    pub details: RewriteDetails,
}

/// Rewrite a prompt pair with an already-parsed rule list.
///
/// Both inputs are split on the `BREAK` divider and the rules run against
/// every region pair in order. This path never fails: malformed tag syntax
/// degrades to literal text.
///
/// ```
/// use promptweave::{rewrite, RuleList};
///
/// let rules = RuleList::parse_str(
///     "rules.yml",
///     "- any_of: red\n  anchor: red\n  add: glow",
/// )
/// .unwrap();
///
/// let result = rewrite("red, blue", "", &rules);
/// assert_eq!(result.positive, "red, glow, blue");
/// ```
pub fn rewrite(positive: &str, negative: &str, rules: &RuleList) -> RewriteResult {
    let start = Instant::now();
    let mut pos = RegionPrompt::parse(positive);
    let mut neg = RegionPrompt::parse(negative);
    apply(&mut pos, &mut neg, rules);
    RewriteResult {
        positive: pos.render(true),
        negative: neg.render(true),
        elapsed: start.elapsed(),
    }
}

/// Rewrite a prompt pair with a rule directory pipeline. The pipeline
/// refreshes its cache first, so rule file edits take effect immediately.
pub fn rewrite_with(
    positive: &str,
    negative: &str,
    pipeline: &mut Pipeline,
) -> Result<RewriteResult> {
    let start = Instant::now();
    let mut pos = RegionPrompt::parse(positive);
    let mut neg = RegionPrompt::parse(negative);
    pipeline.run(&mut pos, &mut neg)?;
    let elapsed = start.elapsed();
    tracing::debug!(?elapsed, "rewrite complete");
    Ok(RewriteResult {
        positive: pos.render(true),
        negative: neg.render(true),
        elapsed,
    })
}

/// Like [`rewrite_with`], additionally capturing a full execution trace.
pub fn rewrite_verbose_with(
    positive: &str,
    negative: &str,
    pipeline: &mut Pipeline,
) -> Result<RewriteResultVerbose> {
    let start = Instant::now();
    let mut pos = RegionPrompt::parse(positive);
    let mut neg = RegionPrompt::parse(negative);
    let traces = pipeline.run_traced(&mut pos, &mut neg)?;
    let regions = pos.len().max(neg.len());
    Ok(RewriteResultVerbose {
        positive: pos.render(true),
        negative: neg.render(true),
        elapsed: start.elapsed(),
        details: RewriteDetails { regions, traces },
    })
}

fn apply(positive: &mut RegionPrompt, negative: &mut RegionPrompt, rules: &RuleList) {
    let regions = positive.len().max(negative.len()).max(1);
    for region in 0..regions {
        positive.get_or_create(region);
        negative.get_or_create(region);
        let (pos, pos_base) = positive.region_pair(region);
        let (neg, neg_base) = negative.region_pair(region);
        Engine::with_bases(pos, pos_base, neg, neg_base).run(rules);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(yaml: &str) -> RuleList {
        RuleList::parse_str("test.yml", yaml).unwrap()
    }

    #[test]
    fn rewrites_a_simple_pair() {
        let rules = rules("- any_of: red\n  anchor: red\n  add: glow\n  add_negative: dull");
        let result = rewrite("red, blue", "lowres", &rules);
        assert_eq!(result.positive, "red, glow, blue");
        assert_eq!(result.negative, "lowres, dull");
    }

    #[test]
    fn rules_run_against_every_region() {
        let result = rewrite(
            "red BREAK blue",
            "",
            &rules("- any_of: red\n  anchor: red\n  add: glow"),
        );
        assert_eq!(result.positive, "red, glow\nBREAK\nblue, red, glow");
        assert_eq!(result.negative, "");
    }

    #[test]
    fn output_is_stable_under_a_second_pass() {
        let rules = rules("- any_of: red\n  anchor: red\n  add: glow");
        let first = rewrite("red, blue", "", &rules);
        let second = rewrite(&first.positive, &first.negative, &rules);
        assert_eq!(first.positive, second.positive);
        assert_eq!(first.negative, second.negative);
    }

    #[test]
    fn pipeline_entry_points_agree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.yml"), "- add: glow").unwrap();

        let mut pipeline = Pipeline::new(dir.path());
        let plain = rewrite_with("red", "", &mut pipeline).unwrap();
        assert_eq!(plain.positive, "red, glow");

        let verbose = rewrite_verbose_with("red", "", &mut pipeline).unwrap();
        assert_eq!(verbose.positive, plain.positive);
        assert_eq!(verbose.details.regions, 1);
        assert_eq!(verbose.details.traces.len(), 1);
    }

    #[test]
    fn empty_rule_list_is_identity_modulo_canonical_form() {
        let result = rewrite("a,   b\nc", "", &RuleList::default());
        assert_eq!(result.positive, "a, b, c");
    }
}
