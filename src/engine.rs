//! Rule execution over a positive/negative document pair.
//!
//! The engine walks a rule tree depth-first:
//!
//! ```text
//!   run(rules)
//!     └─ for each rule
//!          ├─ conditions  (any_of / all_of / none_of, positive doc only)
//!          ├─ anchors     (first contained candidate overrides inherited)
//!          └─ body        tag    -> add / remove / tmp mutations
//!                         group  -> every child runs
//!                         switch -> first matching child, else the default
//!                         swap   -> replace the first matched tag
//! ```
//!
//! Anchors inherit downward: a structural rule resolves once and its whole
//! subtree inserts at that point unless a child overrides. Both documents
//! are scoped over an optional base region, so containment and anchor
//! resolution read through to the base but mutations stay local.
//!
//! When a trace sink is armed the walk additionally emits
//! [`TraceEvent`]s; the untraced path allocates nothing for them.

use crate::prompt::Prompt;
use crate::rules::{Rule, RuleKind, RuleList, TagMutations};
use crate::tags::{Tag, TagList};
use crate::trace::{MutationOp, Side, TraceEvent};

/// A document together with its read-through base region.
struct Scoped<'a> {
    doc: &'a mut Prompt,
    base: Option<&'a Prompt>,
}

impl Scoped<'_> {
    fn contains(&self, tag: &Tag) -> bool {
        self.doc.contains_in(self.base, tag)
    }

    fn add(&mut self, anchor: Option<&Tag>, enabled: bool, tags: &TagList) {
        self.doc.add(self.base, anchor, enabled, tags);
    }

    fn remove(&mut self, tags: &TagList) {
        self.doc.remove(tags);
    }

    fn disable(&mut self, name: &str) {
        self.doc.disable(name);
    }
}

/// Anchor context inherited down the rule tree.
#[derive(Clone, Default)]
struct Anchor {
    positive: Option<Tag>,
    negative: Option<Tag>,
}

/// Where a rule sits in its parent, for trace labels.
#[derive(Clone, Copy)]
enum Slot {
    Root(usize),
    Child(usize),
    Default,
}

impl Slot {
    fn label(self) -> String {
        match self {
            Slot::Root(index) => format!(":root[{index}]"),
            Slot::Child(index) => format!("children[{index}]"),
            Slot::Default => "default".to_string(),
        }
    }
}

/// Executes rules against one positive/negative prompt pair.
pub struct Engine<'a> {
    positive: Scoped<'a>,
    negative: Scoped<'a>,
    trace: Option<Vec<TraceEvent>>,
}

impl<'a> Engine<'a> {
    pub fn new(positive: &'a mut Prompt, negative: &'a mut Prompt) -> Self {
        Self::with_bases(positive, None, negative, None)
    }

    /// Scope both documents over base regions for read-through containment
    /// and anchor copy-in.
    pub fn with_bases(
        positive: &'a mut Prompt,
        positive_base: Option<&'a Prompt>,
        negative: &'a mut Prompt,
        negative_base: Option<&'a Prompt>,
    ) -> Self {
        Self {
            positive: Scoped { doc: positive, base: positive_base },
            negative: Scoped { doc: negative, base: negative_base },
            trace: None,
        }
    }

    /// Run every rule in order.
    pub fn run(&mut self, rules: &RuleList) {
        self.run_roots(rules);
    }

    /// Run every rule in order, recording the walk.
    pub fn run_traced(&mut self, rules: &RuleList) -> Vec<TraceEvent> {
        self.trace = Some(Vec::new());
        self.run_roots(rules);
        self.trace.take().unwrap_or_default()
    }

    fn run_roots(&mut self, rules: &RuleList) {
        for (index, rule) in rules.iter().enumerate() {
            self.run_rule(rule, Slot::Root(index), &Anchor::default());
        }
    }

    fn push(&mut self, event: impl FnOnce() -> TraceEvent) {
        if let Some(trace) = &mut self.trace {
            trace.push(event());
        }
    }

    fn run_rule(&mut self, rule: &Rule, slot: Slot, inherited: &Anchor) {
        self.push(|| TraceEvent::EnterRule {
            label: slot.label(),
            kind: rule.kind_label(),
            name: rule.name.clone(),
        });

        if !self.check_conditions(rule) {
            self.push(|| TraceEvent::Skipped { reason: "conditions not met" });
            self.push(|| TraceEvent::ExitRule);
            return;
        }

        let anchor = self.resolve_anchor(rule, inherited);

        match &rule.kind {
            RuleKind::Tag(mutations) => self.run_tag(mutations, &anchor),
            RuleKind::Group { children } => {
                for (index, child) in children.iter().enumerate() {
                    self.run_rule(child, Slot::Child(index), &anchor);
                }
            }
            RuleKind::Switch { children, default } => {
                let selected = children
                    .iter()
                    .enumerate()
                    .filter(|(index, _)| Some(*index) != *default)
                    .find(|(_, child)| self.conditions_pass(child))
                    .map(|(index, _)| index);
                match selected {
                    Some(index) => self.run_rule(&children[index], Slot::Child(index), &anchor),
                    None => {
                        if let Some(index) = *default {
                            self.push(|| TraceEvent::DefaultSelected { index });
                            self.run_rule(&children[index], Slot::Default, &anchor);
                        }
                    }
                }
            }
            RuleKind::Swap { matches, add, add_negative } => {
                self.run_swap(matches, add.as_ref(), add_negative.as_ref(), &anchor);
            }
        }

        self.push(|| TraceEvent::ExitRule);
    }

    // --- Conditions ----------------------------------------------------------

    /// Evaluate and trace the rule's condition lists.
    fn check_conditions(&mut self, rule: &Rule) -> bool {
        let mut passed = true;
        if let Some(list) = &rule.any_of {
            let ok = list.iter().any(|tag| self.positive.contains(tag));
            self.trace_condition("any_of", list, ok);
            passed &= ok;
        }
        if let Some(list) = &rule.all_of {
            let ok = list.iter().all(|tag| self.positive.contains(tag));
            self.trace_condition("all_of", list, ok);
            passed &= ok;
        }
        if let Some(list) = &rule.none_of {
            let ok = !list.iter().any(|tag| self.positive.contains(tag));
            self.trace_condition("none_of", list, ok);
            passed &= ok;
        }
        passed
    }

    /// Condition evaluation without trace output, for switch pre-screening.
    fn conditions_pass(&self, rule: &Rule) -> bool {
        let any = rule
            .any_of
            .as_ref()
            .is_none_or(|list| list.iter().any(|tag| self.positive.contains(tag)));
        let all = rule
            .all_of
            .as_ref()
            .is_none_or(|list| list.iter().all(|tag| self.positive.contains(tag)));
        let none = rule
            .none_of
            .as_ref()
            .is_none_or(|list| !list.iter().any(|tag| self.positive.contains(tag)));
        any && all && none
    }

    fn trace_condition(&mut self, check: &'static str, tags: &TagList, passed: bool) {
        self.push(|| TraceEvent::Condition { check, tags: names(tags), passed });
    }

    // --- Anchors -------------------------------------------------------------

    fn resolve_anchor(&mut self, rule: &Rule, inherited: &Anchor) -> Anchor {
        let mut anchor = inherited.clone();
        if let Some(candidates) = &rule.anchor {
            let resolved = candidates.iter().find(|tag| self.positive.contains(tag)).cloned();
            self.push(|| TraceEvent::Anchor {
                side: Side::Positive,
                candidates: names(candidates),
                resolved: resolved.clone(),
            });
            if resolved.is_some() {
                anchor.positive = resolved;
            }
        }
        if let Some(candidates) = &rule.anchor_negative {
            let resolved = candidates.iter().find(|tag| self.negative.contains(tag)).cloned();
            self.push(|| TraceEvent::Anchor {
                side: Side::Negative,
                candidates: names(candidates),
                resolved: resolved.clone(),
            });
            if resolved.is_some() {
                anchor.negative = resolved;
            }
        }
        anchor
    }

    // --- Bodies --------------------------------------------------------------

    fn run_tag(&mut self, mutations: &TagMutations, anchor: &Anchor) {
        if let Some(tags) = &mutations.add {
            self.positive.add(anchor.positive.as_ref(), true, tags);
            self.trace_mutation(MutationOp::Add, tags);
        }
        if let Some(tags) = &mutations.add_negative {
            self.negative.add(anchor.negative.as_ref(), true, tags);
            self.trace_mutation(MutationOp::AddNegative, tags);
        }
        if let Some(tags) = &mutations.remove {
            self.positive.remove(tags);
            self.trace_mutation(MutationOp::Remove, tags);
        }
        if let Some(tags) = &mutations.remove_negative {
            self.negative.remove(tags);
            self.trace_mutation(MutationOp::RemoveNegative, tags);
        }
        if let Some(tags) = &mutations.tmp {
            // Ephemeral anchor targets: disabled in both documents, never
            // rendered model-facing.
            self.positive.add(anchor.positive.as_ref(), false, tags);
            self.negative.add(anchor.negative.as_ref(), false, tags);
            self.trace_mutation(MutationOp::Tmp, tags);
        }
    }

    fn run_swap(
        &mut self,
        matches: &TagList,
        add: Option<&TagList>,
        add_negative: Option<&TagList>,
        inherited: &Anchor,
    ) {
        let Some(matched) = matches.iter().find(|tag| self.positive.contains(tag)).cloned() else {
            self.push(|| TraceEvent::Skipped { reason: "no match" });
            return;
        };
        self.push(|| TraceEvent::Anchor {
            side: Side::Positive,
            candidates: names(matches),
            resolved: Some(matched.clone()),
        });

        if let Some(tags) = add {
            self.positive.add(Some(&matched), true, tags);
            self.trace_mutation(MutationOp::Swap, tags);
        }
        if let Some(tags) = add_negative {
            // The matched tag anchors the negative addition too when present
            // there; otherwise fall back to the inherited negative anchor.
            let anchor = if self.negative.contains(&matched) {
                Some(&matched)
            } else {
                inherited.negative.as_ref()
            };
            self.negative.add(anchor, true, tags);
            self.trace_mutation(MutationOp::SwapNegative, tags);
        }

        self.positive.disable(&matched.name);
        self.negative.disable(&matched.name);
    }

    fn trace_mutation(&mut self, op: MutationOp, tags: &TagList) {
        self.push(|| TraceEvent::Mutation { op, tags: names(tags) });
    }
}

fn names(tags: &TagList) -> Vec<String> {
    tags.iter().map(|tag| tag.name.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::RuleList;

    fn rules(yaml: &str) -> RuleList {
        RuleList::parse_str("test.yml", yaml).unwrap()
    }

    fn run(positive: &str, negative: &str, yaml: &str) -> (String, String) {
        let mut pos = Prompt::parse(positive);
        let mut neg = Prompt::parse(negative);
        Engine::new(&mut pos, &mut neg).run(&rules(yaml));
        (pos.render(true), neg.render(true))
    }

    #[test]
    fn add_at_anchor() {
        let (pos, _) = run("red, blue", "", "- any_of: red\n  anchor: red\n  add: glow");
        assert_eq!(pos, "red, glow, blue");
    }

    #[test]
    fn conditions_gate_execution() {
        let (pos, _) = run("blue", "", "- any_of: red\n  add: glow");
        assert_eq!(pos, "blue");

        let (pos, _) = run("a, b", "", "- all_of: [a, b]\n  none_of: c\n  add: x");
        assert_eq!(pos, "a, b, x");

        let (pos, _) = run("a, b, c", "", "- all_of: [a, b]\n  none_of: c\n  add: x");
        assert_eq!(pos, "a, b, c");
    }

    #[test]
    fn anchor_weight_composes() {
        let (pos, _) = run("(red:1.5)", "", "- anchor: red\n  add: (glow:1.2)");
        assert_eq!(pos, "(red:1.5), (glow:1.8)");
    }

    #[test]
    fn group_runs_every_matching_child() {
        let yaml = "\
- type: group
  any_of: a
  children:
    - add: x
    - any_of: missing
      add: y
    - add: z";
        let (pos, _) = run("a", "", yaml);
        assert_eq!(pos, "a, x, z");
    }

    #[test]
    fn group_anchor_inherited_by_children() {
        let yaml = "\
- type: group
  anchor: red
  children:
    - add: glow
    - anchor: blue
      add: haze";
        let (pos, _) = run("red, blue", "", yaml);
        assert_eq!(pos, "red, glow, blue, haze");
    }

    #[test]
    fn switch_runs_first_matching_child_only() {
        let yaml = "\
- type: switch
  children:
    - any_of: a
      add: p
    - default: true
      add: q";
        let (pos, _) = run("a", "", yaml);
        assert_eq!(pos, "a, p");

        let (pos, _) = run("z", "", yaml);
        assert_eq!(pos, "z, q");
    }

    #[test]
    fn switch_without_default_can_run_nothing() {
        let yaml = "\
- type: switch
  children:
    - any_of: a
      add: p
    - any_of: b
      add: q";
        let (pos, _) = run("z", "", yaml);
        assert_eq!(pos, "z");
    }

    #[test]
    fn negative_mutations_target_negative_document() {
        let (pos, neg) = run(
            "portrait",
            "blurry",
            "- add: sharp focus\n  add_negative: lowres\n  remove_negative: blurry",
        );
        assert_eq!(pos, "portrait, sharp focus");
        assert_eq!(neg, "lowres");
    }

    #[test]
    fn remove_is_silent_on_absent_tags() {
        let (pos, _) = run("a", "", "- remove: missing");
        assert_eq!(pos, "a");
    }

    #[test]
    fn tmp_tags_anchor_but_never_render() {
        let yaml = "\
- tmp: slot
- anchor: slot
  add: glow
- anchor: slot
  add: haze";
        let mut pos = Prompt::parse("a");
        let mut neg = Prompt::parse("");
        Engine::new(&mut pos, &mut neg).run(&rules(yaml));
        assert_eq!(pos.render(true), "a, glow, haze");
        assert!(pos.render(false).contains("slot"));
        assert!(neg.render(false).contains("slot"));
    }

    #[test]
    fn swap_replaces_matched_tag() {
        let yaml = "\
- type: swap
  match: red dress
  add: blue dress
  add_negative: red clothes";
        let (pos, neg) = run("portrait, red dress, smile", "lowres", yaml);
        assert_eq!(pos, "portrait, blue dress, smile");
        assert_eq!(neg, "lowres, red clothes");
    }

    #[test]
    fn swap_skips_without_a_match() {
        let yaml = "- type: swap\n  match: red dress\n  add: blue dress";
        let (pos, _) = run("portrait", "", yaml);
        assert_eq!(pos, "portrait");
    }

    #[test]
    fn base_region_supplies_anchors_by_copy() {
        let base = Prompt::parse("red, green");
        let mut pos = Prompt::parse("blue");
        let mut neg = Prompt::parse("");
        Engine::with_bases(&mut pos, Some(&base), &mut neg, None)
            .run(&rules("- any_of: red\n  anchor: red\n  add: glow"));
        assert_eq!(pos.render(true), "blue, red, glow");
        assert_eq!(base.render(true), "red, green");
    }

    #[test]
    fn traced_run_records_the_walk() {
        let mut pos = Prompt::parse("a");
        let mut neg = Prompt::parse("");
        let events = Engine::new(&mut pos, &mut neg).run_traced(&rules(
            "- name: First\n  any_of: a\n  add: x\n- any_of: missing\n  add: y",
        ));

        assert!(matches!(
            &events[0],
            TraceEvent::EnterRule { label, kind: "tag", name: Some(name) }
                if label == ":root[0]" && name == "First"
        ));
        assert!(events.iter().any(|event| matches!(
            event,
            TraceEvent::Condition { check: "any_of", passed: true, .. }
        )));
        assert!(events.iter().any(|event| matches!(
            event,
            TraceEvent::Mutation { op: MutationOp::Add, .. }
        )));
        assert!(events.iter().any(|event| matches!(
            event,
            TraceEvent::Skipped { reason: "conditions not met" }
        )));
    }

    #[test]
    fn untraced_run_records_nothing() {
        let mut pos = Prompt::parse("a");
        let mut neg = Prompt::parse("");
        let mut engine = Engine::new(&mut pos, &mut neg);
        engine.run(&rules("- add: x"));
        assert!(engine.trace.is_none());
    }
}
