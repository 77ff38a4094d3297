//! Prompt documents with anchor-based mutation, and BREAK-divided regions.
//!
//! A [`Prompt`] is a mutable tag sequence. Insertions resolve an anchor in
//! two steps: the *semantic* anchor is the document tag whose name matches
//! the requested anchor (it supplies the weight context), and the
//! *positional* anchor is found by following the chain of tags previously
//! inserted at that same anchor, so a rule that adds several tags "after X"
//! sees them land in declaration order instead of all competing for the slot
//! right after X.
//!
//! A [`RegionPrompt`] splits raw input on the `BREAK` divider. Region 0 is
//! the base; later regions inherit from it read-through-only: a lookup or
//! anchor resolution that misses locally falls through to the base, and an
//! anchor found only in the base is copied into the region on first
//! reference, never aliased.

use std::collections::HashMap;
use std::fmt;

use crate::tags::{Tag, TagList};

/// One working prompt document.
#[derive(Debug, Clone, Default)]
pub struct Prompt {
    tags: TagList,
    /// Forward bindings: semantic anchor name -> name of the tag most
    /// recently inserted at that anchor.
    bind: HashMap<String, String>,
}

impl Prompt {
    pub fn parse(text: &str) -> Self {
        Self { tags: TagList::parse(text), bind: HashMap::new() }
    }

    /// True if a tag with this name is present (enabled or not).
    pub fn contains(&self, tag: &Tag) -> bool {
        self.tags.contains_name(&tag.name)
    }

    /// Containment with read-through to the base region.
    pub fn contains_in(&self, base: Option<&Prompt>, tag: &Tag) -> bool {
        self.contains(tag) || base.is_some_and(|base| base.contains(tag))
    }

    /// Insert or update tags at the given anchor.
    ///
    /// Incoming piece weights are composed multiplicatively with the anchor's
    /// current weight (1 without an anchor). A tag already present is updated
    /// in place: `enabled` is always taken from the mutation, and pieces are
    /// replaced when the new weight is greater than or equal to the existing
    /// one, so a same-weight re-add still refreshes them. New tags insert
    /// right after the positional anchor, or append at the end when there is
    /// no anchor.
    pub fn add(&mut self, base: Option<&Prompt>, anchor: Option<&Tag>, enabled: bool, tags: &TagList) {
        // Resolve the semantic anchor, copying it in from the base region on
        // a local miss.
        let mut anchor_index = anchor.and_then(|anchor| self.tags.position(&anchor.name));
        if anchor_index.is_none() {
            if let (Some(anchor), Some(base)) = (anchor, base) {
                if let Some(found) = base.tags.position(&anchor.name).and_then(|i| base.tags.get(i)) {
                    self.tags.push(found.clone());
                    anchor_index = Some(self.tags.len() - 1);
                }
            }
        }

        let (anchor_key, anchor_weight) = match anchor_index.and_then(|index| self.tags.get(index)) {
            Some(found) => (Some(found.name.clone()), found.weight),
            None => (None, 1.0),
        };

        // Resolve the positional anchor by following the forward bindings to
        // the last tag inserted at this anchor.
        let mut position = anchor_index;
        if let Some(key) = &anchor_key {
            let mut current = key.clone();
            while let Some(next) = self.bind.get(&current) {
                current = next.clone();
            }
            position = self.tags.position(&current).or(anchor_index);
        }

        for tag in tags {
            let pieces = tag
                .pieces
                .iter()
                .map(|(text, weight)| (text.clone(), anchor_weight * weight))
                .collect();
            let mut new_tag = Tag::new(tag.name.clone(), pieces);
            new_tag.enabled = enabled;

            if let Some(existing) = self.tags.position(&tag.name).and_then(|i| self.tags.get_mut(i)) {
                existing.enabled = enabled;
                if new_tag.weight >= existing.weight {
                    existing.pieces = new_tag.pieces;
                    existing.weight = new_tag.weight;
                }
            } else if let (Some(key), Some(at)) = (&anchor_key, position) {
                self.tags.insert(at + 1, new_tag);
                self.bind.insert(key.clone(), tag.name.clone());
                position = Some(at + 1);
            } else {
                self.tags.push(new_tag);
            }
        }
    }

    /// Disable every listed tag that is present; absentees are ignored.
    pub fn remove(&mut self, tags: &TagList) {
        for tag in tags {
            self.disable(&tag.name);
        }
    }

    /// Disable a single tag by name, if present.
    pub fn disable(&mut self, name: &str) {
        if let Some(tag) = self.tags.position(name).and_then(|i| self.tags.get_mut(i)) {
            tag.enabled = false;
        }
    }

    pub fn tags(&self) -> &TagList {
        &self.tags
    }

    pub fn render(&self, filter_disabled: bool) -> String {
        self.tags.render(filter_disabled)
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(true))
    }
}

// --- Regions -----------------------------------------------------------------

/// The divider keyword separating prompt regions.
pub const REGION_DIVIDER: &str = "BREAK";

/// Ordered sequence of region prompts split on [`REGION_DIVIDER`].
#[derive(Debug, Clone)]
pub struct RegionPrompt {
    regions: Vec<Prompt>,
}

impl RegionPrompt {
    /// Split raw input on the divider. The input always yields at least one
    /// region, even when empty.
    pub fn parse(text: &str) -> Self {
        let regions = regex!(r"\bBREAK\b").split(text).map(Prompt::parse).collect();
        Self { regions }
    }

    /// Number of declared regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Prompt> {
        self.regions.get(index)
    }

    /// Ensure a region exists at `index`, lazily appending empty
    /// base-parented regions, and return it.
    pub fn get_or_create(&mut self, index: usize) -> &mut Prompt {
        while self.regions.len() <= index {
            self.regions.push(Prompt::default());
        }
        &mut self.regions[index]
    }

    /// Borrow a region for mutation together with a read-only view of the
    /// base region it inherits from. Region 0 has no base. The region must
    /// already exist (see [`Self::get_or_create`]).
    pub fn region_pair(&mut self, index: usize) -> (&mut Prompt, Option<&Prompt>) {
        if index == 0 {
            (&mut self.regions[0], None)
        } else {
            let (head, tail) = self.regions.split_at_mut(index);
            (&mut tail[0], Some(&head[0]))
        }
    }

    /// Render all regions, re-joining non-empty ones with the divider.
    /// Trailing empty regions are trimmed along the way.
    pub fn render(&self, filter_disabled: bool) -> String {
        self.regions
            .iter()
            .map(|region| region.render(filter_disabled))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(&*format!("\n{REGION_DIVIDER}\n"))
    }
}

impl fmt::Display for RegionPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(name: &str) -> Tag {
        Tag::new(name, vec![(name.to_string(), 1.0)])
    }

    fn doc_names(prompt: &Prompt) -> Vec<&str> {
        prompt.tags().iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn add_inserts_after_anchor_and_chains() {
        let mut prompt = Prompt::parse("X, last");

        prompt.add(None, Some(&tag("X")), true, &TagList::parse("(Y:1.2)"));
        assert_eq!(doc_names(&prompt), ["X", "Y", "last"]);
        assert!((prompt.tags().get(1).unwrap().weight - 1.2).abs() < 1e-4);

        // A second add at the same anchor lands after Y, not after X.
        prompt.add(None, Some(&tag("X")), true, &TagList::parse("Z"));
        assert_eq!(doc_names(&prompt), ["X", "Y", "Z", "last"]);
    }

    #[test]
    fn add_chains_within_one_call() {
        let mut prompt = Prompt::parse("X, last");
        prompt.add(None, Some(&tag("X")), true, &TagList::parse("a, b, c"));
        assert_eq!(doc_names(&prompt), ["X", "a", "b", "c", "last"]);
    }

    #[test]
    fn add_composes_anchor_weight() {
        let mut prompt = Prompt::parse("(X:1.5), b");
        prompt.add(None, Some(&tag("X")), true, &TagList::parse("(Y:1.2)"));
        let y = prompt.tags().get(1).unwrap();
        assert_eq!(y.name, "Y");
        assert!((y.weight - 1.8).abs() < 1e-4);
    }

    #[test]
    fn add_without_anchor_appends() {
        let mut prompt = Prompt::parse("a, b");
        prompt.add(None, None, true, &TagList::parse("c"));
        assert_eq!(doc_names(&prompt), ["a", "b", "c"]);
    }

    #[test]
    fn add_with_absent_anchor_appends() {
        let mut prompt = Prompt::parse("a, b");
        prompt.add(None, Some(&tag("missing")), true, &TagList::parse("c"));
        assert_eq!(doc_names(&prompt), ["a", "b", "c"]);
    }

    #[test]
    fn readd_takes_stronger_weight() {
        let mut prompt = Prompt::parse("a, x");
        prompt.add(None, None, true, &TagList::parse("(x:1.4)"));
        assert_eq!(doc_names(&prompt), ["a", "x"]);
        assert!((prompt.tags().get(1).unwrap().weight - 1.4).abs() < 1e-4);

        // A weaker re-add keeps the stronger pieces.
        prompt.add(None, None, true, &TagList::parse("(x:1.1)"));
        assert!((prompt.tags().get(1).unwrap().weight - 1.4).abs() < 1e-4);
    }

    #[test]
    fn equal_weight_readd_refreshes() {
        let mut prompt = Prompt::parse("x");
        prompt.remove(&TagList::parse("x"));
        assert_eq!(prompt.render(true), "");

        // Same weight: pieces and enabled state are refreshed.
        prompt.add(None, None, true, &TagList::parse("x"));
        assert_eq!(prompt.render(true), "x");
    }

    #[test]
    fn readd_disabled_tag_reenables_in_place() {
        let mut prompt = Prompt::parse("a, x, b");
        prompt.remove(&TagList::parse("x"));
        prompt.add(None, None, true, &TagList::parse("x"));
        assert_eq!(prompt.render(true), "a, x, b");
    }

    #[test]
    fn remove_absent_tag_is_noop() {
        let mut prompt = Prompt::parse("a, b");
        prompt.remove(&TagList::parse("missing"));
        assert_eq!(prompt.render(true), "a, b");
    }

    #[test]
    fn remove_disables_without_deleting() {
        let mut prompt = Prompt::parse("a, b, c");
        prompt.remove(&TagList::parse("b"));
        assert_eq!(prompt.render(true), "a, c");
        assert_eq!(prompt.render(false), "a, b, c");
    }

    #[test]
    fn add_copies_anchor_from_base() {
        let base = Prompt::parse("red, smile");
        let mut region = Prompt::parse("blue");

        region.add(Some(&base), Some(&tag("red")), true, &TagList::parse("glow"));
        assert_eq!(doc_names(&region), ["blue", "red", "glow"]);
        assert_eq!(doc_names(&base), ["red", "smile"]);
    }

    #[test]
    fn contains_in_reads_through_base() {
        let base = Prompt::parse("red");
        let region = Prompt::parse("blue");
        assert!(region.contains_in(Some(&base), &tag("red")));
        assert!(region.contains_in(Some(&base), &tag("blue")));
        assert!(!region.contains_in(Some(&base), &tag("green")));
        assert!(!region.contains(&tag("red")));
    }

    #[test]
    fn region_parse_and_render() {
        let regions = RegionPrompt::parse("red BREAK blue");
        assert_eq!(regions.len(), 2);
        assert_eq!(regions.get(0).unwrap().render(true), "red");
        assert_eq!(regions.get(1).unwrap().render(true), "blue");
        assert_eq!(regions.render(true), "red\nBREAK\nblue");
    }

    #[test]
    fn region_divider_requires_word_boundary() {
        let regions = RegionPrompt::parse("daybreak, BREAKFAST");
        assert_eq!(regions.len(), 1);
    }

    #[test]
    fn region_get_or_create_extends_lazily() {
        let mut regions = RegionPrompt::parse("red");
        assert_eq!(regions.len(), 1);
        regions.get_or_create(2);
        assert_eq!(regions.len(), 3);
        assert_eq!(regions.render(true), "red");
    }

    #[test]
    fn region_render_skips_empty_regions() {
        let regions = RegionPrompt::parse("red BREAK BREAK blue");
        assert_eq!(regions.len(), 3);
        assert_eq!(regions.render(true), "red\nBREAK\nblue");
    }

    #[test]
    fn region_pair_splits_mutation_from_base() {
        let mut regions = RegionPrompt::parse("red BREAK blue");
        let (region, base) = regions.region_pair(1);
        region.add(base, Some(&tag("red")), true, &TagList::parse("glow"));

        assert_eq!(regions.get(1).unwrap().render(true), "blue, red, glow");
        assert_eq!(regions.get(0).unwrap().render(true), "red");
    }
}
