//! Weighted-tag algebra: parsing and rendering.
//!
//! Prompts are comma- or newline-separated tags. A tag may carry emphasis
//! through parenthesis groups: entering an unescaped `(` multiplies the
//! current weight scope by 1.1, groups nest multiplicatively, and an explicit
//! `:<ratio>` replaces the default factor for its group only. A tag remembers
//! each literal text run together with the cumulative weight in effect when
//! it was emitted (its *pieces*), so uneven emphasis inside one tag survives
//! a parse/render round trip.
//!
//! The parser is permissive by design: unmatched parens and a `:` without a
//! numeric ratio degrade to literal text instead of failing. Rendering is the
//! inverse state machine, emitting `(...)` for weight runs different from 1
//! and a `:<weight>)` closer (2 significant digits) when the run's weight is
//! not the 1.1 default.

use std::fmt;

/// A named weighted token.
///
/// Identity is by `name` only: two tags with the same name but different
/// weights are the same tag for lookup and replacement purposes.
#[derive(Debug, Clone)]
pub struct Tag {
    pub name: String,
    /// Ordered `(text, weight)` runs making up this tag.
    pub pieces: Vec<(String, f32)>,
    /// Semantic weight: the maximum over piece weights.
    pub weight: f32,
    pub enabled: bool,
}

impl Tag {
    /// Create an enabled tag from its pieces. `pieces` must be non-empty.
    pub fn new(name: impl Into<String>, pieces: Vec<(String, f32)>) -> Self {
        let weight = pieces.iter().map(|piece| piece.1).fold(0.0, f32::max);
        Self { name: name.into(), pieces, weight, enabled: true }
    }

    /// True if any piece carries a non-default weight.
    pub fn uses_weight(&self) -> bool {
        self.pieces.iter().any(|(_, weight)| *weight != 1.0)
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Tag {}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(std::iter::once(self), false))
    }
}

/// Ordered list of [`Tag`]s parsed from an input string or a rule property.
#[derive(Debug, Clone, Default)]
pub struct TagList {
    tags: Vec<Tag>,
}

impl TagList {
    /// Parse a delimited weighted-tag string. Never fails; entries that
    /// normalize to empty text are dropped.
    pub fn parse(text: &str) -> Self {
        Self { tags: TagListParser::new(text).parse() }
    }

    /// Parse a rule property value: either a delimited string or an
    /// arbitrarily nested sequence of such strings, flattened in declaration
    /// order. Non-string leaves are ignored. Returns `None` for any other
    /// value shape.
    pub fn from_value(value: &serde_yaml::Value) -> Option<Self> {
        use serde_yaml::Value;

        fn flatten(value: &Value, tags: &mut Vec<Tag>) {
            match value {
                Value::String(text) => tags.extend(TagListParser::new(text).parse()),
                Value::Sequence(items) => {
                    for item in items {
                        flatten(item, tags);
                    }
                }
                _ => {}
            }
        }

        match value {
            Value::String(_) | Value::Sequence(_) => {
                let mut tags = Vec::new();
                flatten(value, &mut tags);
                Some(Self { tags })
            }
            _ => None,
        }
    }

    /// Render back to the weighted-tag syntax. With `filter_disabled`,
    /// disabled tags are skipped entirely (the model-facing form).
    pub fn render(&self, filter_disabled: bool) -> String {
        render(self.tags.iter(), filter_disabled)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tag> {
        self.tags.iter()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Index of the first tag with the given name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.tags.iter().position(|tag| tag.name == name)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn get(&self, index: usize) -> Option<&Tag> {
        self.tags.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Tag> {
        self.tags.get_mut(index)
    }

    pub fn push(&mut self, tag: Tag) {
        self.tags.push(tag);
    }

    pub fn insert(&mut self, index: usize, tag: Tag) {
        self.tags.insert(index, tag);
    }

    /// True if any tag carries a non-default weight.
    pub fn uses_weight(&self) -> bool {
        self.tags.iter().any(Tag::uses_weight)
    }
}

impl fmt::Display for TagList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(true))
    }
}

impl<'a> IntoIterator for &'a TagList {
    type Item = &'a Tag;
    type IntoIter = std::slice::Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<Tag> for TagList {
    fn from_iter<I: IntoIterator<Item = Tag>>(iter: I) -> Self {
        Self { tags: iter.into_iter().collect() }
    }
}

// --- Parser ------------------------------------------------------------------

/// One weight scope. Scopes form a parent chain and the effective weight of a
/// piece is the product of `weight` along that chain. Scopes live in an arena
/// so that an explicit `:<ratio>` can retroactively adjust the scope that
/// earlier pieces of the same group already reference.
#[derive(Debug, Clone, Copy)]
struct Group {
    default: f32,
    parent: Option<usize>,
    weight: f32,
}

/// Accumulates the pieces of a single tag together with their scope ids.
struct TagBuilder {
    pieces: Vec<String>,
    groups: Vec<usize>,
}

impl TagBuilder {
    fn new(group: usize) -> Self {
        Self { pieces: vec![String::new()], groups: vec![group] }
    }

    fn append(&mut self, ch: char) {
        self.pieces.last_mut().unwrap().push(ch);
    }

    fn enter(&mut self, group: usize) {
        self.pieces.push(String::new());
        self.groups.push(group);
    }

    /// Normalize whitespace and build the tag, or `None` for an empty entry.
    ///
    /// Leading all-whitespace pieces are dropped; a whitespace-only piece in
    /// the middle collapses into a single trailing space on its predecessor;
    /// whitespace bordering a scope boundary collapses to one space; the
    /// whole entry is trimmed on the outer edges.
    fn build(self, arena: &[Group]) -> Option<Tag> {
        let mut pieces = self.pieces;
        let mut groups = self.groups;

        while let Some(first) = pieces.first() {
            if first.trim().is_empty() {
                pieces.remove(0);
                groups.remove(0);
            } else {
                break;
            }
        }
        if pieces.is_empty() {
            return None;
        }

        let mut index = 1;
        while index < pieces.len() {
            if pieces[index].is_empty() {
                pieces.remove(index);
                groups.remove(index);
            } else if pieces[index].trim().is_empty() {
                pieces[index - 1] = format!("{} ", pieces[index - 1].trim_end());
                pieces.remove(index);
                groups.remove(index);
            } else if pieces[index].starts_with(char::is_whitespace) {
                pieces[index - 1] = format!("{} ", pieces[index - 1].trim_end());
                pieces[index] = pieces[index].trim_start().to_string();
                index += 1;
            } else {
                index += 1;
            }
        }

        pieces[0] = pieces[0].trim_start().to_string();
        let last = pieces.len() - 1;
        pieces[last] = pieces[last].trim_end().to_string();

        let name = pieces.concat();
        let weighted = pieces
            .into_iter()
            .zip(groups.into_iter().map(|group| effective_weight(arena, group)))
            .collect();
        Some(Tag::new(name, weighted))
    }
}

fn effective_weight(arena: &[Group], mut group: usize) -> f32 {
    let mut weight = arena[group].weight;
    while let Some(parent) = arena[group].parent {
        group = parent;
        weight *= arena[parent].weight;
    }
    weight
}

/// Character machine turning an input string into tags.
struct TagListParser {
    chars: Vec<char>,
    index: usize,
    arena: Vec<Group>,
    current: usize,
    builders: Vec<TagBuilder>,
}

impl TagListParser {
    fn new(text: &str) -> Self {
        let arena = vec![Group { default: 1.0, parent: None, weight: 1.0 }];
        Self {
            chars: text.chars().collect(),
            index: 0,
            arena,
            current: 0,
            builders: vec![TagBuilder::new(0)],
        }
    }

    fn push_group(&mut self, default: f32, parent: Option<usize>) -> usize {
        self.arena.push(Group { default, parent, weight: default });
        self.arena.len() - 1
    }

    fn parse(mut self) -> Vec<Tag> {
        while self.index < self.chars.len() {
            let current = self.chars[self.index];
            let previous = self.index.checked_sub(1).map(|i| self.chars[i]);

            if current == '(' && previous != Some('\\') {
                self.current = self.push_group(1.1, Some(self.current));
                self.builders.last_mut().unwrap().enter(self.current);
            } else if current == ')' && previous != Some('\\') {
                self.current = match self.arena[self.current].parent {
                    Some(parent) => parent,
                    None => self.push_group(1.0, None),
                };
                self.builders.last_mut().unwrap().enter(self.current);
            } else if current == ':' && self.scan_ratio() {
                let Group { default, parent, .. } = self.arena[self.current];
                self.current = self.push_group(default, parent);
                self.builders.last_mut().unwrap().enter(self.current);
            } else if current == ',' || current == '\n' {
                // Reset the scope weight to its default so an explicit ratio
                // does not leak into the next entry of the same group.
                let Group { default, parent, .. } = self.arena[self.current];
                self.current = self.push_group(default, parent);
                self.builders.push(TagBuilder::new(self.current));
            } else {
                self.builders.last_mut().unwrap().append(current);
            }

            self.index += 1;
        }

        let arena = self.arena;
        self.builders.into_iter().filter_map(|builder| builder.build(&arena)).collect()
    }

    /// Try to read an explicit `:<ratio>` at the current `:`. On success the
    /// current scope's weight is replaced and the consumed characters are
    /// skipped; on failure the `:` stays literal text.
    fn scan_ratio(&mut self) -> bool {
        let start = self.index + 1;
        let mut end = start;

        while end < self.chars.len() {
            let ch = self.chars[end];
            if ch == '.' || ch.is_ascii_digit() || ch.is_whitespace() {
                end += 1;
            } else {
                break;
            }
        }

        let run: String = self.chars[start..end].iter().collect();
        let found = regex!(r"\d*\.\d+|\d+\.?\d*").find(&run);

        match found.and_then(|m| m.as_str().parse::<f32>().ok()) {
            Some(ratio) => {
                self.arena[self.current].weight = ratio;
                self.index += run.trim_end().chars().count();
                true
            }
            None => false,
        }
    }
}

// --- Renderer ----------------------------------------------------------------

/// Render tags in order, tracking the open weight run and emitting `", "`
/// separators lazily (only once a following non-empty token is about to be
/// emitted, mirroring the parser's tolerance for trailing separators).
pub(crate) fn render<'a>(tags: impl Iterator<Item = &'a Tag>, filter_disabled: bool) -> String {
    let mut out = String::new();
    let mut divide = false;
    let mut weight = 1.0f32;

    for tag in tags {
        if filter_disabled && !tag.enabled {
            continue;
        }

        for (text, piece_weight) in &tag.pieces {
            if *piece_weight != weight {
                if weight != 1.0 {
                    out.push_str(&group_end(weight));
                }
                if divide {
                    out.push_str(", ");
                    divide = false;
                }
                if *piece_weight != 1.0 {
                    out.push('(');
                }
                weight = *piece_weight;
            } else if divide {
                out.push_str(", ");
                divide = false;
            }
            out.push_str(text);
        }

        divide = true;
    }

    if weight != 1.0 {
        out.push_str(&group_end(weight));
    }
    out
}

fn group_end(weight: f32) -> String {
    if weight != 1.1 { format!(":{})", format_weight(weight)) } else { ")".to_string() }
}

/// Format a weight with 2 significant digits, trimming trailing zeros
/// (`1.3`, `1`, `2`, `0.85`).
fn format_weight(weight: f32) -> String {
    let digits = if weight > 0.0 { (1 - weight.log10().floor() as i32).max(0) as usize } else { 0 };
    let mut text = format!("{weight:.digits$}");
    if text.contains('.') {
        while text.ends_with('0') {
            text.pop();
        }
        if text.ends_with('.') {
            text.pop();
        }
    }
    text
}
