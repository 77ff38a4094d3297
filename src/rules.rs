//! Rule model and validating parser.
//!
//! Rule sources are YAML sequences of mapping nodes. Parsing turns the
//! untyped tree into a closed [`Rule`] sum type, dispatching on the `type`
//! property: absent means a leaf tag rule, `group` and `switch` are
//! structural, `swap` substitutes a matched tag. Validation is depth-first
//! and fail-fast: the first invalid node aborts the whole source with a
//! [`ValidationError`](crate::ValidationError) carrying the exact node path.
//!
//! Conditions, anchors, removal lists and swap matches are lookup lists and
//! must not carry weight modifiers; add lists may.

use serde_yaml::{Mapping, Value};

use crate::error::{Error, Result, ValidationError};
use crate::tags::TagList;

/// A validated rewrite rule: shared condition/anchor payload plus a
/// variant-specific body.
#[derive(Debug, Clone)]
pub struct Rule {
    /// Optional display label (whitespace-collapsed, `^[\w \-]+$`).
    pub name: Option<String>,
    /// Passes when at least one listed tag is contained in the positive document.
    pub any_of: Option<TagList>,
    /// Passes when every listed tag is contained.
    pub all_of: Option<TagList>,
    /// Passes when none of the listed tags are contained.
    pub none_of: Option<TagList>,
    /// Insertion-point candidates in the positive document.
    pub anchor: Option<TagList>,
    /// Insertion-point candidates in the negative document.
    pub anchor_negative: Option<TagList>,
    pub kind: RuleKind,
}

#[derive(Debug, Clone)]
pub enum RuleKind {
    /// Leaf mutations applied to the documents.
    Tag(TagMutations),
    /// Runs every child whose conditions match.
    Group { children: Vec<Rule> },
    /// Runs the first child whose conditions match, or the default child.
    /// `default` is the child's index in `children`.
    Switch { children: Vec<Rule>, default: Option<usize> },
    /// Replaces the first matched tag with differently-weighted additions.
    Swap { matches: TagList, add: Option<TagList>, add_negative: Option<TagList> },
}

#[derive(Debug, Clone, Default)]
pub struct TagMutations {
    pub add: Option<TagList>,
    pub add_negative: Option<TagList>,
    pub remove: Option<TagList>,
    pub remove_negative: Option<TagList>,
    /// Ephemeral disabled insertions usable only as anchor targets.
    pub tmp: Option<TagList>,
}

impl Rule {
    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            RuleKind::Tag(_) => "tag",
            RuleKind::Group { .. } => "group",
            RuleKind::Switch { .. } => "switch",
            RuleKind::Swap { .. } => "swap",
        }
    }
}

/// Typed list of top-level rules parsed from one source.
#[derive(Debug, Clone, Default)]
pub struct RuleList {
    rules: Vec<Rule>,
}

impl RuleList {
    /// Parse an untyped YAML document. `source_name` roots the error path.
    /// An empty document yields an empty list; a non-sequence document fails.
    pub fn parse(source_name: &str, value: &Value) -> Result<Self> {
        let mut cursor = Cursor::new(source_name);
        match value {
            Value::Null => Ok(Self::default()),
            Value::Sequence(nodes) => Ok(Self { rules: parse_rules(&mut cursor, nodes)? }),
            _ => Err(cursor.fail("rules must be a sequence")),
        }
    }

    /// Parse rule source text.
    pub fn parse_str(source_name: &str, text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_yaml::from_str(text)?;
        Self::parse(source_name, &value)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<'a> IntoIterator for &'a RuleList {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// --- Validation cursor -------------------------------------------------------

/// Tracks the location inside the rule tree for error reporting, e.g.
/// `rules.yml[0](My Rule).children[2].add`.
struct Cursor {
    path: Vec<String>,
}

impl Cursor {
    fn new(root: &str) -> Self {
        Self { path: vec![root.to_string()] }
    }

    fn enter_node(&mut self, index: usize) {
        self.path.push(format!("[{index}]"));
    }

    fn note_name(&mut self, name: &str) {
        if let Some(last) = self.path.last_mut() {
            last.push_str(&format!("({name})"));
        }
    }

    fn enter_prop(&mut self, key: &str) {
        self.path.push(format!(".{key}"));
    }

    fn leave(&mut self) {
        self.path.pop();
    }

    fn fail(&self, message: impl Into<String>) -> Error {
        Error::Validation(ValidationError { path: self.path.concat(), message: message.into() })
    }

    fn fail_prop(&mut self, key: &str, message: impl Into<String>) -> Error {
        self.enter_prop(key);
        let error = self.fail(message);
        self.leave();
        error
    }
}

// --- Parsing -----------------------------------------------------------------

fn lookup<'a>(map: &'a Mapping, key: &str) -> Option<&'a Value> {
    map.iter().find(|(k, _)| k.as_str() == Some(key)).map(|(_, v)| v)
}

fn parse_rules(cursor: &mut Cursor, nodes: &[Value]) -> Result<Vec<Rule>> {
    let mut rules = Vec::with_capacity(nodes.len());

    for (index, node) in nodes.iter().enumerate() {
        cursor.enter_node(index);
        let Some(map) = node.as_mapping() else {
            return Err(cursor.fail("rule must be a mapping"));
        };

        let name = parse_name(cursor, map)?;
        if let Some(name) = &name {
            cursor.note_name(name);
        }

        let rule = match lookup(map, "type") {
            None => parse_tag_rule(cursor, map, name)?,
            Some(value) => match value.as_str() {
                Some("group") => parse_group_rule(cursor, map, name)?,
                Some("switch") => parse_switch_rule(cursor, map, name)?,
                Some("swap") => parse_swap_rule(cursor, map, name)?,
                Some(other) => {
                    return Err(cursor.fail_prop("type", format!("'{other}' type is not supported")));
                }
                None => return Err(cursor.fail_prop("type", "type must be a string")),
            },
        };

        rules.push(rule);
        cursor.leave();
    }

    Ok(rules)
}

fn parse_name(cursor: &mut Cursor, map: &Mapping) -> Result<Option<String>> {
    let Some(value) = lookup(map, "name") else {
        return Ok(None);
    };
    let Some(raw) = value.as_str() else {
        return Err(cursor.fail_prop("name", "name must be a string"));
    };

    let clean = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if clean.is_empty() {
        Err(cursor.fail_prop("name", "name cannot be empty"))
    } else if !regex!(r"^[\w \-]+$").is_match(&clean) {
        Err(cursor.fail_prop("name", "name contains invalid characters"))
    } else {
        Ok(Some(clean))
    }
}

/// Condition and anchor payload shared by every variant.
#[derive(Default)]
struct Shared {
    any_of: Option<TagList>,
    all_of: Option<TagList>,
    none_of: Option<TagList>,
    anchor: Option<TagList>,
    anchor_negative: Option<TagList>,
}

impl Shared {
    /// Absorb a condition property; returns false when the key is not one.
    fn absorb_condition(&mut self, cursor: &mut Cursor, key: &str, value: &Value) -> Result<bool> {
        let slot = match key {
            "any_of" => &mut self.any_of,
            "all_of" => &mut self.all_of,
            "none_of" => &mut self.none_of,
            _ => return Ok(false),
        };
        *slot = Some(parse_tag_prop(cursor, key, value, false)?);
        Ok(true)
    }

    /// Absorb an anchor property; returns false when the key is not one.
    fn absorb_anchor(&mut self, cursor: &mut Cursor, key: &str, value: &Value) -> Result<bool> {
        let slot = match key {
            "anchor" => &mut self.anchor,
            "anchor_negative" => &mut self.anchor_negative,
            _ => return Ok(false),
        };
        *slot = Some(parse_tag_prop(cursor, key, value, false)?);
        Ok(true)
    }

    /// none_of must not contradict any_of/all_of.
    fn check_contradictions(&self, cursor: &mut Cursor) -> Result<()> {
        let Some(none_of) = &self.none_of else {
            return Ok(());
        };
        for tag in none_of {
            let conflicting = self.any_of.as_ref().is_some_and(|t| t.contains_name(&tag.name))
                || self.all_of.as_ref().is_some_and(|t| t.contains_name(&tag.name));
            if conflicting {
                return Err(cursor.fail_prop(
                    "none_of",
                    format!("'{}' conflicts with any_of or all_of", tag.name),
                ));
            }
        }
        Ok(())
    }

    fn into_rule(self, name: Option<String>, kind: RuleKind) -> Rule {
        Rule {
            name,
            any_of: self.any_of,
            all_of: self.all_of,
            none_of: self.none_of,
            anchor: self.anchor,
            anchor_negative: self.anchor_negative,
            kind,
        }
    }
}

fn require_key<'a>(cursor: &mut Cursor, key: &'a Value) -> Result<&'a str> {
    key.as_str().ok_or_else(|| cursor.fail("property names must be strings"))
}

fn unsupported(cursor: &mut Cursor, key: &str) -> Error {
    cursor.fail_prop(key, format!("'{key}' property is not supported"))
}

/// Parse a tag-list-valued property: a delimited string or a nested sequence
/// of strings. `weights` controls whether weight modifiers are permitted.
fn parse_tag_prop(cursor: &mut Cursor, key: &str, value: &Value, weights: bool) -> Result<TagList> {
    let Some(tags) = TagList::from_value(value) else {
        return Err(cursor.fail_prop(key, format!("{key} must be a string or a sequence")));
    };
    if tags.is_empty() {
        Err(cursor.fail_prop(key, format!("{key} cannot be empty")))
    } else if !weights && tags.uses_weight() {
        Err(cursor.fail_prop(key, format!("{key} cannot contain weights")))
    } else {
        Ok(tags)
    }
}

fn parse_tag_rule(cursor: &mut Cursor, map: &Mapping, name: Option<String>) -> Result<Rule> {
    let mut shared = Shared::default();
    let mut mutations = TagMutations::default();

    for (key, value) in map {
        let key = require_key(cursor, key)?;
        if matches!(key, "name" | "type")
            || shared.absorb_condition(cursor, key, value)?
            || shared.absorb_anchor(cursor, key, value)?
        {
            continue;
        }
        match key {
            "add" => mutations.add = Some(parse_tag_prop(cursor, key, value, true)?),
            "add_negative" => mutations.add_negative = Some(parse_tag_prop(cursor, key, value, true)?),
            "remove" => mutations.remove = Some(parse_tag_prop(cursor, key, value, false)?),
            "remove_negative" => {
                mutations.remove_negative = Some(parse_tag_prop(cursor, key, value, false)?);
            }
            "tmp" => mutations.tmp = Some(parse_tag_prop(cursor, key, value, true)?),
            _ => return Err(unsupported(cursor, key)),
        }
    }

    let empty = mutations.add.is_none()
        && mutations.add_negative.is_none()
        && mutations.remove.is_none()
        && mutations.remove_negative.is_none()
        && mutations.tmp.is_none();
    if empty {
        return Err(cursor.fail("a tag property is required"));
    }

    shared.check_contradictions(cursor)?;
    Ok(shared.into_rule(name, RuleKind::Tag(mutations)))
}

fn parse_group_rule(cursor: &mut Cursor, map: &Mapping, name: Option<String>) -> Result<Rule> {
    let mut shared = Shared::default();
    let mut children = None;

    for (key, value) in map {
        let key = require_key(cursor, key)?;
        if matches!(key, "name" | "type")
            || shared.absorb_condition(cursor, key, value)?
            || shared.absorb_anchor(cursor, key, value)?
        {
            continue;
        }
        match key {
            "children" => {
                let Some(nodes) = value.as_sequence() else {
                    return Err(cursor.fail_prop("children", "children must be a sequence"));
                };
                if nodes.is_empty() {
                    return Err(cursor.fail_prop("children", "children cannot be empty"));
                }
                cursor.enter_prop("children");
                children = Some(parse_rules(cursor, nodes)?);
                cursor.leave();
            }
            _ => return Err(unsupported(cursor, key)),
        }
    }

    let Some(children) = children else {
        return Err(cursor.fail("children property is required"));
    };

    shared.check_contradictions(cursor)?;
    Ok(shared.into_rule(name, RuleKind::Group { children }))
}

fn parse_switch_rule(cursor: &mut Cursor, map: &Mapping, name: Option<String>) -> Result<Rule> {
    let mut shared = Shared::default();
    let mut parsed = None;

    for (key, value) in map {
        let key = require_key(cursor, key)?;
        if matches!(key, "name" | "type")
            || shared.absorb_condition(cursor, key, value)?
            || shared.absorb_anchor(cursor, key, value)?
        {
            continue;
        }
        match key {
            "children" => parsed = Some(parse_switch_children(cursor, value)?),
            _ => return Err(unsupported(cursor, key)),
        }
    }

    let Some((children, default)) = parsed else {
        return Err(cursor.fail("children property is required"));
    };

    shared.check_contradictions(cursor)?;
    Ok(shared.into_rule(name, RuleKind::Switch { children, default }))
}

/// Parse switch children, extracting the optional `default: true` child.
/// The default child is stripped of the flag before regular rule parsing,
/// must carry no conditions, and is tracked by its original index.
fn parse_switch_children(cursor: &mut Cursor, value: &Value) -> Result<(Vec<Rule>, Option<usize>)> {
    let Some(nodes) = value.as_sequence() else {
        return Err(cursor.fail_prop("children", "children must be a sequence"));
    };
    if nodes.is_empty() {
        return Err(cursor.fail_prop("children", "children cannot be empty"));
    }

    cursor.enter_prop("children");
    let mut default = None;
    let mut stripped: Vec<Value> = Vec::with_capacity(nodes.len());

    for (index, node) in nodes.iter().enumerate() {
        let Some(map) = node.as_mapping() else {
            cursor.enter_node(index);
            return Err(cursor.fail("rule must be a mapping"));
        };

        match lookup(map, "default") {
            None => stripped.push(node.clone()),
            Some(Value::Bool(true)) => {
                cursor.enter_node(index);
                if default.is_some() {
                    return Err(cursor.fail("default rule is already in use"));
                }
                let conditioned =
                    ["any_of", "all_of", "none_of"].iter().any(|key| lookup(map, key).is_some());
                if conditioned {
                    return Err(cursor.fail("default rule cannot contain conditions"));
                }
                default = Some(index);
                let copy: Mapping = map
                    .iter()
                    .filter(|(key, _)| key.as_str() != Some("default"))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                stripped.push(Value::Mapping(copy));
                cursor.leave();
            }
            Some(Value::Bool(false)) => {
                cursor.enter_node(index);
                return Err(cursor.fail_prop("default", "default must be true"));
            }
            Some(_) => {
                cursor.enter_node(index);
                return Err(cursor.fail_prop("default", "default must be a bool"));
            }
        }
    }

    let children = parse_rules(cursor, &stripped)?;
    cursor.leave();
    Ok((children, default))
}

fn parse_swap_rule(cursor: &mut Cursor, map: &Mapping, name: Option<String>) -> Result<Rule> {
    let mut shared = Shared::default();
    let mut matches = None;
    let mut add = None;
    let mut add_negative = None;

    for (key, value) in map {
        let key = require_key(cursor, key)?;
        if matches!(key, "name" | "type") || shared.absorb_condition(cursor, key, value)? {
            continue;
        }
        // The matched tag is the swap's own anchor, so anchor properties are
        // rejected through the unsupported fallthrough.
        match key {
            "match" => matches = Some(parse_tag_prop(cursor, key, value, false)?),
            "add" => add = Some(parse_tag_prop(cursor, key, value, true)?),
            "add_negative" => add_negative = Some(parse_tag_prop(cursor, key, value, true)?),
            _ => return Err(unsupported(cursor, key)),
        }
    }

    let Some(matches) = matches else {
        return Err(cursor.fail("match property is required"));
    };
    if add.is_none() && add_negative.is_none() {
        return Err(cursor.fail("an add or add_negative property is required"));
    }

    shared.check_contradictions(cursor)?;
    Ok(shared.into_rule(name, RuleKind::Swap { matches, add, add_negative }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Result<RuleList> {
        RuleList::parse_str("test.yml", yaml)
    }

    fn error_of(yaml: &str) -> ValidationError {
        match parse(yaml).unwrap_err() {
            Error::Validation(err) => err,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn parses_minimal_tag_rule() {
        let rules = parse("- add: glow\n  anchor: red").unwrap();
        assert_eq!(rules.len(), 1);
        let rule = rules.iter().next().unwrap();
        assert_eq!(rule.kind_label(), "tag");
        assert!(rule.anchor.is_some());
        match &rule.kind {
            RuleKind::Tag(m) => assert_eq!(m.add.as_ref().unwrap().len(), 1),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn empty_source_yields_no_rules() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("# only a comment\n").unwrap().is_empty());
    }

    #[test]
    fn non_sequence_source_fails() {
        let err = error_of("add: glow");
        assert_eq!(err.path, "test.yml");
        assert!(err.message.contains("sequence"));
    }

    #[test]
    fn unsupported_type_fails() {
        let err = error_of("- type: banana\n  add: x");
        assert_eq!(err.path, "test.yml[0].type");
        assert!(err.message.contains("'banana' type is not supported"));
    }

    #[test]
    fn unsupported_property_fails_with_path() {
        let err = error_of("- name: My Rule\n  add: x\n  bogus: 1");
        assert_eq!(err.path, "test.yml[0](My Rule).bogus");
        assert!(err.message.contains("'bogus' property is not supported"));
    }

    #[test]
    fn tag_rule_requires_a_mutation() {
        let err = error_of("- any_of: a");
        assert_eq!(err.path, "test.yml[0]");
        assert!(err.message.contains("tag property is required"));
    }

    #[test]
    fn group_requires_nonempty_children() {
        let err = error_of("- type: group\n  children: []");
        assert_eq!(err.path, "test.yml[0].children");
        assert!(err.message.contains("children"));

        let err = error_of("- type: group");
        assert_eq!(err.path, "test.yml[0]");
        assert!(err.message.contains("children property is required"));
    }

    #[test]
    fn nested_child_errors_carry_full_path() {
        let err = error_of(
            "- type: group\n  children:\n    - add: x\n    - remove: (y:1.2)",
        );
        assert_eq!(err.path, "test.yml[0].children[1].remove");
        assert!(err.message.contains("remove cannot contain weights"));
    }

    #[test]
    fn conditions_reject_weights() {
        let err = error_of("- any_of: (a:1.2)\n  add: x");
        assert_eq!(err.path, "test.yml[0].any_of");
        assert!(err.message.contains("any_of cannot contain weights"));
    }

    #[test]
    fn anchors_reject_weights() {
        let err = error_of("- anchor: (a:1.2)\n  add: x");
        assert!(err.message.contains("anchor cannot contain weights"));
    }

    #[test]
    fn add_allows_weights() {
        let rules = parse("- add: (glow:1.3)").unwrap();
        match &rules.iter().next().unwrap().kind {
            RuleKind::Tag(m) => assert!(m.add.as_ref().unwrap().uses_weight()),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn empty_tag_prop_fails() {
        let err = error_of("- add: ''");
        assert_eq!(err.path, "test.yml[0].add");
        assert!(err.message.contains("add cannot be empty"));
    }

    #[test]
    fn none_of_conflict_fails() {
        let err = error_of("- any_of: [a, b]\n  none_of: b\n  add: x");
        assert_eq!(err.path, "test.yml[0].none_of");
        assert!(err.message.contains("conflicts"));
    }

    #[test]
    fn name_validation() {
        let err = error_of("- name: '  '\n  add: x");
        assert!(err.message.contains("name cannot be empty"));

        let err = error_of("- name: 'bad!name'\n  add: x");
        assert!(err.message.contains("invalid characters"));

        let rules = parse("- name: '  My   Rule  '\n  add: x").unwrap();
        assert_eq!(rules.iter().next().unwrap().name.as_deref(), Some("My Rule"));
    }

    #[test]
    fn switch_extracts_default_child() {
        let rules = parse(
            "- type: switch\n  children:\n    - any_of: a\n      add: p\n    - default: true\n      add: q",
        )
        .unwrap();
        match &rules.iter().next().unwrap().kind {
            RuleKind::Switch { children, default } => {
                assert_eq!(children.len(), 2);
                assert_eq!(*default, Some(1));
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn switch_rejects_second_default() {
        let err = error_of(
            "- type: switch\n  children:\n    - default: true\n      add: p\n    - default: true\n      add: q",
        );
        assert_eq!(err.path, "test.yml[0].children[1]");
        assert!(err.message.contains("already in use"));
    }

    #[test]
    fn switch_default_rejects_conditions() {
        let err = error_of(
            "- type: switch\n  children:\n    - default: true\n      any_of: a\n      add: p",
        );
        assert!(err.message.contains("default rule cannot contain conditions"));
    }

    #[test]
    fn switch_default_must_be_literal_true() {
        let err = error_of("- type: switch\n  children:\n    - default: false\n      add: p");
        assert!(err.message.contains("default must be true"));

        let err = error_of("- type: switch\n  children:\n    - default: 1\n      add: p");
        assert!(err.message.contains("default must be a bool"));
    }

    #[test]
    fn swap_requires_match_and_addition() {
        let rules = parse("- type: swap\n  match: red dress\n  add: blue dress").unwrap();
        assert_eq!(rules.iter().next().unwrap().kind_label(), "swap");

        let err = error_of("- type: swap\n  add: blue dress");
        assert!(err.message.contains("match property is required"));

        let err = error_of("- type: swap\n  match: red dress");
        assert!(err.message.contains("add or add_negative"));
    }

    #[test]
    fn swap_rejects_anchor_properties() {
        let err = error_of("- type: swap\n  match: a\n  add: b\n  anchor: c");
        assert_eq!(err.path, "test.yml[0].anchor");
        assert!(err.message.contains("not supported"));
    }

    #[test]
    fn tag_list_property_accepts_sequences() {
        let rules = parse("- add:\n    - glow\n    - [sparkle, shine]").unwrap();
        match &rules.iter().next().unwrap().kind {
            RuleKind::Tag(m) => assert_eq!(m.add.as_ref().unwrap().len(), 3),
            other => panic!("unexpected kind {other:?}"),
        }
    }
}
