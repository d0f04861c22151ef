//! Decompose a Zabbix item key into a measurement, tags and fields.
//!
//! Item keys are dotted names with an optional bracketed parameter list,
//! e.g. `net.if.in[eth0,bytes]` or `vfs.fs.size[/,pfree]`. There is no grammar
//! for them; the decomposition is driven by the shape of the key (how many
//! bracket groups, how many dot segments before the bracket, what the bracket
//! holds) and a handful of known measurement names.
//!
//! The rules live in [`RULES`] and are tried in order; the first rule whose
//! shape and predicate match decides the result. A key no rule matches falls
//! back to `measurement = key`, `value = <value>`, so classification never
//! fails and always yields at least one field. A rule that would produce an
//! empty measurement or an empty field name (`.idle`, `cpu.`) also falls
//! back, so any non-empty key yields a non-empty measurement.

use std::collections::BTreeMap;
use std::fmt;

use log::trace;


/// A point field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Text(v) => f.write_str(v),
        }
    }
}


/// Result of classifying a key.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredKey {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    /// Name of the rule that produced this decomposition.
    pub rule: &'static str,
}


pub const FALLBACK_RULE: &str = "fallback";

pub fn classify(key: &str, value: FieldValue) -> StructuredKey {
    let shape = KeyShape::parse(key);

    let matched = RULES
        .iter()
        .find(|rule| rule.matches(&shape))
        .and_then(|rule| {
            (rule.then)(&shape, &value)
                .filter(Parts::is_well_formed)
                .map(|parts| parts.finish(rule.name))
        });

    let structured = matched.unwrap_or_else(|| {
        Parts::new(key).field("value", value).finish(FALLBACK_RULE)
    });
    trace!("Classified key {:?} with rule {}", key, structured.rule);
    structured
}


/// Syntactic shape of a key.
#[derive(Debug)]
struct KeyShape<'a> {
    /// Number of `[` characters.
    brackets: usize,
    /// Dot-separated segments before the first `[`.
    segments: Vec<&'a str>,
    /// Text after the first `[` up to any second `[`, closing character included.
    bracket_raw: &'a str,
    /// `bracket_raw` without its last character.
    bracket: &'a str,
}

impl<'a> KeyShape<'a> {
    fn parse(key: &'a str) -> Self {
        let mut parts = key.split('[');
        let head = parts.next().unwrap_or("");
        let bracket_raw = parts.next();
        let brackets = match bracket_raw {
            Some(_) => 1 + parts.count(),
            None => 0,
        };
        let bracket_raw = bracket_raw.unwrap_or("");
        let bracket = match bracket_raw.char_indices().last() {
            Some((idx, _)) => &bracket_raw[..idx],
            None => bracket_raw,
        };

        KeyShape {
            brackets,
            segments: head.split('.').collect(),
            bracket_raw,
            bracket,
        }
    }

    fn seg(&self, idx: usize) -> &'a str {
        self.segments.get(idx).copied().unwrap_or("")
    }

    fn join(&self, idx: &[usize]) -> String {
        idx.iter().map(|&i| self.seg(i)).collect::<Vec<_>>().join(".")
    }

    fn comma_parts(&self) -> Vec<&'a str> {
        self.bracket.split(',').collect()
    }
}


/// Accumulates the pieces of a [`StructuredKey`].
struct Parts {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
}

impl Parts {
    fn new(measurement: impl Into<String>) -> Self {
        Parts {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
        }
    }

    fn field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    fn tag(mut self, name: &str, value: impl Into<String>) -> Self {
        self.tags.insert(name.to_string(), value.into());
        self
    }

    fn is_well_formed(&self) -> bool {
        !self.measurement.is_empty() && self.fields.keys().all(|name| !name.is_empty())
    }

    fn finish(self, rule: &'static str) -> StructuredKey {
        StructuredKey {
            measurement: self.measurement,
            tags: self.tags,
            fields: self.fields,
            rule,
        }
    }
}


/// One branch of the decision tree.
///
/// A rule applies to keys with exactly `brackets` bracket groups and
/// `segments` dot segments for which `when` holds. `then` may still decline
/// with `None` when the bracket lacks a part it needs; the key then takes the
/// fallback rather than any later rule.
struct Rule {
    name: &'static str,
    brackets: usize,
    segments: usize,
    when: fn(&KeyShape<'_>) -> bool,
    then: fn(&KeyShape<'_>, &FieldValue) -> Option<Parts>,
}

impl Rule {
    fn matches(&self, shape: &KeyShape<'_>) -> bool {
        self.brackets == shape.brackets && self.segments == shape.segments.len() && (self.when)(shape)
    }
}


const RULES: &[Rule] = &[
    // meas.field
    Rule { name: "dotted.2", brackets: 0, segments: 2, when: always, then: dotted_field },
    // meas.field.field
    Rule { name: "dotted.3", brackets: 0, segments: 3, when: always, then: dotted_field },
    // meas.field.field.some-context
    Rule { name: "dotted.4.context", brackets: 0, segments: 4, when: last_segment_has_dash, then: dotted_context },
    Rule { name: "dotted.4", brackets: 0, segments: 4, when: always, then: dotted_field },
    // meas[1/40]: the bracket carries nothing worth keeping
    Rule { name: "bracket.1.ratio", brackets: 1, segments: 1, when: raw_bracket_has_slash, then: bare_value },
    Rule { name: "bracket.1.list", brackets: 1, segments: 1, when: raw_bracket_has_comma, then: bracket_as_field },
    Rule { name: "bracket.2.process", brackets: 1, segments: 2, when: short_bracket, then: process_tag },
    Rule { name: "bracket.2.field", brackets: 1, segments: 2, when: medium_bracket, then: stripped_bracket_field },
    // system.run[curl ...]: the command is the field, its result the status
    Rule { name: "bracket.2.status", brackets: 1, segments: 2, when: long_bracket, then: status_code },
    Rule { name: "bracket.3.context", brackets: 1, segments: 3, when: bracket_has_dash, then: bracket_context },
    // vfs.fs.size[/,pfree]
    Rule { name: "bracket.3.path", brackets: 1, segments: 3, when: bracket_has_slash, then: path_tag },
    // system.cpu.util[,idle], system.swap.size[,free]
    Rule { name: "bracket.3.unnamed", brackets: 1, segments: 3, when: first_part_empty, then: unnamed_param },
    Rule { name: "bracket.3.net", brackets: 1, segments: 3, when: measurement_is_net, then: net_interface },
    Rule { name: "bracket.3.vm", brackets: 1, segments: 3, when: measurement_is_vm, then: vm_field },
    Rule { name: "bracket.3.system", brackets: 1, segments: 3, when: measurement_is_system, then: system_check },
    Rule { name: "bracket.3.web", brackets: 1, segments: 3, when: measurement_is_web, then: web_scenario },
    // custom.vfs.dev.read.ops[sda]
    Rule { name: "bracket.5.custom", brackets: 1, segments: 5, when: measurement_is_custom, then: custom_drive },
    Rule { name: "bracket.5.app", brackets: 1, segments: 5, when: measurement_is_app, then: app_name },
];


fn always(_: &KeyShape<'_>) -> bool {
    true
}

fn last_segment_has_dash(k: &KeyShape<'_>) -> bool {
    k.seg(3).contains('-')
}

fn raw_bracket_has_slash(k: &KeyShape<'_>) -> bool {
    k.bracket_raw.contains('/')
}

fn raw_bracket_has_comma(k: &KeyShape<'_>) -> bool {
    k.bracket_raw.contains(',')
}

fn short_bracket(k: &KeyShape<'_>) -> bool {
    k.bracket.len() < 10
}

fn medium_bracket(k: &KeyShape<'_>) -> bool {
    k.bracket.len() < 25
}

fn long_bracket(k: &KeyShape<'_>) -> bool {
    k.bracket.len() > 25 && k.bracket.len() < 150
}

fn bracket_has_dash(k: &KeyShape<'_>) -> bool {
    k.bracket.contains('-')
}

fn bracket_has_slash(k: &KeyShape<'_>) -> bool {
    k.bracket.contains('/')
}

fn first_part_empty(k: &KeyShape<'_>) -> bool {
    k.comma_parts().first().map_or(true, |p| p.is_empty())
}

fn measurement_is_net(k: &KeyShape<'_>) -> bool {
    k.seg(0) == "net"
}

fn measurement_is_vm(k: &KeyShape<'_>) -> bool {
    k.seg(0) == "vm"
}

fn measurement_is_system(k: &KeyShape<'_>) -> bool {
    k.seg(0) == "system"
}

fn measurement_is_web(k: &KeyShape<'_>) -> bool {
    k.seg(0) == "web"
}

fn measurement_is_custom(k: &KeyShape<'_>) -> bool {
    k.seg(0) == "custom"
}

fn measurement_is_app(k: &KeyShape<'_>) -> bool {
    k.seg(0) == "app"
}


fn dotted_field(k: &KeyShape<'_>, v: &FieldValue) -> Option<Parts> {
    let name = k.join(&(1..k.segments.len()).collect::<Vec<_>>());
    Some(Parts::new(k.seg(0)).field(name, v.clone()))
}

fn dotted_context(k: &KeyShape<'_>, v: &FieldValue) -> Option<Parts> {
    Some(Parts::new(k.seg(0)).field(k.join(&[1, 2]), v.clone()).tag("context", k.seg(3)))
}

fn bare_value(k: &KeyShape<'_>, v: &FieldValue) -> Option<Parts> {
    Some(Parts::new(k.seg(0)).field("value", v.clone()))
}

fn bracket_as_field(k: &KeyShape<'_>, v: &FieldValue) -> Option<Parts> {
    let name = k.bracket.replace(',', ".").replace(' ', ".");
    Some(Parts::new(k.seg(0)).field(name, v.clone()))
}

fn process_tag(k: &KeyShape<'_>, v: &FieldValue) -> Option<Parts> {
    let process = k.bracket.replace(',', "");
    let parts = Parts::new(k.seg(0)).field(k.seg(1), v.clone());
    if process.is_empty() {
        Some(parts)
    } else {
        Some(parts.tag("process", process))
    }
}

fn stripped_bracket_field(k: &KeyShape<'_>, v: &FieldValue) -> Option<Parts> {
    let name = k.bracket.replace('"', "").replace('{', "").replace('}', "");
    Some(Parts::new(k.seg(0)).field(name, v.clone()))
}

fn status_code(k: &KeyShape<'_>, v: &FieldValue) -> Option<Parts> {
    Some(
        Parts::new(k.seg(0))
            .field(k.seg(1), FieldValue::Text(k.bracket.to_string()))
            .tag("status_code", v.to_string()),
    )
}

fn bracket_context(k: &KeyShape<'_>, v: &FieldValue) -> Option<Parts> {
    Some(Parts::new(k.seg(0)).field(k.join(&[1, 2]), v.clone()).tag("context", k.bracket))
}

fn path_tag(k: &KeyShape<'_>, v: &FieldValue) -> Option<Parts> {
    let parts = k.comma_parts();
    let mode = parts.get(1)?;
    let name = format!("{}.{}", k.join(&[1, 2]), mode);
    Some(Parts::new(k.seg(0)).field(name, v.clone()).tag("path", parts[0]))
}

fn unnamed_param(k: &KeyShape<'_>, v: &FieldValue) -> Option<Parts> {
    let parts = k.comma_parts();
    let param = parts.get(1)?;
    Some(Parts::new(k.seg(0)).field(format!("{}.{}", k.seg(1), param), v.clone()))
}

fn net_interface(k: &KeyShape<'_>, v: &FieldValue) -> Option<Parts> {
    let parts = k.comma_parts();
    let name = match parts.get(1) {
        Some(direction) => format!("{}.{}", k.join(&[1, 2]), direction),
        None => k.join(&[1, 2]),
    };
    Some(Parts::new(k.seg(0)).field(name, v.clone()).tag("interface", parts[0]))
}

fn vm_field(k: &KeyShape<'_>, v: &FieldValue) -> Option<Parts> {
    let parts = k.comma_parts();
    Some(Parts::new(k.seg(0)).field(format!("{}.{}", k.join(&[1, 2]), parts[0]), v.clone()))
}

fn system_check(k: &KeyShape<'_>, v: &FieldValue) -> Option<Parts> {
    let parts = k.comma_parts();
    if k.seg(1) == "cpu" {
        // per-cpu metrics: system.cpu.util[user,0]
        let cpu = parts.get(1)?;
        let name = format!("{}.{}", k.join(&[1, 2]), parts[0]);
        Some(Parts::new(k.seg(0)).field(name, v.clone()).tag("cpu", *cpu))
    } else {
        Some(Parts::new(k.seg(0)).field(k.join(&[1, 2]), v.clone()).tag("system", parts[0]))
    }
}

fn web_scenario(k: &KeyShape<'_>, v: &FieldValue) -> Option<Parts> {
    let name = if k.seg(2) == "time" { "value" } else { k.seg(2) };
    Some(Parts::new(k.join(&[0, 1])).field(name, v.clone()).tag("system", "ZabbixGUI"))
}

fn custom_drive(k: &KeyShape<'_>, v: &FieldValue) -> Option<Parts> {
    Some(Parts::new(k.join(&[0, 1, 2])).field(k.join(&[3, 4]), v.clone()).tag("drive", k.bracket))
}

fn app_name(k: &KeyShape<'_>, v: &FieldValue) -> Option<Parts> {
    Some(Parts::new(k.seg(0)).field(k.join(&[3, 4]), v.clone()).tag("name", k.join(&[1, 2])))
}
