//! Script filters: an ordered list of rules evaluated against the resolved
//! parameters. The first matching rule decides what the filter returns.

use nfproxy_core::action::Action;
use nfproxy_core::datatype::DataType;
use nfproxy_pipeline::filter::{Annotation, FilterCall, FilterError, FilterReturn, PacketFilter, Param};
use serde_yaml::Value;
use tracing::trace;

use crate::error::ScriptError;
use crate::matcher::{subject, Field, Matcher};
use crate::model::{FilterDef, RuleDef};

#[derive(Debug)]
struct Rule {
    /// Index of the inspected parameter.
    on: usize,
    field: Option<Field>,
    matcher: Matcher,
    replace: Option<Vec<u8>>,
    returns: FilterReturn,
}

#[derive(Debug)]
pub struct RuleFilter {
    name: String,
    params: Vec<Param>,
    rules: Vec<Rule>,
}

impl RuleFilter {
    pub fn compile(def: &FilterDef) -> Result<Self, ScriptError> {
        let params: Vec<Param> = def
            .params
            .iter()
            .map(|p| match &p.type_name {
                Some(type_name) => Param::annotated(&p.name, type_name),
                None => Param::untyped(&p.name),
            })
            .collect();

        let rules = def
            .rules
            .iter()
            .enumerate()
            .map(|(index, rule)| {
                compile_rule(&params, rule).map_err(|reason| ScriptError::InvalidRule {
                    filter: def.name.clone(),
                    rule: index,
                    reason,
                })
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            name: def.name.clone(),
            params,
            rules,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn compile_rule(params: &[Param], def: &RuleDef) -> Result<Rule, String> {
    let on = match &def.on {
        Some(name) => params
            .iter()
            .position(|p| &p.name == name)
            .ok_or_else(|| format!("no parameter named '{name}'"))?,
        None if params.is_empty() => return Err("filter has no parameters".to_string()),
        None => 0,
    };

    let field = def.field.as_deref().map(str::parse::<Field>).transpose()?;
    if field.is_some() {
        let http = matches!(
            params[on].annotation,
            Annotation::Data(DataType::HttpRequest | DataType::HttpResponse)
        );
        if !http {
            return Err(format!("field needs an HTTP parameter, '{}' is not one", params[on].name));
        }
    }

    let matcher = match (&def.contains, &def.regex, def.always) {
        (Some(patterns), None, false) => Matcher::contains(patterns.as_slice())?,
        (None, Some(pattern), false) => Matcher::regex(pattern)?,
        (None, None, true) => Matcher::Always,
        (None, None, false) => return Err("no matcher given".to_string()),
        _ => return Err("only one of contains, regex and always may be given".to_string()),
    };

    if def.replace.is_some() && matcher.as_regex().is_none() {
        return Err("replace needs a regex matcher".to_string());
    }

    Ok(Rule {
        on,
        field,
        matcher,
        replace: def.replace.as_ref().map(|r| r.clone().into_bytes()),
        returns: filter_return(&def.returns),
    })
}

/// Maps a YAML `return` value to what the filter hands back. Action names are
/// case-insensitive; anything else is passed through as a non-action.
fn filter_return(value: &Value) -> FilterReturn {
    match value {
        Value::Null => FilterReturn::Nothing,
        Value::String(s) => match s.parse::<Action>() {
            Ok(action) => FilterReturn::Action(action),
            Err(_) => FilterReturn::Other(format!("str '{s}'")),
        },
        Value::Bool(b) => FilterReturn::Other(format!("bool {b}")),
        Value::Number(n) => FilterReturn::Other(format!("number {n}")),
        Value::Sequence(_) => FilterReturn::Other("list".to_string()),
        Value::Mapping(_) => FilterReturn::Other("mapping".to_string()),
        Value::Tagged(tagged) => FilterReturn::Other(format!("tagged {}", tagged.tag)),
    }
}

impl PacketFilter for RuleFilter {
    fn params(&self) -> &[Param] {
        &self.params
    }

    fn call(&self, call: &mut FilterCall<'_>) -> Result<FilterReturn, FilterError> {
        for (index, rule) in self.rules.iter().enumerate() {
            let value = call
                .arg(rule.on)
                .ok_or_else(|| FilterError(format!("argument {} was not supplied", rule.on)))?;
            let Some(data) = subject(value, rule.field.as_ref()) else {
                continue;
            };
            if !rule.matcher.is_match(&data) {
                continue;
            }

            if let (Some(replacement), Some(re)) = (&rule.replace, rule.matcher.as_regex()) {
                let payload = call.packet().payload();
                let rewritten = re.replace_all(&payload, replacement.as_slice()).into_owned();
                call.packet_mut().set_payload(&rewritten);
            }
            trace!(filter = %self.name, rule = index, "rule matched");
            return Ok(rule.returns.clone());
        }
        Ok(FilterReturn::Nothing)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use nfproxy_core::datatype::DataValue;
    use nfproxy_core::packet::RawPacket;

    use super::*;
    use crate::model::ScriptDoc;

    fn filter(yaml: &str) -> Result<RuleFilter, ScriptError> {
        let doc: ScriptDoc = serde_yaml::from_str(yaml).unwrap();
        RuleFilter::compile(&doc.filters[0])
    }

    fn run(filter: &RuleFilter, payload: &'static str) -> (FilterReturn, Bytes) {
        let mut packet = RawPacket::from_payload(payload);
        let args = vec![DataValue::Packet(packet.clone())];
        let mut call = FilterCall::new(args, &mut packet);
        let returned = filter.call(&mut call).unwrap();
        (returned, packet.payload())
    }

    #[test]
    fn first_matching_rule_wins() {
        let f = filter(
            r#"
filters:
  - name: f
    params: [{ name: pkt, type: RawPacket }]
    rules:
      - { contains: ["DROP"], return: drop }
      - { regex: "rej(ect)?", return: REJECT }
      - { contains: ["x"] }
"#,
        )
        .unwrap();
        assert_eq!(run(&f, "please DROP reject").0, FilterReturn::Action(Action::Drop));
        assert_eq!(run(&f, "rej").0, FilterReturn::Action(Action::Reject));
        assert_eq!(run(&f, "x").0, FilterReturn::Nothing);
        assert_eq!(run(&f, "fine").0, FilterReturn::Nothing);
    }

    #[test]
    fn replace_rewrites_payload() {
        let f = filter(
            r#"
filters:
  - name: redact
    params: [{ name: pkt, type: RawPacket }]
    rules:
      - { regex: "password=[^&]*", replace: "password=***", return: mangle }
"#,
        )
        .unwrap();
        let (returned, payload) = run(&f, "user=a&password=hunter2&x=1");
        assert_eq!(returned, FilterReturn::Action(Action::Mangle));
        assert_eq!(&payload[..], b"user=a&password=***&x=1");
    }

    #[test]
    fn non_action_returns_are_passed_through() {
        let f = filter(
            r#"
filters:
  - name: odd
    params: [{ name: pkt, type: RawPacket }]
    rules:
      - { always: true, return: 42 }
"#,
        )
        .unwrap();
        assert_eq!(run(&f, "").0, FilterReturn::Other("number 42".into()));
    }

    #[test]
    fn invalid_rules_are_rejected() {
        let cases = [
            ("{ contains: [a], regex: b }", "only one of"),
            ("{ return: drop }", "no matcher"),
            ("{ regex: '(' }", "invalid regex"),
            ("{ always: true, replace: x }", "replace needs a regex"),
            ("{ on: nope, always: true }", "no parameter named"),
            ("{ field: url, always: true }", "field needs an HTTP parameter"),
        ];
        for (rule, expected) in cases {
            let yaml = format!(
                "filters:\n  - name: f\n    params: [{{ name: pkt, type: RawPacket }}]\n    rules:\n      - {rule}\n"
            );
            match filter(&yaml) {
                Err(ScriptError::InvalidRule { filter, rule: 0, reason }) => {
                    assert_eq!(filter, "f");
                    assert!(reason.contains(expected), "{reason}");
                }
                other => panic!("unexpected result for {rule}: {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_type_names_are_kept_for_the_builder() {
        let f = filter(
            r#"
filters:
  - name: f
    params: [{ name: a, type: bytes }, { name: b }]
"#,
        )
        .unwrap();
        assert_eq!(f.params()[0].annotation, Annotation::Unrecognized("bytes".into()));
        assert_eq!(f.params()[1].annotation, Annotation::Missing);
    }
}
