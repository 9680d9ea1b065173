use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use nfproxy_core::action::FullStreamAction;
use nfproxy_core::error::ConfigurationError;
use nfproxy_core::registry::ProtocolRegistry;
use nfproxy_pipeline::builder::FilterHandlerBuilder;
use nfproxy_pipeline::filter::PacketFilter;
use nfproxy_pipeline::namespace::{Namespace, ScriptValue};
use serde_yaml::Value;
use tracing::debug;

use crate::error::ScriptError;
use crate::model::ScriptDoc;
use crate::rule::RuleFilter;

/// A parsed filter script, ready to be evaluated into namespaces.
#[derive(Debug)]
pub struct Script {
    protocol: Option<String>,
    enabled: Option<Vec<String>>,
    filters: Vec<Arc<RuleFilter>>,
    globals: Vec<(String, ScriptValue)>,
}

impl Script {
    pub fn parse(source: &str) -> Result<Self, ScriptError> {
        let doc: ScriptDoc = serde_yaml::from_str(source)?;

        let mut names = HashSet::new();
        let mut filters = Vec::with_capacity(doc.filters.len());
        for def in &doc.filters {
            if !names.insert(def.name.clone()) {
                return Err(ScriptError::DuplicateName(def.name.clone()));
            }
            filters.push(Arc::new(RuleFilter::compile(def)?));
        }

        let mut globals = Vec::with_capacity(doc.globals.len());
        for (name, value) in &doc.globals {
            if names.contains(name) {
                return Err(ScriptError::DuplicateName(name.clone()));
            }
            globals.push((name.clone(), script_value(name, value)?));
        }

        debug!(filters = filters.len(), globals = globals.len(), "script parsed");
        Ok(Self {
            protocol: doc.protocol,
            enabled: doc.enabled,
            filters,
            globals,
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let source = std::fs::read_to_string(path)?;
        Self::parse(&source)
    }

    /// Protocol the script declares, if any.
    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    /// Filters to enable: the declared list, or every filter in registration order.
    pub fn enabled(&self) -> Vec<String> {
        match &self.enabled {
            Some(enabled) => enabled.clone(),
            None => self.filters.iter().map(|f| f.name().to_string()).collect(),
        }
    }

    /// Evaluates the script into a fresh namespace.
    pub fn load(&self) -> Namespace {
        let mut ns = Namespace::new();
        for filter in &self.filters {
            ns.register_filter(filter.name(), filter.clone() as Arc<dyn PacketFilter>);
        }
        for (name, value) in &self.globals {
            ns.set(name.clone(), value.clone());
        }
        ns
    }

    /// Names of the filters a compile for `protocol` would run, in order.
    pub fn filter_names(
        &self,
        registry: &dyn ProtocolRegistry,
        protocol: &str,
    ) -> Result<Vec<String>, ConfigurationError> {
        let ns = self.load();
        let pipeline = FilterHandlerBuilder::new(registry).build(protocol, &ns, &self.enabled())?;
        Ok(pipeline.names().into_iter().map(str::to_string).collect())
    }
}

fn script_value(name: &str, value: &Value) -> Result<ScriptValue, ScriptError> {
    let invalid = |reason: String| ScriptError::InvalidGlobal {
        name: name.to_string(),
        reason,
    };
    Ok(match value {
        Value::Null => ScriptValue::Null,
        Value::Bool(b) => ScriptValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => ScriptValue::Int(i),
            None => ScriptValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => ScriptValue::Str(s.clone()),
        Value::Sequence(items) => ScriptValue::List(
            items
                .iter()
                .map(|item| script_value(name, item))
                .collect::<Result<_, _>>()?,
        ),
        Value::Tagged(tagged) if tagged.tag == "FullStreamAction" => {
            let action = tagged
                .value
                .as_str()
                .ok_or_else(|| invalid("FullStreamAction needs a string".to_string()))?
                .parse::<FullStreamAction>()
                .map_err(|e| invalid(e.to_string()))?;
            ScriptValue::FullStreamAction(action)
        }
        Value::Tagged(tagged) => return Err(invalid(format!("unknown tag {}", tagged.tag))),
        Value::Mapping(_) => return Err(invalid("mappings are not supported".to_string())),
    })
}

#[cfg(test)]
mod tests {
    use nfproxy_core::action::Action;
    use nfproxy_core::context::StreamLimits;
    use nfproxy_core::decision::Decision;
    use nfproxy_core::error::DispatchError;
    use nfproxy_core::packet::RawPacket;
    use nfproxy_pipeline::compile::{Compiler, FGEX_FULL_STREAM_ACTION, FGEX_STREAM_MAX_SIZE};
    use nfproxy_protocols::BuiltinProtocols;

    use super::*;

    const HTTP_SCRIPT: &str = r#"
protocol: http
globals:
  FGEX_STREAM_MAX_SIZE: 4096
  FGEX_FULL_STREAM_ACTION: !FullStreamAction reject
  BANNED: [sqlmap, nikto]
filters:
  - name: block_admin
    params: [{ name: req, type: HttpRequest }]
    rules:
      - { field: url, regex: "^/admin", return: reject }
  - name: block_scanners
    params: [{ name: req, type: HttpRequest }]
    rules:
      - { field: "header:user-agent", contains: [sqlmap, nikto], return: drop }
"#;

    #[test]
    fn loads_filters_and_globals() {
        let script = Script::parse(HTTP_SCRIPT).unwrap();
        assert_eq!(script.protocol(), Some("http"));
        assert_eq!(script.enabled(), vec!["block_admin", "block_scanners"]);

        let ns = script.load();
        assert_eq!(ns.registered(), ["block_admin", "block_scanners"]);
        assert_eq!(ns.value(FGEX_STREAM_MAX_SIZE), Some(&ScriptValue::Int(4096)));
        assert_eq!(
            ns.value(FGEX_FULL_STREAM_ACTION),
            Some(&ScriptValue::FullStreamAction(FullStreamAction::Reject))
        );
        assert!(matches!(ns.value("BANNED"), Some(ScriptValue::List(items)) if items.len() == 2));
    }

    #[test]
    fn compiled_script_filters_http_requests() {
        let registry = BuiltinProtocols::new();
        let script = Script::parse(HTTP_SCRIPT).unwrap();
        let config = Compiler::new(&registry, StreamLimits::default())
            .compile(&script.load(), "http", &script.enabled())
            .unwrap();
        assert_eq!(config.limits().stream_max_size, 4096);

        let mut ctx = config.new_context();
        let ok = RawPacket::from_payload("GET /index.html HTTP/1.1\r\nUser-Agent: curl\r\n\r\n");
        assert!(config.dispatch(&mut ctx, ok).unwrap().is_accept());

        let admin = RawPacket::from_payload("GET /admin/users HTTP/1.1\r\n\r\n");
        assert_eq!(
            config.dispatch(&mut ctx, admin).unwrap(),
            Decision::block(Action::Reject, "block_admin")
        );

        let scanner = RawPacket::from_payload("GET / HTTP/1.1\r\nUser-Agent: sqlmap/1.7\r\n\r\n");
        assert_eq!(
            config.dispatch(&mut ctx, scanner).unwrap(),
            Decision::block(Action::Drop, "block_scanners")
        );
    }

    #[test]
    fn non_action_return_fails_dispatch() {
        let registry = BuiltinProtocols::new();
        let script = Script::parse(
            r#"
filters:
  - name: broken
    params: [{ name: line, type: TextLine }]
    rules:
      - { always: true, return: "maybe" }
"#,
        )
        .unwrap();
        let config = Compiler::new(&registry, StreamLimits::default())
            .compile(&script.load(), "tcp", &script.enabled())
            .unwrap();
        let mut ctx = config.new_context();
        let err = config
            .dispatch(&mut ctx, RawPacket::from_payload("hello\n"))
            .unwrap_err();
        let DispatchError::InvalidFilterResult { handler, reason } = err;
        assert_eq!(handler, "broken");
        assert!(reason.contains("maybe"));
    }

    #[test]
    fn filter_names_follow_enabled_list() {
        let registry = BuiltinProtocols::new();
        let script = Script::parse(
            r#"
enabled: [second, first]
filters:
  - { name: first, params: [{ name: p, type: RawPacket }] }
  - { name: second, params: [{ name: p, type: TextLine }] }
"#,
        )
        .unwrap();
        assert_eq!(script.filter_names(&registry, "tcp").unwrap(), vec!["second", "first"]);
        assert_eq!(
            script.filter_names(&registry, "http").unwrap_err(),
            ConfigurationError::InvalidAnnotation {
                filter: "second".into(),
                param: "p".into(),
                annotation: "TextLine".into(),
            }
        );
    }

    #[test]
    fn rejects_duplicates_and_bad_globals() {
        let duplicate = "filters:\n  - { name: a }\n  - { name: a }\n";
        assert!(matches!(Script::parse(duplicate), Err(ScriptError::DuplicateName(n)) if n == "a"));

        let shadowed = "globals: { a: 1 }\nfilters:\n  - { name: a }\n";
        assert!(matches!(Script::parse(shadowed), Err(ScriptError::DuplicateName(_))));

        let bad_action = "globals: { FGEX_FULL_STREAM_ACTION: !FullStreamAction explode }\n";
        assert!(matches!(
            Script::parse(bad_action),
            Err(ScriptError::InvalidGlobal { name, .. }) if name == FGEX_FULL_STREAM_ACTION
        ));

        assert!(matches!(Script::parse("filters: 3"), Err(ScriptError::Yaml(_))));
        assert!(matches!(Script::from_path("/nonexistent/script.yaml"), Err(ScriptError::Io(_))));
    }
}
