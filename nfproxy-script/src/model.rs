//! Document shape of a filter script.
//!
//! ```yaml
//! protocol: http
//! enabled: [block_admin]
//! globals:
//!   FGEX_STREAM_MAX_SIZE: 65536
//!   FGEX_FULL_STREAM_ACTION: !FullStreamAction reject
//! filters:
//!   - name: block_admin
//!     params:
//!       - { name: req, type: HttpRequest }
//!     rules:
//!       - { field: url, regex: "^/admin", return: reject }
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_yaml::Value;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptDoc {
    #[serde(default)]
    pub protocol: Option<String>,
    /// Filters to run, in priority order. Registration order when absent.
    #[serde(default)]
    pub enabled: Option<Vec<String>>,
    #[serde(default)]
    pub globals: BTreeMap<String, Value>,
    #[serde(default)]
    pub filters: Vec<FilterDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterDef {
    pub name: String,
    #[serde(default)]
    pub params: Vec<ParamDef>,
    #[serde(default)]
    pub rules: Vec<RuleDef>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamDef {
    pub name: String,
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleDef {
    /// Parameter the rule inspects; the first one when absent.
    #[serde(default)]
    pub on: Option<String>,
    /// Part of an HTTP message: `method`, `url`, `status`, `body` or `header:<name>`.
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub contains: Option<Vec<String>>,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub always: bool,
    /// Replacement for every `regex` match in the packet payload.
    #[serde(default)]
    pub replace: Option<String>,
    #[serde(default, rename = "return")]
    pub returns: Value,
}
