//! Hook and class documents.
//!
//! Both load from YAML, JSON or TOML; the format follows the file extension.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::class::ClassNode;
use crate::context::NameMapper;
use crate::error::WeaveError;
use crate::hook::HookSpec;
use crate::weaver::Weaver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
    Toml,
}

impl Format {
    pub fn from_path(path: &Path) -> Result<Format> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "yaml" | "yml" => Ok(Format::Yaml),
            "json" => Ok(Format::Json),
            "toml" => Ok(Format::Toml),
            _ => bail!("{}: unsupported document format (expected .yaml, .yml, .json or .toml)", path.display()),
        }
    }

    pub fn parse<T: DeserializeOwned>(self, input: &str) -> Result<T> {
        Ok(match self {
            Format::Json => serde_json::from_str(input)?,
            // enums are written as single-key maps (`anchor: { opcode: imul }`), not `!tags`
            Format::Yaml => serde_yaml::with::singleton_map_recursive::deserialize(serde_yaml::Deserializer::from_str(input))?,
            Format::Toml => toml::from_str(input)?,
        })
    }

    pub fn render<T: Serialize>(self, value: &T) -> Result<String> {
        Ok(match self {
            Format::Json => serde_json::to_string_pretty(value)?,
            Format::Yaml => {
                let mut out = Vec::new();
                serde_yaml::with::singleton_map_recursive::serialize(value, &mut serde_yaml::Serializer::new(&mut out))?;
                String::from_utf8(out)?
            }
            Format::Toml => toml::to_string(value)?,
        })
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Format::Json => "json",
            Format::Yaml => "yaml",
            Format::Toml => "toml",
        })
    }
}

fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let format = Format::from_path(path)?;
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    format
        .parse(&text)
        .with_context(|| format!("failed to parse {} as {}", path.display(), format))
}

/// A set of hooks plus the class-name remapping they were written against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookDocument {
    /// Hook-side class name -> loaded class name.
    #[serde(default)]
    pub remap: BTreeMap<String, String>,
    #[serde(default)]
    pub hooks: Vec<HookSpec>,
}

impl HookDocument {
    pub fn load(path: &Path) -> Result<HookDocument> {
        let doc: HookDocument = load(path)?;
        tracing::debug!(path = %path.display(), hooks = doc.hooks.len(), "hook document loaded");
        Ok(doc)
    }

    pub fn mapper(&self) -> NameMapper {
        NameMapper::from_map(&self.remap)
    }

    /// Prepares every hook. Hooks that fail setup are returned alongside.
    pub fn weaver(&self) -> (Weaver, Vec<WeaveError>) {
        Weaver::from_specs(self.hooks.iter().cloned())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassDocument {
    #[serde(default)]
    pub classes: Vec<ClassNode>,
}

impl ClassDocument {
    pub fn load(path: &Path) -> Result<ClassDocument> {
        let mut doc: ClassDocument = load(path)?;
        for class in &mut doc.classes {
            class.sync_labels();
        }
        tracing::debug!(path = %path.display(), classes = doc.classes.len(), "class document loaded");
        Ok(doc)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let format = Format::from_path(path)?;
        let text = format.render(self).with_context(|| format!("failed to render classes as {}", format))?;
        std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn class(&self, name: &str) -> Option<&ClassNode> {
        self.classes.iter().find(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insn::{Insn, Kind};

    const HOOKS: &str = r#"
remap:
  api.Calc: demo/Calc
hooks:
  - id: calc-after
    target: { name: api.Calc }
    selector: { name: compute, desc: "(I)I", exact: true }
    placement: AFTER
    anchor: { opcode: imul }
    flags: [static, direct]
    handler:
      owner: demo/Hooks
      name: onCompute
      params: [{ type: I }]
      returns: Lhookweave/runtime/HookResult;
"#;

    const CLASSES: &str = r#"{
  "classes": [{
    "name": "demo/Calc",
    "methods": [{
      "name": "compute",
      "desc": "(I)I",
      "access": ["public", "static"],
      "code": [
        {"label": 3},
        {"load": ["int", 0]},
        {"const": {"int": 2}},
        {"arith": ["mul", "int"]},
        {"return": "int"}
      ]
    }]
  }]
}"#;

    #[test]
    fn format_follows_extension() {
        assert_eq!(Format::from_path(Path::new("a/hooks.YML")).expect("yml"), Format::Yaml);
        assert_eq!(Format::from_path(Path::new("c.json")).expect("json"), Format::Json);
        assert_eq!(Format::from_path(Path::new("c.toml")).expect("toml"), Format::Toml);
        assert!(Format::from_path(Path::new("c.txt")).is_err());
    }

    #[test]
    fn hook_document_builds_weaver_and_mapper() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hooks.yaml");
        std::fs::write(&path, HOOKS).expect("write");
        let doc = HookDocument::load(&path).expect("load");
        assert_eq!(doc.mapper().map_class("api/Calc"), "demo/Calc");
        let (weaver, errors) = doc.weaver();
        assert!(errors.is_empty());
        assert_eq!(weaver.plans().len(), 1);
        assert_eq!(weaver.plans()[0].target_class, "api/Calc");
    }

    #[test]
    fn class_document_syncs_labels_and_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("classes.json");
        std::fs::write(&path, CLASSES).expect("write");
        let doc = ClassDocument::load(&path).expect("load");
        let method = doc.class("demo/Calc").and_then(|c| c.method("compute", "(I)I")).expect("method");
        assert_eq!(method.labels.len(), 4);
        assert_eq!(method.code.get(method.code.first_real().expect("real")), Some(&Insn::Load(Kind::Int, 0)));

        let out = dir.path().join("out.json");
        doc.save(&out).expect("save");
        let back = ClassDocument::load(&out).expect("reload");
        assert_eq!(
            back.classes[0].methods[0].code.to_vec(),
            doc.classes[0].methods[0].code.to_vec()
        );
    }

    #[test]
    fn yaml_class_document_round_trips_nested_enums() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("classes.json");
        std::fs::write(&src, CLASSES).expect("write");
        let doc = ClassDocument::load(&src).expect("load");

        let out = dir.path().join("classes.yaml");
        doc.save(&out).expect("save yaml");
        let text = std::fs::read_to_string(&out).expect("read");
        assert!(!text.contains('!'), "enums should render as maps:\n{}", text);
        let back = ClassDocument::load(&out).expect("reload yaml");
        assert_eq!(
            back.classes[0].methods[0].code.to_vec(),
            doc.classes[0].methods[0].code.to_vec()
        );
    }

    #[test]
    fn parse_errors_name_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "hooks: [ {").expect("write");
        let err = HookDocument::load(&path).expect_err("broken");
        assert!(format!("{:#}", err).contains("broken.yaml"));
    }
}
